use log::{error, info, warn};
use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use crate::config::PipelineConfig;
use crate::events::{ApiHealth, EventLog};
use crate::extraction::FieldExtractor;
use crate::label_processor::{LabelProcessor, LabelSide};
use crate::models::{ApplicationEntry, ApplicationRecord, ApplicationStatus};
use crate::processing::TextRecognizer;
use crate::stats::{StatsAction, StatsLog};
use crate::store::{load_applications, JsonRecordStore};
use crate::utils::LabelError;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchSummary {
    pub processed: usize,
    pub errors: usize,
    /// Applications left unprocessed because the stop file appeared.
    pub remaining: usize,
    pub stopped: bool,
    /// Wall time per attempted application, seconds.
    pub timings: Vec<(String, f64)>,
    pub total_seconds: f64,
}

impl BatchSummary {
    pub fn attempted(&self) -> usize {
        self.processed + self.errors
    }

    pub fn min_seconds(&self) -> Option<f64> {
        self.timings.iter().map(|(_, t)| *t).reduce(f64::min)
    }

    pub fn max_seconds(&self) -> Option<f64> {
        self.timings.iter().map(|(_, t)| *t).reduce(f64::max)
    }

    pub fn average_seconds(&self) -> Option<f64> {
        if self.timings.is_empty() {
            return None;
        }
        Some(self.timings.iter().map(|(_, t)| t).sum::<f64>() / self.timings.len() as f64)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VerificationSummary {
    pub scored: usize,
    pub good: usize,
    pub no_crop: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClearSummary {
    pub apps_reset: usize,
    pub fields_cleared: usize,
    pub images_deleted: usize,
}

enum AppOutcome {
    Processed { fields: usize },
    Failed(String),
}

/// Drives extraction, matching and cropping across the application manifest.
pub struct BatchRunner<E: FieldExtractor, R: TextRecognizer> {
    processor: LabelProcessor,
    extractor: E,
    recognizer: R,
    store: JsonRecordStore,
    events: EventLog,
    stats: StatsLog,
    health: ApiHealth,
}

impl<E: FieldExtractor, R: TextRecognizer> BatchRunner<E, R> {
    pub fn new(config: PipelineConfig, extractor: E, recognizer: R) -> Self {
        let store = JsonRecordStore::new(config.results_dir.clone());
        let events = EventLog::open(config.events_file.clone());
        let stats = StatsLog::open(config.stats_file.clone());
        Self {
            processor: LabelProcessor::new(config),
            extractor,
            recognizer,
            store,
            events,
            stats,
            health: ApiHealth::new(),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        self.processor.config()
    }

    pub fn store(&self) -> &JsonRecordStore {
        &self.store
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    pub fn stats(&self) -> &StatsLog {
        &self.stats
    }

    pub fn health(&self) -> &ApiHealth {
        &self.health
    }

    /// Process pending applications, or exactly `application_id` when given.
    pub fn run_process(
        &mut self,
        limit: Option<usize>,
        application_id: Option<&str>,
    ) -> Result<BatchSummary, LabelError> {
        let mut queue = self.select_applications(application_id)?;
        if let Some(limit) = limit {
            queue.truncate(limit);
        }

        let mut summary = BatchSummary::default();
        if queue.is_empty() {
            info!("No pending applications");
            return Ok(summary);
        }

        info!("Processing {} applications", queue.len());
        self.events.batch_started(queue.len());
        self.health.reset();
        let batch_start = Instant::now();

        for (index, app) in queue.iter().enumerate() {
            if self.config().stop_file.exists() {
                summary.stopped = true;
                summary.remaining = queue.len() - index;
                warn!("Stop file found, halting with {} applications remaining", summary.remaining);
                self.events.processing_stopped(index, summary.remaining);
                if let Err(e) = fs::remove_file(&self.config().stop_file) {
                    warn!("Failed to remove stop file: {}", e);
                }
                break;
            }

            info!("[{}/{}] {}", index + 1, queue.len(), app.application_id);
            let app_start = Instant::now();
            let id = Some(app.application_id.as_str());
            match self.process_application(app) {
                Ok(AppOutcome::Processed { fields }) => {
                    summary.processed += 1;
                    self.stats
                        .log_action(id, StatsAction::Processed, format!("Extracted {} fields", fields));
                }
                Ok(AppOutcome::Failed(message)) => {
                    summary.errors += 1;
                    self.stats.log_action(id, StatsAction::Error, message);
                }
                Err(e) => {
                    error!("{}: {}", app.application_id, e);
                    self.events.system_error(&e.to_string(), id);
                    self.stats.log_action(id, StatsAction::Error, e.to_string());
                    summary.errors += 1;
                }
            }
            self.refresh_stats_summary();
            summary
                .timings
                .push((app.application_id.clone(), app_start.elapsed().as_secs_f64()));
        }

        summary.total_seconds = batch_start.elapsed().as_secs_f64();
        if !summary.stopped {
            self.events
                .batch_complete(summary.attempted(), summary.total_seconds, summary.errors);
        }
        Ok(summary)
    }

    fn select_applications(&self, application_id: Option<&str>) -> Result<Vec<ApplicationEntry>, LabelError> {
        let apps = load_applications(&self.config().applications_file)?;
        if let Some(id) = application_id {
            let app = apps
                .into_iter()
                .find(|a| a.application_id == id)
                .ok_or_else(|| LabelError::StoreError(format!("Application {} not in manifest", id)))?;
            return Ok(vec![app]);
        }

        let mut pending = Vec::new();
        for app in apps {
            if self.store.status(&app.application_id)? != ApplicationStatus::Processed {
                pending.push(app);
            }
        }
        Ok(pending)
    }

    /// Recount manifest statuses into the stats summary. Processing counts as pending.
    fn refresh_stats_summary(&mut self) {
        let apps = match load_applications(&self.config().applications_file) {
            Ok(apps) => apps,
            Err(e) => {
                warn!("Skipping stats summary: {}", e);
                return;
            }
        };
        let (mut processed, mut pending, mut errors) = (0, 0, 0);
        for app in &apps {
            match self.store.status(&app.application_id) {
                Ok(ApplicationStatus::Processed) => processed += 1,
                Ok(ApplicationStatus::Error) => errors += 1,
                Ok(_) => pending += 1,
                Err(e) => {
                    warn!("{}: unreadable record: {}", app.application_id, e);
                    errors += 1;
                }
            }
        }
        self.stats.update_summary(processed, pending, errors);
    }

    /// Delete every crop an earlier run may have left for this application.
    fn remove_previous_crops(&self, application_id: &str) -> Result<(), LabelError> {
        let mut stale: Vec<PathBuf> = self
            .config()
            .verify_fields
            .iter()
            .map(|field| self.config().crop_path(application_id, field))
            .collect();
        if let Some(previous) = self.store.load(application_id)? {
            stale.extend(previous.fields.into_values().filter_map(|f| f.crop_path));
        }
        for path in stale {
            if path.exists() {
                fs::remove_file(&path)?;
            }
        }
        Ok(())
    }

    fn image_path(&self, name: &Option<String>) -> Option<PathBuf> {
        name.as_ref().map(|n| self.config().images_dir.join(n))
    }

    fn process_application(&mut self, app: &ApplicationEntry) -> Result<AppOutcome, LabelError> {
        let id = app.application_id.as_str();
        let front = self.image_path(&app.front_image);
        let back = self.image_path(&app.back_image);
        self.remove_previous_crops(id)?;
        self.store.mark_processing(id)?;

        let started = Instant::now();
        let extracted = self.extractor.extract(id, front.as_deref(), back.as_deref());
        self.health
            .record(started.elapsed().as_secs_f64(), &mut self.events);

        let fields = match extracted {
            Ok(fields) => fields,
            Err(e) if !e.is_extraction_failure() => return Err(e),
            Err(e) => {
                error!("{}: extraction failed: {}", id, e);
                match &e {
                    LabelError::ExtractionTimeout(msg) => self.events.api_timeout(msg),
                    other => self.events.api_error(&other.to_string()),
                }
                self.store.save(&ApplicationRecord::failed(id, e.to_string()))?;
                return Ok(AppOutcome::Failed(e.to_string()));
            }
        };

        let front = LabelSide::recognize(front, &mut self.recognizer);
        let back = LabelSide::recognize(back, &mut self.recognizer);
        let outcomes = self.processor.process_fields(id, &fields, &front, &back);

        self.store.save(&ApplicationRecord::processed(id, &outcomes))?;
        Ok(AppOutcome::Processed {
            fields: outcomes.len(),
        })
    }

    /// Re-read every saved crop and store an independent match score.
    pub fn run_verify(&mut self) -> Result<VerificationSummary, LabelError> {
        let mut summary = VerificationSummary::default();
        let threshold = self.config().low_score_threshold;

        for mut record in self.store.list()? {
            if record.status != ApplicationStatus::Processed {
                continue;
            }
            info!("Verifying {}", record.application_id);
            for (name, field) in record.fields.iter_mut() {
                let score = self.processor.verify_field(
                    &mut self.recognizer,
                    name,
                    field.crop_path.as_deref(),
                    &field.text,
                );
                match score {
                    Some(score) => {
                        summary.scored += 1;
                        if !score.is_low_confidence(threshold) {
                            summary.good += 1;
                        }
                        field.apply_verification(&score);
                    }
                    None => {
                        summary.no_crop += 1;
                        field.clear_verification();
                    }
                }
            }
            self.store.save(&record)?;
        }

        info!(
            "Verified {} fields: {} good, {} low, {} without crop",
            summary.scored,
            summary.good,
            summary.scored - summary.good,
            summary.no_crop
        );
        Ok(summary)
    }

    /// Remove all results and crops and start fresh event and stats logs.
    pub fn clear(&mut self) -> Result<ClearSummary, LabelError> {
        let mut summary = ClearSummary::default();
        for record in self.store.list()? {
            summary.fields_cleared += record.fields.len();
            if self.store.delete(&record.application_id)? {
                summary.apps_reset += 1;
            }
        }

        let crops_dir = &self.config().crops_dir;
        if crops_dir.exists() {
            for entry in fs::read_dir(crops_dir)? {
                let path = entry?.path();
                if path.extension().and_then(|e| e.to_str()) == Some("png") {
                    fs::remove_file(&path)?;
                    summary.images_deleted += 1;
                }
            }
        }

        // Everything in the manifest is pending again
        let pending = load_applications(&self.config().applications_file)
            .map(|apps| apps.len())
            .unwrap_or(summary.apps_reset);
        self.stats.clear_log();
        self.stats.update_summary(0, pending, 0);
        self.stats.log_action(
            None,
            StatsAction::Clear,
            format!(
                "Cleared {} fields, {} images, reset {} apps to pending",
                summary.fields_cleared, summary.images_deleted, summary.apps_reset
            ),
        );

        self.events.clear();
        self.events
            .cleared(summary.apps_reset, summary.fields_cleared, summary.images_deleted);
        info!(
            "Cleared {} applications, {} fields, {} crops",
            summary.apps_reset, summary.fields_cleared, summary.images_deleted
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_statistics() {
        let summary = BatchSummary {
            processed: 2,
            errors: 1,
            timings: vec![
                ("a".to_string(), 2.0),
                ("b".to_string(), 4.0),
                ("c".to_string(), 9.0),
            ],
            ..BatchSummary::default()
        };
        assert_eq!(summary.attempted(), 3);
        assert_eq!(summary.min_seconds(), Some(2.0));
        assert_eq!(summary.max_seconds(), Some(9.0));
        assert_eq!(summary.average_seconds(), Some(5.0));
        assert_eq!(BatchSummary::default().average_seconds(), None);
    }
}
