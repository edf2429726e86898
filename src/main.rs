// Label field cropping and verification pipeline

use clap::{Parser, Subcommand};
use labelcrop::{
    processing::TesseractRecognizer, BatchRunner, BatchSummary, LabelError, PipelineConfig,
    ResponseFileExtractor, VerificationSummary,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "labelcrop")]
#[command(about = "Locate extracted label fields on label images and crop them for review")]
struct Cli {
    #[arg(short, long, help = "JSON configuration file")]
    config: Option<PathBuf>,

    #[arg(long, help = "Application manifest (overrides config)")]
    applications: Option<PathBuf>,

    #[arg(long, help = "Label image directory (overrides config)")]
    images_dir: Option<PathBuf>,

    #[arg(long, help = "Crop output directory (overrides config)")]
    crops_dir: Option<PathBuf>,

    #[arg(long, help = "Result record directory (overrides config)")]
    results_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Extract, match and crop pending applications
    Process {
        #[arg(short, long, help = "Process at most this many applications")]
        limit: Option<usize>,

        #[arg(short, long, help = "Reprocess a single application")]
        application_id: Option<String>,
    },
    /// Re-run OCR on saved crops and score them against the extracted text
    Verify,
    /// Delete all results, crops and events
    Clear,
}

fn load_config(cli: &Cli) -> Result<PipelineConfig, LabelError> {
    let mut config = match &cli.config {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(path) = &cli.applications {
        config.applications_file = path.clone();
    }
    if let Some(dir) = &cli.images_dir {
        config.images_dir = dir.clone();
    }
    if let Some(dir) = &cli.crops_dir {
        config.crops_dir = dir.clone();
    }
    if let Some(dir) = &cli.results_dir {
        config.results_dir = dir.clone();
    }
    Ok(config)
}

fn print_batch_report(summary: &BatchSummary) {
    println!("\n===============================================");
    println!("      BATCH PROCESSING REPORT");
    println!("===============================================\n");
    println!("  Processed: {}", summary.processed);
    println!("  Errors:    {}", summary.errors);
    if summary.stopped {
        println!("  Stopped early, {} applications remaining", summary.remaining);
    }
    if let (Some(min), Some(max), Some(avg)) = (
        summary.min_seconds(),
        summary.max_seconds(),
        summary.average_seconds(),
    ) {
        println!("\nTIMING:");
        println!("  Total:   {:.1}s", summary.total_seconds);
        println!("  Average: {:.1}s/app", avg);
        println!("  Fastest: {:.1}s", min);
        println!("  Slowest: {:.1}s", max);
    }
}

fn print_verification_report(summary: &VerificationSummary) {
    println!("\n===============================================");
    println!("      CROP VERIFICATION REPORT");
    println!("===============================================\n");
    println!("  Fields scored:  {}", summary.scored);
    println!("  Good matches:   {}", summary.good);
    println!("  Low matches:    {}", summary.scored - summary.good);
    println!("  Without crop:   {}", summary.no_crop);
}

fn run(cli: Cli) -> Result<(), LabelError> {
    let config = load_config(&cli)?;
    let extractor = ResponseFileExtractor::new(config.responses_dir.clone());
    let recognizer = TesseractRecognizer::new(config.tessdata_dir.clone(), config.ocr_language.clone());
    let mut runner = BatchRunner::new(config, extractor, recognizer);

    match cli.command {
        Command::Process {
            limit,
            application_id,
        } => {
            let summary = runner.run_process(limit, application_id.as_deref())?;
            print_batch_report(&summary);
        }
        Command::Verify => {
            let summary = runner.run_verify()?;
            print_verification_report(&summary);
        }
        Command::Clear => {
            let summary = runner.clear()?;
            println!(
                "Cleared {} applications, {} fields, {} crops",
                summary.apps_reset, summary.fields_cleared, summary.images_deleted
            );
        }
    }
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(err) = run(Cli::parse()) {
        eprintln!("Error: {}", err);
        std::process::exit(1);
    }
}
