use image::{DynamicImage, Rgb, RgbImage, Rgba, RgbaImage};
use imageproc::geometric_transformations::{warp_into, Interpolation, Projection};
use log::{debug, warn};
use std::fs;
use std::path::Path;

use crate::models::{CropArtifact, NormalizedBoundingBox};
use crate::utils::CropError;

pub const DEFAULT_PADDING_PX: i32 = 8;

/// Rotations above this get extra padding so corners survive.
const PAD_ROTATION_THRESHOLD: f64 = 1.0;
/// Rotations above this are actually applied to the pixels.
const APPLY_ROTATION_THRESHOLD: f64 = 0.5;
const ROTATION_PAD_FACTOR: f64 = 0.3;
/// Percent of the histogram clipped at each end before stretching.
const AUTOCONTRAST_CUTOFF_PERCENT: u64 = 1;

/// Source-image rectangle a crop was cut from, always inside the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone)]
pub struct NormalizedCrop {
    pub image: RgbImage,
    pub source_rect: PixelRect,
}

/// CropNormalizer produces padded, upright, contrast-adjusted field crops.
pub struct CropNormalizer;

impl CropNormalizer {
    /// Crop `source` around `bbox` and write the result to `output`.
    pub fn crop_to_file(
        source: &Path,
        bbox: &NormalizedBoundingBox,
        padding_px: i32,
        output: &Path,
    ) -> Result<CropArtifact, CropError> {
        if !source.exists() {
            return Err(CropError::MissingSource(source.display().to_string()));
        }
        let image = image::open(source)?;
        let crop = Self::crop(&image, bbox, padding_px)?;

        if let Some(parent) = output.parent() {
            fs::create_dir_all(parent)?;
        }
        crop.image.save(output)?;
        debug!(
            "Saved crop {:?} ({}x{}) from {:?}",
            output,
            crop.image.width(),
            crop.image.height(),
            crop.source_rect
        );

        Ok(CropArtifact {
            path: output.to_path_buf(),
            bbox: *bbox,
        })
    }

    pub fn crop(image: &DynamicImage, bbox: &NormalizedBoundingBox, padding_px: i32) -> Result<NormalizedCrop, CropError> {
        let rect = Self::padded_rect(image.width(), image.height(), bbox, padding_px)?;
        let mut pixels = image.crop_imm(rect.x, rect.y, rect.width, rect.height).to_rgba8();

        let rotation = bbox.rotation_degrees;
        if rotation.abs() > APPLY_ROTATION_THRESHOLD {
            pixels = Self::rotate_expanded(&pixels, -rotation);
        }

        // Rotation leaves transparent corners; source alpha is flattened the same way
        let flat = Self::flatten_onto_white(&pixels);

        let enhanced = match Self::autocontrast(&flat, AUTOCONTRAST_CUTOFF_PERCENT) {
            Some(stretched) => Self::blend_half(&flat, &stretched),
            None => {
                debug!("Skipping contrast enhancement for flat crop");
                flat
            }
        };

        Ok(NormalizedCrop {
            image: enhanced,
            source_rect: rect,
        })
    }

    /// Padded rectangle clamped to the image bounds.
    pub fn padded_rect(
        image_width: u32,
        image_height: u32,
        bbox: &NormalizedBoundingBox,
        padding_px: i32,
    ) -> Result<PixelRect, CropError> {
        let mut pad = padding_px as i64;
        let rotation = bbox.rotation_degrees;
        if rotation.abs() > PAD_ROTATION_THRESHOLD {
            let longest = bbox.w.max(bbox.h) as f64;
            pad += (longest * rotation.to_radians().sin().abs() * ROTATION_PAD_FACTOR) as i64;
        }

        let (x, y, w, h) = (bbox.x as i64, bbox.y as i64, bbox.w as i64, bbox.h as i64);
        let x1 = (x - pad).max(0);
        let y1 = (y - pad).max(0);
        let x2 = (x + w + pad).min(image_width as i64);
        let y2 = (y + h + pad).min(image_height as i64);

        let (width, height) = (x2 - x1, y2 - y1);
        if width <= 0 || height <= 0 {
            warn!("Degenerate crop region {}x{} for bbox {:?}", width, height, bbox.to_array());
            return Err(CropError::DegenerateRegion { width, height });
        }

        Ok(PixelRect {
            x: x1 as u32,
            y: y1 as u32,
            width: width as u32,
            height: height as u32,
        })
    }

    /// Rotate by `degrees` (image coordinates, positive is clockwise) on a
    /// canvas grown to hold the whole result. Uncovered pixels stay transparent.
    fn rotate_expanded(image: &RgbaImage, degrees: f64) -> RgbaImage {
        let (w, h) = (image.width() as f64, image.height() as f64);
        let theta = degrees.to_radians();
        let (sin, cos) = (theta.sin().abs(), theta.cos().abs());

        // Subtract a hair so 90 degree turns don't pick up a pixel from float noise
        let out_w = ((w * cos + h * sin) - 1e-6).ceil().max(1.0);
        let out_h = ((w * sin + h * cos) - 1e-6).ceil().max(1.0);

        let projection = Projection::translate(((out_w - 1.0) / 2.0) as f32, ((out_h - 1.0) / 2.0) as f32)
            * Projection::rotate(theta as f32)
            * Projection::translate((-(w - 1.0) / 2.0) as f32, (-(h - 1.0) / 2.0) as f32);

        let mut out = RgbaImage::new(out_w as u32, out_h as u32);
        warp_into(image, &projection, Interpolation::Bicubic, Rgba([0, 0, 0, 0]), &mut out);
        out
    }

    fn flatten_onto_white(image: &RgbaImage) -> RgbImage {
        RgbImage::from_fn(image.width(), image.height(), |x, y| {
            let Rgba([r, g, b, a]) = *image.get_pixel(x, y);
            let alpha = a as u32;
            let over_white = |c: u8| ((c as u32 * alpha + 255 * (255 - alpha) + 127) / 255) as u8;
            Rgb([over_white(r), over_white(g), over_white(b)])
        })
    }

    /// Per-channel histogram stretch after clipping `cutoff_percent` of pixels
    /// at each end. `None` when no channel has any range left to stretch.
    fn autocontrast(image: &RgbImage, cutoff_percent: u64) -> Option<RgbImage> {
        let mut luts: [[u8; 256]; 3] = [[0; 256]; 3];
        let mut any_stretch = false;

        for (channel, lut) in luts.iter_mut().enumerate() {
            let mut histogram = [0u64; 256];
            for pixel in image.pixels() {
                histogram[pixel[channel] as usize] += 1;
            }
            let total: u64 = histogram.iter().sum();
            let cut = total * cutoff_percent / 100;
            Self::clip_tail(&mut histogram, cut, false);
            Self::clip_tail(&mut histogram, cut, true);

            let lo = histogram.iter().position(|&count| count > 0);
            let hi = histogram.iter().rposition(|&count| count > 0);
            match (lo, hi) {
                (Some(lo), Some(hi)) if hi > lo => {
                    any_stretch = true;
                    let span = (hi - lo) as f64;
                    for (i, entry) in lut.iter_mut().enumerate() {
                        *entry = ((i as f64 - lo as f64) * 255.0 / span).clamp(0.0, 255.0) as u8;
                    }
                }
                _ => {
                    for (i, entry) in lut.iter_mut().enumerate() {
                        *entry = i as u8;
                    }
                }
            }
        }

        if !any_stretch {
            return None;
        }

        let mut stretched = image.clone();
        for pixel in stretched.pixels_mut() {
            for channel in 0..3 {
                pixel[channel] = luts[channel][pixel[channel] as usize];
            }
        }
        Some(stretched)
    }

    fn clip_tail(histogram: &mut [u64; 256], mut cut: u64, from_top: bool) {
        for step in 0..256 {
            if cut == 0 {
                break;
            }
            let i = if from_top { 255 - step } else { step };
            let taken = histogram[i].min(cut);
            histogram[i] -= taken;
            cut -= taken;
        }
    }

    fn blend_half(a: &RgbImage, b: &RgbImage) -> RgbImage {
        RgbImage::from_fn(a.width(), a.height(), |x, y| {
            let (pa, pb) = (a.get_pixel(x, y), b.get_pixel(x, y));
            let mix = |i: usize| ((pa[i] as u16 + pb[i] as u16 + 1) / 2) as u8;
            Rgb([mix(0), mix(1), mix(2)])
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bbox(x: i32, y: i32, w: i32, h: i32, rotation_degrees: f64) -> NormalizedBoundingBox {
        NormalizedBoundingBox {
            x,
            y,
            w,
            h,
            rotation_degrees,
        }
    }

    fn white(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([255, 255, 255])))
    }

    #[test]
    fn test_padding_applied() {
        let rect = CropNormalizer::padded_rect(200, 100, &bbox(50, 40, 40, 20, 0.0), 8).unwrap();
        assert_eq!(rect, PixelRect { x: 42, y: 32, width: 56, height: 36 });
    }

    #[test]
    fn test_padding_clamped_to_image() {
        let rect = CropNormalizer::padded_rect(100, 50, &bbox(2, 3, 96, 45, 0.0), 8).unwrap();
        assert_eq!(rect, PixelRect { x: 0, y: 0, width: 100, height: 50 });
    }

    #[test]
    fn test_rotation_adds_padding() {
        // 8 + 100 * sin(90) * 0.3
        let rect = CropNormalizer::padded_rect(1000, 1000, &bbox(500, 500, 20, 100, 90.0), 8).unwrap();
        assert_eq!(rect, PixelRect { x: 462, y: 462, width: 96, height: 176 });
    }

    #[test]
    fn test_rect_never_leaves_image() {
        let (iw, ih) = (120u32, 80u32);
        for x in [-50, -5, 0, 30, 110, 119] {
            for y in [-20, 0, 40, 79] {
                for (w, h) in [(1, 1), (30, 10), (200, 200)] {
                    for rotation in [0.0, 90.0, -90.0] {
                        if let Ok(rect) = CropNormalizer::padded_rect(iw, ih, &bbox(x, y, w, h, rotation), 8) {
                            assert!(rect.width > 0 && rect.height > 0);
                            assert!(rect.x + rect.width <= iw);
                            assert!(rect.y + rect.height <= ih);
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_degenerate_region_fails() {
        let result = CropNormalizer::padded_rect(100, 100, &bbox(300, 300, 10, 10, 0.0), 8);
        assert!(matches!(result, Err(CropError::DegenerateRegion { .. })));
    }

    #[test]
    fn test_crop_dimensions_unrotated() {
        let crop = CropNormalizer::crop(&white(200, 100), &bbox(50, 40, 40, 20, 0.0), 8).unwrap();
        assert_eq!(crop.image.dimensions(), (56, 36));
    }

    #[test]
    fn test_flat_crop_skips_enhancement() {
        let crop = CropNormalizer::crop(&white(60, 60), &bbox(10, 10, 20, 20, 0.0), 4).unwrap();
        assert!(crop.image.pixels().all(|p| *p == Rgb([255, 255, 255])));
    }

    #[test]
    fn test_vertical_text_turned_upright() {
        // Tall strip whose top third is red; text reading downward (+90)
        let strip = RgbImage::from_fn(20, 60, |_, y| {
            if y < 20 {
                Rgb([255, 0, 0])
            } else {
                Rgb([255, 255, 255])
            }
        });
        let image = DynamicImage::ImageRgb8(strip);
        let crop = CropNormalizer::crop(&image, &bbox(0, 0, 20, 60, 90.0), 8).unwrap();

        assert_eq!(crop.image.dimensions(), (60, 20));
        // The top of the strip ends up on the left
        let left = crop.image.get_pixel(5, 10);
        let right = crop.image.get_pixel(54, 10);
        assert!(left[0] > 200 && left[2] < 60, "left pixel {:?}", left);
        assert!(right[2] > 200, "right pixel {:?}", right);
    }

    #[test]
    fn test_transparency_flattened_to_white() {
        let clear = RgbaImage::from_pixel(30, 30, Rgba([0, 0, 0, 0]));
        let crop = CropNormalizer::crop(&DynamicImage::ImageRgba8(clear), &bbox(5, 5, 10, 10, 0.0), 2).unwrap();
        assert!(crop.image.pixels().all(|p| *p == Rgb([255, 255, 255])));
    }

    #[test]
    fn test_autocontrast_stretches_low_contrast() {
        let dull = RgbImage::from_fn(10, 10, |x, _| if x < 5 { Rgb([100, 100, 100]) } else { Rgb([150, 150, 150]) });
        let stretched = CropNormalizer::autocontrast(&dull, 1).unwrap();
        assert_eq!(*stretched.get_pixel(0, 0), Rgb([0, 0, 0]));
        assert_eq!(*stretched.get_pixel(9, 0), Rgb([255, 255, 255]));

        let blended = CropNormalizer::blend_half(&dull, &stretched);
        assert_eq!(*blended.get_pixel(0, 0), Rgb([50, 50, 50]));
        assert_eq!(*blended.get_pixel(9, 0), Rgb([203, 203, 203]));
    }

    #[test]
    fn test_missing_source_fails() {
        let result = CropNormalizer::crop_to_file(
            Path::new("/nonexistent/label.png"),
            &bbox(0, 0, 10, 10, 0.0),
            8,
            Path::new("/tmp/never-written.png"),
        );
        assert!(matches!(result, Err(CropError::MissingSource(_))));
    }
}
