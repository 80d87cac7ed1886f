//! Cover art sourcing, decoding and the `Cover Art` folder size rules.

use std::fs;
use std::path::{Path, PathBuf};

use image::{codecs::jpeg::JpegEncoder, imageops::FilterType, DynamicImage, GenericImageView};
use log::{debug, warn};
use zune_core::{colorspace::ColorSpace, options::DecoderOptions};
use zune_jpeg::JpegDecoder;

use crate::organize::{log_command, sanitize_file_name};

pub const COVER_ART_DIR_NAME: &str = "Cover Art";
const FALLBACK_COVER_SIZE: CoverSize = CoverSize {
    width: 1000,
    height: 1000,
};
const JPEG_QUALITY: u8 = 90;

/// Where the cover comes from, as given to `--cover-art`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoverSource {
    /// Download the provider's cover URL.
    Auto,
    File(PathBuf),
    /// Use the picture embedded in the first file.
    Extract,
}

pub fn parse_cover_source(value: &str) -> Result<CoverSource, String> {
    let trimmed = value.trim();
    if trimmed.eq_ignore_ascii_case("auto") {
        return Ok(CoverSource::Auto);
    }
    if trimmed.eq_ignore_ascii_case("extract") {
        return Ok(CoverSource::Extract);
    }
    match trimmed.split_once('=') {
        Some((key, path)) if key.trim().eq_ignore_ascii_case("file") && !path.trim().is_empty() => {
            Ok(CoverSource::File(PathBuf::from(path.trim())))
        }
        _ => Err(format!(
            "invalid cover art mode '{value}'; expected auto, extract or file=PATH"
        )),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoverSize {
    pub width: u32,
    pub height: u32,
}

/// Parses `WIDTHxHEIGHT`; anything else yields 1000x1000.
pub fn parse_cover_size(value: &str) -> CoverSize {
    let parsed = value
        .trim()
        .to_ascii_lowercase()
        .split_once('x')
        .and_then(|(width, height)| {
            Some(CoverSize {
                width: width.trim().parse().ok()?,
                height: height.trim().parse().ok()?,
            })
        })
        .filter(|size| size.width > 0 && size.height > 0);
    parsed.unwrap_or_else(|| {
        warn!(
            "Invalid cover size '{}'; using {}x{}",
            value, FALLBACK_COVER_SIZE.width, FALLBACK_COVER_SIZE.height
        );
        FALLBACK_COVER_SIZE
    })
}

/// Largest size with the same aspect ratio that fits in `max`. Never upscales.
pub fn fit_within(width: u32, height: u32, max: CoverSize) -> (u32, u32) {
    if width == 0 || height == 0 {
        return (1, 1);
    }
    if width <= max.width && height <= max.height {
        return (width, height);
    }
    let width_ratio = f64::from(max.width) / f64::from(width);
    let height_ratio = f64::from(max.height) / f64::from(height);
    let ratio = width_ratio.min(height_ratio);
    let scaled = |value: u32, limit: u32| ((f64::from(value) * ratio).round() as u32).clamp(1, limit);
    (scaled(width, max.width), scaled(height, max.height))
}

fn looks_like_jpeg(bytes: &[u8]) -> bool {
    bytes.len() >= 2 && bytes[0] == 0xff && bytes[1] == 0xd8
}

fn decode_jpeg_non_strict(bytes: &[u8]) -> Option<DynamicImage> {
    if !looks_like_jpeg(bytes) {
        return None;
    }
    let options = DecoderOptions::new_cmd()
        .set_strict_mode(false)
        .jpeg_set_out_colorspace(ColorSpace::RGB);
    let mut decoder = JpegDecoder::new_with_options(bytes, options);
    let pixels = decoder.decode().ok()?;
    let (width, height) = decoder.dimensions()?;
    let image = image::RgbImage::from_raw(width as u32, height as u32, pixels)?;
    Some(DynamicImage::ImageRgb8(image))
}

pub fn decode_image_with_fallback(bytes: &[u8]) -> Option<DynamicImage> {
    image::load_from_memory(bytes)
        .ok()
        .or_else(|| decode_jpeg_non_strict(bytes))
}

pub fn encode_jpeg(image: &DynamicImage) -> Result<Vec<u8>, String> {
    let mut encoded = Vec::new();
    JpegEncoder::new_with_quality(&mut encoded, JPEG_QUALITY)
        .encode_image(&DynamicImage::ImageRgb8(image.to_rgb8()))
        .map_err(|err| format!("failed to encode cover as JPEG: {err}"))?;
    Ok(encoded)
}

pub fn center_crop_square(image: &DynamicImage) -> DynamicImage {
    let (width, height) = image.dimensions();
    let edge = width.min(height);
    image.crop_imm((width - edge) / 2, (height - edge) / 2, edge, edge)
}

fn downscale(image: &DynamicImage, max: CoverSize) -> DynamicImage {
    let (width, height) = image.dimensions();
    let (target_width, target_height) = fit_within(width, height, max);
    if (target_width, target_height) == (width, height) {
        return image.clone();
    }
    image.resize_exact(target_width, target_height, FilterType::Lanczos3)
}

/// Applies the extract-mode options to an embedded picture and re-encodes it.
pub fn prepare_extracted_cover(
    bytes: &[u8],
    crop: bool,
    scale: bool,
    max: CoverSize,
) -> Result<Vec<u8>, String> {
    if !crop && !scale {
        return Ok(bytes.to_vec());
    }
    let mut image =
        decode_image_with_fallback(bytes).ok_or_else(|| "embedded cover is not decodable".to_string())?;
    if crop {
        image = center_crop_square(&image);
    }
    if scale {
        image = downscale(&image, max);
    }
    encode_jpeg(&image)
}

/// Reads a user-supplied cover file.
pub fn load_cover_file(path: &Path) -> Result<Vec<u8>, String> {
    fs::read(path).map_err(|err| format!("failed to read cover file {}: {}", path.display(), err))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedCover {
    pub cover_path: PathBuf,
    /// Full-size original kept alongside an oversized cover.
    pub original_path: Option<PathBuf>,
}

/// Planned file names for a cover of the given dimensions.
pub fn plan_cover_files(
    album_dir: &Path,
    album_name: &str,
    dimensions: (u32, u32),
    max: CoverSize,
    keep_resized: bool,
) -> SavedCover {
    let stem = match sanitize_file_name(album_name) {
        stem if stem.is_empty() => "Cover".to_string(),
        stem => stem,
    };
    let cover_dir = album_dir.join(COVER_ART_DIR_NAME);
    let (width, height) = dimensions;
    let oversized = width > max.width || height > max.height;
    let original_path = (oversized && keep_resized).then(|| {
        cover_dir.join(format!("{} {}kx{}k.jpg", stem, width / 1000, height / 1000))
    });
    SavedCover {
        cover_path: cover_dir.join(format!("{stem}.jpg")),
        original_path,
    }
}

/// Saves the cover to `<album_dir>/Cover Art/<album>.jpg`, downscaling it when
/// it exceeds `max` and optionally keeping the original.
pub fn save_cover_art(
    album_dir: &Path,
    album_name: &str,
    bytes: &[u8],
    max: CoverSize,
    keep_resized: bool,
    dry_run: bool,
) -> Result<SavedCover, String> {
    let image =
        decode_image_with_fallback(bytes).ok_or_else(|| "cover image is not decodable".to_string())?;
    let (width, height) = image.dimensions();
    let oversized = width > max.width || height > max.height;
    let plan = plan_cover_files(album_dir, album_name, (width, height), max, keep_resized);

    log_command(&format!("write cover '{}'", plan.cover_path.display()));
    if dry_run {
        debug!(target: "dry", "Would save cover art to {}", plan.cover_path.display());
        return Ok(plan);
    }

    let cover_dir = album_dir.join(COVER_ART_DIR_NAME);
    fs::create_dir_all(&cover_dir)
        .map_err(|err| format!("failed to create {}: {}", cover_dir.display(), err))?;

    if let Some(original_path) = &plan.original_path {
        fs::write(original_path, bytes)
            .map_err(|err| format!("failed to write {}: {}", original_path.display(), err))?;
    }
    let cover_bytes = if oversized {
        encode_jpeg(&downscale(&image, max))?
    } else {
        bytes.to_vec()
    };
    fs::write(&plan.cover_path, cover_bytes)
        .map_err(|err| format!("failed to write {}: {}", plan.cover_path.display(), err))?;
    Ok(plan)
}
