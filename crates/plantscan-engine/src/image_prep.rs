use std::path::Path;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageError, ImageReader, Rgb, RgbImage};
use plantscan_contracts::analysis::AnalysisError;

pub const MAX_DIMENSION: u32 = 600;
pub const JPEG_QUALITY: u8 = 85;
pub const PAYLOAD_MIME: &str = "image/jpeg";

/// Encoded image ready to ship inline with an analysis request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub width: u32,
    pub height: u32,
}

impl ImagePayload {
    pub fn base64(&self) -> String {
        BASE64.encode(&self.bytes)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizeOptions {
    pub max_dimension: u32,
    pub quality: u8,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            max_dimension: MAX_DIMENSION,
            quality: JPEG_QUALITY,
        }
    }
}

pub fn normalize(path: &Path) -> Result<ImagePayload, AnalysisError> {
    normalize_with(path, NormalizeOptions::default())
}

/// Loads `path`, flattens transparency (alpha channels and palette `tRNS`
/// entries) onto white, shrinks it to fit the bounding box and re-encodes it
/// as JPEG.
pub fn normalize_with(path: &Path, options: NormalizeOptions) -> Result<ImagePayload, AnalysisError> {
    // Format comes from the file contents; the extension is only a fallback.
    let image = ImageReader::open(path)
        .and_then(|reader| reader.with_guessed_format())
        .map_err(|err| encoding_error(path, ImageError::IoError(err)))?
        .decode()
        .map_err(|err| encoding_error(path, err))?;
    let flattened = flatten_onto_white(&image);
    let (width, height) = fit_within(
        flattened.width(),
        flattened.height(),
        options.max_dimension,
    );
    let resized = if (width, height) == flattened.dimensions() {
        flattened
    } else {
        image::imageops::resize(&flattened, width, height, FilterType::Lanczos3)
    };

    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, options.quality.clamp(1, 100))
        .encode_image(&resized)
        .map_err(|err| encoding_error(path, err))?;
    Ok(ImagePayload {
        bytes,
        mime_type: PAYLOAD_MIME.to_string(),
        width,
        height,
    })
}

/// Largest size with the same aspect ratio that fits `max_dimension` on both
/// axes. Images already inside the box keep their size.
pub fn fit_within(width: u32, height: u32, max_dimension: u32) -> (u32, u32) {
    let bound = max_dimension.max(1);
    if width <= bound && height <= bound {
        return (width, height);
    }
    let scale = f64::from(bound) / f64::from(width.max(height));
    let scaled = |side: u32| ((f64::from(side) * scale).round() as u32).clamp(1, bound);
    (scaled(width), scaled(height))
}

fn flatten_onto_white(image: &DynamicImage) -> RgbImage {
    if !image.color().has_alpha() {
        return image.to_rgb8();
    }
    let rgba = image.to_rgba8();
    let mut flattened = RgbImage::new(rgba.width(), rgba.height());
    for (x, y, pixel) in rgba.enumerate_pixels() {
        let alpha = u16::from(pixel[3]);
        let blend = |channel: u8| -> u8 {
            (((u16::from(channel) * alpha) + (255 * (255 - alpha))) / 255) as u8
        };
        flattened.put_pixel(x, y, Rgb([blend(pixel[0]), blend(pixel[1]), blend(pixel[2])]));
    }
    flattened
}

fn encoding_error(path: &Path, err: ImageError) -> AnalysisError {
    AnalysisError::ImageEncoding {
        path: path.display().to_string(),
        reason: err.to_string(),
    }
}
