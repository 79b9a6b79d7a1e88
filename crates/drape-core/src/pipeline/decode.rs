//! Image decoding with format detection, validation, and timeout support.
//!
//! Payloads arrive as base64 text from untrusted callers. Every failure here
//! is an item-level error: the decoder never panics and never fails a batch.

use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD};
use base64::Engine as _;
use image::{ImageFormat, RgbImage};
use std::io::Cursor;
use std::time::Duration;
use tokio::time::timeout;

use super::validate::Validator;
use crate::config::LimitsConfig;
use crate::error::PipelineError;

/// Image decoder with configurable limits and timeout.
#[derive(Clone)]
pub struct ImageDecoder {
    limits: LimitsConfig,
}

/// Result of decoding an image.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    /// Pixels forced to 3-channel RGB
    pub image: RgbImage,
    /// Format detected from the bytes
    pub format: ImageFormat,
    /// Image width in pixels
    pub width: u32,
    /// Image height in pixels
    pub height: u32,
    /// Size of the decoded payload in bytes
    pub byte_len: usize,
}

impl ImageDecoder {
    /// Create a new decoder with the given limits.
    pub fn new(limits: LimitsConfig) -> Self {
        Self { limits }
    }

    /// Decode a base64 payload on the blocking pool under the decode timeout.
    ///
    /// `mime_hint` is informational; the format is always detected from the bytes.
    pub async fn decode(
        &self,
        id: &str,
        payload: &str,
        mime_hint: Option<&str>,
    ) -> Result<DecodedImage, PipelineError> {
        let decoder = self.clone();
        let id_owned = id.to_string();
        let payload = payload.to_owned();

        self.run_blocking(id, mime_hint, move || {
            let bytes = decoder.payload_bytes(&id_owned, &payload)?;
            decoder.decode_bytes_sync(&id_owned, bytes)
        })
        .await
    }

    /// Decode raw image bytes on the blocking pool under the decode timeout.
    pub async fn decode_bytes(
        &self,
        id: &str,
        bytes: Vec<u8>,
        mime_hint: Option<&str>,
    ) -> Result<DecodedImage, PipelineError> {
        let decoder = self.clone();
        let id_owned = id.to_string();

        self.run_blocking(id, mime_hint, move || decoder.decode_bytes_sync(&id_owned, bytes))
            .await
    }

    async fn run_blocking<F>(
        &self,
        id: &str,
        mime_hint: Option<&str>,
        job: F,
    ) -> Result<DecodedImage, PipelineError>
    where
        F: FnOnce() -> Result<DecodedImage, PipelineError> + Send + 'static,
    {
        let timeout_duration = Duration::from_millis(self.limits.decode_timeout_ms);
        let decode_result = timeout(timeout_duration, tokio::task::spawn_blocking(job)).await;

        let decoded = match decode_result {
            Ok(Ok(result)) => result?,
            Ok(Err(e)) => {
                return Err(PipelineError::Decode {
                    id: id.to_string(),
                    message: format!("Task join error: {}", e),
                })
            }
            Err(_) => {
                return Err(PipelineError::Timeout {
                    id: id.to_string(),
                    stage: "decode".to_string(),
                    timeout_ms: self.limits.decode_timeout_ms,
                })
            }
        };

        if let Some(hint) = mime_hint {
            let declared = ImageFormat::from_mime_type(hint);
            if declared != Some(decoded.format) {
                tracing::debug!(
                    "{}: declared MIME type {:?} but detected {}",
                    id,
                    hint,
                    format_to_string(decoded.format)
                );
            }
        }

        Ok(decoded)
    }

    /// Base64 text to bytes, rejecting oversized payloads before decoding them.
    pub fn payload_bytes(&self, id: &str, payload: &str) -> Result<Vec<u8>, PipelineError> {
        let decode_err = |message: String| PipelineError::Decode {
            id: id.to_string(),
            message,
        };

        let compact = compact_payload(payload).map_err(decode_err)?;
        // Lower bound on the decoded length: 3 bytes per full 4-char group.
        Validator::new(self.limits.clone()).check_size(id, (compact.len() / 4 * 3) as u64)?;
        decode_compact(&compact).map_err(decode_err)
    }

    /// Synchronous decode from bytes (runs in spawn_blocking).
    pub fn decode_bytes_sync(&self, id: &str, bytes: Vec<u8>) -> Result<DecodedImage, PipelineError> {
        Validator::new(self.limits.clone()).validate(id, &bytes)?;

        let decode_err = |message: String| PipelineError::Decode {
            id: id.to_string(),
            message,
        };

        // Read the header first so oversized images are rejected before allocation.
        let (width, height) = image::ImageReader::new(Cursor::new(bytes.as_slice()))
            .with_guessed_format()
            .map_err(|e| decode_err(format!("Cannot detect image format: {}", e)))?
            .into_dimensions()
            .map_err(|e| decode_err(e.to_string()))?;

        let max_dim = self.limits.max_image_dimension;
        if width > max_dim || height > max_dim {
            return Err(PipelineError::ImageTooLarge {
                id: id.to_string(),
                width,
                height,
                max_dim,
            });
        }

        let byte_len = bytes.len();
        let reader = image::ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| decode_err(format!("Cannot detect image format: {}", e)))?;
        let format = reader.format().ok_or_else(|| PipelineError::UnsupportedFormat {
            id: id.to_string(),
            format: "unknown".to_string(),
        })?;
        let image = reader
            .decode()
            .map_err(|e| decode_err(e.to_string()))?
            .into_rgb8();

        Ok(DecodedImage {
            width: image.width(),
            height: image.height(),
            image,
            format,
            byte_len,
        })
    }
}

/// Turn base64 text (optionally a `data:` URL) into raw bytes.
pub fn decode_payload(payload: &str) -> Result<Vec<u8>, String> {
    decode_compact(&compact_payload(payload)?)
}

/// Strip a `data:` URL prefix and all whitespace.
fn compact_payload(payload: &str) -> Result<String, String> {
    let body = match payload.trim().strip_prefix("data:") {
        Some(rest) => rest
            .split_once(',')
            .map(|(_, data)| data)
            .ok_or_else(|| "Malformed data URL".to_string())?,
        None => payload,
    };

    let compact: String = body.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    if compact.is_empty() {
        return Err("Empty image payload".to_string());
    }
    Ok(compact)
}

fn decode_compact(compact: &str) -> Result<Vec<u8>, String> {
    STANDARD
        .decode(compact)
        .or_else(|_| STANDARD_NO_PAD.decode(compact))
        .map_err(|e| format!("Invalid base64: {}", e))
}

/// Convert an ImageFormat to a string representation.
pub fn format_to_string(format: ImageFormat) -> String {
    match format {
        ImageFormat::Jpeg => "jpeg".to_string(),
        ImageFormat::Png => "png".to_string(),
        ImageFormat::WebP => "webp".to_string(),
        ImageFormat::Gif => "gif".to_string(),
        ImageFormat::Tiff => "tiff".to_string(),
        ImageFormat::Bmp => "bmp".to_string(),
        ImageFormat::Avif => "avif".to_string(),
        _ => "unknown".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{encode_image, png_base64, slow_png_base64};
    use image::{DynamicImage, GrayImage, Luma, Rgba, RgbaImage};

    fn decoder() -> ImageDecoder {
        ImageDecoder::new(LimitsConfig::default())
    }

    #[tokio::test]
    async fn test_decode_png_payload() {
        let decoded = decoder()
            .decode("a", &png_base64([200, 10, 10], 8, 6), Some("image/png"))
            .await
            .unwrap();
        assert_eq!(decoded.format, ImageFormat::Png);
        assert_eq!((decoded.width, decoded.height), (8, 6));
        assert_eq!(decoded.image.get_pixel(0, 0).0, [200, 10, 10]);
    }

    #[tokio::test]
    async fn test_decode_accepts_data_url_and_whitespace() {
        let body = png_base64([0, 0, 255], 4, 4);
        let (head, tail) = body.split_at(10);
        let payload = format!("  data:image/png;base64,{head}\n{tail}\n");

        let decoded = decoder().decode("a", &payload, None).await.unwrap();
        assert_eq!(decoded.image.get_pixel(3, 3).0, [0, 0, 255]);
    }

    #[test]
    fn test_decode_payload_accepts_unpadded() {
        let padded = STANDARD.encode(b"ab");
        assert!(padded.ends_with('='));
        let unpadded = padded.trim_end_matches('=');
        assert_eq!(decode_payload(unpadded).unwrap(), b"ab");
    }

    #[test]
    fn test_decode_payload_rejects_garbage() {
        assert!(decode_payload("!!!not base64!!!").unwrap_err().contains("Invalid base64"));
        assert_eq!(decode_payload("   ").unwrap_err(), "Empty image payload");
        assert_eq!(decode_payload("data:image/png;base64").unwrap_err(), "Malformed data URL");
    }

    #[tokio::test]
    async fn test_grayscale_and_alpha_become_rgb() {
        let gray = DynamicImage::ImageLuma8(GrayImage::from_pixel(3, 3, Luma([90])));
        let decoded = decoder()
            .decode_bytes("g", encode_image(&gray, ImageFormat::Png), None)
            .await
            .unwrap();
        assert_eq!(decoded.image.get_pixel(1, 1).0, [90, 90, 90]);

        let rgba = DynamicImage::ImageRgba8(RgbaImage::from_pixel(3, 3, Rgba([10, 20, 30, 0])));
        let decoded = decoder()
            .decode_bytes("r", encode_image(&rgba, ImageFormat::Png), None)
            .await
            .unwrap();
        assert_eq!(decoded.image.get_pixel(0, 0).0, [10, 20, 30]);
    }

    #[tokio::test]
    async fn test_format_detected_by_content_not_hint() {
        let decoded = decoder()
            .decode("a", &png_base64([1, 2, 3], 2, 2), Some("image/jpeg"))
            .await
            .unwrap();
        assert_eq!(decoded.format, ImageFormat::Png);
    }

    #[tokio::test]
    async fn test_truncated_image_is_decode_error() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(32, 32, image::Rgb([5, 5, 5])));
        let mut bytes = encode_image(&img, ImageFormat::Png);
        bytes.truncate(bytes.len() / 2);

        let err = decoder().decode_bytes("t", bytes, None).await.unwrap_err();
        assert!(matches!(err, PipelineError::Decode { ref id, .. } if id == "t"));
    }

    #[tokio::test]
    async fn test_dimension_limit() {
        let limits = LimitsConfig {
            max_image_dimension: 16,
            ..LimitsConfig::default()
        };
        let err = ImageDecoder::new(limits)
            .decode("wide", &png_base64([0, 0, 0], 17, 4), None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::ImageTooLarge {
                width: 17,
                max_dim: 16,
                ..
            }
        ));
    }

    #[test]
    fn test_oversized_base64_rejected_before_decoding() {
        let limits = LimitsConfig {
            max_payload_mb: 1,
            ..LimitsConfig::default()
        };
        // Not valid base64 either: the size check must fire first
        let payload = "!".repeat(2 * 1024 * 1024);
        let err = ImageDecoder::new(limits).payload_bytes("big", &payload).unwrap_err();
        assert!(matches!(err, PipelineError::PayloadTooLarge { ref id, max_kb: 1024, .. } if id == "big"));
    }

    #[tokio::test]
    async fn test_oversized_payload_is_item_error() {
        let limits = LimitsConfig {
            max_payload_mb: 1,
            ..LimitsConfig::default()
        };
        let payload = STANDARD.encode(vec![0u8; 1024 * 1024 + 4096]);
        let err = ImageDecoder::new(limits).decode("big", &payload, None).await.unwrap_err();
        assert!(matches!(err, PipelineError::PayloadTooLarge { .. }));
    }

    #[tokio::test]
    async fn test_decode_timeout_is_item_error() {
        let limits = LimitsConfig {
            decode_timeout_ms: 1,
            ..LimitsConfig::default()
        };
        let payload = slow_png_base64();
        let err = ImageDecoder::new(limits).decode("slow", &payload, None).await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Timeout { ref id, ref stage, timeout_ms: 1 } if id == "slow" && stage == "decode"
        ));
    }

    #[tokio::test]
    async fn test_text_payload_is_unsupported() {
        let payload = STANDARD.encode(b"just some text, not pixels");
        let err = decoder().decode("txt", &payload, None).await.unwrap_err();
        assert!(matches!(err, PipelineError::UnsupportedFormat { .. }));
    }

    #[test]
    fn test_format_to_string() {
        assert_eq!(format_to_string(ImageFormat::Jpeg), "jpeg");
        assert_eq!(format_to_string(ImageFormat::Png), "png");
        assert_eq!(format_to_string(ImageFormat::WebP), "webp");
    }
}
