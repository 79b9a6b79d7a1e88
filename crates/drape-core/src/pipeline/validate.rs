//! Payload validation before decoding.

use crate::config::LimitsConfig;
use crate::error::PipelineError;

/// Container families recognized from the leading bytes of a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signature {
    Jpeg,
    Png,
    Gif,
    WebP,
    Bmp,
    Tiff,
    /// `ftyp` box: HEIC, HEIF or AVIF
    IsoBmff,
}

/// Checks decoded payload bytes before they reach the image decoder.
pub struct Validator {
    limits: LimitsConfig,
}

impl Validator {
    /// Create a new validator with the given limits.
    pub fn new(limits: LimitsConfig) -> Self {
        Self { limits }
    }

    /// Perform quick validation before full decode.
    ///
    /// Checks:
    /// - Payload is not empty
    /// - Payload size is within limits
    /// - Payload starts with known image magic bytes
    pub fn validate(&self, id: &str, bytes: &[u8]) -> Result<Signature, PipelineError> {
        if bytes.is_empty() {
            return Err(PipelineError::Decode {
                id: id.to_string(),
                message: "Empty image payload".to_string(),
            });
        }

        self.check_size(id, bytes.len() as u64)?;

        sniff(bytes).ok_or_else(|| PipelineError::UnsupportedFormat {
            id: id.to_string(),
            format: "Unrecognized image format".to_string(),
        })
    }

    /// Payload size limit in bytes.
    pub fn max_bytes(&self) -> u64 {
        self.limits.max_payload_mb.saturating_mul(1024 * 1024)
    }

    /// Reject a payload of `len` bytes if it exceeds the size limit.
    pub fn check_size(&self, id: &str, len: u64) -> Result<(), PipelineError> {
        let max_bytes = self.max_bytes();
        if len > max_bytes {
            return Err(PipelineError::PayloadTooLarge {
                id: id.to_string(),
                size_kb: len / 1024,
                max_kb: max_bytes / 1024,
            });
        }
        Ok(())
    }
}

/// Match the header bytes against known image signatures.
pub fn sniff(header: &[u8]) -> Option<Signature> {
    if header.len() < 2 {
        return None;
    }

    // JPEG: FF D8 FF
    if header.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return Some(Signature::Jpeg);
    }

    // PNG: 89 50 4E 47
    if header.starts_with(&[0x89, b'P', b'N', b'G']) {
        return Some(Signature::Png);
    }

    // GIF: GIF8
    if header.starts_with(b"GIF8") {
        return Some(Signature::Gif);
    }

    // WebP: RIFF....WEBP
    if header.starts_with(b"RIFF") && header.len() >= 12 && &header[8..12] == b"WEBP" {
        return Some(Signature::WebP);
    }

    // BMP: BM
    if header.starts_with(b"BM") {
        return Some(Signature::Bmp);
    }

    // TIFF: II (little-endian) or MM (big-endian) followed by version 42
    if header.starts_with(&[b'I', b'I', 0x2A, 0x00]) || header.starts_with(&[b'M', b'M', 0x00, 0x2A])
    {
        return Some(Signature::Tiff);
    }

    if header.len() >= 12 && &header[4..8] == b"ftyp" {
        return Some(Signature::IsoBmff);
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_magic_bytes_jpeg() {
        let header = [0xFF, 0xD8, 0xFF, 0xE0, 0, 0, 0, 0, 0, 0, 0, 0];
        assert_eq!(sniff(&header), Some(Signature::Jpeg));
    }

    #[test]
    fn test_magic_bytes_png() {
        let header = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];
        assert_eq!(sniff(&header), Some(Signature::Png));
    }

    #[test]
    fn test_magic_bytes_webp() {
        let header = [b'R', b'I', b'F', b'F', 0, 0, 0, 0, b'W', b'E', b'B', b'P'];
        assert_eq!(sniff(&header), Some(Signature::WebP));
    }

    #[test]
    fn test_riff_without_webp_rejected() {
        let header = [b'R', b'I', b'F', b'F', 0, 0, 0, 0, b'W', b'A', b'V', b'E'];
        assert_eq!(sniff(&header), None);
    }

    #[test]
    fn test_magic_bytes_tiff() {
        assert_eq!(sniff(&[b'I', b'I', 0x2A, 0x00]), Some(Signature::Tiff));
        assert_eq!(sniff(&[b'M', b'M', 0x00, 0x2A]), Some(Signature::Tiff));
        // Bare byte-order marks without the version are not TIFF
        assert_eq!(sniff(&[b'I', b'I', 0x00, 0x00]), None);
    }

    #[test]
    fn test_magic_bytes_invalid() {
        assert_eq!(sniff(b"hello world!"), None);
        assert_eq!(sniff(&[0xFF]), None);
    }

    #[test]
    fn test_validate_rejects_empty_payload() {
        let validator = Validator::new(LimitsConfig::default());
        let err = validator.validate("image_0", &[]).unwrap_err();
        assert!(err.to_string().contains("Empty image payload"));
    }

    #[test]
    fn test_validate_rejects_oversized_payload() {
        let limits = LimitsConfig {
            max_payload_mb: 1,
            ..LimitsConfig::default()
        };
        let validator = Validator::new(limits);
        let mut bytes = vec![0u8; 1024 * 1024 + 1];
        bytes[..3].copy_from_slice(&[0xFF, 0xD8, 0xFF]);

        let err = validator.validate("big", &bytes).unwrap_err();
        assert!(matches!(err, PipelineError::PayloadTooLarge { max_kb: 1024, .. }));
    }

    #[test]
    fn test_huge_payload_limit_saturates() {
        let limits = LimitsConfig {
            max_payload_mb: 18_000_000_000_000,
            ..LimitsConfig::default()
        };
        let validator = Validator::new(limits);
        assert_eq!(validator.max_bytes(), u64::MAX);
        assert!(validator.check_size("x", 5 * 1024 * 1024).is_ok());
    }

    #[test]
    fn test_validate_rejects_unknown_signature() {
        let validator = Validator::new(LimitsConfig::default());
        let err = validator.validate("x", b"not an image at all").unwrap_err();
        assert!(err.to_string().contains("Unrecognized image format"));
    }
}
