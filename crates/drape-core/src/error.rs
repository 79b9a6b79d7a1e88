//! Error types for the Drape attribute extraction pipeline.
//!
//! Errors are organized by stage so a failure can be reported against the
//! item (or the batch) it belongs to, with the relevant context attached.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for Drape operations.
#[derive(Error, Debug)]
pub enum DrapeError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Pipeline processing errors
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// General I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read the config file from disk
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse TOML configuration
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Configuration values are invalid
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Pipeline processing errors, organized by stage.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Payload could not be turned into an image
    #[error("Decode error for {id}: {message}")]
    Decode { id: String, message: String },

    /// Decoded payload exceeds the size limit
    #[error("Payload too large for {id}: {size_kb}KB > {max_kb}KB")]
    PayloadTooLarge { id: String, size_kb: u64, max_kb: u64 },

    /// Image dimensions exceed limit
    #[error("Image too large for {id}: {width}x{height} > {max_dim}")]
    ImageTooLarge {
        id: String,
        width: u32,
        height: u32,
        max_dim: u32,
    },

    /// Bytes do not match any supported image signature
    #[error("Unsupported format for {id}: {format}")]
    UnsupportedFormat { id: String, format: String },

    /// Operation timed out
    #[error("Timeout in {stage} stage for {id} after {timeout_ms}ms")]
    Timeout {
        id: String,
        stage: String,
        timeout_ms: u64,
    },

    /// Model loading or encoder inference failed
    #[error("Model error: {message}")]
    Model { message: String },

    /// A classification call could not produce scores
    #[error("Classification failed: {message}")]
    Classification { message: String },

    /// Batch request carried no images
    #[error("No images provided")]
    EmptyBatch,

    /// File not found
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    /// File exists but could not be read
    #[error("Cannot read {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Convenience type alias for Drape results.
pub type Result<T> = std::result::Result<T, DrapeError>;

/// Convenience type alias for pipeline-specific results.
pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
