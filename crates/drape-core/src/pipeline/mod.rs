//! Image pipeline components.
//!
//! This module contains the stages of a batch call:
//! - **validate**: Cheap payload checks before decoding
//! - **decode**: Base64 payloads to RGB images, with limits and timeout
//! - **orchestrator**: Decode, encode and extract for a whole batch
//! - **discovery**: Find image files on disk for local batches

pub mod decode;
pub mod discovery;
pub mod orchestrator;
pub mod validate;

// Re-exports for convenient access
pub use decode::{DecodedImage, ImageDecoder};
pub use discovery::{DiscoveredFile, FileDiscovery};
pub use orchestrator::BatchAnalyzer;
pub use validate::Validator;
