//! Image discovery on disk, turning local files into batch items.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::ProcessingConfig;
use crate::error::PipelineError;
use crate::types::ImageItem;

/// Finds supported image files under a path.
pub struct FileDiscovery {
    config: ProcessingConfig,
}

/// A supported image file found on disk.
#[derive(Debug, Clone)]
pub struct DiscoveredFile {
    /// Full path to the file
    pub path: PathBuf,
    /// File size in bytes
    pub size: u64,
}

impl DiscoveredFile {
    /// Read the file into a batch item identified by its path.
    pub fn to_item(&self) -> Result<ImageItem, PipelineError> {
        let bytes = std::fs::read(&self.path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => PipelineError::FileNotFound(self.path.clone()),
            _ => PipelineError::FileRead {
                path: self.path.clone(),
                source: e,
            },
        })?;
        let mime_type = self
            .path
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(image::ImageFormat::from_extension)
            .map(|format| format.to_mime_type().to_string());

        Ok(ImageItem {
            data: STANDARD.encode(bytes),
            id: Some(self.path.to_string_lossy().into_owned()),
            mime_type,
        })
    }
}

impl FileDiscovery {
    pub fn new(config: ProcessingConfig) -> Self {
        Self { config }
    }

    /// Discover all supported image files at a path.
    ///
    /// A file path yields itself if supported; a directory is walked
    /// recursively. Results are sorted by path so batches are reproducible.
    pub fn discover(&self, path: &Path) -> Vec<DiscoveredFile> {
        if path.is_file() {
            return match std::fs::metadata(path) {
                Ok(meta) if self.is_supported(path) => vec![DiscoveredFile {
                    path: path.to_path_buf(),
                    size: meta.len(),
                }],
                _ => vec![],
            };
        }

        let mut files: Vec<DiscoveredFile> = WalkDir::new(path)
            .follow_links(true)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|entry| entry.file_type().is_file() && self.is_supported(entry.path()))
            .filter_map(|entry| {
                let size = entry.metadata().ok()?.len();
                Some(DiscoveredFile {
                    path: entry.into_path(),
                    size,
                })
            })
            .collect();

        files.sort_by(|a, b| a.path.cmp(&b.path));
        files
    }

    /// Check if a file has a supported extension.
    fn is_supported(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                self.config
                    .supported_formats
                    .iter()
                    .any(|fmt| fmt.eq_ignore_ascii_case(ext))
            })
            .unwrap_or(false)
    }
}
