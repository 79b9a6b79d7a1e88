//! The `drape analyze` command for extracting attributes from local images.

use clap::Args;
use drape_core::pipeline::{DiscoveredFile, FileDiscovery};
use drape_core::types::DECODE_FAILURE;
use drape_core::{
    AnalyzeRequest, BatchRequest, BatchResponse, BatchStats, Config, Drape, ImageItem,
    ImageResult, OutputWriter,
};
use std::path::PathBuf;
use std::time::Instant;

use super::{load_service, open_output, resolve_format, OutputFormat};

/// Arguments for the `analyze` command.
#[derive(Args, Debug)]
pub struct AnalyzeArgs {
    /// Image file or directory to analyze
    #[arg(required = true)]
    pub input: PathBuf,

    /// Output file (defaults to stdout)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Output format (defaults to `output.format` from config)
    #[arg(short, long, value_enum)]
    pub format: Option<OutputFormat>,

    /// Images per batch call when analyzing a directory
    #[arg(long, default_value = "256")]
    pub batch_size: usize,

    /// Pretty-print JSON output
    #[arg(long)]
    pub pretty: bool,
}

/// Execute the analyze command.
pub async fn execute(args: AnalyzeArgs, config: &Config) -> anyhow::Result<()> {
    if !args.input.exists() {
        anyhow::bail!(
            "Input path does not exist: {:?}\n\n  Hint: Check the file path and try again.",
            args.input
        );
    }

    let files = FileDiscovery::new(config.processing.clone()).discover(&args.input);
    if files.is_empty() {
        tracing::warn!("No supported image files found at {:?}", args.input);
        return Ok(());
    }
    tracing::info!("Found {} image(s) to analyze", files.len());

    let drape = load_service(config).await?;
    let format = resolve_format(args.format, config);
    let pretty = args.pretty || config.output.pretty;
    let mut writer = OutputWriter::new(open_output(args.output.as_deref())?, format, pretty);

    if args.input.is_file() {
        let item = files[0].to_item()?;
        let response = drape
            .analyze_image(&AnalyzeRequest {
                image: Some(item.data),
                mime_type: item.mime_type,
            })
            .await;
        writer.write(&response)?;
    } else {
        let response = analyze_directory(&drape, files, args.batch_size.max(1)).await;
        writer.write_response(&response)?;
    }

    writer.flush()?;
    if let Some(ref path) = args.output {
        tracing::info!("Output written to {:?}", path);
    }
    Ok(())
}

/// Run discovered files through the service in pre-chunked batch calls.
async fn analyze_directory(
    drape: &Drape,
    files: Vec<DiscoveredFile>,
    batch_size: usize,
) -> BatchResponse {
    let start = Instant::now();
    let pb = create_progress_bar(files.len() as u64);
    let mut results = Vec::with_capacity(files.len());

    for chunk in files.chunks(batch_size) {
        let (items, slots) = read_chunk(chunk);

        let analyzed = if items.is_empty() {
            vec![]
        } else {
            let response = drape.analyze_batch(&BatchRequest::new(items)).await;
            if let Some(stats) = &response.stats {
                pb.set_message(format!("{} ok, {} failed", stats.successful, stats.failed));
            }
            response.results
        };
        pb.inc(chunk.len() as u64);
        results.extend(merge_read_failures(slots, analyzed));
    }

    let stats = BatchStats::from_results(&results, start.elapsed().as_secs_f64());
    pb.finish_with_message(format!(
        "{} ok, {} failed in {:.1}s",
        stats.successful, stats.failed, stats.processing_time
    ));
    tracing::info!(
        "Analyzed {} images ({:.1} img/s)",
        stats.total,
        stats.images_per_second
    );

    BatchResponse {
        error: None,
        results,
        stats: Some(stats),
    }
}

/// Read a chunk of files into batch items.
///
/// The second list has one slot per file: `None` where the file became an
/// item, or the failed result for a file that could not be read.
fn read_chunk(chunk: &[DiscoveredFile]) -> (Vec<ImageItem>, Vec<Option<ImageResult>>) {
    let mut items = Vec::with_capacity(chunk.len());
    let slots = chunk
        .iter()
        .map(|file| match file.to_item() {
            Ok(item) => {
                items.push(item);
                None
            }
            Err(e) => {
                tracing::warn!("{e}");
                Some(ImageResult::failure(
                    file.path.to_string_lossy(),
                    DECODE_FAILURE,
                    Some(e.to_string()),
                ))
            }
        })
        .collect();
    (items, slots)
}

/// Put batch results back between the read failures, in file order.
fn merge_read_failures(
    slots: Vec<Option<ImageResult>>,
    analyzed: Vec<ImageResult>,
) -> Vec<ImageResult> {
    let mut analyzed = analyzed.into_iter();
    slots
        .into_iter()
        .filter_map(|slot| slot.or_else(|| analyzed.next()))
        .collect()
}

/// Progress bar on stderr for directory runs.
fn create_progress_bar(total: u64) -> indicatif::ProgressBar {
    use indicatif::{ProgressBar, ProgressStyle};

    let pb = ProgressBar::new(total);
    let style = ProgressStyle::default_bar()
        .template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("##-");
    pb.set_style(style);
    pb.set_message("starting...");
    pb
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unreadable_file_keeps_its_slot_and_reason() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("a.png");
        std::fs::write(&good, b"png bytes").unwrap();
        let folder = dir.path().join("b.png");
        std::fs::create_dir(&folder).unwrap();

        let files = vec![
            DiscoveredFile { path: good.clone(), size: 9 },
            DiscoveredFile { path: folder.clone(), size: 0 },
        ];
        let (items, slots) = read_chunk(&files);

        assert_eq!(items.len(), 1);
        assert!(slots[0].is_none());
        let failed = slots[1].as_ref().unwrap();
        assert!(!failed.success);
        assert_eq!(failed.error.as_deref(), Some(DECODE_FAILURE));
        assert!(failed.reason.as_deref().unwrap().starts_with("Cannot read"));

        let analyzed = vec![ImageResult::failure(
            good.to_string_lossy(),
            DECODE_FAILURE,
            None,
        )];
        let merged = merge_read_failures(slots, analyzed);
        let ids: Vec<String> = merged.iter().map(|r| r.id.clone()).collect();
        assert_eq!(
            ids,
            [good.to_string_lossy().into_owned(), folder.to_string_lossy().into_owned()]
        );
    }
}
