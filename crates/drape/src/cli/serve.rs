//! The `drape serve` command: a JSONL worker over stdin/stdout.
//!
//! Each input line is a job `{"id": "...", "input": {"images": [...]}}`; each
//! output line is `{"id": "...", "output": <batch response>}`. The model loads
//! on the first job and is shared by every job after it.

use clap::Args;
use drape_core::types::BatchInput;
use drape_core::{BatchRequest, BatchResponse, Config, Drape};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, OnceCell, Semaphore};
use tokio::task::JoinSet;

use super::load_service_blocking;

/// Arguments for the `serve` command.
#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Maximum concurrent jobs (defaults to `service.concurrency`)
    #[arg(short, long)]
    pub concurrency: Option<usize>,

    /// Load the model before reading the first job
    #[arg(long)]
    pub eager: bool,
}

/// Builds the service on first use.
pub type Loader = Box<dyn Fn() -> anyhow::Result<Drape> + Send + Sync>;

#[derive(Debug, Deserialize)]
struct Job {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    input: BatchInput,
}

#[derive(Debug, Serialize)]
struct JobReply {
    id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    output: Option<BatchResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl JobReply {
    fn output(id: Option<String>, output: BatchResponse) -> Self {
        Self {
            id,
            output: Some(output),
            error: None,
        }
    }

    fn error(id: Option<String>, error: impl Into<String>) -> Self {
        Self {
            id,
            output: None,
            error: Some(error.into()),
        }
    }

    fn to_line(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|_| r#"{"id":null,"error":"Failed to serialize reply"}"#.to_string())
    }
}

/// JSONL job loop with lazy one-time model initialization.
pub struct Worker {
    service: OnceCell<Arc<Drape>>,
    loader: Loader,
    permits: Arc<Semaphore>,
}

impl Worker {
    pub fn new(loader: Loader, concurrency: usize) -> Self {
        Self {
            service: OnceCell::new(),
            loader,
            permits: Arc::new(Semaphore::new(concurrency.max(1))),
        }
    }

    /// The shared service, loading it if no job has yet.
    ///
    /// A failed load leaves the cell empty so the next job retries.
    pub async fn service(self: &Arc<Self>) -> anyhow::Result<Arc<Drape>> {
        let service = self
            .service
            .get_or_try_init(|| async {
                let worker = Arc::clone(self);
                let start = std::time::Instant::now();
                let drape = tokio::task::spawn_blocking(move || (worker.loader)()).await??;
                tracing::info!("Model ready in {:.1}s", start.elapsed().as_secs_f64());
                Ok::<_, anyhow::Error>(Arc::new(drape))
            })
            .await?;
        Ok(Arc::clone(service))
    }

    /// Answer one input line.
    async fn handle(self: &Arc<Self>, line: &str) -> JobReply {
        let job: Job = match serde_json::from_str(line) {
            Ok(job) => job,
            Err(e) => {
                tracing::warn!("Rejected job line: {e}");
                return JobReply::error(None, format!("Invalid job: {e}"));
            }
        };

        let service = match self.service().await {
            Ok(service) => service,
            Err(e) => {
                tracing::error!("Model initialization failed: {e}");
                return JobReply::error(job.id, format!("Model initialization failed: {e}"));
            }
        };

        let request = BatchRequest { input: job.input };
        let output = service.analyze_batch(&request).await;
        tracing::debug!(
            id = job.id.as_deref().unwrap_or("-"),
            images = output.results.len(),
            "Job finished"
        );
        JobReply::output(job.id, output)
    }

    /// Read jobs until EOF, writing one reply line per job.
    ///
    /// Replies are written in completion order by a single writer task.
    pub async fn run<R, W>(self: Arc<Self>, reader: R, mut writer: W) -> anyhow::Result<W>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, mut rx) = mpsc::channel::<String>(64);
        let writer_task = tokio::spawn(async move {
            while let Some(line) = rx.recv().await {
                writer.write_all(line.as_bytes()).await?;
                writer.write_all(b"\n").await?;
                writer.flush().await?;
            }
            Ok::<W, std::io::Error>(writer)
        });

        let mut lines = reader.lines();
        let mut jobs = JoinSet::new();
        let mut received = 0usize;

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            received += 1;

            let permit = Arc::clone(&self.permits).acquire_owned().await?;
            let worker = Arc::clone(&self);
            let tx = tx.clone();
            jobs.spawn(async move {
                let reply = worker.handle(&line).await;
                drop(permit);
                if tx.send(reply.to_line()).await.is_err() {
                    tracing::error!("Reply writer closed");
                }
            });

            while jobs.try_join_next().is_some() {}
        }

        while jobs.join_next().await.is_some() {}
        drop(tx);

        let writer = writer_task.await??;
        tracing::info!("Input closed after {received} job(s)");
        Ok(writer)
    }
}

/// Execute the serve command.
pub async fn execute(args: ServeArgs, config: &Config) -> anyhow::Result<()> {
    let concurrency = args.concurrency.unwrap_or(config.service.concurrency).max(1);
    let loader_config = config.clone();
    let worker = Arc::new(Worker::new(
        Box::new(move || load_service_blocking(&loader_config)),
        concurrency,
    ));

    if args.eager {
        worker.service().await?;
    }

    tracing::info!("Worker ready (concurrency {concurrency}), reading jobs from stdin");
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    worker.run(stdin, tokio::io::stdout()).await?;
    Ok(())
}
