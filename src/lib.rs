//! Batch background removal with a segmentation model loaded once per run.
//!
//! The pipeline is [`initialize`] → [`BatchRunner::run`] → [`summarize`]:
//! one [`SessionHandle`] is built up front, every image is turned into a
//! [`ProcessResult`] independently, and the results are folded into a
//! [`BatchReport`].

pub mod batch;
pub mod config;
pub mod errors;
pub mod imageops_ai;
pub mod input;
pub mod model;
pub mod processor;
pub mod report;
pub mod session;
pub mod traits;

pub mod mocks;

use std::future::Future;
use std::path::PathBuf;

pub use batch::BatchRunner;
pub use config::Config;
pub use errors::{BgtxError, Result};
pub use model::{OnnxLoader, OnnxRemover};
pub use processor::{derive_output_path, process, FailureKind, ProcessOptions, ProcessResult};
pub use report::{summarize, BatchReport, FailureEntry};
pub use session::{initialize, SessionHandle, DEFAULT_MODEL};
pub use traits::*;

/// Loads `model_id` once and processes `paths` sequentially with it.
///
/// Only a model initialization failure is returned as an error; in that case
/// no input is touched. Per-image problems show up as failure results.
pub async fn run_batch<L>(
    loader: &L,
    model_id: &str,
    paths: &[PathBuf],
    options: ProcessOptions,
) -> Result<Vec<ProcessResult>>
where
    L: ModelLoader,
    L::Remover: 'static,
{
    let session = initialize(loader, model_id)?;
    Ok(BatchRunner::new(&session, options).run(paths).await)
}

/// Drives `future` to completion on a fresh multi-threaded runtime.
///
/// The runtime is shut down without waiting for its blocking pool: an
/// inference call abandoned after a timeout must not keep the process alive
/// once the batch has its results.
pub fn block_on<F: Future>(future: F) -> Result<F::Output> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| BgtxError::Configuration {
            message: format!("failed to start async runtime: {e}"),
        })?;

    let output = runtime.block_on(future);
    runtime.shutdown_background();
    Ok(output)
}
