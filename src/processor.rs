use std::path::{Path, PathBuf};
use std::time::Duration;

use image::{DynamicImage, ImageFormat};
use serde::Serialize;
use tracing::{debug, warn};

use crate::errors::{BgtxError, Result};
use crate::session::SessionHandle;
use crate::traits::BackgroundRemover;

/// Appended to the stem of every output file.
pub const DEFAULT_SUFFIX: &str = "_bgtx";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOptions {
    pub suffix: String,
    /// Upper bound for a single inference call, not counting time spent
    /// queued behind other items; `None` waits forever.
    pub timeout: Option<Duration>,
}

impl Default for ProcessOptions {
    fn default() -> Self {
        Self {
            suffix: DEFAULT_SUFFIX.to_string(),
            timeout: None,
        }
    }
}

/// Which stage of the pipeline an item failed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureKind {
    Read,
    Inference,
    Write,
    Timeout,
}

impl From<&BgtxError> for FailureKind {
    fn from(err: &BgtxError) -> Self {
        match err {
            BgtxError::ItemRead { .. } | BgtxError::FileSystem { .. } => Self::Read,
            BgtxError::ItemWrite { .. } => Self::Write,
            BgtxError::Timeout { .. } => Self::Timeout,
            _ => Self::Inference,
        }
    }
}

/// Outcome of processing one input path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ProcessResult {
    Success {
        input: String,
        output_path: PathBuf,
    },
    #[serde(rename = "error")]
    Failure {
        input: String,
        kind: FailureKind,
        message: String,
    },
}

impl ProcessResult {
    pub fn input(&self) -> &str {
        match self {
            Self::Success { input, .. } | Self::Failure { input, .. } => input,
        }
    }

    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// `<dir>/<stem><suffix>.png`: only the stem of `path` matters, never its extension.
pub fn derive_output_path(path: &Path, suffix: &str) -> Result<PathBuf> {
    let stem = path.file_stem().ok_or_else(|| BgtxError::ItemWrite {
        path: path.to_path_buf(),
        operation: "derive output file name".to_string(),
        source: "path has no file name".into(),
    })?;

    let mut file_name = stem.to_os_string();
    file_name.push(suffix);
    file_name.push(".png");
    Ok(path.with_file_name(file_name))
}

/// Base name used to identify `path` in results and reports.
pub fn input_identifier(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Removes the background of one image and writes the PNG next to it.
///
/// Never fails: every error is turned into [`ProcessResult::Failure`] so that
/// one bad input cannot stop a batch.
pub async fn process<R>(path: &Path, session: &SessionHandle<R>, options: &ProcessOptions) -> ProcessResult
where
    R: BackgroundRemover + 'static,
{
    let input = input_identifier(path);
    match try_process(path, session, options).await {
        Ok(output_path) => {
            debug!(input = %input, output = %output_path.display(), "background removed");
            ProcessResult::Success { input, output_path }
        }
        Err(err) => {
            let message = err.describe();
            warn!(input = %input, error = %message, "image failed");
            ProcessResult::Failure {
                input,
                kind: FailureKind::from(&err),
                message,
            }
        }
    }
}

async fn try_process<R>(path: &Path, session: &SessionHandle<R>, options: &ProcessOptions) -> Result<PathBuf>
where
    R: BackgroundRemover + 'static,
{
    let input_bytes = tokio::fs::read(path)
        .await
        .map_err(|source| BgtxError::ItemRead {
            path: path.to_path_buf(),
            source,
        })?;

    let output_bytes = remove_background(session, input_bytes, options.timeout).await?;

    let image = image::load_from_memory(&output_bytes)
        .map_err(|e| BgtxError::inference("decode model output", e))?;
    let image = if image.color().has_alpha() {
        image
    } else {
        DynamicImage::ImageRgba8(image.into_rgba8())
    };

    let output_path = derive_output_path(path, &options.suffix)?;
    let target = output_path.clone();
    tokio::task::spawn_blocking(move || image.save_with_format(&target, ImageFormat::Png))
        .await
        .map_err(|e| BgtxError::ItemWrite {
            path: output_path.clone(),
            operation: "png encoder task".to_string(),
            source: Box::new(e),
        })?
        .map_err(|e| BgtxError::ItemWrite {
            path: output_path.clone(),
            operation: "encode png".to_string(),
            source: Box::new(e),
        })?;

    Ok(output_path)
}

/// Runs inference on the blocking pool, optionally bounded by `timeout`.
///
/// The timer starts once this item has the session to itself. A timed out
/// call cannot be interrupted; it finishes in the background and its result
/// is discarded. Its turn is given up anyway, so later items reach the
/// capability's own lock and time out behind it if it never returns.
async fn remove_background<R>(
    session: &SessionHandle<R>,
    input_bytes: Vec<u8>,
    timeout: Option<Duration>,
) -> Result<Vec<u8>>
where
    R: BackgroundRemover + 'static,
{
    let _turn = session.take_turn().await?;

    let remover = session.remover();
    let task = tokio::task::spawn_blocking(move || remover.remove_background(&input_bytes));

    let joined = match timeout {
        Some(limit) => tokio::time::timeout(limit, task)
            .await
            .map_err(|_| BgtxError::Timeout { limit })?,
        None => task.await,
    };
    joined.map_err(|e| BgtxError::inference("inference task", e))?
}
