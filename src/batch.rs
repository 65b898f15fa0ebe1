use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use futures::stream::{self, StreamExt};
use indicatif::ProgressBar;
use tracing::{debug, info};

use crate::processor::{process, ProcessOptions, ProcessResult};
use crate::session::SessionHandle;
use crate::traits::BackgroundRemover;

/// Drives the single-item processor over a list of paths with one shared session.
///
/// Sequential by default. With a concurrency above one, reading, decoding and
/// writing of several items overlap while every inference call still goes
/// through the remover, which serializes access to its native session.
pub struct BatchRunner<'a, R> {
    session: &'a SessionHandle<R>,
    options: ProcessOptions,
    concurrency: NonZeroUsize,
    progress: Option<ProgressBar>,
}

impl<'a, R: BackgroundRemover + 'static> BatchRunner<'a, R> {
    pub const fn new(session: &'a SessionHandle<R>, options: ProcessOptions) -> Self {
        Self {
            session,
            options,
            concurrency: NonZeroUsize::MIN,
            progress: None,
        }
    }

    pub const fn with_concurrency(mut self, concurrency: NonZeroUsize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Processes every path and returns one result per path, in input order.
    ///
    /// Failures never stop the batch. An empty input yields an empty result.
    pub async fn run(&self, paths: &[PathBuf]) -> Vec<ProcessResult> {
        info!(
            total = paths.len(),
            model = self.session.model_id(),
            concurrency = self.concurrency.get(),
            "starting batch"
        );

        if self.concurrency.get() == 1 {
            let mut results = Vec::with_capacity(paths.len());
            for (index, path) in paths.iter().enumerate() {
                results.push(self.run_one(index, paths.len(), path).await);
            }
            results
        } else {
            stream::iter(paths.iter().enumerate())
                .map(|(index, path)| self.run_one(index, paths.len(), path))
                .buffered(self.concurrency.get())
                .collect()
                .await
        }
    }

    async fn run_one(&self, index: usize, total: usize, path: &Path) -> ProcessResult {
        debug!(item = index + 1, total, path = %path.display(), "processing");
        let result = process(path, self.session, &self.options).await;
        if let Some(progress) = &self.progress {
            progress.inc(1);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::MockRemover;

    #[tokio::test]
    async fn empty_batch_yields_no_results() {
        let session = SessionHandle::new("u2net", MockRemover::new());
        let results = BatchRunner::new(&session, ProcessOptions::default())
            .run(&[])
            .await;

        assert!(results.is_empty());
        assert_eq!(session.remover().call_count(), 0);
    }

    #[tokio::test]
    async fn missing_files_fail_without_stopping_the_batch() {
        let dir = tempfile::TempDir::new().unwrap();
        let paths = vec![dir.path().join("gone-1.jpg"), dir.path().join("gone-2.jpg")];
        let session = SessionHandle::new("u2net", MockRemover::new());

        let progress = ProgressBar::hidden();
        let results = BatchRunner::new(&session, ProcessOptions::default())
            .with_progress(progress.clone())
            .run(&paths)
            .await;

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].input(), "gone-1.jpg");
        assert_eq!(results[1].input(), "gone-2.jpg");
        assert!(results.iter().all(|r| !r.is_success()));
        assert_eq!(progress.position(), 2);
    }
}
