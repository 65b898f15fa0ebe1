use std::sync::Arc;

use tokio::sync::{Semaphore, SemaphorePermit};
use tracing::info;

use crate::errors::{BgtxError, Result};
use crate::traits::{BackgroundRemover, ModelLoader};

/// Model identifier used when none is configured.
pub const DEFAULT_MODEL: &str = "u2net";

/// A loaded background removal capability, reused for every item of a batch.
///
/// The handle is deliberately not `Clone`: one run owns one handle, and
/// in-flight items borrow it.
pub struct SessionHandle<R> {
    model_id: String,
    remover: Arc<R>,
    turn: Semaphore,
}

impl<R: BackgroundRemover> SessionHandle<R> {
    pub fn new(model_id: impl Into<String>, remover: R) -> Self {
        Self {
            model_id: model_id.into(),
            remover: Arc::new(remover),
            turn: Semaphore::new(1),
        }
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    /// Shared reference to the capability, used to move inference onto a
    /// blocking thread.
    pub(crate) fn remover(&self) -> Arc<R> {
        Arc::clone(&self.remover)
    }

    /// Waits until no other item of this run is inferring.
    ///
    /// In-flight items queue here rather than on the capability's own lock,
    /// so a per-item timeout started after this returns only measures the
    /// item's own inference.
    pub(crate) async fn take_turn(&self) -> Result<SemaphorePermit<'_>> {
        self.turn
            .acquire()
            .await
            .map_err(|e| BgtxError::inference("wait for session", e))
    }
}

impl<R> std::fmt::Debug for SessionHandle<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("model_id", &self.model_id)
            .finish_non_exhaustive()
    }
}

/// Loads `model_id` through `loader` and checks that it can run inference.
///
/// Every failure comes back as [`BgtxError::ModelInit`](crate::BgtxError::ModelInit);
/// callers are expected to abort the run on it.
pub fn initialize<L: ModelLoader>(loader: &L, model_id: &str) -> Result<SessionHandle<L::Remover>> {
    info!(model = model_id, "loading segmentation model");

    let remover = loader
        .load(model_id)
        .map_err(|err| err.into_model_init(model_id))?;
    remover
        .warm_up()
        .map_err(|err| err.into_model_init(model_id))?;

    info!(model = model_id, "model loaded and ready");
    Ok(SessionHandle::new(model_id, remover))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::BgtxError;
    use crate::mocks::{MockLoader, MockRemover};

    #[test]
    fn initialize_loads_once_and_keeps_model_id() -> Result<()> {
        let loader = MockLoader::new();
        let session = initialize(&loader, DEFAULT_MODEL)?;

        assert_eq!(session.model_id(), "u2net");
        assert_eq!(loader.load_count(), 1);
        assert_eq!(session.remover().warm_up_count(), 1);
        Ok(())
    }

    #[test]
    fn initialize_reports_load_failure_as_model_init() {
        let loader = MockLoader::failing("model artifact unreachable");

        match initialize(&loader, "isnet-general-use") {
            Err(BgtxError::ModelInit { model, source }) => {
                assert_eq!(model, "isnet-general-use");
                assert!(source.to_string().contains("model artifact unreachable"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn initialize_reports_warm_up_failure_as_model_init() {
        let loader = MockLoader::with_remover(|| MockRemover::new().failing_warm_up());

        let result = initialize(&loader, DEFAULT_MODEL);
        assert!(matches!(result, Err(BgtxError::ModelInit { .. })));
    }

    #[test]
    fn debug_output_hides_remover() {
        let session = SessionHandle::new("u2net", MockRemover::new());
        assert_eq!(format!("{session:?}"), "SessionHandle { model_id: \"u2net\", .. }");
    }

    #[tokio::test]
    async fn turns_are_exclusive() -> Result<()> {
        let session = SessionHandle::new("u2net", MockRemover::new());

        let turn = session.take_turn().await?;
        assert!(session.turn.try_acquire().is_err());
        drop(turn);
        assert!(session.turn.try_acquire().is_ok());
        Ok(())
    }
}
