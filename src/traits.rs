use crate::errors::Result;

/// Background removal capability backed by a loaded segmentation model.
///
/// Implementations are shared by every item of a batch, and with `--jobs > 1`
/// by several in-flight items at once. A native session that is not safe for
/// concurrent use must be serialized inside the implementation (the ONNX
/// implementation keeps its session behind a mutex).
pub trait BackgroundRemover: Send + Sync {
    /// Takes the raw bytes of an encoded image and returns an encoded PNG of
    /// the same image with its background made transparent.
    fn remove_background(&self, image_bytes: &[u8]) -> Result<Vec<u8>>;

    /// Runs one throwaway inference so that a broken model fails before the
    /// first item is processed.
    fn warm_up(&self) -> Result<()> {
        Ok(())
    }
}

/// Session-construction primitive of a segmentation backend.
pub trait ModelLoader {
    type Remover: BackgroundRemover;

    /// Loads the model named `model_id`. This is the expensive step that a
    /// batch performs exactly once.
    fn load(&self, model_id: &str) -> Result<Self::Remover>;
}
