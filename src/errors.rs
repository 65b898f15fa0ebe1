use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Structured error types for the background removal pipeline.
///
/// # Why structured errors
///
/// `ModelInit` is the only variant that aborts a run. The per-item variants
/// (`ItemRead`, `Inference`, `ItemWrite`, `Timeout`) are converted into failure
/// records by the processor, so each one carries enough context to be shown to
/// the user as-is. The remaining variants cover argument handling before a
/// batch starts.
#[derive(Error, Debug)]
pub enum BgtxError {
    #[error("Model initialization failed for `{model}`")]
    ModelInit {
        model: String,
        #[source]
        source: BoxError,
    },

    #[error("Could not read {path:?}")]
    ItemRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Background removal failed: {operation}")]
    Inference {
        operation: String,
        #[source]
        source: BoxError,
    },

    #[error("Could not write {path:?}: {operation}")]
    ItemWrite {
        path: PathBuf,
        operation: String,
        #[source]
        source: BoxError,
    },

    #[error("Background removal did not finish within {limit:?}")]
    Timeout { limit: Duration },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Filesystem error: {operation} failed for {path:?}")]
    FileSystem {
        path: PathBuf,
        operation: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Validation error: {field} {reason}")]
    Validation { field: String, reason: String },
}

pub type Result<T> = std::result::Result<T, BgtxError>;

impl BgtxError {
    pub(crate) fn inference<E>(operation: impl Into<String>, source: E) -> Self
    where
        E: Into<BoxError>,
    {
        Self::Inference {
            operation: operation.into(),
            source: source.into(),
        }
    }

    /// Wraps any error raised while constructing a session into `ModelInit`.
    ///
    /// An error that already is `ModelInit` is passed through unchanged so the
    /// original model name survives.
    pub fn into_model_init(self, model: &str) -> Self {
        match self {
            err @ Self::ModelInit { .. } => err,
            other => Self::ModelInit {
                model: model.to_string(),
                source: Box::new(other),
            },
        }
    }

    /// Renders the error together with its whole source chain on one line.
    pub fn describe(&self) -> String {
        let mut message = self.to_string();
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = std::error::Error::source(cause);
        }
        message
    }
}

/// Convert I/O errors to filesystem errors.
///
/// # Why default values for context
///
/// Code that knows the path and operation should construct the variant
/// directly. This conversion is the fallback for call sites without context.
impl From<std::io::Error> for BgtxError {
    fn from(err: std::io::Error) -> Self {
        Self::FileSystem {
            path: PathBuf::from("unknown"),
            operation: "unknown".to_string(),
            source: err,
        }
    }
}

/// Convert image crate errors to inference errors.
impl From<image::ImageError> for BgtxError {
    fn from(err: image::ImageError) -> Self {
        Self::inference("image codec", err)
    }
}

/// Convert ONNX Runtime errors to inference errors.
impl From<ort::Error> for BgtxError {
    fn from(err: ort::Error) -> Self {
        Self::inference("onnx runtime", err)
    }
}

/// Convert ndarray shape errors to inference errors.
///
/// Shape errors only happen while reshaping model outputs, so they belong to
/// the inference category rather than a separate tensor error type.
impl From<ndarray::ShapeError> for BgtxError {
    fn from(err: ndarray::ShapeError) -> Self {
        Self::inference("tensor shape conversion", err)
    }
}
