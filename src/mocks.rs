use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use image::{DynamicImage, ImageFormat};

use crate::errors::{BgtxError, Result};
use crate::imageops_ai::load_oriented;
use crate::traits::{BackgroundRemover, ModelLoader};

/// Deterministic stand-in for a segmentation model.
///
/// Pixels whose channels are all at least `threshold` count as background and
/// become fully transparent; everything else stays opaque. Good enough to
/// check that outputs carry a real alpha channel.
#[derive(Debug)]
pub struct MockRemover {
    threshold: u8,
    delay: Option<Duration>,
    fail_warm_up: bool,
    calls: AtomicUsize,
    warm_ups: AtomicUsize,
}

impl MockRemover {
    pub const fn new() -> Self {
        Self {
            threshold: 240,
            delay: None,
            fail_warm_up: false,
            calls: AtomicUsize::new(0),
            warm_ups: AtomicUsize::new(0),
        }
    }

    /// Sleeps for `delay` before every removal, to exercise timeouts.
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub const fn failing_warm_up(mut self) -> Self {
        self.fail_warm_up = true;
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn warm_up_count(&self) -> usize {
        self.warm_ups.load(Ordering::SeqCst)
    }
}

impl Default for MockRemover {
    fn default() -> Self {
        Self::new()
    }
}

impl BackgroundRemover for MockRemover {
    fn remove_background(&self, image_bytes: &[u8]) -> Result<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }

        let image = load_oriented(image_bytes)
            .map_err(|e| BgtxError::inference("decode input image", e))?;
        let mut cutout = image.to_rgba8();
        for pixel in cutout.pixels_mut() {
            let [r, g, b, _] = pixel.0;
            if r >= self.threshold && g >= self.threshold && b >= self.threshold {
                pixel.0[3] = 0;
            }
        }

        let mut buffer = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(cutout).write_to(&mut buffer, ImageFormat::Png)?;
        Ok(buffer.into_inner())
    }

    fn warm_up(&self) -> Result<()> {
        self.warm_ups.fetch_add(1, Ordering::SeqCst);
        if self.fail_warm_up {
            return Err(BgtxError::inference(
                "warm-up inference",
                "mock session refused to run",
            ));
        }
        Ok(())
    }
}

/// Loader handing out [`MockRemover`]s, or failing like a broken model cache.
pub struct MockLoader {
    build: Box<dyn Fn() -> MockRemover + Send + Sync>,
    failure: Option<String>,
    loads: AtomicUsize,
}

impl MockLoader {
    pub fn new() -> Self {
        Self::with_remover(MockRemover::new)
    }

    pub fn with_remover<F>(build: F) -> Self
    where
        F: Fn() -> MockRemover + Send + Sync + 'static,
    {
        Self {
            build: Box::new(build),
            failure: None,
            loads: AtomicUsize::new(0),
        }
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            failure: Some(message.into()),
            ..Self::new()
        }
    }

    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl Default for MockLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelLoader for MockLoader {
    type Remover = MockRemover;

    fn load(&self, _model_id: &str) -> Result<MockRemover> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        match &self.failure {
            Some(message) => Err(BgtxError::Configuration {
                message: message.clone(),
            }),
            None => Ok((self.build)()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, Rgb, RgbImage};

    fn encoded_test_image() -> Vec<u8> {
        let mut image = RgbImage::from_pixel(8, 8, Rgb([255, 255, 255]));
        image.put_pixel(4, 4, Rgb([200, 10, 10]));
        let mut buffer = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(image)
            .write_to(&mut buffer, ImageFormat::Png)
            .unwrap();
        buffer.into_inner()
    }

    #[test]
    fn test_mock_remover_makes_background_transparent() -> Result<()> {
        let remover = MockRemover::new();
        let output = image::load_from_memory(&remover.remove_background(&encoded_test_image())?)?;

        assert_eq!(output.dimensions(), (8, 8));
        let output = output.to_rgba8();
        assert_eq!(output.get_pixel(0, 0).0[3], 0);
        assert_eq!(output.get_pixel(4, 4).0, [200, 10, 10, 255]);
        assert_eq!(remover.call_count(), 1);
        Ok(())
    }

    #[test]
    fn test_mock_remover_rejects_garbage() {
        let remover = MockRemover::new();
        let result = remover.remove_background(b"definitely not an image");
        assert!(matches!(result, Err(BgtxError::Inference { .. })));
    }

    #[test]
    fn test_failing_loader_counts_attempts() {
        let loader = MockLoader::failing("boom");
        assert!(loader.load("u2net").is_err());
        assert_eq!(loader.load_count(), 1);
    }
}
