use std::io::Cursor;
use std::path::{Path, PathBuf};

use crate::{
    config::Config,
    errors::{BgtxError, Result},
    imageops_ai::{load_oriented, mask},
    traits::{BackgroundRemover, ModelLoader},
};
use image::{imageops, imageops::FilterType, DynamicImage, GrayImage, ImageFormat, RgbImage};
use ndarray::prelude::*;
use nshare::AsNdarray3;
use ort::value::TensorRef;
use ort::{
    execution_providers::{CUDAExecutionProvider, TensorRTExecutionProvider},
    session::{builder::SessionBuilder, Session},
};
use parking_lot::Mutex;
use tracing::{debug, info};

/// Input resolution of the U2-Net family when the model does not fix one.
pub const DEFAULT_IMAGE_SIZE: u32 = 320;

const MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Resolves model identifiers to `.onnx` files and opens ONNX Runtime sessions.
#[derive(Debug, Clone)]
pub struct OnnxLoader {
    model_path: Option<PathBuf>,
    model_home: Option<PathBuf>,
    device_id: i32,
}

impl OnnxLoader {
    pub const fn new(model_path: Option<PathBuf>, model_home: Option<PathBuf>, device_id: i32) -> Self {
        Self {
            model_path,
            model_home,
            device_id,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.model_path.clone(),
            config.model_home.clone(),
            config.device_id,
        )
    }

    /// File that `model_id` refers to.
    ///
    /// An explicit model path wins; otherwise the model is looked up as
    /// `<home>/<model_id>.onnx`, where home falls back to `$HOME/.u2net`.
    pub fn resolve(&self, model_id: &str) -> Result<PathBuf> {
        if let Some(path) = &self.model_path {
            return Ok(path.clone());
        }

        let home = match &self.model_home {
            Some(home) => home.clone(),
            None => std::env::var_os("HOME")
                .map(|home| PathBuf::from(home).join(".u2net"))
                .ok_or_else(|| BgtxError::Configuration {
                    message: "neither a model home nor $HOME is set".to_string(),
                })?,
        };
        Ok(home.join(format!("{model_id}.onnx")))
    }
}

impl ModelLoader for OnnxLoader {
    type Remover = OnnxRemover;

    fn load(&self, model_id: &str) -> Result<OnnxRemover> {
        let model_path = self.resolve(model_id)?;
        if !model_path.is_file() {
            return Err(BgtxError::ModelInit {
                model: model_id.to_string(),
                source: Box::new(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("model file {} does not exist", model_path.display()),
                )),
            });
        }

        OnnxRemover::new(&model_path, self.device_id)
            .map_err(|err| err.into_model_init(model_id))
    }
}

/// U2-Net style background remover on top of an ONNX Runtime session.
pub struct OnnxRemover {
    pub image_size: u32,
    input_name: String,
    output_name: String,
    session: Mutex<Session>,
}

impl OnnxRemover {
    pub fn new(model_path: &Path, device_id: i32) -> Result<Self> {
        let session = SessionBuilder::new()
            .map_err(|e| BgtxError::inference("session builder", e))?
            .with_execution_providers([
                TensorRTExecutionProvider::default()
                    .with_device_id(device_id)
                    .build(),
                CUDAExecutionProvider::default()
                    .with_device_id(device_id)
                    .build(),
            ])
            .map_err(|e| BgtxError::inference("execution providers", e))?
            .with_memory_pattern(true)
            .map_err(|e| BgtxError::inference("memory pattern", e))?
            .commit_from_file(model_path)
            .map_err(|e| {
                BgtxError::inference(format!("load model file {}", model_path.display()), e)
            })?;

        let input = session.inputs.first().ok_or_else(|| {
            BgtxError::inference("inspect model inputs", "model declares no inputs")
        })?;
        let output = session.outputs.first().ok_or_else(|| {
            BgtxError::inference("inspect model outputs", "model declares no outputs")
        })?;

        let image_size = image_size_from_dim(
            input
                .input_type
                .tensor_shape()
                .and_then(|shape| shape.get(2).copied()),
        );

        info!(
            model = %model_path.display(),
            input = %input.name,
            output = %output.name,
            image_size,
            "onnx session created"
        );

        Ok(Self {
            image_size,
            input_name: input.name.clone(),
            output_name: output.name.clone(),
            session: Mutex::new(session),
        })
    }

    pub fn predict(&self, tensor: ArrayView4<f32>) -> Result<Array4<f32>> {
        let input = tensor.as_standard_layout();
        let mut binding = self.session.lock();
        let outputs = binding.run(ort::inputs![
            self.input_name.as_str() => TensorRef::from_array_view(&input)?
        ])?;
        let mask = outputs[self.output_name.as_str()]
            .try_extract_array::<f32>()?
            .into_dimensionality::<Ix4>()?
            .to_owned();
        Ok(mask)
    }
}

impl BackgroundRemover for OnnxRemover {
    fn remove_background(&self, image_bytes: &[u8]) -> Result<Vec<u8>> {
        let source = load_oriented(image_bytes)
            .map_err(|e| BgtxError::inference("decode input image", e))?;
        let image = source.to_rgb8();
        let (width, height) = image.dimensions();

        let tensor = preprocess(&image, self.image_size);
        let prediction = self.predict(tensor.view())?;
        debug!(width, height, shape = ?prediction.shape(), "mask predicted");

        let mut alpha = postprocess_mask(prediction.view(), width, height)?;
        if source.color().has_alpha() {
            mask::intersect_alpha(&mut alpha, &source.to_rgba8())?;
        }
        let cutout = mask::apply(&image, &alpha)?;

        let mut buffer = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(cutout)
            .write_to(&mut buffer, ImageFormat::Png)
            .map_err(|e| BgtxError::inference("encode cut-out", e))?;
        Ok(buffer.into_inner())
    }

    fn warm_up(&self) -> Result<()> {
        let side = self.image_size as usize;
        let data = Array4::<f32>::zeros((1, 3, side, side));
        self.predict(data.view())?;
        Ok(())
    }
}

/// Square input side declared by the model. Dynamic (`-1`), zero or
/// out-of-range dimensions fall back to [`DEFAULT_IMAGE_SIZE`].
fn image_size_from_dim(side: Option<i64>) -> u32 {
    side.and_then(|side| u32::try_from(side).ok())
        .filter(|&side| side > 0)
        .unwrap_or(DEFAULT_IMAGE_SIZE)
}

/// Resizes to the model resolution and normalizes into a `1x3xSxS` tensor.
pub fn preprocess(image: &RgbImage, image_size: u32) -> Array4<f32> {
    let image = imageops::resize(image, image_size, image_size, FilterType::Lanczos3);
    let max = f32::from(image.as_raw().iter().copied().max().unwrap_or(0).max(1));

    let mut tensor = image.as_ndarray3().mapv(|v| f32::from(v) / max);
    for (channel, mut plane) in tensor.axis_iter_mut(Axis(0)).enumerate() {
        plane.mapv_inplace(|v| (v - MEAN[channel]) / STD[channel]);
    }
    tensor.insert_axis(Axis(0))
}

/// Turns the first channel of a raw prediction into an 8-bit mask of
/// `width`x`height`, stretching the prediction to the full 0..=255 range.
pub fn postprocess_mask(prediction: ArrayView4<f32>, width: u32, height: u32) -> Result<GrayImage> {
    if prediction.shape()[0] == 0 || prediction.shape()[1] == 0 {
        return Err(BgtxError::inference(
            "postprocess mask",
            format!("empty prediction of shape {:?}", prediction.shape()),
        ));
    }

    let plane = prediction
        .index_axis_move(Axis(0), 0)
        .index_axis_move(Axis(0), 0);
    let (mask_height, mask_width) = plane.dim();

    let (min, max) = plane.fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
        (lo.min(v), hi.max(v))
    });
    let range = (max - min).max(f32::EPSILON);

    let pixels = plane
        .iter()
        .map(|&v| ((v - min) / range * 255.0).round().clamp(0.0, 255.0) as u8)
        .collect::<Vec<u8>>();
    let mask = GrayImage::from_raw(mask_width as u32, mask_height as u32, pixels).ok_or_else(|| {
        BgtxError::inference("postprocess mask", "prediction does not form an image")
    })?;

    Ok(imageops::resize(&mask, width, height, FilterType::Lanczos3))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn preprocess_produces_normalized_nchw_tensor() {
        let image = RgbImage::from_pixel(40, 20, Rgb([255, 255, 255]));
        let tensor = preprocess(&image, 16);

        assert_eq!(tensor.shape(), &[1, 3, 16, 16]);
        let expected_red = (1.0 - MEAN[0]) / STD[0];
        assert!((tensor[[0, 0, 8, 8]] - expected_red).abs() < 0.02);
        let expected_blue = (1.0 - MEAN[2]) / STD[2];
        assert!((tensor[[0, 2, 3, 3]] - expected_blue).abs() < 0.02);
    }

    #[test]
    fn postprocess_stretches_and_resizes() -> Result<()> {
        let mut prediction = Array4::<f32>::zeros((1, 1, 4, 4));
        prediction.slice_mut(s![0, 0, .., 2..]).fill(0.5);

        let mask = postprocess_mask(prediction.view(), 4, 4)?;

        assert_eq!(mask.dimensions(), (4, 4));
        assert!(mask.get_pixel(0, 0).0[0] < 64);
        assert!(mask.get_pixel(3, 0).0[0] > 192);
        Ok(())
    }

    #[test]
    fn postprocess_handles_flat_prediction() -> Result<()> {
        let prediction = Array4::<f32>::from_elem((1, 1, 2, 2), 0.7);
        let mask = postprocess_mask(prediction.view(), 3, 5)?;

        assert_eq!(mask.dimensions(), (3, 5));
        assert!(mask.pixels().all(|p| p.0[0] == 0));
        Ok(())
    }

    #[test]
    fn image_size_falls_back_for_unusable_dims() {
        assert_eq!(image_size_from_dim(Some(1024)), 1024);
        assert_eq!(image_size_from_dim(Some(-1)), DEFAULT_IMAGE_SIZE);
        assert_eq!(image_size_from_dim(Some(0)), DEFAULT_IMAGE_SIZE);
        assert_eq!(image_size_from_dim(Some(i64::from(u32::MAX) + 1)), DEFAULT_IMAGE_SIZE);
        assert_eq!(image_size_from_dim(None), DEFAULT_IMAGE_SIZE);
    }

    #[test]
    fn resolve_prefers_explicit_model_path() -> Result<()> {
        let loader = OnnxLoader::new(Some("/models/custom.onnx".into()), Some("/cache".into()), 0);
        assert_eq!(loader.resolve("u2net")?, PathBuf::from("/models/custom.onnx"));
        Ok(())
    }

    #[test]
    fn resolve_uses_model_home() -> Result<()> {
        let loader = OnnxLoader::new(None, Some("/cache".into()), 0);
        assert_eq!(loader.resolve("u2netp")?, PathBuf::from("/cache/u2netp.onnx"));
        Ok(())
    }

    #[test]
    fn missing_model_file_is_model_init_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let loader = OnnxLoader::new(None, Some(dir.path().to_path_buf()), 0);

        match loader.load("u2net") {
            Err(BgtxError::ModelInit { model, .. }) => assert_eq!(model, "u2net"),
            Err(other) => panic!("unexpected error: {other:?}"),
            Ok(_) => panic!("loading a missing model must fail"),
        }
    }
}
