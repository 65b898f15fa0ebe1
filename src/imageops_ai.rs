pub mod mask;

use image::{DynamicImage, ImageDecoder, ImageError, ImageReader, ImageResult};
use num_traits::{Bounded, NumCast};
use std::any::TypeId;
use std::io::Cursor;

pub fn is_floating_point<T: 'static>() -> bool {
    TypeId::of::<T>() == TypeId::of::<f32>() || TypeId::of::<T>() == TypeId::of::<f64>()
}

/// Largest sample value of `T`: 1.0 for floating point images, `T::MAX` otherwise.
pub fn get_max_value<T: Bounded + NumCast + 'static>() -> T {
    if is_floating_point::<T>() {
        T::from(1.0).unwrap_or_else(T::max_value)
    } else {
        T::max_value()
    }
}

/// Decodes an encoded image and rotates or flips it upright according to its
/// EXIF orientation tag, if any.
pub fn load_oriented(bytes: &[u8]) -> ImageResult<DynamicImage> {
    let mut decoder = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(ImageError::IoError)?
        .into_decoder()?;
    let orientation = decoder.orientation()?;

    let mut image = DynamicImage::from_decoder(decoder)?;
    image.apply_orientation(orientation);
    Ok(image)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, ImageFormat, Rgb, RgbImage};

    /// APP1 segment carrying a single orientation entry (6 = rotate 90° clockwise).
    fn exif_segment(orientation: u8) -> Vec<u8> {
        let mut payload = b"Exif\0\0".to_vec();
        payload.extend_from_slice(b"MM\0\x2a\0\0\0\x08");
        payload.extend_from_slice(&[0x00, 0x01]);
        payload.extend_from_slice(&[0x01, 0x12, 0x00, 0x03, 0x00, 0x00, 0x00, 0x01]);
        payload.extend_from_slice(&[0x00, orientation, 0x00, 0x00]);
        payload.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]);

        let length = u16::try_from(payload.len() + 2).unwrap();
        let mut segment = vec![0xff, 0xe1];
        segment.extend_from_slice(&length.to_be_bytes());
        segment.extend_from_slice(&payload);
        segment
    }

    fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
        let mut buffer = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([90, 120, 200])))
            .write_to(&mut buffer, ImageFormat::Jpeg)
            .unwrap();
        buffer.into_inner()
    }

    #[test]
    fn load_oriented_applies_exif_rotation() {
        let plain = jpeg_bytes(16, 8);
        let mut rotated = plain[..2].to_vec();
        rotated.extend_from_slice(&exif_segment(6));
        rotated.extend_from_slice(&plain[2..]);

        assert_eq!(load_oriented(&plain).unwrap().dimensions(), (16, 8));
        assert_eq!(load_oriented(&rotated).unwrap().dimensions(), (8, 16));
    }

    #[test]
    fn load_oriented_rejects_garbage() {
        assert!(load_oriented(b"not an image at all").is_err());
    }

    #[test]
    fn max_value_depends_on_sample_type() {
        assert_eq!(get_max_value::<u8>(), 255);
        assert_eq!(get_max_value::<u16>(), 65535);
        assert_eq!(get_max_value::<f32>(), 1.0);
    }
}
