use image::{GenericImageView, GrayImage, ImageBuffer, Luma, Pixel, Primitive, Rgb, Rgba, RgbaImage};
use num_traits::AsPrimitive;

use crate::errors::{BgtxError, Result};
use crate::imageops_ai::get_max_value;

/// Combines an RGB image with a single-channel mask into an RGBA cut-out.
///
/// The mask is rescaled from its own sample range into the image's range and
/// becomes the alpha channel; colour channels are copied untouched.
pub fn apply<I, M, SI, SM>(image: &I, mask: &M) -> Result<ImageBuffer<Rgba<SI>, Vec<SI>>>
where
    I: GenericImageView<Pixel = Rgb<SI>>,
    M: GenericImageView<Pixel = Luma<SM>>,
    Rgba<SI>: Pixel<Subpixel = SI>,
    SI: Primitive + 'static + AsPrimitive<f32>,
    SM: Primitive + 'static + AsPrimitive<f32>,
    f32: AsPrimitive<SI>,
    f32: AsPrimitive<SM>,
{
    if image.dimensions() != mask.dimensions() {
        let (iw, ih) = image.dimensions();
        let (mw, mh) = mask.dimensions();
        return Err(BgtxError::inference(
            "apply alpha mask",
            format!("image is {iw}x{ih} but mask is {mw}x{mh}"),
        ));
    }

    let sm_max: f32 = get_max_value::<SM>().as_();
    let si_max: f32 = get_max_value::<SI>().as_();

    let processed_pixels = image
        .pixels()
        .zip(mask.pixels())
        .flat_map(|(image_pixel, mask_pixel)| {
            let Rgb([red, green, blue]) = image_pixel.2;
            let Luma([alpha]) = mask_pixel.2;
            let alpha: SI = ((alpha.as_() / sm_max) * si_max).as_();
            [red, green, blue, alpha]
        })
        .collect::<Vec<SI>>();

    ImageBuffer::from_raw(image.width(), image.height(), processed_pixels).ok_or_else(|| {
        BgtxError::inference("apply alpha mask", "pixel buffer does not match image size")
    })
}

/// Scales `mask` by the alpha channel `image` already has, so pixels that
/// were transparent in the input stay transparent in the cut-out.
pub fn intersect_alpha(mask: &mut GrayImage, image: &RgbaImage) -> Result<()> {
    if image.dimensions() != mask.dimensions() {
        let (iw, ih) = image.dimensions();
        let (mw, mh) = mask.dimensions();
        return Err(BgtxError::inference(
            "keep input alpha",
            format!("image is {iw}x{ih} but mask is {mw}x{mh}"),
        ));
    }

    for (mask_pixel, image_pixel) in mask.pixels_mut().zip(image.pixels()) {
        let product = u16::from(mask_pixel.0[0]) * u16::from(image_pixel.0[3]);
        mask_pixel.0[0] = ((product + 127) / 255) as u8;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    #[test]
    fn mask_becomes_alpha_channel() -> Result<()> {
        let image = RgbImage::from_pixel(2, 1, Rgb([10, 20, 30]));
        let mut mask = GrayImage::new(2, 1);
        mask.put_pixel(1, 0, Luma([255]));

        let cutout = apply(&image, &mask)?;

        assert_eq!(cutout.get_pixel(0, 0).0, [10, 20, 30, 0]);
        assert_eq!(cutout.get_pixel(1, 0).0, [10, 20, 30, 255]);
        Ok(())
    }

    #[test]
    fn float_mask_is_rescaled() -> Result<()> {
        let image = RgbImage::from_pixel(1, 1, Rgb([1, 2, 3]));
        let mask = ImageBuffer::<Luma<f32>, Vec<f32>>::from_pixel(1, 1, Luma([1.0]));

        let cutout = apply(&image, &mask)?;

        assert_eq!(cutout.get_pixel(0, 0).0[3], 255);
        Ok(())
    }

    #[test]
    fn dimension_mismatch_is_rejected() {
        let image = RgbImage::new(4, 4);
        let mask = GrayImage::new(2, 2);

        assert!(matches!(
            apply(&image, &mask),
            Err(BgtxError::Inference { .. })
        ));
    }

    #[test]
    fn existing_transparency_survives() -> Result<()> {
        let mut image = RgbaImage::from_pixel(3, 1, Rgba([50, 60, 70, 255]));
        image.put_pixel(0, 0, Rgba([50, 60, 70, 0]));
        image.put_pixel(1, 0, Rgba([50, 60, 70, 128]));
        let mut mask = GrayImage::from_pixel(3, 1, Luma([255]));
        mask.put_pixel(2, 0, Luma([0]));

        intersect_alpha(&mut mask, &image)?;

        assert_eq!(mask.as_raw(), &vec![0, 128, 0]);
        Ok(())
    }

    #[test]
    fn intersect_alpha_rejects_dimension_mismatch() {
        let image = RgbaImage::new(2, 2);
        let mut mask = GrayImage::new(3, 3);

        assert!(intersect_alpha(&mut mask, &image).is_err());
    }
}
