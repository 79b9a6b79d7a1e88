//! Image preprocessing for the CLIP vision encoder.
//!
//! CLIP ViT checkpoints expect:
//! - Shortest edge resized to the input size (bicubic), then a center crop
//! - Normalization: (pixel/255 - mean) / std with the OpenAI CLIP statistics
//! - Channel order: RGB
//! - Tensor layout: NCHW [batch, channels, height, width]

use image::imageops::FilterType;
use image::RgbImage;
use ndarray::Array4;

/// Number of color channels (RGB).
const CHANNELS: usize = 3;

/// CLIP normalization mean (per-channel).
const NORM_MEAN: [f32; CHANNELS] = [0.481_454_66, 0.457_827_5, 0.408_210_73];

/// CLIP normalization std (per-channel).
const NORM_STD: [f32; CHANNELS] = [0.268_629_54, 0.261_302_58, 0.275_777_11];

/// Preprocess an RGB image for CLIP inference.
///
/// Scales the shortest edge to `image_size`, center-crops to
/// `image_size × image_size`, normalizes, and returns a `[1, 3, S, S]` tensor.
pub fn preprocess(image: &RgbImage, image_size: u32) -> Array4<f32> {
    let (width, height) = image.dimensions();
    let scale = image_size as f32 / width.min(height).max(1) as f32;
    let new_w = ((width as f32 * scale).round() as u32).max(image_size);
    let new_h = ((height as f32 * scale).round() as u32).max(image_size);

    let resized = image::imageops::resize(image, new_w, new_h, FilterType::CatmullRom);
    let left = (new_w - image_size) / 2;
    let top = (new_h - image_size) / 2;
    let cropped = image::imageops::crop_imm(&resized, left, top, image_size, image_size).to_image();

    let size = image_size as usize;
    let mut tensor = Array4::<f32>::zeros((1, CHANNELS, size, size));

    // Index the raw buffer directly; per-pixel get_pixel() plus 4D indexing
    // is several times slower at 224×224.
    let raw = cropped.as_raw();
    if let Some(tensor_data) = tensor.as_slice_mut() {
        for (i, pixel) in raw.chunks_exact(CHANNELS).enumerate() {
            let y = i / size;
            let x = i % size;
            for (c, &val) in pixel.iter().enumerate() {
                // NCHW layout: offset = c * size * size + y * size + x
                let idx = c * size * size + y * size + x;
                tensor_data[idx] = (val as f32 / 255.0 - NORM_MEAN[c]) / NORM_STD[c];
            }
        }
    }

    tensor
}
