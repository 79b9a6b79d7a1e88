//! Deterministic fixtures shared by unit tests.

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::OnceLock;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};

use crate::embedding::ImageTextEncoder;
use crate::error::PipelineError;
use crate::math::l2_normalize;
use crate::pipeline::DecodedImage;

/// Encoder whose embedding space is `[r, g, b, other]`.
///
/// An image embeds as its normalized mean color. Known prompts embed on the
/// color axis they describe: reddish images read as red dresses, bluish ones
/// as blue shoes. Every other prompt sits on the `other` axis, so it ties.
pub struct FakeEncoder {
    prompts: HashMap<&'static str, [f32; 4]>,
    image_calls: AtomicUsize,
    text_calls: AtomicUsize,
    fail_images: AtomicBool,
    image_delay_ms: AtomicU64,
}

impl FakeEncoder {
    pub const DIM: usize = 4;

    pub fn new() -> Self {
        let prompts = HashMap::from([
            ("a photo of a dress", [1.0, 0.0, 0.0, 0.0]),
            ("a photo of a shoes", [0.0, 0.0, 1.0, 0.0]),
            ("red clothing", [1.0, 0.0, 0.0, 0.0]),
            ("blue clothing", [0.0, 0.0, 1.0, 0.0]),
        ]);
        Self {
            prompts,
            image_calls: AtomicUsize::new(0),
            text_calls: AtomicUsize::new(0),
            fail_images: AtomicBool::new(false),
            image_delay_ms: AtomicU64::new(0),
        }
    }

    /// Block every later image call for `delay`.
    pub fn delay_images(&self, delay: Duration) {
        self.image_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Make every later image call fail.
    pub fn fail_images(&self, fail: bool) {
        self.fail_images.store(fail, Ordering::SeqCst);
    }

    pub fn image_calls(&self) -> usize {
        self.image_calls.load(Ordering::SeqCst)
    }

    pub fn text_calls(&self) -> usize {
        self.text_calls.load(Ordering::SeqCst)
    }
}

impl ImageTextEncoder for FakeEncoder {
    fn encode_images(&self, images: &[DecodedImage]) -> Result<Vec<Vec<f32>>, PipelineError> {
        self.image_calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.image_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            std::thread::sleep(Duration::from_millis(delay));
        }
        if self.fail_images.load(Ordering::SeqCst) {
            return Err(PipelineError::Classification {
                message: "vision encoder unavailable".to_string(),
            });
        }

        Ok(images
            .iter()
            .map(|decoded| {
                let mut sum = [0.0f32; 3];
                for pixel in decoded.image.pixels() {
                    for (acc, channel) in sum.iter_mut().zip(pixel.0) {
                        *acc += channel as f32;
                    }
                }
                l2_normalize(&[sum[0], sum[1], sum[2], 0.0])
            })
            .collect())
    }

    fn encode_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, PipelineError> {
        self.text_calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts
            .iter()
            .map(|text| {
                self.prompts
                    .get(text.as_str())
                    .copied()
                    .unwrap_or([0.0, 0.0, 0.0, 1.0])
                    .to_vec()
            })
            .collect())
    }

    fn logit_scale(&self) -> f32 {
        100.0
    }
}

/// Encode an image to bytes in the given format.
pub fn encode_image(image: &DynamicImage, format: ImageFormat) -> Vec<u8> {
    let mut bytes = Vec::new();
    image.write_to(&mut Cursor::new(&mut bytes), format).unwrap();
    bytes
}

/// Base64 PNG of a solid-color image.
pub fn png_base64(color: [u8; 3], width: u32, height: u32) -> String {
    let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb(color)));
    STANDARD.encode(encode_image(&image, ImageFormat::Png))
}

/// Base64 PNG large enough that decoding it takes far longer than 50ms.
///
/// Highly compressible, so it stays well under the default payload limit.
pub fn slow_png_base64() -> String {
    static PAYLOAD: OnceLock<String> = OnceLock::new();
    PAYLOAD
        .get_or_init(|| png_base64([128, 64, 32], 4096, 4096))
        .clone()
}

/// An already-decoded solid-color image.
pub fn decoded(color: [u8; 3]) -> DecodedImage {
    DecodedImage {
        image: RgbImage::from_pixel(4, 4, Rgb(color)),
        format: ImageFormat::Png,
        width: 4,
        height: 4,
        byte_len: 0,
    }
}
