//! Data Augmentation Module
//!
//! Training-time transforms for small RGB images: zero-pad, take a random
//! crop of the original size, then flip horizontally with some probability.
//! Evaluation images are never augmented.

use image::{imageops, Rgb, RgbImage};
use rand::Rng;
use rand_chacha::ChaCha8Rng;

/// Configuration for data augmentation
#[derive(Clone, Debug, PartialEq)]
pub struct AugmentationConfig {
    /// Zero padding added on every side before cropping
    pub crop_padding: u32,
    /// Probability of applying horizontal flip (0.0 - 1.0)
    pub horizontal_flip_prob: f64,
}

impl Default for AugmentationConfig {
    fn default() -> Self {
        Self {
            crop_padding: 4,
            horizontal_flip_prob: 0.5,
        }
    }
}

impl AugmentationConfig {
    pub fn is_identity(&self) -> bool {
        self.crop_padding == 0 && self.horizontal_flip_prob <= 0.0
    }
}

#[derive(Clone, Debug)]
pub struct Augmenter {
    config: AugmentationConfig,
}

impl Augmenter {
    pub fn new(config: AugmentationConfig) -> Self {
        Self { config }
    }

    /// Random crop with padding followed by a random horizontal flip
    pub fn augment(&self, image: &RgbImage, rng: &mut ChaCha8Rng) -> RgbImage {
        let mut out = self.random_crop(image, rng);
        if self.config.horizontal_flip_prob > 0.0
            && rng.gen_bool(self.config.horizontal_flip_prob.min(1.0))
        {
            imageops::flip_horizontal_in_place(&mut out);
        }
        out
    }

    fn random_crop(&self, image: &RgbImage, rng: &mut ChaCha8Rng) -> RgbImage {
        let pad = self.config.crop_padding;
        if pad == 0 {
            return image.clone();
        }
        let (width, height) = image.dimensions();

        let mut padded = RgbImage::from_pixel(width + 2 * pad, height + 2 * pad, Rgb([0, 0, 0]));
        imageops::replace(&mut padded, image, pad as i64, pad as i64);

        let x = rng.gen_range(0..=2 * pad);
        let y = rng.gen_range(0..=2 * pad);
        imageops::crop_imm(&padded, x, y, width, height).to_image()
    }
}

/// Planar CHW bytes to an interleaved RGB image
pub fn chw_to_rgb(pixels: &[u8], width: usize, height: usize) -> RgbImage {
    let plane = width * height;
    RgbImage::from_fn(width as u32, height as u32, |x, y| {
        let i = y as usize * width + x as usize;
        Rgb([pixels[i], pixels[plane + i], pixels[2 * plane + i]])
    })
}

/// Interleaved RGB image to planar CHW floats in [0, 1]
pub fn rgb_to_chw_unit(image: &RgbImage) -> Vec<f32> {
    let (width, height) = image.dimensions();
    let plane = (width * height) as usize;
    let mut out = vec![0.0f32; 3 * plane];
    for (x, y, pixel) in image.enumerate_pixels() {
        let i = (y * width + x) as usize;
        for c in 0..3 {
            out[c * plane + i] = pixel[c] as f32 / 255.0;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn gradient_image() -> RgbImage {
        RgbImage::from_fn(8, 8, |x, y| Rgb([(x * 10 + 1) as u8, (y * 10 + 1) as u8, 7]))
    }

    #[test]
    fn test_none_is_identity() {
        let config = AugmentationConfig {
            crop_padding: 0,
            horizontal_flip_prob: 0.0,
        };
        assert!(config.is_identity());

        let augmenter = Augmenter::new(config);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let image = gradient_image();
        assert_eq!(augmenter.augment(&image, &mut rng), image);
    }

    #[test]
    fn test_always_flip() {
        let augmenter = Augmenter::new(AugmentationConfig {
            crop_padding: 0,
            horizontal_flip_prob: 1.0,
        });
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let image = gradient_image();
        let out = augmenter.augment(&image, &mut rng);
        assert_eq!(out.get_pixel(0, 0), image.get_pixel(7, 0));
        assert_eq!(out.get_pixel(7, 3), image.get_pixel(0, 3));
    }

    #[test]
    fn test_crop_keeps_size_and_content() {
        let augmenter = Augmenter::new(AugmentationConfig {
            crop_padding: 4,
            horizontal_flip_prob: 0.0,
        });
        let image = gradient_image();
        for seed in 0..20 {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let out = augmenter.augment(&image, &mut rng);
            assert_eq!(out.dimensions(), (8, 8));
            for pixel in out.pixels() {
                let is_pad = pixel.0 == [0, 0, 0];
                let from_source = image.pixels().any(|p| p == pixel);
                assert!(is_pad || from_source);
            }
        }
    }

    #[test]
    fn test_same_seed_same_result() {
        let augmenter = Augmenter::new(AugmentationConfig::default());
        let image = gradient_image();
        let a = augmenter.augment(&image, &mut ChaCha8Rng::seed_from_u64(9));
        let b = augmenter.augment(&image, &mut ChaCha8Rng::seed_from_u64(9));
        assert_eq!(a, b);
    }

    #[test]
    fn test_layout_conversion() {
        // 2x1 image: red plane [10, 20], green [30, 40], blue [50, 60]
        let pixels = [10u8, 20, 30, 40, 50, 60];
        let image = chw_to_rgb(&pixels, 2, 1);
        assert_eq!(image.get_pixel(1, 0).0, [20, 40, 60]);

        let back = rgb_to_chw_unit(&image);
        let expected: Vec<f32> = pixels.iter().map(|&p| p as f32 / 255.0).collect();
        assert_eq!(back, expected);
    }
}
