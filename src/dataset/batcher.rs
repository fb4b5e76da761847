//! Burn batcher: transformed samples -> normalized image tensor + labels

use burn::data::dataloader::batcher::Batcher;
use burn::prelude::*;

use crate::dataset::cifar10::{CIFAR10_MEAN, CIFAR10_STD};

/// A sample after augmentation: planar CHW floats in [0, 1]
#[derive(Clone, Debug)]
pub struct PreparedImage {
    pub pixels: Vec<f32>,
    pub label: usize,
}

/// Batched data for training/evaluation
#[derive(Clone, Debug)]
pub struct ImageBatch<B: Backend> {
    /// `[batch, 3, height, width]`, normalized per channel
    pub images: Tensor<B, 4>,
    /// True labels `[batch]`
    pub targets: Tensor<B, 1, Int>,
}

impl<B: Backend> ImageBatch<B> {
    pub fn len(&self) -> usize {
        self.targets.dims()[0]
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Stacks prepared samples and applies `(x - mean) / std` per channel
#[derive(Clone, Debug)]
pub struct ImageBatcher {
    height: usize,
    width: usize,
    mean: [f32; 3],
    std: [f32; 3],
}

impl ImageBatcher {
    pub fn new(height: usize, width: usize) -> Self {
        Self {
            height,
            width,
            mean: CIFAR10_MEAN,
            std: CIFAR10_STD,
        }
    }
}

impl<B: Backend> Batcher<B, PreparedImage, ImageBatch<B>> for ImageBatcher {
    fn batch(&self, items: Vec<PreparedImage>, device: &B::Device) -> ImageBatch<B> {
        let batch_size = items.len();

        let mut images_data = Vec::with_capacity(batch_size * 3 * self.height * self.width);
        let mut targets_data = Vec::with_capacity(batch_size);
        for item in items {
            images_data.extend(item.pixels);
            targets_data.push(item.label as i64);
        }

        let images = Tensor::<B, 4>::from_floats(
            TensorData::new(images_data, [batch_size, 3, self.height, self.width]),
            device,
        );
        let mean = Tensor::<B, 4>::from_floats(TensorData::new(self.mean.to_vec(), [1, 3, 1, 1]), device);
        let std = Tensor::<B, 4>::from_floats(TensorData::new(self.std.to_vec(), [1, 3, 1, 1]), device);
        let images = (images - mean) / std;

        let targets =
            Tensor::<B, 1, Int>::from_data(TensorData::new(targets_data, [batch_size]), device);

        ImageBatch { images, targets }
    }
}
