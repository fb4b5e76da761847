//! Dataset module: CIFAR-10 reading, augmentation, batching and loading
//!
//! Raw samples stay as planar `u8` pixels in memory; they are converted to
//! floats, augmented and normalized only when a batch is requested.

pub mod augmentation;
pub mod batcher;
pub mod cifar10;
pub mod loader;

pub use augmentation::{AugmentationConfig, Augmenter};
pub use batcher::{ImageBatch, ImageBatcher, PreparedImage};
pub use cifar10::Split;
pub use loader::{BatchSource, ImageLoader};

/// One raw sample: planar CHW pixels and the true class
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LabeledImage {
    pub pixels: Vec<u8>,
    pub label: usize,
}

/// Immutable collection of equally sized RGB images
#[derive(Clone, Debug)]
pub struct ImageDataset {
    items: Vec<LabeledImage>,
    height: usize,
    width: usize,
}

impl ImageDataset {
    pub fn new(items: Vec<LabeledImage>, height: usize, width: usize) -> Self {
        Self {
            items,
            height,
            width,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[LabeledImage] {
        &self.items
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn labels(&self) -> Vec<usize> {
        self.items.iter().map(|item| item.label).collect()
    }

    /// Count of samples per class, indexed by label
    pub fn class_counts(&self, num_classes: usize) -> Vec<usize> {
        let mut counts = vec![0; num_classes];
        for item in &self.items {
            if let Some(count) = counts.get_mut(item.label) {
                *count += 1;
            }
        }
        counts
    }
}
