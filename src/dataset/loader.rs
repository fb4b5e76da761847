//! Epoch-wise batch iteration over an in-memory image dataset.
//!
//! Samples are transformed on a dedicated rayon pool when workers are
//! configured. Shuffle order depends on `(seed, epoch)` and augmentation
//! randomness on `(seed, epoch, position)`, so an epoch is reproducible
//! whatever the worker count.

use std::sync::Arc;

use burn::data::dataloader::batcher::Batcher;
use burn::prelude::*;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

use crate::dataset::augmentation::{chw_to_rgb, rgb_to_chw_unit, AugmentationConfig, Augmenter};
use crate::dataset::batcher::{ImageBatch, ImageBatcher, PreparedImage};
use crate::dataset::ImageDataset;
use crate::utils::error::{DistillError, Result};

/// Anything the distillation loop can pull labeled batches from
pub trait BatchSource<B: Backend> {
    /// Number of samples in one full pass
    fn num_items(&self) -> usize;

    fn num_batches(&self) -> usize;

    /// Batches for the given (1-based) epoch, in order
    fn batches(&self, epoch: usize) -> Box<dyn Iterator<Item = ImageBatch<B>> + '_>;
}

pub struct ImageLoader<B: Backend> {
    dataset: Arc<ImageDataset>,
    batcher: ImageBatcher,
    batch_size: usize,
    shuffle: bool,
    seed: u64,
    augmenter: Option<Augmenter>,
    pool: Option<rayon::ThreadPool>,
    device: B::Device,
}

impl<B: Backend> ImageLoader<B> {
    /// Sequential, unshuffled, unaugmented loader
    pub fn new(dataset: Arc<ImageDataset>, batch_size: usize, device: B::Device) -> Self {
        let batcher = ImageBatcher::new(dataset.height(), dataset.width());
        Self {
            dataset,
            batcher,
            batch_size: batch_size.max(1),
            shuffle: false,
            seed: 0,
            augmenter: None,
            pool: None,
            device,
        }
    }

    /// Reshuffle every epoch from `seed`
    pub fn shuffled(mut self, seed: u64) -> Self {
        self.shuffle = true;
        self.seed = seed;
        self
    }

    pub fn with_augmentation(mut self, config: AugmentationConfig) -> Self {
        self.augmenter = if config.is_identity() {
            None
        } else {
            Some(Augmenter::new(config))
        };
        self
    }

    /// Transform samples on `workers` threads; 0 keeps everything inline
    pub fn with_workers(mut self, workers: usize) -> Result<Self> {
        self.pool = if workers == 0 {
            None
        } else {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(workers)
                .thread_name(|i| format!("loader-{i}"))
                .build()
                .map_err(|e| DistillError::Dataset(format!("failed to start loader workers: {e}")))?;
            Some(pool)
        };
        Ok(self)
    }

    pub fn dataset(&self) -> &ImageDataset {
        &self.dataset
    }

    /// Sample indices in the order they are served for `epoch`
    pub fn epoch_order(&self, epoch: usize) -> Vec<usize> {
        let mut indices: Vec<usize> = (0..self.dataset.len()).collect();
        if self.shuffle {
            let mut rng = ChaCha8Rng::seed_from_u64(self.seed.wrapping_add(epoch as u64));
            indices.shuffle(&mut rng);
        }
        indices
    }

    fn prepare(&self, epoch: usize, position: usize, index: usize) -> PreparedImage {
        let item = &self.dataset.items()[index];
        let pixels = match &self.augmenter {
            Some(augmenter) => {
                let mut rng = ChaCha8Rng::seed_from_u64(sample_seed(self.seed, epoch, position));
                let image = chw_to_rgb(&item.pixels, self.dataset.width(), self.dataset.height());
                rgb_to_chw_unit(&augmenter.augment(&image, &mut rng))
            }
            None => item.pixels.iter().map(|&p| p as f32 / 255.0).collect(),
        };
        PreparedImage {
            pixels,
            label: item.label,
        }
    }

    fn prepare_chunk(&self, epoch: usize, offset: usize, chunk: &[usize]) -> Vec<PreparedImage> {
        match &self.pool {
            Some(pool) => pool.install(|| {
                chunk
                    .par_iter()
                    .enumerate()
                    .map(|(i, &index)| self.prepare(epoch, offset + i, index))
                    .collect()
            }),
            None => chunk
                .iter()
                .enumerate()
                .map(|(i, &index)| self.prepare(epoch, offset + i, index))
                .collect(),
        }
    }
}

impl<B: Backend> BatchSource<B> for ImageLoader<B> {
    fn num_items(&self) -> usize {
        self.dataset.len()
    }

    fn num_batches(&self) -> usize {
        self.dataset.len().div_ceil(self.batch_size)
    }

    fn batches(&self, epoch: usize) -> Box<dyn Iterator<Item = ImageBatch<B>> + '_> {
        let order = self.epoch_order(epoch);
        let batch_size = self.batch_size;
        let num_batches = BatchSource::<B>::num_batches(self);

        Box::new((0..num_batches).map(move |b| {
            let start = b * batch_size;
            let end = (start + batch_size).min(order.len());
            let items = self.prepare_chunk(epoch, start, &order[start..end]);
            self.batcher.batch(items, &self.device)
        }))
    }
}

/// Per-sample RNG seed
fn sample_seed(seed: u64, epoch: usize, position: usize) -> u64 {
    let mut z = seed
        ^ (epoch as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)
        ^ (position as u64).wrapping_mul(0xC2B2_AE3D_27D4_EB4F);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::LabeledImage;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    fn dataset(n: usize) -> Arc<ImageDataset> {
        let items = (0..n)
            .map(|i| LabeledImage {
                pixels: vec![(i * 20) as u8; 3 * 4 * 4],
                label: i % 10,
            })
            .collect();
        Arc::new(ImageDataset::new(items, 4, 4))
    }

    fn labels(batch: &ImageBatch<TestBackend>) -> Vec<i64> {
        batch.targets.clone().into_data().convert::<i64>().to_vec().unwrap()
    }

    #[test]
    fn test_partial_last_batch() {
        let loader = ImageLoader::<TestBackend>::new(dataset(10), 4, Default::default());
        assert_eq!(loader.num_items(), 10);
        assert_eq!(loader.num_batches(), 3);

        let sizes: Vec<usize> = loader.batches(1).map(|b| b.len()).collect();
        assert_eq!(sizes, vec![4, 4, 2]);
    }

    #[test]
    fn test_unshuffled_keeps_order() {
        let loader = ImageLoader::<TestBackend>::new(dataset(5), 5, Default::default());
        let batch = loader.batches(1).next().unwrap();
        assert_eq!(labels(&batch), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_shuffle_is_seeded_per_epoch() {
        let a = ImageLoader::<TestBackend>::new(dataset(10), 10, Default::default()).shuffled(3);
        let b = ImageLoader::<TestBackend>::new(dataset(10), 10, Default::default()).shuffled(3);

        assert_eq!(a.epoch_order(1), b.epoch_order(1));
        assert_ne!(a.epoch_order(1), a.epoch_order(2));

        let mut sorted = a.epoch_order(1);
        sorted.sort_unstable();
        assert_eq!(sorted, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_workers_do_not_change_augmentation() {
        let config = AugmentationConfig::default();
        let inline = ImageLoader::<TestBackend>::new(dataset(6), 3, Default::default())
            .shuffled(11)
            .with_augmentation(config.clone());
        let pooled = ImageLoader::<TestBackend>::new(dataset(6), 3, Default::default())
            .shuffled(11)
            .with_augmentation(config)
            .with_workers(2)
            .unwrap();

        for (x, y) in inline.batches(2).zip(pooled.batches(2)) {
            let x: Vec<f32> = x.images.into_data().to_vec().unwrap();
            let y: Vec<f32> = y.images.into_data().to_vec().unwrap();
            assert_eq!(x, y);
        }
    }
}
