//! Models
//!
//! Distillation only needs a forward pass from either network, so both the
//! teacher and the student are seen through [`Classifier`]. The concrete
//! architecture shipped with the binary is the CIFAR ResNet in [`resnet`].

pub mod resnet;

use std::path::Path;

use burn::module::Module;
use burn::record::CompactRecorder;
use burn::tensor::{backend::Backend, Int, Tensor};
use tracing::info;

use crate::utils::error::{DistillError, Result};

pub use resnet::{resnet20, ResNet, ResNetConfig};

/// File extension written by [`CompactRecorder`]
pub const RECORD_EXTENSION: &str = "mpk";

/// Image classifier: per-class scores for a batch of images
pub trait Classifier<B: Backend> {
    /// `[batch, channels, height, width]` -> `[batch, num_classes]`
    fn logits(&self, images: Tensor<B, 4>) -> Tensor<B, 2>;

    /// Index of the highest score for every image
    fn predict(&self, images: Tensor<B, 4>) -> Tensor<B, 1, Int> {
        self.logits(images).argmax(1).squeeze::<1>(1)
    }
}

/// Load parameters saved with [`CompactRecorder`] into `model`.
///
/// `path` may be given with or without the `.mpk` extension.
pub fn load_record<B, M>(model: M, path: impl AsRef<Path>, device: &B::Device) -> Result<M>
where
    B: Backend,
    M: Module<B>,
{
    let path = path.as_ref();
    let with_ext = path.with_extension(RECORD_EXTENSION);
    if !path.exists() && !with_ext.exists() {
        return Err(DistillError::PathNotFound(with_ext));
    }

    model
        .load_file(path.to_path_buf(), &CompactRecorder::new(), device)
        .map_err(|e| DistillError::Model(format!("failed to load '{}': {}", path.display(), e)))
}

/// Build a ResNet-20 and fill it from a teacher record
pub fn load_teacher<B: Backend>(
    path: impl AsRef<Path>,
    num_classes: usize,
    device: &B::Device,
) -> Result<ResNet<B>> {
    let path = path.as_ref();
    let model = load_record(resnet20::<B>(num_classes, device), path, device)?;
    info!("Loaded teacher from {}", path.display());
    Ok(model)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::record::CompactRecorder;
    use burn_ndarray::NdArray;
    use tempfile::TempDir;

    type TestBackend = NdArray<f32>;

    struct Fixed;

    impl<B: Backend> Classifier<B> for Fixed {
        fn logits(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
            let device = images.device();
            Tensor::<B, 2>::from_floats([[0.1, 0.9, 0.0], [2.0, -1.0, 0.5]], &device)
        }
    }

    #[test]
    fn test_predict_is_argmax() {
        let device = Default::default();
        let images = Tensor::<TestBackend, 4>::zeros([2, 3, 1, 1], &device);
        let preds: Vec<i64> = Fixed
            .predict(images)
            .into_data()
            .convert::<i64>()
            .to_vec()
            .unwrap();
        assert_eq!(preds, vec![1, 0]);
    }

    #[test]
    fn test_missing_teacher_record() {
        let device = Default::default();
        let result = load_teacher::<TestBackend>("/nonexistent/teacher", 10, &device);
        assert!(matches!(result, Err(DistillError::PathNotFound(_))));
    }

    #[test]
    fn test_teacher_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("teacher");
        let device = Default::default();

        let original = ResNetConfig::new()
            .with_blocks_per_stage(1)
            .init::<TestBackend>(&device);
        original
            .clone()
            .save_file(path.clone(), &CompactRecorder::new())
            .unwrap();
        assert!(path.with_extension(RECORD_EXTENSION).exists());

        let restored = load_record(
            ResNetConfig::new()
                .with_blocks_per_stage(1)
                .init::<TestBackend>(&device),
            &path,
            &device,
        )
        .unwrap();

        let input = Tensor::<TestBackend, 4>::ones([1, 3, 8, 8], &device);
        let a: Vec<f32> = original.forward(input.clone()).into_data().to_vec().unwrap();
        let b: Vec<f32> = restored.forward(input).into_data().to_vec().unwrap();
        for (x, y) in a.iter().zip(&b) {
            assert!((x - y).abs() < 1e-2);
        }
    }
}
