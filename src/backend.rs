//! Backend selection
//!
//! CUDA when built with the `cuda` feature, NdArray on the CPU otherwise.
//! Training runs on `Autodiff<DefaultBackend>`; the frozen teacher and all
//! evaluation run on the plain `DefaultBackend`.

use burn::backend::Autodiff;
use burn::tensor::backend::Backend;

#[cfg(feature = "cuda")]
pub type DefaultBackend = burn_cuda::Cuda;

#[cfg(all(not(feature = "cuda"), any(feature = "ndarray", feature = "cpu")))]
pub type DefaultBackend = burn_ndarray::NdArray;

#[cfg(all(not(feature = "cuda"), not(feature = "ndarray"), not(feature = "cpu")))]
compile_error!("At least one backend (cuda, ndarray, or cpu) must be enabled!");

/// Autodiff backend the student is trained on
pub type TrainingBackend = Autodiff<DefaultBackend>;

/// Environment variable restricting which GPUs the CUDA runtime can see
pub const CUDA_VISIBLE_DEVICES: &str = "CUDA_VISIBLE_DEVICES";

/// Restrict the process to a single physical GPU.
///
/// Must run before any accelerator library initializes; after this call the
/// selected GPU is addressed as device 0.
pub fn select_gpu(index: usize) {
    std::env::set_var(CUDA_VISIBLE_DEVICES, index.to_string());
}

/// GPU mask currently in effect, if any
pub fn visible_gpus() -> Option<String> {
    std::env::var(CUDA_VISIBLE_DEVICES).ok()
}

pub fn default_device() -> <DefaultBackend as Backend>::Device {
    <DefaultBackend as Backend>::Device::default()
}

/// Human-readable name of the compiled backend
pub fn backend_name() -> &'static str {
    #[cfg(feature = "cuda")]
    {
        "CUDA (GPU)"
    }

    #[cfg(all(not(feature = "cuda"), any(feature = "ndarray", feature = "cpu")))]
    {
        "NdArray (CPU)"
    }
}
