//! CIFAR-10 binary distribution reader
//!
//! Each record is one label byte followed by 3072 pixel bytes: the 32x32
//! red plane, then green, then blue, each row-major. That is already the
//! channel-first layout the batcher wants, so pixels are kept as-is.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::dataset::{ImageDataset, LabeledImage};
use crate::utils::error::{DistillError, Result};

pub const IMAGE_SIZE: usize = 32;
pub const CHANNELS: usize = 3;
pub const NUM_CLASSES: usize = 10;
pub const PIXELS_PER_IMAGE: usize = CHANNELS * IMAGE_SIZE * IMAGE_SIZE;
pub const RECORD_SIZE: usize = 1 + PIXELS_PER_IMAGE;

/// Per-channel mean of the training images
pub const CIFAR10_MEAN: [f32; 3] = [0.4914, 0.4822, 0.4465];
/// Per-channel standard deviation used for normalization
pub const CIFAR10_STD: [f32; 3] = [0.2023, 0.1994, 0.2010];

/// Sub-directory created by extracting `cifar-10-binary.tar.gz`
pub const EXTRACTED_DIR: &str = "cifar-10-batches-bin";

pub const CLASS_NAMES: [&str; NUM_CLASSES] = [
    "airplane",
    "automobile",
    "bird",
    "cat",
    "deer",
    "dog",
    "frog",
    "horse",
    "ship",
    "truck",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Split {
    Train,
    Test,
}

impl Split {
    pub fn file_names(&self) -> Vec<String> {
        match self {
            Split::Train => (1..=5).map(|i| format!("data_batch_{i}.bin")).collect(),
            Split::Test => vec!["test_batch.bin".to_string()],
        }
    }
}

impl std::fmt::Display for Split {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Split::Train => write!(f, "train"),
            Split::Test => write!(f, "test"),
        }
    }
}

/// Directory that actually holds the batch files: `<root>/cifar-10-batches-bin`
/// when present, otherwise `root` itself.
pub fn resolve_batch_dir(root: &Path) -> PathBuf {
    let nested = root.join(EXTRACTED_DIR);
    if nested.is_dir() {
        nested
    } else {
        root.to_path_buf()
    }
}

/// Load one split from a CIFAR-10 binary directory
pub fn load_split(root: impl AsRef<Path>, split: Split) -> Result<ImageDataset> {
    let dir = resolve_batch_dir(root.as_ref());
    let mut items = Vec::new();

    for name in split.file_names() {
        let path = dir.join(&name);
        if !path.exists() {
            return Err(DistillError::Dataset(format!(
                "missing CIFAR-10 file '{}' (expected the binary distribution under {})",
                name,
                dir.display()
            )));
        }
        let bytes = std::fs::read(&path)?;
        let before = items.len();
        parse_records(&bytes, &mut items)
            .map_err(|e| DistillError::Dataset(format!("{}: {}", path.display(), e)))?;
        debug!("Read {} records from {}", items.len() - before, path.display());
    }

    info!("Loaded CIFAR-10 {} split: {} images", split, items.len());
    let dataset = ImageDataset::new(items, IMAGE_SIZE, IMAGE_SIZE);
    debug!("{} class counts: {}", split, class_summary(&dataset));
    Ok(dataset)
}

/// `name=count` pairs in label order
pub fn class_summary(dataset: &ImageDataset) -> String {
    CLASS_NAMES
        .iter()
        .zip(dataset.class_counts(NUM_CLASSES))
        .map(|(name, count)| format!("{name}={count}"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Decode raw record bytes, appending to `out`
pub fn parse_records(bytes: &[u8], out: &mut Vec<LabeledImage>) -> std::result::Result<(), String> {
    if bytes.is_empty() || bytes.len() % RECORD_SIZE != 0 {
        return Err(format!(
            "size {} is not a positive multiple of the {}-byte record",
            bytes.len(),
            RECORD_SIZE
        ));
    }

    out.reserve(bytes.len() / RECORD_SIZE);
    for (index, record) in bytes.chunks_exact(RECORD_SIZE).enumerate() {
        let label = record[0] as usize;
        if label >= NUM_CLASSES {
            return Err(format!("record {index} has label {label}"));
        }
        out.push(LabeledImage {
            pixels: record[1..].to_vec(),
            label,
        });
    }
    Ok(())
}
