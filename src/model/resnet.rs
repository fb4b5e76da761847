//! CIFAR-style ResNet
//!
//! Three stages of basic residual blocks at 16, 32 and 64 channels, the last
//! two downsampling by 2. With three blocks per stage this is ResNet-20
//! (6n + 2 layers for n = 3). Shortcuts that change shape use a 1x1
//! convolution followed by batch norm.

use burn::{
    config::Config,
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig},
        BatchNorm, BatchNormConfig, Linear, LinearConfig, PaddingConfig2d, Relu,
    },
    tensor::{backend::Backend, Tensor},
};

use crate::model::Classifier;

#[derive(Config, Debug)]
pub struct ResNetConfig {
    /// Number of output classes
    #[config(default = "10")]
    pub num_classes: usize,

    /// Residual blocks in each of the three stages
    #[config(default = "3")]
    pub blocks_per_stage: usize,

    /// Channels of the first stage; doubled at each later stage
    #[config(default = "16")]
    pub base_width: usize,

    #[config(default = "3")]
    pub in_channels: usize,
}

impl ResNetConfig {
    /// Total weighted layers: stem + two convs per block + classifier
    pub fn depth(&self) -> usize {
        6 * self.blocks_per_stage + 2
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> ResNet<B> {
        let stem = conv3x3(self.in_channels, self.base_width, 1, device);
        let stem_bn = BatchNormConfig::new(self.base_width).init(device);

        let mut blocks = Vec::with_capacity(3 * self.blocks_per_stage);
        let mut in_planes = self.base_width;
        for stage in 0..3 {
            let planes = self.base_width << stage;
            for i in 0..self.blocks_per_stage {
                let stride = if stage > 0 && i == 0 { 2 } else { 1 };
                blocks.push(BasicBlock::new(in_planes, planes, stride, device));
                in_planes = planes;
            }
        }

        ResNet {
            stem,
            stem_bn,
            blocks,
            pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            fc: LinearConfig::new(in_planes, self.num_classes).init(device),
            relu: Relu::new(),
            num_classes: self.num_classes,
        }
    }
}

fn conv3x3<B: Backend>(in_ch: usize, out_ch: usize, stride: usize, device: &B::Device) -> Conv2d<B> {
    Conv2dConfig::new([in_ch, out_ch], [3, 3])
        .with_stride([stride, stride])
        .with_padding(PaddingConfig2d::Explicit(1, 1))
        .with_bias(false)
        .init(device)
}

/// 1x1 projection used when a block changes resolution or width
#[derive(Module, Debug)]
pub struct Projection<B: Backend> {
    conv: Conv2d<B>,
    bn: BatchNorm<B, 2>,
}

impl<B: Backend> Projection<B> {
    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.bn.forward(self.conv.forward(x))
    }
}

#[derive(Module, Debug)]
pub struct BasicBlock<B: Backend> {
    conv1: Conv2d<B>,
    bn1: BatchNorm<B, 2>,
    conv2: Conv2d<B>,
    bn2: BatchNorm<B, 2>,
    shortcut: Option<Projection<B>>,
    relu: Relu,
}

impl<B: Backend> BasicBlock<B> {
    pub fn new(in_planes: usize, planes: usize, stride: usize, device: &B::Device) -> Self {
        let shortcut = if stride != 1 || in_planes != planes {
            Some(Projection {
                conv: Conv2dConfig::new([in_planes, planes], [1, 1])
                    .with_stride([stride, stride])
                    .with_bias(false)
                    .init(device),
                bn: BatchNormConfig::new(planes).init(device),
            })
        } else {
            None
        };

        Self {
            conv1: conv3x3(in_planes, planes, stride, device),
            bn1: BatchNormConfig::new(planes).init(device),
            conv2: conv3x3(planes, planes, 1, device),
            bn2: BatchNormConfig::new(planes).init(device),
            shortcut,
            relu: Relu::new(),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let identity = match &self.shortcut {
            Some(projection) => projection.forward(x.clone()),
            None => x.clone(),
        };

        let out = self.relu.forward(self.bn1.forward(self.conv1.forward(x)));
        let out = self.bn2.forward(self.conv2.forward(out));
        self.relu.forward(out + identity)
    }
}

#[derive(Module, Debug)]
pub struct ResNet<B: Backend> {
    stem: Conv2d<B>,
    stem_bn: BatchNorm<B, 2>,
    blocks: Vec<BasicBlock<B>>,
    pool: AdaptiveAvgPool2d,
    fc: Linear<B>,
    relu: Relu,
    num_classes: usize,
}

impl<B: Backend> ResNet<B> {
    /// `[batch, 3, H, W]` -> logits `[batch, num_classes]`
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let mut x = self.relu.forward(self.stem_bn.forward(self.stem.forward(x)));
        for block in &self.blocks {
            x = block.forward(x);
        }

        let x = self.pool.forward(x);
        let [batch_size, channels, _, _] = x.dims();
        self.fc.forward(x.reshape([batch_size, channels]))
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }
}

impl<B: Backend> Classifier<B> for ResNet<B> {
    fn logits(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        self.forward(images)
    }
}

/// ResNet-20 for 32x32 inputs
pub fn resnet20<B: Backend>(num_classes: usize, device: &B::Device) -> ResNet<B> {
    ResNetConfig::new().with_num_classes(num_classes).init(device)
}
