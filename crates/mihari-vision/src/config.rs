use image::DynamicImage;
use serde::{Deserialize, Serialize};

use crate::ops;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Interpolation {
    Nearest,
    Bilinear,
    Bicubic,
    Lanczos,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenoiseMethod {
    NlMeans,
    Bilateral,
    Median,
    Gaussian,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinarizeMethod {
    Otsu,
    AdaptiveGaussian,
    AdaptiveMean,
    Fixed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MorphOp {
    Close,
    Open,
    Dilate,
    Erode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PadColor {
    White,
    Black,
}

/// One preprocessing operation with its parameters. The tag names are
/// the persisted form and must stay stable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepOp {
    Scale {
        factor: f32,
        interpolation: Interpolation,
    },
    Grayscale,
    AutoInvert {
        threshold: u8,
    },
    Contrast {
        factor: f32,
        brightness: f32,
    },
    Equalize {
        clip_limit: f32,
        grid_size: u32,
    },
    Sharpen {
        amount: f32,
        radius: f32,
    },
    Denoise {
        method: DenoiseMethod,
        strength: u8,
    },
    Binarize {
        method: BinarizeMethod,
        block_size: u32,
        constant: i32,
        threshold: u8,
    },
    Morphology {
        op: MorphOp,
        kernel_size: u32,
        iterations: u32,
    },
    Pad {
        pixels: u32,
        color: PadColor,
    },
}

impl StepOp {
    pub fn kind_name(&self) -> &'static str {
        match self {
            StepOp::Scale { .. } => "scale",
            StepOp::Grayscale => "grayscale",
            StepOp::AutoInvert { .. } => "auto_invert",
            StepOp::Contrast { .. } => "contrast",
            StepOp::Equalize { .. } => "equalize",
            StepOp::Sharpen { .. } => "sharpen",
            StepOp::Denoise { .. } => "denoise",
            StepOp::Binarize { .. } => "binarize",
            StepOp::Morphology { .. } => "morphology",
            StepOp::Pad { .. } => "pad",
        }
    }

    /// Pure transform of the image under this step's parameters.
    pub fn apply(&self, image: DynamicImage) -> DynamicImage {
        match *self {
            StepOp::Scale {
                factor,
                interpolation,
            } => ops::scale(image, factor, interpolation),
            StepOp::Grayscale => ops::grayscale(image),
            StepOp::AutoInvert { threshold } => ops::auto_invert(image, threshold),
            StepOp::Contrast { factor, brightness } => {
                ops::contrast_brightness(image, factor, brightness)
            }
            StepOp::Equalize {
                clip_limit,
                grid_size,
            } => ops::equalize(image, clip_limit, grid_size),
            StepOp::Sharpen { amount, radius } => ops::sharpen(image, amount, radius),
            StepOp::Denoise { method, strength } => ops::denoise(image, method, strength),
            StepOp::Binarize {
                method,
                block_size,
                constant,
                threshold,
            } => ops::binarize(image, method, block_size, constant, threshold),
            StepOp::Morphology {
                op,
                kernel_size,
                iterations,
            } => ops::morphology(image, op, kernel_size, iterations),
            StepOp::Pad { pixels, color } => ops::pad(image, pixels, color),
        }
    }
}

/// A step plus its enable flag. Disabled steps are skipped at apply
/// time but keep their parameters through serialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineStep {
    pub enabled: bool,
    #[serde(flatten)]
    pub op: StepOp,
}

impl PipelineStep {
    pub fn new(enabled: bool, op: StepOp) -> Self {
        Self { enabled, op }
    }
}

/// Ordered preprocessing configuration. Step order is significant and
/// preserved exactly as configured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub steps: Vec<PipelineStep>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            steps: vec![
                PipelineStep::new(
                    true,
                    StepOp::Scale {
                        factor: 2.0,
                        interpolation: Interpolation::Lanczos,
                    },
                ),
                PipelineStep::new(true, StepOp::Grayscale),
                PipelineStep::new(true, StepOp::AutoInvert { threshold: 127 }),
                PipelineStep::new(
                    false,
                    StepOp::Contrast {
                        factor: 1.5,
                        brightness: 1.0,
                    },
                ),
                PipelineStep::new(
                    true,
                    StepOp::Equalize {
                        clip_limit: 2.0,
                        grid_size: 8,
                    },
                ),
                PipelineStep::new(
                    false,
                    StepOp::Sharpen {
                        amount: 1.5,
                        radius: 1.0,
                    },
                ),
                PipelineStep::new(
                    false,
                    StepOp::Denoise {
                        method: DenoiseMethod::NlMeans,
                        strength: 10,
                    },
                ),
                PipelineStep::new(
                    false,
                    StepOp::Binarize {
                        method: BinarizeMethod::AdaptiveGaussian,
                        block_size: 11,
                        constant: 2,
                        threshold: 128,
                    },
                ),
                PipelineStep::new(
                    false,
                    StepOp::Morphology {
                        op: MorphOp::Close,
                        kernel_size: 2,
                        iterations: 1,
                    },
                ),
                PipelineStep::new(
                    true,
                    StepOp::Pad {
                        pixels: 8,
                        color: PadColor::White,
                    },
                ),
            ],
        }
    }
}

impl PipelineConfig {
    /// Run every enabled step in configured order.
    pub fn apply(&self, image: DynamicImage) -> DynamicImage {
        let mut out = image;
        for step in self.steps.iter().filter(|s| s.enabled) {
            let t0 = std::time::Instant::now();
            out = step.op.apply(out);
            tracing::trace!(
                step = step.op.kind_name(),
                elapsed_ms = t0.elapsed().as_millis() as u64,
                "preprocess step"
            );
        }
        out
    }
}
