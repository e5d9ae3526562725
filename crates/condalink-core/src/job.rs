//! Job descriptor: the serializable argument bundle handed to the worker.
//!
//! The wire keys are the contract with the companion script — renaming a
//! field here requires the matching change in `worker/link.py`.

use serde::{Deserialize, Serialize};

use crate::wslpath::to_wsl_path;

/// One unit of delegated work. Opaque to the bridge beyond structural
/// validation; immutable once constructed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobDescriptor {
    /// Host path to the input scan (file or directory).
    pub input: String,
    /// Host path to the directory holding the trained models.
    pub dir_models: String,
    /// Landmark types to identify (e.g. `["O", "MB", "DB"]`).
    pub lm_type: Vec<String>,
    /// Tooth selectors (e.g. `["UR6", "UL1"]`).
    pub teeth: Vec<String>,
    /// Whether outputs are grouped into a per-scan folder.
    pub save_in_folder: bool,
    /// Host path to the output directory.
    pub output_dir: String,
    /// Rendering view size in pixels.
    pub image_size: u32,
    /// Gaussian blur radius applied to rendered views.
    pub blur_radius: f64,
    /// Rasterizer faces-per-pixel setting.
    pub faces_per_pixel: u32,
}

impl JobDescriptor {
    /// Rendering defaults carried over from the reference pipeline.
    pub const DEFAULT_IMAGE_SIZE: u32 = 224;
    pub const DEFAULT_BLUR_RADIUS: f64 = 0.0;
    pub const DEFAULT_FACES_PER_PIXEL: u32 = 1;

    pub fn new(
        input: impl Into<String>,
        dir_models: impl Into<String>,
        lm_type: Vec<String>,
        teeth: Vec<String>,
        save_in_folder: bool,
        output_dir: impl Into<String>,
    ) -> Self {
        Self {
            input: input.into(),
            dir_models: dir_models.into(),
            lm_type,
            teeth,
            save_in_folder,
            output_dir: output_dir.into(),
            image_size: Self::DEFAULT_IMAGE_SIZE,
            blur_radius: Self::DEFAULT_BLUR_RADIUS,
            faces_per_pixel: Self::DEFAULT_FACES_PER_PIXEL,
        }
    }

    /// Copy with every path-valued field translated into the WSL namespace.
    /// Non-path fields pass through untouched.
    pub fn to_wsl(&self) -> Self {
        Self {
            input: to_wsl_path(&self.input),
            dir_models: to_wsl_path(&self.dir_models),
            output_dir: to_wsl_path(&self.output_dir),
            ..self.clone()
        }
    }
}
