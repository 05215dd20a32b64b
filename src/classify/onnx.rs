// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! ONNX Runtime backed classifier model

use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Tensor;
use std::path::Path;
use std::sync::Mutex;

use super::InferenceModel;
use crate::{LepiError, Result};

fn inference_error(context: &str, e: impl std::fmt::Display) -> LepiError {
    LepiError::Inference(format!("{}: {}", context, e))
}

/// An image classifier session taking one NHWC input
pub struct OnnxModel {
    name: String,
    session: Mutex<Session>,
    input_name: String,
    input_size: (u32, u32),
}

impl OnnxModel {
    /// Load a model file. `input_size` is (width, height).
    pub fn load(path: &Path, input_size: (u32, u32)) -> Result<Self> {
        let session = Session::builder()
            .map_err(|e| inference_error("Failed to create session builder", e))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| inference_error("Failed to set optimization level", e))?
            .commit_from_file(path)
            .map_err(|e| inference_error("Failed to load ONNX model", e))?;

        let input_name = session
            .inputs()
            .first()
            .map(|input| input.name().to_string())
            .ok_or_else(|| LepiError::Inference(format!("{:?} declares no inputs", path)))?;

        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "model".to_string());

        Ok(Self {
            name,
            session: Mutex::new(session),
            input_name,
            input_size,
        })
    }
}

impl InferenceModel for OnnxModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn input_size(&self) -> (u32, u32) {
        self.input_size
    }

    fn predict(&self, input: &[f32]) -> Result<Vec<f32>> {
        let (width, height) = self.input_size;
        let tensor = Tensor::from_array((
            [1usize, height as usize, width as usize, 3],
            input.to_vec().into_boxed_slice(),
        ))
        .map_err(|e| inference_error("Failed to create tensor", e))?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| LepiError::Inference(format!("Failed to lock model: {}", e)))?;

        let outputs = session
            .run(ort::inputs![self.input_name.as_str() => tensor])
            .map_err(|e| inference_error("Inference failed", e))?;

        let output = outputs
            .values()
            .next()
            .ok_or_else(|| LepiError::Inference("Model produced no outputs".to_string()))?;

        let (_shape, data) = output
            .try_extract_tensor::<f32>()
            .map_err(|e| inference_error("Failed to extract output tensor", e))?;

        Ok(data.to_vec())
    }
}
