// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Image classification through pre-trained models
//!
//! The adapter resizes and scales an image to the model's input, runs
//! inference, turns the output into a probability distribution and maps the
//! arg-max index to a label from the caller's class list.

pub mod log;
pub mod onnx;
pub mod registry;
pub mod upload;

use image::imageops::FilterType;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{LepiError, Result};

pub use log::{ClassificationLog, ClassificationRecord};
pub use registry::{ModelRegistry, ModelStatus, Prediction};
pub use upload::{save_upload, webcam_capture_name};

/// Outputs summing to within this of 1.0 are treated as probabilities
const PROBABILITY_TOLERANCE: f32 = 1e-3;

/// The four classifiers of the farm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassifierKind {
    Species,
    LifeStages,
    PupaeDefects,
    LarvalDiseases,
}

impl ClassifierKind {
    pub const ALL: [ClassifierKind; 4] = [
        ClassifierKind::Species,
        ClassifierKind::LifeStages,
        ClassifierKind::PupaeDefects,
        ClassifierKind::LarvalDiseases,
    ];

    /// Human-readable name
    pub fn label(&self) -> &'static str {
        match self {
            ClassifierKind::Species => "Butterfly Species",
            ClassifierKind::LifeStages => "Life Stages",
            ClassifierKind::PupaeDefects => "Pupae Defects",
            ClassifierKind::LarvalDiseases => "Larval Diseases",
        }
    }

    /// Identifier used in URLs, forms and the CLI
    pub fn slug(&self) -> &'static str {
        match self {
            ClassifierKind::Species => "species",
            ClassifierKind::LifeStages => "life_stages",
            ClassifierKind::PupaeDefects => "pupae_defects",
            ClassifierKind::LarvalDiseases => "larval_diseases",
        }
    }

    pub(crate) fn index(&self) -> usize {
        match self {
            ClassifierKind::Species => 0,
            ClassifierKind::LifeStages => 1,
            ClassifierKind::PupaeDefects => 2,
            ClassifierKind::LarvalDiseases => 3,
        }
    }
}

impl fmt::Display for ClassifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for ClassifierKind {
    type Err = LepiError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "species" | "butterfly_species" => Ok(ClassifierKind::Species),
            "life_stages" | "stages" => Ok(ClassifierKind::LifeStages),
            "pupae_defects" | "defects" => Ok(ClassifierKind::PupaeDefects),
            "larval_diseases" | "diseases" => Ok(ClassifierKind::LarvalDiseases),
            _ => Err(LepiError::Validation(format!("Unknown classifier: {}", s))),
        }
    }
}

/// A model that maps one NHWC image batch to a score vector
pub trait InferenceModel: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str;

    /// Input resolution as (width, height)
    fn input_size(&self) -> (u32, u32);

    /// Run inference on a `[1, height, width, 3]` tensor of values in `[0, 1]`
    fn predict(&self, input: &[f32]) -> Result<Vec<f32>>;
}

/// Outcome of classifying one image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Classification {
    /// A label from the class list, with confidence in percent
    Label { label: String, confidence: f64 },
    /// The arg-max index had no label (or the model produced no scores)
    Unknown { index: Option<usize> },
}

impl Classification {
    pub fn label(&self) -> Option<&str> {
        match self {
            Classification::Label { label, .. } => Some(label),
            Classification::Unknown { .. } => None,
        }
    }

    pub fn confidence(&self) -> f64 {
        match self {
            Classification::Label { confidence, .. } => *confidence,
            Classification::Unknown { .. } => 0.0,
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Classification::Unknown { .. })
    }
}

/// Decode an image and build a `[1, height, width, 3]` tensor scaled to `[0, 1]`
pub fn preprocess(bytes: &[u8], (width, height): (u32, u32)) -> Result<Vec<f32>> {
    if width == 0 || height == 0 {
        return Err(LepiError::Inference(format!("Invalid model input size {}x{}", width, height)));
    }

    let img = image::load_from_memory(bytes)?;
    let rgb = img.resize_exact(width, height, FilterType::Triangle).to_rgb8();

    Ok(rgb.into_raw().into_iter().map(|v| v as f32 / 255.0).collect())
}

/// Softmax, shifted by the maximum for stability
fn softmax(scores: &[f32]) -> Vec<f32> {
    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = scores.iter().map(|&s| (s - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

/// Treat the output as probabilities, normalizing only multi-class outputs
/// that do not already sum to one
pub fn to_probabilities(raw: &[f32]) -> Vec<f32> {
    let sum: f32 = raw.iter().sum();
    if raw.len() > 1 && (sum - 1.0).abs() > PROBABILITY_TOLERANCE {
        softmax(raw)
    } else {
        raw.to_vec()
    }
}

fn argmax(values: &[f32]) -> Option<(usize, f32)> {
    values
        .iter()
        .copied()
        .enumerate()
        .filter(|(_, v)| !v.is_nan())
        .fold(None, |best, (i, v)| match best {
            Some((_, b)) if b >= v => best,
            _ => Some((i, v)),
        })
}

/// Map a raw output vector to a label and a 0-100 confidence
pub fn interpret_scores(raw: &[f32], class_names: &[String]) -> Classification {
    let probabilities = to_probabilities(raw);
    let Some((index, max)) = argmax(&probabilities) else {
        return Classification::Unknown { index: None };
    };

    match class_names.get(index) {
        Some(label) => Classification::Label {
            label: label.clone(),
            confidence: (f64::from(max) * 100.0 * 100.0).round() / 100.0,
        },
        None => Classification::Unknown { index: Some(index) },
    }
}

/// Classify an encoded image with a model and an index-aligned class list
pub fn classify_image(
    bytes: &[u8],
    model: &dyn InferenceModel,
    class_names: &[String],
) -> Result<Classification> {
    let input = preprocess(bytes, model.input_size())?;
    let raw = model.predict(&input)?;
    tracing::debug!("{} produced {} scores", model.name(), raw.len());
    Ok(interpret_scores(&raw, class_names))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{ImageBuffer, ImageFormat, Rgb};
    use std::io::Cursor;
    use std::sync::Mutex;

    /// Model returning fixed scores and remembering the last input
    pub(crate) struct FixedModel {
        pub scores: Vec<f32>,
        pub size: (u32, u32),
        pub last_input: Mutex<Vec<f32>>,
    }

    impl FixedModel {
        pub(crate) fn new(scores: Vec<f32>) -> Self {
            Self { scores, size: (4, 2), last_input: Mutex::new(Vec::new()) }
        }
    }

    impl InferenceModel for FixedModel {
        fn name(&self) -> &str {
            "fixed"
        }

        fn input_size(&self) -> (u32, u32) {
            self.size
        }

        fn predict(&self, input: &[f32]) -> Result<Vec<f32>> {
            *self.last_input.lock().unwrap() = input.to_vec();
            Ok(self.scores.clone())
        }
    }

    pub(crate) fn png_bytes(width: u32, height: u32, color: [u8; 3]) -> Vec<u8> {
        let img: ImageBuffer<Rgb<u8>, Vec<u8>> = ImageBuffer::from_pixel(width, height, Rgb(color));
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png).unwrap();
        bytes
    }

    fn names(labels: &[&str]) -> Vec<String> {
        labels.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_probabilities_are_not_renormalized() {
        let result = interpret_scores(&[0.1, 0.7, 0.2], &names(&["A", "B", "C"]));
        assert_eq!(result, Classification::Label { label: "B".to_string(), confidence: 70.0 });
    }

    #[test]
    fn test_logits_get_softmax() {
        let result = interpret_scores(&[1.0, 3.0, 0.5], &names(&["A", "B", "C"]));
        assert_eq!(result.label(), Some("B"));
        let expected = 3f64.exp() / (1f64.exp() + 3f64.exp() + 0.5f64.exp()) * 100.0;
        assert!((result.confidence() - expected).abs() < 0.01);
    }

    #[test]
    fn test_single_output_is_used_as_probability() {
        let result = interpret_scores(&[0.83], &names(&["Healthy"]));
        let expected = Classification::Label { label: "Healthy".to_string(), confidence: 83.0 };
        assert_eq!(result, expected);
    }

    #[test]
    fn test_index_outside_class_list_is_unknown() {
        let result = interpret_scores(&[0.1, 0.1, 0.8], &names(&["A", "B"]));
        assert_eq!(result, Classification::Unknown { index: Some(2) });
        assert_eq!(result.confidence(), 0.0);

        assert_eq!(interpret_scores(&[0.5, 0.5], &[]), Classification::Unknown { index: Some(0) });
    }

    #[test]
    fn test_empty_output_is_unknown() {
        assert_eq!(interpret_scores(&[], &names(&["A"])), Classification::Unknown { index: None });
    }

    #[test]
    fn test_nan_scores_are_ignored() {
        let result = interpret_scores(&[f32::NAN, 0.9, 0.1], &names(&["A", "B", "C"]));
        assert_eq!(result.label(), Some("B"));
    }

    #[test]
    fn test_preprocess_scales_and_resizes() {
        let bytes = png_bytes(10, 6, [255, 0, 51]);
        let input = preprocess(&bytes, (4, 2)).unwrap();
        assert_eq!(input.len(), 4 * 2 * 3);
        assert!((input[0] - 1.0).abs() < 1e-6);
        assert!(input[1].abs() < 1e-6);
        assert!((input[2] - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_preprocess_rejects_garbage() {
        assert!(matches!(preprocess(b"not an image", (4, 4)), Err(LepiError::Image(_))));
    }

    #[test]
    fn test_classify_image_end_to_end() {
        let model = FixedModel::new(vec![0.05, 0.9, 0.05]);
        let image = png_bytes(8, 8, [10, 20, 30]);
        let result = classify_image(&image, &model, &names(&["Eggs", "Larvae", "Pupae"])).unwrap();
        assert_eq!(result, Classification::Label { label: "Larvae".to_string(), confidence: 90.0 });
        assert_eq!(model.last_input.lock().unwrap().len(), 4 * 2 * 3);
    }

    #[test]
    fn test_kind_parsing() {
        assert_eq!("species".parse::<ClassifierKind>().unwrap(), ClassifierKind::Species);
        assert_eq!("Life Stages".parse::<ClassifierKind>().unwrap(), ClassifierKind::LifeStages);
        let kind: ClassifierKind = "pupae-defects".parse().unwrap();
        assert_eq!(kind, ClassifierKind::PupaeDefects);
        assert!("wings".parse::<ClassifierKind>().is_err());
        for kind in ClassifierKind::ALL {
            assert_eq!(kind.slug().parse::<ClassifierKind>().unwrap(), kind);
        }
    }
}
