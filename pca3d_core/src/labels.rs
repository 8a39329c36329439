//! Per-sample labels shared by every snapshot of a trajectory.
//!
//! Labels may have any shape as long as the first dimension is the sample
//! count, and any of a handful of element types. Their values only tag
//! samples; nothing in the pipeline interprets them except optional colouring.

use serde::{Deserialize, Serialize};

use crate::error::{Result, VisError};

/// Element type of a label array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LabelType {
    Bool,
    I32,
    I64,
    F32,
    F64,
    Text,
}

impl std::fmt::Display for LabelType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LabelType::Bool => "bool",
            LabelType::I32 => "i32",
            LabelType::I64 => "i64",
            LabelType::F32 => "f32",
            LabelType::F64 => "f64",
            LabelType::Text => "text",
        };
        write!(f, "{}", name)
    }
}

/// Flat label storage, tagged with its element type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "dtype", content = "values", rename_all = "lowercase")]
pub enum LabelValues {
    Bool(Vec<bool>),
    I32(Vec<i32>),
    I64(Vec<i64>),
    F32(#[serde(with = "crate::array::lossless_f32")] Vec<f32>),
    F64(#[serde(with = "crate::array::lossless_f64")] Vec<f64>),
    Text(Vec<String>),
}

impl LabelValues {
    /// Number of stored elements.
    pub fn len(&self) -> usize {
        match self {
            LabelValues::Bool(v) => v.len(),
            LabelValues::I32(v) => v.len(),
            LabelValues::I64(v) => v.len(),
            LabelValues::F32(v) => v.len(),
            LabelValues::F64(v) => v.len(),
            LabelValues::Text(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dtype(&self) -> LabelType {
        match self {
            LabelValues::Bool(_) => LabelType::Bool,
            LabelValues::I32(_) => LabelType::I32,
            LabelValues::I64(_) => LabelType::I64,
            LabelValues::F32(_) => LabelType::F32,
            LabelValues::F64(_) => LabelType::F64,
            LabelValues::Text(_) => LabelType::Text,
        }
    }
}

/// Labels of shape `[samples, ...]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleLabels {
    shape: Vec<usize>,
    #[serde(rename = "data")]
    values: LabelValues,
}

impl SampleLabels {
    /// Creates labels with an explicit shape.
    ///
    /// Fails if the shape is empty or does not account for every value.
    pub fn new(shape: Vec<usize>, values: LabelValues) -> Result<Self> {
        let labels = Self { shape, values };
        labels.validate()?;
        Ok(labels)
    }

    /// Creates one-dimensional labels, one value per sample.
    pub fn from_values(values: LabelValues) -> Self {
        Self {
            shape: vec![values.len()],
            values,
        }
    }

    /// Checks the shape/value consistency (used after deserialization).
    pub fn validate(&self) -> Result<()> {
        if self.shape.is_empty() {
            return Err(VisError::shape(
                "labels.shape",
                "(samples, ...)",
                "()",
            ));
        }
        let expected: usize = self.shape.iter().product();
        if expected != self.values.len() {
            return Err(VisError::shape(
                "labels.values",
                format!("{} values for shape {:?}", expected, self.shape),
                format!("{} values", self.values.len()),
            ));
        }
        Ok(())
    }

    /// Number of samples (first dimension).
    pub fn num_samples(&self) -> usize {
        self.shape[0]
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn dtype(&self) -> LabelType {
        self.values.dtype()
    }

    pub fn values(&self) -> &LabelValues {
        &self.values
    }

    /// Numeric view of one-dimensional labels, for colouring points by label.
    ///
    /// Returns `None` for text labels or multi-dimensional labels.
    pub fn to_scalars(&self) -> Option<Vec<f64>> {
        if self.shape.len() != 1 {
            return None;
        }
        match &self.values {
            LabelValues::Bool(v) => Some(v.iter().map(|&b| if b { 1.0 } else { 0.0 }).collect()),
            LabelValues::I32(v) => Some(v.iter().map(|&x| x as f64).collect()),
            LabelValues::I64(v) => Some(v.iter().map(|&x| x as f64).collect()),
            LabelValues::F32(v) => Some(v.iter().map(|&x| x as f64).collect()),
            LabelValues::F64(v) => Some(v.clone()),
            LabelValues::Text(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multi_dimensional_labels() {
        let labels = SampleLabels::new(vec![3, 2], LabelValues::I64(vec![0, 1, 2, 3, 4, 5])).unwrap();
        assert_eq!(labels.num_samples(), 3);
        assert_eq!(labels.dtype(), LabelType::I64);
        assert!(labels.to_scalars().is_none());
    }

    #[test]
    fn test_shape_must_cover_values() {
        let result = SampleLabels::new(vec![4], LabelValues::Bool(vec![true, false]));
        assert!(matches!(result, Err(VisError::ShapeMismatch { .. })));

        let result = SampleLabels::new(vec![], LabelValues::Bool(vec![]));
        assert!(result.is_err());
    }

    #[test]
    fn test_json_layout() {
        let labels = SampleLabels::from_values(LabelValues::I32(vec![1, 2]));
        let json = serde_json::to_value(&labels).unwrap();
        assert_eq!(json["data"]["dtype"], "i32");
        assert_eq!(json["shape"], serde_json::json!([2]));

        let back: SampleLabels = serde_json::from_value(json).unwrap();
        assert_eq!(back, labels);
    }
}
