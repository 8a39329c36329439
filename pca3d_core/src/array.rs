//! Named dense arrays as they appear in archives and input bundles.
//!
//! Matrices are stored row-major as `{ "shape": [rows, cols], "data": [...] }`,
//! which keeps files readable and independent of nalgebra's column-major
//! in-memory layout. JSON numbers cannot hold NaN or infinities, so float
//! arrays go through [`lossless_f64`] / [`lossless_f32`], which write those
//! as the strings `"NaN"`, `"inf"` and `"-inf"`.

use nalgebra::DMatrix;
use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

use crate::error::{Result, VisError};

/// A row-major, rank-2 array record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrayRecord {
    /// `[rows, cols]`
    pub shape: Vec<usize>,
    /// Row-major values, `rows * cols` long
    #[serde(with = "lossless_f64")]
    pub data: Vec<f64>,
}

impl ArrayRecord {
    /// Captures a matrix in row-major order.
    pub fn from_matrix(matrix: &DMatrix<f64>) -> Self {
        Self {
            shape: vec![matrix.nrows(), matrix.ncols()],
            // the transpose's column-major storage is the original's row-major order
            data: matrix.transpose().as_slice().to_vec(),
        }
    }

    /// Rebuilds the matrix, validating rank and element count.
    ///
    /// `field` names the array in error messages.
    pub fn to_matrix(&self, field: &str) -> Result<DMatrix<f64>> {
        if self.shape.len() != 2 {
            return Err(VisError::shape(
                field,
                "rank 2 (rows, cols)",
                format!("rank {} {:?}", self.shape.len(), self.shape),
            ));
        }
        let (rows, cols) = (self.shape[0], self.shape[1]);
        if rows * cols != self.data.len() {
            return Err(VisError::shape(
                format!("{}.data", field),
                format!("{} values for shape {:?}", rows * cols, self.shape),
                format!("{} values", self.data.len()),
            ));
        }
        Ok(DMatrix::from_row_slice(rows, cols, &self.data))
    }
}

/// Formats a matrix shape the way error messages report it.
pub(crate) fn shape_of(matrix: &DMatrix<f64>) -> String {
    format!("({}, {})", matrix.nrows(), matrix.ncols())
}

// ============================================================================
// NON-FINITE FLOATS
// ============================================================================

/// One float, written as a JSON number when finite and as a string otherwise.
#[derive(Debug, Clone, Copy)]
struct JsonFloat(f64);

impl Serialize for JsonFloat {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let v = self.0;
        if v.is_finite() {
            serializer.serialize_f64(v)
        } else if v.is_nan() {
            serializer.serialize_str("NaN")
        } else if v > 0.0 {
            serializer.serialize_str("inf")
        } else {
            serializer.serialize_str("-inf")
        }
    }
}

struct JsonFloatVisitor;

impl<'de> Visitor<'de> for JsonFloatVisitor {
    type Value = JsonFloat;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a number or one of \"NaN\", \"inf\", \"-inf\"")
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> std::result::Result<JsonFloat, E> {
        Ok(JsonFloat(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<JsonFloat, E> {
        Ok(JsonFloat(v as f64))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<JsonFloat, E> {
        Ok(JsonFloat(v as f64))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<JsonFloat, E> {
        match v {
            "NaN" | "nan" => Ok(JsonFloat(f64::NAN)),
            "inf" | "Infinity" => Ok(JsonFloat(f64::INFINITY)),
            "-inf" | "-Infinity" => Ok(JsonFloat(f64::NEG_INFINITY)),
            other => Err(E::invalid_value(de::Unexpected::Str(other), &self)),
        }
    }
}

impl<'de> Deserialize<'de> for JsonFloat {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_any(JsonFloatVisitor)
    }
}

/// `#[serde(with)]` adapter for `Vec<f64>` keeping NaN and infinities.
pub mod lossless_f64 {
    use super::JsonFloat;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(values: &[f64], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(values.iter().map(|&v| JsonFloat(v)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<f64>, D::Error> {
        let values: Vec<JsonFloat> = Vec::deserialize(deserializer)?;
        Ok(values.into_iter().map(|v| v.0).collect())
    }
}

/// `#[serde(with)]` adapter for `Vec<f32>` keeping NaN and infinities.
///
/// Values widen to `f64` on write, which is exact, and narrow back on read.
pub mod lossless_f32 {
    use super::JsonFloat;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(values: &[f32], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(values.iter().map(|&v| JsonFloat(v as f64)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<f32>, D::Error> {
        let values: Vec<JsonFloat> = Vec::deserialize(deserializer)?;
        Ok(values.into_iter().map(|v| v.0 as f32).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_major_layout() {
        let m = DMatrix::from_row_slice(2, 3, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let record = ArrayRecord::from_matrix(&m);

        assert_eq!(record.shape, vec![2, 3]);
        assert_eq!(record.data, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(record.to_matrix("m").unwrap(), m);
    }

    #[test]
    fn test_rejects_bad_element_count() {
        let record = ArrayRecord {
            shape: vec![2, 2],
            data: vec![1.0, 2.0, 3.0],
        };
        let err = record.to_matrix("projected_samples").unwrap_err();
        assert_eq!(err.field(), Some("projected_samples.data"));
    }

    #[test]
    fn test_rejects_wrong_rank() {
        let record = ArrayRecord {
            shape: vec![4],
            data: vec![1.0, 2.0, 3.0, 4.0],
        };
        assert!(matches!(
            record.to_matrix("x"),
            Err(VisError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_non_finite_values_survive_json() {
        let record = ArrayRecord {
            shape: vec![2, 2],
            data: vec![f64::NAN, f64::INFINITY, f64::NEG_INFINITY, -0.5],
        };
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"NaN\""));

        let back: ArrayRecord = serde_json::from_str(&json).unwrap();
        assert!(back.data[0].is_nan());
        assert_eq!(back.data[1], f64::INFINITY);
        assert_eq!(back.data[2], f64::NEG_INFINITY);
        assert_eq!(back.data[3], -0.5);
    }

    #[test]
    fn test_rejects_unknown_float_string() {
        let json = r#"{"shape":[1,1],"data":["many"]}"#;
        assert!(serde_json::from_str::<ArrayRecord>(json).is_err());
    }
}
