//! Projected snapshots - one processing stage's samples in a low-dimensional space.
//!
//! A snapshot is an immutable value: alignment and every other transform
//! produce a new snapshot instead of editing one in place.

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use crate::array::{shape_of, ArrayRecord};
use crate::error::{Result, VisError};
use crate::labels::SampleLabels;

/// A linear projection of samples onto a (usually 3-dimensional) space.
#[derive(Debug, Clone)]
pub struct Snapshot {
    /// Projection matrix [original_size, projection_size].
    /// If `P` is this matrix and `x` a raw sample row, `x P` is the projected sample.
    projection_vectors: DMatrix<f64>,

    /// Samples already projected, [num_samples, projection_size]
    projected_samples: DMatrix<f64>,

    /// Labels shared across every snapshot of a trajectory
    labels: Arc<SampleLabels>,
}

impl Snapshot {
    /// Creates a snapshot, validating that both matrices agree on the
    /// projection size and that there is one label per sample.
    pub fn new(
        projection_vectors: DMatrix<f64>,
        projected_samples: DMatrix<f64>,
        labels: Arc<SampleLabels>,
    ) -> Result<Self> {
        if projected_samples.ncols() != projection_vectors.ncols() {
            return Err(VisError::shape(
                "projected_samples",
                format!("(samples, {})", projection_vectors.ncols()),
                shape_of(&projected_samples),
            ));
        }
        if labels.num_samples() != projected_samples.nrows() {
            return Err(VisError::shape(
                "projected_sample_labels",
                format!("({}, ...)", projected_samples.nrows()),
                format!("{:?}", labels.shape()),
            ));
        }

        Ok(Self {
            projection_vectors,
            projected_samples,
            labels,
        })
    }

    /// Projects raw samples [samples, features] with the given matrix
    /// [features, projection_size].
    pub fn project(
        samples: &DMatrix<f64>,
        labels: Arc<SampleLabels>,
        projection: DMatrix<f64>,
    ) -> Result<Self> {
        if projection.nrows() != samples.ncols() {
            return Err(VisError::shape(
                "projection",
                format!("({}, proj_size)", samples.ncols()),
                shape_of(&projection),
            ));
        }
        let projected = samples * &projection;
        Self::new(projection, projected, labels)
    }

    pub fn projection_vectors(&self) -> &DMatrix<f64> {
        &self.projection_vectors
    }

    pub fn projected_samples(&self) -> &DMatrix<f64> {
        &self.projected_samples
    }

    pub fn labels(&self) -> &Arc<SampleLabels> {
        &self.labels
    }

    /// Number of features in the original space.
    pub fn original_size(&self) -> usize {
        self.projection_vectors.nrows()
    }

    /// Number of features in the projected space.
    pub fn projection_size(&self) -> usize {
        self.projection_vectors.ncols()
    }

    /// Number of samples in this snapshot.
    pub fn num_samples(&self) -> usize {
        self.projected_samples.nrows()
    }

    /// Projected position of one sample.
    pub fn sample(&self, index: usize) -> Vec<f64> {
        self.projected_samples.row(index).iter().copied().collect()
    }

    /// Writes this snapshot as a single JSON archive holding three named
    /// arrays: `projection_vectors`, `projected_samples`, `projected_sample_labels`.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let archive = SnapshotArchive {
            projection_vectors: ArrayRecord::from_matrix(&self.projection_vectors),
            projected_samples: ArrayRecord::from_matrix(&self.projected_samples),
            projected_sample_labels: (*self.labels).clone(),
        };

        let mut writer = BufWriter::new(File::create(path.as_ref())?);
        serde_json::to_writer(&mut writer, &archive)?;
        writer.flush()?;
        Ok(())
    }

    /// Loads a snapshot written by [`Snapshot::save`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let reader = BufReader::new(File::open(path.as_ref())?);
        let archive: SnapshotArchive = serde_json::from_reader(reader)?;
        archive.projected_sample_labels.validate()?;

        Self::new(
            archive.projection_vectors.to_matrix("projection_vectors")?,
            archive.projected_samples.to_matrix("projected_samples")?,
            Arc::new(archive.projected_sample_labels),
        )
    }
}

/// On-disk layout of a snapshot.
#[derive(Debug, Serialize, Deserialize)]
struct SnapshotArchive {
    projection_vectors: ArrayRecord,
    projected_samples: ArrayRecord,
    projected_sample_labels: SampleLabels,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::labels::LabelValues;

    fn labels(n: usize) -> Arc<SampleLabels> {
        Arc::new(SampleLabels::from_values(LabelValues::I32((0..n as i32).collect())))
    }

    #[test]
    fn test_project_with_matrix() {
        let samples = DMatrix::from_row_slice(2, 3, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let projection = DMatrix::identity(3, 3);
        let snap = Snapshot::project(&samples, labels(2), projection).unwrap();

        assert_eq!(snap.num_samples(), 2);
        assert_eq!(snap.original_size(), 3);
        assert_eq!(snap.projection_size(), 3);
        assert_eq!(snap.projected_samples(), &samples);
        assert_eq!(snap.sample(1), vec![4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_rejects_label_count_mismatch() {
        let err = Snapshot::new(DMatrix::identity(3, 3), DMatrix::zeros(4, 3), labels(5)).unwrap_err();
        assert_eq!(err.field(), Some("projected_sample_labels"));
    }

    #[test]
    fn test_rejects_projection_size_mismatch() {
        let err = Snapshot::new(DMatrix::identity(3, 3), DMatrix::zeros(4, 2), labels(4)).unwrap_err();
        assert_eq!(err.field(), Some("projected_samples"));
    }

    #[test]
    fn test_save_load_is_bit_exact() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot_0.json");

        let vectors = DMatrix::from_fn(5, 3, |r, c| ((r * 3 + c) as f64).sin() / 7.0);
        let samples = DMatrix::from_fn(4, 3, |r, c| 1.0 / (1.0 + r as f64 + 0.1 * c as f64) + 1e-17);
        let float_labels = Arc::new(SampleLabels::from_values(LabelValues::F32(vec![
            0.1, 0.2, 1.0 / 3.0, -2.5,
        ])));
        let snap = Snapshot::new(vectors, samples, float_labels).unwrap();

        snap.save(&path).unwrap();
        let loaded = Snapshot::load(&path).unwrap();

        let bits = |m: &DMatrix<f64>| m.iter().map(|x| x.to_bits()).collect::<Vec<_>>();
        assert_eq!(bits(loaded.projection_vectors()), bits(snap.projection_vectors()));
        assert_eq!(bits(loaded.projected_samples()), bits(snap.projected_samples()));
        assert_eq!(loaded.labels(), snap.labels());
    }

    #[test]
    fn test_save_load_keeps_non_finite_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot_nan.json");

        let samples = DMatrix::from_row_slice(3, 3, &[
            f64::NAN, 1.0, 2.0,
            f64::INFINITY, 0.0, -1.0,
            3.0, f64::NEG_INFINITY, 4.0,
        ]);
        let nan_labels = Arc::new(SampleLabels::from_values(LabelValues::F64(vec![
            f64::NAN,
            1.0,
            f64::NEG_INFINITY,
        ])));
        let snap = Snapshot::new(DMatrix::identity(3, 3), samples, nan_labels).unwrap();

        snap.save(&path).unwrap();
        let loaded = Snapshot::load(&path).unwrap();

        let bits = |m: &DMatrix<f64>| m.iter().map(|x| x.to_bits()).collect::<Vec<_>>();
        assert_eq!(bits(loaded.projected_samples()), bits(snap.projected_samples()));
        match loaded.labels().values() {
            LabelValues::F64(values) => {
                assert!(values[0].is_nan());
                assert_eq!(values[1], 1.0);
                assert_eq!(values[2], f64::NEG_INFINITY);
            }
            other => panic!("unexpected labels {:?}", other),
        }

        let f32_labels = Arc::new(SampleLabels::from_values(LabelValues::F32(vec![f32::INFINITY, f32::NAN, 0.25])));
        let snap = Snapshot::new(DMatrix::identity(3, 3), DMatrix::zeros(3, 3), f32_labels).unwrap();
        snap.save(&path).unwrap();
        match Snapshot::load(&path).unwrap().labels().values() {
            LabelValues::F32(values) => {
                assert_eq!(values[0], f32::INFINITY);
                assert!(values[1].is_nan());
                assert_eq!(values[2], 0.25);
            }
            other => panic!("unexpected labels {:?}", other),
        }
    }
}
