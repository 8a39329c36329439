//! Trajectories - an ordered, validated sequence of aligned snapshots.
//!
//! Every snapshot of a trajectory describes the same samples, so the sample
//! count, projection size, label shape and label type must agree across all
//! of them. Label values are allowed to differ.

use nalgebra::DMatrix;
use rayon::prelude::*;
use std::sync::Arc;
use tracing::{debug, info};

use crate::align::align_snapshot;
use crate::error::{Result, VisError};
use crate::labels::SampleLabels;
use crate::reduce::reduce_snapshot;
use crate::snapshot::Snapshot;

/// Configuration for turning raw matrices into a trajectory.
#[derive(Debug, Clone)]
pub struct ReduceConfig {
    /// Number of principal components kept per snapshot
    pub num_components: usize,

    /// Whether snapshot i is aligned against snapshot i-1
    pub align: bool,
}

impl Default for ReduceConfig {
    fn default() -> Self {
        Self {
            num_components: 3,
            align: true,
        }
    }
}

impl ReduceConfig {
    /// Builder: set the number of principal components
    pub fn with_components(mut self, num_components: usize) -> Self {
        self.num_components = num_components;
        self
    }

    /// Builder: enable or disable alignment
    pub fn with_align(mut self, align: bool) -> Self {
        self.align = align;
        self
    }
}

/// An ordered sequence of snapshots of the same samples.
#[derive(Debug, Clone)]
pub struct Trajectory {
    snapshots: Vec<Snapshot>,
}

impl Trajectory {
    /// Creates a trajectory, checking that every snapshot agrees with the
    /// first one. Errors name the offending snapshot index and field.
    pub fn new(snapshots: Vec<Snapshot>) -> Result<Self> {
        let first = snapshots
            .first()
            .ok_or_else(|| VisError::shape("snapshots", "at least one snapshot", "0 snapshots"))?;

        for (i, snap) in snapshots.iter().enumerate().skip(1) {
            if snap.num_samples() != first.num_samples() {
                return Err(VisError::shape(
                    format!("snapshots[{}].num_samples", i),
                    first.num_samples(),
                    snap.num_samples(),
                ));
            }
            if snap.projection_size() != first.projection_size() {
                return Err(VisError::shape(
                    format!("snapshots[{}].projection_size", i),
                    first.projection_size(),
                    snap.projection_size(),
                ));
            }
            if snap.labels().shape() != first.labels().shape() {
                return Err(VisError::shape(
                    format!("snapshots[{}].labels.shape", i),
                    format!("{:?}", first.labels().shape()),
                    format!("{:?}", snap.labels().shape()),
                ));
            }
            if snap.labels().dtype() != first.labels().dtype() {
                return Err(VisError::shape(
                    format!("snapshots[{}].labels.dtype", i),
                    first.labels().dtype(),
                    snap.labels().dtype(),
                ));
            }
        }

        Ok(Self { snapshots })
    }

    pub fn snapshots(&self) -> &[Snapshot] {
        &self.snapshots
    }

    pub fn snapshot(&self, index: usize) -> Option<&Snapshot> {
        self.snapshots.get(index)
    }

    pub fn num_snapshots(&self) -> usize {
        self.snapshots.len()
    }

    pub fn num_samples(&self) -> usize {
        self.snapshots[0].num_samples()
    }

    pub fn projection_size(&self) -> usize {
        self.snapshots[0].projection_size()
    }

    pub fn labels(&self) -> &Arc<SampleLabels> {
        self.snapshots[0].labels()
    }
}

/// Reduces every raw matrix with PCA and chains the alignment.
///
/// PCA of independent snapshots runs in parallel; alignment is sequential
/// because snapshot i is aligned against the already-aligned snapshot i-1.
///
/// # Arguments
/// * `matrices` - Raw samples per snapshot, each [samples, features_i]
/// * `labels` - One label array shared by every snapshot
/// * `config` - Component count and alignment switch
pub fn build_trajectory(
    matrices: &[DMatrix<f64>],
    labels: SampleLabels,
    config: &ReduceConfig,
) -> Result<Trajectory> {
    let first = matrices
        .first()
        .ok_or_else(|| VisError::shape("matrices", "at least one matrix", "0 matrices"))?;
    let num_samples = first.nrows();

    for (i, mat) in matrices.iter().enumerate().skip(1) {
        if mat.nrows() != num_samples {
            return Err(VisError::shape(
                format!("matrices[{}]", i),
                format!("({}, features)", num_samples),
                format!("({}, {})", mat.nrows(), mat.ncols()),
            ));
        }
    }
    labels.validate()?;
    if labels.num_samples() != num_samples {
        return Err(VisError::shape(
            "labels",
            format!("({}, ...)", num_samples),
            format!("{:?}", labels.shape()),
        ));
    }
    for mat in matrices {
        if config.num_components < 1 || config.num_components > mat.ncols() {
            return Err(VisError::Dimension {
                requested: config.num_components,
                available: mat.ncols(),
            });
        }
    }

    info!(
        "Reducing {} snapshots of {} samples to {} components",
        matrices.len(),
        num_samples,
        config.num_components
    );

    let labels = Arc::new(labels);
    let reduced: Vec<Snapshot> = matrices
        .par_iter()
        .map(|mat| reduce_snapshot(mat, Arc::clone(&labels), config.num_components))
        .collect::<Result<_>>()?;

    if !config.align {
        return Trajectory::new(reduced);
    }

    let mut aligned: Vec<Snapshot> = Vec::with_capacity(reduced.len());
    for (i, snap) in reduced.into_iter().enumerate() {
        let next = match aligned.last() {
            Some(previous) => {
                let out = align_snapshot(previous, &snap)?;
                debug!("Aligned snapshot {} against snapshot {}", i, i - 1);
                out
            }
            None => snap,
        };
        aligned.push(next);
    }

    Trajectory::new(aligned)
}
