//! The "PROJECTION" Engine - principal component analysis.
//!
//! Projects one raw snapshot [samples, features] onto its top-k principal
//! axes. Eigenpairs are ranked by absolute eigenvalue: a large-magnitude
//! negative eigenvalue produced by numerical noise still marks an important
//! axis of spread.

use nalgebra::{DMatrix, DVector};
use std::cmp::Ordering;
use std::sync::Arc;

use crate::array::shape_of;
use crate::error::{Result, VisError};
use crate::labels::SampleLabels;
use crate::snapshot::Snapshot;

/// Top-k principal components of a sample matrix.
#[derive(Debug, Clone)]
pub struct PrincipalComponents {
    /// Eigenvalues in descending order of magnitude (size: k)
    pub eigenvalues: DVector<f64>,

    /// Projection matrix, one eigenvector per column (size: features x k)
    pub vectors: DMatrix<f64>,
}

/// Computes the top `num_components` principal component vectors of `mat`.
///
/// # Arguments
/// * `mat` - Samples [samples, features]
/// * `num_components` - Number of components to keep, `1..=features`
///
/// # Errors
/// `Dimension` if `num_components` is zero or exceeds the feature count,
/// `ShapeMismatch` if the matrix holds no samples.
pub fn principal_components(mat: &DMatrix<f64>, num_components: usize) -> Result<PrincipalComponents> {
    let (samples, features) = mat.shape();
    if num_components < 1 || num_components > features {
        return Err(VisError::Dimension {
            requested: num_components,
            available: features,
        });
    }
    if samples == 0 {
        return Err(VisError::shape("samples", "(samples >= 1, features)", shape_of(mat)));
    }

    // Mean-center every feature column
    let mean = mat.row_mean();
    let mut centered = mat.clone();
    for (j, mut column) in centered.column_iter_mut().enumerate() {
        column.add_scalar_mut(-mean[j]);
    }

    // Unbiased feature-feature covariance
    let divisor = if samples > 1 { (samples - 1) as f64 } else { 1.0 };
    let covariance = (centered.transpose() * &centered) / divisor;

    let eigen = covariance.symmetric_eigen();

    // Stable sort keeps the decomposition order on ties, so truncating to
    // fewer components always yields a prefix of the longer result.
    let mut order: Vec<usize> = (0..features).collect();
    order.sort_by(|&a, &b| {
        eigen.eigenvalues[b]
            .abs()
            .partial_cmp(&eigen.eigenvalues[a].abs())
            .unwrap_or(Ordering::Equal)
    });
    order.truncate(num_components);

    let eigenvalues = DVector::from_iterator(num_components, order.iter().map(|&i| eigen.eigenvalues[i]));
    let vectors = DMatrix::from_fn(features, num_components, |r, c| eigen.eigenvectors[(r, order[c])]);

    Ok(PrincipalComponents { eigenvalues, vectors })
}

/// Reduces raw samples to a snapshot spanned by their top principal axes.
pub fn reduce_snapshot(
    mat: &DMatrix<f64>,
    labels: Arc<SampleLabels>,
    num_components: usize,
) -> Result<Snapshot> {
    let pcs = principal_components(mat, num_components)?;
    Snapshot::project(mat, labels, pcs.vectors)
}
