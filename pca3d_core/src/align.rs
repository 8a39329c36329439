//! The "ALIGNMENT" Engine - Orthogonal Procrustes between snapshots.
//!
//! PCA axes are only unique up to an orthogonal transform, so consecutive
//! snapshots may come out rotated or flipped with respect to each other.
//! We find the orthonormal `R` minimizing `|R A - B|_F` and apply it to the
//! later snapshot, keeping its geometry (shape and scale) intact.
//!
//! With `A` the to-match samples and `B` the reference samples (both in
//! features x samples orientation):
//!
//! ```text
//! M = B A^T = U S V^T   =>   R = U V^T
//! ```

use nalgebra::DMatrix;

use crate::array::shape_of;
use crate::error::{Result, VisError};
use crate::snapshot::Snapshot;

/// Finds the orthonormal matrix `R` minimizing `|R a - b|_F`.
///
/// `a` and `b` must share their shape [features, samples].
pub fn procrustes_rotation(a: &DMatrix<f64>, b: &DMatrix<f64>) -> Result<DMatrix<f64>> {
    if a.shape() != b.shape() {
        return Err(VisError::shape("b", shape_of(a), shape_of(b)));
    }

    let m = b * a.transpose();
    let svd = m.svd(true, true);
    let u = svd
        .u
        .ok_or_else(|| VisError::Numerical("SVD did not produce U".to_string()))?;
    let v_t = svd
        .v_t
        .ok_or_else(|| VisError::Numerical("SVD did not produce V^T".to_string()))?;

    Ok(u * v_t)
}

/// Frobenius norm of `a - b`.
pub fn frobenius_distance(a: &DMatrix<f64>, b: &DMatrix<f64>) -> f64 {
    (a - b).norm()
}

/// Returns a new snapshot: `to_match` rotated/reflected to look as much as
/// possible like `reference`. Neither argument is modified.
///
/// Since `|A' - B'N| = |N^T B'^T - A'^T|`, solving for the transposed sample
/// matrices gives the transform to apply on the right of the row-major samples.
pub fn align_snapshot(reference: &Snapshot, to_match: &Snapshot) -> Result<Snapshot> {
    if reference.num_samples() != to_match.num_samples()
        || reference.projection_size() != to_match.projection_size()
    {
        return Err(VisError::shape(
            "to_match.projected_samples",
            shape_of(reference.projected_samples()),
            shape_of(to_match.projected_samples()),
        ));
    }

    let transform = procrustes_rotation(
        &to_match.projected_samples().transpose(),
        &reference.projected_samples().transpose(),
    )?;
    let transform_t = transform.transpose();

    Snapshot::new(
        to_match.projection_vectors() * &transform_t,
        to_match.projected_samples() * &transform_t,
        to_match.labels().clone(),
    )
}
