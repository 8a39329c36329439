//! Render state - the description of the current frame.
//!
//! Scene primitives mutate a `RenderState` by reference; renderers only
//! read it. Visible points are stored as partitions of the sample set, each
//! with a membership mask and optional style overrides, and are combined
//! with the caller's default styling when drawn.

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::bounds::{cube_bounds_for, Bounds};
use crate::trajectory::Trajectory;

/// Default camera elevation in degrees.
pub const DEFAULT_ELEVATION: f64 = 30.0;

/// Default camera azimuth in degrees.
pub const DEFAULT_AZIMUTH: f64 = 45.0;

// ============================================================================
// STYLE
// ============================================================================

/// Point colour: one RGBA colour or one scalar per sample (mapped through
/// the colormap).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Color {
    Solid([f64; 4]),
    Values(Vec<f64>),
}

/// Scalar range mapped onto the colormap.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Norm {
    pub vmin: f64,
    pub vmax: f64,
}

/// Point styling. Unset fields fall back to whatever lies underneath.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Style {
    pub size: Option<f64>,
    pub color: Option<Color>,
    pub colormap: Option<String>,
    pub marker: Option<String>,
    pub alpha: Option<f64>,
    pub norm: Option<Norm>,
}

impl Style {
    /// Style with only the alpha set.
    pub fn alpha(alpha: f64) -> Self {
        Self {
            alpha: Some(alpha),
            ..Self::default()
        }
    }

    /// Returns `self` with every field set in `overrides` replaced.
    pub fn merged(&self, overrides: &Style) -> Style {
        Style {
            size: overrides.size.or(self.size),
            color: overrides.color.clone().or_else(|| self.color.clone()),
            colormap: overrides.colormap.clone().or_else(|| self.colormap.clone()),
            marker: overrides.marker.clone().or_else(|| self.marker.clone()),
            alpha: overrides.alpha.or(self.alpha),
            norm: overrides.norm.or(self.norm),
        }
    }

    /// Restricts per-sample colour values to the samples selected by `mask`.
    fn subset_colors(mut self, mask: &[bool]) -> Style {
        if let Some(Color::Values(values)) = &self.color {
            if values.len() == mask.len() {
                let picked = values
                    .iter()
                    .zip(mask)
                    .filter(|(_, &m)| m)
                    .map(|(&v, _)| v)
                    .collect();
                self.color = Some(Color::Values(picked));
            }
        }
        self
    }
}

/// A default styling entry: a sample mask and the style of those samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Marker {
    pub mask: Vec<bool>,
    pub style: Style,
}

// ============================================================================
// RENDER STATE
// ============================================================================

/// Camera orientation in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rotation {
    pub elevation: f64,
    pub azimuth: f64,
}

impl Default for Rotation {
    fn default() -> Self {
        Self {
            elevation: DEFAULT_ELEVATION,
            azimuth: DEFAULT_AZIMUTH,
        }
    }
}

/// One visible partition of the samples.
#[derive(Debug, Clone, PartialEq)]
pub struct VisiblePoints {
    /// Positions of the masked samples only [mask count, 3]
    pub points: DMatrix<f64>,

    /// Membership over all samples
    pub mask: Vec<bool>,

    /// Overrides applied on top of the default styling
    pub style: Style,
}

impl VisiblePoints {
    /// Selects the masked rows of `all` [samples, 3].
    pub fn masked(all: &DMatrix<f64>, mask: Vec<bool>, style: Style) -> Self {
        let rows: Vec<usize> = (0..all.nrows()).filter(|&i| mask.get(i).copied().unwrap_or(false)).collect();
        Self {
            points: all.select_rows(rows.iter()),
            mask,
            style,
        }
    }

    /// Every row of `all` visible.
    pub fn all(all: DMatrix<f64>) -> Self {
        let mask = vec![true; all.nrows()];
        Self {
            points: all,
            mask,
            style: Style::default(),
        }
    }
}

/// A group of points drawn with one style.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawBatch {
    pub points: DMatrix<f64>,
    pub style: Style,
}

/// The current frame.
#[derive(Debug, Clone)]
pub struct RenderState {
    pub title: String,

    pub view_bounds: Bounds,

    pub rotation: Rotation,

    pub visible_points: Vec<VisiblePoints>,

    pub trajectory: Arc<Trajectory>,

    /// Ordered (mask, style) markers; the first marker covering a point styles it
    pub default_styling: Vec<Marker>,
}

impl RenderState {
    /// Initial state: snapshot 0 fully visible and fitted, default rotation.
    pub fn new(trajectory: Arc<Trajectory>, default_styling: Vec<Marker>) -> Self {
        let first = trajectory.snapshots()[0].projected_samples().clone();
        Self {
            title: String::new(),
            view_bounds: cube_bounds_for(&first),
            rotation: Rotation::default(),
            visible_points: vec![VisiblePoints::all(first)],
            trajectory,
            default_styling,
        }
    }

    /// Projected samples of one snapshot.
    ///
    /// # Panics
    /// If `index` is not a snapshot of the trajectory.
    pub fn samples_of(&self, index: usize) -> &DMatrix<f64> {
        self.trajectory.snapshots()[index].projected_samples()
    }

    /// Shows every point of snapshot `index`, optionally fitting the view.
    ///
    /// # Panics
    /// If `index` is not a snapshot of the trajectory.
    pub fn set_snapshot_visible(&mut self, index: usize, fit_view: bool) {
        let samples = self.samples_of(index).clone();
        if fit_view {
            self.view_bounds = cube_bounds_for(&samples);
        }
        self.visible_points = vec![VisiblePoints::all(samples)];
    }

    /// Combines visible partitions with the default styling.
    ///
    /// Each partition is intersected with the markers in order until all of
    /// its points are handled. A partition's overrides win over the marker
    /// style. Points covered by no marker are not drawn.
    pub fn draw_batches(&self) -> Vec<DrawBatch> {
        let mut batches = Vec::new();

        for visible in &self.visible_points {
            let to_handle = visible.mask.iter().filter(|&&m| m).count();
            let mut handled = 0;

            for marker in &self.default_styling {
                if handled >= to_handle {
                    break;
                }
                let overlap: Vec<bool> = visible
                    .mask
                    .iter()
                    .zip(marker.mask.iter().chain(std::iter::repeat(&false)))
                    .map(|(&a, &b)| a && b)
                    .collect();
                let count = overlap.iter().filter(|&&o| o).count();
                if count == 0 {
                    continue;
                }

                batches.push(DrawBatch {
                    points: submask(&visible.points, &visible.mask, &overlap),
                    style: marker.style.merged(&visible.style).subset_colors(&overlap),
                });
                handled += count;
            }
        }
        batches
    }
}

/// Given `points = arr[mask]`, returns `arr[overlap]` where `overlap` is a
/// subset of `mask`.
fn submask(points: &DMatrix<f64>, mask: &[bool], overlap: &[bool]) -> DMatrix<f64> {
    let mut rows = Vec::new();
    let mut row = 0;
    for (&m, &o) in mask.iter().zip(overlap) {
        if m {
            if o {
                rows.push(row);
            }
            row += 1;
        }
    }
    points.select_rows(rows.iter())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::labels::{LabelValues, SampleLabels};
    use crate::snapshot::Snapshot;

    fn trajectory() -> Arc<Trajectory> {
        let labels = Arc::new(SampleLabels::from_values(LabelValues::I32(vec![0, 1, 2, 3])));
        let a = DMatrix::from_row_slice(4, 3, &[
            0.0, 0.0, 0.0, //
            1.0, 0.0, 0.0, //
            0.0, 1.0, 0.0, //
            0.0, 0.0, 1.0,
        ]);
        let b = &a * 4.0;
        let snaps = vec![
            Snapshot::project(&a, labels.clone(), DMatrix::identity(3, 3)).unwrap(),
            Snapshot::project(&b, labels, DMatrix::identity(3, 3)).unwrap(),
        ];
        Arc::new(Trajectory::new(snaps).unwrap())
    }

    fn marker(mask: [bool; 4], size: f64) -> Marker {
        Marker {
            mask: mask.to_vec(),
            style: Style {
                size: Some(size),
                alpha: Some(1.0),
                ..Style::default()
            },
        }
    }

    #[test]
    fn test_initial_state() {
        let state = RenderState::new(trajectory(), Vec::new());
        assert_eq!(state.title, "");
        assert_eq!(state.rotation, Rotation { elevation: 30.0, azimuth: 45.0 });
        assert_eq!(state.visible_points.len(), 1);
        assert_eq!(state.visible_points[0].mask, vec![true; 4]);
        assert_eq!(state.view_bounds, Bounds([[0.0, 1.0]; 3]));
    }

    #[test]
    fn test_set_snapshot_visible_fits_view() {
        let mut state = RenderState::new(trajectory(), Vec::new());
        state.set_snapshot_visible(1, false);
        assert_eq!(state.view_bounds, Bounds([[0.0, 1.0]; 3]));

        state.set_snapshot_visible(1, true);
        assert_eq!(state.view_bounds, Bounds([[0.0, 4.0]; 3]));
        assert_eq!(state.visible_points[0].points, *state.samples_of(1));
    }

    #[test]
    fn test_first_marker_wins_and_uncovered_points_skipped() {
        let markers = vec![
            marker([true, true, false, false], 1.0),
            marker([true, true, true, false], 2.0),
        ];
        let state = RenderState::new(trajectory(), markers);
        let batches = state.draw_batches();

        // Handled points are counted, not tracked: the second marker redraws
        // points 0 and 1. Point 3 has no marker.
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].points.nrows(), 2);
        assert_eq!(batches[0].style.size, Some(1.0));
        assert_eq!(batches[1].style.size, Some(2.0));
        assert_eq!(batches[1].points.nrows(), 3);
    }

    #[test]
    fn test_overrides_win_and_colors_subset() {
        let mut styled = marker([true; 4], 3.0);
        styled.style.color = Some(Color::Values(vec![10.0, 11.0, 12.0, 13.0]));
        let mut state = RenderState::new(trajectory(), vec![styled]);

        let all = state.samples_of(0).clone();
        state.visible_points = vec![
            VisiblePoints::masked(&all, vec![true, false, true, false], Style::alpha(0.25)),
            VisiblePoints::masked(&all, vec![false, true, false, true], Style::default()),
        ];

        let batches = state.draw_batches();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].style.alpha, Some(0.25));
        assert_eq!(batches[0].style.size, Some(3.0));
        assert_eq!(batches[0].style.color, Some(Color::Values(vec![10.0, 12.0])));
        assert_eq!(batches[0].points.row(1), all.row(2));
        assert_eq!(batches[1].style.alpha, Some(1.0));
        assert_eq!(batches[1].style.color, Some(Color::Values(vec![11.0, 13.0])));
    }

    #[test]
    fn test_style_json_defaults() {
        let style: Style = serde_json::from_str(r#"{"size": 4.0, "color": {"solid": [1, 0, 0, 1]}}"#).unwrap();
        assert_eq!(style.size, Some(4.0));
        assert_eq!(style.color, Some(Color::Solid([1.0, 0.0, 0.0, 1.0])));
        assert_eq!(style.alpha, None);
    }
}
