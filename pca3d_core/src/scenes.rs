//! Scene primitives - atomic render-state mutators.
//!
//! Instant scenes set part of the state when their segment starts. Durative
//! scenes interpolate over their segment's local time `[0, 1]`.

use std::fmt::Debug;

use crate::bounds::Bounds;
use crate::state::{RenderState, Rotation, Style, VisiblePoints};

/// How a scene is driven by the timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneKind {
    /// Calls `enter` once its segment has started
    Instant,
    /// Calls `apply` with the segment's warped fraction
    Durative,
}

/// Something that mutates the render state.
pub trait Scene: Send + Sync + Debug {
    fn kind(&self) -> SceneKind;

    /// Instantaneous effect.
    fn enter(&self, _state: &mut RenderState) {}

    /// Durative effect at `fraction` in `[0, 1]`.
    fn apply(&self, _state: &mut RenderState, _fraction: f64) {}
}

fn lerp(start: f64, end: f64, t: f64) -> f64 {
    start + (end - start) * t
}

// ============================================================================
// INSTANT SCENES
// ============================================================================

/// Sets the title.
#[derive(Debug, Clone)]
pub struct FixedTitle(pub String);

impl Scene for FixedTitle {
    fn kind(&self) -> SceneKind {
        SceneKind::Instant
    }

    fn enter(&self, state: &mut RenderState) {
        state.title.clone_from(&self.0);
    }
}

/// Sets the view bounds.
#[derive(Debug, Clone)]
pub struct FixedZoom(pub Bounds);

impl Scene for FixedZoom {
    fn kind(&self) -> SceneKind {
        SceneKind::Instant
    }

    fn enter(&self, state: &mut RenderState) {
        state.view_bounds = self.0;
    }
}

/// Sets the camera rotation.
#[derive(Debug, Clone)]
pub struct FixedRotation(pub Rotation);

impl Scene for FixedRotation {
    fn kind(&self) -> SceneKind {
        SceneKind::Instant
    }

    fn enter(&self, state: &mut RenderState) {
        state.rotation = self.0;
    }
}

/// Makes a whole snapshot visible without touching the view.
#[derive(Debug, Clone)]
pub struct ShowSnapshot(pub usize);

impl Scene for ShowSnapshot {
    fn kind(&self) -> SceneKind {
        SceneKind::Instant
    }

    fn enter(&self, state: &mut RenderState) {
        state.set_snapshot_visible(self.0, false);
    }
}

/// Makes only the masked points of a snapshot visible.
#[derive(Debug, Clone)]
pub struct Masked {
    pub snapshot: usize,
    pub mask: Vec<bool>,
}

impl Scene for Masked {
    fn kind(&self) -> SceneKind {
        SceneKind::Instant
    }

    fn enter(&self, state: &mut RenderState) {
        let points = VisiblePoints::masked(state.samples_of(self.snapshot), self.mask.clone(), Style::default());
        state.visible_points = vec![points];
    }
}

// ============================================================================
// DURATIVE SCENES
// ============================================================================

/// Fades the masked points of a snapshot between two alpha values while the
/// rest stay opaque.
#[derive(Debug, Clone)]
pub struct Fade {
    pub snapshot: usize,
    pub mask: Vec<bool>,
    pub alpha_start: f64,
    pub alpha_end: f64,
}

impl Scene for Fade {
    fn kind(&self) -> SceneKind {
        SceneKind::Durative
    }

    fn apply(&self, state: &mut RenderState, fraction: f64) {
        let alpha = lerp(self.alpha_start, self.alpha_end, fraction);
        let inverse: Vec<bool> = self.mask.iter().map(|m| !m).collect();
        let samples = state.samples_of(self.snapshot);

        let faded = VisiblePoints::masked(samples, self.mask.clone(), Style::alpha(alpha));
        let opaque = VisiblePoints::masked(samples, inverse, Style::default());
        state.visible_points = vec![faded, opaque];
    }
}

/// Turns the camera from one rotation to another, each angle modulo 360.
#[derive(Debug, Clone)]
pub struct Rotate {
    pub start: Rotation,
    pub end: Rotation,
}

impl Rotate {
    /// One full turn around the vertical axis from `start`.
    pub fn full_turn(start: Rotation) -> Self {
        Self {
            start,
            end: Rotation {
                elevation: start.elevation,
                azimuth: start.azimuth + 360.0,
            },
        }
    }
}

impl Scene for Rotate {
    fn kind(&self) -> SceneKind {
        SceneKind::Durative
    }

    fn apply(&self, state: &mut RenderState, fraction: f64) {
        state.rotation = Rotation {
            elevation: lerp(self.start.elevation, self.end.elevation, fraction).rem_euclid(360.0),
            azimuth: lerp(self.start.azimuth, self.end.azimuth, fraction).rem_euclid(360.0),
        };
    }
}

/// Moves the view bounds between two boxes.
#[derive(Debug, Clone)]
pub struct Zoom {
    pub start: Bounds,
    pub end: Bounds,
}

impl Scene for Zoom {
    fn kind(&self) -> SceneKind {
        SceneKind::Durative
    }

    fn apply(&self, state: &mut RenderState, fraction: f64) {
        state.view_bounds = self.start.lerp(&self.end, fraction);
    }
}

/// Moves every point from its position in one snapshot to its position in
/// another.
#[derive(Debug, Clone)]
pub struct Interpolate {
    pub from: usize,
    pub to: usize,
}

impl Scene for Interpolate {
    fn kind(&self) -> SceneKind {
        SceneKind::Durative
    }

    fn apply(&self, state: &mut RenderState, fraction: f64) {
        let start = state.samples_of(self.from);
        let end = state.samples_of(self.to);
        let points = start + (end - start) * fraction;
        state.visible_points = vec![VisiblePoints::all(points)];
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::labels::{LabelValues, SampleLabels};
    use crate::snapshot::Snapshot;
    use crate::trajectory::Trajectory;
    use approx::assert_relative_eq;
    use nalgebra::DMatrix;
    use std::sync::Arc;

    fn state() -> RenderState {
        let labels = Arc::new(SampleLabels::from_values(LabelValues::Bool(vec![true, false, true])));
        let a = DMatrix::from_row_slice(3, 3, &[0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 2.0, 0.0, 2.0]);
        let b = DMatrix::from_row_slice(3, 3, &[2.0, 2.0, 2.0, 3.0, 3.0, 3.0, 0.0, 0.0, 0.0]);
        let snaps = vec![
            Snapshot::project(&a, labels.clone(), DMatrix::identity(3, 3)).unwrap(),
            Snapshot::project(&b, labels, DMatrix::identity(3, 3)).unwrap(),
        ];
        RenderState::new(Arc::new(Trajectory::new(snaps).unwrap()), Vec::new())
    }

    #[test]
    fn test_instant_scenes() {
        let mut s = state();
        FixedTitle("hello".to_string()).enter(&mut s);
        FixedRotation(Rotation { elevation: 10.0, azimuth: 20.0 }).enter(&mut s);
        FixedZoom(Bounds([[1.0, 2.0]; 3])).enter(&mut s);

        assert_eq!(s.title, "hello");
        assert_eq!(s.rotation.azimuth, 20.0);
        assert_eq!(s.view_bounds, Bounds([[1.0, 2.0]; 3]));
        assert_eq!(FixedTitle(String::new()).kind(), SceneKind::Instant);
    }

    #[test]
    fn test_show_snapshot_keeps_view() {
        let mut s = state();
        let before = s.view_bounds;
        ShowSnapshot(1).enter(&mut s);
        assert_eq!(s.view_bounds, before);
        assert_eq!(&s.visible_points[0].points, s.samples_of(1));
    }

    #[test]
    fn test_masked_selects_rows() {
        let mut s = state();
        Masked { snapshot: 1, mask: vec![false, true, false] }.enter(&mut s);
        assert_eq!(s.visible_points.len(), 1);
        assert_eq!(s.visible_points[0].points, DMatrix::from_row_slice(1, 3, &[3.0, 3.0, 3.0]));
    }

    #[test]
    fn test_fade_splits_partitions() {
        let mut s = state();
        let fade = Fade { snapshot: 0, mask: vec![true, false, false], alpha_start: 1.0, alpha_end: 0.0 };
        fade.apply(&mut s, 0.25);

        assert_eq!(s.visible_points.len(), 2);
        assert_eq!(s.visible_points[0].style.alpha, Some(0.75));
        assert_eq!(s.visible_points[0].points.nrows(), 1);
        assert_eq!(s.visible_points[1].style.alpha, None);
        assert_eq!(s.visible_points[1].mask, vec![false, true, true]);
    }

    #[test]
    fn test_rotation_wraps() {
        let mut s = state();
        let rotate = Rotate::full_turn(Rotation::default());
        rotate.apply(&mut s, 0.5);
        assert_relative_eq!(s.rotation.azimuth, 225.0);
        rotate.apply(&mut s, 1.0);
        assert_relative_eq!(s.rotation.azimuth, 45.0);
        assert_relative_eq!(s.rotation.elevation, 30.0);

        let backwards = Rotate {
            start: Rotation { elevation: 0.0, azimuth: 10.0 },
            end: Rotation { elevation: 0.0, azimuth: -30.0 },
        };
        backwards.apply(&mut s, 1.0);
        assert_relative_eq!(s.rotation.azimuth, 330.0);
    }

    #[test]
    fn test_zoom_and_interpolate() {
        let mut s = state();
        Zoom { start: Bounds([[0.0, 1.0]; 3]), end: Bounds([[0.0, 3.0]; 3]) }.apply(&mut s, 0.5);
        assert_eq!(s.view_bounds, Bounds([[0.0, 2.0]; 3]));

        Interpolate { from: 0, to: 1 }.apply(&mut s, 0.5);
        let points = &s.visible_points[0].points;
        assert_relative_eq!(points[(0, 0)], 1.0);
        assert_relative_eq!(points[(2, 2)], 1.0);
        assert_eq!(s.visible_points[0].mask, vec![true; 3]);
    }
}
