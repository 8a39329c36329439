//! The "DIRECTOR" - compiles a trajectory into a camera-directed animation
//! and drives rendering.
//!
//! Video structure:
//!
//! ```text
//! intro (12s) ─┬─ [clusters of snapshot 0]
//!              └─ per following snapshot i:
//!                   zoom out (2s, skipped if the view already fits both)
//!                   interpolate i-1 -> i (6s) with a concurrent full turn
//!                   zoom in (2s, skipped if already fitted)
//!                   hold (10s)
//!                   [clusters of snapshot i: 18s each]
//! ```
//!
//! Pixels and video muxing are external collaborators behind
//! [`FrameRenderer`] and [`FrameSink`].

use nalgebra::DMatrix;
use rayon::prelude::*;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::bounds::{cube_bounds_for, cube_bounds_for_all};
use crate::clusters::{ClusterDetector, Clusters};
use crate::easing::Easing;
use crate::error::{Result, VisError};
use crate::scenes::{
    Fade, FixedRotation, FixedTitle, FixedZoom, Interpolate, Masked, Rotate, ShowSnapshot, Zoom,
};
use crate::state::{Color, Marker, RenderState, Rotation};
use crate::timeline::{PopMode, Timeline, TimeUnit, TimelineBuilder};
use crate::trajectory::Trajectory;

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Top-level generation switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerateOptions {
    /// Low resolution, low frame rate and 5x faster timeline
    pub draft: bool,

    /// Fly through the clusters of every snapshot
    pub clusters: bool,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            draft: false,
            clusters: true,
        }
    }
}

impl GenerateOptions {
    pub fn with_draft(mut self, draft: bool) -> Self {
        self.draft = draft;
        self
    }

    pub fn with_clusters(mut self, clusters: bool) -> Self {
        self.clusters = clusters;
        self
    }
}

/// Output settings for one mode.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderSettings {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub bitrate_kbps: u32,
    /// Azimuth step (degrees) between snapshot stills
    pub still_rotation_step: usize,
    /// Timeline speed-up
    pub time_compression: f64,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self::production()
    }
}

impl RenderSettings {
    pub fn production() -> Self {
        Self {
            width: 1920,
            height: 1080,
            fps: 60,
            bitrate_kbps: 8000,
            still_rotation_step: 30,
            time_compression: 1.0,
        }
    }

    pub fn draft() -> Self {
        Self {
            width: 640,
            height: 480,
            fps: 30,
            bitrate_kbps: 1000,
            still_rotation_step: 60,
            time_compression: 5.0,
        }
    }

    pub fn for_mode(draft: bool) -> Self {
        if draft {
            Self::draft()
        } else {
            Self::production()
        }
    }

    /// File name of the video within the output directory.
    pub fn video_file_name(&self) -> &'static str {
        if self.time_compression > 1.0 {
            "draft.mp4"
        } else {
            "video.mp4"
        }
    }
}

// ============================================================================
// COLLABORATORS
// ============================================================================

/// One rendered RGBA8 image.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

impl Frame {
    /// Wraps raw RGBA8 pixels, checking the buffer size.
    pub fn new(width: u32, height: u32, rgba: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * 4;
        if rgba.len() != expected {
            return Err(VisError::shape("frame.rgba", expected, rgba.len()));
        }
        Ok(Self { width, height, rgba })
    }

    /// Transparent frame.
    pub fn blank(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            rgba: vec![0; width as usize * height as usize * 4],
        }
    }

    pub fn save_png(&self, path: impl AsRef<Path>) -> Result<()> {
        let image = image::RgbaImage::from_raw(self.width, self.height, self.rgba.clone())
            .ok_or_else(|| VisError::Render("frame buffer does not match its size".to_string()))?;
        image.save_with_format(path.as_ref(), image::ImageFormat::Png)?;
        Ok(())
    }
}

/// Turns a render state into pixels. Must not mutate the state.
pub trait FrameRenderer: Send + Sync {
    fn render(&self, state: &RenderState) -> Result<Frame>;
}

/// Consumes frames in presentation order.
pub trait FrameSink {
    fn push_frame(&mut self, frame: &Frame) -> Result<()>;

    /// Flushes and closes the output.
    fn finish(&mut self) -> Result<()>;
}

impl<S: FrameSink + ?Sized> FrameSink for Box<S> {
    fn push_frame(&mut self, frame: &Frame) -> Result<()> {
        (**self).push_frame(frame)
    }

    fn finish(&mut self) -> Result<()> {
        (**self).finish()
    }
}

/// Everything describing one animation.
#[derive(Debug, Clone)]
pub struct GenerateJob {
    pub trajectory: Arc<Trajectory>,
    /// Ordered (mask, style) default styling
    pub markers: Vec<Marker>,
    /// One title per snapshot
    pub titles: Vec<String>,
    pub options: GenerateOptions,
}

impl GenerateJob {
    /// Checks markers, titles and dimensionality before anything is written.
    pub fn validate(&self) -> Result<()> {
        let n = self.trajectory.num_samples();
        for (i, marker) in self.markers.iter().enumerate() {
            if marker.mask.len() != n {
                return Err(VisError::shape(format!("markers[{}].mask", i), n, marker.mask.len()));
            }
            if let Some(Color::Values(values)) = &marker.style.color {
                if values.len() != n {
                    return Err(VisError::shape(format!("markers[{}].style.color", i), n, values.len()));
                }
            }
        }
        if self.titles.len() != self.trajectory.num_snapshots() {
            return Err(VisError::shape(
                "titles",
                self.trajectory.num_snapshots(),
                self.titles.len(),
            ));
        }
        if self.trajectory.projection_size() != 3 {
            return Err(VisError::shape(
                "trajectory.projection_size",
                3,
                self.trajectory.projection_size(),
            ));
        }
        Ok(())
    }
}

/// Summary of a finished generation.
#[derive(Debug, Clone)]
pub struct GenerateReport {
    pub stills: Vec<PathBuf>,
    pub video: PathBuf,
    pub frames: usize,
    pub duration: f64,
}

// ============================================================================
// COMPILATION
// ============================================================================

const INTRO_SECONDS: f64 = 12.0;
const ZOOM_SECONDS: f64 = 2.0;
const INTERPOLATE_SECONDS: f64 = 6.0;
const HOLD_SECONDS: f64 = 10.0;
const FADE_SECONDS: f64 = 2.0;
const CLUSTER_ROTATE_SECONDS: f64 = 10.0;

/// Compiles the whole animation into a timeline.
///
/// With a detector, clusters of every snapshot are found in parallel and
/// each one gets its own flythrough after the snapshot is held.
pub fn compile_timeline(
    trajectory: &Trajectory,
    titles: &[String],
    detector: Option<&dyn ClusterDetector>,
    draft: bool,
) -> Result<Timeline> {
    if titles.len() != trajectory.num_snapshots() {
        return Err(VisError::shape("titles", trajectory.num_snapshots(), titles.len()));
    }

    let clusters: Vec<Option<Clusters>> = match detector {
        Some(detector) => trajectory
            .snapshots()
            .par_iter()
            .map(|snap| detector.detect(snap.projected_samples()).map(Some))
            .collect::<Result<_>>()?,
        None => vec![None; trajectory.num_snapshots()],
    };

    let home = Rotation::default();
    let mut pts = trajectory.snapshots()[0].projected_samples();
    let mut zoom = cube_bounds_for(pts);

    let mut b = TimelineBuilder::new(ShowSnapshot(0));
    b.join(FixedTitle(titles[0].clone()), false)
        .join(Rotate::full_turn(home), true)
        .join(FixedZoom(zoom), false)
        .dilate(Easing::SineInOut)
        .time_rescale_exact(INTRO_SECONDS, TimeUnit::Seconds);

    if let Some(c) = &clusters[0] {
        cluster_flythrough(&mut b, 0, pts, c, &titles[0]);
    }

    for i in 1..trajectory.num_snapshots() {
        let npts = trajectory.snapshots()[i].projected_samples();
        let nzoom = cube_bounds_for(npts);
        let mzoom = cube_bounds_for_all(&[pts.clone(), npts.clone()]);
        let ntitle = &titles[i];
        let ititle = format!("{} -> {}", titles[i - 1], ntitle);

        if !zoom.approx_eq(&mzoom) {
            b.push(Zoom { start: zoom, end: mzoom })
                .join(ShowSnapshot(i - 1), false)
                .join(FixedTitle(ititle.clone()), false)
                .join(FixedRotation(home), false)
                .dilate(Easing::Smoothstep)
                .time_rescale_exact(ZOOM_SECONDS, TimeUnit::Seconds)
                .pop(PopMode::Sequential);
        }

        b.push(Interpolate { from: i - 1, to: i })
            .dilate(Easing::CircInOut)
            .join(FixedZoom(mzoom), false)
            .join(FixedTitle(ititle.clone()), false)
            .push(Rotate::full_turn(home))
            .dilate(Easing::SineInOut)
            .dilate(Easing::Squeeze { amount: 0.1 })
            .pop(PopMode::Join)
            .time_rescale_exact(INTERPOLATE_SECONDS, TimeUnit::Seconds)
            .pop(PopMode::Sequential);

        if !mzoom.approx_eq(&nzoom) {
            b.push(Zoom { start: mzoom, end: nzoom })
                .join(ShowSnapshot(i), false)
                .join(FixedTitle(ititle), false)
                .join(FixedRotation(home), false)
                .dilate(Easing::Smoothstep)
                .time_rescale_exact(ZOOM_SECONDS, TimeUnit::Seconds)
                .pop(PopMode::Sequential);
        }

        b.push(ShowSnapshot(i))
            .join(FixedTitle(ntitle.clone()), false)
            .join(Rotate::full_turn(home), true)
            .join(FixedZoom(nzoom), false)
            .dilate(Easing::SineInOut)
            .time_rescale_exact(HOLD_SECONDS, TimeUnit::Seconds)
            .pop(PopMode::Sequential);

        if let Some(c) = &clusters[i] {
            cluster_flythrough(&mut b, i, npts, c, ntitle);
        }

        pts = npts;
        zoom = nzoom;
    }

    if draft {
        b.time_rescale(RenderSettings::draft().time_compression);
    }
    b.build()
}

/// Appends one 18s flythrough per cluster: fade out the rest, zoom in,
/// turn around, zoom out, fade the rest back in.
fn cluster_flythrough(
    b: &mut TimelineBuilder,
    snapshot: usize,
    samples: &DMatrix<f64>,
    clusters: &Clusters,
    title: &str,
) {
    if clusters.num_clusters() == 0 {
        debug!("Snapshot {}: no clusters to fly through", snapshot);
        return;
    }

    let home = Rotation::default();
    let outer = cube_bounds_for(samples);

    for c in 0..clusters.num_clusters() {
        let ctitle = format!("{} - Cluster {}", title, c + 1);
        let mask = clusters.mask(c);
        let inverse: Vec<bool> = mask.iter().map(|m| !m).collect();
        let rows: Vec<usize> = (0..mask.len()).filter(|&r| mask[r]).collect();
        let inner = cube_bounds_for(&samples.select_rows(rows.iter()));

        b.push(Fade { snapshot, mask: inverse.clone(), alpha_start: 1.0, alpha_end: 0.0 })
            .join(FixedTitle(ctitle.clone()), false)
            .join(FixedRotation(home), false)
            .join(FixedZoom(outer), false)
            .dilate(Easing::SineOut)
            .time_rescale_exact(FADE_SECONDS, TimeUnit::Seconds)
            .pop(PopMode::Sequential)
            .push(Zoom { start: outer, end: inner })
            .join(Masked { snapshot, mask: mask.clone() }, false)
            .join(FixedTitle(ctitle.clone()), false)
            .join(FixedRotation(home), false)
            .dilate(Easing::Smoothstep)
            .time_rescale_exact(ZOOM_SECONDS, TimeUnit::Seconds)
            .pop(PopMode::Sequential)
            .push(Rotate::full_turn(home))
            .join(Masked { snapshot, mask: mask.clone() }, false)
            .join(FixedTitle(ctitle.clone()), false)
            .join(FixedZoom(inner), false)
            .dilate(Easing::SineInOut)
            .time_rescale_exact(CLUSTER_ROTATE_SECONDS, TimeUnit::Seconds)
            .pop(PopMode::Sequential)
            .push(Zoom { start: inner, end: outer })
            .join(Masked { snapshot, mask }, false)
            .join(FixedTitle(ctitle.clone()), false)
            .join(FixedRotation(home), false)
            .dilate(Easing::Smoothstep)
            .time_rescale_exact(ZOOM_SECONDS, TimeUnit::Seconds)
            .pop(PopMode::Sequential)
            .push(Fade { snapshot, mask: inverse, alpha_start: 0.0, alpha_end: 1.0 })
            .join(FixedTitle(ctitle), false)
            .join(FixedRotation(home), false)
            .join(FixedZoom(outer), false)
            .dilate(Easing::SineIn)
            .time_rescale_exact(FADE_SECONDS, TimeUnit::Seconds)
            .pop(PopMode::Sequential);
    }
}

// ============================================================================
// GENERATION
// ============================================================================

/// Renders the snapshot stills and the full video into `out_dir`.
///
/// `out_dir` must not exist yet. `open_sink` receives the video path and the
/// settings of the selected mode.
pub fn generate<S, F>(
    job: &GenerateJob,
    out_dir: &Path,
    renderer: &dyn FrameRenderer,
    detector: &dyn ClusterDetector,
    open_sink: F,
) -> Result<GenerateReport>
where
    S: FrameSink,
    F: FnOnce(&Path, &RenderSettings) -> Result<S>,
{
    job.validate()?;
    create_output_dir(out_dir)?;

    let settings = RenderSettings::for_mode(job.options.draft);
    let snapshots_dir = out_dir.join("snapshots");
    fs::create_dir(&snapshots_dir)?;

    let initial = RenderState::new(Arc::clone(&job.trajectory), job.markers.clone());
    let stills = render_stills(&initial, &job.titles, &snapshots_dir, renderer, &settings)?;

    let detector = job.options.clusters.then_some(detector);
    let timeline = compile_timeline(&job.trajectory, &job.titles, detector, job.options.draft)?;

    let frames = timeline.num_frames(settings.fps);
    info!(
        "Rendering {} frames ({:.1}s at {} fps, {}x{})",
        frames,
        timeline.duration(),
        settings.fps,
        settings.width,
        settings.height
    );

    let video = out_dir.join(settings.video_file_name());
    let mut sink = open_sink(&video, &settings)?;
    render_frames(&timeline, &initial, frames, settings.fps, renderer, &mut sink)?;
    sink.finish()?;

    info!("Wrote {}", video.display());
    Ok(GenerateReport {
        stills,
        video,
        frames,
        duration: timeline.duration(),
    })
}

/// Creates `out_dir` (and any missing parents), failing with `OutputExists`
/// if it is already there.
pub fn create_output_dir(out_dir: &Path) -> Result<()> {
    if let Some(parent) = out_dir.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::create_dir(out_dir).map_err(|e| match e.kind() {
        ErrorKind::AlreadyExists => VisError::OutputExists(out_dir.to_path_buf()),
        _ => VisError::Io(e),
    })
}

/// One still per snapshot and azimuth, fitted to the snapshot.
fn render_stills(
    initial: &RenderState,
    titles: &[String],
    dir: &Path,
    renderer: &dyn FrameRenderer,
    settings: &RenderSettings,
) -> Result<Vec<PathBuf>> {
    let mut state = initial.clone();
    let mut paths = Vec::new();

    for (i, title) in titles.iter().enumerate() {
        state.set_snapshot_visible(i, true);
        state.title.clone_from(title);
        for azimuth in (15..375).step_by(settings.still_rotation_step) {
            state.rotation = Rotation {
                elevation: crate::state::DEFAULT_ELEVATION,
                azimuth: azimuth as f64,
            };
            let path = dir.join(format!("snapshot_{}_rot{}.png", i, azimuth));
            renderer.render(&state)?.save_png(&path)?;
            paths.push(path);
        }
    }
    debug!("Wrote {} snapshot stills", paths.len());
    Ok(paths)
}

/// Renders frames in parallel batches and hands them to the sink in order.
fn render_frames<S: FrameSink>(
    timeline: &Timeline,
    initial: &RenderState,
    frames: usize,
    fps: u32,
    renderer: &dyn FrameRenderer,
    sink: &mut S,
) -> Result<()> {
    let batch = (rayon::current_num_threads() * 4).max(1);
    let mut start = 0;

    while start < frames {
        let end = (start + batch).min(frames);
        let rendered: Vec<Frame> = (start..end)
            .into_par_iter()
            .map(|i| renderer.render(&timeline.state_at(initial, i as f64 / fps as f64)))
            .collect::<Result<_>>()?;

        for frame in &rendered {
            sink.push_frame(frame)?;
        }
        debug!("Rendered {}/{} frames", end, frames);
        start = end;
    }

    if frames == 0 {
        warn!("Timeline is empty, no frames rendered");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clusters::{ClusterParams, NOISE};
    use crate::labels::{LabelValues, SampleLabels};
    use crate::snapshot::Snapshot;
    use crate::state::Style;
    use crate::trajectory::{build_trajectory, ReduceConfig};
    use approx::assert_relative_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Draws nothing; records how many frames it produced.
    #[derive(Default)]
    struct BlankRenderer {
        calls: AtomicUsize,
    }

    impl FrameRenderer for BlankRenderer {
        fn render(&self, _state: &RenderState) -> Result<Frame> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Frame::blank(4, 3))
        }
    }

    /// Encodes each frame's pixel sum so ordering can be checked.
    struct TimeRenderer;

    impl FrameRenderer for TimeRenderer {
        fn render(&self, state: &RenderState) -> Result<Frame> {
            let value = (state.rotation.azimuth.round() as u32 % 256) as u8;
            Frame::new(1, 1, vec![value, 0, 0, 255])
        }
    }

    #[derive(Default)]
    struct CollectSink {
        frames: Arc<Mutex<Vec<Frame>>>,
        finished: bool,
    }

    impl FrameSink for CollectSink {
        fn push_frame(&mut self, frame: &Frame) -> Result<()> {
            self.frames.lock().unwrap().push(frame.clone());
            Ok(())
        }

        fn finish(&mut self) -> Result<()> {
            self.finished = true;
            Ok(())
        }
    }

    /// Puts the first two samples in a cluster, everything else is noise.
    struct PairDetector;

    impl ClusterDetector for PairDetector {
        fn detect(&self, samples: &DMatrix<f64>) -> Result<Clusters> {
            let mut labels = vec![NOISE; samples.nrows()];
            labels[0] = 0;
            labels[1] = 0;
            let params = ClusterParams {
                min_cluster_size: 2,
                min_samples: 2,
                method: "pair".to_string(),
            };
            Clusters::from_assignments(samples.clone(), &labels, params)
        }
    }

    struct NoClusters;

    impl ClusterDetector for NoClusters {
        fn detect(&self, samples: &DMatrix<f64>) -> Result<Clusters> {
            let params = ClusterParams { min_cluster_size: 2, min_samples: 2, method: "none".to_string() };
            Clusters::from_assignments(samples.clone(), &vec![0; samples.nrows()], params)
        }
    }

    fn raw(n: usize, scale: f64) -> DMatrix<f64> {
        DMatrix::from_fn(n, 3, |r, c| ((r * 5 + c * 11) as f64 * 0.3).sin() * scale * (3 - c) as f64)
    }

    fn aligned_trajectory() -> Arc<Trajectory> {
        let labels = SampleLabels::from_values(LabelValues::I32((0..50).collect()));
        let mats = vec![raw(50, 1.0), raw(50, 2.5)];
        Arc::new(build_trajectory(&mats, labels, &ReduceConfig::default()).unwrap())
    }

    /// Second snapshot shifted so every zoom step is needed.
    fn shifted_trajectory() -> Arc<Trajectory> {
        let labels = Arc::new(SampleLabels::from_values(LabelValues::I32((0..50).collect())));
        let a = raw(50, 1.0);
        let b = a.add_scalar(10.0);
        let snaps = vec![
            Snapshot::project(&a, labels.clone(), DMatrix::identity(3, 3)).unwrap(),
            Snapshot::project(&b, labels, DMatrix::identity(3, 3)).unwrap(),
        ];
        Arc::new(Trajectory::new(snaps).unwrap())
    }

    fn titles() -> Vec<String> {
        vec!["Input".to_string(), "Hidden".to_string()]
    }

    fn expected_base_duration(traj: &Trajectory) -> f64 {
        let a = traj.snapshots()[0].projected_samples();
        let b = traj.snapshots()[1].projected_samples();
        let zoom = cube_bounds_for(a);
        let nzoom = cube_bounds_for(b);
        let mzoom = cube_bounds_for_all(&[a.clone(), b.clone()]);

        let mut expected = INTRO_SECONDS + INTERPOLATE_SECONDS + HOLD_SECONDS;
        if !zoom.approx_eq(&mzoom) {
            expected += ZOOM_SECONDS;
        }
        if !mzoom.approx_eq(&nzoom) {
            expected += ZOOM_SECONDS;
        }
        expected
    }

    fn job(trajectory: Arc<Trajectory>, options: GenerateOptions) -> GenerateJob {
        let n = trajectory.num_samples();
        GenerateJob {
            trajectory,
            markers: vec![Marker { mask: vec![true; n], style: Style::default() }],
            titles: titles(),
            options,
        }
    }

    #[test]
    fn test_duration_without_clusters() {
        let traj = aligned_trajectory();
        let timeline = compile_timeline(&traj, &titles(), None, false).unwrap();
        assert_relative_eq!(timeline.duration(), expected_base_duration(&traj), epsilon = 1e-9);

        let shifted = shifted_trajectory();
        let timeline = compile_timeline(&shifted, &titles(), None, false).unwrap();
        assert_relative_eq!(timeline.duration(), 32.0, epsilon = 1e-9);
    }

    #[test]
    fn test_each_cluster_adds_eighteen_seconds() {
        let traj = aligned_trajectory();
        let base = compile_timeline(&traj, &titles(), None, false).unwrap().duration();
        let with_pairs = compile_timeline(&traj, &titles(), Some(&PairDetector), false).unwrap();
        assert_relative_eq!(with_pairs.duration(), base + 2.0 * 18.0, epsilon = 1e-9);

        let degenerate = compile_timeline(&traj, &titles(), Some(&NoClusters), false).unwrap();
        assert_relative_eq!(degenerate.duration(), base, epsilon = 1e-9);
    }

    #[test]
    fn test_draft_is_five_times_faster() {
        let traj = aligned_trajectory();
        let production = compile_timeline(&traj, &titles(), Some(&PairDetector), false).unwrap();
        let draft = compile_timeline(&traj, &titles(), Some(&PairDetector), true).unwrap();
        assert_relative_eq!(draft.duration(), production.duration() / 5.0, epsilon = 1e-9);
        assert_eq!(draft.num_spans(), production.num_spans());
    }

    #[test]
    fn test_intro_then_hold_states() {
        let traj = shifted_trajectory();
        let timeline = compile_timeline(&traj, &titles(), None, false).unwrap();
        let initial = RenderState::new(Arc::clone(&traj), Vec::new());

        let intro = timeline.state_at(&initial, 1.0);
        assert_eq!(intro.title, "Input");
        assert_eq!(intro.view_bounds, cube_bounds_for(traj.snapshots()[0].projected_samples()));

        let transition = timeline.state_at(&initial, 13.0);
        assert_eq!(transition.title, "Input -> Hidden");

        let hold = timeline.state_at(&initial, 25.0);
        assert_eq!(hold.title, "Hidden");
        assert_eq!(hold.visible_points[0].points, *traj.snapshots()[1].projected_samples());
        assert!(hold.view_bounds.approx_eq(&cube_bounds_for(traj.snapshots()[1].projected_samples())));
    }

    #[test]
    fn test_cluster_flythrough_masks_members() {
        let traj = shifted_trajectory();
        let timeline = compile_timeline(&traj, &titles(), Some(&PairDetector), false).unwrap();
        let initial = RenderState::new(Arc::clone(&traj), Vec::new());

        // Intro (12s) then the first cluster's rotate step starts at 12 + 2 + 2
        let state = timeline.state_at(&initial, 17.0);
        assert_eq!(state.title, "Input - Cluster 1");
        assert_eq!(state.visible_points.len(), 1);
        assert_eq!(state.visible_points[0].points.nrows(), 2);
    }

    #[test]
    fn test_validation_rejects_bad_inputs() {
        let traj = aligned_trajectory();

        let mut bad_marker = job(Arc::clone(&traj), GenerateOptions::default());
        bad_marker.markers[0].mask.pop();
        assert_eq!(bad_marker.validate().unwrap_err().field(), Some("markers[0].mask"));

        let mut bad_colors = job(Arc::clone(&traj), GenerateOptions::default());
        bad_colors.markers[0].style.color = Some(Color::Values(vec![0.5; 49]));
        assert_eq!(bad_colors.validate().unwrap_err().field(), Some("markers[0].style.color"));

        let mut good_colors = job(Arc::clone(&traj), GenerateOptions::default());
        good_colors.markers[0].style.color = Some(Color::Values(vec![0.5; 50]));
        assert!(good_colors.validate().is_ok());

        let mut bad_titles = job(Arc::clone(&traj), GenerateOptions::default());
        bad_titles.titles.pop();
        assert_eq!(bad_titles.validate().unwrap_err().field(), Some("titles"));

        let labels = SampleLabels::from_values(LabelValues::I32((0..50).collect()));
        let flat = build_trajectory(&[raw(50, 1.0)], labels, &ReduceConfig::default().with_components(2)).unwrap();
        let mut bad_dims = job(Arc::new(flat), GenerateOptions::default());
        bad_dims.titles.pop();
        assert_eq!(bad_dims.validate().unwrap_err().field(), Some("trajectory.projection_size"));
    }

    #[test]
    fn test_generate_writes_layout() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        let renderer = BlankRenderer::default();
        let frames = Arc::new(Mutex::new(Vec::new()));
        let sink_frames = Arc::clone(&frames);
        let options = GenerateOptions::default().with_draft(true).with_clusters(false);

        let report = generate(&job(aligned_trajectory(), options), &out, &renderer, &PairDetector, |path, settings| {
            assert!(path.ends_with("draft.mp4"));
            assert_eq!(settings.fps, 30);
            Ok(CollectSink { frames: sink_frames, finished: false })
        })
        .unwrap();

        // Six stills per snapshot at a 60 degree step
        assert_eq!(report.stills.len(), 12);
        assert!(out.join("snapshots").join("snapshot_1_rot315.png").exists());
        assert!(!out.join("snapshots").join("snapshot_0_rot375.png").exists());
        assert_eq!(frames.lock().unwrap().len(), report.frames);
        assert_eq!(report.frames, (report.duration * 30.0).round() as usize);
        assert_eq!(renderer.calls.load(Ordering::SeqCst), 12 + report.frames);
    }

    #[test]
    fn test_generate_refuses_existing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = BlankRenderer::default();
        let result = generate(
            &job(aligned_trajectory(), GenerateOptions::default()),
            dir.path(),
            &renderer,
            &PairDetector,
            |_, _| Ok(CollectSink::default()),
        );
        assert!(matches!(result, Err(VisError::OutputExists(_))));
        assert_eq!(renderer.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_output_dir_created_once() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("nested").join("out");

        create_output_dir(&out).unwrap();
        assert!(out.is_dir());
        assert!(matches!(create_output_dir(&out), Err(VisError::OutputExists(p)) if p == out));
    }

    #[test]
    fn test_frames_delivered_in_order() {
        let traj = shifted_trajectory();
        let mut b = TimelineBuilder::new(Rotate {
            start: Rotation { elevation: 0.0, azimuth: 0.0 },
            end: Rotation { elevation: 0.0, azimuth: 200.0 },
        });
        b.time_rescale_exact(2.0, TimeUnit::Seconds);
        let timeline = b.build().unwrap();
        let initial = RenderState::new(traj, Vec::new());
        let mut sink = CollectSink::default();

        render_frames(&timeline, &initial, 200, 100, &TimeRenderer, &mut sink).unwrap();
        let frames = sink.frames.lock().unwrap();
        let values: Vec<u8> = frames.iter().map(|f| f.rgba[0]).collect();
        assert_eq!(values.len(), 200);
        assert!(values.windows(2).all(|w| w[0] <= w[1]));
    }
}
