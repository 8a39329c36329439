//! Command implementations shared by the binary and its tests.

use nalgebra::DMatrix;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use pca3d_core::pipeline::{create_output_dir, generate, FrameSink, GenerateJob, GenerateOptions, GenerateReport, RenderSettings};
use pca3d_core::{build_trajectory, HdbscanDetector, ReduceConfig, Snapshot, Trajectory};

use crate::encoder::{FfmpegSink, PngSequenceSink};
use crate::error::{CliError, Result};
use crate::input::InputBundle;
use crate::renderer::PlotRenderer;

/// Where rendered frames go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Output {
    /// Pipe into ffmpeg at the given binary path
    Video { ffmpeg: String },
    /// Write numbered PNGs next to the video path
    Frames,
}

/// Reduces and aligns every snapshot of a bundle.
pub fn reduce_bundle(bundle: &InputBundle, config: &ReduceConfig) -> Result<Trajectory> {
    let matrices = bundle.matrices()?;
    Ok(build_trajectory(&matrices, bundle.labels.clone(), config)?)
}

/// Trajectory of already three-dimensional data, shown as is.
pub fn identity_trajectory(data: &DMatrix<f64>, bundle: &InputBundle) -> Result<Trajectory> {
    let projection = DMatrix::identity(data.ncols(), data.ncols());
    let snap = Snapshot::project(data, Arc::new(bundle.labels.clone()), projection)?;
    Ok(Trajectory::new(vec![snap])?)
}

/// Writes one archive per snapshot into a new directory.
pub fn write_snapshots(trajectory: &Trajectory, out_dir: &Path) -> Result<Vec<PathBuf>> {
    create_output_dir(out_dir)?;

    let mut paths = Vec::with_capacity(trajectory.num_snapshots());
    for (i, snap) in trajectory.snapshots().iter().enumerate() {
        let path = out_dir.join(format!("snapshot_{}.json", i));
        snap.save(&path)?;
        paths.push(path);
    }
    info!("Wrote {} snapshot archives to {}", paths.len(), out_dir.display());
    Ok(paths)
}

/// Renders stills and the animation of a trajectory.
pub fn render_trajectory(
    trajectory: Trajectory,
    bundle: &InputBundle,
    out_dir: &Path,
    options: GenerateOptions,
    output: &Output,
) -> Result<GenerateReport> {
    if let Output::Video { ffmpeg } = output {
        check_encoder(ffmpeg)?;
    }

    let settings = RenderSettings::for_mode(options.draft);
    let job = GenerateJob {
        trajectory: Arc::new(trajectory),
        markers: bundle.resolved_markers(),
        titles: bundle.resolved_titles(),
        options,
    };
    let renderer = PlotRenderer::for_settings(&settings);
    let detector = HdbscanDetector::new();

    let report = generate(&job, out_dir, &renderer, &detector, |video, settings| {
        let sink: Box<dyn FrameSink> = match output {
            Output::Video { ffmpeg } => Box::new(FfmpegSink::spawn(ffmpeg, video, settings)?),
            Output::Frames => Box::new(PngSequenceSink::create(video.with_extension("frames"))?),
        };
        Ok(sink)
    })?;

    info!(
        "Done: {} stills, {} frames ({:.1}s)",
        report.stills.len(),
        report.frames,
        report.duration
    );
    Ok(report)
}

/// Fails early when the encoder binary cannot be run.
fn check_encoder(binary: &str) -> Result<()> {
    let status = std::process::Command::new(binary)
        .arg("-version")
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .map_err(|e| CliError::Encoder {
            binary: binary.to_string(),
            reason: e.to_string(),
        })?;
    if !status.success() {
        return Err(CliError::Encoder {
            binary: binary.to_string(),
            reason: format!("-version exited with {}", status),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demo::{gaussian_balls, uniform_cube, BallsConfig};
    use pca3d_core::VisError;

    fn small_balls() -> InputBundle {
        let config = BallsConfig {
            features: 4,
            clusters: 2,
            samples_per_cluster: 10,
            ..BallsConfig::default()
        };
        gaussian_balls(&config, 5)
    }

    #[test]
    fn test_project_writes_loadable_archives() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("proj");
        let traj = reduce_bundle(&small_balls(), &ReduceConfig::default()).unwrap();

        let paths = write_snapshots(&traj, &out).unwrap();
        assert_eq!(paths.len(), 2);
        let loaded = Snapshot::load(&paths[1]).unwrap();
        assert_eq!(loaded.projected_samples(), traj.snapshots()[1].projected_samples());

        assert!(matches!(
            write_snapshots(&traj, &out),
            Err(CliError::Core(VisError::OutputExists(_)))
        ));
    }

    #[test]
    fn test_render_draft_frames() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("render");
        let (data, bundle) = uniform_cube(30, 2);
        let traj = identity_trajectory(&data, &bundle).unwrap();
        let options = GenerateOptions::default().with_draft(true).with_clusters(false);

        let report = render_trajectory(traj, &bundle, &out, options, &Output::Frames).unwrap();

        // Intro only: 12s compressed five times at 30 fps
        assert_eq!(report.frames, 72);
        assert_eq!(report.stills.len(), 6);
        assert!(out.join("draft.frames").join("frame_00071.png").exists());
    }

    #[test]
    fn test_missing_encoder_fails_before_output() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("render");
        let (data, bundle) = uniform_cube(10, 2);
        let traj = identity_trajectory(&data, &bundle).unwrap();
        let output = Output::Video { ffmpeg: "/nonexistent/ffmpeg".to_string() };

        let result = render_trajectory(traj, &bundle, &out, GenerateOptions::default(), &output);
        assert!(matches!(result, Err(CliError::Encoder { .. })));
        assert!(!out.exists());
    }
}
