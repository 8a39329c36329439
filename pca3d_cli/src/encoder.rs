//! Frame sinks: an ffmpeg pipe for video, a PNG sequence for inspection.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use tracing::{debug, warn};

use pca3d_core::pipeline::{Frame, FrameSink, RenderSettings};
use pca3d_core::{Result, VisError};

/// Arguments for encoding raw RGBA frames from stdin into an H.264 mp4.
pub fn ffmpeg_args(output: &Path, settings: &RenderSettings) -> Vec<String> {
    vec![
        "-y".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-f".to_string(),
        "rawvideo".to_string(),
        "-pix_fmt".to_string(),
        "rgba".to_string(),
        "-s".to_string(),
        format!("{}x{}", settings.width, settings.height),
        "-r".to_string(),
        settings.fps.to_string(),
        "-i".to_string(),
        "-".to_string(),
        "-c:v".to_string(),
        "libx264".to_string(),
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
        "-b:v".to_string(),
        format!("{}k", settings.bitrate_kbps),
        output.display().to_string(),
    ]
}

/// Streams frames into an ffmpeg child process.
///
/// Dropping the sink before [`FrameSink::finish`] succeeded kills the
/// encoder, reaps it and removes the partial video.
pub struct FfmpegSink {
    child: Child,
    stdin: Option<ChildStdin>,
    width: u32,
    height: u32,
    output: PathBuf,
    finished: bool,
}

impl FfmpegSink {
    pub fn spawn(binary: &str, output: &Path, settings: &RenderSettings) -> Result<Self> {
        let mut child = Command::new(binary)
            .args(ffmpeg_args(output, settings))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .spawn()
            .map_err(|e| VisError::Encode(format!("failed to start {}: {}", binary, e)))?;
        let stdin = child.stdin.take();

        debug!("Spawned {} for {}", binary, output.display());
        Ok(Self {
            child,
            stdin,
            width: settings.width,
            height: settings.height,
            output: output.to_path_buf(),
            finished: false,
        })
    }
}

impl FrameSink for FfmpegSink {
    fn push_frame(&mut self, frame: &Frame) -> Result<()> {
        if frame.width != self.width || frame.height != self.height {
            return Err(VisError::shape(
                "frame",
                format!("{}x{}", self.width, self.height),
                format!("{}x{}", frame.width, frame.height),
            ));
        }
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| VisError::Encode("encoder input already closed".to_string()))?;
        stdin
            .write_all(&frame.rgba)
            .map_err(|e| VisError::Encode(format!("writing frame: {}", e)))
    }

    fn finish(&mut self) -> Result<()> {
        drop(self.stdin.take());
        let status = self.child.wait()?;
        if !status.success() {
            return Err(VisError::Encode(format!(
                "ffmpeg exited with {} while writing {}",
                status,
                self.output.display()
            )));
        }
        self.finished = true;
        Ok(())
    }
}

impl Drop for FfmpegSink {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        drop(self.stdin.take());
        if let Err(e) = self.child.kill() {
            debug!("Encoder already stopped: {}", e);
        }
        if let Err(e) = self.child.wait() {
            warn!("Failed to reap encoder: {}", e);
        }
        if self.output.exists() {
            match fs::remove_file(&self.output) {
                Ok(()) => warn!("Removed incomplete video {}", self.output.display()),
                Err(e) => warn!("Failed to remove incomplete video {}: {}", self.output.display(), e),
            }
        }
    }
}

/// Writes every frame as `frame_00000.png`, `frame_00001.png`, ...
pub struct PngSequenceSink {
    dir: PathBuf,
    next: usize,
}

impl PngSequenceSink {
    pub fn create(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir, next: 0 })
    }

    pub fn frames_written(&self) -> usize {
        self.next
    }
}

impl FrameSink for PngSequenceSink {
    fn push_frame(&mut self, frame: &Frame) -> Result<()> {
        frame.save_png(self.dir.join(format!("frame_{:05}.png", self.next)))?;
        self.next += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        debug!("Wrote {} frames to {}", self.next, self.dir.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ffmpeg_args_follow_settings() {
        let args = ffmpeg_args(Path::new("out/draft.mp4"), &RenderSettings::draft());
        let joined = args.join(" ");

        assert!(joined.contains("-s 640x480"));
        assert!(joined.contains("-r 30"));
        assert!(joined.contains("-b:v 1000k"));
        assert_eq!(args.last().map(String::as_str), Some("out/draft.mp4"));
    }

    #[test]
    fn test_png_sequence_numbers_frames() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = PngSequenceSink::create(dir.path().join("frames")).unwrap();
        for _ in 0..3 {
            sink.push_frame(&Frame::blank(2, 2)).unwrap();
        }
        sink.finish().unwrap();

        assert_eq!(sink.frames_written(), 3);
        assert!(dir.path().join("frames/frame_00002.png").exists());
    }

    #[test]
    fn test_missing_binary_is_encode_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = FfmpegSink::spawn(
            "/nonexistent/ffmpeg-binary",
            &dir.path().join("video.mp4"),
            &RenderSettings::draft(),
        );
        assert!(matches!(result, Err(VisError::Encode(_))));
    }

    /// Stand-in encoder: writes its last argument, then drains stdin.
    #[cfg(unix)]
    fn fake_encoder(dir: &Path) -> String {
        use std::os::unix::fs::PermissionsExt;

        let script = dir.join("fake-ffmpeg");
        fs::write(
            &script,
            "#!/bin/sh\nfor last; do :; done\nprintf partial > \"$last\"\nexec cat > /dev/null\n",
        )
        .unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();
        script.display().to_string()
    }

    #[cfg(unix)]
    #[test]
    fn test_finished_video_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let binary = fake_encoder(dir.path());
        let video = dir.path().join("draft.mp4");

        let mut sink = FfmpegSink::spawn(&binary, &video, &RenderSettings::draft()).unwrap();
        sink.push_frame(&Frame::blank(640, 480)).unwrap();
        sink.finish().unwrap();
        drop(sink);

        assert!(video.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_unfinished_video_is_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let binary = fake_encoder(dir.path());
        let video = dir.path().join("draft.mp4");

        let mut sink = FfmpegSink::spawn(&binary, &video, &RenderSettings::draft()).unwrap();
        sink.push_frame(&Frame::blank(640, 480)).unwrap();
        drop(sink);

        assert!(!video.exists());
    }
}
