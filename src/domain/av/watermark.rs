use super::progress::{ProgressCallback, ProgressParser};
use crate::ports::processor::{ProcessingError, WatermarkEngine};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command as TokioCommand;
use tracing::{debug, info, warn};

/// Lines of ffmpeg stderr kept as the error diagnostic.
const DIAGNOSTIC_LINES: usize = 8;

/// Encoder padding allowed on top of the source duration.
const DURATION_SLACK: Duration = Duration::from_millis(250);

/// Input 0 is the asset, input 1 the looping watermark track.
///
/// The watermark is re-timestamped so its looped copies form one continuous
/// stream on the asset's timebase, mixed with `duration=shortest` so the output
/// never outlives the asset, then passed through a unity volume stage.
pub fn filter_graph() -> String {
    [
        "[1:a]asetpts=N/SR/TB[pts]",
        "[0:a][pts]amix=inputs=2:duration=shortest[mix]",
        "[mix]volume=volume=1[volume]",
    ]
    .join(";")
}

pub fn ffmpeg_args(source: &Path, watermark: &Path, destination: &Path) -> Vec<String> {
    let source = source.to_string_lossy();
    let watermark = watermark.to_string_lossy();
    let destination = destination.to_string_lossy();
    let graph = filter_graph();

    [
        "-hide_banner",
        "-nostdin",
        "-y",
        "-i",
        &*source,
        "-stream_loop",
        "-1",
        "-i",
        &*watermark,
        "-filter_complex",
        graph.as_str(),
        "-map",
        "[volume]",
        "-progress",
        "pipe:1",
        "-nostats",
        &*destination,
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Runs the ffmpeg CLI as a child process.
#[derive(Clone)]
pub struct FfmpegWatermarker {
    ffmpeg: PathBuf,
    ffprobe: Option<PathBuf>,
    on_progress: Option<ProgressCallback>,
}

impl FfmpegWatermarker {
    pub fn new(ffmpeg: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: None,
            on_progress: None,
        }
    }

    /// Probe source durations so progress can be reported as a percentage.
    pub fn with_ffprobe(mut self, ffprobe: impl Into<PathBuf>) -> Self {
        self.ffprobe = Some(ffprobe.into());
        self
    }

    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.on_progress = Some(callback);
        self
    }

    async fn probed_duration(&self, media: &Path) -> Option<Duration> {
        let ffprobe = self.ffprobe.as_ref()?;
        match probe_duration(ffprobe, media).await {
            Ok(duration) => duration,
            Err(e) => {
                debug!(error = %e, media = %media.display(), "Could not probe duration");
                None
            }
        }
    }

    async fn check_output_duration(&self, destination: &Path, expected: Duration) {
        if let Some(actual) = self.probed_duration(destination).await {
            if actual > expected + DURATION_SLACK {
                warn!(
                    destination = %destination.display(),
                    expected_ms = expected.as_millis() as u64,
                    actual_ms = actual.as_millis() as u64,
                    "Watermarked output is longer than its source"
                );
            }
        }
    }
}

#[async_trait]
impl WatermarkEngine for FfmpegWatermarker {
    async fn apply_watermark(
        &self,
        source: &Path,
        watermark: &Path,
        destination: &Path,
    ) -> Result<(), ProcessingError> {
        if tokio::fs::metadata(watermark).await.is_err() {
            return Err(ProcessingError::MissingWatermark(watermark.to_path_buf()));
        }

        let total = self.probed_duration(source).await;
        let program = self.ffmpeg.to_string_lossy().into_owned();

        let mut child = TokioCommand::new(&self.ffmpeg)
            .args(ffmpeg_args(source, watermark, destination))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // a timed-out request drops this future; take ffmpeg down with it
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ProcessingError::Spawn {
                program: program.clone(),
                source,
            })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let on_progress = self.on_progress.clone();

        let progress = async move {
            let Some(stdout) = stdout else { return };
            let mut parser = ProgressParser::new(total);
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if let Some(update) = parser.feed(&line) {
                    debug!(
                        out_time_ms = update.out_time.as_millis() as u64,
                        percent = update.percent,
                        "Watermarking"
                    );
                    if let Some(callback) = &on_progress {
                        callback(update);
                    }
                }
            }
        };

        let diagnostics = async move {
            let mut buf = String::new();
            if let Some(mut stderr) = stderr {
                let _ = stderr.read_to_string(&mut buf).await;
            }
            buf
        };

        let ((), stderr_text, status) = tokio::join!(progress, diagnostics, child.wait());
        let status = status?;

        check_exit(&program, status, &stderr_text)?;

        if tokio::fs::metadata(destination).await.is_err() {
            return Err(ProcessingError::MissingOutput(destination.to_path_buf()));
        }

        if let Some(expected) = total {
            self.check_output_duration(destination, expected).await;
        }

        info!(
            source = %source.display(),
            destination = %destination.display(),
            "Watermarking finished"
        );
        Ok(())
    }
}

fn check_exit(program: &str, status: ExitStatus, stderr: &str) -> Result<(), ProcessingError> {
    if status.success() {
        return Ok(());
    }
    let diagnostic = stderr_tail(stderr, DIAGNOSTIC_LINES);
    warn!(program, %status, diagnostic = %diagnostic, "Media engine failed");
    Err(ProcessingError::Failed {
        program: program.to_string(),
        status: status.to_string(),
        diagnostic,
    })
}

fn stderr_tail(stderr: &str, lines: usize) -> String {
    let kept: Vec<&str> = stderr
        .lines()
        .filter(|l| !l.trim().is_empty())
        .collect();
    let start = kept.len().saturating_sub(lines);
    kept[start..].join("\n")
}

/// Container duration as reported by ffprobe, `None` when it has none.
pub async fn probe_duration(
    ffprobe: &Path,
    media: &Path,
) -> Result<Option<Duration>, ProcessingError> {
    let program = ffprobe.to_string_lossy().into_owned();
    let output = TokioCommand::new(ffprobe)
        .arg("-v")
        .arg("error")
        .arg("-show_entries")
        .arg("format=duration")
        .arg("-of")
        .arg("default=noprint_wrappers=1:nokey=1")
        .arg(media)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|source| ProcessingError::Spawn {
            program: program.clone(),
            source,
        })?;

    check_exit(
        &program,
        output.status,
        &String::from_utf8_lossy(&output.stderr),
    )?;
    Ok(parse_duration(&String::from_utf8_lossy(&output.stdout)))
}

pub fn parse_duration(stdout: &str) -> Option<Duration> {
    let seconds: f64 = stdout.trim().parse().ok()?;
    if seconds.is_finite() && seconds >= 0.0 {
        Some(Duration::from_secs_f64(seconds))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::av::progress::WatermarkProgress;
    use std::sync::{Arc, Mutex};
    use tempfile::tempdir;

    #[test]
    fn graph_mixes_with_shortest_duration() {
        let graph = filter_graph();

        assert!(graph.contains("asetpts=N/SR/TB"));
        assert!(graph.contains("amix=inputs=2:duration=shortest"));
        assert!(graph.ends_with("[mix]volume=volume=1[volume]"));
    }

    #[test]
    fn args_loop_watermark_and_map_only_the_mix() {
        let args = ffmpeg_args(
            Path::new("in.mp3"),
            Path::new("wm.wav"),
            Path::new("out.mp3"),
        );

        let loop_at = args.iter().position(|a| a == "-stream_loop").unwrap();
        assert_eq!(args[loop_at + 1], "-1");
        assert_eq!(args[loop_at + 3], "wm.wav");

        let map_at = args.iter().position(|a| a == "-map").unwrap();
        assert_eq!(args[map_at + 1], "[volume]");
        assert_eq!(args.iter().filter(|a| *a == "-map").count(), 1);
        assert_eq!(args.last().map(String::as_str), Some("out.mp3"));
    }

    #[test]
    fn parses_ffprobe_duration() {
        assert_eq!(parse_duration("12.500000\n"), Some(Duration::from_millis(12500)));
        assert_eq!(parse_duration("N/A"), None);
        assert_eq!(parse_duration("-3"), None);
    }

    #[test]
    fn keeps_last_stderr_lines() {
        let text = "a\n\nb\nc\nd\n";
        assert_eq!(stderr_tail(text, 2), "c\nd");
        assert_eq!(stderr_tail(text, 10), "a\nb\nc\nd");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn abandoned_probe_kills_ffprobe() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let marker = dir.path().join("still-running");
        let ffprobe = dir.path().join("slow-ffprobe");
        std::fs::write(
            &ffprobe,
            format!("#!/bin/sh\nsleep 0.3\ntouch '{}'\n", marker.display()),
        )
        .unwrap();
        std::fs::set_permissions(&ffprobe, std::fs::Permissions::from_mode(0o755)).unwrap();

        let probe = probe_duration(&ffprobe, Path::new("in.mp3"));
        let result = tokio::time::timeout(Duration::from_millis(50), probe).await;
        assert!(result.is_err());

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn missing_watermark_track_fails_before_spawning() {
        let dir = tempdir().unwrap();
        let engine = FfmpegWatermarker::new("ffmpeg-that-does-not-exist");

        let result = engine
            .apply_watermark(
                &dir.path().join("in.mp3"),
                &dir.path().join("missing.wav"),
                &dir.path().join("out.mp3"),
            )
            .await;

        assert!(matches!(result, Err(ProcessingError::MissingWatermark(_))));
    }

    #[tokio::test]
    async fn unknown_binary_is_a_spawn_error() {
        let dir = tempdir().unwrap();
        let watermark = dir.path().join("wm.wav");
        std::fs::write(&watermark, b"RIFF").unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let engine = FfmpegWatermarker::new("ffmpeg-that-does-not-exist")
            .with_progress(Arc::new(move |p: WatermarkProgress| sink.lock().unwrap().push(p)));

        let result = engine
            .apply_watermark(
                &dir.path().join("in.mp3"),
                &watermark,
                &dir.path().join("out.mp3"),
            )
            .await;

        assert!(matches!(result, Err(ProcessingError::Spawn { .. })));
        assert!(seen.lock().unwrap().is_empty());
    }
}
