//! FFmpeg invocation.

use metrics::counter;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{MediaError, MediaResult};

/// Target that makes FFmpeg write to stdout.
pub const STDOUT: &str = "pipe:1";

/// One FFmpeg call: options placed before `-i` apply to the input, the
/// rest to the output.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    input: PathBuf,
    output: PathBuf,
    input_opts: Vec<String>,
    output_opts: Vec<String>,
}

impl FfmpegCommand {
    pub fn new(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Self {
            input: input.as_ref().to_path_buf(),
            output: output.as_ref().to_path_buf(),
            input_opts: Vec::new(),
            output_opts: Vec::new(),
        }
    }

    pub fn input_opt(mut self, flag: &str, value: impl ToString) -> Self {
        self.input_opts.push(flag.to_string());
        self.input_opts.push(value.to_string());
        self
    }

    pub fn opt(mut self, flag: &str, value: impl ToString) -> Self {
        self.output_opts.push(flag.to_string());
        self.output_opts.push(value.to_string());
        self
    }

    /// A valueless output flag such as `-an`.
    pub fn flag(mut self, flag: &str) -> Self {
        self.output_opts.push(flag.to_string());
        self
    }

    /// Read only `[start, start + duration)` of the input.
    pub fn segment(self, start_secs: f64, duration_secs: f64) -> Self {
        self.input_opt("-ss", format!("{:.3}", start_secs.max(0.0)))
            .input_opt("-t", format!("{:.3}", duration_secs))
    }

    /// Keep every stream's encoding as-is.
    pub fn stream_copy(self) -> Self {
        self.opt("-c", "copy")
    }

    pub fn filters(self, video: impl ToString, audio: Option<String>) -> Self {
        let cmd = self.opt("-vf", video);
        match audio {
            Some(graph) => cmd.opt("-af", graph),
            None => cmd,
        }
    }

    pub fn args(&self) -> Vec<String> {
        let mut args = vec!["-y".to_string(), "-v".to_string(), "error".to_string()];
        args.extend(self.input_opts.iter().cloned());
        args.push("-i".to_string());
        args.push(self.input.to_string_lossy().into_owned());
        args.extend(self.output_opts.iter().cloned());
        args.push(self.output.to_string_lossy().into_owned());
        args
    }
}

/// Runs FFmpeg under a hard deadline; the child is killed when it expires.
#[derive(Debug, Clone, Copy)]
pub struct FfmpegRunner {
    timeout: Duration,
}

impl FfmpegRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Run `cmd` and return whatever it wrote to stdout.
    pub async fn run(&self, cmd: &FfmpegCommand) -> MediaResult<Vec<u8>> {
        check_ffmpeg()?;

        let args = cmd.args();
        debug!(args = %args.join(" "), "ffmpeg");

        let child = Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let Ok(waited) = tokio::time::timeout(self.timeout, child.wait_with_output()).await else {
            warn!(timeout = ?self.timeout, "FFmpeg deadline passed, process killed");
            counter!("clipflow_ffmpeg_runs_total", "outcome" => "timeout").increment(1);
            return Err(MediaError::Timeout(self.timeout.as_secs()));
        };
        let output = waited?;

        if output.status.success() {
            counter!("clipflow_ffmpeg_runs_total", "outcome" => "success").increment(1);
            return Ok(output.stdout);
        }

        counter!("clipflow_ffmpeg_runs_total", "outcome" => "failure").increment(1);
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        let message = last_line(&stderr)
            .unwrap_or("ffmpeg exited with an error")
            .to_string();
        Err(MediaError::ffmpeg_failed(
            message,
            Some(stderr),
            output.status.code(),
        ))
    }
}

fn last_line(text: &str) -> Option<&str> {
    text.lines().map(str::trim).rfind(|l| !l.is_empty())
}

fn locate(binary: &str, missing: MediaError) -> MediaResult<PathBuf> {
    which::which(binary).map_err(|_| missing)
}

pub fn check_ffmpeg() -> MediaResult<PathBuf> {
    locate("ffmpeg", MediaError::FfmpegNotFound)
}

pub fn check_ffprobe() -> MediaResult<PathBuf> {
    locate("ffprobe", MediaError::FfprobeNotFound)
}

pub fn check_ytdlp() -> MediaResult<PathBuf> {
    locate("yt-dlp", MediaError::YtDlpNotFound)
}
