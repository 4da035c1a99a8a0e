//! Shared yt-dlp invocation.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::command::check_ytdlp;
use crate::error::{MediaError, MediaResult};

/// Knobs shared by every yt-dlp based strategy.
#[derive(Debug, Clone)]
pub struct YtDlpSettings {
    /// Socket-level timeout passed to yt-dlp
    pub socket_timeout_secs: u64,
    /// Hard limit on the whole process
    pub process_timeout: Duration,
    /// Format selector
    pub format: String,
}

impl Default for YtDlpSettings {
    fn default() -> Self {
        Self {
            socket_timeout_secs: 30,
            process_timeout: Duration::from_secs(900),
            format: "bestvideo[ext=mp4][height<=1080]+bestaudio[ext=m4a]/best[ext=mp4]/best"
                .to_string(),
        }
    }
}

impl YtDlpSettings {
    /// Create settings from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            socket_timeout_secs: std::env::var("YTDLP_SOCKET_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.socket_timeout_secs),
            process_timeout: Duration::from_secs(
                std::env::var("YTDLP_PROCESS_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(900),
            ),
            format: std::env::var("YTDLP_FORMAT").unwrap_or(defaults.format),
        }
    }
}

/// Builder for a single yt-dlp download.
#[derive(Debug, Clone)]
pub struct YtDlpCommand {
    url: String,
    output: PathBuf,
    args: Vec<String>,
    timeout: Duration,
}

impl YtDlpCommand {
    pub fn new(url: impl Into<String>, output: impl AsRef<Path>, settings: &YtDlpSettings) -> Self {
        let args = vec![
            "--no-playlist".to_string(),
            "--no-progress".to_string(),
            "--socket-timeout".to_string(),
            settings.socket_timeout_secs.to_string(),
            "--retries".to_string(),
            "1".to_string(),
            "-f".to_string(),
            settings.format.clone(),
            "--merge-output-format".to_string(),
            "mp4".to_string(),
        ];
        Self {
            url: url.into(),
            output: output.as_ref().to_path_buf(),
            args,
            timeout: settings.process_timeout,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn user_agent(self, ua: impl Into<String>) -> Self {
        self.arg("--user-agent").arg(ua)
    }

    pub fn header(self, name: &str, value: &str) -> Self {
        self.arg("--add-header").arg(format!("{}:{}", name, value))
    }

    pub fn cookies(self, path: impl AsRef<Path>) -> Self {
        self.arg("--cookies")
            .arg(path.as_ref().to_string_lossy().to_string())
    }

    pub fn proxy(self, proxy: impl Into<String>) -> Self {
        self.arg("--proxy").arg(proxy)
    }

    pub fn build_args(&self) -> Vec<String> {
        let mut args = self.args.clone();
        args.push("-o".to_string());
        args.push(self.output.to_string_lossy().to_string());
        args.push(self.url.clone());
        args
    }

    /// Run the download and return the output size in bytes.
    pub async fn run(&self, strategy: &str) -> MediaResult<u64> {
        check_ytdlp()?;

        let args = self.build_args();
        debug!(strategy, "Running yt-dlp {}", args.join(" "));

        let child = Command::new("yt-dlp")
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result?,
            Err(_) => {
                warn!(strategy, url = %self.url, "yt-dlp timed out, killing process");
                return Err(MediaError::Timeout(self.timeout.as_secs()));
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            debug!(strategy, "yt-dlp stderr: {}", stderr);
            return Err(MediaError::download_failed(strategy, describe_failure(&stderr)));
        }

        verify_output(&self.output, strategy).await.map(|size| {
            info!(
                strategy,
                output = %self.output.display(),
                size_mb = size as f64 / (1024.0 * 1024.0),
                "Downloaded video successfully"
            );
            size
        })
    }
}

/// Condense yt-dlp stderr into a classifiable message.
pub(crate) fn describe_failure(stderr: &str) -> String {
    let last = stderr
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .unwrap_or("unknown error")
        .trim();

    let rate_limited = stderr.contains("429")
        || stderr.contains("Too Many Requests")
        || stderr.to_lowercase().contains("rate limit")
        || stderr.contains("Sign in to confirm");

    if rate_limited {
        format!("yt-dlp failed (rate limit): {}", last)
    } else {
        format!("yt-dlp failed: {}", last)
    }
}

/// Confirm the output file exists and is non-empty.
pub(crate) async fn verify_output(path: &Path, strategy: &str) -> MediaResult<u64> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.len() > 0 => Ok(meta.len()),
        Ok(_) => Err(MediaError::download_failed(strategy, "output file is empty")),
        Err(_) => Err(MediaError::download_failed(strategy, "output file not created")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_args_layout() {
        let cmd = YtDlpCommand::new(
            "https://youtu.be/abc",
            "/tmp/abc.mp4",
            &YtDlpSettings::default(),
        )
        .user_agent("UA/1.0")
        .header("Accept-Language", "en-US");
        let args = cmd.build_args();

        let sock = args.iter().position(|a| a == "--socket-timeout").unwrap();
        assert_eq!(args[sock + 1], "30");
        assert!(args.contains(&"Accept-Language:en-US".to_string()));
        assert_eq!(args[args.len() - 2], "/tmp/abc.mp4");
        assert_eq!(args.last().unwrap(), "https://youtu.be/abc");
    }

    #[test]
    fn test_describe_failure_flags_rate_limit() {
        let msg = describe_failure("WARNING: foo\nERROR: HTTP Error 429: Too Many Requests\n");
        assert!(msg.contains("rate limit"));
        assert!(msg.ends_with("HTTP Error 429: Too Many Requests"));

        let msg = describe_failure("ERROR: Video unavailable");
        assert_eq!(msg, "yt-dlp failed: ERROR: Video unavailable");
    }
}
