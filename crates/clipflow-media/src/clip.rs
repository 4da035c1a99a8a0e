//! Segment extraction.

use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};

const SEGMENT_TIMEOUT: Duration = Duration::from_secs(300);

/// Extract a segment from a media file without re-encoding.
///
/// Cuts land on the nearest keyframe; the effect pipeline re-encodes
/// afterwards, so frame accuracy is not needed here.
///
/// # Arguments
/// * `input` - Source media file
/// * `output` - Path for the extracted segment
/// * `start_secs` - Start time in seconds
/// * `duration` - Duration in seconds
pub async fn extract_segment(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    start_secs: f64,
    duration: f64,
) -> MediaResult<()> {
    let input = input.as_ref();
    let output = output.as_ref();

    if !input.exists() {
        return Err(MediaError::FileNotFound(input.to_path_buf()));
    }
    if duration <= 0.0 {
        return Err(MediaError::internal(format!(
            "invalid segment duration {:.2}s",
            duration
        )));
    }

    info!(
        "Extracting segment: {} -> {} (start: {:.2}s, duration: {:.2}s)",
        input.display(),
        output.display(),
        start_secs,
        duration
    );

    let cmd = FfmpegCommand::new(input, output)
        .segment(start_secs, duration)
        .stream_copy();
    FfmpegRunner::new(SEGMENT_TIMEOUT).run(&cmd).await?;

    if !output.exists() {
        return Err(MediaError::ffmpeg_failed(
            "segment output not created",
            None,
            None,
        ));
    }

    Ok(())
}
