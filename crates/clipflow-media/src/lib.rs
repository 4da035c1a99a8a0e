//! Media side of the ClipFlow pipeline.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building with timeouts
//! - FFprobe metadata and segment extraction
//! - Acquisition strategies (yt-dlp variants and an HTTP extraction API)
//! - Clip analysis: scene boundaries, energy peaks, hook windows, viral score
//! - Candidate generation under duration bounds
//! - A declarative effect composer that degrades instead of failing

pub mod analysis;
pub mod clip;
pub mod command;
pub mod download;
pub mod effects;
pub mod error;
pub mod filters;
pub mod probe;

pub use analysis::{
    generate_candidates, AnalysisResult, AnalyzerConfig, CandidateConfig, ClipAnalyzer,
    EnergyDetector, EnergyPeak, FfmpegFrameSource, FrameSource, GrayFrame, HookWindow,
    IntervalEnergyDetector, MotionEnergyDetector,
};
pub use clip::extract_segment;
pub use command::{check_ffmpeg, check_ffprobe, check_ytdlp, FfmpegCommand, FfmpegRunner};
pub use download::{
    existing_asset, AcquisitionRequest, AcquisitionStrategy, CobaltApiStrategy,
    CookieSessionStrategy, GatewayStrategy, HeaderRotationStrategy, ProxyStrategy,
    YtDlpSettings,
};
pub use effects::{resolve_effects, ClipAsset, EffectComposer, EffectProfile};
pub use error::{MediaError, MediaResult};
pub use probe::{get_duration, probe_media, MediaInfo};
