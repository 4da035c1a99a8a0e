//! FFmpeg filter strings for the effect pipeline.

use clipflow_models::EffectKind;

/// Slow push-in over the first 3 seconds, then hold.
pub const HOOK_ZOOM: &str =
    "zoompan=z='if(lt(it,3),min(zoom+0.0015,1.5),1)':d=1:x='iw/2-(iw/zoom/2)':y='ih/2-(ih/zoom/2)'";

/// Contrast and saturation lift.
pub const ENERGY_EQ: &str = "eq=contrast=1.2:saturation=1.3";

/// Playback speed-up factor applied by the energy boost.
pub const ENERGY_SPEED: f64 = 1.0 / 0.9;

/// Warm color balance.
pub const COLOR_GRADE: &str = "colorbalance=rs=0.1:gs=-0.05:bs=-0.1";

/// EBU R128 loudness target used for short-form platforms.
pub const LOUDNORM: &str = "loudnorm=I=-14:TP=-1.5:LRA=11";

/// Scale and center-crop to fill the target frame.
pub fn fill_frame(width: u32, height: u32) -> String {
    format!(
        "scale={w}:{h}:force_original_aspect_ratio=increase,crop={w}:{h},setsar=1",
        w = width,
        h = height
    )
}

/// Bottom-centered caption overlay.
pub fn caption(text: &str, font_file: Option<&str>) -> String {
    let font = font_file
        .map(|f| format!(":fontfile='{}'", escape_drawtext(f)))
        .unwrap_or_default();
    format!(
        "drawtext=text='{}'{}:fontsize=48:fontcolor=white:borderw=2:bordercolor=black:x=(w-text_w)/2:y=h-100",
        escape_drawtext(text),
        font
    )
}

/// Escape text for use inside a quoted drawtext option.
pub fn escape_drawtext(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\u{2019}"),
            ':' => out.push_str("\\:"),
            '%' => out.push_str("\\%"),
            '\n' | '\r' => out.push(' '),
            c => out.push(c),
        }
    }
    out
}

/// Video and audio filter chains for an ordered effect list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterChains {
    pub video: Vec<String>,
    pub audio: Vec<String>,
}

impl FilterChains {
    pub fn video_graph(&self) -> String {
        self.video.join(",")
    }

    pub fn audio_graph(&self) -> Option<String> {
        if self.audio.is_empty() {
            None
        } else {
            Some(self.audio.join(","))
        }
    }
}

/// Build filter chains. `effects` must already be in canonical order.
pub fn build_effect_chains(
    effects: &[EffectKind],
    width: u32,
    height: u32,
    fps: u32,
    caption_text: &str,
    font_file: Option<&str>,
) -> FilterChains {
    let mut chains = FilterChains {
        video: vec![fill_frame(width, height)],
        audio: Vec::new(),
    };

    for effect in effects {
        match effect {
            EffectKind::HookZoom => chains
                .video
                .push(format!("{}:s={}x{}:fps={}", HOOK_ZOOM, width, height, fps)),
            EffectKind::Caption => chains.video.push(caption(caption_text, font_file)),
            EffectKind::EnergyBoost => {
                chains.video.push(ENERGY_EQ.to_string());
                chains
                    .video
                    .push(format!("setpts=PTS/{:.4}", ENERGY_SPEED));
                chains.audio.push(format!("atempo={:.4}", ENERGY_SPEED));
            }
            EffectKind::AudioNormalize => chains.audio.push(LOUDNORM.to_string()),
            EffectKind::ColorGrade => chains.video.push(COLOR_GRADE.to_string()),
        }
    }

    chains.video.push(format!("fps={}", fps));
    chains.video.push("format=yuv420p".to_string());
    chains
}
