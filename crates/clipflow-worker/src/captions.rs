//! Caption metadata generation with a template fallback.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use clipflow_models::{CaptionMetadata, CaptionOrigin, ClipId, Platform, ProcessedClip};

use crate::error::WorkerResult;

/// Produces post metadata for a processed clip.
#[async_trait]
pub trait CaptionGenerator: Send + Sync {
    async fn generate(&self, clip: &ProcessedClip) -> WorkerResult<CaptionMetadata>;
}

const HOOKS: &[&str] = &[
    "WAIT FOR IT...",
    "THIS CHANGED EVERYTHING",
    "YOU'RE NOT READY FOR THIS",
    "IMPOSSIBLE? WATCH THIS",
    "THE RESULTS? INSANE.",
];

const CALLS_TO_ACTION: &[&str] = &[
    "Follow for daily fitness tips!",
    "Save this workout for later!",
    "Tag someone who needs this!",
    "Comment your best time below!",
    "Share this with your gym partner!",
];

const TITLES: &[&str] = &[
    "{hook} This workout hits different",
    "{hook} Try this today",
    "{hook} Nobody talks about this move",
    "{hook} 30 seconds that change your training",
];

const INTROS: &[&str] = &[
    "Watch until the end.",
    "Most people skip this part.",
    "This is the move you need.",
];

const TIPS: &[&str] = &[
    "Keep your core tight the whole time.",
    "Control the way down.",
    "Quality reps over fast reps.",
    "Breathe out on the hard part.",
];

const POPULAR_TAGS: &[&str] = &[
    "#fitness",
    "#workout",
    "#gym",
    "#fyp",
    "#viral",
    "#motivation",
    "#training",
    "#health",
    "#fitnessmotivation",
];

const NICHE_TAGS: &[&str] = &[
    "#homeworkout",
    "#coreworkout",
    "#hiit",
    "#mobility",
    "#strengthtraining",
    "#formcheck",
    "#legday",
    "#cardio",
    "#calisthenics",
];

const TAGS_PER_GROUP: usize = 5;

/// Stable index derived from the clip id, so the same clip always gets the
/// same caption.
fn pick<'a>(seed: u64, salt: u64, options: &[&'a str]) -> &'a str {
    let idx = seed.wrapping_add(salt.wrapping_mul(0x9E37_79B9_7F4A_7C15)) % options.len() as u64;
    options[idx as usize]
}

fn seed_for(id: &ClipId) -> u64 {
    // FNV-1a
    id.as_str()
        .bytes()
        .fold(0xcbf2_9ce4_8422_2325u64, |hash, b| {
            (hash ^ b as u64).wrapping_mul(0x0100_0000_01b3)
        })
}

fn rotate<'a>(seed: u64, options: &[&'a str], count: usize) -> Vec<&'a str> {
    let start = (seed % options.len() as u64) as usize;
    options
        .iter()
        .cycle()
        .skip(start)
        .take(count.min(options.len()))
        .copied()
        .collect()
}

/// Built-in caption templates. Always available.
#[derive(Debug, Clone, Default)]
pub struct TemplateCaptioner;

impl TemplateCaptioner {
    pub fn new() -> Self {
        Self
    }

    /// The hook line a clip gets, also burned into the video.
    pub fn hook_line(&self, clip_id: &ClipId) -> String {
        pick(seed_for(clip_id), 0, HOOKS).to_string()
    }

    pub fn caption_for(&self, clip: &ProcessedClip) -> CaptionMetadata {
        let seed = seed_for(&clip.clip_id);
        let hook = clip
            .hook_text
            .clone()
            .unwrap_or_else(|| self.hook_line(&clip.clip_id));
        let title = pick(seed, 1, TITLES).replace("{hook}", &hook);
        let call_to_action = pick(seed, 2, CALLS_TO_ACTION).to_string();
        let description = format!(
            "{} {} {}",
            pick(seed, 3, INTROS),
            pick(seed, 4, TIPS),
            call_to_action
        );

        let hashtags: Vec<String> = rotate(seed, POPULAR_TAGS, TAGS_PER_GROUP)
            .into_iter()
            .chain(rotate(seed >> 8, NICHE_TAGS, TAGS_PER_GROUP))
            .map(str::to_string)
            .collect();

        CaptionMetadata {
            title,
            description,
            hashtags,
            hook_text: hook,
            call_to_action,
            origin: CaptionOrigin::Template,
        }
    }
}

#[async_trait]
impl CaptionGenerator for TemplateCaptioner {
    async fn generate(&self, clip: &ProcessedClip) -> WorkerResult<CaptionMetadata> {
        Ok(self.caption_for(clip))
    }
}

/// Trim title and hashtags to a platform's limits.
pub fn fit_for_platform(mut caption: CaptionMetadata, platform: Platform) -> CaptionMetadata {
    let (max_title, max_tags) = match platform {
        Platform::Tiktok => (100, 30),
        Platform::Youtube => (60, 15),
        Platform::Instagram => (125, 30),
        Platform::Other => (100, 30),
    };
    if caption.title.chars().count() > max_title {
        caption.title = caption.title.chars().take(max_title).collect();
    }
    caption.hashtags.truncate(max_tags);
    caption
}

/// Primary generator with a mandatory template fallback.
#[derive(Clone)]
pub struct CaptionService {
    primary: Option<Arc<dyn CaptionGenerator>>,
    template: TemplateCaptioner,
}

impl Default for CaptionService {
    fn default() -> Self {
        Self::template_only()
    }
}

impl CaptionService {
    pub fn new(primary: Arc<dyn CaptionGenerator>) -> Self {
        Self {
            primary: Some(primary),
            template: TemplateCaptioner::new(),
        }
    }

    pub fn template_only() -> Self {
        Self {
            primary: None,
            template: TemplateCaptioner::new(),
        }
    }

    pub fn template(&self) -> &TemplateCaptioner {
        &self.template
    }

    /// Never fails: a missing or failing primary falls back to templates.
    pub async fn caption(&self, clip: &ProcessedClip) -> CaptionMetadata {
        if let Some(primary) = &self.primary {
            match primary.generate(clip).await {
                Ok(caption) => return caption,
                Err(e) => warn!(
                    clip_id = %clip.clip_id,
                    error = %e,
                    "Caption generator failed, using templates"
                ),
            }
        } else {
            debug!(clip_id = %clip.clip_id, "No caption generator configured, using templates");
        }
        self.template.caption_for(clip)
    }
}
