//! Generation request parameters and validation.
//!
//! Each job kind carries its own parameter set. Values are checked against
//! the constant lists below before any tokens move, so an invalid request
//! never has side effects.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Kinds
// ---------------------------------------------------------------------------

/// Media categories the pipeline can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Video,
    Avatar,
    FashionPhoto,
    ImageToVideo,
}

impl JobKind {
    /// Stable lowercase name, used for persistence, logs, and provider routing.
    pub fn as_str(self) -> &'static str {
        match self {
            JobKind::Video => "video",
            JobKind::Avatar => "avatar",
            JobKind::FashionPhoto => "fashion_photo",
            JobKind::ImageToVideo => "image_to_video",
        }
    }
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "video" => Ok(JobKind::Video),
            "avatar" => Ok(JobKind::Avatar),
            "fashion_photo" => Ok(JobKind::FashionPhoto),
            "image_to_video" => Ok(JobKind::ImageToVideo),
            other => Err(CoreError::Validation(format!("Unknown job kind '{other}'"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Avatar style rendered on the photoreal path (higher token cost).
pub const AVATAR_STYLE_REALISTIC: &str = "realistic";

/// Avatar style rendered on the 3d path (highest token cost).
pub const AVATAR_STYLE_3D: &str = "3d";

/// Video resolution that carries the HD surcharge.
pub const VIDEO_RESOLUTION_1080P: &str = "1080p";

/// Fashion resolution that carries the high-res surcharge.
pub const FASHION_RESOLUTION_2048: &str = "2048x2048";

/// Valid video styles.
pub const VALID_VIDEO_STYLES: &[&str] = &["realistic", "animation", "cinematic", "artistic"];

/// Valid video resolutions.
pub const VALID_VIDEO_RESOLUTIONS: &[&str] = &["480p", "720p", VIDEO_RESOLUTION_1080P];

/// Valid avatar styles.
pub const VALID_AVATAR_STYLES: &[&str] = &[
    AVATAR_STYLE_REALISTIC,
    "cartoon",
    "anime",
    AVATAR_STYLE_3D,
    "pixel",
];

/// Valid avatar genders.
pub const VALID_AVATAR_GENDERS: &[&str] = &["male", "female", "neutral"];

/// Valid fashion model types.
pub const VALID_FASHION_MODEL_TYPES: &[&str] = &["male", "female", "both"];

/// Valid fashion lighting setups.
pub const VALID_FASHION_LIGHTING: &[&str] = &["studio", "natural", "evening", "dramatic"];

/// Valid fashion output resolutions.
pub const VALID_FASHION_RESOLUTIONS: &[&str] =
    &["512x512", "1024x1024", FASHION_RESOLUTION_2048];

/// Valid image-to-video motion presets.
pub const VALID_MOTIONS: &[&str] = &["zoom", "pan", "rotate", "3d"];

/// Shortest video clip the provider will render (seconds).
pub const VIDEO_MIN_DURATION_SECS: u32 = 2;

/// Longest video clip the provider will render (seconds).
pub const VIDEO_MAX_DURATION_SECS: u32 = 30;

/// Shortest image-to-video clip (seconds).
pub const I2V_MIN_DURATION_SECS: u32 = 2;

/// Longest image-to-video clip (seconds).
pub const I2V_MAX_DURATION_SECS: u32 = 15;

/// Upper bound on prompt/description length (characters).
pub const MAX_PROMPT_CHARS: usize = 2000;

// ---------------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------------

/// Parameters for one generation request, tagged by kind.
///
/// Request bodies carry an adjacent `kind` tag:
/// `{"kind": "video", "prompt": "...", ...}`. Defaults mirror what the
/// provider assumes when a field is omitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobParams {
    Video {
        prompt: String,
        #[serde(default)]
        style: Option<String>,
        #[serde(default = "default_clip_duration")]
        duration_secs: u32,
        #[serde(default = "default_video_resolution")]
        resolution: String,
    },
    Avatar {
        description: String,
        #[serde(default = "default_avatar_style")]
        style: String,
        #[serde(default = "default_gender")]
        gender: String,
        #[serde(default)]
        reference_image_url: Option<String>,
    },
    FashionPhoto {
        description: String,
        #[serde(default = "default_model_type")]
        model_type: String,
        #[serde(default)]
        outfit_style: Option<String>,
        #[serde(default = "default_lighting")]
        lighting: String,
        #[serde(default)]
        background: Option<String>,
        #[serde(default = "default_fashion_resolution")]
        resolution: String,
    },
    ImageToVideo {
        source_url: String,
        #[serde(default = "default_motion")]
        motion: String,
        #[serde(default = "default_clip_duration")]
        duration_secs: u32,
    },
}

fn default_clip_duration() -> u32 {
    5
}

fn default_video_resolution() -> String {
    "720p".to_string()
}

fn default_avatar_style() -> String {
    AVATAR_STYLE_REALISTIC.to_string()
}

fn default_gender() -> String {
    "neutral".to_string()
}

fn default_model_type() -> String {
    "female".to_string()
}

fn default_lighting() -> String {
    "studio".to_string()
}

fn default_fashion_resolution() -> String {
    "1024x1024".to_string()
}

fn default_motion() -> String {
    "zoom".to_string()
}

impl JobParams {
    /// The kind this parameter set belongs to.
    pub fn kind(&self) -> JobKind {
        match self {
            JobParams::Video { .. } => JobKind::Video,
            JobParams::Avatar { .. } => JobKind::Avatar,
            JobParams::FashionPhoto { .. } => JobKind::FashionPhoto,
            JobParams::ImageToVideo { .. } => JobKind::ImageToVideo,
        }
    }

    /// Validate every field against the constant lists and bounds above.
    pub fn validate(&self) -> Result<(), CoreError> {
        match self {
            JobParams::Video {
                prompt,
                style,
                duration_secs,
                resolution,
            } => {
                require_text("prompt", prompt)?;
                if let Some(style) = style {
                    require_choice("style", style, VALID_VIDEO_STYLES)?;
                }
                require_duration(
                    *duration_secs,
                    VIDEO_MIN_DURATION_SECS,
                    VIDEO_MAX_DURATION_SECS,
                )?;
                require_choice("resolution", resolution, VALID_VIDEO_RESOLUTIONS)
            }
            JobParams::Avatar {
                description,
                style,
                gender,
                reference_image_url,
            } => {
                require_text("description", description)?;
                require_choice("style", style, VALID_AVATAR_STYLES)?;
                require_choice("gender", gender, VALID_AVATAR_GENDERS)?;
                if let Some(url) = reference_image_url {
                    require_text("reference_image_url", url)?;
                }
                Ok(())
            }
            JobParams::FashionPhoto {
                description,
                model_type,
                lighting,
                resolution,
                ..
            } => {
                require_text("description", description)?;
                require_choice("model_type", model_type, VALID_FASHION_MODEL_TYPES)?;
                require_choice("lighting", lighting, VALID_FASHION_LIGHTING)?;
                require_choice("resolution", resolution, VALID_FASHION_RESOLUTIONS)
            }
            JobParams::ImageToVideo {
                source_url,
                motion,
                duration_secs,
            } => {
                require_text("source_url", source_url)?;
                require_choice("motion", motion, VALID_MOTIONS)?;
                require_duration(*duration_secs, I2V_MIN_DURATION_SECS, I2V_MAX_DURATION_SECS)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Validation helpers
// ---------------------------------------------------------------------------

fn require_text(field: &'static str, value: &str) -> Result<(), CoreError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(CoreError::Validation(format!("{field} must not be empty")));
    }
    if trimmed.chars().count() > MAX_PROMPT_CHARS {
        return Err(CoreError::Validation(format!(
            "{field} exceeds {MAX_PROMPT_CHARS} characters"
        )));
    }
    Ok(())
}

fn require_choice(field: &'static str, value: &str, valid: &[&str]) -> Result<(), CoreError> {
    if valid.contains(&value) {
        Ok(())
    } else {
        Err(CoreError::Validation(format!(
            "Invalid {field} '{value}'. Must be one of: {}",
            valid.join(", ")
        )))
    }
}

fn require_duration(value: u32, min: u32, max: u32) -> Result<(), CoreError> {
    if value < min || value > max {
        return Err(CoreError::Validation(format!(
            "duration_secs must be between {min} and {max}, got {value}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn video_params() -> JobParams {
        JobParams::Video {
            prompt: "a fox running through snow".to_string(),
            style: Some("cinematic".to_string()),
            duration_secs: 10,
            resolution: "720p".to_string(),
        }
    }

    fn avatar_params() -> JobParams {
        JobParams::Avatar {
            description: "weathered sea captain".to_string(),
            style: "cartoon".to_string(),
            gender: "male".to_string(),
            reference_image_url: None,
        }
    }

    fn fashion_params() -> JobParams {
        JobParams::FashionPhoto {
            description: "streetwear editorial".to_string(),
            model_type: "female".to_string(),
            outfit_style: Some("streetwear".to_string()),
            lighting: "studio".to_string(),
            background: None,
            resolution: "1024x1024".to_string(),
        }
    }

    fn i2v_params() -> JobParams {
        JobParams::ImageToVideo {
            source_url: "https://cdn.example.com/still.png".to_string(),
            motion: "pan".to_string(),
            duration_secs: 8,
        }
    }

    // -- Kind mapping --

    #[test]
    fn kind_matches_variant() {
        assert_eq!(video_params().kind(), JobKind::Video);
        assert_eq!(avatar_params().kind(), JobKind::Avatar);
        assert_eq!(fashion_params().kind(), JobKind::FashionPhoto);
        assert_eq!(i2v_params().kind(), JobKind::ImageToVideo);
    }

    #[test]
    fn kind_round_trips_through_str() {
        for kind in [
            JobKind::Video,
            JobKind::Avatar,
            JobKind::FashionPhoto,
            JobKind::ImageToVideo,
        ] {
            let parsed: JobKind = kind.as_str().parse().unwrap();
            assert_eq!(parsed, kind);
        }
    }

    // -- Valid parameter sets --

    #[test]
    fn valid_params_pass() {
        assert!(video_params().validate().is_ok());
        assert!(avatar_params().validate().is_ok());
        assert!(fashion_params().validate().is_ok());
        assert!(i2v_params().validate().is_ok());
    }

    // -- Text validation --

    #[test]
    fn empty_prompt_rejected() {
        let params = JobParams::Video {
            prompt: "   ".to_string(),
            style: None,
            duration_secs: 5,
            resolution: "720p".to_string(),
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn oversized_prompt_rejected() {
        let params = JobParams::Video {
            prompt: "x".repeat(MAX_PROMPT_CHARS + 1),
            style: None,
            duration_secs: 5,
            resolution: "720p".to_string(),
        };
        assert!(params.validate().is_err());
    }

    // -- Choice validation --

    #[test]
    fn unknown_video_style_rejected() {
        let params = JobParams::Video {
            prompt: "a fox".to_string(),
            style: Some("impressionist".to_string()),
            duration_secs: 5,
            resolution: "720p".to_string(),
        };
        let err = params.validate().unwrap_err();
        assert!(err.to_string().contains("style"));
    }

    #[test]
    fn missing_style_allowed_for_video() {
        let params = JobParams::Video {
            prompt: "a fox".to_string(),
            style: None,
            duration_secs: 5,
            resolution: "720p".to_string(),
        };
        assert!(params.validate().is_ok());
    }

    #[test]
    fn unknown_avatar_gender_rejected() {
        let params = JobParams::Avatar {
            description: "captain".to_string(),
            style: "anime".to_string(),
            gender: "robot".to_string(),
            reference_image_url: None,
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn unknown_fashion_resolution_rejected() {
        let params = JobParams::FashionPhoto {
            description: "editorial".to_string(),
            model_type: "both".to_string(),
            outfit_style: None,
            lighting: "natural".to_string(),
            background: None,
            resolution: "4096x4096".to_string(),
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn unknown_motion_rejected() {
        let params = JobParams::ImageToVideo {
            source_url: "https://cdn.example.com/still.png".to_string(),
            motion: "shake".to_string(),
            duration_secs: 5,
        };
        assert!(params.validate().is_err());
    }

    // -- Duration bounds --

    #[test]
    fn video_duration_bounds() {
        let make = |secs| JobParams::Video {
            prompt: "a fox".to_string(),
            style: None,
            duration_secs: secs,
            resolution: "720p".to_string(),
        };
        assert!(make(VIDEO_MIN_DURATION_SECS).validate().is_ok());
        assert!(make(VIDEO_MAX_DURATION_SECS).validate().is_ok());
        assert!(make(VIDEO_MIN_DURATION_SECS - 1).validate().is_err());
        assert!(make(VIDEO_MAX_DURATION_SECS + 1).validate().is_err());
    }

    #[test]
    fn i2v_duration_bounds() {
        let make = |secs| JobParams::ImageToVideo {
            source_url: "https://cdn.example.com/still.png".to_string(),
            motion: "zoom".to_string(),
            duration_secs: secs,
        };
        assert!(make(I2V_MAX_DURATION_SECS).validate().is_ok());
        assert!(make(I2V_MAX_DURATION_SECS + 1).validate().is_err());
    }

    // -- Serde shape --

    #[test]
    fn params_serialize_with_kind_tag() {
        let json = serde_json::to_value(video_params()).unwrap();
        assert_eq!(json["kind"], "video");
        assert_eq!(json["prompt"], "a fox running through snow");
    }

    #[test]
    fn omitted_fields_take_defaults() {
        let params: JobParams =
            serde_json::from_str(r#"{"kind": "avatar", "description": "captain"}"#).unwrap();
        match params {
            JobParams::Avatar { style, gender, .. } => {
                assert_eq!(style, AVATAR_STYLE_REALISTIC);
                assert_eq!(gender, "neutral");
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn i2v_defaults_applied() {
        let params: JobParams = serde_json::from_str(
            r#"{"kind": "image_to_video", "source_url": "https://cdn.example.com/a.png"}"#,
        )
        .unwrap();
        match params {
            JobParams::ImageToVideo {
                motion,
                duration_secs,
                ..
            } => {
                assert_eq!(motion, "zoom");
                assert_eq!(duration_secs, 5);
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }
}
