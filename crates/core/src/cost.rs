//! Token cost schedule.
//!
//! The cost of a job is computed once at submission, stored on the job row,
//! and reserved against the owner's balance in the same request. Refunds
//! always release that stored amount, so re-pricing never changes what a
//! job in flight owes.

use crate::params::{
    JobParams, AVATAR_STYLE_3D, AVATAR_STYLE_REALISTIC, FASHION_RESOLUTION_2048,
    VIDEO_RESOLUTION_1080P,
};

// ---------------------------------------------------------------------------
// Schedule constants
// ---------------------------------------------------------------------------

/// Base cost of a text-to-video job.
pub const VIDEO_BASE_COST: i64 = 100;

/// Added for clips longer than 15 seconds (replaces the medium surcharge).
pub const VIDEO_LONG_SURCHARGE: i64 = 150;

/// Added for clips longer than 5 seconds.
pub const VIDEO_MEDIUM_SURCHARGE: i64 = 50;

/// Added for 1080p output.
pub const VIDEO_HD_SURCHARGE: i64 = 100;

/// Base cost of an avatar job (cartoon, anime, pixel).
pub const AVATAR_BASE_COST: i64 = 50;

/// Flat cost of a realistic avatar.
pub const AVATAR_REALISTIC_COST: i64 = 80;

/// Flat cost of a 3d avatar.
pub const AVATAR_3D_COST: i64 = 100;

/// Base cost of a fashion photo.
pub const FASHION_BASE_COST: i64 = 80;

/// Added for 2048x2048 output.
pub const FASHION_HIRES_SURCHARGE: i64 = 100;

/// Base cost of an image-to-video job.
pub const IMAGE_TO_VIDEO_BASE_COST: i64 = 50;

/// Added for image-to-video clips longer than 10 seconds.
pub const IMAGE_TO_VIDEO_LONG_SURCHARGE: i64 = 30;

// ---------------------------------------------------------------------------
// Pricing
// ---------------------------------------------------------------------------

/// Price a request in tokens.
pub fn token_cost(params: &JobParams) -> i64 {
    match params {
        JobParams::Video {
            duration_secs,
            resolution,
            ..
        } => {
            let mut cost = VIDEO_BASE_COST;
            if *duration_secs > 15 {
                cost += VIDEO_LONG_SURCHARGE;
            } else if *duration_secs > 5 {
                cost += VIDEO_MEDIUM_SURCHARGE;
            }
            if resolution == VIDEO_RESOLUTION_1080P {
                cost += VIDEO_HD_SURCHARGE;
            }
            cost
        }
        JobParams::Avatar { style, .. } => match style.as_str() {
            AVATAR_STYLE_REALISTIC => AVATAR_REALISTIC_COST,
            AVATAR_STYLE_3D => AVATAR_3D_COST,
            _ => AVATAR_BASE_COST,
        },
        JobParams::FashionPhoto { resolution, .. } => {
            let mut cost = FASHION_BASE_COST;
            if resolution == FASHION_RESOLUTION_2048 {
                cost += FASHION_HIRES_SURCHARGE;
            }
            cost
        }
        JobParams::ImageToVideo { duration_secs, .. } => {
            let mut cost = IMAGE_TO_VIDEO_BASE_COST;
            if *duration_secs > 10 {
                cost += IMAGE_TO_VIDEO_LONG_SURCHARGE;
            }
            cost
        }
    }
}
