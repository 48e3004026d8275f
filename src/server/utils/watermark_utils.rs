use chrono::{DateTime, Utc};
use rand::seq::IndexedRandom;
use serde::Serialize;

use crate::config::SiteSettings;
use crate::database::catalog::UserMembership;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum WatermarkPosition {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

impl WatermarkPosition {
    pub const CORNERS: [WatermarkPosition; 4] = [
        Self::TopLeft,
        Self::TopRight,
        Self::BottomLeft,
        Self::BottomRight,
    ];
}

/// overlay drawn by the player, derived per playback and never stored
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WatermarkSpec {
    pub text: String,
    pub position: WatermarkPosition,
    pub opacity: f32,
}

impl WatermarkSpec {
    pub fn for_viewer(
        viewer: &UserMembership,
        now: DateTime<Utc>,
        ip: Option<&str>,
        settings: &SiteSettings,
    ) -> Self {
        let mut text = format!("{} | {}", viewer.identifier(), now.format("%Y-%m-%d %H:%M"));
        if let Some(ip) = ip.filter(|ip| !ip.is_empty()) {
            text.push_str(" | ");
            text.push_str(ip);
        }

        let position = if settings.randomize_watermark {
            *WatermarkPosition::CORNERS
                .choose(&mut rand::rng())
                .unwrap_or(&WatermarkPosition::BottomRight)
        } else {
            WatermarkPosition::BottomRight
        };

        Self {
            text,
            position,
            opacity: settings.watermark_opacity.clamp(0.0, 1.0),
        }
    }
}
