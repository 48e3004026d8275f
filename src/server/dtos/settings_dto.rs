use serde::Deserialize;
use validator::Validate;

use crate::config::SiteSettings;

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateSettingsRequest {
    #[validate(length(min = 1, max = 100))]
    pub site_name: String,
    pub maintenance_mode: bool,
    #[validate(range(min = 0.0, max = 1.0))]
    pub watermark_opacity: f32,
    pub randomize_watermark: bool,
    pub drive_direct_streaming: bool,
}

impl From<UpdateSettingsRequest> for SiteSettings {
    fn from(request: UpdateSettingsRequest) -> Self {
        Self {
            site_name: request.site_name,
            maintenance_mode: request.maintenance_mode,
            watermark_opacity: request.watermark_opacity,
            randomize_watermark: request.randomize_watermark,
            drive_direct_streaming: request.drive_direct_streaming,
        }
    }
}
