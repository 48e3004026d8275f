use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(clap::ValueEnum, Clone, Debug, Copy)]
pub enum CargoEnv {
    Development,
    Production,
}

#[derive(clap::Parser)]
pub struct AppConfig {
    // production or development
    #[clap(long, env, value_enum)]
    pub cargo_env: CargoEnv,

    // port that the app will bind to
    #[clap(long, env, default_value = "5000")]
    pub port: u16,

    // catalog, memberships and audit trail are all stored here
    #[clap(long, env)]
    pub redis_url: String,

    // source of the symmetric playback token key, have it be anything secure
    // like 'openssl rand -base64 32'
    #[clap(long, env)]
    pub playback_token_secret: String,

    // signs the session jwt that identifies viewers
    #[clap(long, env)]
    pub session_secret: String,

    // signs the non expiring drive grants, keep it different from the token secret
    #[clap(long, env)]
    pub provider_grant_secret: String,

    // oauth bearer for the drive v3 api, sync is refused without it
    #[clap(long, env)]
    pub drive_access_token: Option<String>,

    #[clap(long, env, default_value = "https://www.googleapis.com/drive/v3")]
    pub drive_api_base: String,

    // used to build the /stream/?token= links handed to the player
    #[clap(long, env, default_value = "http://localhost:5000")]
    pub public_base_url: String,

    #[clap(long, env, default_value = "60")]
    pub token_ttl_minutes: i64,

    #[clap(long, env, default_value = "100")]
    pub sync_page_size: u32,

    #[clap(long, env, default_value = "20")]
    pub sync_page_timeout_secs: u64,

    // this should be either * for allowing everything, or a comma seperated list of domains like
    // example.com,something.com
    #[clap(long, env)]
    pub cors_origin: String,

    #[clap(long, env, default_value = "Tierstream")]
    pub site_name: String,

    #[clap(long, env, default_value = "logs")]
    pub log_dir: String,

    // optional sentry integration
    #[clap(long, env)]
    pub sentry_dsn: Option<String>,
}

impl AppConfig {
    /// drive caps pages at 1000
    pub fn page_size(&self) -> u32 {
        self.sync_page_size.clamp(1, 1000)
    }
}

// secrets stay out of logs
impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("cargo_env", &self.cargo_env)
            .field("port", &self.port)
            .field("public_base_url", &self.public_base_url)
            .field("token_ttl_minutes", &self.token_ttl_minutes)
            .field("sync_page_size", &self.sync_page_size)
            .field("sync_page_timeout_secs", &self.sync_page_timeout_secs)
            .field("drive_api_base", &self.drive_api_base)
            .field("drive_access_token", &self.drive_access_token.as_ref().map(|_| "***"))
            .field("site_name", &self.site_name)
            .finish_non_exhaustive()
    }
}

impl Default for AppConfig {
    // only used by tests and local tinkering
    fn default() -> Self {
        Self {
            cargo_env: CargoEnv::Development,
            port: 5000,
            redis_url: "redis://localhost:6379".to_string(),
            playback_token_secret: "default-playback-secret".to_string(),
            session_secret: "default-session-secret".to_string(),
            provider_grant_secret: "default-grant-secret".to_string(),
            drive_access_token: None,
            drive_api_base: "https://www.googleapis.com/drive/v3".to_string(),
            public_base_url: "http://localhost:5000".to_string(),
            token_ttl_minutes: 60,
            sync_page_size: 100,
            sync_page_timeout_secs: 20,
            cors_origin: "*".to_string(),
            site_name: "Tierstream".to_string(),
            log_dir: "logs".to_string(),
            sentry_dsn: None,
        }
    }
}

/// runtime switches, loaded at startup and swapped as a whole through the admin settings endpoint
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SiteSettings {
    pub site_name: String,
    pub maintenance_mode: bool,
    pub watermark_opacity: f32,
    pub randomize_watermark: bool,
    /// hand out checksum bound drive grants instead of preview embeds
    pub drive_direct_streaming: bool,
}

impl SiteSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            site_name: config.site_name.clone(),
            ..Self::default()
        }
    }
}

impl Default for SiteSettings {
    fn default() -> Self {
        Self {
            site_name: "Tierstream".to_string(),
            maintenance_mode: false,
            watermark_opacity: 0.7,
            randomize_watermark: true,
            drive_direct_streaming: false,
        }
    }
}

pub type SharedSettings = std::sync::Arc<tokio::sync::RwLock<SiteSettings>>;
