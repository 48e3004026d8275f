// the streaming url resolver: tier gate, provider link rewriting, token/grant minting and the
// matching redemption side used by the /stream endpoints
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::{
    config::{SharedSettings, SiteSettings},
    database::catalog::{
        ContentRef, DynCatalogRepository, MembershipTier, Provider, UserMembership, VideoReference,
    },
    server::{
        error::{AppResult, Error},
        services::{
            audit_services::{AuditAction, AuditEntry, DynAuditSink, record_in_background},
            drive_services::DynRemoteDriveClient,
        },
        utils::{
            access_utils::{self, AccessDecision},
            link_utils::{self, ResolvedLink, StreamKind},
            signature_utils::{GrantClaims, SignatureUtil},
            token_utils::{PlaybackClaims, PlaybackTokenCipher},
            watermark_utils::WatermarkSpec,
        },
    },
};

pub type DynPlaybackService = Arc<dyn PlaybackServiceTrait + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaybackGrant {
    pub video_id: String,
    pub title: String,
    pub url: String,
    pub kind: StreamKind,
    pub watermark: Option<WatermarkSpec>,
}

/// terminal state of one playback attempt
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackOutcome {
    Granted(PlaybackGrant),
    /// anonymous viewer, send them to login
    Denied,
    UpgradeRequired(MembershipTier),
    /// broken link, provider trouble, maintenance or a removed video. never more detail than that
    Unavailable,
}

impl PlaybackOutcome {
    fn label(&self) -> &'static str {
        match self {
            Self::Granted(_) => "granted",
            Self::Denied => "denied",
            Self::UpgradeRequired(_) => "upgrade_required",
            Self::Unavailable => "unavailable",
        }
    }
}

#[async_trait]
pub trait PlaybackServiceTrait {
    async fn play_video(
        &self,
        video_id: &str,
        viewer: Option<&UserMembership>,
        ip: Option<&str>,
    ) -> AppResult<PlaybackOutcome>;

    async fn resolve_streaming_url(
        &self,
        video: &VideoReference,
        viewer: Option<&UserMembership>,
        ip: Option<&str>,
    ) -> PlaybackOutcome;

    fn mint_playback_token(
        &self,
        link: &str,
        user: &UserMembership,
        ttl_minutes: i64,
    ) -> AppResult<String>;

    fn validate_playback_token(&self, token: &str) -> Option<PlaybackClaims>;

    /// token -> embeddable provider url, `None` is always just "forbidden"
    async fn redeem_token(&self, token: &str, viewer: Option<&UserMembership>)
    -> Option<ResolvedLink>;

    async fn redeem_grant(
        &self,
        grant: &str,
        viewer: Option<&UserMembership>,
        ip: Option<&str>,
    ) -> Option<ResolvedLink>;
}

pub struct PlaybackService {
    repository: DynCatalogRepository,
    drive: DynRemoteDriveClient,
    audit: DynAuditSink,
    tokens: Arc<PlaybackTokenCipher>,
    grants: Arc<SignatureUtil>,
    settings: SharedSettings,
    public_base_url: String,
    token_ttl_minutes: i64,
}

impl PlaybackService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        repository: DynCatalogRepository,
        drive: DynRemoteDriveClient,
        audit: DynAuditSink,
        tokens: Arc<PlaybackTokenCipher>,
        grants: Arc<SignatureUtil>,
        settings: SharedSettings,
        public_base_url: &str,
        token_ttl_minutes: i64,
    ) -> Self {
        Self {
            repository,
            drive,
            audit,
            tokens,
            grants,
            settings,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
            token_ttl_minutes,
        }
    }

    fn token_url(&self, token: &str) -> String {
        format!("{}/stream/?token={}", self.public_base_url, token)
    }

    fn grant_url(&self, grant: &str) -> String {
        format!(
            "{}/stream/drive/?grant={}",
            self.public_base_url,
            urlencoding::encode(grant)
        )
    }

    /// picks the url shape for an already authorized viewer
    async fn playable_link(
        &self,
        video: &VideoReference,
        viewer: Option<&UserMembership>,
        ip: Option<&str>,
        settings: &SiteSettings,
    ) -> AppResult<ResolvedLink> {
        match (video.provider, viewer) {
            (Provider::Mega, Some(user)) if video.secure_playback => {
                if !link_utils::is_mega_file_link(&video.source_link) {
                    warn!(
                        "video {} has no playable mega file link, serving it raw",
                        video.id
                    );
                    return Ok(link_utils::universal_stream_url(
                        &video.source_link,
                        video.provider,
                    ));
                }

                let token = self.mint_playback_token(&video.source_link, user, self.token_ttl_minutes)?;
                Ok(ResolvedLink {
                    url: self.token_url(&token),
                    kind: StreamKind::Tokenized,
                })
            }
            (Provider::Gdrive, Some(user)) if settings.drive_direct_streaming => {
                let Some(file_id) = link_utils::extract_drive_file_id(&video.source_link) else {
                    warn!("video {} has no drive file id, serving it raw", video.id);
                    return Ok(link_utils::universal_stream_url(
                        &video.source_link,
                        video.provider,
                    ));
                };

                let metadata = self.drive.get_metadata(&file_id).await.map_err(|e| {
                    Error::InternalServerErrorWithContext(format!(
                        "drive metadata for {} failed: {}",
                        file_id, e
                    ))
                })?;

                let claims = GrantClaims {
                    video_id: video.id.clone(),
                    file_id: file_id.clone(),
                    user_id: user.user_id,
                    email: user.email.clone(),
                    checksum: metadata.md5_checksum.unwrap_or_default(),
                };
                let grant = self.grants.issue_grant(&claims);

                record_in_background(
                    &self.audit,
                    AuditEntry::new(
                        user.user_id.to_string(),
                        AuditAction::ProviderGrantIssued,
                        format!("drive grant for file {} (video {})", file_id, video.id),
                    )
                    .with_ip(ip),
                );

                Ok(ResolvedLink {
                    url: self.grant_url(&grant),
                    kind: StreamKind::Tokenized,
                })
            }
            _ => Ok(link_utils::universal_stream_url(
                &video.source_link,
                video.provider,
            )),
        }
    }

    /// best effort, a lost increment is acceptable
    fn count_view(&self, video_id: &str) {
        let repository = self.repository.clone();
        let video_id = video_id.to_string();
        tokio::spawn(async move {
            if let Err(e) = repository.increment_views(&video_id).await {
                warn!("failed to count view for video {}: {:#}", video_id, e);
            }
        });
    }
}

#[async_trait]
impl PlaybackServiceTrait for PlaybackService {
    async fn play_video(
        &self,
        video_id: &str,
        viewer: Option<&UserMembership>,
        ip: Option<&str>,
    ) -> AppResult<PlaybackOutcome> {
        let video = self
            .repository
            .get_video(video_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("video {} not found", video_id)))?;

        Ok(self.resolve_streaming_url(&video, viewer, ip).await)
    }

    async fn resolve_streaming_url(
        &self,
        video: &VideoReference,
        viewer: Option<&UserMembership>,
        ip: Option<&str>,
    ) -> PlaybackOutcome {
        let settings = self.settings.read().await.clone();
        let now = Utc::now();

        let outcome = if settings.maintenance_mode || !video.is_active {
            PlaybackOutcome::Unavailable
        } else {
            match access_utils::evaluate(viewer, ContentRef::Video(video), now) {
                AccessDecision::LoginRequired => PlaybackOutcome::Denied,
                AccessDecision::UpgradeRequired(tier) => PlaybackOutcome::UpgradeRequired(tier),
                AccessDecision::Granted => {
                    match self.playable_link(video, viewer, ip, &settings).await {
                        Ok(link) => {
                            let watermark = viewer
                                .filter(|_| video.watermark_enabled)
                                .map(|user| WatermarkSpec::for_viewer(user, now, ip, &settings));

                            self.count_view(&video.id);

                            let actor = viewer
                                .map(|u| u.user_id.to_string())
                                .unwrap_or_else(|| "anonymous".to_string());
                            record_in_background(
                                &self.audit,
                                AuditEntry::new(
                                    actor,
                                    AuditAction::VideoAccess,
                                    format!("accessed video: {}", video.title),
                                )
                                .with_ip(ip),
                            );

                            PlaybackOutcome::Granted(PlaybackGrant {
                                video_id: video.id.clone(),
                                title: video.title.clone(),
                                url: link.url,
                                kind: link.kind,
                                watermark,
                            })
                        }
                        Err(e) => {
                            error!("failed to resolve stream for video {}: {}", video.id, e);
                            PlaybackOutcome::Unavailable
                        }
                    }
                }
            }
        };

        debug!("playback of video {}: {}", video.id, outcome.label());
        metrics::counter!("playback_outcomes_total", "outcome" => outcome.label()).increment(1);

        outcome
    }

    fn mint_playback_token(
        &self,
        link: &str,
        user: &UserMembership,
        ttl_minutes: i64,
    ) -> AppResult<String> {
        let token = self.tokens.mint(link, user, ttl_minutes)?;
        metrics::counter!("playback_tokens_minted_total").increment(1);
        Ok(token)
    }

    fn validate_playback_token(&self, token: &str) -> Option<PlaybackClaims> {
        let claims = self.tokens.validate(token);
        if claims.is_none() {
            metrics::counter!("playback_token_rejections_total").increment(1);
        }
        claims
    }

    async fn redeem_token(
        &self,
        token: &str,
        viewer: Option<&UserMembership>,
    ) -> Option<ResolvedLink> {
        let claims = self.validate_playback_token(token)?;

        // tokens are bound to the account that asked for them
        let viewer = viewer?;
        if viewer.user_id != claims.user_id {
            warn!(
                "user {} tried to redeem a token minted for user {}",
                viewer.user_id, claims.user_id
            );
            return None;
        }

        let (id, key) = link_utils::mega_id_and_key(&claims.link)?;
        debug!(
            "token session {} redeemed by user {}",
            claims.session_id, viewer.user_id
        );

        Some(ResolvedLink {
            url: link_utils::mega_embed_url(&id, &key),
            kind: StreamKind::Embed,
        })
    }

    async fn redeem_grant(
        &self,
        grant: &str,
        viewer: Option<&UserMembership>,
        ip: Option<&str>,
    ) -> Option<ResolvedLink> {
        let claims = self.grants.verify_grant(grant)?;

        let viewer = viewer?;
        if viewer.user_id != claims.user_id {
            warn!(
                "user {} tried to redeem a drive grant issued to user {}",
                viewer.user_id, claims.user_id
            );
            return None;
        }

        // the grant never expires, so the viewer's standing is checked again on every redeem
        if self.settings.read().await.maintenance_mode {
            return None;
        }

        let video = match self.repository.get_video(&claims.video_id).await {
            Ok(Some(video)) if video.is_active => video,
            Ok(_) => {
                info!("drive grant for video {} outlived the video", claims.video_id);
                return None;
            }
            Err(e) => {
                warn!("could not load video {} for a drive grant: {:#}", claims.video_id, e);
                return None;
            }
        };

        if link_utils::extract_drive_file_id(&video.source_link).as_deref()
            != Some(claims.file_id.as_str())
        {
            info!("video {} no longer points at drive file {}", video.id, claims.file_id);
            return None;
        }

        let decision = access_utils::evaluate(Some(viewer), ContentRef::Video(&video), Utc::now());
        if decision != AccessDecision::Granted {
            info!(
                "user {} lost access to video {} since the drive grant was issued",
                viewer.user_id, video.id
            );
            return None;
        }

        let metadata = match self.drive.get_metadata(&claims.file_id).await {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!("could not re-check drive file {}: {}", claims.file_id, e);
                return None;
            }
        };

        if metadata.md5_checksum.unwrap_or_default() != claims.checksum {
            info!(
                "drive grant for file {} is stale, the file changed since issue",
                claims.file_id
            );
            return None;
        }

        record_in_background(
            &self.audit,
            AuditEntry::new(
                viewer.user_id.to_string(),
                AuditAction::ProviderGrantRedeemed,
                format!("drive grant redeemed for file {}", claims.file_id),
            )
            .with_ip(ip),
        );

        Some(ResolvedLink {
            url: link_utils::drive_preview_url(&claims.file_id),
            kind: StreamKind::Embed,
        })
    }
}
