use axum::{
    Json, Router,
    extract::Path,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};

use crate::server::{
    dtos::playback_dto::{PlayResponse, VideoSummary},
    error::{AppResult, Error},
    extractors::CurrentViewer,
    services::playback_services::PlaybackOutcome,
};

pub struct PlaybackController;

impl PlaybackController {
    pub fn app() -> Router {
        Router::new()
            .route("/videos/{id}/play", get(Self::play))
            .route("/folders/{id}/videos", get(Self::folder_videos))
    }

    async fn play(
        CurrentViewer {
            viewer,
            ip,
            services,
        }: CurrentViewer,
        Path(video_id): Path<String>,
    ) -> AppResult<Response> {
        let outcome = services
            .playback
            .play_video(&video_id, viewer.as_ref(), ip.as_deref())
            .await?;

        match outcome {
            PlaybackOutcome::Granted(grant) => Ok(Json(PlayResponse::Granted(grant)).into_response()),
            PlaybackOutcome::Denied => Err(Error::Unauthorized),
            PlaybackOutcome::UpgradeRequired(tier) => Err(Error::UpgradeRequired(tier)),
            PlaybackOutcome::Unavailable => Ok((
                StatusCode::SERVICE_UNAVAILABLE,
                Json(PlayResponse::Unavailable {
                    message: "this video is unavailable right now, please try again later"
                        .to_string(),
                }),
            )
                .into_response()),
        }
    }

    async fn folder_videos(
        CurrentViewer {
            viewer, services, ..
        }: CurrentViewer,
        Path(folder_id): Path<String>,
    ) -> AppResult<Json<Vec<VideoSummary>>> {
        let videos = services
            .folders
            .accessible_videos(&folder_id, viewer.as_ref())
            .await?;

        Ok(Json(videos.into_iter().map(VideoSummary::from).collect()))
    }
}
