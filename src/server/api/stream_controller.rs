use axum::{
    Router,
    extract::Query,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use tracing::debug;

use crate::server::{
    dtos::playback_dto::{GrantQuery, TokenQuery},
    error::{AppResult, Error},
    extractors::CurrentViewer,
};

/// one answer for every kind of token failure
fn denied() -> Error {
    Error::Forbidden("access denied".to_string())
}

fn found(url: &str) -> Response {
    (
        StatusCode::FOUND,
        [
            (header::LOCATION, url.to_string()),
            (header::CACHE_CONTROL, "no-store".to_string()),
        ],
    )
        .into_response()
}

pub struct StreamController;

impl StreamController {
    pub fn app() -> Router {
        Router::new()
            .route("/", get(Self::redeem_token))
            .route("/drive", get(Self::redeem_grant))
    }

    async fn redeem_token(
        CurrentViewer {
            viewer, services, ..
        }: CurrentViewer,
        Query(query): Query<TokenQuery>,
    ) -> AppResult<Response> {
        let token = query.token.filter(|t| !t.is_empty()).ok_or_else(denied)?;

        let link = services
            .playback
            .redeem_token(&token, viewer.as_ref())
            .await
            .ok_or_else(denied)?;

        debug!("token redeemed, redirecting to provider embed");
        Ok(found(&link.url))
    }

    async fn redeem_grant(
        CurrentViewer {
            viewer,
            ip,
            services,
        }: CurrentViewer,
        Query(query): Query<GrantQuery>,
    ) -> AppResult<Response> {
        let grant = query.grant.filter(|g| !g.is_empty()).ok_or_else(denied)?;

        let link = services
            .playback
            .redeem_grant(&grant, viewer.as_ref(), ip.as_deref())
            .await
            .ok_or_else(denied)?;

        Ok(found(&link.url))
    }
}
