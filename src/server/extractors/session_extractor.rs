use std::net::SocketAddr;

use axum::Extension;
use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum_extra::extract::CookieJar;
use tracing::{debug, error};

use crate::database::catalog::UserMembership;
use crate::server::error::Error;
use crate::server::services::app_services::AppServices;
use crate::server::utils::session_utils::SESSION_COOKIE;

/// whoever is asking, logged in or not
pub struct CurrentViewer {
    pub viewer: Option<UserMembership>,
    pub ip: Option<String>,
    pub services: AppServices,
}

/// staff only
pub struct AdminViewer {
    pub admin: UserMembership,
    pub ip: Option<String>,
    pub services: AppServices,
}

pub fn client_ip(parts: &Parts) -> Option<String> {
    parts
        .headers
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .or_else(|| {
            parts
                .headers
                .get("x-real-ip")
                .and_then(|h| h.to_str().ok())
                .map(|s| s.trim().to_string())
        })
        .or_else(|| {
            parts
                .extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ci| ci.0.ip().to_string())
        })
}

fn session_token(parts: &Parts) -> Option<String> {
    let bearer = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(|t| t.trim().to_string());

    bearer.or_else(|| {
        CookieJar::from_headers(&parts.headers)
            .get(SESSION_COOKIE)
            .map(|c| c.value().to_string())
    })
}

impl<S> FromRequestParts<S> for CurrentViewer
where
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Extension(services): Extension<AppServices> =
            Extension::from_request_parts(parts, state)
                .await
                .map_err(|err| Error::InternalServerErrorWithContext(err.to_string()))?;

        let ip = client_ip(parts);

        // a bad or stale session is just an anonymous viewer
        let Some(claims) = session_token(parts).and_then(|t| services.sessions.verify(&t)) else {
            return Ok(Self {
                viewer: None,
                ip,
                services,
            });
        };

        let viewer = services
            .repository
            .get_membership(claims.sub)
            .await
            .map_err(|e| {
                error!("failed to load membership for user {}: {:#}", claims.sub, e);
                Error::InternalServerErrorWithContext("membership lookup failed".to_string())
            })?;

        if viewer.is_none() {
            debug!("session for unknown user {}", claims.sub);
        }

        Ok(Self {
            viewer,
            ip,
            services,
        })
    }
}

impl<S> FromRequestParts<S> for AdminViewer
where
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let CurrentViewer {
            viewer,
            ip,
            services,
        } = CurrentViewer::from_request_parts(parts, state).await?;

        match viewer {
            Some(admin) if admin.is_staff => Ok(Self {
                admin,
                ip,
                services,
            }),
            Some(_) => Err(Error::Forbidden("staff access required".to_string())),
            None => Err(Error::Unauthorized),
        }
    }
}
