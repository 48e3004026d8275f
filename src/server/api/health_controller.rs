use axum::Extension;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use tracing::error;

use crate::logger::environment_name;
use crate::server::dtos::health_dto::{
    HealthResponse, HealthStatus, RedisHealth, ServiceHealthDetails,
};
use crate::server::services::app_services::AppServices;
use crate::server::{get_app_version, get_uptime_seconds};

/// redis is the only hard dependency, a missing drive token only degrades sync
pub async fn health_endpoint(
    Extension(services): Extension<AppServices>,
) -> (StatusCode, Json<HealthResponse>) {
    let redis_health = check_redis_health(&services).await;
    let drive_configured = services
        .config
        .drive_access_token
        .as_deref()
        .is_some_and(|t| !t.is_empty());

    let overall_status = if redis_health.status == HealthStatus::Unhealthy {
        HealthStatus::Unhealthy
    } else if !drive_configured {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    };

    let response = HealthResponse {
        status: overall_status,
        timestamp: Utc::now(),
        uptime_seconds: get_uptime_seconds(),
        version: get_app_version().to_string(),
        environment: environment_name(services.config.cargo_env).to_string(),
        services: ServiceHealthDetails {
            redis: redis_health,
            drive_configured,
        },
    };

    let http_status = match overall_status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (http_status, Json(response))
}

async fn check_redis_health(services: &AppServices) -> RedisHealth {
    let Some(redis) = services.redis.as_ref() else {
        return RedisHealth {
            status: HealthStatus::Unhealthy,
            response_time_ms: 0.0,
        };
    };

    match redis.health_check().await {
        Ok(response_time) => RedisHealth {
            status: HealthStatus::Healthy,
            response_time_ms: response_time,
        },
        Err(e) => {
            error!("redis health check failed: {:#}", e);
            RedisHealth {
                status: HealthStatus::Unhealthy,
                response_time_ms: 0.0,
            }
        }
    }
}

pub async fn metrics_endpoint(Extension(services): Extension<AppServices>) -> Response {
    match services.metrics.as_ref() {
        Some(handle) => handle.render().into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
