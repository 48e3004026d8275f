pub mod api;
pub mod dtos;
pub mod error;
pub mod extractors;
pub mod services;
pub mod utils;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use axum::{
    Extension, Router, ServiceExt,
    extract::Request,
    http::{HeaderValue, Method, header},
    routing::get,
};
use metrics_exporter_prometheus::PrometheusHandle;
use once_cell::sync::Lazy;
use tokio::net::TcpListener;
use tower::Layer;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    normalize_path::{NormalizePath, NormalizePathLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::database::RedisDatabase;
use api::{
    admin_controller::AdminController,
    health_controller::{health_endpoint, metrics_endpoint},
    playback_controller::PlaybackController,
    stream_controller::StreamController,
};
use services::app_services::AppServices;

static STARTED_AT: Lazy<Instant> = Lazy::new(Instant::now);

pub fn get_app_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

pub fn get_uptime_seconds() -> u64 {
    STARTED_AT.elapsed().as_secs()
}

pub struct ApplicationServer;

impl ApplicationServer {
    pub async fn serve(
        config: Arc<AppConfig>,
        redis_db: RedisDatabase,
        metrics: Option<PrometheusHandle>,
    ) -> anyhow::Result<()> {
        Lazy::force(&STARTED_AT);

        let services = AppServices::new(redis_db, config.clone(), metrics);
        let app = Self::app(services, &config);

        let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind to {}", addr))?;

        info!("listening on {}", addr);

        axum::serve(
            listener,
            ServiceExt::<Request>::into_make_service_with_connect_info::<SocketAddr>(app),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("error while starting server")?;

        Ok(())
    }

    /// the router behind trailing slash trimming, which has to run before routing so
    /// `/stream/?token=` lands on `/stream`
    pub fn app(services: AppServices, config: &AppConfig) -> NormalizePath<Router> {
        NormalizePathLayer::trim_trailing_slash().layer(Self::router(services, config))
    }

    pub fn router(services: AppServices, config: &AppConfig) -> Router {
        Router::new()
            .route("/health", get(health_endpoint))
            .route("/metrics", get(metrics_endpoint))
            .merge(PlaybackController::app())
            .nest("/stream", StreamController::app())
            .nest("/admin", AdminController::app())
            .layer(Extension(services))
            .layer(TraceLayer::new_for_http())
            .layer(cors_layer(&config.cors_origin))
    }
}

fn cors_layer(cors_origin: &str) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    if cors_origin.trim() == "*" {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = cors_origin
        .split(',')
        .map(str::trim)
        .filter(|o| !o.is_empty())
        .filter_map(|o| match o.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("ignoring invalid cors origin: {}", o);
                None
            }
        })
        .collect();

    // session cookies only travel with an explicit origin list
    layer
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received, draining connections...");
}
