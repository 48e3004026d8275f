use std::sync::Arc;

use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::database::RedisDatabase;

const AUDIT_LOG_KEY: &str = "audit_log";
/// oldest entries fall off the end of the list
const AUDIT_LOG_CAP: isize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    VideoAccess,
    FolderSync,
    FolderUpdate,
    FolderDelete,
    ProviderGrantIssued,
    ProviderGrantRedeemed,
    SettingsUpdate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// user id, or "anonymous"
    pub actor: String,
    pub action: AuditAction,
    pub description: String,
    pub ip: Option<String>,
    pub status: String,
    pub at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(actor: impl Into<String>, action: AuditAction, description: impl Into<String>) -> Self {
        Self {
            actor: actor.into(),
            action,
            description: description.into(),
            ip: None,
            status: "success".to_string(),
            at: Utc::now(),
        }
    }

    pub fn with_ip(mut self, ip: Option<&str>) -> Self {
        self.ip = ip.map(str::to_string);
        self
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = status.into();
        self
    }
}

pub type DynAuditSink = Arc<dyn AuditSink + Send + Sync>;

#[mockall::automock]
#[async_trait::async_trait]
pub trait AuditSink {
    async fn record(&self, entry: AuditEntry);

    /// newest first
    async fn recent(&self, limit: usize) -> Vec<AuditEntry>;
}

/// writes without making the caller wait
pub fn record_in_background(sink: &DynAuditSink, entry: AuditEntry) {
    let sink = sink.clone();
    tokio::spawn(async move {
        sink.record(entry).await;
    });
}

pub struct RedisAuditSink {
    redis: Arc<RedisDatabase>,
}

impl RedisAuditSink {
    pub fn new(redis: Arc<RedisDatabase>) -> Self {
        Self { redis }
    }
}

#[async_trait::async_trait]
impl AuditSink for RedisAuditSink {
    async fn record(&self, entry: AuditEntry) {
        info!(
            target: "audit",
            "{:?} by {} ({}): {}",
            entry.action, entry.actor, entry.status, entry.description
        );

        let json = match serde_json::to_string(&entry) {
            Ok(json) => json,
            Err(e) => {
                error!("failed to serialize audit entry: {}", e);
                return;
            }
        };

        let mut conn = self.redis.connection.clone();
        let result: Result<(), redis::RedisError> = redis::pipe()
            .atomic()
            .lpush(AUDIT_LOG_KEY, json)
            .ltrim(AUDIT_LOG_KEY, 0, AUDIT_LOG_CAP - 1)
            .query_async(&mut conn)
            .await;

        if let Err(e) = result {
            error!("failed to persist audit entry: {}", e);
        }
    }

    async fn recent(&self, limit: usize) -> Vec<AuditEntry> {
        if limit == 0 {
            return Vec::new();
        }

        let mut conn = self.redis.connection.clone();
        let stop = limit.min(AUDIT_LOG_CAP as usize) as isize - 1;
        let raw: Vec<String> = match conn.lrange(AUDIT_LOG_KEY, 0, stop).await {
            Ok(raw) => raw,
            Err(e) => {
                error!("failed to read audit log: {}", e);
                return Vec::new();
            }
        };

        raw.iter()
            .filter_map(|json| serde_json::from_str(json).ok())
            .collect()
    }
}

/// tracing only, for tests and redis-less tooling
pub struct LogAuditSink;

#[async_trait::async_trait]
impl AuditSink for LogAuditSink {
    async fn record(&self, entry: AuditEntry) {
        info!(
            target: "audit",
            "{:?} by {} ({}): {}",
            entry.action, entry.actor, entry.status, entry.description
        );
    }

    async fn recent(&self, _limit: usize) -> Vec<AuditEntry> {
        Vec::new()
    }
}
