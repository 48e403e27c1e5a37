/// Audit trail for security-relevant events
///
/// Entries are emitted as structured `tracing` events on the `audit` target,
/// so they land in the same JSON log stream as everything else and can be
/// filtered with `RUST_LOG=audit=info`. No token or password material is
/// ever attached to an entry.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    Register,
    Login,
    TokenRotate,
    TokenReuseRejected,
    Logout,
    EmailConfirm,
    ProfileUpdate,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Register => "REGISTER",
            AuditAction::Login => "LOGIN",
            AuditAction::TokenRotate => "TOKEN_ROTATE",
            AuditAction::TokenReuseRejected => "TOKEN_REUSE_REJECTED",
            AuditAction::Logout => "LOGOUT",
            AuditAction::EmailConfirm => "EMAIL_CONFIRM",
            AuditAction::ProfileUpdate => "PROFILE_UPDATE",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditStatus {
    Success,
    Failure,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditLog {
    pub log_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub action: AuditAction,
    pub status: AuditStatus,
    pub user_id: Option<Uuid>,
    pub client_ip: Option<String>,
    pub message: String,
    pub previous_state: Option<String>,
    pub new_state: Option<String>,
}

impl AuditLog {
    pub fn new(action: AuditAction, status: AuditStatus, message: impl Into<String>) -> Self {
        Self {
            log_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            action,
            status,
            user_id: None,
            client_ip: None,
            message: message.into(),
            previous_state: None,
            new_state: None,
        }
    }

    pub fn success(action: AuditAction, message: impl Into<String>) -> Self {
        Self::new(action, AuditStatus::Success, message)
    }

    pub fn failure(action: AuditAction, message: impl Into<String>) -> Self {
        Self::new(action, AuditStatus::Failure, message)
    }

    pub fn with_user_id(mut self, user_id: Uuid) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn with_client_ip(mut self, ip: Option<&str>) -> Self {
        self.client_ip = ip.map(str::to_string);
        self
    }

    pub fn with_state_change(mut self, previous: impl Into<String>, new: impl Into<String>) -> Self {
        self.previous_state = Some(previous.into());
        self.new_state = Some(new.into());
        self
    }

    pub fn record(&self) {
        match self.status {
            AuditStatus::Failure => tracing::warn!(
                target: "audit",
                log_id = %self.log_id,
                action = %self.action,
                user_id = ?self.user_id,
                client_ip = ?self.client_ip,
                previous_state = ?self.previous_state,
                new_state = ?self.new_state,
                message = %self.message,
                "Audit log entry"
            ),
            AuditStatus::Success => tracing::info!(
                target: "audit",
                log_id = %self.log_id,
                action = %self.action,
                user_id = ?self.user_id,
                client_ip = ?self.client_ip,
                previous_state = ?self.previous_state,
                new_state = ?self.new_state,
                message = %self.message,
                "Audit log entry"
            ),
        }
    }
}
