use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::Serialize;
use utoipa::ToSchema;

use crate::db::schema::alerts;

/// Alert category. Stored in `alerts.kind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertKind {
    Info,
    Warning,
    Job,
    Reply,
}

impl AlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::Info => "info",
            AlertKind::Warning => "warning",
            AlertKind::Job => "job",
            AlertKind::Reply => "reply",
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize, ToSchema)]
#[diesel(table_name = alerts)]
pub struct Alert {
    pub id: i64,
    pub recipient_id: String,
    pub kind: String,
    pub object_id: Option<i64>,
    pub message: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = alerts)]
pub struct NewAlert<'a> {
    pub id: i64,
    pub recipient_id: &'a str,
    pub kind: &'a str,
    pub object_id: Option<i64>,
    pub message: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}
