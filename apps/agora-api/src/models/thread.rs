use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::Serialize;
use utoipa::ToSchema;

use crate::db::schema::threads;
use crate::models::reply::ReplyNode;

#[derive(Debug, Clone, Queryable, Selectable, Serialize, ToSchema)]
#[diesel(table_name = threads)]
pub struct Thread {
    pub id: i64,
    pub room_id: String,
    pub title: String,
    pub body: String,
    pub created_by: Option<String>,
    pub file_attachment: Option<String>,
    pub is_job_post: bool,
    pub job_type: Option<String>,
    pub location: Option<String>,
    pub salary: Option<String>,
    pub external_link: Option<String>,
    pub classification: String,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = threads)]
pub struct NewThread<'a> {
    pub id: i64,
    pub room_id: &'a str,
    pub title: &'a str,
    pub body: &'a str,
    pub created_by: Option<&'a str>,
    pub file_attachment: Option<&'a str>,
    pub is_job_post: bool,
    pub job_type: Option<&'a str>,
    pub location: Option<&'a str>,
    pub salary: Option<&'a str>,
    pub external_link: Option<&'a str>,
    pub classification: &'a str,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Absent fields are left untouched; clearing a nullable column is not
/// supported through PATCH.
#[derive(Debug, AsChangeset)]
#[diesel(table_name = threads)]
pub struct UpdateThread {
    pub title: Option<String>,
    pub body: Option<String>,
    pub job_type: Option<String>,
    pub location: Option<String>,
    pub salary: Option<String>,
    pub external_link: Option<String>,
    pub classification: Option<String>,
    pub tags: Option<Vec<String>>,
    pub updated_at: DateTime<Utc>,
}

/// List-item shape: the row plus aggregates relative to the caller.
#[derive(Debug, Serialize, ToSchema)]
pub struct ThreadSummary {
    #[serde(flatten)]
    pub thread: Thread,
    pub creator_name: Option<String>,
    pub replies: i64,
    pub likes: i64,
    pub liked_by_me: bool,
}

/// Detail shape: summary fields plus the recursive reply tree.
#[derive(Debug, Serialize, ToSchema)]
pub struct ThreadDetail {
    #[serde(flatten)]
    pub thread: Thread,
    pub creator_name: Option<String>,
    pub replies: i64,
    pub likes: i64,
    pub liked_by_me: bool,
    pub reply_tree: Vec<ReplyNode>,
}
