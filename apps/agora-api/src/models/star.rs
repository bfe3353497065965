use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::Serialize;
use utoipa::ToSchema;

use crate::db::schema::stars;

/// A star targets exactly one of `thread_id` or `reply_id`; the check
/// constraint and the two partial unique indexes live in the migration.
#[derive(Debug, Clone, Queryable, Selectable, Serialize, ToSchema)]
#[diesel(table_name = stars)]
pub struct Star {
    pub id: i64,
    pub user_id: String,
    pub thread_id: Option<i64>,
    pub reply_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = stars)]
pub struct NewStar<'a> {
    pub id: i64,
    pub user_id: &'a str,
    pub thread_id: Option<i64>,
    pub reply_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}
