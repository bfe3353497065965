use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::Serialize;
use utoipa::ToSchema;

use crate::db::schema::rooms;

#[derive(Debug, Clone, Queryable, Selectable, Serialize, ToSchema)]
#[diesel(table_name = rooms)]
pub struct Room {
    pub id: String,
    pub community_id: String,
    pub kind: String,
    pub name: String,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = rooms)]
pub struct NewRoom<'a> {
    pub id: &'a str,
    pub community_id: &'a str,
    pub kind: &'a str,
    pub name: &'a str,
    pub created_by: Option<&'a str>,
    pub created_at: DateTime<Utc>,
}
