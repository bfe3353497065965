use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::Serialize;
use utoipa::ToSchema;

use crate::db::schema::memberships;
use crate::models::community::Community;

#[derive(Debug, Clone, Queryable, Selectable, Serialize, ToSchema)]
#[diesel(table_name = memberships)]
pub struct Membership {
    pub community_id: String,
    pub user_id: String,
    pub level: String,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = memberships)]
pub struct NewMembership<'a> {
    pub community_id: &'a str,
    pub user_id: &'a str,
    pub level: &'a str,
    pub joined_at: DateTime<Utc>,
}

/// A community the caller belongs to, with their membership attached.
#[derive(Debug, Serialize, ToSchema)]
pub struct JoinedCommunity {
    #[serde(flatten)]
    pub community: Community,
    pub level: String,
    pub joined_at: DateTime<Utc>,
}
