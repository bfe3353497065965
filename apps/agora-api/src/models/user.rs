use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::Serialize;

use crate::db::schema::users;

#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = users)]
pub struct User {
    pub id: String,
    pub display_name: String,
    pub email: String,
    pub kind: String,
    pub created_at: DateTime<Utc>,
}

/// Account rows are provisioned out-of-band; this insert shape exists for
/// operator tooling and test seeding.
#[derive(Debug, Insertable)]
#[diesel(table_name = users)]
pub struct NewUser<'a> {
    pub id: &'a str,
    pub display_name: &'a str,
    pub email: &'a str,
    pub kind: &'a str,
    pub created_at: DateTime<Utc>,
}
