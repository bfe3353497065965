//! Membership endpoints: joining, leaving, and listing the caller's communities.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::result::OptionalExtension;
use serde::Deserialize;
use utoipa::ToSchema;

use crate::access::MembershipLevel;
use crate::auth::middleware::AuthUser;
use crate::db::schema::{communities, memberships};
use crate::error::{ApiError, ApiErrorBody};
use crate::models::community::Community;
use crate::models::membership::{JoinedCommunity, Membership, NewMembership};
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/communities/{community_id}/members", post(join_community))
        .route(
            "/communities/{community_id}/members/me",
            delete(leave_community),
        )
        .route("/users/me/communities", get(list_my_communities))
}

// ---------------------------------------------------------------------------
// POST /api/v1/communities/{community_id}/members
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct JoinCommunityRequest {
    /// Membership level to join at. Defaults to `beginner`.
    pub level: Option<MembershipLevel>,
}

#[utoipa::path(
    post,
    path = "/api/v1/communities/{community_id}/members",
    tag = "Members",
    security(("bearer" = [])),
    params(
        ("community_id" = String, Path, description = "Community ID"),
    ),
    request_body = JoinCommunityRequest,
    responses(
        (status = 201, description = "Joined the community", body = Membership),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
        (status = 404, description = "Community not found", body = ApiErrorBody),
        (status = 409, description = "Already a member", body = ApiErrorBody),
    ),
)]
pub async fn join_community(
    AuthUser { user_id }: AuthUser,
    State(state): State<AppState>,
    Path(community_id): Path<String>,
    Json(body): Json<JoinCommunityRequest>,
) -> Result<(StatusCode, Json<Membership>), ApiError> {
    let level = body.level.unwrap_or(MembershipLevel::Beginner);

    let mut conn = state.db.get().await?;

    let community_exists: Option<String> = diesel_async::RunQueryDsl::get_result(
        communities::table
            .find(&community_id)
            .select(communities::id),
        &mut conn,
    )
    .await
    .optional()?;
    if community_exists.is_none() {
        return Err(ApiError::not_found("Community not found"));
    }

    let already: Option<String> = diesel_async::RunQueryDsl::get_result(
        memberships::table
            .filter(memberships::community_id.eq(&community_id))
            .filter(memberships::user_id.eq(&user_id))
            .select(memberships::user_id),
        &mut conn,
    )
    .await
    .optional()?;
    if already.is_some() {
        return Err(ApiError::conflict("Already a member of this community"));
    }

    let membership: Membership = diesel_async::RunQueryDsl::get_result(
        diesel::insert_into(memberships::table)
            .values(NewMembership {
                community_id: &community_id,
                user_id: &user_id,
                level: level.as_str(),
                joined_at: Utc::now(),
            })
            .returning(Membership::as_returning()),
        &mut conn,
    )
    .await?;

    Ok((StatusCode::CREATED, Json(membership)))
}

// ---------------------------------------------------------------------------
// DELETE /api/v1/communities/{community_id}/members/me
// ---------------------------------------------------------------------------

#[utoipa::path(
    delete,
    path = "/api/v1/communities/{community_id}/members/me",
    tag = "Members",
    security(("bearer" = [])),
    params(
        ("community_id" = String, Path, description = "Community ID"),
    ),
    responses(
        (status = 204, description = "Left the community"),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
        (status = 404, description = "Not a member", body = ApiErrorBody),
    ),
)]
pub async fn leave_community(
    AuthUser { user_id }: AuthUser,
    State(state): State<AppState>,
    Path(community_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let mut conn = state.db.get().await?;

    let deleted = diesel_async::RunQueryDsl::execute(
        diesel::delete(
            memberships::table
                .filter(memberships::community_id.eq(&community_id))
                .filter(memberships::user_id.eq(&user_id)),
        ),
        &mut conn,
    )
    .await?;

    if deleted == 0 {
        return Err(ApiError::not_found("Membership not found"));
    }

    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// GET /api/v1/users/me/communities
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/api/v1/users/me/communities",
    tag = "Members",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Communities the caller belongs to", body = [JoinedCommunity]),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
    ),
)]
pub async fn list_my_communities(
    AuthUser { user_id }: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<JoinedCommunity>>, ApiError> {
    let mut conn = state.db.get().await?;

    let rows: Vec<(Community, String, DateTime<Utc>)> = diesel_async::RunQueryDsl::load(
        memberships::table
            .inner_join(communities::table)
            .filter(memberships::user_id.eq(&user_id))
            .select((
                Community::as_select(),
                memberships::level,
                memberships::joined_at,
            ))
            .order(communities::name.asc()),
        &mut conn,
    )
    .await?;

    let joined = rows
        .into_iter()
        .map(|(community, level, joined_at)| JoinedCommunity {
            community,
            level,
            joined_at,
        })
        .collect();

    Ok(Json(joined))
}
