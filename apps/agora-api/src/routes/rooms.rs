//! Room endpoints. Listing is filtered to the rooms the caller's membership
//! level grants, so a beginner never learns the advanced room even exists.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use diesel::prelude::*;
use diesel::result::OptionalExtension;
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};

use agora_common::id::{prefix, prefixed_ulid};

use crate::access::{self, RoomKind};
use crate::auth::middleware::AuthUser;
use crate::db::schema::{communities, rooms};
use crate::error::{ApiError, ApiErrorBody, FieldError};
use crate::models::room::{NewRoom, Room};
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route(
        "/communities/{community_id}/rooms",
        get(list_rooms).post(create_room),
    )
}

async fn require_community(
    state: &AppState,
    community_id: &str,
) -> Result<(), ApiError> {
    let mut conn = state.db.get().await?;
    let found: Option<String> = diesel_async::RunQueryDsl::get_result(
        communities::table.find(community_id).select(communities::id),
        &mut conn,
    )
    .await
    .optional()?;
    found
        .map(|_| ())
        .ok_or_else(|| ApiError::not_found("Community not found"))
}

// ---------------------------------------------------------------------------
// GET /api/v1/communities/{community_id}/rooms
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, IntoParams)]
pub struct ListRoomsParams {
    /// Restrict the listing to a single room kind.
    pub kind: Option<RoomKind>,
}

#[utoipa::path(
    get,
    path = "/api/v1/communities/{community_id}/rooms",
    tag = "Rooms",
    security(("bearer" = [])),
    params(
        ("community_id" = String, Path, description = "Community ID"),
        ListRoomsParams,
    ),
    responses(
        (status = 200, description = "Rooms visible at the caller's level", body = [Room]),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
        (status = 403, description = "Not a member, or kind not available", body = ApiErrorBody),
        (status = 404, description = "Community not found", body = ApiErrorBody),
    ),
)]
pub async fn list_rooms(
    AuthUser { user_id }: AuthUser,
    State(state): State<AppState>,
    Path(community_id): Path<String>,
    Query(params): Query<ListRoomsParams>,
) -> Result<Json<Vec<Room>>, ApiError> {
    require_community(&state, &community_id).await?;

    let profile = access::require_member(&state.db, &community_id, &user_id).await?;
    let allowed = profile.allowed_kinds();

    if let Some(kind) = params.kind {
        if !allowed.contains(&kind) {
            return Err(ApiError::forbidden(
                "This room is not available at your membership level",
            ));
        }
    }

    let allowed_strs: Vec<&'static str> = allowed.iter().map(|k| k.as_str()).collect();

    let mut conn = state.db.get().await?;
    let mut query = rooms::table
        .select(Room::as_select())
        .filter(rooms::community_id.eq(&community_id))
        .filter(rooms::kind.eq_any(allowed_strs))
        .order(rooms::kind.asc())
        .into_boxed();
    if let Some(kind) = params.kind {
        query = query.filter(rooms::kind.eq(kind.as_str()));
    }

    let room_rows: Vec<Room> = diesel_async::RunQueryDsl::load(query, &mut conn).await?;

    Ok(Json(room_rows))
}

// ---------------------------------------------------------------------------
// POST /api/v1/communities/{community_id}/rooms
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateRoomRequest {
    pub kind: RoomKind,
    /// Display name. Defaults to the standard name for the kind.
    pub name: Option<String>,
}

#[utoipa::path(
    post,
    path = "/api/v1/communities/{community_id}/rooms",
    tag = "Rooms",
    security(("bearer" = [])),
    params(
        ("community_id" = String, Path, description = "Community ID"),
    ),
    request_body = CreateRoomRequest,
    responses(
        (status = 201, description = "Room created", body = Room),
        (status = 400, description = "Validation error", body = ApiErrorBody),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
        (status = 403, description = "Not a member", body = ApiErrorBody),
        (status = 404, description = "Community not found", body = ApiErrorBody),
        (status = 409, description = "Room of this kind already exists", body = ApiErrorBody),
    ),
)]
pub async fn create_room(
    AuthUser { user_id }: AuthUser,
    State(state): State<AppState>,
    Path(community_id): Path<String>,
    Json(body): Json<CreateRoomRequest>,
) -> Result<(StatusCode, Json<Room>), ApiError> {
    require_community(&state, &community_id).await?;
    access::require_member(&state.db, &community_id, &user_id).await?;

    let name = body
        .name
        .map(|n| n.trim().to_string())
        .unwrap_or_else(|| body.kind.default_room_name().to_string());
    if name.is_empty() || name.len() > 100 {
        return Err(ApiError::validation(vec![FieldError {
            field: "name".to_string(),
            message: "Room name must be between 1 and 100 characters".to_string(),
        }]));
    }

    let mut conn = state.db.get().await?;

    let existing: Option<String> = diesel_async::RunQueryDsl::get_result(
        rooms::table
            .filter(rooms::community_id.eq(&community_id))
            .filter(rooms::kind.eq(body.kind.as_str()))
            .select(rooms::id),
        &mut conn,
    )
    .await
    .optional()?;
    if existing.is_some() {
        return Err(ApiError::conflict(
            "A room of this kind already exists in this community",
        ));
    }

    let room_id = prefixed_ulid(prefix::ROOM);
    let room: Room = diesel_async::RunQueryDsl::get_result(
        diesel::insert_into(rooms::table)
            .values(NewRoom {
                id: &room_id,
                community_id: &community_id,
                kind: body.kind.as_str(),
                name: &name,
                created_by: Some(&user_id),
                created_at: Utc::now(),
            })
            .returning(Room::as_returning()),
        &mut conn,
    )
    .await?;

    Ok((StatusCode::CREATED, Json(room)))
}
