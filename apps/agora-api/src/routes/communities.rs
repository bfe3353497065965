//! Community endpoints.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use diesel::prelude::*;
use diesel::result::OptionalExtension;
use diesel_async::AsyncConnection;
use scoped_futures::ScopedFutureExt;
use serde::Deserialize;
use utoipa::ToSchema;

use agora_common::id::{prefix, prefixed_ulid};

use crate::access::{MembershipLevel, RoomKind};
use crate::auth::middleware::AuthUser;
use crate::db::schema::{communities, memberships, rooms};
use crate::error::{ApiError, ApiErrorBody, FieldError};
use crate::models::community::{Community, CommunityResponse, NewCommunity};
use crate::models::membership::NewMembership;
use crate::models::room::{NewRoom, Room};
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/communities", post(create_community).get(list_communities))
        .route("/communities/{id}", get(get_community))
}

// ---------------------------------------------------------------------------
// POST /api/v1/communities
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateCommunityRequest {
    pub name: String,
    pub description: Option<String>,
    /// Creator's membership level. Defaults to `both`.
    pub level: Option<MembershipLevel>,
}

#[utoipa::path(
    post,
    path = "/api/v1/communities",
    tag = "Communities",
    security(("bearer" = [])),
    request_body = CreateCommunityRequest,
    responses(
        (status = 201, description = "Community created with its rooms", body = CommunityResponse),
        (status = 400, description = "Validation error", body = ApiErrorBody),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
        (status = 409, description = "Name already taken", body = ApiErrorBody),
    ),
)]
pub async fn create_community(
    AuthUser { user_id }: AuthUser,
    State(state): State<AppState>,
    Json(body): Json<CreateCommunityRequest>,
) -> Result<(StatusCode, Json<CommunityResponse>), ApiError> {
    // Validate.
    let name = body.name.trim().to_string();
    let mut errors = Vec::new();
    if name.is_empty() {
        errors.push(FieldError {
            field: "name".to_string(),
            message: "Community name is required".to_string(),
        });
    } else if name.len() > 100 {
        errors.push(FieldError {
            field: "name".to_string(),
            message: "Community name must be 100 characters or fewer".to_string(),
        });
    }
    if let Some(description) = body.description.as_deref() {
        if description.len() > 500 {
            errors.push(FieldError {
                field: "description".to_string(),
                message: "Description must be 500 characters or fewer".to_string(),
            });
        }
    }
    if !errors.is_empty() {
        return Err(ApiError::validation(errors));
    }

    let level = body.level.unwrap_or(MembershipLevel::Both);
    let description = body.description;
    let community_id = prefixed_ulid(prefix::COMMUNITY);
    let now = Utc::now();

    let mut conn = state.db.get().await?;

    let taken: Option<String> = diesel_async::RunQueryDsl::get_result(
        communities::table
            .filter(communities::name.eq(&name))
            .select(communities::id),
        &mut conn,
    )
    .await
    .optional()?;
    if taken.is_some() {
        return Err(ApiError::conflict("A community with this name already exists"));
    }

    let (community, room_rows) = conn
        .transaction::<_, ApiError, _>(|conn| {
            async move {
                let community: Community = diesel_async::RunQueryDsl::get_result(
                    diesel::insert_into(communities::table)
                        .values(NewCommunity {
                            id: &community_id,
                            name: &name,
                            description: description.as_deref(),
                            created_at: now,
                        })
                        .returning(Community::as_returning()),
                    conn,
                )
                .await?;

                // One room per kind, provisioned with the community.
                let mut room_rows = Vec::with_capacity(RoomKind::ALL.len());
                for kind in RoomKind::ALL {
                    let room_id = prefixed_ulid(prefix::ROOM);
                    let room: Room = diesel_async::RunQueryDsl::get_result(
                        diesel::insert_into(rooms::table)
                            .values(NewRoom {
                                id: &room_id,
                                community_id: &community.id,
                                kind: kind.as_str(),
                                name: kind.default_room_name(),
                                created_by: Some(&user_id),
                                created_at: now,
                            })
                            .returning(Room::as_returning()),
                        conn,
                    )
                    .await?;
                    room_rows.push(room);
                }

                // The creator joins immediately.
                diesel_async::RunQueryDsl::execute(
                    diesel::insert_into(memberships::table).values(NewMembership {
                        community_id: &community.id,
                        user_id: &user_id,
                        level: level.as_str(),
                        joined_at: now,
                    }),
                    conn,
                )
                .await?;

                Ok((community, room_rows))
            }
            .scope_boxed()
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(CommunityResponse {
            community,
            rooms: room_rows,
        }),
    ))
}

// ---------------------------------------------------------------------------
// GET /api/v1/communities
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/api/v1/communities",
    tag = "Communities",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "All communities", body = [Community]),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
    ),
)]
pub async fn list_communities(
    AuthUser { user_id: _ }: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<Community>>, ApiError> {
    let mut conn = state.db.get().await?;

    let rows: Vec<Community> = diesel_async::RunQueryDsl::load(
        communities::table
            .select(Community::as_select())
            .order(communities::name.asc()),
        &mut conn,
    )
    .await?;

    Ok(Json(rows))
}

// ---------------------------------------------------------------------------
// GET /api/v1/communities/{id}
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/api/v1/communities/{id}",
    tag = "Communities",
    security(("bearer" = [])),
    params(
        ("id" = String, Path, description = "Community ID"),
    ),
    responses(
        (status = 200, description = "Community", body = Community),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
        (status = 404, description = "Community not found", body = ApiErrorBody),
    ),
)]
pub async fn get_community(
    AuthUser { user_id: _ }: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Community>, ApiError> {
    let mut conn = state.db.get().await?;

    let community: Community = diesel_async::RunQueryDsl::get_result(
        communities::table.find(&id).select(Community::as_select()),
        &mut conn,
    )
    .await
    .optional()?
    .ok_or_else(|| ApiError::not_found("Community not found"))?;

    Ok(Json(community))
}
