//! Star (like) toggling for threads and replies.
//!
//! One endpoint toggles both: starring an already-starred target removes
//! the star. Counts are recomputed inside the same transaction as the
//! write, so the broadcast number is the committed one.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use chrono::Utc;
use diesel::prelude::*;
use diesel::result::OptionalExtension;
use diesel_async::AsyncConnection;
use scoped_futures::ScopedFutureExt;
use serde::Deserialize;
use utoipa::ToSchema;

use crate::access::RoomKind;
use crate::auth::middleware::AuthUser;
use crate::db::schema::{replies, rooms, stars, threads};
use crate::error::{ApiError, ApiErrorBody};
use crate::models::star::{NewStar, Star};
use crate::realtime::events;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/stars", post(toggle_star))
}

enum ToggleOutcome {
    Added(Star),
    Removed,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ToggleStarRequest {
    /// Thread to star, exclusive with `reply`.
    pub thread: Option<i64>,
    /// Reply to star, exclusive with `thread`.
    pub reply: Option<i64>,
}

// ---------------------------------------------------------------------------
// POST /api/v1/stars
// ---------------------------------------------------------------------------

#[utoipa::path(
    post,
    path = "/api/v1/stars",
    tag = "Stars",
    security(("bearer" = [])),
    request_body = ToggleStarRequest,
    responses(
        (status = 201, description = "Star added", body = Star),
        (status = 204, description = "Star removed"),
        (status = 400, description = "Validation error", body = ApiErrorBody),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
        (status = 404, description = "Target not found", body = ApiErrorBody),
        (status = 409, description = "Concurrent duplicate star", body = ApiErrorBody),
    ),
)]
pub async fn toggle_star(
    AuthUser { user_id }: AuthUser,
    State(state): State<AppState>,
    Json(body): Json<ToggleStarRequest>,
) -> Result<Response, ApiError> {
    let outcome = match (body.thread, body.reply) {
        (Some(thread_id), None) => toggle_thread_star(&state, user_id, thread_id).await?,
        (None, Some(reply_id)) => toggle_reply_star(&state, user_id, reply_id).await?,
        _ => {
            return Err(ApiError::bad_request(
                "Provide exactly one of thread or reply",
            ))
        }
    };

    match outcome {
        ToggleOutcome::Added(star) => Ok((StatusCode::CREATED, Json(star)).into_response()),
        ToggleOutcome::Removed => Ok(StatusCode::NO_CONTENT.into_response()),
    }
}

async fn toggle_thread_star(
    state: &AppState,
    user_id: String,
    thread_id: i64,
) -> Result<ToggleOutcome, ApiError> {
    let star_id = state.snowflake.generate();
    let now = Utc::now();
    let mut conn = state.db.get().await?;

    let outcome = conn
        .transaction::<_, ApiError, _>(|conn| {
            async move {
                let target: Option<(String, String)> = diesel_async::RunQueryDsl::get_result(
                    threads::table
                        .inner_join(rooms::table)
                        .filter(threads::id.eq(thread_id))
                        .select((rooms::community_id, rooms::kind)),
                    conn,
                )
                .await
                .optional()?;
                let (community_id, kind_str) =
                    target.ok_or_else(|| ApiError::not_found("Thread not found"))?;
                let kind = RoomKind::parse(&kind_str)
                    .ok_or_else(|| ApiError::internal("Room has an unknown kind"))?;

                // Lock the caller's star row if it exists. Concurrent
                // double-adds fall through to the unique index.
                let existing: Option<Star> = diesel_async::RunQueryDsl::get_result(
                    stars::table
                        .filter(stars::user_id.eq(&user_id))
                        .filter(stars::thread_id.eq(thread_id))
                        .select(Star::as_select())
                        .for_update(),
                    conn,
                )
                .await
                .optional()?;

                let (outcome, liked_now) = match existing {
                    Some(star) => {
                        diesel_async::RunQueryDsl::execute(
                            diesel::delete(stars::table.find(star.id)),
                            conn,
                        )
                        .await?;
                        (ToggleOutcome::Removed, false)
                    }
                    None => {
                        let star: Star = diesel_async::RunQueryDsl::get_result(
                            diesel::insert_into(stars::table)
                                .values(NewStar {
                                    id: star_id,
                                    user_id: &user_id,
                                    thread_id: Some(thread_id),
                                    reply_id: None,
                                    created_at: now,
                                })
                                .returning(Star::as_returning()),
                            conn,
                        )
                        .await?;
                        (ToggleOutcome::Added(star), true)
                    }
                };

                let likes: i64 = diesel_async::RunQueryDsl::get_result(
                    stars::table.filter(stars::thread_id.eq(thread_id)).count(),
                    conn,
                )
                .await?;

                let events =
                    events::thread_like_toggled(&community_id, kind, thread_id, likes, liked_now);
                Ok((outcome, events))
            }
            .scope_boxed()
        })
        .await;

    state.emitter.dispatch_after(outcome)
}

async fn toggle_reply_star(
    state: &AppState,
    user_id: String,
    reply_id: i64,
) -> Result<ToggleOutcome, ApiError> {
    let star_id = state.snowflake.generate();
    let now = Utc::now();
    let threshold = state.config.promote_threshold;
    let mut conn = state.db.get().await?;

    let outcome = conn
        .transaction::<_, ApiError, _>(|conn| {
            async move {
                let target: Option<i64> = diesel_async::RunQueryDsl::get_result(
                    replies::table.find(reply_id).select(replies::thread_id),
                    conn,
                )
                .await
                .optional()?;
                let thread_id = target.ok_or_else(|| ApiError::not_found("Reply not found"))?;

                let existing: Option<Star> = diesel_async::RunQueryDsl::get_result(
                    stars::table
                        .filter(stars::user_id.eq(&user_id))
                        .filter(stars::reply_id.eq(reply_id))
                        .select(Star::as_select())
                        .for_update(),
                    conn,
                )
                .await
                .optional()?;

                let (outcome, liked_now) = match existing {
                    Some(star) => {
                        diesel_async::RunQueryDsl::execute(
                            diesel::delete(stars::table.find(star.id)),
                            conn,
                        )
                        .await?;
                        (ToggleOutcome::Removed, false)
                    }
                    None => {
                        let star: Star = diesel_async::RunQueryDsl::get_result(
                            diesel::insert_into(stars::table)
                                .values(NewStar {
                                    id: star_id,
                                    user_id: &user_id,
                                    thread_id: None,
                                    reply_id: Some(reply_id),
                                    created_at: now,
                                })
                                .returning(Star::as_returning()),
                            conn,
                        )
                        .await?;
                        (ToggleOutcome::Added(star), true)
                    }
                };

                let likes: i64 = diesel_async::RunQueryDsl::get_result(
                    stars::table.filter(stars::reply_id.eq(reply_id)).count(),
                    conn,
                )
                .await?;

                // Promotion tracks the committed count in both directions.
                diesel_async::RunQueryDsl::execute(
                    diesel::update(replies::table.find(reply_id))
                        .set(replies::promoted.eq(likes >= threshold)),
                    conn,
                )
                .await?;

                let event = events::reply_like_toggled(thread_id, reply_id, likes, liked_now);
                Ok((outcome, vec![event]))
            }
            .scope_boxed()
        })
        .await;

    state.emitter.dispatch_after(outcome)
}
