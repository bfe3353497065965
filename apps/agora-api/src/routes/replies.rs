//! Reply endpoints. Replies live under a thread and inherit its room's
//! access gate.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, post};
use axum::{Json, Router};
use chrono::Utc;
use diesel::prelude::*;
use diesel::result::OptionalExtension;
use diesel_async::AsyncConnection;
use diesel_async::AsyncPgConnection;
use scoped_futures::ScopedFutureExt;
use serde::Deserialize;
use utoipa::ToSchema;

use crate::access::{self, RoomKind};
use crate::auth::middleware::AuthUser;
use crate::db::schema::{replies, rooms, threads, users};
use crate::error::{ApiError, ApiErrorBody, FieldError};
use crate::models::reply::{NewReply, Reply, ReplyNode};
use crate::models::room::Room;
use crate::models::thread::Thread;
use crate::notify;
use crate::realtime::events;
use crate::AppState;

const MAX_REPLY_LEN: usize = 4000;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/threads/{thread_id}/replies", post(create_reply))
        .route("/replies/{id}", delete(delete_reply))
}

#[derive(Debug, Deserialize)]
pub struct ThreadRepliesPath {
    pub thread_id: String,
}

impl ThreadRepliesPath {
    fn thread_id_i64(&self) -> Result<i64, ApiError> {
        self.thread_id
            .parse()
            .map_err(|_| ApiError::bad_request("Invalid thread ID"))
    }
}

#[derive(Debug, Deserialize)]
pub struct ReplyPath {
    pub id: String,
}

impl ReplyPath {
    fn id_i64(&self) -> Result<i64, ApiError> {
        self.id
            .parse()
            .map_err(|_| ApiError::bad_request("Invalid reply ID"))
    }
}

async fn find_thread_with_room(
    conn: &mut AsyncPgConnection,
    thread_id: i64,
) -> Result<(Thread, Room), ApiError> {
    diesel_async::RunQueryDsl::get_result(
        threads::table
            .inner_join(rooms::table)
            .filter(threads::id.eq(thread_id))
            .select((Thread::as_select(), Room::as_select())),
        conn,
    )
    .await
    .optional()?
    .ok_or_else(|| ApiError::not_found("Thread not found"))
}

// ---------------------------------------------------------------------------
// POST /api/v1/threads/:thread_id/replies
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateReplyRequest {
    pub body: String,
    /// Reply to nest under. Top-level when absent.
    pub parent_id: Option<i64>,
}

#[utoipa::path(
    post,
    path = "/api/v1/threads/{thread_id}/replies",
    tag = "Replies",
    security(("bearer" = [])),
    params(
        ("thread_id" = String, Path, description = "Thread ID"),
    ),
    request_body = CreateReplyRequest,
    responses(
        (status = 201, description = "Reply created", body = Reply),
        (status = 400, description = "Validation error", body = ApiErrorBody),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
        (status = 403, description = "Room not available at the caller's level", body = ApiErrorBody),
        (status = 404, description = "Thread not found", body = ApiErrorBody),
    ),
)]
pub async fn create_reply(
    AuthUser { user_id }: AuthUser,
    State(state): State<AppState>,
    Path(path): Path<ThreadRepliesPath>,
    Json(body): Json<CreateReplyRequest>,
) -> Result<(StatusCode, Json<Reply>), ApiError> {
    let thread_id = path.thread_id_i64()?;
    let mut conn = state.db.get().await?;

    let (thread, room) = find_thread_with_room(&mut conn, thread_id).await?;
    let kind = RoomKind::parse(&room.kind)
        .ok_or_else(|| ApiError::internal("Room has an unknown kind"))?;
    access::require_room_access(&state.db, &room.community_id, kind, &user_id).await?;

    let text = body.body.trim().to_string();
    if text.is_empty() || text.len() > MAX_REPLY_LEN {
        return Err(ApiError::validation(vec![FieldError {
            field: "body".to_string(),
            message: format!("Reply must be between 1 and {MAX_REPLY_LEN} characters"),
        }]));
    }

    if let Some(parent_id) = body.parent_id {
        let parent_thread: Option<i64> = diesel_async::RunQueryDsl::get_result(
            replies::table.find(parent_id).select(replies::thread_id),
            &mut conn,
        )
        .await
        .optional()?;
        match parent_thread {
            None => return Err(ApiError::bad_request("Parent reply not found")),
            Some(parent_thread) if parent_thread != thread_id => {
                return Err(ApiError::bad_request(
                    "Parent reply belongs to a different thread",
                ));
            }
            Some(_) => {}
        }
    }

    let reply_id = state.snowflake.generate();
    let now = Utc::now();
    let author_id = user_id.clone();
    let community_id = room.community_id.clone();
    let parent_id = body.parent_id;

    let outcome = conn
        .transaction::<_, ApiError, _>(|conn| {
            async move {
                let reply: Reply = diesel_async::RunQueryDsl::get_result(
                    diesel::insert_into(replies::table)
                        .values(NewReply {
                            id: reply_id,
                            thread_id,
                            body: &text,
                            created_by: Some(&user_id),
                            parent_id,
                            promoted: false,
                            created_at: now,
                        })
                        .returning(Reply::as_returning()),
                    conn,
                )
                .await?;

                let replies_total: i64 = diesel_async::RunQueryDsl::get_result(
                    replies::table
                        .filter(replies::thread_id.eq(thread_id))
                        .count(),
                    conn,
                )
                .await?;

                let creator_name: Option<String> = diesel_async::RunQueryDsl::get_result(
                    users::table.find(&user_id).select(users::display_name),
                    conn,
                )
                .await
                .optional()?;

                let node = ReplyNode {
                    reply: reply.clone(),
                    creator_name,
                    likes: 0,
                    liked_by_me: false,
                    children: Vec::new(),
                };
                let events = events::reply_added(&community_id, kind, thread_id, replies_total, &node);
                Ok((reply, events))
            }
            .scope_boxed()
        })
        .await;

    let reply = state.emitter.dispatch_after(outcome)?;

    notify::spawn_reply_alerts(state.clone(), thread, author_id);

    Ok((StatusCode::CREATED, Json(reply)))
}

// ---------------------------------------------------------------------------
// DELETE /api/v1/replies/:id
// ---------------------------------------------------------------------------

#[utoipa::path(
    delete,
    path = "/api/v1/replies/{id}",
    tag = "Replies",
    security(("bearer" = [])),
    params(
        ("id" = String, Path, description = "Reply ID"),
    ),
    responses(
        (status = 204, description = "Reply deleted"),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
        (status = 403, description = "Not the author or an admin", body = ApiErrorBody),
        (status = 404, description = "Reply not found", body = ApiErrorBody),
    ),
)]
pub async fn delete_reply(
    AuthUser { user_id }: AuthUser,
    State(state): State<AppState>,
    Path(path): Path<ReplyPath>,
) -> Result<StatusCode, ApiError> {
    let reply_id = path.id_i64()?;
    let mut conn = state.db.get().await?;

    let reply: Reply = diesel_async::RunQueryDsl::get_result(
        replies::table.find(reply_id).select(Reply::as_select()),
        &mut conn,
    )
    .await
    .optional()?
    .ok_or_else(|| ApiError::not_found("Reply not found"))?;

    let (_, room) = find_thread_with_room(&mut conn, reply.thread_id).await?;
    let kind = RoomKind::parse(&room.kind)
        .ok_or_else(|| ApiError::internal("Room has an unknown kind"))?;

    let is_owner = reply.created_by.as_deref() == Some(user_id.as_str());
    if !is_owner && !access::is_admin(&state.db, &user_id).await? {
        return Err(ApiError::forbidden(
            "Only the author or an admin can delete this reply",
        ));
    }

    let thread_id = reply.thread_id;
    let community_id = room.community_id.clone();

    let outcome = conn
        .transaction::<_, ApiError, _>(|conn| {
            async move {
                diesel_async::RunQueryDsl::execute(
                    diesel::delete(replies::table.find(reply_id)),
                    conn,
                )
                .await?;

                let replies_total: i64 = diesel_async::RunQueryDsl::get_result(
                    replies::table
                        .filter(replies::thread_id.eq(thread_id))
                        .count(),
                    conn,
                )
                .await?;

                let events =
                    events::reply_deleted(&community_id, kind, thread_id, reply_id, replies_total);
                Ok(((), events))
            }
            .scope_boxed()
        })
        .await;

    state.emitter.dispatch_after(outcome)?;

    Ok(StatusCode::NO_CONTENT)
}
