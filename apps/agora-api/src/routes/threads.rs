//! Thread endpoints.
//!
//! Creating and listing threads is scoped to a room and gated on the room
//! kind; reading, editing, and deleting address a thread directly. Every
//! write broadcasts its change events only after the transaction commits.

use std::collections::{HashMap, HashSet};

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use diesel::prelude::*;
use diesel::result::OptionalExtension;
use diesel_async::AsyncConnection;
use diesel_async::AsyncPgConnection;
use scoped_futures::ScopedFutureExt;
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};

use crate::access::{self, RoomKind};
use crate::auth::middleware::AuthUser;
use crate::db::schema::{replies, rooms, stars, threads, users};
use crate::error::{ApiError, ApiErrorBody, FieldError};
use crate::models::reply::{build_reply_tree, Reply};
use crate::models::room::Room;
use crate::models::thread::{NewThread, Thread, ThreadDetail, ThreadSummary, UpdateThread};
use crate::notify;
use crate::realtime::events;
use crate::AppState;

const MAX_TITLE_LEN: usize = 200;
const MAX_BODY_LEN: usize = 10_000;

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/rooms/{room_id}/threads",
            get(list_threads).post(create_thread),
        )
        .route(
            "/threads/{id}",
            get(get_thread).patch(update_thread).delete(delete_thread),
        )
}

#[derive(Debug, Deserialize)]
pub struct ThreadPath {
    pub id: String,
}

impl ThreadPath {
    fn id_i64(&self) -> Result<i64, ApiError> {
        self.id
            .parse()
            .map_err(|_| ApiError::bad_request("Invalid thread ID"))
    }
}

// ---------------------------------------------------------------------------
// Shared lookups
// ---------------------------------------------------------------------------

async fn find_room(conn: &mut AsyncPgConnection, room_id: &str) -> Result<Room, ApiError> {
    diesel_async::RunQueryDsl::get_result(
        rooms::table.find(room_id).select(Room::as_select()),
        conn,
    )
    .await
    .optional()?
    .ok_or_else(|| ApiError::not_found("Room not found"))
}

/// Thread plus its room, or 404.
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

fn room_kind_of(room: &Room) -> Result<RoomKind, ApiError> {
    RoomKind::parse(&room.kind)
        .ok_or_else(|| ApiError::internal("Room has an unknown kind"))
}

/// Attach per-thread aggregates to a batch of rows in a fixed number of
/// queries, preserving the input order.
async fn summarize(
    conn: &mut AsyncPgConnection,
    thread_rows: Vec<Thread>,
    viewer: &str,
) -> Result<Vec<ThreadSummary>, ApiError> {
    if thread_rows.is_empty() {
        return Ok(Vec::new());
    }

    let ids: Vec<i64> = thread_rows.iter().map(|t| t.id).collect();

    let reply_threads: Vec<i64> = diesel_async::RunQueryDsl::load(
        replies::table
            .filter(replies::thread_id.eq_any(ids.clone()))
            .select(replies::thread_id),
        conn,
    )
    .await?;
    let mut reply_counts: HashMap<i64, i64> = HashMap::new();
    for thread_id in reply_threads {
        *reply_counts.entry(thread_id).or_insert(0) += 1;
    }

    let starred_threads: Vec<Option<i64>> = diesel_async::RunQueryDsl::load(
        stars::table
            .filter(stars::thread_id.eq_any(ids.clone()))
            .select(stars::thread_id),
        conn,
    )
    .await?;
    let mut star_counts: HashMap<i64, i64> = HashMap::new();
    for thread_id in starred_threads.into_iter().flatten() {
        *star_counts.entry(thread_id).or_insert(0) += 1;
    }

    let liked_rows: Vec<Option<i64>> = diesel_async::RunQueryDsl::load(
        stars::table
            .filter(stars::user_id.eq(viewer))
            .filter(stars::thread_id.eq_any(ids))
            .select(stars::thread_id),
        conn,
    )
    .await?;
    let liked: HashSet<i64> = liked_rows.into_iter().flatten().collect();

    let author_ids: Vec<String> = thread_rows
        .iter()
        .filter_map(|t| t.created_by.clone())
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();
    let name_rows: Vec<(String, String)> = diesel_async::RunQueryDsl::load(
        users::table
            .filter(users::id.eq_any(author_ids))
            .select((users::id, users::display_name)),
        conn,
    )
    .await?;
    let names: HashMap<String, String> = name_rows.into_iter().collect();

    Ok(thread_rows
        .into_iter()
        .map(|thread| ThreadSummary {
            creator_name: thread
                .created_by
                .as_deref()
                .and_then(|id| names.get(id).cloned()),
            replies: reply_counts.get(&thread.id).copied().unwrap_or(0),
            likes: star_counts.get(&thread.id).copied().unwrap_or(0),
            liked_by_me: liked.contains(&thread.id),
            thread,
        })
        .collect())
}

// ---------------------------------------------------------------------------
// POST /api/v1/rooms/:room_id/threads
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateThreadRequest {
    pub title: String,
    pub body: String,
    /// Server-side path of a previously uploaded attachment.
    pub file_attachment: Option<String>,
    pub is_job_post: Option<bool>,
    pub job_type: Option<String>,
    pub location: Option<String>,
    pub salary: Option<String>,
    pub external_link: Option<String>,
    pub classification: Option<String>,
    pub tags: Option<Vec<String>>,
}

#[utoipa::path(
    post,
    path = "/api/v1/rooms/{room_id}/threads",
    tag = "Threads",
    security(("bearer" = [])),
    params(
        ("room_id" = String, Path, description = "Room ID"),
    ),
    request_body = CreateThreadRequest,
    responses(
        (status = 201, description = "Thread created", body = ThreadSummary),
        (status = 400, description = "Validation error", body = ApiErrorBody),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
        (status = 403, description = "Room not available at the caller's level", body = ApiErrorBody),
        (status = 404, description = "Room not found", body = ApiErrorBody),
    ),
)]
pub async fn create_thread(
    AuthUser { user_id }: AuthUser,
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    Json(body): Json<CreateThreadRequest>,
) -> Result<(StatusCode, Json<ThreadSummary>), ApiError> {
    let mut conn = state.db.get().await?;

    let room = find_room(&mut conn, &room_id).await?;
    let kind = room_kind_of(&room)?;
    access::require_room_access(&state.db, &room.community_id, kind, &user_id).await?;

    // Validate.
    let title = body.title.trim().to_string();
    let mut errors = Vec::new();
    if title.is_empty() || title.len() > MAX_TITLE_LEN {
        errors.push(FieldError {
            field: "title".to_string(),
            message: format!("Title must be between 1 and {MAX_TITLE_LEN} characters"),
        });
    }
    if body.body.trim().is_empty() || body.body.len() > MAX_BODY_LEN {
        errors.push(FieldError {
            field: "body".to_string(),
            message: format!("Body must be between 1 and {MAX_BODY_LEN} characters"),
        });
    }
    if !errors.is_empty() {
        return Err(ApiError::validation(errors));
    }

    let thread_id = state.snowflake.generate();
    let now = Utc::now();
    let author_id = user_id.clone();
    let community_id = room.community_id.clone();
    let text = body.body;
    let file_attachment = body.file_attachment;
    let job_type = body.job_type;
    let location = body.location;
    let salary = body.salary;
    let external_link = body.external_link;
    let classification = body.classification.unwrap_or_else(|| "General".to_string());
    let tags = body.tags.unwrap_or_default();
    let is_job_post = body.is_job_post.unwrap_or(false);

    let outcome = conn
        .transaction::<_, ApiError, _>(|conn| {
            async move {
                let thread: Thread = diesel_async::RunQueryDsl::get_result(
                    diesel::insert_into(threads::table)
                        .values(NewThread {
                            id: thread_id,
                            room_id: &room_id,
                            title: &title,
                            body: &text,
                            created_by: Some(&user_id),
                            file_attachment: file_attachment.as_deref(),
                            is_job_post,
                            job_type: job_type.as_deref(),
                            location: location.as_deref(),
                            salary: salary.as_deref(),
                            external_link: external_link.as_deref(),
                            classification: &classification,
                            tags,
                            created_at: now,
                            updated_at: now,
                        })
                        .returning(Thread::as_returning()),
                    conn,
                )
                .await?;

                let creator_name: Option<String> = diesel_async::RunQueryDsl::get_result(
                    users::table.find(&user_id).select(users::display_name),
                    conn,
                )
                .await
                .optional()?;

                let summary = ThreadSummary {
                    thread,
                    creator_name,
                    replies: 0,
                    likes: 0,
                    liked_by_me: false,
                };
                let event = events::thread_created(&community_id, kind, &summary);
                Ok((summary, vec![event]))
            }
            .scope_boxed()
        })
        .await;

    let summary = state.emitter.dispatch_after(outcome)?;

    notify::spawn_thread_alerts(
        state.clone(),
        room.community_id.clone(),
        summary.thread.clone(),
        author_id,
    );

    Ok((StatusCode::CREATED, Json(summary)))
}

// ---------------------------------------------------------------------------
// GET /api/v1/rooms/:room_id/threads
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, IntoParams)]
pub struct ListThreadsParams {
    /// When set, keep only job posts (`true`) or only regular threads (`false`).
    pub job: Option<bool>,
}

#[utoipa::path(
    get,
    path = "/api/v1/rooms/{room_id}/threads",
    tag = "Threads",
    security(("bearer" = [])),
    params(
        ("room_id" = String, Path, description = "Room ID"),
        ListThreadsParams,
    ),
    responses(
        (status = 200, description = "Threads in the room, newest first", body = [ThreadSummary]),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
        (status = 403, description = "Room not available at the caller's level", body = ApiErrorBody),
        (status = 404, description = "Room not found", body = ApiErrorBody),
    ),
)]
pub async fn list_threads(
    AuthUser { user_id }: AuthUser,
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    Query(params): Query<ListThreadsParams>,
) -> Result<Json<Vec<ThreadSummary>>, ApiError> {
    let mut conn = state.db.get().await?;

    let room = find_room(&mut conn, &room_id).await?;
    let kind = room_kind_of(&room)?;
    access::require_room_access(&state.db, &room.community_id, kind, &user_id).await?;

    let mut query = threads::table
        .select(Thread::as_select())
        .filter(threads::room_id.eq(&room_id))
        .order(threads::created_at.desc())
        .into_boxed();
    if let Some(job) = params.job {
        query = query.filter(threads::is_job_post.eq(job));
    }

    let thread_rows: Vec<Thread> = diesel_async::RunQueryDsl::load(query, &mut conn).await?;
    let summaries = summarize(&mut conn, thread_rows, &user_id).await?;

    Ok(Json(summaries))
}

// ---------------------------------------------------------------------------
// GET /api/v1/threads/:id
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/api/v1/threads/{id}",
    tag = "Threads",
    security(("bearer" = [])),
    params(
        ("id" = String, Path, description = "Thread ID"),
    ),
    responses(
        (status = 200, description = "Thread with its reply tree", body = ThreadDetail),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
        (status = 403, description = "Room not available at the caller's level", body = ApiErrorBody),
        (status = 404, description = "Thread not found", body = ApiErrorBody),
    ),
)]
pub async fn get_thread(
    AuthUser { user_id }: AuthUser,
    State(state): State<AppState>,
    Path(path): Path<ThreadPath>,
) -> Result<Json<ThreadDetail>, ApiError> {
    let thread_id = path.id_i64()?;
    let mut conn = state.db.get().await?;

    let (thread, room) = find_thread_with_room(&mut conn, thread_id).await?;
    let kind = room_kind_of(&room)?;
    access::require_room_access(&state.db, &room.community_id, kind, &user_id).await?;

    let reply_rows: Vec<Reply> = diesel_async::RunQueryDsl::load(
        replies::table
            .filter(replies::thread_id.eq(thread_id))
            .select(Reply::as_select())
            .order(replies::created_at.asc()),
        &mut conn,
    )
    .await?;
    let reply_ids: Vec<i64> = reply_rows.iter().map(|r| r.id).collect();
    let reply_count = reply_rows.len() as i64;

    let likes: i64 = diesel_async::RunQueryDsl::get_result(
        stars::table.filter(stars::thread_id.eq(thread_id)).count(),
        &mut conn,
    )
    .await?;

    let reply_star_rows: Vec<Option<i64>> = diesel_async::RunQueryDsl::load(
        stars::table
            .filter(stars::reply_id.eq_any(reply_ids.clone()))
            .select(stars::reply_id),
        &mut conn,
    )
    .await?;
    let mut reply_star_counts: HashMap<i64, i64> = HashMap::new();
    for reply_id in reply_star_rows.into_iter().flatten() {
        *reply_star_counts.entry(reply_id).or_insert(0) += 1;
    }

    // Everything the caller has starred within this thread, in one query.
    let caller_star_rows: Vec<(Option<i64>, Option<i64>)> = diesel_async::RunQueryDsl::load(
        stars::table
            .filter(stars::user_id.eq(&user_id))
            .filter(
                stars::thread_id
                    .eq(thread_id)
                    .or(stars::reply_id.eq_any(reply_ids)),
            )
            .select((stars::thread_id, stars::reply_id)),
        &mut conn,
    )
    .await?;
    let liked_by_me = caller_star_rows
        .iter()
        .any(|(t, _)| *t == Some(thread_id));
    let starred_replies: HashSet<i64> = caller_star_rows
        .into_iter()
        .filter_map(|(_, r)| r)
        .collect();

    let mut author_ids: HashSet<String> = reply_rows
        .iter()
        .filter_map(|r| r.created_by.clone())
        .collect();
    if let Some(id) = thread.created_by.clone() {
        author_ids.insert(id);
    }
    let name_rows: Vec<(String, String)> = diesel_async::RunQueryDsl::load(
        users::table
            .filter(users::id.eq_any(author_ids.into_iter().collect::<Vec<_>>()))
            .select((users::id, users::display_name)),
        &mut conn,
    )
    .await?;
    let names: HashMap<String, String> = name_rows.into_iter().collect();

    let creator_name = thread
        .created_by
        .as_deref()
        .and_then(|id| names.get(id).cloned());
    let reply_tree = build_reply_tree(reply_rows, &names, &reply_star_counts, &starred_replies);

    Ok(Json(ThreadDetail {
        thread,
        creator_name,
        replies: reply_count,
        likes,
        liked_by_me,
        reply_tree,
    }))
}

// ---------------------------------------------------------------------------
// PATCH /api/v1/threads/:id
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateThreadRequest {
    pub title: Option<String>,
    pub body: Option<String>,
    pub job_type: Option<String>,
    pub location: Option<String>,
    pub salary: Option<String>,
    pub external_link: Option<String>,
    pub classification: Option<String>,
    pub tags: Option<Vec<String>>,
}

#[utoipa::path(
    patch,
    path = "/api/v1/threads/{id}",
    tag = "Threads",
    security(("bearer" = [])),
    params(
        ("id" = String, Path, description = "Thread ID"),
    ),
    request_body = UpdateThreadRequest,
    responses(
        (status = 200, description = "Thread updated", body = ThreadSummary),
        (status = 400, description = "Validation error", body = ApiErrorBody),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
        (status = 403, description = "Not the author or an admin", body = ApiErrorBody),
        (status = 404, description = "Thread not found", body = ApiErrorBody),
    ),
)]
pub async fn update_thread(
    AuthUser { user_id }: AuthUser,
    State(state): State<AppState>,
    Path(path): Path<ThreadPath>,
    Json(body): Json<UpdateThreadRequest>,
) -> Result<Json<ThreadSummary>, ApiError> {
    let thread_id = path.id_i64()?;
    let mut conn = state.db.get().await?;

    let (thread, room) = find_thread_with_room(&mut conn, thread_id).await?;
    let kind = room_kind_of(&room)?;

    let is_owner = thread.created_by.as_deref() == Some(user_id.as_str());
    if !is_owner && !access::is_admin(&state.db, &user_id).await? {
        return Err(ApiError::forbidden("Only the author or an admin can edit this thread"));
    }

    let title = body.title.map(|t| t.trim().to_string());
    let mut errors = Vec::new();
    if let Some(title) = title.as_deref() {
        if title.is_empty() || title.len() > MAX_TITLE_LEN {
            errors.push(FieldError {
                field: "title".to_string(),
                message: format!("Title must be between 1 and {MAX_TITLE_LEN} characters"),
            });
        }
    }
    if let Some(text) = body.body.as_deref() {
        if text.trim().is_empty() || text.len() > MAX_BODY_LEN {
            errors.push(FieldError {
                field: "body".to_string(),
                message: format!("Body must be between 1 and {MAX_BODY_LEN} characters"),
            });
        }
    }
    if !errors.is_empty() {
        return Err(ApiError::validation(errors));
    }

    let changes = UpdateThread {
        title,
        body: body.body,
        job_type: body.job_type,
        location: body.location,
        salary: body.salary,
        external_link: body.external_link,
        classification: body.classification,
        tags: body.tags,
        updated_at: Utc::now(),
    };
    let viewer = user_id.clone();

    let outcome = conn
        .transaction::<_, ApiError, _>(|conn| {
            async move {
                let updated: Thread = diesel_async::RunQueryDsl::get_result(
                    diesel::update(threads::table.find(thread_id))
                        .set(changes)
                        .returning(Thread::as_returning()),
                    conn,
                )
                .await?;

                let mut summaries = summarize(conn, vec![updated], &viewer).await?;
                let summary = summaries
                    .pop()
                    .ok_or_else(|| ApiError::internal("Updated thread vanished"))?;

                let event = events::thread_updated(&room.community_id, kind, &summary);
                Ok((summary, vec![event]))
            }
            .scope_boxed()
        })
        .await;

    let summary = state.emitter.dispatch_after(outcome)?;

    Ok(Json(summary))
}

// ---------------------------------------------------------------------------
// DELETE /api/v1/threads/:id
// ---------------------------------------------------------------------------

#[utoipa::path(
    delete,
    path = "/api/v1/threads/{id}",
    tag = "Threads",
    security(("bearer" = [])),
    params(
        ("id" = String, Path, description = "Thread ID"),
    ),
    responses(
        (status = 204, description = "Thread deleted"),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
        (status = 403, description = "Not the author or an admin", body = ApiErrorBody),
        (status = 404, description = "Thread not found", body = ApiErrorBody),
    ),
)]
pub async fn delete_thread(
    AuthUser { user_id }: AuthUser,
    State(state): State<AppState>,
    Path(path): Path<ThreadPath>,
) -> Result<StatusCode, ApiError> {
    let thread_id = path.id_i64()?;
    let mut conn = state.db.get().await?;

    let (thread, room) = find_thread_with_room(&mut conn, thread_id).await?;
    let kind = room_kind_of(&room)?;

    let is_owner = thread.created_by.as_deref() == Some(user_id.as_str());
    if !is_owner && !access::is_admin(&state.db, &user_id).await? {
        return Err(ApiError::forbidden(
            "Only the author or an admin can delete this thread",
        ));
    }

    let outcome = conn
        .transaction::<_, ApiError, _>(|conn| {
            async move {
                diesel_async::RunQueryDsl::execute(
                    diesel::delete(threads::table.find(thread_id)),
                    conn,
                )
                .await?;

                let event = events::thread_deleted(&room.community_id, kind, thread_id);
                Ok(((), vec![event]))
            }
            .scope_boxed()
        })
        .await;

    state.emitter.dispatch_after(outcome)?;

    // The attachment is gone from the API either way; a leftover file only
    // costs disk space.
    if let Some(file_path) = thread.file_attachment {
        if let Err(err) = tokio::fs::remove_file(&file_path).await {
            tracing::debug!(%err, file_path, "failed to remove thread attachment");
        }
    }

    Ok(StatusCode::NO_CONTENT)
}
