//! Alert generation and delivery.
//!
//! Both entry points run after the originating write has committed, on a
//! spawned task, so nothing here can fail or roll back the write. A failed
//! fan-out is abandoned with a warning; the durable rows and the push are
//! simply missing for that event.

use chrono::Utc;
use diesel::prelude::*;
use diesel::result::OptionalExtension;

use crate::db::schema::{alerts, memberships, users};
use crate::error::ApiError;
use crate::models::alert::{Alert, AlertKind, NewAlert};
use crate::models::thread::Thread;
use crate::realtime::events;
use crate::AppState;

/// Alert the thread owner that someone replied.
pub fn spawn_reply_alerts(state: AppState, thread: Thread, reply_author_id: String) {
    tokio::spawn(async move {
        if let Err(err) = reply_alerts(&state, &thread, &reply_author_id).await {
            tracing::warn!(?err, thread_id = thread.id, "reply alert fan-out failed");
        }
    });
}

/// Alert every other community member that a thread was posted.
pub fn spawn_thread_alerts(
    state: AppState,
    community_id: String,
    thread: Thread,
    author_id: String,
) {
    tokio::spawn(async move {
        if let Err(err) = thread_alerts(&state, &community_id, &thread, &author_id).await {
            tracing::warn!(?err, thread_id = thread.id, "thread alert fan-out failed");
        }
    });
}

async fn reply_alerts(
    state: &AppState,
    thread: &Thread,
    reply_author_id: &str,
) -> Result<(), ApiError> {
    // Self-replies and ownerless threads generate nothing.
    let Some(owner_id) = thread.created_by.as_deref() else {
        return Ok(());
    };
    if owner_id == reply_author_id {
        return Ok(());
    }

    let mut conn = state.db.get().await?;

    let Some(author_name) = display_name(&mut conn, reply_author_id).await? else {
        tracing::debug!(author = reply_author_id, "reply author vanished, skipping alerts");
        return Ok(());
    };

    let now = Utc::now();
    let mut new_alerts = vec![NewAlert {
        id: state.snowflake.generate(),
        recipient_id: owner_id,
        kind: AlertKind::Reply.as_str(),
        object_id: Some(thread.id),
        message: format!("{author_name} replied to your thread: {}", thread.title),
        is_read: false,
        created_at: now,
    }];

    // Job posts get a second, separately worded alert. Both rows are kept.
    if thread.is_job_post {
        new_alerts.push(NewAlert {
            id: state.snowflake.generate(),
            recipient_id: owner_id,
            kind: AlertKind::Reply.as_str(),
            object_id: Some(thread.id),
            message: format!("{author_name} commented on your job post: {}", thread.title),
            is_read: false,
            created_at: now,
        });
    }

    persist_and_push(state, &mut conn, new_alerts).await
}

async fn thread_alerts(
    state: &AppState,
    community_id: &str,
    thread: &Thread,
    author_id: &str,
) -> Result<(), ApiError> {
    let mut conn = state.db.get().await?;

    let Some(author_name) = display_name(&mut conn, author_id).await? else {
        tracing::debug!(author = author_id, "thread author vanished, skipping alerts");
        return Ok(());
    };

    // One batch query for the recipients; alerts are inserted in one
    // statement below.
    let recipient_ids: Vec<String> = diesel_async::RunQueryDsl::load(
        memberships::table
            .filter(memberships::community_id.eq(community_id))
            .filter(memberships::user_id.ne(author_id))
            .select(memberships::user_id),
        &mut conn,
    )
    .await?;

    if recipient_ids.is_empty() {
        return Ok(());
    }

    let (kind, message) = if thread.is_job_post {
        (
            AlertKind::Job,
            format!("{author_name} posted a new job opportunity: {}", thread.title),
        )
    } else {
        (
            AlertKind::Info,
            format!("{author_name} started a new thread: {}", thread.title),
        )
    };

    let now = Utc::now();
    let new_alerts: Vec<NewAlert> = recipient_ids
        .iter()
        .map(|recipient_id| NewAlert {
            id: state.snowflake.generate(),
            recipient_id,
            kind: kind.as_str(),
            object_id: Some(thread.id),
            message: message.clone(),
            is_read: false,
            created_at: now,
        })
        .collect();

    persist_and_push(state, &mut conn, new_alerts).await
}

async fn display_name(
    conn: &mut diesel_async::AsyncPgConnection,
    user_id: &str,
) -> Result<Option<String>, ApiError> {
    Ok(diesel_async::RunQueryDsl::get_result(
        users::table.find(user_id).select(users::display_name),
        conn,
    )
    .await
    .optional()?)
}

/// Batch-insert the rows, then push each to its recipient's group.
async fn persist_and_push(
    state: &AppState,
    conn: &mut diesel_async::AsyncPgConnection,
    new_alerts: Vec<NewAlert<'_>>,
) -> Result<(), ApiError> {
    let rows: Vec<Alert> = diesel_async::RunQueryDsl::get_results(
        diesel::insert_into(alerts::table)
            .values(new_alerts)
            .returning(Alert::as_returning()),
        conn,
    )
    .await?;

    for alert in &rows {
        let event = events::alert_created(alert);
        state.bus.publish(&event.group, &event.payload.to_string()).await;
    }

    Ok(())
}
