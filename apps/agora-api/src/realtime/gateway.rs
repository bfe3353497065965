//! WebSocket endpoints for live updates.
//!
//! Each route subscribes the connection to exactly one fan-out group. The
//! socket is server-push only: client frames other than Close are ignored.
//! Authentication happens after the upgrade so a refused connection gets an
//! application close code instead of a failed handshake. A successful
//! subscription is acked with a `subscribed` frame before any event flows.

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, Query, State, WebSocketUpgrade};
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use diesel::prelude::*;
use diesel::result::OptionalExtension;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;

use agora_common::id::{prefix, prefixed_ulid};

use crate::access::{self, RoomKind};
use crate::auth::tokens;
use crate::db::schema::{communities, rooms, threads};
use crate::error::ApiError;
use crate::AppState;

use super::events::{community_group, thread_group, user_group};

/// Close codes (4000-range for application-level), shaped after the HTTP
/// statuses the REST surface returns for the same refusals.
const CLOSE_INTERNAL_ERROR: u16 = 4000;
const CLOSE_UNAUTHENTICATED: u16 = 4401;
const CLOSE_FORBIDDEN: u16 = 4403;
const CLOSE_NOT_FOUND: u16 = 4404;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/ws/community/{community_id}", get(community_ws))
        .route("/ws/thread/{thread_id}", get(thread_ws))
        .route("/ws/alerts/{user_id}", get(alerts_ws))
}

#[derive(Debug, Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

/// What the connection asked to subscribe to.
enum SubscribeTarget {
    Community(String),
    Thread(i64),
    Alerts(String),
}

async fn community_ws(
    ws: WebSocketUpgrade,
    Path(community_id): Path<String>,
    Query(query): Query<TokenQuery>,
    headers: HeaderMap,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let token = bearer_token(&query, &headers);
    ws.on_upgrade(move |socket| {
        serve(socket, state, SubscribeTarget::Community(community_id), token)
    })
}

async fn thread_ws(
    ws: WebSocketUpgrade,
    Path(thread_id): Path<i64>,
    Query(query): Query<TokenQuery>,
    headers: HeaderMap,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let token = bearer_token(&query, &headers);
    ws.on_upgrade(move |socket| serve(socket, state, SubscribeTarget::Thread(thread_id), token))
}

async fn alerts_ws(
    ws: WebSocketUpgrade,
    Path(user_id): Path<String>,
    Query(query): Query<TokenQuery>,
    headers: HeaderMap,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let token = bearer_token(&query, &headers);
    ws.on_upgrade(move |socket| serve(socket, state, SubscribeTarget::Alerts(user_id), token))
}

/// Token from the `?token=` query parameter, falling back to the
/// `Authorization: Bearer` header.
fn bearer_token(query: &TokenQuery, headers: &HeaderMap) -> Option<String> {
    if let Some(token) = query.token.as_deref().filter(|t| !t.is_empty()) {
        return Some(token.to_string());
    }
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|t| t.to_string())
}

async fn serve(socket: WebSocket, state: AppState, target: SubscribeTarget, token: Option<String>) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    // Authenticate. Any token failure leaves the connection anonymous; the
    // refusal happens below with a close code, never a handshake error.
    let user_id = token.and_then(|t| {
        match tokens::decode_access_token(&state.config.token_secret, &t) {
            Ok(claims) => Some(claims.sub),
            Err(_) => {
                tracing::debug!("ws token rejected, treating connection as anonymous");
                None
            }
        }
    });

    let Some(user_id) = user_id else {
        let _ = send_close(&mut ws_tx, CLOSE_UNAUTHENTICATED, "Authentication required").await;
        return;
    };

    // Authorize against the subscription target.
    let group = match authorize(&state, &target, &user_id).await {
        Ok(group) => group,
        Err(refusal) => {
            tracing::debug!(user_id = %user_id, code = refusal.code, reason = refusal.reason, "ws subscription refused");
            let _ = send_close(&mut ws_tx, refusal.code, refusal.reason).await;
            return;
        }
    };

    // Open. Each connection owns a fresh id and its own group membership, so
    // multiple connections per user stay independent.
    let connection_id = prefixed_ulid(prefix::CONNECTION);
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    state.bus.join(&group, &connection_id, tx).await;

    // Ack the subscription. Events published after this frame was sent are
    // guaranteed to reach the connection.
    let ack = serde_json::json!({
        "type": "subscribed",
        "group": group,
        "connection_id": connection_id,
    });
    if ws_tx.send(Message::Text(ack.to_string().into())).await.is_err() {
        state.bus.leave(&group, &connection_id).await;
        return;
    }

    tracing::info!(connection_id = %connection_id, user_id = %user_id, group = %group, "ws session open");

    loop {
        tokio::select! {
            frame = ws_rx.next() => {
                match frame {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
                    // Server-push only: inbound text and binary frames are ignored.
                    Some(Ok(_)) => continue,
                    Some(Err(err)) => {
                        tracing::debug!(?err, connection_id = %connection_id, "ws read error");
                        break;
                    }
                }
            }
            payload = rx.recv() => {
                match payload {
                    Some(text) => {
                        if ws_tx.send(Message::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
        }
    }

    state.bus.leave(&group, &connection_id).await;
    tracing::info!(connection_id = %connection_id, group = %group, "ws session closed");
}

struct Refusal {
    code: u16,
    reason: &'static str,
}

impl From<ApiError> for Refusal {
    fn from(err: ApiError) -> Self {
        match err.status {
            StatusCode::FORBIDDEN => Refusal {
                code: CLOSE_FORBIDDEN,
                reason: "Forbidden",
            },
            StatusCode::NOT_FOUND => Refusal {
                code: CLOSE_NOT_FOUND,
                reason: "Not found",
            },
            _ => {
                tracing::warn!(code = %err.code, message = %err.message, "ws authorization errored");
                Refusal {
                    code: CLOSE_INTERNAL_ERROR,
                    reason: "Internal error",
                }
            }
        }
    }
}

/// Resolve the target to its group name, enforcing the membership and room
/// kind rules. Failures map to close codes, never to silent downgrades.
async fn authorize(
    state: &AppState,
    target: &SubscribeTarget,
    user_id: &str,
) -> Result<String, Refusal> {
    match target {
        SubscribeTarget::Community(community_id) => {
            let mut conn = state.db.get().await.map_err(ApiError::from)?;

            let exists: Option<String> = diesel_async::RunQueryDsl::get_result(
                communities::table
                    .find(community_id)
                    .select(communities::id),
                &mut conn,
            )
            .await
            .optional()
            .map_err(ApiError::from)?;

            if exists.is_none() {
                return Err(Refusal {
                    code: CLOSE_NOT_FOUND,
                    reason: "Community not found",
                });
            }

            access::require_member(&state.db, community_id, user_id).await?;

            Ok(community_group(community_id))
        }
        SubscribeTarget::Thread(thread_id) => {
            let mut conn = state.db.get().await.map_err(ApiError::from)?;

            let room: Option<(String, String)> = diesel_async::RunQueryDsl::get_result(
                threads::table
                    .inner_join(rooms::table)
                    .filter(threads::id.eq(thread_id))
                    .select((rooms::community_id, rooms::kind)),
                &mut conn,
            )
            .await
            .optional()
            .map_err(ApiError::from)?;

            let Some((community_id, kind)) = room else {
                return Err(Refusal {
                    code: CLOSE_NOT_FOUND,
                    reason: "Thread not found",
                });
            };

            let room_kind = RoomKind::parse(&kind)
                .ok_or_else(|| ApiError::internal("Unknown room kind"))?;
            access::require_room_access(&state.db, &community_id, room_kind, user_id).await?;

            Ok(thread_group(*thread_id))
        }
        SubscribeTarget::Alerts(target_user_id) => {
            // Strict identity match. The subscription is refused rather than
            // rebound to the authenticated user.
            if target_user_id != user_id {
                return Err(Refusal {
                    code: CLOSE_FORBIDDEN,
                    reason: "Cannot subscribe to another user's alerts",
                });
            }
            Ok(user_group(user_id))
        }
    }
}

/// Send a WebSocket close frame with a code and reason.
async fn send_close(
    ws_tx: &mut futures_util::stream::SplitSink<WebSocket, Message>,
    code: u16,
    reason: &str,
) -> Result<(), axum::Error> {
    let close_msg = Message::Close(Some(axum::extract::ws::CloseFrame {
        code,
        reason: reason.to_string().into(),
    }));
    ws_tx.send(close_msg).await
}
