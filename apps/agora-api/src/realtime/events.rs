//! Outbound event names, group naming, and payload construction.
//!
//! Every payload is a JSON object with a `type` field. Write paths build
//! these inside their transaction from the state they just wrote, return
//! them from the transaction closure, and dispatch them only after commit.

use serde_json::{json, Value};

use crate::access::RoomKind;
use crate::models::alert::Alert;
use crate::models::reply::ReplyNode;
use crate::models::thread::ThreadSummary;

/// Event names carried in the payload `type` field.
pub struct EventName;

impl EventName {
    pub const THREAD_CREATED: &'static str = "thread_created";
    pub const THREAD_UPDATED: &'static str = "thread_updated";
    pub const THREAD_DELETED: &'static str = "thread_deleted";
    pub const REPLY_ADDED: &'static str = "reply_added";
    pub const REPLY_DELETED: &'static str = "reply_deleted";
    pub const THREAD_LIKE_TOGGLED: &'static str = "thread_like_toggled";
    pub const REPLY_LIKE_TOGGLED: &'static str = "reply_like_toggled";
    pub const ALERT_CREATED: &'static str = "alert_created";
}

// ---------------------------------------------------------------------------
// Group naming
// ---------------------------------------------------------------------------

pub fn community_group(community_id: &str) -> String {
    format!("community:{community_id}")
}

pub fn thread_group(thread_id: i64) -> String {
    format!("thread:{thread_id}")
}

pub fn user_group(user_id: &str) -> String {
    format!("user:{user_id}")
}

// ---------------------------------------------------------------------------
// Outbound events
// ---------------------------------------------------------------------------

/// One payload addressed to one group.
#[derive(Debug, Clone)]
pub struct OutboundEvent {
    pub group: String,
    pub payload: Value,
}

/// New thread, delivered to the community feed.
pub fn thread_created(
    community_id: &str,
    room_kind: RoomKind,
    thread: &ThreadSummary,
) -> OutboundEvent {
    OutboundEvent {
        group: community_group(community_id),
        payload: json!({
            "type": EventName::THREAD_CREATED,
            "thread": thread,
            "room_kind": room_kind.as_str(),
        }),
    }
}

/// Edited thread, delivered to the community feed.
pub fn thread_updated(
    community_id: &str,
    room_kind: RoomKind,
    thread: &ThreadSummary,
) -> OutboundEvent {
    OutboundEvent {
        group: community_group(community_id),
        payload: json!({
            "type": EventName::THREAD_UPDATED,
            "thread": thread,
            "room_kind": room_kind.as_str(),
        }),
    }
}

pub fn thread_deleted(community_id: &str, room_kind: RoomKind, thread_id: i64) -> OutboundEvent {
    OutboundEvent {
        group: community_group(community_id),
        payload: json!({
            "type": EventName::THREAD_DELETED,
            "id": thread_id,
            "room_kind": room_kind.as_str(),
        }),
    }
}

/// New reply, delivered to the open thread view and the community feed so
/// both can update their counts. `replies` is the post-insert total.
pub fn reply_added(
    community_id: &str,
    room_kind: RoomKind,
    thread_id: i64,
    replies: i64,
    reply: &ReplyNode,
) -> Vec<OutboundEvent> {
    let payload = json!({
        "type": EventName::REPLY_ADDED,
        "thread_id": thread_id,
        "replies": replies,
        "reply": reply,
        "room_kind": room_kind.as_str(),
    });

    vec![
        OutboundEvent {
            group: thread_group(thread_id),
            payload: payload.clone(),
        },
        OutboundEvent {
            group: community_group(community_id),
            payload,
        },
    ]
}

/// Reply removal. `replies` is the post-delete total.
pub fn reply_deleted(
    community_id: &str,
    room_kind: RoomKind,
    thread_id: i64,
    reply_id: i64,
    replies: i64,
) -> Vec<OutboundEvent> {
    let payload = json!({
        "type": EventName::REPLY_DELETED,
        "thread_id": thread_id,
        "id": reply_id,
        "replies": replies,
        "room_kind": room_kind.as_str(),
    });

    vec![
        OutboundEvent {
            group: thread_group(thread_id),
            payload: payload.clone(),
        },
        OutboundEvent {
            group: community_group(community_id),
            payload,
        },
    ]
}

/// Star toggle on a thread, delivered to both scopes.
///
/// `liked_by_me` reflects the acting user and is broadcast unchanged to
/// every subscriber; receivers reconcile their own state from it only when
/// the actor is themselves.
pub fn thread_like_toggled(
    community_id: &str,
    room_kind: RoomKind,
    thread_id: i64,
    likes: i64,
    liked_by_me: bool,
) -> Vec<OutboundEvent> {
    let payload = json!({
        "type": EventName::THREAD_LIKE_TOGGLED,
        "id": thread_id,
        "likes": likes,
        "liked_by_me": liked_by_me,
    });

    let mut with_kind = payload.clone();
    with_kind["room_kind"] = Value::String(room_kind.as_str().to_string());

    vec![
        OutboundEvent {
            group: thread_group(thread_id),
            payload: with_kind.clone(),
        },
        OutboundEvent {
            group: community_group(community_id),
            payload: with_kind,
        },
    ]
}

/// Star toggle on a reply. Stays on the thread group; the community feed
/// does not render reply stars.
pub fn reply_like_toggled(
    thread_id: i64,
    reply_id: i64,
    likes: i64,
    liked_by_me: bool,
) -> OutboundEvent {
    OutboundEvent {
        group: thread_group(thread_id),
        payload: json!({
            "type": EventName::REPLY_LIKE_TOGGLED,
            "id": reply_id,
            "likes": likes,
            "liked_by_me": liked_by_me,
        }),
    }
}

/// Freshly persisted alert, pushed to its recipient.
pub fn alert_created(alert: &Alert) -> OutboundEvent {
    OutboundEvent {
        group: user_group(&alert.recipient_id),
        payload: json!({
            "type": EventName::ALERT_CREATED,
            "alert": alert,
        }),
    }
}
