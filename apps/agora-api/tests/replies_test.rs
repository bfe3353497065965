mod common;

use axum::http::header::AUTHORIZATION;
use axum::http::StatusCode;

async fn setup_thread(
    state: &agora_api::AppState,
    server: &axum_test::TestServer,
) -> (String, String, serde_json::Value, i64) {
    let owner_id = common::seed_user(&state.db, "Priya", "normal").await;
    let owner_token = common::bearer(state, &owner_id);
    let community =
        common::create_community(server, &owner_token, &common::unique_name("replies")).await;
    let room_id = common::room_of_kind(&community, "general_discussion");

    let thread = server
        .post(&format!("/api/v1/rooms/{room_id}/threads"))
        .add_header(AUTHORIZATION, format!("Bearer {owner_token}"))
        .json(&serde_json::json!({ "title": "Reply target", "body": "Discuss below" }))
        .await;
    thread.assert_status(StatusCode::CREATED);
    let thread: serde_json::Value = thread.json();
    let thread_id = thread["id"].as_i64().unwrap();

    (owner_id, owner_token, community, thread_id)
}

// ---------------------------------------------------------------------------
// POST /api/v1/threads/{thread_id}/replies
// ---------------------------------------------------------------------------

#[tokio::test]
async fn create_reply_returns_node() {
    let state = common::test_state().await;
    let server = common::test_server(&state);
    let (owner_id, owner_token, community, thread_id) = setup_thread(&state, &server).await;

    let resp = server
        .post(&format!("/api/v1/threads/{thread_id}/replies"))
        .add_header(AUTHORIZATION, format!("Bearer {owner_token}"))
        .json(&serde_json::json!({ "body": "First!" }))
        .await;
    resp.assert_status(StatusCode::CREATED);
    let body: serde_json::Value = resp.json();

    assert!(body["id"].as_i64().unwrap() > 0);
    assert_eq!(body["thread_id"].as_i64().unwrap(), thread_id);
    assert_eq!(body["body"], "First!");
    assert_eq!(body["created_by"], owner_id.as_str());
    assert!(body["parent_id"].is_null());
    assert_eq!(body["promoted"], false);

    let detail = server
        .get(&format!("/api/v1/threads/{thread_id}"))
        .add_header(AUTHORIZATION, format!("Bearer {owner_token}"))
        .await;
    let detail: serde_json::Value = detail.json();
    assert_eq!(detail["replies"], 1);

    common::cleanup_community(&state.db, community["id"].as_str().unwrap()).await;
    common::cleanup_user(&state.db, &owner_id).await;
}

#[tokio::test]
async fn reply_parent_must_belong_to_same_thread() {
    let state = common::test_state().await;
    let server = common::test_server(&state);
    let (owner_id, owner_token, community, thread_id) = setup_thread(&state, &server).await;
    let room_id = common::room_of_kind(&community, "general_discussion");

    // A reply hanging off a different thread is not a valid parent.
    let other = server
        .post(&format!("/api/v1/rooms/{room_id}/threads"))
        .add_header(AUTHORIZATION, format!("Bearer {owner_token}"))
        .json(&serde_json::json!({ "title": "Other thread", "body": "Elsewhere" }))
        .await;
    let other: serde_json::Value = other.json();
    let other_id = other["id"].as_i64().unwrap();

    let foreign = server
        .post(&format!("/api/v1/threads/{other_id}/replies"))
        .add_header(AUTHORIZATION, format!("Bearer {owner_token}"))
        .json(&serde_json::json!({ "body": "Foreign parent" }))
        .await;
    let foreign: serde_json::Value = foreign.json();

    let resp = server
        .post(&format!("/api/v1/threads/{thread_id}/replies"))
        .add_header(AUTHORIZATION, format!("Bearer {owner_token}"))
        .json(&serde_json::json!({ "body": "Nested?", "parent_id": foreign["id"] }))
        .await;
    resp.assert_status(StatusCode::BAD_REQUEST);
    let body: serde_json::Value = resp.json();
    assert_eq!(body["error"]["code"], "BAD_REQUEST");

    let resp = server
        .post(&format!("/api/v1/threads/{thread_id}/replies"))
        .add_header(AUTHORIZATION, format!("Bearer {owner_token}"))
        .json(&serde_json::json!({ "body": "Orphan", "parent_id": 123456789 }))
        .await;
    resp.assert_status(StatusCode::BAD_REQUEST);

    common::cleanup_community(&state.db, community["id"].as_str().unwrap()).await;
    common::cleanup_user(&state.db, &owner_id).await;
}

#[tokio::test]
async fn reply_body_is_validated() {
    let state = common::test_state().await;
    let server = common::test_server(&state);
    let (owner_id, owner_token, community, thread_id) = setup_thread(&state, &server).await;

    let resp = server
        .post(&format!("/api/v1/threads/{thread_id}/replies"))
        .add_header(AUTHORIZATION, format!("Bearer {owner_token}"))
        .json(&serde_json::json!({ "body": "   " }))
        .await;
    resp.assert_status(StatusCode::BAD_REQUEST);

    let resp = server
        .post(&format!("/api/v1/threads/{thread_id}/replies"))
        .add_header(AUTHORIZATION, format!("Bearer {owner_token}"))
        .json(&serde_json::json!({ "body": "x".repeat(4001) }))
        .await;
    resp.assert_status(StatusCode::BAD_REQUEST);
    let body: serde_json::Value = resp.json();
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

    common::cleanup_community(&state.db, community["id"].as_str().unwrap()).await;
    common::cleanup_user(&state.db, &owner_id).await;
}

#[tokio::test]
async fn reply_requires_room_access() {
    let state = common::test_state().await;
    let server = common::test_server(&state);
    let (owner_id, owner_token, community, _thread_id) = setup_thread(&state, &server).await;
    let community_id = community["id"].as_str().unwrap();
    let advanced_room = common::room_of_kind(&community, "advanced_discussion");

    let advanced = server
        .post(&format!("/api/v1/rooms/{advanced_room}/threads"))
        .add_header(AUTHORIZATION, format!("Bearer {owner_token}"))
        .json(&serde_json::json!({ "title": "Experts only", "body": "Shh" }))
        .await;
    let advanced: serde_json::Value = advanced.json();
    let advanced_id = advanced["id"].as_i64().unwrap();

    let beginner_id = common::seed_user(&state.db, "Newbie", "normal").await;
    common::seed_membership(&state.db, community_id, &beginner_id, "beginner").await;
    let beginner_token = common::bearer(&state, &beginner_id);

    let resp = server
        .post(&format!("/api/v1/threads/{advanced_id}/replies"))
        .add_header(AUTHORIZATION, format!("Bearer {beginner_token}"))
        .json(&serde_json::json!({ "body": "Can I join?" }))
        .await;
    resp.assert_status(StatusCode::FORBIDDEN);

    common::cleanup_community(&state.db, community_id).await;
    common::cleanup_user(&state.db, &owner_id).await;
    common::cleanup_user(&state.db, &beginner_id).await;
}

// ---------------------------------------------------------------------------
// DELETE /api/v1/replies/{id}
// ---------------------------------------------------------------------------

#[tokio::test]
async fn delete_reply_owner_and_admin_only() {
    let state = common::test_state().await;
    let server = common::test_server(&state);
    let (owner_id, owner_token, community, thread_id) = setup_thread(&state, &server).await;
    let community_id = community["id"].as_str().unwrap();

    let member_id = common::seed_user(&state.db, "Member", "normal").await;
    common::seed_membership(&state.db, community_id, &member_id, "both").await;
    let member_token = common::bearer(&state, &member_id);

    let reply = server
        .post(&format!("/api/v1/threads/{thread_id}/replies"))
        .add_header(AUTHORIZATION, format!("Bearer {member_token}"))
        .json(&serde_json::json!({ "body": "Mine to delete" }))
        .await;
    let reply: serde_json::Value = reply.json();
    let reply_id = reply["id"].as_i64().unwrap();

    // The thread owner is not the reply owner and not an admin.
    let resp = server
        .delete(&format!("/api/v1/replies/{reply_id}"))
        .add_header(AUTHORIZATION, format!("Bearer {owner_token}"))
        .await;
    resp.assert_status(StatusCode::FORBIDDEN);

    let resp = server
        .delete(&format!("/api/v1/replies/{reply_id}"))
        .add_header(AUTHORIZATION, format!("Bearer {member_token}"))
        .await;
    resp.assert_status(StatusCode::NO_CONTENT);

    let detail = server
        .get(&format!("/api/v1/threads/{thread_id}"))
        .add_header(AUTHORIZATION, format!("Bearer {member_token}"))
        .await;
    let detail: serde_json::Value = detail.json();
    assert_eq!(detail["replies"], 0);

    // Admins can remove other people's replies.
    let second = server
        .post(&format!("/api/v1/threads/{thread_id}/replies"))
        .add_header(AUTHORIZATION, format!("Bearer {member_token}"))
        .json(&serde_json::json!({ "body": "Spam" }))
        .await;
    let second: serde_json::Value = second.json();

    let admin_id = common::seed_user(&state.db, "Moderator", "admin").await;
    let admin_token = common::bearer(&state, &admin_id);
    let resp = server
        .delete(&format!("/api/v1/replies/{}", second["id"]))
        .add_header(AUTHORIZATION, format!("Bearer {admin_token}"))
        .await;
    resp.assert_status(StatusCode::NO_CONTENT);

    let resp = server
        .delete("/api/v1/replies/424242424242")
        .add_header(AUTHORIZATION, format!("Bearer {admin_token}"))
        .await;
    resp.assert_status(StatusCode::NOT_FOUND);

    common::cleanup_community(&state.db, community_id).await;
    common::cleanup_user(&state.db, &owner_id).await;
    common::cleanup_user(&state.db, &member_id).await;
    common::cleanup_user(&state.db, &admin_id).await;
}
