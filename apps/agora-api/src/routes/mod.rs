pub mod alerts;
pub mod communities;
pub mod health;
pub mod members;
pub mod replies;
pub mod rooms;
pub mod stars;
pub mod threads;

use axum::Router;
use utoipa::openapi::security::{Http, HttpAuthScheme, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(crate::realtime::gateway::router())
        .nest(
            "/api/v1",
            communities::router()
                .merge(members::router())
                .merge(rooms::router())
                .merge(threads::router())
                .merge(replies::router())
                .merge(stars::router())
                .merge(alerts::router()),
        )
}

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        // Health
        health::health,
        // Communities
        communities::create_community,
        communities::list_communities,
        communities::get_community,
        // Members
        members::join_community,
        members::leave_community,
        members::list_my_communities,
        // Rooms
        rooms::list_rooms,
        rooms::create_room,
        // Threads
        threads::create_thread,
        threads::list_threads,
        threads::get_thread,
        threads::update_thread,
        threads::delete_thread,
        // Replies
        replies::create_reply,
        replies::delete_reply,
        // Stars
        stars::toggle_star,
        // Alerts
        alerts::list_alerts,
        alerts::mark_read,
        alerts::mark_all_read,
    ),
    components(
        schemas(
            // Error types
            crate::error::ApiErrorBody,
            crate::error::ApiErrorDetail,
            crate::error::FieldError,
            // Access enums
            crate::access::RoomKind,
            crate::access::MembershipLevel,
            crate::access::UserKind,
            // Models
            crate::models::community::Community,
            crate::models::community::CommunityResponse,
            crate::models::room::Room,
            crate::models::membership::Membership,
            crate::models::membership::JoinedCommunity,
            crate::models::thread::Thread,
            crate::models::thread::ThreadSummary,
            crate::models::thread::ThreadDetail,
            crate::models::reply::Reply,
            crate::models::reply::ReplyNode,
            crate::models::star::Star,
            crate::models::alert::Alert,
            // Route request/response types
            health::HealthResponse,
            communities::CreateCommunityRequest,
            members::JoinCommunityRequest,
            rooms::CreateRoomRequest,
            threads::CreateThreadRequest,
            threads::UpdateThreadRequest,
            replies::CreateReplyRequest,
            stars::ToggleStarRequest,
            alerts::ReadAllResponse,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check"),
        (name = "Communities", description = "Community management"),
        (name = "Members", description = "Community membership"),
        (name = "Rooms", description = "Rooms within a community"),
        (name = "Threads", description = "Discussion threads"),
        (name = "Replies", description = "Threaded replies"),
        (name = "Stars", description = "Stars on threads and replies"),
        (name = "Alerts", description = "Per-user alerts"),
    )
)]
pub struct ApiDoc;
