use std::collections::HashSet;

use diesel::prelude::*;
use diesel::result::OptionalExtension;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::db::pool::DbPool;
use crate::db::schema::{memberships, users};
use crate::error::ApiError;

/// Room category. Stored as its snake_case string in `rooms.kind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RoomKind {
    GeneralDiscussion,
    AdvancedDiscussion,
    JobPostings,
}

impl RoomKind {
    pub const ALL: [RoomKind; 3] = [
        RoomKind::GeneralDiscussion,
        RoomKind::AdvancedDiscussion,
        RoomKind::JobPostings,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RoomKind::GeneralDiscussion => "general_discussion",
            RoomKind::AdvancedDiscussion => "advanced_discussion",
            RoomKind::JobPostings => "job_postings",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "general_discussion" => Some(RoomKind::GeneralDiscussion),
            "advanced_discussion" => Some(RoomKind::AdvancedDiscussion),
            "job_postings" => Some(RoomKind::JobPostings),
            _ => None,
        }
    }

    /// Default display name for the auto-provisioned room of this kind.
    pub fn default_room_name(&self) -> &'static str {
        match self {
            RoomKind::GeneralDiscussion => "General Discussion",
            RoomKind::AdvancedDiscussion => "Advanced Discussion",
            RoomKind::JobPostings => "Job Postings",
        }
    }
}

/// Membership tier within one community. Stored in `memberships.level`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum MembershipLevel {
    Beginner,
    Advanced,
    Both,
    JobOnly,
}

impl MembershipLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            MembershipLevel::Beginner => "beginner",
            MembershipLevel::Advanced => "advanced",
            MembershipLevel::Both => "both",
            MembershipLevel::JobOnly => "job_only",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "beginner" => Some(MembershipLevel::Beginner),
            "advanced" => Some(MembershipLevel::Advanced),
            "both" => Some(MembershipLevel::Both),
            "job_only" => Some(MembershipLevel::JobOnly),
            _ => None,
        }
    }
}

/// Account category. Stored in `users.kind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum UserKind {
    Normal,
    Organization,
    Admin,
}

impl UserKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserKind::Normal => "normal",
            UserKind::Organization => "organization",
            UserKind::Admin => "admin",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "normal" => Some(UserKind::Normal),
            "organization" => Some(UserKind::Organization),
            "admin" => Some(UserKind::Admin),
            _ => None,
        }
    }
}

/// Room kinds a member may list, post to, and subscribe to.
///
/// Organization accounts see only the job postings room no matter which
/// level they joined at. Everyone else always gets job postings, with the
/// discussion rooms added according to level.
pub fn allowed_room_kinds(level: MembershipLevel, kind: UserKind) -> HashSet<RoomKind> {
    if kind == UserKind::Organization {
        return HashSet::from([RoomKind::JobPostings]);
    }

    let mut kinds = HashSet::from([RoomKind::JobPostings]);
    match level {
        MembershipLevel::Beginner => {
            kinds.insert(RoomKind::GeneralDiscussion);
        }
        MembershipLevel::Advanced => {
            kinds.insert(RoomKind::AdvancedDiscussion);
        }
        MembershipLevel::Both => {
            kinds.insert(RoomKind::GeneralDiscussion);
            kinds.insert(RoomKind::AdvancedDiscussion);
        }
        MembershipLevel::JobOnly => {}
    }
    kinds
}

/// Membership level + account kind for a user in a community, in one query.
pub struct AccessProfile {
    pub level: MembershipLevel,
    pub user_kind: UserKind,
}

impl AccessProfile {
    pub fn allowed_kinds(&self) -> HashSet<RoomKind> {
        allowed_room_kinds(self.level, self.user_kind)
    }
}

/// Load the caller's membership in a community, joined with their user row.
///
/// Fails with 403 when no membership exists.
pub async fn require_member(
    pool: &DbPool,
    community_id: &str,
    user_id: &str,
) -> Result<AccessProfile, ApiError> {
    let mut conn = pool.get().await?;

    let row: Option<(String, String)> = diesel_async::RunQueryDsl::get_result(
        memberships::table
            .inner_join(users::table)
            .filter(memberships::community_id.eq(community_id))
            .filter(memberships::user_id.eq(user_id))
            .select((memberships::level, users::kind)),
        &mut conn,
    )
    .await
    .optional()?;

    let (level, user_kind) =
        row.ok_or_else(|| ApiError::forbidden("You are not a member of this community"))?;

    Ok(AccessProfile {
        level: MembershipLevel::parse(&level)
            .ok_or_else(|| ApiError::internal("Unknown membership level"))?,
        user_kind: UserKind::parse(&user_kind)
            .ok_or_else(|| ApiError::internal("Unknown user kind"))?,
    })
}

/// Check that the caller may use a room of the given kind.
///
/// Requests targeting a kind outside the allowed set fail with 403; results
/// are never silently filtered down to the permitted subset.
pub async fn require_room_access(
    pool: &DbPool,
    community_id: &str,
    room_kind: RoomKind,
    user_id: &str,
) -> Result<AccessProfile, ApiError> {
    let profile = require_member(pool, community_id, user_id).await?;

    if !profile.allowed_kinds().contains(&room_kind) {
        return Err(ApiError::forbidden(
            "This room is not available at your membership level",
        ));
    }

    Ok(profile)
}

/// Whether the user holds an admin account.
pub async fn is_admin(pool: &DbPool, user_id: &str) -> Result<bool, ApiError> {
    let mut conn = pool.get().await?;

    let kind: Option<String> = diesel_async::RunQueryDsl::get_result(
        users::table.find(user_id).select(users::kind),
        &mut conn,
    )
    .await
    .optional()?;

    Ok(kind.as_deref() == Some("admin"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(level: MembershipLevel, kind: UserKind) -> HashSet<RoomKind> {
        allowed_room_kinds(level, kind)
    }

    #[test]
    fn beginner_gets_general_and_jobs() {
        assert_eq!(
            kinds(MembershipLevel::Beginner, UserKind::Normal),
            HashSet::from([RoomKind::GeneralDiscussion, RoomKind::JobPostings]),
        );
    }

    #[test]
    fn advanced_gets_advanced_and_jobs() {
        assert_eq!(
            kinds(MembershipLevel::Advanced, UserKind::Normal),
            HashSet::from([RoomKind::AdvancedDiscussion, RoomKind::JobPostings]),
        );
    }

    #[test]
    fn both_gets_every_kind() {
        assert_eq!(
            kinds(MembershipLevel::Both, UserKind::Normal),
            HashSet::from([
                RoomKind::GeneralDiscussion,
                RoomKind::AdvancedDiscussion,
                RoomKind::JobPostings,
            ]),
        );
    }

    #[test]
    fn job_only_gets_jobs_alone() {
        assert_eq!(
            kinds(MembershipLevel::JobOnly, UserKind::Normal),
            HashSet::from([RoomKind::JobPostings]),
        );
    }

    #[test]
    fn organization_is_restricted_to_jobs_at_every_level() {
        for level in [
            MembershipLevel::Beginner,
            MembershipLevel::Advanced,
            MembershipLevel::Both,
            MembershipLevel::JobOnly,
        ] {
            assert_eq!(
                kinds(level, UserKind::Organization),
                HashSet::from([RoomKind::JobPostings]),
                "level {level:?}",
            );
        }
    }

    #[test]
    fn admin_accounts_follow_their_level() {
        assert_eq!(
            kinds(MembershipLevel::Beginner, UserKind::Admin),
            kinds(MembershipLevel::Beginner, UserKind::Normal),
        );
    }

    #[test]
    fn non_organization_always_includes_jobs() {
        for level in [
            MembershipLevel::Beginner,
            MembershipLevel::Advanced,
            MembershipLevel::Both,
            MembershipLevel::JobOnly,
        ] {
            assert!(kinds(level, UserKind::Normal).contains(&RoomKind::JobPostings));
        }
    }

    #[test]
    fn unknown_strings_are_rejected() {
        assert_eq!(RoomKind::parse("lounge"), None);
        assert_eq!(MembershipLevel::parse("expert"), None);
        assert_eq!(UserKind::parse("bot"), None);
    }
}
