use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::Serialize;
use utoipa::ToSchema;

use crate::db::schema::replies;

#[derive(Debug, Clone, Queryable, Selectable, Serialize, ToSchema)]
#[diesel(table_name = replies)]
pub struct Reply {
    pub id: i64,
    pub thread_id: i64,
    pub body: String,
    pub created_by: Option<String>,
    pub parent_id: Option<i64>,
    pub promoted: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = replies)]
pub struct NewReply<'a> {
    pub id: i64,
    pub thread_id: i64,
    pub body: &'a str,
    pub created_by: Option<&'a str>,
    pub parent_id: Option<i64>,
    pub promoted: bool,
    pub created_at: DateTime<Utc>,
}

/// One node of the serialized reply tree.
#[derive(Debug, Serialize, ToSchema)]
pub struct ReplyNode {
    #[serde(flatten)]
    pub reply: Reply,
    pub creator_name: Option<String>,
    pub likes: i64,
    pub liked_by_me: bool,
    #[schema(no_recursion)]
    pub children: Vec<ReplyNode>,
}

/// Assemble the full reply tree for one thread.
///
/// Siblings are ordered by star count descending, then by creation time.
/// The tree renders to arbitrary depth; replies whose parent is missing
/// from the input are dropped.
pub fn build_reply_tree(
    replies: Vec<Reply>,
    names: &HashMap<String, String>,
    star_counts: &HashMap<i64, i64>,
    starred_by_caller: &HashSet<i64>,
) -> Vec<ReplyNode> {
    let mut by_parent: HashMap<Option<i64>, Vec<Reply>> = HashMap::new();
    for reply in replies {
        by_parent.entry(reply.parent_id).or_default().push(reply);
    }
    attach(None, &mut by_parent, names, star_counts, starred_by_caller)
}

fn attach(
    parent: Option<i64>,
    by_parent: &mut HashMap<Option<i64>, Vec<Reply>>,
    names: &HashMap<String, String>,
    star_counts: &HashMap<i64, i64>,
    starred_by_caller: &HashSet<i64>,
) -> Vec<ReplyNode> {
    let mut nodes: Vec<ReplyNode> = by_parent
        .remove(&parent)
        .unwrap_or_default()
        .into_iter()
        .map(|reply| {
            let children = attach(
                Some(reply.id),
                by_parent,
                names,
                star_counts,
                starred_by_caller,
            );
            ReplyNode {
                creator_name: reply
                    .created_by
                    .as_deref()
                    .and_then(|id| names.get(id).cloned()),
                likes: star_counts.get(&reply.id).copied().unwrap_or(0),
                liked_by_me: starred_by_caller.contains(&reply.id),
                children,
                reply,
            }
        })
        .collect();

    nodes.sort_by(|a, b| {
        b.likes
            .cmp(&a.likes)
            .then_with(|| a.reply.created_at.cmp(&b.reply.created_at))
    });
    nodes
}
