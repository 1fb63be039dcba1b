use super::post::{Post, PostPatch};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

impl ChangeKind {
    pub const ALL: [ChangeKind; 3] = [ChangeKind::Insert, ChangeKind::Update, ChangeKind::Delete];
}

/// 投稿コレクションのリアルタイムチャネルで配信されるイベント
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PostChange {
    Inserted(Post),
    Updated {
        id: String,
        fields: PostPatch,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        updated_at: Option<DateTime<Utc>>,
    },
    Deleted {
        id: String,
    },
}

impl PostChange {
    pub fn kind(&self) -> ChangeKind {
        match self {
            PostChange::Inserted(_) => ChangeKind::Insert,
            PostChange::Updated { .. } => ChangeKind::Update,
            PostChange::Deleted { .. } => ChangeKind::Delete,
        }
    }

    pub fn post_id(&self) -> &str {
        match self {
            PostChange::Inserted(post) => &post.id,
            PostChange::Updated { id, .. } | PostChange::Deleted { id } => id,
        }
    }
}
