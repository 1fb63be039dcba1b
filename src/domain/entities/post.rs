use super::user::User;
use crate::shared::error::AppError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 一覧取得時に結合される著者情報
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PostAuthor {
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Post {
    pub id: String,
    pub title: String,
    pub content: String,
    pub author_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<PostAuthor>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub likes: u32,
    pub views: u32,
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replies_count: Option<u32>,
}

impl Post {
    pub fn new_with_id(
        id: String,
        title: String,
        content: String,
        author_id: String,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            title,
            content,
            author_id,
            author: None,
            created_at,
            updated_at: created_at,
            likes: 0,
            views: 0,
            tags: Vec::new(),
            replies_count: None,
        }
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    /// リモートから返された正規レコードで行の値を置き換える
    ///
    /// 正規レコードに結合フィールドがなければ既存の値を残す。
    pub fn merge_canonical(&mut self, canonical: Post) {
        let Post {
            id: _,
            title,
            content,
            author_id,
            author,
            created_at: _,
            updated_at,
            likes,
            views,
            tags,
            replies_count,
        } = canonical;

        self.title = title;
        self.content = content;
        self.author_id = author_id;
        self.updated_at = updated_at;
        self.likes = likes;
        self.views = views;
        self.tags = tags;
        if author.is_some() {
            self.author = author;
        }
        if replies_count.is_some() {
            self.replies_count = replies_count;
        }
    }
}

/// 著者未設定の投稿フォーム内容
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PostDraft {
    pub title: String,
    pub content: String,
    pub tags: Vec<String>,
}

impl PostDraft {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            tags: Vec::new(),
        }
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    /// 著者を設定。未サインインなら`Unauthorized`
    pub fn authored_by(self, user: Option<&User>) -> Result<NewPost, AppError> {
        let user = user.ok_or_else(|| {
            AppError::Unauthorized("a signed-in user is required to post".to_string())
        })?;
        Ok(NewPost {
            title: self.title,
            content: self.content,
            tags: self.tags,
            author_id: user.id.clone(),
        })
    }
}

/// リモートストアに送る作成ペイロード
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewPost {
    pub title: String,
    pub content: String,
    pub tags: Vec<String>,
    pub author_id: String,
}

/// 更新リクエストと更新イベントで使う部分フィールド
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PostPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub likes: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub views: Option<u32>,
}

impl PostPatch {
    pub fn likes(likes: u32) -> Self {
        Self {
            likes: Some(likes),
            ..Self::default()
        }
    }

    pub fn views(views: u32) -> Self {
        Self {
            views: Some(views),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.content.is_none()
            && self.tags.is_none()
            && self.likes.is_none()
            && self.views.is_none()
    }

    /// パッチに含まれるフィールドだけを書き込む
    pub fn apply_to(&self, post: &mut Post) {
        if let Some(title) = &self.title {
            post.title = title.clone();
        }
        if let Some(content) = &self.content {
            post.content = content.clone();
        }
        if let Some(tags) = &self.tags {
            post.tags = tags.clone();
        }
        if let Some(likes) = self.likes {
            post.likes = likes;
        }
        if let Some(views) = self.views {
            post.views = views;
        }
    }
}
