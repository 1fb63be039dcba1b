use crate::application::services::post_search::PostSearchIndex;
use crate::domain::entities::{Post, PostChange, PostPatch};
use crate::shared::config::SearchConfig;
use crate::shared::error::ForumError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadState {
    #[default]
    Idle,
    Loading,
    Ready,
    Error,
}

/// 描画用のストアのスナップショット
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForumSnapshot {
    pub posts: Vec<Post>,
    pub search_results: Vec<Post>,
    pub search_query: String,
    pub load_state: LoadState,
    #[serde(serialize_with = "serialize_error")]
    pub error: Option<ForumError>,
    pub version: u64,
}

impl ForumSnapshot {
    pub fn loading(&self) -> bool {
        self.load_state == LoadState::Loading
    }

    /// 検索中は検索結果、それ以外は全件
    pub fn visible_posts(&self) -> &[Post] {
        if self.search_query.trim().is_empty() {
            &self.posts
        } else {
            &self.search_results
        }
    }
}

fn serialize_error<S: serde::Serializer>(
    error: &Option<ForumError>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match error {
        Some(err) => serializer.serialize_some(&err.message),
        None => serializer.serialize_none(),
    }
}

/// クライアント側のフォーラム状態
///
/// 一覧への変更はすべてこの型を経由し、検索結果とバージョンを同期させる。
pub(crate) struct ForumState {
    posts: Vec<Post>,
    search_query: String,
    search_results: Vec<Post>,
    load_state: LoadState,
    error: Option<ForumError>,
    version: u64,
    index: Option<PostSearchIndex>,
    search_options: SearchConfig,
}

impl ForumState {
    pub(crate) fn new(search_options: SearchConfig) -> Self {
        Self {
            posts: Vec::new(),
            search_query: String::new(),
            search_results: Vec::new(),
            load_state: LoadState::Idle,
            error: None,
            version: 0,
            index: None,
            search_options,
        }
    }

    pub(crate) fn posts(&self) -> &[Post] {
        &self.posts
    }

    pub(crate) fn post(&self, id: &str) -> Option<&Post> {
        self.posts.iter().find(|post| post.id == id)
    }

    pub(crate) fn load_state(&self) -> LoadState {
        self.load_state
    }

    pub(crate) fn error(&self) -> Option<&ForumError> {
        self.error.as_ref()
    }

    pub(crate) fn snapshot(&self) -> ForumSnapshot {
        ForumSnapshot {
            posts: self.posts.clone(),
            search_results: self.search_results.clone(),
            search_query: self.search_query.clone(),
            load_state: self.load_state,
            error: self.error.clone(),
            version: self.version,
        }
    }

    pub(crate) fn begin_loading(&mut self) {
        self.load_state = LoadState::Loading;
    }

    pub(crate) fn finish_loading(&mut self, posts: Vec<Post>) {
        let mut seen = HashSet::with_capacity(posts.len());
        self.posts = posts
            .into_iter()
            .filter(|post| seen.insert(post.id.clone()))
            .collect();
        self.load_state = LoadState::Ready;
        self.error = None;
        self.collection_changed();
    }

    pub(crate) fn fail_loading(&mut self, error: ForumError) {
        self.load_state = LoadState::Error;
        self.error = Some(error);
    }

    pub(crate) fn record_error(&mut self, error: ForumError) {
        self.error = Some(error);
    }

    pub(crate) fn clear_error(&mut self) {
        self.error = None;
    }

    /// 同じIDがなければ`created_at`の降順を保つ位置に挿入する。挿入したかを返す
    pub(crate) fn insert_if_absent(&mut self, post: Post) -> bool {
        if self.post(&post.id).is_some() {
            return false;
        }
        let position = self
            .posts
            .partition_point(|existing| existing.created_at > post.created_at);
        self.posts.insert(position, post);
        self.collection_changed();
        true
    }

    /// 正規レコードを該当エントリにマージして返す。該当がなければ`None`
    pub(crate) fn merge_canonical(&mut self, canonical: Post) -> Option<Post> {
        let existing = self.posts.iter_mut().find(|post| post.id == canonical.id)?;
        existing.merge_canonical(canonical);
        let merged = existing.clone();
        self.collection_changed();
        Some(merged)
    }

    pub(crate) fn apply_patch(
        &mut self,
        id: &str,
        patch: &PostPatch,
        updated_at: Option<DateTime<Utc>>,
    ) -> bool {
        let Some(existing) = self.posts.iter_mut().find(|post| post.id == id) else {
            return false;
        };
        patch.apply_to(existing);
        if let Some(updated_at) = updated_at {
            existing.updated_at = updated_at;
        }
        self.collection_changed();
        true
    }

    pub(crate) fn remove(&mut self, id: &str) -> bool {
        let before = self.posts.len();
        self.posts.retain(|post| post.id != id);
        if self.posts.len() == before {
            return false;
        }
        self.collection_changed();
        true
    }

    /// 変更フィードのイベントを1件反映する。一覧が変化したかを返す
    pub(crate) fn apply_change(&mut self, change: PostChange) -> bool {
        match change {
            PostChange::Inserted(post) => self.insert_if_absent(post),
            PostChange::Updated {
                id,
                fields,
                updated_at,
            } => self.apply_patch(&id, &fields, updated_at),
            PostChange::Deleted { id } => self.remove(&id),
        }
    }

    pub(crate) fn search(&mut self, query: &str) -> Vec<Post> {
        self.search_query = if query.trim().is_empty() {
            String::new()
        } else {
            query.to_string()
        };
        self.refresh_search();
        self.search_results.clone()
    }

    fn collection_changed(&mut self) {
        self.version += 1;
        self.refresh_search();
    }

    fn refresh_search(&mut self) {
        if self.search_query.trim().is_empty() {
            self.search_results = self.posts.clone();
            return;
        }

        let stale = self
            .index
            .as_ref()
            .map_or(true, |index| index.version() != self.version);
        if stale {
            self.index = Some(PostSearchIndex::build(
                &self.posts,
                self.version,
                self.search_options.clone(),
            ));
        }

        if let Some(index) = self.index.as_mut() {
            self.search_results = index.search(&self.search_query);
        }
    }
}
