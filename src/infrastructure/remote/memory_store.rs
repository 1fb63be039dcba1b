use crate::application::ports::{ChangeChannel, PostOrder, PostRemoteStore};
use crate::domain::entities::{ChangeKind, NewPost, Post, PostAuthor, PostChange, PostPatch, User};
use crate::shared::config::RemoteConfig;
use crate::shared::error::AppError;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, warn};
use uuid::Uuid;

/// 失敗を注入できるリモート操作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteOperation {
    List,
    Insert,
    Update,
    Delete,
    Subscribe,
    CloseChannel,
}

struct ChannelEntry {
    sender: mpsc::Sender<PostChange>,
    kinds: Vec<ChangeKind>,
}

#[derive(Default)]
struct RemoteState {
    posts: HashMap<String, Post>,
    replies: HashMap<String, u32>,
    users: HashMap<String, User>,
    channels: HashMap<String, ChannelEntry>,
    failures: HashMap<RemoteOperation, String>,
    next_channel: u64,
}

impl RemoteState {
    fn take_failure(&mut self, operation: RemoteOperation) -> Result<(), AppError> {
        match self.failures.remove(&operation) {
            Some(message) => Err(AppError::Network(message)),
            None => Ok(()),
        }
    }

    /// 開いている全チャネルへ変更を配信する
    fn publish(&mut self, change: PostChange) {
        let kind = change.kind();
        let mut closed = Vec::new();

        for (channel_id, entry) in &self.channels {
            if !entry.kinds.contains(&kind) {
                continue;
            }
            match entry.sender.try_send(change.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(channel_id = %channel_id, ?kind, "change channel full, event dropped");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    closed.push(channel_id.clone());
                }
            }
        }

        for channel_id in closed {
            debug!(channel_id = %channel_id, "pruning closed change channel");
            self.channels.remove(&channel_id);
        }
    }

    fn joined(&self, post: &Post) -> Post {
        let mut joined = post.clone();
        joined.author = self.users.get(&post.author_id).map(|user| PostAuthor {
            email: user.email.clone(),
        });
        joined.replies_count = Some(self.replies.get(&post.id).copied().unwrap_or(0));
        joined
    }
}

/// インメモリのリモートストア実装
///
/// 行の保存、ID・タイムスタンプの採番、変更フィードの配信を行う。
/// ハーネスと結合テストで利用する。
#[derive(Clone)]
pub struct InMemoryRemoteStore {
    config: RemoteConfig,
    state: Arc<RwLock<RemoteState>>,
}

impl InMemoryRemoteStore {
    pub fn new(config: RemoteConfig) -> Self {
        Self {
            config,
            state: Arc::new(RwLock::new(RemoteState::default())),
        }
    }

    pub fn collection(&self) -> &str {
        &self.config.collection
    }

    /// 著者情報の結合に使うユーザーを登録
    pub async fn register_user(&self, user: User) {
        self.state.write().await.users.insert(user.id.clone(), user);
    }

    /// 返信数を1増やす。変更フィードには配信しない
    pub async fn add_reply(&self, post_id: &str) -> Result<u32, AppError> {
        let mut state = self.state.write().await;
        if !state.posts.contains_key(post_id) {
            return Err(AppError::NotFound(format!("post {post_id}")));
        }
        let count = state.replies.entry(post_id.to_string()).or_insert(0);
        *count += 1;
        Ok(*count)
    }

    /// 次回の`operation`呼び出しを一度だけ失敗させる
    pub async fn fail_next(&self, operation: RemoteOperation, message: impl Into<String>) {
        self.state
            .write()
            .await
            .failures
            .insert(operation, message.into());
    }

    pub async fn post_count(&self) -> usize {
        self.state.read().await.posts.len()
    }

    pub async fn open_channels(&self) -> usize {
        self.state.read().await.channels.len()
    }
}

impl Default for InMemoryRemoteStore {
    fn default() -> Self {
        Self::new(RemoteConfig::default())
    }
}

#[async_trait]
impl PostRemoteStore for InMemoryRemoteStore {
    async fn list(&self, order: PostOrder) -> Result<Vec<Post>, AppError> {
        let mut state = self.state.write().await;
        state.take_failure(RemoteOperation::List)?;

        let mut posts: Vec<Post> = state.posts.values().map(|post| state.joined(post)).collect();
        posts.sort_by(|a, b| match order {
            PostOrder::CreatedAtDesc => b
                .created_at
                .cmp(&a.created_at)
                .then_with(|| a.id.cmp(&b.id)),
            PostOrder::CreatedAtAsc => a
                .created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.cmp(&b.id)),
        });
        Ok(posts)
    }

    async fn insert(&self, new_post: &NewPost) -> Result<Post, AppError> {
        let mut state = self.state.write().await;
        state.take_failure(RemoteOperation::Insert)?;

        if new_post.title.trim().is_empty() {
            return Err(AppError::ValidationError(
                "title must not be empty".to_string(),
            ));
        }

        let post = Post::new_with_id(
            Uuid::new_v4().to_string(),
            new_post.title.clone(),
            new_post.content.clone(),
            new_post.author_id.clone(),
            Utc::now(),
        )
        .with_tags(new_post.tags.clone());

        state.posts.insert(post.id.clone(), post.clone());
        debug!(collection = %self.config.collection, post_id = %post.id, "row inserted");
        state.publish(PostChange::Inserted(post.clone()));
        Ok(post)
    }

    async fn update(&self, id: &str, patch: &PostPatch) -> Result<Post, AppError> {
        let mut state = self.state.write().await;
        state.take_failure(RemoteOperation::Update)?;

        let now = Utc::now();
        let updated = {
            let post = state
                .posts
                .get_mut(id)
                .ok_or_else(|| AppError::NotFound(format!("post {id}")))?;
            patch.apply_to(post);
            post.updated_at = now;
            post.clone()
        };

        debug!(collection = %self.config.collection, post_id = %id, "row updated");
        state.publish(PostChange::Updated {
            id: id.to_string(),
            fields: patch.clone(),
            updated_at: Some(now),
        });
        Ok(updated)
    }

    async fn delete(&self, id: &str) -> Result<(), AppError> {
        let mut state = self.state.write().await;
        state.take_failure(RemoteOperation::Delete)?;

        if state.posts.remove(id).is_none() {
            debug!(post_id = %id, "delete of absent row");
            return Ok(());
        }
        state.replies.remove(id);
        debug!(collection = %self.config.collection, post_id = %id, "row deleted");
        state.publish(PostChange::Deleted { id: id.to_string() });
        Ok(())
    }

    async fn subscribe(&self, kinds: &[ChangeKind]) -> Result<ChangeChannel, AppError> {
        let mut state = self.state.write().await;
        state.take_failure(RemoteOperation::Subscribe)?;

        if self.config.channel_capacity == 0 {
            return Err(AppError::ConfigurationError(
                "channel capacity must be positive".to_string(),
            ));
        }

        state.next_channel += 1;
        let channel_id = format!("{}-{}", self.config.channel_name, state.next_channel);
        let (sender, events) = mpsc::channel(self.config.channel_capacity);
        state.channels.insert(
            channel_id.clone(),
            ChannelEntry {
                sender,
                kinds: kinds.to_vec(),
            },
        );
        debug!(channel_id = %channel_id, ?kinds, "change channel opened");

        Ok(ChangeChannel {
            id: channel_id,
            events,
        })
    }

    async fn close_channel(&self, channel_id: &str) -> Result<(), AppError> {
        let mut state = self.state.write().await;
        state.take_failure(RemoteOperation::CloseChannel)?;

        if state.channels.remove(channel_id).is_some() {
            debug!(channel_id = %channel_id, "change channel closed");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_post(title: &str) -> NewPost {
        NewPost {
            title: title.to_string(),
            content: "本文".to_string(),
            tags: vec!["budget".to_string()],
            author_id: "u1".to_string(),
        }
    }

    #[tokio::test]
    async fn insert_assigns_id_and_timestamps() {
        let store = InMemoryRemoteStore::default();

        let post = store.insert(&new_post("Budget régional 2024")).await.unwrap();

        assert!(Uuid::parse_str(&post.id).is_ok());
        assert_eq!(post.created_at, post.updated_at);
        assert_eq!(post.likes, 0);
        assert_eq!(post.tags, vec!["budget".to_string()]);
        assert!(post.author.is_none());
        assert_eq!(store.post_count().await, 1);
    }

    #[tokio::test]
    async fn insert_rejects_blank_title() {
        let store = InMemoryRemoteStore::default();

        let err = store.insert(&new_post("   ")).await.unwrap_err();

        assert!(matches!(err, AppError::ValidationError(_)));
        assert_eq!(store.post_count().await, 0);
    }

    #[tokio::test]
    async fn list_joins_author_and_replies() {
        let store = InMemoryRemoteStore::default();
        store.register_user(User::new("u1", "amina@example.org")).await;
        let post = store.insert(&new_post("A")).await.unwrap();
        store.add_reply(&post.id).await.unwrap();
        store.add_reply(&post.id).await.unwrap();

        let listed = store.list(PostOrder::CreatedAtDesc).await.unwrap();

        assert_eq!(listed.len(), 1);
        assert_eq!(
            listed[0].author.as_ref().map(|a| a.email.as_str()),
            Some("amina@example.org")
        );
        assert_eq!(listed[0].replies_count, Some(2));
    }

    #[tokio::test]
    async fn update_unknown_id_is_not_found() {
        let store = InMemoryRemoteStore::default();

        let err = store.update("missing", &PostPatch::likes(1)).await.unwrap_err();

        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn delete_absent_row_succeeds() {
        let store = InMemoryRemoteStore::default();
        assert!(store.delete("missing").await.is_ok());
    }

    #[tokio::test]
    async fn subscribers_receive_requested_kinds_only() {
        let store = InMemoryRemoteStore::default();
        let mut all = store.subscribe(&ChangeKind::ALL).await.unwrap();
        let mut deletes = store.subscribe(&[ChangeKind::Delete]).await.unwrap();
        assert_ne!(all.id, deletes.id);

        let post = store.insert(&new_post("A")).await.unwrap();
        store.update(&post.id, &PostPatch::likes(1)).await.unwrap();
        store.delete(&post.id).await.unwrap();

        assert!(matches!(all.events.recv().await, Some(PostChange::Inserted(_))));
        match all.events.recv().await {
            Some(PostChange::Updated { id, fields, updated_at }) => {
                assert_eq!(id, post.id);
                assert_eq!(fields.likes, Some(1));
                assert!(updated_at.is_some());
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(matches!(all.events.recv().await, Some(PostChange::Deleted { .. })));

        assert!(matches!(deletes.events.recv().await, Some(PostChange::Deleted { .. })));
        assert!(deletes.events.try_recv().is_err());
    }

    #[tokio::test]
    async fn full_channel_drops_events_without_failing_mutation() {
        let store = InMemoryRemoteStore::new(RemoteConfig {
            channel_capacity: 1,
            ..RemoteConfig::default()
        });
        let mut channel = store.subscribe(&ChangeKind::ALL).await.unwrap();

        store.insert(&new_post("A")).await.unwrap();
        store.insert(&new_post("B")).await.unwrap();

        assert!(channel.events.recv().await.is_some());
        assert!(channel.events.try_recv().is_err());
        assert_eq!(store.post_count().await, 2);
    }

    #[tokio::test]
    async fn dropped_receivers_are_pruned_on_publish() {
        let store = InMemoryRemoteStore::default();
        let channel = store.subscribe(&ChangeKind::ALL).await.unwrap();
        drop(channel);
        assert_eq!(store.open_channels().await, 1);

        store.insert(&new_post("A")).await.unwrap();

        assert_eq!(store.open_channels().await, 0);
    }

    #[tokio::test]
    async fn close_channel_is_idempotent() {
        let store = InMemoryRemoteStore::default();
        let channel = store.subscribe(&ChangeKind::ALL).await.unwrap();

        store.close_channel(&channel.id).await.unwrap();
        store.close_channel(&channel.id).await.unwrap();

        assert_eq!(store.open_channels().await, 0);
    }

    #[tokio::test]
    async fn injected_failure_applies_once() {
        let store = InMemoryRemoteStore::default();
        store.fail_next(RemoteOperation::List, "connection reset").await;

        let err = store.list(PostOrder::CreatedAtDesc).await.unwrap_err();
        assert_eq!(err, AppError::Network("connection reset".to_string()));
        assert!(store.list(PostOrder::CreatedAtDesc).await.is_ok());
    }
}
