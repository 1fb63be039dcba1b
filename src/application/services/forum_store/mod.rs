//! フォーラム投稿の同期ストア
//!
//! [`ForumStore`]はメモリ上の投稿一覧を保持し、[`PostRemoteStore`]への
//! 作成・更新・削除を仲介し、変更フィードのイベントを反映し、ローカルの
//! あいまい検索を提供する。
//!
//! ローカル状態はリモート呼び出しの成功後にのみ変更する。操作の結果と
//! そのエコーはどちらが先に届いてもよいよう、反映処理は投稿IDごとに冪等。

mod state;
mod subscription;


pub use state::{ForumSnapshot, LoadState};
pub use subscription::Subscription;

use crate::application::ports::{PostOrder, PostRemoteStore};
use crate::domain::entities::{ChangeKind, NewPost, Post, PostChange, PostPatch};
use crate::shared::config::SearchConfig;
use crate::shared::error::{ForumError, ForumErrorKind};
use state::ForumState;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PostSort {
    #[default]
    Latest,
    MostLiked,
}

pub(crate) struct StoreInner {
    remote: Arc<dyn PostRemoteStore>,
    state: RwLock<ForumState>,
    subscriptions: Mutex<Vec<Subscription>>,
}

impl StoreInner {
    async fn apply_change(&self, change: PostChange) -> bool {
        let kind = change.kind();
        let post_id = change.post_id().to_string();
        let changed = self.state.write().await.apply_change(change);
        debug!(?kind, post_id = %post_id, changed, "applied change event");
        changed
    }

    async fn fail(&self, kind: ForumErrorKind, message: String) -> ForumError {
        let error = ForumError::new(kind, message);
        self.state.write().await.record_error(error.clone());
        error
    }
}

/// フォーラム同期ストア。クローンは同じ状態を共有する
#[derive(Clone)]
pub struct ForumStore {
    inner: Arc<StoreInner>,
}

impl ForumStore {
    pub fn new(remote: Arc<dyn PostRemoteStore>, search: SearchConfig) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                remote,
                state: RwLock::new(ForumState::new(search)),
                subscriptions: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn with_defaults(remote: Arc<dyn PostRemoteStore>) -> Self {
        Self::new(remote, SearchConfig::default())
    }

    /// 全件を取得して一覧を新しい順で置き換える
    ///
    /// 失敗時は直前の一覧を残し、エラーを記録する。
    pub async fn fetch_all(&self) -> Result<(), ForumError> {
        self.inner.state.write().await.begin_loading();

        match self.inner.remote.list(PostOrder::CreatedAtDesc).await {
            Ok(mut posts) => {
                posts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
                let count = posts.len();
                self.inner.state.write().await.finish_loading(posts);
                info!(count, "fetched forum posts");
                Ok(())
            }
            Err(err) => {
                let error = ForumError::from_app(ForumErrorKind::FetchFailed, &err);
                self.inner.state.write().await.fail_loading(error.clone());
                warn!("Failed to fetch forum posts: {}", err);
                Err(error)
            }
        }
    }

    /// 投稿をリモートに作成し、正規レコードを一覧に追加
    ///
    /// 変更フィードで同じIDが既に届いていれば、既存エントリを更新する。
    pub async fn create(&self, new_post: NewPost) -> Result<Post, ForumError> {
        match self.inner.remote.insert(&new_post).await {
            Ok(post) => {
                let mut state = self.inner.state.write().await;
                if !state.insert_if_absent(post.clone()) {
                    debug!(post_id = %post.id, "post already received from change feed");
                    state.merge_canonical(post.clone());
                }
                state.clear_error();
                info!(post_id = %post.id, "created forum post");
                Ok(post)
            }
            Err(err) => {
                warn!("Failed to create forum post: {}", err);
                Err(self
                    .inner
                    .fail(ForumErrorKind::CreateFailed, err.to_string())
                    .await)
            }
        }
    }

    /// 部分更新を送信し、結果をマージ
    ///
    /// その間にローカルから削除されていた場合は`Ok(None)`を返す。
    pub async fn update(&self, id: &str, patch: PostPatch) -> Result<Option<Post>, ForumError> {
        match self.inner.remote.update(id, &patch).await {
            Ok(canonical) => {
                let mut state = self.inner.state.write().await;
                let merged = state.merge_canonical(canonical);
                state.clear_error();
                if merged.is_none() {
                    debug!(post_id = %id, "update discarded, post no longer present");
                }
                Ok(merged)
            }
            Err(err) => {
                warn!(post_id = %id, "Failed to update forum post: {}", err);
                Err(self
                    .inner
                    .fail(ForumErrorKind::UpdateFailed, err.to_string())
                    .await)
            }
        }
    }

    pub async fn like(&self, id: &str) -> Result<Option<Post>, ForumError> {
        let current = self.counter(id, |post| post.likes).await?;
        self.update(id, PostPatch::likes(current.saturating_add(1)))
            .await
    }

    pub async fn record_view(&self, id: &str) -> Result<Option<Post>, ForumError> {
        let current = self.counter(id, |post| post.views).await?;
        self.update(id, PostPatch::views(current.saturating_add(1)))
            .await
    }

    async fn counter(&self, id: &str, read: impl Fn(&Post) -> u32) -> Result<u32, ForumError> {
        let current = self.inner.state.read().await.post(id).map(read);
        match current {
            Some(value) => Ok(value),
            None => Err(self
                .inner
                .fail(
                    ForumErrorKind::UpdateFailed,
                    format!("Not found: post {id}"),
                )
                .await),
        }
    }

    /// リモート、ローカルの順に削除。存在しない投稿の削除はエラーにしない
    pub async fn delete(&self, id: &str) -> Result<(), ForumError> {
        match self.inner.remote.delete(id).await {
            Ok(()) => {
                let mut state = self.inner.state.write().await;
                let removed = state.remove(id);
                state.clear_error();
                info!(post_id = %id, removed, "deleted forum post");
                Ok(())
            }
            Err(err) => {
                warn!(post_id = %id, "Failed to delete forum post: {}", err);
                Err(self
                    .inner
                    .fail(ForumErrorKind::DeleteFailed, err.to_string())
                    .await)
            }
        }
    }

    /// タイトル・本文・タグに対するローカルのあいまい検索
    ///
    /// 空のクエリは全件を返す。クエリは一覧が変わるたびに再実行される。
    pub async fn search(&self, query: &str) -> Vec<Post> {
        self.inner.state.write().await.search(query)
    }

    /// リアルタイムチャネルを開き、イベントの反映を開始
    pub async fn subscribe_to_changes(&self) -> Result<Subscription, ForumError> {
        match self.inner.remote.subscribe(&ChangeKind::ALL).await {
            Ok(channel) => {
                info!(channel_id = %channel.id, "subscribed to forum changes");
                let subscription = Subscription::start(
                    Arc::downgrade(&self.inner),
                    Arc::clone(&self.inner.remote),
                    channel.id,
                    channel.events,
                );
                let mut subscriptions = self.inner.subscriptions.lock().await;
                subscriptions.retain(|existing| !existing.is_closed());
                subscriptions.push(subscription.clone());
                drop(subscriptions);
                self.inner.state.write().await.clear_error();
                Ok(subscription)
            }
            Err(err) => {
                warn!("Failed to subscribe to forum changes: {}", err);
                Err(self
                    .inner
                    .fail(ForumErrorKind::SubscriptionFailed, err.to_string())
                    .await)
            }
        }
    }

    /// リアルタイムフィードと同じ経路で変更イベントを1件反映
    pub async fn apply_change(&self, change: PostChange) -> bool {
        self.inner.apply_change(change).await
    }

    /// このストアが開いた購読をすべて閉じる
    pub async fn dispose(&self) {
        let subscriptions: Vec<Subscription> =
            std::mem::take(&mut *self.inner.subscriptions.lock().await);
        for subscription in subscriptions {
            subscription.unsubscribe().await;
        }
    }

    pub async fn snapshot(&self) -> ForumSnapshot {
        self.inner.state.read().await.snapshot()
    }

    pub async fn posts(&self) -> Vec<Post> {
        self.inner.state.read().await.posts().to_vec()
    }

    pub async fn post(&self, id: &str) -> Option<Post> {
        self.inner.state.read().await.post(id).cloned()
    }

    pub async fn visible_posts(&self) -> Vec<Post> {
        self.snapshot().await.visible_posts().to_vec()
    }

    /// 「新着」「人気」タブ用に並べ替えた表示中の投稿
    pub async fn sorted_view(&self, sort: PostSort) -> Vec<Post> {
        let mut posts = self.visible_posts().await;
        match sort {
            PostSort::Latest => posts.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
            PostSort::MostLiked => posts.sort_by(|a, b| {
                b.likes
                    .cmp(&a.likes)
                    .then_with(|| b.created_at.cmp(&a.created_at))
            }),
        }
        posts
    }

    pub async fn load_state(&self) -> LoadState {
        self.inner.state.read().await.load_state()
    }

    pub async fn is_loading(&self) -> bool {
        self.load_state().await == LoadState::Loading
    }

    pub async fn error(&self) -> Option<ForumError> {
        self.inner.state.read().await.error().cloned()
    }

    pub async fn clear_error(&self) {
        self.inner.state.write().await.clear_error();
    }
}
