use crate::domain::entities::{ChangeKind, NewPost, Post, PostChange, PostPatch};
use crate::shared::error::AppError;
use async_trait::async_trait;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PostOrder {
    #[default]
    CreatedAtDesc,
    CreatedAtAsc,
}

/// 投稿コレクションに対して開いたリアルタイムチャネル
#[derive(Debug)]
pub struct ChangeChannel {
    pub id: String,
    pub events: mpsc::Receiver<PostChange>,
}

/// フォーラム投稿のリモート永続化（CRUDと変更フィード）
#[async_trait]
pub trait PostRemoteStore: Send + Sync {
    /// 全投稿を取得。著者情報と返信数を結合して返す
    async fn list(&self, order: PostOrder) -> Result<Vec<Post>, AppError>;

    /// 新規投稿を保存し、正規レコードを返す
    async fn insert(&self, post: &NewPost) -> Result<Post, AppError>;

    async fn update(&self, id: &str, patch: &PostPatch) -> Result<Post, AppError>;

    async fn delete(&self, id: &str) -> Result<(), AppError>;

    /// 指定した種類の変更を配信するチャネルを開く
    async fn subscribe(&self, kinds: &[ChangeKind]) -> Result<ChangeChannel, AppError>;

    /// チャネルを閉じる。未知または閉じ済みのチャネルでもエラーにしない
    async fn close_channel(&self, channel_id: &str) -> Result<(), AppError>;
}
