//! フォーラム投稿の同期
//!
//! リモートのCRUDバックエンドへの変更を仲介し、変更フィードを反映し、
//! ローカルのあいまい検索を提供するクライアント側ストア。

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod shared;

pub use application::ports::{ChangeChannel, PostOrder, PostRemoteStore};
pub use application::services::{
    AuthSession, ForumSnapshot, ForumStore, LoadState, PostSort, Subscription,
};
pub use domain::entities::{ChangeKind, NewPost, Post, PostChange, PostDraft, PostPatch, User};
pub use infrastructure::remote::{InMemoryRemoteStore, RemoteOperation};
pub use shared::{AppConfig, AppError, ForumError, ForumErrorKind};
