use crate::domain::entities::{NewPost, PostDraft, User};
use crate::shared::error::AppError;
use tokio::sync::RwLock;
use tracing::info;

/// 現在のクライアントでサインイン中のユーザーを保持する
///
/// 認証そのものはバックエンドで行い、ここでは結果だけを保持する。
#[derive(Default)]
pub struct AuthSession {
    current: RwLock<Option<User>>,
}

impl AuthSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn sign_in(&self, user: User) -> User {
        info!(user_id = %user.id, "signed in");
        *self.current.write().await = Some(user.clone());
        user
    }

    pub async fn sign_out(&self) {
        if let Some(user) = self.current.write().await.take() {
            info!(user_id = %user.id, "signed out");
        }
    }

    pub async fn current_user(&self) -> Option<User> {
        self.current.read().await.clone()
    }

    pub async fn is_authenticated(&self) -> bool {
        self.current.read().await.is_some()
    }

    /// 下書きにサインイン中のユーザーを著者として設定
    pub async fn author(&self, draft: PostDraft) -> Result<NewPost, AppError> {
        let current = self.current.read().await;
        draft.authored_by(current.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn author_requires_signed_in_user() {
        let session = AuthSession::new();
        let draft = PostDraft::new("Budget régional 2024", "Où va l'argent ?");

        let err = session.author(draft.clone()).await.unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));

        session.sign_in(User::new("u1", "amina@example.org")).await;
        assert!(session.is_authenticated().await);

        let new_post = session.author(draft).await.unwrap();
        assert_eq!(new_post.author_id, "u1");
        assert_eq!(new_post.title, "Budget régional 2024");
    }

    #[tokio::test]
    async fn sign_out_clears_user() {
        let session = AuthSession::new();
        session.sign_in(User::new("u1", "amina@example.org")).await;
        session.sign_out().await;
        session.sign_out().await;

        assert!(session.current_user().await.is_none());
        assert!(!session.is_authenticated().await);
    }
}
