use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppError {
    Database(String),
    Network(String),
    Auth(String),
    Unauthorized(String),
    NotFound(String),
    InvalidInput(String),
    ValidationError(String),
    ConfigurationError(String),
    SerializationError(String),
    DeserializationError(String),
    NotImplemented(String),
    Internal(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Database(msg) => write!(f, "Database error: {}", msg),
            AppError::Network(msg) => write!(f, "Network error: {}", msg),
            AppError::Auth(msg) => write!(f, "Auth error: {}", msg),
            AppError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::InvalidInput(msg) => write!(f, "Invalid input: {}", msg),
            AppError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            AppError::ConfigurationError(msg) => write!(f, "Configuration error: {}", msg),
            AppError::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
            AppError::DeserializationError(msg) => write!(f, "Deserialization error: {}", msg),
            AppError::NotImplemented(msg) => write!(f, "Not implemented: {}", msg),
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

impl From<Box<dyn std::error::Error + Send + Sync>> for AppError {
    fn from(err: Box<dyn std::error::Error + Send + Sync>) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<String> for AppError {
    fn from(err: String) -> Self {
        AppError::Internal(err)
    }
}

impl From<&str> for AppError {
    fn from(err: &str) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::SerializationError(err.to_string())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

/// [`ForumError`]を発生させた操作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForumErrorKind {
    FetchFailed,
    CreateFailed,
    UpdateFailed,
    DeleteFailed,
    SubscriptionFailed,
}

impl ForumErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ForumErrorKind::FetchFailed => "fetch_failed",
            ForumErrorKind::CreateFailed => "create_failed",
            ForumErrorKind::UpdateFailed => "update_failed",
            ForumErrorKind::DeleteFailed => "delete_failed",
            ForumErrorKind::SubscriptionFailed => "subscription_failed",
        }
    }
}

impl fmt::Display for ForumErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// フォーラムストアの状態に記録され、呼び出し元にも返されるエラー
///
/// `message`は画面にそのまま表示できる文言で、下位の通信エラーを含む。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct ForumError {
    pub kind: ForumErrorKind,
    pub message: String,
}

impl ForumError {
    pub fn new(kind: ForumErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn from_app(kind: ForumErrorKind, err: &AppError) -> Self {
        Self::new(kind, err.to_string())
    }
}
