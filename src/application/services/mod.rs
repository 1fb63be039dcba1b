pub mod auth_session;
pub mod forum_store;
pub mod post_search;

pub use auth_session::AuthSession;
pub use forum_store::{ForumSnapshot, ForumStore, LoadState, PostSort, Subscription};
pub use post_search::PostSearchIndex;
