pub mod change;
pub mod post;
pub mod user;

pub use change::{ChangeKind, PostChange};
pub use post::{NewPost, Post, PostAuthor, PostDraft, PostPatch};
pub use user::User;
