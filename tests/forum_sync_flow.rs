use forum_sync::application::ports::PostRemoteStore;
use forum_sync::{
    AuthSession, ChangeKind, ForumErrorKind, ForumSnapshot, ForumStore, InMemoryRemoteStore,
    LoadState, PostDraft, PostOrder, PostSort, RemoteOperation, User,
};
use std::sync::Arc;
use std::time::Duration;

fn client(remote: &InMemoryRemoteStore) -> ForumStore {
    ForumStore::with_defaults(Arc::new(remote.clone()))
}

async fn eventually<F>(store: &ForumStore, mut condition: F) -> ForumSnapshot
where
    F: FnMut(&ForumSnapshot) -> bool,
{
    for _ in 0..200 {
        let snapshot = store.snapshot().await;
        if condition(&snapshot) {
            return snapshot;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("store did not converge");
}

async fn signed_in_session() -> AuthSession {
    let session = AuthSession::new();
    session
        .sign_in(User::new("u-amina", "amina@example.org"))
        .await;
    session
}

#[tokio::test]
async fn create_and_own_echo_yield_single_entry() {
    let remote = InMemoryRemoteStore::default();
    let store = client(&remote);
    store.fetch_all().await.unwrap();
    let subscription = store.subscribe_to_changes().await.unwrap();

    let session = signed_in_session().await;
    let new_post = session
        .author(PostDraft::new("Budget régional 2024", "Où va l'argent ?"))
        .await
        .unwrap();
    let created = store.create(new_post).await.unwrap();

    // エコーされた挿入イベントの到着と反映を待つ
    tokio::time::sleep(Duration::from_millis(50)).await;

    let posts = store.posts().await;
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].id, created.id);

    subscription.unsubscribe().await;
    assert_eq!(remote.open_channels().await, 0);
}

#[tokio::test]
async fn changes_propagate_between_clients() {
    let remote = InMemoryRemoteStore::default();
    remote
        .register_user(User::new("u-amina", "amina@example.org"))
        .await;
    let writer = client(&remote);
    let reader = client(&remote);
    writer.fetch_all().await.unwrap();
    reader.fetch_all().await.unwrap();
    let _subscription = reader.subscribe_to_changes().await.unwrap();

    let session = signed_in_session().await;
    let created = writer
        .create(
            session
                .author(PostDraft::new("Transports", "Le bus est-il rentable ?"))
                .await
                .unwrap(),
        )
        .await
        .unwrap();

    eventually(&reader, |s| s.posts.iter().any(|p| p.id == created.id)).await;

    writer.like(&created.id).await.unwrap();
    eventually(&reader, |s| {
        s.posts
            .iter()
            .any(|p| p.id == created.id && p.likes == 1)
    })
    .await;

    writer.delete(&created.id).await.unwrap();
    let snapshot = eventually(&reader, |s| s.posts.is_empty()).await;
    assert_eq!(snapshot.load_state, LoadState::Ready);

    reader.dispose().await;
}

#[tokio::test]
async fn search_follows_remote_inserts() {
    let remote = InMemoryRemoteStore::default();
    let store = client(&remote);
    store.fetch_all().await.unwrap();
    let _subscription = store.subscribe_to_changes().await.unwrap();

    assert!(store.search("budget").await.is_empty());

    let session = signed_in_session().await;
    let other = client(&remote);
    other
        .create(
            session
                .author(
                    PostDraft::new("Budget régional 2024", "Dépenses")
                        .with_tags(vec!["finances".to_string()]),
                )
                .await
                .unwrap(),
        )
        .await
        .unwrap();

    let snapshot = eventually(&store, |s| s.search_results.len() == 1).await;
    assert_eq!(snapshot.visible_posts()[0].title, "Budget régional 2024");

    store.dispose().await;
}

#[tokio::test]
async fn injected_failures_surface_and_clear() {
    let remote = InMemoryRemoteStore::default();
    let store = client(&remote);
    let session = signed_in_session().await;

    remote
        .fail_next(RemoteOperation::List, "connection reset")
        .await;
    let err = store.fetch_all().await.unwrap_err();
    assert_eq!(err.kind, ForumErrorKind::FetchFailed);
    assert_eq!(store.load_state().await, LoadState::Error);

    remote
        .fail_next(RemoteOperation::Insert, "row-level security")
        .await;
    let draft = PostDraft::new("Refusé", "…");
    let err = store
        .create(session.author(draft).await.unwrap())
        .await
        .unwrap_err();
    assert_eq!(err.kind, ForumErrorKind::CreateFailed);
    assert!(store.posts().await.is_empty());
    assert_eq!(remote.post_count().await, 0);

    remote
        .fail_next(RemoteOperation::Subscribe, "websocket refused")
        .await;
    let err = store.subscribe_to_changes().await.err().unwrap();
    assert_eq!(err.kind, ForumErrorKind::SubscriptionFailed);

    store.fetch_all().await.unwrap();
    assert!(store.error().await.is_none());
    assert_eq!(store.load_state().await, LoadState::Ready);
}

#[tokio::test]
async fn fetched_posts_carry_joined_fields_through_updates() {
    let remote = InMemoryRemoteStore::default();
    remote
        .register_user(User::new("u-amina", "amina@example.org"))
        .await;
    let session = signed_in_session().await;
    let seeded = remote
        .insert(
            &session
                .author(PostDraft::new("Santé", "Hôpitaux"))
                .await
                .unwrap(),
        )
        .await
        .unwrap();
    remote.add_reply(&seeded.id).await.unwrap();

    let store = client(&remote);
    store.fetch_all().await.unwrap();
    store.record_view(&seeded.id).await.unwrap();

    let post = store.post(&seeded.id).await.unwrap();
    assert_eq!(post.views, 1);
    assert_eq!(post.replies_count, Some(1));
    assert_eq!(
        post.author.map(|a| a.email),
        Some("amina@example.org".to_string())
    );
}

#[tokio::test]
async fn double_delete_is_idempotent_end_to_end() {
    let remote = InMemoryRemoteStore::default();
    let session = signed_in_session().await;
    let store = client(&remote);
    let created = store
        .create(session.author(PostDraft::new("A", "a")).await.unwrap())
        .await
        .unwrap();

    store.delete(&created.id).await.unwrap();
    store.delete(&created.id).await.unwrap();

    assert!(store.posts().await.is_empty());
    assert!(store.error().await.is_none());
    assert!(remote
        .list(PostOrder::CreatedAtDesc)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn popular_view_ranks_by_likes() {
    let remote = InMemoryRemoteStore::default();
    let session = signed_in_session().await;
    let store = client(&remote);

    let first = store
        .create(session.author(PostDraft::new("Ancien", "a")).await.unwrap())
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;
    let second = store
        .create(session.author(PostDraft::new("Récent", "b")).await.unwrap())
        .await
        .unwrap();

    store.like(&first.id).await.unwrap();
    store.like(&first.id).await.unwrap();

    let popular: Vec<String> = store
        .sorted_view(PostSort::MostLiked)
        .await
        .into_iter()
        .map(|p| p.id)
        .collect();
    assert_eq!(popular, vec![first.id.clone(), second.id.clone()]);

    let latest: Vec<String> = store
        .sorted_view(PostSort::Latest)
        .await
        .into_iter()
        .map(|p| p.id)
        .collect();
    assert_eq!(latest, vec![second.id, first.id]);
}

#[tokio::test]
async fn delete_only_channels_filter_events() {
    let remote = InMemoryRemoteStore::default();
    let mut channel = remote.subscribe(&[ChangeKind::Delete]).await.unwrap();
    let session = signed_in_session().await;
    let store = client(&remote);

    let created = store
        .create(session.author(PostDraft::new("A", "a")).await.unwrap())
        .await
        .unwrap();
    store.delete(&created.id).await.unwrap();

    let event = channel.events.recv().await.unwrap();
    assert_eq!(event.kind(), ChangeKind::Delete);
    assert_eq!(event.post_id(), created.id);
}
