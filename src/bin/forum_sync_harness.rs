use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use forum_sync::application::services::{AuthSession, ForumStore, LoadState, PostSort};
use forum_sync::domain::entities::{PostDraft, User};
use forum_sync::infrastructure::remote::{InMemoryRemoteStore, RemoteOperation};
use forum_sync::shared::{logging, AppConfig};
use serde::Serialize;
use tracing::{info, warn};

const DEFAULT_QUERY: &str = "buget";
const PROPAGATION_TIMEOUT_MS: u64 = 2_000;

#[derive(Debug, Clone)]
struct HarnessConfig {
    query: String,
    summary_path: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct HarnessSummary {
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
    elapsed_ms: u128,
    channel_id: String,
    posts_after_fetch: usize,
    posts_on_reader: usize,
    query: String,
    search_hits: Vec<String>,
    most_liked: Option<String>,
    injected_error: Option<String>,
    load_state: LoadState,
}

fn build_config() -> HarnessConfig {
    HarnessConfig {
        query: std::env::var("FORUM_SYNC_HARNESS_QUERY")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_QUERY.to_string()),
        summary_path: std::env::var("FORUM_SYNC_HARNESS_SUMMARY_PATH")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from),
    }
}

async fn seed(remote: &InMemoryRemoteStore, author: &User) -> anyhow::Result<()> {
    use forum_sync::application::ports::PostRemoteStore;

    let drafts = [
        ("Santé publique", "Comment sont financés les hôpitaux ?", "sante"),
        ("Transports", "Le réseau de bus est-il rentable ?", "mobilite"),
    ];
    for (title, content, tag) in drafts {
        let new_post = PostDraft::new(title, content)
            .with_tags(vec![tag.to_string()])
            .authored_by(Some(author))?;
        remote.insert(&new_post).await?;
    }
    Ok(())
}

async fn wait_for_post(store: &ForumStore, id: &str) -> bool {
    let deadline = Instant::now() + Duration::from_millis(PROPAGATION_TIMEOUT_MS);
    while Instant::now() < deadline {
        if store.post(id).await.is_some() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env();
    config.validate()?;
    logging::init(&config.logging.default_filter);

    let cfg = build_config();
    let started_at = Utc::now();
    let start_instant = Instant::now();

    info!(
        collection = %config.remote.collection,
        channel = %config.remote.channel_name,
        query = %cfg.query,
        "Starting forum sync harness"
    );

    let remote = InMemoryRemoteStore::new(config.remote.clone());
    let author = User::new("u-amina", "amina@example.org");
    remote.register_user(author.clone()).await;
    seed(&remote, &author).await?;

    let remote_port = Arc::new(remote.clone());
    let writer = ForumStore::new(remote_port.clone(), config.search.clone());
    let reader = ForumStore::new(remote_port, config.search.clone());

    writer.fetch_all().await?;
    reader.fetch_all().await?;
    let posts_after_fetch = writer.posts().await.len();

    let subscription = reader.subscribe_to_changes().await?;

    let session = AuthSession::new();
    session.sign_in(author).await;
    let draft = PostDraft::new("Budget régional 2024", "Où va l'argent de la région ?")
        .with_tags(vec!["budget".to_string(), "region".to_string()]);
    let created = writer.create(session.author(draft).await?).await?;

    if !wait_for_post(&reader, &created.id).await {
        warn!(post_id = %created.id, "post did not reach the reader in time");
    }

    writer.like(&created.id).await?;
    writer.record_view(&created.id).await?;

    remote
        .fail_next(RemoteOperation::Delete, "simulated outage")
        .await;
    let injected_error = match writer.delete(&created.id).await {
        Ok(()) => None,
        Err(err) => {
            info!(error = %err, "injected failure surfaced");
            Some(err.to_string())
        }
    };

    let search_hits = reader
        .search(&cfg.query)
        .await
        .into_iter()
        .map(|post| post.title)
        .collect();
    let most_liked = writer
        .sorted_view(PostSort::MostLiked)
        .await
        .first()
        .map(|post| post.title.clone());

    let summary = HarnessSummary {
        started_at,
        finished_at: Utc::now(),
        elapsed_ms: start_instant.elapsed().as_millis(),
        channel_id: subscription.channel_id().to_string(),
        posts_after_fetch,
        posts_on_reader: reader.posts().await.len(),
        query: cfg.query.clone(),
        search_hits,
        most_liked,
        injected_error,
        load_state: writer.load_state().await,
    };

    reader.dispose().await;

    info!(
        posts = summary.posts_on_reader,
        hits = summary.search_hits.len(),
        "Forum sync harness finished"
    );

    let rendered = serde_json::to_string_pretty(&summary)?;
    match &cfg.summary_path {
        Some(path) => {
            if let Err(err) = std::fs::write(path, rendered.as_bytes()) {
                warn!(path = %path.display(), "Failed to write harness summary: {}", err);
            }
        }
        None => println!("{rendered}"),
    }

    Ok(())
}
