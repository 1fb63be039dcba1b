use super::StoreInner;
use crate::application::ports::PostRemoteStore;
use crate::domain::entities::PostChange;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, warn};

/// リアルタイム購読のハンドル
///
/// クローンは同じ購読を共有する。`unsubscribe`はどのクローンから何度呼んでもよい。
#[derive(Clone)]
pub struct Subscription {
    inner: Arc<SubscriptionInner>,
}

struct SubscriptionInner {
    channel_id: String,
    remote: Arc<dyn PostRemoteStore>,
    closed: AtomicBool,
    shutdown: Mutex<Option<oneshot::Sender<()>>>,
}

impl Subscription {
    pub(super) fn start(
        store: Weak<StoreInner>,
        remote: Arc<dyn PostRemoteStore>,
        channel_id: String,
        events: mpsc::Receiver<PostChange>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        tokio::spawn(reconcile_loop(
            store,
            events,
            shutdown_rx,
            channel_id.clone(),
        ));

        Self {
            inner: Arc::new(SubscriptionInner {
                channel_id,
                remote,
                closed: AtomicBool::new(false),
                shutdown: Mutex::new(Some(shutdown_tx)),
            }),
        }
    }

    pub fn channel_id(&self) -> &str {
        &self.inner.channel_id
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// 反映を停止してリモートのチャネルを閉じる（冪等）
    pub async fn unsubscribe(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        if let Some(shutdown) = self.inner.shutdown.lock().await.take() {
            // ループは既に終了している場合がある
            let _ = shutdown.send(());
        }

        if let Err(err) = self.inner.remote.close_channel(&self.inner.channel_id).await {
            warn!(
                channel_id = %self.inner.channel_id,
                "Failed to close change channel: {}", err
            );
        } else {
            debug!(channel_id = %self.inner.channel_id, "change channel closed");
        }
    }
}

/// 停止、フィード終了、ストア破棄のいずれかまで受信順にイベントを反映
async fn reconcile_loop(
    store: Weak<StoreInner>,
    mut events: mpsc::Receiver<PostChange>,
    mut shutdown: oneshot::Receiver<()>,
    channel_id: String,
) {
    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => {
                debug!(channel_id = %channel_id, "reconcile loop stopped");
                break;
            }
            received = events.recv() => {
                let Some(change) = received else {
                    debug!(channel_id = %channel_id, "change feed ended");
                    break;
                };
                let Some(store) = store.upgrade() else {
                    break;
                };
                store.apply_change(change).await;
            }
        }
    }
}
