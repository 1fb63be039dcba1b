use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// ログ設定の初期化
///
/// `RUST_LOG` があればそれを優先し、なければ設定ファイルの既定フィルタを使う。
pub fn init(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    tracing::info!(filter = default_filter, "logging initialized");
}
