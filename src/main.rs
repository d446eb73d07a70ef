//! Feedstore binary entry point

use feedstore::{FeedApp, config};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Application entry point
///
/// # Setup
/// 1. Load configuration from file and environment
/// 2. Initialize tracing/logging from the logging section
/// 3. Open the stores
/// 4. Log a summary of the persisted feed
fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load configuration
    let config = config::AppConfig::load()?;

    // 2. Initialize tracing/logging; RUST_LOG overrides the configured level
    init_tracing(&config.logging);
    tracing::info!("Starting feedstore...");
    tracing::info!(
        backend = ?config.storage.backend,
        path = %config.storage.path.display(),
        "Configuration loaded"
    );

    // 3. Initialize metrics
    feedstore::metrics::init_metrics();

    // 4. Open the stores
    let app = FeedApp::new(config)?;

    // 5. Summarize
    let snapshot = app.feed.snapshot();
    let identity = app.identity();
    let comments: u64 = snapshot.iter().map(|p| u64::from(p.comment_count)).sum();
    let likes: u64 = snapshot.iter().map(|p| u64::from(p.like_count)).sum();
    let own = app.feed.posts_by_author(&identity.author_id).len();
    tracing::info!(
        user = %identity.display_name,
        posts = snapshot.len(),
        own_posts = own,
        comments,
        likes,
        "Feed loaded"
    );

    let now = chrono::Utc::now();
    for post in snapshot.iter().take(5) {
        tracing::info!(
            post_id = %post.id,
            author = %post.display_name,
            posted = %feedstore::data::format_time_ago(post.created_at, now),
            comments = post.comment_count,
            likes = post.like_count,
            "Recent post"
        );
    }

    tracing::debug!(metrics = %feedstore::metrics::gather_text()?, "Metrics snapshot");

    app.teardown()?;
    Ok(())
}

fn init_tracing(logging: &config::LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("feedstore={}", logging.level)));

    if logging.format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().pretty())
            .init();
    }
}
