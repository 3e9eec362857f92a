// common/src/utils.rs
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Setup tracing for consistent logging across the client crates
pub fn setup_tracing() {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");
}

/// Logical keys for the durable storage entries shared by the client.
/// Everything the client persists lives under one of these names.
pub mod storage_keys {
    /// The persisted session record (user + credential + authenticated flag)
    pub const SESSION: &str = "blog.session";
    /// The single pending deferred comment awaiting authentication
    pub const PENDING_COMMENT: &str = "blog.pending_comment";
    /// UI theme/sidebar preference, outside the session core's concern
    pub const UI_PREFS: &str = "blog.ui_prefs";
}
