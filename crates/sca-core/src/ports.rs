use async_trait::async_trait;

use crate::{
    domain::{Message, TimeWindow, User},
    Result,
};

/// Hexagonal port for the chat platform.
///
/// Slack is the only implementation today. Implementations own pagination,
/// retries and author enrichment: every returned message already carries
/// `user_display_name` when it has an author, and lists come back sorted
/// ascending by timestamp.
///
/// Platform-level rejections are not errors here; they surface as an empty
/// list or `None`. An `Err` means the call itself failed and the caller's
/// pipeline should stop.
#[async_trait]
pub trait ChatApi: Send + Sync {
    async fn fetch_history(&self, channel_id: &str, window: TimeWindow) -> Result<Vec<Message>>;

    /// Full reply set of a thread, root first.
    async fn fetch_thread_replies(&self, channel_id: &str, root_ts: &str) -> Result<Vec<Message>>;

    async fn resolve_user(&self, user_id: &str) -> Result<Option<User>>;
}
