//! Slack Web API adapter.
//!
//! Implements the `ChatApi` port on top of `conversations.history`,
//! `conversations.replies` and `users.info`. Every call goes through the shared
//! `RetryPolicy`; `ok: false` envelopes come back as `ApiOutcome::Rejected`.

pub mod cache;
pub mod transport;
pub mod wire;

use std::collections::HashSet;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use sca_core::{
    config::Config,
    domain::{placeholder_name, sort_and_dedup, to_platform_ts, Message, TimeWindow, User},
    errors::Error,
    ports::ChatApi,
    retry::{ApiOutcome, RetryPolicy},
    Result,
};

use crate::{
    cache::UserCache,
    transport::{ReqwestTransport, Transport},
    wire::{MessagesPage, UserInfo},
};

pub const DEFAULT_PAGE_LIMIT: u32 = 200;

pub struct SlackClient<T = ReqwestTransport> {
    transport: T,
    policy: RetryPolicy,
    page_limit: u32,
    cancel: CancellationToken,
    users: UserCache,
}

impl SlackClient<ReqwestTransport> {
    /// Client for the configured workspace. `cancel` aborts in-flight requests
    /// and waits when the run is shut down.
    pub fn from_config(cfg: &Config, cancel: CancellationToken) -> Result<Self> {
        let transport =
            ReqwestTransport::new(&cfg.api_base_url, &cfg.slack_token, cfg.request_timeout)?;
        Ok(Self::with_transport(transport, RetryPolicy::default(), cancel).page_limit(cfg.page_limit))
    }
}

impl<T: Transport> SlackClient<T> {
    pub fn with_transport(transport: T, policy: RetryPolicy, cancel: CancellationToken) -> Self {
        Self {
            transport,
            policy,
            page_limit: DEFAULT_PAGE_LIMIT,
            cancel,
            users: UserCache::new(),
        }
    }

    pub fn page_limit(mut self, limit: u32) -> Self {
        self.page_limit = limit.max(1);
        self
    }

    /// One API call with retries, split into payload vs platform rejection.
    async fn call<P: DeserializeOwned>(
        &self,
        method: &'static str,
        query: &[(&'static str, String)],
    ) -> Result<ApiOutcome<P>> {
        let body = self
            .policy
            .run(method, &self.cancel, || self.transport.get(method, query))
            .await?;
        decode_envelope(method, body)
    }

    /// Follow `next_cursor` until Slack stops returning one. Only the cursor
    /// decides; `has_more` is not consulted. A cursor already followed in this
    /// walk ends it, as does a platform rejection (pages already received are kept).
    async fn fetch_pages(
        &self,
        method: &'static str,
        base: Vec<(&'static str, String)>,
    ) -> Result<Vec<Message>> {
        let mut out = Vec::new();
        let mut cursor: Option<String> = None;
        let mut seen: HashSet<String> = HashSet::new();
        let mut pages = 0usize;

        loop {
            let mut query = base.clone();
            if let Some(c) = &cursor {
                query.push(("cursor", c.clone()));
            }

            let page: MessagesPage = match self.call(method, &query).await? {
                ApiOutcome::Ok(page) => page,
                ApiOutcome::Rejected(reason) => {
                    tracing::error!(call = method, error = %reason, pages, "slack api error");
                    break;
                }
            };
            pages += 1;

            let next = page.next_cursor().map(str::to_string);
            let mut messages = page.messages;
            self.enrich(&mut messages).await?;
            out.extend(messages);

            match next {
                None => break,
                Some(n) if !seen.insert(n.clone()) => {
                    tracing::warn!(call = method, pages, "cursor did not advance; stopping");
                    break;
                }
                Some(n) => cursor = Some(n),
            }
        }

        tracing::debug!(call = method, pages, count = out.len(), "pagination finished");
        sort_and_dedup(&mut out);
        Ok(out)
    }

    async fn enrich(&self, messages: &mut [Message]) -> Result<()> {
        for m in messages.iter_mut() {
            let Some(user_id) = m.user.as_deref().filter(|u| !u.is_empty()) else {
                continue;
            };
            let name = self.display_name(user_id).await?;
            m.user_display_name = Some(name);
        }
        Ok(())
    }

    async fn display_name(&self, user_id: &str) -> Result<String> {
        let user = self.resolve_user(user_id).await?;
        Ok(user
            .as_ref()
            .and_then(User::preferred_name)
            .map(str::to_string)
            .unwrap_or_else(|| placeholder_name(user_id)))
    }

    async fn lookup_user(&self, user_id: &str) -> Result<Option<User>> {
        let query = [("user", user_id.to_string())];
        match self.call::<UserInfo>("users.info", &query).await? {
            ApiOutcome::Ok(info) => Ok(Some(info.user.into())),
            ApiOutcome::Rejected(reason) => {
                tracing::warn!(user = user_id, error = %reason, "user lookup rejected");
                Ok(None)
            }
        }
    }
}

#[async_trait]
impl<T: Transport> ChatApi for SlackClient<T> {
    async fn fetch_history(&self, channel_id: &str, window: TimeWindow) -> Result<Vec<Message>> {
        let mut query = vec![
            ("channel", channel_id.to_string()),
            ("limit", self.page_limit.to_string()),
        ];
        if let Some(from) = window.from {
            query.push(("oldest", to_platform_ts(from)));
        }
        if let Some(to) = window.to {
            query.push(("latest", to_platform_ts(to)));
        }
        if window.from.is_some() || window.to.is_some() {
            query.push(("inclusive", "true".to_string()));
        }
        self.fetch_pages("conversations.history", query).await
    }

    async fn fetch_thread_replies(&self, channel_id: &str, root_ts: &str) -> Result<Vec<Message>> {
        let query = vec![
            ("channel", channel_id.to_string()),
            ("ts", root_ts.to_string()),
            ("limit", self.page_limit.to_string()),
        ];
        self.fetch_pages("conversations.replies", query).await
    }

    async fn resolve_user(&self, user_id: &str) -> Result<Option<User>> {
        self.users
            .get_or_resolve(user_id, || self.lookup_user(user_id))
            .await
    }
}

/// Split `{ok, error, ...}` into payload or rejection.
fn decode_envelope<P: DeserializeOwned>(method: &str, body: Value) -> Result<ApiOutcome<P>> {
    match body.get("ok").and_then(Value::as_bool) {
        Some(true) => Ok(ApiOutcome::Ok(serde_json::from_value(body)?)),
        Some(false) => {
            let reason = body
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("unknown_error")
                .to_string();
            Ok(ApiOutcome::Rejected(reason))
        }
        None => Err(Error::External(format!(
            "{method}: response has no boolean `ok` field"
        ))),
    }
}
