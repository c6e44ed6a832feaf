//! Archive orchestration: history → thread expansion → monthly files.

use std::{collections::BTreeMap, path::PathBuf, sync::Arc};

use tokio::{sync::Semaphore, task::JoinSet};

use crate::{
    domain::{sort_and_dedup, Channel, Message, MonthKey, TimeWindow},
    errors::Error,
    ports::ChatApi,
    writer::ArchiveWriter,
    Result,
};

/// What one channel produced.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChannelSummary {
    pub messages: usize,
    pub files: Vec<PathBuf>,
}

#[derive(Debug)]
pub struct ChannelOutcome {
    pub channel: Channel,
    pub result: Result<ChannelSummary>,
}

/// Per-channel outcomes of one `archive_all` run, in configuration order.
#[derive(Debug, Default)]
pub struct RunReport {
    pub outcomes: Vec<ChannelOutcome>,
}

impl RunReport {
    pub fn failed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_err()).count()
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes.len() - self.failed()
    }

    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }

    pub fn messages_written(&self) -> usize {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().ok())
            .map(|s| s.messages)
            .sum()
    }

    pub fn files_written(&self) -> usize {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().ok())
            .map(|s| s.files.len())
            .sum()
    }

    /// `Ok` only when every channel succeeded.
    pub fn into_result(self) -> Result<Self> {
        let failed = self.failed();
        if failed == 0 {
            Ok(self)
        } else {
            Err(Error::ChannelsFailed {
                failed,
                total: self.outcomes.len(),
            })
        }
    }
}

#[derive(Clone)]
pub struct Archiver {
    inner: Arc<ArchiverInner>,
}

struct ArchiverInner {
    api: Arc<dyn ChatApi>,
    writer: ArchiveWriter,
    channels: Vec<Channel>,
    limit: Arc<Semaphore>,
}

impl Archiver {
    pub fn new(
        api: Arc<dyn ChatApi>,
        writer: ArchiveWriter,
        channels: Vec<Channel>,
        max_concurrent_channels: usize,
    ) -> Self {
        Self {
            inner: Arc::new(ArchiverInner {
                api,
                writer,
                channels,
                limit: Arc::new(Semaphore::new(max_concurrent_channels.max(1))),
            }),
        }
    }

    /// Archive every configured channel concurrently. One channel failing never
    /// cancels the others; inspect the report (or `into_result`) for the outcome.
    pub async fn archive_all(&self, window: TimeWindow) -> RunReport {
        let channels = self.inner.channels.clone();
        tracing::info!(channels = channels.len(), "starting archive run");

        let mut set = JoinSet::new();
        for (idx, channel) in channels.iter().cloned().enumerate() {
            let this = self.clone();
            set.spawn(async move {
                let result = match this.inner.limit.clone().acquire_owned().await {
                    Ok(_permit) => this.archive_one(&channel, window).await,
                    Err(_) => Err(Error::Cancelled),
                };
                (idx, result)
            });
        }

        let mut slots: Vec<Option<Result<ChannelSummary>>> =
            channels.iter().map(|_| None).collect();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((idx, result)) => slots[idx] = Some(result),
                Err(e) => tracing::error!(error = %e, "channel task aborted"),
            }
        }

        let outcomes = channels
            .into_iter()
            .zip(slots)
            .map(|(channel, result)| ChannelOutcome {
                result: result.unwrap_or_else(|| {
                    Err(Error::External(format!(
                        "archive task for #{} did not complete",
                        channel.name
                    )))
                }),
                channel,
            })
            .collect();

        let report = RunReport { outcomes };
        tracing::info!(
            succeeded = report.succeeded(),
            failed = report.failed(),
            messages = report.messages_written(),
            files = report.files_written(),
            "archive run finished"
        );
        report
    }

    /// Archive a single channel. Errors are logged with the channel identity and
    /// returned to the caller.
    pub async fn archive_one(&self, channel: &Channel, window: TimeWindow) -> Result<ChannelSummary> {
        tracing::info!(channel = %channel.name, channel_id = %channel.id, "starting channel archive");

        match self.run_channel(channel, window).await {
            Ok(summary) => {
                tracing::info!(
                    channel = %channel.name,
                    messages = summary.messages,
                    files = summary.files.len(),
                    "channel archived"
                );
                Ok(summary)
            }
            Err(e) => {
                tracing::error!(
                    channel = %channel.name,
                    channel_id = %channel.id,
                    error = %e,
                    "failed to archive channel"
                );
                Err(e)
            }
        }
    }

    async fn run_channel(&self, channel: &Channel, window: TimeWindow) -> Result<ChannelSummary> {
        let api = &self.inner.api;

        let history = api.fetch_history(&channel.id, window).await?;
        tracing::info!(channel = %channel.name, count = history.len(), "retrieved history");
        if history.is_empty() {
            tracing::info!(channel = %channel.name, "no messages found");
            return Ok(ChannelSummary::default());
        }

        let mut merged = Vec::with_capacity(history.len());
        for message in history {
            let root_ts = message.has_replies().then(|| message.ts.clone());
            merged.push(message);

            if let Some(root_ts) = root_ts {
                tracing::debug!(channel = %channel.name, thread = %root_ts, "fetching thread replies");
                let replies = api.fetch_thread_replies(&channel.id, &root_ts).await?;
                merged.extend(replies.into_iter().skip(1));
            }
        }

        let mut summary = ChannelSummary::default();
        for (month, batch) in group_by_month(merged) {
            tracing::info!(
                channel = %channel.name,
                month = %month,
                count = batch.len(),
                "writing month"
            );
            let path = self
                .inner
                .writer
                .write_month(&channel.id, &channel.name, month, &batch)
                .await?;
            summary.messages += batch.len();
            summary.files.push(path);
        }
        Ok(summary)
    }
}

/// Bucket messages by UTC calendar month; buckets come back in ascending month
/// order, each sorted ascending by timestamp with repeated timestamps collapsed.
/// Messages whose timestamp cannot be parsed are dropped with a warning.
pub fn group_by_month(messages: Vec<Message>) -> BTreeMap<MonthKey, Vec<Message>> {
    let mut groups: BTreeMap<MonthKey, Vec<Message>> = BTreeMap::new();
    for m in messages {
        match m.month() {
            Some(month) => groups.entry(month).or_default().push(m),
            None => tracing::warn!(ts = %m.ts, "skipping message with unparseable timestamp"),
        }
    }
    for batch in groups.values_mut() {
        sort_and_dedup(batch);
    }
    groups
}
