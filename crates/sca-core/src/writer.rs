//! Monthly JSONL archive files.
//!
//! Layout: `<output_root>/<channel_name>/<YYYY-MM>.jsonl`, one record per line.
//! Each run rewrites a month file in full via a temp file + rename.

use std::path::PathBuf;

use serde::Serialize;

use crate::{
    domain::{Message, MonthKey},
    errors::Error,
    Result,
};

pub const SCHEMA_VERSION: &str = "1.0";

/// One output line. Field order is the on-disk key order.
#[derive(Debug, Serialize)]
pub struct ArchiveRecord<'a> {
    pub schema_version: &'static str,
    pub channel_id: &'a str,
    pub channel_name: &'a str,
    pub ts: &'a str,
    pub ts_iso: Option<String>,
    pub thread_id: &'a str,
    pub is_root: bool,
    pub message_type: &'a str,
    pub user: Option<&'a str>,
    pub user_display_name: Option<&'a str>,
    pub actor_user: Option<&'a str>,
    pub text: &'a str,
    pub mentions: Option<Vec<String>>,
    pub reply_count: Option<u32>,
    pub thread_ts: Option<&'a str>,
    #[serde(rename = "type")]
    pub kind: Option<&'a str>,
    pub subtype: Option<&'a str>,
}

impl<'a> ArchiveRecord<'a> {
    pub fn new(channel_id: &'a str, channel_name: &'a str, m: &'a Message) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            channel_id,
            channel_name,
            ts: &m.ts,
            ts_iso: m.ts_iso(),
            thread_id: m.thread_id(),
            is_root: m.is_root(),
            message_type: m.message_type(),
            user: m.user.as_deref(),
            user_display_name: m.user_display_name.as_deref(),
            actor_user: None,
            text: &m.text,
            mentions: m.mentions(),
            reply_count: m.reply_count,
            thread_ts: m.thread_ts.as_deref(),
            kind: m.kind.as_deref(),
            subtype: m.subtype.as_deref(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ArchiveWriter {
    root: PathBuf,
}

impl ArchiveWriter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Destination file for a channel/month.
    pub fn month_path(&self, channel_name: &str, month: MonthKey) -> Result<PathBuf> {
        validate_channel_dir(channel_name)?;
        Ok(self.root.join(channel_name).join(format!("{month}.jsonl")))
    }

    /// Write `messages` (already sorted) as the complete archive for one
    /// channel/month. Returns the path written.
    pub async fn write_month(
        &self,
        channel_id: &str,
        channel_name: &str,
        month: MonthKey,
        messages: &[Message],
    ) -> Result<PathBuf> {
        let path = self.month_path(channel_name, month)?;
        let body = render_jsonl(channel_id, channel_name, messages)?;

        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }

        let tmp = path.with_extension("jsonl.tmp");
        tokio::fs::write(&tmp, body.as_bytes()).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(Error::Io(e));
        }

        tracing::info!(
            channel = channel_name,
            month = %month,
            count = messages.len(),
            path = %path.display(),
            "archived messages"
        );
        Ok(path)
    }
}

/// Serialize a batch to JSONL: one compact object per line, trailing newline.
pub fn render_jsonl(channel_id: &str, channel_name: &str, messages: &[Message]) -> Result<String> {
    let mut out = String::new();
    for m in messages {
        let line = serde_json::to_string(&ArchiveRecord::new(channel_id, channel_name, m))?;
        out.push_str(&line);
        out.push('\n');
    }
    Ok(out)
}

/// Channel names become a directory under the output root; keep them to a
/// single plain path component.
pub fn validate_channel_dir(name: &str) -> Result<()> {
    let reason = if name.trim().is_empty() {
        Some("channel name is empty")
    } else if name == "." || name == ".." {
        Some("channel name is a relative path component")
    } else if name.contains('/') || name.contains('\\') {
        Some("channel name contains a path separator")
    } else if name.contains('\0') {
        Some("channel name contains a NUL byte")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(Error::InvalidPath {
            path: PathBuf::from(name),
            reason: reason.to_string(),
        }),
        None => Ok(()),
    }
}
