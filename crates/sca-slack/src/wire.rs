//! Slack Web API payloads.
//!
//! Only the fields the archiver reads are modelled; everything else in the
//! response is ignored.

use sca_core::domain::{Message, User};
use serde::Deserialize;

/// Payload of `conversations.history` and `conversations.replies`.
#[derive(Debug, Default, Deserialize)]
pub struct MessagesPage {
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub response_metadata: Option<ResponseMetadata>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ResponseMetadata {
    #[serde(default)]
    pub next_cursor: Option<String>,
}

impl MessagesPage {
    /// Cursor for the next page; Slack sends `""` on the last page.
    pub fn next_cursor(&self) -> Option<&str> {
        self.response_metadata
            .as_ref()
            .and_then(|m| m.next_cursor.as_deref())
            .filter(|c| !c.trim().is_empty())
    }
}

/// Payload of `users.info`.
#[derive(Debug, Deserialize)]
pub struct UserInfo {
    pub user: WireUser,
}

#[derive(Debug, Deserialize)]
pub struct WireUser {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub profile: WireProfile,
}

#[derive(Debug, Default, Deserialize)]
pub struct WireProfile {
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub real_name: String,
}

impl From<WireUser> for User {
    fn from(u: WireUser) -> Self {
        User {
            id: u.id,
            display_name: u.profile.display_name,
            real_name: u.profile.real_name,
            handle: u.name,
        }
    }
}
