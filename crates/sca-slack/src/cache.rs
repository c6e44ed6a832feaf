use std::{collections::HashMap, future::Future, sync::Arc};

use sca_core::{domain::User, Result};
use tokio::sync::Mutex;

type Slot = Arc<Mutex<Option<User>>>;

/// Per-run user cache shared by all channel tasks.
///
/// Each id gets its own async lock, so concurrent lookups of the same user
/// wait for the first one instead of issuing duplicate requests. Only
/// successful lookups are stored; a miss drops its slot and is retried on the
/// next call.
#[derive(Debug, Default)]
pub struct UserCache {
    entries: Mutex<HashMap<String, Slot>>,
}

impl UserCache {
    pub fn new() -> Self {
        Self::default()
    }

    async fn slot(&self, user_id: &str) -> Slot {
        let mut map = self.entries.lock().await;
        map.entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone()
    }

    /// Remove an unresolved slot unless another lookup is still waiting on it.
    async fn forget(&self, user_id: &str, slot: &Slot) {
        let mut map = self.entries.lock().await;
        let idle = map
            .get(user_id)
            .is_some_and(|s| Arc::ptr_eq(s, slot) && Arc::strong_count(s) == 2);
        if idle {
            map.remove(user_id);
        }
    }

    /// Return the cached user or run `resolve` while holding the id's lock.
    pub async fn get_or_resolve<F, Fut>(&self, user_id: &str, resolve: F) -> Result<Option<User>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<User>>>,
    {
        let slot = self.slot(user_id).await;
        let mut guard = slot.lock().await;
        if let Some(user) = guard.as_ref() {
            return Ok(Some(user.clone()));
        }

        let resolved = resolve().await;
        if let Ok(Some(user)) = &resolved {
            *guard = Some(user.clone());
        } else {
            drop(guard);
            self.forget(user_id, &slot).await;
        }
        resolved
    }
}
