//! Tag Index Module
//!
//! Groups keys under labels so related entries can be invalidated together.
//! Each tag is a set stored under `tag:<tag>` in the same backend as the
//! values. While the shared backend is reachable it is the source of truth;
//! memberships written during an outage live only in the local mirror and
//! are not reconciled afterwards.

use tracing::{debug, info};

use crate::cache::CacheStore;

/// Namespace prefix for tag membership sets.
pub const TAG_PREFIX: &str = "tag:";

/// Tags used across the festival services.
pub mod well_known {
    pub const FESTIVAL: &str = "festival";
    pub const TICKET: &str = "ticket";
    pub const CASHLESS: &str = "cashless";
    pub const USER: &str = "user";
    pub const STATS: &str = "stats";
    pub const VENDOR: &str = "vendor";
    pub const ZONE: &str = "zone";
    pub const CONFIG: &str = "config";
    pub const SESSION: &str = "session";
    pub const REPORT: &str = "report";
}

/// Storage key of the membership set for `tag`.
pub fn tag_key(tag: &str) -> String {
    format!("{TAG_PREFIX}{tag}")
}

// == Tag Index ==
/// Tag → key-set membership over a [`CacheStore`].
#[derive(Clone, Copy)]
pub struct TagIndex<'a> {
    store: &'a CacheStore,
}

impl<'a> TagIndex<'a> {
    pub fn new(store: &'a CacheStore) -> Self {
        Self { store }
    }

    /// Registers `key` as a member of `tag`.
    pub async fn add_tag(&self, tag: &str, key: &str) {
        self.store.set_add(&tag_key(tag), key).await;
    }

    /// Keys currently registered under `tag`. May include keys that have
    /// already expired or been deleted.
    pub async fn members(&self, tag: &str) -> Vec<String> {
        self.store.set_members(&tag_key(tag)).await
    }

    // == Invalidate ==
    /// Deletes every key registered under `tag`, then the membership set.
    ///
    /// Returns the number of keys actually removed; stale members count as
    /// nothing and never fail the call.
    pub async fn invalidate_tag(&self, tag: &str) -> usize {
        let members = self.members(tag).await;

        let mut removed = 0;
        for key in &members {
            if self.store.delete(key).await {
                removed += 1;
            } else {
                debug!(tag = %tag, key = %key, "Stale tag member already gone");
            }
        }
        self.store.delete(&tag_key(tag)).await;

        info!(tag = %tag, members = members.len(), removed, "Tag invalidated");
        removed
    }
}
