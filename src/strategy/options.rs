//! Strategy options and TTL presets.

use std::time::Duration;

use crate::cache::SetOptions;

/// Default remaining-TTL fraction under which refresh-ahead triggers.
pub const DEFAULT_REFRESH_THRESHOLD: f64 = 0.2;

// == TTL Presets ==
/// Common lifetimes used by the festival services.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ttl {
    /// 1 minute: live counters, availability
    Short,
    /// 5 minutes: listings, dashboards
    Medium,
    /// 1 hour: reference data
    Long,
    /// 24 hours: rarely changing configuration
    Day,
}

impl Ttl {
    pub const fn duration(self) -> Duration {
        match self {
            Ttl::Short => Duration::from_secs(60),
            Ttl::Medium => Duration::from_secs(300),
            Ttl::Long => Duration::from_secs(3600),
            Ttl::Day => Duration::from_secs(86_400),
        }
    }
}

impl From<Ttl> for Duration {
    fn from(ttl: Ttl) -> Self {
        ttl.duration()
    }
}

// == Refresh-Ahead ==
#[derive(Debug, Clone)]
pub struct RefreshAheadOptions {
    /// Lifetime given to each (re)published value
    pub ttl: Duration,
    pub tags: Vec<String>,
    /// Remaining-TTL fraction under which a background refresh is scheduled.
    /// `None` uses the engine default.
    pub threshold: Option<f64>,
}

impl RefreshAheadOptions {
    pub fn new(ttl: impl Into<Duration>) -> Self {
        Self {
            ttl: ttl.into(),
            tags: Vec::new(),
            threshold: None,
        }
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn threshold(mut self, threshold: f64) -> Self {
        self.threshold = Some(threshold.clamp(0.0, 1.0));
        self
    }

    pub(crate) fn set_options(&self) -> SetOptions {
        SetOptions::new().ttl(self.ttl).tags(self.tags.iter().cloned())
    }
}

// == Stale-While-Revalidate ==
#[derive(Debug, Clone)]
pub struct SwrOptions {
    /// Age after which a value is stale: still served, refreshed in background
    pub stale_time: Duration,
    /// Age after which a value is expired: callers block on a refetch
    pub max_age: Duration,
    pub tags: Vec<String>,
}

impl SwrOptions {
    /// `max_age` is raised to `stale_time` when smaller.
    pub fn new(stale_time: impl Into<Duration>, max_age: impl Into<Duration>) -> Self {
        let stale_time = stale_time.into();
        Self {
            stale_time,
            max_age: max_age.into().max(stale_time),
            tags: Vec::new(),
        }
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub(crate) fn set_options(&self) -> SetOptions {
        SetOptions::new()
            .ttl(self.max_age)
            .tags(self.tags.iter().cloned())
    }
}

// == Batch ==
#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Per-id keys are `<key_prefix>:<id>`
    pub key_prefix: String,
    pub ttl: Option<Duration>,
    pub tags: Vec<String>,
}

impl BatchOptions {
    pub fn new(key_prefix: impl Into<String>) -> Self {
        Self {
            key_prefix: key_prefix.into(),
            ttl: None,
            tags: Vec::new(),
        }
    }

    pub fn ttl(mut self, ttl: impl Into<Duration>) -> Self {
        self.ttl = Some(ttl.into());
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn key_for(&self, id: &impl std::fmt::Display) -> String {
        format!("{}:{}", self.key_prefix, id)
    }

    pub(crate) fn set_options(&self) -> SetOptions {
        let options = SetOptions::new().tags(self.tags.iter().cloned());
        match self.ttl {
            Some(ttl) => options.ttl(ttl),
            None => options,
        }
    }
}
