//! Declarative Binding
//!
//! Attaches caching behavior to business functions by composition. A
//! marker such as [`Cacheable`] or [`Evict`] holds the metadata (key
//! spec, TTL, tags, predicates) and either wraps a single call with
//! `invoke` or a whole function with `bind`.
//!
//! ```ignore
//! let daily_report = Cacheable::new("report:{0}:{1}")
//!     .ttl(Ttl::Long)
//!     .tags([well_known::REPORT])
//!     .bind(engine.clone(), |(festival, day): (String, String)| async move {
//!         render_report(&festival, &day).await
//!     });
//!
//! let report = daily_report.call(("fest-1".to_string(), "2026-07-14".to_string())).await?;
//! ```

mod args;
mod key;
mod markers;

pub use args::{ArgList, Json, KeyArg, Live};
pub use key::{Arg, CallArgs, KeySpec};
pub use markers::{
    BatchCacheable, Bound, Cacheable, Evict, EvictTarget, InvalidateTags, LockGuarded, MultiLevel,
    Put, StaleWhileRevalidate,
};
