//! The calendar storage backend contract.
//!
//! [`CalendarBackend`] is what any storage engine implements to serve
//! calendars. Sync, scheduling inbox, sharing, notifications and
//! subscriptions are optional capabilities with their own traits, reached
//! through the `as_*` methods of the base trait.
//!
//! The default calendar query ([`QueryEngine`]) and UID lookup
//! ([`UidResolver`]) work on top of the base operations only, so a new
//! backend is correct before it is fast.

pub mod backend;
pub mod error;
pub mod notification;
pub mod query;
pub mod scheduling;
pub mod sharing;
pub mod subscription;
pub mod sync;
pub mod types;
pub mod uid;
pub mod validator;

#[cfg(test)]
mod testing;

pub use backend::CalendarBackend;
pub use error::{Error, Result};
pub use notification::NotificationSupport;
pub use query::QueryEngine;
pub use scheduling::SchedulingSupport;
pub use sharing::SharingSupport;
pub use subscription::SubscriptionSupport;
pub use sync::{ChangeFold, ChangeKind, SyncSupport};
pub use uid::UidResolver;
pub use validator::FilterValidator;
