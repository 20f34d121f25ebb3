//! Reference calendar store.
//!
//! [`ReferenceStore`] keeps calendars in memory and implements the base
//! backend contract plus every optional capability. Each calendar keeps an
//! ordered change log answering sync requests. Calendars are reached
//! through per-principal instances so that one calendar can be shared.

pub mod calendar;
pub mod changelog;
pub mod config;
pub mod namespace;
pub mod snapshot;
pub mod store;
pub mod timestamp;
pub mod unique_ident;

mod inbox;
mod sharing;
mod subscription;

pub use config::StoreConfig;
pub use store::ReferenceStore;
