//! iCalendar support for the almanac backends: CalDAV filter trees,
//! value parsers, recurrence-aware filter evaluation and the
//! [`ObjectModel`](model::ObjectModel) abstraction over raw calendar data.

pub mod filter;
pub mod model;
pub mod parser;
pub mod query;
pub mod recurrence;

pub use model::{Classification, IcalModel, ObjectInfo, ObjectModel, ParseError};
