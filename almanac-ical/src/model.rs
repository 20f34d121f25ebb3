use chrono::{DateTime, TimeDelta, Utc};
use icalendar::parser::{read_calendar, unfold, Component as IcalComponent};

use crate::filter::{Component, Filter};
use crate::query::{self, prop_date, prop_duration, prop_is_date};
use crate::recurrence::Recurrence;

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("calendar data is not valid UTF-8")]
    Encoding(#[from] std::str::Utf8Error),
    #[error("unable to parse iCalendar data: {0}")]
    Syntax(String),
    #[error("calendar objects must contain a VEVENT, VTODO or VJOURNAL component")]
    NoComponent,
}

/// Access classification of an object, from its CLASS property
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Classification {
    #[default]
    Public,
    Private,
    Confidential,
}

impl Classification {
    /// A missing CLASS is public, an unknown one is private
    pub fn from_property(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            None => Self::Public,
            Some(v) if v.eq_ignore_ascii_case("PUBLIC") => Self::Public,
            Some(v) if v.eq_ignore_ascii_case("CONFIDENTIAL") => Self::Confidential,
            Some(_) => Self::Private,
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            Self::Public => 0,
            Self::Private => 1,
            Self::Confidential => 2,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Public),
            1 => Some(Self::Private),
            2 => Some(Self::Confidential),
            _ => None,
        }
    }
}

/// What a store needs to know about an object without keeping it parsed
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectInfo {
    pub component: Component,
    pub uid: Option<String>,
    pub classification: Classification,
    /// Start of the first instance, only computed for events
    pub first_occurrence: Option<DateTime<Utc>>,
    /// End of the last instance, `None` for events recurring forever
    pub last_occurrence: Option<DateTime<Utc>>,
}

impl ObjectInfo {
    /// Whether the object may have an instance in the window. Unknown
    /// bounds never exclude an object.
    pub fn may_overlap(&self, start: &DateTime<Utc>, end: &DateTime<Utc>) -> bool {
        self.first_occurrence.map_or(true, |first| first < *end)
            && self.last_occurrence.map_or(true, |last| last > *start)
    }
}

/// Parses raw calendar data and evaluates filters against it.
///
/// Both operations share the same parser so that an object accepted by
/// `inspect` can always be evaluated by `matches`.
pub trait ObjectModel: Send + Sync {
    fn inspect(&self, raw: &[u8]) -> Result<ObjectInfo, ParseError>;
    fn matches(&self, raw: &[u8], filter: &Filter) -> Result<bool, ParseError>;
}

/// [`ObjectModel`] backed by the `icalendar` parser and `rrule`
#[derive(Debug, Default, Clone, Copy)]
pub struct IcalModel;

impl IcalModel {
    fn with_root<T>(raw: &[u8], f: impl FnOnce(&IcalComponent) -> T) -> Result<T, ParseError> {
        let text = std::str::from_utf8(raw)?;
        let unfolded = unfold(text);
        let ics = read_calendar(&unfolded).map_err(|e| ParseError::Syntax(e.to_string()))?;

        // icalendar does not consider VCALENDAR as a component but CalDAV filters do
        let root = IcalComponent {
            name: Component::VCalendar.as_str().into(),
            properties: ics.properties,
            components: ics.components,
        };
        Ok(f(&root))
    }
}

impl ObjectModel for IcalModel {
    fn inspect(&self, raw: &[u8]) -> Result<ObjectInfo, ParseError> {
        Self::with_root(raw, |root| {
            let main = root
                .components
                .iter()
                .find(|c| Component::new(c.name.as_str().to_string()).is_resource_kind())
                .ok_or(ParseError::NoComponent)?;
            let component = Component::new(main.name.as_str().to_string());
            let uid = main
                .properties
                .iter()
                .find(|p| p.name.as_str().eq_ignore_ascii_case("UID"))
                .map(|p| p.val.as_str().to_string());
            let classification = Classification::from_property(
                main.properties
                    .iter()
                    .find(|p| p.name.as_str().eq_ignore_ascii_case("CLASS"))
                    .map(|p| p.val.as_str()),
            );

            let (first_occurrence, last_occurrence) = match component {
                Component::VEvent => event_bounds(root),
                _ => (None, None),
            };

            tracing::trace!(component=%component, uid=?uid, first=?first_occurrence, last=?last_occurrence, "inspected calendar object");
            Ok(ObjectInfo {
                component,
                uid,
                classification,
                first_occurrence,
                last_occurrence,
            })
        })?
    }

    fn matches(&self, raw: &[u8], filter: &Filter) -> Result<bool, ParseError> {
        Self::with_root(raw, |root| {
            query::is_component_match(root, std::slice::from_ref(root), &filter.0)
        })
    }
}

/// First start and last end over every VEVENT of the object
fn event_bounds(root: &IcalComponent) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
    let mut first: Option<DateTime<Utc>> = None;
    let mut last: Option<Option<DateTime<Utc>>> = None;

    for event in root
        .components
        .iter()
        .filter(|c| c.name.as_str().eq_ignore_ascii_case("VEVENT"))
    {
        let props = event.properties.as_ref();
        let dtstart = match prop_date(props, "DTSTART") {
            Some(v) => v,
            None => continue,
        };
        let span = match (prop_date(props, "DTEND"), prop_duration(props, "DURATION")) {
            (Some(dtend), _) => dtend - dtstart,
            (None, Some(duration)) => duration,
            (None, None) if prop_is_date(props, "DTSTART") => TimeDelta::days(1),
            _ => TimeDelta::zero(),
        };

        let recurrence = Recurrence::from_properties(props);
        let end = if recurrence.is_recurring() {
            match recurrence.last(dtstart) {
                Ok(last_start) => last_start.and_then(|s| s.checked_add_signed(span)),
                Err(e) => {
                    tracing::warn!(err=?e, "unable to expand recurrence, object is unbounded");
                    None
                }
            }
        } else {
            dtstart.checked_add_signed(span)
        };

        first = Some(first.map_or(dtstart, |f| f.min(dtstart)));
        last = Some(match (last, end) {
            (None, end) => end,
            (Some(Some(prev)), Some(end)) => Some(prev.max(end)),
            _ => None,
        });
    }

    (first, last.flatten())
}
