//! Recurrence sets of a calendar component.
//!
//! Expansion itself is delegated to the `rrule` crate: the component's
//! RRULE, RDATE and EXDATE properties are rewritten as an iCalendar
//! snippet anchored on a UTC DTSTART and parsed as an [`RRuleSet`].

use chrono::{DateTime, TimeDelta, Utc};
use icalendar::parser::Property;
use rrule::RRuleSet;

use crate::filter::UTC_DATETIME_FMT;
use crate::parser;

/// Upper bound on the number of instances computed for a single lookup
pub const MAX_EXPANSION: u16 = 1000;

#[derive(Debug, Default, Clone)]
pub struct Recurrence {
    rules: Vec<String>,
    rdates: Vec<DateTime<Utc>>,
    exdates: Vec<DateTime<Utc>>,
}

impl Recurrence {
    pub fn from_properties(properties: &[Property]) -> Self {
        let mut rec = Self::default();
        for prop in properties {
            match prop.name.as_str() {
                "RRULE" => rec.rules.push(normalize_rule(prop.val.as_str())),
                "RDATE" => rec.rdates.extend(date_list(prop.val.as_str())),
                "EXDATE" => rec.exdates.extend(date_list(prop.val.as_str())),
                _ => (),
            }
        }
        rec
    }

    pub fn is_recurring(&self) -> bool {
        !self.rules.is_empty() || !self.rdates.is_empty()
    }

    /// A rule with neither COUNT nor UNTIL never ends
    pub fn is_unbounded(&self) -> bool {
        self.rules
            .iter()
            .any(|r| !r.contains("COUNT=") && !r.contains("UNTIL="))
    }

    /// Instances overridden elsewhere (RECURRENCE-ID siblings) are not
    /// produced by the master's expansion.
    pub fn exclude(&mut self, dates: impl IntoIterator<Item = DateTime<Utc>>) {
        self.exdates.extend(dates)
    }

    pub fn is_excluded(&self, date: &DateTime<Utc>) -> bool {
        self.exdates.contains(date)
    }

    fn rule_set(&self, dtstart: DateTime<Utc>) -> Result<RRuleSet, rrule::RRuleError> {
        let mut lines = vec![format!("DTSTART:{}", dtstart.format(UTC_DATETIME_FMT))];
        for rule in &self.rules {
            lines.push(format!("RRULE:{}", rule));
        }
        for rdate in &self.rdates {
            lines.push(format!("RDATE:{}", rdate.format(UTC_DATETIME_FMT)));
        }
        for exdate in &self.exdates {
            lines.push(format!("EXDATE:{}", exdate.format(UTC_DATETIME_FMT)));
        }
        lines.join("\n").parse()
    }

    /// Instance start dates between `after` and `before`, both inclusive and
    /// both optional.
    pub fn between(
        &self,
        dtstart: DateTime<Utc>,
        after: Option<DateTime<Utc>>,
        before: Option<DateTime<Utc>>,
        limit: u16,
    ) -> Result<Vec<DateTime<Utc>>, rrule::RRuleError> {
        let tz: rrule::Tz = Utc.into();
        let one_sec = TimeDelta::seconds(1);
        let mut set = self.rule_set(dtstart)?;
        if let Some(after) = after.and_then(|a| a.checked_sub_signed(one_sec)) {
            set = set.after(after.with_timezone(&tz));
        }
        if let Some(before) = before.and_then(|b| b.checked_add_signed(one_sec)) {
            set = set.before(before.with_timezone(&tz));
        }

        let result = set.all(limit);
        tracing::trace!(count = result.dates.len(), limited = result.limited, "expanded recurrence");
        Ok(result
            .dates
            .iter()
            .map(|d| d.with_timezone(&Utc))
            .filter(|d| after.map_or(true, |a| *d >= a) && before.map_or(true, |b| *d <= b))
            .collect())
    }

    /// Start of the last instance, `None` when the set never ends or is too
    /// large to be enumerated.
    pub fn last(&self, dtstart: DateTime<Utc>) -> Result<Option<DateTime<Utc>>, rrule::RRuleError> {
        if self.is_unbounded() {
            return Ok(None);
        }
        let result = self.rule_set(dtstart)?.all(MAX_EXPANSION);
        if result.limited {
            return Ok(None);
        }
        let last = result
            .dates
            .iter()
            .map(|d| d.with_timezone(&Utc))
            .chain(self.rdates.iter().copied())
            .chain(std::iter::once(dtstart))
            .filter(|d| !self.is_excluded(d))
            .max();
        Ok(last)
    }
}

/// RDATE and EXDATE carry comma separated lists of DATE, DATE-TIME or PERIOD
fn date_list(raw: &str) -> Vec<DateTime<Utc>> {
    raw.split(',')
        .filter_map(|item| match item.split_once('/') {
            Some((start, _)) => parser::date_time(start),
            None => parser::date_time(item),
        })
        .collect()
}

/// Everything is expanded in UTC, so UNTIL has to be a UTC DATE-TIME too.
fn normalize_rule(rule: &str) -> String {
    rule.trim()
        .split(';')
        .map(|part| match part.split_once('=') {
            Some((key, val)) if key.eq_ignore_ascii_case("UNTIL") => {
                let until = if parser::is_date(val) {
                    format!("{}T235959Z", val)
                } else if !val.ends_with('Z') {
                    format!("{}Z", val)
                } else {
                    val.to_string()
                };
                format!("UNTIL={}", until)
            }
            _ => part.to_ascii_uppercase(),
        })
        .collect::<Vec<_>>()
        .join(";")
}
