use almanac_ical::filter::Filter;

use crate::backend::CalendarBackend;
use crate::error::{Error, Result};
use crate::types::{CalendarId, CalendarObject};
use crate::validator::FilterValidator;

/// Calendar query by full scan.
///
/// Correct for any backend, at the cost of fetching and parsing every
/// object of the calendar.
pub struct QueryEngine<'a, B: ?Sized> {
    backend: &'a B,
}

impl<'a, B: CalendarBackend + ?Sized> QueryEngine<'a, B> {
    pub fn new(backend: &'a B) -> Self {
        Self { backend }
    }

    pub async fn run(&self, id: &CalendarId, filter: &Filter) -> Result<Vec<String>> {
        let objects = self.backend.get_calendar_objects(id).await?;
        self.evaluate(id, objects, filter).await
    }

    /// Keep the candidates matching the filter, in the given order.
    /// Objects that cannot be parsed are skipped.
    pub async fn evaluate(
        &self,
        id: &CalendarId,
        candidates: Vec<CalendarObject>,
        filter: &Filter,
    ) -> Result<Vec<String>> {
        // Every stored object is a VCALENDAR
        if filter.is_trivial() {
            return Ok(candidates.into_iter().map(|obj| obj.uri).collect());
        }

        tracing::debug!(calendar=%id, candidates=candidates.len(), filter=?filter, "calendar-query scan");
        let validator = FilterValidator::new(self.backend.object_model());
        let mut found = Vec::new();
        for obj in candidates {
            let data = match obj.calendar_data {
                Some(data) => data,
                None => match self.backend.get_calendar_object(id, &obj.uri).await? {
                    Some(CalendarObject {
                        calendar_data: Some(data),
                        ..
                    }) => data,
                    _ => {
                        tracing::trace!(calendar=%id, uri=%obj.uri, "object vanished during scan");
                        continue;
                    }
                },
            };

            match validator.validate(&data, filter) {
                Ok(true) => found.push(obj.uri),
                Ok(false) => (),
                Err(Error::MalformedObject(reason)) => {
                    tracing::warn!(calendar=%id, uri=%obj.uri, reason=%reason, "unable to parse calendar object, skipped");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(found)
    }
}
