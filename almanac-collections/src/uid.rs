use almanac_ical::filter::*;

use crate::backend::CalendarBackend;
use crate::error::Result;
use crate::validator::FilterValidator;

/// Finds which owned calendar holds an object with a given UID.
///
/// Calendars shared with the principal are not searched: a UID belongs to
/// the organizer's copy, never to a sharee's view of someone else's
/// calendar.
pub struct UidResolver<'a, B: ?Sized> {
    backend: &'a B,
    component: Component,
}

impl<'a, B: CalendarBackend + ?Sized> UidResolver<'a, B> {
    pub fn new(backend: &'a B) -> Self {
        Self {
            backend,
            component: Component::VEvent,
        }
    }

    pub fn with_component(mut self, component: Component) -> Self {
        self.component = component;
        self
    }

    /// `{calendar_uri}/{object_uri}` of the first object found
    pub async fn resolve(&self, principal_uri: &str, uid: &str) -> Result<Option<String>> {
        let filter = uid_filter(self.component.clone(), uid);
        let validator = FilterValidator::new(self.backend.object_model());

        for calendar in self.backend.get_calendars_for_user(principal_uri).await? {
            if !calendar.is_owned_by(principal_uri) {
                tracing::trace!(calendar=%calendar.id, principal=principal_uri, "not owned, skipped for uid lookup");
                continue;
            }

            for uri in self.backend.calendar_query(&calendar.id, &filter).await? {
                // text-match is a substring match, confirm the UID is the same
                let obj = match self.backend.get_calendar_object(&calendar.id, &uri).await? {
                    Some(obj) => obj,
                    None => continue,
                };
                let same_uid = obj
                    .calendar_data
                    .as_deref()
                    .and_then(|data| validator.inspect(data).ok())
                    .map_or(false, |info| info.uid.as_deref() == Some(uid));
                if same_uid {
                    return Ok(Some(format!("{}/{}", calendar.uri, uri)));
                }
            }
        }
        Ok(None)
    }
}

/// `VCALENDAR > {component} > UID` text-match with the i;octet collation
pub fn uid_filter(component: Component, uid: &str) -> Filter {
    Filter::inner(CompFilter {
        name: component,
        additional_rules: Some(CompFilterRules::Matches(CompFilterMatch {
            time_range: None,
            prop_filter: vec![PropFilter {
                name: "UID".into(),
                additional_rules: Some(PropFilterRules::Match(PropFilterMatch {
                    time_or_text: Some(TimeOrText::Text(
                        TextMatch::new(uid).with_collation(Collation::Octet),
                    )),
                    param_filter: vec![],
                })),
            }],
            comp_filter: vec![],
        })),
    })
}
