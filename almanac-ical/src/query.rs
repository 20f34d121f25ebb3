use chrono::{DateTime, TimeDelta, Utc};
use icalendar::parser::{Component as IcalComponent, Property};

use crate::filter as cal;
use crate::parser;
use crate::recurrence::Recurrence;

/// Instances looked at when searching a recurrence set for an overlap
const OVERLAP_SCAN: u16 = 64;

/// Evaluate a comp-filter against the components found in the current
/// scope. Any component carrying the filter's name may satisfy it.
pub fn is_component_match(
    parent: &IcalComponent,
    components: &[IcalComponent],
    filter: &cal::CompFilter,
) -> bool {
    let mut candidates = components
        .iter()
        .filter(|candidate| candidate.name.as_str().eq_ignore_ascii_case(filter.name.as_str()))
        .peekable();
    let found = candidates.peek().is_some();

    match (found, &filter.additional_rules) {
        (true, None) => true,
        (false, Some(cal::CompFilterRules::IsNotDefined)) => true,
        (false, None) => false,
        (true, Some(cal::CompFilterRules::IsNotDefined)) => false,
        (false, Some(cal::CompFilterRules::Matches(_))) => false,
        (true, Some(cal::CompFilterRules::Matches(matcher))) => {
            let overridden = overridden_instances(components, &filter.name);
            candidates.any(|component| {
                // check time range
                if let Some(time_range) = &matcher.time_range {
                    if !is_in_time_range(&filter.name, parent, component, &overridden, time_range)
                    {
                        return false;
                    }
                }

                // check properties
                if !is_properties_match(component.properties.as_ref(), matcher.prop_filter.as_ref())
                {
                    return false;
                }

                // check inner components
                matcher.comp_filter.iter().all(|inner_filter| {
                    is_component_match(component, component.components.as_ref(), inner_filter)
                })
            })
        }
    }
}

/// RECURRENCE-ID of the overriding instances of a recurring component
fn overridden_instances(components: &[IcalComponent], name: &cal::Component) -> Vec<DateTime<Utc>> {
    components
        .iter()
        .filter(|c| c.name.as_str().eq_ignore_ascii_case(name.as_str()))
        .filter_map(|c| prop_date(c.properties.as_ref(), "RECURRENCE-ID"))
        .collect()
}

fn find_prop<'a, 'b>(properties: &'b [Property<'a>], name: &str) -> Option<&'b Property<'a>> {
    properties
        .iter()
        .find(|candidate| candidate.name.as_str().eq_ignore_ascii_case(name))
}

pub(crate) fn prop_date(properties: &[Property], name: &str) -> Option<DateTime<Utc>> {
    find_prop(properties, name).and_then(|p| parser::date_time(p.val.as_str()))
}

pub(crate) fn prop_is_date(properties: &[Property], name: &str) -> bool {
    find_prop(properties, name)
        .map(|p| {
            p.params.iter().any(|param| {
                param.key.as_str().eq_ignore_ascii_case("VALUE")
                    && param.val.as_ref().map(|v| v.as_str()) == Some("DATE")
            }) || parser::is_date(p.val.as_str())
        })
        .unwrap_or(false)
}

pub(crate) fn prop_duration(properties: &[Property], name: &str) -> Option<TimeDelta> {
    find_prop(properties, name)
        .and_then(|p| parser::dur_value(p.val.as_str()).ok())
        .map(|(_, delta)| delta)
}

fn text_match(value: &str, txt_match: &cal::TextMatch) -> bool {
    let value = parser::unescape_text(value);
    let found = match txt_match.collation.as_ref().unwrap_or(&cal::Collation::AsciiCaseMap) {
        cal::Collation::Octet => value.contains(txt_match.text.as_str()),
        cal::Collation::AsciiCaseMap => value
            .to_ascii_lowercase()
            .contains(&txt_match.text.to_ascii_lowercase()),
        cal::Collation::Unknown(name) => {
            tracing::warn!(collation = %name, "unsupported collation, using i;ascii-casemap");
            value
                .to_ascii_lowercase()
                .contains(&txt_match.text.to_ascii_lowercase())
        }
    };
    match txt_match.negate_condition {
        None | Some(false) => found,
        Some(true) => !found,
    }
}

fn is_properties_match(props: &[Property], filters: &[cal::PropFilter]) -> bool {
    filters.iter().all(|single_filter| {
        let mut candidates = props
            .iter()
            .filter(|candidate| candidate.name.as_str().eq_ignore_ascii_case(&single_filter.name))
            .peekable();
        let found = candidates.peek().is_some();
        match (&single_filter.additional_rules, found) {
            (None, true) | (Some(cal::PropFilterRules::IsNotDefined), false) => true,
            (None, false)
            | (Some(cal::PropFilterRules::IsNotDefined), true)
            | (Some(cal::PropFilterRules::Match(_)), false) => false,
            (Some(cal::PropFilterRules::Match(pattern)), true) => {
                candidates.any(|prop| is_property_match(prop, pattern))
            }
        }
    })
}

fn is_property_match(prop: &Property, pattern: &cal::PropFilterMatch) -> bool {
    // check value
    match &pattern.time_or_text {
        Some(cal::TimeOrText::Time(time_range)) => {
            let parsed_date = match parser::date_time(prop.val.as_str()) {
                None => return false,
                Some(v) => v,
            };
            let (start, end) = time_range.bounds();
            if !(start <= parsed_date && end > parsed_date) {
                return false;
            }
        }
        Some(cal::TimeOrText::Text(txt_match)) => {
            if !text_match(prop.val.as_str(), txt_match) {
                return false;
            }
        }
        None => (), // no filter on value
    };

    // check parameters
    pattern.param_filter.iter().all(|single_param_filter| {
        let maybe_param = prop.params.iter().find(|candidate| {
            candidate
                .key
                .as_str()
                .eq_ignore_ascii_case(&single_param_filter.name)
        });

        match (maybe_param, &single_param_filter.additional_rules) {
            (Some(_), None) => true,
            (None, None) => false,
            (Some(_), Some(cal::ParamFilterMatch::IsNotDefined)) => false,
            (None, Some(cal::ParamFilterMatch::IsNotDefined)) => true,
            (None, Some(cal::ParamFilterMatch::Match(_))) => false,
            (Some(param), Some(cal::ParamFilterMatch::Match(txt_match))) => match &param.val {
                Some(v) => text_match(v.as_str(), txt_match),
                None => false,
            },
        }
    })
}

/// Dates of a VEVENT, VTODO or VJOURNAL that can be moved along its
/// recurrence set.
#[derive(Debug, Clone)]
struct Instance {
    dtstart: Option<DateTime<Utc>>,
    dtstart_is_date: bool,
    dtend: Option<DateTime<Utc>>,
    due: Option<DateTime<Utc>>,
    duration: Option<TimeDelta>,
    completed: Option<DateTime<Utc>>,
    created: Option<DateTime<Utc>>,
}

impl Instance {
    fn new(properties: &[Property]) -> Self {
        Self {
            dtstart: prop_date(properties, "DTSTART"),
            dtstart_is_date: prop_is_date(properties, "DTSTART"),
            dtend: prop_date(properties, "DTEND"),
            due: prop_date(properties, "DUE"),
            duration: prop_duration(properties, "DURATION").map(|d| std::cmp::max(d, TimeDelta::zero())),
            completed: prop_date(properties, "COMPLETED"),
            created: prop_date(properties, "CREATED"),
        }
    }

    /// Length of the instance, used to widen the expansion window
    fn span(&self) -> TimeDelta {
        match (self.dtstart, self.dtend, self.due, self.duration) {
            (Some(s), Some(e), _, _) | (Some(s), None, Some(e), _) => e - s,
            (_, _, _, Some(d)) => d,
            _ if self.dtstart_is_date => TimeDelta::days(1),
            _ => TimeDelta::zero(),
        }
    }

    fn shifted(&self, delta: TimeDelta) -> Self {
        Self {
            dtstart: self.dtstart.map(|d| offset(d, delta)),
            dtend: self.dtend.map(|d| offset(d, delta)),
            due: self.due.map(|d| offset(d, delta)),
            ..self.clone()
        }
    }

    //ref: https://datatracker.ietf.org/doc/html/rfc4791#section-9.9
    fn event_overlaps(&self, start: &DateTime<Utc>, end: &DateTime<Utc>) -> bool {
        let dtstart = match self.dtstart {
            Some(v) => v,
            _ => return false,
        };
        match (&self.dtend, &self.duration) {
            //       | Y | N | N | * | (start <  DTEND AND end > DTSTART)            |
            (Some(dtend), _) => start < dtend && end > &dtstart,
            //       | N | Y | Y | * | (start <  DTSTART+DURATION AND end > DTSTART) |
            //       |   |   | N | * | (start <= DTSTART AND end > DTSTART)          |
            (_, Some(duration)) if *duration > TimeDelta::zero() => {
                *start < offset(dtstart, *duration) && end > &dtstart
            }
            (_, Some(_)) => start <= &dtstart && end > &dtstart,
            //       | N | N | N | Y | (start <  DTSTART+P1D AND end > DTSTART)     |
            _ if self.dtstart_is_date => {
                *start < offset(dtstart, TimeDelta::days(1)) && end > &dtstart
            }
            //       | N | N | N | N | (start <= DTSTART AND end > DTSTART)          |
            _ => start <= &dtstart && end > &dtstart,
        }
    }

    fn todo_overlaps(&self, start: &DateTime<Utc>, end: &DateTime<Utc>) -> bool {
        match (
            self.dtstart,
            self.duration,
            self.due,
            self.completed,
            self.created,
        ) {
            //    | Y | Y | N | * | * | (start  <= DTSTART+DURATION)  AND             |
            //    |   |   |   |   |   | ((end   >  DTSTART)  OR                       |
            //    |   |   |   |   |   |  (end   >= DTSTART+DURATION))                 |
            (Some(dtstart), Some(duration), None, _, _) => {
                let until = offset(dtstart, duration);
                *start <= until && (*end > dtstart || *end >= until)
            }
            //    | Y | N | Y | * | * | ((start <  DUE)      OR  (start <= DTSTART))  |
            //    |   |   |   |   |   | AND                                           |
            //    |   |   |   |   |   | ((end   >  DTSTART)  OR  (end   >= DUE))      |
            (Some(dtstart), _, Some(due), _, _) => {
                (*start < due || *start <= dtstart) && (*end > dtstart || *end >= due)
            }
            //    | Y | N | N | * | * | (start  <= DTSTART)  AND (end >  DTSTART)     |
            (Some(dtstart), None, None, _, _) => *start <= dtstart && *end > dtstart,
            //    | N | N | Y | * | * | (start  <  DUE)      AND (end >= DUE)         |
            (None, _, Some(due), _, _) => *start < due && *end >= due,
            //    | N | N | N | Y | Y | ((start <= CREATED)  OR  (start <= COMPLETED))|
            //    |   |   |   |   |   | AND                                           |
            //    |   |   |   |   |   | ((end   >= CREATED)  OR  (end   >= COMPLETED))|
            (None, _, None, Some(completed), Some(created)) => {
                (*start <= created || *start <= completed)
                    && (*end >= created || *end >= completed)
            }
            //    | N | N | N | Y | N | (start  <= COMPLETED) AND (end  >= COMPLETED) |
            (None, _, None, Some(completed), None) => *start <= completed && *end >= completed,
            //    | N | N | N | N | Y | (end    >  CREATED)                           |
            (None, _, None, None, Some(created)) => *end > created,
            //    | N | N | N | N | N | TRUE                                          |
            _ => true,
        }
    }

    fn journal_overlaps(&self, start: &DateTime<Utc>, end: &DateTime<Utc>) -> bool {
        match self.dtstart {
            //    | Y | Y | (start <= DTSTART)     AND (end > DTSTART+P1D) |
            Some(dtstart) if self.dtstart_is_date => {
                *start < offset(dtstart, TimeDelta::days(1)) && *end > dtstart
            }
            //    | Y | N | (start <= DTSTART)     AND (end > DTSTART) |
            Some(dtstart) => *start <= dtstart && *end > dtstart,
            //    | N | * | FALSE                                      |
            None => false,
        }
    }
}

/// `date + delta`, clamped to the representable range
fn offset(date: DateTime<Utc>, delta: TimeDelta) -> DateTime<Utc> {
    match date.checked_add_signed(delta) {
        Some(moved) => moved,
        None if delta < TimeDelta::zero() => DateTime::<Utc>::MIN_UTC,
        None => DateTime::<Utc>::MAX_UTC,
    }
}

/// Check every instance of a possibly recurring component against the range
fn is_instance_in_range(
    component: &cal::Component,
    properties: &[Property],
    overridden: &[DateTime<Utc>],
    time_range: &cal::TimeRange,
) -> bool {
    let (start, end) = time_range.bounds();
    let master = Instance::new(properties);
    let check = |instance: &Instance| match component {
        cal::Component::VEvent => instance.event_overlaps(&start, &end),
        cal::Component::VTodo => instance.todo_overlaps(&start, &end),
        _ => instance.journal_overlaps(&start, &end),
    };

    let mut recurrence = Recurrence::from_properties(properties);
    let dtstart = match master.dtstart {
        Some(dtstart) if recurrence.is_recurring() => dtstart,
        _ => return check(&master),
    };
    recurrence.exclude(overridden.iter().copied());

    if !recurrence.is_excluded(&dtstart) && check(&master) {
        return true;
    }

    // Only instances starting in [start - span, end] can overlap the range
    let one_sec = TimeDelta::seconds(1);
    let after = match time_range {
        cal::TimeRange::OnlyEnd(_) => None,
        _ => master
            .span()
            .checked_add(&one_sec)
            .and_then(|widen| start.checked_sub_signed(widen)),
    };
    let before = match time_range {
        cal::TimeRange::OnlyStart(_) => None,
        _ => Some(end),
    };
    match recurrence.between(dtstart, after, before, OVERLAP_SCAN) {
        Ok(occurrences) => occurrences
            .into_iter()
            .any(|occ| check(&master.shifted(occ - dtstart))),
        Err(e) => {
            tracing::warn!(err=?e, "unable to expand recurrence, only the first instance is checked");
            false
        }
    }
}

fn resolve_trigger(parent: &IcalComponent, properties: &[Property]) -> Option<DateTime<Utc>> {
    // A. Do we have a TRIGGER property? If not, returns early
    let trigger_prop = find_prop(properties, "TRIGGER")?;

    // B.1 Is it an absolute datetime? If so, returns early
    let is_absolute = trigger_prop.params.iter().any(|param| {
        param.key.as_str().eq_ignore_ascii_case("VALUE")
            && param.val.as_ref().map(|v| v.as_str()) == Some("DATE-TIME")
    });

    if is_absolute {
        let final_date = parser::date_time(trigger_prop.val.as_str());
        tracing::trace!(trigger=?final_date, "resolved absolute trigger");
        return final_date;
    }

    // B.2 Otherwise it's a timedelta relative to a parent field.
    // C.1 Parse the timedelta value, returns early if invalid
    let (_, time_delta) = parser::dur_value(trigger_prop.val.as_str()).ok()?;

    // C.2 Get the parent reference absolute datetime, returns early if invalid
    let related_end = trigger_prop
        .params
        .iter()
        .find(|param| param.key.as_str().eq_ignore_ascii_case("RELATED"))
        .and_then(|param| param.val.as_ref())
        .map(|v| v.as_str() == "END")
        .unwrap_or(false);

    // If the trigger is set relative to START, then the "DTSTART" property MUST be present in the associated
    // "VEVENT" or "VTODO" calendar component.
    //
    // If an alarm is specified for an event with the trigger set relative to the END,
    // then the "DTEND" property or the "DTSTART" and "DURATION " properties MUST be present
    // in the associated "VEVENT" calendar component.
    //
    // If the alarm is specified for a to-do with a trigger set relative to the END,
    // then either the "DUE" property or the "DTSTART" and "DURATION " properties
    // MUST be present in the associated "VTODO" calendar component.
    let parent_props = parent.properties.as_ref();
    let parent_date = if related_end {
        prop_date(parent_props, "DTEND")
            .or_else(|| prop_date(parent_props, "DUE"))
            .or_else(|| {
                let dtstart = prop_date(parent_props, "DTSTART")?;
                let duration = prop_duration(parent_props, "DURATION")?;
                dtstart.checked_add_signed(duration)
            })?
    } else {
        prop_date(parent_props, "DTSTART")?
    };

    // C.3 Compute the final date from the base date + timedelta
    let final_date = parent_date.checked_add_signed(time_delta)?;
    tracing::trace!(trigger=?final_date, "resolved relative trigger");
    Some(final_date)
}

fn is_in_time_range(
    component: &cal::Component,
    parent: &IcalComponent,
    target: &IcalComponent,
    overridden: &[DateTime<Utc>],
    time_range: &cal::TimeRange,
) -> bool {
    //@FIXME timezones are not properly handled currently (everything is UTC)
    let properties: &[Property] = target.properties.as_ref();
    let (start, end) = time_range.bounds();

    match component {
        cal::Component::VEvent | cal::Component::VTodo | cal::Component::VJournal => {
            is_instance_in_range(component, properties, overridden, time_range)
        }
        cal::Component::VFreeBusy => {
            let maybe_dtstart = prop_date(properties, "DTSTART");
            let maybe_dtend = prop_date(properties, "DTEND");
            let periods = properties
                .iter()
                .filter(|p| p.name.as_str().eq_ignore_ascii_case("FREEBUSY"))
                .flat_map(|p| p.val.as_str().split(',').filter_map(parser::period).collect::<Vec<_>>())
                .collect::<Vec<_>>();

            match (maybe_dtstart, maybe_dtend) {
                //    | Y | Y | * | (start <= DTEND) AND (end > DTSTART) |
                (Some(dtstart), Some(dtend)) => start <= dtend && end > dtstart,
                //    | N | N | Y | (start < freebusy-period-end) AND    |
                //    |   |   |   | (end > freebusy-period-start)        |
                _ if !periods.is_empty() => periods
                    .iter()
                    .any(|(p_start, p_end)| start < *p_end && end > *p_start),
                //    | N | N | N | FALSE                                |
                _ => false,
            }
        }
        cal::Component::VAlarm => {
            let trigger_time = match resolve_trigger(parent, properties) {
                Some(v) => v,
                _ => return false,
            };

            // An alarm with REPEAT fires again every DURATION
            let repeat = find_prop(properties, "REPEAT")
                .and_then(|p| p.val.as_str().parse::<u32>().ok())
                .unwrap_or(0);
            let interval = prop_duration(properties, "DURATION").unwrap_or(TimeDelta::zero());
            (0..=repeat)
                .filter_map(|n| {
                    interval
                        .checked_mul(n as i32)
                        .and_then(|offset| trigger_time.checked_add_signed(offset))
                })
                //  (start <= trigger-time) AND (end > trigger-time)
                .any(|fire| start <= fire && end > fire)
        }
        _ => false,
    }
}
