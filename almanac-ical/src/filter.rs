use chrono::{DateTime, Utc};

pub const FLOATING_DATETIME_FMT: &str = "%Y%m%dT%H%M%S";
pub const UTC_DATETIME_FMT: &str = "%Y%m%dT%H%M%SZ";
pub const DATE_FMT: &str = "%Y%m%d";

/// Name:  filter
///
/// Namespace:  urn:ietf:params:xml:ns:caldav
///
/// Purpose:  Specifies a filter to limit the set of calendar components
/// returned by the server.
///
/// Description:  The CALDAV:filter XML element specifies the search
/// filter used to limit the calendar components returned by a
/// calendaring REPORT request.
///
/// <!ELEMENT filter (comp-filter)>
#[derive(Debug, PartialEq, Clone)]
pub struct Filter(pub CompFilter);

impl Filter {
    /// A filter selecting every calendar object resource
    pub fn all() -> Self {
        Self(CompFilter {
            name: Component::VCalendar,
            additional_rules: None,
        })
    }

    /// `VCALENDAR > {component}` without any further condition
    pub fn component(name: Component) -> Self {
        Self::inner(CompFilter {
            name,
            additional_rules: None,
        })
    }

    /// Wrap a single component filter under the mandatory VCALENDAR root
    pub fn inner(comp: CompFilter) -> Self {
        Self(CompFilter {
            name: Component::VCalendar,
            additional_rules: Some(CompFilterRules::Matches(CompFilterMatch {
                time_range: None,
                prop_filter: vec![],
                comp_filter: vec![comp],
            })),
        })
    }

    /// True when the filter only asserts the presence of VCALENDAR,
    /// which every stored calendar object satisfies.
    pub fn is_trivial(&self) -> bool {
        if self.0.name != Component::VCalendar {
            return false;
        }
        match &self.0.additional_rules {
            None => true,
            Some(CompFilterRules::IsNotDefined) => false,
            Some(CompFilterRules::Matches(m)) => {
                m.time_range.is_none() && m.prop_filter.is_empty() && m.comp_filter.is_empty()
            }
        }
    }

    /// The component type the filter targets right under VCALENDAR, if it
    /// targets exactly one and does not negate it.
    pub fn target_component(&self) -> Option<&CompFilter> {
        let m = match &self.0.additional_rules {
            Some(CompFilterRules::Matches(m)) => m,
            _ => return None,
        };
        if m.comp_filter.len() != 1 || !m.prop_filter.is_empty() || m.time_range.is_some() {
            return None;
        }
        let inner = &m.comp_filter[0];
        match inner.additional_rules {
            Some(CompFilterRules::IsNotDefined) => None,
            _ => Some(inner),
        }
    }
}

/// Name:  comp-filter
///
/// Namespace:  urn:ietf:params:xml:ns:caldav
///
/// Purpose:  Specifies search criteria on calendar components.
///
/// Description:  The CALDAV:comp-filter XML element specifies a query
/// targeted at the calendar object (i.e., VCALENDAR) or at a specific
/// calendar component type (e.g., VEVENT).  The scope of the
/// CALDAV:comp-filter XML element is the calendar object when used as
/// a child of the CALDAV:filter XML element.  The scope of the
/// CALDAV:comp-filter XML element is the enclosing calendar component
/// when used as a child of another CALDAV:comp-filter XML element.  A
/// CALDAV:comp-filter is said to match if:
///
/// *  The CALDAV:comp-filter XML element is empty and the calendar
///    object or calendar component type specified by the "name"
///    attribute exists in the current scope;
///
/// or:
///
/// *  The CALDAV:comp-filter XML element contains a CALDAV:is-not-
///    defined XML element and the calendar object or calendar
///    component type specified by the "name" attribute does not exist
///    in the current scope;
///
/// or:
///
/// *  The CALDAV:comp-filter XML element contains a CALDAV:time-range
///    XML element and at least one recurrence instance in the
///    targeted calendar component is scheduled to overlap the
///    specified time range, and all specified CALDAV:prop-filter and
///    CALDAV:comp-filter child XML elements also match the targeted
///    calendar component;
///
/// or:
///
/// *  The CALDAV:comp-filter XML element only contains CALDAV:prop-
///    filter and CALDAV:comp-filter child XML elements that all match
///    the targeted calendar component.
///
/// <!ELEMENT comp-filter (is-not-defined | (time-range?,
///                         prop-filter*, comp-filter*))>
///
/// <!ATTLIST comp-filter name CDATA #REQUIRED>
#[derive(Debug, PartialEq, Clone)]
pub struct CompFilter {
    pub name: Component,
    // Option 1 = None, Option 2, 3, 4 = Some
    pub additional_rules: Option<CompFilterRules>,
}

#[derive(Debug, PartialEq, Clone)]
pub enum CompFilterRules {
    // Option 2
    IsNotDefined,
    // Options 3 & 4
    Matches(CompFilterMatch),
}

#[derive(Debug, PartialEq, Clone)]
pub struct CompFilterMatch {
    pub time_range: Option<TimeRange>,
    pub prop_filter: Vec<PropFilter>,
    pub comp_filter: Vec<CompFilter>,
}

/// Name:  prop-filter
///
/// Namespace:  urn:ietf:params:xml:ns:caldav
///
/// Purpose:  Specifies search criteria on calendar properties.
///
/// Description:  The CALDAV:prop-filter XML element specifies a query
/// targeted at a specific calendar property (e.g., CATEGORIES) in the
/// scope of the enclosing calendar component.  A calendar property is
/// said to match a CALDAV:prop-filter if:
///
/// *  The CALDAV:prop-filter XML element is empty and a property of
///    the type specified by the "name" attribute exists in the
///    enclosing calendar component;
///
/// or:
///
/// *  The CALDAV:prop-filter XML element contains a CALDAV:is-not-
///    defined XML element and no property of the type specified by
///    the "name" attribute exists in the enclosing calendar
///    component;
///
/// or:
///
/// *  The CALDAV:prop-filter XML element contains a CALDAV:time-range
///    XML element and the property value overlaps the specified time
///    range, and all specified CALDAV:param-filter child XML elements
///    also match the targeted property;
///
/// or:
///
/// *  The CALDAV:prop-filter XML element contains a CALDAV:text-match
///    XML element and the property value matches it, and all
///    specified CALDAV:param-filter child XML elements also match the
///    targeted property;
///
/// <!ELEMENT prop-filter (is-not-defined |
///                         ((time-range | text-match)?,
///                          param-filter*))>
///
/// <!ATTLIST prop-filter name CDATA #REQUIRED>
#[derive(Debug, PartialEq, Clone)]
pub struct PropFilter {
    pub name: String,
    // None = Option 1, Some() = Option 2, 3 & 4
    pub additional_rules: Option<PropFilterRules>,
}

#[derive(Debug, PartialEq, Clone)]
pub enum PropFilterRules {
    // Option 2
    IsNotDefined,
    // Options 3 & 4
    Match(PropFilterMatch),
}

#[derive(Debug, PartialEq, Clone)]
pub struct PropFilterMatch {
    pub time_or_text: Option<TimeOrText>,
    pub param_filter: Vec<ParamFilter>,
}

#[derive(Debug, PartialEq, Clone)]
pub enum TimeOrText {
    Time(TimeRange),
    Text(TextMatch),
}

/// Name:  text-match
///
/// Namespace:  urn:ietf:params:xml:ns:caldav
///
/// Purpose:  Specifies a substring match on a property or parameter
/// value.
///
/// Description:  The CALDAV:text-match XML element specifies text used
/// for a substring match against the property or parameter value
/// specified in a calendaring REPORT request.
///
/// The "collation" attribute is used to select the collation that the
/// server MUST use for character string matching.  In the absence of
/// this attribute, the server MUST use the "i;ascii-casemap"
/// collation.
///
/// The "negate-condition" attribute is used to indicate that this test
/// returns a match if the text matches when the attribute value is set
/// to "no", or return a match if the text does not match, if the
/// attribute value is set to "yes".
///
/// <!ELEMENT text-match (#PCDATA)>
/// PCDATA value: string
///
/// <!ATTLIST text-match collation        CDATA "i;ascii-casemap"
///                      negate-condition (yes | no) "no">
#[derive(Debug, PartialEq, Clone)]
pub struct TextMatch {
    pub collation: Option<Collation>,
    pub negate_condition: Option<bool>,
    pub text: String,
}

impl TextMatch {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            collation: None,
            negate_condition: None,
            text: text.into(),
        }
    }

    pub fn with_collation(mut self, collation: Collation) -> Self {
        self.collation = Some(collation);
        self
    }

    pub fn negated(mut self) -> Self {
        self.negate_condition = Some(true);
        self
    }
}

/// CalDAV servers are REQUIRED to support the "i;ascii-casemap" and
/// "i;octet" collations, as described in [RFC4790], and MAY support
/// other collations.
#[derive(Debug, PartialEq, Clone, Default)]
pub enum Collation {
    #[default]
    AsciiCaseMap,
    Octet,
    Unknown(String),
}

impl Collation {
    pub fn as_str(&self) -> &str {
        match self {
            Self::AsciiCaseMap => "i;ascii-casemap",
            Self::Octet => "i;octet",
            Self::Unknown(c) => c.as_str(),
        }
    }

    pub fn new(src: &str) -> Self {
        match src {
            "i;ascii-casemap" | "default" => Self::AsciiCaseMap,
            "i;octet" => Self::Octet,
            _ => Self::Unknown(src.into()),
        }
    }
}

/// Name:  param-filter
///
/// Namespace:  urn:ietf:params:xml:ns:caldav
///
/// Purpose:  Limits the search to specific parameter values.
///
/// Description:  The CALDAV:param-filter XML element specifies a query
/// targeted at a specific calendar property parameter (e.g.,
/// PARTSTAT) in the scope of the calendar property on which it is
/// defined.  A calendar property parameter is said to match a CALDAV:
/// param-filter if:
///
/// *  The CALDAV:param-filter XML element is empty and a parameter of
///    the type specified by the "name" attribute exists on the
///    calendar property being examined;
///
/// or:
///
/// *  The CALDAV:param-filter XML element contains a CALDAV:is-not-
///    defined XML element and no parameter of the type specified by
///    the "name" attribute exists on the calendar property being
///    examined;
///
/// <!ELEMENT param-filter (is-not-defined | text-match?)>
///
/// <!ATTLIST param-filter name CDATA #REQUIRED>
#[derive(Debug, PartialEq, Clone)]
pub struct ParamFilter {
    pub name: String,
    pub additional_rules: Option<ParamFilterMatch>,
}

#[derive(Debug, PartialEq, Clone)]
pub enum ParamFilterMatch {
    IsNotDefined,
    Match(TextMatch),
}

/// Name:  time-range
///
/// Namespace:  urn:ietf:params:xml:ns:caldav
///
/// Purpose:  Specifies a time range to limit the set of calendar
/// components returned by the server.
///
/// Description:  The CALDAV:time-range XML element specifies that for a
/// given calendaring REPORT request, the server MUST only return the
/// calendar object resources that, depending on the context, have a
/// component or property whose value intersects a specified time
/// range.
///
/// Both attributes specify a date with UTC time value.  The value of
/// the "end" attribute MUST be greater than the value of the "start"
/// attribute.
///
/// <!ELEMENT time-range EMPTY>
///
/// <!ATTLIST time-range start CDATA #IMPLIED
///                      end   CDATA #IMPLIED>
#[derive(Debug, PartialEq, Clone)]
pub enum TimeRange {
    OnlyStart(DateTime<Utc>),
    OnlyEnd(DateTime<Utc>),
    FullRange(DateTime<Utc>, DateTime<Utc>),
}

impl TimeRange {
    pub fn new(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Option<Self> {
        match (start, end) {
            (Some(s), Some(e)) => Some(Self::FullRange(s, e)),
            (Some(s), None) => Some(Self::OnlyStart(s)),
            (None, Some(e)) => Some(Self::OnlyEnd(e)),
            (None, None) => None,
        }
    }

    /// Open bounds are replaced by the minimum/maximum representable instants
    pub fn bounds(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        match self {
            Self::OnlyStart(start) => (*start, DateTime::<Utc>::MAX_UTC),
            Self::OnlyEnd(end) => (DateTime::<Utc>::MIN_UTC, *end),
            Self::FullRange(start, end) => (*start, *end),
        }
    }
}

/// Calendar component names as they appear in BEGIN:/END: lines
#[derive(Debug, PartialEq, Eq, Clone, Hash, PartialOrd, Ord)]
pub enum Component {
    VCalendar,
    VJournal,
    VFreeBusy,
    VEvent,
    VTodo,
    VAlarm,
    VTimeZone,
    Unknown(String),
}

impl Component {
    pub fn new(comp: String) -> Self {
        match comp.to_ascii_uppercase().as_str() {
            "VCALENDAR" => Self::VCalendar,
            "VJOURNAL" => Self::VJournal,
            "VFREEBUSY" => Self::VFreeBusy,
            "VEVENT" => Self::VEvent,
            "VTODO" => Self::VTodo,
            "VALARM" => Self::VAlarm,
            "VTIMEZONE" => Self::VTimeZone,
            _ => Self::Unknown(comp),
        }
    }

    pub fn as_str<'a>(&'a self) -> &'a str {
        match self {
            Self::VCalendar => "VCALENDAR",
            Self::VJournal => "VJOURNAL",
            Self::VFreeBusy => "VFREEBUSY",
            Self::VEvent => "VEVENT",
            Self::VTodo => "VTODO",
            Self::VAlarm => "VALARM",
            Self::VTimeZone => "VTIMEZONE",
            Self::Unknown(c) => c,
        }
    }

    /// Components a calendar object resource can be stored for
    pub fn is_resource_kind(&self) -> bool {
        matches!(self, Self::VEvent | Self::VTodo | Self::VJournal)
    }
}

impl std::fmt::Display for Component {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Component {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trivial_filter() {
        assert!(Filter::all().is_trivial());
        assert!(!Filter::component(Component::VEvent).is_trivial());
    }

    #[test]
    fn target_component() {
        let f = Filter::component(Component::VTodo);
        assert_eq!(f.target_component().map(|c| &c.name), Some(&Component::VTodo));

        let negated = Filter::inner(CompFilter {
            name: Component::VEvent,
            additional_rules: Some(CompFilterRules::IsNotDefined),
        });
        assert!(negated.target_component().is_none());
    }

    #[test]
    fn component_names() {
        assert_eq!(Component::new("vevent".into()), Component::VEvent);
        assert_eq!(
            Component::new("X-THING".into()),
            Component::Unknown("X-THING".into())
        );
        assert_eq!(Component::VTimeZone.as_str(), "VTIMEZONE");
    }
}
