use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use almanac_ical::filter::Component;
use almanac_ical::Classification;

macro_rules! opaque_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

opaque_id!(
    /// Backend chosen, stable identifier of one calendar instance
    CalendarId
);
opaque_id!(
    /// Opaque marker of a calendar state, see `SyncSupport`
    SyncToken
);
opaque_id!(SubscriptionId);

/// Content fingerprint of a calendar object: hex SHA-256 of its raw bytes.
///
/// Two different contents sharing a fingerprint is accepted as the hash
/// collision risk, nothing relies on etags being unique.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Etag(String);

impl Etag {
    pub fn from_data(data: &[u8]) -> Self {
        Self(hex::encode(Sha256::digest(data)))
    }

    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// HTTP entity tag form
    pub fn quoted(&self) -> String {
        format!("\"{}\"", self.0)
    }
}

impl fmt::Display for Etag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Components serialized by name, the filter tree itself stays serde free
mod component_names {
    use super::Component;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(comps: &[Component], s: S) -> Result<S::Ok, S::Error> {
        comps
            .iter()
            .map(|c| c.as_str())
            .collect::<Vec<_>>()
            .serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<Component>, D::Error> {
        let names = Vec::<String>::deserialize(d)?;
        Ok(names.into_iter().map(Component::new).collect())
    }
}

pub const DEFAULT_COMPONENTS: [Component; 2] = [Component::VEvent, Component::VTodo];

/// Typed calendar properties plus the vendor ones, keyed in clark notation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CalendarProperties {
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub color: Option<String>,
    pub order: Option<i32>,
    pub timezone: Option<String>,
    /// Empty means the backend default, VEVENT and VTODO
    #[serde(with = "component_names")]
    pub supported_components: Vec<Component>,
    /// schedule-calendar-transp, events do not block free/busy time
    pub transparent: bool,
    pub published: bool,
    pub extra: BTreeMap<String, String>,
}

impl CalendarProperties {
    pub fn named(display_name: impl Into<String>) -> Self {
        Self {
            display_name: Some(display_name.into()),
            ..Self::default()
        }
    }

    pub fn supports(&self, component: &Component) -> bool {
        if self.supported_components.is_empty() {
            return DEFAULT_COMPONENTS.contains(component);
        }
        self.supported_components.contains(component)
    }
}

/// A property update. `Some(None)` clears a property, `None` leaves it as is.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CalendarPatch {
    pub display_name: Option<Option<String>>,
    pub description: Option<Option<String>>,
    pub color: Option<Option<String>>,
    pub order: Option<Option<i32>>,
    pub timezone: Option<Option<String>>,
    pub transparent: Option<bool>,
    pub extra: BTreeMap<String, Option<String>>,
}

impl CalendarPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn apply(self, props: &mut CalendarProperties) {
        if let Some(v) = self.display_name {
            props.display_name = v;
        }
        if let Some(v) = self.description {
            props.description = v;
        }
        if let Some(v) = self.color {
            props.color = v;
        }
        if let Some(v) = self.order {
            props.order = v;
        }
        if let Some(v) = self.timezone {
            props.timezone = v;
        }
        if let Some(v) = self.transparent {
            props.transparent = v;
        }
        for (key, val) in self.extra {
            match val {
                Some(v) => props.extra.insert(key, v),
                None => props.extra.remove(&key),
            };
        }
    }
}

/// Share access levels, with the numbering used by DAV sharing extensions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShareAccess {
    NotShared = 0,
    Owner = 1,
    Read = 2,
    ReadWrite = 3,
    NoAccess = 4,
}

impl ShareAccess {
    pub fn code(&self) -> u8 {
        *self as u8
    }

    pub fn is_read_only(&self) -> bool {
        matches!(self, Self::Read)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InviteStatus {
    NoResponse = 1,
    Accepted = 2,
    Declined = 3,
    Invalid = 4,
}

/// Sharing state of one calendar instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareInfo {
    /// Identical across every instance of the same calendar
    pub resource_uri: String,
    pub access: ShareAccess,
    pub owner_principal: String,
}

impl ShareInfo {
    pub fn read_only(&self) -> bool {
        self.access.is_read_only()
    }
}

/// One principal's view of a calendar
#[derive(Debug, Clone, PartialEq)]
pub struct Calendar {
    pub id: CalendarId,
    pub uri: String,
    pub principal_uri: String,
    pub sync_token: Option<SyncToken>,
    pub properties: CalendarProperties,
    pub share: Option<ShareInfo>,
}

impl Calendar {
    /// Owned calendars either carry no share info or are the owner's instance
    pub fn is_owned_by(&self, principal_uri: &str) -> bool {
        self.principal_uri == principal_uri
            && self
                .share
                .as_ref()
                .map_or(true, |s| s.owner_principal == principal_uri)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CalendarObject {
    pub calendar_id: CalendarId,
    pub uri: String,
    /// Bulk listings may leave the data out
    pub calendar_data: Option<Vec<u8>>,
    pub etag: Option<Etag>,
    pub size: u64,
    /// Milliseconds since the UNIX epoch
    pub last_modified: u64,
    pub component: Option<Component>,
    /// Left out by backends that do not denormalize CLASS
    pub classification: Option<Classification>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SchedulingObject {
    pub principal_uri: String,
    pub uri: String,
    pub calendar_data: Option<Vec<u8>>,
    pub etag: Option<Etag>,
    pub size: u64,
    pub last_modified: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareInvite {
    /// Addressee, usually a mailto: or principal uri
    pub href: String,
    /// Resolved principal of the addressee, if any
    pub principal: Option<String>,
    pub access: ShareAccess,
    pub invite_status: InviteStatus,
    pub display_name: Option<String>,
}

impl ShareInvite {
    pub fn new(href: impl Into<String>, principal: Option<String>, access: ShareAccess) -> Self {
        Self {
            href: href.into(),
            principal,
            access,
            invite_status: InviteStatus::NoResponse,
            display_name: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SystemStatusLevel {
    Low = 1,
    Medium = 2,
    High = 3,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationKind {
    /// Sent to a sharee when a calendar is shared with them
    ShareInvite {
        sharer: String,
        resource_uri: String,
        calendar_uri: String,
        access: ShareAccess,
        invite_status: InviteStatus,
        display_name: Option<String>,
        supported_components: Vec<String>,
    },
    /// Sent to the owner when a sharee answers an invite
    InviteReply {
        sharee: String,
        resource_uri: String,
        in_reply_to: String,
        status: InviteStatus,
        summary: Option<String>,
    },
    SystemStatus {
        level: SystemStatusLevel,
        description: Option<String>,
        href: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub principal_uri: String,
    pub etag: Etag,
    pub created: u64,
    pub kind: NotificationKind,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionProperties {
    /// Remote iCalendar feed, mandatory
    pub source: String,
    pub display_name: Option<String>,
    pub color: Option<String>,
    pub order: Option<i32>,
    pub refresh_rate: Option<String>,
    pub strip_todos: bool,
    pub strip_alarms: bool,
    pub strip_attachments: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionPatch {
    pub source: Option<String>,
    pub display_name: Option<Option<String>>,
    pub color: Option<Option<String>>,
    pub order: Option<Option<i32>>,
    pub refresh_rate: Option<Option<String>>,
    pub strip_todos: Option<bool>,
    pub strip_alarms: Option<bool>,
    pub strip_attachments: Option<bool>,
}

impl SubscriptionPatch {
    pub fn apply(self, props: &mut SubscriptionProperties) {
        if let Some(v) = self.source {
            props.source = v;
        }
        if let Some(v) = self.display_name {
            props.display_name = v;
        }
        if let Some(v) = self.color {
            props.color = v;
        }
        if let Some(v) = self.order {
            props.order = v;
        }
        if let Some(v) = self.refresh_rate {
            props.refresh_rate = v;
        }
        if let Some(v) = self.strip_todos {
            props.strip_todos = v;
        }
        if let Some(v) = self.strip_alarms {
            props.strip_alarms = v;
        }
        if let Some(v) = self.strip_attachments {
            props.strip_attachments = v;
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub uri: String,
    pub principal_uri: String,
    pub properties: SubscriptionProperties,
    pub last_modified: u64,
}

/// Descent depth of a sync report. Calendars are flat so both levels
/// produce the same answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncLevel {
    #[default]
    One,
    Infinite,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChangeSet {
    pub sync_token: SyncToken,
    pub added: Vec<String>,
    pub modified: Vec<String>,
    pub deleted: Vec<String>,
    /// More changes are available, ask again with `sync_token`
    pub truncated: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn etag_follows_content() {
        let a = Etag::from_data(b"BEGIN:VCALENDAR");
        let b = Etag::from_data(b"BEGIN:VCALENDAR");
        let c = Etag::from_data(b"BEGIN:VCALENDAR\r\n");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.as_str().len(), 64);
        assert!(a.quoted().starts_with('"') && a.quoted().ends_with('"'));
    }

    #[test]
    fn patch_sets_and_clears() {
        let mut props = CalendarProperties::named("Work");
        props.extra.insert("{urn:x}keep".into(), "1".into());
        props.extra.insert("{urn:x}drop".into(), "2".into());

        let mut patch = CalendarPatch {
            display_name: Some(None),
            color: Some(Some("#ff0000".into())),
            ..CalendarPatch::default()
        };
        patch.extra.insert("{urn:x}drop".into(), None);
        assert!(!patch.is_empty());
        patch.apply(&mut props);

        assert_eq!(props.display_name, None);
        assert_eq!(props.color.as_deref(), Some("#ff0000"));
        assert_eq!(props.extra.len(), 1);
        assert!(props.extra.contains_key("{urn:x}keep"));
    }

    #[test]
    fn default_component_set() {
        let props = CalendarProperties::default();
        assert!(props.supports(&Component::VEvent));
        assert!(props.supports(&Component::VTodo));
        assert!(!props.supports(&Component::VJournal));

        let journal = CalendarProperties {
            supported_components: vec![Component::VJournal],
            ..CalendarProperties::default()
        };
        assert!(journal.supports(&Component::VJournal));
        assert!(!journal.supports(&Component::VEvent));
    }

    #[test]
    fn ownership() {
        let mut cal = Calendar {
            id: "1".into(),
            uri: "home".into(),
            principal_uri: "principals/alice".into(),
            sync_token: None,
            properties: CalendarProperties::default(),
            share: None,
        };
        assert!(cal.is_owned_by("principals/alice"));
        cal.share = Some(ShareInfo {
            resource_uri: "/ns/share/1".into(),
            access: ShareAccess::Read,
            owner_principal: "principals/bob".into(),
        });
        assert!(!cal.is_owned_by("principals/alice"));
        assert!(cal.share.as_ref().unwrap().read_only());
    }
}
