use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use almanac_collections::error::{Error, Result};
use almanac_collections::types::{
    CalendarId, CalendarProperties, ShareAccess, DEFAULT_COMPONENTS,
};

use crate::calendar::Calendar;
use crate::unique_ident::{gen_ident, UniqueIdent};

/// Every instance of a calendar shares this resource uri prefix
pub const SHARE_PREFIX: &str = "/ns/share/";

pub fn resource_uri(calendar: UniqueIdent) -> String {
    format!("{}{}", SHARE_PREFIX, calendar)
}

pub fn parse_resource_uri(uri: &str) -> Option<UniqueIdent> {
    uri.strip_prefix(SHARE_PREFIX)
        .and_then(|id| UniqueIdent::from_str(id).ok())
}

/// Namespaces keep no invariant across a panic, a poisoned lock is reused
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// One principal's view of a calendar. Properties are per instance so
/// that a sharee can rename or recolor the calendar for itself.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Instance {
    pub calendar: UniqueIdent,
    pub principal_uri: String,
    pub uri: String,
    pub owner: String,
    pub access: ShareAccess,
    pub properties: CalendarProperties,
}

impl Instance {
    pub fn is_owner(&self) -> bool {
        self.access == ShareAccess::Owner
    }
}

/// Resolved calendar instance
pub struct Handle {
    pub id: UniqueIdent,
    pub instance: Instance,
    pub calendar: Arc<Calendar>,
}

/// Calendars and their instances. Guarded by a short lived mutex that is
/// never held across an await point: calendar contents are behind the
/// calendar's own lock.
#[derive(Default)]
pub struct CalendarNs(Mutex<NsInternal>);

#[derive(Default)]
struct NsInternal {
    calendars: HashMap<UniqueIdent, Arc<Calendar>>,
    instances: BTreeMap<UniqueIdent, Instance>,
}

impl NsInternal {
    fn handle(&self, id: UniqueIdent) -> Option<Handle> {
        let instance = self.instances.get(&id)?;
        let calendar = self.calendars.get(&instance.calendar)?;
        Some(Handle {
            id,
            instance: instance.clone(),
            calendar: calendar.clone(),
        })
    }

    fn find(&self, principal_uri: &str, uri: &str) -> Option<UniqueIdent> {
        self.instances
            .iter()
            .find(|(_, inst)| inst.principal_uri == principal_uri && inst.uri == uri)
            .map(|(id, _)| *id)
    }
}

impl CalendarNs {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn restore(
        calendars: Vec<Arc<Calendar>>,
        instances: BTreeMap<UniqueIdent, Instance>,
    ) -> Self {
        let calendars = calendars.into_iter().map(|c| (c.id, c)).collect();
        Self(Mutex::new(NsInternal {
            calendars,
            instances,
        }))
    }

    fn lock(&self) -> MutexGuard<'_, NsInternal> {
        lock(&self.0)
    }

    /// Resolve a calendar id handed out by the store
    pub fn open(&self, id: &CalendarId) -> Result<Handle> {
        UniqueIdent::from_str(id.as_str())
            .ok()
            .and_then(|ident| self.lock().handle(ident))
            .ok_or_else(|| Error::NotFound(format!("calendar {}", id)))
    }

    pub fn list(&self, principal_uri: &str) -> Vec<Handle> {
        let ns = self.lock();
        ns.instances
            .iter()
            .filter(|(_, inst)| inst.principal_uri == principal_uri)
            .filter_map(|(id, _)| ns.handle(*id))
            .collect()
    }

    /// Instance of the principal at `uri`
    pub fn find(&self, principal_uri: &str, uri: &str) -> Option<Handle> {
        let ns = self.lock();
        ns.find(principal_uri, uri).and_then(|id| ns.handle(id))
    }

    /// Instances of one calendar, the owner's included
    pub fn instances_of(&self, calendar: UniqueIdent) -> Vec<Handle> {
        let ns = self.lock();
        ns.instances
            .iter()
            .filter(|(_, inst)| inst.calendar == calendar)
            .filter_map(|(id, _)| ns.handle(*id))
            .collect()
    }

    pub fn calendar(&self, calendar: UniqueIdent) -> Option<Arc<Calendar>> {
        self.lock().calendars.get(&calendar).cloned()
    }

    /// New calendar with its owner instance
    pub fn create(
        &self,
        principal_uri: &str,
        uri: &str,
        mut properties: CalendarProperties,
        retained: Option<usize>,
    ) -> Result<UniqueIdent> {
        if properties.supported_components.is_empty() {
            properties.supported_components = DEFAULT_COMPONENTS.to_vec();
        }

        let mut ns = self.lock();
        if ns.find(principal_uri, uri).is_some() {
            return Err(Error::Conflict(format!("{}/{}", principal_uri, uri)));
        }

        let calendar = Arc::new(Calendar::new(gen_ident(), retained));
        let id = gen_ident();
        ns.instances.insert(
            id,
            Instance {
                calendar: calendar.id,
                principal_uri: principal_uri.to_string(),
                uri: uri.to_string(),
                owner: principal_uri.to_string(),
                access: ShareAccess::Owner,
                properties,
            },
        );
        ns.calendars.insert(calendar.id, calendar);
        Ok(id)
    }

    /// Instance of `calendar` for a sharee, existing or new.
    /// Returns the instance uri.
    pub fn attach(&self, calendar: UniqueIdent, principal_uri: &str, access: ShareAccess) -> Result<String> {
        let mut ns = self.lock();

        let existing = ns
            .instances
            .values_mut()
            .find(|inst| inst.calendar == calendar && inst.principal_uri == principal_uri);
        if let Some(inst) = existing {
            if !inst.is_owner() {
                inst.access = access;
            }
            return Ok(inst.uri.clone());
        }

        let owner = ns
            .instances
            .values()
            .find(|inst| inst.calendar == calendar && inst.is_owner())
            .cloned()
            .ok_or_else(|| Error::NotFound(resource_uri(calendar)))?;

        let uri = gen_ident().to_string();
        ns.instances.insert(
            gen_ident(),
            Instance {
                calendar,
                principal_uri: principal_uri.to_string(),
                uri: uri.clone(),
                owner: owner.principal_uri,
                access,
                properties: owner.properties,
            },
        );
        Ok(uri)
    }

    /// Update the access of a sharee instance if it exists
    pub fn set_access(&self, calendar: UniqueIdent, principal_uri: &str, access: ShareAccess) {
        let mut ns = self.lock();
        for inst in ns.instances.values_mut() {
            if inst.calendar == calendar && inst.principal_uri == principal_uri && !inst.is_owner() {
                inst.access = access;
            }
        }
    }

    /// Current state of an instance
    pub fn instance(&self, id: UniqueIdent) -> Option<Instance> {
        self.lock().instances.get(&id).cloned()
    }

    /// Returns false when the instance is gone
    pub fn update_properties(&self, id: UniqueIdent, f: impl FnOnce(&mut CalendarProperties)) -> bool {
        match self.lock().instances.get_mut(&id) {
            Some(inst) => {
                f(&mut inst.properties);
                true
            }
            None => false,
        }
    }

    /// Remove the sharee instance of `principal_uri`, if any
    pub fn detach(&self, calendar: UniqueIdent, principal_uri: &str) -> Option<Instance> {
        let mut ns = self.lock();
        let id = ns
            .instances
            .iter()
            .find(|(_, inst)| {
                inst.calendar == calendar && inst.principal_uri == principal_uri && !inst.is_owner()
            })
            .map(|(id, _)| *id)?;
        ns.instances.remove(&id)
    }

    /// Forget a calendar and all of its instances
    pub fn remove_calendar(&self, calendar: UniqueIdent) -> Option<Arc<Calendar>> {
        let mut ns = self.lock();
        ns.instances.retain(|_, inst| inst.calendar != calendar);
        ns.calendars.remove(&calendar)
    }

    pub(crate) fn checkpoint(&self) -> (Vec<Arc<Calendar>>, BTreeMap<UniqueIdent, Instance>) {
        let ns = self.lock();
        (ns.calendars.values().cloned().collect(), ns.instances.clone())
    }
}
