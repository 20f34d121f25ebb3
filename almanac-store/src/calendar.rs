use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use almanac_collections::error::{Error, Result};
use almanac_collections::types::{ChangeSet, CalendarId, CalendarObject, Etag, ShareInvite};
use almanac_ical::filter::Component;
use almanac_ical::{Classification, ObjectInfo};

use crate::changelog::{Change, ChangeLog, Diff, Token};
use crate::timestamp::now_msec;
use crate::unique_ident::UniqueIdent;

/// Calendar data shared by every instance of a calendar: objects, change
/// log and invites. Mutations and token advances happen under the same
/// write guard.
pub struct Calendar {
    pub(crate) id: UniqueIdent,
    retained: Option<usize>,
    internal: RwLock<CalendarInternal>,
}

/// A stored calendar object with its denormalized info
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoredObject {
    pub data: Vec<u8>,
    pub etag: Etag,
    pub last_modified: u64,
    pub component: String,
    pub uid: Option<String>,
    /// CLASS code, public when absent from older snapshots
    #[serde(default)]
    pub classification: u8,
    /// Milliseconds since the epoch
    pub first_occurrence: Option<i64>,
    pub last_occurrence: Option<i64>,
    /// Token of the last change of this object
    pub token: Token,
}

impl StoredObject {
    fn new(data: Vec<u8>, info: ObjectInfo, token: Token) -> Self {
        Self {
            etag: Etag::from_data(&data),
            last_modified: now_msec(),
            component: info.component.as_str().to_string(),
            uid: info.uid,
            classification: info.classification.code(),
            first_occurrence: info.first_occurrence.map(|d| d.timestamp_millis()),
            last_occurrence: info.last_occurrence.map(|d| d.timestamp_millis()),
            token,
            data,
        }
    }

    pub fn component(&self) -> Component {
        Component::new(self.component.clone())
    }

    pub fn classification(&self) -> Classification {
        Classification::from_code(self.classification).unwrap_or(Classification::Private)
    }

    fn info(&self) -> ObjectInfo {
        let from_ms = |ms: i64| Utc.timestamp_millis_opt(ms).single();
        ObjectInfo {
            component: self.component(),
            uid: self.uid.clone(),
            classification: self.classification(),
            first_occurrence: self.first_occurrence.and_then(from_ms),
            last_occurrence: self.last_occurrence.and_then(from_ms),
        }
    }

    pub fn to_object(&self, calendar_id: &CalendarId, uri: &str, with_data: bool) -> CalendarObject {
        CalendarObject {
            calendar_id: calendar_id.clone(),
            uri: uri.to_string(),
            calendar_data: with_data.then(|| self.data.clone()),
            etag: Some(self.etag.clone()),
            size: self.data.len() as u64,
            last_modified: self.last_modified,
            component: Some(self.component()),
            classification: Some(self.classification()),
        }
    }
}

/// Calendar level state shown in a calendar description
#[derive(Clone, Copy, Debug)]
pub struct CalendarView {
    pub token: Token,
    pub invited: bool,
    pub published: bool,
}

/// Pre-filter applied before evaluating a calendar query
#[derive(Clone, Debug, Default)]
pub struct Candidates {
    pub component: Option<Component>,
    pub window: Option<(DateTime<Utc>, DateTime<Utc>)>,
}

impl Candidates {
    fn keep(&self, obj: &StoredObject) -> bool {
        if let Some(comp) = &self.component {
            if obj.component() != *comp {
                return false;
            }
        }
        match &self.window {
            Some((start, end)) if obj.component() == Component::VEvent => {
                obj.info().may_overlap(start, end)
            }
            _ => true,
        }
    }
}

impl Calendar {
    pub(crate) fn new(id: UniqueIdent, retained: Option<usize>) -> Self {
        Self::restore(id, retained, CalendarState::default())
    }

    pub(crate) fn restore(id: UniqueIdent, retained: Option<usize>, state: CalendarState) -> Self {
        let internal = CalendarInternal::from_state(state);
        Self {
            id,
            retained,
            internal: RwLock::new(internal),
        }
    }

    pub(crate) async fn checkpoint(&self) -> CalendarState {
        self.internal.read().await.state.clone()
    }

    pub async fn token(&self) -> Token {
        self.internal.read().await.state.log.head()
    }

    pub async fn is_deleted(&self) -> bool {
        self.internal.read().await.state.deleted
    }

    /// Objects in uri order
    pub async fn list(&self, calendar_id: &CalendarId, with_data: bool) -> Vec<CalendarObject> {
        let cal = self.internal.read().await;
        cal.state
            .objects
            .iter()
            .map(|(uri, obj)| obj.to_object(calendar_id, uri, with_data))
            .collect()
    }

    pub async fn get(&self, uri: &str) -> Option<StoredObject> {
        self.internal.read().await.state.objects.get(uri).cloned()
    }

    pub async fn candidates(&self, calendar_id: &CalendarId, pre: &Candidates) -> Vec<CalendarObject> {
        let cal = self.internal.read().await;
        cal.state
            .objects
            .iter()
            .filter(|(_, obj)| pre.keep(obj))
            .map(|(uri, obj)| obj.to_object(calendar_id, uri, true))
            .collect()
    }

    pub async fn by_uid(&self, uid: &str) -> Option<String> {
        self.internal.read().await.uids.get(uid).cloned()
    }

    pub async fn insert(&self, uri: &str, data: Vec<u8>, info: ObjectInfo) -> Result<(Etag, Token)> {
        let mut cal = self.internal.write().await;
        cal.check_alive(self.id)?;
        if cal.state.objects.contains_key(uri) {
            return Err(Error::Conflict(uri.to_string()));
        }
        let token = cal.record(Change::Added(uri.to_string()), self.retained);
        Ok((cal.store(uri, data, info, token), token))
    }

    pub async fn replace(&self, uri: &str, data: Vec<u8>, info: ObjectInfo) -> Result<(Etag, Token)> {
        let mut cal = self.internal.write().await;
        cal.check_alive(self.id)?;
        if !cal.state.objects.contains_key(uri) {
            return Err(Error::NotFound(uri.to_string()));
        }
        let token = cal.record(Change::Modified(uri.to_string()), self.retained);
        Ok((cal.store(uri, data, info, token), token))
    }

    pub async fn remove(&self, uri: &str) -> Result<Token> {
        let mut cal = self.internal.write().await;
        cal.check_alive(self.id)?;
        let old = cal
            .state
            .objects
            .remove(uri)
            .ok_or_else(|| Error::NotFound(uri.to_string()))?;
        cal.unindex(uri, &old);
        Ok(cal.record(Change::Deleted(uri.to_string()), self.retained))
    }

    /// Apply a property change under the write guard. `apply` returns
    /// whether it found the properties to change; the token advances only
    /// then, and only when `advance` is set.
    pub async fn touch(&self, advance: bool, apply: impl FnOnce() -> bool) -> Result<Option<Token>> {
        let mut cal = self.internal.write().await;
        cal.check_alive(self.id)?;
        if !apply() {
            return Err(Error::NotFound(format!("instance of calendar {}", self.id)));
        }
        Ok(advance.then(|| cal.record(Change::Properties, self.retained)))
    }

    /// Token, sharing and publish state read under one guard, together
    /// with whatever `f` reads while the guard is held
    pub async fn view<T>(&self, f: impl FnOnce() -> T) -> (CalendarView, T) {
        let cal = self.internal.read().await;
        let view = CalendarView {
            token: cal.state.log.head(),
            invited: !cal.state.invites.is_empty(),
            published: cal.state.published,
        };
        (view, f())
    }

    /// Mark the calendar as gone, later writes fail with `NotFound`
    pub async fn destroy(&self) {
        let mut cal = self.internal.write().await;
        cal.state.deleted = true;
        cal.state.objects.clear();
        cal.uids.clear();
    }

    /// Changes since `known`, every member when no token is known.
    /// `None` when the token is unknown or expired.
    pub async fn diff(&self, known: Option<Token>, limit: Option<usize>) -> Option<ChangeSet> {
        let cal = self.internal.read().await;
        match known {
            Some(known) => {
                let Diff {
                    fold,
                    token,
                    truncated,
                } = cal.state.log.since(known, limit)?;
                Some(fold.into_change_set(token.to_string().into(), truncated))
            }
            None => Some(cal.initial(limit)),
        }
    }

    pub async fn invites(&self) -> Vec<ShareInvite> {
        self.internal.read().await.state.invites.clone()
    }

    /// Edit the invites under the write guard
    pub async fn with_invites<T>(&self, f: impl FnOnce(&mut Vec<ShareInvite>) -> T) -> Result<T> {
        let mut cal = self.internal.write().await;
        cal.check_alive(self.id)?;
        Ok(f(&mut cal.state.invites))
    }

    pub async fn published(&self) -> bool {
        self.internal.read().await.state.published
    }

    pub async fn set_published(&self, published: bool) -> Result<()> {
        let mut cal = self.internal.write().await;
        cal.check_alive(self.id)?;
        cal.state.published = published;
        Ok(())
    }
}

/// Persisted part of a calendar
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub(crate) struct CalendarState {
    objects: BTreeMap<String, StoredObject>,
    log: ChangeLog,
    invites: Vec<ShareInvite>,
    published: bool,
    deleted: bool,
}

struct CalendarInternal {
    state: CalendarState,
    /// UID to object uri, rebuilt on restore
    uids: HashMap<String, String>,
}

impl CalendarInternal {
    fn from_state(state: CalendarState) -> Self {
        let uids = state
            .objects
            .iter()
            .filter_map(|(uri, obj)| obj.uid.clone().map(|uid| (uid, uri.clone())))
            .collect();
        Self { state, uids }
    }

    fn check_alive(&self, id: UniqueIdent) -> Result<()> {
        if self.state.deleted {
            return Err(Error::NotFound(format!("calendar {}", id)));
        }
        Ok(())
    }

    fn record(&mut self, change: Change, retained: Option<usize>) -> Token {
        let token = self.state.log.record(change);
        if let Some(retained) = retained {
            self.state.log.trim(retained);
        }
        token
    }

    fn store(&mut self, uri: &str, data: Vec<u8>, info: ObjectInfo, token: Token) -> Etag {
        let obj = StoredObject::new(data, info, token);
        let etag = obj.etag.clone();
        if let Some(old) = self.state.objects.insert(uri.to_string(), obj.clone()) {
            self.unindex(uri, &old);
        }
        if let Some(uid) = &obj.uid {
            self.uids.insert(uid.clone(), uri.to_string());
        }
        etag
    }

    fn unindex(&mut self, uri: &str, old: &StoredObject) {
        if let Some(uid) = &old.uid {
            if self.uids.get(uid).map(String::as_str) == Some(uri) {
                self.uids.remove(uid);
            }
        }
    }

    /// Every member reported as added, paged in token order.
    ///
    /// The continuation token never goes below the log floor, so the first
    /// page holds every member last changed at or before it, even past
    /// `limit`.
    fn initial(&self, limit: Option<usize>) -> ChangeSet {
        let head = self.state.log.head();
        let floor = self.state.log.floor();
        let mut members: Vec<(&String, Token)> = self
            .state
            .objects
            .iter()
            .map(|(uri, obj)| (uri, obj.token))
            .collect();

        let (token, truncated) = match limit {
            Some(limit) if members.len() > limit => {
                members.sort_by_key(|(_, token)| *token);
                let expired = members.iter().take_while(|(_, token)| *token <= floor).count();
                let cut = limit.max(expired);
                if cut >= members.len() {
                    (head, false)
                } else {
                    members.truncate(cut);
                    let last = members.last().map_or(floor, |(_, token)| *token);
                    (last.max(floor), true)
                }
            }
            _ => (head, false),
        };

        ChangeSet {
            sync_token: token.to_string().into(),
            added: members.into_iter().map(|(uri, _)| uri.clone()).collect(),
            truncated,
            ..ChangeSet::default()
        }
    }
}
