#![allow(dead_code)]

use almanac_collections::types::{CalendarId, CalendarProperties, ChangeSet, SyncLevel, SyncToken};
use almanac_collections::{CalendarBackend, SyncSupport};
use almanac_store::{ReferenceStore, StoreConfig};

pub const ALICE: &str = "principals/alice";
pub const BOB: &str = "principals/bob";
pub const CAROL: &str = "principals/carol";

pub fn store() -> ReferenceStore {
    ReferenceStore::new(StoreConfig::default())
}

pub async fn calendar(store: &ReferenceStore, principal: &str, uri: &str) -> CalendarId {
    store
        .create_calendar(principal, uri, CalendarProperties::named(uri))
        .await
        .expect("calendar is created")
}

pub fn event(uid: &str, dtstart: &str) -> Vec<u8> {
    event_with(uid, dtstart, "")
}

/// Event lasting one hour, `extra` lines are inserted in the VEVENT
pub fn event_with(uid: &str, dtstart: &str, extra: &str) -> Vec<u8> {
    format!(
        "BEGIN:VCALENDAR\r\n\
         VERSION:2.0\r\n\
         PRODID:-//almanac//store tests//EN\r\n\
         BEGIN:VEVENT\r\n\
         UID:{}\r\n\
         DTSTAMP:20240101T000000Z\r\n\
         DTSTART:{}\r\n\
         DURATION:PT1H\r\n\
         {}\
         SUMMARY:Test event\r\n\
         END:VEVENT\r\n\
         END:VCALENDAR\r\n",
        uid, dtstart, extra
    )
    .into_bytes()
}

pub fn todo(uid: &str) -> Vec<u8> {
    format!(
        "BEGIN:VCALENDAR\r\n\
         VERSION:2.0\r\n\
         PRODID:-//almanac//store tests//EN\r\n\
         BEGIN:VTODO\r\n\
         UID:{}\r\n\
         DTSTAMP:20240101T000000Z\r\n\
         SUMMARY:Test task\r\n\
         END:VTODO\r\n\
         END:VCALENDAR\r\n",
        uid
    )
    .into_bytes()
}

pub async fn changes(
    store: &ReferenceStore,
    id: &CalendarId,
    token: Option<&SyncToken>,
    limit: Option<usize>,
) -> Option<ChangeSet> {
    store
        .get_changes_for_calendar(id, token, SyncLevel::One, limit)
        .await
        .expect("sync report succeeds")
}

pub async fn uris(store: &ReferenceStore, id: &CalendarId) -> Vec<String> {
    let mut uris: Vec<String> = store
        .get_calendar_objects(id)
        .await
        .expect("objects are listed")
        .into_iter()
        .map(|obj| obj.uri)
        .collect();
    uris.sort();
    uris
}
