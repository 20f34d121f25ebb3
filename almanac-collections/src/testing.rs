//! Bare backend relying on every default of the contract, for unit tests

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::backend::CalendarBackend;
use crate::error::{Error, Result};
use crate::types::*;

#[derive(Default)]
pub struct MemoryBackend {
    /// Leave `calendar_data` out of bulk listings
    pub omit_data: bool,
    pub(crate) state: Mutex<State>,
}

#[derive(Default)]
struct State {
    calendars: Vec<Calendar>,
    objects: BTreeMap<(CalendarId, String), Vec<u8>>,
}

impl MemoryBackend {
    pub async fn calendar(&self, principal_uri: &str, uri: &str) -> CalendarId {
        self.create_calendar(principal_uri, uri, CalendarProperties::default())
            .await
            .unwrap()
    }

    pub fn shared_calendar(&self, principal_uri: &str, uri: &str, owner: &str) -> CalendarId {
        let mut state = self.state.lock().unwrap();
        let id = CalendarId(format!("{}", state.calendars.len()));
        state.calendars.push(Calendar {
            id: id.clone(),
            uri: uri.into(),
            principal_uri: principal_uri.into(),
            sync_token: None,
            properties: CalendarProperties::default(),
            share: Some(ShareInfo {
                resource_uri: format!("/shares/{}", id),
                access: ShareAccess::ReadWrite,
                owner_principal: owner.into(),
            }),
        });
        id
    }

    pub async fn put(&self, id: &CalendarId, uri: &str, data: Vec<u8>) {
        self.create_calendar_object(id, uri, data).await.unwrap();
    }

    fn object(&self, id: &CalendarId, uri: &str, data: &[u8], with_data: bool) -> CalendarObject {
        CalendarObject {
            calendar_id: id.clone(),
            uri: uri.into(),
            calendar_data: with_data.then(|| data.to_vec()),
            etag: Some(Etag::from_data(data)),
            size: data.len() as u64,
            last_modified: 0,
            component: None,
            classification: None,
        }
    }
}

#[async_trait]
impl CalendarBackend for MemoryBackend {
    async fn get_calendars_for_user(&self, principal_uri: &str) -> Result<Vec<Calendar>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .calendars
            .iter()
            .filter(|c| c.principal_uri == principal_uri)
            .cloned()
            .collect())
    }

    async fn get_calendar_by_id(&self, id: &CalendarId) -> Result<Option<Calendar>> {
        let state = self.state.lock().unwrap();
        Ok(state.calendars.iter().find(|c| &c.id == id).cloned())
    }

    async fn create_calendar(
        &self,
        principal_uri: &str,
        uri: &str,
        properties: CalendarProperties,
    ) -> Result<CalendarId> {
        let mut state = self.state.lock().unwrap();
        if state
            .calendars
            .iter()
            .any(|c| c.principal_uri == principal_uri && c.uri == uri)
        {
            return Err(Error::Conflict(uri.into()));
        }
        let id = CalendarId(format!("{}", state.calendars.len()));
        state.calendars.push(Calendar {
            id: id.clone(),
            uri: uri.into(),
            principal_uri: principal_uri.into(),
            sync_token: None,
            properties,
            share: None,
        });
        Ok(id)
    }

    async fn update_calendar(&self, id: &CalendarId, patch: CalendarPatch) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let cal = state
            .calendars
            .iter_mut()
            .find(|c| &c.id == id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        patch.apply(&mut cal.properties);
        Ok(())
    }

    async fn delete_calendar(&self, id: &CalendarId) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calendars.retain(|c| &c.id != id);
        state.objects.retain(|(cal, _), _| cal != id);
        Ok(())
    }

    async fn get_calendar_objects(&self, id: &CalendarId) -> Result<Vec<CalendarObject>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .objects
            .iter()
            .filter(|((cal, _), _)| cal == id)
            .map(|((_, uri), data)| self.object(id, uri, data, !self.omit_data))
            .collect())
    }

    async fn get_calendar_object(
        &self,
        id: &CalendarId,
        uri: &str,
    ) -> Result<Option<CalendarObject>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .objects
            .get(&(id.clone(), uri.to_string()))
            .map(|data| self.object(id, uri, data, true)))
    }

    async fn create_calendar_object(
        &self,
        id: &CalendarId,
        uri: &str,
        data: Vec<u8>,
    ) -> Result<Option<Etag>> {
        let etag = Etag::from_data(&data);
        let mut state = self.state.lock().unwrap();
        state.objects.insert((id.clone(), uri.to_string()), data);
        Ok(Some(etag))
    }

    async fn update_calendar_object(
        &self,
        id: &CalendarId,
        uri: &str,
        data: Vec<u8>,
    ) -> Result<Option<Etag>> {
        self.create_calendar_object(id, uri, data).await
    }

    async fn delete_calendar_object(&self, id: &CalendarId, uri: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.objects.remove(&(id.clone(), uri.to_string()));
        Ok(())
    }
}

pub fn event(uid: &str, dtstart: &str) -> Vec<u8> {
    format!(
        "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:-//almanac//tests//EN\r\nBEGIN:VEVENT\r\nUID:{}\r\nDTSTAMP:20240101T000000Z\r\nDTSTART:{}\r\nDURATION:PT1H\r\nSUMMARY:Test event\r\nEND:VEVENT\r\nEND:VCALENDAR\r\n",
        uid, dtstart
    )
    .into_bytes()
}

pub fn todo(uid: &str) -> Vec<u8> {
    format!(
        "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:-//almanac//tests//EN\r\nBEGIN:VTODO\r\nUID:{}\r\nSUMMARY:Test task\r\nEND:VTODO\r\nEND:VCALENDAR\r\n",
        uid
    )
    .into_bytes()
}
