use async_trait::async_trait;

use almanac_ical::filter::Filter;
use almanac_ical::{IcalModel, ObjectModel};

use crate::error::Result;
use crate::notification::NotificationSupport;
use crate::query::QueryEngine;
use crate::scheduling::SchedulingSupport;
use crate::sharing::SharingSupport;
use crate::subscription::SubscriptionSupport;
use crate::sync::SyncSupport;
use crate::types::*;
use crate::uid::UidResolver;

static DEFAULT_MODEL: IcalModel = IcalModel;

/// Storage operations every calendar backend provides.
///
/// Optional capabilities live in their own traits. A backend advertises
/// them by overriding the matching `as_*` method, so callers never need to
/// downcast.
#[async_trait]
pub trait CalendarBackend: Send + Sync {
    /// Every calendar instance listed for the principal, owned or shared
    async fn get_calendars_for_user(&self, principal_uri: &str) -> Result<Vec<Calendar>>;

    /// The principal's calendar instance at `uri`
    async fn get_calendar_by_uri(&self, principal_uri: &str, uri: &str) -> Result<Option<Calendar>> {
        Ok(self
            .get_calendars_for_user(principal_uri)
            .await?
            .into_iter()
            .find(|cal| cal.uri == uri))
    }

    /// A calendar instance from its id, whichever principal it belongs to
    async fn get_calendar_by_id(&self, id: &CalendarId) -> Result<Option<Calendar>>;

    /// Fails with `Error::Conflict` when the principal already has a
    /// calendar at this uri.
    async fn create_calendar(
        &self,
        principal_uri: &str,
        uri: &str,
        properties: CalendarProperties,
    ) -> Result<CalendarId>;

    async fn update_calendar(&self, id: &CalendarId, patch: CalendarPatch) -> Result<()>;

    /// Deletes the calendar and all of its objects
    async fn delete_calendar(&self, id: &CalendarId) -> Result<()>;

    /// Bulk listing, `calendar_data` may be left out
    async fn get_calendar_objects(&self, id: &CalendarId) -> Result<Vec<CalendarObject>>;

    /// Single fetch, `calendar_data` is always filled
    async fn get_calendar_object(&self, id: &CalendarId, uri: &str)
        -> Result<Option<CalendarObject>>;

    /// Objects that do not exist are left out of the result
    async fn get_multiple_calendar_objects(
        &self,
        id: &CalendarId,
        uris: &[String],
    ) -> Result<Vec<CalendarObject>> {
        let mut objects = Vec::with_capacity(uris.len());
        for uri in uris {
            if let Some(obj) = self.get_calendar_object(id, uri).await? {
                objects.push(obj);
            }
        }
        Ok(objects)
    }

    /// Returns the new etag when the backend computes one
    async fn create_calendar_object(
        &self,
        id: &CalendarId,
        uri: &str,
        data: Vec<u8>,
    ) -> Result<Option<Etag>>;

    async fn update_calendar_object(
        &self,
        id: &CalendarId,
        uri: &str,
        data: Vec<u8>,
    ) -> Result<Option<Etag>>;

    async fn delete_calendar_object(&self, id: &CalendarId, uri: &str) -> Result<()>;

    /// Uris of the objects matching the filter, in listing order.
    /// Defaults to a full scan, backends with an index should override it.
    async fn calendar_query(&self, id: &CalendarId, filter: &Filter) -> Result<Vec<String>> {
        QueryEngine::new(self).run(id, filter).await
    }

    /// `{calendar_uri}/{object_uri}` of the object carrying this UID in one
    /// of the calendars the principal owns.
    async fn get_calendar_object_by_uid(
        &self,
        principal_uri: &str,
        uid: &str,
    ) -> Result<Option<String>> {
        UidResolver::new(self).resolve(principal_uri, uid).await
    }

    fn object_model(&self) -> &dyn ObjectModel {
        &DEFAULT_MODEL
    }

    fn as_sync(&self) -> Option<&dyn SyncSupport> {
        None
    }

    fn as_scheduling(&self) -> Option<&dyn SchedulingSupport> {
        None
    }

    fn as_sharing(&self) -> Option<&dyn SharingSupport> {
        None
    }

    fn as_notifications(&self) -> Option<&dyn NotificationSupport> {
        None
    }

    fn as_subscriptions(&self) -> Option<&dyn SubscriptionSupport> {
        None
    }
}
