use async_trait::async_trait;

use almanac_collections::error::{Error, Result};
use almanac_collections::types::{self, *};
use almanac_collections::{
    CalendarBackend, FilterValidator, NotificationSupport, QueryEngine, SchedulingSupport,
    SharingSupport, SubscriptionSupport, SyncSupport,
};
use almanac_ical::filter::{CompFilter, CompFilterRules, Filter};
use almanac_ical::ObjectInfo;

use crate::calendar::Candidates;
use crate::changelog::Token;
use crate::config::StoreConfig;
use crate::inbox::InboxNs;
use crate::namespace::{resource_uri, CalendarNs, Handle};
use crate::sharing::NotificationNs;
use crate::subscription::SubscriptionNs;

/// In-memory calendar store implementing every capability of the
/// backend contract. State can be checkpointed to a snapshot file.
pub struct ReferenceStore {
    pub(crate) config: StoreConfig,
    pub(crate) calendars: CalendarNs,
    pub(crate) inboxes: InboxNs,
    pub(crate) notifications: NotificationNs,
    pub(crate) subscriptions: SubscriptionNs,
}

impl ReferenceStore {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            calendars: CalendarNs::new(),
            inboxes: InboxNs::default(),
            notifications: NotificationNs::default(),
            subscriptions: SubscriptionNs::default(),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Denormalized info of an object about to be stored
    fn inspect(&self, data: &[u8]) -> Result<ObjectInfo> {
        FilterValidator::new(self.object_model()).inspect(data)
    }

    /// Description of an instance, `None` if it was removed meanwhile.
    /// Instance properties are read under the calendar guard they are
    /// patched under.
    async fn describe(&self, handle: Handle) -> Option<types::Calendar> {
        let Handle { id, calendar, .. } = handle;

        let (view, instance) = calendar.view(|| self.calendars.instance(id)).await;
        let instance = instance?;
        let shared = !instance.is_owner() || view.invited;
        let mut properties = instance.properties;
        properties.published = view.published;

        Some(types::Calendar {
            id: CalendarId::from(id.to_string()),
            uri: instance.uri,
            principal_uri: instance.principal_uri,
            sync_token: Some(SyncToken::from(view.token.to_string())),
            properties,
            share: Some(ShareInfo {
                resource_uri: resource_uri(calendar.id),
                access: if shared {
                    instance.access
                } else {
                    ShareAccess::NotShared
                },
                owner_principal: instance.owner,
            }),
        })
    }
}

/// Pre-filter derived from the top level comp-filter
fn candidates(filter: &Filter) -> Candidates {
    match filter.target_component() {
        Some(CompFilter {
            name,
            additional_rules,
        }) => {
            let window = match additional_rules {
                Some(CompFilterRules::Matches(m)) => m.time_range.as_ref().map(|r| r.bounds()),
                _ => None,
            };
            Candidates {
                component: Some(name.clone()),
                window,
            }
        }
        None => Candidates::default(),
    }
}

#[async_trait]
impl CalendarBackend for ReferenceStore {
    async fn get_calendars_for_user(&self, principal_uri: &str) -> Result<Vec<types::Calendar>> {
        let mut calendars = Vec::new();
        for handle in self.calendars.list(principal_uri) {
            calendars.extend(self.describe(handle).await);
        }
        Ok(calendars)
    }

    async fn get_calendar_by_uri(
        &self,
        principal_uri: &str,
        uri: &str,
    ) -> Result<Option<types::Calendar>> {
        match self.calendars.find(principal_uri, uri) {
            Some(handle) => Ok(self.describe(handle).await),
            None => Ok(None),
        }
    }

    async fn get_calendar_by_id(&self, id: &CalendarId) -> Result<Option<types::Calendar>> {
        match self.calendars.open(id) {
            Ok(handle) => Ok(self.describe(handle).await),
            Err(Error::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn create_calendar(
        &self,
        principal_uri: &str,
        uri: &str,
        properties: CalendarProperties,
    ) -> Result<CalendarId> {
        let id = self.calendars.create(
            principal_uri,
            uri,
            properties,
            self.config.sync.retained_changes,
        )?;
        tracing::info!(principal = principal_uri, uri = uri, id = %id, "calendar created");
        Ok(CalendarId::from(id.to_string()))
    }

    async fn update_calendar(&self, id: &CalendarId, patch: CalendarPatch) -> Result<()> {
        let handle = self.calendars.open(id)?;
        if patch.is_empty() {
            return Ok(());
        }

        // A sharee's properties belong to its own instance, the shared
        // change log only follows the owner's
        let owner = handle.instance.is_owner();
        let token = handle
            .calendar
            .touch(owner, || {
                self.calendars
                    .update_properties(handle.id, |props| patch.apply(props))
            })
            .await?;
        tracing::debug!(calendar=%id, token=?token, "calendar properties updated");
        Ok(())
    }

    async fn delete_calendar(&self, id: &CalendarId) -> Result<()> {
        let handle = self.calendars.open(id)?;
        let calendar = handle.calendar.id;

        if handle.instance.is_owner() {
            handle.calendar.destroy().await;
            self.calendars.remove_calendar(calendar);
            tracing::info!(calendar=%id, resource=%resource_uri(calendar), "calendar deleted with all its instances");
            return Ok(());
        }

        // A sharee only drops its own view, and its invite with it
        let principal = handle.instance.principal_uri;
        self.calendars.detach(calendar, &principal);
        let dropped = handle
            .calendar
            .with_invites(|invites| {
                let before = invites.len();
                invites.retain(|inv| inv.principal.as_deref() != Some(principal.as_str()));
                before - invites.len()
            })
            .await;
        tracing::info!(calendar=%id, principal=%principal, invites=?dropped.ok(), "shared instance removed");
        Ok(())
    }

    async fn get_calendar_objects(&self, id: &CalendarId) -> Result<Vec<CalendarObject>> {
        let handle = self.calendars.open(id)?;
        Ok(handle.calendar.list(id, false).await)
    }

    async fn get_calendar_object(
        &self,
        id: &CalendarId,
        uri: &str,
    ) -> Result<Option<CalendarObject>> {
        let handle = self.calendars.open(id)?;
        Ok(handle
            .calendar
            .get(uri)
            .await
            .map(|obj| obj.to_object(id, uri, true)))
    }

    async fn create_calendar_object(
        &self,
        id: &CalendarId,
        uri: &str,
        data: Vec<u8>,
    ) -> Result<Option<Etag>> {
        let handle = self.calendars.open(id)?;
        let info = self.inspect(&data)?;
        if !handle.instance.properties.supports(&info.component) {
            return Err(Error::MalformedObject(format!(
                "calendar does not accept {} components",
                info.component
            )));
        }

        let (etag, token) = handle.calendar.insert(uri, data, info).await?;
        tracing::debug!(calendar=%id, uri=uri, etag=%etag, token=token, "object created");
        Ok(Some(etag))
    }

    async fn update_calendar_object(
        &self,
        id: &CalendarId,
        uri: &str,
        data: Vec<u8>,
    ) -> Result<Option<Etag>> {
        let handle = self.calendars.open(id)?;
        let info = self.inspect(&data)?;
        if !handle.instance.properties.supports(&info.component) {
            return Err(Error::MalformedObject(format!(
                "calendar does not accept {} components",
                info.component
            )));
        }

        let (etag, token) = handle.calendar.replace(uri, data, info).await?;
        tracing::debug!(calendar=%id, uri=uri, etag=%etag, token=token, "object updated");
        Ok(Some(etag))
    }

    async fn delete_calendar_object(&self, id: &CalendarId, uri: &str) -> Result<()> {
        let handle = self.calendars.open(id)?;
        let token = handle.calendar.remove(uri).await?;
        tracing::debug!(calendar=%id, uri=uri, token=token, "object deleted");
        Ok(())
    }

    async fn calendar_query(&self, id: &CalendarId, filter: &Filter) -> Result<Vec<String>> {
        let handle = self.calendars.open(id)?;
        let pre = candidates(filter);
        let objects = handle.calendar.candidates(id, &pre).await;
        tracing::trace!(calendar=%id, prefilter=?pre, candidates=objects.len(), "indexed calendar-query");
        QueryEngine::new(self).evaluate(id, objects, filter).await
    }

    async fn get_calendar_object_by_uid(
        &self,
        principal_uri: &str,
        uid: &str,
    ) -> Result<Option<String>> {
        for handle in self.calendars.list(principal_uri) {
            if !handle.instance.is_owner() {
                continue;
            }
            if let Some(uri) = handle.calendar.by_uid(uid).await {
                return Ok(Some(format!("{}/{}", handle.instance.uri, uri)));
            }
        }
        Ok(None)
    }

    fn as_sync(&self) -> Option<&dyn SyncSupport> {
        Some(self)
    }

    fn as_scheduling(&self) -> Option<&dyn SchedulingSupport> {
        Some(self)
    }

    fn as_sharing(&self) -> Option<&dyn SharingSupport> {
        Some(self)
    }

    fn as_notifications(&self) -> Option<&dyn NotificationSupport> {
        Some(self)
    }

    fn as_subscriptions(&self) -> Option<&dyn SubscriptionSupport> {
        Some(self)
    }
}

#[async_trait]
impl SyncSupport for ReferenceStore {
    async fn get_changes_for_calendar(
        &self,
        id: &CalendarId,
        sync_token: Option<&SyncToken>,
        _level: SyncLevel,
        limit: Option<usize>,
    ) -> Result<Option<ChangeSet>> {
        let handle = self.calendars.open(id)?;

        let known = match sync_token {
            None => None,
            Some(token) => match token.as_str().parse::<Token>() {
                Ok(token) => Some(token),
                Err(_) => {
                    tracing::debug!(calendar=%id, token=%token, "sync token not issued by this store");
                    return Ok(None);
                }
            },
        };

        let limit = limit.filter(|l| *l > 0);
        let max = self.config.sync.max_results;
        let page = match (limit, max) {
            (Some(l), Some(m)) => Some(l.min(m)),
            (Some(l), None) => Some(l),
            (None, m) => m,
        };

        let changes = match handle.calendar.diff(known, page).await {
            Some(changes) => changes,
            None => {
                tracing::debug!(calendar=%id, token=?known, "sync token expired");
                return Ok(None);
            }
        };

        if changes.truncated && limit.is_none() {
            if let Some(limit) = max {
                return Err(Error::TooManyResults { limit });
            }
        }
        Ok(Some(changes))
    }
}
