use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use almanac_collections::error::{Error, Result};
use almanac_collections::types::{Etag, SchedulingObject};
use almanac_collections::SchedulingSupport;

use crate::namespace::lock;
use crate::store::ReferenceStore;
use crate::timestamp::now_msec;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub(crate) struct StoredSchedulingObject {
    data: Vec<u8>,
    etag: Etag,
    last_modified: u64,
}

impl StoredSchedulingObject {
    fn to_object(&self, principal_uri: &str, uri: &str, with_data: bool) -> SchedulingObject {
        SchedulingObject {
            principal_uri: principal_uri.to_string(),
            uri: uri.to_string(),
            calendar_data: with_data.then(|| self.data.clone()),
            etag: Some(self.etag.clone()),
            size: self.data.len() as u64,
            last_modified: self.last_modified,
        }
    }
}

pub(crate) type Inboxes = BTreeMap<String, BTreeMap<String, StoredSchedulingObject>>;

/// Scheduling inbox of every principal
#[derive(Default)]
pub(crate) struct InboxNs(Mutex<Inboxes>);

impl InboxNs {
    pub(crate) fn restore(inboxes: Inboxes) -> Self {
        Self(Mutex::new(inboxes))
    }

    pub(crate) fn checkpoint(&self) -> Inboxes {
        lock(&self.0).clone()
    }
}

#[async_trait]
impl SchedulingSupport for ReferenceStore {
    async fn get_scheduling_object(
        &self,
        principal_uri: &str,
        uri: &str,
    ) -> Result<Option<SchedulingObject>> {
        let inboxes = lock(&self.inboxes.0);
        Ok(inboxes
            .get(principal_uri)
            .and_then(|inbox| inbox.get(uri))
            .map(|obj| obj.to_object(principal_uri, uri, true)))
    }

    async fn get_scheduling_objects(&self, principal_uri: &str) -> Result<Vec<SchedulingObject>> {
        let inboxes = lock(&self.inboxes.0);
        Ok(inboxes
            .get(principal_uri)
            .map(|inbox| {
                inbox
                    .iter()
                    .map(|(uri, obj)| obj.to_object(principal_uri, uri, false))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn create_scheduling_object(
        &self,
        principal_uri: &str,
        uri: &str,
        data: Vec<u8>,
    ) -> Result<()> {
        if let Some(max) = self.config.inbox.max_resource_size {
            if data.len() > max {
                return Err(Error::MalformedObject(format!(
                    "scheduling object is {} bytes, at most {} are accepted",
                    data.len(),
                    max
                )));
            }
        }

        let mut inboxes = lock(&self.inboxes.0);
        let inbox = inboxes.entry(principal_uri.to_string()).or_default();
        if inbox.contains_key(uri) {
            return Err(Error::Conflict(format!("{}/inbox/{}", principal_uri, uri)));
        }
        inbox.insert(
            uri.to_string(),
            StoredSchedulingObject {
                etag: Etag::from_data(&data),
                last_modified: now_msec(),
                data,
            },
        );
        tracing::debug!(principal = principal_uri, uri = uri, "scheduling object delivered");
        Ok(())
    }

    async fn delete_scheduling_object(&self, principal_uri: &str, uri: &str) -> Result<()> {
        let mut inboxes = lock(&self.inboxes.0);
        inboxes
            .get_mut(principal_uri)
            .and_then(|inbox| inbox.remove(uri))
            .ok_or_else(|| Error::NotFound(format!("{}/inbox/{}", principal_uri, uri)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{InboxConfig, StoreConfig};

    const REQUEST: &[u8] = b"BEGIN:VCALENDAR\r\nMETHOD:REQUEST\r\nBEGIN:VEVENT\r\nUID:x\r\nEND:VEVENT\r\nEND:VCALENDAR\r\n";

    #[tokio::test]
    async fn inbox_lifecycle() {
        let store = ReferenceStore::new(StoreConfig::default());
        let alice = "principals/alice";

        store
            .create_scheduling_object(alice, "req.ics", REQUEST.to_vec())
            .await
            .unwrap();
        assert!(matches!(
            store
                .create_scheduling_object(alice, "req.ics", REQUEST.to_vec())
                .await,
            Err(Error::Conflict(_))
        ));

        let listed = store.get_scheduling_objects(alice).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert!(listed[0].calendar_data.is_none());
        assert_eq!(listed[0].size, REQUEST.len() as u64);

        let obj = store
            .get_scheduling_object(alice, "req.ics")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(obj.calendar_data.as_deref(), Some(REQUEST));
        assert_eq!(obj.etag, Some(Etag::from_data(REQUEST)));

        assert!(store
            .get_scheduling_objects("principals/bob")
            .await
            .unwrap()
            .is_empty());

        store
            .delete_scheduling_object(alice, "req.ics")
            .await
            .unwrap();
        assert!(store
            .get_scheduling_object(alice, "req.ics")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn oversized_objects_are_refused() {
        let store = ReferenceStore::new(StoreConfig {
            inbox: InboxConfig {
                max_resource_size: Some(16),
            },
            ..StoreConfig::default()
        });
        let res = store
            .create_scheduling_object("principals/alice", "big.ics", REQUEST.to_vec())
            .await;
        assert!(matches!(res, Err(Error::MalformedObject(_))));
    }
}
