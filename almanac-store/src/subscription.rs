use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use almanac_collections::error::{Error, Result};
use almanac_collections::types::{
    Subscription, SubscriptionId, SubscriptionPatch, SubscriptionProperties,
};
use almanac_collections::SubscriptionSupport;

use crate::namespace::lock;
use crate::store::ReferenceStore;
use crate::timestamp::now_msec;
use crate::unique_ident::{gen_ident, UniqueIdent};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub(crate) struct StoredSubscription {
    principal_uri: String,
    uri: String,
    properties: SubscriptionProperties,
    last_modified: u64,
}

pub(crate) type Subscriptions = BTreeMap<UniqueIdent, StoredSubscription>;

#[derive(Default)]
pub(crate) struct SubscriptionNs(Mutex<Subscriptions>);

impl SubscriptionNs {
    pub(crate) fn restore(subscriptions: Subscriptions) -> Self {
        Self(Mutex::new(subscriptions))
    }

    pub(crate) fn checkpoint(&self) -> Subscriptions {
        lock(&self.0).clone()
    }
}

fn check_source(props: &SubscriptionProperties) -> Result<()> {
    if props.source.trim().is_empty() {
        return Err(Error::MalformedObject(
            "a subscription needs a source".to_string(),
        ));
    }
    Ok(())
}

fn parse_id(id: &SubscriptionId) -> Result<UniqueIdent> {
    UniqueIdent::from_str(id.as_str()).map_err(|_| Error::NotFound(format!("subscription {}", id)))
}

#[async_trait]
impl SubscriptionSupport for ReferenceStore {
    async fn get_subscriptions_for_user(&self, principal_uri: &str) -> Result<Vec<Subscription>> {
        Ok(lock(&self.subscriptions.0)
            .iter()
            .filter(|(_, sub)| sub.principal_uri == principal_uri)
            .map(|(id, sub)| Subscription {
                id: SubscriptionId::from(id.to_string()),
                uri: sub.uri.clone(),
                principal_uri: sub.principal_uri.clone(),
                properties: sub.properties.clone(),
                last_modified: sub.last_modified,
            })
            .collect())
    }

    async fn create_subscription(
        &self,
        principal_uri: &str,
        uri: &str,
        properties: SubscriptionProperties,
    ) -> Result<SubscriptionId> {
        check_source(&properties)?;

        let mut subs = lock(&self.subscriptions.0);
        if subs
            .values()
            .any(|sub| sub.principal_uri == principal_uri && sub.uri == uri)
        {
            return Err(Error::Conflict(format!("{}/{}", principal_uri, uri)));
        }

        let id = gen_ident();
        subs.insert(
            id,
            StoredSubscription {
                principal_uri: principal_uri.to_string(),
                uri: uri.to_string(),
                properties,
                last_modified: now_msec(),
            },
        );
        tracing::debug!(principal = principal_uri, uri = uri, id = %id, "subscription created");
        Ok(SubscriptionId::from(id.to_string()))
    }

    async fn update_subscription(
        &self,
        id: &SubscriptionId,
        patch: SubscriptionPatch,
    ) -> Result<()> {
        let ident = parse_id(id)?;
        let mut subs = lock(&self.subscriptions.0);
        let sub = subs
            .get_mut(&ident)
            .ok_or_else(|| Error::NotFound(format!("subscription {}", id)))?;

        let mut properties = sub.properties.clone();
        patch.apply(&mut properties);
        check_source(&properties)?;
        sub.properties = properties;
        sub.last_modified = now_msec();
        Ok(())
    }

    async fn delete_subscription(&self, id: &SubscriptionId) -> Result<()> {
        let ident = parse_id(id)?;
        lock(&self.subscriptions.0)
            .remove(&ident)
            .ok_or_else(|| Error::NotFound(format!("subscription {}", id)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;

    fn feed(source: &str) -> SubscriptionProperties {
        SubscriptionProperties {
            source: source.into(),
            ..SubscriptionProperties::default()
        }
    }

    #[tokio::test]
    async fn subscription_crud() {
        let store = ReferenceStore::new(StoreConfig::default());
        let alice = "principals/alice";

        let id = store
            .create_subscription(alice, "holidays", feed("https://example.com/holidays.ics"))
            .await
            .unwrap();
        assert!(matches!(
            store.create_subscription(alice, "holidays", feed("https://example.com/other.ics")).await,
            Err(Error::Conflict(_))
        ));
        assert!(matches!(
            store.create_subscription(alice, "empty", feed("  ")).await,
            Err(Error::MalformedObject(_))
        ));

        store
            .update_subscription(
                &id,
                SubscriptionPatch {
                    display_name: Some(Some("Holidays".into())),
                    strip_alarms: Some(true),
                    ..SubscriptionPatch::default()
                },
            )
            .await
            .unwrap();
        assert!(matches!(
            store
                .update_subscription(
                    &id,
                    SubscriptionPatch {
                        source: Some(String::new()),
                        ..SubscriptionPatch::default()
                    }
                )
                .await,
            Err(Error::MalformedObject(_))
        ));

        let subs = store.get_subscriptions_for_user(alice).await.unwrap();
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].properties.display_name.as_deref(), Some("Holidays"));
        assert!(subs[0].properties.strip_alarms);
        assert_eq!(subs[0].properties.source, "https://example.com/holidays.ics");
        assert!(store
            .get_subscriptions_for_user("principals/bob")
            .await
            .unwrap()
            .is_empty());

        store.delete_subscription(&id).await.unwrap();
        assert!(matches!(
            store.delete_subscription(&id).await,
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            store.delete_subscription(&SubscriptionId::from("nope")).await,
            Err(Error::NotFound(_))
        ));
    }
}
