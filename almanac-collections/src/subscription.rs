use async_trait::async_trait;

use crate::error::Result;
use crate::types::{Subscription, SubscriptionId, SubscriptionPatch, SubscriptionProperties};

/// Subscriptions to remote iCalendar feeds
#[async_trait]
pub trait SubscriptionSupport: Send + Sync {
    async fn get_subscriptions_for_user(&self, principal_uri: &str) -> Result<Vec<Subscription>>;

    /// Fails with `Error::Conflict` when the uri is taken and with
    /// `Error::MalformedObject` when no source is given.
    async fn create_subscription(
        &self,
        principal_uri: &str,
        uri: &str,
        properties: SubscriptionProperties,
    ) -> Result<SubscriptionId>;

    async fn update_subscription(&self, id: &SubscriptionId, patch: SubscriptionPatch)
        -> Result<()>;

    async fn delete_subscription(&self, id: &SubscriptionId) -> Result<()>;
}
