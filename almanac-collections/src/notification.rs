use async_trait::async_trait;

use crate::error::Result;
use crate::types::{InviteStatus, Notification};

#[async_trait]
pub trait NotificationSupport: Send + Sync {
    async fn get_notifications_for_principal(&self, principal_uri: &str)
        -> Result<Vec<Notification>>;

    async fn delete_notification(&self, principal_uri: &str, notification_id: &str) -> Result<()>;

    /// Answer of the sharee `href` to the invite `in_reply_to` for the
    /// shared calendar `calendar_uri`.
    ///
    /// Accepting creates (or finds) the sharee's instance of the calendar
    /// and returns its uri. Declining returns `None`, removing the invite
    /// notification is up to the caller.
    async fn share_reply(
        &self,
        href: &str,
        status: InviteStatus,
        calendar_uri: &str,
        in_reply_to: &str,
        summary: Option<&str>,
    ) -> Result<Option<String>>;
}
