use async_trait::async_trait;

use crate::error::Result;
use crate::types::{CalendarId, ShareInvite};

#[async_trait]
pub trait SharingSupport: Send + Sync {
    /// Upserts the given invites, keyed by `href`.
    ///
    /// Hrefs missing from the list keep their invite. An invite with
    /// `ShareAccess::NoAccess` withdraws the share for its href, and an
    /// invite without a resolved principal is kept with
    /// `InviteStatus::Invalid`.
    async fn update_invites(&self, id: &CalendarId, invites: Vec<ShareInvite>) -> Result<()>;

    /// Current invites, order is not meaningful
    async fn get_invites(&self, id: &CalendarId) -> Result<Vec<ShareInvite>>;

    /// Toggles the public link of the calendar
    async fn set_publish_status(&self, id: &CalendarId, published: bool) -> Result<()>;
}
