use async_trait::async_trait;

use crate::error::Result;
use crate::types::SchedulingObject;

/// Scheduling inbox of a principal (RFC6638).
///
/// Objects are dropped in the inbox by the scheduling flow and removed
/// once the client has processed them. They never take part in sync.
#[async_trait]
pub trait SchedulingSupport: Send + Sync {
    /// Single fetch, `calendar_data` is always filled
    async fn get_scheduling_object(
        &self,
        principal_uri: &str,
        uri: &str,
    ) -> Result<Option<SchedulingObject>>;

    /// Bulk listing, `calendar_data` may be left out
    async fn get_scheduling_objects(&self, principal_uri: &str) -> Result<Vec<SchedulingObject>>;

    /// Fails with `Error::Conflict` when the uri is already taken
    async fn create_scheduling_object(
        &self,
        principal_uri: &str,
        uri: &str,
        data: Vec<u8>,
    ) -> Result<()>;

    async fn delete_scheduling_object(&self, principal_uri: &str, uri: &str) -> Result<()>;
}
