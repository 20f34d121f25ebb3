use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub inbox: InboxConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Most changes reported in one answer. Clients asking for more
    /// without paging get `Error::TooManyResults`.
    pub max_results: Option<usize>,
    /// Changes kept per calendar. Older sync tokens expire.
    pub retained_changes: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboxConfig {
    /// Largest scheduling object accepted, in bytes
    pub max_resource_size: Option<usize>,
}
