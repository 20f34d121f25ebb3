use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{CalendarId, ChangeSet, SyncLevel, SyncToken};

/// Incremental synchronization (RFC6578)
#[async_trait]
pub trait SyncSupport: Send + Sync {
    /// Changes since `sync_token`.
    ///
    /// Without a token every current member is reported in `added`. An
    /// unknown or expired token yields `Ok(None)`, which is not the same
    /// as an empty change set: the caller has to sync from scratch.
    ///
    /// `limit` pages the answer, `ChangeSet::truncated` is then set and
    /// the returned token resumes after the last reported change. A
    /// backend that cannot page at all fails with
    /// `Error::TooManyResults` rather than dropping changes.
    async fn get_changes_for_calendar(
        &self,
        id: &CalendarId,
        sync_token: Option<&SyncToken>,
        level: SyncLevel,
        limit: Option<usize>,
    ) -> Result<Option<ChangeSet>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ChangeKind {
    Added,
    Modified,
    Deleted,
}

/// Collapses a sequence of member changes into the net change per uri.
///
/// | first    | last           | net      |
/// |----------|----------------|----------|
/// | added    | deleted        | nothing  |
/// | added    | added/modified | added    |
/// | deleted  | added/modified | modified |
/// | modified | added/modified | modified |
/// | any      | deleted        | deleted  |
#[derive(Debug, Default)]
pub struct ChangeFold {
    order: Vec<String>,
    state: HashMap<String, (ChangeKind, ChangeKind)>,
}

impl ChangeFold {
    pub fn push(&mut self, uri: &str, kind: ChangeKind) {
        match self.state.get_mut(uri) {
            Some((_, last)) => *last = kind,
            None => {
                self.order.push(uri.to_string());
                self.state.insert(uri.to_string(), (kind, kind));
            }
        }
    }

    /// Distinct uris seen so far
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, uri: &str) -> bool {
        self.state.contains_key(uri)
    }

    pub fn into_change_set(self, sync_token: SyncToken, truncated: bool) -> ChangeSet {
        let mut changes = ChangeSet {
            sync_token,
            truncated,
            ..ChangeSet::default()
        };
        for uri in self.order {
            let net = match self.state.get(&uri) {
                Some(v) => *v,
                None => continue,
            };
            match net {
                (ChangeKind::Added, ChangeKind::Deleted) => (),
                (ChangeKind::Added, _) => changes.added.push(uri),
                (_, ChangeKind::Deleted) => changes.deleted.push(uri),
                (_, _) => changes.modified.push(uri),
            }
        }
        changes
    }
}
