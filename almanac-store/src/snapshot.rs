//! Checkpoints of the reference store: MessagePack encoded, then zstd
//! compressed.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use zstd::stream::{decode_all as zstd_decode, encode_all as zstd_encode};

use crate::calendar::{Calendar, CalendarState};
use crate::config::StoreConfig;
use crate::inbox::{InboxNs, Inboxes};
use crate::namespace::{CalendarNs, Instance};
use crate::sharing::{Mailboxes, NotificationNs};
use crate::store::ReferenceStore;
use crate::subscription::{SubscriptionNs, Subscriptions};
use crate::unique_ident::UniqueIdent;

#[derive(Default, Serialize, Deserialize)]
pub(crate) struct Snapshot {
    calendars: BTreeMap<UniqueIdent, CalendarState>,
    instances: BTreeMap<UniqueIdent, Instance>,
    inboxes: Inboxes,
    notifications: Mailboxes,
    subscriptions: Subscriptions,
}

pub fn encode<T: Serialize>(obj: &T) -> Result<Vec<u8>> {
    let mut wr = Vec::with_capacity(128);
    let mut se = rmp_serde::Serializer::new(&mut wr)
        .with_struct_map()
        .with_string_variants();
    obj.serialize(&mut se)?;

    let mut reader = &wr[..];
    Ok(zstd_encode(&mut reader, 0)?)
}

pub fn decode<T: DeserializeOwned>(blob: &[u8]) -> Result<T> {
    let mut reader = blob;
    let data = zstd_decode(&mut reader).context("snapshot is not zstd compressed")?;
    Ok(rmp_serde::decode::from_read_ref::<_, T>(&data)?)
}

impl ReferenceStore {
    pub(crate) async fn checkpoint(&self) -> Snapshot {
        let (calendars, instances) = self.calendars.checkpoint();
        let mut states = BTreeMap::new();
        for cal in calendars {
            if !cal.is_deleted().await {
                states.insert(cal.id, cal.checkpoint().await);
            }
        }

        Snapshot {
            calendars: states,
            instances,
            inboxes: self.inboxes.checkpoint(),
            notifications: self.notifications.checkpoint(),
            subscriptions: self.subscriptions.checkpoint(),
        }
    }

    pub(crate) fn from_snapshot(config: StoreConfig, snapshot: Snapshot) -> Self {
        let retained = config.sync.retained_changes;
        let calendars = snapshot
            .calendars
            .into_iter()
            .map(|(id, state)| Arc::new(Calendar::restore(id, retained, state)))
            .collect();

        Self {
            config,
            calendars: CalendarNs::restore(calendars, snapshot.instances),
            inboxes: InboxNs::restore(snapshot.inboxes),
            notifications: NotificationNs::restore(snapshot.notifications),
            subscriptions: SubscriptionNs::restore(snapshot.subscriptions),
        }
    }

    /// Write a snapshot of the whole store. The file is replaced
    /// atomically, a crash leaves the previous snapshot in place.
    pub async fn save(&self, path: &Path) -> Result<()> {
        let blob = encode(&self.checkpoint().await)?;
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, &blob)
            .await
            .with_context(|| format!("unable to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, path)
            .await
            .with_context(|| format!("unable to replace {}", path.display()))?;
        tracing::debug!(path=%path.display(), size=blob.len(), "snapshot saved");
        Ok(())
    }

    /// Load a store from its snapshot, an empty store when there is none yet
    pub async fn load(config: StoreConfig, path: &Path) -> Result<Self> {
        let blob = match tokio::fs::read(path).await {
            Ok(blob) => blob,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::info!(path=%path.display(), "no snapshot yet, starting empty");
                return Ok(Self::new(config));
            }
            Err(e) => {
                return Err(e).with_context(|| format!("unable to read {}", path.display()))
            }
        };

        let snapshot = decode(&blob)
            .with_context(|| format!("corrupted snapshot {}", path.display()))?;
        Ok(Self::from_snapshot(config, snapshot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoded_blobs_decode() {
        let mut map = BTreeMap::new();
        map.insert("home".to_string(), vec![1u64, 2, 3]);
        let blob = encode(&map).unwrap();
        let back: BTreeMap<String, Vec<u64>> = decode(&blob).unwrap();
        assert_eq!(back, map);

        assert!(decode::<BTreeMap<String, Vec<u64>>>(b"garbage").is_err());
    }
}
