use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{anyhow, bail};
use lazy_static::lazy_static;
use rand::prelude::*;
use serde::{de::Error, Deserialize, Deserializer, Serialize, Serializer};

use crate::timestamp::now_msec;

const IDENT_LEN: usize = 24;

/// Identifier of calendars, instances, notifications and subscriptions.
///
/// Layout, big endian:
/// - creation time in milliseconds, 64 bits
/// - a random tag drawn once per process, 64 bits
/// - a per process sequence number, 64 bits
///
/// Idents therefore sort by creation time, and two processes working from
/// the same snapshot never hand out the same one.
#[derive(Clone, Copy, PartialOrd, Ord, PartialEq, Eq, Hash, Debug)]
pub struct UniqueIdent([u8; IDENT_LEN]);

impl UniqueIdent {
    /// Milliseconds since the epoch at which the ident was generated
    pub fn created(&self) -> u64 {
        let mut ms = [0u8; 8];
        ms.copy_from_slice(&self.0[0..8]);
        u64::from_be_bytes(ms)
    }
}

struct IdentSource {
    tag: u64,
    seq: AtomicU64,
}

lazy_static! {
    static ref SOURCE: IdentSource = IdentSource {
        tag: thread_rng().gen(),
        seq: AtomicU64::new(0),
    };
}

pub fn gen_ident() -> UniqueIdent {
    let seq = SOURCE.seq.fetch_add(1, Ordering::Relaxed);
    let mut raw = [0u8; IDENT_LEN];
    raw[0..8].copy_from_slice(&now_msec().to_be_bytes());
    raw[8..16].copy_from_slice(&SOURCE.tag.to_be_bytes());
    raw[16..24].copy_from_slice(&seq.to_be_bytes());
    UniqueIdent(raw)
}

impl fmt::Display for UniqueIdent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl FromStr for UniqueIdent {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        let bytes = hex::decode(s).map_err(|e| anyhow!("ident {:?} is not hex: {}", s, e))?;
        let raw: [u8; IDENT_LEN] = match bytes.try_into() {
            Ok(raw) => raw,
            Err(bytes) => bail!("ident is {} bytes long, expected {}", bytes.len(), IDENT_LEN),
        };
        Ok(Self(raw))
    }
}

// Idents are serialized in their hex form

impl Serialize for UniqueIdent {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for UniqueIdent {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let hex = String::deserialize(d)?;
        hex.parse().map_err(D::Error::custom)
    }
}
