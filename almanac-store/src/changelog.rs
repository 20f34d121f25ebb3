use std::ops::Bound;

use im::OrdMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use almanac_collections::{ChangeFold, ChangeKind};

/// Sync tokens are a per calendar counter
pub type Token = u64;

/// First token of a new calendar
pub const ORIGIN: Token = 1;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Change {
    Added(String),
    Modified(String),
    Deleted(String),
    /// Calendar properties changed, no member is affected
    Properties,
}

impl Change {
    fn member(&self) -> Option<(&str, ChangeKind)> {
        match self {
            Self::Added(uri) => Some((uri, ChangeKind::Added)),
            Self::Modified(uri) => Some((uri, ChangeKind::Modified)),
            Self::Deleted(uri) => Some((uri, ChangeKind::Deleted)),
            Self::Properties => None,
        }
    }
}

/// Ordered record of the changes of one calendar
#[derive(Clone, Debug, PartialEq)]
pub struct ChangeLog {
    /// Current token
    head: Token,
    /// Oldest token a diff can still be computed from
    floor: Token,
    /// Change brought by each token
    changes: OrdMap<Token, Change>,
}

impl Default for ChangeLog {
    fn default() -> Self {
        Self {
            head: ORIGIN,
            floor: ORIGIN,
            changes: OrdMap::new(),
        }
    }
}

/// Outcome of a diff between a known token and the head
pub struct Diff {
    pub fold: ChangeFold,
    /// Token to resume from, the head unless truncated
    pub token: Token,
    pub truncated: bool,
}

impl ChangeLog {
    pub fn head(&self) -> Token {
        self.head
    }

    pub fn floor(&self) -> Token {
        self.floor
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Advance the head with a new change
    pub fn record(&mut self, change: Change) -> Token {
        self.head += 1;
        self.changes.insert(self.head, change);
        self.head
    }

    /// Forget the oldest changes so that at most `retained` are kept.
    /// Tokens older than the forgotten changes expire.
    pub fn trim(&mut self, retained: usize) {
        while self.changes.len() > retained {
            let oldest = match self.changes.get_min() {
                Some((token, _)) => *token,
                None => break,
            };
            self.changes.remove(&oldest);
            self.floor = oldest;
        }
    }

    /// Net changes after `known`, `None` if the token is unknown or expired.
    ///
    /// With a limit, at most `limit` distinct members are reported and the
    /// returned token is the last one whose change is included.
    pub fn since(&self, known: Token, limit: Option<usize>) -> Option<Diff> {
        if known < self.floor || known > self.head {
            return None;
        }

        let mut fold = ChangeFold::default();
        let mut reached = known;
        for (token, change) in self.changes.range((Bound::Excluded(known), Bound::Unbounded)) {
            if let Some((uri, kind)) = change.member() {
                if let Some(limit) = limit {
                    if fold.len() >= limit && !fold.contains(uri) {
                        return Some(Diff {
                            fold,
                            token: reached,
                            truncated: true,
                        });
                    }
                }
                fold.push(uri, kind);
            }
            reached = *token;
        }

        Some(Diff {
            fold,
            token: self.head,
            truncated: false,
        })
    }
}

// CUSTOM SERIALIZATION & DESERIALIZATION
#[derive(Serialize, Deserialize)]
struct ChangeLogSerializedRepr {
    head: Token,
    floor: Token,
    changes: Vec<(Token, Change)>,
}

impl<'de> Deserialize<'de> for ChangeLog {
    fn deserialize<D>(d: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let val = ChangeLogSerializedRepr::deserialize(d)?;
        Ok(ChangeLog {
            head: val.head,
            floor: val.floor,
            changes: val.changes.into_iter().collect(),
        })
    }
}

impl Serialize for ChangeLog {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        // Property changes only advance the head, they are not needed to
        // compute member diffs once the head is saved
        let changes = self
            .changes
            .iter()
            .filter(|(_, change)| **change != Change::Properties)
            .map(|(token, change)| (*token, change.clone()))
            .collect();

        let val = ChangeLogSerializedRepr {
            head: self.head,
            floor: self.floor,
            changes,
        };
        val.serialize(serializer)
    }
}

// ---- TESTS ----
