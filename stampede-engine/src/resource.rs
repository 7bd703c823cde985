//! Registry of entities created during a run

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rand::seq::IndexedRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Book,
    Borrow,
    Notification,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Book => "book",
            ResourceKind::Borrow => "borrow",
            ResourceKind::Notification => "notification",
        }
    }

    pub fn all() -> &'static [ResourceKind] {
        &[
            ResourceKind::Book,
            ResourceKind::Borrow,
            ResourceKind::Notification,
        ]
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedResource {
    pub id: String,
    pub kind: ResourceKind,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Entries {
    items: Vec<CreatedResource>,
    ids: HashSet<String>,
}

/// Append-only, shared by every worker of a run
///
/// All mutation happens under one write lock, so a reader never sees a
/// partially appended entry. Entries are never removed during a run.
#[derive(Debug, Default)]
pub struct ResourceTracker {
    entries: RwLock<HashMap<ResourceKind, Entries>>,
}

impl ResourceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, kind: ResourceKind, id: impl Into<String>) -> CreatedResource {
        let resource = CreatedResource {
            id: id.into(),
            kind,
            created_at: Utc::now(),
        };
        let mut entries = self.entries.write();
        let slot = entries.entry(kind).or_default();
        slot.ids.insert(resource.id.clone());
        slot.items.push(resource.clone());
        resource
    }

    /// Record `id` unless it is already tracked. Returns whether it was added.
    pub fn record_unique(&self, kind: ResourceKind, id: impl Into<String>) -> bool {
        let id = id.into();
        let mut entries = self.entries.write();
        let slot = entries.entry(kind).or_default();
        if !slot.ids.insert(id.clone()) {
            return false;
        }
        slot.items.push(CreatedResource {
            id,
            kind,
            created_at: Utc::now(),
        });
        true
    }

    /// Uniformly random tracked resource of `kind`, `None` when there is none
    pub fn sample_one<R: Rng + ?Sized>(&self, kind: ResourceKind, rng: &mut R) -> Option<CreatedResource> {
        let entries = self.entries.read();
        entries.get(&kind)?.items.choose(rng).cloned()
    }

    pub fn count(&self, kind: ResourceKind) -> usize {
        self.entries
            .read()
            .get(&kind)
            .map(|slot| slot.items.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self, kind: ResourceKind) -> bool {
        self.count(kind) == 0
    }

    /// Count per kind, including kinds nothing was recorded for
    pub fn counts(&self) -> BTreeMap<ResourceKind, usize> {
        let entries = self.entries.read();
        ResourceKind::all()
            .iter()
            .map(|kind| (*kind, entries.get(kind).map(|s| s.items.len()).unwrap_or(0)))
            .collect()
    }

    pub fn snapshot(&self, kind: ResourceKind) -> Vec<CreatedResource> {
        self.entries
            .read()
            .get(&kind)
            .map(|slot| slot.items.clone())
            .unwrap_or_default()
    }
}
