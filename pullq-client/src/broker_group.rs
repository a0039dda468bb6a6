use dashmap::DashMap;
use std::fmt::{self, Display, Formatter};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// Health of one broker group, shared by every pull entry targeting it.
///
/// Availability is a liveness hint read by routing before each pull; concurrent
/// writers race and the last one wins.
#[derive(Debug)]
pub struct BrokerGroupInfo {
    group_name: String,
    available: AtomicBool,
    // consecutive failures observed since the group was last marked available
    failures: AtomicU32,
}

impl BrokerGroupInfo {
    pub fn new(group_name: impl Into<String>) -> Self {
        BrokerGroupInfo {
            group_name: group_name.into(),
            available: AtomicBool::new(true),
            failures: AtomicU32::new(0),
        }
    }

    pub fn group_name(&self) -> &str {
        &self.group_name
    }

    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::Acquire)
    }

    pub fn set_available(&self, available: bool) {
        if available {
            self.failures.store(0, Ordering::Release);
        }
        self.available.store(available, Ordering::Release);
    }

    /// Record a failed pull against this group and take it out of rotation.
    pub fn mark_failed(&self) {
        let failures = self.failures.fetch_add(1, Ordering::AcqRel) + 1;
        if self.available.swap(false, Ordering::AcqRel) {
            warn!(broker_group = %self.group_name, failures, "broker group marked unavailable");
        }
    }

    pub fn failures(&self) -> u32 {
        self.failures.load(Ordering::Acquire)
    }
}

impl Display for BrokerGroupInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}[{}]",
            self.group_name,
            if self.is_available() { "available" } else { "unavailable" }
        )
    }
}

/// Process-wide registry of broker group health, keyed by group name.
///
/// Groups are created on first discovery and removed only when the topology
/// that announced them is torn down.
#[derive(Debug, Clone, Default)]
pub struct BrokerGroupRegistry {
    groups: Arc<DashMap<String, Arc<BrokerGroupInfo>>>,
}

impl BrokerGroupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_insert(&self, group_name: &str) -> Arc<BrokerGroupInfo> {
        self.groups
            .entry(group_name.to_string())
            .or_insert_with(|| Arc::new(BrokerGroupInfo::new(group_name)))
            .value()
            .clone()
    }

    pub fn get(&self, group_name: &str) -> Option<Arc<BrokerGroupInfo>> {
        self.groups.get(group_name).map(|g| Arc::clone(g.value()))
    }

    /// Called by metadata refresh once a group is announced again.
    pub fn mark_available(&self, group_name: &str) {
        let group = self.get_or_insert(group_name);
        if !group.is_available() {
            info!(broker_group = %group_name, "broker group available again");
        }
        group.set_available(true);
    }

    pub fn remove(&self, group_name: &str) -> Option<Arc<BrokerGroupInfo>> {
        self.groups.remove(group_name).map(|(_, group)| group)
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}
