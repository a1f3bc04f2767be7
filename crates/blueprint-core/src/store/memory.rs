//! In-memory store for tests and embedding

use parking_lot::RwLock;
use std::collections::HashMap;

use super::{BlueprintStore, EventCommit};
use crate::error::{BlueprintError, Result};
use crate::event::EventRecord;
use crate::physics::state::StateSnapshot;
use crate::profile::Blueprint;
use crate::seda::SedaProtocol;
use crate::types::{BlueprintId, Timestamp};

#[derive(Debug, Default)]
struct Tables {
    blueprints: HashMap<BlueprintId, Blueprint>,
    /// Arrival order per Blueprint
    snapshots: HashMap<BlueprintId, Vec<StateSnapshot>>,
    events: HashMap<BlueprintId, Vec<EventRecord>>,
    protocols: HashMap<BlueprintId, Vec<SedaProtocol>>,
}

impl Tables {
    fn check_protocol(&self, protocol: &SedaProtocol) -> Result<()> {
        if !protocol.is_open() {
            return Ok(());
        }
        let conflict = self
            .protocols
            .get(&protocol.blueprint_id)
            .into_iter()
            .flatten()
            .any(|p| p.is_open() && p.id != protocol.id);
        if conflict {
            return Err(BlueprintError::StateInvariant(format!(
                "blueprint {} already has an open SEDA protocol",
                protocol.blueprint_id
            )));
        }
        Ok(())
    }

    fn upsert_protocol(&mut self, protocol: &SedaProtocol) {
        let list = self.protocols.entry(protocol.blueprint_id).or_default();
        match list.iter_mut().find(|p| p.id == protocol.id) {
            Some(existing) => *existing = protocol.clone(),
            None => list.push(protocol.clone()),
        }
    }
}

/// Process-local store backed by hash maps
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BlueprintStore for InMemoryStore {
    fn save_blueprint(&self, blueprint: &Blueprint) -> Result<()> {
        self.tables
            .write()
            .blueprints
            .insert(blueprint.id, blueprint.clone());
        Ok(())
    }

    fn load_blueprint(&self, id: BlueprintId) -> Result<Option<Blueprint>> {
        Ok(self.tables.read().blueprints.get(&id).cloned())
    }

    fn list_blueprints(&self) -> Result<Vec<Blueprint>> {
        let mut all: Vec<Blueprint> = self.tables.read().blueprints.values().cloned().collect();
        all.sort_by_key(|b| b.created_at);
        Ok(all)
    }

    fn load_latest_state(&self, id: BlueprintId) -> Result<Option<StateSnapshot>> {
        let tables = self.tables.read();
        let Some(snapshot) = tables.snapshots.get(&id).and_then(|s| s.last()) else {
            return Ok(None);
        };
        snapshot.verify_integrity()?;
        Ok(Some(snapshot.clone()))
    }

    fn append_state(&self, snapshot: &StateSnapshot) -> Result<()> {
        self.tables
            .write()
            .snapshots
            .entry(snapshot.blueprint_id)
            .or_default()
            .push(snapshot.clone());
        Ok(())
    }

    fn state_history(&self, id: BlueprintId, limit: usize) -> Result<Vec<StateSnapshot>> {
        Ok(self
            .tables
            .read()
            .snapshots
            .get(&id)
            .map(|s| s.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    fn commit_event(&self, commit: &EventCommit) -> Result<()> {
        let mut tables = self.tables.write();
        // validate before touching anything
        if let Some(protocol) = &commit.protocol {
            tables.check_protocol(protocol)?;
        }

        let blueprint_id = commit.snapshot.blueprint_id;
        let snapshots = tables.snapshots.entry(blueprint_id).or_default();
        if let Some(baseline) = &commit.baseline {
            snapshots.push(baseline.clone());
        }
        snapshots.push(commit.snapshot.clone());
        tables
            .events
            .entry(blueprint_id)
            .or_default()
            .push(commit.event.clone());
        if let Some(protocol) = &commit.protocol {
            tables.upsert_protocol(protocol);
        }
        Ok(())
    }

    fn count_events(&self, id: BlueprintId) -> Result<u64> {
        Ok(self
            .tables
            .read()
            .events
            .get(&id)
            .map(|e| e.len() as u64)
            .unwrap_or(0))
    }

    fn events_since(&self, id: BlueprintId, since: Timestamp) -> Result<Vec<EventRecord>> {
        let tables = self.tables.read();
        let mut events: Vec<EventRecord> = tables
            .events
            .get(&id)
            .into_iter()
            .flatten()
            .filter(|e| e.occurred_at >= since)
            .cloned()
            .collect();
        events.sort_by_key(|e| e.occurred_at);
        Ok(events)
    }

    fn recent_events(&self, id: BlueprintId, limit: usize) -> Result<Vec<EventRecord>> {
        Ok(self
            .tables
            .read()
            .events
            .get(&id)
            .map(|e| e.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    fn load_open_protocol(&self, id: BlueprintId) -> Result<Option<SedaProtocol>> {
        Ok(self
            .tables
            .read()
            .protocols
            .get(&id)
            .and_then(|list| list.iter().find(|p| p.is_open()).cloned()))
    }

    fn open_or_update_protocol(&self, protocol: &SedaProtocol) -> Result<()> {
        let mut tables = self.tables.write();
        tables.check_protocol(protocol)?;
        tables.upsert_protocol(protocol);
        Ok(())
    }
}
