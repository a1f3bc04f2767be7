//! Persistence
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                     BlueprintStore                       │
//! ├──────────────┬────────────────┬──────────┬───────────────┤
//! │  blueprints  │ state_snapshots│  events  │ seda_protocols│
//! │ (metadata    │ (append-only,  │ (append- │ (<= 1 open    │
//! │  mutable)    │  BLAKE3)       │  only)   │  per bp)      │
//! └──────────────┴────────────────┴──────────┴───────────────┘
//! ```
//!
//! Snapshots are ordered by arrival, not by timestamp. Callers serialize
//! writes per Blueprint; `commit_event` writes everything an event
//! produces in one step so a failure leaves nothing behind.

pub mod memory;
pub mod sqlite;

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

use crate::error::Result;
use crate::event::EventRecord;
use crate::physics::state::StateSnapshot;
use crate::profile::Blueprint;
use crate::seda::SedaProtocol;
use crate::types::{BlueprintId, Timestamp};

/// Everything a processed event writes
#[derive(Debug, Clone)]
pub struct EventCommit {
    /// Present when this is the Blueprint's first snapshot
    pub baseline: Option<StateSnapshot>,
    pub snapshot: StateSnapshot,
    pub event: EventRecord,
    /// Protocol opened or changed by this event
    pub protocol: Option<SedaProtocol>,
}

/// Storage collaborator for the pipeline
pub trait BlueprintStore: Send + Sync {
    /// Insert, or replace a Blueprint's metadata
    fn save_blueprint(&self, blueprint: &Blueprint) -> Result<()>;

    fn load_blueprint(&self, id: BlueprintId) -> Result<Option<Blueprint>>;

    fn list_blueprints(&self) -> Result<Vec<Blueprint>>;

    /// Most recently appended snapshot
    fn load_latest_state(&self, id: BlueprintId) -> Result<Option<StateSnapshot>>;

    fn append_state(&self, snapshot: &StateSnapshot) -> Result<()>;

    /// Newest first
    fn state_history(&self, id: BlueprintId, limit: usize) -> Result<Vec<StateSnapshot>>;

    /// Atomically write snapshot(s), event and protocol
    fn commit_event(&self, commit: &EventCommit) -> Result<()>;

    fn count_events(&self, id: BlueprintId) -> Result<u64>;

    /// Events that occurred at or after `since`, oldest first
    fn events_since(&self, id: BlueprintId, since: Timestamp) -> Result<Vec<EventRecord>>;

    /// Newest first
    fn recent_events(&self, id: BlueprintId, limit: usize) -> Result<Vec<EventRecord>>;

    /// The Blueprint's non-resolved protocol, if any
    fn load_open_protocol(&self, id: BlueprintId) -> Result<Option<SedaProtocol>>;

    /// Insert or update a protocol; refuses a second open protocol
    fn open_or_update_protocol(&self, protocol: &SedaProtocol) -> Result<()>;
}

/// Behavior every backend must share; run from each backend's tests
#[cfg(test)]
pub(crate) mod conformance {
    use super::*;
    use crate::event::EventCategory;
    use crate::inversion::{InversionScript, ScriptSource};
    use crate::physics::force::Direction;
    use crate::physics::state::{SnapshotSource, VectorState};
    use crate::profile::{derive_baseline, ProfileType};
    use crate::seda::{CrisisMonitor, TriggerCondition};
    use crate::severity::Severity;
    use crate::stress::ForceAnalysis;
    use crate::types::{now, EventId, UserId};
    use chrono::Duration;

    pub fn seeded(store: &dyn BlueprintStore) -> (Blueprint, StateSnapshot) {
        let blueprint = Blueprint::builder(UserId::new("user-1"), ProfileType::Reflector)
            .build()
            .unwrap();
        store.save_blueprint(&blueprint).unwrap();
        let snapshot = StateSnapshot::baseline(blueprint.id, derive_baseline(&blueprint)).unwrap();
        store.append_state(&snapshot).unwrap();
        (blueprint, snapshot)
    }

    pub fn event_commit(
        blueprint_id: BlueprintId,
        severity: i64,
        occurred_at: Timestamp,
        protocol: Option<SedaProtocol>,
    ) -> EventCommit {
        let event_id = EventId::new();
        let snapshot = StateSnapshot::new(
            blueprint_id,
            VectorState::at_baseline(5.0, 5.0, 5.0).with_axes([4.0, 5.0, 5.0]),
            SnapshotSource::Event { event_id },
            occurred_at,
        )
        .unwrap();
        let severity = Severity::new(severity).unwrap();
        let event = EventRecord {
            id: event_id,
            blueprint_id,
            title: "Deadline".into(),
            description: String::new(),
            severity,
            category: EventCategory::Work,
            force_analysis: ForceAnalysis {
                base_impact: severity.as_f64(),
                type_multiplier: 1.0,
                category_modifier: 1.2,
                final_magnitude: severity.as_f64() * 1.2,
                direction: Direction::Resistance,
                duration: 1,
                resonant_gates: vec![],
                fallbacks: vec![],
            },
            resulting_snapshot: snapshot.id,
            script: InversionScript {
                script: "Slow down.".into(),
                deterministic_script: "Slow down.".into(),
                experiments: vec![],
                source: ScriptSource::Deterministic,
                band: severity.band(),
                gates_consulted: vec![],
                personalizations: vec![],
            },
            protocol_id: protocol.as_ref().map(|p| p.id),
            occurred_at,
        };
        EventCommit {
            baseline: None,
            snapshot,
            event,
            protocol,
        }
    }

    pub fn open_protocol(blueprint_id: BlueprintId) -> SedaProtocol {
        CrisisMonitor::default().activate(
            blueprint_id,
            ProfileType::Reflector,
            TriggerCondition {
                event_id: EventId::new(),
                magnitude: 8.0,
                category: EventCategory::Work,
                level: 2,
                health_bumped: false,
                at: now(),
            },
        )
    }

    pub fn blueprint_roundtrip(store: &dyn BlueprintStore) {
        let (mut blueprint, _) = seeded(store);
        assert_eq!(store.load_blueprint(blueprint.id).unwrap(), Some(blueprint.clone()));

        blueprint.metadata.display_name = Some("Renamed".into());
        store.save_blueprint(&blueprint).unwrap();
        let loaded = store.load_blueprint(blueprint.id).unwrap().unwrap();
        assert_eq!(loaded.metadata.display_name.as_deref(), Some("Renamed"));
        assert_eq!(store.list_blueprints().unwrap().len(), 1);
        assert!(store.load_blueprint(BlueprintId::new()).unwrap().is_none());
    }

    pub fn snapshots_in_arrival_order(store: &dyn BlueprintStore) {
        let (blueprint, baseline) = seeded(store);
        // recorded earlier but appended later: still the latest
        let older = StateSnapshot::new(
            blueprint.id,
            baseline.state.with_axes([6.0, 5.0, 5.0]),
            SnapshotSource::Recovery,
            baseline.recorded_at - Duration::hours(1),
        )
        .unwrap();
        store.append_state(&older).unwrap();

        let latest = store.load_latest_state(blueprint.id).unwrap().unwrap();
        assert_eq!(latest.id, older.id);
        let history = store.state_history(blueprint.id, 10).unwrap();
        assert_eq!(history.iter().map(|s| s.id).collect::<Vec<_>>(), vec![older.id, baseline.id]);
        assert_eq!(store.state_history(blueprint.id, 1).unwrap().len(), 1);
    }

    pub fn commit_event_writes_everything(store: &dyn BlueprintStore) {
        let (blueprint, _) = seeded(store);
        let protocol = open_protocol(blueprint.id);
        let commit = event_commit(blueprint.id, 8, now(), Some(protocol.clone()));
        store.commit_event(&commit).unwrap();

        assert_eq!(store.count_events(blueprint.id).unwrap(), 1);
        assert_eq!(
            store.load_latest_state(blueprint.id).unwrap().unwrap().id,
            commit.snapshot.id
        );
        assert_eq!(store.recent_events(blueprint.id, 5).unwrap()[0], commit.event);
        assert_eq!(store.load_open_protocol(blueprint.id).unwrap(), Some(protocol));
    }

    pub fn one_open_protocol(store: &dyn BlueprintStore) {
        let (blueprint, _) = seeded(store);
        let mut first = open_protocol(blueprint.id);
        store.open_or_update_protocol(&first).unwrap();

        let second = open_protocol(blueprint.id);
        let err = store.open_or_update_protocol(&second).unwrap_err();
        assert!(matches!(err, crate::error::BlueprintError::StateInvariant(_)));

        // updating the open one is fine; once resolved a new one may open
        first.level = 3;
        store.open_or_update_protocol(&first).unwrap();
        assert_eq!(store.load_open_protocol(blueprint.id).unwrap().unwrap().level, 3);
        first
            .transition(crate::seda::SedaStatus::Resolved, now(), "test")
            .unwrap();
        store.open_or_update_protocol(&first).unwrap();
        assert!(store.load_open_protocol(blueprint.id).unwrap().is_none());
        store.open_or_update_protocol(&second).unwrap();
        assert_eq!(store.load_open_protocol(blueprint.id).unwrap().unwrap().id, second.id);
    }

    pub fn rejected_commit_leaves_nothing(store: &dyn BlueprintStore) {
        let (blueprint, baseline) = seeded(store);
        store.open_or_update_protocol(&open_protocol(blueprint.id)).unwrap();

        let commit = event_commit(blueprint.id, 9, now(), Some(open_protocol(blueprint.id)));
        assert!(store.commit_event(&commit).is_err());

        assert_eq!(store.count_events(blueprint.id).unwrap(), 0);
        assert_eq!(store.load_latest_state(blueprint.id).unwrap().unwrap().id, baseline.id);
    }

    pub fn events_since_window(store: &dyn BlueprintStore) {
        let (blueprint, _) = seeded(store);
        let t = now();
        for (hours_ago, severity) in [(72, 9), (30, 8), (2, 3)] {
            store
                .commit_event(&event_commit(
                    blueprint.id,
                    severity,
                    t - Duration::hours(hours_ago),
                    None,
                ))
                .unwrap();
        }
        let recent = store.events_since(blueprint.id, t - Duration::hours(48)).unwrap();
        let severities: Vec<u8> = recent.iter().map(|e| e.severity.value()).collect();
        assert_eq!(severities, vec![8, 3]);
        assert_eq!(store.count_events(blueprint.id).unwrap(), 3);
        assert_eq!(store.recent_events(blueprint.id, 1).unwrap()[0].severity.value(), 3);
    }
}
