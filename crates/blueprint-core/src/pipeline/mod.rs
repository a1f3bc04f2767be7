//! Pipeline Orchestrator
//!
//! One event, in order:
//!
//! ```text
//! entitlement ─> validate ─> [lock blueprint] ─> load state ─> map force
//!      ─> solve ─> SEDA ─> guidance ─> enrichment ─> commit ─> [unlock]
//! ```
//!
//! Rejections (entitlement, validation) happen before the lock and before
//! any write. Everything the event produces is written by a single
//! `commit_event`, so an error anywhere leaves the store untouched and the
//! reserved entitlement unit is handed back.

use chrono::Duration;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::entitlement::{EntitlementGate, Unlimited};
use crate::error::{BlueprintError, Result};
use crate::event::{EventInput, EventRecord, ValidatedEvent};
use crate::inversion::{
    enrich_with_timeout, EnrichmentContext, GuidancePreferences, GuidanceRequest, InversionEngine,
    InversionScript, TextEnricher,
};
use crate::physics::state::{SnapshotSource, StateSnapshot, VectorState};
use crate::physics::VectorStateSolver;
use crate::profile::{derive_baseline, Blueprint};
use crate::reference::{GateEntry, ReferenceTable};
use crate::seda::{
    CrisisMonitor, DeEscalationDecision, SedaProtocol, TriggerCondition, TriggerEvaluation,
};
use crate::severity::Severity;
use crate::store::{BlueprintStore, EventCommit};
use crate::stress::{ForceAnalysis, StressMapper};
use crate::types::{now, BlueprintId, EventId, SnapshotId, Timestamp, UserId};

/// Gates consulted when none resonate with the event text
const DEFAULT_GATE_COUNT: usize = 3;

/// Recent event titles handed to the enricher
const ENRICHMENT_HISTORY: usize = 3;

/// Result record for one processed event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventOutcome {
    pub event_id: EventId,
    pub force_analysis: ForceAnalysis,
    pub new_state: VectorState,
    pub snapshot_id: SnapshotId,
    /// Protocol opened, escalated or calmed by this event
    pub seda_protocol: Option<SedaProtocol>,
    pub script: InversionScript,
}

/// Result of an explicit de-escalation request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeEscalationOutcome {
    pub protocol: SedaProtocol,
    pub decision: DeEscalationDecision,
}

/// Sequences the pipeline stages against a store
pub struct PipelineOrchestrator {
    store: Arc<dyn BlueprintStore>,
    entitlements: Arc<dyn EntitlementGate>,
    enricher: Option<Arc<dyn TextEnricher>>,
    reference: Arc<ReferenceTable>,
    config: EngineConfig,
    mapper: StressMapper,
    solver: VectorStateSolver,
    monitor: CrisisMonitor,
    inversion: InversionEngine,
    /// One writer per Blueprint; entries live only while someone holds or waits
    locks: DashMap<BlueprintId, Arc<Mutex<()>>>,
}

/// Held for the duration of one Blueprint mutation
struct BlueprintLock<'a> {
    locks: &'a DashMap<BlueprintId, Arc<Mutex<()>>>,
    id: BlueprintId,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for BlueprintLock<'_> {
    fn drop(&mut self) {
        self.guard.take();
        // remove_if holds the shard lock, so no waiter can clone the Arc meanwhile
        self.locks
            .remove_if(&self.id, |_, lock| Arc::strong_count(lock) == 1);
    }
}

impl std::fmt::Debug for PipelineOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineOrchestrator")
            .field("config", &self.config)
            .field("enricher", &self.enricher.as_ref().map(|e| e.name().to_string()))
            .field("locked_blueprints", &self.locks.len())
            .finish_non_exhaustive()
    }
}

impl PipelineOrchestrator {
    pub fn new(
        store: Arc<dyn BlueprintStore>,
        reference: Arc<ReferenceTable>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            entitlements: Arc::new(Unlimited),
            enricher: None,
            reference,
            mapper: StressMapper::new(config.stress.clone()),
            solver: VectorStateSolver::new(config.solver),
            monitor: CrisisMonitor::new(config.seda.clone()),
            inversion: InversionEngine::new(config.inversion.clone()),
            config,
            locks: DashMap::new(),
        }
    }

    pub fn with_entitlements(mut self, entitlements: Arc<dyn EntitlementGate>) -> Self {
        self.entitlements = entitlements;
        self
    }

    pub fn with_enricher(mut self, enricher: Arc<dyn TextEnricher>) -> Self {
        self.enricher = Some(enricher);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn reference(&self) -> &ReferenceTable {
        &self.reference
    }

    pub fn store(&self) -> &Arc<dyn BlueprintStore> {
        &self.store
    }

    async fn lock_blueprint(&self, id: BlueprintId) -> BlueprintLock<'_> {
        let lock = self
            .locks
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        BlueprintLock {
            locks: &self.locks,
            id,
            guard: Some(lock.lock_owned().await),
        }
    }

    fn load_owned_blueprint(&self, user: &UserId, id: BlueprintId) -> Result<Blueprint> {
        match self.store.load_blueprint(id)? {
            Some(blueprint) if blueprint.owner == *user => Ok(blueprint),
            _ => Err(BlueprintError::NotFound(format!("blueprint {}", id))),
        }
    }

    fn load_blueprint(&self, id: BlueprintId) -> Result<Blueprint> {
        self.store
            .load_blueprint(id)?
            .ok_or_else(|| BlueprintError::NotFound(format!("blueprint {}", id)))
    }

    /// Persist a new Blueprint and its baseline snapshot
    pub async fn register_blueprint(&self, blueprint: &Blueprint) -> Result<StateSnapshot> {
        let _lock = self.lock_blueprint(blueprint.id).await;

        if self.store.load_latest_state(blueprint.id)?.is_some() {
            return Err(BlueprintError::StateInvariant(format!(
                "blueprint {} is already registered",
                blueprint.id
            )));
        }
        let baseline = StateSnapshot::new(
            blueprint.id,
            derive_baseline(blueprint),
            SnapshotSource::Baseline,
            blueprint.created_at,
        )?;
        self.store.save_blueprint(blueprint)?;
        self.store.append_state(&baseline)?;
        info!(blueprint_id = %blueprint.id, profile_type = %blueprint.profile_type, "blueprint registered");
        Ok(baseline)
    }

    /// Run one event through the whole pipeline
    pub async fn process_event(
        &self,
        user: &UserId,
        blueprint_id: BlueprintId,
        input: EventInput,
        preferences: &GuidancePreferences,
    ) -> Result<EventOutcome> {
        let entitlement = self.entitlements.try_consume(user);
        if !entitlement.allowed {
            warn!(%user, limit = ?entitlement.limit, "event refused by entitlement gate");
            return Err(BlueprintError::Entitlement {
                limit: entitlement.limit.unwrap_or(0),
            });
        }

        let outcome = self.run_event(user, blueprint_id, input, preferences).await;
        if let Err(e) = &outcome {
            debug!(%user, error = %e, "event failed, releasing entitlement");
            self.entitlements.release(user);
        }
        outcome
    }

    async fn run_event(
        &self,
        user: &UserId,
        blueprint_id: BlueprintId,
        input: EventInput,
        preferences: &GuidancePreferences,
    ) -> Result<EventOutcome> {
        let received_at = now();
        let event = input.validate(received_at)?;

        let _lock = self.lock_blueprint(blueprint_id).await;

        let blueprint = self.load_owned_blueprint(user, blueprint_id)?;
        let (current, baseline) = self.current_state(&blueprint, received_at)?;

        let activated: Vec<u16> = blueprint.gates.iter().copied().collect();
        let (force, analysis) =
            self.mapper
                .map(&event, blueprint.profile_type, &activated, &self.reference);
        let new_state = self.solver.apply(&current, &force, None);
        debug!(
            %blueprint_id,
            from = ?current.axes(),
            to = ?new_state.axes(),
            "state solved"
        );

        let event_id = EventId::new();
        let evaluation = self.monitor.evaluate(analysis.final_magnitude, &event.category);
        let protocol = self.update_protocol(&blueprint, event_id, &event, &evaluation, received_at)?;

        let band = event.severity.band();
        let script = match (&protocol, evaluation.triggered()) {
            (Some(protocol), true) => self.inversion.crisis(protocol, band),
            _ => {
                let gates = self.select_gates(&blueprint, &analysis.resonant_gates);
                let request = GuidanceRequest {
                    event: &event,
                    state: &new_state,
                    band,
                    gates,
                    preferences,
                };
                let script = self.inversion.generate(&request);
                self.enrich(script, &blueprint, &new_state, preferences).await
            }
        };

        let snapshot = StateSnapshot::new(
            blueprint_id,
            new_state,
            SnapshotSource::Event { event_id },
            received_at,
        )?;
        let record = EventRecord {
            id: event_id,
            blueprint_id,
            title: event.title.clone(),
            description: event.description.clone(),
            severity: event.severity,
            category: event.category.clone(),
            force_analysis: analysis.clone(),
            resulting_snapshot: snapshot.id,
            script: script.clone(),
            protocol_id: protocol.as_ref().map(|p| p.id),
            occurred_at: event.occurred_at,
        };
        let snapshot_id = snapshot.id;

        self.store.commit_event(&EventCommit {
            baseline,
            snapshot,
            event: record,
            protocol: protocol.clone(),
        })?;

        info!(
            %blueprint_id,
            %event_id,
            magnitude = analysis.final_magnitude,
            seda_level = protocol.as_ref().map(|p| p.level).unwrap_or(0),
            "event processed"
        );

        Ok(EventOutcome {
            event_id,
            force_analysis: analysis,
            new_state,
            snapshot_id,
            seda_protocol: protocol,
            script,
        })
    }

    /// Latest state, or the baseline to write alongside the first event
    fn current_state(
        &self,
        blueprint: &Blueprint,
        at: Timestamp,
    ) -> Result<(VectorState, Option<StateSnapshot>)> {
        if let Some(latest) = self.store.load_latest_state(blueprint.id)? {
            return Ok((latest.state, None));
        }
        let logged = self.store.count_events(blueprint.id)?;
        if logged > 0 {
            return Err(BlueprintError::StateInvariant(format!(
                "blueprint {} has {} events but no state history",
                blueprint.id, logged
            )));
        }
        let baseline = StateSnapshot::new(
            blueprint.id,
            derive_baseline(blueprint),
            SnapshotSource::Baseline,
            at,
        )?;
        Ok((baseline.state, Some(baseline)))
    }

    /// (severity, time) of events inside the de-escalation window
    fn recent_severities(&self, id: BlueprintId, at: Timestamp) -> Result<Vec<(Severity, Timestamp)>> {
        let since = at - Duration::hours(self.config.seda.de_escalation_window_hours);
        Ok(self
            .store
            .events_since(id, since)?
            .into_iter()
            .map(|e| (e.severity, e.occurred_at))
            .collect())
    }

    fn update_protocol(
        &self,
        blueprint: &Blueprint,
        event_id: EventId,
        event: &ValidatedEvent,
        evaluation: &TriggerEvaluation,
        at: Timestamp,
    ) -> Result<Option<SedaProtocol>> {
        let open = self.store.load_open_protocol(blueprint.id)?;
        let trigger = || TriggerCondition {
            event_id,
            magnitude: evaluation.magnitude,
            category: evaluation.category.clone(),
            level: evaluation.level,
            health_bumped: evaluation.health_bumped,
            at,
        };

        match (evaluation.triggered(), open) {
            (true, None) => Ok(Some(self.monitor.activate(
                blueprint.id,
                blueprint.profile_type,
                trigger(),
            ))),
            (true, Some(mut protocol)) => {
                self.monitor
                    .escalate(&mut protocol, blueprint.profile_type, trigger())?;
                Ok(Some(protocol))
            }
            (false, Some(mut protocol)) => {
                let mut recent = self.recent_severities(blueprint.id, at)?;
                recent.push((event.severity, event.occurred_at));
                let decision =
                    self.monitor
                        .review_calm(&mut protocol, blueprint.profile_type, recent, at)?;
                debug!(protocol = %protocol.id, status = %protocol.status, eligible = decision.eligible, "calm event reviewed");
                Ok(Some(protocol))
            }
            (false, None) => Ok(None),
        }
    }

    /// Resonant gates, else the first few activated gates with reference data
    fn select_gates(&self, blueprint: &Blueprint, resonant: &[u16]) -> Vec<&GateEntry> {
        if !resonant.is_empty() {
            return resonant
                .iter()
                .filter_map(|g| self.reference.gate(*g))
                .collect();
        }
        blueprint
            .gates
            .iter()
            .filter_map(|g| self.reference.gate(*g))
            .take(DEFAULT_GATE_COUNT)
            .collect()
    }

    async fn enrich(
        &self,
        script: InversionScript,
        blueprint: &Blueprint,
        state: &VectorState,
        preferences: &GuidancePreferences,
    ) -> InversionScript {
        let Some(enricher) = &self.enricher else {
            return script;
        };
        let recent_history = match self.store.recent_events(blueprint.id, ENRICHMENT_HISTORY) {
            Ok(events) => events.into_iter().map(|e| e.title).collect(),
            Err(e) => {
                warn!(blueprint_id = %blueprint.id, error = %e, "recent events unavailable, enriching without history");
                Vec::new()
            }
        };
        let context = EnrichmentContext {
            communication_style: preferences.communication_style,
            recent_history,
            band: Some(script.band),
            primary_axis: Some(state.primary_stress_axis()),
        };
        enrich_with_timeout(enricher.as_ref(), script, &context, self.config.enrichment.timeout()).await
    }

    /// Time-only drift toward baseline since the latest snapshot
    pub async fn apply_recovery(&self, blueprint_id: BlueprintId, at: Timestamp) -> Result<StateSnapshot> {
        let _lock = self.lock_blueprint(blueprint_id).await;

        self.load_blueprint(blueprint_id)?;
        let latest = self.store.load_latest_state(blueprint_id)?.ok_or_else(|| {
            BlueprintError::StateInvariant(format!("blueprint {} has no state history", blueprint_id))
        })?;

        let elapsed_days = (at - latest.recorded_at).num_seconds().max(0) as f64 / 86_400.0;
        let recovered = self.solver.recover(&latest.state, elapsed_days);
        let snapshot = StateSnapshot::new(blueprint_id, recovered, SnapshotSource::Recovery, at)?;
        self.store.append_state(&snapshot)?;
        info!(%blueprint_id, elapsed_days, "recovery applied");
        Ok(snapshot)
    }

    /// Ask to resolve the open protocol; blocked requests change nothing
    pub async fn request_de_escalation(
        &self,
        blueprint_id: BlueprintId,
        at: Timestamp,
    ) -> Result<DeEscalationOutcome> {
        let _lock = self.lock_blueprint(blueprint_id).await;

        let mut protocol = self.store.load_open_protocol(blueprint_id)?.ok_or_else(|| {
            BlueprintError::NotFound(format!("open SEDA protocol for blueprint {}", blueprint_id))
        })?;
        let recent = self.recent_severities(blueprint_id, at)?;
        let decision = self.monitor.try_resolve(&mut protocol, recent, at)?;
        if decision.eligible {
            self.store.open_or_update_protocol(&protocol)?;
        }
        Ok(DeEscalationOutcome { protocol, decision })
    }

    /// Newest first; takes no lock
    pub fn state_history(&self, blueprint_id: BlueprintId, limit: usize) -> Result<Vec<StateSnapshot>> {
        self.store.state_history(blueprint_id, limit)
    }

    pub fn latest_state(&self, blueprint_id: BlueprintId) -> Result<Option<StateSnapshot>> {
        self.store.load_latest_state(blueprint_id)
    }

    pub fn open_protocol(&self, blueprint_id: BlueprintId) -> Result<Option<SedaProtocol>> {
        self.store.load_open_protocol(blueprint_id)
    }

    pub fn recent_events(&self, blueprint_id: BlueprintId, limit: usize) -> Result<Vec<EventRecord>> {
        self.store.recent_events(blueprint_id, limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::ProfileType;
    use crate::store::InMemoryStore;

    fn orchestrator() -> PipelineOrchestrator {
        PipelineOrchestrator::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(ReferenceTable::builtin().unwrap()),
            EngineConfig::default(),
        )
    }

    fn user() -> UserId {
        UserId::new("user-1")
    }

    #[test]
    fn test_select_gates_prefers_resonant() {
        let pipeline = orchestrator();
        let blueprint = Blueprint::builder(user(), ProfileType::Generator)
            .gates([5, 20, 34, 44, 64])
            .build()
            .unwrap();

        let resonant: Vec<u16> = pipeline
            .select_gates(&blueprint, &[44])
            .iter()
            .map(|g| g.number)
            .collect();
        assert_eq!(resonant, vec![44]);

        let defaults: Vec<u16> = pipeline
            .select_gates(&blueprint, &[])
            .iter()
            .map(|g| g.number)
            .collect();
        assert_eq!(defaults, vec![5, 20, 34]);
    }

    #[test]
    fn test_select_gates_skips_gates_without_reference_data() {
        let pipeline = orchestrator();
        let blueprint = Blueprint::builder(user(), ProfileType::Generator)
            .gates([1, 2, 3])
            .build()
            .unwrap();
        assert!(pipeline.select_gates(&blueprint, &[]).is_empty());
    }

    #[tokio::test]
    async fn test_first_event_writes_baseline_with_it() {
        let store = Arc::new(InMemoryStore::new());
        let pipeline = PipelineOrchestrator::new(
            store.clone(),
            Arc::new(ReferenceTable::builtin().unwrap()),
            EngineConfig::default(),
        );
        let blueprint = Blueprint::builder(user(), ProfileType::Projector).build().unwrap();
        store.save_blueprint(&blueprint).unwrap();

        pipeline
            .process_event(
                &user(),
                blueprint.id,
                EventInput::new("Late meeting", "", 3, "work"),
                &GuidancePreferences::default(),
            )
            .await
            .unwrap();

        let history = store.state_history(blueprint.id, 10).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].source, SnapshotSource::Baseline);
    }

    #[tokio::test]
    async fn test_other_users_blueprint_is_not_found() {
        let pipeline = orchestrator();
        let blueprint = Blueprint::builder(user(), ProfileType::Projector).build().unwrap();
        pipeline.register_blueprint(&blueprint).await.unwrap();

        let err = pipeline
            .process_event(
                &UserId::new("intruder"),
                blueprint.id,
                EventInput::new("Late meeting", "", 3, "work"),
                &GuidancePreferences::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, BlueprintError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_lock_entries_are_dropped_when_idle() {
        let pipeline = Arc::new(orchestrator());
        let blueprint = Blueprint::builder(user(), ProfileType::Generator).build().unwrap();
        pipeline.register_blueprint(&blueprint).await.unwrap();
        assert!(pipeline.locks.is_empty());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let pipeline = pipeline.clone();
                let id = blueprint.id;
                tokio::spawn(async move {
                    pipeline
                        .process_event(
                            &user(),
                            id,
                            EventInput::new("Late meeting", "", 3, "work"),
                            &GuidancePreferences::default(),
                        )
                        .await
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert!(pipeline.locks.is_empty());

        let held = pipeline.lock_blueprint(blueprint.id).await;
        assert_eq!(pipeline.locks.len(), 1);
        drop(held);
        assert!(pipeline.locks.is_empty());
    }

    #[tokio::test]
    async fn test_register_twice_is_refused() {
        let pipeline = orchestrator();
        let blueprint = Blueprint::builder(user(), ProfileType::Manifestor).build().unwrap();
        pipeline.register_blueprint(&blueprint).await.unwrap();
        assert!(pipeline.register_blueprint(&blueprint).await.is_err());
    }
}
