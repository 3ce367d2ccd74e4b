//! Assembling a complete network from its definition.

use std::sync::Arc;
use std::time::Duration;

use settle_cascade::{
  CascadeEngine, EngineConfig, FaultPolicy, RandomFaults, Router, SimulatedRouter, StepTarget,
};
use settle_config::NetworkDef;
use settle_graph::BondGraph;
use settle_store::CapacityStore;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::action::{
  REBALANCE_CHARGE, REPAIR_BONDS, REPORT_HEALTH, RebalanceCharge, RepairBonds, ReportHealth,
  TriggerCascade, trigger_cascade_action,
};
use crate::error::AutomationError;
use crate::scheduler::{Scheduler, default_rules, default_timers};
use crate::transfer::{TRANSFER_CHARGE, TransferCharge, settlement_cascade};

/// Every component of a running network, wired together.
pub struct Network {
  graph: Arc<BondGraph>,
  store: Arc<CapacityStore>,
  router: Arc<SimulatedRouter>,
  engine: Arc<CascadeEngine>,
  scheduler: Arc<Scheduler>,
}

impl Network {
  /// Build a network whose router injects the configured random faults.
  pub fn from_def(def: NetworkDef) -> Result<Self, AutomationError> {
    let faults = RandomFaults::new(
      def.faults.failure_rate,
      Duration::from_millis(def.faults.max_latency_ms),
    );
    Self::with_faults(def, faults)
  }

  /// Build a network with a custom fault policy.
  ///
  /// Registration order: nodes (with initial charge), bonds, the built-in
  /// and configured cascades, router targets for every node and every named
  /// step target, rule actions, then rules and timers. Empty `rules` or
  /// `timers` fall back to the defaults; non-empty ones replace them.
  pub fn with_faults(
    def: NetworkDef,
    faults: impl FaultPolicy + 'static,
  ) -> Result<Self, AutomationError> {
    let graph = Arc::new(BondGraph::new());
    let store = Arc::new(CapacityStore::new(graph.clone()));

    for node in &def.nodes {
      store.register(&node.node_id, node.capacitance)?;
      if node.initial_charge > 0 {
        store.deposit(&node.node_id, node.initial_charge)?;
      }
    }
    for bond in &def.bonds {
      graph.connect(&bond.source, &bond.target, bond.strength);
    }

    let router = Arc::new(SimulatedRouter::new(faults));
    let config = EngineConfig {
      retry_backoff: Duration::from_millis(def.engine.retry_backoff_ms),
      ..EngineConfig::default()
    };
    let engine = Arc::new(CascadeEngine::new(config, router.clone())?);
    engine.register_action(TRANSFER_CHARGE, Arc::new(TransferCharge::new(store.clone())));
    engine.register_cascade(settlement_cascade())?;
    for cascade in def.cascades {
      engine.register_cascade(cascade)?;
    }

    for node in &def.nodes {
      router.add_target(&node.node_id);
    }
    for name in engine.cascade_names() {
      let cascade = engine.cascade(&name)?;
      for step in &cascade.steps {
        if let StepTarget::Node(target) = &step.target {
          router.add_target(target);
        }
      }
    }

    let scheduler = Arc::new(Scheduler::new(def.engine.history_limit));
    for name in engine.cascade_names() {
      scheduler.register_action(
        &trigger_cascade_action(&name),
        Arc::new(TriggerCascade::new(engine.clone(), &name)),
      );
    }
    scheduler.register_action(REPAIR_BONDS, Arc::new(RepairBonds::new(graph.clone())));
    scheduler.register_action(REBALANCE_CHARGE, Arc::new(RebalanceCharge::new(store.clone())));
    scheduler.register_action(
      REPORT_HEALTH,
      Arc::new(ReportHealth::new(graph.clone(), store.clone(), engine.clone())),
    );

    let rules = if def.rules.is_empty() {
      default_rules()
    } else {
      def.rules
    };
    for rule in rules {
      scheduler.add_rule(rule);
    }
    let timers = if def.timers.is_empty() {
      default_timers()
    } else {
      def.timers
    };
    for timer in timers {
      scheduler.add_timer(timer);
    }

    info!(
      nodes = def.nodes.len(),
      bonds = def.bonds.len(),
      cascades = engine.cascade_names().len(),
      targets = router.targets().len(),
      "network_assembled"
    );

    Ok(Self {
      graph,
      store,
      router,
      engine,
      scheduler,
    })
  }

  pub fn graph(&self) -> &Arc<BondGraph> {
    &self.graph
  }

  pub fn store(&self) -> &Arc<CapacityStore> {
    &self.store
  }

  pub fn router(&self) -> &Arc<SimulatedRouter> {
    &self.router
  }

  pub fn engine(&self) -> &Arc<CascadeEngine> {
    &self.engine
  }

  pub fn scheduler(&self) -> &Arc<Scheduler> {
    &self.scheduler
  }

  /// Run the scheduler's timers until `cancel` fires.
  pub async fn run_timers(&self, cancel: CancellationToken) {
    self.scheduler.run_timers(cancel).await;
  }
}
