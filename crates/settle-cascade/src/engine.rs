//! Cascade execution engine.
//!
//! The [`CascadeEngine`] owns the cascade catalogue, the internal action
//! registry, and every chain it has started. `trigger(name, data)` runs one
//! chain to a terminal status and returns its full record.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use settle_config::{CascadeDef, ErrorPolicy};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::action::{InternalAction, StepContext};
use crate::cascade::{Cascade, Step, StepTarget};
use crate::catalog::{standard_actions, standard_cascades};
use crate::chain::{Chain, ChainStatus, RollbackEntry, RollbackOutcome, StepRecord};
use crate::error::{CascadeError, StepError};
use crate::events::{CascadeEvent, EngineNotifier, NoopNotifier};
use crate::router::Router;

/// Configuration for the cascade engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
  /// Wait before retrying a failed step.
  pub retry_backoff: Duration,
  /// How many finished chains to keep; oldest are dropped first.
  pub completed_limit: usize,
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      retry_backoff: Duration::from_millis(1000),
      completed_limit: 1000,
    }
  }
}

/// Chain counts and timings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineStats {
  pub cascades: usize,
  pub active: usize,
  pub finished: usize,
  pub completed: usize,
  pub failed: usize,
  pub rolled_back: usize,
  pub errored: usize,
  /// Mean duration over finished chains.
  pub average_duration_ms: f64,
}

/// The cascade engine.
///
/// Steps within a chain run strictly one after another. Separate chains may
/// run concurrently; the engine does not serialize them.
pub struct CascadeEngine {
  config: EngineConfig,
  router: Arc<dyn Router>,
  cascades: RwLock<HashMap<String, Arc<Cascade>>>,
  actions: RwLock<HashMap<String, Arc<dyn InternalAction>>>,
  active: RwLock<HashMap<String, Chain>>,
  completed: RwLock<VecDeque<Chain>>,
  notifier: Box<dyn EngineNotifier>,
}

impl CascadeEngine {
  /// Create an engine with the standard catalogue and no-op notifications.
  pub fn new(config: EngineConfig, router: Arc<dyn Router>) -> Result<Self, CascadeError> {
    Self::with_notifier(config, router, NoopNotifier)
  }

  /// Create an engine with the standard catalogue and a custom notifier.
  pub fn with_notifier(
    config: EngineConfig,
    router: Arc<dyn Router>,
    notifier: impl EngineNotifier + 'static,
  ) -> Result<Self, CascadeError> {
    let engine = Self {
      config,
      router,
      cascades: RwLock::new(HashMap::new()),
      actions: RwLock::new(HashMap::new()),
      active: RwLock::new(HashMap::new()),
      completed: RwLock::new(VecDeque::new()),
      notifier: Box::new(notifier),
    };

    for (name, action) in standard_actions() {
      engine.register_action(name, action);
    }
    for def in standard_cascades() {
      engine.register_cascade(def)?;
    }

    Ok(engine)
  }

  /// Register (or replace) an internal action for `system` steps.
  pub fn register_action(&self, name: &str, action: Arc<dyn InternalAction>) {
    self
      .actions
      .write()
      .unwrap_or_else(PoisonError::into_inner)
      .insert(name.to_string(), action);
  }

  /// Validate and register (or replace) a cascade.
  pub fn register_cascade(&self, def: CascadeDef) -> Result<(), CascadeError> {
    let cascade = {
      let actions = self.actions.read().unwrap_or_else(PoisonError::into_inner);
      Cascade::from_def(def, |name| actions.contains_key(name))?
    };

    info!(
      cascade = %cascade.name,
      steps = cascade.steps.len(),
      policy = ?cascade.error_policy,
      "cascade_registered"
    );

    self
      .cascades
      .write()
      .unwrap_or_else(PoisonError::into_inner)
      .insert(cascade.name.clone(), Arc::new(cascade));
    Ok(())
  }

  pub fn cascade(&self, name: &str) -> Result<Arc<Cascade>, CascadeError> {
    self
      .cascades
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .get(name)
      .cloned()
      .ok_or_else(|| CascadeError::UnknownCascade(name.to_string()))
  }

  /// Registered cascade names, sorted.
  pub fn cascade_names(&self) -> Vec<String> {
    let mut names: Vec<String> = self
      .cascades
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .keys()
      .cloned()
      .collect();
    names.sort();
    names
  }

  pub fn router(&self) -> &Arc<dyn Router> {
    &self.router
  }

  /// Run the named cascade to completion.
  pub async fn trigger(
    &self,
    cascade_name: &str,
    data: serde_json::Value,
  ) -> Result<Chain, CascadeError> {
    self
      .trigger_with_cancel(cascade_name, data, CancellationToken::new())
      .await
  }

  /// Run the named cascade; cancelling the token ends the chain in `error`.
  #[instrument(
    name = "cascade_trigger",
    skip(self, data, cancel),
    fields(cascade = %cascade_name)
  )]
  pub async fn trigger_with_cancel(
    &self,
    cascade_name: &str,
    data: serde_json::Value,
    cancel: CancellationToken,
  ) -> Result<Chain, CascadeError> {
    let cascade = self.cascade(cascade_name)?;
    let started = Instant::now();

    let mut chain = Chain::start(&cascade.name);
    self.publish(&chain);
    let mut unfinished = Unfinished {
      engine: self,
      chain_id: chain.chain_id.clone(),
      started,
      armed: true,
    };

    info!(chain_id = %chain.chain_id, trigger_payload = %data, "chain_started");
    self.notifier.notify(CascadeEvent::ChainStarted {
      chain_id: chain.chain_id.clone(),
      cascade: cascade.name.clone(),
    });

    let status = self.run_chain(&cascade, &mut chain, &data, &cancel).await;
    unfinished.armed = false;
    let duration_ms = started.elapsed().as_millis() as u64;
    chain.finish(status, duration_ms);
    self.retire(&chain);

    match status {
      ChainStatus::Completed => {
        info!(chain_id = %chain.chain_id, duration_ms, "chain_completed")
      }
      _ => warn!(
        chain_id = %chain.chain_id,
        status = ?status,
        duration_ms,
        "chain_not_completed"
      ),
    }
    self.notifier.notify(CascadeEvent::ChainFinished {
      chain_id: chain.chain_id.clone(),
      status,
      duration_ms,
    });

    Ok(chain)
  }

  /// Look up a chain, active or finished.
  pub fn chain(&self, chain_id: &str) -> Result<Chain, CascadeError> {
    if let Some(chain) = self
      .active
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .get(chain_id)
    {
      return Ok(chain.clone());
    }

    self
      .completed
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .iter()
      .find(|c| c.chain_id == chain_id)
      .cloned()
      .ok_or_else(|| CascadeError::ChainNotFound(chain_id.to_string()))
  }

  pub fn active_chains(&self) -> Vec<Chain> {
    self
      .active
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .values()
      .cloned()
      .collect()
  }

  /// Finished chains, oldest first.
  pub fn completed_chains(&self) -> Vec<Chain> {
    self
      .completed
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .iter()
      .cloned()
      .collect()
  }

  pub fn stats(&self) -> EngineStats {
    let mut stats = EngineStats {
      cascades: self
        .cascades
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .len(),
      active: self
        .active
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .len(),
      ..EngineStats::default()
    };

    let completed = self.completed.read().unwrap_or_else(PoisonError::into_inner);
    let mut total_ms = 0u64;
    for chain in completed.iter() {
      stats.finished += 1;
      total_ms += chain.duration_ms.unwrap_or(0);
      match chain.status {
        ChainStatus::Completed => stats.completed += 1,
        ChainStatus::Failed => stats.failed += 1,
        ChainStatus::RolledBack => stats.rolled_back += 1,
        ChainStatus::Error => stats.errored += 1,
        ChainStatus::Running => {}
      }
    }
    if stats.finished > 0 {
      stats.average_duration_ms = total_ms as f64 / stats.finished as f64;
    }

    stats
  }

  /// Drive every step of the chain and decide its terminal status.
  async fn run_chain(
    &self,
    cascade: &Cascade,
    chain: &mut Chain,
    data: &serde_json::Value,
    cancel: &CancellationToken,
  ) -> ChainStatus {
    for (index, step) in cascade.steps.iter().enumerate() {
      if cancel.is_cancelled() {
        warn!(chain_id = %chain.chain_id, "chain cancelled");
        return ChainStatus::Error;
      }

      let record = self
        .run_step(cascade, step, &chain.chain_id, data, 1, cancel)
        .await;
      let failure = record.error.clone();
      chain.steps.push(record);
      chain.current_step_index = index + 1;
      self.publish(chain);

      let Some(failure) = failure else {
        continue;
      };
      if failure.is_fatal() {
        return ChainStatus::Error;
      }

      if cascade.error_policy == ErrorPolicy::Rollback {
        self.rollback(cascade, chain, data).await;
        return ChainStatus::RolledBack;
      }

      if !cascade.retry_failed {
        return ChainStatus::Failed;
      }

      let backoff = self.config.retry_backoff;
      self.notifier.notify(CascadeEvent::StepRetrying {
        chain_id: chain.chain_id.clone(),
        order: step.order,
        backoff_ms: backoff.as_millis() as u64,
      });
      tokio::select! {
        _ = tokio::time::sleep(backoff) => {}
        _ = cancel.cancelled() => return ChainStatus::Error,
      }

      let retry = self
        .run_step(cascade, step, &chain.chain_id, data, 2, cancel)
        .await;
      let retry_failure = retry.error.clone();
      chain.steps.push(retry);
      self.publish(chain);

      match retry_failure {
        None => {}
        Some(e) if e.is_fatal() => return ChainStatus::Error,
        Some(_) => return ChainStatus::Failed,
      }
    }

    ChainStatus::Completed
  }

  /// Execute one attempt of a step, bounded by the step's timeout.
  ///
  /// The attempt runs on its own task so a panicking action is captured as a
  /// failed record instead of unwinding the chain.
  async fn run_step(
    &self,
    cascade: &Cascade,
    step: &Step,
    chain_id: &str,
    data: &serde_json::Value,
    attempt: u32,
    cancel: &CancellationToken,
  ) -> StepRecord {
    let ctx = StepContext {
      chain_id: chain_id.to_string(),
      cascade: cascade.name.clone(),
      order: step.order,
      action: step.action.clone(),
      attempt,
      data: data.clone(),
    };
    let work = self.step_work(step, ctx);
    let limit = step.timeout;
    let started = Instant::now();

    let mut handle = tokio::spawn(tokio::time::timeout(limit, work));
    let result = tokio::select! {
      joined = &mut handle => match joined {
        Ok(Ok(result)) => result,
        Ok(Err(_elapsed)) => Err(StepError::Timeout {
          timeout_ms: limit.as_millis() as u64,
        }),
        Err(e) => Err(StepError::Panicked {
          message: e.to_string(),
        }),
      },
      _ = cancel.cancelled() => {
        handle.abort();
        // Wait for the aborted work to be dropped so its cleanup has run.
        let _ = handle.await;
        Err(StepError::Cancelled)
      }
    };
    let duration_ms = started.elapsed().as_millis() as u64;

    let (output, error) = match result {
      Ok(output) => {
        info!(
          chain_id = %chain_id,
          order = step.order,
          action = %step.action,
          target = %step.target.as_str(),
          attempt,
          duration_ms,
          "step_succeeded"
        );
        self.notifier.notify(CascadeEvent::StepSucceeded {
          chain_id: chain_id.to_string(),
          order: step.order,
          action: step.action.clone(),
          attempt,
        });
        (Some(output), None)
      }
      Err(e) => {
        error!(
          chain_id = %chain_id,
          order = step.order,
          action = %step.action,
          target = %step.target.as_str(),
          attempt,
          duration_ms,
          error = %e,
          "step_failed"
        );
        self.notifier.notify(CascadeEvent::StepFailed {
          chain_id: chain_id.to_string(),
          order: step.order,
          action: step.action.clone(),
          attempt,
          error: e.to_string(),
        });
        (None, Some(e))
      }
    };

    StepRecord {
      order: step.order,
      action: step.action.clone(),
      target: step.target.as_str().to_string(),
      attempt,
      duration_ms,
      success: error.is_none(),
      output,
      error,
    }
  }

  /// Build the owned future that performs a step against its target.
  fn step_work(
    &self,
    step: &Step,
    ctx: StepContext,
  ) -> BoxFuture<'static, Result<serde_json::Value, StepError>> {
    match &step.target {
      StepTarget::System => {
        let action = self.action(&step.action);
        Box::pin(async move {
          let action = action.ok_or_else(|| StepError::UnknownAction {
            action: ctx.action.clone(),
          })?;
          action.execute(&ctx).await
        })
      }
      StepTarget::All => {
        let router = self.router.clone();
        let payload = step_payload(&ctx);
        Box::pin(async move {
          let outcome = router.broadcast(&payload).await;
          let failed = outcome.failed();
          if failed > 0 {
            return Err(StepError::Broadcast {
              failed,
              total: outcome.results.len(),
            });
          }
          let targets: Vec<String> = outcome.results.into_iter().map(|r| r.target).collect();
          Ok(serde_json::json!({ "delivered": targets.len(), "targets": targets }))
        })
      }
      StepTarget::Node(target) => {
        let router = self.router.clone();
        let target = target.clone();
        let payload = step_payload(&ctx);
        Box::pin(async move { router.send(&target, &payload).await.map_err(StepError::from) })
      }
    }
  }

  /// Undo previously-succeeded steps, newest first.
  async fn rollback(&self, cascade: &Cascade, chain: &mut Chain, data: &serde_json::Value) {
    let succeeded: Vec<StepRecord> = chain.steps.iter().filter(|r| r.success).cloned().collect();

    info!(
      chain_id = %chain.chain_id,
      steps = succeeded.len(),
      "rollback_started"
    );

    for record in succeeded.iter().rev() {
      let outcome = self.compensate(cascade, &chain.chain_id, record, data).await;

      self.notifier.notify(CascadeEvent::StepRolledBack {
        chain_id: chain.chain_id.clone(),
        order: record.order,
        outcome: outcome.clone(),
      });
      chain.rollback.push(RollbackEntry {
        order: record.order,
        action: record.action.clone(),
        outcome,
      });
    }
  }

  async fn compensate(
    &self,
    cascade: &Cascade,
    chain_id: &str,
    record: &StepRecord,
    data: &serde_json::Value,
  ) -> RollbackOutcome {
    let action = cascade
      .step(record.order)
      .filter(|step| step.target == StepTarget::System)
      .and_then(|step| self.action(&step.action).map(|action| (step, action)));

    let Some((step, action)) = action else {
      info!(
        chain_id = %chain_id,
        order = record.order,
        action = %record.action,
        target = %record.target,
        "rollback_intent"
      );
      return RollbackOutcome::Advisory;
    };
    if action.compensator().is_none() {
      info!(
        chain_id = %chain_id,
        order = record.order,
        action = %record.action,
        "rollback_intent"
      );
      return RollbackOutcome::Advisory;
    }

    let ctx = StepContext {
      chain_id: chain_id.to_string(),
      cascade: cascade.name.clone(),
      order: record.order,
      action: record.action.clone(),
      attempt: record.attempt,
      data: data.clone(),
    };
    let limit = step.timeout;
    let record_owned = record.clone();

    // Compensation runs on its own task, like a step attempt, so a panic is
    // recorded instead of unwinding the chain.
    let joined = tokio::spawn(async move {
      match action.compensator() {
        Some(compensator) => {
          tokio::time::timeout(limit, compensator.compensate(&ctx, &record_owned)).await
        }
        None => Ok(Ok(())),
      }
    })
    .await;

    let result = match joined {
      Ok(result) => result,
      Err(e) => Ok(Err(StepError::Panicked {
        message: e.to_string(),
      })),
    };

    match result {
      Ok(Ok(())) => {
        info!(chain_id = %chain_id, order = record.order, "step_compensated");
        RollbackOutcome::Compensated
      }
      Ok(Err(error)) => {
        error!(chain_id = %chain_id, order = record.order, error = %error, "compensation_failed");
        RollbackOutcome::CompensationFailed { error }
      }
      Err(_elapsed) => {
        let error = StepError::Timeout {
          timeout_ms: step.timeout.as_millis() as u64,
        };
        error!(chain_id = %chain_id, order = record.order, error = %error, "compensation_failed");
        RollbackOutcome::CompensationFailed { error }
      }
    }
  }

  fn action(&self, name: &str) -> Option<Arc<dyn InternalAction>> {
    self
      .actions
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .get(name)
      .cloned()
  }

  /// Store the chain's latest state in the active set.
  fn publish(&self, chain: &Chain) {
    self
      .active
      .write()
      .unwrap_or_else(PoisonError::into_inner)
      .insert(chain.chain_id.clone(), chain.clone());
  }

  /// Move a terminal chain from the active set to the completed set.
  fn retire(&self, chain: &Chain) {
    self
      .active
      .write()
      .unwrap_or_else(PoisonError::into_inner)
      .remove(&chain.chain_id);

    let mut completed = self.completed.write().unwrap_or_else(PoisonError::into_inner);
    completed.push_back(chain.clone());
    while completed.len() > self.config.completed_limit {
      completed.pop_front();
    }
  }
}

/// The payload routed to a step's target.
fn step_payload(ctx: &StepContext) -> serde_json::Value {
  serde_json::json!({
    "chain_id": ctx.chain_id,
    "cascade": ctx.cascade,
    "step": ctx.order,
    "action": ctx.action,
    "attempt": ctx.attempt,
    "data": ctx.data,
  })
}

/// Retires a chain as `error` if its trigger future goes away before the
/// chain reaches a terminal status.
struct Unfinished<'a> {
  engine: &'a CascadeEngine,
  chain_id: String,
  started: Instant,
  armed: bool,
}

impl Drop for Unfinished<'_> {
  fn drop(&mut self) {
    if !self.armed {
      return;
    }
    let chain = self
      .engine
      .active
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .get(&self.chain_id)
      .cloned();
    let Some(mut chain) = chain else {
      return;
    };

    let duration_ms = self.started.elapsed().as_millis() as u64;
    chain.finish(ChainStatus::Error, duration_ms);
    self.engine.retire(&chain);

    warn!(chain_id = %chain.chain_id, duration_ms, "chain_abandoned");
    self.engine.notifier.notify(CascadeEvent::ChainFinished {
      chain_id: chain.chain_id.clone(),
      status: ChainStatus::Error,
      duration_ms,
    });
  }
}
