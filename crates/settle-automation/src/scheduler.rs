//! Trigger dispatch and periodic timers.

use std::cmp::Reverse;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use settle_config::{Priority, RuleDef, TimerDef};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};

use crate::action::{
  REBALANCE_CHARGE, REPAIR_BONDS, REPORT_HEALTH, RuleAction, trigger_cascade_action,
};
use crate::error::AutomationError;

pub const PURCHASE_PROCESSED: &str = "purchase_processed";
pub const CONTRIBUTION_PROCESSED: &str = "contribution_processed";
pub const NETWORK_MAINTENANCE: &str = "network_maintenance";
pub const CHARGE_REBALANCE: &str = "charge_rebalance";
pub const HEALTH_CHECK: &str = "health_check";

/// The rules a network starts with.
pub fn default_rules() -> Vec<RuleDef> {
  vec![
    RuleDef::new(PURCHASE_PROCESSED, &trigger_cascade_action("commerce"), Priority::High),
    RuleDef::new(CONTRIBUTION_PROCESSED, &trigger_cascade_action("token"), Priority::Medium),
    RuleDef::new(NETWORK_MAINTENANCE, REPAIR_BONDS, Priority::High),
    RuleDef::new(CHARGE_REBALANCE, REBALANCE_CHARGE, Priority::Medium),
    RuleDef::new(HEALTH_CHECK, REPORT_HEALTH, Priority::Low),
  ]
}

/// Maintenance every 5 minutes, rebalancing every 10, health every 15.
pub fn default_timers() -> Vec<TimerDef> {
  vec![
    TimerDef::new(NETWORK_MAINTENANCE, 300),
    TimerDef::new(CHARGE_REBALANCE, 600),
    TimerDef::new(HEALTH_CHECK, 900),
  ]
}

/// What one rule did during a dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleOutcome {
  pub action: String,
  pub priority: Priority,
  pub success: bool,
  pub duration_ms: u64,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub output: Option<serde_json::Value>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
}

/// Every rule outcome for one dispatched trigger, in execution order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutomationResult {
  pub trigger: String,
  pub dispatched_at: DateTime<Utc>,
  pub outcomes: Vec<RuleOutcome>,
}

impl AutomationResult {
  pub fn succeeded(&self) -> usize {
    self.outcomes.iter().filter(|o| o.success).count()
  }

  pub fn failed(&self) -> usize {
    self.outcomes.len() - self.succeeded()
  }
}

/// Maps trigger names to prioritized rules and runs them.
pub struct Scheduler {
  rules: RwLock<Vec<RuleDef>>,
  actions: RwLock<HashMap<String, Arc<dyn RuleAction>>>,
  timers: RwLock<Vec<TimerDef>>,
  history: RwLock<VecDeque<AutomationResult>>,
  history_limit: usize,
}

impl Scheduler {
  /// Create an empty scheduler keeping at most `history_limit` dispatches.
  pub fn new(history_limit: usize) -> Self {
    Self {
      rules: RwLock::new(Vec::new()),
      actions: RwLock::new(HashMap::new()),
      timers: RwLock::new(Vec::new()),
      history: RwLock::new(VecDeque::new()),
      history_limit,
    }
  }

  /// Register (or replace) a rule action.
  pub fn register_action(&self, name: &str, action: Arc<dyn RuleAction>) {
    self
      .actions
      .write()
      .unwrap_or_else(PoisonError::into_inner)
      .insert(name.to_string(), action);
  }

  /// Add a rule. Rules for the same trigger and priority run in the order
  /// they were added.
  pub fn add_rule(&self, rule: RuleDef) {
    info!(
      trigger = %rule.trigger,
      action = %rule.action,
      priority = ?rule.priority,
      enabled = rule.enabled,
      "rule_added"
    );
    self
      .rules
      .write()
      .unwrap_or_else(PoisonError::into_inner)
      .push(rule);
  }

  /// Enable or disable every rule binding `trigger` to `action`. Returns the
  /// number of rules changed.
  pub fn set_rule_enabled(&self, trigger: &str, action: &str, enabled: bool) -> usize {
    let mut rules = self.rules.write().unwrap_or_else(PoisonError::into_inner);
    let mut changed = 0;
    for rule in rules
      .iter_mut()
      .filter(|r| r.trigger == trigger && r.action == action && r.enabled != enabled)
    {
      rule.enabled = enabled;
      changed += 1;
    }
    changed
  }

  pub fn add_timer(&self, timer: TimerDef) {
    self
      .timers
      .write()
      .unwrap_or_else(PoisonError::into_inner)
      .push(timer);
  }

  pub fn rules(&self) -> Vec<RuleDef> {
    self
      .rules
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .clone()
  }

  pub fn timers(&self) -> Vec<TimerDef> {
    self
      .timers
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .clone()
  }

  /// Registered action names, sorted.
  pub fn action_names(&self) -> Vec<String> {
    let mut names: Vec<String> = self
      .actions
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .keys()
      .cloned()
      .collect();
    names.sort();
    names
  }

  /// Past dispatches, oldest first.
  pub fn history(&self) -> Vec<AutomationResult> {
    self
      .history
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .iter()
      .cloned()
      .collect()
  }

  /// Run every enabled rule for `trigger`, highest priority first.
  ///
  /// Rules run one at a time. A failing rule is recorded and the remaining
  /// rules still run.
  #[instrument(name = "automation_dispatch", skip(self, data))]
  pub async fn dispatch(&self, trigger: &str, data: serde_json::Value) -> AutomationResult {
    let mut matched: Vec<RuleDef> = self
      .rules
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .iter()
      .filter(|r| r.enabled && r.trigger == trigger)
      .cloned()
      .collect();
    matched.sort_by_key(|r| Reverse(r.priority.rank()));

    if matched.is_empty() {
      debug!(trigger = %trigger, "no rules for trigger");
    }

    let mut outcomes = Vec::with_capacity(matched.len());
    for rule in matched {
      let started = Instant::now();
      let result = match self.action(&rule.action) {
        Some(action) => action.run(&data).await,
        None => Err(AutomationError::UnknownAction(rule.action.clone())),
      };
      let duration_ms = started.elapsed().as_millis() as u64;

      let outcome = match result {
        Ok(output) => {
          info!(trigger = %trigger, action = %rule.action, duration_ms, "rule_succeeded");
          RuleOutcome {
            action: rule.action,
            priority: rule.priority,
            success: true,
            duration_ms,
            output: Some(output),
            error: None,
          }
        }
        Err(e) => {
          error!(trigger = %trigger, action = %rule.action, error = %e, "rule_failed");
          RuleOutcome {
            action: rule.action,
            priority: rule.priority,
            success: false,
            duration_ms,
            output: None,
            error: Some(e.to_string()),
          }
        }
      };
      outcomes.push(outcome);
    }

    let result = AutomationResult {
      trigger: trigger.to_string(),
      dispatched_at: Utc::now(),
      outcomes,
    };
    self.record(&result);
    result
  }

  /// Dispatch each timer's trigger with empty data on its cadence until
  /// `cancel` fires.
  ///
  /// The first tick of each timer comes one full interval after start. A
  /// dispatch that overruns delays later ticks instead of bursting.
  pub async fn run_timers(&self, cancel: CancellationToken) {
    let timers = self.timers();
    info!(timers = timers.len(), "starting automation timers");

    if timers.is_empty() {
      cancel.cancelled().await;
      info!("automation timers cancelled");
      return;
    }

    let now = Instant::now();
    let mut intervals: Vec<_> = timers
      .iter()
      .map(|timer| {
        let period = Duration::from_secs(timer.interval_secs.max(1));
        let mut interval = tokio::time::interval_at(now + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval
      })
      .collect();

    loop {
      let next_tick =
        futures::future::select_all(intervals.iter_mut().map(|interval| Box::pin(interval.tick())));

      tokio::select! {
        _ = cancel.cancelled() => {
          info!("automation timers cancelled");
          break;
        }
        (_, index, _) = next_tick => {
          let trigger = &timers[index].trigger;
          debug!(trigger = %trigger, "timer_fired");
          self.dispatch(trigger, serde_json::json!({})).await;
        }
      }
    }
  }

  fn action(&self, name: &str) -> Option<Arc<dyn RuleAction>> {
    self
      .actions
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .get(name)
      .cloned()
  }

  fn record(&self, result: &AutomationResult) {
    let mut history = self.history.write().unwrap_or_else(PoisonError::into_inner);
    history.push_back(result.clone());
    while history.len() > self.history_limit {
      history.pop_front();
    }
  }
}
