//! Sequential scenario runner and the run report.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::config::HarnessConfig;
use crate::registry::Registry;
use crate::scenario::{self, Scenario, ScenarioState};
use crate::verdict::{Outcome, Verdict};

/// One line of the report.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioOutcome {
    pub name: String,
    pub group: String,
    pub verdict: Verdict,
    pub elapsed_ms: u64,
    /// `None` when the scenario task never reported back (timeout, panic).
    pub reached: Option<ScenarioState>,
}

/// Aggregate of one run. Built only by [`Runner::run`].
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    run_id: String,
    passed: usize,
    failed: usize,
    indeterminate: usize,
    outcomes: Vec<ScenarioOutcome>,
    interrupted: bool,
}

impl RunReport {
    fn new() -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            passed: 0,
            failed: 0,
            indeterminate: 0,
            outcomes: Vec::new(),
            interrupted: false,
        }
    }

    fn record(&mut self, outcome: ScenarioOutcome) {
        match outcome.verdict.outcome {
            Outcome::Pass => self.passed += 1,
            Outcome::Fail => self.failed += 1,
            Outcome::Indeterminate => self.indeterminate += 1,
        }
        self.outcomes.push(outcome);
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn passed(&self) -> usize {
        self.passed
    }

    pub fn failed(&self) -> usize {
        self.failed
    }

    pub fn indeterminate(&self) -> usize {
        self.indeterminate
    }

    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    /// Outcomes in execution order.
    pub fn outcomes(&self) -> &[ScenarioOutcome] {
        &self.outcomes
    }

    /// The run was cancelled before every scenario had started.
    pub fn interrupted(&self) -> bool {
        self.interrupted
    }

    pub fn all_passed(&self) -> bool {
        self.failed == 0 && self.indeterminate == 0
    }
}

/// Executes a [`Registry`] one scenario at a time.
#[derive(Clone)]
pub struct Runner {
    config: Arc<HarnessConfig>,
    cancel: CancellationToken,
}

impl Runner {
    pub fn new(config: Arc<HarnessConfig>) -> Self {
        Self {
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Cancelling this token stops the run before the next scenario.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Run every scenario in order. `on_outcome` sees each outcome as soon
    /// as it is recorded.
    pub async fn run<F>(&self, registry: &Registry, mut on_outcome: F) -> RunReport
    where
        F: FnMut(&ScenarioOutcome),
    {
        let mut report = RunReport::new();
        tracing::info!(run_id = %report.run_id, scenarios = registry.len(), "run started");

        for scenario in registry.iter() {
            if self.cancel.is_cancelled() {
                tracing::info!(remaining = registry.len() - report.total(), "run interrupted");
                report.interrupted = true;
                break;
            }
            let outcome = self.run_one(scenario).await;
            on_outcome(&outcome);
            report.record(outcome);
        }

        tracing::info!(
            run_id = %report.run_id,
            passed = report.passed,
            failed = report.failed,
            indeterminate = report.indeterminate,
            "run finished"
        );
        report
    }

    /// Isolate one scenario in its own task, bounded by the scenario
    /// timeout. Panics and timeouts become indeterminate verdicts.
    async fn run_one(&self, scenario: &Arc<Scenario>) -> ScenarioOutcome {
        let started = Instant::now();
        let budget = self.config.timing.scenario_timeout();
        tracing::debug!(scenario = %scenario.name, actors = ?scenario.actors(), "scenario started");

        let mut task = tokio::spawn(scenario::execute(
            Arc::clone(scenario),
            Arc::clone(&self.config),
        ));

        let (verdict, reached) = match tokio::time::timeout(budget, &mut task).await {
            Ok(Ok(execution)) => (execution.verdict, Some(execution.reached)),
            Ok(Err(e)) => {
                tracing::warn!(scenario = %scenario.name, error = %e, "scenario task panicked");
                (Verdict::indeterminate(format!("scenario task failed: {e}")), None)
            }
            Err(_) => {
                // The aborted task drops its sessions; wait for that before
                // the next scenario connects.
                task.abort();
                let _ = task.await;
                tracing::warn!(scenario = %scenario.name, ?budget, "scenario timed out");
                (
                    Verdict::indeterminate(format!("scenario exceeded {budget:?}")),
                    None,
                )
            }
        };

        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        tracing::debug!(scenario = %scenario.name, outcome = ?verdict.outcome, elapsed_ms, "scenario finished");

        ScenarioOutcome {
            name: scenario.name.clone(),
            group: scenario.group.clone(),
            verdict,
            elapsed_ms,
            reached,
        }
    }
}
