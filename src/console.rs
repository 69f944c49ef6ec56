//! Human-readable run output.

use std::io::{self, Write};

use crossterm::style::Stylize;

use crate::registry::Registry;
use crate::runner::{RunReport, ScenarioOutcome};
use crate::verdict::Outcome;

const RULE_WIDTH: usize = 60;

/// Writes outcomes as they arrive, with a section header whenever the
/// group changes.
pub struct Console<W: Write> {
    out: W,
    color: bool,
    group: Option<String>,
}

impl<W: Write> Console<W> {
    pub fn new(out: W, color: bool) -> Self {
        Self {
            out,
            color,
            group: None,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn section(&mut self, title: &str) -> io::Result<()> {
        let rule = "=".repeat(RULE_WIDTH);
        writeln!(self.out, "\n{rule}\n  {title}\n{rule}")
    }

    fn tag(&self, outcome: Outcome) -> String {
        let tag = format!("[{}]", outcome.label());
        if !self.color {
            return tag;
        }
        match outcome {
            Outcome::Pass => tag.green().to_string(),
            Outcome::Fail => tag.red().to_string(),
            Outcome::Indeterminate => tag.yellow().to_string(),
        }
    }

    pub fn banner(&mut self, target: &str, scenarios: usize) -> io::Result<()> {
        self.section(&format!("ircprobe: {scenarios} scenarios against {target}"))
    }

    pub fn outcome(&mut self, outcome: &ScenarioOutcome) -> io::Result<()> {
        if self.group.as_deref() != Some(outcome.group.as_str()) {
            self.section(&outcome.group)?;
            self.group = Some(outcome.group.clone());
        }
        let tag = self.tag(outcome.verdict.outcome);
        writeln!(self.out, "  {tag} {}: {}", outcome.name, outcome.verdict.reason)
    }

    pub fn summary(&mut self, report: &RunReport) -> io::Result<()> {
        let rule = "=".repeat(RULE_WIDTH);
        writeln!(self.out, "\n{rule}")?;
        writeln!(
            self.out,
            "  RESULT: {}/{} passed, {} failed, {} indeterminate",
            report.passed(),
            report.total(),
            report.failed(),
            report.indeterminate()
        )?;
        if report.interrupted() {
            writeln!(self.out, "  run interrupted before all scenarios started")?;
        }
        writeln!(self.out, "  run id {}", report.run_id())?;
        writeln!(self.out, "{rule}")?;
        self.out.flush()
    }

    /// Scenario names grouped by section, for `ircprobe list`.
    pub fn listing(&mut self, registry: &Registry) -> io::Result<()> {
        for group in registry.groups() {
            self.section(group)?;
            for scenario in registry.iter().filter(|s| s.group == group) {
                let slow = if scenario.slow { " (slow)" } else { "" };
                writeln!(self.out, "  {}{slow}: {}", scenario.name, scenario.description)?;
            }
        }
        self.out.flush()
    }
}
