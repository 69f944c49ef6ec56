//! Ordered scenario registry and run-unique naming.

use std::sync::Arc;

use rand::distributions::Alphanumeric;
use rand::Rng;

use crate::scenario::Scenario;

const SUFFIX_LEN: usize = 3;

/// Longest nickname RFC 1459 servers accept; longer ones draw `432`.
pub const NICK_LEN: usize = 9;

/// The scenarios of a run, in execution order.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    scenarios: Vec<Arc<Scenario>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, scenario: Scenario) {
        self.scenarios.push(Arc::new(scenario));
    }

    pub fn extend(&mut self, scenarios: impl IntoIterator<Item = Scenario>) {
        for scenario in scenarios {
            self.register(scenario);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Scenario>> {
        self.scenarios.iter()
    }

    pub fn len(&self) -> usize {
        self.scenarios.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenarios.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Scenario>> {
        self.scenarios.iter().find(|s| s.name == name)
    }

    /// Keep scenarios whose name or group contains `pattern`.
    pub fn filter(&self, pattern: &str) -> Registry {
        let scenarios = self
            .scenarios
            .iter()
            .filter(|s| s.name.contains(pattern) || s.group.contains(pattern))
            .cloned()
            .collect();
        Registry { scenarios }
    }

    pub fn without_slow(&self) -> Registry {
        let scenarios = self.scenarios.iter().filter(|s| !s.slow).cloned().collect();
        Registry { scenarios }
    }

    /// Group names in first-seen order.
    pub fn groups(&self) -> Vec<&str> {
        let mut groups: Vec<&str> = Vec::new();
        for scenario in &self.scenarios {
            if !groups.contains(&scenario.group.as_str()) {
                groups.push(&scenario.group);
            }
        }
        groups
    }
}

/// Derives nicknames and channel names that are unique to one run, so
/// state left on the server by an earlier run cannot change a verdict.
#[derive(Debug, Clone)]
pub struct Namer {
    suffix: String,
}

impl Namer {
    /// Fresh random suffix.
    pub fn unique() -> Self {
        let suffix = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(SUFFIX_LEN)
            .map(|b| char::from(b).to_ascii_lowercase())
            .collect();
        Self { suffix }
    }

    /// Names used exactly as written.
    pub fn plain() -> Self {
        Self {
            suffix: String::new(),
        }
    }

    pub fn new(unique: bool) -> Self {
        if unique {
            Self::unique()
        } else {
            Self::plain()
        }
    }

    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    /// `base` plus the suffix, cut down to [`NICK_LEN`]. The base is
    /// shortened, never the suffix.
    pub fn nick(&self, base: &str) -> String {
        let room = NICK_LEN.saturating_sub(self.suffix.len());
        let head: String = base.chars().take(room).collect();
        format!("{head}{}", self.suffix)
    }

    /// `#` followed by the suffixed base.
    pub fn channel(&self, base: &str) -> String {
        format!("#{base}{}", self.suffix)
    }
}
