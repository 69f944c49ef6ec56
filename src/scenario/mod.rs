//! Declarative scenarios and their executor.
//!
//! A [`Scenario`] is a list of [`Step`]s, each addressed to a named actor,
//! plus the [`Expectation`]s judged once the script has run. Actors own one
//! [`Session`](crate::session::Session) each and exist from their `Connect`
//! step until the scenario ends.

mod exec;

use std::time::Duration;

use bytes::Bytes;
use serde::Serialize;
use thiserror::Error;

use crate::config::TimingConfig;
use crate::handshake::Credentials;
use crate::predicate::{Marker, Predicate};
use crate::session::{PollPolicy, SessionError};
use crate::verdict::Expectation;

pub use exec::{execute, Execution};

/// Actor name used by [`Scenario::expect_server_alive`].
pub const SURVIVAL_PROBE: &str = "probe";

/// A bounded pause between steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wait {
    /// `n` settle units (`timing.settle_unit_ms`).
    Settle(u32),
    Fixed(Duration),
    /// Long enough for the server to drop an unregistered client.
    RegistrationGrace,
}

impl Wait {
    pub fn duration(self, timing: &TimingConfig) -> Duration {
        match self {
            Wait::Settle(units) => timing.settle(units),
            Wait::Fixed(d) => d,
            Wait::RegistrationGrace => timing.registration_grace(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Connect {
        actor: String,
    },
    /// Registration handshake; the reply goes into the actor's capture.
    Register {
        actor: String,
        credentials: Credentials,
    },
    Send {
        actor: String,
        line: String,
    },
    SendRaw {
        actor: String,
        bytes: Bytes,
    },
    Pause(Wait),
    /// One bounded receive, appended to the capture.
    Capture {
        actor: String,
    },
    /// One bounded receive, then the capture text is cleared.
    Discard {
        actor: String,
    },
    /// Poll and append until `until` shows up. `poll` defaults to the
    /// configured collect policy.
    Collect {
        actor: String,
        poll: Option<PollPolicy>,
        until: Option<Marker>,
    },
    Close {
        actor: String,
    },
    /// Run each track in its own task and wait for all of them.
    Parallel(Vec<Track>),
}

impl Step {
    /// The actor a step addresses. `None` for pauses and parallel blocks.
    pub fn actor(&self) -> Option<&str> {
        match self {
            Step::Connect { actor }
            | Step::Register { actor, .. }
            | Step::Send { actor, .. }
            | Step::SendRaw { actor, .. }
            | Step::Capture { actor }
            | Step::Discard { actor }
            | Step::Collect { actor, .. }
            | Step::Close { actor } => Some(actor),
            Step::Pause(_) | Step::Parallel(_) => None,
        }
    }
}

/// The steps of one actor inside a [`Step::Parallel`] block.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pub actor: String,
    pub steps: Vec<Step>,
}

impl Track {
    pub fn new(actor: impl Into<String>) -> Self {
        Self {
            actor: actor.into(),
            steps: Vec::new(),
        }
    }

    fn push(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    fn me(&self) -> String {
        self.actor.clone()
    }

    pub fn connect(self) -> Self {
        let actor = self.me();
        self.push(Step::Connect { actor })
    }

    pub fn register(self, credentials: Credentials) -> Self {
        let actor = self.me();
        self.push(Step::Register { actor, credentials })
    }

    /// Connect, register, and drop whatever the welcome burst left behind.
    pub fn login(self, credentials: Credentials) -> Self {
        self.connect().register(credentials).discard()
    }

    pub fn send(self, line: impl Into<String>) -> Self {
        let actor = self.me();
        self.push(Step::Send {
            actor,
            line: line.into(),
        })
    }

    pub fn send_raw(self, bytes: impl Into<Bytes>) -> Self {
        let actor = self.me();
        self.push(Step::SendRaw {
            actor,
            bytes: bytes.into(),
        })
    }

    pub fn pause(self, wait: Wait) -> Self {
        self.push(Step::Pause(wait))
    }

    pub fn capture(self) -> Self {
        let actor = self.me();
        self.pause(Wait::Settle(3)).push(Step::Capture { actor })
    }

    pub fn discard(self) -> Self {
        let actor = self.me();
        self.pause(Wait::Settle(3)).push(Step::Discard { actor })
    }

    pub fn close(self) -> Self {
        let actor = self.me();
        self.push(Step::Close { actor })
    }
}

/// How far a scenario got before its sessions were released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScenarioState {
    Created,
    Connected,
    Scripted,
    Verdicted,
    Closed,
}

#[derive(Error, Debug)]
pub enum ScenarioError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("step addresses actor {0} before it connected")]
    UnknownActor(String),

    #[error("actor {0} connects twice")]
    AlreadyConnected(String),

    #[error("track {track} contains a step for {actor}")]
    TrackMismatch { track: String, actor: String },

    #[error("parallel block nested inside track {0}")]
    NestedParallel(String),

    #[error("two tracks drive actor {0}")]
    DuplicateTrack(String),

    #[error("track {actor} panicked: {reason}")]
    TrackPanicked { actor: String, reason: String },
}

impl ScenarioError {
    /// The server could not be reached, as opposed to a broken script.
    pub fn is_unreachable(&self) -> bool {
        matches!(self, ScenarioError::Session(e) if e.is_connect())
    }
}

/// One self-contained test unit.
#[derive(Debug, Clone)]
pub struct Scenario {
    pub name: String,
    pub group: String,
    pub description: String,
    /// Takes long enough to be skipped by default.
    pub slow: bool,
    pub steps: Vec<Step>,
    pub expectations: Vec<Expectation>,
}

impl Scenario {
    pub fn new(name: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            group: group.into(),
            description: String::new(),
            slow: false,
            steps: Vec::new(),
            expectations: Vec::new(),
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn slow(mut self) -> Self {
        self.slow = true;
        self
    }

    pub fn step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    pub fn connect(self, actor: impl Into<String>) -> Self {
        self.step(Step::Connect {
            actor: actor.into(),
        })
    }

    pub fn register(self, actor: impl Into<String>, credentials: Credentials) -> Self {
        self.step(Step::Register {
            actor: actor.into(),
            credentials,
        })
    }

    /// Connect, register, and drop whatever the welcome burst left behind,
    /// so later expectations only see replies to the script.
    pub fn login(self, actor: impl Into<String>, credentials: Credentials) -> Self {
        let actor = actor.into();
        self.connect(actor.clone())
            .register(actor.clone(), credentials)
            .discard(actor)
    }

    pub fn send(self, actor: impl Into<String>, line: impl Into<String>) -> Self {
        self.step(Step::Send {
            actor: actor.into(),
            line: line.into(),
        })
    }

    pub fn send_raw(self, actor: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        self.step(Step::SendRaw {
            actor: actor.into(),
            bytes: bytes.into(),
        })
    }

    pub fn pause(self, wait: Wait) -> Self {
        self.step(Step::Pause(wait))
    }

    pub fn settle(self, units: u32) -> Self {
        self.pause(Wait::Settle(units))
    }

    /// Settle briefly, then receive once into the capture.
    pub fn capture(self, actor: impl Into<String>) -> Self {
        self.settle(3).step(Step::Capture {
            actor: actor.into(),
        })
    }

    /// Settle briefly, receive once, and clear the capture.
    pub fn discard(self, actor: impl Into<String>) -> Self {
        self.settle(3).step(Step::Discard {
            actor: actor.into(),
        })
    }

    /// Poll with the configured collect policy until `until` appears.
    pub fn collect(self, actor: impl Into<String>, until: Option<Marker>) -> Self {
        self.step(Step::Collect {
            actor: actor.into(),
            poll: None,
            until,
        })
    }

    pub fn close(self, actor: impl Into<String>) -> Self {
        self.step(Step::Close {
            actor: actor.into(),
        })
    }

    pub fn parallel(self, tracks: Vec<Track>) -> Self {
        self.step(Step::Parallel(tracks))
    }

    /// A mismatch fails the scenario.
    pub fn expect(mut self, actor: impl Into<String>, predicate: Predicate) -> Self {
        self.expectations
            .push(Expectation::required(actor, predicate));
        self
    }

    /// A mismatch only makes the scenario indeterminate.
    pub fn warn_unless(mut self, actor: impl Into<String>, predicate: Predicate) -> Self {
        self.expectations
            .push(Expectation::advisory(actor, predicate));
        self
    }

    /// Finish with a fresh client that must still be able to register.
    pub fn expect_server_alive(self, nick: impl Into<String>) -> Self {
        self.connect(SURVIVAL_PROBE)
            .register(SURVIVAL_PROBE, Credentials::nick(nick))
            .expect(SURVIVAL_PROBE, Predicate::numeric(crate::handshake::REGISTERED_MARKER))
    }

    /// Actors that connect anywhere in the script, in first-seen order.
    pub fn actors(&self) -> Vec<&str> {
        let flattened = self.steps.iter().flat_map(|step| match step {
            Step::Parallel(tracks) => tracks.iter().flat_map(|t| t.steps.iter()).collect(),
            step => vec![step],
        });

        let mut seen: Vec<&str> = Vec::new();
        for step in flattened {
            if let Step::Connect { actor } = step {
                if !seen.contains(&actor.as_str()) {
                    seen.push(actor.as_str());
                }
            }
        }
        seen
    }
}

#[cfg(test)]
mod tests;
