use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::config::HarnessConfig;
use crate::handshake;
use crate::predicate::Capture;
use crate::session::{Session, SessionError};
use crate::verdict::{self, Verdict};

use super::{Scenario, ScenarioError, ScenarioState, Step, Track, Wait};

/// What [`execute`] hands back to the runner.
#[derive(Debug, Clone)]
pub struct Execution {
    pub verdict: Verdict,
    /// Last state before the sessions were released.
    pub reached: ScenarioState,
}

/// A participant: its session and everything it has captured.
struct Actor {
    session: Session,
    capture: Capture,
}

impl Actor {
    fn snapshot(&self) -> Capture {
        Capture {
            text: self.capture.text.clone(),
            disconnected: self.capture.disconnected || self.session.is_disconnected(),
        }
    }
}

/// Run one scenario to a verdict.
///
/// Never fails. Errors raised by the script are translated into a verdict
/// here, and every session the script opened is closed before returning.
pub async fn execute(scenario: Arc<Scenario>, config: Arc<HarnessConfig>) -> Execution {
    let mut actors: HashMap<String, Actor> = HashMap::new();
    let mut state = ScenarioState::Created;

    let script = run_script(&scenario, &config, &mut actors, &mut state).await;

    let verdict = match script {
        Ok(()) => {
            state = ScenarioState::Scripted;
            tracing::trace!(scenario = %scenario.name, ?state, "script finished");
            let captures: HashMap<String, Capture> = actors
                .iter()
                .map(|(name, actor)| (name.clone(), actor.snapshot()))
                .collect();
            let verdict = verdict::judge(&scenario.expectations, &captures);
            state = ScenarioState::Verdicted;
            verdict
        }
        Err(e) => translate(&scenario.name, e),
    };

    for actor in actors.values_mut() {
        actor.session.close().await;
    }
    tracing::debug!(scenario = %scenario.name, reached = ?state, outcome = ?verdict.outcome, "scenario closed");

    Execution {
        verdict,
        reached: state,
    }
}

fn translate(scenario: &str, error: ScenarioError) -> Verdict {
    tracing::warn!(scenario = %scenario, error = %error, "scenario aborted");
    if error.is_unreachable() {
        Verdict::fail(format!("server unreachable: {error}"))
    } else {
        Verdict::indeterminate(format!("harness error: {error}"))
    }
}

async fn run_script(
    scenario: &Scenario,
    config: &Arc<HarnessConfig>,
    actors: &mut HashMap<String, Actor>,
    state: &mut ScenarioState,
) -> Result<(), ScenarioError> {
    for step in &scenario.steps {
        match step {
            Step::Parallel(tracks) => run_parallel(tracks, config, actors).await?,
            Step::Pause(wait) => pause(*wait, config).await,
            step => {
                let name = step.actor().unwrap_or_default();
                let mut slot = actors.remove(name);
                let result = apply(step, name, &mut slot, config).await;
                if let Some(actor) = slot {
                    actors.insert(name.to_string(), actor);
                }
                result?;
            }
        }
        if *state == ScenarioState::Created && !actors.is_empty() {
            *state = ScenarioState::Connected;
        }
    }
    Ok(())
}

async fn pause(wait: Wait, config: &HarnessConfig) {
    let duration = wait.duration(&config.timing);
    if !duration.is_zero() {
        tokio::time::sleep(duration).await;
    }
}

/// Execute one non-parallel step for the actor held in `slot`.
async fn apply(
    step: &Step,
    name: &str,
    slot: &mut Option<Actor>,
    config: &HarnessConfig,
) -> Result<(), ScenarioError> {
    let timing = &config.timing;

    if let Step::Connect { actor } = step {
        if slot.is_some() {
            return Err(ScenarioError::AlreadyConnected(actor.clone()));
        }
        let mut session = Session::new(actor.clone(), config.server.endpoint());
        session.connect(timing.connect_timeout()).await?;
        *slot = Some(Actor {
            session,
            capture: Capture::default(),
        });
        return Ok(());
    }
    if let Step::Pause(wait) = step {
        pause(*wait, config).await;
        return Ok(());
    }

    let actor = slot
        .as_mut()
        .ok_or_else(|| ScenarioError::UnknownActor(name.to_string()))?;

    match step {
        Step::Register { credentials, .. } => {
            let text = handshake::register(
                &mut actor.session,
                credentials,
                &config.server.password,
                timing.register_policy(),
                timing.read_timeout(),
            )
            .await;
            actor.capture.text.push_str(&text);
        }
        Step::Send { line, .. } => {
            let sent = actor.session.send(line).await;
            record_write(actor, sent)?;
        }
        Step::SendRaw { bytes, .. } => {
            let sent = actor.session.send_raw(bytes).await;
            record_write(actor, sent)?;
        }
        Step::Capture { .. } => {
            let text = actor.session.receive(timing.read_timeout()).await;
            actor.capture.text.push_str(&text);
        }
        Step::Discard { .. } => {
            actor.session.receive(timing.read_timeout()).await;
            actor.capture.text.clear();
        }
        Step::Collect { poll, until, .. } => {
            let policy = poll.unwrap_or_else(|| timing.collect_policy());
            let text = match until {
                Some(marker) => {
                    actor
                        .session
                        .poll(policy, timing.read_timeout(), |t| marker.found_in(t))
                        .await
                }
                None => actor.session.poll(policy, timing.read_timeout(), |_| false).await,
            };
            actor.capture.text.push_str(&text);
        }
        Step::Close { .. } => actor.session.close().await,
        Step::Connect { .. } | Step::Pause(_) | Step::Parallel(_) => {}
    }

    if actor.session.is_disconnected() {
        actor.capture.disconnected = true;
    }
    Ok(())
}

/// A refused write means the server hung up; that is evidence, not an error.
fn record_write(
    actor: &mut Actor,
    sent: Result<(), SessionError>,
) -> Result<(), ScenarioError> {
    match sent {
        Ok(()) => Ok(()),
        Err(e) if e.is_disconnect() => {
            actor.capture.disconnected = true;
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

fn check_tracks(tracks: &[Track]) -> Result<(), ScenarioError> {
    let mut owners = HashSet::new();
    for track in tracks {
        if !owners.insert(track.actor.as_str()) {
            return Err(ScenarioError::DuplicateTrack(track.actor.clone()));
        }
        for step in &track.steps {
            if matches!(step, Step::Parallel(_)) {
                return Err(ScenarioError::NestedParallel(track.actor.clone()));
            }
            if let Some(actor) = step.actor() {
                if actor != track.actor {
                    return Err(ScenarioError::TrackMismatch {
                        track: track.actor.clone(),
                        actor: actor.to_string(),
                    });
                }
            }
        }
    }
    Ok(())
}

/// Move each track's actor into its own task, join all of them, and put
/// the actors back. The first track error is reported only after every
/// track has finished.
async fn run_parallel(
    tracks: &[Track],
    config: &Arc<HarnessConfig>,
    actors: &mut HashMap<String, Actor>,
) -> Result<(), ScenarioError> {
    check_tracks(tracks)?;

    let handles: Vec<_> = tracks
        .iter()
        .map(|track| {
            let mut slot = actors.remove(&track.actor);
            let track = track.clone();
            let config = Arc::clone(config);
            tokio::spawn(async move {
                let mut result = Ok(());
                for step in &track.steps {
                    if let Err(e) = apply(step, &track.actor, &mut slot, &config).await {
                        result = Err(e);
                        break;
                    }
                }
                (slot, result)
            })
        })
        .collect();

    let mut first_error = None;
    for (track, joined) in tracks.iter().zip(futures::future::join_all(handles).await) {
        match joined {
            Ok((slot, result)) => {
                if let Some(actor) = slot {
                    actors.insert(track.actor.clone(), actor);
                }
                if let Err(e) = result {
                    tracing::debug!(track = %track.actor, error = %e, "track failed");
                    first_error.get_or_insert(e);
                }
            }
            Err(e) => {
                first_error.get_or_insert(ScenarioError::TrackPanicked {
                    actor: track.actor.clone(),
                    reason: e.to_string(),
                });
            }
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
