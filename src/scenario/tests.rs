use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

use super::*;
use crate::config::{HarnessConfig, TimingConfig};
use crate::verdict::Outcome;

/// Tiny line server: welcomes after USER, answers PING, rejects a bare
/// JOIN with 461, and hangs up on BYE.
async fn fake_server() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(serve(stream));
        }
    });
    addr
}

async fn serve(stream: TcpStream) {
    let (read, mut write) = stream.into_split();
    let mut lines = BufReader::new(read).lines();
    let mut nick = "*".to_string();
    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim_end_matches('\r');
        let mut words = line.split_whitespace();
        let reply = match words.next() {
            Some("NICK") => {
                nick = words.next().unwrap_or("*").to_string();
                None
            }
            Some("USER") => Some(format!(":fake 001 {nick} :Welcome to the fake network\r\n")),
            Some("PING") => Some(format!(":fake PONG fake :{}\r\n", words.next().unwrap_or(""))),
            Some("JOIN") if words.next().is_none() => {
                Some(format!(":fake 461 {nick} JOIN :Not enough parameters\r\n"))
            }
            Some("BYE") => break,
            _ => None,
        };
        if let Some(reply) = reply {
            if write.write_all(reply.as_bytes()).await.is_err() {
                break;
            }
        }
    }
}

fn config_for(addr: &str) -> Arc<HarnessConfig> {
    let (host, port) = addr.rsplit_once(':').unwrap();
    let mut config = HarnessConfig::default();
    config.server.host = host.to_string();
    config.server.port = port.parse().unwrap();
    config.timing = TimingConfig {
        connect_timeout_ms: 1_000,
        read_timeout_ms: 200,
        settle_unit_ms: 10,
        register_attempts: 10,
        register_interval_ms: 20,
        collect_attempts: 5,
        collect_interval_ms: 20,
        registration_grace_ms: 50,
        scenario_timeout_ms: 5_000,
    };
    Arc::new(config)
}

async fn closed_port() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    drop(listener);
    addr
}

#[test]
fn login_expands_to_connect_register_discard() {
    let s = Scenario::new("x", "g").login("a", Credentials::nick("alice"));
    assert!(matches!(s.steps[0], Step::Connect { ref actor } if actor == "a"));
    assert!(matches!(s.steps[1], Step::Register { ref credentials, .. } if credentials.nickname == "alice"));
    assert_eq!(s.steps[2], Step::Pause(Wait::Settle(3)));
    assert!(matches!(s.steps[3], Step::Discard { .. }));
}

#[test]
fn survival_probe_requires_welcome() {
    let s = Scenario::new("x", "g").expect_server_alive("probe1");
    assert_eq!(s.actors(), vec![SURVIVAL_PROBE]);
    let last = s.expectations.last().unwrap();
    assert_eq!(last.actor, SURVIVAL_PROBE);
    assert_eq!(last.predicate, Predicate::numeric("001"));
}

#[test]
fn actors_include_parallel_tracks_once() {
    let s = Scenario::new("x", "g")
        .connect("op")
        .parallel(vec![Track::new("a").connect(), Track::new("b").connect()])
        .connect("b");
    assert_eq!(s.actors(), vec!["op", "a", "b"]);
}

#[test]
fn wait_durations_follow_timing() {
    let timing = TimingConfig::default();
    assert_eq!(Wait::Settle(3).duration(&timing), Duration::from_millis(300));
    assert_eq!(
        Wait::Fixed(Duration::from_millis(7)).duration(&timing),
        Duration::from_millis(7)
    );
    assert_eq!(
        Wait::RegistrationGrace.duration(&timing),
        Duration::from_millis(32_000)
    );
}

#[tokio::test]
async fn welcome_scenario_passes() {
    let config = config_for(&fake_server().await);
    let scenario = Scenario::new("welcome", "numerics")
        .connect("a")
        .register("a", Credentials::nick("alice"))
        .expect("a", Predicate::numeric("001").and(Predicate::text("Welcome")));

    let run = execute(Arc::new(scenario), config).await;
    assert_eq!(run.verdict.outcome, Outcome::Pass, "{}", run.verdict.reason);
    assert_eq!(run.reached, ScenarioState::Verdicted);
}

#[tokio::test]
async fn login_discards_welcome() {
    let config = config_for(&fake_server().await);
    let scenario = Scenario::new("join", "numerics")
        .login("a", Credentials::nick("alice"))
        .send("a", "JOIN")
        .capture("a")
        .expect("a", Predicate::numeric("461"))
        .expect("a", Predicate::lacks_numeric("001"));

    let run = execute(Arc::new(scenario), config).await;
    assert_eq!(run.verdict.outcome, Outcome::Pass, "{}", run.verdict.reason);
}

#[tokio::test]
async fn collect_stops_at_marker() {
    let config = config_for(&fake_server().await);
    let scenario = Scenario::new("ping", "g")
        .login("a", Credentials::nick("alice"))
        .send("a", "PING hello")
        .collect("a", Some(Marker::text("PONG")))
        .expect("a", Predicate::text("PONG"));

    let run = execute(Arc::new(scenario), config).await;
    assert!(run.verdict.is_pass(), "{}", run.verdict.reason);
}

#[tokio::test]
async fn hangup_is_captured_as_disconnect() {
    let config = config_for(&fake_server().await);
    let scenario = Scenario::new("bye", "g")
        .login("a", Credentials::nick("alice"))
        .send("a", "BYE")
        .capture("a")
        // Writes after the hangup must not abort the script.
        .send("a", "PING again")
        .send("a", "PING again")
        .capture("a")
        .expect("a", Predicate::Disconnected.and(Predicate::Silent));

    let run = execute(Arc::new(scenario), config).await;
    assert_eq!(run.verdict.outcome, Outcome::Pass, "{}", run.verdict.reason);
}

#[tokio::test]
async fn advisory_mismatch_warns() {
    let config = config_for(&fake_server().await);
    let scenario = Scenario::new("quiet", "g")
        .login("a", Credentials::nick("alice"))
        .send("a", "PRIVMSG nobody :hi")
        .capture("a")
        .warn_unless("a", Predicate::numeric("401"));

    let run = execute(Arc::new(scenario), config).await;
    assert_eq!(run.verdict.outcome, Outcome::Indeterminate);
}

#[tokio::test]
async fn no_expectations_pass() {
    let config = config_for(&fake_server().await);
    let scenario = Scenario::new("smoke", "g").login("a", Credentials::nick("alice"));
    let run = execute(Arc::new(scenario), config).await;
    assert_eq!(run.verdict.reason, "script completed");
}

#[tokio::test]
async fn unknown_actor_is_indeterminate() {
    let config = config_for(&fake_server().await);
    let scenario = Scenario::new("typo", "g")
        .send("ghost", "PING x")
        .expect("ghost", Predicate::Anything);

    let run = execute(Arc::new(scenario), config).await;
    assert_eq!(run.verdict.outcome, Outcome::Indeterminate);
    assert!(run.verdict.reason.contains("ghost"));
    assert_eq!(run.reached, ScenarioState::Created);
}

#[tokio::test]
async fn double_connect_is_indeterminate() {
    let config = config_for(&fake_server().await);
    let scenario = Scenario::new("twice", "g").connect("a").connect("a");
    let run = execute(Arc::new(scenario), config).await;
    assert_eq!(run.verdict.outcome, Outcome::Indeterminate);
    assert_eq!(run.reached, ScenarioState::Connected);
}

#[tokio::test]
async fn unreachable_server_fails() {
    let config = config_for(&closed_port().await);
    let scenario = Scenario::new("refused", "g")
        .login("a", Credentials::nick("alice"))
        .expect("a", Predicate::Anything);

    let run = execute(Arc::new(scenario), config).await;
    assert_eq!(run.verdict.outcome, Outcome::Fail);
    assert!(run.verdict.reason.starts_with("server unreachable"));
}

#[tokio::test]
async fn parallel_tracks_run_concurrently() {
    let config = config_for(&fake_server().await);
    let tracks = (0..5)
        .map(|i| {
            Track::new(format!("sim{i}"))
                .connect()
                .register(Credentials::nick(format!("sim{i}")))
        })
        .collect();
    let mut scenario = Scenario::new("sim", "g").parallel(tracks);
    for i in 0..5 {
        scenario = scenario.expect(format!("sim{i}"), Predicate::numeric("001"));
    }

    let started = std::time::Instant::now();
    let run = execute(Arc::new(scenario), config).await;
    assert!(run.verdict.is_pass(), "{}", run.verdict.reason);
    // Sequential registration would take five times as long as one.
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn parallel_restores_existing_actors() {
    let config = config_for(&fake_server().await);
    let scenario = Scenario::new("restore", "g")
        .login("a", Credentials::nick("alice"))
        .parallel(vec![Track::new("a").send("PING fromtrack")])
        .capture("a")
        .expect("a", Predicate::text("fromtrack"));

    let run = execute(Arc::new(scenario), config).await;
    assert!(run.verdict.is_pass(), "{}", run.verdict.reason);
}

#[tokio::test]
async fn track_addressing_another_actor_is_rejected() {
    let config = config_for(&fake_server().await);
    let mut track = Track::new("a").connect();
    track.steps.push(Step::Send {
        actor: "b".to_string(),
        line: "PING".to_string(),
    });
    let scenario = Scenario::new("mismatch", "g").parallel(vec![track]);

    let run = execute(Arc::new(scenario), config).await;
    assert_eq!(run.verdict.outcome, Outcome::Indeterminate);
    assert!(run.verdict.reason.contains("track a"));
}

#[tokio::test]
async fn nested_parallel_is_rejected() {
    let config = config_for(&fake_server().await);
    let mut track = Track::new("a");
    track.steps.push(Step::Parallel(vec![]));
    let scenario = Scenario::new("nested", "g").parallel(vec![track]);

    let run = execute(Arc::new(scenario), config).await;
    assert_eq!(run.verdict.outcome, Outcome::Indeterminate);
}

#[tokio::test]
async fn duplicate_tracks_are_rejected() {
    let config = config_for(&fake_server().await);
    let scenario = Scenario::new("dup", "g")
        .parallel(vec![Track::new("a").connect(), Track::new("a").connect()]);

    let run = execute(Arc::new(scenario), config).await;
    assert_eq!(run.verdict.outcome, Outcome::Indeterminate);
}
