#![allow(dead_code)]

//! In-process IRC server for integration tests.
//!
//! Implements just enough of the protocol for the catalog's core
//! scenarios: password-checked registration, PING, channel membership
//! with a single operator, and the usual error numerics. What happens to
//! a client that sends more than [`MAX_PENDING`] bytes without a newline
//! is chosen with [`Overflow`].

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use ircprobe::config::{HarnessConfig, TimingConfig};
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

pub const SERVER_NAME: &str = "mock.irc";
pub const PASSWORD: &str = "senha";

/// Longest unterminated line the mock will buffer.
pub const MAX_PENDING: usize = 512;

/// Longest nickname the mock accepts.
pub const NICK_LEN: usize = 9;

/// Quiet period after which [`Overflow::AbandonWhenIdle`] forgets a
/// partial line.
const IDLE_ABANDON: Duration = Duration::from_millis(20);

/// Treatment of input that keeps arriving without a newline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Overflow {
    /// Hang up once more than [`MAX_PENDING`] bytes are pending.
    Disconnect,
    /// Keep the connection and throw away a partial line once the client
    /// goes quiet.
    AbandonWhenIdle,
    /// Buffer without limit; the backlog becomes part of the next line.
    Unbounded,
}

#[derive(Default)]
struct Channel {
    members: Vec<String>,
    ops: HashSet<String>,
}

#[derive(Default)]
struct State {
    /// Lowercased nicknames currently claimed.
    nicks: HashSet<String>,
    channels: HashMap<String, Channel>,
}

impl State {
    fn release(&mut self, nick: &str) {
        self.nicks.remove(&nick.to_lowercase());
        for channel in self.channels.values_mut() {
            channel.members.retain(|m| m != nick);
            channel.ops.remove(nick);
        }
        self.channels.retain(|_, c| !c.members.is_empty());
    }
}

pub struct MockServer {
    addr: String,
    state: Arc<Mutex<State>>,
    accepted: Arc<AtomicUsize>,
}

impl MockServer {
    pub async fn start() -> Self {
        Self::start_with(Overflow::Disconnect).await
    }

    pub async fn start_with(overflow: Overflow) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let state = Arc::new(Mutex::new(State::default()));
        let accepted = Arc::new(AtomicUsize::new(0));

        let (shared, counter) = (Arc::clone(&state), Arc::clone(&accepted));
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(Client::new(Arc::clone(&shared)).serve(stream, overflow));
            }
        });

        Self {
            addr,
            state,
            accepted,
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Connections accepted so far.
    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    pub fn nick_count(&self) -> usize {
        self.state.lock().nicks.len()
    }

    /// Harness config aimed at this server, with short timings.
    pub fn config(&self) -> HarnessConfig {
        config_for(&self.addr)
    }
}

pub fn config_for(addr: &str) -> HarnessConfig {
    let (host, port) = addr.rsplit_once(':').unwrap();
    let mut config = HarnessConfig::default();
    config.server.host = host.to_string();
    config.server.port = port.parse().unwrap();
    config.server.password = PASSWORD.to_string();
    config.timing = TimingConfig {
        connect_timeout_ms: 1_000,
        read_timeout_ms: 200,
        settle_unit_ms: 10,
        register_attempts: 10,
        register_interval_ms: 20,
        collect_attempts: 5,
        collect_interval_ms: 20,
        registration_grace_ms: 100,
        scenario_timeout_ms: 10_000,
    };
    config
}

/// An address nothing listens on.
pub async fn closed_addr() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    drop(listener);
    addr
}

// ── Per-connection protocol ────────────────────────────────────────

struct Client {
    state: Arc<Mutex<State>>,
    password: Option<String>,
    nick: Option<String>,
    user: bool,
    registered: bool,
    out: Vec<String>,
    closing: bool,
}

impl Client {
    fn new(state: Arc<Mutex<State>>) -> Self {
        Self {
            state,
            password: None,
            nick: None,
            user: false,
            registered: false,
            out: Vec::new(),
            closing: false,
        }
    }

    async fn serve(mut self, mut stream: TcpStream, overflow: Overflow) {
        let mut buf = BytesMut::with_capacity(1024);
        'conn: loop {
            let read = if overflow == Overflow::AbandonWhenIdle && !buf.is_empty() {
                match tokio::time::timeout(IDLE_ABANDON, stream.read_buf(&mut buf)).await {
                    Ok(read) => read,
                    Err(_) => {
                        buf.clear();
                        continue;
                    }
                }
            } else {
                stream.read_buf(&mut buf).await
            };
            match read {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
            while let Some(pos) = buf.iter().position(|&b| b == b'\n') {
                let line = buf.split_to(pos + 1);
                let text = String::from_utf8_lossy(&line);
                self.handle(text.trim_end_matches(['\r', '\n']));
                let replies = std::mem::take(&mut self.out).concat();
                if !replies.is_empty() && stream.write_all(replies.as_bytes()).await.is_err() {
                    break 'conn;
                }
                if self.closing {
                    break 'conn;
                }
            }
            if overflow == Overflow::Disconnect && buf.len() > MAX_PENDING {
                break;
            }
        }
        if let Some(nick) = &self.nick {
            self.state.lock().release(nick);
        }
    }

    fn target(&self) -> &str {
        self.nick.as_deref().unwrap_or("*")
    }

    fn numeric(&mut self, code: &str, rest: impl AsRef<str>) {
        let line = format!(":{SERVER_NAME} {code} {} {}\r\n", self.target(), rest.as_ref());
        self.out.push(line);
    }

    fn raw(&mut self, line: impl AsRef<str>) {
        self.out.push(format!("{}\r\n", line.as_ref()));
    }

    fn prefix(&self) -> String {
        let nick = self.target();
        format!(":{nick}!{nick}@localhost")
    }

    fn handle(&mut self, line: &str) {
        let (command, params) = parse(line);
        let Some(command) = command else { return };
        let command = command.to_uppercase();

        match command.as_str() {
            "PASS" => self.pass(&params),
            "NICK" => self.nick_cmd(&params),
            "USER" => self.user_cmd(&params),
            "PING" => match params.first() {
                Some(token) => self.raw(format!(":{SERVER_NAME} PONG {SERVER_NAME} :{token}")),
                None => self.numeric("409", ":No origin specified"),
            },
            "QUIT" => {
                self.raw("ERROR :Closing link");
                self.closing = true;
            }
            _ if !self.registered => self.numeric("451", ":You have not registered"),
            "JOIN" => self.join(&params),
            "MODE" => self.mode(&params),
            "KICK" => self.kick(&params),
            "PRIVMSG" if params.is_empty() => self.numeric("411", ":No recipient given (PRIVMSG)"),
            "PRIVMSG" => {}
            "INVITE" | "TOPIC" | "PART" if params.is_empty() => {
                self.numeric("461", format!("{command} :Not enough parameters"))
            }
            "INVITE" | "TOPIC" | "PART" => {}
            _ => self.numeric("421", format!("{command} :Unknown command")),
        }
    }

    fn pass(&mut self, params: &[String]) {
        if self.registered {
            self.numeric("462", ":You may not reregister");
        } else if let Some(password) = params.first() {
            self.password = Some(password.clone());
        } else {
            self.numeric("461", "PASS :Not enough parameters");
        }
    }

    fn nick_cmd(&mut self, params: &[String]) {
        let Some(wanted) = params.first() else {
            self.numeric("431", ":No nickname given");
            return;
        };
        if self.state.lock().nicks.contains(&wanted.to_lowercase()) {
            self.numeric("433", format!("{wanted} :Nickname is already in use"));
            return;
        }
        if wanted.chars().count() > NICK_LEN {
            self.numeric("432", format!("{wanted} :Erroneous nickname"));
            return;
        }
        {
            let mut state = self.state.lock();
            if !state.nicks.insert(wanted.to_lowercase()) {
                drop(state);
                self.numeric("433", format!("{wanted} :Nickname is already in use"));
                return;
            }
            if let Some(old) = &self.nick {
                state.nicks.remove(&old.to_lowercase());
            }
        }
        if self.registered {
            let prefix = self.prefix();
            self.raw(format!("{prefix} NICK :{wanted}"));
        }
        self.nick = Some(wanted.clone());
        self.welcome();
    }

    fn user_cmd(&mut self, params: &[String]) {
        if self.registered {
            self.numeric("462", ":You may not reregister");
        } else if params.len() < 4 {
            self.numeric("461", "USER :Not enough parameters");
        } else {
            self.user = true;
            self.welcome();
        }
    }

    fn welcome(&mut self) {
        if self.registered || !self.user || self.nick.is_none() {
            return;
        }
        if self.password.as_deref() != Some(PASSWORD) {
            self.numeric("464", ":Password incorrect");
            self.raw("ERROR :Closing link (bad password)");
            self.closing = true;
            return;
        }
        self.registered = true;
        let nick = self.target().to_string();
        self.numeric("001", format!(":Welcome to the Mock IRC Network {nick}"));
        self.numeric("002", format!(":Your host is {SERVER_NAME}, running mock-1.0"));
        self.numeric("003", ":This server was created today");
        self.numeric("004", format!("{SERVER_NAME} mock-1.0 io itkol"));
    }

    fn join(&mut self, params: &[String]) {
        let Some(list) = params.first() else {
            self.numeric("461", "JOIN :Not enough parameters");
            return;
        };
        let nick = self.target().to_string();
        for name in list.split(',') {
            if !name.starts_with('#') {
                self.numeric("403", format!("{name} :No such channel"));
                continue;
            }
            let names = {
                let mut state = self.state.lock();
                let channel = state.channels.entry(name.to_string()).or_default();
                if channel.members.is_empty() {
                    channel.ops.insert(nick.clone());
                }
                if !channel.members.contains(&nick) {
                    channel.members.push(nick.clone());
                }
                channel
                    .members
                    .iter()
                    .map(|m| {
                        if channel.ops.contains(m) {
                            format!("@{m}")
                        } else {
                            m.clone()
                        }
                    })
                    .collect::<Vec<_>>()
                    .join(" ")
            };
            let prefix = self.prefix();
            self.raw(format!("{prefix} JOIN {name}"));
            self.numeric("353", format!("= {name} :{names}"));
            self.numeric("366", format!("{name} :End of /NAMES list"));
        }
    }

    /// `None` when the channel does not exist, otherwise whether this
    /// client is an operator there.
    fn op_status(&self, channel: &str) -> Option<bool> {
        let state = self.state.lock();
        let channel = state.channels.get(channel)?;
        Some(channel.ops.contains(self.target()))
    }

    fn mode(&mut self, params: &[String]) {
        let Some(target) = params.first().cloned() else {
            self.numeric("461", "MODE :Not enough parameters");
            return;
        };
        if !target.starts_with('#') {
            self.numeric("221", "+i");
            return;
        }
        match (self.op_status(&target), params.get(1)) {
            (None, _) => self.numeric("403", format!("{target} :No such channel")),
            (Some(_), None) => self.numeric("324", format!("{target} +t")),
            (Some(false), Some(_)) => {
                self.numeric("482", format!("{target} :You're not channel operator"))
            }
            (Some(true), Some(modes)) => {
                let prefix = self.prefix();
                self.raw(format!("{prefix} MODE {target} {modes}"));
            }
        }
    }

    fn kick(&mut self, params: &[String]) {
        let [channel, victim, ..] = params else {
            self.numeric("461", "KICK :Not enough parameters");
            return;
        };
        match self.op_status(channel) {
            None => self.numeric("403", format!("{channel} :No such channel")),
            Some(false) => self.numeric("482", format!("{channel} :You're not channel operator")),
            Some(true) => {
                let removed = {
                    let mut state = self.state.lock();
                    let members = &mut state.channels.entry(channel.clone()).or_default().members;
                    let before = members.len();
                    members.retain(|m| m != victim);
                    before != members.len()
                };
                if removed {
                    let prefix = self.prefix();
                    self.raw(format!("{prefix} KICK {channel} {victim}"));
                } else {
                    self.numeric("441", format!("{victim} {channel} :They aren't on that channel"));
                }
            }
        }
    }
}

/// Split a line into its command and parameters; a `:` parameter runs to
/// the end of the line.
fn parse(line: &str) -> (Option<String>, Vec<String>) {
    let mut rest = line.trim_start_matches(' ');
    if rest.starts_with(':') {
        rest = rest.split_once(' ').map_or("", |(_, r)| r);
    }
    let mut words = Vec::new();
    loop {
        rest = rest.trim_start_matches(' ');
        if rest.is_empty() {
            break;
        }
        if let Some(trailing) = rest.strip_prefix(':') {
            words.push(trailing.to_string());
            break;
        }
        match rest.split_once(' ') {
            Some((word, tail)) => {
                words.push(word.to_string());
                rest = tail;
            }
            None => {
                words.push(rest.to_string());
                break;
            }
        }
    }
    let mut words = words.into_iter();
    let command = words.next();
    (command, words.collect())
}
