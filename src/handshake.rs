//! Registration handshake (PASS / NICK / USER).

use std::time::Duration;

use crate::predicate::Marker;
use crate::session::{PollPolicy, Session};

/// Numeric that signals a completed registration (RPL_WELCOME).
pub const REGISTERED_MARKER: &str = "001";

const DEFAULT_REALNAME: &str = "realname";

/// What a client presents when registering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub nickname: String,
    pub username: String,
    pub realname: Option<String>,
    /// Overrides the configured shared password when set.
    pub password: Option<String>,
}

impl Credentials {
    /// Nickname doubling as username, default realname, shared password.
    pub fn nick(nickname: impl Into<String>) -> Self {
        let nickname = nickname.into();
        Self {
            username: nickname.clone(),
            nickname,
            realname: None,
            password: None,
        }
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = username.into();
        self
    }

    pub fn with_realname(mut self, realname: impl Into<String>) -> Self {
        self.realname = Some(realname.into());
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// The three registration lines, in the order real clients send them.
    pub fn lines(&self, shared_password: &str) -> [String; 3] {
        let password = self.password.as_deref().unwrap_or(shared_password);
        let realname = self.realname.as_deref().unwrap_or(DEFAULT_REALNAME);
        [
            format!("PASS {password}"),
            format!("NICK {}", self.nickname),
            format!("USER {} 0 * :{realname}", self.username),
        ]
    }
}

/// Register `session` and return everything the server said meanwhile.
///
/// The three lines are pipelined without waiting in between. The reply is
/// then polled until [`REGISTERED_MARKER`] shows up or the policy runs out.
/// A timeout is not an error: the caller judges the accumulated text.
pub async fn register(
    session: &mut Session,
    credentials: &Credentials,
    shared_password: &str,
    policy: PollPolicy,
    read_timeout: Duration,
) -> String {
    for line in credentials.lines(shared_password) {
        if let Err(e) = session.send(&line).await {
            tracing::debug!(actor = %session.actor(), error = %e, "registration write failed");
            break;
        }
    }

    let welcome = Marker::numeric(REGISTERED_MARKER);
    let text = session
        .poll(policy, read_timeout, |text| welcome.found_in(text))
        .await;

    if welcome.found_in(&text) {
        tracing::debug!(actor = %session.actor(), nick = %credentials.nickname, "registered");
    } else {
        tracing::debug!(
            actor = %session.actor(),
            nick = %credentials.nickname,
            disconnected = session.is_disconnected(),
            "registration did not complete"
        );
    }
    text
}
