//! Raw TCP session to the server under test.
//!
//! A [`Session`] is deliberately dumb: it writes lines or raw bytes, reads
//! whatever the server sends within a bounded wait, and decodes it lossily.
//! There is no line framing here. Callers look for markers in the
//! accumulated text, which keeps the harness alive when the server answers
//! with garbage, splits replies across segments, or hangs up mid-script.

use std::io;
use std::time::Duration;

use bytes::BytesMut;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// IRC line terminator appended by [`Session::send`].
pub const LINE_TERMINATOR: &str = "\r\n";

const READ_CHUNK: usize = 4096;

/// Upper bound on bytes drained by one receive, so a flooding server
/// cannot pin the harness inside a single call.
const MAX_DRAIN: usize = 1024 * 1024;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("failed to connect to {endpoint}: {source}")]
    Connect {
        endpoint: String,
        #[source]
        source: io::Error,
    },

    #[error("timed out connecting to {endpoint} after {timeout:?}")]
    ConnectTimeout { endpoint: String, timeout: Duration },

    #[error("session {0} is already connected")]
    AlreadyConnected(String),

    #[error("session {0} is not connected")]
    NotConnected(String),

    #[error("write failed on {actor}: {source}")]
    Write {
        actor: String,
        #[source]
        source: io::Error,
    },
}

impl SessionError {
    /// The endpoint could not be reached at all.
    pub fn is_connect(&self) -> bool {
        matches!(self, Self::Connect { .. } | Self::ConnectTimeout { .. })
    }

    /// The server closed or reset the stream under us.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, Self::Write { .. })
    }
}

/// Bounded-retry schedule for [`Session::poll`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub attempts: u32,
    /// Sleep before each receive.
    pub interval: Duration,
}

impl PollPolicy {
    pub fn new(attempts: u32, interval: Duration) -> Self {
        Self { attempts, interval }
    }
}

/// One actor's connection to the server.
pub struct Session {
    actor: String,
    endpoint: String,
    stream: Option<TcpStream>,
    /// Received but not yet handed out.
    buffer: BytesMut,
    disconnected: bool,
    connected_once: bool,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("actor", &self.actor)
            .field("endpoint", &self.endpoint)
            .field("connected", &self.stream.is_some())
            .field("disconnected", &self.disconnected)
            .finish_non_exhaustive()
    }
}

impl Session {
    pub fn new(actor: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            actor: actor.into(),
            endpoint: endpoint.into(),
            stream: None,
            buffer: BytesMut::new(),
            disconnected: false,
            connected_once: false,
        }
    }

    pub fn actor(&self) -> &str {
        &self.actor
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// True between a successful `connect` and `close`.
    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// True once the server has closed, reset, or refused a write on the
    /// stream.
    pub fn is_disconnected(&self) -> bool {
        self.disconnected
    }

    /// Open the TCP stream. A session connects at most once.
    pub async fn connect(&mut self, timeout: Duration) -> Result<(), SessionError> {
        if self.connected_once {
            return Err(SessionError::AlreadyConnected(self.actor.clone()));
        }

        let stream = match tokio::time::timeout(timeout, TcpStream::connect(&self.endpoint)).await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => {
                return Err(SessionError::Connect {
                    endpoint: self.endpoint.clone(),
                    source,
                })
            }
            Err(_) => {
                return Err(SessionError::ConnectTimeout {
                    endpoint: self.endpoint.clone(),
                    timeout,
                })
            }
        };
        // Small lines must not sit in Nagle's buffer between pipelined sends.
        let _ = stream.set_nodelay(true);

        tracing::debug!(actor = %self.actor, endpoint = %self.endpoint, "connected");
        self.stream = Some(stream);
        self.connected_once = true;
        Ok(())
    }

    /// Send one protocol line; the terminator is appended here.
    pub async fn send(&mut self, line: &str) -> Result<(), SessionError> {
        let mut data = Vec::with_capacity(line.len() + LINE_TERMINATOR.len());
        data.extend_from_slice(line.as_bytes());
        data.extend_from_slice(LINE_TERMINATOR.as_bytes());
        self.write(&data).await
    }

    /// Send bytes exactly as given.
    pub async fn send_raw(&mut self, bytes: &[u8]) -> Result<(), SessionError> {
        self.write(bytes).await
    }

    async fn write(&mut self, data: &[u8]) -> Result<(), SessionError> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| SessionError::NotConnected(self.actor.clone()))?;

        if let Err(source) = stream.write_all(data).await {
            tracing::debug!(actor = %self.actor, error = %source, "write failed, server disconnected");
            self.disconnected = true;
            return Err(SessionError::Write {
                actor: self.actor.clone(),
                source,
            });
        }
        Ok(())
    }

    /// Best-effort receive: wait up to `timeout` for the first bytes, then
    /// take whatever else is already available.
    ///
    /// Never fails. A timeout, EOF or read error yields an empty string;
    /// the latter two also mark the session disconnected.
    pub async fn receive(&mut self, timeout: Duration) -> String {
        self.fill(timeout).await;
        self.take_text()
    }

    /// Bounded-retry receive. Each attempt sleeps `policy.interval` and then
    /// receives; fragments are concatenated. Stops early once `done` accepts
    /// the accumulated text or the server hangs up.
    pub async fn poll<F>(&mut self, policy: PollPolicy, timeout: Duration, done: F) -> String
    where
        F: Fn(&str) -> bool,
    {
        let mut accumulated = String::new();
        for attempt in 1..=policy.attempts {
            tokio::time::sleep(policy.interval).await;
            let chunk = self.receive(timeout).await;
            if !chunk.is_empty() {
                tracing::trace!(actor = %self.actor, attempt, bytes = chunk.len(), "poll fragment");
            }
            accumulated.push_str(&chunk);
            if done(&accumulated) || self.disconnected {
                break;
            }
        }
        accumulated
    }

    /// Release the stream. Safe to call any number of times, including on a
    /// session that never connected.
    pub async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.shutdown().await {
                tracing::trace!(actor = %self.actor, error = %e, "shutdown on close failed");
            }
            tracing::debug!(actor = %self.actor, "closed");
        }
    }

    async fn fill(&mut self, timeout: Duration) -> usize {
        let Some(stream) = self.stream.as_mut() else {
            return 0;
        };

        self.buffer.reserve(READ_CHUNK);
        let mut total = match tokio::time::timeout(timeout, stream.read_buf(&mut self.buffer)).await {
            Err(_) => return 0,
            Ok(Ok(0)) => {
                self.disconnected = true;
                return 0;
            }
            Ok(Ok(n)) => n,
            Ok(Err(e)) => {
                tracing::debug!(actor = %self.actor, error = %e, "read failed");
                self.disconnected = true;
                return 0;
            }
        };

        while total < MAX_DRAIN {
            self.buffer.reserve(READ_CHUNK);
            match stream.try_read_buf(&mut self.buffer) {
                Ok(0) => {
                    self.disconnected = true;
                    break;
                }
                Ok(n) => total += n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    tracing::debug!(actor = %self.actor, error = %e, "read failed");
                    self.disconnected = true;
                    break;
                }
            }
        }
        total
    }

    fn take_text(&mut self) -> String {
        let bytes = self.buffer.split();
        String::from_utf8_lossy(&bytes).into_owned()
    }
}
