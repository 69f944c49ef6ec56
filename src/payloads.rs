//! Adversarial input generators.
//!
//! Everything here is a pure function of its arguments. Randomness comes
//! from a caller-supplied [`StdRng`] so a catalog built from a fixed seed
//! sends the same bytes every run.

use bytes::{BufMut, Bytes, BytesMut};
use rand::rngs::StdRng;
use rand::Rng;

use crate::session::LINE_TERMINATOR;

/// Filler used for oversized lines.
const FILL: char = 'A';

/// `prefix` followed by `n` filler characters. Meant for `Session::send`,
/// which adds the terminator.
pub fn oversized_line(prefix: &str, n: usize) -> String {
    let mut line = String::with_capacity(prefix.len() + n);
    line.push_str(prefix);
    line.extend(std::iter::repeat(FILL).take(n));
    line
}

/// `n` copies of `byte` with no line terminator.
pub fn unterminated(byte: u8, n: usize) -> Bytes {
    Bytes::from(vec![byte; n])
}

/// `count` unterminated chunks of `chunk` bytes each, to be sent with
/// pauses in between.
pub fn unterminated_chunks(byte: u8, chunk: usize, count: usize) -> Vec<Bytes> {
    let piece = unterminated(byte, chunk);
    (0..count).map(|_| piece.clone()).collect()
}

/// `line` with three NUL bytes appended, then CRLF.
pub fn with_nulls(line: &str) -> Bytes {
    let mut buf = BytesMut::with_capacity(line.len() + 5);
    buf.put_slice(line.as_bytes());
    buf.put_slice(&[0, 0, 0]);
    buf.put_slice(LINE_TERMINATOR.as_bytes());
    buf.freeze()
}

/// `n` uniformly random bytes followed by CRLF.
pub fn binary_garbage(rng: &mut StdRng, n: usize) -> Bytes {
    let mut buf = BytesMut::with_capacity(n + LINE_TERMINATOR.len());
    for _ in 0..n {
        buf.put_u8(rng.gen());
    }
    buf.put_slice(LINE_TERMINATOR.as_bytes());
    buf.freeze()
}

/// Several lines in one write, each CRLF-terminated.
pub fn pipelined<I, S>(lines: I) -> Bytes
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut buf = BytesMut::new();
    for line in lines {
        buf.put_slice(line.as_ref().as_bytes());
        buf.put_slice(LINE_TERMINATOR.as_bytes());
    }
    buf.freeze()
}

/// Message bodies mixing scripts, right-to-left text and astral-plane
/// emoji.
pub fn multiscript_messages() -> &'static [&'static str] {
    &[
        "Olá mundo! 🌍",
        "Testing 中文字符",
        "Эмодзи тест 😀🎉",
        "العربية الاختبار",
    ]
}

/// Nicknames containing characters the protocol reserves.
pub fn special_nicknames() -> &'static [&'static str] {
    &["nick#1", "nick@2", "nick:3", "nick!4", "nick$5"]
}

/// Channel names that try to smuggle a second command, repeat the prefix,
/// overflow the length limit, or embed colons.
pub fn hostile_channel_names() -> Vec<String> {
    vec![
        "#test\r\nPRIVMSG".to_string(),
        "#test#test".to_string(),
        "##test".to_string(),
        format!("#{}", "A".repeat(200)),
        "#test:with:colons".to_string(),
    ]
}

/// Arguments for `MODE +l` that are negative, zero, huge, non-numeric, or
/// overflow a signed 32-bit integer.
pub fn invalid_limits() -> &'static [&'static str] {
    &["-5", "0", "99999999", "abc", "123abc", "2147483648"]
}

const MODE_CYCLE: [&str; 8] = ["+i", "-i", "+t", "-t", "+k test", "-k", "+l 10", "-l"];

/// Mode arguments toggling every channel flag on and off, `rounds` times.
pub fn mode_storm(rounds: usize) -> Vec<&'static str> {
    MODE_CYCLE
        .iter()
        .copied()
        .cycle()
        .take(rounds * MODE_CYCLE.len())
        .collect()
}
