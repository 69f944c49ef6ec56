//! Adversarial and resilience scenarios.
//!
//! Most of these end with a survival probe: a fresh client must still be
//! able to register after the abuse. Behaviour the protocol leaves open is
//! checked with advisory expectations only.

use std::time::Duration;

use rand::rngs::StdRng;

use crate::handshake::Credentials;
use crate::payloads;
use crate::predicate::{Marker, Predicate};
use crate::registry::Namer;
use crate::scenario::{Scenario, Track, Wait};

use super::{join, ping, shared_channel, REPLY_SETTLE};

const BUFFER: &str = "buffer";
const PARSING: &str = "parsing";
const NICKNAMES: &str = "nicknames";
const CHANNELS: &str = "channels";
const PRIVMSG: &str = "privmsg";
const RACES: &str = "races";
const AUTH: &str = "auth";
const STRESS: &str = "stress";
const PRIVILEGES: &str = "privileges";
const UNICODE: &str = "unicode";
const INVITE: &str = "invite";
const TOPIC: &str = "topic";
const QUIT: &str = "quit";
const KEYS: &str = "keys";

const OVERSIZED: usize = 100_000;

fn millis(ms: u64) -> Wait {
    Wait::Fixed(Duration::from_millis(ms))
}

/// PONG, or the server chose to hang up.
fn pong_or_hangup() -> Predicate {
    Predicate::text("PONG")
        .or(Predicate::Silent)
        .or(Predicate::Disconnected)
}

/// A scenario whose single actor logs in as `<base>` first.
fn solo(name: &str, group: &str, namer: &Namer, base: &str) -> (Scenario, String) {
    let nick = namer.nick(base);
    let scenario = Scenario::new(name, group).login("a", Credentials::nick(&nick));
    (scenario, nick)
}

/// Finish with a liveness check, registering as the first four
/// characters of `base` followed by `ok`.
fn survives(scenario: Scenario, namer: &Namer, base: &str) -> Scenario {
    let stem: String = base.chars().take(4).collect();
    scenario.expect_server_alive(namer.nick(&format!("{stem}ok")))
}

pub fn scenarios(namer: &Namer, password: &str, rng: &mut StdRng) -> Vec<Scenario> {
    let mut out = Vec::new();
    out.extend(buffer(namer, rng));
    out.extend(parsing(namer));
    out.extend(nicknames(namer, password));
    out.extend(channels(namer));
    out.extend(privmsg(namer));
    out.extend(races(namer));
    out.extend(auth(namer, password));
    out.extend(stress(namer, password));
    out.extend(privileges(namer));
    out.extend(unicode(namer));
    out.extend(invite(namer));
    out.extend(topic(namer));
    out.extend(quit(namer));
    out.extend(keys(namer));
    out
}

fn buffer(namer: &Namer, rng: &mut StdRng) -> Vec<Scenario> {
    let mut out = Vec::new();

    let (s, nick) = solo("huge_line", BUFFER, namer, "huge");
    let s = s
        .describe("a terminated 100 KB line, then PING")
        .send("a", payloads::oversized_line(&format!("PRIVMSG {nick} :"), OVERSIZED))
        .settle(REPLY_SETTLE);
    out.push(survives(ping(s, "a").expect("a", pong_or_hangup()), namer, "huge"));

    let (s, _) = solo("unterminated_payload", BUFFER, namer, "unterm");
    let s = s
        .describe("100 KB with no line terminator, then PING")
        .send_raw("a", payloads::unterminated(b'A', OVERSIZED))
        .settle(REPLY_SETTLE);
    out.push(survives(ping(s, "a").expect("a", pong_or_hangup()), namer, "unterm"));

    let (mut s, _) = solo("unterminated_flood", BUFFER, namer, "nonl");
    s = s.describe("10 KB trickled without a newline must not be buffered forever");
    for chunk in payloads::unterminated_chunks(b'X', 100, 100) {
        s = s.send_raw("a", chunk).pause(millis(10));
    }
    out.push(survives(
        s.settle(10)
            .send("a", "PING test")
            .settle(REPLY_SETTLE)
            .capture("a")
            .expect(
                "a",
                Predicate::Silent
                    .or(Predicate::text("ERROR"))
                    .or(Predicate::Disconnected),
            ),
        namer,
        "nonl",
    ));

    let (s, nick) = solo("null_bytes", BUFFER, namer, "null");
    out.push(survives(
        s.describe("NUL bytes inside a message")
            .send_raw("a", payloads::with_nulls(&format!("PRIVMSG {nick} :Test")))
            .settle(REPLY_SETTLE)
            .capture("a"),
        namer,
        "null",
    ));

    let (s, _) = solo("binary_garbage", BUFFER, namer, "bin");
    let s = s
        .describe("500 random bytes as one line")
        .send_raw("a", payloads::binary_garbage(rng, 500))
        .settle(REPLY_SETTLE);
    out.push(survives(ping(s, "a"), namer, "bin"));

    out
}

fn parsing(namer: &Namer) -> Vec<Scenario> {
    let mut out = Vec::new();

    let (s, nick) = solo("many_colons", PARSING, namer, "colons");
    out.push(
        s.describe("colons inside the trailing parameter are kept")
            .send("a", format!("PRIVMSG {nick} ::::::test:with:many:colons::"))
            .settle(2)
            .capture("a")
            .expect("a", Predicate::text(":test:with:many:colons")),
    );

    let (s, _) = solo("empty_params", PARSING, namer, "empty");
    out.push(
        s.describe("JOIN and PRIVMSG with no parameters")
            .send("a", "JOIN")
            .capture("a")
            .send("a", "PRIVMSG")
            .capture("a")
            .expect(
                "a",
                Predicate::at_least(Marker::numeric("461"), 2)
                    .or(Predicate::numeric("461").and(Predicate::numeric("411"))),
            ),
    );

    let (s, nick) = solo("extra_spaces", PARSING, namer, "spaces");
    out.push(
        s.describe("runs of spaces between parameters")
            .send("a", format!("   PRIVMSG    {nick}    :test   with   spaces   "))
            .settle(2)
            .capture("a")
            .warn_unless("a", Predicate::text("test")),
    );

    let channel = namer.channel("case");
    let (s, _) = solo("case_insensitive_commands", PARSING, namer, "case");
    out.push(
        s.describe("commands are accepted in any letter case")
            .send("a", format!("join {channel}"))
            .capture("a")
            .send("a", format!("PaRt {channel}"))
            .capture("a")
            .warn_unless("a", Predicate::lacks_numeric("421")),
    );

    out
}

fn nicknames(namer: &Namer, password: &str) -> Vec<Scenario> {
    let mut out = Vec::new();
    let pass = format!("PASS {password}");

    out.push(survives(
        Scenario::new("nick_with_spaces", NICKNAMES)
            .describe("NICK with embedded spaces")
            .connect("a")
            .send("a", pass.clone())
            .send("a", format!("NICK {} with spaces", namer.nick("nick")))
            .send("a", "USER n 0 * :n")
            .settle(REPLY_SETTLE)
            .capture("a"),
        namer,
        "nicksp",
    ));

    let mut s = Scenario::new("special_nicknames", NICKNAMES)
        .describe("NICK with reserved characters")
        .connect("a")
        .send("a", pass.clone());
    for nick in payloads::special_nicknames() {
        s = s.send("a", format!("NICK {}", namer.nick(nick))).settle(2);
    }
    out.push(survives(
        s.send("a", "USER n 0 * :n").settle(REPLY_SETTLE).capture("a"),
        namer,
        "nspec",
    ));

    out.push(survives(
        Scenario::new("oversized_nickname", NICKNAMES)
            .describe("a 100 character nickname")
            .connect("a")
            .send("a", pass)
            .send("a", format!("NICK {}", "A".repeat(100)))
            .send("a", "USER n 0 * :n")
            .settle(REPLY_SETTLE)
            .capture("a"),
        namer,
        "nlong",
    ));

    let (mut s, _) = solo("nick_change_spam", NICKNAMES, namer, "spam");
    s = s.describe("100 nick changes back to back");
    for i in 0..100 {
        s = s.send("a", format!("NICK {}", namer.nick(&format!("spam{i}"))));
    }
    out.push(ping(s.settle(10), "a").expect("a", Predicate::text("PONG")));

    out
}

fn channels(namer: &Namer) -> Vec<Scenario> {
    let mut out = Vec::new();

    let (mut s, _) = solo("join_many_channels", CHANNELS, namer, "jmany");
    s = s.describe("JOIN 100 channels");
    for i in 0..100 {
        s = s.send("a", format!("JOIN {}", namer.channel(&format!("chan{i}"))));
    }
    let s = ping(s.settle(20), "a").warn_unless("a", Predicate::text("PONG"));
    out.push(survives(s, namer, "jmany"));

    let (mut s, _) = solo("hostile_channel_names", CHANNELS, namer, "chinj");
    s = s.describe("channel names with CRLF, repeated prefixes, 200 characters, colons");
    for name in payloads::hostile_channel_names() {
        s = s.send("a", format!("JOIN {name}")).settle(2);
    }
    out.push(survives(s, namer, "chinj"));

    let channel = namer.channel("modespam");
    let mut s = join(Scenario::new("mode_storm", CHANNELS), "a", &namer.nick("mspam"), &channel)
        .describe("160 mode toggles on one channel");
    for mode in payloads::mode_storm(20) {
        s = s.send("a", format!("MODE {channel} {mode}"));
    }
    let s = ping(s.settle(10), "a").warn_unless("a", Predicate::text("PONG"));
    out.push(survives(s, namer, "mspam"));

    let channel = namer.channel("modeinv");
    let mut s = join(Scenario::new("invalid_limits", CHANNELS), "a", &namer.nick("minv"), &channel)
        .describe("MODE +l with negative, zero, huge and non-numeric limits");
    for limit in payloads::invalid_limits() {
        s = s.send("a", format!("MODE {channel} +l {limit}")).settle(2);
    }
    out.push(survives(s, namer, "minv"));

    out
}

fn privmsg(namer: &Namer) -> Vec<Scenario> {
    let mut out = Vec::new();

    let (mut s, nick) = solo("privmsg_self_loop", PRIVMSG, namer, "loop");
    s = s.describe("100 messages to oneself");
    for i in 0..100 {
        s = s.send("a", format!("PRIVMSG {nick} :msg{i}"));
    }
    let s = ping(s.settle(10), "a").warn_unless("a", Predicate::text("PONG"));
    out.push(survives(s, namer, "loop"));

    let (s, _) = solo("privmsg_unknown_nick", PRIVMSG, namer, "nonex");
    out.push(
        s.describe("PRIVMSG to a nick nobody uses")
            .send("a", format!("PRIVMSG {} :test", namer.nick("nobody")))
            .capture("a")
            .warn_unless("a", Predicate::numeric("401")),
    );

    let (s, nick) = solo("privmsg_empty_text", PRIVMSG, namer, "emsg");
    out.push(survives(
        s.describe("PRIVMSG with an empty trailing parameter")
            .send("a", format!("PRIVMSG {nick} :"))
            .capture("a"),
        namer,
        "emsg",
    ));

    let (s, _) = solo("privmsg_non_member", PRIVMSG, namer, "notmem");
    out.push(
        s.describe("PRIVMSG to a channel the sender is not in")
            .send("a", format!("PRIVMSG {} :test", namer.channel("notmember")))
            .capture("a")
            .warn_unless("a", Predicate::any_numeric(&["403", "404", "442"])),
    );

    out
}

fn races(namer: &Namer) -> Vec<Scenario> {
    let mut out = Vec::new();

    let channel = namer.channel("simul");
    let actors: Vec<String> = (0..10).map(|i| format!("sim{i}")).collect();
    let tracks = actors
        .iter()
        .map(|actor| {
            Track::new(actor.as_str())
                .login(Credentials::nick(namer.nick(actor)))
                .send(format!("JOIN {channel}"))
                .pause(Wait::Settle(REPLY_SETTLE))
                .capture()
        })
        .collect();
    let mut s = Scenario::new("simultaneous_join", RACES)
        .describe("10 clients register and join one channel at once")
        .parallel(tracks);
    for actor in &actors {
        s = s.warn_unless(actor.as_str(), Predicate::numeric("366"));
    }
    out.push(survives(s, namer, "simul"));

    let channel = namer.channel("kicktest");
    let victim = namer.nick("victim");
    let mut flood = Track::new("victim");
    for i in 0..50 {
        flood = flood.send(format!("PRIVMSG {channel} :msg{i}")).pause(millis(10));
    }
    let kick = Track::new("kicker")
        .pause(millis(100))
        .send(format!("KICK {channel} {victim}"));
    let s = shared_channel(
        Scenario::new("kick_during_flood", RACES),
        ("kicker", namer.nick("kicker").as_str()),
        ("victim", victim.as_str()),
        &channel,
    )
    .describe("KICK lands while the victim is sending")
    .parallel(vec![flood, kick]);
    out.push(survives(s, namer, "kick"));

    out
}

fn auth(namer: &Namer, password: &str) -> Vec<Scenario> {
    let mut out = Vec::new();
    let channel = namer.channel("noauth");

    out.push(
        Scenario::new("commands_before_auth", AUTH)
            .describe("channel commands from an unregistered client")
            .connect("a")
            .send("a", format!("JOIN {channel}"))
            .send("a", format!("PRIVMSG {channel} :hack"))
            .send("a", format!("MODE {channel} +o"))
            .send("a", format!("KICK {channel} user"))
            .settle(REPLY_SETTLE)
            .capture("a")
            .expect("a", Predicate::numeric("451").or(Predicate::Silent)),
    );

    out.push(
        Scenario::new("double_pass", AUTH)
            .describe("two PASS lines before NICK and USER")
            .connect("a")
            .send("a", format!("PASS {password}"))
            .send("a", "PASS anotherpassword")
            .send("a", format!("NICK {}", namer.nick("double")))
            .send("a", "USER d 0 * :d")
            .settle(REPLY_SETTLE)
            .capture("a")
            .warn_unless("a", Predicate::any_numeric(&["462", "001"])),
    );

    let mut s = Scenario::new("registration_timeout", AUTH)
        .describe("an unregistered client spamming junk is dropped eventually")
        .slow()
        .connect("a");
    for _ in 0..15 {
        s = s.send("a", "INVALID command").pause(millis(100));
    }
    out.push(
        s.discard("a")
            .pause(Wait::RegistrationGrace)
            .capture("a")
            .warn_unless("a", Predicate::Disconnected.or(Predicate::text("ERROR"))),
    );

    out
}

fn stress(namer: &Namer, password: &str) -> Vec<Scenario> {
    let mut out = Vec::new();

    let mut s = Scenario::new("rapid_reconnect", STRESS)
        .describe("50 connect, register, disconnect cycles");
    for i in 0..50 {
        let actor = format!("rap{i}");
        s = s
            .connect(actor.as_str())
            .send(actor.as_str(), format!("PASS {password}"))
            .send(actor.as_str(), format!("NICK {}", namer.nick(&actor)))
            .send(actor.as_str(), "USER r 0 * :r")
            .pause(millis(50))
            .close(actor.as_str());
    }
    out.push(survives(s, namer, "rapid"));

    let channel = namer.channel("flood");
    let mut s = shared_channel(
        Scenario::new("channel_flood", STRESS),
        ("flooder", namer.nick("floodr").as_str()),
        ("receiver", namer.nick("recvr").as_str()),
        &channel,
    )
    .describe("500 channel messages in one burst");
    for i in 0..500 {
        s = s.send("flooder", format!("PRIVMSG {channel} :flood{i}"));
    }
    let s = ping(s.settle(20), "flooder").warn_unless("flooder", Predicate::text("PONG"));
    out.push(survives(s, namer, "flood"));

    let (s, _) = solo("part_unknown_channel", STRESS, namer, "partno");
    out.push(
        s.describe("PART of a channel that does not exist")
            .send("a", format!("PART {}", namer.channel("nochannel")))
            .capture("a")
            .warn_unless("a", Predicate::any_numeric(&["403", "442"])),
    );

    out
}

fn privileges(namer: &Namer) -> Vec<Scenario> {
    let mut out = Vec::new();

    let channel = namer.channel("optest");
    let op = namer.nick("opk");
    out.push(
        shared_channel(
            Scenario::new("non_op_kick", PRIVILEGES),
            ("op", op.as_str()),
            ("member", namer.nick("nonopk").as_str()),
            &channel,
        )
        .describe("KICK from a member without operator status")
        .send("member", format!("KICK {channel} {op}"))
        .capture("member")
        .expect("member", Predicate::numeric("482")),
    );

    let channel = namer.channel("modetest");
    out.push(
        shared_channel(
            Scenario::new("non_op_mode", PRIVILEGES),
            ("op", namer.nick("opm").as_str()),
            ("member", namer.nick("nonopm").as_str()),
            &channel,
        )
        .describe("MODE +i from a member without operator status")
        .send("member", format!("MODE {channel} +i"))
        .capture("member")
        .expect("member", Predicate::numeric("482")),
    );

    let channel = namer.channel("topictest");
    out.push(
        join(Scenario::new("non_op_topic", PRIVILEGES), "op", &namer.nick("opt"), &channel)
            .describe("TOPIC on a +t channel from a member without operator status")
            .send("op", format!("MODE {channel} +t"))
            .discard("op")
            .login("member", Credentials::nick(namer.nick("nonopt")))
            .send("member", format!("JOIN {channel}"))
            .discard("member")
            .discard("op")
            .send("member", format!("TOPIC {channel} :new topic"))
            .capture("member")
            .expect("member", Predicate::numeric("482")),
    );

    out
}

fn unicode(namer: &Namer) -> Vec<Scenario> {
    let mut out = Vec::new();

    let (mut s, nick) = solo("unicode_messages", UNICODE, namer, "uni");
    s = s.describe("messages in several scripts and emoji");
    for message in payloads::multiscript_messages() {
        s = s.send("a", format!("PRIVMSG {nick} :{message}")).settle(2);
    }
    out.push(survives(s, namer, "uni"));

    out.push(survives(
        Scenario::new("long_realname", UNICODE)
            .describe("a 1000 character realname")
            .connect("a")
            .register(
                "a",
                Credentials::nick(namer.nick("lreal"))
                    .with_username("l")
                    .with_realname("A".repeat(1000)),
            ),
        namer,
        "lreal",
    ));

    out
}

fn invite(namer: &Namer) -> Vec<Scenario> {
    let mut out = Vec::new();

    let channel = namer.channel("invself");
    let nick = namer.nick("invslf");
    out.push(
        join(Scenario::new("invite_self", INVITE), "a", &nick, &channel)
            .describe("INVITE oneself into a channel one is in")
            .send("a", format!("INVITE {nick} {channel}"))
            .capture("a")
            .warn_unless("a", Predicate::numeric("443")),
    );

    let channel = namer.channel("invnone");
    out.push(
        join(Scenario::new("invite_unknown_nick", INVITE), "a", &namer.nick("invnon"), &channel)
            .describe("INVITE a nick nobody uses")
            .send("a", format!("INVITE {} {channel}", namer.nick("ghost")))
            .capture("a")
            .warn_unless("a", Predicate::numeric("401")),
    );

    out
}

fn topic(namer: &Namer) -> Vec<Scenario> {
    let mut out = Vec::new();

    let channel = namer.channel("topiclong");
    out.push(survives(
        join(Scenario::new("topic_oversized", TOPIC), "a", &namer.nick("toplng"), &channel)
            .describe("a 1000 character topic")
            .send("a", format!("TOPIC {channel} :{}", "T".repeat(1000)))
            .settle(2)
            .capture("a"),
        namer,
        "toplng",
    ));

    let channel = namer.channel("topicnl");
    out.push(survives(
        join(Scenario::new("topic_line_injection", TOPIC), "a", &namer.nick("topnl"), &channel)
            .describe("a topic carrying CRLF and a second command")
            .send("a", format!("TOPIC {channel} :Line1\r\nPRIVMSG"))
            .settle(2)
            .capture("a"),
        namer,
        "topnl",
    ));

    out
}

fn quit(namer: &Namer) -> Vec<Scenario> {
    let mut out = Vec::new();

    let (mut s, _) = solo("quit_in_many_channels", QUIT, namer, "qmany");
    s = s.describe("QUIT while a member of 10 channels");
    for i in 0..10 {
        s = s
            .send("a", format!("JOIN {}", namer.channel(&format!("quit{i}"))))
            .pause(millis(100));
    }
    let s = s
        .settle(10)
        .discard("a")
        .send("a", "QUIT :Bye")
        .settle(REPLY_SETTLE)
        .capture("a")
        .warn_unless("a", Predicate::Disconnected.or(Predicate::text("ERROR")));
    out.push(survives(s, namer, "qmany"));

    let channel = namer.channel("quitop");
    out.push(survives(
        join(Scenario::new("quit_mid_operation", QUIT), "a", &namer.nick("quitop"), &channel)
            .describe("lines sent after QUIT in the same burst")
            .send_raw(
                "a",
                payloads::pipelined([
                    format!("PRIVMSG {channel} :msg1"),
                    "QUIT :Bye".to_string(),
                    format!("PRIVMSG {channel} :msg2"),
                ]),
            )
            .settle(REPLY_SETTLE)
            .capture("a"),
        namer,
        "quitop",
    ));

    out
}

fn keys(namer: &Namer) -> Vec<Scenario> {
    let mut out = Vec::new();

    let channel = namer.channel("keyspace");
    out.push(survives(
        join(Scenario::new("key_with_spaces", KEYS), "a", &namer.nick("keysp"), &channel)
            .describe("MODE +k with a key containing spaces")
            .send("a", format!("MODE {channel} +k key with spaces"))
            .capture("a"),
        namer,
        "keysp",
    ));

    let channel = namer.channel("keylong");
    out.push(survives(
        join(Scenario::new("key_oversized", KEYS), "a", &namer.nick("keylng"), &channel)
            .describe("MODE +k with a 500 character key")
            .send("a", format!("MODE {channel} +k {}", "K".repeat(500)))
            .capture("a"),
        namer,
        "keylng",
    ));

    out
}
