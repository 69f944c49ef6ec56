//! The standard scenario set.
//!
//! Every scenario is a plain value built from the scenario builders; none
//! of them touch the network until the runner executes them. Nicknames
//! and channel names go through the [`Namer`] so that two runs against the
//! same server never collide.

pub mod hardcore;
pub mod numerics;

use rand::rngs::StdRng;

use crate::handshake::Credentials;
use crate::predicate::Marker;
use crate::registry::{Namer, Registry};
use crate::scenario::Scenario;

/// Settle units granted to replies that follow a JOIN or a burst.
pub(crate) const REPLY_SETTLE: u32 = 5;

/// Build the full catalog: numeric replies first, then the adversarial
/// sections.
pub fn standard(namer: &Namer, password: &str, rng: &mut StdRng) -> Registry {
    let mut registry = Registry::new();
    registry.extend(numerics::scenarios(namer, password));
    registry.extend(hardcore::scenarios(namer, password, rng));
    registry
}

/// Send `PING test` and poll until the matching `PONG`.
pub(crate) fn ping(scenario: Scenario, actor: &str) -> Scenario {
    scenario
        .send(actor, "PING test")
        .collect(actor, Some(Marker::text("PONG")))
}

/// `actor` logs in as `nick`, joins `channel`, and the join burst is
/// dropped.
pub(crate) fn join(scenario: Scenario, actor: &str, nick: &str, channel: &str) -> Scenario {
    scenario
        .login(actor, Credentials::nick(nick))
        .send(actor, format!("JOIN {channel}"))
        .discard(actor)
}

/// `op` creates `channel`, then `member` joins it. Both captures start
/// empty afterwards.
pub(crate) fn shared_channel(
    scenario: Scenario,
    (op, op_nick): (&str, &str),
    (member, member_nick): (&str, &str),
    channel: &str,
) -> Scenario {
    join(scenario, op, op_nick, channel)
        .login(member, Credentials::nick(member_nick))
        .send(member, format!("JOIN {channel}"))
        .discard(member)
        .discard(op)
}
