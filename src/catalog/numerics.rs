//! Reply and error numerics a conforming server must produce.

use crate::handshake::Credentials;
use crate::predicate::{Marker, Predicate};
use crate::registry::Namer;
use crate::scenario::Scenario;

use super::{join, shared_channel, REPLY_SETTLE};

const REPLIES: &str = "replies";
const ERRORS: &str = "errors";

pub fn scenarios(namer: &Namer, password: &str) -> Vec<Scenario> {
    let mut all = replies(namer);
    all.extend(errors(namer, password));
    all
}

/// Register and keep the whole welcome burst.
fn welcome_burst(name: &str, namer: &Namer, nick: &str) -> Scenario {
    Scenario::new(name, REPLIES)
        .connect("a")
        .register("a", Credentials::nick(namer.nick(nick)))
        .capture("a")
}

fn replies(namer: &Namer) -> Vec<Scenario> {
    let mut out = Vec::new();

    out.push(
        Scenario::new("001_welcome", REPLIES)
            .describe("registration completes with RPL_WELCOME")
            .connect("a")
            .register("a", Credentials::nick(namer.nick("welc")))
            .expect("a", Predicate::numeric("001").and(Predicate::text("Welcome"))),
    );
    out.push(
        welcome_burst("002_yourhost", namer, "yhost")
            .describe("welcome burst includes RPL_YOURHOST")
            .expect("a", Predicate::numeric("002").and(Predicate::text_ci("host"))),
    );
    out.push(
        welcome_burst("003_created", namer, "crtd")
            .describe("welcome burst includes RPL_CREATED")
            .expect("a", Predicate::numeric("003").and(Predicate::text_ci("created"))),
    );
    out.push(
        welcome_burst("004_myinfo", namer, "myinfo")
            .describe("RPL_MYINFO advertises channel modes i t k o l")
            .expect("a", Predicate::numeric("004").and(Predicate::text("itkol"))),
    );

    let nick = namer.nick("umode");
    out.push(
        Scenario::new("221_umodeis", REPLIES)
            .describe("MODE on one's own nick answers RPL_UMODEIS")
            .login("a", Credentials::nick(&nick))
            .send("a", format!("MODE {nick}"))
            .capture("a")
            .expect("a", Predicate::numeric("221")),
    );

    let channel = namer.channel("test324");
    out.push(
        join(Scenario::new("324_channelmodeis", REPLIES), "a", &namer.nick("chmode"), &channel)
            .describe("MODE on a joined channel answers RPL_CHANNELMODEIS")
            .send("a", format!("MODE {channel}"))
            .capture("a")
            .expect("a", Predicate::numeric("324")),
    );

    out.push(
        Scenario::new("331_notopic", REPLIES)
            .describe("joining a fresh channel reports RPL_NOTOPIC")
            .login("a", Credentials::nick(namer.nick("notop")))
            .send("a", format!("JOIN {}", namer.channel("notopic")))
            .settle(REPLY_SETTLE)
            .capture("a")
            .expect("a", Predicate::numeric("331").and(Predicate::text("No topic"))),
    );

    let channel = namer.channel("topic332");
    out.push(
        join(Scenario::new("332_topic", REPLIES), "keeper", &namer.nick("keeper"), &channel)
            .describe("a topic set by one member is shown to the next joiner")
            .send("keeper", format!("TOPIC {channel} :Test Topic"))
            .discard("keeper")
            .login("joiner", Credentials::nick(namer.nick("joiner")))
            .send("joiner", format!("JOIN {channel}"))
            .settle(REPLY_SETTLE)
            .capture("joiner")
            .expect("joiner", Predicate::numeric("332").and(Predicate::text("Test Topic"))),
    );

    let channel = namer.channel("invite341");
    let invited = namer.nick("invtee");
    out.push(
        join(Scenario::new("341_inviting", REPLIES), "inviter", &namer.nick("invtor"), &channel)
            .describe("INVITE is confirmed with RPL_INVITING")
            .login("invited", Credentials::nick(&invited))
            .send("inviter", format!("INVITE {invited} {channel}"))
            .capture("inviter")
            .expect("inviter", Predicate::numeric("341")),
    );

    let nick = namer.nick("names");
    out.push(
        Scenario::new("353_namreply", REPLIES)
            .describe("JOIN lists the joiner in RPL_NAMREPLY")
            .login("a", Credentials::nick(&nick))
            .send("a", format!("JOIN {}", namer.channel("names353")))
            .settle(REPLY_SETTLE)
            .capture("a")
            .expect("a", Predicate::numeric("353").and(Predicate::text(&nick))),
    );

    out.push(
        Scenario::new("366_endofnames", REPLIES)
            .describe("JOIN terminates the names list with RPL_ENDOFNAMES")
            .login("a", Credentials::nick(namer.nick("endnam")))
            .send("a", format!("JOIN {}", namer.channel("end366")))
            .settle(REPLY_SETTLE)
            .capture("a")
            .expect("a", Predicate::numeric("366").and(Predicate::text("End of"))),
    );

    out
}

/// Log in as `nick`, send one line, capture the answer.
fn single_command(name: &str, namer: &Namer, nick: &str, line: String) -> Scenario {
    Scenario::new(name, ERRORS)
        .login("a", Credentials::nick(namer.nick(nick)))
        .send("a", line)
        .capture("a")
}

fn errors(namer: &Namer, password: &str) -> Vec<Scenario> {
    let mut out = Vec::new();

    out.push(
        single_command(
            "401_nosuchnick",
            namer,
            "nonick",
            format!("PRIVMSG {} :test", namer.nick("abs401")),
        )
        .describe("PRIVMSG to an unknown nick")
        .expect("a", Predicate::numeric("401").and(Predicate::text("No such nick"))),
    );
    out.push(
        single_command(
            "403_nosuchchannel",
            namer,
            "nochan",
            format!("MODE {}", namer.channel("absent403")),
        )
        .describe("MODE on a channel that does not exist")
        .expect("a", Predicate::numeric("403").and(Predicate::text("No such channel"))),
    );
    out.push(
        single_command(
            "404_cannotsendtochan",
            namer,
            "cantsn",
            format!("PRIVMSG {} :test", namer.channel("notjoined404")),
        )
        .describe("PRIVMSG to a channel the sender is not in")
        .expect("a", Predicate::any_numeric(&["404", "403"])),
    );
    out.push(
        single_command("409_noorigin", namer, "noorig", "PING".to_string())
            .describe("PING without a parameter")
            .expect("a", Predicate::numeric("409").and(Predicate::text_ci("origin"))),
    );
    out.push(
        single_command(
            "421_unknowncommand",
            namer,
            "unkcmd",
            "NOSUCHCOMMAND param1 param2".to_string(),
        )
        .describe("a command the server does not implement")
        .expect("a", Predicate::numeric("421").and(Predicate::text("Unknown command"))),
    );
    out.push(
        single_command("431_nonicknamegiven", namer, "nonkgv", "NICK".to_string())
            .describe("NICK without a parameter")
            .expect("a", Predicate::numeric("431").and(Predicate::text("No nickname"))),
    );

    let dup = namer.nick("dupnk");
    out.push(
        Scenario::new("433_nicknameinuse", ERRORS)
            .describe("a second client registering a taken nickname")
            .login("first", Credentials::nick(&dup))
            .connect("second")
            .register("second", Credentials::nick(&dup).with_username("d"))
            .expect("second", Predicate::numeric("433").and(Predicate::text_ci("in use"))),
    );

    let channel = namer.channel("test441");
    out.push(
        join(Scenario::new("441_usernotinchannel", ERRORS), "a", &namer.nick("notin"), &channel)
            .describe("KICK of a nick that is not in the channel")
            .send("a", format!("KICK {channel} {}", namer.nick("abs441")))
            .capture("a")
            .expect("a", Predicate::numeric("441").and(Predicate::text_ci("aren't on"))),
    );

    out.push(
        single_command(
            "442_notonchannel",
            namer,
            "noton",
            format!("PART {}", namer.channel("notjoined442")),
        )
        .describe("PART of a channel the client is not in")
        .expect("a", Predicate::any_numeric(&["442", "403"])),
    );

    let channel = namer.channel("test443");
    let nick = namer.nick("onchan");
    out.push(
        join(Scenario::new("443_useronchannel", ERRORS), "a", &nick, &channel)
            .describe("INVITE of a nick already in the channel")
            .send("a", format!("INVITE {nick} {channel}"))
            .capture("a")
            .expect("a", Predicate::numeric("443").and(Predicate::text_ci("already on"))),
    );

    out.push(
        Scenario::new("451_notregistered", ERRORS)
            .describe("JOIN before registering")
            .connect("a")
            .send("a", format!("JOIN {}", namer.channel("early451")))
            .capture("a")
            .expect("a", Predicate::numeric("451").and(Predicate::text_ci("not registered"))),
    );

    let channel = namer.channel("params461");
    let mut incomplete = Scenario::new("461_needmoreparams", ERRORS)
        .describe("commands missing required parameters")
        .login("a", Credentials::nick(namer.nick("needmr")));
    for line in [
        "JOIN".to_string(),
        "PRIVMSG".to_string(),
        format!("MODE {channel}"),
        format!("KICK {channel}"),
        "INVITE".to_string(),
        "TOPIC".to_string(),
    ] {
        incomplete = incomplete.send("a", line).settle(2);
    }
    out.push(
        incomplete
            .settle(REPLY_SETTLE)
            .capture("a")
            .expect("a", Predicate::at_least(Marker::numeric("461"), 3)),
    );

    out.push(
        single_command(
            "462_alreadyregistred",
            namer,
            "rereg",
            format!("PASS {password}"),
        )
        .describe("PASS after registration completed")
        .expect("a", Predicate::numeric("462").and(Predicate::text_ci("may not reregister"))),
    );

    out.push(
        Scenario::new("464_passwdmismatch", ERRORS)
            .describe("registration with the wrong password")
            .connect("a")
            .register(
                "a",
                Credentials::nick(namer.nick("badpw"))
                    .with_username("b")
                    .with_password("wrongpassword123"),
            )
            .expect("a", Predicate::numeric("464").and(Predicate::text_ci("incorrect"))),
    );

    let channel = namer.channel("full471");
    out.push(
        join(Scenario::new("471_channelisfull", ERRORS), "op", &namer.nick("op471"), &channel)
            .describe("JOIN beyond the +l limit")
            .send("op", format!("MODE {channel} +l 2"))
            .discard("op")
            .login("member", Credentials::nick(namer.nick("lim471")))
            .send("member", format!("JOIN {channel}"))
            .discard("member")
            .discard("op")
            .login("blocked", Credentials::nick(namer.nick("blk471")))
            .send("blocked", format!("JOIN {channel}"))
            .settle(REPLY_SETTLE)
            .capture("blocked")
            .expect("blocked", Predicate::numeric("471").and(Predicate::text_ci("full"))),
    );

    let channel = namer.channel("invite473");
    out.push(
        join(Scenario::new("473_inviteonlychan", ERRORS), "op", &namer.nick("opi473"), &channel)
            .describe("JOIN of an invite-only channel without an invite")
            .send("op", format!("MODE {channel} +i"))
            .discard("op")
            .login("blocked", Credentials::nick(namer.nick("blk473")))
            .send("blocked", format!("JOIN {channel}"))
            .settle(REPLY_SETTLE)
            .capture("blocked")
            .expect("blocked", Predicate::numeric("473").and(Predicate::text_ci("invite"))),
    );

    let channel = namer.channel("key475");
    out.push(
        join(Scenario::new("475_badchannelkey", ERRORS), "op", &namer.nick("opk475"), &channel)
            .describe("JOIN of a keyed channel with the wrong key")
            .send("op", format!("MODE {channel} +k secretpassword"))
            .discard("op")
            .login("blocked", Credentials::nick(namer.nick("bdk475")))
            .send("blocked", format!("JOIN {channel} wrongpassword"))
            .settle(REPLY_SETTLE)
            .capture("blocked")
            .expect("blocked", Predicate::numeric("475").and(Predicate::text_ci("key"))),
    );

    let channel = namer.channel("priv482");
    out.push(
        shared_channel(
            Scenario::new("482_chanoprivsneeded", ERRORS),
            ("op", &namer.nick("op482")),
            ("member", &namer.nick("non482")),
            &channel,
        )
        .describe("channel MODE from a member without operator status")
        .send("member", format!("MODE {channel} +i"))
        .capture("member")
        .expect("member", Predicate::numeric("482").and(Predicate::text_ci("operator"))),
    );

    out
}
