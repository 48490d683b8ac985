use std::sync::Arc;

use anyhow::Context;
use clanbattle::battle::SaveSlotOp;
use clanbattle::notify::{self, Outbound, OutboundSink};
use clanbattle::report::ReportSlot;
use clanbattle::{
    BattleConfig, BattleError, ChallengeRequest, ClaimRequest, ClanBattle, GameServer, GroupId, LockKind,
    MemberId, ModifyRequest, Notifier, NotifyPreference, Role, ServerClock,
};
use serde::Serialize;
use tracing::{Level, info};

fn usage_and_exit() -> ! {
    eprintln!(
        "clanbattle_ctl\n\n\
USAGE:\n\
  clanbattle_ctl [--group ID] [--as MEMBER] <command> [args...]\n\n\
ENV:\n\
  CLANBATTLE_JOURNAL   journal file (required to keep anything between runs)\n\
  CLANBATTLE_GROUP     default clan id\n\
  CLANBATTLE_CALLER    default acting member id\n\
  CLANBATTLE_TIERS     optional tier table JSON\n\n\
COMMANDS:\n\
  create-group <jp|tw|kr|cn> [name]\n\
  server <jp|tw|kr|cn>\n\
  join <member> [nickname] [--role admin|member]\n\
  role <member> <role>\n\
  leave <member>...\n\
  nick <member> [nickname]\n\
  notify <member> <once|repeat>\n\
  status | summary | members | counts [--day D] | carry-overs\n\
  record <boss> <damage|kill> [--for M] [--cont [N]] [--yesterday] [--msg TEXT]\n\
  undo\n\
  modify <lap> <h1> <h2> <h3> <h4> <h5> [--second 0,1,0,0,0]\n\
  note <boss> [text]\n\
  claim [--lock COMMENT] | unclaim\n\
  tree <boss> [msg] | untree | trees [boss]\n\
  reserve <boss> <lap> [msg] | unreserve <boss> | reservations [boss]\n\
  attacking <boss> [msg] | done | attackers [boss]\n\
  report [--slot N|all] [--member M] [--day D]\n\
  slots | switch-slot <n> | clear-slot [n]\n\
  sl <check|set|unset>\n\
  remind [--private] <member>...\n"
    );
    std::process::exit(2);
}

fn take_flag_value(rest: &[String], flag: &str) -> Option<String> {
    let i = rest.iter().position(|a| a == flag)?;
    rest.get(i + 1).cloned()
}

fn has_flag(rest: &[String], flag: &str) -> bool {
    rest.iter().any(|a| a == flag)
}

fn parse_or_exit<T: std::str::FromStr>(s: &str) -> T {
    s.parse().unwrap_or_else(|_| usage_and_exit())
}

fn arg(rest: &[String], i: usize) -> &str {
    rest.get(i).map(String::as_str).unwrap_or_else(|| usage_and_exit())
}

fn opt_text(rest: &[String], from: usize) -> Option<String> {
    let words: Vec<&str> = rest
        .iter()
        .skip(from)
        .take_while(|a| !a.starts_with("--"))
        .map(String::as_str)
        .collect();
    if words.is_empty() {
        None
    } else {
        Some(words.join(" "))
    }
}

fn parse_server(s: &str) -> GameServer {
    GameServer::parse(s).unwrap_or_else(|| usage_and_exit())
}

fn print_json<T: Serialize>(v: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(v)?);
    Ok(())
}

/// Prints chat messages the engine would have sent.
struct StderrSink;

impl OutboundSink for StderrSink {
    async fn deliver(&mut self, msg: Outbound) -> anyhow::Result<()> {
        match msg {
            Outbound::Group { group_id, text } => eprintln!("[clan {group_id}] {text}"),
            Outbound::Private {
                member_id, text, ..
            } => eprintln!("[to {member_id}] {text}"),
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,clanbattle=info".into()),
        )
        .with_target(false)
        .with_max_level(Level::INFO)
        .with_writer(std::io::stderr)
        .init();

    let mut group: Option<GroupId> = std::env::var("CLANBATTLE_GROUP")
        .ok()
        .and_then(|v| v.trim().parse().ok());
    let mut caller: Option<MemberId> = std::env::var("CLANBATTLE_CALLER")
        .ok()
        .and_then(|v| v.trim().parse().ok());

    let mut args = std::env::args().skip(1);
    let mut cmd: Option<String> = None;
    let mut rest: Vec<String> = Vec::new();
    while let Some(a) = args.next() {
        match a.as_str() {
            "--group" => {
                let v = args.next().unwrap_or_else(|| usage_and_exit());
                group = Some(parse_or_exit(&v));
            }
            "--as" => {
                let v = args.next().unwrap_or_else(|| usage_and_exit());
                caller = Some(parse_or_exit(&v));
            }
            "-h" | "--help" => usage_and_exit(),
            _ => {
                cmd = Some(a);
                rest.extend(args);
                break;
            }
        }
    }
    let Some(cmd) = cmd else { usage_and_exit() };

    let cfg = BattleConfig::from_env().context("load config")?;
    if cfg.journal_path.is_none() {
        info!("no CLANBATTLE_JOURNAL set; changes are not kept");
    }
    let (notifier, rx) = Notifier::new(&cfg.notify);
    let delivery = rx.map(|rx| tokio::spawn(notify::delivery_task(rx, StderrSink)));
    let cb = ClanBattle::open(cfg, Arc::new(ServerClock), notifier).context("open journal")?;

    let res = run(&cb, group, caller, &cmd, &rest).await;
    drop(cb);
    if let Some(t) = delivery {
        let _ = t.await;
    }

    match res {
        Ok(()) => Ok(()),
        Err(e) => {
            let e = match e.downcast::<BattleError>() {
                Ok(be) => {
                    print_json(&serde_json::json!({ "error": be.code(), "message": be.to_string() }))?;
                    std::process::exit(1);
                }
                Err(e) => e,
            };
            Err(e)
        }
    }
}

async fn run(
    cb: &ClanBattle,
    group: Option<GroupId>,
    caller: Option<MemberId>,
    cmd: &str,
    rest: &[String],
) -> anyhow::Result<()> {
    let gid = || group.unwrap_or_else(|| usage_and_exit());
    let me = || caller.unwrap_or_else(|| usage_and_exit());

    match cmd {
        "create-group" => {
            let server = parse_server(arg(rest, 0));
            print_json(&cb.create_group(gid(), server, opt_text(rest, 1)).await?)?;
        }
        "server" => {
            let server = parse_server(arg(rest, 0));
            print_json(&cb.change_game_server(gid(), me(), server).await?)?;
        }
        "join" => {
            let member: MemberId = parse_or_exit(arg(rest, 0));
            let role = match take_flag_value(rest, "--role") {
                Some(r) => Role::parse(&r).unwrap_or_else(|| usage_and_exit()),
                None => Role::Member,
            };
            cb.bind_member(gid(), member, opt_text(rest, 1), role).await?;
            print_json(&cb.member_list(gid()).await?)?;
        }
        "role" => {
            let member: MemberId = parse_or_exit(arg(rest, 0));
            let role = Role::parse(arg(rest, 1)).unwrap_or_else(|| usage_and_exit());
            cb.set_role(gid(), me(), member, role).await?;
            print_json(&cb.member_list(gid()).await?)?;
        }
        "leave" => {
            let members: Vec<MemberId> = rest.iter().map(|m| parse_or_exit(m)).collect();
            if members.is_empty() {
                usage_and_exit();
            }
            let n = cb.drop_members(gid(), &members).await?;
            print_json(&serde_json::json!({ "dropped": n }))?;
        }
        "nick" => {
            let member: MemberId = parse_or_exit(arg(rest, 0));
            cb.set_nickname(member, opt_text(rest, 1)).await?;
            println!("{}", cb.nickname(member).await);
        }
        "notify" => {
            let member: MemberId = parse_or_exit(arg(rest, 0));
            let pref = NotifyPreference::parse(arg(rest, 1)).unwrap_or_else(|| usage_and_exit());
            cb.set_notify_preference(member, pref).await?;
        }
        "status" => print_json(&cb.boss_status(gid()).await?)?,
        "summary" => print!("{}", cb.status_summary(gid()).await?),
        "members" => print_json(&cb.member_list(gid()).await?)?,
        "counts" => {
            let day = take_flag_value(rest, "--day").map(|d| parse_or_exit(&d));
            print_json(&cb.daily_counts(gid(), day, None).await?)?;
        }
        "carry-overs" => print_json(&cb.pending_carry_overs(gid()).await?)?,
        "record" => {
            let boss: u8 = parse_or_exit(arg(rest, 0));
            let (defeat, damage) = match arg(rest, 1) {
                "kill" => (true, None),
                d => (false, Some(parse_or_exit(d))),
            };
            let continuation_seq = match rest.iter().position(|a| a == "--cont") {
                Some(i) => rest
                    .get(i + 1)
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(0),
                None => 0,
            };
            let req = ChallengeRequest {
                group_id: gid(),
                recorder: me(),
                on_behalf_of: take_flag_value(rest, "--for").map(|m| parse_or_exit(&m)),
                boss: Some(boss),
                defeat,
                damage,
                continuation: has_flag(rest, "--cont"),
                continuation_seq,
                message: take_flag_value(rest, "--msg"),
                previous_day: has_flag(rest, "--yesterday"),
            };
            let st = cb.record_challenge(req).await?;
            println!("{st}");
        }
        "undo" => println!("{}", cb.undo_last(gid(), me()).await?),
        "modify" => {
            let cycle: u32 = parse_or_exit(arg(rest, 0));
            let mut healths = [0; 5];
            for (i, h) in healths.iter_mut().enumerate() {
                *h = parse_or_exit(arg(rest, i + 1));
            }
            let mut second_circuit = [false; 5];
            if let Some(v) = take_flag_value(rest, "--second") {
                for (flag, s) in second_circuit.iter_mut().zip(v.split(',')) {
                    *flag = matches!(s.trim(), "1" | "true" | "yes");
                }
            }
            let st = cb
                .modify_state(ModifyRequest {
                    group_id: gid(),
                    caller: me(),
                    cycle: Some(cycle),
                    healths,
                    second_circuit,
                })
                .await?;
            println!("{st}");
        }
        "note" => {
            let boss: u8 = parse_or_exit(arg(rest, 0));
            print_json(&cb.commit_message(gid(), me(), boss, opt_text(rest, 1)).await?)?;
        }
        "claim" => {
            let (kind, comment) = match take_flag_value(rest, "--lock") {
                Some(c) => (LockKind::Locked, Some(c)),
                None => (LockKind::Attacking, None),
            };
            let st = cb
                .apply_claim(ClaimRequest {
                    group_id: gid(),
                    member_id: me(),
                    kind,
                    comment,
                })
                .await?;
            println!("{}", st.info);
        }
        "unclaim" => println!("{}", cb.cancel_claim(gid(), me()).await?.info),
        "tree" => {
            let boss: u8 = parse_or_exit(arg(rest, 0));
            let sid = cb.subscribe_tree_hang(gid(), me(), boss, opt_text(rest, 1)).await?;
            print_json(&serde_json::json!({ "sid": sid }))?;
        }
        "untree" => {
            let n = cb.cancel_tree_hang(gid(), me()).await?;
            print_json(&serde_json::json!({ "removed": n }))?;
        }
        "trees" => {
            let boss = rest.first().map(|b| parse_or_exit(b));
            print_json(&cb.tree_hang_list(gid(), boss).await?)?;
        }
        "reserve" => {
            let boss: u8 = parse_or_exit(arg(rest, 0));
            let lap: u32 = parse_or_exit(arg(rest, 1));
            let sid = cb
                .subscribe_lap_reservation(gid(), me(), boss, lap, opt_text(rest, 2))
                .await?;
            print_json(&serde_json::json!({ "sid": sid }))?;
        }
        "unreserve" => {
            let boss: u8 = parse_or_exit(arg(rest, 0));
            let n = cb.cancel_lap_reservation(gid(), me(), boss).await?;
            print_json(&serde_json::json!({ "removed": n }))?;
        }
        "reservations" => {
            let boss = rest.first().map(|b| parse_or_exit(b));
            print_json(&cb.lap_reservation_list(gid(), boss).await?)?;
        }
        "attacking" => {
            let boss: u8 = parse_or_exit(arg(rest, 0));
            let sid = cb.subscribe_in_progress(gid(), me(), boss, opt_text(rest, 1)).await?;
            print_json(&serde_json::json!({ "sid": sid }))?;
        }
        "done" => {
            let n = cb.cancel_in_progress(gid(), me()).await?;
            print_json(&serde_json::json!({ "removed": n }))?;
        }
        "attackers" => {
            let boss = rest.first().map(|b| parse_or_exit(b));
            print_json(&cb.in_progress_list(gid(), boss).await?)?;
        }
        "report" => {
            let slot = match take_flag_value(rest, "--slot").as_deref() {
                None => ReportSlot::Current,
                Some("all") => ReportSlot::All,
                Some(n) => ReportSlot::Id(parse_or_exit(n)),
            };
            let member = take_flag_value(rest, "--member").map(|m| parse_or_exit(&m));
            let day = take_flag_value(rest, "--day").map(|d| parse_or_exit(&d));
            print_json(&*cb.ledger_report(gid(), slot, member, day).await?)?;
        }
        "slots" => print_json(&cb.slot_record_counts(gid()).await?)?,
        "switch-slot" => {
            let slot: u32 = parse_or_exit(arg(rest, 0));
            println!("{}", cb.switch_slot(gid(), me(), slot).await?);
        }
        "clear-slot" => {
            let slot = rest.first().map(|s| parse_or_exit(s));
            println!("{}", cb.clear_slot(gid(), me(), slot).await?);
        }
        "sl" => {
            let op = match arg(rest, 0) {
                "check" => SaveSlotOp::Check,
                "set" => SaveSlotOp::Set,
                "unset" => SaveSlotOp::Unset,
                _ => usage_and_exit(),
            };
            let used = cb.save_slot_toggle(gid(), me(), op).await?;
            print_json(&serde_json::json!({ "save_slot_today": used }))?;
        }
        "remind" => {
            let private = has_flag(rest, "--private");
            let members: Vec<MemberId> = rest
                .iter()
                .filter(|a| !a.starts_with("--"))
                .map(|m| parse_or_exit(m))
                .collect();
            if members.is_empty() {
                usage_and_exit();
            }
            cb.send_remind(gid(), &members, me(), private).await?;
        }
        _ => usage_and_exit(),
    }
    Ok(())
}
