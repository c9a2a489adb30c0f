//! Dissect every packet of a recorded trace and print the result as JSON.
//!
//! Usage: dissect_trace [--grammars DIR] [--limit N] [--all] [--prune-zero] TRACE.json
//!
//! Grammars default to `grammars/`; at most 100 packets are decoded unless `--limit`
//! or `--all` says otherwise. Set `RUST_LOG=debug` to see rejected alternatives.

use anyhow::{bail, Context};
use protodissect::{dissect_trace, DissectedPacket, GrammarSet, Trace, TraceOptions};
use serde::Serialize;
use std::path::PathBuf;
use tracing::info;

#[derive(Serialize)]
struct Report<'a> {
    host: &'a str,
    scenario: &'a str,
    grammars: Vec<&'a str>,
    packets: Vec<DissectedPacket>,
}

fn take_value(args: &mut Vec<String>, flag: &str) -> anyhow::Result<Option<String>> {
    match args.iter().position(|a| a == flag) {
        Some(pos) => {
            args.remove(pos);
            if pos >= args.len() {
                bail!("{} needs a value", flag);
            }
            Ok(Some(args.remove(pos)))
        }
        None => Ok(None),
    }
}

fn take_flag(args: &mut Vec<String>, flag: &str) -> bool {
    match args.iter().position(|a| a == flag) {
        Some(pos) => {
            args.remove(pos);
            true
        }
        None => false,
    }
}

fn main() -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let mut raw_args: Vec<String> = std::env::args().skip(1).collect();
    let grammar_dir = take_value(&mut raw_args, "--grammars")?
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("grammars"));
    let limit = take_value(&mut raw_args, "--limit")?
        .map(|s| s.parse::<usize>().with_context(|| format!("invalid --limit {:?}", s)))
        .transpose()?;
    let all = take_flag(&mut raw_args, "--all");
    let prune_zero = take_flag(&mut raw_args, "--prune-zero");
    let trace_path = match raw_args.as_slice() {
        [path] => PathBuf::from(path),
        _ => bail!("usage: dissect_trace [--grammars DIR] [--limit N] [--all] [--prune-zero] TRACE.json"),
    };

    let grammars = GrammarSet::load_dir(&grammar_dir)
        .with_context(|| format!("loading grammars from {}", grammar_dir.display()))?;
    if grammars.is_empty() {
        bail!("no *.yaml grammar in {}", grammar_dir.display());
    }
    let trace = Trace::load(&trace_path).with_context(|| format!("reading {}", trace_path.display()))?;

    let mut options = TraceOptions::default();
    if all {
        options.packet_limit = None;
    } else if limit.is_some() {
        options.packet_limit = limit;
    }
    options.dissector.prune_zero_triggered = prune_zero;

    let packets = dissect_trace(&trace, &grammars, &options);
    let decoded = packets.iter().filter(|p| p.tree().is_some()).count();
    info!(host = %trace.host, packets = packets.len(), decoded, "trace dissected");

    let report = Report {
        host: &trace.host,
        scenario: &trace.scenario,
        grammars: grammars.ids().collect(),
        packets,
    };
    let stdout = std::io::stdout();
    serde_json::to_writer_pretty(stdout.lock(), &report)?;
    println!();
    Ok(())
}
