//! Runs a single synod node as its own process: joins (or seeds) a cluster over a
//! deterministic, virtual-time [SimNetwork](synod::network::SimNetwork), then drives a toy
//! running-total state machine from stdin.

use std::fs::File;
use std::io::BufRead;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use arrrg::CommandLine;
use arrrg_derive::CommandLine;
use biometrics::{Collector, Counter, PlainTextEmitter};
use indicio::stdio::StdioEmitter;
use indicio::{clue, ALWAYS, INFO};

use synod::address::Address;
use synod::logging::COLLECTOR;
use synod::member::Member;
use synod::network::SimNetwork;

static DEMO_INVOCATIONS: Counter = Counter::new("synod.demo.invocations");

#[derive(CommandLine, Debug, Default, Eq, PartialEq)]
struct Options {
    #[arrrg(optional, "Comma-separated peer addresses to join (addr:<hex>).")]
    peers: Option<String>,
    #[arrrg(optional, "This node's own address; a fresh one is generated if omitted.")]
    listen: Option<String>,
    #[arrrg(optional, "Found a brand-new cluster with this running total as its seed state.")]
    seed: Option<i64>,
    #[arrrg(optional, "Network PRNG seed, for reproducible jitter/loss.")]
    network_seed: u64,
}

/// A running total: `input` is an 8-byte little-endian `i64` delta, `state` is the current
/// total, `output` echoes the total right after applying the delta.
fn running_total(state: &[u8], input: &[u8]) -> (Vec<u8>, Vec<u8>) {
    let total = i64::from_le_bytes(state.try_into().unwrap_or([0; 8]));
    let delta = i64::from_le_bytes(input.try_into().unwrap_or([0; 8]));
    let next = total + delta;
    (next.to_le_bytes().to_vec(), next.to_le_bytes().to_vec())
}

fn main() {
    let (options, free) = Options::from_command_line("Usage: synod-demo [OPTIONS]");
    if !free.is_empty() {
        eprintln!("command takes no arguments");
        std::process::exit(1);
    }

    let emitter = Arc::new(StdioEmitter);
    COLLECTOR.register(emitter);
    COLLECTOR.set_verbosity(INFO);
    clue!(COLLECTOR, ALWAYS, {
        new_process: format!("{:?}", std::env::args().collect::<Vec<String>>()),
    });

    std::thread::spawn(|| {
        let collector = Collector::new();
        collector.register_counter(&DEMO_INVOCATIONS);
        synod::metrics::register_biometrics(&collector);
        let fout = File::create("/dev/stdout").expect("stdout should be writable");
        let mut emitter = PlainTextEmitter::new(fout);
        loop {
            let now = SystemTime::now()
                .duration_since(SystemTime::UNIX_EPOCH)
                .map(|d| d.as_millis() as u64)
                .unwrap_or(0);
            if let Err(e) = collector.emit(&mut emitter, now) {
                eprintln!("metrics emit failed: {e:?}");
            }
            std::thread::sleep(Duration::from_millis(250));
        }
    });

    let peers: Vec<Address> = options
        .peers
        .as_deref()
        .unwrap_or("")
        .split(',')
        .filter(|s| !s.is_empty())
        .map(|s| Address::parse(s).unwrap_or_else(|e| panic!("invalid peer address: {s}: {e}")))
        .collect();
    let listen = options
        .listen
        .as_deref()
        .map(|s| Address::parse(s).unwrap_or_else(|e| panic!("invalid --listen address: {s}: {e}")));

    let network = SimNetwork::new(options.network_seed);
    let member = if let Some(seed) = options.seed {
        Member::new_seed(
            std::rc::Rc::new(running_total as fn(&[u8], &[u8]) -> (Vec<u8>, Vec<u8>)),
            network,
            peers,
            seed.to_le_bytes().to_vec(),
            listen,
        )
    } else {
        Member::new(
            std::rc::Rc::new(running_total as fn(&[u8], &[u8]) -> (Vec<u8>, Vec<u8>)),
            network,
            peers,
            listen,
        )
    };
    clue!(COLLECTOR, ALWAYS, { node: format!("{:?}", member.address()), event: "starting" });
    member.start();

    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(_) => break,
        };
        let delta: i64 = match line.trim().parse() {
            Ok(delta) => delta,
            Err(_) => {
                eprintln!("expected an integer delta, got: {line:?}");
                continue;
            }
        };
        DEMO_INVOCATIONS.click();
        let output = member.invoke(delta.to_le_bytes().to_vec());
        let total = i64::from_le_bytes(output.try_into().unwrap_or([0; 8]));
        println!("{total}");
    }
}
