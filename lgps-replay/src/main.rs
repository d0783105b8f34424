mod trace;

use std::{
    collections::HashMap,
    env, fs,
    io::{self, BufRead},
};

use color_eyre::eyre;
use dialoguer::Input;
use lgps::VirtualTimeSimulator;
use tracing::{trace, warn};

use trace::parse_line;

/// Per-flow state the core asks its caller to maintain: the virtual time at
/// which the flow's last packet is expected to depart.
type FlowState = HashMap<u64, f64>;

fn main() -> eyre::Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt::try_init().map_err(|e| eyre::eyre!(e))?;

    let mut sim = VirtualTimeSimulator::new();
    let mut flows = FlowState::new();

    match env::args().nth(1) {
        Some(path) => replay_file(&mut sim, &mut flows, &path),
        None => repl(&mut sim, &mut flows),
    }
}

/// Replay every line of a trace file in one pass, printing each packet's
/// expected departure virtual time as it's computed.
fn replay_file(
    sim: &mut VirtualTimeSimulator,
    flows: &mut FlowState,
    path: &str,
) -> eyre::Result<()> {
    let file = fs::File::open(path)?;

    for (lineno, line) in io::BufReader::new(file).lines().enumerate() {
        let line = line?;

        match parse_line(&line) {
            Ok(None) => continue,
            Ok(Some(record)) => {
                let depart = handle(sim, flows, record);
                println!(
                    "flow {} packet departs at v_time {depart}",
                    record.flow_id
                );
            }
            Err(e) => warn!(lineno, error = %e, "skipping malformed trace line"),
        }
    }

    Ok(())
}

/// Interactive REPL: one trace line (or `/quit`) per prompt.
fn repl(sim: &mut VirtualTimeSimulator, flows: &mut FlowState) -> eyre::Result<()> {
    loop {
        let input: String = Input::new().interact()?;

        if input.trim() == "/quit" {
            return Ok(());
        }

        match parse_line(&input) {
            Ok(None) => continue,
            Ok(Some(record)) => {
                let depart = handle(sim, flows, record);
                println!(
                    " :: flow {} packet departs at v_time {depart}",
                    record.flow_id
                );
            }
            Err(e) => println!(" :: malformed trace line: {e}"),
        }
    }
}

/// Drive one packet arrival through the simulator, returning the expected
/// departure virtual time.
fn handle(
    sim: &mut VirtualTimeSimulator,
    flows: &mut FlowState,
    record: trace::PacketRecord,
) -> f64 {
    let last_depart = flows.entry(record.flow_id).or_insert(0.0);

    let depart = sim.handle_arrival(record.arrival_time, record.length, record.weight, last_depart);

    trace!(flow_id = record.flow_id, depart, "packet arrival replayed");

    depart
}
