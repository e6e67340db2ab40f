//! The CLI for world-observer
//!
//! Use cases:
//! $ world-observer <dump_path> 1 <replay_time_scale>   # replay a capture
//! $ world-observer <dump_path> 0                        # live capture to dump

use std::fs::File;
use std::io::BufReader;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use world_observer::pipeline::{replay_into_pipeline, Pipeline};

#[derive(Parser)]
#[command(name = "world-observer", version, about = "Passive UDP world-state observer")]
struct Args {
    /// Dump file: read from in replay mode, written to in live mode.
    dump_path: String,

    /// 0 = live capture mode, 1 = replay mode.
    dump_mode: u8,

    /// Replay speed relative to recorded wall-clock time; 0 disables pacing.
    #[arg(default_value_t = 1.0)]
    replay_time_scale: f64,
}

fn main() {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let args = Args::parse();

    match args.dump_mode {
        1 => cmd_replay(&args),
        0 => cmd_live(&args),
        other => {
            eprintln!("unknown dump_mode {other}, expected 0 (live) or 1 (replay)");
            std::process::exit(1);
        }
    }
}

fn cmd_replay(args: &Args) {
    let file = match File::open(&args.dump_path) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("failed to open dump file {}: {e}", args.dump_path);
            std::process::exit(1);
        }
    };

    info!(path = %args.dump_path, scale = args.replay_time_scale, "starting replay");
    let mut pipeline = Pipeline::new(true);
    if let Err(e) = replay_into_pipeline(BufReader::new(file), "replay", "replay", args.replay_time_scale, &mut pipeline) {
        eprintln!("replay failed: {e}");
        std::process::exit(1);
    }

    if let Some(session) = pipeline.tracker().session() {
        let map = session.world.map();
        println!("observers: {}, loot: {}", map.observer_count(), map.loot_count());
    }
}

fn cmd_live(_args: &Args) {
    // Live capture is provided by an external capture adapter (§6's "Capture
    // Adapter" contract); this CLI is a thin shell over the pipeline and
    // does not itself bind a socket or NIC handle.
    eprintln!("live capture requires an external capture adapter feeding world_observer::pipeline::Pipeline::process_record");
    std::process::exit(1);
}
