//! Compiles a small demo layout and drives one train through it.
//!
//! The layout is a single line of three blocks. A schedule moves the train
//! from `B1` to `B2` and on to `B3`, where it parks. The simulator plays
//! the part of the boards; the train itself is moved by hand whenever the
//! schedule raises `go`.
//!
//! # Usage
//!
//! ```bash
//! RUST_LOG=info cargo run --features demo --bin layout_demo
//!
//! # Print the compiled rules as well
//! cargo run --features demo --bin layout_demo -- --listing
//! ```

use log::info;
use rs_interlock::{
    Block, Config, Layout, Program, RuleSource, Simulator, TextEmitter, TrainSchedule,
};

/// Cycles the train needs to cross from one block into the next.
const TRAVEL_CYCLES: u32 = 4;

/// Upper bound on simulated cycles before the demo gives up.
const MAX_CYCLES: u64 = 2_000;

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let listing = std::env::args().any(|arg| arg == "--listing");

    let config = Config::default();
    let mut layout = Layout::new(&config);
    let blocks = [
        Block::new(&mut layout, "B1")?,
        Block::new(&mut layout, "B2")?,
        Block::new(&mut layout, "B3")?,
    ];
    layout.bind_sequence(&[&blocks[0], &blocks[1], &blocks[2]])?;

    let mut train = TrainSchedule::new(&mut layout, "train")?;
    train.add_eager_block_transition(&mut layout, &blocks[0], &blocks[1])?;
    train.add_eager_block_transition(&mut layout, &blocks[1], &blocks[2])?;
    train.stop_train_at(&mut layout, &blocks[2])?;

    let program = Program::build(&layout, &[&train as &dyn RuleSource])?;
    if listing {
        let mut text = TextEmitter::new();
        program.emit(&mut text)?;
        println!("{}", text.as_str());
    }

    let mut sim = Simulator::new(&program, &config.sim);
    let permaloc = |name: &str| train.location(name).map(|l| l.permaloc);

    // The train starts parked in B1.
    sim.set(blocks[0].detector(), true);
    if let Some(bit) = permaloc("B1") {
        sim.set(bit, true);
    }

    let mut at = 0;
    let mut travel = 0;
    while sim.cycles() < MAX_CYCLES {
        sim.step();
        if sim.get(train.go()) && at + 1 < blocks.len() {
            travel += 1;
            if travel == TRAVEL_CYCLES {
                info!("train leaves {} for {}", blocks[at].name(), blocks[at + 1].name());
                sim.set(blocks[at].detector(), false);
                sim.set(blocks[at + 1].detector(), true);
                at += 1;
                travel = 0;
            }
        }
        if at == blocks.len() - 1 && !sim.get(train.go()) && sim.settle() {
            break;
        }
    }

    for block in &blocks {
        info!(
            "{}: detector={} signal={} permaloc={}",
            block.name(),
            u8::from(sim.get(block.detector())),
            u8::from(sim.get(block.signal())),
            permaloc(block.name()).map(|bit| u8::from(sim.get(bit))).unwrap_or(0),
        );
    }
    info!("finished after {} cycles", sim.cycles());
    Ok(())
}
