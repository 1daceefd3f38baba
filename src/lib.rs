//! # rs-interlock
//!
//! An interlocking logic compiler for model railroads. A layout is declared
//! as a graph of track elements; the compiler turns it into one small
//! condition/action automaton per element, which distributed boards evaluate
//! cyclically against shared boolean variables on a bus.
//!
//! ## Features
//!
//! - **Route reservation**: a four-phase request/grant/deny/release handshake
//!   running hop by hop between neighboring elements
//! - **Occupancy**: real detectors, debounced raw sensors and simulated
//!   occupancy for pieces without a sensor
//! - **Turnouts**: fixed and magnet-driven, never moved under a reservation
//! - **Signals and blocks**: aspects derived from operator intent, route and
//!   downstream occupancy
//! - **Schedules**: per-train state machines walking block transitions, with
//!   round-robin permission servers for shared single track
//!
//! ## Architecture
//!
//! - `variable` - bit-space allocator and event ids
//! - `rule` - rules, phases and per-automaton composition
//! - `topology` - the element arena, binding and detector lookup
//! - `route` - the shared handshake rule generator
//! - `track`, `turnout`, `block` - element variants
//! - `flipflop`, `schedule` - automata layered on top of a layout
//! - `program` - the compile entry point and emitters
//! - `sim` - a reference runtime used by tests and the demo
//!
//! ## Example
//!
//! ```rust
//! use rs_interlock::{Block, Config, Layout, Program, Simulator};
//!
//! let config = Config::default();
//! let mut layout = Layout::new(&config);
//! let b1 = Block::new(&mut layout, "B1").unwrap();
//! let b2 = Block::new(&mut layout, "B2").unwrap();
//! layout.bind_sequence(&[&b1, &b2]).unwrap();
//!
//! let program = Program::build(&layout, &[]).unwrap();
//! let mut sim = Simulator::new(&program, &config.sim);
//!
//! // Ask for the exit signal of B1: the route into B2 is reserved and the
//! // signal shows proceed.
//! sim.set(b1.request_green(), true);
//! sim.settle();
//! assert!(sim.get(b1.route_out(&layout).unwrap()));
//! assert!(sim.get(b1.signal()));
//! ```

#![warn(missing_docs)]

/// Signalled blocks: approach, detector and signal.
pub mod block;
/// Compiler configuration.
pub mod config;
/// Build-time defects.
pub mod error;
/// Round-robin permission server.
pub mod flipflop;
/// Compiled programs and emitters.
pub mod program;
/// The route reservation handshake.
pub mod route;
/// Rules and their phase-ordered composition.
pub mod rule;
/// Per-train schedules.
pub mod schedule;
/// Reference cycle-based runtime.
pub mod sim;
/// Element arena, binding and detector lookup.
pub mod topology;
/// Straight pieces, signals and endpoints.
pub mod track;
/// Seams to collaborators.
pub mod traits;
/// Fixed and movable turnouts.
pub mod turnout;
/// Variables and the bit-space allocator.
pub mod variable;

// Re-exports for convenience
pub use block::Block;
pub use config::Config;
pub use error::{BuildError, Result};
pub use flipflop::{FlipFlop, FlipFlopClient};
pub use program::{Program, TextEmitter};
pub use route::{Direction, OccupancyModel};
pub use rule::{Act, Automaton, Cond, Phase, Rule, RuleSet, StateId};
pub use schedule::{Location, ScheduleState, TrainSchedule, Transition};
pub use sim::Simulator;
pub use topology::{Element, ElementId, ElementKind, Interface, InterfaceId, Layout, StraightRun};
pub use track::StraightKind;
pub use traits::{RuleEmitter, RuleSource};
pub use turnout::{Magnet, Position, TurnoutKind};
pub use variable::{VarId, VarTable};
