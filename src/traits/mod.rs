//! Seams between the compiler and its collaborators.
//!
//! # Submodules
//!
//! - `source`: anything that contributes an automaton to a program
//! - `emitter`: the encoder turning compiled rules into a target format
//!
//! Track elements are compiled by the [`Layout`](crate::Layout) itself;
//! [`RuleSource`] covers the automata that sit on top of a layout, such as
//! permission servers and train schedules.

pub mod emitter;
pub mod source;

pub use emitter::*;
pub use source::*;
