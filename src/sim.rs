//! Reference runtime for compiled programs.
//!
//! The [`Simulator`] stands in for the bus and the boards: it keeps one bit
//! per variable and evaluates every automaton once per cycle, in program
//! order (or reversed). Within an automaton rules run top to bottom and
//! every write is visible to the rules and automata evaluated after it.
//!
//! ```rust
//! use rs_interlock::{Config, Layout, Program, Simulator};
//!
//! let config = Config::default();
//! let mut layout = Layout::new(&config);
//! let det = layout.external("det").unwrap();
//! layout.add_detector("d", det).unwrap();
//!
//! let program = Program::build(&layout, &[]).unwrap();
//! let mut sim = Simulator::new(&program, &config.sim);
//! sim.set(det, true);
//! assert!(sim.settle());
//! assert!(sim.get(det));
//! ```

use log::{trace, warn};

use crate::config::SimConfig;
use crate::program::Program;
use crate::rule::{Act, Automaton, Cond, Rule, StateId};
use crate::variable::VarId;

/// Cycle-based evaluator over a compiled program.
#[derive(Clone, Debug)]
pub struct Simulator {
    automata: Vec<Automaton>,
    states: Vec<StateId>,
    timers: Vec<u8>,
    values: Vec<bool>,
    order: Vec<usize>,
    max_settle_cycles: u32,
    cycles: u64,
}

impl Simulator {
    /// Loads a program with every variable at 0 and every automaton in
    /// its init state.
    pub fn new(program: &Program, config: &SimConfig) -> Self {
        let n = program.automata().len();
        let mut order: Vec<usize> = (0..n).collect();
        if config.reverse_order {
            order.reverse();
        }
        Self {
            automata: program.automata().to_vec(),
            states: vec![StateId::INIT; n],
            timers: vec![0; n],
            values: vec![false; program.vars().span()],
            order,
            max_settle_cycles: config.max_settle_cycles,
            cycles: 0,
        }
    }

    /// Writes a variable from outside (a sensor, an operator).
    pub fn set(&mut self, var: VarId, value: bool) {
        self.values[var.index()] = value;
    }

    /// Reads a variable.
    pub fn get(&self, var: VarId) -> bool {
        self.values[var.index()]
    }

    /// State register of the named automaton.
    pub fn state(&self, automaton: &str) -> Option<StateId> {
        self.automata
            .iter()
            .position(|a| a.name == automaton)
            .map(|i| self.states[i])
    }

    /// Full cycles evaluated so far.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Evaluates every automaton once. Returns true if anything changed.
    pub fn step(&mut self) -> bool {
        let mut changed = false;
        for k in 0..self.order.len() {
            let i = self.order[k];
            changed |= self.evaluate(i);
        }
        self.cycles += 1;
        changed
    }

    /// Runs a fixed number of cycles.
    pub fn run(&mut self, cycles: u32) {
        for _ in 0..cycles {
            self.step();
        }
    }

    /// Steps until a full cycle changes nothing, at most
    /// `max_settle_cycles` times. Returns false if the bound was hit.
    pub fn settle(&mut self) -> bool {
        for _ in 0..self.max_settle_cycles {
            if !self.step() {
                return true;
            }
        }
        warn!(
            "program did not settle within {} cycles",
            self.max_settle_cycles
        );
        false
    }

    fn evaluate(&mut self, i: usize) -> bool {
        let mut changed = false;
        if self.timers[i] > 0 {
            self.timers[i] -= 1;
            changed = true;
        }
        for r in 0..self.automata[i].rules.len() {
            if !self.holds(i, &self.automata[i].rules[r]) {
                continue;
            }
            for a in 0..self.automata[i].rules[r].actions.len() {
                let act = self.automata[i].rules[r].actions[a];
                match act {
                    Act::Set(var, value) => {
                        if self.values[var.index()] != value {
                            trace!("{}: {} := {}", self.automata[i].name, var, value);
                            self.values[var.index()] = value;
                            changed = true;
                        }
                    }
                    Act::State(state) => {
                        if self.states[i] != state {
                            self.states[i] = state;
                            changed = true;
                        }
                    }
                    Act::LoadTimer(cycles) => self.timers[i] = cycles,
                }
            }
        }
        changed
    }

    fn holds(&self, i: usize, rule: &Rule) -> bool {
        rule.conditions.iter().all(|cond| match *cond {
            Cond::Var(var, value) => self.values[var.index()] == value,
            Cond::State(state) => self.states[i] == state,
            Cond::NotState(state) => self.states[i] != state,
            Cond::TimerExpired => self.timers[i] == 0,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
