//! Condition/action rules and their priority-ordered composition.
//!
//! Every automaton body is a flat list of [`Rule`]s. A rule fires when all of
//! its conditions hold and then applies its actions in order; later rules in
//! the same pass observe those writes. Track elements never build one big
//! body directly. They contribute rules tagged with a [`Phase`], and
//! [`RuleSet::build`] concatenates the contributions in phase order.
//!
//! # Phases
//!
//! Phase order is what makes a local rule set correct: occupancy is
//! recomputed before the route checks consume it, and the any-route
//! aggregate is computed after all direction rules have run.
//!
//! ```rust
//! use rs_interlock::rule::{Act, Cond, Phase, Rule, RuleSet};
//! use rs_interlock::variable::VarId;
//!
//! let occ = VarId(0);
//! let route = VarId(1);
//!
//! let mut rules = RuleSet::new("t1");
//! rules.contribute(Phase::Route, vec![Rule::new().when(occ, false).set(route, true)]);
//! rules.contribute(Phase::Occupancy, vec![Rule::new().when(route, true).set(occ, true)]);
//!
//! let automaton = rules.build();
//! // Occupancy rules come first regardless of registration order, and the
//! // implicit init rule comes last.
//! assert_eq!(automaton.rules[0].actions, vec![Act::Set(occ, true)]);
//! assert_eq!(automaton.rules.len(), 3);
//! assert!(automaton.rules[2].conditions.contains(&Cond::State(rs_interlock::rule::StateId::INIT)));
//! ```

use core::fmt;

use crate::variable::VarId;

/// Logical evaluation phase of a rule contribution, in execution order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Phase {
    /// Occupancy computation (real, simulated, debounced).
    Occupancy = 0,
    /// Occupancy copied from a neighbor and the seen-train latches.
    DetectorProxy = 1,
    /// Clearing of stale occupancy once no route is held.
    Clear = 2,
    /// Route reservation handshake.
    Route = 3,
    /// Aggregates derived from the direction bits.
    Aggregate = 4,
    /// Train schedule and permission server state machines.
    Schedule = 5,
    /// Position bits copied to and from magnet drivers.
    CopyState = 6,
    /// Leaving the power-on state.
    Init = 7,
}

impl Phase {
    /// All phases in evaluation order.
    pub const ALL: [Phase; 8] = [
        Phase::Occupancy,
        Phase::DetectorProxy,
        Phase::Clear,
        Phase::Route,
        Phase::Aggregate,
        Phase::Schedule,
        Phase::CopyState,
        Phase::Init,
    ];
}

/// Value of an automaton's local state register.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct StateId(pub u8);

impl StateId {
    /// Power-on state. No volatile state survives a restart.
    pub const INIT: StateId = StateId(0);
    /// Idle state entered after init.
    pub const BASE: StateId = StateId(1);
}

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S{}", self.0)
    }
}

/// A single rule condition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Cond {
    /// Variable equals the given value.
    Var(VarId, bool),
    /// Local state register equals the given state.
    State(StateId),
    /// Local state register differs from the given state.
    NotState(StateId),
    /// The local countdown timer reached zero.
    TimerExpired,
}

/// A single rule action.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Act {
    /// Write a variable.
    Set(VarId, bool),
    /// Move the local state register.
    State(StateId),
    /// Restart the local countdown timer with the given number of cycles.
    LoadTimer(u8),
}

/// A conjunction of conditions guarding an ordered list of actions.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Rule {
    /// All must hold for the rule to fire.
    pub conditions: Vec<Cond>,
    /// Applied in order when the rule fires.
    pub actions: Vec<Act>,
}

impl Rule {
    /// An empty rule (always fires, does nothing).
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a variable condition.
    pub fn when(mut self, var: VarId, value: bool) -> Self {
        self.conditions.push(Cond::Var(var, value));
        self
    }

    /// Adds several variable conditions that must all equal `value`.
    pub fn when_all(mut self, vars: impl IntoIterator<Item = VarId>, value: bool) -> Self {
        self.conditions
            .extend(vars.into_iter().map(|v| Cond::Var(v, value)));
        self
    }

    /// Requires the state register to hold `state`.
    pub fn in_state(mut self, state: StateId) -> Self {
        self.conditions.push(Cond::State(state));
        self
    }

    /// Requires the state register to differ from `state`.
    pub fn not_in_state(mut self, state: StateId) -> Self {
        self.conditions.push(Cond::NotState(state));
        self
    }

    /// Requires the timer to have expired.
    pub fn timer_expired(mut self) -> Self {
        self.conditions.push(Cond::TimerExpired);
        self
    }

    /// Appends an arbitrary condition.
    pub fn cond(mut self, cond: Cond) -> Self {
        self.conditions.push(cond);
        self
    }

    /// Adds a variable write.
    pub fn set(mut self, var: VarId, value: bool) -> Self {
        self.actions.push(Act::Set(var, value));
        self
    }

    /// Adds a state transition.
    pub fn goto(mut self, state: StateId) -> Self {
        self.actions.push(Act::State(state));
        self
    }

    /// Adds a timer restart.
    pub fn load_timer(mut self, cycles: u8) -> Self {
        self.actions.push(Act::LoadTimer(cycles));
        self
    }

    /// Variables this rule reads.
    pub fn reads(&self) -> impl Iterator<Item = VarId> + '_ {
        self.conditions.iter().filter_map(|c| match c {
            Cond::Var(v, _) => Some(*v),
            _ => None,
        })
    }

    /// Variables this rule writes.
    pub fn writes(&self) -> impl Iterator<Item = VarId> + '_ {
        self.actions.iter().filter_map(|a| match a {
            Act::Set(v, _) => Some(*v),
            _ => None,
        })
    }
}

/// One compiled automaton: a name and its ordered rule body.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Automaton {
    /// Unique automaton name (usually the element name).
    pub name: String,
    /// Rules in execution order.
    pub rules: Vec<Rule>,
}

/// Collects phase-tagged rule contributions for a single automaton.
#[derive(Clone, Debug)]
pub struct RuleSet {
    name: String,
    contributions: Vec<(Phase, Vec<Rule>)>,
}

impl RuleSet {
    /// Starts an empty rule set.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            contributions: Vec::new(),
        }
    }

    /// Name of the automaton being built.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registers rules for a phase. Equal phases keep registration order.
    pub fn contribute(&mut self, phase: Phase, rules: Vec<Rule>) {
        if !rules.is_empty() {
            self.contributions.push((phase, rules));
        }
    }

    /// Registers a single rule.
    pub fn push(&mut self, phase: Phase, rule: Rule) {
        self.contributions.push((phase, vec![rule]));
    }

    /// Number of rules contributed so far.
    pub fn len(&self) -> usize {
        self.contributions.iter().map(|(_, r)| r.len()).sum()
    }

    /// Returns true if nothing was contributed.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Concatenates contributions in phase order and appends the init rule.
    pub fn build(mut self) -> Automaton {
        self.contributions.push((
            Phase::Init,
            vec![Rule::new().in_state(StateId::INIT).goto(StateId::BASE)],
        ));
        // Stable: equal phases stay in registration order.
        self.contributions.sort_by_key(|(phase, _)| *phase);
        Automaton {
            name: self.name,
            rules: self
                .contributions
                .into_iter()
                .flat_map(|(_, rules)| rules)
                .collect(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn marker(n: u32) -> Rule {
        Rule::new().set(VarId(n), true)
    }

    #[test]
    fn phases_are_totally_ordered() {
        for pair in Phase::ALL.windows(2) {
            assert!(pair[0] < pair[1]);
        }
    }

    #[test]
    fn build_orders_by_phase() {
        let mut rs = RuleSet::new("x");
        rs.push(Phase::Aggregate, marker(3));
        rs.push(Phase::Occupancy, marker(1));
        rs.push(Phase::Route, marker(2));
        let aut = rs.build();
        let firsts: Vec<_> = aut.rules.iter().map(|r| r.actions[0]).collect();
        assert_eq!(
            firsts,
            vec![
                Act::Set(VarId(1), true),
                Act::Set(VarId(2), true),
                Act::Set(VarId(3), true),
                Act::State(StateId::BASE),
            ]
        );
    }

    #[test]
    fn equal_phase_keeps_registration_order() {
        let mut rs = RuleSet::new("x");
        rs.push(Phase::Route, marker(7));
        rs.push(Phase::Route, marker(5));
        let aut = rs.build();
        assert_eq!(aut.rules[0].actions[0], Act::Set(VarId(7), true));
        assert_eq!(aut.rules[1].actions[0], Act::Set(VarId(5), true));
    }

    #[test]
    fn empty_contributions_are_skipped() {
        let mut rs = RuleSet::new("x");
        rs.contribute(Phase::Route, Vec::new());
        assert!(rs.is_empty());
        assert_eq!(rs.build().rules.len(), 1);
    }

    #[test]
    fn reads_and_writes() {
        let r = Rule::new()
            .when(VarId(1), true)
            .in_state(StateId::BASE)
            .set(VarId(2), false)
            .goto(StateId(4));
        assert_eq!(r.reads().collect::<Vec<_>>(), vec![VarId(1)]);
        assert_eq!(r.writes().collect::<Vec<_>>(), vec![VarId(2)]);
    }
}
