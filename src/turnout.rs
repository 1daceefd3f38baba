//! Turnouts: three-sided elements with a position.
//!
//! A turnout has sides `points`, `closed` and `thrown`. A movable turnout
//! has four directions: `PC` and `CP` need the closed position, `PT` and
//! `TP` the thrown one. A request entering at the points is routed by the
//! current position; a request entering at a branch the turnout is not set
//! for is denied. Movable turnouts copy a commanded position into their
//! position bit, but only while no route or pending handshake holds the
//! turnout.
//!
//! Fixed turnouts never move and only build the two directions through
//! their live branch. Requests arriving on the dead branch are always
//! denied.

use crate::error::{BuildError, Result};
use crate::route::{
    answer_reset_rules, clear_rules, direction_rules, seen_rules, Direction, OccupancyModel,
};
use crate::rule::{Automaton, Phase, Rule, RuleSet};
use crate::topology::{Element, ElementId, ElementKind, ElementParts, InterfaceId, Layout};
use crate::variable::VarId;

/// Addresses reserved per turnout.
pub const TURNOUT_BITS: u32 = 48;

const POINTS: usize = 0;
const CLOSED: usize = 1;
const THROWN: usize = 2;

/// Turnout position.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Position {
    /// Straight through.
    #[default]
    Closed,
    /// Diverging.
    Thrown,
}

impl Position {
    /// Value of the position bit (0 closed, 1 thrown).
    pub fn bit(self) -> bool {
        matches!(self, Position::Thrown)
    }

    /// Inverse of [`bit`](Self::bit).
    pub fn from_bit(bit: bool) -> Self {
        if bit {
            Position::Thrown
        } else {
            Position::Closed
        }
    }
}

/// External bits of a turnout motor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Magnet {
    /// Wanted position, written by operators and schedules.
    pub command: VarId,
    /// Position the motor was last driven to.
    pub current: VarId,
}

/// Turnout variants.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TurnoutKind {
    /// Permanently set.
    Fixed(Position),
    /// Driven by a magnet.
    Movable(Magnet),
}

impl TurnoutKind {
    /// Exit interface for a train entering at `from`.
    ///
    /// `sides` are the turnout's interfaces in `points, closed, thrown`
    /// order. Branches lead to the points, except the dead branch of a
    /// fixed turnout. From the points only a fixed turnout can answer.
    pub fn other_side(&self, sides: &[InterfaceId], from: InterfaceId) -> Option<InterfaceId> {
        match self {
            TurnoutKind::Fixed(position) => {
                let live = sides[live_side(*position)];
                if from == sides[POINTS] {
                    Some(live)
                } else if from == live {
                    Some(sides[POINTS])
                } else {
                    None
                }
            }
            TurnoutKind::Movable(_) => {
                (from == sides[CLOSED] || from == sides[THROWN]).then_some(sides[POINTS])
            }
        }
    }
}

fn live_side(position: Position) -> usize {
    match position {
        Position::Closed => CLOSED,
        Position::Thrown => THROWN,
    }
}

fn dead_side(position: Position) -> usize {
    match position {
        Position::Closed => THROWN,
        Position::Thrown => CLOSED,
    }
}

impl Layout {
    fn add_turnout(&mut self, name: &str, kind: TurnoutKind) -> Result<ElementId> {
        self.insert_element(
            name,
            ElementKind::Turnout(kind),
            TURNOUT_BITS,
            &["points", "closed", "thrown"],
            |alloc, sides| {
                let occupancy = alloc.allocate("simulated_occ")?;
                let seen_train_in_next = Some(alloc.allocate("tmp_seen_train_in_next")?);
                let all = [
                    ("PC", POINTS, CLOSED, Position::Closed),
                    ("PT", POINTS, THROWN, Position::Thrown),
                    ("CP", CLOSED, POINTS, Position::Closed),
                    ("TP", THROWN, POINTS, Position::Thrown),
                ];
                let mut directions = Vec::with_capacity(all.len());
                for (label, from, to, position) in all {
                    let needs = match kind {
                        TurnoutKind::Fixed(fixed) if fixed != position => continue,
                        TurnoutKind::Fixed(_) => None,
                        TurnoutKind::Movable(_) => Some(position),
                    };
                    directions.push(Direction {
                        from: sides[from],
                        to: sides[to],
                        route: alloc.allocate(&format!("route_set_{}", label))?,
                        pending: alloc.allocate(&format!("route_pending_{}", label))?,
                        position: needs,
                    });
                }
                let (position, any_route_set) = match kind {
                    TurnoutKind::Fixed(_) => (None, None),
                    TurnoutKind::Movable(_) => (
                        Some(alloc.allocate("turnout_state")?),
                        Some(alloc.allocate("any_route_set")?),
                    ),
                };
                Ok(ElementParts {
                    occupancy,
                    seen_train_in_next,
                    helper: None,
                    directions,
                    position,
                    any_route_set,
                })
            },
        )
    }

    /// Adds a turnout that never moves.
    pub fn add_fixed_turnout(&mut self, name: &str, position: Position) -> Result<ElementId> {
        self.add_turnout(name, TurnoutKind::Fixed(position))
    }

    /// Adds a turnout driven by `magnet`.
    pub fn add_movable_turnout(&mut self, name: &str, magnet: Magnet) -> Result<ElementId> {
        self.add_turnout(name, TurnoutKind::Movable(magnet))
    }

    fn turnout_side(&self, id: ElementId, index: usize) -> Result<InterfaceId> {
        let element = self.element(id)?;
        match element.kind {
            ElementKind::Turnout(_) => Ok(element.sides[index]),
            _ => Err(BuildError::NotTurnout(element.name.clone())),
        }
    }

    /// The points side of a turnout.
    pub fn side_points(&self, id: ElementId) -> Result<InterfaceId> {
        self.turnout_side(id, POINTS)
    }

    /// The straight-through branch of a turnout.
    pub fn side_closed(&self, id: ElementId) -> Result<InterfaceId> {
        self.turnout_side(id, CLOSED)
    }

    /// The diverging branch of a turnout.
    pub fn side_thrown(&self, id: ElementId) -> Result<InterfaceId> {
        self.turnout_side(id, THROWN)
    }
}

/// `any_route_set` follows the OR of every route and pending bit.
fn any_route_rules(element: &Element, any: VarId) -> Vec<Rule> {
    let held: Vec<VarId> = element.route_bits().chain(element.pending_bits()).collect();
    let mut rules: Vec<Rule> = held
        .iter()
        .map(|&bit| Rule::new().when(bit, true).when(any, false).set(any, true))
        .collect();
    rules.push(
        Rule::new()
            .when_all(held.iter().copied(), false)
            .when(any, true)
            .set(any, false),
    );
    rules
}

/// Standing denial for requests arriving on the dead branch.
fn dead_branch_rules(layout: &Layout, element: &Element, fixed: Position) -> Vec<Rule> {
    let Some(upstream) = layout.binding(element.sides[dead_side(fixed)]) else {
        return Vec::new();
    };
    let up = layout.interface(upstream);
    let mut rules = vec![Rule::new()
        .when(up.req, true)
        .when(up.granted, false)
        .when(up.denied, false)
        .set(up.denied, true)];
    rules.extend(answer_reset_rules(up.req, up.granted, up.denied, up.released));
    rules
}

fn magnet_rules(position: VarId, any: VarId, magnet: Magnet) -> Vec<Rule> {
    vec![
        Rule::new()
            .when(any, false)
            .when(magnet.command, true)
            .when(position, false)
            .set(position, true),
        Rule::new()
            .when(any, false)
            .when(magnet.command, false)
            .when(position, true)
            .set(position, false),
        Rule::new()
            .when(position, true)
            .when(magnet.current, false)
            .set(magnet.current, true),
        Rule::new()
            .when(position, false)
            .when(magnet.current, true)
            .set(magnet.current, false),
    ]
}

/// Compiles the automaton of a turnout.
pub(crate) fn turnout_automaton(
    layout: &Layout,
    element: &Element,
    kind: &TurnoutKind,
) -> Result<Automaton> {
    let model = OccupancyModel::Simulated;
    let mut rules = RuleSet::new(&element.name);
    rules.contribute(Phase::DetectorProxy, seen_rules(layout, element, model)?);
    rules.contribute(Phase::Clear, clear_rules(element, model)?);
    for index in 0..element.directions.len() {
        rules.contribute(Phase::Route, direction_rules(layout, element, index, model)?);
    }
    match *kind {
        TurnoutKind::Fixed(fixed) => {
            rules.contribute(Phase::Route, dead_branch_rules(layout, element, fixed));
        }
        TurnoutKind::Movable(magnet) => {
            let missing = || BuildError::NotTurnout(element.name.clone());
            let position = element.position.ok_or_else(missing)?;
            let any = element.any_route_set.ok_or_else(missing)?;
            rules.contribute(Phase::Aggregate, any_route_rules(element, any));
            rules.contribute(Phase::CopyState, magnet_rules(position, any, magnet));
        }
    }
    Ok(rules.build())
}

// ============================================================================
// Tests
// ============================================================================
