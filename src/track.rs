//! Straight track elements, signals and endpoints.
//!
//! Every straight piece has sides `a` and `b` and two directions, `ab` and
//! `ba`. What differs between the variants is where their occupancy bit
//! comes from:
//!
//! | variant        | occupancy                                   |
//! |----------------|---------------------------------------------|
//! | `Short`        | simulated, follows the next element         |
//! | `Long`         | simulated, also ends the close-detector range |
//! | `Detector`     | an external detector bit                    |
//! | `RawDetector`  | debounced copy of a raw sensor input        |
//! | `Signal`       | copy of the element bound on side `a`       |
//!
//! Signals do not follow the generic handshake for `ab`: they originate
//! routes on the operator's (or a schedule's) `request_green` and terminate
//! requests arriving on side `a`.

use crate::error::Result;
use crate::route::{
    answer_reset_rules, clear_rules, direction_rules, release_ack_rule, seen_rules, Direction,
    OccupancyModel,
};
use crate::rule::{Automaton, Phase, Rule, RuleSet};
use crate::topology::{Element, ElementId, ElementKind, ElementParts, InterfaceId, Layout};
use crate::variable::{ScopedAllocator, VarId};

/// Addresses reserved per straight element.
pub const STRAIGHT_BITS: u32 = 32;

/// Addresses reserved per endpoint.
pub const ENDPOINT_BITS: u32 = 16;

/// Straight element variants.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StraightKind {
    /// Shorter than any train.
    Short,
    /// Longer than any train.
    Long,
    /// Watched by a physical detector.
    Detector {
        /// External occupancy bit.
        detector: VarId,
    },
    /// Watched by a bouncing sensor that needs filtering.
    RawDetector {
        /// External raw sensor bit.
        raw: VarId,
        /// Evaluations the input must stay stable before occupancy follows.
        debounce_cycles: u8,
    },
    /// A signal protecting the element bound on side `b`.
    Signal {
        /// Input: somebody wants this signal at proceed.
        request_green: VarId,
        /// Output: signal aspect, 1 is proceed.
        signal: VarId,
    },
}

impl StraightKind {
    /// True for variants whose occupancy bit is physically sensed.
    pub fn has_detector(&self) -> bool {
        matches!(self, StraightKind::Detector { .. } | StraightKind::RawDetector { .. })
    }

    fn model(&self) -> OccupancyModel {
        match self {
            StraightKind::Short | StraightKind::Long => OccupancyModel::Simulated,
            _ => OccupancyModel::Detector,
        }
    }
}

fn straight_parts(
    alloc: &mut ScopedAllocator<'_>,
    sides: &[InterfaceId],
    occupancy: Option<VarId>,
    helper: Option<&str>,
) -> Result<ElementParts> {
    let occupancy = match occupancy {
        Some(var) => var,
        None => alloc.allocate("simulated_occ")?,
    };
    let seen_train_in_next = Some(alloc.allocate("tmp_seen_train_in_next")?);
    let helper = match helper {
        Some(name) => Some(alloc.allocate(name)?),
        None => None,
    };
    let ab = Direction {
        from: sides[0],
        to: sides[1],
        route: alloc.allocate("route_set_ab")?,
        pending: alloc.allocate("route_pending_ab")?,
        position: None,
    };
    let ba = Direction {
        from: sides[1],
        to: sides[0],
        route: alloc.allocate("route_set_ba")?,
        pending: alloc.allocate("route_pending_ba")?,
        position: None,
    };
    Ok(ElementParts {
        occupancy,
        seen_train_in_next,
        helper,
        directions: vec![ab, ba],
        position: None,
        any_route_set: None,
    })
}

impl Layout {
    fn add_straight(&mut self, name: &str, kind: StraightKind) -> Result<ElementId> {
        let (occupancy, helper) = match kind {
            StraightKind::Short | StraightKind::Long => (None, None),
            StraightKind::Detector { detector } => (Some(detector), None),
            StraightKind::RawDetector { .. } => (None, Some("tmp_debounce")),
            StraightKind::Signal { .. } => (None, Some("tmp_route_used")),
        };
        self.insert_element(
            name,
            ElementKind::Straight(kind),
            STRAIGHT_BITS,
            &["a", "b"],
            |alloc, sides| straight_parts(alloc, sides, occupancy, helper),
        )
    }

    /// Adds a piece of track shorter than any train.
    pub fn add_short(&mut self, name: &str) -> Result<ElementId> {
        self.add_straight(name, StraightKind::Short)
    }

    /// Adds a piece of track longer than any train.
    pub fn add_long(&mut self, name: &str) -> Result<ElementId> {
        self.add_straight(name, StraightKind::Long)
    }

    /// Adds a piece watched by the external detector bit `detector`.
    pub fn add_detector(&mut self, name: &str, detector: VarId) -> Result<ElementId> {
        self.add_straight(name, StraightKind::Detector { detector })
    }

    /// Adds a piece whose occupancy is `raw` filtered over `debounce_cycles`.
    pub fn add_raw_detector(
        &mut self,
        name: &str,
        raw: VarId,
        debounce_cycles: u8,
    ) -> Result<ElementId> {
        self.add_straight(name, StraightKind::RawDetector { raw, debounce_cycles })
    }

    /// Adds a signal. Trains pass from `a` to `b` when it shows proceed.
    pub fn add_signal(&mut self, name: &str, request_green: VarId, signal: VarId) -> Result<ElementId> {
        self.add_straight(name, StraightKind::Signal { request_green, signal })
    }

    /// Adds a single-sided element that can originate and terminate routes.
    pub fn add_endpoint(&mut self, name: &str) -> Result<ElementId> {
        self.insert_element(
            name,
            ElementKind::Endpoint,
            ENDPOINT_BITS,
            &["side"],
            |alloc, _| {
                Ok(ElementParts {
                    occupancy: alloc.allocate("occ")?,
                    seen_train_in_next: None,
                    helper: None,
                    directions: Vec::new(),
                    position: None,
                    any_route_set: None,
                })
            },
        )
    }
}

/// Filters `raw` into the element's occupancy bit.
///
/// Every edge of `raw` restarts the timer; occupancy only follows once the
/// timer ran out with the input unchanged.
fn debounce_rules(element: &Element, raw: VarId, cycles: u8) -> Result<Vec<Rule>> {
    let shadow = element.helper_bit()?;
    let occ = element.occupancy;
    Ok(vec![
        Rule::new().when(raw, true).when(shadow, false).set(shadow, true).load_timer(cycles),
        Rule::new().when(raw, false).when(shadow, true).set(shadow, false).load_timer(cycles),
        Rule::new().when(shadow, true).when(occ, false).timer_expired().set(occ, true),
        Rule::new().when(shadow, false).when(occ, true).timer_expired().set(occ, false),
    ])
}

fn copy_rules(src: VarId, dst: VarId) -> Vec<Rule> {
    vec![
        Rule::new().when(src, true).when(dst, false).set(dst, true),
        Rule::new().when(src, false).when(dst, true).set(dst, false),
    ]
}

/// Rules of a signal's `ab` direction: originate on `request_green`, give
/// the route back after the train passed the signal.
fn signal_origin_rules(
    layout: &Layout,
    element: &Element,
    request_green: VarId,
) -> Result<Vec<Rule>> {
    let ab = element.directions[0];
    let ba = element.directions[1];
    let used = element.helper_bit()?;
    let occ = element.occupancy;
    let seen = element.seen_latch()?;
    let out = layout.interface(ab.to);
    let next = layout.binding(ab.to);

    let mut rules = Vec::new();

    let origin = Rule::new()
        .when(request_green, true)
        .when(ab.route, false)
        .when(ab.pending, false)
        .when(used, false)
        .when(ba.route, false)
        .when(ba.pending, false);
    match next {
        None => rules.push(origin.set(ab.route, true)),
        Some(_) => {
            rules.push(
                origin
                    .when(out.req, false)
                    .when(out.granted, false)
                    .when(out.denied, false)
                    .set(ab.pending, true)
                    .set(out.req, true),
            );
            rules.push(
                Rule::new()
                    .when(ab.pending, true)
                    .when(out.req, true)
                    .when(out.granted, true)
                    .set(ab.route, true)
                    .set(ab.pending, false),
            );
            // Denied: withdraw, the origin rule retries once the answer reset.
            rules.push(
                Rule::new()
                    .when(ab.pending, true)
                    .when(out.req, true)
                    .when(out.denied, true)
                    .set(ab.pending, false)
                    .set(out.req, false),
            );
        }
    }

    let release = |rule: Rule| {
        let rule = rule.set(ab.route, false).set(seen, false);
        if next.is_some() {
            rule.set(out.req, false).set(out.released, true)
        } else {
            rule
        }
    };
    rules.push(release(
        Rule::new()
            .when(ab.route, true)
            .when(seen, true)
            .when(occ, false)
            .set(used, true),
    ));
    // Aspect taken back before the train passed.
    rules.push(release(
        Rule::new()
            .when(ab.route, true)
            .when(seen, false)
            .when(request_green, false),
    ));
    rules.push(
        Rule::new()
            .when(used, true)
            .when(request_green, false)
            .set(used, false),
    );
    rules.extend(release_ack_rule(layout, ab.to));
    Ok(rules)
}

/// Requests arriving on side `a` of a signal end at the signal.
fn signal_terminus_rules(layout: &Layout, element: &Element) -> Vec<Rule> {
    let ab = element.directions[0];
    let ba = element.directions[1];
    let Some(upstream) = layout.binding(ab.from) else {
        return Vec::new();
    };
    let up = layout.interface(upstream);
    let pre = || {
        Rule::new()
            .when(up.req, true)
            .when(up.granted, false)
            .when(up.denied, false)
    };
    let mut rules = vec![
        pre().when(ba.route, true).set(up.denied, true),
        pre().when(ba.pending, true).set(up.denied, true),
        pre()
            .when(ba.route, false)
            .when(ba.pending, false)
            .set(up.granted, true),
    ];
    rules.extend(answer_reset_rules(up.req, up.granted, up.denied, up.released));
    rules
}

fn signal_aspect_rules(
    layout: &Layout,
    element: &Element,
    request_green: VarId,
    signal: VarId,
) -> Vec<Rule> {
    let route = element.directions[0].route;
    let next_occ = layout.neighbor_occupancy(element.sides[1]);
    let mut proceed = Rule::new().when(request_green, true).when(route, true);
    if let Some(next_occ) = next_occ {
        proceed = proceed.when(next_occ, false);
    }
    let mut rules = vec![
        proceed.when(signal, false).set(signal, true),
        Rule::new().when(request_green, false).when(signal, true).set(signal, false),
        Rule::new().when(route, false).when(signal, true).set(signal, false),
    ];
    if let Some(next_occ) = next_occ {
        rules.push(Rule::new().when(next_occ, true).when(signal, true).set(signal, false));
    }
    rules
}

/// Compiles the automaton of a straight element.
pub(crate) fn straight_automaton(
    layout: &Layout,
    element: &Element,
    kind: &StraightKind,
) -> Result<Automaton> {
    let model = kind.model();
    let mut rules = RuleSet::new(&element.name);

    match *kind {
        StraightKind::Signal { request_green, signal } => {
            if let Some(upstream_occ) = layout.neighbor_occupancy(element.sides[0]) {
                rules.contribute(Phase::Occupancy, copy_rules(upstream_occ, element.occupancy));
            }
            rules.contribute(Phase::DetectorProxy, seen_rules(layout, element, model)?);
            rules.contribute(Phase::Clear, clear_rules(element, model)?);
            rules.contribute(Phase::Route, signal_terminus_rules(layout, element));
            rules.contribute(Phase::Route, signal_origin_rules(layout, element, request_green)?);
            rules.contribute(Phase::Route, direction_rules(layout, element, 1, model)?);
            rules.contribute(
                Phase::Aggregate,
                signal_aspect_rules(layout, element, request_green, signal),
            );
        }
        _ => {
            if let StraightKind::RawDetector { raw, debounce_cycles } = *kind {
                rules.contribute(Phase::Occupancy, debounce_rules(element, raw, debounce_cycles)?);
            }
            rules.contribute(Phase::DetectorProxy, seen_rules(layout, element, model)?);
            rules.contribute(Phase::Clear, clear_rules(element, model)?);
            for index in 0..element.directions.len() {
                rules.contribute(Phase::Route, direction_rules(layout, element, index, model)?);
            }
        }
    }

    Ok(rules.build())
}

/// Compiles the automaton of an endpoint.
///
/// An endpoint accepts every request arriving from its neighbor, unless it
/// is itself requesting a route in the opposite direction. Its own
/// outgoing request bits are driven from outside.
pub(crate) fn endpoint_automaton(layout: &Layout, element: &Element) -> Result<Automaton> {
    let mut rules = RuleSet::new(&element.name);
    let side = element.sides[0];
    if let Some(upstream) = layout.binding(side) {
        let up = layout.interface(upstream);
        let own = layout.interface(side);
        let pre = || {
            Rule::new()
                .when(up.req, true)
                .when(up.granted, false)
                .when(up.denied, false)
        };
        let mut route = vec![
            pre().when(own.req, true).set(up.denied, true),
            pre().when(own.req, false).set(up.granted, true),
        ];
        route.extend(answer_reset_rules(up.req, up.granted, up.denied, up.released));
        rules.contribute(Phase::Route, route);
    }
    Ok(rules.build())
}

// ============================================================================
// Tests
// ============================================================================
