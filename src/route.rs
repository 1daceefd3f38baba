//! The route reservation protocol shared by every track element.
//!
//! A route through an element is one [`Direction`]: enter on `from`, leave on
//! `to`. Each direction owns a route-set bit and a route-pending bit. The
//! rules generated here implement the four-phase handshake against the two
//! neighbors of the direction:
//!
//! 1. the upstream neighbor raises `req` on its interface bound to `from`;
//! 2. this element denies (occupied, a conflicting direction is pending or
//!    set, wrong turnout position) or accepts by raising `pending` and
//!    forwarding `req` out through `to`;
//! 3. the downstream answer is relayed back: a grant sets `route`, a denial
//!    drops `pending` and is passed upstream;
//! 4. once the train has passed, or the upstream neighbor gave the route up
//!    without a train, the route bit is cleared and `released` is raised
//!    towards downstream.
//!
//! Mutual exclusion between directions of one element comes from rule order:
//! every accept rule checks the pending and route bits of all other
//! directions, and the first accept in a pass raises its pending bit before
//! any later direction is looked at.

use crate::error::Result;
use crate::rule::Rule;
use crate::topology::{Element, InterfaceId, Layout};
use crate::turnout::Position;
use crate::variable::VarId;

/// One supported way through an element.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Direction {
    /// Entry interface (owned by this element).
    pub from: InterfaceId,
    /// Exit interface (owned by this element).
    pub to: InterfaceId,
    /// Route set through this direction.
    pub route: VarId,
    /// Handshake in progress for this direction.
    pub pending: VarId,
    /// Turnout position this direction needs, `None` for don't care.
    pub position: Option<Position>,
}

/// How an element decides that a train has passed through it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OccupancyModel {
    /// The element's occupancy bit is a real (or debounced) detector.
    Detector,
    /// The occupancy bit is simulated from the next element.
    Simulated,
}

/// Handshake bits of an interface, named by role.
#[derive(Clone, Copy)]
struct Port {
    req: VarId,
    granted: VarId,
    denied: VarId,
    released: VarId,
}

impl Port {
    fn of(layout: &Layout, id: InterfaceId) -> Self {
        let iface = layout.interface(id);
        Self {
            req: iface.req,
            granted: iface.granted,
            denied: iface.denied,
            released: iface.released,
        }
    }
}

/// Rules resetting our answer once the requester let go.
pub(crate) fn answer_reset_rules(upstream_req: VarId, granted: VarId, denied: VarId, released: VarId) -> Vec<Rule> {
    vec![
        Rule::new().when(released, true).when(granted, true).set(granted, false),
        Rule::new().when(upstream_req, false).when(granted, true).set(granted, false),
        Rule::new().when(upstream_req, false).when(denied, true).set(denied, false),
    ]
}

/// Acknowledges a release once the downstream answer went away.
pub(crate) fn release_ack_rule(layout: &Layout, to: InterfaceId) -> Option<Rule> {
    layout.binding(to)?;
    let out = Port::of(layout, to);
    Some(
        Rule::new()
            .when(out.released, true)
            .when(out.granted, false)
            .set(out.released, false),
    )
}

/// Seen-train latches: set once the next element reports occupancy while a
/// route is held towards it. Simulated elements become occupied at the same
/// moment.
pub(crate) fn seen_rules(
    layout: &Layout,
    element: &Element,
    model: OccupancyModel,
) -> Result<Vec<Rule>> {
    let seen = element.seen_latch()?;
    Ok(element
        .directions
        .iter()
        .filter_map(|d| {
            let next_occ = layout.neighbor_occupancy(d.to)?;
            let mut rule = Rule::new()
                .when(d.route, true)
                .when(next_occ, true)
                .when(seen, false)
                .set(seen, true);
            if model == OccupancyModel::Simulated {
                rule = rule.set(element.occupancy, true);
            }
            Some(rule)
        })
        .collect())
}

/// Clears stale latches (and simulated occupancy) once no route is held.
pub(crate) fn clear_rules(element: &Element, model: OccupancyModel) -> Result<Vec<Rule>> {
    let seen = element.seen_latch()?;
    let mut rules = vec![Rule::new()
        .when_all(element.route_bits(), false)
        .when(seen, true)
        .set(seen, false)];
    if model == OccupancyModel::Simulated {
        rules.push(
            Rule::new()
                .when_all(element.route_bits(), false)
                .when(element.occupancy, true)
                .set(element.occupancy, false),
        );
    }
    Ok(rules)
}

/// Full handshake rule list for direction `index` of `element`.
pub(crate) fn direction_rules(
    layout: &Layout,
    element: &Element,
    index: usize,
    model: OccupancyModel,
) -> Result<Vec<Rule>> {
    let d = element.directions[index];
    let Some(upstream) = layout.binding(d.from) else {
        // Nothing can ever request this direction.
        return Ok(Vec::new());
    };
    let up = Port::of(layout, upstream);
    let out = Port::of(layout, d.to);
    let next = layout.binding(d.to);
    let occ = element.occupancy;
    let seen = element.seen_latch()?;

    let conflicts: Vec<VarId> = element
        .directions
        .iter()
        .enumerate()
        .filter(|(j, _)| *j != index)
        .flat_map(|(_, o)| [o.route, o.pending])
        .collect();

    // A position requirement either selects between directions sharing an
    // entry (points side of a movable turnout) or is a reason to deny.
    let shares_entry = element
        .directions
        .iter()
        .enumerate()
        .any(|(j, o)| j != index && o.from == d.from);
    let position = match (d.position, element.position) {
        (Some(p), Some(var)) => Some((var, p.bit())),
        _ => None,
    };

    let prefix = || {
        let mut rule = Rule::new()
            .when(up.req, true)
            .when(up.granted, false)
            .when(up.denied, false)
            .when(d.pending, false)
            .when(d.route, false);
        if let (true, Some((var, bit))) = (shares_entry, position) {
            rule = rule.when(var, bit);
        }
        rule
    };

    let mut rules = Vec::new();

    // Deny.
    rules.push(prefix().when(occ, true).set(up.denied, true));
    for &c in &conflicts {
        rules.push(prefix().when(c, true).set(up.denied, true));
    }
    if let (false, Some((var, bit))) = (shares_entry, position) {
        rules.push(prefix().when(var, !bit).set(up.denied, true));
    }

    // Accept.
    let mut accept = prefix().when(occ, false).when_all(conflicts.iter().copied(), false);
    if let (false, Some((var, bit))) = (shares_entry, position) {
        accept = accept.when(var, bit);
    }
    match next {
        None => {
            // Route ends at the end of the track.
            rules.push(accept.set(d.route, true).set(up.granted, true));
        }
        Some(_) => {
            rules.push(
                accept
                    .when(out.req, false)
                    .when(out.granted, false)
                    .when(out.denied, false)
                    .set(d.pending, true)
                    .set(out.req, true),
            );
            // Relay the downstream answer.
            rules.push(
                Rule::new()
                    .when(d.pending, true)
                    .when(out.req, true)
                    .when(out.granted, true)
                    .set(d.route, true)
                    .set(d.pending, false)
                    .set(up.granted, true),
            );
            rules.push(
                Rule::new()
                    .when(d.pending, true)
                    .when(out.req, true)
                    .when(out.denied, true)
                    .set(d.pending, false)
                    .set(out.req, false)
                    .set(up.denied, true),
            );
        }
    }

    rules.extend(answer_reset_rules(up.req, up.granted, up.denied, up.released));

    // Release after the train passed.
    let release = |rule: Rule| {
        let mut rule = rule.set(d.route, false).set(seen, false);
        if model == OccupancyModel::Simulated {
            rule = rule.set(occ, false);
        }
        if next.is_some() {
            rule = rule.set(out.req, false).set(out.released, true);
        }
        rule
    };
    match (model, layout.neighbor_occupancy(d.to)) {
        (OccupancyModel::Detector, _) => {
            rules.push(release(
                Rule::new().when(d.route, true).when(seen, true).when(occ, false),
            ));
        }
        (OccupancyModel::Simulated, Some(next_occ)) => {
            rules.push(release(
                Rule::new().when(d.route, true).when(seen, true).when(next_occ, false),
            ));
        }
        (OccupancyModel::Simulated, None) => {}
    }
    // Release when the upstream gave the route up before any train came.
    rules.push(release(
        Rule::new()
            .when(d.route, true)
            .when(seen, false)
            .when(occ, false)
            .when(up.req, false),
    ));

    rules.extend(release_ack_rule(layout, d.to));
    Ok(rules)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::rule::Act;

    #[test]
    fn unrequestable_direction_has_no_rules() {
        let mut l = Layout::new(&Config::default());
        let t = l.add_long("t").unwrap();
        let element = l.element(t).unwrap().clone();
        assert!(direction_rules(&l, &element, 0, OccupancyModel::Simulated)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn deny_rules_precede_accept() {
        let mut l = Layout::new(&Config::default());
        let t1 = l.add_long("t1").unwrap();
        let t2 = l.add_long("t2").unwrap();
        l.bind_sequence(&[&t1, &t2]).unwrap();
        let element = l.element(t2).unwrap().clone();
        let rules = direction_rules(&l, &element, 0, OccupancyModel::Simulated).unwrap();
        let up_denied = l.interface(l.side_b(t1).unwrap()).denied;
        let first_accept = rules
            .iter()
            .position(|r| r.actions.contains(&Act::Set(element.directions[0].route, true)))
            .unwrap();
        let last_deny = rules
            .iter()
            .rposition(|r| r.actions == vec![Act::Set(up_denied, true)])
            .unwrap();
        assert!(last_deny < first_accept);
    }

    #[test]
    fn seen_rules_mark_simulated_occupancy() {
        let mut l = Layout::new(&Config::default());
        let det = l.external("det").unwrap();
        let t = l.add_short("t").unwrap();
        let d = l.add_detector("d", det).unwrap();
        l.bind_sequence(&[&t, &d]).unwrap();
        let element = l.element(t).unwrap().clone();
        let rules = seen_rules(&l, &element, OccupancyModel::Simulated).unwrap();
        assert_eq!(rules.len(), 1);
        assert!(rules[0].actions.contains(&Act::Set(element.occupancy, true)));
    }
}
