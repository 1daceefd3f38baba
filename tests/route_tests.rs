//! Route reservation scenarios run through the reference simulator

use rs_interlock::{
    Block, Config, ElementId, Interface, Layout, Magnet, Position, Program, Simulator, VarId,
};

// ============================================================================
// Helpers
// ============================================================================

fn simulate(layout: &Layout) -> Simulator {
    let config = Config::default();
    let program = Program::build(layout, &[]).unwrap();
    let mut sim = Simulator::new(&program, &config.sim);
    assert!(sim.settle());
    sim
}

fn port(layout: &Layout, element: ElementId) -> Interface {
    layout.interface(layout.first_side(element).unwrap()).clone()
}

fn route_ab(layout: &Layout, element: ElementId) -> VarId {
    layout.element(element).unwrap().directions[0].route
}

fn route_ba(layout: &Layout, element: ElementId) -> VarId {
    layout.element(element).unwrap().directions[1].route
}

fn pending_bits(layout: &Layout, elements: &[ElementId]) -> Vec<VarId> {
    elements
        .iter()
        .flat_map(|&e| layout.element(e).unwrap().pending_bits().collect::<Vec<_>>())
        .collect()
}

/// Endpoint followed by `n` long pieces.
fn line(n: usize) -> (Layout, ElementId, Vec<ElementId>) {
    let mut l = Layout::new(&Config::default());
    let end = l.add_endpoint("end").unwrap();
    let pieces: Vec<ElementId> = (0..n)
        .map(|i| l.add_long(&format!("L{}", i + 1)).unwrap())
        .collect();
    let first = l.side_a(pieces[0]).unwrap();
    l.bind(l.first_side(end).unwrap(), first).unwrap();
    let runs: Vec<&dyn rs_interlock::StraightRun> =
        pieces.iter().map(|p| p as &dyn rs_interlock::StraightRun).collect();
    l.bind_sequence(&runs).unwrap();
    (l, end, pieces)
}

// ============================================================================
// Grant / Deny
// ============================================================================

#[test]
fn three_long_pieces_grant_end_to_end() {
    let (l, end, pieces) = line(3);
    let mut sim = simulate(&l);
    let p = port(&l, end);

    sim.set(p.req, true);
    assert!(sim.settle());

    assert!(sim.get(p.granted));
    assert!(!sim.get(p.denied));
    for &piece in &pieces {
        assert!(sim.get(route_ab(&l, piece)));
        assert!(!sim.get(route_ba(&l, piece)));
    }
    for bit in pending_bits(&l, &pieces) {
        assert!(!sim.get(bit));
    }
}

#[test]
fn occupied_middle_piece_denies() {
    let mut l = Layout::new(&Config::default());
    let det = l.external("det").unwrap();
    let end = l.add_endpoint("end").unwrap();
    let l1 = l.add_long("L1").unwrap();
    let d = l.add_detector("D", det).unwrap();
    let l3 = l.add_long("L3").unwrap();
    l.bind(l.first_side(end).unwrap(), l.side_a(l1).unwrap()).unwrap();
    l.bind_sequence(&[&l1, &d, &l3]).unwrap();

    let mut sim = simulate(&l);
    sim.set(det, true);
    let p = port(&l, end);
    sim.set(p.req, true);
    assert!(sim.settle());

    assert!(sim.get(p.denied));
    assert!(!sim.get(p.granted));
    for &piece in &[l1, d, l3] {
        assert!(!sim.get(route_ab(&l, piece)));
    }
    for bit in pending_bits(&l, &[l1, d, l3]) {
        assert!(!sim.get(bit), "pending bit left behind after denial");
    }
    // the forwarded request was withdrawn
    assert!(!sim.get(l.interface(l.side_b(l1).unwrap()).req));
}

#[test]
fn denial_clears_once_request_drops() {
    let mut l = Layout::new(&Config::default());
    let det = l.external("det").unwrap();
    let end = l.add_endpoint("end").unwrap();
    let d = l.add_detector("D", det).unwrap();
    l.bind(l.first_side(end).unwrap(), l.side_a(d).unwrap()).unwrap();

    let mut sim = simulate(&l);
    let p = port(&l, end);
    sim.set(det, true);
    sim.set(p.req, true);
    sim.settle();
    assert!(sim.get(p.denied));

    sim.set(p.req, false);
    sim.settle();
    assert!(!sim.get(p.denied));

    // retry succeeds once the piece is free
    sim.set(det, false);
    sim.set(p.req, true);
    sim.settle();
    assert!(sim.get(p.granted));
}

// ============================================================================
// Turnouts
// ============================================================================

fn turnout_layout() -> (Layout, ElementId, ElementId, ElementId, Magnet) {
    let mut l = Layout::new(&Config::default());
    let magnet = Magnet {
        command: l.external("w1.command").unwrap(),
        current: l.external("w1.current").unwrap(),
    };
    let end = l.add_endpoint("end").unwrap();
    let w = l.add_movable_turnout("w1", magnet).unwrap();
    let long = l.add_long("L").unwrap();
    l.bind_pairs(&[
        (l.first_side(end).unwrap(), l.side_thrown(w).unwrap()),
        (l.side_points(w).unwrap(), l.side_a(long).unwrap()),
    ])
    .unwrap();
    (l, end, w, long, magnet)
}

#[test]
fn closed_turnout_denies_thrown_branch() {
    let (l, end, w, long, _) = turnout_layout();
    let mut sim = simulate(&l);
    let p = port(&l, end);

    sim.set(p.req, true);
    assert!(sim.settle());

    assert!(sim.get(p.denied));
    assert!(!sim.get(route_ab(&l, long)));
    for d in &l.element(w).unwrap().directions {
        assert!(!sim.get(d.route));
    }
}

#[test]
fn thrown_turnout_grants_thrown_branch() {
    let (l, end, w, long, magnet) = turnout_layout();
    let mut sim = simulate(&l);
    let position = l.element(w).unwrap().position.unwrap();

    sim.set(magnet.command, true);
    sim.settle();
    assert!(sim.get(position));
    assert!(sim.get(magnet.current));

    let p = port(&l, end);
    sim.set(p.req, true);
    sim.settle();
    assert!(sim.get(p.granted));
    assert!(sim.get(route_ab(&l, long)));
}

#[test]
fn turnout_does_not_move_under_a_route() {
    let (l, end, w, _, magnet) = turnout_layout();
    let mut sim = simulate(&l);
    let element = l.element(w).unwrap();
    let position = element.position.unwrap();
    let any = element.any_route_set.unwrap();

    sim.set(magnet.command, true);
    sim.settle();
    let p = port(&l, end);
    sim.set(p.req, true);
    sim.settle();
    assert!(sim.get(any));

    sim.set(magnet.command, false);
    sim.settle();
    assert!(sim.get(position), "turnout moved while a route was set");

    // giving the route up lets the turnout follow the command
    sim.set(p.req, false);
    sim.settle();
    assert!(!sim.get(any));
    assert!(!sim.get(position));
    assert!(!sim.get(magnet.current));
}

#[test]
fn points_entry_follows_position() {
    let mut l = Layout::new(&Config::default());
    let magnet = Magnet {
        command: l.external("w1.command").unwrap(),
        current: l.external("w1.current").unwrap(),
    };
    let end = l.add_endpoint("end").unwrap();
    let w = l.add_movable_turnout("w1", magnet).unwrap();
    let straight = l.add_long("C").unwrap();
    let diverging = l.add_long("T").unwrap();
    l.bind_pairs(&[
        (l.first_side(end).unwrap(), l.side_points(w).unwrap()),
        (l.side_closed(w).unwrap(), l.side_a(straight).unwrap()),
        (l.side_thrown(w).unwrap(), l.side_a(diverging).unwrap()),
    ])
    .unwrap();
    let mut sim = simulate(&l);
    let p = port(&l, end);

    sim.set(p.req, true);
    assert!(sim.settle());
    assert!(sim.get(p.granted));
    assert!(sim.get(route_ab(&l, straight)));
    assert!(!sim.get(route_ab(&l, diverging)));

    sim.set(p.req, false);
    assert!(sim.settle());
    assert!(!sim.get(route_ab(&l, straight)));

    sim.set(magnet.command, true);
    assert!(sim.settle());
    sim.set(p.req, true);
    assert!(sim.settle());
    assert!(sim.get(p.granted));
    assert!(sim.get(route_ab(&l, diverging)));
    assert!(!sim.get(route_ab(&l, straight)));
}

#[test]
fn fixed_turnout_grants_live_branch_only() {
    let mut l = Layout::new(&Config::default());
    let live = l.add_endpoint("live").unwrap();
    let dead = l.add_endpoint("dead").unwrap();
    let w = l.add_fixed_turnout("w1", Position::Closed).unwrap();
    let long = l.add_long("L").unwrap();
    l.bind_pairs(&[
        (l.first_side(live).unwrap(), l.side_closed(w).unwrap()),
        (l.first_side(dead).unwrap(), l.side_thrown(w).unwrap()),
        (l.side_points(w).unwrap(), l.side_a(long).unwrap()),
    ])
    .unwrap();
    let mut sim = simulate(&l);
    let from_dead = port(&l, dead);
    let from_live = port(&l, live);

    sim.set(from_dead.req, true);
    assert!(sim.settle());
    assert!(sim.get(from_dead.denied));
    assert!(!sim.get(route_ab(&l, long)));

    sim.set(from_dead.req, false);
    assert!(sim.settle());
    assert!(!sim.get(from_dead.denied));

    sim.set(from_live.req, true);
    assert!(sim.settle());
    assert!(sim.get(from_live.granted));
    assert!(sim.get(route_ab(&l, long)));

    // the dead branch stays refused while the live route is held
    sim.set(from_dead.req, true);
    assert!(sim.settle());
    assert!(sim.get(from_dead.denied));
    assert!(sim.get(from_live.granted));
}

// ============================================================================
// Mutual exclusion
// ============================================================================

#[test]
fn opposite_requests_never_both_set() {
    let mut l = Layout::new(&Config::default());
    let west = l.add_endpoint("west").unwrap();
    let piece = l.add_long("L").unwrap();
    let east = l.add_endpoint("east").unwrap();
    l.bind_pairs(&[
        (l.first_side(west).unwrap(), l.side_a(piece).unwrap()),
        (l.side_b(piece).unwrap(), l.first_side(east).unwrap()),
    ])
    .unwrap();

    let mut sim = simulate(&l);
    let w = port(&l, west);
    let e = port(&l, east);
    sim.set(w.req, true);
    sim.set(e.req, true);
    for _ in 0..20 {
        sim.step();
        assert!(!(sim.get(route_ab(&l, piece)) && sim.get(route_ba(&l, piece))));
        assert!(!(sim.get(w.granted) && sim.get(e.granted)));
    }
    assert!(sim.get(e.denied));

    // after both back off, one side gets through alone
    sim.set(w.req, false);
    sim.set(e.req, false);
    sim.settle();
    sim.set(w.req, true);
    sim.settle();
    assert!(sim.get(w.granted));
    assert!(sim.get(route_ab(&l, piece)));
}

// ============================================================================
// Release
// ============================================================================

#[test]
fn withdrawn_request_releases_every_hop() {
    let (l, end, pieces) = line(3);
    let mut sim = simulate(&l);
    let p = port(&l, end);
    sim.set(p.req, true);
    sim.settle();
    assert!(sim.get(route_ab(&l, pieces[2])));

    sim.set(p.req, false);
    assert!(sim.settle());

    assert!(!sim.get(p.granted));
    for &piece in &pieces {
        assert!(!sim.get(route_ab(&l, piece)));
        let b = l.interface(l.side_b(piece).unwrap());
        assert!(!sim.get(b.req));
        assert!(!sim.get(b.granted));
        assert!(!sim.get(b.released));
    }
}

#[test]
fn train_passage_releases_behind_the_train() {
    let mut l = Layout::new(&Config::default());
    let det = l.external("det").unwrap();
    let end = l.add_endpoint("end").unwrap();
    let l1 = l.add_long("L1").unwrap();
    let d = l.add_detector("D", det).unwrap();
    let l2 = l.add_long("L2").unwrap();
    l.bind(l.first_side(end).unwrap(), l.side_a(l1).unwrap()).unwrap();
    l.bind_sequence(&[&l1, &d, &l2]).unwrap();

    let mut sim = simulate(&l);
    let p = port(&l, end);
    sim.set(p.req, true);
    sim.settle();
    assert!(sim.get(route_ab(&l, l1)));

    // train reaches the detector: the approach piece becomes occupied
    sim.set(det, true);
    sim.settle();
    let l1_occ = l.element(l1).unwrap().occupancy;
    assert!(sim.get(l1_occ));
    assert!(sim.get(route_ab(&l, l1)));

    // train clears the detector: everything behind and ahead is given back
    sim.set(det, false);
    assert!(sim.settle());
    assert!(!sim.get(l1_occ));
    for &piece in &[l1, d, l2] {
        assert!(!sim.get(route_ab(&l, piece)));
    }
    for &piece in &[l1, d] {
        let b = l.interface(l.side_b(piece).unwrap());
        assert!(!sim.get(b.req));
        assert!(!sim.get(b.released));
    }
}

// ============================================================================
// Debounce
// ============================================================================

#[test]
fn short_pulse_is_filtered() {
    let mut l = Layout::new(&Config::default());
    let raw = l.external("raw").unwrap();
    let d = l.add_raw_detector("D", raw, 3).unwrap();
    let occ = l.element(d).unwrap().occupancy;
    let mut sim = simulate(&l);

    sim.set(raw, true);
    sim.run(2);
    sim.set(raw, false);
    for _ in 0..10 {
        sim.step();
        assert!(!sim.get(occ));
    }
}

#[test]
fn stable_input_is_followed_after_window() {
    let mut l = Layout::new(&Config::default());
    let raw = l.external("raw").unwrap();
    let d = l.add_raw_detector("D", raw, 3).unwrap();
    let occ = l.element(d).unwrap().occupancy;
    let mut sim = simulate(&l);

    sim.set(raw, true);
    sim.run(3);
    assert!(!sim.get(occ));
    sim.step();
    assert!(sim.get(occ));

    sim.set(raw, false);
    sim.run(3);
    assert!(sim.get(occ));
    sim.step();
    assert!(!sim.get(occ));
}

// ============================================================================
// Signals
// ============================================================================

#[test]
fn signal_follows_request_green() {
    let mut l = Layout::new(&Config::default());
    let b1 = Block::new(&mut l, "B1").unwrap();
    let b2 = Block::new(&mut l, "B2").unwrap();
    l.bind_sequence(&[&b1, &b2]).unwrap();
    let mut sim = simulate(&l);

    assert!(!sim.get(b1.signal()));
    sim.set(b1.request_green(), true);
    sim.settle();
    assert!(sim.get(b1.signal()));
    assert!(sim.get(b2.route_in(&l).unwrap()));

    // nobody moved: taking the request back returns the route
    sim.set(b1.request_green(), false);
    assert!(sim.settle());
    assert!(!sim.get(b1.signal()));
    assert!(!sim.get(b1.route_out(&l).unwrap()));
    assert!(!sim.get(b2.route_in(&l).unwrap()));
}

#[test]
fn signal_stays_red_into_occupied_block() {
    let mut l = Layout::new(&Config::default());
    let b1 = Block::new(&mut l, "B1").unwrap();
    let b2 = Block::new(&mut l, "B2").unwrap();
    l.bind_sequence(&[&b1, &b2]).unwrap();
    let mut sim = simulate(&l);

    sim.set(b2.detector(), true);
    sim.set(b1.request_green(), true);
    sim.settle();
    assert!(!sim.get(b1.signal()));
    assert!(!sim.get(b1.route_out(&l).unwrap()));

    // the signal keeps retrying (so the program never settles while the
    // block is occupied) and clears once the block empties
    sim.set(b2.detector(), false);
    sim.settle();
    assert!(sim.get(b1.signal()));
}
