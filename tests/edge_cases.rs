//! Edge case and boundary condition tests for the layout compiler

use rs_interlock::{
    config::{AllocatorConfig, BoardConfig, DetectorConfig, SimConfig, MAX_SHORT_STRING},
    track::STRAIGHT_BITS,
    Block, BuildError, Config, Layout, Position, Program, Simulator,
};

// ============================================================================
// Allocator Boundaries
// ============================================================================

#[test]
fn block_size_fits_exactly() {
    let config = Config::default()
        .with_allocator(AllocatorConfig::default().with_block_size(2 * STRAIGHT_BITS));
    let mut l = Layout::new(&config);
    l.add_long("t1").unwrap();
    l.add_long("t2").unwrap();
    assert_eq!(l.vars().remaining(), 0);
}

#[test]
fn allocator_overrun_names_the_element() {
    let config = Config::default()
        .with_allocator(AllocatorConfig::default().with_block_size(STRAIGHT_BITS + 4));
    let mut l = Layout::new(&config);
    l.add_long("t1").unwrap();
    match l.add_long("t2").unwrap_err() {
        BuildError::AllocatorOverrun {
            caller,
            requested,
            remaining,
            ..
        } => {
            assert!(caller.contains("t2"));
            assert_eq!(requested, STRAIGHT_BITS);
            assert_eq!(remaining, 4);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn failed_insert_does_not_reserve_the_name() {
    let config = Config::default()
        .with_allocator(AllocatorConfig::default().with_block_size(STRAIGHT_BITS + 4));
    let mut l = Layout::new(&config);
    l.add_long("t1").unwrap();
    assert!(l.add_long("t2").is_err());
    assert!(l.find("t2").is_none());
    assert!(matches!(
        l.add_long("t2"),
        Err(BuildError::AllocatorOverrun { .. })
    ));
}

#[test]
fn plain_pieces_allocate_no_helper_bits() {
    let mut l = Layout::new(&Config::default());
    let long = l.add_long("L").unwrap();
    let end = l.add_endpoint("end").unwrap();
    let det = l.external("det").unwrap();
    let d = l.add_detector("D", det).unwrap();
    for id in [long, d] {
        let e = l.element(id).unwrap();
        assert!(e.helper.is_none());
        assert!(e.seen_train_in_next.is_some());
    }
    let e = l.element(end).unwrap();
    assert!(e.helper.is_none());
    assert!(e.seen_train_in_next.is_none());
    assert!(l.vars().find("logic.L.tmp_helper").is_none());
}

#[test]
fn overlong_board_name_is_an_error() {
    let name = "b".repeat(MAX_SHORT_STRING + 1);
    assert_eq!(
        BoardConfig::default().with_name(&name).unwrap_err(),
        BuildError::NameTooLong {
            name: name.clone(),
            max: MAX_SHORT_STRING
        }
    );
}

#[test]
fn event_ids_follow_the_base() {
    let config = Config::default()
        .with_allocator(AllocatorConfig::default().with_event_base(0x0501_0101_1422_1000));
    let mut l = Layout::new(&config);
    let det = l.external("det").unwrap();
    let info = l.vars().info(det);
    assert_eq!(info.event_on, 0x0501_0101_1422_1000);
    assert_eq!(info.event_off, 0x0501_0101_1422_1001);
}

// ============================================================================
// Topology Defects
// ============================================================================

#[test]
fn duplicate_element_name_rejected() {
    let mut l = Layout::new(&Config::default());
    Block::new(&mut l, "B1").unwrap();
    assert!(matches!(
        Block::new(&mut l, "B1"),
        Err(BuildError::DuplicateName(_))
    ));
}

#[test]
fn lone_signal_fails_validation() {
    let mut l = Layout::new(&Config::default());
    let rg = l.external("rg").unwrap();
    let aspect = l.external("aspect").unwrap();
    l.add_signal("sig", rg, aspect).unwrap();
    assert_eq!(
        Program::build(&l, &[]).unwrap_err(),
        BuildError::NoDetector {
            element: "sig".into(),
            side: "b".into()
        }
    );
}

#[test]
fn signal_behind_long_piece_only_fails_validation() {
    let mut l = Layout::new(&Config::default());
    let rg = l.external("rg").unwrap();
    let aspect = l.external("aspect").unwrap();
    let long = l.add_long("long").unwrap();
    let sig = l.add_signal("sig", rg, aspect).unwrap();
    l.bind_sequence(&[&long, &sig]).unwrap();
    assert!(matches!(
        Program::build(&l, &[]),
        Err(BuildError::NoDetector { .. })
    ));
}

#[test]
fn shorts_in_a_loop_are_a_lookup_cycle() {
    let mut l = Layout::new(&Config::default());
    let rg = l.external("rg").unwrap();
    let aspect = l.external("aspect").unwrap();
    let s1 = l.add_short("s1").unwrap();
    let s2 = l.add_short("s2").unwrap();
    let sig = l.add_signal("sig", rg, aspect).unwrap();
    l.bind_sequence(&[&s1, &s2, &sig]).unwrap();
    l.bind(l.side_b(sig).unwrap(), l.side_a(s1).unwrap()).unwrap();
    assert!(matches!(
        Program::build(&l, &[]),
        Err(BuildError::LookupCycle(_))
    ));
}

#[test]
fn binding_twice_rejected() {
    let mut l = Layout::new(&Config::default());
    let t1 = l.add_long("t1").unwrap();
    let t2 = l.add_long("t2").unwrap();
    let t3 = l.add_long("t3").unwrap();
    l.bind(l.side_b(t1).unwrap(), l.side_a(t2).unwrap()).unwrap();
    let err = l
        .bind(l.side_b(t1).unwrap(), l.side_a(t3).unwrap())
        .unwrap_err();
    assert_eq!(
        err,
        BuildError::AlreadyBound {
            element: "t1".into(),
            side: "b".into()
        }
    );
}

#[test]
fn binding_to_self_rejected() {
    let mut l = Layout::new(&Config::default());
    let t1 = l.add_long("t1").unwrap();
    let a = l.side_a(t1).unwrap();
    assert!(matches!(l.bind(a, a), Err(BuildError::AlreadyBound { .. })));
}

#[test]
fn turnout_sides_on_straight_piece_rejected() {
    let mut l = Layout::new(&Config::default());
    let t1 = l.add_long("t1").unwrap();
    assert_eq!(
        l.side_points(t1).unwrap_err(),
        BuildError::NotTurnout("t1".into())
    );
    let w = l.add_fixed_turnout("w1", Position::Thrown).unwrap();
    assert!(l.side_thrown(w).is_ok());
}

// ============================================================================
// Runtime Boundaries
// ============================================================================

#[test]
fn unbound_endpoint_request_is_ignored() {
    let mut l = Layout::new(&Config::default());
    let end = l.add_endpoint("end").unwrap();
    let program = Program::build(&l, &[]).unwrap();
    let config = Config::default();
    let mut sim = Simulator::new(&program, &config.sim);
    let port = l.interface(l.first_side(end).unwrap()).clone();
    sim.set(port.req, true);
    assert!(sim.settle());
    assert!(!sim.get(port.granted));
    assert!(!sim.get(port.denied));
}

#[test]
fn reversed_evaluation_order_reaches_same_result() {
    for reverse in [false, true] {
        let config =
            Config::default().with_sim(SimConfig::default().with_reverse_order(reverse));
        let mut l = Layout::new(&config);
        let b1 = Block::new(&mut l, "B1").unwrap();
        let b2 = Block::new(&mut l, "B2").unwrap();
        let b3 = Block::new(&mut l, "B3").unwrap();
        l.bind_sequence(&[&b1, &b2, &b3]).unwrap();

        let program = Program::build(&l, &[]).unwrap();
        let mut sim = Simulator::new(&program, &config.sim);
        sim.set(b1.request_green(), true);
        sim.set(b2.request_green(), true);
        assert!(sim.settle(), "reverse = {reverse}");
        assert!(sim.get(b1.signal()), "reverse = {reverse}");
        assert!(sim.get(b2.signal()), "reverse = {reverse}");
        assert!(sim.get(b2.route_in(&l).unwrap()));
        assert!(sim.get(b3.route_in(&l).unwrap()));
    }
}

#[test]
fn zero_cycle_debounce_follows_next_pass() {
    let config = Config::default().with_detector(DetectorConfig::default().with_debounce_cycles(0));
    let mut l = Layout::new(&config);
    let block = Block::with_raw_detector(&mut l, "B1").unwrap();
    let raw = l.vars().find("logic.B1.raw").unwrap();
    let program = Program::build(&l, &[]).unwrap();
    let mut sim = Simulator::new(&program, &config.sim);
    assert!(sim.settle());

    sim.set(raw, true);
    sim.step();
    assert!(sim.get(block.detector()));
}

#[cfg(feature = "serde")]
#[test]
fn program_exports_json() {
    let mut l = Layout::new(&Config::default());
    let b1 = Block::new(&mut l, "B1").unwrap();
    let b2 = Block::new(&mut l, "B2").unwrap();
    l.bind_sequence(&[&b1, &b2]).unwrap();
    let program = Program::build(&l, &[]).unwrap();
    let json = program.to_json().unwrap();
    assert!(json.contains("\"variables\""));
    assert!(json.contains("logic.B1.request_green"));
    assert!(json.contains("B2.signal_piece"));
}
