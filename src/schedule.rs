//! Per-train schedules.
//!
//! A [`TrainSchedule`] walks one train through a declared set of block
//! transitions. The train's whereabouts are kept in per-block [`Location`]
//! bits: `permaloc` says the train is in the block and survives a restart
//! (it is backed by external storage), `routingloc` marks the block the
//! train is currently being routed to.
//!
//! One transition runs at a time. Its helper bit `active` scopes the
//! per-transition rules; the shared state register walks
//!
//! ```text
//! Init -> Recovering -> Base -> Waiting -> ReadyToGo -> [RequestTransition -> TestCondition] ->
//!   Turnout -> RequestGreen -> GreenWait -> StartTrain -> Moving ->
//!   StopTrain -> TransitionDone -> Base
//! ```
//!
//! `Recovering` holds the schedule for one detector debounce window after a
//! restart, so `permaloc` bits restored from storage are checked against
//! settled occupancy rather than against the power-on zeros.
//!
//! The bracketed part only exists for transitions gated by a
//! [`FlipFlop`](crate::flipflop::FlipFlop) permission. A denied route is not
//! a failure: the exit signal keeps retrying and the schedule waits in
//! `GreenWait`.

use std::collections::btree_map::Entry as MapEntry;
use std::collections::BTreeMap;

use log::debug;

use crate::block::Block;
use crate::error::Result;
use crate::flipflop::FlipFlopClient;
use crate::rule::{Automaton, Phase, Rule, RuleSet, StateId};
use crate::topology::Layout;
use crate::traits::RuleSource;
use crate::turnout::{Magnet, Position};
use crate::variable::{join_name, VarId};

/// Schedule states above `Init`/`Base`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum ScheduleState {
    /// Waiting for a transition guard.
    Waiting = 2,
    /// A transition was picked.
    ReadyToGo = 3,
    /// Waiting for the flip-flop permission.
    RequestTransition = 4,
    /// Permission granted, guard re-checked.
    TestCondition = 5,
    /// Turnouts commanded, waiting for them to report back.
    Turnout = 6,
    /// About to ask the exit signal for proceed.
    RequestGreen = 7,
    /// Waiting for the exit route.
    GreenWait = 8,
    /// Route set, releasing the train.
    StartTrain = 9,
    /// Train running towards the destination.
    Moving = 10,
    /// Train arrived, or parked for good.
    StopTrain = 11,
    /// Cleaning up.
    TransitionDone = 12,
    /// Restarted, waiting for occupancy to settle.
    Recovering = 13,
}

impl ScheduleState {
    /// Register value.
    pub fn id(self) -> StateId {
        StateId(self as u8)
    }
}

/// Location bits of one block, as seen by one train.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Location {
    /// The train is in this block (persistent).
    pub permaloc: VarId,
    /// The train is being routed into this block.
    pub routingloc: VarId,
    /// A stale `permaloc` is dropped on restart when the block reads empty.
    pub direction_sensitive: bool,
}

/// Block bits the schedule reads and writes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct BlockBits {
    detector: VarId,
    request_green: VarId,
    route_out: VarId,
}

#[derive(Clone, Debug)]
struct Tracked {
    block: BlockBits,
    location: Location,
}

/// One declared block-to-block move.
#[derive(Clone, Debug)]
pub struct Transition {
    from: String,
    to: String,
    active: VarId,
    guard: Vec<(VarId, bool)>,
    client: Option<FlipFlopClient>,
    turnouts: Vec<(Magnet, Position)>,
}

impl Transition {
    /// Adds a guard literal; all must hold before the train leaves.
    pub fn guard(&mut self, var: VarId, value: bool) -> &mut Self {
        self.guard.push((var, value));
        self
    }

    /// Commands a turnout before the exit signal is requested.
    pub fn turnout(&mut self, magnet: Magnet, position: Position) -> &mut Self {
        self.turnouts.push((magnet, position));
        self
    }

    /// Source block name.
    pub fn from(&self) -> &str {
        &self.from
    }

    /// Destination block name.
    pub fn to(&self) -> &str {
        &self.to
    }

    /// Helper bit set while this transition runs.
    pub fn active(&self) -> VarId {
        self.active
    }
}

/// State machine of one train.
#[derive(Clone, Debug)]
pub struct TrainSchedule {
    name: String,
    go: VarId,
    locations: BTreeMap<String, Tracked>,
    transitions: Vec<Transition>,
    stops: Vec<String>,
}

impl TrainSchedule {
    /// Creates a schedule; allocates the `<name>.go` output.
    pub fn new(layout: &mut Layout, name: &str) -> Result<Self> {
        Ok(Self {
            name: name.to_string(),
            go: layout.external(&join_name(name, "go"))?,
            locations: BTreeMap::new(),
            transitions: Vec::new(),
            stops: Vec::new(),
        })
    }

    /// Output: the train may run.
    pub fn go(&self) -> VarId {
        self.go
    }

    /// Location bits for `block`, if the schedule references it.
    pub fn location(&self, block: &str) -> Option<&Location> {
        self.locations.get(block).map(|e| &e.location)
    }

    /// Declared transitions.
    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    fn entry(&mut self, layout: &mut Layout, block: &Block) -> Result<&mut Tracked> {
        match self.locations.entry(block.name().to_string()) {
            MapEntry::Occupied(slot) => Ok(slot.into_mut()),
            MapEntry::Vacant(slot) => {
                let scope = join_name(&self.name, block.name());
                let location = Location {
                    permaloc: layout.external(&join_name(&scope, "permaloc"))?,
                    routingloc: layout.external(&join_name(&scope, "routingloc"))?,
                    direction_sensitive: false,
                };
                let block_bits = BlockBits {
                    detector: block.detector(),
                    request_green: block.request_green(),
                    route_out: block.route_out(layout)?,
                };
                debug!("schedule '{}' tracks block '{}'", self.name, block.name());
                Ok(slot.insert(Tracked {
                    block: block_bits,
                    location,
                }))
            }
        }
    }

    fn add_transition(
        &mut self,
        layout: &mut Layout,
        from: &Block,
        to: &Block,
        client: Option<FlipFlopClient>,
    ) -> Result<&mut Transition> {
        self.entry(layout, from)?;
        self.entry(layout, to)?;
        let index = self.transitions.len();
        let active = layout.external(&join_name(&self.name, &format!("active_{}", index)))?;
        self.transitions.push(Transition {
            from: from.name().to_string(),
            to: to.name().to_string(),
            active,
            guard: Vec::new(),
            client,
            turnouts: Vec::new(),
        });
        let last = self.transitions.len() - 1;
        Ok(&mut self.transitions[last])
    }

    /// Moves the train from `from` to `to` as soon as the guard holds.
    pub fn add_eager_block_transition(
        &mut self,
        layout: &mut Layout,
        from: &Block,
        to: &Block,
    ) -> Result<&mut Transition> {
        self.add_transition(layout, from, to, None)
    }

    /// Like [`add_eager_block_transition`](Self::add_eager_block_transition),
    /// but waits for `client`'s permission first.
    pub fn add_block_transition_on_permit(
        &mut self,
        layout: &mut Layout,
        from: &Block,
        to: &Block,
        client: FlipFlopClient,
    ) -> Result<&mut Transition> {
        self.add_transition(layout, from, to, Some(client))
    }

    /// The train parks for good once it is in `block`.
    pub fn stop_train_at(&mut self, layout: &mut Layout, block: &Block) -> Result<()> {
        self.entry(layout, block)?;
        self.stops.push(block.name().to_string());
        Ok(())
    }

    /// Whether a stale location in `block` is dropped on restart.
    ///
    /// Off by default. The check runs once occupancy has settled and skips a
    /// block the train is still being routed into.
    pub fn set_direction_sensitive(
        &mut self,
        layout: &mut Layout,
        block: &Block,
        sensitive: bool,
    ) -> Result<()> {
        self.entry(layout, block)?.location.direction_sensitive = sensitive;
        Ok(())
    }

    fn init_rules(&self, window: u8) -> Vec<Rule> {
        let recovering = ScheduleState::Recovering.id();
        let mut rules = Vec::new();
        for entry in self.locations.values() {
            let loc = entry.location;
            if loc.direction_sensitive {
                rules.push(
                    Rule::new()
                        .in_state(recovering)
                        .timer_expired()
                        .when(loc.permaloc, true)
                        .when(loc.routingloc, false)
                        .when(entry.block.detector, false)
                        .set(loc.permaloc, false),
                );
            }
        }
        let mut done = Rule::new().in_state(recovering).timer_expired();
        for entry in self.locations.values() {
            done = done.set(entry.location.routingloc, false);
        }
        rules.push(done.goto(StateId::BASE));

        let mut reset = Rule::new().in_state(StateId::INIT).set(self.go, false);
        for t in &self.transitions {
            reset = reset.set(t.active, false);
        }
        rules.push(reset.load_timer(window).goto(recovering));
        rules
    }

    fn transition_rules(&self, t: &Transition) -> Vec<Rule> {
        use ScheduleState::*;

        let src = &self.locations[&t.from];
        let dst = &self.locations[&t.to];
        let at = |state: ScheduleState| Rule::new().in_state(state.id()).when(t.active, true);
        let mut rules = Vec::new();

        let mut pick = Rule::new()
            .in_state(Waiting.id())
            .when(src.location.permaloc, true);
        for &(var, value) in &t.guard {
            pick = pick.when(var, value);
        }
        rules.push(
            pick.set(t.active, true)
                .set(dst.location.routingloc, true)
                .goto(ReadyToGo.id()),
        );

        match &t.client {
            Some(client) => {
                rules.push(at(ReadyToGo).set(client.request, true).goto(RequestTransition.id()));
                rules.push(
                    at(RequestTransition)
                        .when(client.granted, true)
                        .goto(TestCondition.id()),
                );
                let mut pass = at(TestCondition);
                for &(var, value) in &t.guard {
                    pass = pass.when(var, value);
                }
                rules.push(pass.goto(Turnout.id()));
                for &(var, value) in &t.guard {
                    rules.push(
                        at(TestCondition)
                            .when(var, !value)
                            .set(client.request, false)
                            .set(dst.location.routingloc, false)
                            .set(t.active, false)
                            .goto(Waiting.id()),
                    );
                }
            }
            None => rules.push(at(ReadyToGo).goto(Turnout.id())),
        }

        if !t.turnouts.is_empty() {
            let mut command = at(Turnout);
            let mut ready = at(Turnout);
            for &(magnet, position) in &t.turnouts {
                command = command.set(magnet.command, position.bit());
                ready = ready.when(magnet.current, position.bit());
            }
            rules.push(command);
            rules.push(ready.goto(RequestGreen.id()));
        } else {
            rules.push(at(Turnout).goto(RequestGreen.id()));
        }

        rules.push(
            at(RequestGreen)
                .set(src.block.request_green, true)
                .goto(GreenWait.id()),
        );
        rules.push(
            at(GreenWait)
                .when(src.block.route_out, true)
                .goto(StartTrain.id()),
        );

        let mut start = at(StartTrain)
            .set(self.go, true)
            .set(dst.location.permaloc, true)
            .set(src.location.permaloc, false);
        if let Some(client) = &t.client {
            start = start.set(client.taken, true).set(client.request, false);
        }
        rules.push(start.goto(Moving.id()));

        rules.push(
            at(Moving)
                .when(dst.block.detector, true)
                .set(self.go, false)
                .goto(StopTrain.id()),
        );
        rules.push(
            at(StopTrain)
                .when(src.block.route_out, false)
                .set(src.block.request_green, false)
                .goto(TransitionDone.id()),
        );
        rules.push(
            at(TransitionDone)
                .set(t.active, false)
                .set(dst.location.routingloc, false)
                .goto(StateId::BASE),
        );
        rules
    }
}

impl RuleSource for TrainSchedule {
    fn name(&self) -> &str {
        &self.name
    }

    fn build(&self, layout: &Layout) -> Result<Automaton> {
        let mut rules = Vec::new();

        for stop in &self.stops {
            let loc = self.locations[stop].location;
            rules.push(
                Rule::new()
                    .in_state(StateId::BASE)
                    .when(loc.permaloc, true)
                    .set(self.go, false)
                    .goto(ScheduleState::StopTrain.id()),
            );
        }

        let mut sources: Vec<&str> = Vec::new();
        for t in &self.transitions {
            if !sources.contains(&t.from.as_str()) {
                sources.push(&t.from);
            }
        }
        for source in sources {
            rules.push(
                Rule::new()
                    .in_state(StateId::BASE)
                    .when(self.locations[source].location.permaloc, true)
                    .goto(ScheduleState::Waiting.id()),
            );
        }

        for t in &self.transitions {
            rules.extend(self.transition_rules(t));
        }

        let mut set = RuleSet::new(&self.name);
        set.contribute(Phase::Schedule, rules);
        // One pass more than the slowest filter, so the order in which the
        // boards evaluate does not matter.
        let window = layout.max_debounce_cycles().saturating_add(1);
        set.contribute(Phase::Init, self.init_rules(window));
        Ok(set.build())
    }
}

// ============================================================================
// Tests
// ============================================================================
