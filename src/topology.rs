//! Track topology: the element arena, interface binding and detector lookup.
//!
//! A [`Layout`] owns every interface and element of a layout plus the
//! variable table they allocate from. Elements and interfaces are addressed
//! by index ([`ElementId`], [`InterfaceId`]); a binding is a symmetric
//! relation between two interface indices and never implies ownership.
//!
//! Element constructors live next to their rule generators:
//! [`Layout::add_short`](crate::track) and friends in [`crate::track`],
//! turnouts in [`crate::turnout`].
//!
//! # Detector lookup
//!
//! Every element answers "what is the nearest real detector seen from this
//! interface?", split into a close answer (within one train length) and a
//! far answer (beyond it). Elements without a detector delegate across
//! themselves to the neighbor bound on their other side.
//!
//! ```rust
//! use rs_interlock::{Config, Layout};
//!
//! let mut layout = Layout::new(&Config::default());
//! let det = layout.external("det.d1").unwrap();
//! let short = layout.add_short("s1").unwrap();
//! let detector = layout.add_detector("d1", det).unwrap();
//! layout.bind_sequence(&[&short, &detector]).unwrap();
//!
//! let from = layout.side_a(short).unwrap();
//! assert_eq!(layout.lookup_close_detector(from).unwrap(), Some(det));
//! ```

use core::fmt;
use std::collections::HashSet;

use log::debug;

use crate::config::Config;
use crate::error::{BuildError, Result};
use crate::route::Direction;
use crate::rule::Automaton;
use crate::track::StraightKind;
use crate::turnout::TurnoutKind;
use crate::variable::{ScopedAllocator, VarId, VarTable};

/// Number of addresses reserved per interface.
pub const INTERFACE_BITS: u32 = 8;

/// Index of an interface in its layout.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InterfaceId(pub usize);

/// Index of an element in its layout.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ElementId(pub usize);

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One endpoint of an element, carrying the four handshake bits.
///
/// `req` and `released` are written by the owning element; `granted` and
/// `denied` are written by the neighbor that answers the request.
#[derive(Clone, Debug)]
pub struct Interface {
    /// Side name (`a`, `b`, `points`, ...).
    pub side: &'static str,
    /// Owning element.
    pub owner: ElementId,
    /// Route request going out through this interface.
    pub req: VarId,
    /// Neighbor accepted the request.
    pub granted: VarId,
    /// Neighbor refused the request.
    pub denied: VarId,
    /// The owner let go of a previously granted route.
    pub released: VarId,
    binding: Option<InterfaceId>,
}

impl Interface {
    fn allocate(
        alloc: &mut ScopedAllocator<'_>,
        side: &'static str,
        owner: ElementId,
    ) -> Result<Self> {
        let mut scope = alloc.scope(side, INTERFACE_BITS)?;
        Ok(Self {
            side,
            owner,
            req: scope.allocate("out_try_set_route")?,
            granted: scope.allocate("in_route_set_success")?,
            denied: scope.allocate("in_route_set_failure")?,
            released: scope.allocate("out_route_released")?,
            binding: None,
        })
    }

    /// The interface this one is bound to, if any.
    pub fn binding(&self) -> Option<InterfaceId> {
        self.binding
    }
}

/// What kind of element sits in an arena slot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ElementKind {
    /// Two-sided piece of track (including signals).
    Straight(StraightKind),
    /// Three-sided turnout.
    Turnout(TurnoutKind),
    /// Single-sided route origin/terminus.
    Endpoint,
}

/// A track element and the variables it owns.
#[derive(Clone, Debug)]
pub struct Element {
    /// Unique element name.
    pub name: String,
    /// Variant.
    pub kind: ElementKind,
    /// Interfaces in declaration order (`a`,`b` or `points`,`closed`,`thrown`).
    pub sides: Vec<InterfaceId>,
    /// Occupancy bit (a real detector or a simulated one).
    pub occupancy: VarId,
    /// Latch set once the train was seen in the next element. Endpoints
    /// route nothing and have none.
    pub seen_train_in_next: Option<VarId>,
    /// Variant-specific helper bit (debounce shadow, signal used latch).
    pub helper: Option<VarId>,
    /// Supported route directions.
    pub directions: Vec<Direction>,
    /// Turnout position bit (0 closed, 1 thrown).
    pub position: Option<VarId>,
    /// Turnout aggregate of all direction bits.
    pub any_route_set: Option<VarId>,
}

impl Element {
    /// Route-set bits of every direction.
    pub fn route_bits(&self) -> impl Iterator<Item = VarId> + '_ {
        self.directions.iter().map(|d| d.route)
    }

    /// Route-pending bits of every direction.
    pub fn pending_bits(&self) -> impl Iterator<Item = VarId> + '_ {
        self.directions.iter().map(|d| d.pending)
    }

    pub(crate) fn seen_latch(&self) -> Result<VarId> {
        self.seen_train_in_next
            .ok_or_else(|| self.missing("tmp_seen_train_in_next"))
    }

    pub(crate) fn helper_bit(&self) -> Result<VarId> {
        self.helper.ok_or_else(|| self.missing("helper"))
    }

    fn missing(&self, var: &str) -> BuildError {
        BuildError::MissingVariable {
            element: self.name.clone(),
            var: var.to_string(),
        }
    }

    /// Looks up a direction by its entry and exit interfaces.
    pub fn direction(&self, from: InterfaceId, to: InterfaceId) -> Option<&Direction> {
        self.directions.iter().find(|d| d.from == from && d.to == to)
    }
}

/// A run of track with exactly two outer interfaces.
///
/// Implemented by straight elements and by composites such as
/// [`Block`](crate::block::Block), so both can be sequence-bound.
pub trait StraightRun {
    /// Entry side.
    fn side_a(&self, layout: &Layout) -> Result<InterfaceId>;
    /// Exit side.
    fn side_b(&self, layout: &Layout) -> Result<InterfaceId>;
}

impl StraightRun for ElementId {
    fn side_a(&self, layout: &Layout) -> Result<InterfaceId> {
        layout.side_a(*self)
    }

    fn side_b(&self, layout: &Layout) -> Result<InterfaceId> {
        layout.side_b(*self)
    }
}

/// Arena of interfaces and elements for one layout.
#[derive(Debug, Clone)]
pub struct Layout {
    vars: VarTable,
    interfaces: Vec<Interface>,
    elements: Vec<Element>,
    names: HashSet<String>,
    debounce_cycles: u8,
}

impl Layout {
    /// Creates an empty layout with a fresh variable table.
    pub fn new(config: &Config) -> Self {
        Self {
            vars: VarTable::new(
                config.board.name.as_str(),
                config.allocator.event_base,
                config.allocator.block_size,
            ),
            interfaces: Vec::new(),
            elements: Vec::new(),
            names: HashSet::new(),
            debounce_cycles: config.detector.debounce_cycles,
        }
    }

    /// Default filter window for raw sensor inputs.
    pub fn debounce_cycles(&self) -> u8 {
        self.debounce_cycles
    }

    /// Longest filter window among the layout's raw sensors and the default.
    pub fn max_debounce_cycles(&self) -> u8 {
        self.elements
            .iter()
            .filter_map(|e| match e.kind {
                ElementKind::Straight(StraightKind::RawDetector { debounce_cycles, .. }) => {
                    Some(debounce_cycles)
                }
                _ => None,
            })
            .fold(self.debounce_cycles, u8::max)
    }

    /// The variable table.
    pub fn vars(&self) -> &VarTable {
        &self.vars
    }

    /// Mutable access to the variable table, for allocating external bits.
    pub fn vars_mut(&mut self) -> &mut VarTable {
        &mut self.vars
    }

    /// Allocates an external variable (detector, signal output, ...).
    pub fn external(&mut self, name: &str) -> Result<VarId> {
        self.vars.allocate(name)
    }

    /// All elements.
    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    /// Element by id.
    pub fn element(&self, id: ElementId) -> Result<&Element> {
        self.elements
            .get(id.0)
            .ok_or(BuildError::UnknownElement(id.0))
    }

    /// Interface by id.
    ///
    /// # Panics
    ///
    /// Panics on an id from another layout.
    pub fn interface(&self, id: InterfaceId) -> &Interface {
        &self.interfaces[id.0]
    }

    /// Element owning an interface.
    pub fn owner(&self, id: InterfaceId) -> &Element {
        &self.elements[self.interface(id).owner.0]
    }

    /// Looks an element up by name.
    pub fn find(&self, name: &str) -> Option<ElementId> {
        self.elements
            .iter()
            .position(|e| e.name == name)
            .map(ElementId)
    }

    /// Creates an element slot: allocates its scope and interfaces, then
    /// lets `fill` allocate the variant-specific variables.
    pub(crate) fn insert_element<F>(
        &mut self,
        name: &str,
        kind: ElementKind,
        bits: u32,
        sides: &[&'static str],
        fill: F,
    ) -> Result<ElementId>
    where
        F: FnOnce(&mut ScopedAllocator<'_>, &[InterfaceId]) -> Result<ElementParts>,
    {
        if self.names.contains(name) {
            return Err(BuildError::DuplicateName(name.to_string()));
        }
        let id = ElementId(self.elements.len());
        let first_if = self.interfaces.len();
        let mut alloc = self.vars.scope(name, bits)?;

        let mut new_ifs = Vec::with_capacity(sides.len());
        for side in sides {
            new_ifs.push(Interface::allocate(&mut alloc, side, id)?);
        }
        let if_ids: Vec<InterfaceId> = (first_if..first_if + new_ifs.len())
            .map(InterfaceId)
            .collect();
        let parts = fill(&mut alloc, &if_ids)?;
        drop(alloc);

        debug!("element '{}' {:?} with {} directions", name, kind, parts.directions.len());
        self.names.insert(name.to_string());
        self.interfaces.extend(new_ifs);
        self.elements.push(Element {
            name: name.to_string(),
            kind,
            sides: if_ids,
            occupancy: parts.occupancy,
            seen_train_in_next: parts.seen_train_in_next,
            helper: parts.helper,
            directions: parts.directions,
            position: parts.position,
            any_route_set: parts.any_route_set,
        });
        Ok(id)
    }

    /// Entry side of a straight element.
    pub fn side_a(&self, id: ElementId) -> Result<InterfaceId> {
        self.straight_side(id, 0)
    }

    /// Exit side of a straight element.
    pub fn side_b(&self, id: ElementId) -> Result<InterfaceId> {
        self.straight_side(id, 1)
    }

    fn straight_side(&self, id: ElementId, index: usize) -> Result<InterfaceId> {
        let element = self.element(id)?;
        match element.kind {
            ElementKind::Straight(_) => Ok(element.sides[index]),
            _ => Err(BuildError::NotStraight(element.name.clone())),
        }
    }

    /// The single interface of an endpoint, or any element's first side.
    pub fn first_side(&self, id: ElementId) -> Result<InterfaceId> {
        Ok(self.element(id)?.sides[0])
    }

    /// Binds two interfaces symmetrically.
    ///
    /// Rebinding an interface, or binding one to itself, is a topology
    /// defect and fails.
    pub fn bind(&mut self, a: InterfaceId, b: InterfaceId) -> Result<()> {
        for id in [a, b] {
            if a == b || self.interfaces[id.0].binding.is_some() {
                let iface = &self.interfaces[id.0];
                return Err(BuildError::AlreadyBound {
                    element: self.elements[iface.owner.0].name.clone(),
                    side: iface.side.to_string(),
                });
            }
        }
        self.interfaces[a.0].binding = Some(b);
        self.interfaces[b.0].binding = Some(a);
        Ok(())
    }

    /// Binds consecutive runs: side b of each piece to side a of the next.
    pub fn bind_sequence(&mut self, pieces: &[&dyn StraightRun]) -> Result<()> {
        for pair in pieces.windows(2) {
            let b = pair[0].side_b(self)?;
            let a = pair[1].side_a(self)?;
            self.bind(b, a)?;
        }
        Ok(())
    }

    /// Binds arbitrary interface pairs (turnout branches, crossings).
    pub fn bind_pairs(&mut self, pairs: &[(InterfaceId, InterfaceId)]) -> Result<()> {
        for &(a, b) in pairs {
            self.bind(a, b)?;
        }
        Ok(())
    }

    /// The interface bound to `id`, if any.
    pub fn binding(&self, id: InterfaceId) -> Option<InterfaceId> {
        self.interfaces[id.0].binding
    }

    /// Like [`binding`](Self::binding) but an unbound interface is a defect.
    pub fn require_binding(&self, id: InterfaceId) -> Result<InterfaceId> {
        self.binding(id).ok_or_else(|| {
            let iface = self.interface(id);
            BuildError::Unbound {
                element: self.elements[iface.owner.0].name.clone(),
                side: iface.side.to_string(),
            }
        })
    }

    /// Occupancy bit of the element bound across `id`.
    pub fn neighbor_occupancy(&self, id: InterfaceId) -> Option<VarId> {
        self.binding(id).map(|n| self.owner(n).occupancy)
    }

    /// The interface a train entering at `from` leaves through.
    ///
    /// Straight pieces return the opposite side. Fixed turnouts return the
    /// branch selected by their permanent position; movable turnouts only
    /// answer for trains entering at a branch, since the exit from the points
    /// depends on runtime state.
    pub fn find_other_side(&self, from: InterfaceId) -> Option<InterfaceId> {
        let element = self.owner(from);
        match &element.kind {
            ElementKind::Straight(_) => {
                if element.sides[0] == from {
                    Some(element.sides[1])
                } else {
                    Some(element.sides[0])
                }
            }
            ElementKind::Turnout(kind) => kind.other_side(&element.sides, from),
            ElementKind::Endpoint => None,
        }
    }

    fn across(&self, from: InterfaceId) -> Option<InterfaceId> {
        self.find_other_side(from).and_then(|other| self.binding(other))
    }

    /// Nearest real detector within one train length from `from`.
    pub fn lookup_close_detector(&self, from: InterfaceId) -> Result<Option<VarId>> {
        self.close_inner(from, 0)
    }

    /// Nearest real detector beyond one train length from `from`.
    pub fn lookup_far_detector(&self, from: InterfaceId) -> Result<Option<VarId>> {
        self.far_inner(from, 0)
    }

    /// Close detector if there is one, else the far one.
    ///
    /// Finding neither means the layout has a stretch with no occupancy
    /// sensing at all, which is a defect.
    pub fn lookup_next_detector(&self, from: InterfaceId) -> Result<VarId> {
        self.next_inner(from, 0)?.ok_or_else(|| {
            let iface = self.interface(from);
            BuildError::NoDetector {
                element: self.owner(from).name.clone(),
                side: iface.side.to_string(),
            }
        })
    }

    fn check_depth(&self, from: InterfaceId, depth: usize) -> Result<()> {
        if depth > self.elements.len() {
            return Err(BuildError::LookupCycle(self.owner(from).name.clone()));
        }
        Ok(())
    }

    fn close_inner(&self, from: InterfaceId, depth: usize) -> Result<Option<VarId>> {
        self.check_depth(from, depth)?;
        let element = self.owner(from);
        match &element.kind {
            ElementKind::Straight(kind) if kind.has_detector() => Ok(Some(element.occupancy)),
            ElementKind::Straight(StraightKind::Long) | ElementKind::Endpoint => Ok(None),
            ElementKind::Straight(_) | ElementKind::Turnout(_) => match self.across(from) {
                Some(next) => self.close_inner(next, depth + 1),
                None => Ok(None),
            },
        }
    }

    fn far_inner(&self, from: InterfaceId, depth: usize) -> Result<Option<VarId>> {
        self.check_depth(from, depth)?;
        let element = self.owner(from);
        match &element.kind {
            ElementKind::Endpoint => Ok(None),
            // Long pieces and detectors both end the close range: whatever
            // comes next is beyond one train length.
            ElementKind::Straight(StraightKind::Long) => match self.across(from) {
                Some(next) => self.next_inner(next, depth + 1),
                None => Ok(None),
            },
            ElementKind::Straight(kind) if kind.has_detector() => match self.across(from) {
                Some(next) => self.next_inner(next, depth + 1),
                None => Ok(None),
            },
            ElementKind::Straight(_) | ElementKind::Turnout(_) => match self.across(from) {
                Some(next) => self.far_inner(next, depth + 1),
                None => Ok(None),
            },
        }
    }

    fn next_inner(&self, from: InterfaceId, depth: usize) -> Result<Option<VarId>> {
        match self.close_inner(from, depth)? {
            Some(det) => Ok(Some(det)),
            None => self.far_inner(from, depth),
        }
    }

    /// Checks every signal has a detector in front of it.
    pub fn validate(&self) -> Result<()> {
        for element in &self.elements {
            if let ElementKind::Straight(StraightKind::Signal { .. }) = element.kind {
                self.lookup_next_detector(element.sides[1])?;
            }
        }
        Ok(())
    }

    /// Builds one automaton per element.
    pub fn automata(&self) -> Result<Vec<Automaton>> {
        self.elements
            .iter()
            .map(|element| match &element.kind {
                ElementKind::Straight(kind) => crate::track::straight_automaton(self, element, kind),
                ElementKind::Turnout(kind) => crate::turnout::turnout_automaton(self, element, kind),
                ElementKind::Endpoint => crate::track::endpoint_automaton(self, element),
            })
            .collect()
    }
}

/// Variables and directions an element constructor allocates.
#[derive(Debug)]
pub(crate) struct ElementParts {
    pub occupancy: VarId,
    pub seen_train_in_next: Option<VarId>,
    pub helper: Option<VarId>,
    pub directions: Vec<Direction>,
    pub position: Option<VarId>,
    pub any_route_set: Option<VarId>,
}

// ============================================================================
// Tests
// ============================================================================
