//! Signalled blocks.
//!
//! A [`Block`] is the unit trains are scheduled on: an approach piece (longer
//! than a train), a detector piece where the train stops, and the signal
//! protecting the exit. The three are bound in that order when the block is
//! created, and only the outer sides are exposed for binding.
//!
//! ```rust
//! use rs_interlock::{Block, Config, Layout};
//!
//! let mut layout = Layout::new(&Config::default());
//! let b1 = Block::new(&mut layout, "B1").unwrap();
//! let b2 = Block::new(&mut layout, "B2").unwrap();
//! layout.bind_sequence(&[&b1, &b2]).unwrap();
//! layout.validate().unwrap();
//! ```

use crate::error::Result;
use crate::topology::{ElementId, InterfaceId, Layout, StraightRun};
use crate::variable::{join_name, VarId};

/// Approach, detector and signal bound in sequence.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Block {
    name: String,
    approach: ElementId,
    body: ElementId,
    signal: ElementId,
    detector: VarId,
    request_green: VarId,
    aspect: VarId,
}

impl Block {
    /// Creates a block watched by an external detector bit `<name>.detector`.
    pub fn new(layout: &mut Layout, name: &str) -> Result<Self> {
        let detector = layout.external(&join_name(name, "detector"))?;
        let approach = layout.add_long(&join_name(name, "approach"))?;
        let body = layout.add_detector(&join_name(name, "body"), detector)?;
        Self::finish(layout, name, approach, body, detector)
    }

    /// Creates a block whose occupancy is debounced from the raw sensor bit
    /// `<name>.raw`, over the layout's configured window.
    pub fn with_raw_detector(layout: &mut Layout, name: &str) -> Result<Self> {
        let raw = layout.external(&join_name(name, "raw"))?;
        let approach = layout.add_long(&join_name(name, "approach"))?;
        let cycles = layout.debounce_cycles();
        let body = layout.add_raw_detector(&join_name(name, "body"), raw, cycles)?;
        let detector = layout.element(body)?.occupancy;
        Self::finish(layout, name, approach, body, detector)
    }

    fn finish(
        layout: &mut Layout,
        name: &str,
        approach: ElementId,
        body: ElementId,
        detector: VarId,
    ) -> Result<Self> {
        let request_green = layout.external(&join_name(name, "request_green"))?;
        let aspect = layout.external(&join_name(name, "signal"))?;
        let signal = layout.add_signal(&join_name(name, "signal_piece"), request_green, aspect)?;
        layout.bind_sequence(&[&approach, &body, &signal])?;
        Ok(Self {
            name: name.to_string(),
            approach,
            body,
            signal,
            detector,
            request_green,
            aspect,
        })
    }

    /// Block name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The approach piece.
    pub fn approach(&self) -> ElementId {
        self.approach
    }

    /// The piece carrying the detector.
    pub fn body(&self) -> ElementId {
        self.body
    }

    /// The signal piece.
    pub fn signal_piece(&self) -> ElementId {
        self.signal
    }

    /// Occupancy of the stopping section.
    pub fn detector(&self) -> VarId {
        self.detector
    }

    /// Input asking the exit signal to show proceed.
    pub fn request_green(&self) -> VarId {
        self.request_green
    }

    /// Exit signal aspect output.
    pub fn signal(&self) -> VarId {
        self.aspect
    }

    /// Route set into the block through its entry.
    pub fn route_in(&self, layout: &Layout) -> Result<VarId> {
        Ok(layout.element(self.approach)?.directions[0].route)
    }

    /// Route set out of the block past its exit signal.
    pub fn route_out(&self, layout: &Layout) -> Result<VarId> {
        Ok(layout.element(self.signal)?.directions[0].route)
    }
}

impl StraightRun for Block {
    fn side_a(&self, layout: &Layout) -> Result<InterfaceId> {
        layout.side_a(self.approach)
    }

    fn side_b(&self, layout: &Layout) -> Result<InterfaceId> {
        layout.side_b(self.signal)
    }
}

// ============================================================================
// Tests
// ============================================================================
