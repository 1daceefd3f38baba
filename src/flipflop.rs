//! Round-robin permission server.
//!
//! Trains sharing a single-track section each register a
//! [`FlipFlopClient`]. At most one client holds `granted` at a time. The
//! holder gives the permission back by raising `taken` (it used it) or by
//! dropping `request` (it changed its mind); either way the search for the
//! next grant starts at the client after it, so two trains asking in turn
//! alternate instead of one starving the other.
//!
//! The server state is kept in the automaton's state register: for client
//! `i`, `free(i)` means nobody holds the permission and the search starts at
//! `i`, `held(i)` means client `i` holds it.

use log::debug;

use crate::error::{BuildError, Result};
use crate::rule::{Automaton, Phase, Rule, RuleSet, StateId};
use crate::topology::Layout;
use crate::traits::RuleSource;
use crate::variable::{join_name, VarId};

/// Handshake bits of one permission client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FlipFlopClient {
    /// Client name.
    pub name: String,
    /// Written by the client: it wants the permission.
    pub request: VarId,
    /// Written by the server: the client holds the permission.
    pub granted: VarId,
    /// Written by the client: the permission was used.
    pub taken: VarId,
}

/// A permission server over a list of clients.
#[derive(Clone, Debug)]
pub struct FlipFlop {
    name: String,
    clients: Vec<FlipFlopClient>,
}

impl FlipFlop {
    /// Creates a server with no clients.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            clients: Vec::new(),
        }
    }

    /// Registers a client, allocating its three handshake bits.
    pub fn add_client(&mut self, layout: &mut Layout, name: &str) -> Result<FlipFlopClient> {
        let mut scope = layout
            .vars_mut()
            .scope(&join_name(&self.name, name), 4)?;
        let client = FlipFlopClient {
            name: name.to_string(),
            request: scope.allocate("request")?,
            granted: scope.allocate("granted")?,
            taken: scope.allocate("taken")?,
        };
        debug!("flip-flop '{}' client {} '{}'", self.name, self.clients.len(), name);
        self.clients.push(client.clone());
        Ok(client)
    }

    /// Registered clients in round-robin order.
    pub fn clients(&self) -> &[FlipFlopClient] {
        &self.clients
    }

    fn free(&self, i: usize) -> Result<StateId> {
        self.state(2 + 2 * i)
    }

    fn held(&self, i: usize) -> Result<StateId> {
        self.state(3 + 2 * i)
    }

    fn state(&self, raw: usize) -> Result<StateId> {
        u8::try_from(raw)
            .map(StateId)
            .map_err(|_| BuildError::StateOverflow(self.name.clone()))
    }
}

impl RuleSource for FlipFlop {
    fn name(&self) -> &str {
        &self.name
    }

    fn build(&self, _layout: &Layout) -> Result<Automaton> {
        let n = self.clients.len();
        if n == 0 {
            return Err(BuildError::EmptyFlipFlop(self.name.clone()));
        }
        let mut rules = Vec::new();
        rules.push(Rule::new().in_state(StateId::BASE).goto(self.free(0)?));

        for (i, holder) in self.clients.iter().enumerate() {
            let next = self.free((i + 1) % n)?;
            rules.push(
                Rule::new()
                    .in_state(self.held(i)?)
                    .when(holder.taken, true)
                    .set(holder.granted, false)
                    .set(holder.taken, false)
                    .goto(next),
            );
            rules.push(
                Rule::new()
                    .in_state(self.held(i)?)
                    .when(holder.request, false)
                    .set(holder.granted, false)
                    .goto(next),
            );
        }

        for i in 0..n {
            for k in 0..n {
                let j = (i + k) % n;
                let skipped = (0..k).map(|s| self.clients[(i + s) % n].request);
                rules.push(
                    Rule::new()
                        .in_state(self.free(i)?)
                        .when(self.clients[j].request, true)
                        .when_all(skipped, false)
                        .set(self.clients[j].granted, true)
                        .goto(self.held(j)?),
                );
            }
        }

        let mut set = RuleSet::new(&self.name);
        set.contribute(Phase::Schedule, rules);
        Ok(set.build())
    }
}

// ============================================================================
// Tests
// ============================================================================
