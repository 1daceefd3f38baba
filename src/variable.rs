//! Boolean state variables and the bit-space allocator.
//!
//! A variable is a single bit living on the bus. This layer never stores its
//! value; it only hands out stable addresses and the pair of event
//! identifiers (`on`, `off`) the runtime broadcasts when the bit changes.
//!
//! Addresses come from one [`VarTable`] per event block. Allocation is
//! append-only and scoped: a [`ScopedAllocator`] reserves a contiguous range
//! up front and names everything it hands out after its scope path.
//!
//! ```rust
//! use rs_interlock::variable::VarTable;
//!
//! let mut table = VarTable::new("layout", 0x0501_0101_2233_0000, 64);
//! let mut t1 = table.scope("t1", 8).unwrap();
//! let occ = t1.allocate("simulated_occ").unwrap();
//!
//! let info = table.info(occ);
//! assert_eq!(info.name, "layout.t1.simulated_occ");
//! assert_eq!(info.event_on + 1, info.event_off);
//! ```

use core::fmt;
use std::collections::HashMap;

use log::debug;

use crate::error::{BuildError, Result};

/// Stable address of a variable inside its event block.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct VarId(pub u32);

impl VarId {
    /// Index into dense per-variable storage.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for VarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Metadata recorded for every allocated variable.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VariableInfo {
    /// Address within the block.
    pub id: VarId,
    /// Fully-qualified dotted name.
    pub name: String,
    /// Event broadcast when the bit becomes 1.
    pub event_on: u64,
    /// Event broadcast when the bit becomes 0.
    pub event_off: u64,
}

/// Joins a parent path and a child component with `.`, skipping empties.
pub fn join_name(parent: &str, child: &str) -> String {
    match (parent.is_empty(), child.is_empty()) {
        (_, true) => parent.to_string(),
        (true, false) => child.to_string(),
        (false, false) => format!("{}.{}", parent, child),
    }
}

/// The bit space of one event block and the registry of its variables.
#[derive(Debug, Clone)]
pub struct VarTable {
    name: String,
    event_base: u64,
    next: u32,
    end: u32,
    vars: Vec<VariableInfo>,
    by_name: HashMap<String, VarId>,
}

impl VarTable {
    /// Creates an empty table of `size` addresses.
    pub fn new(name: &str, event_base: u64, size: u32) -> Self {
        Self {
            name: name.to_string(),
            event_base,
            next: 0,
            end: size,
            vars: Vec::new(),
            by_name: HashMap::new(),
        }
    }

    /// Table (root scope) name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Addresses not yet reserved.
    pub fn remaining(&self) -> u32 {
        self.end - self.next
    }

    /// Number of addresses handed out so far, including scope padding.
    pub fn used(&self) -> u32 {
        self.next
    }

    /// All named variables in allocation order.
    pub fn variables(&self) -> &[VariableInfo] {
        &self.vars
    }

    /// Metadata for an address.
    ///
    /// # Panics
    ///
    /// Panics if `id` was not handed out by this table.
    pub fn info(&self, id: VarId) -> &VariableInfo {
        let pos = self
            .vars
            .binary_search_by_key(&id, |v| v.id)
            .unwrap_or_else(|_| panic!("variable {} not allocated from '{}'", id, self.name));
        &self.vars[pos]
    }

    /// Name of a variable, or a placeholder for foreign ids.
    pub fn name_of(&self, id: VarId) -> &str {
        self.vars
            .binary_search_by_key(&id, |v| v.id)
            .map(|pos| self.vars[pos].name.as_str())
            .unwrap_or("?")
    }

    /// Looks a variable up by its fully-qualified name.
    pub fn find(&self, name: &str) -> Option<VarId> {
        self.by_name.get(name).copied()
    }

    /// Highest address plus one, for sizing dense value storage.
    pub fn span(&self) -> usize {
        self.next as usize
    }

    /// Allocates a single variable directly in the root scope.
    pub fn allocate(&mut self, name: &str) -> Result<VarId> {
        let first = self.reserve(1, name)?;
        let full = join_name(&self.name, name);
        self.register(first, full)
    }

    /// Reserves `count` addresses and returns an allocator for them.
    pub fn scope(&mut self, name: &str, count: u32) -> Result<ScopedAllocator<'_>> {
        let first = self.reserve(count, name)?;
        let prefix = join_name(&self.name, name);
        debug!("scope '{}' reserved [{}, {})", prefix, first, first + count);
        Ok(ScopedAllocator {
            table: self,
            prefix,
            next: first,
            end: first + count,
        })
    }

    fn reserve(&mut self, count: u32, caller: &str) -> Result<u32> {
        if count > self.remaining() {
            return Err(BuildError::AllocatorOverrun {
                scope: self.name.clone(),
                caller: caller.to_string(),
                requested: count,
                remaining: self.remaining(),
            });
        }
        let first = self.next;
        self.next += count;
        Ok(first)
    }

    fn register(&mut self, addr: u32, name: String) -> Result<VarId> {
        if self.by_name.contains_key(&name) {
            return Err(BuildError::DuplicateName(name));
        }
        let id = VarId(addr);
        let event_on = self.event_base + u64::from(addr) * 2;
        self.by_name.insert(name.clone(), id);
        let pos = self.vars.partition_point(|v| v.id < id);
        self.vars.insert(
            pos,
            VariableInfo {
                id,
                name,
                event_on,
                event_off: event_on + 1,
            },
        );
        Ok(id)
    }
}

/// Allocator over a contiguous reserved range of a [`VarTable`].
#[derive(Debug)]
pub struct ScopedAllocator<'a> {
    table: &'a mut VarTable,
    prefix: String,
    next: u32,
    end: u32,
}

impl ScopedAllocator<'_> {
    /// Fully-qualified scope name.
    pub fn name(&self) -> &str {
        &self.prefix
    }

    /// Addresses left in this scope.
    pub fn remaining(&self) -> u32 {
        self.end - self.next
    }

    /// Allocates one named variable.
    pub fn allocate(&mut self, name: &str) -> Result<VarId> {
        let addr = self.reserve(1, name)?;
        let full = join_name(&self.prefix, name);
        self.table.register(addr, full)
    }

    /// Reserves a nested scope of `count` addresses.
    pub fn scope(&mut self, name: &str, count: u32) -> Result<ScopedAllocator<'_>> {
        let first = self.reserve(count, name)?;
        let prefix = join_name(&self.prefix, name);
        Ok(ScopedAllocator {
            table: &mut *self.table,
            prefix,
            next: first,
            end: first + count,
        })
    }

    fn reserve(&mut self, count: u32, caller: &str) -> Result<u32> {
        if self.next + count > self.end {
            return Err(BuildError::AllocatorOverrun {
                scope: self.prefix.clone(),
                caller: caller.to_string(),
                requested: count,
                remaining: self.remaining(),
            });
        }
        let first = self.next;
        self.next += count;
        Ok(first)
    }
}

// ============================================================================
// Tests
// ============================================================================
