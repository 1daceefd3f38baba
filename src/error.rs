//! Build-time defects.
//!
//! Everything in this crate runs offline, before a layout is flashed to the
//! boards. A malformed topology is a programmer error in the layout
//! declaration, so every variant here is fatal: the compiler refuses to
//! produce a [`Program`](crate::program::Program) rather than emit logic that
//! might be unsafe.
//!
//! Protocol contention (a denied route, a permission not yet granted) is not
//! an error at this layer. It exists only as held state in the compiled
//! rules and is resolved by re-evaluation at runtime.

use thiserror::Error;

/// Fatal errors raised while building or compiling a layout.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    /// The bit-space allocator ran out of addresses.
    #[error("allocator '{scope}' overrun reserving {requested} entries for '{caller}' ({remaining} left)")]
    AllocatorOverrun {
        /// Fully-qualified scope that overflowed.
        scope: String,
        /// What was being allocated.
        caller: String,
        /// Number of addresses requested.
        requested: u32,
        /// Number of addresses left in the scope.
        remaining: u32,
    },

    /// A configuration name does not fit its fixed-capacity string.
    #[error("name '{name}' is longer than {max} bytes")]
    NameTooLong {
        /// The rejected name.
        name: String,
        /// Capacity in bytes.
        max: usize,
    },

    /// Two variables or two elements share a fully-qualified name.
    #[error("duplicate identifier '{0}'")]
    DuplicateName(String),

    /// An element id does not belong to this layout.
    #[error("unknown element #{0}")]
    UnknownElement(usize),

    /// An interface was queried for its neighbor but was never bound.
    #[error("interface '{element}.{side}' is not bound")]
    Unbound {
        /// Owning element name.
        element: String,
        /// Side name (`a`, `b`, `points`, ...).
        side: String,
    },

    /// Binding an interface that is already bound, or to itself.
    #[error("interface '{element}.{side}' is already bound or self-bound")]
    AlreadyBound {
        /// Owning element name.
        element: String,
        /// Side name.
        side: String,
    },

    /// A sequence bind was given an element that has no a/b sides.
    #[error("element '{0}' is not a straight piece and cannot be sequence-bound")]
    NotStraight(String),

    /// A turnout accessor was given an element that is not a turnout.
    #[error("element '{0}' is not a turnout")]
    NotTurnout(String),

    /// Neither a close nor a far detector is reachable from an interface.
    #[error("no occupancy detector reachable from '{element}.{side}'")]
    NoDetector {
        /// Element the lookup started from.
        element: String,
        /// Side the lookup started from.
        side: String,
    },

    /// Detector lookup delegated around a loop of non-detecting elements.
    #[error("detector lookup from '{0}' delegates in a cycle")]
    LookupCycle(String),

    /// An automaton needs more local states than the runtime register holds.
    #[error("automaton '{0}' ran out of local states")]
    StateOverflow(String),

    /// An element's rules need a bit its variant never allocated.
    #[error("element '{element}' has no '{var}' bit")]
    MissingVariable {
        /// Element name.
        element: String,
        /// Local name of the missing bit.
        var: String,
    },

    /// A permission server was compiled with no clients.
    #[error("flip-flop '{0}' has no clients")]
    EmptyFlipFlop(String),
}

/// Result alias used throughout the crate.
pub type Result<T> = core::result::Result<T, BuildError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrun_message_names_scope_and_caller() {
        let err = BuildError::AllocatorOverrun {
            scope: "layout.t1".into(),
            caller: "route_set_ab".into(),
            requested: 1,
            remaining: 0,
        };
        let msg = err.to_string();
        assert!(msg.contains("layout.t1"));
        assert!(msg.contains("route_set_ab"));
    }

    #[test]
    fn unbound_message() {
        let err = BuildError::Unbound {
            element: "t1".into(),
            side: "b".into(),
        };
        assert_eq!(err.to_string(), "interface 't1.b' is not bound");
    }
}
