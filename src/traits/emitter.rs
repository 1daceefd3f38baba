//! Rule emitters.

use crate::rule::Automaton;
use crate::variable::VarTable;

/// Turns compiled automata into a target encoding.
///
/// The compiler hands automata over in program order; an emitter must keep
/// the rule order of each automaton, since evaluation order is part of the
/// semantics.
pub trait RuleEmitter {
    /// Error raised by the target encoding.
    type Error;

    /// Emits one automaton. `vars` resolves variable names and event ids.
    fn automaton(&mut self, vars: &VarTable, automaton: &Automaton) -> Result<(), Self::Error>;

    /// Called once after the last automaton.
    fn finish(&mut self, _vars: &VarTable) -> Result<(), Self::Error> {
        Ok(())
    }
}
