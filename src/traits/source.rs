//! Automaton sources.

use crate::error::Result;
use crate::rule::Automaton;
use crate::topology::Layout;

/// Contributes one automaton to a compiled program.
///
/// Implementations read the layout (bindings, element variables) but never
/// modify it; every variable they need was allocated when they were
/// declared.
///
/// # Example
///
/// ```rust
/// use rs_interlock::error::Result;
/// use rs_interlock::rule::{Automaton, Phase, Rule, RuleSet};
/// use rs_interlock::traits::RuleSource;
/// use rs_interlock::variable::VarId;
/// use rs_interlock::Layout;
///
/// struct Mirror {
///     from: VarId,
///     to: VarId,
/// }
///
/// impl RuleSource for Mirror {
///     fn name(&self) -> &str {
///         "mirror"
///     }
///
///     fn build(&self, _layout: &Layout) -> Result<Automaton> {
///         let mut rules = RuleSet::new(self.name());
///         rules.push(Phase::CopyState, Rule::new().when(self.from, true).set(self.to, true));
///         rules.push(Phase::CopyState, Rule::new().when(self.from, false).set(self.to, false));
///         Ok(rules.build())
///     }
/// }
/// ```
pub trait RuleSource {
    /// Automaton name, unique within a program.
    fn name(&self) -> &str;

    /// Compiles the automaton.
    fn build(&self, layout: &Layout) -> Result<Automaton>;
}
