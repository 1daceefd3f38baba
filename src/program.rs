//! Compiled programs and emitters.
//!
//! [`Program::build`] is the compile entry point: it validates the layout,
//! compiles one automaton per track element plus every extra
//! [`RuleSource`], and refuses to produce anything if a defect is found.
//!
//! ```rust
//! use rs_interlock::{Block, Config, Layout, Program, TextEmitter};
//!
//! let mut layout = Layout::new(&Config::default());
//! let b1 = Block::new(&mut layout, "B1").unwrap();
//! let b2 = Block::new(&mut layout, "B2").unwrap();
//! layout.bind_sequence(&[&b1, &b2]).unwrap();
//!
//! let program = Program::build(&layout, &[]).unwrap();
//! assert_eq!(program.automata().len(), 6);
//!
//! let mut listing = TextEmitter::new();
//! program.emit(&mut listing).unwrap();
//! assert!(listing.as_str().contains("automaton B1.signal_piece"));
//! ```

use core::fmt::{self, Write};
use std::collections::HashSet;

use log::info;

use crate::error::{BuildError, Result};
use crate::rule::{Act, Automaton, Cond};
use crate::topology::Layout;
use crate::traits::{RuleEmitter, RuleSource};
use crate::variable::VarTable;

/// Every automaton of a layout, in evaluation order, plus the variable table.
#[derive(Clone, Debug)]
pub struct Program {
    vars: VarTable,
    automata: Vec<Automaton>,
}

impl Program {
    /// Compiles `layout` and the extra `sources` (schedules, flip-flops).
    pub fn build(layout: &Layout, sources: &[&dyn RuleSource]) -> Result<Self> {
        layout.validate()?;
        let mut automata = layout.automata()?;
        for source in sources {
            automata.push(source.build(layout)?);
        }

        let mut names = HashSet::new();
        for automaton in &automata {
            if !names.insert(automaton.name.as_str()) {
                return Err(BuildError::DuplicateName(automaton.name.clone()));
            }
        }

        let program = Self {
            vars: layout.vars().clone(),
            automata,
        };
        info!(
            "compiled {} automata, {} rules, {} variables ({} of {} addresses used)",
            program.automata.len(),
            program.rule_count(),
            program.vars.variables().len(),
            program.vars.used(),
            program.vars.used() + program.vars.remaining(),
        );
        Ok(program)
    }

    /// The variable table the program refers to.
    pub fn vars(&self) -> &VarTable {
        &self.vars
    }

    /// Automata in evaluation order.
    pub fn automata(&self) -> &[Automaton] {
        &self.automata
    }

    /// Looks an automaton up by name.
    pub fn automaton(&self, name: &str) -> Option<&Automaton> {
        self.automata.iter().find(|a| a.name == name)
    }

    /// Total number of rules.
    pub fn rule_count(&self) -> usize {
        self.automata.iter().map(|a| a.rules.len()).sum()
    }

    /// Feeds every automaton to `emitter`.
    pub fn emit<E: RuleEmitter>(&self, emitter: &mut E) -> core::result::Result<(), E::Error> {
        for automaton in &self.automata {
            emitter.automaton(&self.vars, automaton)?;
        }
        emitter.finish(&self.vars)
    }

    /// Serializes variables (with event ids) and automata to JSON.
    #[cfg(feature = "serde")]
    pub fn to_json(&self) -> serde_json::Result<String> {
        #[derive(serde::Serialize)]
        struct Export<'a> {
            variables: &'a [crate::variable::VariableInfo],
            automata: &'a [Automaton],
        }
        serde_json::to_string_pretty(&Export {
            variables: self.vars.variables(),
            automata: &self.automata,
        })
    }
}

/// Renders a human-readable listing, one `IF ... THEN ...` line per rule.
#[derive(Clone, Debug, Default)]
pub struct TextEmitter {
    out: String,
}

impl TextEmitter {
    /// Creates an empty listing.
    pub fn new() -> Self {
        Self::default()
    }

    /// The listing so far.
    pub fn as_str(&self) -> &str {
        &self.out
    }

    /// Consumes the emitter.
    pub fn into_string(self) -> String {
        self.out
    }
}

impl RuleEmitter for TextEmitter {
    type Error = fmt::Error;

    fn automaton(&mut self, vars: &VarTable, automaton: &Automaton) -> fmt::Result {
        writeln!(self.out, "automaton {}", automaton.name)?;
        for rule in &automaton.rules {
            write!(self.out, "  IF")?;
            if rule.conditions.is_empty() {
                write!(self.out, " TRUE")?;
            }
            for (i, cond) in rule.conditions.iter().enumerate() {
                if i > 0 {
                    write!(self.out, " AND")?;
                }
                match cond {
                    Cond::Var(v, value) => write!(self.out, " {} == {}", vars.name_of(*v), u8::from(*value))?,
                    Cond::State(s) => write!(self.out, " state == {}", s)?,
                    Cond::NotState(s) => write!(self.out, " state != {}", s)?,
                    Cond::TimerExpired => write!(self.out, " timer == 0")?,
                }
            }
            write!(self.out, " THEN")?;
            for (i, act) in rule.actions.iter().enumerate() {
                if i > 0 {
                    write!(self.out, ";")?;
                }
                match act {
                    Act::Set(v, value) => write!(self.out, " {} := {}", vars.name_of(*v), u8::from(*value))?,
                    Act::State(s) => write!(self.out, " state := {}", s)?,
                    Act::LoadTimer(n) => write!(self.out, " timer := {}", n)?,
                }
            }
            writeln!(self.out)?;
        }
        Ok(())
    }

    fn finish(&mut self, vars: &VarTable) -> fmt::Result {
        writeln!(self.out, "# {} variables", vars.variables().len())
    }
}

// ============================================================================
// Tests
// ============================================================================
