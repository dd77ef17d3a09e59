//! Voice command handling: text → [`Command`] → playback calls.

mod executor;
mod interpreter;

pub use executor::{qualified_query, split_qualifier, CommandErrorKind, CommandExecutor, CommandOutcome};
pub use interpreter::{
    normalize, Command, CommandInterpreter, CommandKind, Match, Matcher, PatternMatcher,
};
