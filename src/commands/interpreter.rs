//! Free-text command interpreter.
//!
//! Text is normalized (lower-cased, filler phrases removed, whitespace
//! collapsed) and then tested against an ordered list of `(matcher, kind)`
//! rules. The first rule that matches wins, so name-bearing "play X <name>"
//! rules sit ahead of the bare "play" rule.

use crate::error::{BridgeError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Politeness and wake-word phrases removed before matching (English and Portuguese)
const FILLER_PHRASES: &[&str] = &[
    "please",
    "can you",
    "could you",
    "would you",
    "spotify",
    "por favor",
    "você pode",
    "voce pode",
    "poderia",
    "seria possível",
    "seria possivel",
];

/// Characters trimmed from both ends of a captured argument
const ARGUMENT_TRIM: &[char] = &[' ', '.', '!', '?', ',', ';'];

const PLAY_VERB: &str = r"(?:play|tocar?|ouvir|escutar?)";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    Play,
    Pause,
    Next,
    Previous,
    PlayTrack,
    PlayArtist,
    PlayAlbum,
    PlayPlaylist,
    AddToQueue,
}

impl CommandKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandKind::Play => "play",
            CommandKind::Pause => "pause",
            CommandKind::Next => "next",
            CommandKind::Previous => "previous",
            CommandKind::PlayTrack => "play_track",
            CommandKind::PlayArtist => "play_artist",
            CommandKind::PlayAlbum => "play_album",
            CommandKind::PlayPlaylist => "play_playlist",
            CommandKind::AddToQueue => "add_to_queue",
        }
    }

    /// Whether the command needs a name to act on
    pub fn takes_argument(&self) -> bool {
        !matches!(
            self,
            CommandKind::Play | CommandKind::Pause | CommandKind::Next | CommandKind::Previous
        )
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A recognized command with its optional trailing argument
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Command {
    pub kind: CommandKind,
    pub argument: Option<String>,
}

/// Result of a successful match: the captured argument, if the rule captures one
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Match {
    pub argument: Option<String>,
}

/// A single recognition rule, tested against already-normalized text.
pub trait Matcher: Send + Sync {
    /// `None` when the text does not match this rule.
    fn matches(&self, text: &str) -> Option<Match>;
}

/// Regex matcher. The first capture group, if the pattern has one, becomes
/// the argument.
pub struct PatternMatcher {
    regex: Regex,
}

impl PatternMatcher {
    pub fn new(pattern: &str) -> Result<Self> {
        let regex = Regex::new(&format!("(?i){}", pattern)).map_err(|e| {
            BridgeError::Configuration(format!("invalid command pattern {:?}: {}", pattern, e))
        })?;
        Ok(Self { regex })
    }
}

impl Matcher for PatternMatcher {
    fn matches(&self, text: &str) -> Option<Match> {
        let captures = self.regex.captures(text)?;
        let argument = captures
            .get(1)
            .map(|m| m.as_str().trim_matches(ARGUMENT_TRIM).to_string())
            .filter(|arg| !arg.is_empty());
        Some(Match { argument })
    }
}

pub struct CommandInterpreter {
    rules: Vec<(Box<dyn Matcher>, CommandKind)>,
}

impl CommandInterpreter {
    /// Interpreter with the built-in English/Portuguese rule table.
    pub fn new() -> Result<Self> {
        let table: [(String, CommandKind); 9] = [
            (
                format!(r"^{}\s+(?:album|álbum)\s+(.+)", PLAY_VERB),
                CommandKind::PlayAlbum,
            ),
            (
                format!(r"^{}\s+artista?\s+(.+)", PLAY_VERB),
                CommandKind::PlayArtist,
            ),
            (
                format!(r"^{}\s+(?:m[uú]sica|track|song)\s+(.+)", PLAY_VERB),
                CommandKind::PlayTrack,
            ),
            (
                format!(r"^{}\s+playlist\s+(.+)", PLAY_VERB),
                CommandKind::PlayPlaylist,
            ),
            (
                r"^(?:add\s+to\s+queue|queue\s+song|adicionar\s+na\s+fila|colocar\s+na\s+fila)\s+(.+)"
                    .to_string(),
                CommandKind::AddToQueue,
            ),
            (
                r"^(?:play|resume|continue|retomar|continuar|tocar)$".to_string(),
                CommandKind::Play,
            ),
            (
                r"^(?:pause|stop|hold|pausar|parar|segurar)$".to_string(),
                CommandKind::Pause,
            ),
            (
                r"^(?:next|skip|forward|pr[oó]xima|pular|avan[cç]ar)$".to_string(),
                CommandKind::Next,
            ),
            (
                r"^(?:previous|back|rewind|last|anterior|voltar|retroceder|[uú]ltima)$"
                    .to_string(),
                CommandKind::Previous,
            ),
        ];

        let mut interpreter = Self::empty();
        for (pattern, kind) in table {
            interpreter.push(Box::new(PatternMatcher::new(&pattern)?), kind);
        }
        Ok(interpreter)
    }

    /// Interpreter with no rules; every input parses to `None`.
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// Append a rule at the lowest priority.
    pub fn push(&mut self, matcher: Box<dyn Matcher>, kind: CommandKind) {
        self.rules.push((matcher, kind));
    }

    /// Command kinds in the order they are tried
    pub fn priority(&self) -> Vec<CommandKind> {
        self.rules.iter().map(|(_, kind)| *kind).collect()
    }

    /// Parse free text into a command.
    ///
    /// `None` means no actionable command was found; it is not an error.
    pub fn parse(&self, text: &str) -> Option<Command> {
        let normalized = normalize(text);
        if normalized.is_empty() {
            return None;
        }

        let command = self.rules.iter().find_map(|(matcher, kind)| {
            matcher.matches(&normalized).map(|m| Command {
                kind: *kind,
                argument: m.argument,
            })
        });

        match &command {
            Some(c) => debug!(command = %c.kind, has_argument = c.argument.is_some(), "Parsed command"),
            None => debug!("No command recognized"),
        }
        command
    }
}

/// Lower-case, strip filler phrases (longest first), collapse whitespace and
/// drop trailing punctuation.
pub fn normalize(text: &str) -> String {
    let mut phrases: Vec<&str> = FILLER_PHRASES.to_vec();
    phrases.sort_by(|a, b| b.chars().count().cmp(&a.chars().count()));

    let mut normalized = text.to_lowercase();
    for phrase in phrases {
        normalized = normalized.replace(phrase, " ");
    }

    normalized
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_matches(ARGUMENT_TRIM)
        .to_string()
}
