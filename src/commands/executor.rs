//! Command executor: resolves names through search and issues playback calls.
//!
//! Never returns an error; every failure becomes a [`CommandOutcome`] with
//! `success: false` and a [`CommandErrorKind`] the HTTP layer can map.

use super::interpreter::{Command, CommandKind};
use crate::auth::AccessGate;
use crate::error::BridgeError;
use crate::spotify::{PlaybackApi, SearchItem, SearchKind};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Separators splitting "<target> by <qualifier>" (English and Portuguese)
const QUALIFIER_SEPARATORS: &[&str] = &[" by ", " por ", " de "];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandErrorKind {
    /// No usable access token for the device
    NotAuthenticated,
    MissingArgument,
    NotFound,
    /// A remote call failed
    CommandFailed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandOutcome {
    pub success: bool,
    pub command: CommandKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<CommandErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl CommandOutcome {
    fn success(command: CommandKind, message: impl Into<String>) -> Self {
        Self {
            success: true,
            command,
            message: message.into(),
            error: None,
            details: None,
        }
    }

    fn failure(command: CommandKind, kind: CommandErrorKind, message: impl Into<String>) -> Self {
        Self {
            success: false,
            command,
            message: message.into(),
            error: Some(kind),
            details: None,
        }
    }

    fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn is_not_authenticated(&self) -> bool {
        self.error == Some(CommandErrorKind::NotAuthenticated)
    }
}

pub struct CommandExecutor {
    gate: Arc<AccessGate>,
    playback: Arc<dyn PlaybackApi>,
}

impl CommandExecutor {
    pub fn new(gate: Arc<AccessGate>, playback: Arc<dyn PlaybackApi>) -> Self {
        Self { gate, playback }
    }

    pub async fn execute_command(&self, command: &Command, device_id: &str) -> CommandOutcome {
        self.execute(command.kind, command.argument.as_deref(), device_id)
            .await
    }

    /// Execute one command for a device.
    pub async fn execute(
        &self,
        kind: CommandKind,
        argument: Option<&str>,
        device_id: &str,
    ) -> CommandOutcome {
        let token = match self.gate.get_valid_access_token(device_id).await {
            Ok(Some(token)) => token,
            Ok(None) | Err(BridgeError::Integrity(_)) => {
                warn!(device_id = %device_id, command = %kind, "Device not authenticated");
                return CommandOutcome::failure(
                    kind,
                    CommandErrorKind::NotAuthenticated,
                    "Device not authenticated or token expired",
                );
            }
            Err(e) => {
                error!(device_id = %device_id, command = %kind, error = %e, "Failed to obtain access token");
                return CommandOutcome::failure(
                    kind,
                    CommandErrorKind::CommandFailed,
                    format!("Error executing '{}'", kind),
                )
                .with_details(e.to_string());
            }
        };

        match self.dispatch(&token, kind, argument).await {
            Ok(outcome) => {
                info!(
                    device_id = %device_id,
                    command = %kind,
                    success = outcome.success,
                    "Command executed"
                );
                outcome
            }
            Err(e) => {
                error!(device_id = %device_id, command = %kind, error = %e, "Error executing command");
                CommandOutcome::failure(
                    kind,
                    CommandErrorKind::CommandFailed,
                    format!("Error executing '{}'", kind),
                )
                .with_details(e.to_string())
            }
        }
    }

    async fn dispatch(
        &self,
        token: &str,
        kind: CommandKind,
        argument: Option<&str>,
    ) -> crate::error::Result<CommandOutcome> {
        match kind {
            CommandKind::Play => {
                self.playback.resume(token).await?;
                return Ok(CommandOutcome::success(kind, "Playback resumed"));
            }
            CommandKind::Pause => {
                self.playback.pause(token).await?;
                return Ok(CommandOutcome::success(kind, "Playback paused"));
            }
            CommandKind::Next => {
                self.playback.next(token).await?;
                return Ok(CommandOutcome::success(kind, "Skipped to next track"));
            }
            CommandKind::Previous => {
                self.playback.previous(token).await?;
                return Ok(CommandOutcome::success(kind, "Went to previous track"));
            }
            _ => {}
        }

        let search_kind = match kind {
            CommandKind::PlayTrack | CommandKind::AddToQueue => SearchKind::Track,
            CommandKind::PlayArtist => SearchKind::Artist,
            CommandKind::PlayAlbum => SearchKind::Album,
            _ => SearchKind::Playlist,
        };
        let label = entity_label(search_kind);

        let Some(name) = argument.map(str::trim).filter(|n| !n.is_empty()) else {
            return Ok(CommandOutcome::failure(
                kind,
                CommandErrorKind::MissingArgument,
                format!("No {} name found", label.to_lowercase()),
            ));
        };

        let Some(item) = self.resolve(token, name, search_kind).await? else {
            return Ok(CommandOutcome::failure(
                kind,
                CommandErrorKind::NotFound,
                format!("{} '{}' not found", label, name),
            ));
        };

        let message = match kind {
            CommandKind::AddToQueue => {
                self.playback.add_to_queue(token, &item.uri).await?;
                format!("Added '{}' to the queue", item.name)
            }
            CommandKind::PlayTrack => {
                self.playback
                    .play_uris(token, std::slice::from_ref(&item.uri))
                    .await?;
                format!("Playing track: {}", item.name)
            }
            _ => {
                self.playback.play_context(token, &item.uri).await?;
                format!("Playing {}: {}", label.to_lowercase(), item.name)
            }
        };
        Ok(CommandOutcome::success(kind, message))
    }

    /// Qualified search first, then the raw name as a fallback.
    async fn resolve(
        &self,
        token: &str,
        name: &str,
        kind: SearchKind,
    ) -> crate::error::Result<Option<SearchItem>> {
        let qualified = qualified_query(name, kind);
        if let Some(item) = self.playback.search(token, &qualified, kind).await? {
            return Ok(Some(item));
        }
        self.playback.search(token, name, kind).await
    }
}

fn entity_label(kind: SearchKind) -> &'static str {
    match kind {
        SearchKind::Track => "Track",
        SearchKind::Artist => "Artist",
        SearchKind::Album => "Album",
        SearchKind::Playlist => "Playlist",
    }
}

/// Field-qualified search query. Tracks and albums accept an artist qualifier
/// (`imagine by john lennon` → `track:"imagine" artist:"john lennon"`).
/// Double quotes inside the name are dropped so each field value stays one
/// quoted phrase.
pub fn qualified_query(name: &str, kind: SearchKind) -> String {
    let field = kind.as_str();
    match kind {
        SearchKind::Track | SearchKind::Album => match split_qualifier(name) {
            (target, Some(artist)) => format!(
                r#"{}:"{}" artist:"{}""#,
                field,
                strip_quotes(target),
                strip_quotes(artist)
            ),
            (target, None) => format!(r#"{}:"{}""#, field, strip_quotes(target)),
        },
        _ => format!(r#"{}:"{}""#, field, strip_quotes(name)),
    }
}

fn strip_quotes(value: &str) -> String {
    value
        .chars()
        .filter(|c| !matches!(c, '"' | '“' | '”'))
        .collect::<String>()
        .trim()
        .to_string()
}

/// Split "<target> <sep> <qualifier>" on the first separator present, tried
/// in order. Separators are matched case-insensitively.
pub fn split_qualifier(name: &str) -> (&str, Option<&str>) {
    // ASCII lower-casing keeps byte offsets aligned with `name`
    let lowered = name.to_ascii_lowercase();
    for sep in QUALIFIER_SEPARATORS {
        if let Some(idx) = lowered.find(sep) {
            let target = name[..idx].trim();
            let qualifier = name[idx + sep.len()..].trim();
            if !target.is_empty() && !qualifier.is_empty() {
                return (target, Some(qualifier));
            }
        }
    }
    (name, None)
}
