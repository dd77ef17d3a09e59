//! Remote search and playback API.
//!
//! The command executor talks to the music service through [`PlaybackApi`] so
//! tests can substitute an in-memory implementation. [`SpotifyClient`] is the
//! HTTP implementation.

mod client;

pub use client::SpotifyClient;

use crate::error::Result;
use async_trait::async_trait;
use serde::Deserialize;
use std::fmt;

/// Catalogue item type for search
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchKind {
    Track,
    Artist,
    Album,
    Playlist,
}

impl SearchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchKind::Track => "track",
            SearchKind::Artist => "artist",
            SearchKind::Album => "album",
            SearchKind::Playlist => "playlist",
        }
    }

    /// Key of the result page in a search response (`tracks`, `albums`, ...)
    pub(crate) fn result_key(&self) -> String {
        format!("{}s", self.as_str())
    }
}

impl fmt::Display for SearchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// First search hit: what the executor needs to start playback and report back.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SearchItem {
    pub name: String,
    pub uri: String,
}

/// Bearer-token-authenticated playback operations.
///
/// Every call takes the access token explicitly; implementations hold no
/// per-device state.
#[async_trait]
pub trait PlaybackApi: Send + Sync {
    /// Resume playback on the active device.
    async fn resume(&self, token: &str) -> Result<()>;

    /// Start playback of specific item URIs (tracks).
    async fn play_uris(&self, token: &str, uris: &[String]) -> Result<()>;

    /// Start playback of a context (artist, album, playlist).
    async fn play_context(&self, token: &str, context_uri: &str) -> Result<()>;

    async fn pause(&self, token: &str) -> Result<()>;

    async fn next(&self, token: &str) -> Result<()>;

    async fn previous(&self, token: &str) -> Result<()>;

    async fn add_to_queue(&self, token: &str, uri: &str) -> Result<()>;

    /// Returns the first hit for `query`, or `None` when nothing matches.
    async fn search(&self, token: &str, query: &str, kind: SearchKind)
        -> Result<Option<SearchItem>>;
}
