use super::{PlaybackApi, SearchItem, SearchKind};
use crate::error::{BridgeError, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

/// One page of search results. Items can be `null` for removed playlists.
#[derive(Debug, Deserialize)]
struct SearchPage {
    #[serde(default)]
    items: Vec<Option<SearchItem>>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    #[serde(default)]
    message: Option<String>,
}

/// HTTP client for the Spotify Web API.
#[derive(Clone)]
pub struct SpotifyClient {
    http_client: Client,
    base_url: String,
}

impl SpotifyClient {
    /// Create a client for `base_url` (e.g. `https://api.spotify.com/v1`, or a mock server).
    pub fn with_base_url(base_url: String, timeout: Duration) -> Result<Self> {
        let http_client = Client::builder()
            .user_agent("voice-bridge/1.0")
            .timeout(timeout)
            .build()
            .map_err(|e| BridgeError::Configuration(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send(&self, request: RequestBuilder, operation: &str) -> Result<reqwest::Response> {
        let response = request
            .send()
            .await
            .map_err(|e| BridgeError::from_reqwest(operation, e))?;
        check_response_status(response, operation).await
    }

    async fn start_playback(&self, token: &str, body: Option<Value>, operation: &str) -> Result<()> {
        let mut request = self
            .http_client
            .put(self.url("/me/player/play"))
            .bearer_auth(token);
        request = match body {
            Some(body) => request.json(&body),
            // PUT without a body is rejected with 411 by some proxies
            None => request.header(reqwest::header::CONTENT_LENGTH, "0"),
        };
        self.send(request, operation).await?;
        Ok(())
    }
}

#[async_trait]
impl PlaybackApi for SpotifyClient {
    async fn resume(&self, token: &str) -> Result<()> {
        self.start_playback(token, None, "resume playback").await
    }

    async fn play_uris(&self, token: &str, uris: &[String]) -> Result<()> {
        self.start_playback(token, Some(json!({ "uris": uris })), "play uris")
            .await
    }

    async fn play_context(&self, token: &str, context_uri: &str) -> Result<()> {
        self.start_playback(
            token,
            Some(json!({ "context_uri": context_uri })),
            "play context",
        )
        .await
    }

    async fn pause(&self, token: &str) -> Result<()> {
        let request = self
            .http_client
            .put(self.url("/me/player/pause"))
            .bearer_auth(token)
            .header(reqwest::header::CONTENT_LENGTH, "0");
        self.send(request, "pause playback").await?;
        Ok(())
    }

    async fn next(&self, token: &str) -> Result<()> {
        let request = self
            .http_client
            .post(self.url("/me/player/next"))
            .bearer_auth(token)
            .header(reqwest::header::CONTENT_LENGTH, "0");
        self.send(request, "skip to next").await?;
        Ok(())
    }

    async fn previous(&self, token: &str) -> Result<()> {
        let request = self
            .http_client
            .post(self.url("/me/player/previous"))
            .bearer_auth(token)
            .header(reqwest::header::CONTENT_LENGTH, "0");
        self.send(request, "skip to previous").await?;
        Ok(())
    }

    async fn add_to_queue(&self, token: &str, uri: &str) -> Result<()> {
        let request = self
            .http_client
            .post(self.url("/me/player/queue"))
            .bearer_auth(token)
            .query(&[("uri", uri)])
            .header(reqwest::header::CONTENT_LENGTH, "0");
        self.send(request, "add to queue").await?;
        Ok(())
    }

    async fn search(
        &self,
        token: &str,
        query: &str,
        kind: SearchKind,
    ) -> Result<Option<SearchItem>> {
        debug!(kind = %kind, "Searching catalogue");
        let request = self
            .http_client
            .get(self.url("/search"))
            .bearer_auth(token)
            .query(&[("q", query), ("type", kind.as_str()), ("limit", "1")]);
        let response = self.send(request, "search").await?;

        let mut pages: HashMap<String, SearchPage> = response
            .json()
            .await
            .map_err(|e| BridgeError::from_reqwest("failed to parse search response", e))?;

        Ok(pages
            .remove(&kind.result_key())
            .and_then(|page| page.items.into_iter().flatten().next()))
    }
}

/// Map a non-2xx response to `Upstream`, using the API's error message when present.
///
/// - 401 → token expired or invalid
/// - 404 on player endpoints → no active device
async fn check_response_status(
    response: reqwest::Response,
    operation: &str,
) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ApiErrorBody>(&body)
        .ok()
        .and_then(|b| b.error.message);

    let description = match (status, message) {
        (_, Some(message)) => format!("{} failed: {}", operation, message),
        (StatusCode::UNAUTHORIZED, None) => {
            format!("{} failed: access token expired or invalid", operation)
        }
        (_, None) => format!("{} failed: {}", operation, status),
    };

    Err(BridgeError::Upstream {
        status: status.as_u16(),
        description,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    fn client(server: &Server) -> SpotifyClient {
        SpotifyClient::with_base_url(server.url(), Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_search_returns_first_item() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/search")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("q".into(), r#"track:"imagine" artist:"john lennon""#.into()),
                Matcher::UrlEncoded("type".into(), "track".into()),
                Matcher::UrlEncoded("limit".into(), "1".into()),
            ]))
            .match_header("authorization", "Bearer tok")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"tracks":{"items":[{"name":"Imagine","uri":"spotify:track:7pKfPomDEeI4TPT6EOYjn9","popularity":80}]}}"#,
            )
            .create_async()
            .await;

        let item = client(&server)
            .search("tok", r#"track:"imagine" artist:"john lennon""#, SearchKind::Track)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(item.name, "Imagine");
        assert_eq!(item.uri, "spotify:track:7pKfPomDEeI4TPT6EOYjn9");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_search_no_results() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/search")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"albums":{"items":[]}}"#)
            .create_async()
            .await;

        let item = client(&server)
            .search("tok", "nothing", SearchKind::Album)
            .await
            .unwrap();
        assert!(item.is_none());
    }

    #[tokio::test]
    async fn test_search_skips_null_items() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/search")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"playlists":{"items":[null,{"name":"Focus","uri":"spotify:playlist:1"}]}}"#)
            .create_async()
            .await;

        let item = client(&server)
            .search("tok", "focus", SearchKind::Playlist)
            .await
            .unwrap();
        assert_eq!(item.map(|i| i.name).as_deref(), Some("Focus"));
    }

    #[tokio::test]
    async fn test_play_context_sends_body() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("PUT", "/me/player/play")
            .match_body(Matcher::Json(json!({"context_uri": "spotify:album:1"})))
            .with_status(204)
            .create_async()
            .await;

        client(&server)
            .play_context("tok", "spotify:album:1")
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_add_to_queue() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/me/player/queue")
            .match_query(Matcher::UrlEncoded("uri".into(), "spotify:track:1".into()))
            .with_status(204)
            .create_async()
            .await;

        client(&server)
            .add_to_queue("tok", "spotify:track:1")
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_no_active_device_is_upstream_error() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("PUT", "/me/player/pause")
            .with_status(404)
            .with_header("content-type", "application/json")
            .with_body(r#"{"error":{"status":404,"message":"Player command failed: No active device found"}}"#)
            .create_async()
            .await;

        let err = client(&server).pause("tok").await.unwrap_err();
        match err {
            BridgeError::Upstream { status, description } => {
                assert_eq!(status, 404);
                assert!(description.contains("No active device found"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unauthorized_without_body() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/me/player/next")
            .with_status(401)
            .create_async()
            .await;

        let err = client(&server).next("tok").await.unwrap_err();
        assert!(matches!(
            err,
            BridgeError::Upstream { status: 401, ref description } if description.contains("expired or invalid")
        ));
    }
}
