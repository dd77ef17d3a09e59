// Integration tests for the HTTP API, with mockito standing in for the
// token endpoint and the playback API

use axum::{
    body::Body,
    http::{header, Request, Response, StatusCode},
    Router,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use mockito::{Matcher, Server, ServerGuard};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use voice_bridge::api::{create_router, AppState};
use voice_bridge::config::BridgeConfig;
use voice_bridge::credentials::{CredentialStore, TokenCipher};
use voice_bridge::spotify::SpotifyClient;
use voice_bridge::transcription::WhisperClient;

const SCOPE: &str = "user-read-playback-state user-modify-playback-state";

struct TestApp {
    router: Router,
    store: Arc<CredentialStore>,
    server: ServerGuard,
}

fn test_config(server_url: &str) -> BridgeConfig {
    let mut config = BridgeConfig::default();
    config.spotify.client_id = Some("cid".to_string());
    config.spotify.client_secret = Some("csecret".to_string());
    config.spotify.scope = Some(SCOPE.to_string());
    config.spotify.token_url = format!("{}/api/token", server_url);
    config.spotify.api_base_url = format!("{}/v1", server_url);
    config.auth.encryption_key = Some(BASE64.encode([9u8; 32]));
    config.storage.database_path = ":memory:".to_string();
    config.transcription.api_key = Some("sk-test".to_string());
    config.transcription.api_base_url = format!("{}/openai", server_url);
    config.transcription.timeout_secs = 5;
    config
}

async fn create_test_app_with(configure: impl FnOnce(&mut BridgeConfig)) -> TestApp {
    let server = Server::new_async().await;
    let mut config = test_config(&server.url());
    configure(&mut config);

    let key = BASE64.encode([9u8; 32]);
    let cipher = Arc::new(TokenCipher::new(&key).unwrap());
    let store = Arc::new(CredentialStore::new(":memory:", cipher).unwrap());
    let playback = Arc::new(
        SpotifyClient::with_base_url(config.spotify.api_base_url.clone(), Duration::from_secs(5))
            .unwrap(),
    );

    let transcriber = Arc::new(WhisperClient::from_config(&config.transcription).unwrap());

    let state =
        AppState::with_components(&config, Arc::clone(&store), playback, transcriber).unwrap();
    TestApp {
        router: create_router(state),
        store,
        server,
    }
}

async fn create_test_app() -> TestApp {
    create_test_app_with(|_| {}).await
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

const BOUNDARY: &str = "voice-bridge-test-boundary";

/// Multipart request with a `device_id` field and, when given, an `audio` file.
fn post_audio(device_id: &str, audio: Option<(&str, &str, &[u8])>) -> Request<Body> {
    let mut body = format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"device_id\"\r\n\r\n{id}\r\n",
        b = BOUNDARY,
        id = device_id
    )
    .into_bytes();
    if let Some((filename, content_type, data)) = audio {
        body.extend_from_slice(
            format!(
                "--{b}\r\nContent-Disposition: form-data; name=\"audio\"; filename=\"{f}\"\r\nContent-Type: {ct}\r\n\r\n",
                b = BOUNDARY,
                f = filename,
                ct = content_type
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

    Request::builder()
        .method("POST")
        .uri("/command")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

async fn body_string(response: Response<Body>) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_str(&body_string(response).await).unwrap()
}

fn state_param(auth_url: &str) -> String {
    let query = auth_url.split_once('?').unwrap().1;
    query
        .split('&')
        .find_map(|pair| pair.strip_prefix("state="))
        .unwrap()
        .to_string()
}

#[tokio::test]
async fn test_health() {
    let app = create_test_app().await;

    let response = app.router.oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["status"], "healthy");
}

#[tokio::test]
async fn test_auth_link_returns_url_with_state() {
    let app = create_test_app().await;

    let response = app.router.oneshot(get("/auth/link/kitchen")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["device_id"], "kitchen");
    assert_eq!(json["expires_in"], 300);
    let url = json["auth_url"].as_str().unwrap();
    assert!(url.contains("client_id=cid"));
    assert!(url.contains("response_type=code"));
    assert!(state_param(url).len() >= 43);
}

#[tokio::test]
async fn test_auth_link_rejects_overlong_device_id() {
    let app = create_test_app().await;
    let device_id = "d".repeat(256);

    let response = app
        .router
        .oneshot(get(&format!("/auth/link/{}", device_id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_auth_link_without_client_identity_is_server_error() {
    let app = create_test_app_with(|config| config.spotify.client_id = None).await;

    let response = app.router.oneshot(get("/auth/link/kitchen")).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let json = body_json(response).await;
    assert!(!json["error"].as_str().unwrap().contains("SPOTIFY_CLIENT_ID"));
}

#[tokio::test]
async fn test_auth_start_redirects_to_provider() {
    let app = create_test_app().await;

    let response = app.router.oneshot(get("/auth/start/kitchen")).await.unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    let location = response.headers()[header::LOCATION].to_str().unwrap();
    assert!(location.starts_with("https://accounts.spotify.com/authorize?"));
}

/// Link → callback → stored credential → status, then a replayed callback is rejected.
#[tokio::test]
async fn test_full_authorization_flow() {
    let mut app = create_test_app().await;
    let token_mock = app
        .server
        .mock("POST", "/api/token")
        .match_body(Matcher::UrlEncoded("code".into(), "auth-code".into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(format!(
            r#"{{"access_token":"a1","refresh_token":"r1","expires_in":3600,"scope":"{}"}}"#,
            SCOPE
        ))
        .expect(1)
        .create_async()
        .await;

    let response = app
        .router
        .clone()
        .oneshot(get("/auth/link/kitchen"))
        .await
        .unwrap();
    let json = body_json(response).await;
    let state = state_param(json["auth_url"].as_str().unwrap());

    let callback = format!("/auth/callback?code=auth-code&state={}", state);
    let response = app.router.clone().oneshot(get(&callback)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_string(response).await.contains("Success"));

    let record = app.store.get("kitchen").unwrap().unwrap();
    assert!(!record.is_expired());
    assert_eq!(app.store.access_token(&record).unwrap(), "a1");

    let response = app
        .router
        .clone()
        .oneshot(get("/device/kitchen/status"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let status = body_json(response).await;
    assert_eq!(status["is_expired"], false);
    assert_eq!(status["has_required_scopes"], true);

    // Replay: the state was consumed
    let response = app.router.oneshot(get(&callback)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(body_string(response).await.contains("Invalid or expired state"));

    token_mock.assert_async().await;
}

#[tokio::test]
async fn test_callback_with_provider_error() {
    let app = create_test_app().await;

    let response = app
        .router
        .oneshot(get("/auth/callback?error=access_denied&state=whatever"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(body_string(response).await.contains("access_denied"));
}

#[tokio::test]
async fn test_callback_missing_parameters() {
    let app = create_test_app().await;

    let response = app
        .router
        .oneshot(get("/auth/callback?code=only-code"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(body_string(response).await.contains("Missing required parameters"));
}

#[tokio::test]
async fn test_callback_escapes_provider_text() {
    let app = create_test_app().await;

    let response = app
        .router
        .oneshot(get(
            "/auth/callback?error=%3Cscript%3E&error_description=x",
        ))
        .await
        .unwrap();
    let body = body_string(response).await;
    assert!(!body.contains("<script>"));
    assert!(body.contains("&lt;script&gt;"));
}

#[tokio::test]
async fn test_command_without_credentials_is_unauthorized() {
    let app = create_test_app().await;

    let response = app
        .router
        .oneshot(post_json(
            "/command",
            serde_json::json!({"device_id": "kitchen", "text": "pause"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_command_text_without_command() {
    let app = create_test_app().await;

    let response = app
        .router
        .oneshot(post_json(
            "/command",
            serde_json::json!({"device_id": "kitchen", "text": "turn off the lights"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["success"], true);
    assert_eq!(json["action_taken"], false);
    assert!(json["command"].is_null());
}

#[tokio::test]
async fn test_command_pause_calls_playback_api() {
    let mut app = create_test_app().await;
    app.store
        .set_tokens("kitchen", "live-token", "r1", 3600, SCOPE)
        .unwrap();
    let pause_mock = app
        .server
        .mock("PUT", "/v1/me/player/pause")
        .match_header("authorization", "Bearer live-token")
        .with_status(204)
        .expect(1)
        .create_async()
        .await;

    let response = app
        .router
        .oneshot(post_json(
            "/command",
            serde_json::json!({"device_id": "kitchen", "text": "Please pause."}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["command"], "pause");
    assert_eq!(json["action_taken"], true);
    assert_eq!(json["message"], "Playback paused");
    pause_mock.assert_async().await;
}

#[tokio::test]
async fn test_command_play_album_not_found() {
    let mut app = create_test_app().await;
    app.store
        .set_tokens("kitchen", "live-token", "r1", 3600, SCOPE)
        .unwrap();
    let search_mock = app
        .server
        .mock("GET", "/v1/search")
        .match_query(Matcher::UrlEncoded("type".into(), "album".into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"albums":{"items":[]}}"#)
        .expect(2)
        .create_async()
        .await;

    let response = app
        .router
        .oneshot(post_json(
            "/command",
            serde_json::json!({"device_id": "kitchen", "text": "play album nothing here"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let json = body_json(response).await;
    assert_eq!(json["error"], "not_found");
    assert_eq!(json["argument"], "nothing here");
    search_mock.assert_async().await;
}

#[tokio::test]
async fn test_command_failure_hides_details_by_default() {
    let mut app = create_test_app().await;
    app.store
        .set_tokens("kitchen", "live-token", "r1", 3600, SCOPE)
        .unwrap();
    let _mock = app
        .server
        .mock("POST", "/v1/me/player/next")
        .with_status(404)
        .with_header("content-type", "application/json")
        .with_body(r#"{"error":{"status":404,"message":"No active device found"}}"#)
        .create_async()
        .await;

    let response = app
        .router
        .oneshot(post_json(
            "/command",
            serde_json::json!({"device_id": "kitchen", "text": "skip"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let json = body_json(response).await;
    assert_eq!(json["error"], "command_failed");
    assert!(json.get("details").is_none());
}

#[tokio::test]
async fn test_command_with_expired_token_refreshes_first() {
    let mut app = create_test_app().await;
    app.store
        .set_tokens("kitchen", "stale", "r1", 30, SCOPE)
        .unwrap();
    let refresh_mock = app
        .server
        .mock("POST", "/api/token")
        .match_body(Matcher::UrlEncoded("grant_type".into(), "refresh_token".into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"access_token":"fresh","expires_in":3600}"#)
        .expect(1)
        .create_async()
        .await;
    let play_mock = app
        .server
        .mock("PUT", "/v1/me/player/play")
        .match_header("authorization", "Bearer fresh")
        .with_status(204)
        .create_async()
        .await;

    let response = app
        .router
        .oneshot(post_json(
            "/command",
            serde_json::json!({"device_id": "kitchen", "text": "resume"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    refresh_mock.assert_async().await;
    play_mock.assert_async().await;
}

#[tokio::test]
async fn test_refresh_endpoint() {
    let mut app = create_test_app().await;
    app.store
        .set_tokens("kitchen", "a1", "r1", 3600, SCOPE)
        .unwrap();
    let _mock = app
        .server
        .mock("POST", "/api/token")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"access_token":"a2","expires_in":3600}"#)
        .create_async()
        .await;

    let response = app
        .router
        .clone()
        .oneshot(post_json(
            "/refresh",
            serde_json::json!({"device_id": "kitchen"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["success"], true);

    let record = app.store.get("kitchen").unwrap().unwrap();
    assert_eq!(app.store.access_token(&record).unwrap(), "a2");

    let response = app
        .router
        .oneshot(post_json(
            "/refresh",
            serde_json::json!({"device_id": "unknown"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "refresh_failed");
}

#[tokio::test]
async fn test_status_of_unknown_device() {
    let app = create_test_app().await;

    let response = app
        .router
        .oneshot(get("/device/nobody/status"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_audio_command_transcribed_and_executed() {
    let mut app = create_test_app().await;
    app.store
        .set_tokens("kitchen", "live-token", "r1", 3600, SCOPE)
        .unwrap();
    let transcription_mock = app
        .server
        .mock("POST", "/openai/audio/transcriptions")
        .match_header("authorization", "Bearer sk-test")
        .match_body(Matcher::Regex(r#"filename="command.wav""#.to_string()))
        .with_status(200)
        .with_header("content-type", "text/plain")
        .with_body("Skip.\n")
        .expect(1)
        .create_async()
        .await;
    let next_mock = app
        .server
        .mock("POST", "/v1/me/player/next")
        .match_header("authorization", "Bearer live-token")
        .with_status(204)
        .expect(1)
        .create_async()
        .await;

    let response = app
        .router
        .oneshot(post_audio(
            "kitchen",
            Some(("command.wav", "audio/wav", &b"RIFF0000WAVEfmt "[..])),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["text"], "Skip.");
    assert_eq!(json["command"], "next");
    assert_eq!(json["action_taken"], true);
    transcription_mock.assert_async().await;
    next_mock.assert_async().await;
}

#[tokio::test]
async fn test_audio_command_unauthenticated_skips_transcription() {
    let mut app = create_test_app().await;
    let transcription_mock = app
        .server
        .mock("POST", "/openai/audio/transcriptions")
        .expect(0)
        .create_async()
        .await;

    let response = app
        .router
        .oneshot(post_audio(
            "kitchen",
            Some(("command.wav", "audio/wav", &b"RIFF0000WAVEfmt "[..])),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    transcription_mock.assert_async().await;
}

#[tokio::test]
async fn test_audio_command_rejects_unsupported_format() {
    let app = create_test_app().await;
    app.store
        .set_tokens("kitchen", "live-token", "r1", 3600, SCOPE)
        .unwrap();

    let response = app
        .router
        .oneshot(post_audio(
            "kitchen",
            Some(("notes.txt", "text/plain", &b"pause"[..])),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let json = body_json(response).await;
    assert!(json["error"].as_str().unwrap().contains("Unsupported audio format"));
}

#[tokio::test]
async fn test_audio_command_requires_audio_file() {
    let app = create_test_app().await;

    let response = app.router.oneshot(post_audio("kitchen", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let json = body_json(response).await;
    assert_eq!(json["error"], "audio file is required");
}

#[tokio::test]
async fn test_audio_command_transcription_failure_is_bad_gateway() {
    let mut app = create_test_app().await;
    app.store
        .set_tokens("kitchen", "live-token", "r1", 3600, SCOPE)
        .unwrap();
    let _mock = app
        .server
        .mock("POST", "/openai/audio/transcriptions")
        .with_status(500)
        .with_body("upstream down")
        .create_async()
        .await;

    let response = app
        .router
        .oneshot(post_audio(
            "kitchen",
            Some(("command.webm", "audio/webm", &b"webm-bytes"[..])),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn test_auth_link_expiry_follows_configured_ttl() {
    let app = create_test_app_with(|config| config.auth.state_ttl_seconds = 120).await;

    let response = app.router.oneshot(get("/auth/link/kitchen")).await.unwrap();
    let json = body_json(response).await;
    assert_eq!(json["expires_in"], 120);
}
