//! Twitter/X API v2 implementation of the platform gateway.
//!
//! Authenticates with an OAuth 2.0 user-context bearer token. The API returns
//! mentions newest first; they are handed to the dispatch engine oldest first.
//! A 429 response is waited out (capped by config) and the request is retried once.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::HeaderMap;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::GatewayConfig;
use crate::error::{ReplyError, Result};
use crate::event::InboundEvent;
use crate::gateway::{BotIdentity, PlatformGateway};

/// Bounds the mentions endpoint accepts for `max_results`
const MENTIONS_PAGE_MIN: u32 = 5;
const MENTIONS_PAGE_MAX: u32 = 100;
const DM_PAGE_MAX: u32 = 100;

/// Extra attempts after a rate-limited response
const RATE_LIMIT_RETRIES: u32 = 1;
/// Wait used when a 429 carries no reset hint
const FALLBACK_RATE_LIMIT_WAIT_SECS: u64 = 60;

#[derive(Debug, Deserialize)]
struct UserResponse {
    data: Option<User>,
}

#[derive(Debug, Deserialize)]
struct User {
    id: String,
    username: String,
}

#[derive(Debug, Deserialize)]
struct TweetsResponse {
    #[serde(default)]
    data: Vec<Tweet>,
}

#[derive(Debug, Deserialize)]
struct Tweet {
    id: String,
    text: String,
    #[serde(default)]
    author_id: String,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct DmEventsResponse {
    #[serde(default)]
    data: Vec<DmEvent>,
}

#[derive(Debug, Deserialize)]
struct DmEvent {
    id: String,
    #[serde(default)]
    text: String,
    sender_id: String,
    created_at: DateTime<Utc>,
}

/// Platform gateway backed by the Twitter/X v2 REST API
pub struct XGateway {
    client: Client,
    base_url: String,
    access_token: String,
    max_results: u32,
    rate_limit_max_wait: Duration,
    identity: OnceLock<BotIdentity>,
}

impl XGateway {
    /// Create a gateway from configuration and an access token
    pub fn new(config: &GatewayConfig, access_token: String) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(config.request_timeout_secs))
                .build()
                .unwrap_or_else(|_| Client::new()),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            access_token,
            max_results: config.max_results,
            rate_limit_max_wait: Duration::from_secs(config.rate_limit_max_wait_secs),
            identity: OnceLock::new(),
        }
    }

    /// The identity cached by [`PlatformGateway::resolve_self_identity`]
    pub fn identity(&self) -> Option<&BotIdentity> {
        self.identity.get()
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn self_id(&self) -> Result<&str> {
        self.identity
            .get()
            .map(|identity| identity.id.as_str())
            .ok_or(ReplyError::IdentityUnresolved)
    }

    /// Send a request, waiting out one rate limit before giving up
    async fn send(
        &self,
        operation: &'static str,
        request: impl Fn() -> RequestBuilder,
    ) -> Result<Response> {
        let mut attempt = 0;
        loop {
            let response = request()
                .bearer_auth(&self.access_token)
                .send()
                .await
                .map_err(|source| ReplyError::Gateway { operation, source })?;

            if response.status() == StatusCode::TOO_MANY_REQUESTS && attempt < RATE_LIMIT_RETRIES
            {
                let delay =
                    rate_limit_delay(response.headers(), Utc::now(), self.rate_limit_max_wait);
                warn!(
                    operation,
                    delay_secs = delay.as_secs(),
                    "Rate limited by platform; waiting before retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
                continue;
            }
            return check_status(operation, response).await;
        }
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        operation: &'static str,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let url = self.url(path);
        let response = self
            .send(operation, || self.client.get(&url).query(query))
            .await?;
        response
            .json::<T>()
            .await
            .map_err(|e| ReplyError::MalformedResponse(format!("{}: {}", operation, e)))
    }

    async fn post_json(
        &self,
        operation: &'static str,
        path: &str,
        body: serde_json::Value,
    ) -> Result<()> {
        let url = self.url(path);
        self.send(operation, || self.client.post(&url).json(&body))
            .await?;
        Ok(())
    }
}

/// How long to wait after a 429: `retry-after` seconds, else until
/// `x-rate-limit-reset` (epoch seconds), never longer than `cap`.
fn rate_limit_delay(headers: &HeaderMap, now: DateTime<Utc>, cap: Duration) -> Duration {
    let header_u64 = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u64>().ok())
    };

    let wait = if let Some(secs) = header_u64("retry-after") {
        Duration::from_secs(secs)
    } else if let Some(reset) = header_u64("x-rate-limit-reset") {
        let remaining = i64::try_from(reset).unwrap_or(i64::MAX) - now.timestamp();
        Duration::from_secs(u64::try_from(remaining).unwrap_or(0))
    } else {
        Duration::from_secs(FALLBACK_RATE_LIMIT_WAIT_SECS)
    };
    wait.min(cap)
}

async fn check_status(operation: &'static str, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ReplyError::GatewayRejected {
        operation,
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl PlatformGateway for XGateway {
    async fn resolve_self_identity(&self) -> Result<BotIdentity> {
        let response: UserResponse = self.get_json("resolve identity", "/users/me", &[]).await?;
        let user = response.data.ok_or_else(|| {
            ReplyError::MalformedResponse("resolve identity: response has no user".to_string())
        })?;
        let identity = BotIdentity {
            id: user.id,
            username: user.username,
        };
        let _ = self.identity.set(identity.clone());
        Ok(identity)
    }

    async fn fetch_mentions(&self) -> Result<Vec<InboundEvent>> {
        let path = format!("/users/{}/mentions", self.self_id()?);
        let page = self.max_results.clamp(MENTIONS_PAGE_MIN, MENTIONS_PAGE_MAX);
        let response: TweetsResponse = self
            .get_json(
                "fetch mentions",
                &path,
                &[
                    ("max_results", page.to_string()),
                    ("tweet.fields", "created_at,author_id".to_string()),
                ],
            )
            .await?;

        let mut mentions: Vec<InboundEvent> = response
            .data
            .into_iter()
            .map(|tweet| InboundEvent::mention(tweet.id, tweet.created_at, tweet.text, tweet.author_id))
            .collect();
        mentions.sort_by_key(|event| event.created_at);
        debug!("Fetched {} mentions", mentions.len());
        Ok(mentions)
    }

    async fn fetch_direct_messages(&self) -> Result<Vec<InboundEvent>> {
        let self_id = self.self_id()?.to_string();
        let page = self.max_results.min(DM_PAGE_MAX);
        let response: DmEventsResponse = self
            .get_json(
                "fetch direct messages",
                "/dm_events",
                &[
                    ("max_results", page.to_string()),
                    ("event_types", "MessageCreate".to_string()),
                    ("dm_event.fields", "id,text,sender_id,created_at".to_string()),
                ],
            )
            .await?;

        // The endpoint also lists messages the bot sent itself
        let messages: Vec<InboundEvent> = response
            .data
            .into_iter()
            .filter(|dm| dm.sender_id != self_id)
            .map(|dm| InboundEvent::direct_message(dm.id, dm.created_at, dm.text, dm.sender_id))
            .collect();
        debug!("Fetched {} direct messages", messages.len());
        Ok(messages)
    }

    async fn reply_to_mention(&self, event_id: &str, text: &str) -> Result<()> {
        self.post_json(
            "reply to mention",
            "/tweets",
            json!({
                "text": text,
                "reply": { "in_reply_to_tweet_id": event_id }
            }),
        )
        .await
    }

    async fn send_direct_message(&self, sender_id: &str, text: &str) -> Result<()> {
        let path = format!("/dm_conversations/with/{}/messages", sender_id);
        self.post_json("send direct message", &path, json!({ "text": text }))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn gateway_for(server: &MockServer) -> XGateway {
        let config = GatewayConfig {
            base_url: server.uri(),
            ..GatewayConfig::default()
        };
        XGateway::new(&config, "test_token".to_string())
    }

    async fn mount_identity(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/users/me"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": { "id": "42", "name": "Bot", "username": "codebot" }
            })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_resolve_identity() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users/me"))
            .and(header("Authorization", "Bearer test_token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": { "id": "42", "name": "Bot", "username": "codebot" }
            })))
            .mount(&server)
            .await;

        let gateway = gateway_for(&server);
        let identity = gateway.resolve_self_identity().await.unwrap();
        assert_eq!(identity.id, "42");
        assert_eq!(identity.username, "codebot");
        assert_eq!(gateway.identity(), Some(&identity));
    }

    #[tokio::test]
    async fn test_resolve_identity_unauthorized() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users/me"))
            .respond_with(ResponseTemplate::new(401).set_body_string("Unauthorized"))
            .mount(&server)
            .await;

        let result = gateway_for(&server).resolve_self_identity().await;
        assert!(matches!(
            result,
            Err(ReplyError::GatewayRejected { status: 401, .. })
        ));
    }

    #[tokio::test]
    async fn test_fetch_mentions_requires_identity() {
        let server = MockServer::start().await;
        let result = gateway_for(&server).fetch_mentions().await;
        assert!(matches!(result, Err(ReplyError::IdentityUnresolved)));
    }

    #[tokio::test]
    async fn test_fetch_mentions_oldest_first() {
        let server = MockServer::start().await;
        mount_identity(&server).await;
        Mock::given(method("GET"))
            .and(path("/users/42/mentions"))
            .and(query_param("tweet.fields", "created_at,author_id"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [
                    { "id": "3", "text": "@codebot third", "author_id": "7", "created_at": "2024-05-01T12:00:03.000Z" },
                    { "id": "2", "text": "@codebot second", "author_id": "8", "created_at": "2024-05-01T12:00:02.000Z" },
                    { "id": "1", "text": "@codebot first", "author_id": "9", "created_at": "2024-05-01T12:00:01.000Z" }
                ],
                "meta": { "result_count": 3 }
            })))
            .mount(&server)
            .await;

        let gateway = gateway_for(&server);
        gateway.resolve_self_identity().await.unwrap();
        let mentions = gateway.fetch_mentions().await.unwrap();

        let ids: Vec<_> = mentions.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2", "3"]);
        assert_eq!(mentions[0].sender_id, "9");
        assert_eq!(mentions[0].raw_text, "@codebot first");
    }

    #[tokio::test]
    async fn test_fetch_mentions_empty_page() {
        let server = MockServer::start().await;
        mount_identity(&server).await;
        Mock::given(method("GET"))
            .and(path("/users/42/mentions"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "meta": { "result_count": 0 } })),
            )
            .mount(&server)
            .await;

        let gateway = gateway_for(&server);
        gateway.resolve_self_identity().await.unwrap();
        assert!(gateway.fetch_mentions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_mentions_server_error() {
        let server = MockServer::start().await;
        mount_identity(&server).await;
        Mock::given(method("GET"))
            .and(path("/users/42/mentions"))
            .respond_with(ResponseTemplate::new(503).set_body_string("over capacity"))
            .mount(&server)
            .await;

        let gateway = gateway_for(&server);
        gateway.resolve_self_identity().await.unwrap();
        let err = gateway.fetch_mentions().await.unwrap_err();
        assert!(err.to_string().contains("503"), "Error: {}", err);
        assert!(!err.is_fatal());
    }

    #[tokio::test]
    async fn test_fetch_direct_messages_drops_own_messages() {
        let server = MockServer::start().await;
        mount_identity(&server).await;
        Mock::given(method("GET"))
            .and(path("/dm_events"))
            .and(query_param("event_types", "MessageCreate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [
                    { "id": "m2", "event_type": "MessageCreate", "text": "our answer", "sender_id": "42", "created_at": "2024-05-01T12:00:02.000Z" },
                    { "id": "m1", "event_type": "MessageCreate", "text": "what is E11.9", "sender_id": "7", "created_at": "2024-05-01T12:00:01.000Z" }
                ]
            })))
            .mount(&server)
            .await;

        let gateway = gateway_for(&server);
        gateway.resolve_self_identity().await.unwrap();
        let messages = gateway.fetch_direct_messages().await.unwrap();

        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].id, "m1");
        assert_eq!(messages[0].sender_id, "7");
        assert_eq!(messages[0].raw_text, "what is E11.9");
    }

    #[tokio::test]
    async fn test_rate_limited_fetch_waits_and_retries() {
        let server = MockServer::start().await;
        mount_identity(&server).await;
        Mock::given(method("GET"))
            .and(path("/users/42/mentions"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "0"))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/users/42/mentions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [
                    { "id": "1", "text": "@codebot hi", "author_id": "9", "created_at": "2024-05-01T12:00:01.000Z" }
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let gateway = gateway_for(&server);
        gateway.resolve_self_identity().await.unwrap();
        let mentions = gateway.fetch_mentions().await.unwrap();

        assert_eq!(mentions.len(), 1);
        assert_eq!(mentions[0].id, "1");
    }

    #[tokio::test]
    async fn test_rate_limit_wait_is_capped() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/dm_conversations/with/7/messages"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "3600"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/dm_conversations/with/7/messages"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "data": {} })))
            .expect(1)
            .mount(&server)
            .await;

        let config = GatewayConfig {
            base_url: server.uri(),
            rate_limit_max_wait_secs: 0,
            ..GatewayConfig::default()
        };
        let gateway = XGateway::new(&config, "test_token".to_string());

        tokio::time::timeout(Duration::from_secs(5), gateway.send_direct_message("7", "hi"))
            .await
            .expect("capped wait should not block for the full hour")
            .unwrap();
    }

    #[tokio::test]
    async fn test_persistent_rate_limit_fails_after_one_retry() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tweets"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "0"))
            .expect(2)
            .mount(&server)
            .await;

        let result = gateway_for(&server).reply_to_mention("123", "hi").await;
        assert!(matches!(
            result,
            Err(ReplyError::GatewayRejected { status: 429, .. })
        ));
    }

    #[test]
    fn test_rate_limit_delay_from_headers() {
        let now = DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let cap = Duration::from_secs(900);

        let mut headers = HeaderMap::new();
        headers.insert("retry-after", "12".parse().unwrap());
        assert_eq!(rate_limit_delay(&headers, now, cap), Duration::from_secs(12));

        let mut headers = HeaderMap::new();
        let reset = (now.timestamp() + 30).to_string();
        headers.insert("x-rate-limit-reset", reset.parse().unwrap());
        assert_eq!(rate_limit_delay(&headers, now, cap), Duration::from_secs(30));

        // A reset already in the past means no wait
        let mut headers = HeaderMap::new();
        let reset = (now.timestamp() - 30).to_string();
        headers.insert("x-rate-limit-reset", reset.parse().unwrap());
        assert_eq!(rate_limit_delay(&headers, now, cap), Duration::ZERO);

        assert_eq!(
            rate_limit_delay(&HeaderMap::new(), now, cap),
            Duration::from_secs(FALLBACK_RATE_LIMIT_WAIT_SECS)
        );

        let mut headers = HeaderMap::new();
        headers.insert("retry-after", "5000".parse().unwrap());
        assert_eq!(rate_limit_delay(&headers, now, cap), cap);
    }

    #[tokio::test]
    async fn test_reply_to_mention_posts_reply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tweets"))
            .and(body_json(json!({
                "text": "E11.9",
                "reply": { "in_reply_to_tweet_id": "123" }
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "data": { "id": "124", "text": "E11.9" }
            })))
            .expect(1)
            .mount(&server)
            .await;

        gateway_for(&server)
            .reply_to_mention("123", "E11.9")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_send_direct_message_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/dm_conversations/with/7/messages"))
            .respond_with(ResponseTemplate::new(403).set_body_string("not following"))
            .mount(&server)
            .await;

        let result = gateway_for(&server).send_direct_message("7", "hello").await;
        match result {
            Err(ReplyError::GatewayRejected { status, body, .. }) => {
                assert_eq!(status, 403);
                assert_eq!(body, "not following");
            }
            other => panic!("Expected GatewayRejected, got {:?}", other),
        }
    }
}
