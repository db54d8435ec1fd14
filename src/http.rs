//! Rate-limit–aware HTTP client for the Discord REST API.
//!
//! All outbound HTTP calls go through [`DiscordHttpClient`] so that auth
//! headers, rate-limit back-off, and error handling live in one place.
//! `reqwest` is an implementation detail; swapping HTTP backends only
//! requires touching this module.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_lock::Mutex;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use reqwest::{Method, StatusCode};
use tracing::{debug, warn};

use crate::api::DiscordApi;
use crate::error::HttpError;
use crate::types::*;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

const BASE_URL: &str = "https://discord.com/api/v10";
const USER_AGENT_VALUE: &str = "DiscordBot (https://github.com/Defelo/MorpheusHelper, 0.1)";
const MAX_RETRIES: u32 = 5;
const MAX_BACKOFF: Duration = Duration::from_secs(60);

// ---------------------------------------------------------------------------
// Rate-limit tracker (per-bucket)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct BucketState {
    remaining: u32,
    resets_at: Instant,
}

#[derive(Debug, Clone, Default)]
struct RateLimiter {
    /// Route-key → bucket id mapping.
    route_buckets: HashMap<String, String>,
    /// Bucket id → state.
    buckets: HashMap<String, BucketState>,
    /// Global rate-limit: no requests may be sent until this instant.
    global_until: Option<Instant>,
}

impl RateLimiter {
    /// How long to wait before sending on `route_key`, if at all.
    fn delay_for(&self, route_key: &str, now: Instant) -> Option<Duration> {
        if let Some(until) = self.global_until {
            if until > now {
                return Some(until - now);
            }
        }

        let bucket_id = self.route_buckets.get(route_key)?;
        let state = self.buckets.get(bucket_id)?;

        (state.remaining == 0 && state.resets_at > now).then(|| state.resets_at - now)
    }

    fn update(&mut self, route_key: &str, info: &RateLimitInfo, now: Instant) {
        let reset_after = info.reset_after.map(Duration::from_secs_f64);

        if info.is_global {
            if let Some(after) = reset_after {
                self.global_until = Some(now + after);
            }
        }

        if let Some(ref bucket) = info.bucket {
            self.route_buckets
                .insert(route_key.to_string(), bucket.clone());
            self.buckets.insert(
                bucket.clone(),
                BucketState {
                    remaining: info.remaining.unwrap_or(1),
                    resets_at: now + reset_after.unwrap_or(Duration::from_secs(1)),
                },
            );
        }
    }
}

fn parse_rate_limit_headers(headers: &HeaderMap) -> RateLimitInfo {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());

    RateLimitInfo {
        remaining: header("x-ratelimit-remaining").and_then(|s| s.parse().ok()),
        reset_after: header("x-ratelimit-reset-after").and_then(|s| s.parse().ok()),
        bucket: header("x-ratelimit-bucket").map(str::to_string),
        is_global: header("x-ratelimit-global") == Some("true"),
    }
}

// ---------------------------------------------------------------------------
// Request bodies
// ---------------------------------------------------------------------------

enum Body<'a> {
    Empty,
    Json(serde_json::Value),
    Multipart {
        payload: serde_json::Value,
        files: &'a [UploadFile],
    },
}

// ---------------------------------------------------------------------------
// DiscordHttpClient
// ---------------------------------------------------------------------------

/// A thin, rate-limit–aware HTTP client for the Discord REST API.
///
/// Cheap to clone (internals are behind `Arc`).
#[derive(Clone)]
pub struct DiscordHttpClient {
    token: String,
    client: reqwest::Client,
    limiter: Arc<Mutex<RateLimiter>>,
}

impl DiscordHttpClient {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            client: reqwest::Client::new(),
            limiter: Arc::new(Mutex::new(RateLimiter::default())),
        }
    }

    /// Send a request to `{BASE_URL}/{path}`, retrying on 429.
    ///
    /// `route_key` is used for per-route rate-limit bucketing. It should be a
    /// template like `POST /channels/{channel_id}/messages`.
    async fn request(
        &self,
        method: Method,
        path: &str,
        route_key: &str,
        body: Body<'_>,
    ) -> Result<Vec<u8>, HttpError> {
        let url = format!("{}/{}", BASE_URL, path.trim_start_matches('/'));

        for attempt in 0..=MAX_RETRIES {
            self.wait_for_bucket(route_key).await;

            let mut req = self
                .client
                .request(method.clone(), &url)
                .header(AUTHORIZATION, format!("Bot {}", self.token))
                .header(USER_AGENT, USER_AGENT_VALUE);

            req = match &body {
                Body::Empty => req,
                Body::Json(json) => req.json(json),
                Body::Multipart { payload, files } => {
                    let boundary = format!("MorpheusBoundary{:016x}", rand::random::<u64>());
                    let bytes = build_multipart(&boundary, payload, files)?;
                    req.header(
                        CONTENT_TYPE,
                        format!("multipart/form-data; boundary={}", boundary),
                    )
                    .body(bytes)
                }
            };

            let resp = req
                .send()
                .await
                .map_err(|e| HttpError::Transport(e.to_string()))?;

            let status = resp.status();
            let rl_info = parse_rate_limit_headers(resp.headers());
            self.limiter
                .lock()
                .await
                .update(route_key, &rl_info, Instant::now());

            if status == StatusCode::TOO_MANY_REQUESTS && attempt < MAX_RETRIES {
                let retry_after = rl_info.reset_after.unwrap_or(1.0);
                warn!(
                    route = route_key,
                    attempt,
                    retry_after_s = retry_after,
                    global = rl_info.is_global,
                    "rate-limited by Discord, backing off"
                );
                tokio::time::sleep(Duration::from_secs_f64(retry_after).min(MAX_BACKOFF)).await;
                continue;
            }

            let bytes = resp
                .bytes()
                .await
                .map_err(|e| HttpError::Transport(e.to_string()))?;

            if status.is_success() {
                return Ok(bytes.to_vec());
            }

            return Err(HttpError::Api {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&bytes).to_string(),
                route: route_key.to_string(),
            });
        }

        Err(HttpError::Api {
            status: 429,
            body: "rate-limited after max retries".to_string(),
            route: route_key.to_string(),
        })
    }

    async fn wait_for_bucket(&self, route_key: &str) {
        let delay = self.limiter.lock().await.delay_for(route_key, Instant::now());
        if let Some(delay) = delay {
            let delay = delay.min(MAX_BACKOFF);
            debug!(
                route = route_key,
                delay_ms = delay.as_millis() as u64,
                "rate-limit pre-emptive backoff"
            );
            tokio::time::sleep(delay).await;
        }
    }

    async fn request_json<T: serde::de::DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        route_key: &str,
        body: Body<'_>,
    ) -> Result<T, HttpError> {
        let bytes = self.request(method, path, route_key, body).await?;
        serde_json::from_slice(&bytes).map_err(|e| {
            let raw = String::from_utf8_lossy(&bytes);
            HttpError::Serde(format!("{}: {}", e, &raw[..raw.len().min(200)]))
        })
    }
}

#[async_trait]
impl DiscordApi for DiscordHttpClient {
    async fn create_message(
        &self,
        channel_id: &str,
        msg: &CreateMessage,
    ) -> Result<Message, HttpError> {
        let path = format!("channels/{}/messages", channel_id);
        let route_key = format!("POST /channels/{}/messages", channel_id);

        let body = if msg.files.is_empty() {
            Body::Json(to_json(msg)?)
        } else {
            let mut payload = to_json(msg)?;
            let slots: Vec<AttachmentSlot> = msg
                .files
                .iter()
                .enumerate()
                .map(|(id, f)| AttachmentSlot {
                    id,
                    filename: f.upload_name(),
                })
                .collect();
            payload["attachments"] = to_json(&slots)?;
            Body::Multipart {
                payload,
                files: &msg.files,
            }
        };

        self.request_json(Method::POST, &path, &route_key, body).await
    }

    async fn get_message(&self, channel_id: &str, message_id: &str) -> Result<Message, HttpError> {
        let path = format!("channels/{}/messages/{}", channel_id, message_id);
        let route_key = format!("GET /channels/{}/messages", channel_id);
        self.request_json(Method::GET, &path, &route_key, Body::Empty)
            .await
    }

    async fn edit_message(
        &self,
        channel_id: &str,
        message_id: &str,
        edit: &EditMessage,
    ) -> Result<Message, HttpError> {
        let path = format!("channels/{}/messages/{}", channel_id, message_id);
        let route_key = format!("PATCH /channels/{}/messages", channel_id);
        self.request_json(Method::PATCH, &path, &route_key, Body::Json(to_json(edit)?))
            .await
    }

    async fn delete_message(&self, channel_id: &str, message_id: &str) -> Result<(), HttpError> {
        let path = format!("channels/{}/messages/{}", channel_id, message_id);
        let route_key = format!("DELETE /channels/{}/messages", channel_id);
        self.request(Method::DELETE, &path, &route_key, Body::Empty)
            .await?;
        Ok(())
    }

    async fn get_channel(&self, channel_id: &str) -> Result<Channel, HttpError> {
        let path = format!("channels/{}", channel_id);
        let route_key = format!("GET /channels/{}", channel_id);
        self.request_json(Method::GET, &path, &route_key, Body::Empty)
            .await
    }

    async fn create_reaction(
        &self,
        channel_id: &str,
        message_id: &str,
        emoji: &str,
    ) -> Result<(), HttpError> {
        let path = format!(
            "channels/{}/messages/{}/reactions/{}/@me",
            channel_id,
            message_id,
            encode_emoji(emoji)
        );
        self.request(Method::PUT, &path, &reaction_route(channel_id), Body::Empty)
            .await?;
        Ok(())
    }

    async fn delete_user_reaction(
        &self,
        channel_id: &str,
        message_id: &str,
        emoji: &str,
        user_id: &str,
    ) -> Result<(), HttpError> {
        let path = format!(
            "channels/{}/messages/{}/reactions/{}/{}",
            channel_id,
            message_id,
            encode_emoji(emoji),
            user_id
        );
        self.request(Method::DELETE, &path, &reaction_route(channel_id), Body::Empty)
            .await?;
        Ok(())
    }

    async fn delete_all_reactions_for_emoji(
        &self,
        channel_id: &str,
        message_id: &str,
        emoji: &str,
    ) -> Result<(), HttpError> {
        let path = format!(
            "channels/{}/messages/{}/reactions/{}",
            channel_id,
            message_id,
            encode_emoji(emoji)
        );
        self.request(Method::DELETE, &path, &reaction_route(channel_id), Body::Empty)
            .await?;
        Ok(())
    }

    async fn delete_all_reactions(
        &self,
        channel_id: &str,
        message_id: &str,
    ) -> Result<(), HttpError> {
        let path = format!("channels/{}/messages/{}/reactions", channel_id, message_id);
        self.request(Method::DELETE, &path, &reaction_route(channel_id), Body::Empty)
            .await?;
        Ok(())
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, HttpError> {
        let resp = self
            .client
            .get(url)
            .header(USER_AGENT, USER_AGENT_VALUE)
            .send()
            .await
            .map_err(|e| HttpError::Transport(e.to_string()))?;
        let status = resp.status();
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| HttpError::Transport(e.to_string()))?;
        if !status.is_success() {
            return Err(HttpError::Api {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&bytes).to_string(),
                route: "GET attachment".to_string(),
            });
        }
        Ok(bytes.to_vec())
    }
}

impl std::fmt::Debug for DiscordHttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscordHttpClient")
            .field("token", &"<redacted>")
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Discord shares one rate-limit bucket for all reaction routes of a channel.
fn reaction_route(channel_id: &str) -> String {
    format!("/channels/{}/messages/reactions", channel_id)
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<serde_json::Value, HttpError> {
    serde_json::to_value(value).map_err(|e| HttpError::Serde(e.to_string()))
}

/// Percent-encode an emoji for use as a path segment. Custom emoji keep
/// the `name:id` separator; only the name is encoded.
fn encode_emoji(emoji: &str) -> String {
    match emoji.split_once(':') {
        Some((name, id)) => format!("{}:{}", urlencoding::encode(name), id),
        None => urlencoding::encode(emoji).into_owned(),
    }
}

/// Build a multipart/form-data body: a `payload_json` part followed by one
/// `files[n]` part per upload.
fn build_multipart(
    boundary: &str,
    payload: &serde_json::Value,
    files: &[UploadFile],
) -> Result<Vec<u8>, HttpError> {
    let mut buf: Vec<u8> = Vec::new();
    let payload = serde_json::to_string(payload).map_err(|e| HttpError::Serde(e.to_string()))?;

    buf.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
    buf.extend_from_slice(b"Content-Disposition: form-data; name=\"payload_json\"\r\n");
    buf.extend_from_slice(b"Content-Type: application/json\r\n\r\n");
    buf.extend_from_slice(payload.as_bytes());
    buf.extend_from_slice(b"\r\n");

    for (index, file) in files.iter().enumerate() {
        let filename = file.upload_name().replace('"', "_");
        buf.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
        buf.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"files[{}]\"; filename=\"{}\"\r\n",
                index, filename
            )
            .as_bytes(),
        );
        buf.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
        buf.extend_from_slice(&file.data);
        buf.extend_from_slice(b"\r\n");
    }

    buf.extend_from_slice(format!("--{}--\r\n", boundary).as_bytes());
    Ok(buf)
}
