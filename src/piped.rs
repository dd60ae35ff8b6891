use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{header, Client as HttpClient};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Playlist metadata as a server lists it. The id is only meaningful
/// against the server that returned it and is never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct RemotePlaylist {
    pub id: String,
    pub name: String,
}

/// The remote operations the reconciler is written against.
///
/// Every mutating call must be idempotent from the server's point of view
/// (subscribing twice, re-adding playlist items after a clear), because the
/// retry queue may replay an operation against a server that already
/// received it. Tests substitute an in-memory implementation.
#[async_trait]
pub trait ServerApi: Send + Sync {
    fn url(&self) -> &str;

    async fn get_subscriptions(&self) -> Result<Vec<String>>;
    async fn subscribe(&self, channel_id: &str) -> Result<()>;
    async fn unsubscribe(&self, channel_id: &str) -> Result<()>;

    async fn get_playlists(&self) -> Result<Vec<RemotePlaylist>>;
    /// Returns the new playlist's server-side id.
    async fn create_playlist(&self, name: &str) -> Result<String>;
    async fn delete_playlist(&self, playlist_id: &str) -> Result<()>;
    async fn clear_playlist(&self, playlist_id: &str) -> Result<()>;
    async fn get_playlist_items(&self, playlist_id: &str) -> Result<Vec<String>>;
    async fn add_playlist_items(&self, playlist_id: &str, video_ids: &[String]) -> Result<()>;
}

// API response models
#[derive(Debug, Deserialize)]
struct LoginResponse {
    token: String,
}

#[derive(Debug, Deserialize)]
struct SubscriptionEntry {
    url: String,
}

#[derive(Debug, Deserialize)]
struct PlaylistEntry {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct CreatePlaylistResponse {
    #[serde(rename = "playlistId")]
    playlist_id: String,
}

#[derive(Debug, Deserialize)]
struct PlaylistDetail {
    #[serde(rename = "relatedStreams")]
    related_streams: Vec<StreamEntry>,
}

#[derive(Debug, Deserialize)]
struct StreamEntry {
    url: String,
}

/// Channel id from a subscription URL like `/channel/UCabc` (last path
/// segment).
fn channel_id_from_url(url: &str) -> String {
    url.rsplit('/').next().unwrap_or(url).to_string()
}

/// Video id from a stream URL like `/watch?v=abc123` (text after the last
/// `=`).
fn video_id_from_url(url: &str) -> String {
    url.rsplit('=').next().unwrap_or(url).to_string()
}

/// Authenticated session against one Piped server.
pub struct PipedSession {
    base_url: String,
    http: HttpClient,
    token: Option<String>,
    dry_run: bool,
}

impl PipedSession {
    pub fn new(url: &str, dry_run: bool) -> Result<Self> {
        let http = HttpClient::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            base_url: url.trim_end_matches('/').to_string(),
            http,
            token: None,
            dry_run,
        })
    }

    /// Log in and keep the session token for all later calls. Until this
    /// succeeds every other call fails fast without touching the network.
    pub async fn login(&mut self, username: &str, password: &str) -> Result<()> {
        tracing::info!("Logging in on {}", self.base_url);
        let credentials = json!({ "username": username, "password": password });
        let resp = self
            .http
            .post(format!("{}/login", self.base_url))
            .json(&credentials)
            .send()
            .await
            .with_context(|| format!("Login request failed on {}", self.base_url))?
            .error_for_status()
            .with_context(|| format!("Login rejected by {}", self.base_url))?;

        let login: LoginResponse = resp
            .json()
            .await
            .with_context(|| format!("Malformed login response from {}", self.base_url))?;
        self.token = Some(login.token);
        Ok(())
    }

    fn token(&self) -> Result<&str> {
        self.token
            .as_deref()
            .ok_or_else(|| anyhow!("Not logged in on {}", self.base_url))
    }

    async fn get(&self, path: &str) -> Result<reqwest::Response> {
        let token = self.token()?;
        let resp = self
            .http
            .get(format!("{}{}", self.base_url, path))
            .header(header::AUTHORIZATION, token)
            .send()
            .await
            .with_context(|| format!("GET {} failed on {}", path, self.base_url))?;
        resp.error_for_status()
            .with_context(|| format!("GET {} rejected by {}", path, self.base_url))
    }

    async fn post(&self, path: &str, body: &serde_json::Value) -> Result<reqwest::Response> {
        let token = self.token()?;
        let resp = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .header(header::AUTHORIZATION, token)
            .json(body)
            .send()
            .await
            .with_context(|| format!("POST {} failed on {}", path, self.base_url))?;
        resp.error_for_status()
            .with_context(|| format!("POST {} rejected by {}", path, self.base_url))
    }
}

#[async_trait]
impl ServerApi for PipedSession {
    fn url(&self) -> &str {
        &self.base_url
    }

    async fn get_subscriptions(&self) -> Result<Vec<String>> {
        let resp = self.get("/subscriptions").await?;
        let subs: Vec<SubscriptionEntry> = resp
            .json()
            .await
            .with_context(|| format!("Malformed subscriptions from {}", self.base_url))?;
        Ok(subs.iter().map(|s| channel_id_from_url(&s.url)).collect())
    }

    async fn subscribe(&self, channel_id: &str) -> Result<()> {
        tracing::info!("Subscribing to channel {} on {}", channel_id, self.base_url);
        if self.dry_run {
            tracing::info!("dry-run: subscribe suppressed");
            return Ok(());
        }
        self.post("/subscribe", &json!({ "channelId": channel_id }))
            .await?;
        Ok(())
    }

    async fn unsubscribe(&self, channel_id: &str) -> Result<()> {
        tracing::info!(
            "Unsubscribing from channel {} on {}",
            channel_id,
            self.base_url
        );
        if self.dry_run {
            tracing::info!("dry-run: unsubscribe suppressed");
            return Ok(());
        }
        self.post("/unsubscribe", &json!({ "channelId": channel_id }))
            .await?;
        Ok(())
    }

    async fn get_playlists(&self) -> Result<Vec<RemotePlaylist>> {
        let resp = self.get("/user/playlists").await?;
        let playlists: Vec<PlaylistEntry> = resp
            .json()
            .await
            .with_context(|| format!("Malformed playlist list from {}", self.base_url))?;
        Ok(playlists
            .into_iter()
            .map(|p| RemotePlaylist {
                id: p.id,
                name: p.name,
            })
            .collect())
    }

    async fn create_playlist(&self, name: &str) -> Result<String> {
        tracing::info!("Creating playlist {} on {}", name, self.base_url);
        if self.dry_run {
            tracing::info!("dry-run: create suppressed");
            return Ok("dry-run".to_string());
        }
        let resp = self
            .post("/user/playlists/create", &json!({ "name": name }))
            .await?;
        let created: CreatePlaylistResponse = resp
            .json()
            .await
            .with_context(|| format!("Malformed create response from {}", self.base_url))?;
        Ok(created.playlist_id)
    }

    async fn delete_playlist(&self, playlist_id: &str) -> Result<()> {
        tracing::info!("Deleting playlist {} on {}", playlist_id, self.base_url);
        if self.dry_run {
            tracing::info!("dry-run: delete suppressed");
            return Ok(());
        }
        self.post(
            "/user/playlists/delete",
            &json!({ "playlistId": playlist_id }),
        )
        .await?;
        Ok(())
    }

    async fn clear_playlist(&self, playlist_id: &str) -> Result<()> {
        tracing::info!("Clearing playlist {} on {}", playlist_id, self.base_url);
        if self.dry_run {
            tracing::info!("dry-run: clear suppressed");
            return Ok(());
        }
        self.post(
            "/user/playlists/clear",
            &json!({ "playlistId": playlist_id }),
        )
        .await?;
        Ok(())
    }

    async fn get_playlist_items(&self, playlist_id: &str) -> Result<Vec<String>> {
        let resp = self.get(&format!("/playlists/{}", playlist_id)).await?;
        let detail: PlaylistDetail = resp
            .json()
            .await
            .with_context(|| format!("Malformed playlist detail from {}", self.base_url))?;
        Ok(detail
            .related_streams
            .iter()
            .map(|s| video_id_from_url(&s.url))
            .collect())
    }

    async fn add_playlist_items(&self, playlist_id: &str, video_ids: &[String]) -> Result<()> {
        tracing::info!(
            "Adding {} items to playlist {} on {}",
            video_ids.len(),
            playlist_id,
            self.base_url
        );
        if self.dry_run {
            tracing::info!("dry-run: item add suppressed");
            return Ok(());
        }
        self.post(
            "/user/playlists/add",
            &json!({ "playlistId": playlist_id, "videoIds": video_ids }),
        )
        .await?;
        Ok(())
    }
}
