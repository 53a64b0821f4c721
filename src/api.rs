//! REST client for the game server console backend.
//!
//! Stateless: every call is one blocking request. Per-server operations take a
//! [`Target`] that picks between the legacy unscoped routes and the routes
//! nested under `/api/servers/{id}`.

use std::error::Error as _;
use std::fmt;
use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::{Method, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::config::Config;
use crate::models::{
    BackupListQuery, BroadcastRequest, PlayerListQuery, RconCommand, RconSendRequest, ServerCreateRequest,
    ServerList, ServerRecord, ServerUpdateRequest, ShutdownRequest, SyncSource, WhitelistEntry,
};

/// Which server a per-server operation addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target<'a> {
    /// The single implicit server behind the unscoped routes.
    Default,
    Scoped(&'a str),
}

impl<'a> Target<'a> {
    /// `Scoped` when an id is given, `Default` otherwise.
    pub fn from_option(server_id: Option<&'a str>) -> Self {
        match server_id {
            Some(id) => Target::Scoped(id),
            None => Target::Default,
        }
    }
}

impl fmt::Display for Target<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Default => write!(f, "default server"),
            Target::Scoped(id) => write!(f, "server {}", id),
        }
    }
}

/// Per-server endpoints. Combined with a [`Target`] in [`Route::segments`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route<'a> {
    Info,
    Metrics,
    Broadcast,
    Shutdown,
    Players,
    OnlinePlayers,
    Player(&'a str),
    Kick(&'a str),
    Ban(&'a str),
    Unban(&'a str),
    Guilds,
    Guild(&'a str),
    Whitelist,
    Rcon,
    RconSend,
    RconCommand(&'a str),
    Backups,
    Backup(&'a str),
    Sync,
}

impl<'a> Route<'a> {
    /// Path segments for this endpoint on `target`, starting with `api`.
    pub fn segments(self, target: Target<'a>) -> Vec<&'a str> {
        let mut segments = vec!["api"];
        match target {
            Target::Scoped(id) => {
                segments.extend(["servers", id]);
                segments.extend(self.scoped_tail());
            }
            Target::Default => segments.extend(self.default_tail()),
        }
        segments
    }

    /// Joined form of [`Route::segments`], without percent-encoding. For logs and tests.
    pub fn path(self, target: Target<'a>) -> String {
        format!("/{}", self.segments(target).join("/"))
    }

    fn scoped_tail(self) -> Vec<&'a str> {
        match self {
            Route::Info => vec!["info"],
            Route::Metrics => vec!["metrics"],
            Route::Broadcast => vec!["broadcast"],
            Route::Shutdown => vec!["shutdown"],
            Route::Players => vec!["players"],
            Route::OnlinePlayers => vec!["online_players"],
            Route::Player(uid) => vec!["players", uid],
            Route::Kick(uid) => vec!["players", uid, "kick"],
            Route::Ban(uid) => vec!["players", uid, "ban"],
            Route::Unban(uid) => vec!["players", uid, "unban"],
            Route::Guilds => vec!["guilds"],
            Route::Guild(admin_uid) => vec!["guilds", admin_uid],
            Route::Whitelist => vec!["whitelist"],
            Route::Rcon => vec!["rcon"],
            Route::RconSend => vec!["rcon", "send"],
            Route::RconCommand(uuid) => vec!["rcon", uuid],
            Route::Backups => vec!["backups"],
            Route::Backup(uuid) => vec!["backups", uuid],
            Route::Sync => vec!["sync"],
        }
    }

    fn default_tail(self) -> Vec<&'a str> {
        match self {
            Route::Info => vec!["server"],
            Route::Metrics => vec!["server", "metrics"],
            Route::Broadcast => vec!["server", "broadcast"],
            Route::Shutdown => vec!["server", "shutdown"],
            Route::Players => vec!["player"],
            Route::OnlinePlayers => vec!["online_player"],
            Route::Player(uid) => vec!["player", uid],
            Route::Kick(uid) => vec!["player", uid, "kick"],
            Route::Ban(uid) => vec!["player", uid, "ban"],
            Route::Unban(uid) => vec!["player", uid, "unban"],
            Route::Guilds => vec!["guild"],
            Route::Guild(admin_uid) => vec!["guild", admin_uid],
            Route::Whitelist => vec!["whitelist"],
            Route::Rcon => vec!["rcon"],
            Route::RconSend => vec!["rcon", "send"],
            Route::RconCommand(uuid) => vec!["rcon", uuid],
            Route::Backups => vec!["backup"],
            Route::Backup(uuid) => vec!["backup", uuid],
            Route::Sync => vec!["sync"],
        }
    }
}

pub struct ApiClient {
    http: Client,
    base: Url,
}

impl ApiClient {
    pub fn new(config: &Config) -> Result<Self, ApiError> {
        let base = Url::parse(&config.base_url).map_err(|e| ApiError::InvalidBaseUrl {
            url: config.base_url.clone(),
            reason: e.to_string(),
        })?;
        if base.cannot_be_a_base() {
            return Err(ApiError::NotABase(config.base_url.clone()));
        }
        let http = Client::builder()
            .user_agent(config.user_agent.as_str())
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(ApiError::HttpClient)?;
        Ok(Self { http, base })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    // Registry CRUD

    pub fn list_servers(&self) -> Result<Vec<ServerRecord>, ApiError> {
        let list: ServerList = self.send_json(self.request(Method::GET, &["api", "servers"])?)?;
        Ok(list.servers)
    }

    pub fn get_server(&self, server_id: &str) -> Result<ServerRecord, ApiError> {
        self.send_json(self.request(Method::GET, &["api", "servers", server_id])?)
    }

    pub fn create_server(&self, body: &ServerCreateRequest) -> Result<Value, ApiError> {
        self.send_json(self.request(Method::POST, &["api", "servers"])?.json(body))
    }

    pub fn update_server(&self, server_id: &str, body: &ServerUpdateRequest) -> Result<Value, ApiError> {
        self.send_json(self.request(Method::PUT, &["api", "servers", server_id])?.json(body))
    }

    pub fn delete_server(&self, server_id: &str) -> Result<Value, ApiError> {
        self.send_json(self.request(Method::DELETE, &["api", "servers", server_id])?)
    }

    /// Version info of the backend tool itself; only exists unscoped.
    pub fn server_tool_info(&self) -> Result<Value, ApiError> {
        self.send_json(self.request(Method::GET, &["api", "server", "tool"])?)
    }

    // Per-server operations

    pub fn server_info(&self, target: Target<'_>) -> Result<Value, ApiError> {
        self.call(Method::GET, target, Route::Info)
    }

    pub fn server_metrics(&self, target: Target<'_>) -> Result<Value, ApiError> {
        self.call(Method::GET, target, Route::Metrics)
    }

    pub fn broadcast(&self, target: Target<'_>, body: &BroadcastRequest) -> Result<Value, ApiError> {
        self.call_with(Method::POST, target, Route::Broadcast, body)
    }

    pub fn shutdown(&self, target: Target<'_>, body: &ShutdownRequest) -> Result<Value, ApiError> {
        self.call_with(Method::POST, target, Route::Shutdown, body)
    }

    pub fn player_list(&self, target: Target<'_>, query: &PlayerListQuery) -> Result<Value, ApiError> {
        self.send_json(self.route(Method::GET, target, Route::Players)?.query(query))
    }

    pub fn online_players(&self, target: Target<'_>) -> Result<Value, ApiError> {
        self.call(Method::GET, target, Route::OnlinePlayers)
    }

    pub fn player(&self, target: Target<'_>, player_uid: &str) -> Result<Value, ApiError> {
        self.call(Method::GET, target, Route::Player(player_uid))
    }

    pub fn kick_player(&self, target: Target<'_>, player_uid: &str) -> Result<Value, ApiError> {
        self.call(Method::POST, target, Route::Kick(player_uid))
    }

    pub fn ban_player(&self, target: Target<'_>, player_uid: &str) -> Result<Value, ApiError> {
        self.call(Method::POST, target, Route::Ban(player_uid))
    }

    pub fn unban_player(&self, target: Target<'_>, player_uid: &str) -> Result<Value, ApiError> {
        self.call(Method::POST, target, Route::Unban(player_uid))
    }

    pub fn guild_list(&self, target: Target<'_>) -> Result<Value, ApiError> {
        self.call(Method::GET, target, Route::Guilds)
    }

    pub fn guild(&self, target: Target<'_>, admin_player_uid: &str) -> Result<Value, ApiError> {
        self.call(Method::GET, target, Route::Guild(admin_player_uid))
    }

    pub fn whitelist(&self, target: Target<'_>) -> Result<Value, ApiError> {
        self.call(Method::GET, target, Route::Whitelist)
    }

    pub fn add_whitelist(&self, target: Target<'_>, entry: &WhitelistEntry) -> Result<Value, ApiError> {
        self.call_with(Method::POST, target, Route::Whitelist, entry)
    }

    pub fn remove_whitelist(&self, target: Target<'_>, entry: &WhitelistEntry) -> Result<Value, ApiError> {
        self.call_with(Method::DELETE, target, Route::Whitelist, entry)
    }

    /// Replace the whole whitelist.
    pub fn put_whitelist(&self, target: Target<'_>, entries: &[WhitelistEntry]) -> Result<Value, ApiError> {
        self.call_with(Method::PUT, target, Route::Whitelist, entries)
    }

    pub fn rcon_commands(&self, target: Target<'_>) -> Result<Value, ApiError> {
        self.call(Method::GET, target, Route::Rcon)
    }

    pub fn send_rcon_command(&self, target: Target<'_>, body: &RconSendRequest) -> Result<Value, ApiError> {
        self.call_with(Method::POST, target, Route::RconSend, body)
    }

    pub fn add_rcon_command(&self, target: Target<'_>, command: &RconCommand) -> Result<Value, ApiError> {
        self.call_with(Method::POST, target, Route::Rcon, command)
    }

    pub fn update_rcon_command(&self, target: Target<'_>, uuid: &str, command: &RconCommand) -> Result<Value, ApiError> {
        self.call_with(Method::PUT, target, Route::RconCommand(uuid), command)
    }

    pub fn remove_rcon_command(&self, target: Target<'_>, uuid: &str) -> Result<Value, ApiError> {
        self.call(Method::DELETE, target, Route::RconCommand(uuid))
    }

    pub fn backup_list(&self, target: Target<'_>, query: &BackupListQuery) -> Result<Value, ApiError> {
        self.send_json(self.route(Method::GET, target, Route::Backups)?.query(query))
    }

    pub fn remove_backup(&self, target: Target<'_>, uuid: &str) -> Result<Value, ApiError> {
        self.call(Method::DELETE, target, Route::Backup(uuid))
    }

    /// Raw archive bytes; the only call that doesn't decode JSON.
    pub fn download_backup(&self, target: Target<'_>, uuid: &str) -> Result<Vec<u8>, ApiError> {
        let resp = self.send(self.route(Method::GET, target, Route::Backup(uuid))?)?;
        let bytes = resp.bytes().map_err(ApiError::Transport)?;
        Ok(bytes.to_vec())
    }

    /// Ask the backend to resync its player data from `source`.
    pub fn sync(&self, target: Target<'_>, source: SyncSource) -> Result<Value, ApiError> {
        let req = self.route(Method::POST, target, Route::Sync)?.query(&[("from", source.as_str())]);
        self.send_json(req)
    }

    // Plumbing

    /// Absolute URL of `segments` under the base, each segment percent-encoded.
    pub fn url(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| ApiError::NotABase(self.base.to_string()))?;
            path.pop_if_empty().extend(segments);
        }
        Ok(url)
    }

    /// Request builder for a raw path, not yet sent.
    pub fn request(&self, method: Method, segments: &[&str]) -> Result<RequestBuilder, ApiError> {
        let url = self.url(segments)?;
        tracing::debug!(%method, %url, "building request");
        Ok(self.http.request(method, url))
    }

    /// Request builder for a per-server route, not yet sent.
    pub fn route(&self, method: Method, target: Target<'_>, route: Route<'_>) -> Result<RequestBuilder, ApiError> {
        self.request(method, &route.segments(target))
    }

    fn call(&self, method: Method, target: Target<'_>, route: Route<'_>) -> Result<Value, ApiError> {
        self.send_json(self.route(method, target, route)?)
    }

    fn call_with<B: Serialize + ?Sized>(
        &self,
        method: Method,
        target: Target<'_>,
        route: Route<'_>,
        body: &B,
    ) -> Result<Value, ApiError> {
        self.send_json(self.route(method, target, route)?.json(body))
    }

    fn send(&self, req: RequestBuilder) -> Result<Response, ApiError> {
        let resp = req.send().map_err(ApiError::Transport)?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let url = resp.url().to_string();
        let message = error_message(resp.text().unwrap_or_default());
        tracing::debug!(%url, status = status.as_u16(), %message, "request rejected");
        Err(ApiError::Status {
            status: status.as_u16(),
            message,
        })
    }

    fn send_json<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T, ApiError> {
        let resp = self.send(req)?;
        resp.json().map_err(ApiError::Decode)
    }
}

/// Pull the backend's `{"error": "..."}` message out of a failed response body,
/// falling back to the body text.
fn error_message(body: String) -> String {
    match serde_json::from_str::<Value>(&body) {
        Ok(value) => match value.get("error").and_then(|e| e.as_str()) {
            Some(message) => message.to_string(),
            None => body,
        },
        Err(_) => body.trim().to_string(),
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid base URL '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },
    #[error("Base URL '{0}' cannot carry a path")]
    NotABase(String),
    #[error("HTTP client error: {0}")]
    HttpClient(#[source] reqwest::Error),
    #[error("Request failed: {}", chain(.0))]
    Transport(#[source] reqwest::Error),
    #[error("Server returned {status}: {message}")]
    Status { status: u16, message: String },
    #[error("Failed to decode response: {0}")]
    Decode(#[source] reqwest::Error),
}

impl ApiError {
    /// HTTP status of a rejected request, if that's what this is.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Error plus its causes on one line; reqwest's own message hides the reason
/// (refused, timed out, dns) in the source chain.
fn chain(e: &reqwest::Error) -> String {
    let mut out = e.to_string();
    let mut source = e.source();
    while let Some(s) = source {
        out.push_str(": ");
        out.push_str(&s.to_string());
        source = s.source();
    }
    out
}
