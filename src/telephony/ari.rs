//! Asterisk REST Interface client
//!
//! Call control over ARI's HTTP API and event delivery over its WebSocket.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

use super::events::{TelephonyEvent, parse_event};
use super::{BridgeHandle, CallId, MediaTarget, MediaTargetParams, PlaybackId, Telephony};
use crate::config::AriConfig;
use crate::{Error, Result};

/// Channel variable holding the local address of an external media leg
const RTP_ADDRESS_VAR: &str = "UNICASTRTP_LOCAL_ADDRESS";

/// Channel variable holding the local port of an external media leg
const RTP_PORT_VAR: &str = "UNICASTRTP_LOCAL_PORT";

/// ARI HTTP client
#[derive(Debug, Clone)]
pub struct AriClient {
    client: Client,
    /// Base URL ending in `/`
    base: Url,
    username: String,
    password: SecretString,
}

#[derive(Debug, Deserialize)]
struct ChannelResponse {
    id: String,
    #[serde(default)]
    channelvars: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct BridgeResponse {
    id: String,
}

impl AriClient {
    /// Create a client for the configured ARI endpoint
    #[must_use]
    pub fn new(config: &AriConfig) -> Self {
        Self {
            client: Client::new(),
            base: with_trailing_slash(&config.url),
            username: config.username.clone(),
            password: config.password.clone(),
        }
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base
            .join(&format!("ari/{path}"))
            .map_err(|e| Error::Telephony(format!("invalid ARI path '{path}': {e}")))
    }

    async fn send_raw(&self, req: RequestBuilder) -> Result<Response> {
        Ok(req
            .basic_auth(&self.username, Some(self.password.expose_secret()))
            .send()
            .await?)
    }

    async fn send(&self, req: RequestBuilder, what: &str) -> Result<Response> {
        let response = self.send_raw(req).await?;
        ensure_success(response, what).await
    }

    /// Fetch Asterisk system info, used as a connectivity check
    ///
    /// # Errors
    ///
    /// Returns error if ARI is unreachable or rejects the credentials
    pub async fn info(&self) -> Result<serde_json::Value> {
        let url = self.endpoint("asterisk/info")?;
        let response = self.send(self.client.get(url), "asterisk info").await?;
        Ok(response.json().await?)
    }
}

#[async_trait]
impl Telephony for AriClient {
    async fn answer(&self, call: &CallId) -> Result<()> {
        let url = self.endpoint(&format!("channels/{call}/answer"))?;
        self.send(self.client.post(url), "answer").await?;
        Ok(())
    }

    async fn hangup(&self, channel_id: &str) -> Result<()> {
        let url = self.endpoint(&format!("channels/{channel_id}"))?;
        let response = self.send_raw(self.client.delete(url)).await?;
        if response.status() == StatusCode::NOT_FOUND {
            tracing::debug!(channel_id, "hangup: channel already gone");
            return Ok(());
        }
        ensure_success(response, "hangup").await?;
        Ok(())
    }

    async fn create_media_target(&self, params: &MediaTargetParams) -> Result<MediaTarget> {
        let url = self.endpoint("channels/externalMedia")?;
        let external_host = params.external_host.to_string();
        let req = self.client.post(url).query(&[
            ("channelId", params.channel_id.as_str()),
            ("app", params.app.as_str()),
            ("external_host", external_host.as_str()),
            ("format", params.format.as_str()),
        ]);
        let channel: ChannelResponse = self.send(req, "external media").await?.json().await?;

        let source = rtp_source(&channel.channelvars);
        if source.is_none() {
            tracing::warn!(
                channel_id = %channel.id,
                "external media leg did not report its RTP address"
            );
        }

        Ok(MediaTarget {
            channel_id: channel.id,
            source,
        })
    }

    async fn bridge(&self, call: &CallId, target: &MediaTarget) -> Result<BridgeHandle> {
        let url = self.endpoint("bridges")?;
        let req = self.client.post(url).query(&[("type", "mixing")]);
        let bridge: BridgeResponse = self.send(req, "create bridge").await?.json().await?;

        let url = self.endpoint(&format!("bridges/{}/addChannel", bridge.id))?;
        let channels = format!("{call},{}", target.channel_id);
        let req = self.client.post(url).query(&[("channel", channels.as_str())]);
        self.send(req, "add channels to bridge").await?;

        Ok(BridgeHandle {
            bridge_id: bridge.id,
        })
    }

    async fn destroy_bridge(&self, bridge: &BridgeHandle) -> Result<()> {
        let url = self.endpoint(&format!("bridges/{}", bridge.bridge_id))?;
        let response = self.send_raw(self.client.delete(url)).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        ensure_success(response, "destroy bridge").await?;
        Ok(())
    }

    async fn play(&self, call: &CallId, media: &str, playback: &PlaybackId) -> Result<()> {
        let url = self.endpoint(&format!("channels/{call}/play/{playback}"))?;
        let req = self.client.post(url).query(&[("media", media)]);
        self.send(req, "play").await?;
        Ok(())
    }

    async fn stop_playback(&self, playback: &PlaybackId) -> Result<()> {
        let url = self.endpoint(&format!("playbacks/{playback}"))?;
        let response = self.send_raw(self.client.delete(url)).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(Error::PlaybackNotFound(playback.to_string()));
        }
        ensure_success(response, "stop playback").await?;
        Ok(())
    }
}

/// ARI event stream for one Stasis application
pub struct AriEvents {
    url: Url,
    app: String,
}

impl AriEvents {
    /// Build the event stream endpoint from the ARI configuration
    ///
    /// # Errors
    ///
    /// Returns error if the ARI URL cannot be turned into a WebSocket URL
    pub fn new(config: &AriConfig) -> Result<Self> {
        let mut url = with_trailing_slash(&config.url)
            .join("ari/events")
            .map_err(|e| Error::Config(format!("invalid ARI url: {e}")))?;

        let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
        url.set_scheme(scheme)
            .map_err(|()| Error::Config(format!("cannot use '{scheme}' with ARI url")))?;

        let api_key = format!(
            "{}:{}",
            config.username,
            config.password.expose_secret()
        );
        url.query_pairs_mut()
            .append_pair("app", &config.app)
            .append_pair("api_key", &api_key)
            .append_pair("subscribeAll", "false");

        Ok(Self {
            url,
            app: config.app.clone(),
        })
    }

    /// Connect and forward decoded events until the stream ends
    ///
    /// Returns `Ok(())` only when the receiving side has gone away; losing
    /// the telephony connection is an error.
    ///
    /// # Errors
    ///
    /// Returns error if the connection fails or drops
    pub async fn run<E>(self, tx: mpsc::Sender<E>) -> Result<()>
    where
        E: From<TelephonyEvent> + Send,
    {
        let (mut ws, _) = tokio_tungstenite::connect_async(self.url.as_str())
            .await
            .map_err(|e| Error::Telephony(format!("event stream connect failed: {e}")))?;

        tracing::info!(app = %self.app, "telephony event stream connected");

        while let Some(message) = ws.next().await {
            match message {
                Ok(Message::Text(text)) => {
                    let Some(event) = parse_event(text.as_str()) else {
                        continue;
                    };
                    tracing::debug!(?event, "telephony event");
                    if tx.send(event.into()).await.is_err() {
                        return Ok(());
                    }
                }
                Ok(Message::Close(frame)) => {
                    return Err(Error::Telephony(format!(
                        "event stream closed: {frame:?}"
                    )));
                }
                Ok(_) => {}
                Err(e) => {
                    return Err(Error::Telephony(format!("event stream error: {e}")));
                }
            }
        }

        Err(Error::Telephony("event stream ended".to_string()))
    }
}

async fn ensure_success(response: Response, what: &str) -> Result<Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Err(Error::Telephony(format!("{what} failed: {status} - {body}")))
}

fn with_trailing_slash(url: &Url) -> Url {
    let mut url = url.clone();
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

/// Source address of an external media leg, from its channel variables
fn rtp_source(vars: &HashMap<String, String>) -> Option<SocketAddr> {
    let ip: IpAddr = vars.get(RTP_ADDRESS_VAR)?.parse().ok()?;
    let port: u16 = vars.get(RTP_PORT_VAR)?.parse().ok()?;
    Some(SocketAddr::new(ip, port))
}
