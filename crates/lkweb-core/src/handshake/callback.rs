//! Loopback redirect target for the provider's login page.
//!
//! The provider redirects the browser here with `?code=` or `?error=`. The
//! server exchanges the code, posts the result on the message channel under
//! its own origin, and then marks the login window closed, in that order.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time;
use tracing::{debug, info, warn};
use url::Url;

use crate::api::error::find_api_error;
use crate::api::ApiClient;

use super::channel::MessageChannel;
use super::context::CloseHandle;
use super::message::{HandshakeMessage, InboundEnvelope};

pub const CALLBACK_PATH: &str = "/auth/kakao/callback";

/// Port the web dashboard is served on in development; providers are
/// usually registered with a redirect to it.
pub const DEFAULT_CALLBACK_PORT: u16 = 5173;

const MAX_REQUEST_BYTES: usize = 4096;

/// How long a connection may stay silent before it is dropped.
const READ_TIMEOUT: Duration = Duration::from_secs(10);

/// What a request to the callback server asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackRequest {
    Code(String),
    Error(String),
    /// The callback path without a code or an error.
    Empty,
    /// Anything that is not the callback path.
    NotFound,
}

/// Parse the request line of a raw HTTP request.
pub fn parse_request(request: &str) -> CallbackRequest {
    let Some(target) = request
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
    else {
        return CallbackRequest::NotFound;
    };

    let Ok(url) = Url::parse(&format!("http://localhost{}", target)) else {
        return CallbackRequest::NotFound;
    };
    if url.path() != CALLBACK_PATH {
        return CallbackRequest::NotFound;
    }

    let param = |name: &str| {
        url.query_pairs()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.to_string())
            .filter(|v| !v.is_empty())
    };

    if let Some(error) = param("error") {
        CallbackRequest::Error(error)
    } else if let Some(code) = param("code") {
        CallbackRequest::Code(code)
    } else {
        CallbackRequest::Empty
    }
}

pub struct CallbackServer {
    listener: TcpListener,
    addr: SocketAddr,
}

impl CallbackServer {
    /// Bind on 127.0.0.1. Port 0 picks a free port.
    pub async fn bind(port: u16) -> Result<Self> {
        let listener = TcpListener::bind(("127.0.0.1", port))
            .await
            .with_context(|| format!("Failed to bind callback port {}", port))?;
        let addr = listener.local_addr()?;
        debug!(%addr, "Callback server listening");
        Ok(Self { listener, addr })
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Origin the server posts messages under.
    pub fn origin(&self) -> String {
        format!("http://localhost:{}", self.port())
    }

    pub fn redirect_uri(&self) -> String {
        format!("{}{}", self.origin(), CALLBACK_PATH)
    }

    /// Serve callbacks until the task is dropped.
    pub async fn serve(self, api: ApiClient, channel: MessageChannel, window: CloseHandle) {
        let origin = self.origin();
        loop {
            let (stream, peer) = match self.listener.accept().await {
                Ok(conn) => conn,
                Err(e) => {
                    warn!(error = %e, "Callback accept failed");
                    continue;
                }
            };
            debug!(%peer, "Callback connection");
            // Browsers may hold speculative connections open without sending
            // anything; one of those must not stall the real callback.
            let (api, channel, window, origin) =
                (api.clone(), channel.clone(), window.clone(), origin.clone());
            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, &api, &channel, &window, &origin).await {
                    warn!(error = %e, "Callback request failed");
                }
            });
        }
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    api: &ApiClient,
    channel: &MessageChannel,
    window: &CloseHandle,
    origin: &str,
) -> Result<()> {
    let mut buffer = vec![0u8; MAX_REQUEST_BYTES];
    let n = time::timeout(READ_TIMEOUT, stream.read(&mut buffer))
        .await
        .context("Callback connection sent no request")??;
    let request = String::from_utf8_lossy(&buffer[..n]);

    let (message, response) = match parse_request(&request) {
        CallbackRequest::NotFound => (None, http_response(404, "Not Found", "Not found")),
        CallbackRequest::Empty => (
            None,
            http_response(400, "Bad Request", "No authorization code was received."),
        ),
        CallbackRequest::Error(error) => {
            info!(%error, "Provider returned an error");
            (
                Some(HandshakeMessage::Error { error }),
                http_response(200, "OK", "Login failed. You can close this window."),
            )
        }
        CallbackRequest::Code(code) => match api.exchange_code(&code).await {
            Ok(resp) => (
                Some(HandshakeMessage::Success {
                    user_info: Some(resp.user_info),
                    access_token: Some(resp.access_token),
                }),
                http_response(200, "OK", "Login complete. You can close this window."),
            ),
            Err(e) => {
                warn!(error = ?e, "Code exchange failed");
                let error = find_api_error(&e)
                    .map(|api_err| api_err.to_string())
                    .unwrap_or_else(|| "Login failed.".to_string());
                (
                    Some(HandshakeMessage::Error { error }),
                    http_response(200, "OK", "Login failed. You can close this window."),
                )
            }
        },
    };

    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await.ok();

    if let Some(message) = message {
        let data = serde_json::to_value(&message)?;
        let delivered = channel.post(InboundEnvelope::new(origin, data));
        debug!(delivered, "Posted login result");
        window.close();
    }
    Ok(())
}

fn http_response(status: u16, reason: &str, text: &str) -> String {
    let body = format!(
        "<!doctype html><html><head><meta charset=\"utf-8\" /><title>lkweb login</title></head><body><p>{}</p></body></html>",
        text
    );
    format!(
        "HTTP/1.1 {} {}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        reason,
        body.len(),
        body
    )
}
