// Kea control agent HTTP client
//
// Wraps `reqwest::Client` with control-agent URL handling, basic auth,
// and response envelope normalization. The agent answers forwarded
// commands with a JSON array (one entry per service) and agent-local
// commands or agent-side failures with a bare object; both shapes are
// returned to the caller as a list.

use secrecy::ExposeSecret;
use tracing::{debug, trace};
use url::Url;

use crate::command::{KeaCommand, KeaResponse};
use crate::error::Error;
use crate::transport::{BasicAuth, TransportConfig};

/// Either a single response object or the per-service array.
#[derive(serde::Deserialize)]
#[serde(untagged)]
enum Envelope {
    Many(Vec<KeaResponse>),
    One(KeaResponse),
}

/// Raw HTTP client for one Kea control agent.
pub struct KeaClient {
    http: reqwest::Client,
    base_url: Url,
    basic_auth: Option<BasicAuth>,
}

impl KeaClient {
    /// Create a client for the agent listening at `base_url`.
    pub fn new(base_url: Url, transport: &TransportConfig) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Ok(Self {
            http,
            base_url,
            basic_auth: transport.basic_auth.clone(),
        })
    }

    /// Create a client from an access point triple.
    pub fn for_access_point(
        scheme: &str,
        address: &str,
        port: u16,
        transport: &TransportConfig,
    ) -> Result<Self, Error> {
        let host = if address.contains(':') && !address.starts_with('[') {
            format!("[{address}]")
        } else {
            address.to_owned()
        };
        let url = Url::parse(&format!("{scheme}://{host}:{port}/"))?;
        Self::new(url, transport)
    }

    /// Create a client reusing an existing `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, base_url: Url) -> Self {
        Self {
            http,
            base_url,
            basic_auth: None,
        }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    // ── Request helpers ──────────────────────────────────────────────

    /// POST a command and return every response the agent produced.
    pub async fn send(&self, command: &KeaCommand) -> Result<Vec<KeaResponse>, Error> {
        debug!(command = %command.command, target = command.target(), "POST {}", self.base_url);

        let mut builder = self.http.post(self.base_url.clone()).json(command);
        if let Some(auth) = &self.basic_auth {
            builder = builder.basic_auth(&auth.username, Some(auth.password.expose_secret()));
        }
        let resp = builder.send().await.map_err(Error::Transport)?;

        Self::parse_envelope(resp).await
    }

    /// POST a command addressed to one service and return its response.
    pub async fn send_one(&self, command: &KeaCommand) -> Result<KeaResponse, Error> {
        self.send(command)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::MissingResponse {
                command: command.command.clone(),
                daemon: command.target().to_owned(),
            })
    }

    /// Like [`send_one`](Self::send_one) but fails on a non-success result.
    pub async fn send_checked(&self, command: &KeaCommand) -> Result<KeaResponse, Error> {
        self.send_one(command)
            .await?
            .check(&command.command, command.target())
    }

    async fn parse_envelope(resp: reqwest::Response) -> Result<Vec<KeaResponse>, Error> {
        let status = resp.status();

        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::HttpStatus {
                status: status.as_u16(),
                body: preview(&body),
            });
        }

        let body = resp.text().await.map_err(Error::Transport)?;
        trace!(len = body.len(), "control agent response");

        let envelope: Envelope = serde_json::from_str(&body).map_err(|e| Error::Deserialization {
            message: format!("{e} (body preview: {:?})", preview(&body)),
            body: body.clone(),
        })?;

        Ok(match envelope {
            Envelope::Many(responses) => responses,
            Envelope::One(response) => vec![response],
        })
    }
}

fn preview(body: &str) -> String {
    body.chars().take(200).collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn brackets_ipv6_access_points() {
        let transport = TransportConfig::default();
        let client = KeaClient::for_access_point("http", "fe80::1", 8000, &transport).unwrap();
        assert_eq!(client.base_url().as_str(), "http://[fe80::1]:8000/");

        let client = KeaClient::for_access_point("https", "10.0.0.1", 8443, &transport).unwrap();
        assert_eq!(client.base_url().as_str(), "https://10.0.0.1:8443/");
    }
}
