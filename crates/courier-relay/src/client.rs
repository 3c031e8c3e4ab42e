//! The relay HTTP client.

use std::time::Duration;

use courier_crypto::{SealedPayload, Signature};
use courier_protocol::canonical::canonical_bytes;
use courier_protocol::Message;
use courier_vault::Vault;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Response, StatusCode};
use serde_json::{json, Value};
use tracing::debug;

use crate::error::{RelayError, Result};
use crate::types::{
    AgentEntry, AgentsResponse, ApiFailure, Challenge, HealthStatus, InboxItem, ReceiveResponse,
    SendReceipt,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Async client for one relay.
///
/// Cheap to clone; the underlying connection pool is shared.
#[derive(Clone, Debug)]
pub struct RelayClient {
    http: reqwest::Client,
    base_url: String,
}

impl RelayClient {
    /// Create a client for the relay at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(RelayError::transport)?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// The relay base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// `GET /health`.
    pub async fn health(&self) -> Result<HealthStatus> {
        let response = self
            .http
            .get(self.url("/health"))
            .send()
            .await
            .map_err(RelayError::transport)?;
        Self::parse(Self::check(response, "health").await?).await
    }

    /// `POST /register/challenge`: obtain a challenge for `vault_id`.
    pub async fn fetch_challenge(&self, vault_id: &str) -> Result<Challenge> {
        let response = self
            .http
            .post(self.url("/register/challenge"))
            .json(&json!({ "vault_id": vault_id }))
            .send()
            .await
            .map_err(RelayError::transport)?;
        Self::parse(Self::check(response, "registration challenge").await?).await
    }

    /// Challenge-response registration of `vault` with this relay.
    ///
    /// The vault signs the relay's challenge, proving it holds the key
    /// its vault id derives from; nobody can squat an identity by
    /// posting someone else's public keys.
    pub async fn register(&self, vault: &Vault, alias: Option<&str>) -> Result<()> {
        let challenge = self.fetch_challenge(vault.vault_id()).await?;
        let proof = vault.sign(challenge.challenge.as_bytes());

        let body = json!({
            "vault_id": vault.vault_id(),
            "alias": alias,
            "signing_public_key": vault.signing_public_key().to_base64(),
            "encryption_public_key": vault.encryption_public_key().to_base64(),
            "challenge": challenge.challenge,
            "signature": proof.to_base64(),
        });
        let response = self
            .http
            .post(self.url("/register"))
            .json(&body)
            .send()
            .await
            .map_err(RelayError::transport)?;
        Self::check(response, "registration").await?;
        debug!(vault_id = %vault.vault_id(), relay = %self.base_url, "registered");
        Ok(())
    }

    /// `POST /alias`: claim or change an alias.
    pub async fn set_alias(&self, vault: &Vault, alias: &str) -> Result<()> {
        let body = json!({ "vault_id": vault.vault_id(), "alias": alias });
        let response = self.post_signed("/alias", vault, &body).await?;
        Self::check(response, "alias update").await?;
        Ok(())
    }

    /// `POST /send`: hand a signed message to the relay.
    pub async fn send_message(
        &self,
        vault: &Vault,
        message: &Message,
        signature: &Signature,
        encrypted_payload: Option<&SealedPayload>,
    ) -> Result<SendReceipt> {
        let mut body = json!({
            "message": message,
            "signature": signature.to_base64(),
        });
        if let Some(sealed) = encrypted_payload {
            body["encrypted_payload"] = serde_json::to_value(sealed)
                .map_err(courier_protocol::ProtocolError::from)?;
        }
        let response = self.post_signed("/send", vault, &body).await?;
        let receipt: SendReceipt = Self::parse(Self::check(response, "send").await?).await?;
        debug!(message_id = %receipt.message_id, recipient = %receipt.recipient, "relay accepted message");
        Ok(receipt)
    }

    /// `GET /receive/{vault_id}`: fetch up to `limit` undelivered
    /// messages. Fetching does not acknowledge.
    pub async fn receive(&self, vault: &Vault, limit: usize) -> Result<Vec<InboxItem>> {
        let url = format!("{}?limit={limit}", self.url(&format!("/receive/{}", vault.vault_id())));
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(RelayError::transport)?;
        let parsed: ReceiveResponse = Self::parse(Self::check(response, "receive").await?).await?;
        Ok(parsed.messages)
    }

    /// `POST /ack/{message_id}`: confirm delivery so the relay can
    /// drop its copy.
    pub async fn acknowledge(&self, vault: &Vault, message_id: &str) -> Result<()> {
        let body = json!({ "vault_id": vault.vault_id() });
        let response = self
            .post_signed(&format!("/ack/{message_id}"), vault, &body)
            .await?;
        Self::check(response, "acknowledge").await?;
        Ok(())
    }

    /// `GET /agents`: a bounded view of the registry.
    pub async fn list_agents(&self, limit: usize) -> Result<Vec<AgentEntry>> {
        let response = self
            .http
            .get(format!("{}?limit={limit}", self.url("/agents")))
            .send()
            .await
            .map_err(RelayError::transport)?;
        let parsed: AgentsResponse = Self::parse(Self::check(response, "agents").await?).await?;
        Ok(parsed.agents)
    }

    /// `GET /resolve/{alias}`: look one alias up.
    ///
    /// An unknown alias is [`RelayError::NotFound`], distinct from the
    /// relay being down.
    pub async fn resolve_alias(&self, alias: &str) -> Result<AgentEntry> {
        let response = self
            .http
            .get(self.url(&format!("/resolve/{alias}")))
            .send()
            .await
            .map_err(RelayError::transport)?;
        Self::parse(Self::check(response, alias).await?).await
    }

    /// POST `body` signed with the vault key.
    ///
    /// The signature covers the canonical form of the body, and the
    /// body on the wire is exactly those canonical bytes, so the relay
    /// verifies what it received, not a re-serialization.
    async fn post_signed(&self, path: &str, vault: &Vault, body: &Value) -> Result<Response> {
        let bytes = canonical_bytes(body)?;
        let signature = vault.sign(&bytes);
        self.http
            .post(self.url(path))
            .header("X-Vault-ID", vault.vault_id())
            .header("X-Signature", signature.to_base64())
            .header(CONTENT_TYPE, "application/json")
            .body(bytes)
            .send()
            .await
            .map_err(RelayError::transport)
    }

    async fn check(response: Response, context: &str) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::NOT_FOUND {
            return Err(RelayError::NotFound {
                what: context.to_string(),
            });
        }
        let body = response.text().await.unwrap_or_default();
        Err(classify_rejection(status.as_u16(), &body))
    }

    async fn parse<T: serde::de::DeserializeOwned>(response: Response) -> Result<T> {
        response.json().await.map_err(RelayError::transport)
    }
}

/// Turn a non-404 failure status plus body into a typed rejection,
/// surfacing the relay's `{error, code}` shape when present.
fn classify_rejection(status: u16, body: &str) -> RelayError {
    let failure: ApiFailure = serde_json::from_str(body).unwrap_or(ApiFailure {
        error: String::new(),
        code: None,
    });
    let message = if failure.error.is_empty() {
        if body.trim().is_empty() {
            "relay gave no reason".to_string()
        } else {
            body.trim().to_string()
        }
    } else {
        failure.error
    };
    RelayError::Rejected {
        status,
        message,
        code: failure.code,
    }
}
