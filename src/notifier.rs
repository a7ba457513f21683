//! Off-chain mint notification through the Quills HTTP API.
//!
//! The API authenticates a wallet by a signed terms-of-service message and
//! hands back an `auth_token` cookie:
//!
//! ```text
//! POST /api/auth/wallet   { address, signature, message }  ──► set-cookie: auth_token=...
//! GET  /api/verify-wallet  cookie: auth_token=...          ──► { success }
//! POST /api/mint-nft      { walletAddress, message }        ──► { success, message? }
//! ```

use std::{
    fmt,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use alloy::{
    primitives::{hex, Address},
    signers::Signer,
};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{
    header::{
        HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CONTENT_TYPE, COOKIE, ORIGIN, REFERER,
        SET_COOKIE, USER_AGENT,
    },
    Client, Response, StatusCode,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub const DEFAULT_API_URL: &str = "https://quills.fun";

const TERMS_URL: &str = "https://quills.fun/terms";
const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/135.0.0.0 Safari/537.36";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Body returned by every Quills endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NotifyResponse {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
}

/// Reports a confirmed write to an off-chain service.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, address: Address, message: &str) -> Result<NotifyResponse>;
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("login rejected: {0}")]
    Rejected(String),

    #[error("login response did not set a cookie")]
    MissingCookie,

    #[error("login cookie did not contain an auth token")]
    MissingToken,

    #[error("wallet verification failed: {0}")]
    VerificationFailed(String),

    #[error("not logged in")]
    NotAuthenticated,
}

#[derive(Debug)]
pub struct ApiStatusError {
    endpoint: String,
    status: StatusCode,
    message: String,
}

impl ApiStatusError {
    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl fmt::Display for ApiStatusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed ({}): {}", self.endpoint, self.status, self.message)
    }
}

impl std::error::Error for ApiStatusError {}

// ============================================================================
// QuillsApi
// ============================================================================

#[derive(Debug, Serialize)]
struct LoginPayload<'a> {
    address: String,
    signature: String,
    message: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MintPayload<'a> {
    wallet_address: String,
    message: &'a str,
}

/// Cookie-authenticated client for the Quills API.
#[derive(Clone)]
pub struct QuillsApi {
    client: Client,
    base_url: String,
    auth_token: Option<String>,
}

impl QuillsApi {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
        headers.insert(
            ACCEPT_LANGUAGE,
            HeaderValue::from_static("en-US,en;q=0.9"),
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ORIGIN, HeaderValue::from_static(DEFAULT_API_URL));
        headers.insert(REFERER, HeaderValue::from_static("https://quills.fun/"));
        headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));

        let client = Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth_token: None,
        })
    }

    pub fn is_authenticated(&self) -> bool {
        self.auth_token.is_some()
    }

    /// Sign the terms message, exchange it for an auth token and verify it.
    pub async fn login<S>(&mut self, signer: &S) -> Result<()>
    where
        S: Signer + Send + Sync,
    {
        let nonce = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .context("system clock before unix epoch")?
            .as_millis();
        let message = login_message(nonce);
        let signature = signer
            .sign_message(message.as_bytes())
            .await
            .context("failed to sign login message")?;

        let payload = LoginPayload {
            address: signer.address().to_checksum(None),
            signature: hex::encode_prefixed(signature.as_bytes()),
            message: &message,
        };

        let resp = self
            .client
            .post(format!("{}/api/auth/wallet", self.base_url))
            .json(&payload)
            .send()
            .await
            .context("request to auth/wallet endpoint failed")?;

        let cookie = extract_auth_token(resp.headers());
        let body: NotifyResponse = decode_json_response(resp, "auth/wallet").await?;
        if !body.success {
            return Err(AuthError::Rejected(body.message.unwrap_or_default()).into());
        }
        let token = cookie?;
        tracing::debug!(address = %signer.address(), "login accepted, verifying wallet");

        self.verify(&token).await?;
        self.auth_token = Some(token);
        tracing::info!(address = %signer.address(), "wallet logged in");
        Ok(())
    }

    async fn verify(&self, token: &str) -> Result<()> {
        let resp = self
            .client
            .get(format!("{}/api/verify-wallet", self.base_url))
            .header(COOKIE, auth_cookie(token))
            .send()
            .await
            .context("request to verify-wallet endpoint failed")?;

        let body: NotifyResponse = decode_json_response(resp, "verify-wallet").await?;
        if !body.success {
            return Err(AuthError::VerificationFailed(body.message.unwrap_or_default()).into());
        }
        Ok(())
    }

    /// Request the NFT mint for a message that was sent on-chain.
    pub async fn mint(&self, address: Address, message: &str) -> Result<NotifyResponse> {
        let token = self.auth_token.as_deref().ok_or(AuthError::NotAuthenticated)?;
        let payload = MintPayload {
            wallet_address: address.to_checksum(None),
            message,
        };

        let resp = self
            .client
            .post(format!("{}/api/mint-nft", self.base_url))
            .header(COOKIE, auth_cookie(token))
            .json(&payload)
            .send()
            .await
            .context("request to mint-nft endpoint failed")?;

        decode_json_response(resp, "mint-nft").await
    }
}

#[async_trait]
impl Notifier for QuillsApi {
    async fn notify(&self, address: Address, message: &str) -> Result<NotifyResponse> {
        self.mint(address, message).await
    }
}

/// Terms-of-service message signed at login.
pub fn login_message(nonce: u128) -> String {
    format!("I accept the Quills Adventure Terms of Service at {TERMS_URL}\n\nNonce: {nonce}")
}

fn auth_cookie(token: &str) -> String {
    format!("auth_token={token}")
}

/// Find `auth_token` in the `set-cookie` headers of a response.
fn extract_auth_token(headers: &HeaderMap) -> Result<String, AuthError> {
    let mut cookies = headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .peekable();
    if cookies.peek().is_none() {
        return Err(AuthError::MissingCookie);
    }
    cookies
        .find_map(parse_auth_token)
        .ok_or(AuthError::MissingToken)
}

fn parse_auth_token(cookie: &str) -> Option<String> {
    cookie
        .split(';')
        .map(str::trim)
        .find_map(|pair| pair.strip_prefix("auth_token="))
        .filter(|token| !token.is_empty())
        .map(str::to_string)
}

async fn decode_json_response<T: serde::de::DeserializeOwned>(
    resp: Response,
    endpoint: &str,
) -> Result<T> {
    if resp.status().is_success() {
        return resp
            .json::<T>()
            .await
            .with_context(|| format!("failed to decode {endpoint} response JSON"));
    }

    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    let message = match serde_json::from_str::<Value>(&body) {
        Ok(value) => value
            .get("message")
            .or_else(|| value.get("error"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or(body),
        Err(_) => body,
    };

    Err(anyhow!(ApiStatusError {
        endpoint: endpoint.to_string(),
        status,
        message,
    }))
}

/// Notifier that accepts everything without any network call.
pub struct DisabledNotifier;

#[async_trait]
impl Notifier for DisabledNotifier {
    async fn notify(&self, _address: Address, _message: &str) -> Result<NotifyResponse> {
        Ok(NotifyResponse {
            success: true,
            message: None,
        })
    }
}
