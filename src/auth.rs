//! Identity collaborator: proves the caller to the query service
//!
//! The query service accepts OAuth2 bearer tokens. [`ClientSecretCredential`]
//! obtains one with the client-credentials grant against the tenant's token
//! endpoint.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::fmt;
use tracing::{debug, info};

use crate::config::Identity;
use crate::error::LogQueryError;
use crate::logging::Redacted;

/// Bearer token for the query service
#[derive(Clone)]
pub struct AccessToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &"***")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Source of access tokens
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn get_token(&self, scope: &str) -> Result<AccessToken, LogQueryError>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
    #[serde(default)]
    token_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// Client-credentials sign-in with a client id and secret
pub struct ClientSecretCredential {
    http: Client,
    token_url: String,
    identity: Identity,
}

impl ClientSecretCredential {
    pub fn new(
        authority_host: &str,
        identity: Identity,
        timeout: std::time::Duration,
    ) -> Result<Self, LogQueryError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LogQueryError::Authentication(format!("failed to build HTTP client: {}", e)))?;

        let token_url = format!(
            "{}/{}/oauth2/v2.0/token",
            authority_host.trim_end_matches('/'),
            identity.tenant_id
        );

        Ok(Self {
            http,
            token_url,
            identity,
        })
    }

    pub fn token_url(&self) -> &str {
        &self.token_url
    }
}

#[async_trait]
impl CredentialProvider for ClientSecretCredential {
    async fn get_token(&self, scope: &str) -> Result<AccessToken, LogQueryError> {
        info!(
            client_id = %Redacted::new(&self.identity.client_id),
            tenant_id = %self.identity.tenant_id,
            "Requesting access token"
        );

        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", self.identity.client_id.as_str()),
            ("client_secret", self.identity.client_secret.as_str()),
            ("scope", scope),
        ];

        let response = self
            .http
            .post(&self.token_url)
            .form(&form[..])
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LogQueryError::Authentication("token request timed out".to_string())
                } else {
                    LogQueryError::Authentication(format!("token request failed: {}", e))
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| LogQueryError::Authentication(format!("failed to read token response: {}", e)))?;

        if !status.is_success() {
            let detail = match serde_json::from_str::<TokenErrorResponse>(&body) {
                Ok(err) => match err.error_description {
                    Some(description) => format!("{}: {}", err.error, first_line(&description)),
                    None => err.error,
                },
                Err(_) => first_line(&body).to_string(),
            };
            return Err(LogQueryError::Authentication(format!(
                "token endpoint returned {}: {}",
                status, detail
            )));
        }

        let parsed: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| LogQueryError::Authentication(format!("malformed token response: {}", e)))?;
        if parsed.access_token.is_empty() {
            return Err(LogQueryError::Authentication(
                "token endpoint returned an empty access token".to_string(),
            ));
        }

        let expires_at = Duration::try_seconds(parsed.expires_in.max(0))
            .and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
            .ok_or_else(|| LogQueryError::Authentication("invalid expires_in".to_string()))?;
        debug!(
            token_type = parsed.token_type.as_deref().unwrap_or("Bearer"),
            expires_at = %expires_at,
            "Access token acquired"
        );

        Ok(AccessToken {
            token: parsed.access_token,
            expires_at,
        })
    }
}

/// Keep diagnostics to one line; identity providers append trace ids on new lines
fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or("").trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> Identity {
        Identity {
            tenant_id: "tenant-1".to_string(),
            client_id: "client-1".to_string(),
            client_secret: "secret-1".to_string(),
        }
    }

    #[test]
    fn test_token_url() {
        let credential = ClientSecretCredential::new(
            "https://login.example.com/",
            identity(),
            std::time::Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(
            credential.token_url(),
            "https://login.example.com/tenant-1/oauth2/v2.0/token"
        );
    }

    #[test]
    fn test_access_token_debug_hides_token() {
        let token = AccessToken {
            token: "eyJ0eXAiOiJKV1Qi".to_string(),
            expires_at: Utc::now(),
        };
        assert!(!format!("{:?}", token).contains("eyJ0"));
    }

    #[test]
    fn test_first_line() {
        assert_eq!(first_line("AADSTS7000215: bad secret\r\nTrace ID: x"), "AADSTS7000215: bad secret");
        assert_eq!(first_line(""), "");
    }
}
