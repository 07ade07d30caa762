use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

const TOKENINFO_URL: &str = "https://oauth2.googleapis.com/tokeninfo";

#[derive(Clone, Debug, PartialEq)]
pub struct VerifiedIdentity {
    pub email: String,
    pub given_name: String,
    pub family_name: String,
}

#[derive(Error, Debug)]
pub enum IdentityError {
    #[error("Google sign-in is not configured")]
    NotConfigured,
    #[error("Invalid token")]
    InvalidToken,
    #[error("Identity provider unreachable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, id_token: &str) -> Result<VerifiedIdentity, IdentityError>;
}

/// Verifies Google ID tokens against Google's tokeninfo endpoint.
#[derive(Clone, Debug)]
pub struct GoogleVerifier {
    client: reqwest::Client,
    client_id: Option<String>,
}

#[derive(Deserialize)]
struct TokenInfo {
    aud: String,
    email: Option<String>,
    email_verified: Option<String>,
    given_name: Option<String>,
    family_name: Option<String>,
}

impl GoogleVerifier {
    pub fn new(client_id: Option<String>, timeout: Duration) -> Result<Self, IdentityError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| IdentityError::Unavailable(err.to_string()))?;
        Ok(Self { client, client_id })
    }
}

#[async_trait]
impl IdentityVerifier for GoogleVerifier {
    async fn verify(&self, id_token: &str) -> Result<VerifiedIdentity, IdentityError> {
        let client_id = self.client_id.as_deref().ok_or(IdentityError::NotConfigured)?;

        let response = self
            .client
            .get(TOKENINFO_URL)
            .query(&[("id_token", id_token)])
            .send()
            .await
            .map_err(|err| IdentityError::Unavailable(err.to_string()))?;

        if !response.status().is_success() {
            return Err(IdentityError::InvalidToken);
        }

        let info: TokenInfo = response
            .json()
            .await
            .map_err(|_| IdentityError::InvalidToken)?;

        if info.aud != client_id || info.email_verified.as_deref() != Some("true") {
            return Err(IdentityError::InvalidToken);
        }

        Ok(VerifiedIdentity {
            email: info.email.ok_or(IdentityError::InvalidToken)?,
            given_name: info.given_name.unwrap_or_default(),
            family_name: info.family_name.unwrap_or_default(),
        })
    }
}
