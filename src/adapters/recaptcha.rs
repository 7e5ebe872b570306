use crate::services::verifier::TokenVerifier;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

const VERIFY_URL: &str = "https://www.google.com/recaptcha/api/siteverify";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct VerifyResponse {
    success: bool,
}

/// reCAPTCHA siteverify client.
#[derive(Clone)]
pub struct RecaptchaVerifier {
    http: reqwest::Client,
    secret: String,
}

impl std::fmt::Debug for RecaptchaVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecaptchaVerifier").finish_non_exhaustive()
    }
}

impl RecaptchaVerifier {
    /// # Errors
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(secret: String) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self { http, secret })
    }
}

#[async_trait]
impl TokenVerifier for RecaptchaVerifier {
    async fn verify(&self, token: &str) -> anyhow::Result<bool> {
        let response = self
            .http
            .post(VERIFY_URL)
            .form(&[("secret", self.secret.as_str()), ("response", token)])
            .send()
            .await?
            .error_for_status()?;
        let verdict: VerifyResponse = response.json().await?;
        Ok(verdict.success)
    }
}
