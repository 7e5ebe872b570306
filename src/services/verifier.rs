use async_trait::async_trait;

/// Boolean oracle for the human-verification challenge token.
#[async_trait]
pub trait TokenVerifier: Send + Sync + std::fmt::Debug {
    /// # Errors
    /// Returns an error when the verification service itself is unreachable;
    /// a reachable-but-rejecting verdict is `Ok(false)`.
    async fn verify(&self, token: &str) -> anyhow::Result<bool>;
}
