//! Bearer token source.

use async_trait::async_trait;

/// Supplies the bearer token attached to requests.
///
/// Consulted on every attempt of every request that has `include_auth` set.
/// Returning `None` sends the request without an `Authorization` header.
/// Any `Fn() -> Option<String>` closure is a provider.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn token(&self) -> Option<String>;
}

#[async_trait]
impl<F> TokenProvider for F
where
    F: Fn() -> Option<String> + Send + Sync,
{
    async fn token(&self) -> Option<String> {
        self()
    }
}

/// A provider that always returns the same token.
#[derive(Debug, Clone)]
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

#[async_trait]
impl TokenProvider for StaticToken {
    async fn token(&self) -> Option<String> {
        Some(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_closure_provider() {
        let provider = || Some("abc".to_string());
        assert_eq!(provider.token().await.as_deref(), Some("abc"));

        let none = || None::<String>;
        assert!(TokenProvider::token(&none).await.is_none());
    }

    #[tokio::test]
    async fn test_static_token() {
        assert_eq!(StaticToken::new("t").token().await.as_deref(), Some("t"));
    }
}
