//! Bearer token caching shared by the assistant and connector clients.

use std::future::Future;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// A bearer token and the moment it should be refreshed.
#[derive(Debug, Clone)]
pub struct CachedToken {
    pub value: String,
    refresh_at: Instant,
}

impl CachedToken {
    /// Cache a token that expires in `expires_in_secs`.
    ///
    /// Refresh is scheduled at 80% of the lifetime so a token never expires
    /// mid-request.
    pub fn new(value: impl Into<String>, expires_in_secs: u64) -> Self {
        let lifetime = Duration::from_secs(expires_in_secs.saturating_mul(4) / 5);
        Self {
            value: value.into(),
            refresh_at: Instant::now() + lifetime,
        }
    }

    pub fn is_fresh(&self) -> bool {
        Instant::now() < self.refresh_at
    }
}

/// Single-slot token cache. Concurrent callers wait for one fetch.
#[derive(Debug, Default)]
pub struct TokenCache {
    slot: Mutex<Option<CachedToken>>,
}

impl TokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached token, fetching a new one when missing or stale.
    pub async fn get_or_fetch<F, Fut, E>(&self, fetch: F) -> Result<String, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<CachedToken, E>>,
    {
        let mut slot = self.slot.lock().await;
        if let Some(token) = slot.as_ref().filter(|t| t.is_fresh()) {
            return Ok(token.value.clone());
        }

        let token = fetch().await?;
        let value = token.value.clone();
        *slot = Some(token);
        Ok(value)
    }

    /// Drop the cached token, e.g. after the server rejected it.
    pub async fn invalidate(&self) {
        *self.slot.lock().await = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_token_reused_while_fresh() {
        let cache = TokenCache::new();
        let fetches = AtomicUsize::new(0);
        let counter = &fetches;

        for _ in 0..3 {
            let token: Result<String, ()> = cache
                .get_or_fetch(move || async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(CachedToken::new("tok", 3600))
                })
                .await;
            assert_eq!(token.unwrap(), "tok");
        }

        assert_eq!(fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_expired_token_refetched() {
        let cache = TokenCache::new();
        let fetches = AtomicUsize::new(0);
        let counter = &fetches;

        for _ in 0..2 {
            let _: Result<String, ()> = cache
                .get_or_fetch(move || async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(CachedToken::new("short-lived", 0))
                })
                .await;
        }

        assert_eq!(fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_fetch_error_not_cached() {
        let cache = TokenCache::new();
        let err: Result<String, &str> = cache.get_or_fetch(|| async { Err("denied") }).await;
        assert_eq!(err.unwrap_err(), "denied");

        let ok: Result<String, &str> = cache
            .get_or_fetch(|| async { Ok(CachedToken::new("tok", 60)) })
            .await;
        assert_eq!(ok.unwrap(), "tok");

        cache.invalidate().await;
        let again: Result<String, &str> = cache
            .get_or_fetch(|| async { Ok(CachedToken::new("tok-2", 60)) })
            .await;
        assert_eq!(again.unwrap(), "tok-2");
    }
}
