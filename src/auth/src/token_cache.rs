// Copyright 2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::Result;
use crate::token::{TemporaryToken, TokenProvider};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
// Using tokio's wrapper makes the cache testable without relying on clock times.
use tokio::time::Instant;

/// Tokens are refreshed this long before they expire.
pub(crate) const EXPIRATION_MARGIN: Duration = Duration::from_secs(500);

/// Caches a token and refreshes it when it is about to expire.
///
/// At most one refresh is in flight at any time. Callers that arrive while a
/// refresh is running wait for it, and receive its result, token or error.
#[derive(Debug)]
pub(crate) struct TokenCache<T>
where
    T: TokenProvider,
{
    // The last successfully fetched token.
    cached: Arc<RwLock<Option<TemporaryToken>>>,

    // Holding this lock means a refresh is in progress.
    refresh: Arc<Mutex<RefreshState>>,
    // Incremented, with the `refresh` lock held, each time a refresh
    // completes.
    generation: Arc<AtomicU64>,

    // The token provider. This thing does the refreshing.
    inner: Arc<T>,

    margin: Duration,
}

#[derive(Debug, Default)]
struct RefreshState {
    // The outcome of the last completed refresh.
    last: Option<Result<TemporaryToken>>,
}

// We manually implement the `Clone` trait because the Rust compiler will
// squawk if `T` is not `Clone`, even though we only hold an `Arc<T>`.
impl<T: TokenProvider> Clone for TokenCache<T> {
    fn clone(&self) -> TokenCache<T> {
        TokenCache {
            cached: self.cached.clone(),
            refresh: self.refresh.clone(),
            generation: self.generation.clone(),
            inner: self.inner.clone(),
            margin: self.margin,
        }
    }
}

impl<T: TokenProvider> TokenCache<T> {
    pub(crate) fn new(inner: T) -> TokenCache<T> {
        Self::with_margin(inner, EXPIRATION_MARGIN)
    }

    /// Creates a cache that refreshes tokens `margin` before they expire.
    pub(crate) fn with_margin(inner: T, margin: Duration) -> TokenCache<T> {
        TokenCache {
            cached: Arc::new(RwLock::new(None)),
            refresh: Arc::new(Mutex::new(RefreshState::default())),
            generation: Arc::new(AtomicU64::new(0)),
            inner: Arc::new(inner),
            margin,
        }
    }

    pub(crate) fn inner(&self) -> &T {
        &self.inner
    }

    // Clones the current token if it is still valid.
    async fn valid_token(&self) -> Option<TemporaryToken> {
        let now = Instant::now();
        self.cached
            .read()
            .await
            .as_ref()
            .filter(|t| t.is_valid(now, self.margin))
            .cloned()
    }
}

#[async_trait::async_trait]
impl<T: TokenProvider + 'static> TokenProvider for TokenCache<T> {
    async fn token(&self) -> Result<TemporaryToken> {
        let seen = self.generation.load(Ordering::Acquire);
        if let Some(token) = self.valid_token().await {
            return Ok(token);
        }

        let mut state = self.refresh.lock().await;
        if self.generation.load(Ordering::Acquire) != seen {
            // A refresh completed while we waited for the lock. Share its
            // outcome instead of starting a new one.
            if let Some(last) = state.last.clone() {
                return last;
            }
        }
        // The token may have been refreshed before we sampled `seen`.
        if let Some(token) = self.valid_token().await {
            return Ok(token);
        }

        tracing::debug!("refreshing access token");
        let result = self.inner.token().await;
        match &result {
            Ok(token) => {
                *self.cached.write().await = Some(token.clone());
            }
            Err(e) => {
                tracing::warn!("cannot refresh access token: {e}");
            }
        }
        state.last = Some(result.clone());
        self.generation.fetch_add(1, Ordering::AcqRel);
        result
    }
}
