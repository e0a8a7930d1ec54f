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

//! Types and functions to work with auth [Tokens].
//!
//! [Tokens]: https://cloud.google.com/docs/authentication#token

use crate::Result;
use crate::errors::CredentialsError;
use crate::http::{HttpResponse, decode_required};
use std::time::Duration;
use tokio::time::Instant;

/// An access token and the instant at which it expires.
///
/// The token is stored as the full value of the `Authorization:` header, for
/// example `Bearer ya29.abc`. Tokens are immutable, a refresh produces a new
/// token.
#[derive(Clone, PartialEq)]
pub struct TemporaryToken {
    header: String,
    expires_at: Instant,
}

impl TemporaryToken {
    /// Creates a new token.
    ///
    /// # Parameters
    /// * `header` - the complete `Authorization:` header value.
    /// * `expires_at` - the instant at which the token expires.
    pub fn new<T: Into<String>>(header: T, expires_at: Instant) -> Self {
        Self {
            header: header.into(),
            expires_at,
        }
    }

    /// The value for the `Authorization:` header.
    pub fn header(&self) -> &str {
        &self.header
    }

    /// The instant at which the token expires.
    ///
    /// Note that the `Instant` is not valid across processes.
    pub fn expires_at(&self) -> Instant {
        self.expires_at
    }

    /// Returns `true` if the token is still valid at `now`, keeping `margin`
    /// in reserve.
    pub(crate) fn is_valid(&self, now: Instant, margin: Duration) -> bool {
        now + margin < self.expires_at
    }
}

impl std::fmt::Debug for TemporaryToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemporaryToken")
            .field("header", &"[censored]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[async_trait::async_trait]
pub(crate) trait TokenProvider: std::fmt::Debug + Send + Sync {
    async fn token(&self) -> Result<TemporaryToken>;
}

const TOKEN_RESPONSE_FIELDS: [&str; 3] = ["access_token", "expires_in", "token_type"];

#[derive(serde::Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
    token_type: String,
}

/// Parses the response from an OAuth2 token endpoint, or from the metadata
/// server.
///
/// `now` is the instant the response was received; the token expires
/// `expires_in` seconds later.
pub(crate) fn parse_token_response(
    response: &HttpResponse,
    now: Instant,
) -> Result<TemporaryToken> {
    let fields = decode_required::<TokenResponse>(response, &TOKEN_RESPONSE_FIELDS)?;
    let expires_at = now
        .checked_add(Duration::from_secs(fields.expires_in))
        .ok_or_else(|| {
            CredentialsError::protocol(format!(
                "Invalid expires_in value in response, body=<{}>",
                response.body
            ))
        })?;
    Ok(TemporaryToken {
        header: format!("{} {}", fields.token_type, fields.access_token),
        expires_at,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::http::tests::json_response;
    use http::{HeaderMap, StatusCode};
    use serde_json::json;
    use test_case::test_case;

    type TestResult = anyhow::Result<()>;

    // Used by tests in other modules.
    mockall::mock! {
        #[derive(Debug)]
        pub TokenProvider { }

        #[async_trait::async_trait]
        impl TokenProvider for TokenProvider {
            async fn token(&self) -> Result<TemporaryToken>;
        }
    }

    #[test]
    fn debug() {
        let expires_at = Instant::now() + Duration::from_secs(3600);
        let token = TemporaryToken::new("Bearer token-test-only", expires_at);
        let got = format!("{token:?}");
        assert!(!got.contains("token-test-only"), "{got}");
        assert!(got.contains("header: \"[censored]\""), "{got}");
        assert!(got.contains(&format!("expires_at: {expires_at:?}")), "{got}");
    }

    #[test]
    fn accessors() {
        let expires_at = Instant::now() + Duration::from_secs(60);
        let token = TemporaryToken::new("Bearer abc", expires_at);
        assert_eq!(token.header(), "Bearer abc");
        assert_eq!(token.expires_at(), expires_at);
    }

    #[test]
    fn validity() {
        let now = Instant::now();
        let token = TemporaryToken::new("Bearer abc", now + Duration::from_secs(3600));
        assert!(token.is_valid(now, Duration::ZERO));
        assert!(token.is_valid(now + Duration::from_secs(3599), Duration::ZERO));
        assert!(!token.is_valid(now + Duration::from_secs(3600), Duration::ZERO));
        assert!(token.is_valid(now + Duration::from_secs(3000), Duration::from_secs(500)));
        assert!(!token.is_valid(now + Duration::from_secs(3100), Duration::from_secs(500)));
    }

    #[test]
    fn parse_success() -> TestResult {
        let now = Instant::now();
        let response = json_response(
            StatusCode::OK,
            json!({"access_token": "abc", "expires_in": 3600, "token_type": "Bearer"}),
        );
        let token = parse_token_response(&response, now)?;
        assert_eq!(token.header(), "Bearer abc");
        assert_eq!(token.expires_at(), now + Duration::from_secs(3600));
        Ok(())
    }

    #[test]
    fn parse_ignores_extra_fields() -> TestResult {
        let now = Instant::now();
        let response = json_response(
            StatusCode::OK,
            json!({
                "access_token": "abc",
                "expires_in": 60,
                "token_type": "Bearer",
                "scope": "https://www.googleapis.com/auth/cloud-platform",
                "id_token": "unused",
            }),
        );
        let token = parse_token_response(&response, now)?;
        assert_eq!(token.header(), "Bearer abc");
        assert_eq!(token.expires_at(), now + Duration::from_secs(60));
        Ok(())
    }

    #[test_case("access_token")]
    #[test_case("expires_in")]
    #[test_case("token_type")]
    fn parse_missing_field(field: &str) {
        let mut body = json!({"access_token": "abc", "expires_in": 3600, "token_type": "Bearer"});
        body.as_object_mut().unwrap().remove(field);
        let response = json_response(StatusCode::OK, body);
        let err = parse_token_response(&response, Instant::now()).unwrap_err();
        assert!(err.is_protocol(), "{err:?}");
        assert!(!err.is_transient(), "{err:?}");
        let msg = err.to_string();
        assert!(msg.contains(&response.body), "{msg}");
        let want = "Could not find all required fields in response \
                    (access_token, expires_in, token_type)";
        assert!(msg.contains(want), "{msg}");
    }

    #[test]
    fn parse_expires_in_overflow() {
        let response = json_response(
            StatusCode::OK,
            json!({"access_token": "abc", "expires_in": u64::MAX, "token_type": "Bearer"}),
        );
        let err = parse_token_response(&response, Instant::now()).unwrap_err();
        assert!(err.is_protocol(), "{err:?}");
        assert!(!err.is_transient(), "{err:?}");
        let msg = err.to_string();
        assert!(msg.contains("expires_in"), "{msg}");
        assert!(msg.contains(&response.body), "{msg}");
    }

    #[test]
    fn parse_not_json() {
        let response = HttpResponse::new(StatusCode::OK, HeaderMap::new(), "not-json");
        let err = parse_token_response(&response, Instant::now()).unwrap_err();
        assert!(err.is_protocol(), "{err:?}");
        assert!(err.to_string().contains("not-json"), "{err}");
    }
}
