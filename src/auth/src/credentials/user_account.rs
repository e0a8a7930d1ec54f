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

//! [User Account] Credentials type.
//!
//! User accounts represent a developer, administrator, or any other person who
//! interacts with Google APIs and services. These credentials use an OAuth 2.0
//! refresh token, typically created by running
//! `gcloud auth application-default login`, to obtain access tokens.
//!
//! Example usage:
//!
//! ```
//! # use google_cloud_storage_auth::credentials::user_account::{Builder, parse_authorized_user};
//! # use google_cloud_storage_auth::credentials::Credentials;
//! let contents = serde_json::json!({
//!     "client_id": "YOUR_CLIENT_ID.apps.googleusercontent.com",
//!     "client_secret": "YOUR_CLIENT_SECRET",
//!     "refresh_token": "YOUR_REFRESH_TOKEN",
//!     "type": "authorized_user",
//! }).to_string();
//! let info = parse_authorized_user(&contents, "memory")?;
//! let credentials: Credentials = Builder::new(info).build().into();
//! # Ok::<(), google_cloud_storage_auth::build_errors::Error>(())
//! ```
//!
//! [User Account]: https://cloud.google.com/docs/authentication#user-accounts

use crate::Result;
use crate::constants::{OAUTH2_TOKEN_URI, REFRESH_TOKEN_GRANT_TYPE};
use crate::credentials::{BuildResult, decode_credentials};
use crate::headers_util::build_bearer_headers;
use crate::http::{HttpRequest, SharedTransport, default_transport, send_checked};
use crate::token::{TemporaryToken, TokenProvider, parse_token_response};
use crate::token_cache::TokenCache;
use http::HeaderMap;
use tokio::time::Instant;

const REQUIRED_FIELDS: [&str; 3] = ["client_id", "client_secret", "refresh_token"];

/// The contents of an `authorized_user` credentials file.
#[derive(Clone, PartialEq, serde::Deserialize)]
pub struct AuthorizedUserInfo {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
    #[serde(default)]
    pub token_uri: Option<String>,
    #[serde(default)]
    pub quota_project_id: Option<String>,
}

impl std::fmt::Debug for AuthorizedUserInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizedUserInfo")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[censored]")
            .field("refresh_token", &"[censored]")
            .field("token_uri", &self.token_uri)
            .field("quota_project_id", &self.quota_project_id)
            .finish()
    }
}

/// Parses the contents of an `authorized_user` credentials file.
///
/// `source` names the origin of the contents, typically a file path, and is
/// included in the error messages. Any missing required field is reported by
/// name.
pub fn parse_authorized_user(contents: &str, source: &str) -> BuildResult<AuthorizedUserInfo> {
    decode_credentials(contents, source, "authorized user", &REQUIRED_FIELDS)
}

/// A builder for constructing [AuthorizedUserCredentials].
#[derive(Debug)]
pub struct Builder {
    info: AuthorizedUserInfo,
    token_uri: Option<String>,
    quota_project_id: Option<String>,
    transport: Option<SharedTransport>,
}

impl Builder {
    /// Creates a new builder from parsed `authorized_user` credentials.
    pub fn new(info: AuthorizedUserInfo) -> Self {
        Self {
            info,
            token_uri: None,
            quota_project_id: None,
            transport: None,
        }
    }

    /// Sets the URI for the token endpoint used to fetch access tokens.
    ///
    /// Any value provided here overrides a `token_uri` value from the
    /// credentials file. Defaults to `https://oauth2.googleapis.com/token`.
    pub fn with_token_uri<S: Into<String>>(mut self, token_uri: S) -> Self {
        self.token_uri = Some(token_uri.into());
        self
    }

    /// Sets the [quota project] for these credentials.
    ///
    /// Any value set here overrides a `quota_project_id` value from the
    /// credentials file.
    ///
    /// [quota project]: https://cloud.google.com/docs/quotas/quota-project
    pub fn with_quota_project_id<S: Into<String>>(mut self, quota_project_id: S) -> Self {
        self.quota_project_id = Some(quota_project_id.into());
        self
    }

    /// Sets the transport used to refresh the access tokens.
    pub fn with_transport(mut self, transport: SharedTransport) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Returns an [AuthorizedUserCredentials] instance.
    pub fn build(self) -> AuthorizedUserCredentials {
        let endpoint = self
            .token_uri
            .or(self.info.token_uri)
            .unwrap_or_else(|| OAUTH2_TOKEN_URI.to_string());
        let quota_project_id = self.quota_project_id.or(self.info.quota_project_id);
        let token_provider = UserTokenProvider {
            client_id: self.info.client_id,
            client_secret: self.info.client_secret,
            refresh_token: self.info.refresh_token,
            endpoint,
            transport: self.transport.unwrap_or_else(default_transport),
        };
        AuthorizedUserCredentials {
            token_provider: TokenCache::new(token_provider),
            quota_project_id,
        }
    }
}

/// Credentials for a user account, refreshed with an OAuth2 refresh token.
#[derive(Clone, Debug)]
pub struct AuthorizedUserCredentials {
    token_provider: TokenCache<UserTokenProvider>,
    quota_project_id: Option<String>,
}

impl AuthorizedUserCredentials {
    pub(crate) async fn authorization_header(&self) -> Result<String> {
        let token = self.token_provider.token().await?;
        Ok(token.header().to_string())
    }

    pub(crate) async fn headers(&self) -> Result<HeaderMap> {
        let token = self.token_provider.token().await?;
        build_bearer_headers(&token, self.quota_project_id.as_deref())
    }
}

struct UserTokenProvider {
    client_id: String,
    client_secret: String,
    refresh_token: String,
    endpoint: String,
    transport: SharedTransport,
}

impl std::fmt::Debug for UserTokenProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserTokenProvider")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[censored]")
            .field("refresh_token", &"[censored]")
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

#[async_trait::async_trait]
impl TokenProvider for UserTokenProvider {
    async fn token(&self) -> Result<TemporaryToken> {
        let request = HttpRequest::post_form(
            self.endpoint.as_str(),
            [
                ("grant_type", REFRESH_TOKEN_GRANT_TYPE),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("refresh_token", self.refresh_token.as_str()),
            ],
        );
        let response = send_checked(
            self.transport.as_ref(),
            request,
            "failed to refresh user access token",
        )
        .await?;
        parse_token_response(&response, Instant::now())
    }
}
