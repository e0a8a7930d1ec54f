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

use crate::build_errors::Error as BuildError;
use http::HeaderMap;
use serde::de::DeserializeOwned;
use serde_json::Value;

pub mod adc;
pub mod anonymous;
pub mod mds;
pub mod service_account;
pub mod user_account;

use crate::Result;

/// The `Result` type for credential factories and builders.
pub type BuildResult<T> = std::result::Result<T, BuildError>;

/// An implementation of [Credentials].
///
/// Represents a [Credentials] used to obtain the auth request headers.
///
/// In general, [Credentials][credentials-link] are "digital object that
/// provide proof of identity", the archetype may be a username and password
/// combination, but a private RSA key may be a better example.
///
/// Modern authentication protocols do not send the credentials to
/// authenticate with a service. Even when sent over encrypted transports, the
/// credentials may be accidentally exposed via logging or may be captured if
/// there are errors in the transport encryption. Because the credentials are
/// often long-lived, that risk of exposure is also long-lived.
///
/// Instead, modern authentication protocols exchange the credentials for a
/// time-limited [Token][token-link], a digital object that shows the caller
/// was in possession of the credentials. Because tokens are time limited,
/// risk of misuse is also time limited. Tokens may be further restricted to
/// only a certain subset of the RPCs in the service, or even to specific
/// resources, or only when used from a given machine (virtual or not).
/// Further limiting the risks associated with any leaks of these tokens.
///
/// This type encapsulates the credentials, and the token cache. Clones share
/// the same cache, so a token refreshed through one clone is used by all of
/// them.
///
/// [credentials-link]: https://cloud.google.com/docs/authentication#credentials
/// [token-link]: https://cloud.google.com/docs/authentication#token
#[derive(Clone, Debug)]
pub enum Credentials {
    /// Credentials that send no `Authorization:` header.
    Anonymous(anonymous::AnonymousCredentials),
    /// Credentials using an OAuth2 refresh token for a user account.
    AuthorizedUser(user_account::AuthorizedUserCredentials),
    /// Credentials using a service account key to sign assertions.
    ServiceAccount(service_account::ServiceAccountCredentials),
    /// Credentials fetched from the metadata server.
    ComputeEngine(mds::ComputeEngineCredentials),
}

impl Credentials {
    /// Returns the value for the `Authorization:` header.
    ///
    /// The value is cached, and refreshed shortly before it expires. Returns
    /// `None` for [anonymous][Credentials::Anonymous] credentials.
    pub async fn authorization_header(&self) -> Result<Option<String>> {
        match self {
            Self::Anonymous(_) => Ok(None),
            Self::AuthorizedUser(c) => c.authorization_header().await.map(Some),
            Self::ServiceAccount(c) => c.authorization_header().await.map(Some),
            Self::ComputeEngine(c) => c.authorization_header().await.map(Some),
        }
    }

    /// Returns the headers to authenticate a request.
    ///
    /// The `Authorization:` header is marked as sensitive. The map is empty
    /// for [anonymous][Credentials::Anonymous] credentials.
    pub async fn headers(&self) -> Result<HeaderMap> {
        match self {
            Self::Anonymous(c) => c.headers().await,
            Self::AuthorizedUser(c) => c.headers().await,
            Self::ServiceAccount(c) => c.headers().await,
            Self::ComputeEngine(c) => c.headers().await,
        }
    }

    /// A short name for the kind of credentials, useful in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Anonymous(_) => "anonymous",
            Self::AuthorizedUser(_) => "authorized_user",
            Self::ServiceAccount(_) => "service_account",
            Self::ComputeEngine(_) => "compute_engine",
        }
    }
}

impl From<anonymous::AnonymousCredentials> for Credentials {
    fn from(value: anonymous::AnonymousCredentials) -> Self {
        Self::Anonymous(value)
    }
}

impl From<user_account::AuthorizedUserCredentials> for Credentials {
    fn from(value: user_account::AuthorizedUserCredentials) -> Self {
        Self::AuthorizedUser(value)
    }
}

impl From<service_account::ServiceAccountCredentials> for Credentials {
    fn from(value: service_account::ServiceAccountCredentials) -> Self {
        Self::ServiceAccount(value)
    }
}

impl From<mds::ComputeEngineCredentials> for Credentials {
    fn from(value: mds::ComputeEngineCredentials) -> Self {
        Self::ComputeEngine(value)
    }
}

/// Decodes a JSON credentials specification that must contain all the
/// `required` fields.
///
/// `source` names the origin of the contents, a file path or `memory`, and
/// is included in all the error messages.
pub(crate) fn decode_credentials<T: DeserializeOwned>(
    contents: &str,
    source: &str,
    kind: &str,
    required: &[&str],
) -> BuildResult<T> {
    let value = serde_json::from_str::<Value>(contents).map_err(|e| {
        BuildError::parsing(format!("invalid {kind} credentials from {source}: {e}"))
    })?;
    if !value.is_object() {
        return Err(BuildError::parsing(format!(
            "invalid {kind} credentials from {source}: expected a JSON object"
        )));
    }
    let missing = required
        .iter()
        .filter(|f| value.get(**f).is_none())
        .copied()
        .collect::<Vec<_>>();
    if !missing.is_empty() {
        return Err(BuildError::parsing(format!(
            "invalid {kind} credentials from {source}: missing required field(s) {}",
            missing.join(", ")
        )));
    }
    serde_json::from_value::<T>(value).map_err(|e| {
        BuildError::parsing(format!("invalid {kind} credentials from {source}: {e}"))
    })
}
