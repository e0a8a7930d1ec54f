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

//! [Service Account] Credentials type.
//!
//! A service account is an account for an application or compute workload
//! instead of an individual end user. These credentials sign a short-lived
//! assertion with the service account private key, and exchange it for an
//! access token at the OAuth2 token endpoint.
//!
//! Service account keys are typically stored in JSON files, downloaded from
//! the Google Cloud console. Older keys may be in PKCS#12 format, see
//! [parse_service_account_p12].
//!
//! [Service Account]: https://cloud.google.com/iam/docs/service-account-overview

mod jws;
pub(crate) mod p12;

pub use p12::parse_service_account_p12;

use crate::Result;
use crate::constants::{DEFAULT_SCOPE, JWT_BEARER_GRANT_TYPE, OAUTH2_TOKEN_URI};
use crate::credentials::{BuildResult, decode_credentials};
use crate::errors::{self, CredentialsError};
use crate::headers_util::build_bearer_headers;
use crate::http::{HttpRequest, SharedTransport, default_transport, send_checked};
use crate::token::{TemporaryToken, TokenProvider, parse_token_response};
use crate::token_cache::TokenCache;
use base64::prelude::{BASE64_URL_SAFE_NO_PAD, Engine as _};
use http::HeaderMap;
use jws::{CLOCK_SKEW_FUDGE, DEFAULT_TOKEN_TIMEOUT, JwsClaims, JwsHeader};
use rustls::crypto::CryptoProvider;
use rustls::sign::Signer;
use rustls_pki_types::PrivateKeyDer;
use rustls_pki_types::pem::PemObject;
use std::collections::BTreeSet;
use time::OffsetDateTime;
use tokio::time::Instant;

const REQUIRED_FIELDS: [&str; 2] = ["client_email", "private_key"];

/// The contents of a service account key.
///
/// `scopes` and `subject` never come from the key file. They are set by the
/// [Builder], after the key is parsed.
#[derive(Clone, PartialEq, serde::Deserialize)]
pub struct ServiceAccountInfo {
    pub client_email: String,
    /// The private key, in PEM format.
    pub private_key: String,
    #[serde(default)]
    pub private_key_id: Option<String>,
    #[serde(default)]
    pub token_uri: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(skip)]
    pub scopes: Option<BTreeSet<String>>,
    #[serde(skip)]
    pub subject: Option<String>,
}

impl std::fmt::Debug for ServiceAccountInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountInfo")
            .field("client_email", &self.client_email)
            .field("private_key", &"[censored]")
            .field("private_key_id", &self.private_key_id)
            .field("token_uri", &self.token_uri)
            .field("project_id", &self.project_id)
            .field("scopes", &self.scopes)
            .field("subject", &self.subject)
            .finish()
    }
}

/// Parses a service account key in JSON format.
///
/// The `type` field is not checked, callers are expected to dispatch on the
/// type before calling this function. `source` names the origin of the
/// contents and is included in the error messages.
pub fn parse_service_account(contents: &str, source: &str) -> BuildResult<ServiceAccountInfo> {
    decode_credentials(contents, source, "service account", &REQUIRED_FIELDS)
}

/// A builder for constructing [ServiceAccountCredentials].
#[derive(Debug)]
pub struct Builder {
    info: ServiceAccountInfo,
    scopes: Option<BTreeSet<String>>,
    subject: Option<String>,
    token_uri: Option<String>,
    transport: Option<SharedTransport>,
}

impl Builder {
    /// Creates a new builder from a parsed service account key.
    pub fn new(info: ServiceAccountInfo) -> Self {
        Self {
            info,
            scopes: None,
            subject: None,
            token_uri: None,
            transport: None,
        }
    }

    /// Sets the [scopes] for the access tokens.
    ///
    /// Defaults to `https://www.googleapis.com/auth/cloud-platform`.
    ///
    /// [scopes]: https://developers.google.com/identity/protocols/oauth2/scopes
    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = Some(scopes.into_iter().map(|s| s.into()).collect());
        self
    }

    /// Sets the user to impersonate, using [domain-wide delegation].
    ///
    /// [domain-wide delegation]: https://developers.google.com/identity/protocols/oauth2/service-account#delegatingauthority
    pub fn with_subject<S: Into<String>>(mut self, subject: S) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Sets the URI for the token endpoint used to fetch access tokens.
    ///
    /// Any value provided here overrides a `token_uri` value from the key.
    pub fn with_token_uri<S: Into<String>>(mut self, token_uri: S) -> Self {
        self.token_uri = Some(token_uri.into());
        self
    }

    /// Sets the transport used to fetch the access tokens.
    pub fn with_transport(mut self, transport: SharedTransport) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Returns a [ServiceAccountCredentials] instance.
    ///
    /// The private key is not validated until the first token is requested.
    pub fn build(self) -> ServiceAccountCredentials {
        let mut info = self.info;
        if let Some(scopes) = self.scopes {
            info.scopes = Some(scopes);
        }
        if let Some(subject) = self.subject {
            info.subject = Some(subject);
        }
        let token_uri = self
            .token_uri
            .or_else(|| info.token_uri.clone())
            .unwrap_or_else(|| OAUTH2_TOKEN_URI.to_string());
        let token_provider = ServiceAccountTokenProvider {
            info,
            token_uri,
            transport: self.transport.unwrap_or_else(default_transport),
        };
        ServiceAccountCredentials {
            token_provider: TokenCache::new(token_provider),
        }
    }
}

/// Credentials for a service account, using a service account key.
#[derive(Clone, Debug)]
pub struct ServiceAccountCredentials {
    token_provider: TokenCache<ServiceAccountTokenProvider>,
}

impl ServiceAccountCredentials {
    /// The service account email.
    pub fn client_email(&self) -> &str {
        &self.info().client_email
    }

    /// The project that owns the service account, if known.
    pub fn project_id(&self) -> Option<&str> {
        self.info().project_id.as_deref()
    }

    /// The scopes requested for the access tokens, if set.
    pub fn scopes(&self) -> Option<&BTreeSet<String>> {
        self.info().scopes.as_ref()
    }

    /// The impersonated user, if set.
    pub fn subject(&self) -> Option<&str> {
        self.info().subject.as_deref()
    }

    fn info(&self) -> &ServiceAccountInfo {
        &self.token_provider.inner().info
    }

    pub(crate) async fn authorization_header(&self) -> Result<String> {
        let token = self.token_provider.token().await?;
        Ok(token.header().to_string())
    }

    pub(crate) async fn headers(&self) -> Result<HeaderMap> {
        let token = self.token_provider.token().await?;
        build_bearer_headers(&token, None)
    }
}

#[derive(Debug)]
struct ServiceAccountTokenProvider {
    info: ServiceAccountInfo,
    token_uri: String,
    transport: SharedTransport,
}

#[async_trait::async_trait]
impl TokenProvider for ServiceAccountTokenProvider {
    async fn token(&self) -> Result<TemporaryToken> {
        let assertion = self.assertion(OffsetDateTime::now_utc())?;
        let request = HttpRequest::post_form(
            self.token_uri.as_str(),
            [
                ("grant_type", JWT_BEARER_GRANT_TYPE),
                ("assertion", assertion.as_str()),
            ],
        );
        let response = send_checked(
            self.transport.as_ref(),
            request,
            "failed to exchange service account assertion",
        )
        .await?;
        parse_token_response(&response, Instant::now())
    }
}

impl ServiceAccountTokenProvider {
    // Creates the signed assertion exchanged for an access token.
    fn assertion(&self, now: OffsetDateTime) -> Result<String> {
        let signer = signer(&self.info.private_key)?;

        // The claims encode a unix timestamp. `std::time::Instant` has no
        // epoch, so we use `time::OffsetDateTime`, which reads system time.
        let iat = now - CLOCK_SKEW_FUDGE;
        let scope = match &self.info.scopes {
            Some(s) if !s.is_empty() => s.iter().map(String::as_str).collect::<Vec<_>>().join(" "),
            _ => DEFAULT_SCOPE.to_string(),
        };
        let claims = JwsClaims {
            iss: self.info.client_email.clone(),
            scope,
            aud: self.token_uri.clone(),
            exp: iat + DEFAULT_TOKEN_TIMEOUT,
            iat,
            sub: self.info.subject.clone(),
        };
        let header = JwsHeader {
            alg: "RS256",
            typ: "JWT",
            kid: self.info.private_key_id.as_deref(),
        };

        let encoded_header_claims = format!("{}.{}", header.encode()?, claims.encode()?);
        let sig = signer
            .sign(encoded_header_claims.as_bytes())
            .map_err(errors::non_retryable)?;
        Ok(format!(
            "{encoded_header_claims}.{}",
            BASE64_URL_SAFE_NO_PAD.encode(sig)
        ))
    }
}

// Creates a signer using the private key stored in the service account key.
fn signer(private_key: &str) -> Result<Box<dyn Signer>> {
    let key_provider = CryptoProvider::get_default()
        .map(|p| p.key_provider)
        .or_else(default_key_provider)
        .ok_or_else(|| {
            errors::non_retryable_from_str(
                "no rustls crypto provider is installed, see `rustls::crypto::CryptoProvider::install_default()`",
            )
        })?;

    let private_key = PrivateKeyDer::from_pem_slice(private_key.as_bytes()).map_err(|e| {
        CredentialsError::new(false, "cannot parse the service account private key", e)
    })?;
    let sk = key_provider
        .load_private_key(private_key)
        .map_err(errors::non_retryable)?;

    sk.choose_scheme(&[rustls::SignatureScheme::RSA_PKCS1_SHA256])
        .ok_or_else(|| {
            errors::non_retryable_from_str(
                "Unable to choose RSA_PKCS1_SHA256 signing scheme as it is not supported by \
                 current signer",
            )
        })
}

#[cfg(feature = "default-rustls-provider")]
fn default_key_provider() -> Option<&'static dyn rustls::crypto::KeyProvider> {
    Some(rustls::crypto::aws_lc_rs::default_provider().key_provider)
}

#[cfg(not(feature = "default-rustls-provider"))]
fn default_key_provider() -> Option<&'static dyn rustls::crypto::KeyProvider> {
    None
}
