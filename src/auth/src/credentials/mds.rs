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

//! [Metadata Service] Credentials type.
//!
//! Google Cloud environments such as [Google Compute Engine (GCE)][gce-link],
//! [Google Kubernetes Engine (GKE)][gke-link], or [Cloud Run] provide a metadata service.
//! This is a local service to the VM (or pod) which (as the name implies) provides
//! metadata information about the VM. The service also provides access
//! tokens associated with the [default service account] for the corresponding
//! VM.
//!
//! Creating these credentials makes no network calls. The first token is
//! fetched when it is needed.
//!
//! Example usage:
//!
//! ```
//! # use google_cloud_storage_auth::credentials::mds::Builder;
//! # use google_cloud_storage_auth::credentials::Credentials;
//! let credentials: Credentials = Builder::default()
//!     .with_service_account_email("my-sa@my-project.iam.gserviceaccount.com")
//!     .build()
//!     .into();
//! ```
//!
//! [Cloud Run]: https://cloud.google.com/run
//! [default service account]: https://cloud.google.com/iam/docs/service-account-types#default
//! [gce-link]: https://cloud.google.com/products/compute
//! [gke-link]: https://cloud.google.com/kubernetes-engine
//! [Metadata Service]: https://cloud.google.com/compute/docs/metadata/overview

use crate::Result;
use crate::constants::{METADATA_FLAVOR, METADATA_FLAVOR_VALUE, METADATA_ROOT};
use crate::headers_util::build_bearer_headers;
use crate::http::{
    HttpRequest, HttpResponse, SharedTransport, decode_required, default_transport, send_checked,
};
use crate::token::{TemporaryToken, TokenProvider, parse_token_response};
use crate::token_cache::TokenCache;
use http::HeaderMap;
use std::collections::BTreeSet;
use tokio::time::Instant;

const DEFAULT_SERVICE_ACCOUNT: &str = "default";
const METADATA_RESPONSE_FIELDS: [&str; 2] = ["email", "scopes"];

/// The service account attached to the VM, as reported by the metadata
/// service.
#[derive(Clone, Debug, PartialEq)]
pub struct ServiceAccountMetadata {
    pub email: String,
    pub scopes: BTreeSet<String>,
}

#[derive(serde::Deserialize)]
#[serde(untagged)]
enum Scopes {
    Many(Vec<String>),
    One(String),
}

#[derive(serde::Deserialize)]
struct MetadataResponse {
    email: String,
    scopes: Scopes,
}

/// Parses the service account information returned by the metadata service.
///
/// `scopes` may be a JSON array or a single string. On error, the message
/// includes the response body.
pub fn parse_metadata_response(response: &HttpResponse) -> Result<ServiceAccountMetadata> {
    let response = decode_required::<MetadataResponse>(response, &METADATA_RESPONSE_FIELDS)?;
    let scopes = match response.scopes {
        Scopes::Many(v) => v.into_iter().collect(),
        Scopes::One(s) => BTreeSet::from([s]),
    };
    Ok(ServiceAccountMetadata {
        email: response.email,
        scopes,
    })
}

/// Creates [ComputeEngineCredentials] backed by the [Metadata Service].
///
/// [Metadata Service]: https://cloud.google.com/compute/docs/metadata/overview
#[derive(Debug, Default)]
pub struct Builder {
    endpoint: Option<String>,
    service_account_email: Option<String>,
    scopes: Option<Vec<String>>,
    transport: Option<SharedTransport>,
}

impl Builder {
    /// Sets the endpoint for the metadata service.
    ///
    /// If not set, the credentials use `http://metadata.google.internal`. The
    /// factories in [adc][crate::credentials::adc] set this from the
    /// `GCE_METADATA_HOST` environment variable.
    pub fn with_endpoint<S: Into<String>>(mut self, endpoint: S) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Uses a specific service account attached to the VM.
    ///
    /// If not set, the credentials use the `default` service account.
    pub fn with_service_account_email<S: Into<String>>(mut self, email: S) -> Self {
        self.service_account_email = Some(email.into());
        self
    }

    /// Sets the [scopes] for the access tokens.
    ///
    /// If not set, the metadata service issues tokens with all the scopes
    /// configured for the service account.
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

    /// Sets the transport used to contact the metadata service.
    pub fn with_transport(mut self, transport: SharedTransport) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Returns a [ComputeEngineCredentials] instance.
    pub fn build(self) -> ComputeEngineCredentials {
        let endpoint = self.endpoint.unwrap_or_else(|| METADATA_ROOT.to_string());
        let token_provider = MdsTokenProvider {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            service_account: self
                .service_account_email
                .unwrap_or_else(|| DEFAULT_SERVICE_ACCOUNT.to_string()),
            scopes: self.scopes,
            transport: self.transport.unwrap_or_else(default_transport),
        };
        ComputeEngineCredentials {
            token_provider: TokenCache::new(token_provider),
        }
    }
}

/// Credentials for the service account attached to a VM.
#[derive(Clone, Debug)]
pub struct ComputeEngineCredentials {
    token_provider: TokenCache<MdsTokenProvider>,
}

impl ComputeEngineCredentials {
    /// The service account used by these credentials, `default` unless a
    /// specific account was requested.
    pub fn service_account_email(&self) -> &str {
        &self.token_provider.inner().service_account
    }

    /// Queries the metadata service for the email and scopes of the service
    /// account.
    ///
    /// This does not use or change the cached access token.
    pub async fn service_account_metadata(&self) -> Result<ServiceAccountMetadata> {
        let provider = self.token_provider.inner();
        let request = HttpRequest::get(provider.path("/"))
            .with_header(METADATA_FLAVOR, METADATA_FLAVOR_VALUE)
            .with_query("recursive", "true");
        let response = send_checked(
            provider.transport.as_ref(),
            request,
            "failed to fetch service account metadata",
        )
        .await?;
        parse_metadata_response(&response)
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
struct MdsTokenProvider {
    endpoint: String,
    service_account: String,
    scopes: Option<Vec<String>>,
    transport: SharedTransport,
}

impl MdsTokenProvider {
    fn path(&self, suffix: &str) -> String {
        format!(
            "{}/computeMetadata/v1/instance/service-accounts/{}{suffix}",
            self.endpoint, self.service_account
        )
    }
}

#[async_trait::async_trait]
impl TokenProvider for MdsTokenProvider {
    async fn token(&self) -> Result<TemporaryToken> {
        let mut request = HttpRequest::get(self.path("/token"))
            .with_header(METADATA_FLAVOR, METADATA_FLAVOR_VALUE);
        if let Some(scopes) = &self.scopes {
            request = request.with_query("scopes", scopes.join(","));
        }
        let response = send_checked(
            self.transport.as_ref(),
            request,
            "failed to fetch token from the metadata service",
        )
        .await?;
        parse_token_response(&response, Instant::now())
    }
}
