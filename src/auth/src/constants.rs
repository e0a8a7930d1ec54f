// Copyright 2025 Google LLC
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

pub(crate) const DEFAULT_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";
/// The default token endpoint for user and service account credentials.
pub(crate) const OAUTH2_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
/// OAuth grant type used to refresh user credentials.
pub(crate) const REFRESH_TOKEN_GRANT_TYPE: &str = "refresh_token";
/// OAuth grant type used to exchange a self-signed JWT for an access token.
pub(crate) const JWT_BEARER_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Environment variable pointing to a credentials file.
pub(crate) const GOOGLE_APPLICATION_CREDENTIALS_VAR: &str = "GOOGLE_APPLICATION_CREDENTIALS";
/// Environment variable replacing the well-known gcloud credentials path.
pub(crate) const ADC_PATH_OVERRIDE_VAR: &str = "GOOGLE_GCLOUD_ADC_PATH_OVERRIDE";
/// Environment variable overriding the metadata server host.
pub(crate) const GCE_METADATA_HOST_VAR: &str = "GCE_METADATA_HOST";

/// The default metadata server endpoint.
pub(crate) const METADATA_ROOT: &str = "http://metadata.google.internal";
pub(crate) const METADATA_FLAVOR: &str = "metadata-flavor";
pub(crate) const METADATA_FLAVOR_VALUE: &str = "Google";

/// The well-known password for service account keys in PKCS#12 format.
#[cfg(feature = "p12")]
pub(crate) const P12_PASSWORD: &str = "notasecret";

/// Used in error messages when the credentials do not come from a file.
pub(crate) const IN_MEMORY_SOURCE: &str = "memory";
