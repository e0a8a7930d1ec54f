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

//! Google Cloud Storage Client Libraries for Rust - Authentication Components
//!
//! This crate finds the credentials for an application, exchanges them for
//! short-lived access tokens, and caches those tokens until shortly before
//! they expire. The storage client calls
//! [Credentials::headers][credentials::Credentials::headers] before each
//! request.
//!
//! Most applications use [Application Default Credentials]:
//!
//! ```no_run
//! # async fn sample() -> anyhow::Result<()> {
//! use google_cloud_storage_auth::credentials::adc;
//! let credentials = adc::default_credentials()?;
//! let headers = credentials.headers().await?;
//! # Ok(()) }
//! ```
//!
//! The credential types supported are:
//! - [Anonymous][credentials::anonymous], which send no `Authorization:`
//!   header.
//! - [Authorized user][credentials::user_account], created with
//!   `gcloud auth application-default login`.
//! - [Service account keys][credentials::service_account], in JSON or PKCS#12
//!   format.
//! - [Compute Engine][credentials::mds], using the metadata service.
//!
//! [Authentication methods at Google] is a good introduction on the topic of
//! authentication for Google Cloud services.
//!
//! [Application Default Credentials]: https://cloud.google.com/docs/authentication/application-default-credentials
//! [Authentication methods at Google]: https://cloud.google.com/docs/authentication

pub mod build_errors;
pub mod errors;

/// Types and functions to work with Google Cloud authentication [Credentials].
///
/// [Credentials]: https://cloud.google.com/docs/authentication#credentials
pub mod credentials;

/// Types and functions to work with auth [Tokens].
///
/// [Tokens]: https://cloud.google.com/docs/authentication#token
pub mod token;

pub mod http;

/// The token cache
pub(crate) mod token_cache;

pub(crate) mod constants;

/// Headers utility functions to work with Google Cloud authentication [Credentials].
///
/// [Credentials]: https://cloud.google.com/docs/authentication#credentials
pub(crate) mod headers_util;

/// A `Result` alias where the `Err` case is
/// `google_cloud_storage_auth::errors::CredentialsError`.
pub(crate) type Result<T> = std::result::Result<T, crate::errors::CredentialsError>;
