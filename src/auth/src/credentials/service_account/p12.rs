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

//! Service account keys in PKCS#12 format.
//!
//! These files are created with the well-known `notasecret` password. The
//! service account email is the common name of the certificate.

use super::ServiceAccountInfo;
use crate::build_errors::{BoxError, Error as BuildError};
use crate::credentials::BuildResult;

/// Parses a service account key in PKCS#12 (`.p12`) format.
///
/// Any failure is reported as a generic "invalid credentials file" error
/// naming `source`. The details are logged at the `debug` level.
///
/// Decoding requires the `p12` feature. Without it, this function always
/// fails.
pub fn parse_service_account_p12(contents: &[u8], source: &str) -> BuildResult<ServiceAccountInfo> {
    decode(contents).map_err(|e| {
        tracing::debug!("cannot decode PKCS#12 service account key from {source}: {e}");
        BuildError::parsing(format!("Invalid credentials file {source}"))
    })
}

#[cfg(feature = "p12")]
fn decode(contents: &[u8]) -> Result<ServiceAccountInfo, BoxError> {
    use crate::constants::P12_PASSWORD;
    use openssl::nid::Nid;
    use openssl::pkcs12::Pkcs12;

    let parsed = Pkcs12::from_der(contents)?.parse2(P12_PASSWORD)?;
    let pkey = parsed.pkey.ok_or("missing private key")?;
    let cert = parsed.cert.ok_or("missing certificate")?;
    let common_name = cert
        .subject_name()
        .entries_by_nid(Nid::COMMONNAME)
        .next()
        .ok_or("missing common name in certificate")?;
    let client_email = common_name.data().as_utf8()?.to_string();
    if client_email.is_empty() {
        return Err("empty common name in certificate".into());
    }
    let private_key = String::from_utf8(pkey.private_key_to_pem_pkcs8()?)?;

    Ok(ServiceAccountInfo {
        client_email,
        private_key,
        private_key_id: None,
        token_uri: None,
        project_id: None,
        scopes: None,
        subject: None,
    })
}

#[cfg(not(feature = "p12"))]
fn decode(_contents: &[u8]) -> Result<ServiceAccountInfo, BoxError> {
    Err("PKCS#12 support requires the `p12` feature".into())
}
