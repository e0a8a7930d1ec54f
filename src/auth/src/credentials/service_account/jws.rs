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
use crate::errors;
use base64::prelude::{BASE64_URL_SAFE_NO_PAD, Engine as _};
use serde::Serialize;
use std::time::Duration;
use time::OffsetDateTime;

// Services reject assertions with `iat` in the future. Unfortunately all
// machines have some amount of clock skew, and it is possible that
// the machine creating this assertion has a clock a few milliseconds
// or seconds ahead of the machines receiving the assertion.
// Create the assertion with a 10 second margin to avoid most clock
// skew problems.
pub(crate) const CLOCK_SKEW_FUDGE: Duration = Duration::from_secs(10);
pub(crate) const DEFAULT_TOKEN_TIMEOUT: Duration = Duration::from_secs(3600);

/// The claims in the assertion exchanged for an access token.
#[derive(Serialize)]
pub(crate) struct JwsClaims {
    pub iss: String,
    pub scope: String,
    pub aud: String,
    #[serde(with = "time::serde::timestamp")]
    pub exp: OffsetDateTime,
    #[serde(with = "time::serde::timestamp")]
    pub iat: OffsetDateTime,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
}

impl JwsClaims {
    pub fn encode(&self) -> Result<String> {
        if self.exp < self.iat {
            return Err(errors::non_retryable_from_str(format!(
                "expiration time {:?}, must be later than issued time {:?}",
                self.exp, self.iat
            )));
        }
        let json = serde_json::to_string(&self).map_err(errors::non_retryable)?;
        Ok(BASE64_URL_SAFE_NO_PAD.encode(json.as_bytes()))
    }
}

/// The header that describes who, what, and how a token was created.
#[derive(Serialize, Debug)]
pub(crate) struct JwsHeader<'a> {
    pub alg: &'a str,
    pub typ: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kid: Option<&'a str>,
}

impl JwsHeader<'_> {
    pub fn encode(&self) -> Result<String> {
        let json = serde_json::to_string(&self).map_err(errors::non_retryable)?;
        Ok(BASE64_URL_SAFE_NO_PAD.encode(json.as_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    type TestResult = anyhow::Result<()>;

    fn decode(encoded: &str) -> anyhow::Result<Value> {
        let decoded = BASE64_URL_SAFE_NO_PAD.decode(encoded)?;
        Ok(serde_json::from_slice(&decoded)?)
    }

    #[test]
    fn claims_encode() -> TestResult {
        let now = OffsetDateTime::now_utc();
        let then = now + DEFAULT_TOKEN_TIMEOUT;

        let claims = JwsClaims {
            iss: "test-iss".to_string(),
            scope: "scope-1 scope-2".to_string(),
            aud: "https://oauth2.googleapis.com/token".to_string(),
            exp: then,
            iat: now,
            sub: None,
        };
        let v = decode(&claims.encode()?)?;
        assert_eq!(v["iss"], "test-iss");
        assert_eq!(v["scope"], "scope-1 scope-2");
        assert_eq!(v["aud"], "https://oauth2.googleapis.com/token");
        assert_eq!(v["iat"], now.unix_timestamp());
        assert_eq!(v["exp"], then.unix_timestamp());
        assert_eq!(v.get("sub"), None);
        Ok(())
    }

    #[test]
    fn claims_encode_with_subject() -> TestResult {
        let now = OffsetDateTime::now_utc();
        let claims = JwsClaims {
            iss: "test-iss".to_string(),
            scope: "scope".to_string(),
            aud: "aud".to_string(),
            exp: now,
            iat: now,
            sub: Some("user@example.com".to_string()),
        };
        let v = decode(&claims.encode()?)?;
        assert_eq!(v["sub"], "user@example.com");
        Ok(())
    }

    #[test]
    fn claims_encode_error_exp_before_iat() {
        let now = OffsetDateTime::now_utc();
        let claims = JwsClaims {
            iss: "test-iss".to_string(),
            scope: "scope".to_string(),
            aud: "aud".to_string(),
            exp: now - Duration::from_secs(1),
            iat: now,
            sub: None,
        };
        let err = claims.encode().unwrap_err();
        assert!(!err.is_transient(), "{err:?}");
        assert!(err.to_string().contains("must be later than"), "{err}");
    }

    #[test]
    fn header_encode() -> TestResult {
        let header = JwsHeader {
            alg: "RS256",
            typ: "JWT",
            kid: Some("some-key-id"),
        };
        let v = decode(&header.encode()?)?;
        assert_eq!(v["alg"], "RS256");
        assert_eq!(v["typ"], "JWT");
        assert_eq!(v["kid"], "some-key-id");

        let header = JwsHeader {
            alg: "RS256",
            typ: "JWT",
            kid: None,
        };
        let v = decode(&header.encode()?)?;
        assert_eq!(v.get("kid"), None);
        Ok(())
    }
}
