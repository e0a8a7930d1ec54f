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

use crate::Result;
use crate::errors;
use crate::token::TemporaryToken;

use http::HeaderMap;
use http::header::{AUTHORIZATION, HeaderName, HeaderValue};

/// The header used to bill requests to a specific project.
pub(crate) const QUOTA_PROJECT_KEY: &str = "x-goog-user-project";

/// A utility function to create bearer headers.
///
/// The `Authorization:` value is marked as sensitive.
pub(crate) fn build_bearer_headers(
    token: &TemporaryToken,
    quota_project_id: Option<&str>,
) -> Result<HeaderMap> {
    let mut value = HeaderValue::from_str(token.header()).map_err(errors::non_retryable)?;
    value.set_sensitive(true);

    let mut header_map = HeaderMap::new();
    header_map.insert(AUTHORIZATION, value);

    if let Some(project) = quota_project_id {
        header_map.insert(
            HeaderName::from_static(QUOTA_PROJECT_KEY),
            HeaderValue::from_str(project).map_err(errors::non_retryable)?,
        );
    }

    Ok(header_map)
}
