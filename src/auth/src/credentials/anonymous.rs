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

//! Anonymous credentials.
//!
//! These credentials do not provide any authentication information. They are
//! useful for accessing public buckets and objects, and to test against
//! emulators.

use crate::Result;
use http::HeaderMap;

/// Credentials that never produce an `Authorization:` header.
#[derive(Clone, Debug, Default)]
pub struct AnonymousCredentials {}

impl AnonymousCredentials {
    /// Always returns an empty header map.
    pub(crate) async fn headers(&self) -> Result<HeaderMap> {
        Ok(HeaderMap::new())
    }
}

/// A builder for creating anonymous credentials.
#[derive(Debug, Default)]
pub struct Builder {}

impl Builder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns an [AnonymousCredentials] instance.
    pub fn build(self) -> AnonymousCredentials {
        AnonymousCredentials {}
    }
}
