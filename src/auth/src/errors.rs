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

//! Errors created while refreshing tokens or producing authorization headers.
//!
//! Errors raised while *constructing* credentials live in
//! [build_errors][crate::build_errors].

use crate::http::HttpResponse;
use http::StatusCode;
use std::error::Error;
use std::sync::Arc;

/// Represents an error using [Credentials](crate::credentials::Credentials).
///
/// The error is returned by the operations that fetch access tokens, such as
/// [Credentials::authorization_header]. All the callers waiting on the same
/// token refresh receive a clone of the same error.
///
/// [Credentials::authorization_header]: crate::credentials::Credentials::authorization_header
#[derive(Clone, Debug)]
pub struct CredentialsError {
    /// A boolean value indicating whether the error is transient.
    ///
    /// If `true`, the operation that resulted in this error might succeed upon
    /// retry.
    is_transient: bool,

    kind: ErrorKind,

    /// A message describing the failure, if any.
    message: Option<String>,

    /// The underlying source of the error, if any.
    source: Option<Arc<dyn Error + Send + Sync>>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum ErrorKind {
    /// The request never produced an HTTP response.
    Transport,
    /// The response was received, but it is missing required fields.
    Protocol,
    Other,
}

impl CredentialsError {
    /// Creates a new `CredentialsError` with a message and a source.
    ///
    /// # Arguments
    /// * `is_transient` - whether the error is transient.
    /// * `message` - a description of the failure.
    /// * `source` - the underlying error that caused the failure.
    pub fn new<M, T>(is_transient: bool, message: M, source: T) -> Self
    where
        M: Into<String>,
        T: Error + Send + Sync + 'static,
    {
        CredentialsError {
            is_transient,
            kind: ErrorKind::Other,
            message: Some(message.into()),
            source: Some(Arc::new(source)),
        }
    }

    /// Creates a new `CredentialsError` from a message.
    pub fn from_msg<T: Into<String>>(is_transient: bool, message: T) -> Self {
        CredentialsError {
            is_transient,
            kind: ErrorKind::Other,
            message: Some(message.into()),
            source: None,
        }
    }

    /// Creates a new `CredentialsError` from a source error.
    pub fn from_source<T: Error + Send + Sync + 'static>(is_transient: bool, source: T) -> Self {
        CredentialsError {
            is_transient,
            kind: ErrorKind::Other,
            message: None,
            source: Some(Arc::new(source)),
        }
    }

    /// Returns `true` if the error is transient and may succeed in future
    /// attempts.
    pub fn is_transient(&self) -> bool {
        self.is_transient
    }

    /// The request to refresh the token could not be sent, or no response
    /// was received. For example, the endpoint could not be resolved, the
    /// connection was refused, or the request timed out.
    pub fn is_transport(&self) -> bool {
        self.kind == ErrorKind::Transport
    }

    /// The service returned a response, but it could not be parsed or it was
    /// missing required fields. The message includes the response body.
    pub fn is_protocol(&self) -> bool {
        self.kind == ErrorKind::Protocol
    }

    /// A transport-level failure. These are always transient.
    pub(crate) fn transport<T: Error + Send + Sync + 'static>(message: &str, source: T) -> Self {
        CredentialsError {
            is_transient: true,
            kind: ErrorKind::Transport,
            message: Some(message.to_string()),
            source: Some(Arc::new(source)),
        }
    }

    /// A response with missing or malformed fields. These are never retried.
    pub(crate) fn protocol<T: Into<String>>(message: T) -> Self {
        CredentialsError {
            is_transient: false,
            kind: ErrorKind::Protocol,
            message: Some(message.into()),
            source: None,
        }
    }
}

impl std::error::Error for CredentialsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|arc| arc.as_ref() as &(dyn std::error::Error + 'static))
    }
}

const TRANSIENT_MSG: &str = "but future attempts may succeed";
const PERMANENT_MSG: &str = "and future attempts will not succeed";

impl std::fmt::Display for CredentialsError {
    /// Formats the error message to include transience and source.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let msg = if self.is_transient {
            TRANSIENT_MSG
        } else {
            PERMANENT_MSG
        };
        match (&self.message, &self.source) {
            (Some(m), Some(s)) => write!(f, "cannot create access token, {msg}: {m}, source: {s}"),
            (Some(m), None) => write!(f, "cannot create access token, {msg}: {m}"),
            (None, Some(s)) => write!(f, "cannot create access token, {msg}, source: {s}"),
            (None, None) => write!(f, "cannot create access token, {msg}"),
        }
    }
}

/// A helper to create a permanent error.
pub(crate) fn non_retryable<T: Error + Send + Sync + 'static>(source: T) -> CredentialsError {
    CredentialsError::from_source(false, source)
}

pub(crate) fn non_retryable_from_str<T: Into<String>>(message: T) -> CredentialsError {
    CredentialsError::from_msg(false, message)
}

/// Converts an unsuccessful HTTP response into an error.
///
/// The error embeds the response body, which often contains the reason for
/// the failure.
pub(crate) fn from_http_response(response: &HttpResponse, message: &str) -> CredentialsError {
    CredentialsError::from_msg(
        is_retryable(response.status),
        format!(
            "{message}, status={}, body=<{}>",
            response.status, response.body
        ),
    )
}

pub(crate) fn is_retryable(c: StatusCode) -> bool {
    match c {
        // Internal server errors do not indicate that there is anything wrong
        // with our request, so we retry them.
        StatusCode::INTERNAL_SERVER_ERROR
        | StatusCode::SERVICE_UNAVAILABLE
        | StatusCode::REQUEST_TIMEOUT
        | StatusCode::TOO_MANY_REQUESTS => true,
        _ => false,
    }
}
