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

//! Errors created during credentials construction.

pub(crate) type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The error type for [Credentials] factories and builders.
///
/// All the errors carry a human readable message. When the error originates
/// in a credentials file the message names the file, or `memory` for
/// credentials parsed from a string.
///
/// [Credentials]: super::credentials::Credentials
#[derive(thiserror::Error, Debug)]
#[error(transparent)]
pub struct Error(ErrorKind);

impl Error {
    /// A problem finding or opening the credentials file.
    pub fn is_loading(&self) -> bool {
        matches!(self.0, ErrorKind::Loading(_))
    }

    /// A problem parsing a credentials specification. The contents may be
    /// malformed JSON, a JSON object without the required fields, or an
    /// invalid PKCS#12 file.
    pub fn is_parsing(&self) -> bool {
        matches!(self.0, ErrorKind::Parsing(_))
    }

    /// The credentials type is invalid or unknown.
    pub fn is_unknown_type(&self) -> bool {
        matches!(self.0, ErrorKind::UnknownType(_))
    }

    /// None of the sources for Application Default Credentials produced
    /// credentials.
    pub fn is_not_found(&self) -> bool {
        matches!(self.0, ErrorKind::NotFound(_))
    }

    /// Create an error representing problems loading or reading a credentials
    /// file.
    pub(crate) fn loading<T>(source: T) -> Error
    where
        T: Into<BoxError>,
    {
        Error(ErrorKind::Loading(source.into()))
    }

    /// A problem parsing a credentials specification.
    pub(crate) fn parsing<T>(source: T) -> Error
    where
        T: Into<BoxError>,
    {
        Error(ErrorKind::Parsing(source.into()))
    }

    /// The credential type is unknown or invalid.
    pub(crate) fn unknown_type<T>(source: T) -> Error
    where
        T: Into<BoxError>,
    {
        Error(ErrorKind::UnknownType(source.into()))
    }

    /// No credentials could be found.
    pub(crate) fn not_found<T>(source: T) -> Error
    where
        T: Into<BoxError>,
    {
        Error(ErrorKind::NotFound(source.into()))
    }
}

#[derive(thiserror::Error, Debug)]
enum ErrorKind {
    #[error("could not find or open the credentials file {0}")]
    Loading(#[source] BoxError),
    #[error("cannot parse the credentials file {0}")]
    Parsing(#[source] BoxError),
    #[error("unknown or invalid credentials type {0}")]
    UnknownType(#[source] BoxError),
    #[error("cannot find application default credentials {0}")]
    NotFound(#[source] BoxError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn constructors() {
        let error = Error::loading("test message");
        assert!(error.is_loading(), "{error:?}");
        assert!(error.source().is_some(), "{error:?}");
        assert!(error.to_string().contains("test message"), "{error}");

        let error = Error::parsing("test message");
        assert!(error.is_parsing(), "{error:?}");
        assert!(error.source().is_some(), "{error:?}");
        assert!(error.to_string().contains("test message"), "{error}");

        let error = Error::unknown_type("test message");
        assert!(error.is_unknown_type(), "{error:?}");
        assert!(error.source().is_some(), "{error:?}");
        assert!(error.to_string().contains("test message"), "{error}");

        let error = Error::not_found("test message");
        assert!(error.is_not_found(), "{error:?}");
        assert!(!error.is_loading(), "{error:?}");
        assert!(error.to_string().contains("test message"), "{error}");
    }

    #[test]
    fn io_source() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing file");
        let error = Error::loading(io);
        let source = error
            .source()
            .and_then(|e| e.downcast_ref::<std::io::Error>());
        assert!(
            matches!(source, Some(e) if e.kind() == std::io::ErrorKind::NotFound),
            "{error:?}"
        );
    }
}
