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

//! [Application Default Credentials] (ADC) and credential factories.
//!
//! ADC is a strategy to find credentials without any explicit
//! configuration in the application. The search runs in this order:
//!
//! 1. The file named by the `GOOGLE_APPLICATION_CREDENTIALS` environment
//!    variable. Any problem loading this file is an error, the search does
//!    not continue.
//! 2. The file created by `gcloud auth application-default login`, at a
//!    well-known path. A missing file is skipped, any other problem is an
//!    error.
//! 3. The metadata service, when running on Google Compute Engine or any
//!    environment where `GCE_METADATA_HOST` is set.
//!
//! If none of these produce credentials the search fails with an error
//! pointing to the ADC documentation.
//!
//! The functions in this module are synchronous, they only read files and
//! environment variables. Tokens are fetched the first time the credentials
//! are used.
//!
//! [Application Default Credentials]: https://cloud.google.com/docs/authentication/application-default-credentials

use super::service_account::{self, ServiceAccountInfo, parse_service_account_p12};
use super::{BuildResult, Credentials, anonymous, mds, user_account};
use crate::build_errors::Error as BuildError;
use crate::constants::{
    ADC_PATH_OVERRIDE_VAR, GCE_METADATA_HOST_VAR, GOOGLE_APPLICATION_CREDENTIALS_VAR,
    IN_MEMORY_SOURCE,
};
use serde_json::Value;
use std::path::{Path, PathBuf};

const ADC_LINK: &str =
    "https://developers.google.com/identity/protocols/application-default-credentials";
const ADC_FILE_NAME: &str = "application_default_credentials.json";

/// Access to the process environment used by the credentials search.
///
/// [SystemEnvironment] is the only implementation needed in applications.
/// Tests can provide their own to simulate different environments.
pub trait Environment: Send + Sync {
    /// Returns the value of an environment variable, `None` if not set.
    fn var(&self, name: &str) -> Option<String>;

    /// Returns true if `path` names an existing file.
    fn exists(&self, path: &Path) -> bool;

    /// Reads the full contents of a file.
    fn read(&self, path: &Path) -> std::io::Result<Vec<u8>>;

    /// Returns true if the process runs on Google Compute Engine, or any
    /// environment with a metadata service.
    fn on_compute_engine(&self) -> bool;
}

/// The [Environment] of the current process.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemEnvironment;

impl Environment for SystemEnvironment {
    fn var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }

    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn read(&self, path: &Path) -> std::io::Result<Vec<u8>> {
        std::fs::read(path)
    }

    fn on_compute_engine(&self) -> bool {
        if non_empty_var(self, GCE_METADATA_HOST_VAR).is_some() {
            return true;
        }
        product_name_is_google()
    }
}

#[cfg(target_os = "linux")]
fn product_name_is_google() -> bool {
    std::fs::read_to_string("/sys/class/dmi/id/product_name")
        .map(|name| matches!(name.trim(), "Google" | "Google Compute Engine"))
        .unwrap_or(false)
}

#[cfg(not(target_os = "linux"))]
fn product_name_is_google() -> bool {
    false
}

/// The outcome of loading credentials from a file.
#[derive(Clone, Debug)]
pub enum Lookup {
    /// The file contained valid credentials.
    Found(Credentials),
    /// The file contains valid credentials, but they are not for a service
    /// account, and the caller asked for service account credentials.
    NotServiceAccount,
    /// There is no file to load.
    NotFound,
}

/// Creates [Credentials] using [Application Default Credentials].
///
/// [Application Default Credentials]: https://cloud.google.com/docs/authentication/application-default-credentials
pub fn default_credentials() -> BuildResult<Credentials> {
    default_credentials_with(&SystemEnvironment)
}

/// Creates [Credentials] using Application Default Credentials, with a
/// custom [Environment].
pub fn default_credentials_with(env: &dyn Environment) -> BuildResult<Credentials> {
    tracing::debug!("searching for application default credentials");
    if let Lookup::Found(credentials) = maybe_load_creds_from_adc_paths(true, None, None, env)? {
        return Ok(credentials);
    }

    if env.on_compute_engine() {
        tracing::debug!("running on compute engine, using the metadata service");
        return Ok(mds_builder(env).build().into());
    }

    tracing::debug!("no application default credentials found");
    Err(not_found())
}

/// Tries the ADC files, the environment variable first, then the
/// well-known path.
///
/// Returns [Lookup::NotFound] when the environment variable is unset and
/// the well-known file does not exist. A path set in the environment
/// variable must load successfully.
pub fn maybe_load_creds_from_adc_paths(
    non_service_account_ok: bool,
    scopes: Option<Vec<String>>,
    subject: Option<String>,
    env: &dyn Environment,
) -> BuildResult<Lookup> {
    if let Some(path) = non_empty_var(env, GOOGLE_APPLICATION_CREDENTIALS_VAR) {
        tracing::debug!("loading credentials from {GOOGLE_APPLICATION_CREDENTIALS_VAR}={path}");
        let path = PathBuf::from(path);
        if !env.exists(&path) {
            return Err(BuildError::loading(format!(
                "Cannot open credentials file {}, set in {GOOGLE_APPLICATION_CREDENTIALS_VAR}: \
                 the file does not exist",
                path.display()
            )));
        }
        return load_creds_from_path(&path, non_service_account_ok, scopes, subject, env);
    }

    let Some(path) = well_known_path(env) else {
        tracing::debug!("cannot compute the well-known credentials path");
        return Ok(Lookup::NotFound);
    };
    if !env.exists(&path) {
        tracing::debug!("no credentials file at {}", path.display());
        return Ok(Lookup::NotFound);
    }
    tracing::debug!("loading credentials from {}", path.display());
    load_creds_from_path(&path, non_service_account_ok, scopes, subject, env)
}

/// Loads credentials from a JSON or PKCS#12 file.
///
/// JSON files are dispatched on their `type` field. Contents that are not
/// JSON are decoded as a PKCS#12 service account key.
///
/// An `authorized_user` file returns [Lookup::NotServiceAccount] when
/// `non_service_account_ok` is false, or when `scopes` or `subject` are set,
/// as only service accounts can use them.
pub fn load_creds_from_path(
    path: &Path,
    non_service_account_ok: bool,
    scopes: Option<Vec<String>>,
    subject: Option<String>,
    env: &dyn Environment,
) -> BuildResult<Lookup> {
    let source = path.display().to_string();
    let contents = env.read(path).map_err(|e| {
        BuildError::loading(format!("Cannot open credentials file {source}: {e}"))
    })?;

    let Some((text, json)) = as_json(&contents) else {
        let info = parse_service_account_p12(&contents, &source)?;
        return Ok(Lookup::Found(
            service_account_from_info(info, scopes, subject).into(),
        ));
    };

    let cred_type = json
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or("no type given");
    match cred_type {
        "authorized_user" => {
            if !non_service_account_ok || scopes.is_some() || subject.is_some() {
                tracing::debug!("{source} does not contain service account credentials");
                return Ok(Lookup::NotServiceAccount);
            }
            let info = user_account::parse_authorized_user(text, &source)?;
            Ok(Lookup::Found(user_account::Builder::new(info).build().into()))
        }
        "service_account" => {
            let info = service_account::parse_service_account(text, &source)?;
            Ok(Lookup::Found(
                service_account_from_info(info, scopes, subject).into(),
            ))
        }
        _ => Err(BuildError::unknown_type(format!(
            "Unsupported credential type ({cred_type}) when reading Application Default \
             Credentials file from {source}."
        ))),
    }
}

/// Creates service account credentials using the ADC files.
///
/// Unlike [default_credentials], this function does not use the metadata
/// service, and treats files with other types of credentials as not found.
pub fn service_account_credentials_from_default_paths(
    scopes: Option<Vec<String>>,
    subject: Option<String>,
) -> BuildResult<Credentials> {
    service_account_credentials_from_default_paths_with(scopes, subject, &SystemEnvironment)
}

/// Same as [service_account_credentials_from_default_paths], with a custom
/// [Environment].
pub fn service_account_credentials_from_default_paths_with(
    scopes: Option<Vec<String>>,
    subject: Option<String>,
    env: &dyn Environment,
) -> BuildResult<Credentials> {
    match maybe_load_creds_from_adc_paths(false, scopes, subject, env)? {
        Lookup::Found(credentials) => Ok(credentials),
        Lookup::NotServiceAccount | Lookup::NotFound => Err(BuildError::not_found(format!(
            "Could not create service account credentials using Application Default \
             Credentials paths. For more information, please see {ADC_LINK}"
        ))),
    }
}

/// Creates credentials that do not send an `Authorization:` header.
pub fn anonymous_credentials() -> Credentials {
    anonymous::Builder::new().build().into()
}

/// Creates credentials from an `authorized_user` JSON file.
pub fn authorized_user_credentials_from_file<P: AsRef<Path>>(path: P) -> BuildResult<Credentials> {
    let (source, contents) = read_file(path.as_ref())?;
    let info = user_account::parse_authorized_user(as_text(&contents, &source)?, &source)?;
    Ok(user_account::Builder::new(info).build().into())
}

/// Creates credentials from the contents of an `authorized_user` JSON file.
pub fn authorized_user_credentials_from_json(contents: &str) -> BuildResult<Credentials> {
    let info = user_account::parse_authorized_user(contents, IN_MEMORY_SOURCE)?;
    Ok(user_account::Builder::new(info).build().into())
}

/// Creates service account credentials from a JSON or PKCS#12 key file.
///
/// The file is parsed as JSON first. If that fails it is decoded as a
/// PKCS#12 key, and any error reported is the PKCS#12 error. Only errors
/// reading the file stop the fallback.
pub fn service_account_credentials_from_file<P: AsRef<Path>>(
    path: P,
    scopes: Option<Vec<String>>,
    subject: Option<String>,
) -> BuildResult<Credentials> {
    let (source, contents) = read_file(path.as_ref())?;
    let info = match as_text(&contents, &source)
        .and_then(|text| service_account::parse_service_account(text, &source))
    {
        Ok(info) => info,
        Err(e) => {
            tracing::debug!("{source} is not a JSON service account key: {e}");
            parse_service_account_p12(&contents, &source)?
        }
    };
    Ok(service_account_from_info(info, scopes, subject).into())
}

/// Creates service account credentials from a JSON key file.
pub fn service_account_credentials_from_json_file<P: AsRef<Path>>(
    path: P,
    scopes: Option<Vec<String>>,
    subject: Option<String>,
) -> BuildResult<Credentials> {
    let (source, contents) = read_file(path.as_ref())?;
    let info = service_account::parse_service_account(as_text(&contents, &source)?, &source)?;
    Ok(service_account_from_info(info, scopes, subject).into())
}

/// Creates service account credentials from a PKCS#12 key file.
///
/// Decoding PKCS#12 files requires the `p12` feature.
pub fn service_account_credentials_from_p12_file<P: AsRef<Path>>(
    path: P,
    scopes: Option<Vec<String>>,
    subject: Option<String>,
) -> BuildResult<Credentials> {
    let (source, contents) = read_file(path.as_ref())?;
    let info = parse_service_account_p12(&contents, &source)?;
    Ok(service_account_from_info(info, scopes, subject).into())
}

/// Creates service account credentials from the contents of a JSON key file.
pub fn service_account_credentials_from_json(
    contents: &str,
    scopes: Option<Vec<String>>,
    subject: Option<String>,
) -> BuildResult<Credentials> {
    let info = service_account::parse_service_account(contents, IN_MEMORY_SOURCE)?;
    Ok(service_account_from_info(info, scopes, subject).into())
}

/// Creates credentials for the default service account of the VM.
///
/// The metadata service is contacted at `GCE_METADATA_HOST`, if set.
pub fn compute_engine_credentials() -> Credentials {
    mds_builder(&SystemEnvironment).build().into()
}

/// Creates credentials for a specific service account attached to the VM.
pub fn compute_engine_credentials_for<S: Into<String>>(email: S) -> Credentials {
    mds_builder(&SystemEnvironment)
        .with_service_account_email(email)
        .build()
        .into()
}

/// The path of the file created by `gcloud auth application-default login`.
///
/// `GOOGLE_GCLOUD_ADC_PATH_OVERRIDE` replaces the computed path. Returns
/// `None` if the home directory is unknown.
pub fn well_known_path(env: &dyn Environment) -> Option<PathBuf> {
    if let Some(path) = non_empty_var(env, ADC_PATH_OVERRIDE_VAR) {
        return Some(PathBuf::from(path));
    }
    if cfg!(windows) {
        let appdata = non_empty_var(env, "APPDATA")?;
        Some(PathBuf::from(appdata).join("gcloud").join(ADC_FILE_NAME))
    } else {
        let home = non_empty_var(env, "HOME")?;
        Some(
            PathBuf::from(home)
                .join(".config")
                .join("gcloud")
                .join(ADC_FILE_NAME),
        )
    }
}

fn service_account_from_info(
    info: ServiceAccountInfo,
    scopes: Option<Vec<String>>,
    subject: Option<String>,
) -> service_account::ServiceAccountCredentials {
    let mut builder = service_account::Builder::new(info);
    if let Some(scopes) = scopes {
        builder = builder.with_scopes(scopes);
    }
    if let Some(subject) = subject {
        builder = builder.with_subject(subject);
    }
    builder.build()
}

fn mds_builder(env: &dyn Environment) -> mds::Builder {
    let builder = mds::Builder::default();
    match non_empty_var(env, GCE_METADATA_HOST_VAR) {
        Some(host) => builder.with_endpoint(format!("http://{host}")),
        None => builder,
    }
}

fn as_json(contents: &[u8]) -> Option<(&str, Value)> {
    let text = std::str::from_utf8(contents).ok()?;
    let json = serde_json::from_str::<Value>(text).ok()?;
    Some((text, json))
}

fn read_file(path: &Path) -> BuildResult<(String, Vec<u8>)> {
    let source = path.display().to_string();
    let contents = SystemEnvironment.read(path).map_err(|e| {
        BuildError::loading(format!("Cannot open credentials file {source}: {e}"))
    })?;
    Ok((source, contents))
}

fn as_text<'a>(contents: &'a [u8], source: &str) -> BuildResult<&'a str> {
    std::str::from_utf8(contents)
        .map_err(|e| BuildError::parsing(format!("Invalid credentials file {source}: {e}")))
}

fn non_empty_var(env: &dyn Environment, name: &str) -> Option<String> {
    env.var(name).filter(|v| !v.is_empty())
}

fn not_found() -> BuildError {
    BuildError::not_found(format!(
        "Could not automatically determine credentials. For more information, please see {ADC_LINK}"
    ))
}
