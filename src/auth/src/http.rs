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

//! The HTTP transport used to refresh access tokens.
//!
//! All the credential types that refresh tokens over HTTP send their requests
//! through an [HttpTransport]. The default implementation, [ReqwestTransport],
//! uses [reqwest]. Applications may provide their own implementation, for
//! example to route the requests through a proxy or to test their code
//! without a network.

use crate::Result;
use crate::errors::{self, CredentialsError};
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// The default timeout for requests sent by [ReqwestTransport].
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// An HTTP request issued by the credentials.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    /// Query parameters, in the order they should be sent.
    pub query: Vec<(String, String)>,
    pub body: RequestBody,
}

/// The payload of a [HttpRequest].
#[derive(Clone, PartialEq)]
#[non_exhaustive]
pub enum RequestBody {
    Empty,
    /// A `application/x-www-form-urlencoded` payload.
    Form(Vec<(String, String)>),
}

// The form payloads contain refresh tokens, client secrets, and signed
// assertions.
impl std::fmt::Debug for RequestBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "Empty"),
            Self::Form(fields) => f
                .debug_list()
                .entries(fields.iter().map(|(k, _)| (k, "[censored]")))
                .finish(),
        }
    }
}

impl HttpRequest {
    pub(crate) fn get<U: Into<String>>(url: U) -> Self {
        Self {
            method: Method::GET,
            url: url.into(),
            headers: HeaderMap::new(),
            query: Vec::new(),
            body: RequestBody::Empty,
        }
    }

    pub(crate) fn post_form<U, I, K, V>(url: U, fields: I) -> Self
    where
        U: Into<String>,
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            method: Method::POST,
            url: url.into(),
            headers: HeaderMap::new(),
            query: Vec::new(),
            body: RequestBody::Form(
                fields
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
        }
    }

    pub(crate) fn with_header(mut self, name: &'static str, value: &'static str) -> Self {
        self.headers.insert(
            HeaderName::from_static(name),
            HeaderValue::from_static(value),
        );
        self
    }

    pub(crate) fn with_query<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Returns the value of the form field named `key`, if any.
    pub fn form_value(&self, key: &str) -> Option<&str> {
        match &self.body {
            RequestBody::Form(fields) => fields
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.as_str()),
            RequestBody::Empty => None,
        }
    }
}

/// The response to a [HttpRequest].
#[derive(Clone, Debug)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

impl HttpResponse {
    pub fn new<B: Into<String>>(status: StatusCode, headers: HeaderMap, body: B) -> Self {
        Self {
            status,
            headers,
            body: body.into(),
        }
    }
}

/// Sends the HTTP requests needed to refresh access tokens.
///
/// Implementations should return an error only when no response is received,
/// such as DNS failures, refused connections, or timeouts. Any HTTP response,
/// including error statuses, should be returned as an [HttpResponse].
#[async_trait::async_trait]
pub trait HttpTransport: std::fmt::Debug + Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse>;
}

/// A shared handle to an [HttpTransport].
pub type SharedTransport = Arc<dyn HttpTransport>;

pub(crate) fn default_transport() -> SharedTransport {
    Arc::new(ReqwestTransport::new())
}

/// An [HttpTransport] based on [reqwest].
#[derive(Clone, Debug)]
pub struct ReqwestTransport {
    inner: reqwest::Client,
    timeout: Duration,
}

impl ReqwestTransport {
    /// Creates a transport with the default timeout.
    pub fn new() -> Self {
        Builder::default().build()
    }

    /// Returns a builder to configure the transport.
    pub fn builder() -> Builder {
        Builder::default()
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new()
    }
}

/// A builder for [ReqwestTransport].
#[derive(Debug, Default)]
pub struct Builder {
    timeout: Option<Duration>,
}

impl Builder {
    /// Sets the timeout for each request.
    ///
    /// The default is [DEFAULT_TIMEOUT].
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn build(self) -> ReqwestTransport {
        ReqwestTransport {
            inner: reqwest::Client::new(),
            timeout: self.timeout.unwrap_or(DEFAULT_TIMEOUT),
        }
    }
}

#[async_trait::async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let mut builder = self
            .inner
            .request(request.method, &request.url)
            .headers(request.headers)
            .timeout(self.timeout);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let RequestBody::Form(fields) = &request.body {
            builder = builder.form(fields);
        }

        let response = builder.send().await.map_err(|e| {
            CredentialsError::transport(&format!("cannot send request to {}", request.url), e)
        })?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.text().await.map_err(|e| {
            CredentialsError::transport(
                &format!("cannot read response body from {}", request.url),
                e,
            )
        })?;
        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

/// Sends `request` and returns the response if it was successful.
pub(crate) async fn send_checked(
    transport: &dyn HttpTransport,
    request: HttpRequest,
    context: &str,
) -> Result<HttpResponse> {
    let response = transport.send(request).await?;
    if !response.status.is_success() {
        return Err(errors::from_http_response(&response, context));
    }
    Ok(response)
}

/// Decodes a JSON response that must contain all the `required` fields.
///
/// The error includes the response body, and lists the required fields. The
/// fields must be present, but the decoded type determines which values are
/// acceptable.
pub(crate) fn decode_required<T: DeserializeOwned>(
    response: &HttpResponse,
    required: &[&str],
) -> Result<T> {
    let all = required.join(", ");
    let value = match serde_json::from_str::<Value>(&response.body) {
        Ok(v @ Value::Object(_)) => v,
        _ => {
            return Err(CredentialsError::protocol(format!(
                "{}Could not find all required fields in response ({all}).",
                response.body
            )));
        }
    };
    let missing = required
        .iter()
        .filter(|f| value.get(**f).is_none())
        .copied()
        .collect::<Vec<_>>();
    if !missing.is_empty() {
        return Err(CredentialsError::protocol(format!(
            "{}Could not find all required fields in response ({all}), missing: {}.",
            response.body,
            missing.join(", ")
        )));
    }
    serde_json::from_value::<T>(value).map_err(|e| {
        CredentialsError::protocol(format!(
            "{}Invalid field values in response ({all}): {e}",
            response.body
        ))
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use httptest::{Expectation, Server, matchers::*, responders::*};
    use serde::Deserialize;

    type TestResult = anyhow::Result<()>;

    // Used by tests in other modules.
    mockall::mock! {
        #[derive(Debug)]
        pub HttpTransport { }

        #[async_trait::async_trait]
        impl HttpTransport for HttpTransport {
            async fn send(&self, request: HttpRequest) -> Result<HttpResponse>;
        }
    }

    pub(crate) fn json_response(status: StatusCode, body: serde_json::Value) -> HttpResponse {
        HttpResponse::new(status, HeaderMap::new(), body.to_string())
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Fields {
        a: String,
        b: u64,
    }

    #[test]
    fn decode_success() -> TestResult {
        let response = json_response(
            StatusCode::OK,
            serde_json::json!({"a": "x", "b": 42, "c": 1}),
        );
        let got = decode_required::<Fields>(&response, &["a", "b"])?;
        assert_eq!(
            got,
            Fields {
                a: "x".into(),
                b: 42
            }
        );
        Ok(())
    }

    #[test]
    fn decode_missing() {
        let response = json_response(StatusCode::OK, serde_json::json!({"a": "x"}));
        let err = decode_required::<Fields>(&response, &["a", "b"]).unwrap_err();
        assert!(err.is_protocol(), "{err:?}");
        let msg = err.to_string();
        assert!(msg.contains("missing: b"), "{msg}");
        assert!(msg.contains(&response.body), "{msg}");
    }

    #[test]
    fn decode_not_json() {
        let response = HttpResponse::new(StatusCode::OK, HeaderMap::new(), "<html>oops</html>");
        let err = decode_required::<Fields>(&response, &["a", "b"]).unwrap_err();
        assert!(err.is_protocol(), "{err:?}");
        let msg = err.to_string();
        assert!(msg.contains("<html>oops</html>"), "{msg}");
        assert!(msg.contains("(a, b)"), "{msg}");
    }

    #[test]
    fn decode_bad_type() {
        let response = json_response(StatusCode::OK, serde_json::json!({"a": "x", "b": "y"}));
        let err = decode_required::<Fields>(&response, &["a", "b"]).unwrap_err();
        assert!(err.is_protocol(), "{err:?}");
    }

    #[test]
    fn request_debug_censors_form() {
        let request =
            HttpRequest::post_form("https://example.com", [("refresh_token", "secret-123")]);
        let got = format!("{request:?}");
        assert!(got.contains("refresh_token"), "{got}");
        assert!(!got.contains("secret-123"), "{got}");
        assert_eq!(request.form_value("refresh_token"), Some("secret-123"));
    }

    #[tokio::test]
    async fn reqwest_get() -> TestResult {
        let server = Server::run();
        server.expect(
            Expectation::matching(all_of![
                request::method_path("GET", "/path"),
                request::headers(contains(("metadata-flavor", "Google"))),
                request::query(url_decoded(contains(("recursive", "true")))),
            ])
            .respond_with(status_code(200).body("hello")),
        );

        let transport = ReqwestTransport::new();
        let request = HttpRequest::get(server.url("/path").to_string())
            .with_header("metadata-flavor", "Google")
            .with_query("recursive", "true");
        let response = transport.send(request).await?;
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.body, "hello");
        Ok(())
    }

    #[tokio::test]
    async fn reqwest_post_form() -> TestResult {
        let server = Server::run();
        server.expect(
            Expectation::matching(all_of![
                request::method_path("POST", "/token"),
                request::body(url_decoded(contains(("grant_type", "refresh_token")))),
            ])
            .respond_with(status_code(503).body("try again")),
        );

        let transport = ReqwestTransport::builder()
            .with_timeout(Duration::from_secs(5))
            .build();
        let request = HttpRequest::post_form(
            server.url("/token").to_string(),
            [("grant_type", "refresh_token")],
        );
        let err = send_checked(&transport, request, "test-context")
            .await
            .unwrap_err();
        assert!(err.is_transient(), "{err:?}");
        assert!(err.to_string().contains("try again"), "{err}");
        Ok(())
    }

    #[tokio::test]
    async fn reqwest_transport_error() {
        // Nothing listens on port 1 in the test environments.
        let transport = ReqwestTransport::builder()
            .with_timeout(Duration::from_secs(5))
            .build();
        let err = transport
            .send(HttpRequest::get("http://127.0.0.1:1/token"))
            .await
            .unwrap_err();
        assert!(err.is_transport(), "{err:?}");
        assert!(err.is_transient(), "{err:?}");
    }
}
