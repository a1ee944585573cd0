//! HTTP plumbing shared by the gateway, the ceremonies and the OTP calls.
//!
//! One `reqwest` client per session, with a cookie jar so the backend's CSRF and
//! session cookies travel with every call. Requests are described by
//! [`ApiRequest`] values so the gateway can replay them after a refresh. The
//! transport never stores tokens; the caller passes the current `StoredAuth` in.

use crate::{auth::types::StoredAuth, config::ClientConfig, errors::Error, APP_USER_AGENT};
use reqwest::{
    cookie::{CookieStore, Jar},
    header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE},
    multipart::{Form, Part},
    Client, Method, Response,
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info_span, Instrument};
use url::Url;

/// Maximum number of error body characters surfaced to callers.
const MAX_ERROR_CHARS: usize = 200;

#[derive(Clone, Debug)]
pub enum RequestBody {
    Empty,
    Json(Value),
    Form(Vec<(String, String)>),
    Bytes(Vec<u8>),
    Multipart(Vec<FormPart>),
}

/// One part of a multipart body. Kept as plain data so a request can be replayed.
#[derive(Clone, Debug)]
pub struct FormPart {
    name: String,
    value: PartValue,
}

#[derive(Clone, Debug)]
enum PartValue {
    Text(String),
    File {
        bytes: Vec<u8>,
        file_name: String,
        mime: Option<String>,
    },
}

impl FormPart {
    #[must_use]
    pub fn text(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: PartValue::Text(value.into()),
        }
    }

    #[must_use]
    pub fn file(name: impl Into<String>, file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            value: PartValue::File {
                bytes,
                file_name: file_name.into(),
                mime: None,
            },
        }
    }

    /// Sets the part content type. Ignored for text parts.
    #[must_use]
    pub fn with_mime(mut self, mime: impl Into<String>) -> Self {
        if let PartValue::File { mime: slot, .. } = &mut self.value {
            *slot = Some(mime.into());
        }
        self
    }
}

fn to_form(parts: &[FormPart]) -> Result<Form, Error> {
    let mut form = Form::new();
    for part in parts {
        form = match &part.value {
            PartValue::Text(value) => form.text(part.name.clone(), value.clone()),
            PartValue::File {
                bytes,
                file_name,
                mime,
            } => {
                let mut file = Part::bytes(bytes.clone()).file_name(file_name.clone());
                if let Some(mime) = mime {
                    file = file.mime_str(mime).map_err(|err| {
                        Error::Serialization(format!("Invalid part content type {mime}: {err}"))
                    })?;
                }
                form.part(part.name.clone(), file)
            }
        };
    }
    Ok(form)
}

/// A replayable request description, relative to the API base URL.
#[derive(Clone, Debug)]
pub struct ApiRequest {
    method: Method,
    path: String,
    headers: HeaderMap,
    body: RequestBody,
}

impl ApiRequest {
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: HeaderMap::new(),
            body: RequestBody::Empty,
        }
    }

    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    #[must_use]
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    #[must_use]
    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    #[must_use]
    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    #[must_use]
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    #[must_use]
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    #[must_use]
    pub fn json(mut self, value: Value) -> Self {
        self.body = RequestBody::Json(value);
        self
    }

    /// Serializes `body` as the JSON payload.
    ///
    /// # Errors
    /// Returns `Error::Serialization` if `body` cannot be encoded.
    pub fn json_body<B: Serialize + ?Sized>(self, body: &B) -> Result<Self, Error> {
        let value = serde_json::to_value(body)
            .map_err(|err| Error::Serialization(format!("Failed to encode request: {err}")))?;
        Ok(self.json(value))
    }

    #[must_use]
    pub fn form(mut self, pairs: Vec<(String, String)>) -> Self {
        self.body = RequestBody::Form(pairs);
        self
    }

    #[must_use]
    pub fn bytes(mut self, bytes: Vec<u8>) -> Self {
        self.body = RequestBody::Bytes(bytes);
        self
    }

    #[must_use]
    pub fn multipart(mut self, parts: Vec<FormPart>) -> Self {
        self.body = RequestBody::Multipart(parts);
        self
    }

    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    #[must_use]
    pub fn body(&self) -> &RequestBody {
        &self.body
    }
}

/// Builds the outgoing headers for `request`.
///
/// Caller headers come first. JSON bodies get `application/json`; form, binary and
/// multipart bodies drop any inherited `Content-Type` so the client can set the
/// right one (multipart needs its boundary). The CSRF header is only added to
/// unsafe methods.
///
/// # Errors
/// Returns `Error::Serialization` if the authorization value is not a valid header.
pub fn build_headers(
    request: &ApiRequest,
    auth: Option<&StoredAuth>,
    csrf: Option<(&HeaderName, &str)>,
) -> Result<HeaderMap, Error> {
    let mut headers = request.headers.clone();

    match request.body {
        RequestBody::Json(_) => {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }
        RequestBody::Form(_) | RequestBody::Bytes(_) | RequestBody::Multipart(_) => {
            headers.remove(CONTENT_TYPE);
        }
        RequestBody::Empty => {}
    }

    if let Some(auth) = auth {
        let mut value = HeaderValue::from_str(&auth.authorization()).map_err(|_| {
            Error::Serialization("Stored access token is not a valid header value.".to_string())
        })?;
        value.set_sensitive(true);
        headers.insert(AUTHORIZATION, value);
    }

    if !request.method.is_safe() {
        if let Some((name, token)) = csrf {
            match HeaderValue::from_str(token) {
                Ok(value) => {
                    headers.insert(name.clone(), value);
                }
                Err(_) => debug!("ignoring CSRF cookie that is not a valid header value"),
            }
        }
    }

    Ok(headers)
}

#[derive(Clone, Debug)]
pub struct ApiTransport {
    client: Client,
    jar: Arc<Jar>,
    base_url: Url,
    csrf_cookie: String,
    csrf_header: HeaderName,
}

impl ApiTransport {
    /// # Errors
    /// Returns `Error::Config` when the base URL or CSRF header name is invalid, or
    /// the HTTP client cannot be built.
    pub fn new(config: &ClientConfig) -> Result<Self, Error> {
        let base_url = config.validate()?;
        let csrf_header = HeaderName::from_bytes(config.csrf_header_name().as_bytes())
            .map_err(|err| {
                Error::Config(format!(
                    "Invalid CSRF header name {}: {err}",
                    config.csrf_header_name()
                ))
            })?;

        let jar = Arc::new(Jar::default());
        let client = Client::builder()
            .user_agent(APP_USER_AGENT)
            .cookie_provider(Arc::clone(&jar))
            .timeout(config.request_timeout())
            .build()
            .map_err(|err| Error::Config(format!("Failed to build HTTP client: {err}")))?;

        Ok(Self {
            client,
            jar,
            base_url,
            csrf_cookie: config.csrf_cookie_name().to_string(),
            csrf_header,
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// The cookie jar shared with the HTTP client.
    #[must_use]
    pub fn jar(&self) -> &Arc<Jar> {
        &self.jar
    }

    /// Resolves `path` against the API base URL, keeping any base path prefix.
    ///
    /// # Errors
    /// Returns `Error::Config` if the joined URL does not parse.
    pub fn url(&self, path: &str) -> Result<Url, Error> {
        let joined = build_url_with_base(self.base_url.as_str(), path);
        Url::parse(&joined).map_err(|err| Error::Config(format!("Invalid URL {joined}: {err}")))
    }

    /// Reads the CSRF token from the cookie the backend set for the API origin.
    #[must_use]
    pub fn csrf_token(&self) -> Option<String> {
        let cookies = self.jar.cookies(&self.base_url)?;
        let cookies = cookies.to_str().ok()?;
        cookies.split(';').find_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            (name == self.csrf_cookie && !value.is_empty()).then(|| value.to_string())
        })
    }

    /// Sends `request` once, attaching `auth` and the CSRF header as needed.
    ///
    /// # Errors
    /// Returns `Error::Network` or `Error::Timeout` when the server cannot be
    /// reached, or `Error::Serialization` when the request cannot be built.
    pub async fn send(
        &self,
        request: &ApiRequest,
        auth: Option<&StoredAuth>,
    ) -> Result<Response, Error> {
        let url = self.url(&request.path)?;
        let csrf = self.csrf_token();
        let headers = build_headers(
            request,
            auth,
            csrf.as_deref().map(|token| (&self.csrf_header, token)),
        )?;

        let builder = self
            .client
            .request(request.method.clone(), url.clone())
            .headers(headers);
        let builder = match &request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.body(serde_json::to_vec(value).map_err(|err| {
                Error::Serialization(format!("Failed to encode request: {err}"))
            })?),
            RequestBody::Form(pairs) => builder.form(pairs),
            RequestBody::Bytes(bytes) => builder.body(bytes.clone()),
            RequestBody::Multipart(parts) => builder.multipart(to_form(parts)?),
        };

        let span = info_span!(
            "api.request",
            http.method = %request.method,
            url = %url
        );
        let response = builder
            .send()
            .instrument(span)
            .await
            .map_err(map_request_error)?;

        debug!("{} {} -> {}", request.method, url.path(), response.status());
        Ok(response)
    }

    /// GETs JSON without a session, e.g. ceremony options.
    ///
    /// # Errors
    /// Returns transport errors, `Error::Http` for non-2xx and `Error::Parse` for bad bodies.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, Error> {
        let response = self.send(&ApiRequest::get(path), None).await?;
        handle_json_response(response).await
    }

    /// POSTs JSON without a session and parses a JSON response.
    ///
    /// # Errors
    /// Returns transport errors, `Error::Http` for non-2xx and `Error::Parse` for bad bodies.
    pub async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, Error> {
        let request = ApiRequest::post(path).json_body(body)?;
        let response = self.send(&request, None).await?;
        handle_json_response(response).await
    }

    /// POSTs JSON and returns whatever the server sent back, as JSON when possible.
    ///
    /// # Errors
    /// Returns transport errors and `Error::Http` for non-2xx responses.
    pub async fn post_json_value<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<Value, Error> {
        let request = ApiRequest::post(path).json_body(body)?;
        let response = self.send(&request, None).await?;
        handle_value_response(response).await
    }

    /// POSTs JSON and expects no meaningful response body.
    ///
    /// # Errors
    /// Returns transport errors and `Error::Http` for non-2xx responses.
    pub async fn post_json_empty<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<(), Error> {
        let request = ApiRequest::post(path).json_body(body)?;
        let response = self.send(&request, None).await?;
        handle_empty_response(response).await
    }
}

/// Builds a URL from an explicit base URL and the provided path.
#[must_use]
pub fn build_url_with_base(base_url: &str, path: &str) -> String {
    let base = base_url.trim().trim_end_matches('/');
    let path = path.trim();

    if base.is_empty() {
        path.to_string()
    } else {
        format!("{}/{}", base, path.trim_start_matches('/'))
    }
}

/// Maps client errors into `Network`/`Timeout`.
#[must_use]
pub fn map_request_error(err: reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::Timeout("Request timed out. Please try again.".to_string())
    } else {
        Error::Network(format!("Unable to reach the server: {err}"))
    }
}

/// Parses JSON responses and surfaces HTTP errors with sanitized bodies.
///
/// # Errors
/// Returns `Error::Http` for non-2xx and `Error::Parse` for undecodable bodies.
pub async fn handle_json_response<T: DeserializeOwned>(response: Response) -> Result<T, Error> {
    if response.status().is_success() {
        response
            .json::<T>()
            .await
            .map_err(|err| Error::Parse(format!("Failed to decode response: {err}")))
    } else {
        Err(http_error(response).await)
    }
}

/// Handles empty responses and returns sanitized HTTP errors when needed.
///
/// # Errors
/// Returns `Error::Http` for non-2xx responses.
pub async fn handle_empty_response(response: Response) -> Result<(), Error> {
    if response.status().is_success() {
        Ok(())
    } else {
        Err(http_error(response).await)
    }
}

/// Reads a 2xx body as JSON; an empty body is `Null` and plain text becomes a string.
///
/// # Errors
/// Returns `Error::Http` for non-2xx responses and `Error::Network` if the body
/// cannot be read.
pub async fn handle_value_response(response: Response) -> Result<Value, Error> {
    if !response.status().is_success() {
        return Err(http_error(response).await);
    }
    let text = response
        .text()
        .await
        .map_err(|err| Error::Network(format!("Failed to read response: {err}")))?;
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    Ok(serde_json::from_str(&text).unwrap_or(Value::String(text)))
}

/// Turns a non-2xx response into `Error::Http`.
pub async fn http_error(response: Response) -> Error {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    Error::Http {
        status,
        message: sanitize_body(&body),
    }
}

/// Prefers the JSON `message`/`error` field, then the trimmed body text, truncated.
#[must_use]
pub fn sanitize_body(body: &str) -> String {
    let trimmed = body.trim();
    let extracted = serde_json::from_str::<Value>(trimmed).ok().and_then(|value| {
        ["message", "error"]
            .iter()
            .find_map(|key| value.get(key).and_then(Value::as_str).map(str::to_string))
    });
    let message = extracted.as_deref().unwrap_or(trimmed).trim();

    if message.is_empty() {
        "Request failed.".to_string()
    } else {
        message.chars().take(MAX_ERROR_CHARS).collect()
    }
}
