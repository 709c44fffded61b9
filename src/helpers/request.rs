//! Authenticated request construction and execution.
//!
//! BambooHR's web endpoints want a very particular shape: a Referer matching
//! the endpoint, the session cookies assembled by hand, and the CSRF token in
//! `X-CSRF-TOKEN`. The platform's cookie scoping mixes exact-host cookies
//! with `.bamboohr.com` domain-wide ones, so we keep our own store instead of
//! a transparent cookie jar.

use chrono::{DateTime, Duration, Utc};
use reqwest::header::{
    ACCEPT, CONTENT_TYPE, COOKIE, HeaderMap, HeaderName, HeaderValue, REFERER, SET_COOKIE,
};
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use std::collections::{BTreeMap, HashMap};
use tracing::{error, info};

use crate::error::BambooError;

/// One stored cookie. Session cookies carry no expiry.
#[derive(Debug, Clone)]
pub struct Cookie {
    pub value: String,
    pub expires: Option<DateTime<Utc>>,
}

impl Cookie {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires.is_some_and(|at| at <= now)
    }
}

/// Cookies grouped by the domain they are scoped to, name-keyed within each.
#[derive(Debug, Default)]
pub struct CookieStore {
    domains: HashMap<String, BTreeMap<String, Cookie>>,
}

impl CookieStore {
    /// Harvest every `Set-Cookie` header of a response into the store.
    /// A `Domain` attribute rescopes the cookie; otherwise it sticks to the
    /// host the request went to.
    pub fn store_response_headers(&mut self, host: &str, headers: &HeaderMap) {
        for value in headers.get_all(SET_COOKIE) {
            if let Ok(raw) = value.to_str() {
                self.store_set_cookie(host, raw);
            }
        }
    }

    pub fn store_set_cookie(&mut self, host: &str, raw: &str) {
        let mut parts = raw.split(';').map(str::trim);
        let Some((name, value)) = parts.next().and_then(|p| p.split_once('=')) else {
            return;
        };

        let mut domain = host.to_string();
        let mut expires = None;
        for attr in parts {
            let (key, val) = attr.split_once('=').unwrap_or((attr, ""));
            match key.to_ascii_lowercase().as_str() {
                "domain" => domain = val.trim_start_matches('.').to_string(),
                "max-age" => {
                    if let Ok(seconds) = val.parse::<i64>() {
                        expires = Some(Utc::now() + Duration::seconds(seconds));
                    }
                }
                "expires" => {
                    if expires.is_none() {
                        expires = parse_cookie_date(val);
                    }
                }
                _ => {}
            }
        }

        self.set(&domain, name, Cookie { value: value.to_string(), expires });
    }

    pub fn set(&mut self, domain: &str, name: &str, cookie: Cookie) {
        self.domains
            .entry(domain.to_string())
            .or_default()
            .insert(name.to_string(), cookie);
    }

    pub fn get(&self, domain: &str, name: &str) -> Option<&Cookie> {
        self.domains.get(domain).and_then(|jar| jar.get(name))
    }

    /// Look a cookie up under the exact host first, then the parent domain.
    pub fn get_for_host(&self, host: &str, name: &str) -> Option<&Cookie> {
        self.get(host, name)
            .or_else(|| parent_domain(host).and_then(|domain| self.get(domain, name)))
    }

    /// Assemble the `Cookie` header for `host`: domain-wide cookies of the
    /// parent domain merged with exact-host cookies, the exact host winning
    /// on name collision. Expired cookies are left out.
    pub fn cookie_header(&self, host: &str) -> Option<String> {
        let now = Utc::now();
        let mut merged: BTreeMap<&str, &Cookie> = BTreeMap::new();

        let scopes = parent_domain(host)
            .into_iter()
            .chain(std::iter::once(host));
        for scope in scopes {
            if let Some(jar) = self.domains.get(scope) {
                for (name, cookie) in jar {
                    if !cookie.is_expired(now) {
                        merged.insert(name, cookie);
                    }
                }
            }
        }

        if merged.is_empty() {
            return None;
        }
        let header = merged
            .into_iter()
            .map(|(name, cookie)| format!("{}={}", name, urlencoding::encode(&cookie.value)))
            .collect::<Vec<_>>()
            .join("; ");
        Some(header)
    }
}

fn parent_domain(host: &str) -> Option<&str> {
    let (_, rest) = host.split_once('.')?;
    rest.contains('.').then_some(rest)
}

/// Cookie `Expires` dates come as IMF-fixdate, with the odd legacy
/// dash-separated variant still in the wild.
fn parse_cookie_date(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc2822(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    chrono::NaiveDateTime::parse_from_str(raw, "%a, %d-%b-%Y %H:%M:%S GMT")
        .ok()
        .map(|naive| naive.and_utc())
}

enum RequestBody {
    Json(serde_json::Value),
    Form(Vec<(String, String)>),
}

/// Declarative request shape, turned into a concrete `reqwest` call by
/// [`execute`] once the session state is known.
pub struct ApiRequest {
    method: Method,
    endpoint: String,
    body: Option<RequestBody>,
    extra_headers: Vec<(String, String)>,
    auth_required: bool,
    accept_json: bool,
}

impl ApiRequest {
    pub fn new(method: Method, endpoint: impl Into<String>) -> Self {
        Self {
            method,
            endpoint: endpoint.into(),
            body: None,
            extra_headers: Vec::new(),
            auth_required: true,
            accept_json: false,
        }
    }

    pub fn get(endpoint: impl Into<String>) -> Self {
        Self::new(Method::GET, endpoint)
    }

    pub fn post(endpoint: impl Into<String>) -> Self {
        Self::new(Method::POST, endpoint)
    }

    pub fn delete(endpoint: impl Into<String>) -> Self {
        Self::new(Method::DELETE, endpoint)
    }

    pub fn json(mut self, value: serde_json::Value) -> Self {
        self.body = Some(RequestBody::Json(value));
        self
    }

    pub fn form(mut self, pairs: Vec<(String, String)>) -> Self {
        self.body = Some(RequestBody::Form(pairs));
        self
    }

    /// Merged after the defaults; last write wins on a header name.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_headers.push((name.into(), value.into()));
        self
    }

    /// Skip the CSRF token and cookie headers (pre-login requests).
    pub fn anonymous(mut self) -> Self {
        self.auth_required = false;
        self
    }

    pub fn accept_json(mut self) -> Self {
        self.accept_json = true;
        self
    }

    pub(crate) fn into_builder(
        self,
        client: &Client,
        base_url: &str,
        host: &str,
        cookies: &CookieStore,
        csrf_token: Option<&str>,
    ) -> Result<reqwest::RequestBuilder, BambooError> {
        let url = format!("{}/{}", base_url.trim_end_matches('/'), self.endpoint);

        let mut headers = HeaderMap::new();
        headers.insert(REFERER, header_value(&url)?);

        if self.auth_required {
            if let Some(token) = csrf_token {
                headers.insert("X-CSRF-TOKEN", header_value(token)?);
            }
            if let Some(cookie) = cookies.cookie_header(host) {
                headers.insert(COOKIE, header_value(&cookie)?);
            }
        }

        if matches!(self.method, Method::POST | Method::PUT | Method::DELETE) {
            headers.insert(
                CONTENT_TYPE,
                HeaderValue::from_static("application/json; charset=utf-8"),
            );
        }

        if self.accept_json {
            headers.insert(
                ACCEPT,
                HeaderValue::from_static("application/json, text/plain, */*"),
            );
        }

        for (name, value) in &self.extra_headers {
            let name = HeaderName::try_from(name.as_str())
                .map_err(|e| BambooError::Header(e.to_string()))?;
            headers.insert(name, header_value(value)?);
        }

        let builder = client.request(self.method, url).headers(headers);
        let builder = match self.body {
            Some(RequestBody::Json(value)) => builder.body(serde_json::to_string(&value)?),
            Some(RequestBody::Form(pairs)) => {
                let encoded = pairs
                    .iter()
                    .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
                    .collect::<Vec<_>>()
                    .join("&");
                builder
                    .header(
                        CONTENT_TYPE,
                        HeaderValue::from_static("application/x-www-form-urlencoded"),
                    )
                    .body(encoded)
            }
            None => builder,
        };
        Ok(builder)
    }
}

fn header_value(raw: &str) -> Result<HeaderValue, BambooError> {
    HeaderValue::from_str(raw).map_err(|e| BambooError::Header(e.to_string()))
}

/// Status and body of a completed call.
#[derive(Debug)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub body: String,
}

impl ApiResponse {
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, BambooError> {
        Ok(serde_json::from_str(&self.body)?)
    }

    pub fn error_for_status(self, endpoint: &str) -> Result<Self, BambooError> {
        if self.status.is_success() {
            Ok(self)
        } else {
            error!("Request to {} failed with status {}", endpoint, self.status);
            Err(BambooError::Request { endpoint: endpoint.to_string(), status: self.status })
        }
    }
}

/// Send one request, folding any `Set-Cookie` headers of the response back
/// into the store before the body is read.
pub async fn execute(
    client: &Client,
    base_url: &str,
    host: &str,
    cookies: &mut CookieStore,
    csrf_token: Option<&str>,
    request: ApiRequest,
) -> Result<ApiResponse, BambooError> {
    let endpoint = request.endpoint.clone();
    let builder = request.into_builder(client, base_url, host, cookies, csrf_token)?;

    let response = builder.send().await?;
    cookies.store_response_headers(host, response.headers());

    let status = response.status();
    let body = response.text().await?;
    info!("{} returned status {} ({} bytes)", endpoint, status, body.len());
    Ok(ApiResponse { status, body })
}
