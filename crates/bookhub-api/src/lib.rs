// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, bail};
use reqwest::Method;
use reqwest::blocking::Client as HttpClient;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde::Serialize;
use serde::de::DeserializeOwned;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";

/// Raw outcome of one HTTP exchange: the status code plus the body read
/// from whichever stream the server used. Multi-line bodies are flattened
/// to a single line; callers must not expect embedded newlines to survive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub const fn outcome(&self) -> Outcome {
        Outcome::classify(self.status)
    }

    /// One-line message for the status bar. The body is opaque diagnostic
    /// text from the server, passed through untouched.
    pub fn user_message(&self) -> String {
        let body = if self.body.trim().is_empty() {
            "check the server log"
        } else {
            self.body.as_str()
        };
        format!("{} ({}): {}", self.outcome().label(), self.status, body)
    }
}

/// User-facing category for an HTTP status. The status alone selects the
/// category; the body never participates. 1xx/3xx and any status not
/// listed land in `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    BadRequest,
    NotFound,
    Conflict,
    ServerError,
    Unknown,
}

impl Outcome {
    pub const fn classify(status: u16) -> Self {
        match status {
            200..=299 => Self::Success,
            400 => Self::BadRequest,
            404 => Self::NotFound,
            409 => Self::Conflict,
            500 => Self::ServerError,
            _ => Self::Unknown,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Success => "ok",
            Self::BadRequest => "invalid request",
            Self::NotFound => "not found",
            Self::Conflict => "conflict",
            Self::ServerError => "server error",
            Self::Unknown => "unexpected status",
        }
    }
}

/// Failure modes of a single call. A server that answered at all is
/// `Http`; `Transport` means the exchange never completed and `Decode`
/// means the body did not have the promised shape.
#[derive(Debug)]
pub enum ApiError {
    Transport(reqwest::Error),
    Http(ApiResponse),
    Decode(serde_json::Error),
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transport(error) => write!(f, "cannot reach the server: {error}"),
            Self::Http(response) => f.write_str(&response.user_message()),
            Self::Decode(error) => write!(f, "invalid response body: {error}"),
        }
    }
}

impl std::error::Error for ApiError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Transport(error) => Some(error),
            Self::Decode(error) => Some(error),
            Self::Http(_) => None,
        }
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Blocking HTTP/JSON client with a fixed base URL and no other state.
/// Cloneable so background workers can own a copy; every call is a single
/// attempt with no retry.
#[derive(Debug, Clone)]
pub struct Client {
    base_url: String,
    http: HttpClient,
}

impl Client {
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url = base_url.trim_end_matches('/').to_owned();
        if base_url.is_empty() {
            bail!("api.base_url must not be empty");
        }

        let http = HttpClient::builder().build().context("build HTTP client")?;

        Ok(Self { base_url, http })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetches a collection. Unlike the mutating calls, a non-success
    /// status here is an error: there is no list to hand back.
    pub fn get_list<T: DeserializeOwned>(&self, endpoint: &str) -> ApiResult<Vec<T>> {
        let response = self
            .http
            .get(format!("{}{endpoint}", self.base_url))
            .header(ACCEPT, "application/json")
            .send()
            .map_err(ApiError::Transport)?;

        let status = response.status().as_u16();
        let body = flatten_body(&response.text().map_err(ApiError::Transport)?);
        if status >= 400 {
            return Err(ApiError::Http(ApiResponse { status, body }));
        }

        serde_json::from_str(&body).map_err(ApiError::Decode)
    }

    pub fn post<B: Serialize>(&self, endpoint: &str, body: &B) -> ApiResult<ApiResponse> {
        self.send_with_body(Method::POST, endpoint, body)
    }

    pub fn put<B: Serialize>(&self, endpoint: &str, body: &B) -> ApiResult<ApiResponse> {
        self.send_with_body(Method::PUT, endpoint, body)
    }

    pub fn patch<B: Serialize>(&self, endpoint: &str, body: &B) -> ApiResult<ApiResponse> {
        self.send_with_body(Method::PATCH, endpoint, body)
    }

    pub fn delete(&self, endpoint: &str) -> ApiResult<ApiResponse> {
        let response = self
            .http
            .delete(format!("{}{endpoint}", self.base_url))
            .header(ACCEPT, "application/json")
            .send()
            .map_err(ApiError::Transport)?;

        read_response(response)
    }

    fn send_with_body<B: Serialize>(
        &self,
        method: Method,
        endpoint: &str,
        body: &B,
    ) -> ApiResult<ApiResponse> {
        let encoded = serde_json::to_string(body).map_err(ApiError::Decode)?;
        let response = self
            .http
            .request(method, format!("{}{endpoint}", self.base_url))
            .header(CONTENT_TYPE, "application/json; charset=UTF-8")
            .header(ACCEPT, "application/json")
            .body(encoded)
            .send()
            .map_err(ApiError::Transport)?;

        read_response(response)
    }
}

fn read_response(response: reqwest::blocking::Response) -> ApiResult<ApiResponse> {
    let status = response.status().as_u16();
    let body = flatten_body(&response.text().map_err(ApiError::Transport)?);
    Ok(ApiResponse { status, body })
}

fn flatten_body(raw: &str) -> String {
    if raw.contains('\n') {
        raw.lines().collect()
    } else {
        raw.to_owned()
    }
}
