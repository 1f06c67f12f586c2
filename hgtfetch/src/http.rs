//! HTTP client abstraction for testability.

use crate::SourceError;
use std::time::Duration;

/// The slice of an HTTP response the sources care about.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// URL the request ended up at after redirects.
    pub final_url: String,
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Blocking HTTP operations behind a trait so tests can substitute a
/// scripted client and assert on issued requests.
pub trait HttpClient: Send + Sync {
    fn get(&self, url: &str) -> Result<HttpResponse, SourceError>;

    fn post_form(
        &self,
        url: &str,
        fields: &[(String, String)],
    ) -> Result<HttpResponse, SourceError>;
}

/// `reqwest`-backed client with a cookie store, so a login session
/// carries over to every subsequent download.
pub struct ReqwestClient {
    inner: reqwest::blocking::Client,
}

impl ReqwestClient {
    /// `timeout` applies per request; `None` leaves deadlines to the
    /// caller's environment.
    pub fn new(timeout: Option<Duration>) -> Result<Self, SourceError> {
        let mut builder = reqwest::blocking::Client::builder().cookie_store(true);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            inner: builder.build()?,
        })
    }
}

impl HttpClient for ReqwestClient {
    fn get(&self, url: &str) -> Result<HttpResponse, SourceError> {
        convert(self.inner.get(url).send()?)
    }

    fn post_form(
        &self,
        url: &str,
        fields: &[(String, String)],
    ) -> Result<HttpResponse, SourceError> {
        convert(self.inner.post(url).form(&fields).send()?)
    }
}

fn convert(response: reqwest::blocking::Response) -> Result<HttpResponse, SourceError> {
    let final_url = response.url().to_string();
    let status = response.status().as_u16();
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned);
    let body = response.bytes()?.to_vec();
    Ok(HttpResponse {
        final_url,
        status,
        content_type,
        body,
    })
}
