//! C4/C6/C8/C11 collaborator — the aggregator HTTP surface (spec.md §6).
//!
//! Treated as an opaque routing oracle: this module's job is only to get
//! JSON in and out over the wire with the right headers, retry/timeout
//! discipline, and abort semantics. Field extraction and validation live
//! in the component that owns the shape it cares about (`catalog::chain`,
//! `catalog::token`, `quote::dto`). Grounded on the request/retry loop in
//! `bridges/lifi.rs`, generalized across every endpoint this crate calls
//! rather than just `/quote`.

use std::time::Duration;

use anyhow::{anyhow, Result};
use reqwest::{header, Client, Method};
use serde_json::Value;
use tracing::warn;

const MAX_RETRIES: u32 = 2;

pub struct AggregatorClient {
    http: Client,
    base_url: String,
    integrator: String,
    api_key: Option<String>,
}

impl AggregatorClient {
    pub fn new(base_url: impl Into<String>, integrator: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            http: Client::builder().build().expect("failed to build aggregator http client"),
            base_url: base_url.into(),
            integrator: integrator.into(),
            api_key,
        }
    }

    fn headers(&self) -> Result<header::HeaderMap> {
        let mut headers = header::HeaderMap::new();
        headers.insert("x-lifi-integrator", self.integrator.parse()?);
        if let Some(key) = &self.api_key {
            headers.insert("x-lifi-api-key", key.parse()?);
        }
        Ok(headers)
    }

    async fn request(&self, method: Method, path: &str, query: &[(&str, &str)], body: Option<&Value>, timeout: Duration) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        let mut attempt = 0;
        loop {
            let mut builder = self
                .http
                .request(method.clone(), &url)
                .headers(self.headers()?)
                .timeout(timeout)
                .query(query);
            if let Some(body) = body {
                builder = builder.json(body);
            }

            match builder.send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if status.as_u16() == 429 && attempt < MAX_RETRIES {
                        warn!(path, attempt, "aggregator rate limited, retrying");
                        tokio::time::sleep(Duration::from_secs(2)).await;
                        attempt += 1;
                        continue;
                    }
                    if status == reqwest::StatusCode::NOT_FOUND {
                        return Err(anyhow!("aggregator 404: {path}"));
                    }
                    if !status.is_success() {
                        let text = resp.text().await.unwrap_or_default();
                        return Err(anyhow!("aggregator error {status} on {path}: {text}"));
                    }
                    return resp.json::<Value>().await.map_err(|e| anyhow!("aggregator returned invalid JSON for {path}: {e}"));
                }
                Err(err) if err.is_timeout() => {
                    return Err(anyhow!("aggregator request to {path} timed out after {timeout:?}"));
                }
                Err(err) if attempt < MAX_RETRIES => {
                    warn!(path, attempt, error = %err, "aggregator request failed, retrying");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    attempt += 1;
                    continue;
                }
                Err(err) => return Err(anyhow!("aggregator request to {path} failed: {err}")),
            }
        }
    }

    pub async fn get(&self, path: &str, query: &[(&str, &str)], timeout: Duration) -> Result<Value> {
        self.request(Method::GET, path, query, None, timeout).await
    }

    pub async fn post(&self, path: &str, body: Value, timeout: Duration) -> Result<Value> {
        self.request(Method::POST, path, &[], Some(&body), timeout).await
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    #[tokio::test]
    async fn get_returns_parsed_json_on_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/chains"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"chains": []})))
            .mount(&server)
            .await;

        let client = AggregatorClient::new(server.uri(), "xbridge", None);
        let value = client.get("/chains", &[], Duration::from_secs(5)).await.unwrap();
        assert_eq!(value["chains"].as_array().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn get_surfaces_404_as_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET")).and(path("/quote")).respond_with(ResponseTemplate::new(404)).mount(&server).await;

        let client = AggregatorClient::new(server.uri(), "xbridge", None);
        let err = client.get("/quote", &[], Duration::from_secs(5)).await.unwrap_err();
        assert!(err.to_string().contains("404"));
    }

    #[tokio::test]
    async fn retries_on_429_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/chains"))
            .respond_with(ResponseTemplate::new(429))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/chains"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"chains": []})))
            .mount(&server)
            .await;

        let client = AggregatorClient::new(server.uri(), "xbridge", None);
        let value = client.get("/chains", &[], Duration::from_secs(5)).await.unwrap();
        assert!(value["chains"].as_array().is_some());
    }
}
