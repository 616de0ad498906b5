use crate::retry::retry_transient;
use crate::ServerError;
use reqwest::header::HeaderMap;
use reqwest::{Client, Method};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// JSON-over-HTTP plumbing shared by the server clients.
pub(crate) struct JsonClient {
    server: String,
    base_url: String,
    client: Client,
    retry_attempts: u32,
}

impl JsonClient {
    pub fn new(
        server: &str,
        base_url: &str,
        default_headers: HeaderMap,
        timeout: Duration,
        retry_attempts: u32,
    ) -> Result<Self, ServerError> {
        let client = Client::builder()
            .default_headers(default_headers)
            .timeout(timeout)
            .build()
            .map_err(|e| ServerError::from_reqwest(server, base_url, e))?;

        Ok(Self {
            server: server.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            retry_attempts,
        })
    }

    pub async fn get(&self, path: &str, query: &[(&str, String)], headers: &HeaderMap) -> Result<Value, ServerError> {
        self.send(Method::GET, path, query, None, headers, true)
            .await?
            .ok_or_else(|| ServerError::decode(&self.server, path, "empty body"))
    }

    pub async fn post(
        &self,
        path: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
        headers: &HeaderMap,
    ) -> Result<Option<Value>, ServerError> {
        self.send(Method::POST, path, query, body, headers, true).await
    }

    /// Fire a mutation whose response body carries nothing we need.
    pub async fn call(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
        headers: &HeaderMap,
    ) -> Result<(), ServerError> {
        self.send(method, path, query, body, headers, false).await.map(|_| ())
    }

    /// Issue one request with transient-failure retries; an empty body yields `None`.
    async fn send(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
        headers: &HeaderMap,
        parse_body: bool,
    ) -> Result<Option<Value>, ServerError> {
        let url = format!("{}{}", self.base_url, path);
        let label = format!("{} {} {}", self.server, method, path);

        retry_transient(self.retry_attempts, &label, || {
            let mut request = self
                .client
                .request(method.clone(), &url)
                .query(query)
                .headers(headers.clone());
            if let Some(body) = body {
                request = request.json(body);
            }
            async move {
                debug!(server = %self.server, path, "sending request");
                let response = request
                    .send()
                    .await
                    .map_err(|e| ServerError::from_reqwest(&self.server, path, e))?;
                let status = response.status();
                if !status.is_success() {
                    if status.as_u16() == 401 || status.as_u16() == 403 {
                        return Err(ServerError::Auth {
                            server: self.server.clone(),
                            message: format!("{} rejected with HTTP {}", path, status.as_u16()),
                        });
                    }
                    return Err(ServerError::Status {
                        server: self.server.clone(),
                        path: path.to_string(),
                        status: status.as_u16(),
                    });
                }
                if !parse_body {
                    return Ok(None);
                }
                let text = response
                    .text()
                    .await
                    .map_err(|e| ServerError::from_reqwest(&self.server, path, e))?;
                if text.trim().is_empty() {
                    return Ok(None);
                }
                serde_json::from_str(&text)
                    .map(Some)
                    .map_err(|e| ServerError::decode(&self.server, path, e.to_string()))
            }
        })
        .await
    }
}
