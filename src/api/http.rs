use std::time::Duration;

use reqwest::Client;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::config::ServerConfig as ServerSettings;
use crate::error::{ParleyError, Result};

use super::{
    ServerConfig, SessionApi, StartReply, StartRequest, TurnReply, TurnRequest, VoiceReply,
    VoiceRequest, decode_reply,
};

/// [`SessionApi`] over HTTP + JSON.
pub struct HttpApi {
    client: Client,
    base_url: String,
}

impl HttpApi {
    pub fn new(config: &ServerSettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| ParleyError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn post<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        let url = self.url(path);
        tracing::debug!("POST {url}");

        let resp = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| ParleyError::NetworkUnreachable(format!("POST {url} failed: {e}")))?;

        Self::read(resp).await
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.url(path);
        tracing::debug!("GET {url}");

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ParleyError::NetworkUnreachable(format!("GET {url} failed: {e}")))?;

        Self::read(resp).await
    }

    // Error bodies arrive with 4xx/5xx statuses, so the body is decoded
    // regardless of status.
    async fn read<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T> {
        let status = resp.status();
        let body = resp
            .bytes()
            .await
            .map_err(|e| ParleyError::NetworkUnreachable(format!("failed to read response: {e}")))?;

        if !status.is_success() {
            tracing::debug!("server returned {status}");
        }
        decode_reply(&body)
    }
}

impl SessionApi for HttpApi {
    async fn start(&self, request: &StartRequest) -> Result<StartReply> {
        self.post("/api/start", request).await
    }

    async fn message(&self, request: &TurnRequest) -> Result<TurnReply> {
        self.post("/api/message", request).await
    }

    async fn transcribe(&self, request: &VoiceRequest) -> Result<VoiceReply> {
        self.post("/api/voice", request).await
    }

    async fn config(&self) -> Result<ServerConfig> {
        self.get("/api/config").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api(base_url: &str) -> HttpApi {
        HttpApi::new(&ServerSettings {
            base_url: base_url.to_string(),
            request_timeout_secs: 2,
        })
        .unwrap_or_else(|e| panic!("{e}"))
    }

    #[test]
    fn trailing_slash_is_trimmed() {
        let api = api("http://localhost:8000/");
        assert_eq!(api.base_url(), "http://localhost:8000");
        assert_eq!(api.url("/api/start"), "http://localhost:8000/api/start");
    }

    #[tokio::test]
    async fn unreachable_server_is_network_error() {
        // Nothing listens on the discard port.
        let api = api("http://127.0.0.1:9");
        let result = api.config().await;
        assert!(matches!(result, Err(ParleyError::NetworkUnreachable(_))));
    }
}
