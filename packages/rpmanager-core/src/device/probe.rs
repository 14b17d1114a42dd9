//! Single bounded request against one device endpoint.

use super::{DiscoverInfo, FunctionCatalog};
use crate::error::{Error, Result};
use crate::model::host_port;
use reqwest::header::ACCEPT;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::time::Duration;

/// Header carrying the device credential
pub const API_KEY_HEADER: &str = "X-API-Key";

/// What to ask the device for.
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeRequest {
    /// `GET /discover`, never authenticated
    Discover,
    /// `GET /functions`
    ListFunctions,
    /// `POST /call/<function_id>` with the inputs as JSON body
    Invoke {
        function_id: String,
        inputs: Map<String, Value>,
    },
}

impl ProbeRequest {
    fn path(&self) -> String {
        match self {
            ProbeRequest::Discover => "/discover".to_string(),
            ProbeRequest::ListFunctions => "/functions".to_string(),
            ProbeRequest::Invoke { function_id, .. } => format!("/call/{}", function_id),
        }
    }

    fn sends_credential(&self) -> bool {
        !matches!(self, ProbeRequest::Discover)
    }
}

/// Result of one probe
/// - `Success(payload)` - 2xx with a decodable body
/// - `Unauthorized` - the device answered 401/403
/// - `Unreachable(reason)` - network error, timeout, other error status, bad body
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeOutcome<T> {
    Success(T),
    Unauthorized,
    Unreachable(String),
}

impl<T> ProbeOutcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, ProbeOutcome::Success(_))
    }

    pub fn ok(self) -> Option<T> {
        match self {
            ProbeOutcome::Success(payload) => Some(payload),
            _ => None,
        }
    }

    /// Convert into the core error taxonomy, naming `device` in the error.
    pub fn into_result(self, device: &str) -> Result<T> {
        match self {
            ProbeOutcome::Success(payload) => Ok(payload),
            ProbeOutcome::Unauthorized => Err(Error::Unauthorized {
                device: device.to_string(),
            }),
            ProbeOutcome::Unreachable(reason) => Err(Error::Unreachable {
                device: device.to_string(),
                reason,
            }),
        }
    }
}

/// Issues probes over a shared HTTP connection pool.
///
/// Every call does exactly one request and never retries.
#[derive(Debug, Clone)]
pub struct Probe {
    client: reqwest::Client,
}

impl Probe {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("rpmanager/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self::with_client(client))
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    pub async fn discover(&self, host: &str, port: u16, timeout: Duration) -> ProbeOutcome<DiscoverInfo> {
        self.send(host, port, &ProbeRequest::Discover, None, timeout)
            .await
    }

    pub async fn list_functions(
        &self,
        host: &str,
        port: u16,
        api_key: Option<&str>,
        timeout: Duration,
    ) -> ProbeOutcome<FunctionCatalog> {
        self.send(host, port, &ProbeRequest::ListFunctions, api_key, timeout)
            .await
    }

    pub async fn invoke(
        &self,
        host: &str,
        port: u16,
        function_id: &str,
        inputs: Map<String, Value>,
        api_key: Option<&str>,
        timeout: Duration,
    ) -> ProbeOutcome<Value> {
        let request = ProbeRequest::Invoke {
            function_id: function_id.to_string(),
            inputs,
        };
        self.send(host, port, &request, api_key, timeout).await
    }

    /// Perform one request and classify the answer.
    ///
    /// When `timeout` expires the in-flight request future is dropped, which
    /// closes its connection.
    pub async fn send<T: DeserializeOwned>(
        &self,
        host: &str,
        port: u16,
        request: &ProbeRequest,
        api_key: Option<&str>,
        timeout: Duration,
    ) -> ProbeOutcome<T> {
        let url = format!("http://{}{}", authority(host, port), request.path());

        let mut builder = match request {
            ProbeRequest::Invoke { inputs, .. } => self.client.post(&url).json(inputs),
            _ => self.client.get(&url),
        };
        builder = builder.header(ACCEPT, "application/json");
        if let Some(key) = api_key.filter(|_| request.sends_credential()) {
            builder = builder.header(API_KEY_HEADER, key);
        }

        let exchange = async move {
            let response = match builder.send().await {
                Ok(r) => r,
                Err(e) => return ProbeOutcome::Unreachable(e.to_string()),
            };

            let status = response.status();
            if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                return ProbeOutcome::Unauthorized;
            }
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return ProbeOutcome::Unreachable(describe_error_status(status, &body));
            }

            match response.json::<T>().await {
                Ok(payload) => ProbeOutcome::Success(payload),
                Err(e) => ProbeOutcome::Unreachable(format!("invalid response body: {}", e)),
            }
        };

        match tokio::time::timeout(timeout, exchange).await {
            Ok(outcome) => {
                if let ProbeOutcome::Unreachable(reason) = &outcome {
                    tracing::trace!("{} unreachable: {}", url, reason);
                }
                outcome
            }
            Err(_) => {
                tracing::trace!("{} timed out after {:?}", url, timeout);
                ProbeOutcome::Unreachable(format!("timed out after {}ms", timeout.as_millis()))
            }
        }
    }
}

/// `host:port` for URLs; IPv6 literals need brackets.
fn authority(host: &str, port: u16) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{}]:{}", host, port)
    } else {
        host_port(host, port)
    }
}

/// Devices report failures as `{"error": "..."}`; keep that message if present.
fn describe_error_status(status: StatusCode, body: &str) -> String {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("error").and_then(Value::as_str).map(str::to_string));

    match message {
        Some(message) => format!("device returned {}: {}", status, message),
        None => format!("device returned {}", status),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_paths() {
        assert_eq!(ProbeRequest::Discover.path(), "/discover");
        assert_eq!(ProbeRequest::ListFunctions.path(), "/functions");
        let invoke = ProbeRequest::Invoke {
            function_id: "reboot".to_string(),
            inputs: Map::new(),
        };
        assert_eq!(invoke.path(), "/call/reboot");
        assert!(!ProbeRequest::Discover.sends_credential());
        assert!(invoke.sends_credential());
    }

    #[test]
    fn test_authority_brackets_ipv6() {
        assert_eq!(authority("192.168.1.20", 5000), "192.168.1.20:5000");
        assert_eq!(authority("::1", 5000), "[::1]:5000");
        assert_eq!(authority("[::1]", 5000), "[::1]:5000");
    }

    #[test]
    fn test_error_status_keeps_device_message() {
        let reason = describe_error_status(
            StatusCode::NOT_FOUND,
            r#"{"error": "Function reboot not found"}"#,
        );
        assert!(reason.contains("404"));
        assert!(reason.contains("Function reboot not found"));

        let reason = describe_error_status(StatusCode::INTERNAL_SERVER_ERROR, "oops");
        assert_eq!(reason, "device returned 500 Internal Server Error");
    }

    #[test]
    fn test_outcome_into_result() {
        let ok: ProbeOutcome<u8> = ProbeOutcome::Success(1);
        assert_eq!(ok.into_result("a:1").unwrap(), 1);

        let denied: ProbeOutcome<u8> = ProbeOutcome::Unauthorized;
        assert!(denied.into_result("a:1").unwrap_err().is_unauthorized());

        let gone: ProbeOutcome<u8> = ProbeOutcome::Unreachable("refused".to_string());
        let err = gone.into_result("a:1").unwrap_err();
        assert!(err.is_unreachable());
        assert!(err.to_string().contains("refused"));
    }
}
