//! HTTP backend abstraction for the OAuth flow.
//!
//! Discovery, registration and token calls go through [`OAuthHttp`] so the
//! flow can be exercised against canned responses.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;

use super::OAuthError;

#[async_trait]
pub trait OAuthHttp: Send + Sync {
    async fn get_json(&self, url: &str) -> Result<Value, OAuthError>;

    async fn post_json(&self, url: &str, body: &Value) -> Result<Value, OAuthError>;

    /// POST `application/x-www-form-urlencoded`.
    async fn post_form(&self, url: &str, form: &[(&str, &str)]) -> Result<Value, OAuthError>;
}

/// Production backend using reqwest.
pub struct ReqwestOAuthHttp {
    client: reqwest::Client,
}

impl ReqwestOAuthHttp {
    pub fn new(timeout: Duration) -> Result<Self, OAuthError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| OAuthError::Transport(e.to_string()))?;
        Ok(Self { client })
    }

    async fn send(&self, url: &str, request: reqwest::RequestBuilder) -> Result<Value, OAuthError> {
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                OAuthError::Timeout(url.to_string())
            } else {
                OAuthError::Transport(e.to_string())
            }
        })?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            let body = response.text().await.unwrap_or_default();
            return Err(OAuthError::Unauthorized(format!(
                "statusCode=401, response={body}"
            )));
        }
        if !status.is_success() {
            tracing::debug!(url, status = status.as_u16(), "OAuth endpoint returned an error");
            return Err(OAuthError::Http {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        response
            .json()
            .await
            .map_err(|e| OAuthError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl OAuthHttp for ReqwestOAuthHttp {
    async fn get_json(&self, url: &str) -> Result<Value, OAuthError> {
        self.send(url, self.client.get(url)).await
    }

    async fn post_json(&self, url: &str, body: &Value) -> Result<Value, OAuthError> {
        self.send(url, self.client.post(url).json(body)).await
    }

    async fn post_form(&self, url: &str, form: &[(&str, &str)]) -> Result<Value, OAuthError> {
        self.send(url, self.client.post(url).form(form)).await
    }
}

// ============================================================================
// Fake Backend for Testing
// ============================================================================

#[cfg(any(test, feature = "test-utils"))]
pub mod testing {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// A request seen by the fake backend.
    #[derive(Debug, Clone, PartialEq)]
    pub struct RecordedCall {
        pub method: &'static str,
        pub url: String,
        /// JSON body, or the form fields as a JSON object.
        pub body: Value,
    }

    /// A fake HTTP backend that returns canned responses per exact URL.
    #[derive(Default)]
    pub struct FakeOAuthHttp {
        routes: Mutex<HashMap<String, Result<Value, u16>>>,
        calls: Mutex<Vec<RecordedCall>>,
    }

    impl FakeOAuthHttp {
        pub fn new() -> Self {
            Self::default()
        }

        /// Answer `url` with `json`.
        #[must_use]
        pub fn with_json(self, url: &str, json: Value) -> Self {
            self.routes.lock().unwrap().insert(url.to_string(), Ok(json));
            self
        }

        /// Answer `url` with an HTTP error status.
        #[must_use]
        pub fn with_status(self, url: &str, status: u16) -> Self {
            self.routes
                .lock()
                .unwrap()
                .insert(url.to_string(), Err(status));
            self
        }

        pub fn calls(&self) -> Vec<RecordedCall> {
            self.calls.lock().unwrap().clone()
        }

        pub fn calls_to(&self, url: &str) -> Vec<RecordedCall> {
            self.calls().into_iter().filter(|c| c.url == url).collect()
        }

        fn respond(&self, method: &'static str, url: &str, body: Value) -> Result<Value, OAuthError> {
            self.calls.lock().unwrap().push(RecordedCall {
                method,
                url: url.to_string(),
                body,
            });
            match self.routes.lock().unwrap().get(url).cloned() {
                Some(Ok(json)) => Ok(json),
                Some(Err(401)) => Err(OAuthError::Unauthorized("statusCode=401".to_string())),
                Some(Err(status)) => Err(OAuthError::Http {
                    status,
                    url: url.to_string(),
                }),
                None => Err(OAuthError::Http {
                    status: 404,
                    url: url.to_string(),
                }),
            }
        }
    }

    #[async_trait]
    impl OAuthHttp for FakeOAuthHttp {
        async fn get_json(&self, url: &str) -> Result<Value, OAuthError> {
            self.respond("GET", url, Value::Null)
        }

        async fn post_json(&self, url: &str, body: &Value) -> Result<Value, OAuthError> {
            self.respond("POST", url, body.clone())
        }

        async fn post_form(&self, url: &str, form: &[(&str, &str)]) -> Result<Value, OAuthError> {
            let fields = form
                .iter()
                .map(|(k, v)| ((*k).to_string(), Value::String((*v).to_string())))
                .collect::<serde_json::Map<_, _>>();
            self.respond("POST", url, Value::Object(fields))
        }
    }
}
