//! Typed API client
//!
//! One async method per backend endpoint. Every response goes through
//! [`ApiClient::interpret`], which maps status codes and error envelopes
//! into [`ApiError`]. A 401 anywhere except the login call itself is
//! reported as [`ApiError::Unauthenticated`] so the session machine can
//! react to it.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use uuid::Uuid;

use dromio_model::{
    CreateJobRequest, JobId, JobRun, JobSpec, ListRunsQuery, LoginRequest, RunId,
    UpdateJobRequest, User, WorkerRecord,
};

use crate::protocol::{ApiEnvelope, ErrorCode, API_PREFIX, SESSION_PREFIX};

use super::transport::{ApiRequest, Method, RawResponse, Transport, TransportError};

/// API client errors
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Not signed in: {message}")]
    Unauthenticated { message: String },

    /// The server refused; `message` is shown to the user as is.
    #[error("{message}")]
    Rejected {
        code: ErrorCode,
        status: u16,
        message: String,
    },

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Malformed response from {path}: {message}")]
    Decode { path: String, message: String },
}

impl ApiError {
    /// The session is gone; only the session machine handles this.
    pub fn is_auth(&self) -> bool {
        matches!(self, ApiError::Unauthenticated { .. })
    }

    /// Process exit code for the CLI
    pub fn exit_code(&self) -> i32 {
        if self.is_auth() {
            3
        } else {
            1
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

pub struct ApiClient {
    transport: Arc<dyn Transport>,
    /// Prefix shared by this client's request ids
    client_id: String,
    request_counter: AtomicU64,
}

impl ApiClient {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            client_id: Uuid::new_v4().simple().to_string()[..8].to_string(),
            request_counter: AtomicU64::new(0),
        }
    }

    fn next_request_id(&self) -> String {
        let counter = self.request_counter.fetch_add(1, Ordering::SeqCst);
        format!("{}-{:06x}", self.client_id, counter)
    }

    fn request(
        &self,
        method: Method,
        path: String,
        query: Vec<(String, String)>,
        body: Option<Value>,
    ) -> ApiRequest {
        ApiRequest {
            method,
            path,
            query,
            body,
            request_id: self.next_request_id(),
        }
    }

    async fn send(&self, request: ApiRequest) -> ApiResult<RawResponse> {
        tracing::debug!(
            method = %request.method,
            path = %request.path,
            request_id = %request.request_id,
            "API request"
        );
        let method = request.method;
        let path = request.path.clone();
        match self.transport.send(request).await {
            Ok(response) => Ok(response),
            Err(e) => {
                tracing::warn!(%method, %path, error = %e, "API transport failure");
                Err(e.into())
            }
        }
    }

    /// Map a raw response to its payload, or the matching error.
    fn interpret<T: DeserializeOwned>(path: &str, response: RawResponse) -> ApiResult<Option<T>> {
        let status = response.status;
        let parsed = if response.body.trim().is_empty() {
            None
        } else {
            Some(serde_json::from_str::<ApiEnvelope<T>>(&response.body))
        };

        let result = match parsed {
            None if response.is_success() => Ok(None),
            None => Err(failure_from_status(status, String::new())),
            Some(Ok(envelope)) => match envelope.into_result() {
                Ok(data) if response.is_success() => Ok(data),
                Ok(_) => Err(failure_from_status(status, String::new())),
                Err(failure) if failure.code.is_auth() || status == 401 => {
                    Err(ApiError::Unauthenticated {
                        message: failure.message,
                    })
                }
                Err(failure) => Err(ApiError::Rejected {
                    code: failure.code,
                    status: failure.status.unwrap_or(status),
                    message: failure.message,
                }),
            },
            Some(Err(e)) if response.is_success() => Err(ApiError::Decode {
                path: path.to_string(),
                message: e.to_string(),
            }),
            Some(Err(_)) => Err(failure_from_status(status, response.body)),
        };

        if let Err(e) = &result {
            tracing::warn!(%path, status, error = %e, "API call failed");
        }
        result
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: Method,
        path: String,
        query: Vec<(String, String)>,
        body: Option<Value>,
    ) -> ApiResult<Option<T>> {
        let request = self.request(method, path.clone(), query, body);
        let response = self.send(request).await?;
        Self::interpret(&path, response)
    }

    /// A call whose success envelope must carry data.
    async fn call_data<T: DeserializeOwned>(
        &self,
        method: Method,
        path: String,
        query: Vec<(String, String)>,
        body: Option<Value>,
    ) -> ApiResult<T> {
        self.call(method, path.clone(), query, body)
            .await?
            .ok_or_else(|| ApiError::Decode {
                path,
                message: "success envelope without data".to_string(),
            })
    }

    async fn call_unit(&self, method: Method, path: String) -> ApiResult<()> {
        self.call::<Value>(method, path, Vec::new(), None).await?;
        Ok(())
    }

    // === Session ===

    /// Probe the current session.
    pub async fn me(&self) -> ApiResult<User> {
        self.call_data(Method::Get, session_path("me"), Vec::new(), None)
            .await
    }

    /// Exchange credentials for a session cookie, then load the user.
    ///
    /// A refused login is a [`ApiError::Rejected`] carrying the server's
    /// message, never `Unauthenticated`.
    pub async fn login(&self, credentials: &LoginRequest) -> ApiResult<User> {
        let path = session_path("login");
        let request = self.request(Method::Post, path.clone(), Vec::new(), Some(to_body(credentials)?));
        let response = self.send(request).await?;

        if !response.is_success() {
            let message = serde_json::from_str::<ApiEnvelope<Value>>(&response.body)
                .ok()
                .and_then(|env| env.into_result().err())
                .map(|failure| failure.message)
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| {
                    let text = response.body.trim();
                    if text.is_empty() {
                        "Login failed".to_string()
                    } else {
                        text.to_string()
                    }
                });
            tracing::warn!(status = response.status, "Login refused");
            return Err(ApiError::Rejected {
                code: ErrorCode::for_status(response.status),
                status: response.status,
                message,
            });
        }

        self.me().await
    }

    pub async fn logout(&self) -> ApiResult<()> {
        self.call_unit(Method::Post, session_path("logout")).await
    }

    // === Jobs ===

    pub async fn list_jobs(&self) -> ApiResult<Vec<JobSpec>> {
        self.call_data(Method::Get, api_path("/jobs"), Vec::new(), None)
            .await
    }

    pub async fn get_job(&self, id: &JobId) -> ApiResult<JobSpec> {
        self.call_data(Method::Get, api_path(&format!("/jobs/{}", id)), Vec::new(), None)
            .await
    }

    pub async fn create_job(&self, req: &CreateJobRequest) -> ApiResult<JobSpec> {
        self.call_data(Method::Post, api_path("/jobs"), Vec::new(), Some(to_body(req)?))
            .await
    }

    pub async fn update_job(&self, id: &JobId, req: &UpdateJobRequest) -> ApiResult<JobSpec> {
        self.call_data(
            Method::Patch,
            api_path(&format!("/jobs/{}", id)),
            Vec::new(),
            Some(to_body(req)?),
        )
        .await
    }

    pub async fn delete_job(&self, id: &JobId) -> ApiResult<()> {
        self.call_unit(Method::Delete, api_path(&format!("/jobs/{}", id)))
            .await
    }

    pub async fn run_job(&self, id: &JobId) -> ApiResult<JobRun> {
        self.call_data(Method::Post, api_path(&format!("/jobs/{}/run", id)), Vec::new(), None)
            .await
    }

    pub async fn enable_job(&self, id: &JobId) -> ApiResult<JobSpec> {
        self.call_data(Method::Post, api_path(&format!("/jobs/{}/enable", id)), Vec::new(), None)
            .await
    }

    pub async fn disable_job(&self, id: &JobId) -> ApiResult<JobSpec> {
        self.call_data(Method::Post, api_path(&format!("/jobs/{}/disable", id)), Vec::new(), None)
            .await
    }

    // === Runs ===

    pub async fn list_runs(&self, query: &ListRunsQuery) -> ApiResult<Vec<JobRun>> {
        self.call_data(Method::Get, api_path("/runs"), query.to_query_pairs(), None)
            .await
    }

    pub async fn cancel_run(&self, id: &RunId) -> ApiResult<()> {
        self.call_unit(Method::Post, api_path(&format!("/runs/{}/cancel", id)))
            .await
    }

    // === Workers ===

    pub async fn list_workers(&self) -> ApiResult<Vec<WorkerRecord>> {
        self.call_data(Method::Get, api_path("/workers"), Vec::new(), None)
            .await
    }
}

fn api_path(path: &str) -> String {
    format!("{}{}", API_PREFIX, path)
}

fn session_path(name: &str) -> String {
    format!("{}/{}", SESSION_PREFIX, name)
}

fn to_body<T: Serialize>(value: &T) -> ApiResult<Value> {
    serde_json::to_value(value).map_err(|e| ApiError::Decode {
        path: "<request body>".to_string(),
        message: e.to_string(),
    })
}

fn failure_from_status(status: u16, body: String) -> ApiError {
    let code = ErrorCode::for_status(status);
    if code.is_auth() {
        return ApiError::Unauthenticated {
            message: "unauthenticated".to_string(),
        };
    }
    let body = body.trim();
    let message = if body.is_empty() {
        format!("Request failed with status {}", status)
    } else {
        body.to_string()
    };
    ApiError::Rejected {
        code,
        status,
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(status: u16, body: &str) -> RawResponse {
        RawResponse {
            status,
            body: body.to_string(),
        }
    }

    #[test]
    fn test_ok_envelope() {
        let data: Option<Vec<u32>> =
            ApiClient::interpret("/x", raw(200, r#"{"status":"ok","data":[1,2]}"#)).unwrap();
        assert_eq!(data, Some(vec![1, 2]));
    }

    #[test]
    fn test_empty_success_body_is_unit() {
        let data: Option<Value> = ApiClient::interpret("/x", raw(204, "")).unwrap();
        assert_eq!(data, None);
    }

    #[test]
    fn test_401_is_unauthenticated() {
        let err = ApiClient::interpret::<Value>("/x", raw(401, "")).unwrap_err();
        assert!(err.is_auth());
        assert_eq!(err.exit_code(), 3);

        let err = ApiClient::interpret::<Value>(
            "/x",
            raw(401, r#"{"status":"error","message":"session expired"}"#),
        )
        .unwrap_err();
        assert!(matches!(err, ApiError::Unauthenticated { ref message } if message == "session expired"));
    }

    #[test]
    fn test_unauthenticated_code_with_200() {
        let err = ApiClient::interpret::<Value>(
            "/x",
            raw(200, r#"{"status":"error","error":"unauthenticated","message":"no session"}"#),
        )
        .unwrap_err();
        assert!(err.is_auth());
    }

    #[test]
    fn test_error_envelope_message_verbatim() {
        let err = ApiClient::interpret::<Value>(
            "/x",
            raw(409, r#"{"status":"error","error":"conflict","message":"Job is running","code":409}"#),
        )
        .unwrap_err();
        match err {
            ApiError::Rejected {
                code,
                status,
                message,
            } => {
                assert_eq!(code, ErrorCode::Conflict);
                assert_eq!(status, 409);
                assert_eq!(message, "Job is running");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_plain_text_error_body() {
        let err = ApiClient::interpret::<Value>("/x", raw(500, "boom")).unwrap_err();
        assert!(matches!(err, ApiError::Rejected { ref message, status: 500, .. } if message == "boom"));
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_garbage_success_is_decode_error() {
        let err = ApiClient::interpret::<Vec<u32>>("/x", raw(200, "[not json")).unwrap_err();
        assert!(matches!(err, ApiError::Decode { .. }));
    }
}
