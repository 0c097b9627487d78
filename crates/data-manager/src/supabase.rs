//! Supabase job backend
//!
//! Jobs are rows of the `web_requests` table, created through the
//! `create_web_request` RPC and read back through PostgREST. Status changes
//! arrive over the realtime websocket (see [`crate::realtime`]).

use crate::backend::{BackendError, JobBackend, JobSubscription};
use crate::realtime;
use async_trait::async_trait;
use parking_lot::RwLock;
use pulse_config::BackendConfig;
use pulse_shared::{JobId, JobSnapshot, PulseError, PulseResult, SubjectId};
use reqwest::{RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use url::Url;

/// PostgreSQL `raise exception` code used by the job RPC
const RAISE_EXCEPTION: &str = "P0001";

/// Error body returned by PostgREST
#[derive(Debug, Default, Deserialize)]
struct PostgrestError {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

/// Map a failed response to a [`BackendError`]
///
/// The job RPC reports rate limiting as `P0001` with "cooldown" in the message.
pub fn classify_error(status: StatusCode, body: &str) -> BackendError {
    let parsed: PostgrestError = serde_json::from_str(body).unwrap_or_default();

    if parsed.code == RAISE_EXCEPTION && parsed.message.to_lowercase().contains("cooldown") {
        return BackendError::Cooldown {
            message: parsed.message,
        };
    }

    let code = if parsed.code.is_empty() {
        status.as_u16().to_string()
    } else {
        parsed.code
    };
    let message = if parsed.message.is_empty() {
        body.trim().to_string()
    } else {
        parsed.message
    };
    BackendError::Rejected { code, message }
}

/// Job id from the RPC response: a bare id or an object with an `id` field
pub fn parse_job_id(body: &Value) -> Result<JobId, BackendError> {
    let id = match body {
        Value::String(id) => Some(id.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Object(map) => map.get("id").and_then(|id| match id {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }),
        _ => None,
    };
    id.filter(|id| !id.is_empty())
        .map(JobId::new)
        .ok_or_else(|| BackendError::Decode(format!("no job id in {}", body)))
}

#[derive(Debug, Deserialize)]
struct AuthUser {
    id: String,
}

/// [`JobBackend`] over a Supabase project
pub struct SupabaseBackend {
    http: reqwest::Client,
    base: Url,
    anon_key: String,
    access_token: RwLock<Option<String>>,
    subject: RwLock<Option<SubjectId>>,
    heartbeat: Duration,
}

impl SupabaseBackend {
    pub fn new(config: &BackendConfig) -> PulseResult<Self> {
        let mut base = Url::parse(&config.url).map_err(|e| PulseError::InvalidConfig {
            message: format!("invalid backend url {}: {}", config.url, e),
            field: Some("backend.url".to_string()),
        })?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| PulseError::Network {
                message: format!("failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            http,
            base,
            anon_key: config.anon_key.clone(),
            access_token: RwLock::new(config.access_token.clone()),
            subject: RwLock::new(None),
            heartbeat: config.heartbeat_interval(),
        })
    }

    /// Replace the session token; `None` signs out
    pub fn set_access_token(&self, token: Option<String>) {
        *self.access_token.write() = token;
        *self.subject.write() = None;
    }

    fn endpoint(&self, path: &str) -> Result<Url, BackendError> {
        self.base
            .join(path)
            .map_err(|e| BackendError::Transport(format!("bad endpoint {}: {}", path, e)))
    }

    fn bearer(&self) -> String {
        self.access_token
            .read()
            .clone()
            .unwrap_or_else(|| self.anon_key.clone())
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("apikey", &self.anon_key)
            .bearer_auth(self.bearer())
    }

    async fn send_json(&self, builder: RequestBuilder) -> Result<Value, BackendError> {
        let response = self
            .authorized(builder)
            .send()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(classify_error(status, &body));
        }
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body).map_err(|e| BackendError::Decode(e.to_string()))
    }
}

#[async_trait]
impl JobBackend for SupabaseBackend {
    async fn current_subject(&self) -> Option<SubjectId> {
        if let Some(subject) = self.subject.read().clone() {
            return Some(subject);
        }
        self.access_token.read().as_ref()?;

        let url = match self.endpoint("auth/v1/user") {
            Ok(url) => url,
            Err(e) => {
                log::warn!("Cannot resolve current user: {}", e);
                return None;
            }
        };
        let user = match self.send_json(self.http.get(url)).await {
            Ok(body) => serde_json::from_value::<AuthUser>(body),
            Err(e) => {
                log::warn!("Session lookup failed: {}", e);
                return None;
            }
        };

        match user {
            Ok(user) => {
                let subject = SubjectId::new(user.id);
                *self.subject.write() = Some(subject.clone());
                Some(subject)
            }
            Err(e) => {
                log::warn!("Unexpected user payload: {}", e);
                None
            }
        }
    }

    async fn submit_job(&self, kind: &str, params: &Value) -> Result<JobId, BackendError> {
        let url = self.endpoint("rest/v1/rpc/create_web_request")?;
        let body = json!({"p_kind": kind, "p_payload": params});
        let response = self.send_json(self.http.post(url).json(&body)).await?;
        parse_job_id(&response)
    }

    async fn job_status(&self, job_id: &JobId) -> Result<Option<JobSnapshot>, BackendError> {
        let mut url = self.endpoint(&format!("rest/v1/{}", realtime::JOBS_TABLE))?;
        url.query_pairs_mut()
            .append_pair("id", &format!("eq.{}", job_id))
            .append_pair("select", "status,result,error");

        let rows = self.send_json(self.http.get(url)).await?;
        let mut rows: Vec<JobSnapshot> =
            serde_json::from_value(rows).map_err(|e| BackendError::Decode(e.to_string()))?;
        Ok(if rows.is_empty() {
            None
        } else {
            Some(rows.swap_remove(0))
        })
    }

    async fn subscribe_job(&self, job_id: &JobId) -> Result<JobSubscription, BackendError> {
        let url = realtime::socket_url(&self.base, &self.anon_key)?;
        realtime::subscribe(url, job_id, &self.bearer(), self.heartbeat).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulse_config::BackendKind;

    #[test]
    fn test_cooldown_classification() {
        let body = r#"{"code":"P0001","message":"Cooldown: try again later","details":null}"#;
        assert!(classify_error(StatusCode::BAD_REQUEST, body).is_cooldown());

        let other = r#"{"code":"P0001","message":"unknown kind"}"#;
        assert_eq!(
            classify_error(StatusCode::BAD_REQUEST, other),
            BackendError::Rejected {
                code: "P0001".into(),
                message: "unknown kind".into()
            }
        );

        assert_eq!(
            classify_error(StatusCode::BAD_GATEWAY, "upstream down"),
            BackendError::Rejected {
                code: "502".into(),
                message: "upstream down".into()
            }
        );
    }

    #[test]
    fn test_job_id_shapes() {
        assert_eq!(parse_job_id(&json!("abc")).unwrap(), JobId::new("abc"));
        assert_eq!(parse_job_id(&json!(17)).unwrap(), JobId::new("17"));
        assert_eq!(parse_job_id(&json!({"id": "x"})).unwrap(), JobId::new("x"));
        assert!(parse_job_id(&json!(null)).is_err());
        assert!(parse_job_id(&json!("")).is_err());
    }

    #[test]
    fn test_construction() {
        let config = BackendConfig {
            kind: BackendKind::Supabase,
            url: "https://abc.supabase.co".to_string(),
            anon_key: "anon".to_string(),
            ..BackendConfig::default()
        };
        let backend = SupabaseBackend::new(&config).unwrap();
        assert_eq!(
            backend.endpoint("rest/v1/rpc/create_web_request").unwrap().as_str(),
            "https://abc.supabase.co/rest/v1/rpc/create_web_request"
        );
        assert_eq!(backend.bearer(), "anon");

        backend.set_access_token(Some("user-token".into()));
        assert_eq!(backend.bearer(), "user-token");

        let bad = BackendConfig {
            url: "not a url".to_string(),
            ..config
        };
        assert!(matches!(
            SupabaseBackend::new(&bad),
            Err(PulseError::InvalidConfig { .. })
        ));
    }

    #[tokio::test]
    async fn test_signed_out_has_no_subject() {
        let config = BackendConfig {
            url: "https://abc.supabase.co".to_string(),
            anon_key: "anon".to_string(),
            ..BackendConfig::default()
        };
        let backend = SupabaseBackend::new(&config).unwrap();
        assert_eq!(backend.current_subject().await, None);
    }
}
