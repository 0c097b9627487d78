//! Deterministic request identity
//!
//! A fingerprint names one (subject, kind, parameters) combination. The
//! parameters are canonicalized so that key order never changes the result.

use pulse_shared::SubjectId;
use serde_json::Value;
use std::fmt;

/// Identity of a request, scoped to the subject it runs for
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    subject: SubjectId,
    kind: String,
    params: String,
}

impl Fingerprint {
    pub fn new(subject: &SubjectId, kind: &str, params: &Value) -> Self {
        Self {
            subject: subject.clone(),
            kind: kind.to_string(),
            params: canonical_params(params),
        }
    }

    pub fn subject(&self) -> &SubjectId {
        &self.subject
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Canonical parameter text
    pub fn params(&self) -> &str {
        &self.params
    }

    /// Persisted key of the cached result
    pub fn cache_key(&self) -> String {
        format!("cache:{}", self)
    }

    /// Persisted key of the active-job marker
    pub fn active_key(&self) -> String {
        format!("active:{}", self)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.subject, self.kind, self.params)
    }
}

/// Serialize parameters with object keys sorted at every depth
///
/// Absent parameters serialize as `{}` and a bare string is used verbatim,
/// so `"{}"` and `{}` (or `"42"` and `42`) share a fingerprint. Callers pass
/// objects; string params are treated as already serialized.
pub fn canonical_params(params: &Value) -> String {
    match params {
        Value::Null => "{}".to_string(),
        Value::String(s) => s.clone(),
        other => {
            let mut out = String::new();
            write_canonical(other, &mut out);
            out
        }
    }
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();

            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                if let Some(item) = map.get(key) {
                    write_canonical(item, out);
                }
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}
