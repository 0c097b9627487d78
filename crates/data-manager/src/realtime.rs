//! Realtime channel client (Phoenix v1 JSON protocol)
//!
//! Each job subscription opens its own websocket, joins one topic with a
//! `postgres_changes` filter on the job row and forwards lifecycle and row
//! updates as [`ChannelEvent`]s. Dropping the subscription sends `phx_leave`
//! and closes the socket.

use crate::backend::{BackendError, ChannelEvent, JobSubscription};
use futures_util::{SinkExt, StreamExt};
use pulse_shared::{JobId, JobSnapshot};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use url::Url;

/// Table holding job rows
pub const JOBS_TABLE: &str = "web_requests";

/// How long a join may stay unanswered before reporting `TimedOut`
const JOIN_TIMEOUT: Duration = Duration::from_secs(10);

/// One protocol frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub topic: String,
    pub event: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(default, rename = "ref")]
    pub reference: Option<String>,
}

impl Frame {
    pub fn new(topic: &str, event: &str, payload: Value, reference: u64) -> Self {
        Self {
            topic: topic.to_string(),
            event: event.to_string(),
            payload,
            reference: Some(reference.to_string()),
        }
    }

    pub fn encode(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

pub fn topic_for(job_id: &JobId) -> String {
    format!("realtime:wr:{}", job_id)
}

/// `phx_join` payload filtering updates of one job row
pub fn join_payload(job_id: &JobId, access_token: &str) -> Value {
    json!({
        "config": {
            "broadcast": {"self": false},
            "presence": {"key": ""},
            "postgres_changes": [{
                "event": "UPDATE",
                "schema": "public",
                "table": JOBS_TABLE,
                "filter": format!("id=eq.{}", job_id),
            }],
        },
        "access_token": access_token,
    })
}

/// Websocket endpoint of the realtime service under `base`
pub fn socket_url(base: &Url, api_key: &str) -> Result<Url, BackendError> {
    let mut url = base
        .join("realtime/v1/websocket")
        .map_err(|e| BackendError::Transport(e.to_string()))?;
    let scheme = if url.scheme() == "http" { "ws" } else { "wss" };
    url.set_scheme(scheme)
        .map_err(|_| BackendError::Transport(format!("cannot use {} for websockets", base)))?;
    url.query_pairs_mut()
        .append_pair("apikey", api_key)
        .append_pair("vsn", "1.0.0");
    Ok(url)
}

/// Event carried by an incoming frame on `topic`, if any
pub fn decode_frame(text: &str, topic: &str) -> Option<ChannelEvent> {
    let frame: Frame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            log::debug!("Ignoring malformed realtime frame: {}", e);
            return None;
        }
    };
    if frame.topic != topic {
        return None;
    }

    match frame.event.as_str() {
        "phx_reply" => {
            let status = frame.payload.get("status").and_then(Value::as_str);
            match status {
                Some("ok") => Some(ChannelEvent::Subscribed),
                _ => Some(ChannelEvent::ChannelError(
                    frame
                        .payload
                        .get("response")
                        .map(Value::to_string)
                        .unwrap_or_else(|| "join rejected".to_string()),
                )),
            }
        }
        "phx_error" => Some(ChannelEvent::ChannelError(frame.payload.to_string())),
        "phx_close" => Some(ChannelEvent::Closed),
        "postgres_changes" => {
            let record = frame.payload.get("data")?.get("record")?.clone();
            match serde_json::from_value::<JobSnapshot>(record) {
                Ok(snapshot) => Some(ChannelEvent::Update(snapshot)),
                Err(e) => {
                    log::debug!("Ignoring undecodable job row: {}", e);
                    None
                }
            }
        }
        _ => None,
    }
}

/// Open a socket, join the job topic and stream its events
pub async fn subscribe(
    url: Url,
    job_id: &JobId,
    access_token: &str,
    heartbeat: Duration,
) -> Result<JobSubscription, BackendError> {
    let (ws_stream, _) = connect_async(url.as_str())
        .await
        .map_err(|e| BackendError::Transport(format!("realtime connect failed: {}", e)))?;
    let (mut write, mut read) = ws_stream.split();

    let topic = topic_for(job_id);
    let join = Frame::new(&topic, "phx_join", join_payload(job_id, access_token), 1);
    write
        .send(Message::Text(join.encode()))
        .await
        .map_err(|e| BackendError::Transport(format!("realtime join failed: {}", e)))?;

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let (leave_tx, mut leave_rx) = oneshot::channel::<()>();

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(heartbeat);
        interval.tick().await;
        let join_deadline = tokio::time::sleep(JOIN_TIMEOUT);
        tokio::pin!(join_deadline);
        let mut joined = false;
        let mut next_ref = 2u64;

        loop {
            tokio::select! {
                _ = &mut leave_rx => {
                    let leave = Frame::new(&topic, "phx_leave", json!({}), next_ref);
                    let _ = write.send(Message::Text(leave.encode())).await;
                    let _ = write.close().await;
                    break;
                }
                _ = interval.tick() => {
                    let beat = Frame::new("phoenix", "heartbeat", json!({}), next_ref);
                    next_ref += 1;
                    if let Err(e) = write.send(Message::Text(beat.encode())).await {
                        log::warn!("Realtime heartbeat failed: {}", e);
                        let _ = events_tx.send(ChannelEvent::ChannelError(e.to_string()));
                        break;
                    }
                }
                _ = &mut join_deadline, if !joined => {
                    joined = true;
                    let _ = events_tx.send(ChannelEvent::TimedOut);
                }
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            if let Some(event) = decode_frame(&text, &topic) {
                                if matches!(event, ChannelEvent::Subscribed | ChannelEvent::ChannelError(_)) {
                                    joined = true;
                                }
                                let closed = event == ChannelEvent::Closed;
                                if events_tx.send(event).is_err() || closed {
                                    break;
                                }
                            }
                        }
                        Some(Ok(Message::Ping(data))) => {
                            let _ = write.send(Message::Pong(data)).await;
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            log::debug!("Realtime socket for {} closed", topic);
                            let _ = events_tx.send(ChannelEvent::Closed);
                            break;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            log::error!("Realtime socket error: {}", e);
                            let _ = events_tx.send(ChannelEvent::ChannelError(e.to_string()));
                            break;
                        }
                    }
                }
            }
        }
    });

    Ok(JobSubscription::new(events_rx, move || {
        let _ = leave_tx.send(());
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulse_shared::JobStatus;

    const TOPIC: &str = "realtime:wr:42";

    #[test]
    fn test_join_frame() {
        let id = JobId::new("42");
        let frame = Frame::new(&topic_for(&id), "phx_join", join_payload(&id, "tok"), 1);
        let encoded: Value = serde_json::from_str(&frame.encode()).unwrap();

        assert_eq!(encoded["topic"], TOPIC);
        assert_eq!(encoded["ref"], "1");
        let change = &encoded["payload"]["config"]["postgres_changes"][0];
        assert_eq!(change["event"], "UPDATE");
        assert_eq!(change["table"], "web_requests");
        assert_eq!(change["filter"], "id=eq.42");
        assert_eq!(encoded["payload"]["access_token"], "tok");
    }

    #[test]
    fn test_decode_lifecycle() {
        let ok = r#"{"topic":"realtime:wr:42","event":"phx_reply","payload":{"status":"ok","response":{}},"ref":"1"}"#;
        assert_eq!(decode_frame(ok, TOPIC), Some(ChannelEvent::Subscribed));

        let rejected = r#"{"topic":"realtime:wr:42","event":"phx_reply","payload":{"status":"error","response":{"reason":"denied"}},"ref":"1"}"#;
        assert!(matches!(
            decode_frame(rejected, TOPIC),
            Some(ChannelEvent::ChannelError(reason)) if reason.contains("denied")
        ));

        let close = r#"{"topic":"realtime:wr:42","event":"phx_close","payload":{},"ref":null}"#;
        assert_eq!(decode_frame(close, TOPIC), Some(ChannelEvent::Closed));
    }

    #[test]
    fn test_decode_row_update() {
        let update = r#"{"topic":"realtime:wr:42","event":"postgres_changes","payload":{"data":{"type":"UPDATE","record":{"id":"42","status":"done","result":{"messages":4},"error":null}},"ids":[1]},"ref":null}"#;
        match decode_frame(update, TOPIC) {
            Some(ChannelEvent::Update(snapshot)) => {
                assert_eq!(snapshot.status, JobStatus::Done);
                assert_eq!(snapshot.result.unwrap()["messages"], 4);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_decode_ignores_noise() {
        let other_topic = r#"{"topic":"phoenix","event":"phx_reply","payload":{"status":"ok"},"ref":"2"}"#;
        assert_eq!(decode_frame(other_topic, TOPIC), None);
        assert_eq!(decode_frame("not json", TOPIC), None);

        let system = r#"{"topic":"realtime:wr:42","event":"system","payload":{"status":"ok"}}"#;
        assert_eq!(decode_frame(system, TOPIC), None);
    }

    #[test]
    fn test_socket_url() {
        let base = Url::parse("https://abc.supabase.co/").unwrap();
        let url = socket_url(&base, "anon").unwrap();
        assert_eq!(
            url.as_str(),
            "wss://abc.supabase.co/realtime/v1/websocket?apikey=anon&vsn=1.0.0"
        );

        let local = Url::parse("http://localhost:54321/").unwrap();
        assert_eq!(socket_url(&local, "k").unwrap().scheme(), "ws");
    }
}
