//! Realtime change feed over the backend's Phoenix-channel websocket.
//!
//! Joins `realtime:public:<table>` with a `postgres_changes` filter and turns
//! each change message into a [`ChangeEvent`]. A dropped connection ends the
//! subscription; the consumer decides whether to subscribe again.
//!
//! The channel authenticates with the signed-in user's token when there is
//! one, so row-level security applies to the changes it delivers. A token
//! that changes later is pushed on the next heartbeat.

use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{ChangeEvent, ChangeFeed, ChangeKind, Subscription};
use crate::store::Store;
use crate::{PosError, Result};

const HEARTBEAT: Duration = Duration::from_secs(25);

pub struct PhoenixFeed {
    endpoint: String,
    tokens: TokenSource,
}

#[derive(Clone)]
struct TokenSource {
    anon_key: String,
    session: Option<Arc<Store>>,
}

impl TokenSource {
    fn current(&self) -> String {
        self.session.as_ref().and_then(|store| store.access_token()).unwrap_or_else(|| self.anon_key.clone())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct PhxMessage {
    topic: String,
    event: String,
    #[serde(default)]
    payload: Value,
    #[serde(default, rename = "ref")]
    reference: Option<String>,
}

impl PhoenixFeed {
    pub fn new(base_url: &str, anon_key: impl Into<String>) -> Result<Self> {
        let base = base_url.trim_end_matches('/');
        let ws_base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            return Err(PosError::Realtime(format!("cannot derive a websocket URL from {base}")));
        };
        let anon_key = anon_key.into();
        Ok(Self {
            endpoint: format!("{ws_base}/realtime/v1/websocket?apikey={anon_key}&vsn=1.0.0"),
            tokens: TokenSource { anon_key, session: None },
        })
    }

    /// Reads the user token from `store` for every join.
    pub fn with_session(mut self, store: Arc<Store>) -> Self {
        self.tokens.session = Some(store);
        self
    }

    pub fn endpoint(&self) -> &str { &self.endpoint }
}

impl ChangeFeed for PhoenixFeed {
    fn subscribe(&self, table: &str) -> Result<Subscription> {
        let (tx, subscription) = Subscription::channel();
        let cancel = subscription.token();
        tokio::spawn(run(self.endpoint.clone(), self.tokens.clone(), table.to_string(), tx, cancel));
        Ok(subscription)
    }
}

fn topic_for(table: &str) -> String { format!("realtime:public:{table}") }

fn join_message(table: &str, access_token: &str) -> PhxMessage {
    PhxMessage {
        topic: topic_for(table),
        event: "phx_join".into(),
        payload: json!({
            "config": { "postgres_changes": [{ "event": "*", "schema": "public", "table": table }] },
            "access_token": access_token,
        }),
        reference: Some("1".into()),
    }
}

fn access_token_message(table: &str, access_token: &str) -> PhxMessage {
    PhxMessage { topic: topic_for(table), event: "access_token".into(), payload: json!({ "access_token": access_token }), reference: None }
}

fn heartbeat_message(seq: u64) -> PhxMessage {
    PhxMessage { topic: "phoenix".into(), event: "heartbeat".into(), payload: json!({}), reference: Some(seq.to_string()) }
}

/// Maps one websocket text frame to a change on `table`, if it is one.
fn parse_change(text: &str, table: &str) -> Option<ChangeEvent> {
    let msg: PhxMessage = serde_json::from_str(text).ok()?;
    match msg.event.as_str() {
        "postgres_changes" => {
            let data = msg.payload.get("data")?;
            if data.get("table").and_then(Value::as_str) != Some(table) { return None; }
            let kind = match data.get("type").and_then(Value::as_str)? {
                "INSERT" => ChangeKind::Insert,
                "UPDATE" => ChangeKind::Update,
                "DELETE" => ChangeKind::Delete,
                _ => return None,
            };
            let record_id = ["record", "old_record"]
                .iter()
                .filter_map(|key| data.get(*key)?.get("id")?.as_str())
                .find_map(|id| Uuid::parse_str(id).ok());
            Some(ChangeEvent { table: table.to_string(), kind, record_id })
        }
        "phx_reply" if msg.payload.get("status").and_then(Value::as_str) == Some("error") => {
            warn!(topic = %msg.topic, response = %msg.payload["response"], "Realtime channel rejected");
            None
        }
        _ => None,
    }
}

async fn run(endpoint: String, tokens: TokenSource, table: String, tx: mpsc::Sender<ChangeEvent>, cancel: CancellationToken) {
    let (ws, _) = match connect_async(endpoint.as_str()).await {
        Ok(conn) => conn,
        Err(e) => {
            warn!(error = %e, "Realtime connection failed");
            return;
        }
    };
    let (mut sink, mut stream) = ws.split();
    let mut access_token = tokens.current();
    let join = match serde_json::to_string(&join_message(&table, &access_token)) {
        Ok(text) => text,
        Err(e) => {
            warn!(error = %e, "Cannot encode channel join");
            return;
        }
    };
    if let Err(e) = sink.send(Message::Text(join)).await {
        warn!(error = %e, "Channel join failed");
        return;
    }
    info!(%table, "Listening for realtime changes");

    let mut heartbeat = interval_at(Instant::now() + HEARTBEAT, HEARTBEAT);
    let mut seq = 1u64;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = sink.close().await;
                debug!(%table, "Realtime subscription cancelled");
                break;
            }
            _ = heartbeat.tick() => {
                seq += 1;
                let beat = serde_json::to_string(&heartbeat_message(seq)).unwrap_or_default();
                if let Err(e) = sink.send(Message::Text(beat)).await {
                    warn!(error = %e, "Realtime heartbeat failed");
                    break;
                }
                let current = tokens.current();
                if current != access_token {
                    let refresh = serde_json::to_string(&access_token_message(&table, &current)).unwrap_or_default();
                    if let Err(e) = sink.send(Message::Text(refresh)).await {
                        warn!(error = %e, "Realtime token refresh failed");
                        break;
                    }
                    debug!(%table, "Realtime token refreshed");
                    access_token = current;
                }
            }
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    if let Some(event) = parse_change(&text, &table) {
                        debug!(%table, kind = ?event.kind, "Row changed");
                        if tx.send(event).await.is_err() { break; }
                    }
                }
                Some(Ok(Message::Close(_))) | None => {
                    warn!(%table, "Realtime connection closed");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(error = %e, "Realtime connection error");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_from_http_url() {
        let feed = PhoenixFeed::new("https://abc.example.co/", "anon").unwrap();
        assert_eq!(feed.endpoint(), "wss://abc.example.co/realtime/v1/websocket?apikey=anon&vsn=1.0.0");
        assert!(PhoenixFeed::new("ftp://x", "k").is_err());
    }

    #[test]
    fn test_join_message_filters_table() {
        let join = serde_json::to_value(join_message("products", "anon")).unwrap();
        assert_eq!(join["topic"], "realtime:public:products");
        assert_eq!(join["event"], "phx_join");
        assert_eq!(join["payload"]["config"]["postgres_changes"][0]["table"], "products");
    }

    #[test]
    fn test_join_uses_the_session_token() {
        use crate::domain::session::{AuthUser, Session};
        use crate::store::Action;
        use chrono::{Duration as Age, Utc};

        let store = Arc::new(Store::new());
        let feed = PhoenixFeed::new("https://abc.example.co", "anon").unwrap().with_session(store.clone());
        assert_eq!(feed.tokens.current(), "anon");

        let session = Session {
            access_token: "user-jwt".into(), refresh_token: "r".into(), expires_at: Utc::now() + Age::hours(1),
            user: AuthUser { id: Uuid::new_v4(), email: None },
        };
        store.dispatch(Action::SessionStarted { session, profile: None }).unwrap();
        let token = feed.tokens.current();
        assert_eq!(token, "user-jwt");
        assert_eq!(serde_json::to_value(join_message("products", &token)).unwrap()["payload"]["access_token"], "user-jwt");
        let refresh = serde_json::to_value(access_token_message("products", &token)).unwrap();
        assert_eq!((refresh["event"].as_str(), refresh["topic"].as_str()), (Some("access_token"), Some("realtime:public:products")));

        store.dispatch(Action::SessionEnded).unwrap();
        assert_eq!(feed.tokens.current(), "anon");
    }

    #[test]
    fn test_parse_postgres_change() {
        let id = Uuid::new_v4();
        let text = json!({
            "topic": "realtime:public:products", "event": "postgres_changes", "ref": null,
            "payload": { "data": { "type": "UPDATE", "table": "products", "schema": "public", "record": { "id": id, "stock": 2 }, "old_record": { "id": id } } }
        }).to_string();
        assert_eq!(parse_change(&text, "products"), Some(ChangeEvent { table: "products".into(), kind: ChangeKind::Update, record_id: Some(id) }));
        assert_eq!(parse_change(&text, "sales"), None);
    }

    #[test]
    fn test_parse_ignores_other_frames() {
        let reply = json!({ "topic": "phoenix", "event": "phx_reply", "payload": { "status": "ok" }, "ref": "2" }).to_string();
        assert_eq!(parse_change(&reply, "products"), None);
        assert_eq!(parse_change("not json", "products"), None);
        let delete = json!({ "topic": "t", "event": "postgres_changes", "payload": { "data": { "type": "DELETE", "table": "products", "old_record": { "id": "nope" } } } }).to_string();
        assert_eq!(parse_change(&delete, "products").map(|e| (e.kind, e.record_id)), Some((ChangeKind::Delete, None)));
    }
}
