//! Channel-to-agent routing table.
//!
//! Binding descriptors come back from the tool in loosely specified shapes
//! (`"telegram accountId=x peer=group:123"` or an object with similar keys).
//! Parsing is best effort: anything unrecognised renders as `-`.

use axum::{extract::State, http::StatusCode};
use serde::Serialize;
use serde_json::{Map, Value, json};
use std::collections::{BTreeSet, HashMap};
use tracing::warn;

use super::super::AppState;
use super::{Reply, failure, ok};
use crate::core::model::AgentRecord;
use crate::core::now_ms;

#[derive(Debug, Default, PartialEq)]
struct Peer {
    kind: Option<String>,
    id: Option<String>,
    label: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteRow {
    channel: String,
    account_id: String,
    peer_kind: Option<String>,
    peer_id: Option<String>,
    peer_label: String,
    agent_id: String,
    label: String,
    raw: String,
}

fn peer(kind: Option<String>, id: Option<String>) -> Peer {
    let label = [kind.as_deref(), id.as_deref()]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join("/");
    Peer { kind, id, label }
}

fn parse_peer_text(raw: &str) -> Peer {
    let s = raw.trim();
    if s.is_empty() {
        return Peer::default();
    }
    if let Some(pos) = s.find([':', '/']) {
        let (kind, rest) = (&s[..pos], &s[pos + 1..]);
        if !kind.is_empty() && !kind.contains(char::is_whitespace) && !rest.is_empty() {
            return peer(Some(kind.to_string()), Some(rest.to_string()));
        }
    }
    Peer {
        kind: None,
        id: Some(s.to_string()),
        label: s.to_string(),
    }
}

fn text_of(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn first_field(fields: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| fields.get(*k).and_then(text_of))
}

fn parse_peer_value(value: &Value) -> Peer {
    match value {
        Value::Object(fields) => peer(
            first_field(fields, &["kind", "type", "peerKind"]),
            first_field(fields, &["id", "peerId", "target", "value"]),
        ),
        other => text_of(other)
            .map(|s| parse_peer_text(&s))
            .unwrap_or_default(),
    }
}

fn pick<'a>(kv: &HashMap<&str, &'a str>, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|k| kv.get(k).copied())
}

fn route_row(detail: &Value, agent: &AgentRecord) -> RouteRow {
    let mut channel = String::new();
    let mut account = String::new();
    let mut target = Peer::default();
    let raw;

    match detail {
        Value::String(text) => {
            raw = text.clone();
            let tokens: Vec<&str> = text.split_whitespace().collect();
            if let Some(head) = tokens.first().filter(|t| !t.contains('=')) {
                channel = head.to_string();
            }
            let kv: HashMap<&str, &str> = tokens
                .iter()
                .skip(1)
                .filter_map(|t| t.split_once('='))
                .filter(|(k, v)| !k.is_empty() && !v.is_empty())
                .collect();

            if channel.is_empty() {
                channel = pick(&kv, &["channel", "provider"]).unwrap_or_default().to_string();
            }
            account = pick(&kv, &["accountId", "account", "profile"])
                .unwrap_or_default()
                .to_string();
            if let Some(p) = pick(&kv, &["peer", "target", "to", "chat"]) {
                target = parse_peer_text(p);
            } else if kv.contains_key("peerKind") || kv.contains_key("peerId") {
                target = peer(
                    kv.get("peerKind").map(|s| s.to_string()),
                    kv.get("peerId").map(|s| s.to_string()),
                );
            }
        }
        Value::Object(fields) => {
            raw = detail.to_string();
            channel = first_field(fields, &["channel", "provider", "kind"]).unwrap_or_default();
            account = first_field(fields, &["accountId", "account", "profile"]).unwrap_or_default();
            if let Some(p) = ["peer", "target"]
                .iter()
                .find_map(|k| fields.get(*k).filter(|v| !v.is_null()))
            {
                target = parse_peer_value(p);
            } else if fields.contains_key("peerKind") || fields.contains_key("peerId") {
                target = peer(
                    first_field(fields, &["peerKind"]),
                    first_field(fields, &["peerId"]),
                );
            }
        }
        _ => raw = String::new(),
    }

    let mut human = vec![if channel.is_empty() { "-".to_string() } else { channel.clone() }];
    if !account.is_empty() {
        human.push(format!("@{}", account));
    }
    if !target.label.is_empty() {
        human.push(format!("({})", target.label));
    }

    let dash = |s: String| if s.is_empty() { "-".to_string() } else { s };
    RouteRow {
        label: format!("{} -> {}", human.join(" "), agent.display_name()),
        channel: dash(channel),
        account_id: dash(account),
        peer_kind: target.kind,
        peer_id: target.id,
        peer_label: dash(target.label),
        agent_id: agent.id.clone(),
        raw,
    }
}

/// Telegram account ids from either `channels list` layout, sorted.
fn telegram_accounts(channels: &Value) -> Vec<String> {
    let mut out = BTreeSet::new();
    if let Some(ids) = channels.pointer("/chat/telegram").and_then(Value::as_array) {
        out.extend(ids.iter().filter_map(text_of));
    }
    if let Some(items) = channels.get("channels").and_then(Value::as_array) {
        out.extend(
            items
                .iter()
                .filter(|item| item.get("channel").and_then(Value::as_str) == Some("telegram"))
                .filter_map(|item| item.get("accountId").and_then(text_of)),
        );
    }
    out.into_iter().collect()
}

pub async fn get_routing(State(state): State<AppState>) -> Reply {
    let agents = match state.services.gateway.list_agents().await {
        Ok(agents) => agents,
        Err(e) => return failure(StatusCode::INTERNAL_SERVER_ERROR, e),
    };

    let rows: Vec<RouteRow> = agents
        .iter()
        .flat_map(|agent| {
            agent
                .binding_descriptors()
                .iter()
                .map(move |detail| route_row(detail, agent))
        })
        .collect();

    let (accounts, channels_error) = match state.services.gateway.list_channels().await {
        Ok(channels) => (telegram_accounts(&channels), None),
        Err(e) => {
            warn!("Channel listing failed for routing view: {}", e);
            (Vec::new(), Some(e.to_string()))
        }
    };

    ok(json!({
        "ok": true,
        "updatedAtMs": now_ms(),
        "total": rows.len(),
        "rows": rows,
        "telegramAccounts": accounts,
        "channelsError": channels_error,
    }))
}
