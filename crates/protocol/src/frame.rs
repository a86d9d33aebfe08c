//! PluginChannel wire frames (§4.13): the bidirectional socket between the
//! gateway and a frontend plugin. Mirrors `WsMessage`'s tagged-enum style
//! from the node protocol this crate replaces.

use serde::{Deserialize, Serialize};

/// WebSocket close codes used by the `/ws/tavern/{session_id}` endpoint
/// (§6.2).
pub mod close_code {
    /// A new socket replaced this one for the same session.
    pub const REPLACED: u16 = 1012;
    /// Rejected because `tavern_mode_active` is false.
    pub const POLICY: u16 = 1008;
    /// Ordinary close.
    pub const NORMAL: u16 = 1000;
}

/// The plugin-facing request actions dispatched over a `PluginFrame`
/// (§4.13).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PluginAction {
    Initialize,
    EnhancePrompt,
    ProcessConversation,
    SyncConversation,
    #[serde(rename = "tavern.submit_character")]
    TavernSubmitCharacter,
    #[serde(rename = "tavern.request_character_data")]
    TavernRequestCharacterData,
    #[serde(rename = "tavern.current_session")]
    TavernCurrentSession,
    #[serde(rename = "sessions.stats")]
    SessionsStats,
    Health,
    #[serde(rename = "system.full_reset")]
    SystemFullReset,
}

/// Client → Server: `{type: "request", action, request_id, payload}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginFrame {
    #[serde(rename = "type")]
    pub frame_type: String,
    pub action: PluginAction,
    pub request_id: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl PluginFrame {
    pub fn new(action: PluginAction, request_id: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            frame_type: "request".to_string(),
            action,
            request_id: request_id.into(),
            payload,
        }
    }
}

/// Server → Client, in response to a [`PluginFrame`]:
/// `{type: "response", action, request_id, ok, data|error}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginResponseFrame {
    #[serde(rename = "type")]
    pub frame_type: String,
    pub action: PluginAction,
    pub request_id: String,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PluginResponseFrame {
    pub fn ok(action: PluginAction, request_id: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            frame_type: "response".to_string(),
            action,
            request_id: request_id.into(),
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(action: PluginAction, request_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            frame_type: "response".to_string(),
            action,
            request_id: request_id.into(),
            ok: false,
            data: None,
            error: Some(error.into()),
        }
    }
}

/// Server → Client: unsolicited push events (§4.13).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PluginEvent {
    #[serde(rename = "connection_established")]
    ConnectionEstablished { session_id: String },
    #[serde(rename = "graph_updated")]
    GraphUpdated {
        session_id: String,
        nodes: usize,
        edges: usize,
    },
    #[serde(rename = "initialization_complete")]
    InitializationComplete {
        session_id: String,
        nodes_added: usize,
        edges_added: usize,
    },
    #[serde(rename = "request_character_submission")]
    RequestCharacterSubmission { session_id: String },
    #[serde(rename = "auto_reinitialization_complete")]
    AutoReinitializationComplete { session_id: String },
    #[serde(rename = "auto_reinitialization_failed")]
    AutoReinitializationFailed { session_id: String, error: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plugin_action_serializes_dotted_names() {
        let json = serde_json::to_string(&PluginAction::TavernSubmitCharacter).unwrap();
        assert_eq!(json, "\"tavern.submit_character\"");
    }

    #[test]
    fn plugin_frame_round_trips() {
        let frame = PluginFrame::new(PluginAction::Health, "req-1", serde_json::json!({}));
        let json = serde_json::to_string(&frame).unwrap();
        let back: PluginFrame = serde_json::from_str(&json).unwrap();
        assert_eq!(back.action, PluginAction::Health);
        assert_eq!(back.request_id, "req-1");
    }

    #[test]
    fn plugin_event_tags_by_type() {
        let event = PluginEvent::ConnectionEstablished {
            session_id: "s1".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "connection_established");
        assert_eq!(json["session_id"], "s1");
    }
}
