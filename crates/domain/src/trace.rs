use serde::Serialize;

/// Structured trace events emitted across the narrative-memory crates.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    GraphNodeUpserted {
        session_id: String,
        node_id: String,
        created: bool,
    },
    GraphNodeDeleted {
        session_id: String,
        node_id: String,
        hard: bool,
    },
    GraphEdgeAdded {
        session_id: String,
        source: String,
        target: String,
        relationship: String,
    },
    TurnExtracted {
        session_id: String,
        turn_sequence: u64,
        method: String,
        nodes_updated: usize,
        edges_added: usize,
        nodes_deleted: usize,
        edges_deleted: usize,
    },
    LlmRequest {
        operation: String,
        duration_ms: u64,
        ok: bool,
    },
    SessionCreated {
        session_id: String,
        character_mapping_key: String,
    },
    SessionReset {
        session_id: String,
        keep_graph: bool,
    },
    ChannelBound {
        session_id: String,
        replaced_previous: bool,
    },
    ChannelUnbound {
        session_id: String,
    },
    TavernModeChanged {
        active: bool,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "nm_event");
    }
}
