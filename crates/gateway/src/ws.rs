//! `/ws/tavern/{session_id}` — the PluginChannel socket (§4.13, §6.2).
//!
//! Unlike the node socket this crate's ancestor exposed, PluginChannel has no
//! hello handshake: the session id is in the URL, and binding happens
//! immediately on upgrade, with a `connection_established` event pushed back
//! right away. A new connection always replaces an older one for the same
//! session (`ChannelRegistry::bind`, which sends the replaced socket a real
//! `close_code::REPLACED` frame before returning); connecting while
//! `tavern_mode_active` is false is rejected with `close_code::POLICY`.

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use axum::extract::{Path, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use nm_protocol::{close_code, PluginAction, PluginEvent, PluginFrame, PluginResponseFrame};
use nm_session::manager::{card_from_plugin_data, world_info_from_plugin_data};
use nm_session::ChannelMessage;

use crate::api::util::character_mapping_key;
use crate::state::AppState;

pub async fn tavern_ws(ws: WebSocketUpgrade, State(state): State<AppState>, Path(session_id): Path<String>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, session_id))
}

/// Everything that can ride the per-connection writer queue: a pushed event
/// or close instruction forwarded from the `ChannelRegistry`, or a direct
/// request/response reply.
enum WsOut {
    Message(ChannelMessage),
    Response(PluginResponseFrame),
}

async fn handle_socket(socket: WebSocket, state: AppState, session_id: String) {
    let (mut ws_sink, mut ws_stream) = socket.split();

    if !state.sessions.tavern_mode_active() {
        let _ = ws_sink
            .send(Message::Close(Some(CloseFrame {
                code: close_code::POLICY,
                reason: "tavern mode is not active".into(),
            })))
            .await;
        return;
    }

    let (out_tx, mut out_rx) = mpsc::channel::<WsOut>(64);
    let (event_tx, mut event_rx) = mpsc::channel::<ChannelMessage>(64);

    // Bridge ChannelRegistry's sink into this connection's combined
    // event/response/close queue, stopping once a close has been forwarded.
    let bridge_out_tx = out_tx.clone();
    let bridge = tokio::spawn(async move {
        while let Some(message) = event_rx.recv().await {
            let is_close = matches!(message, ChannelMessage::Close { .. });
            if bridge_out_tx.send(WsOut::Message(message)).await.is_err() || is_close {
                break;
            }
        }
    });

    state.channels.bind(&session_id, event_tx.clone()).await;
    let _ = out_tx
        .send(WsOut::Message(ChannelMessage::Event(PluginEvent::ConnectionEstablished {
            session_id: session_id.clone(),
        })))
        .await;

    let writer = tokio::spawn(async move {
        while let Some(item) = out_rx.recv().await {
            match item {
                WsOut::Message(ChannelMessage::Event(event)) => {
                    let Ok(json) = serde_json::to_string(&event) else { continue };
                    if ws_sink.send(Message::Text(json)).await.is_err() {
                        break;
                    }
                }
                WsOut::Message(ChannelMessage::Close { code, reason }) => {
                    let _ = ws_sink.send(Message::Close(Some(CloseFrame { code, reason: reason.into() }))).await;
                    break;
                }
                WsOut::Response(response) => {
                    let Ok(json) = serde_json::to_string(&response) else { continue };
                    if ws_sink.send(Message::Text(json)).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    while let Some(Ok(msg)) = ws_stream.next().await {
        match msg {
            Message::Text(text) => match serde_json::from_str::<PluginFrame>(&text) {
                Ok(frame) => {
                    let response = dispatch(&state, &session_id, &frame).await;
                    if out_tx.send(WsOut::Response(response)).await.is_err() {
                        break;
                    }
                }
                Err(_) => tracing::debug!(session_id = %session_id, "ignoring unparseable plugin frame"),
            },
            Message::Close(_) => break,
            _ => {}
        }
    }

    bridge.abort();
    writer.abort();
    state.channels.unbind_if_current(&session_id, &event_tx);
}

async fn dispatch(state: &AppState, session_id: &str, frame: &PluginFrame) -> PluginResponseFrame {
    match frame.action {
        PluginAction::Health => PluginResponseFrame::ok(frame.action, &frame.request_id, serde_json::json!({"ok": true})),
        PluginAction::Initialize => handle_initialize(state, session_id, frame).await,
        PluginAction::EnhancePrompt => handle_enhance_prompt(state, session_id, frame),
        PluginAction::ProcessConversation => handle_process_conversation(state, session_id, frame).await,
        PluginAction::SyncConversation => handle_sync_conversation(state, session_id, frame),
        PluginAction::SessionsStats | PluginAction::TavernCurrentSession => handle_stats(state, session_id, frame),
        PluginAction::TavernSubmitCharacter => handle_submit_character(state, frame),
        PluginAction::TavernRequestCharacterData => handle_request_character_data(state, session_id, frame),
        PluginAction::SystemFullReset => handle_full_reset(state, frame).await,
    }
}

async fn handle_initialize(state: &AppState, session_id: &str, frame: &PluginFrame) -> PluginResponseFrame {
    let character_name = frame.payload.get("character_name").and_then(|v| v.as_str()).unwrap_or_default();
    let card = card_from_plugin_data(character_name, &frame.payload);
    let world_info = world_info_from_plugin_data(&frame.payload);
    let is_test = frame.payload.get("is_test").and_then(|v| v.as_bool()).unwrap_or(false);
    let mapping_key = character_mapping_key(character_name);

    let engine = match state.sessions.get_or_create(session_id, &mapping_key, is_test).await {
        Ok(engine) => engine,
        Err(err) => return PluginResponseFrame::err(frame.action, &frame.request_id, err.to_string()),
    };

    match engine.initialize_from_character(&card, &world_info).await {
        Ok(outcome) => PluginResponseFrame::ok(
            frame.action,
            &frame.request_id,
            serde_json::json!({"nodes_added": outcome.nodes_added, "edges_added": outcome.edges_added}),
        ),
        Err(err) => PluginResponseFrame::err(frame.action, &frame.request_id, err.to_string()),
    }
}

fn handle_enhance_prompt(state: &AppState, session_id: &str, frame: &PluginFrame) -> PluginResponseFrame {
    let Some(engine) = state.sessions.get(session_id) else {
        return PluginResponseFrame::err(frame.action, &frame.request_id, "no such session");
    };
    let user_input = frame.payload.get("user_input").and_then(|v| v.as_str()).unwrap_or_default();
    let max_context_length = frame.payload.get("max_context_length").and_then(|v| v.as_u64()).unwrap_or(2000) as usize;
    let recent_history = frame.payload.get("recent_history").and_then(|v| v.as_u64()).unwrap_or(0) as usize;

    let outcome = engine.enhance_prompt(user_input, max_context_length, recent_history);
    PluginResponseFrame::ok(
        frame.action,
        &frame.request_id,
        serde_json::json!({"enhanced_context": outcome.enhanced_context, "entities_found": outcome.entities_found}),
    )
}

async fn handle_process_conversation(state: &AppState, session_id: &str, frame: &PluginFrame) -> PluginResponseFrame {
    let Some(engine) = state.sessions.get(session_id) else {
        return PluginResponseFrame::err(frame.action, &frame.request_id, "no such session");
    };
    let user_input = frame.payload.get("user_input").and_then(|v| v.as_str()).unwrap_or_default();
    let llm_response = frame.payload.get("llm_response").and_then(|v| v.as_str()).unwrap_or_default();

    match engine.process_conversation(user_input, llm_response).await {
        Ok(outcome) => PluginResponseFrame::ok(
            frame.action,
            &frame.request_id,
            serde_json::json!({
                "turn_sequence": outcome.turn_sequence,
                "turn_processed": outcome.turn_processed,
                "nodes_updated": outcome.nodes_updated,
                "edges_added": outcome.edges_added,
            }),
        ),
        Err(err) => PluginResponseFrame::err(frame.action, &frame.request_id, err.to_string()),
    }
}

fn handle_sync_conversation(state: &AppState, session_id: &str, frame: &PluginFrame) -> PluginResponseFrame {
    let Some(engine) = state.sessions.get(session_id) else {
        return PluginResponseFrame::err(frame.action, &frame.request_id, "no such session");
    };
    let history: Vec<nm_window::AuthoritativeTurn> = frame
        .payload
        .get("tavern_history")
        .and_then(|v| v.as_array())
        .map(|entries| {
            entries
                .iter()
                .enumerate()
                .map(|(i, entry)| nm_window::AuthoritativeTurn {
                    sequence: i as u64 + 1,
                    user_text: entry.get("user_input").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
                    assistant_text: entry.get("llm_response").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
                    external_message_id: entry.get("external_message_id").and_then(|v| v.as_str()).map(str::to_string),
                })
                .collect()
        })
        .unwrap_or_default();

    let counters = engine.sync_conversation(&history);
    PluginResponseFrame::ok(
        frame.action,
        &frame.request_id,
        serde_json::json!({
            "conflicts_detected": counters.conflicts_detected,
            "conflicts_resolved": counters.conflicts_resolved,
        }),
    )
}

fn handle_stats(state: &AppState, session_id: &str, frame: &PluginFrame) -> PluginResponseFrame {
    let Some(engine) = state.sessions.get(session_id) else {
        return PluginResponseFrame::err(frame.action, &frame.request_id, "no such session");
    };
    let stats = engine.stats();
    PluginResponseFrame::ok(
        frame.action,
        &frame.request_id,
        serde_json::json!({"nodes": stats.nodes, "edges": stats.edges, "turn_count": stats.turn_count}),
    )
}

fn handle_submit_character(state: &AppState, frame: &PluginFrame) -> PluginResponseFrame {
    let character_id = frame.payload.get("character_id").and_then(|v| v.as_str()).unwrap_or_default().to_string();
    let character_name = frame.payload.get("character_name").and_then(|v| v.as_str()).unwrap_or_default().to_string();

    state.sessions.submit_character(character_id, character_name, frame.payload.clone());
    PluginResponseFrame::ok(frame.action, &frame.request_id, serde_json::json!({"accepted": true}))
}

fn handle_request_character_data(state: &AppState, session_id: &str, frame: &PluginFrame) -> PluginResponseFrame {
    match state.sessions.last_plugin_submission_for_session(session_id) {
        Some((character_name, data)) => PluginResponseFrame::ok(
            frame.action,
            &frame.request_id,
            serde_json::json!({"character_name": character_name, "character_data": data}),
        ),
        None => PluginResponseFrame::err(frame.action, &frame.request_id, "no plugin submission on record"),
    }
}

async fn handle_full_reset(state: &AppState, frame: &PluginFrame) -> PluginResponseFrame {
    match state.sessions.full_reset().await {
        Ok((sessions_closed, sockets_closed)) => PluginResponseFrame::ok(
            frame.action,
            &frame.request_id,
            serde_json::json!({"sessions_closed": sessions_closed, "sockets_closed": sockets_closed}),
        ),
        Err(err) => PluginResponseFrame::err(frame.action, &frame.request_id, err.to_string()),
    }
}
