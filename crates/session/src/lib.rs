//! Session-layer composition (§4.11–§4.13): `SessionEngine` (one per
//! session), `SessionManager` (the process-wide registry), and the
//! `ChannelRegistry` backing `PluginChannel`'s connection binding.

pub mod channel;
pub mod engine;
pub mod manager;

pub use channel::{ChannelMessage, ChannelRegistry, PluginSink};
pub use engine::{
    BootstrapOutcome, CharacterCard, EnhancePromptOutcome, ProcessConversationOutcome,
    SessionEngine, SessionStats, UpdateOutcome,
};
pub use manager::{
    card_from_plugin_data, world_info_from_plugin_data, AsyncInitTask, InitTaskStatus,
    SessionManager,
};
