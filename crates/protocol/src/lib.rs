//! Wire types shared by `nm-gateway` and `nm-session`: the PluginChannel
//! frame/event set (§4.13) and the HTTP request/response DTOs of §6.1.

pub mod frame;
pub mod http;

pub use frame::{close_code, PluginAction, PluginEvent, PluginFrame, PluginResponseFrame};
pub use http::{
    AckResponse, AvailableCharactersResponse, CharacterCardDto, CurrentSessionResponse,
    EnhancePromptRequest, EnhancePromptResponse, FullResetResponse, GraphStats,
    InitializeAsyncResponse, InitializeRequest, InitializeResponse, LivenessResponse,
    ProcessConversationRequest, ProcessConversationResponse, ProcessingStats, ReinitializeResponse,
    ResetRequest, SessionStatsResponse, SubmitCharacterRequest, SyncConversationRequest,
    SyncConversationResponse, TavernHistoryEntry, TavernModeRequest, TavernModeResponse,
    UpdateMemoryRequest, UpdateMemoryResponse,
};
