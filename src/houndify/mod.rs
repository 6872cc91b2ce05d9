//! Houndify protocol support: wire types, request signing, and the
//! streaming voice transport.

pub mod auth;
pub mod stream;
pub mod types;

pub use auth::{client_auth_headers, sign_token, RequestAuth};
pub use stream::{StreamAuth, TransportEvent, VoiceTransport, WsVoiceTransport};
pub use types::{CommandResult, PartialTranscript, QueryResponse, VoiceRequestInfo};
