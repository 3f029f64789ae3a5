pub mod audio;
pub mod channel;
pub mod config;
pub mod http;
pub mod session;
pub mod transcript;

pub use audio::{
    AudioSink, CaptureConfig, CaptureError, CaptureSource, CpalCapture, CpalSink, PlaybackError,
    PlaybackPipeline,
};
pub use channel::{
    Channel, ChannelConnector, ChannelError, Direction, Envelope, GenerationStage, InboundEvent,
    NatsChannel, NatsConnector, Role, StopReason,
};
pub use config::Config;
pub use http::{create_router, AppState, SessionRegistry};
pub use session::{
    BatchConfig, BatchScheduler, HandshakeApi, HttpHandshake, SessionConfig, SessionState,
    SessionStats, SpeechSession,
};
pub use transcript::{Message, TranscriptReconciler};
