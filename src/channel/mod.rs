//! Duplex pub/sub channel between the client and the model process.
//!
//! One NATS subject per session carries typed envelopes in both directions;
//! the `direction` field tells each side which ones are theirs.

mod envelope;
mod transport;

pub use envelope::{
    Direction, Envelope, GenerationStage, InboundEvent, PayloadError, Role, StopReason,
    TextOutputData, TextStartData, TextStopData,
};
pub use transport::{Channel, ChannelConnector, ChannelError, NatsChannel, NatsConnector};
