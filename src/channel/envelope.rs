use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Transport direction of an envelope.
///
/// Consumers ignore envelopes whose direction does not match their role, so a
/// client subscribed to its own session subject never re-processes the audio
/// batches it published itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    /// Client to model (outbound).
    #[serde(rename = "ctob")]
    ClientToModel,
    /// Model to client (inbound).
    #[serde(rename = "btoc")]
    ModelToClient,
}

/// Speaker role attached to a generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[serde(alias = "SYSTEM")]
    System,
    #[serde(alias = "USER")]
    User,
    #[serde(alias = "ASSISTANT")]
    Assistant,
}

/// Whether a text fragment is still streaming or settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GenerationStage {
    Speculative,
    Final,
}

/// Why a generation stopped. Arrives independently of the content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StopReason {
    EndTurn,
    PartialTurn,
    Interrupted,
}

/// `textStart` payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextStartData {
    pub id: String,
    pub role: Role,
    pub generation_stage: GenerationStage,
}

/// `textOutput` payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextOutputData {
    pub id: String,
    pub role: Role,
    pub content: String,
}

/// `textStop` payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextStopData {
    pub id: String,
    pub stop_reason: StopReason,
}

/// One transport-level message on the session channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub direction: Direction,
    pub event: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub data: Value,
}

/// Inbound events after demultiplexing by tag.
#[derive(Debug, Clone)]
pub enum InboundEvent {
    Ready,
    AudioOutput(Vec<String>),
    TextStart(TextStartData),
    TextOutput(TextOutputData),
    TextStop(TextStopData),
    End,
}

#[derive(Debug, thiserror::Error)]
#[error("malformed {event} payload: {source}")]
pub struct PayloadError {
    pub event: String,
    #[source]
    source: serde_json::Error,
}

impl Envelope {
    fn outbound(event: &str, data: Value) -> Self {
        Self {
            direction: Direction::ClientToModel,
            event: event.to_string(),
            data,
        }
    }

    pub fn prompt_start() -> Self {
        Self::outbound("promptStart", Value::Null)
    }

    pub fn system_prompt(prompt: &str) -> Self {
        Self::outbound("systemPrompt", Value::String(prompt.to_string()))
    }

    pub fn audio_start() -> Self {
        Self::outbound("audioStart", Value::Null)
    }

    /// One batch of base64 PCM16 chunks from the capture pipeline.
    pub fn audio_input(chunks: &[String]) -> Self {
        Self::outbound(
            "audioInput",
            Value::Array(chunks.iter().cloned().map(Value::String).collect()),
        )
    }

    pub fn audio_stop() -> Self {
        Self::outbound("audioStop", Value::Null)
    }

    /// Demultiplex an envelope into a typed inbound event.
    ///
    /// Returns `Ok(None)` for envelopes that must be ignored: wrong direction,
    /// or an event tag outside the known vocabulary (the protocol is expected
    /// to grow). Returns `Err` only for a known tag whose payload does not
    /// parse; the caller logs and drops it without ending the session.
    pub fn parse_inbound(&self) -> Result<Option<InboundEvent>, PayloadError> {
        if self.direction != Direction::ModelToClient {
            return Ok(None);
        }

        let payload = |event: &str, source| PayloadError {
            event: event.to_string(),
            source,
        };

        let parsed = match self.event.as_str() {
            "ready" => InboundEvent::Ready,
            "end" => InboundEvent::End,
            "audioOutput" => match normalize_chunks(&self.data) {
                Some(chunks) => InboundEvent::AudioOutput(chunks),
                None => {
                    return Err(payload(
                        "audioOutput",
                        serde_json::from_value::<Vec<String>>(self.data.clone()).unwrap_err(),
                    ))
                }
            },
            "textStart" => InboundEvent::TextStart(
                serde_json::from_value(self.data.clone()).map_err(|e| payload("textStart", e))?,
            ),
            "textOutput" => InboundEvent::TextOutput(
                serde_json::from_value(self.data.clone()).map_err(|e| payload("textOutput", e))?,
            ),
            "textStop" => InboundEvent::TextStop(
                serde_json::from_value(self.data.clone()).map_err(|e| payload("textStop", e))?,
            ),
            _ => return Ok(None),
        };

        Ok(Some(parsed))
    }
}

/// Normalize `audioOutput.data` to the canonical array-of-chunks shape.
///
/// Older protocol revisions sent a single base64 string instead of an array;
/// both are accepted here so nothing downstream has to branch on shape.
fn normalize_chunks(data: &Value) -> Option<Vec<String>> {
    match data {
        Value::String(chunk) => Some(vec![chunk.clone()]),
        Value::Array(items) => items
            .iter()
            .map(|item| item.as_str().map(str::to_string))
            .collect(),
        _ => None,
    }
}
