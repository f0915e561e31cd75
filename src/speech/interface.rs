use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Event emitted by a remote streaming-recognition session.
#[derive(Debug, Clone, PartialEq)]
pub enum SpeechEvent {
    Transcript { text: String, is_final: bool },
    Error(String),
}

/// Write half of an open streaming session. Audio frames go in verbatim,
/// in arrival order; `finish` releases the remote session. The relay
/// guarantees `finish` is called at most once per session.
#[async_trait]
pub trait SpeechSink: Send {
    async fn send_audio(&mut self, frame: Vec<u8>) -> anyhow::Result<()>;
    async fn finish(&mut self) -> anyhow::Result<()>;
}

/// An open streaming session: the sink plus the event channel the remote
/// side pushes transcripts and errors into. The channel closing means the
/// remote stream ended.
pub struct SpeechStream {
    pub sink: Box<dyn SpeechSink>,
    pub events: mpsc::Receiver<SpeechEvent>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BatchTranscript {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<f64>,
}

/// Speech-recognition backend, injected at the process entry point so the
/// relay and the upload route never touch vendor specifics directly.
#[async_trait]
pub trait SpeechBackend: Send + Sync {
    /// Open a streaming-recognition session with the remote API.
    async fn open_stream(&self) -> anyhow::Result<SpeechStream>;

    /// One-shot transcription of a complete audio file.
    async fn transcribe(&self, audio: Vec<u8>, mime_type: &str) -> anyhow::Result<BatchTranscript>;

    /// Whether the remote API is currently reachable.
    async fn health_check(&self) -> bool;
}
