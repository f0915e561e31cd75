use std::sync::Arc;
use tracing::{debug, warn};

use super::messages::{ControlMessage, OutboundMessage};
use crate::speech::{SpeechBackend, SpeechEvent, SpeechStream};

enum SessionState {
    Idle,
    Streaming(SpeechStream),
}

/// Per-connection streaming session: an explicit two-state machine between
/// the client's WebSocket and the remote speech API. At most one remote
/// session is active per connection; the remote handle is released exactly
/// once per session, on stop, remote error, or connection close.
pub struct RelaySession {
    backend: Arc<dyn SpeechBackend>,
    state: SessionState,
    // Outbound message staged before a release, so a poll cancelled
    // mid-release still delivers it on the next poll
    pending: Option<OutboundMessage>,
}

impl RelaySession {
    pub fn new(backend: Arc<dyn SpeechBackend>) -> Self {
        Self {
            backend,
            state: SessionState::Idle,
            pending: None,
        }
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self.state, SessionState::Streaming(_))
    }

    /// Apply a control frame. Malformed input (None) is ignored. The only
    /// message this can produce is an error event when a start fails.
    pub async fn handle_control(
        &mut self,
        control: Option<ControlMessage>,
    ) -> Option<OutboundMessage> {
        match control {
            None => None,
            Some(ControlMessage::StartStream) => {
                if self.is_streaming() {
                    debug!("start_stream while already streaming, ignored");
                    return None;
                }
                match self.backend.open_stream().await {
                    Ok(stream) => {
                        self.state = SessionState::Streaming(stream);
                        None
                    }
                    Err(e) => {
                        warn!("Failed to open speech stream: {:#}", e);
                        Some(OutboundMessage::Error {
                            message: format!("failed to start transcription: {}", e),
                        })
                    }
                }
            }
            Some(ControlMessage::EndStream) => {
                self.release().await;
                None
            }
        }
    }

    /// Forward a binary audio frame. Frames arriving while Idle are dropped,
    /// not buffered. A mid-stream send failure tears the session down and
    /// reports once.
    pub async fn handle_audio(&mut self, frame: Vec<u8>) -> Option<OutboundMessage> {
        let send_error = match &mut self.state {
            SessionState::Idle => return None,
            SessionState::Streaming(stream) => stream.sink.send_audio(frame).await.err(),
        };

        if let Some(e) = send_error {
            warn!("Audio forward failed: {:#}", e);
            self.release().await;
            return Some(OutboundMessage::Error {
                message: format!("transcription stream lost: {}", e),
            });
        }
        None
    }

    /// Next message to relay to the client. Pends while Idle, so this is
    /// safe to poll from a select loop alongside the inbound socket. A
    /// remote error yields exactly one error event and returns the session
    /// to Idle; a clean remote end returns to Idle silently.
    ///
    /// Cancellation-safe: the caller's select loop may drop this future
    /// whenever an inbound frame wins the race, so the error event is
    /// staged in `pending` before the handle is released and handed out
    /// on the next poll.
    pub async fn next_event(&mut self) -> OutboundMessage {
        loop {
            if let Some(message) = self.pending.take() {
                return message;
            }

            let event = match &mut self.state {
                SessionState::Idle => {
                    futures::future::pending::<()>().await;
                    unreachable!()
                }
                SessionState::Streaming(stream) => stream.events.recv().await,
            };

            match event {
                Some(SpeechEvent::Transcript { text, is_final }) => {
                    return OutboundMessage::Transcript { text, is_final };
                }
                Some(SpeechEvent::Error(message)) => {
                    self.pending = Some(OutboundMessage::Error { message });
                    self.release().await;
                }
                None => self.release().await,
            }
        }
    }

    /// Connection closed: release the remote handle. No message is produced;
    /// the client is gone.
    pub async fn shutdown(mut self) {
        self.release().await;
    }

    async fn release(&mut self) {
        if let SessionState::Streaming(mut stream) =
            std::mem::replace(&mut self.state, SessionState::Idle)
        {
            if let Err(e) = stream.sink.finish().await {
                debug!("Error closing speech stream: {:#}", e);
            }
        }
    }
}
