use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

use super::interface::{BatchTranscript, SpeechBackend, SpeechEvent, SpeechSink, SpeechStream};
use crate::config::SpeechConfig;

type WsConn = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Client for the vendor's speech-recognition API: a WebSocket endpoint for
/// streaming (binary audio in, JSON result events out) and an HTTP endpoint
/// for one-shot transcription of uploaded files.
pub struct CloudSpeechBackend {
    config: SpeechConfig,
    http: reqwest::Client,
}

impl CloudSpeechBackend {
    pub fn new(config: SpeechConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    fn streaming_url(&self) -> String {
        format!(
            "{}?model={}&language={}&sample_rate={}&encoding=linear16&interim_results=true",
            self.config.streaming_url,
            self.config.model,
            self.config.language,
            self.config.sample_rate_hz,
        )
    }
}

/// One recognition result event on the streaming socket.
#[derive(Debug, Deserialize)]
struct StreamResult {
    #[serde(default)]
    is_final: bool,
    channel: Option<ResultChannel>,
}

#[derive(Debug, Deserialize)]
struct ResultChannel {
    alternatives: Vec<ResultAlternative>,
}

#[derive(Debug, Deserialize)]
struct ResultAlternative {
    transcript: String,
}

#[derive(Debug, Deserialize)]
struct BatchResponse {
    metadata: Option<BatchMetadata>,
    results: Option<BatchResults>,
}

#[derive(Debug, Deserialize)]
struct BatchMetadata {
    duration: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct BatchResults {
    channels: Vec<ResultChannel>,
}

struct CloudSpeechSink {
    writer: SplitSink<WsConn, WsMessage>,
}

#[async_trait]
impl SpeechSink for CloudSpeechSink {
    async fn send_audio(&mut self, frame: Vec<u8>) -> anyhow::Result<()> {
        self.writer.send(WsMessage::Binary(frame)).await?;
        Ok(())
    }

    async fn finish(&mut self) -> anyhow::Result<()> {
        // The vendor finalizes pending results on this control message
        let _ = self
            .writer
            .send(WsMessage::Text(r#"{"type":"CloseStream"}"#.to_string()))
            .await;
        self.writer.close().await?;
        Ok(())
    }
}

async fn pump_results(mut reader: SplitStream<WsConn>, events: mpsc::Sender<SpeechEvent>) {
    while let Some(msg) = reader.next().await {
        match msg {
            Ok(WsMessage::Text(text)) => {
                let result: StreamResult = match serde_json::from_str(&text) {
                    Ok(r) => r,
                    Err(e) => {
                        debug!("Unrecognized speech API message: {}", e);
                        continue;
                    }
                };
                let transcript = result
                    .channel
                    .and_then(|c| c.alternatives.into_iter().next())
                    .map(|a| a.transcript)
                    .unwrap_or_default();
                if transcript.is_empty() {
                    continue;
                }
                let event = SpeechEvent::Transcript {
                    text: transcript,
                    is_final: result.is_final,
                };
                if events.send(event).await.is_err() {
                    // Session was torn down on our side
                    return;
                }
            }
            Ok(WsMessage::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                warn!("Speech stream error: {}", e);
                let _ = events.send(SpeechEvent::Error(e.to_string())).await;
                return;
            }
        }
    }
}

#[async_trait]
impl SpeechBackend for CloudSpeechBackend {
    async fn open_stream(&self) -> anyhow::Result<SpeechStream> {
        let mut request = self.streaming_url().into_client_request()?;
        request.headers_mut().insert(
            "Authorization",
            HeaderValue::from_str(&format!("Token {}", self.config.api_key))?,
        );

        let (conn, _) = connect_async(request).await?;
        let (writer, reader) = conn.split();

        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(pump_results(reader, tx));

        Ok(SpeechStream {
            sink: Box::new(CloudSpeechSink { writer }),
            events: rx,
        })
    }

    async fn transcribe(&self, audio: Vec<u8>, mime_type: &str) -> anyhow::Result<BatchTranscript> {
        let url = format!(
            "{}?model={}&language={}",
            self.config.batch_url, self.config.model, self.config.language
        );

        let response = self
            .http
            .post(&url)
            .header("Authorization", format!("Token {}", self.config.api_key))
            .header("Content-Type", mime_type)
            .body(audio)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("speech API returned {}: {}", status, body);
        }

        let parsed: BatchResponse = response.json().await?;
        let text = parsed
            .results
            .and_then(|r| r.channels.into_iter().next())
            .and_then(|c| c.alternatives.into_iter().next())
            .map(|a| a.transcript)
            .unwrap_or_default();

        Ok(BatchTranscript {
            text,
            duration_secs: parsed.metadata.and_then(|m| m.duration),
        })
    }

    async fn health_check(&self) -> bool {
        self.http
            .get(&self.config.batch_url)
            .header("Authorization", format!("Token {}", self.config.api_key))
            .send()
            .await
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_interim_result() {
        let raw = r#"{
            "type": "Results",
            "is_final": false,
            "channel": {"alternatives": [{"transcript": "hello wor"}]}
        }"#;
        let result: StreamResult = serde_json::from_str(raw).unwrap();
        assert!(!result.is_final);
        assert_eq!(
            result.channel.unwrap().alternatives[0].transcript,
            "hello wor"
        );
    }

    #[test]
    fn tolerates_metadata_messages() {
        // Keepalive/metadata frames have no channel; the pump skips them
        let raw = r#"{"type": "Metadata", "request_id": "abc"}"#;
        let result: StreamResult = serde_json::from_str(raw).unwrap();
        assert!(result.channel.is_none());
    }

    #[test]
    fn parses_batch_response() {
        let raw = r#"{
            "metadata": {"duration": 12.5},
            "results": {"channels": [{"alternatives": [{"transcript": "meeting notes"}]}]}
        }"#;
        let parsed: BatchResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.metadata.unwrap().duration, Some(12.5));
        assert_eq!(
            parsed.results.unwrap().channels[0].alternatives[0].transcript,
            "meeting notes"
        );
    }
}
