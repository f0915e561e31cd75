use serde::Serialize;

/// Text control frames governing the streaming session lifecycle, as opposed
/// to binary audio frames. Anything else on a text frame is malformed and
/// ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMessage {
    StartStream,
    EndStream,
}

impl ControlMessage {
    pub fn parse(text: &str) -> Option<Self> {
        match text.trim() {
            "start_stream" => Some(ControlMessage::StartStream),
            "end_stream" => Some(ControlMessage::EndStream),
            _ => None,
        }
    }
}

/// JSON messages sent to the client over the WebSocket.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    Transcript {
        text: String,
        #[serde(rename = "isFinal")]
        is_final: bool,
    },
    Error {
        message: String,
    },
}

impl OutboundMessage {
    pub fn to_json(&self) -> String {
        // Serialization of these variants cannot fail
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_control_frames() {
        assert_eq!(
            ControlMessage::parse("start_stream"),
            Some(ControlMessage::StartStream)
        );
        assert_eq!(
            ControlMessage::parse("end_stream"),
            Some(ControlMessage::EndStream)
        );
        assert_eq!(ControlMessage::parse("  start_stream\n"), Some(ControlMessage::StartStream));
    }

    #[test]
    fn malformed_control_is_ignored() {
        assert_eq!(ControlMessage::parse(""), None);
        assert_eq!(ControlMessage::parse("START_STREAM"), None);
        assert_eq!(ControlMessage::parse("{\"type\":\"start\"}"), None);
    }

    #[test]
    fn transcript_wire_format() {
        let msg = OutboundMessage::Transcript {
            text: "hello world".to_string(),
            is_final: true,
        };
        assert_eq!(
            msg.to_json(),
            r#"{"type":"transcript","text":"hello world","isFinal":true}"#
        );
    }

    #[test]
    fn error_wire_format() {
        let msg = OutboundMessage::Error {
            message: "speech API unreachable".to_string(),
        };
        assert_eq!(
            msg.to_json(),
            r#"{"type":"error","message":"speech API unreachable"}"#
        );
    }
}
