pub mod cloud;
pub mod interface;

pub use cloud::CloudSpeechBackend;
pub use interface::{BatchTranscript, SpeechBackend, SpeechEvent, SpeechSink, SpeechStream};
