//! Bidirectional voice session with an analyst persona bound to one report.
//!
//! The socket itself belongs to the host: anything that can move JSON frames
//! implements [`LiveTransport`]. This module owns the framing, the PCM16
//! codecs and the playback queue that honours barge-in interruptions.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use log::{debug, info, warn};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::time::Duration;

use crate::config::AnalyzerConfig;
use crate::error::{AnalyzerError, Result};
use crate::llm::prompts::live_analyst_instruction;
use crate::schema::FinancialReport;

pub const INPUT_SAMPLE_RATE: u32 = 16_000;
pub const OUTPUT_SAMPLE_RATE: u32 = 24_000;

/// Encodes mono float samples in `[-1, 1]` as base64 little-endian PCM16.
pub fn encode_pcm16(samples: &[f32]) -> String {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for sample in samples {
        let scaled = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        bytes.extend_from_slice(&scaled.to_le_bytes());
    }
    BASE64.encode(bytes)
}

pub fn decode_pcm16(data: &str) -> Result<Vec<f32>> {
    let bytes = BASE64
        .decode(data)
        .map_err(|e| AnalyzerError::LiveSession(format!("audio payload is not base64: {}", e)))?;
    if bytes.len() % 2 != 0 {
        return Err(AnalyzerError::LiveSession(format!(
            "PCM16 payload has odd length {}",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32768.0)
        .collect())
}

#[derive(Debug, Clone, PartialEq)]
pub struct AudioChunk {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl AudioChunk {
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / self.sample_rate as f64)
    }
}

/// Model audio waiting to be played, in arrival order.
#[derive(Debug, Default)]
pub struct PlaybackQueue {
    pending: VecDeque<AudioChunk>,
}

impl PlaybackQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: AudioChunk) {
        self.pending.push_back(chunk);
    }

    pub fn next_chunk(&mut self) -> Option<AudioChunk> {
        self.pending.pop_front()
    }

    /// Drops everything not yet played and returns how many chunks went.
    pub fn interrupt(&mut self) -> usize {
        let discarded = self.pending.len();
        self.pending.clear();
        discarded
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn pending_duration(&self) -> Duration {
        self.pending.iter().map(AudioChunk::duration).sum()
    }
}

/// Moves JSON frames over whatever socket the host opened.
#[async_trait]
pub trait LiveTransport: Send {
    async fn send(&mut self, frame: Value) -> Result<()>;

    /// `Ok(None)` once the peer has closed.
    async fn recv(&mut self) -> Result<Option<Value>>;

    async fn close(&mut self) -> Result<()>;
}

pub trait LiveCallbacks: Send {
    fn on_open(&mut self) {}

    fn on_audio(&mut self, _chunk: &AudioChunk) {}

    /// The model was talked over; `discarded` queued chunks were dropped.
    fn on_interrupted(&mut self, _discarded: usize) {}

    fn on_error(&mut self, _error: &AnalyzerError) {}

    fn on_close(&mut self) {}
}

#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    SetupComplete,
    Audio(AudioChunk),
    Interrupted,
    TurnComplete,
}

pub fn setup_message(report: &FinancialReport, config: &AnalyzerConfig) -> Value {
    json!({
        "setup": {
            "model": format!("models/{}", config.live_model),
            "generationConfig": {
                "responseModalities": ["AUDIO"],
                "speechConfig": {
                    "voiceConfig": { "prebuiltVoiceConfig": { "voiceName": config.voice } }
                }
            },
            "systemInstruction": {
                "parts": [{ "text": live_analyst_instruction(report) }]
            }
        }
    })
}

pub fn realtime_input_frame(samples: &[f32]) -> Value {
    json!({
        "realtimeInput": {
            "mediaChunks": [{
                "mimeType": format!("audio/pcm;rate={}", INPUT_SAMPLE_RATE),
                "data": encode_pcm16(samples)
            }]
        }
    })
}

/// Events carried by one server frame, in the order they should be applied.
pub fn parse_server_message(frame: &Value) -> Result<Vec<ServerEvent>> {
    let mut events = Vec::new();
    if frame.get("setupComplete").is_some() {
        events.push(ServerEvent::SetupComplete);
    }

    if let Some(content) = frame.get("serverContent") {
        if content.get("interrupted").and_then(Value::as_bool) == Some(true) {
            events.push(ServerEvent::Interrupted);
        }
        let parts = content
            .pointer("/modelTurn/parts")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        for part in parts {
            if let Some(data) = part.pointer("/inlineData/data").and_then(Value::as_str) {
                events.push(ServerEvent::Audio(AudioChunk {
                    samples: decode_pcm16(data)?,
                    sample_rate: OUTPUT_SAMPLE_RATE,
                }));
            }
        }
        if content.get("turnComplete").and_then(Value::as_bool) == Some(true) {
            events.push(ServerEvent::TurnComplete);
        }
    }

    Ok(events)
}

pub struct LiveSession<T: LiveTransport> {
    transport: T,
    playback: PlaybackQueue,
}

impl<T: LiveTransport> LiveSession<T> {
    /// Sends the setup frame and waits for the server to acknowledge it.
    pub async fn connect<C: LiveCallbacks>(
        mut transport: T,
        report: &FinancialReport,
        config: &AnalyzerConfig,
        callbacks: &mut C,
    ) -> Result<Self> {
        transport.send(setup_message(report, config)).await?;

        loop {
            let frame = match transport.recv().await? {
                Some(frame) => frame,
                None => {
                    let err = AnalyzerError::LiveSession(
                        "connection closed before setup completed".to_string(),
                    );
                    callbacks.on_error(&err);
                    return Err(err);
                }
            };
            if parse_server_message(&frame)?.contains(&ServerEvent::SetupComplete) {
                break;
            }
        }

        info!("Live analyst session open for {}", report.display_label());
        callbacks.on_open();
        Ok(Self {
            transport,
            playback: PlaybackQueue::new(),
        })
    }

    /// Streams one block of 16 kHz microphone samples.
    pub async fn send_audio(&mut self, samples: &[f32]) -> Result<()> {
        self.transport.send(realtime_input_frame(samples)).await
    }

    pub fn playback(&mut self) -> &mut PlaybackQueue {
        &mut self.playback
    }

    /// Handles one server frame. Returns `false` once the server has closed.
    pub async fn poll<C: LiveCallbacks>(&mut self, callbacks: &mut C) -> Result<bool> {
        let frame = match self.transport.recv().await {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                callbacks.on_close();
                return Ok(false);
            }
            Err(e) => {
                callbacks.on_error(&e);
                return Err(e);
            }
        };

        let events = match parse_server_message(&frame) {
            Ok(events) => events,
            Err(e) => {
                warn!("Dropping unreadable live frame: {}", e);
                callbacks.on_error(&e);
                return Ok(true);
            }
        };

        for event in events {
            match event {
                ServerEvent::Audio(chunk) => {
                    callbacks.on_audio(&chunk);
                    self.playback.push(chunk);
                }
                ServerEvent::Interrupted => {
                    let discarded = self.playback.interrupt();
                    debug!("Interrupted, discarded {} queued chunk(s)", discarded);
                    callbacks.on_interrupted(discarded);
                }
                ServerEvent::SetupComplete | ServerEvent::TurnComplete => {}
            }
        }
        Ok(true)
    }

    /// Pumps frames until the server closes the session.
    pub async fn run<C: LiveCallbacks>(&mut self, callbacks: &mut C) -> Result<()> {
        while self.poll(callbacks).await? {}
        Ok(())
    }

    pub async fn close<C: LiveCallbacks>(mut self, callbacks: &mut C) -> Result<()> {
        self.playback.interrupt();
        self.transport.close().await?;
        callbacks.on_close();
        Ok(())
    }
}
