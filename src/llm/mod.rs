pub mod capabilities;
#[cfg(feature = "gemini")]
pub mod client;
pub mod enrichment;
pub mod extractor;
pub mod live;
pub mod prompts;
pub mod types;
pub mod utils;

pub use capabilities::*;
#[cfg(feature = "gemini")]
pub use client::*;
pub use extractor::*;
pub use live::{AudioChunk, LiveCallbacks, LiveSession, LiveTransport, PlaybackQueue};
pub use types::*;
