pub mod codec;
pub mod player;

pub use codec::AudioChunk;
pub use player::{AudioPlayer, PlaybackEvent};
