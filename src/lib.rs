#![forbid(unsafe_code)]

pub mod artboard;
pub mod client;
pub mod compose;
pub mod error;
pub mod layout;
pub mod playback;
pub mod poll;
pub mod protocol;
pub mod session;
pub mod text;

pub use artboard::{Artboard, ArtboardSnapshot, TextBox, TextStyle};
pub use client::{ArtifactSource, StudioClient};
pub use compose::{FlattenedArt, flatten};
pub use error::{InkwaveError, InkwaveResult};
pub use layout::Placement;
pub use playback::PlaybackState;
pub use poll::Pollers;
pub use protocol::{GenerateResponse, MusicPayload, RegenerateResponse};
pub use session::{EventKind, Modalities, Session, SessionEvent, Stage};
pub use text::FontStore;
