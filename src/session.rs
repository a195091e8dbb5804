use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;

use crate::artboard::ArtboardSnapshot;
use crate::error::{InkwaveError, InkwaveResult};
use crate::playback::PlaybackState;
use crate::protocol::GenerateResponse;

/// Phrases shown while a generation request is in flight.
pub const LOADING_VERBS: [&str; 7] = [
    "Dreaming in pixels",
    "Composing wonders",
    "Weaving sound-scapes",
    "Painting ambience",
    "Brewing imagination",
    "Sketching possibilities",
    "Sculpting ideas",
];

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Stage {
    /// Editing the artboard.
    #[default]
    Idle,
    /// Generation request in flight.
    Loading,
    /// Results displayed.
    Done,
}

/// Which outputs the user has asked for. At least one stays enabled at all
/// times; disabling the last enabled one is a rejected no-op.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Modalities {
    tags: bool,
    music: bool,
    images: bool,
}

impl Default for Modalities {
    fn default() -> Self {
        Self {
            tags: true,
            music: true,
            images: true,
        }
    }
}

impl Modalities {
    pub fn tags(&self) -> bool {
        self.tags
    }

    pub fn music(&self) -> bool {
        self.music
    }

    pub fn images(&self) -> bool {
        self.images
    }

    /// Returns false when the change was rejected to keep one modality on.
    pub fn set_tags(&mut self, on: bool) -> bool {
        if !on && !self.music && !self.images {
            return false;
        }
        self.tags = on;
        true
    }

    pub fn set_music(&mut self, on: bool) -> bool {
        if !on && !self.tags && !self.images {
            return false;
        }
        self.music = on;
        true
    }

    pub fn set_images(&mut self, on: bool) -> bool {
        if !on && !self.tags && !self.music {
            return false;
        }
        self.images = on;
        true
    }

    pub fn any(&self) -> bool {
        self.tags || self.music || self.images
    }

    /// Comma-separated mode list for the generate call.
    pub fn modes_csv(&self) -> String {
        let mut modes = Vec::new();
        if self.music {
            modes.push("music");
        }
        if self.tags {
            modes.push("tags");
        }
        if self.images {
            modes.push("images");
        }
        modes.join(",")
    }
}

/// Music sub-result state, including the prompt/lyrics text the user can
/// edit before regenerating.
#[derive(Clone, Debug, Default)]
pub struct MusicState {
    pub audio_url: String,
    pub pending: bool,
    pub folder: String,
    pub prompt: String,
    pub lyrics: String,
    pub prompt_pending: bool,
    pub lyrics_pending: bool,
    pub regen_in_flight: bool,
}

/// An asynchronously produced update. Carries the epoch it was generated
/// under; the session drops events from superseded epochs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionEvent {
    pub epoch: u64,
    pub kind: EventKind,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EventKind {
    /// The audio locator answered a readiness probe.
    AudioReady,
    PromptReady(String),
    LyricsReady(String),
}

/// Guard key for the audio readiness poller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AudioPollKey {
    pub epoch: u64,
    pub audio_url: String,
}

/// Guard key for the prompt/lyrics poller. Pending flags are part of the
/// key so a poller restarts (and stops re-fetching) as each text lands.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextPollKey {
    pub epoch: u64,
    pub folder: String,
    pub prompt_pending: bool,
    pub lyrics_pending: bool,
}

/// The generation session: one drawing submitted, three modalities
/// reconciled as they arrive.
#[derive(Debug, Default)]
pub struct Session {
    stage: Stage,
    epoch: u64,
    pub modalities: Modalities,
    pub language: String,
    pub tags: Vec<String>,
    pub images: Vec<String>,
    pub music: MusicState,
    pub playback: PlaybackState,
    pub loading_phrase: String,
    snapshot: Option<ArtboardSnapshot>,
}

impl Session {
    pub fn new(language: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            ..Self::default()
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Begin a new generation run: wipe every prior result, store the
    /// editing snapshot, bump the epoch (superseding all in-flight work)
    /// and enter `Loading`.
    pub fn begin<R: Rng>(
        &mut self,
        snapshot: ArtboardSnapshot,
        rng: &mut R,
    ) -> InkwaveResult<()> {
        if !self.modalities.any() {
            return Err(InkwaveError::validation(
                "at least one modality must be enabled to generate",
            ));
        }
        self.tags.clear();
        self.images.clear();
        self.music = MusicState::default();
        self.playback = PlaybackState::default();
        self.snapshot = Some(snapshot);
        self.epoch += 1;
        self.stage = Stage::Loading;
        self.roll_loading_phrase(rng);
        tracing::debug!(epoch = self.epoch, modes = %self.modalities.modes_csv(), "session began");
        Ok(())
    }

    /// Re-roll the loading phrase (the driver does this on a 3 s cadence
    /// while loading).
    pub fn roll_loading_phrase<R: Rng>(&mut self, rng: &mut R) {
        self.loading_phrase = LOADING_VERBS[rng.gen_range(0..LOADING_VERBS.len())].to_string();
    }

    /// Fold in the generate response. Tags and images are final on arrival;
    /// music may still be pending, in which case prompt and lyrics start
    /// pending too and the pollers take over.
    pub fn apply_response(&mut self, resp: GenerateResponse) {
        if let Some(tags) = resp.tags {
            self.tags = tags;
        }
        if let Some(music) = resp.music {
            self.music.audio_url = music.audio_url;
            self.music.pending = music.pending;
            self.music.folder = music.folder;
            self.music.prompt_pending = true;
            self.music.lyrics_pending = true;
        }
        if let Some(images) = resp.images {
            self.images = images;
        }
    }

    /// Transition to `Done` — called whether the request succeeded or
    /// failed, so the user is never stuck in `Loading`.
    pub fn finish(&mut self) {
        self.stage = Stage::Done;
    }

    /// Leave the results view and restore editing from the stored snapshot.
    /// Playback pauses but the results (and the snapshot) are kept so the
    /// user can come back.
    pub fn reedit(&mut self) -> Option<ArtboardSnapshot> {
        self.stage = Stage::Idle;
        self.playback.pause();
        self.snapshot.clone()
    }

    /// Jump back to the results view from editing, refreshing the stored
    /// snapshot first.
    pub fn return_to_results(&mut self, snapshot: ArtboardSnapshot) {
        self.snapshot = Some(snapshot);
        self.stage = Stage::Done;
    }

    pub fn has_results(&self) -> bool {
        self.snapshot.is_some()
    }

    /// Apply an asynchronously produced event. Events from a superseded
    /// epoch are dropped — this is what makes a reset happen-before any
    /// late pending update.
    pub fn apply(&mut self, event: SessionEvent) {
        if event.epoch != self.epoch {
            tracing::debug!(
                event_epoch = event.epoch,
                current_epoch = self.epoch,
                "dropping stale session event"
            );
            return;
        }
        match event.kind {
            EventKind::AudioReady => {
                if self.music.pending {
                    self.music.pending = false;
                    self.music.audio_url = cache_bust(&self.music.audio_url);
                }
            }
            EventKind::PromptReady(text) => {
                self.music.prompt = text;
                self.music.prompt_pending = false;
            }
            EventKind::LyricsReady(text) => {
                self.music.lyrics = text;
                self.music.lyrics_pending = false;
            }
        }
    }

    pub fn can_regenerate(&self) -> bool {
        self.modalities.music()
            && !self.music.regen_in_flight
            && !self.music.pending
            && !self.music.folder.is_empty()
    }

    /// Start a regeneration: pause and rewind playback, mark the track
    /// pending again and supersede the current pollers.
    pub fn begin_regenerate(&mut self) -> InkwaveResult<()> {
        if !self.can_regenerate() {
            return Err(InkwaveError::validation(
                "regeneration is not available right now",
            ));
        }
        self.music.regen_in_flight = true;
        self.music.pending = true;
        self.playback.rewind();
        self.epoch += 1;
        Ok(())
    }

    /// Fold in the regenerate response. An empty locator (failed call)
    /// leaves the previous one in place; the audio poller keeps watching
    /// either way.
    pub fn finish_regenerate(&mut self, audio_url: &str) {
        self.music.regen_in_flight = false;
        if !audio_url.is_empty() {
            self.music.audio_url = cache_bust(audio_url);
        }
    }

    /// Desired audio poller key, or `None` when no poller should run.
    pub fn audio_poll(&self) -> Option<AudioPollKey> {
        if self.music.pending && !self.music.audio_url.is_empty() {
            Some(AudioPollKey {
                epoch: self.epoch,
                audio_url: self.music.audio_url.clone(),
            })
        } else {
            None
        }
    }

    /// Desired prompt/lyrics poller key, or `None` when both texts are in.
    pub fn text_poll(&self) -> Option<TextPollKey> {
        if !self.music.folder.is_empty()
            && (self.music.prompt_pending || self.music.lyrics_pending)
        {
            Some(TextPollKey {
                epoch: self.epoch,
                folder: self.music.folder.clone(),
                prompt_pending: self.music.prompt_pending,
                lyrics_pending: self.music.lyrics_pending,
            })
        } else {
            None
        }
    }
}

/// Append a freshness query parameter so the player reloads the bytes
/// instead of serving a stale cache entry.
fn cache_bust(url: &str) -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    let sep = if url.contains('?') { '&' } else { '?' };
    format!("{url}{sep}t={millis}")
}
