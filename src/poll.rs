use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::client::ArtifactSource;
use crate::protocol::{lyrics_path, prompt_path};
use crate::session::{AudioPollKey, EventKind, Session, SessionEvent, TextPollKey};

/// Fixed audio readiness cadence. No backoff, no cap — the poller runs
/// until the track answers or its guard condition goes away.
pub const AUDIO_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Prompt/lyrics cadence; the first check fires immediately.
pub const TEXT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// A running poller tied to the guard key it was armed for. Dropping it
/// aborts the task, so a cancelled poller can never deliver again.
struct PollTask<K> {
    key: K,
    handle: JoinHandle<()>,
}

impl<K> Drop for PollTask<K> {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// The session's background pollers. [`Pollers::reconcile`] keeps the
/// running set in lockstep with the session's guard conditions: a task
/// whose key no longer matches is cancelled before a replacement is armed,
/// which (together with epoch guarding) guarantees no stale write lands
/// after a reset.
#[derive(Default)]
pub struct Pollers {
    audio: Option<PollTask<AudioPollKey>>,
    text: Option<PollTask<TextPollKey>>,
}

impl Pollers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reconcile<S: ArtifactSource>(
        &mut self,
        session: &Session,
        source: &Arc<S>,
        tx: &mpsc::Sender<SessionEvent>,
    ) {
        let desired = session.audio_poll();
        if self.audio.as_ref().map(|t| &t.key) != desired.as_ref() {
            // stale poller is cancelled before its replacement is armed
            self.audio.take();
            self.audio = desired.map(|key| spawn_audio(key, source.clone(), tx.clone()));
        }

        let desired = session.text_poll();
        if self.text.as_ref().map(|t| &t.key) != desired.as_ref() {
            self.text.take();
            self.text = desired.map(|key| spawn_text(key, source.clone(), tx.clone()));
        }
    }

    /// Tear down everything, e.g. when the owning view unmounts.
    pub fn cancel_all(&mut self) {
        self.audio = None;
        self.text = None;
    }

    pub fn audio_active(&self) -> bool {
        self.audio.is_some()
    }

    pub fn text_active(&self) -> bool {
        self.text.is_some()
    }
}

fn spawn_audio<S: ArtifactSource>(
    key: AudioPollKey,
    source: Arc<S>,
    tx: mpsc::Sender<SessionEvent>,
) -> PollTask<AudioPollKey> {
    let url = key.audio_url.clone();
    let epoch = key.epoch;
    let handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(AUDIO_POLL_INTERVAL);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // interval's first tick is immediate; the audio probe waits a full
        // period before the first attempt.
        interval.tick().await;
        loop {
            interval.tick().await;
            if source.probe(&url).await {
                let _ = tx
                    .send(SessionEvent {
                        epoch,
                        kind: EventKind::AudioReady,
                    })
                    .await;
                break;
            }
            tracing::debug!(%url, "audio not ready yet");
        }
    });
    PollTask { key, handle }
}

fn spawn_text<S: ArtifactSource>(
    key: TextPollKey,
    source: Arc<S>,
    tx: mpsc::Sender<SessionEvent>,
) -> PollTask<TextPollKey> {
    let epoch = key.epoch;
    let prompt_url = source.resolve(&prompt_path(&key.folder));
    let lyrics_url = source.resolve(&lyrics_path(&key.folder));
    let mut need_prompt = key.prompt_pending;
    let mut need_lyrics = key.lyrics_pending;

    let handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(TEXT_POLL_INTERVAL);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            // First tick completes immediately: the initial check runs now.
            interval.tick().await;
            if need_prompt {
                if let Some(text) = source.fetch_text(&prompt_url).await {
                    need_prompt = false;
                    let _ = tx
                        .send(SessionEvent {
                            epoch,
                            kind: EventKind::PromptReady(text),
                        })
                        .await;
                }
            }
            if need_lyrics {
                if let Some(text) = source.fetch_text(&lyrics_url).await {
                    need_lyrics = false;
                    let _ = tx
                        .send(SessionEvent {
                            epoch,
                            kind: EventKind::LyricsReady(text),
                        })
                        .await;
                }
            }
            if !need_prompt && !need_lyrics {
                break;
            }
        }
    });
    PollTask { key, handle }
}

/// One-shot parallel prompt/lyrics fetch issued right after a pending-music
/// response — a latency optimization only; the periodic poller is the
/// authority if this misses.
pub fn spawn_initial_text_fetch<S: ArtifactSource>(
    source: Arc<S>,
    epoch: u64,
    prompt_url: String,
    lyrics_url: String,
    tx: mpsc::Sender<SessionEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let (prompt, lyrics) = tokio::join!(
            source.fetch_text(&prompt_url),
            source.fetch_text(&lyrics_url)
        );
        if let Some(text) = prompt {
            let _ = tx
                .send(SessionEvent {
                    epoch,
                    kind: EventKind::PromptReady(text),
                })
                .await;
        }
        if let Some(text) = lyrics {
            let _ = tx
                .send(SessionEvent {
                    epoch,
                    kind: EventKind::LyricsReady(text),
                })
                .await;
        }
    })
}
