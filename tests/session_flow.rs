use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rand::SeedableRng;
use rand::rngs::StdRng;
use serde_json::json;
use tokio::sync::mpsc;

use inkwave::poll::spawn_initial_text_fetch;
use inkwave::{
    Artboard, ArtifactSource, EventKind, GenerateResponse, Pollers, Session, SessionEvent,
};

/// In-memory backend stand-in: artifacts flip from missing to ready as the
/// test dictates.
#[derive(Default)]
struct FakeSource {
    audio_ready: AtomicBool,
    prompt: Mutex<Option<String>>,
    lyrics: Mutex<Option<String>>,
    probes: AtomicUsize,
    text_fetches: AtomicUsize,
}

impl FakeSource {
    fn set_audio_ready(&self) {
        self.audio_ready.store(true, Ordering::SeqCst);
    }

    fn set_prompt(&self, text: &str) {
        *self.prompt.lock().unwrap() = Some(text.to_string());
    }

    fn set_lyrics(&self, text: &str) {
        *self.lyrics.lock().unwrap() = Some(text.to_string());
    }
}

impl ArtifactSource for FakeSource {
    fn probe(&self, _url: &str) -> impl Future<Output = bool> + Send {
        self.probes.fetch_add(1, Ordering::SeqCst);
        let ready = self.audio_ready.load(Ordering::SeqCst);
        async move { ready }
    }

    fn fetch_text(&self, url: &str) -> impl Future<Output = Option<String>> + Send {
        self.text_fetches.fetch_add(1, Ordering::SeqCst);
        let slot = if url.contains("prompt") {
            &self.prompt
        } else {
            &self.lyrics
        };
        let text = slot.lock().unwrap().clone();
        async move { text }
    }

    fn resolve(&self, path: &str) -> String {
        format!("http://backend/{path}")
    }
}

fn snapshot() -> inkwave::ArtboardSnapshot {
    Artboard::new(image::RgbaImage::new(2, 2))
        .unwrap()
        .snapshot()
}

/// The canonical backend response: tags and images final, music pending.
fn scenario_response() -> GenerateResponse {
    GenerateResponse::from_value(&json!({
        "tags": {"tags": ["calm", "blue"]},
        "music": {
            "audio_url": "/a.mp3",
            "pending": true,
            "folder": "run1",
            "prompt_url": "/output/run1/prompt.txt",
            "lyrics_url": "/output/run1/lyrics.lrc",
        },
        "images": {"images": ["/i1.png"]},
    }))
}

async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test(start_paused = true)]
async fn pending_artifacts_resolve_through_the_pollers() {
    let source = Arc::new(FakeSource::default());
    source.set_prompt("a calm prompt");

    let mut rng = StdRng::seed_from_u64(1);
    let mut session = Session::new("en");
    session.begin(snapshot(), &mut rng).unwrap();
    session.apply_response(scenario_response());
    session.finish();

    // Tags and images are final the moment the response lands.
    assert_eq!(session.tags, vec!["calm", "blue"]);
    assert_eq!(session.images, vec!["/i1.png"]);
    assert!(session.music.pending);

    let (tx, mut rx) = mpsc::channel::<SessionEvent>(16);
    let mut pollers = Pollers::new();
    pollers.reconcile(&session, &source, &tx);
    assert!(pollers.audio_active());
    assert!(pollers.text_active());

    // The text poller's first check is immediate: the prompt arrives with
    // no simulated time passing at all.
    settle().await;
    let event = rx.try_recv().expect("immediate prompt check");
    assert!(matches!(event.kind, EventKind::PromptReady(_)));
    session.apply(event);
    pollers.reconcile(&session, &source, &tx);
    assert_eq!(session.music.prompt, "a calm prompt");
    assert!(session.music.lyrics_pending);

    // Lyrics appear on the backend a little later; the 5 s cadence picks
    // them up.
    source.set_lyrics("[00:01] la la");
    let event = rx.recv().await.unwrap();
    assert!(matches!(event.kind, EventKind::LyricsReady(_)));
    session.apply(event);
    pollers.reconcile(&session, &source, &tx);
    assert!(!session.music.lyrics_pending);
    assert!(session.text_poll().is_none());

    // Audio stays pending until a probe answers.
    assert!(session.music.pending);
    source.set_audio_ready();
    let event = rx.recv().await.unwrap();
    assert!(matches!(event.kind, EventKind::AudioReady));
    let initial_url = session.music.audio_url.clone();
    session.apply(event);
    pollers.reconcile(&session, &source, &tx);

    assert!(!session.music.pending);
    assert_ne!(session.music.audio_url, initial_url);
    assert!(session.music.audio_url.starts_with(&initial_url));
    assert!(session.audio_poll().is_none());
    assert!(!pollers.audio_active());
}

#[tokio::test(start_paused = true)]
async fn audio_probe_waits_a_full_period() {
    let source = Arc::new(FakeSource::default());
    source.set_audio_ready();

    let mut rng = StdRng::seed_from_u64(2);
    let mut session = Session::new("en");
    session.begin(snapshot(), &mut rng).unwrap();
    session.apply_response(scenario_response());
    // clear the text side so only the audio poller runs
    session.apply(SessionEvent {
        epoch: session.epoch(),
        kind: EventKind::PromptReady("p".into()),
    });
    session.apply(SessionEvent {
        epoch: session.epoch(),
        kind: EventKind::LyricsReady("l".into()),
    });

    let (tx, mut rx) = mpsc::channel::<SessionEvent>(16);
    let mut pollers = Pollers::new();
    pollers.reconcile(&session, &source, &tx);
    settle().await;

    tokio::time::advance(Duration::from_secs(9)).await;
    settle().await;
    assert!(rx.try_recv().is_err(), "no probe before the 10 s mark");
    assert_eq!(source.probes.load(Ordering::SeqCst), 0);

    tokio::time::advance(Duration::from_secs(1)).await;
    settle().await;
    let event = rx.try_recv().expect("probe at the 10 s mark");
    assert!(matches!(event.kind, EventKind::AudioReady));
}

#[tokio::test(start_paused = true)]
async fn new_submission_cancels_stale_pollers() {
    let source = Arc::new(FakeSource::default());
    source.set_audio_ready();

    let mut rng = StdRng::seed_from_u64(3);
    let mut session = Session::new("en");
    session.begin(snapshot(), &mut rng).unwrap();
    session.apply_response(scenario_response());

    let (tx, mut rx) = mpsc::channel::<SessionEvent>(16);
    let mut pollers = Pollers::new();
    pollers.reconcile(&session, &source, &tx);
    settle().await;

    // Let session A's audio poller fire and queue its event...
    tokio::time::advance(Duration::from_secs(11)).await;
    settle().await;

    // ...then start session B before the event is applied.
    session.begin(snapshot(), &mut rng).unwrap();
    pollers.reconcile(&session, &source, &tx);
    assert!(!pollers.audio_active());
    assert!(!pollers.text_active());

    // A's queued event is stale: applying it must not touch B's state.
    while let Ok(event) = rx.try_recv() {
        session.apply(event);
    }
    assert!(session.music.audio_url.is_empty());
    assert!(!session.music.pending);
    assert!(session.music.prompt.is_empty());

    // No orphaned timer delivers anything later either.
    tokio::time::advance(Duration::from_secs(60)).await;
    settle().await;
    assert!(rx.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn text_poller_retries_on_failure_until_ready() {
    let source = Arc::new(FakeSource::default());

    let mut rng = StdRng::seed_from_u64(4);
    let mut session = Session::new("en");
    session.begin(snapshot(), &mut rng).unwrap();
    session.apply_response(scenario_response());

    let (tx, mut rx) = mpsc::channel::<SessionEvent>(16);
    let mut pollers = Pollers::new();
    pollers.reconcile(&session, &source, &tx);
    settle().await;

    // Both fetches fail on the immediate check and on the next tick.
    tokio::time::advance(Duration::from_secs(5)).await;
    settle().await;
    assert!(rx.try_recv().is_err());
    assert!(source.text_fetches.load(Ordering::SeqCst) >= 4);

    source.set_prompt("late prompt");
    source.set_lyrics("late lyrics");
    tokio::time::advance(Duration::from_secs(5)).await;
    settle().await;

    let mut got_prompt = false;
    let mut got_lyrics = false;
    while let Ok(event) = rx.try_recv() {
        match &event.kind {
            EventKind::PromptReady(t) => {
                got_prompt = true;
                assert_eq!(t, "late prompt");
            }
            EventKind::LyricsReady(t) => {
                got_lyrics = true;
                assert_eq!(t, "late lyrics");
            }
            other => panic!("unexpected event {other:?}"),
        }
        session.apply(event);
    }
    assert!(got_prompt && got_lyrics);
    assert!(session.text_poll().is_none());
}

#[tokio::test(start_paused = true)]
async fn initial_fetch_is_a_latency_optimization_only() {
    let source = Arc::new(FakeSource::default());
    source.set_prompt("early prompt");
    // lyrics missing: the one-shot fetch only delivers the prompt

    let mut rng = StdRng::seed_from_u64(5);
    let mut session = Session::new("en");
    session.begin(snapshot(), &mut rng).unwrap();
    session.apply_response(scenario_response());

    let (tx, mut rx) = mpsc::channel::<SessionEvent>(16);
    let handle = spawn_initial_text_fetch(
        source.clone(),
        session.epoch(),
        "http://backend/output/run1/prompt.txt".to_string(),
        "http://backend/output/run1/lyrics.lrc".to_string(),
        tx.clone(),
    );
    handle.await.unwrap();

    let event = rx.try_recv().unwrap();
    assert!(matches!(event.kind, EventKind::PromptReady(_)));
    session.apply(event);
    assert!(!session.music.prompt_pending);
    assert!(session.music.lyrics_pending);
    assert!(rx.try_recv().is_err());

    // The periodic poller remains responsible for the lyrics.
    assert!(session.text_poll().is_some());
}

#[tokio::test(start_paused = true)]
async fn cancel_all_tears_down_every_task() {
    let source = Arc::new(FakeSource::default());

    let mut rng = StdRng::seed_from_u64(6);
    let mut session = Session::new("en");
    session.begin(snapshot(), &mut rng).unwrap();
    session.apply_response(scenario_response());

    let (tx, mut rx) = mpsc::channel::<SessionEvent>(16);
    let mut pollers = Pollers::new();
    pollers.reconcile(&session, &source, &tx);
    assert!(pollers.audio_active() && pollers.text_active());

    pollers.cancel_all();
    source.set_audio_ready();
    source.set_prompt("p");
    source.set_lyrics("l");
    tokio::time::advance(Duration::from_secs(120)).await;
    settle().await;
    assert!(rx.try_recv().is_err());
}
