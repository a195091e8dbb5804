use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use clap::{Args, Parser, Subcommand};
use tokio::sync::mpsc;

use inkwave::poll::spawn_initial_text_fetch;
use inkwave::{
    Artboard, FontStore, Pollers, Session, SessionEvent, StudioClient, TextBox, flatten, layout,
};

#[derive(Parser, Debug)]
#[command(name = "inkwave", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Flatten an artboard into its submission JPEG and preview PNG.
    Flatten(FlattenArgs),
    /// Flatten, submit to the backend, then wait for every requested
    /// artifact to become ready.
    Generate(GenerateArgs),
}

#[derive(Args, Debug)]
struct BoardArgs {
    /// Background raster (any format the `image` crate decodes).
    #[arg(long)]
    background: PathBuf,

    /// Ink layer raster; must match the background dimensions.
    #[arg(long)]
    ink: Option<PathBuf>,

    /// Waveform strip raster, appended below the submission image.
    #[arg(long)]
    strip: Option<PathBuf>,

    /// Mark the strip as backed by user-supplied audio.
    #[arg(long, default_value_t = false)]
    user_audio: bool,

    /// Text boxes sidecar JSON (a list of {origin, text, style}).
    #[arg(long)]
    text: Option<PathBuf>,

    /// Font file, repeatable, as `Family=path/to.ttf` or a bare path
    /// (family defaults to the file stem). The first one is the fallback.
    #[arg(long = "font")]
    fonts: Vec<String>,
}

#[derive(Args, Debug)]
struct FlattenArgs {
    #[command(flatten)]
    board: BoardArgs,

    /// Output JPEG path (the backend submission image).
    #[arg(long)]
    out_jpeg: PathBuf,

    /// Output PNG path (the on-screen preview image).
    #[arg(long)]
    out_png: PathBuf,
}

#[derive(Args, Debug)]
struct GenerateArgs {
    #[command(flatten)]
    board: BoardArgs,

    /// Backend base URL.
    #[arg(long)]
    backend: String,

    /// Language code passed to the backend.
    #[arg(long, default_value = "en")]
    language: String,

    #[arg(long, default_value_t = false)]
    no_tags: bool,

    #[arg(long, default_value_t = false)]
    no_music: bool,

    #[arg(long, default_value_t = false)]
    no_images: bool,

    /// Download the finished track to this path once it is ready.
    #[arg(long)]
    save_audio: Option<PathBuf>,
}

fn load_board(args: &BoardArgs) -> anyhow::Result<(Artboard, FontStore)> {
    let background = image::open(&args.background)
        .with_context(|| format!("reading background {}", args.background.display()))?
        .to_rgba8();
    let mut board = Artboard::new(background)?;

    if let Some(path) = &args.ink {
        board.ink = image::open(path)
            .with_context(|| format!("reading ink layer {}", path.display()))?
            .to_rgba8();
    }
    if let Some(path) = &args.strip {
        board.wave_strip = Some(
            image::open(path)
                .with_context(|| format!("reading wave strip {}", path.display()))?
                .to_rgba8(),
        );
    }
    board.has_user_audio = args.user_audio;

    if let Some(path) = &args.text {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading text boxes {}", path.display()))?;
        let boxes: Vec<TextBox> = serde_json::from_str(&raw)
            .with_context(|| format!("parsing text boxes {}", path.display()))?;
        board.text_boxes = boxes;
    }

    let mut fonts = FontStore::new();
    for spec in &args.fonts {
        let (family, path) = match spec.split_once('=') {
            Some((family, path)) => (family.to_string(), PathBuf::from(path)),
            None => {
                let path = PathBuf::from(spec);
                let family = path
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "default".to_string());
                (family, path)
            }
        };
        let bytes =
            std::fs::read(&path).with_context(|| format!("reading font {}", path.display()))?;
        fonts.register_bytes(family, bytes)?;
    }

    Ok((board, fonts))
}

fn run_flatten(args: FlattenArgs) -> anyhow::Result<()> {
    let (board, fonts) = load_board(&args.board)?;
    let flat = flatten(&board, &fonts)?;
    std::fs::write(&args.out_jpeg, &flat.submission_jpeg)
        .with_context(|| format!("writing {}", args.out_jpeg.display()))?;
    std::fs::write(&args.out_png, &flat.preview_png)
        .with_context(|| format!("writing {}", args.out_png.display()))?;
    println!(
        "wrote {} ({} bytes) and {} ({} bytes)",
        args.out_jpeg.display(),
        flat.submission_jpeg.len(),
        args.out_png.display(),
        flat.preview_png.len()
    );
    Ok(())
}

fn print_results(session: &Session, rng: &mut impl rand::Rng) {
    if !session.tags.is_empty() {
        println!("tags:");
        let visible = layout::page(&session.tags, 0);
        for (i, tag) in visible.iter().enumerate() {
            let p = layout::scatter(i, visible.len(), 50.0, 30.0, 1.4, 0.9, rng);
            println!("  {tag}  ({:.1}, {:.1})", p.x, p.y);
        }
    }
    if !session.images.is_empty() {
        println!("images:");
        let visible = layout::page(&session.images, 0);
        for (i, url) in visible.iter().enumerate() {
            let pl = layout::scatter_rotated(i, visible.len(), 50.0, 30.0, 1.4, 0.9, rng);
            println!(
                "  {url}  ({:.1}, {:.1}) rot {}°",
                pl.x, pl.y, pl.rotation_deg
            );
        }
    }
}

async fn run_generate(args: GenerateArgs) -> anyhow::Result<()> {
    let (board, fonts) = load_board(&args.board)?;
    let client = Arc::new(StudioClient::new(&args.backend)?);
    let mut rng = rand::thread_rng();

    let mut session = Session::new(args.language.clone());
    if args.no_tags && !session.modalities.set_tags(false) {
        anyhow::bail!("at least one of tags/music/images must stay enabled");
    }
    if args.no_music && !session.modalities.set_music(false) {
        anyhow::bail!("at least one of tags/music/images must stay enabled");
    }
    if args.no_images && !session.modalities.set_images(false) {
        anyhow::bail!("at least one of tags/music/images must stay enabled");
    }

    let flat = flatten(&board, &fonts)?;
    session.begin(flat.snapshot, &mut rng)?;
    println!("{}…", session.loading_phrase);

    let modes = session.modalities.modes_csv();
    let language = session.language.clone();
    let (tx, mut rx) = mpsc::channel::<SessionEvent>(64);

    let gen_fut = client.generate(flat.submission_jpeg, &modes, &language);
    tokio::pin!(gen_fut);
    let mut phrase_tick = tokio::time::interval(Duration::from_secs(3));
    phrase_tick.tick().await;

    let outcome = loop {
        tokio::select! {
            r = &mut gen_fut => break r,
            _ = phrase_tick.tick() => {
                session.roll_loading_phrase(&mut rng);
                println!("{}…", session.loading_phrase);
            }
        }
    };

    match outcome {
        Ok(resp) => {
            if let Some(music) = &resp.music {
                if music.pending {
                    spawn_initial_text_fetch(
                        client.clone(),
                        session.epoch(),
                        music.prompt_url.clone(),
                        music.lyrics_url.clone(),
                        tx.clone(),
                    );
                }
            }
            session.apply_response(resp);
        }
        Err(err) => {
            tracing::warn!(%err, "generation failed; showing whatever arrived");
        }
    }
    session.finish();
    print_results(&session, &mut rng);

    let mut pollers = Pollers::new();
    pollers.reconcile(&session, &client, &tx);
    while session.audio_poll().is_some() || session.text_poll().is_some() {
        let Some(event) = rx.recv().await else { break };
        match &event.kind {
            inkwave::EventKind::AudioReady => println!("audio ready"),
            inkwave::EventKind::PromptReady(_) => println!("prompt ready"),
            inkwave::EventKind::LyricsReady(_) => println!("lyrics ready"),
        }
        session.apply(event);
        pollers.reconcile(&session, &client, &tx);
    }
    pollers.cancel_all();

    if !session.music.prompt.is_empty() {
        println!("prompt: {}", session.music.prompt.trim());
    }
    if !session.music.lyrics.is_empty() {
        println!("lyrics: {} lines", session.music.lyrics.lines().count());
    }
    if !session.music.audio_url.is_empty() {
        println!("audio: {}", session.music.audio_url);
        if let Some(path) = &args.save_audio {
            let bytes = client.download_audio(&session.music.audio_url).await?;
            std::fs::write(path, &bytes)
                .with_context(|| format!("writing {}", path.display()))?;
            println!("saved {} bytes to {}", bytes.len(), path.display());
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Flatten(args) => run_flatten(args),
        Command::Generate(args) => run_generate(args).await,
    }
}
