use anyhow::{anyhow, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};

mod api;
mod app;
mod artifact;
mod config;
mod controller;
mod error;
mod history;
mod mood;
mod poller;
mod request;
#[cfg(test)]
mod testing;
mod types;

use app::{AppCommand, AppEvent, AppState};
use config::AppConfig;
use controller::{Controller, ControllerSettings};
use request::{GenerationForm, DEFAULT_DURATION_SECONDS, DEFAULT_TEMPO_BPM};
use types::{JobStatus, MoodSnapshot, MusicStyle};

#[derive(Debug, Parser)]
#[command(name = "moodwave", version, about = "Generate music from your current or a chosen mood")]
struct Cli {
    /// Base URL of the generation service, e.g. http://localhost:5000/api/v1/
    #[arg(long, global = true)]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Show the most recently detected mood
    Mood,
    /// Start a generation job and follow it until it finishes
    Generate(GenerateArgs),
    /// List recent generations, newest first
    History {
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Save the track of a completed job into the download directory
    Download { job_id: String },
}

#[derive(Debug, Args)]
struct GenerateArgs {
    /// Use the valence/arousal given here instead of the detected mood
    #[arg(long)]
    custom: bool,
    /// Custom valence (0-1); defaults to the detected mood, else 0.5
    #[arg(long)]
    valence: Option<f64>,
    /// Custom arousal (0-1); defaults to the detected mood, else 0.5
    #[arg(long)]
    arousal: Option<f64>,
    /// Track length in seconds (15-120)
    #[arg(long, default_value_t = DEFAULT_DURATION_SECONDS)]
    duration: u32,
    /// Tempo in BPM (60-180)
    #[arg(long, default_value_t = DEFAULT_TEMPO_BPM)]
    tempo: u32,
    /// auto, ambient, melodic or rhythmic
    #[arg(long, default_value_t = MusicStyle::Auto)]
    style: MusicStyle,
    /// Download the track once the job completes
    #[arg(long)]
    download: bool,
}

impl GenerateArgs {
    fn form(&self, current: Option<&MoodSnapshot>) -> GenerationForm {
        let form = if self.custom {
            let seed = mood::seed_custom(current);
            GenerationForm::custom(
                self.valence.unwrap_or(seed.valence),
                self.arousal.unwrap_or(seed.arousal),
            )
        } else {
            GenerationForm::from_current_mood()
        };
        form.with_duration(self.duration).with_tempo(self.tempo).with_style(self.style)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_tracing()?;
    let cli = Cli::parse();

    let mut config = AppConfig::load()?;
    if let Some(url) = cli.api_url.as_deref() {
        config.set_api_url(url);
    }
    info!(api_url = config.api_url(), "starting moodwave");

    let client = api::Client::new(Some(config.api_url()), config.auth_token().map(str::to_string))?;

    let mut settings = ControllerSettings::from_config(&config);
    if let Command::History { limit: Some(limit) } = &cli.command {
        settings.history_limit = history::clamp_limit(*limit);
    }

    let (event_tx, mut event_rx) = unbounded_channel();
    let controller = Controller::new(Arc::new(client.clone()), event_tx, settings);

    let mut app = AppState::new();
    seed_health_status(&client, &mut app).await;
    print_notices(&mut app);

    let result = match cli.command {
        Command::Mood => show_mood(&controller, &mut app, &mut event_rx).await,
        Command::Generate(args) => generate(&controller, &args, &mut app, &mut event_rx).await,
        Command::History { .. } => show_history(&controller, &mut app, &mut event_rx).await,
        Command::Download { job_id } => {
            let outcome = controller.download(&job_id).await;
            drain_events(&mut app, &mut event_rx);
            outcome.map(|_| ()).map_err(Into::into)
        }
    };
    print_notices(&mut app);
    result
}

async fn seed_health_status(client: &api::Client, app: &mut AppState) {
    match client.health().await {
        Ok(body) => {
            let status = body.get("status").and_then(Value::as_str).unwrap_or("unknown");
            debug!(status, "service health");
            app.handle_event(AppEvent::Info(format!(
                "Service health: {status} @ {}",
                client.base_url()
            )));
        }
        Err(err) => {
            warn!("service health check failed: {err}");
            app.handle_event(AppEvent::Info(format!("Service health unknown: {err}")));
        }
    }
}

async fn show_mood(
    controller: &Controller,
    app: &mut AppState,
    event_rx: &mut UnboundedReceiver<AppEvent>,
) -> Result<()> {
    let mood = controller.load_current_mood().await;
    drain_events(app, event_rx);
    print_notices(app);
    if let Some(snapshot) = mood {
        let when = snapshot
            .timestamp
            .map(|ts| ts.format("%Y-%m-%d %H:%M:%S UTC").to_string())
            .unwrap_or_else(|| "unknown time".to_string());
        println!(
            "valence {:.2}, arousal {:.2} ({}; detected {when})",
            snapshot.valence,
            snapshot.arousal,
            snapshot.source.as_deref().unwrap_or("unknown source")
        );
    }
    println!("{}", mood::current_mood_label(app.mood.as_ref()));
    Ok(())
}

async fn show_history(
    controller: &Controller,
    app: &mut AppState,
    event_rx: &mut UnboundedReceiver<AppEvent>,
) -> Result<()> {
    let outcome = controller.refresh_history().await;
    drain_events(app, event_rx);
    print_notices(app);
    let entries = outcome?;
    if entries.is_empty() {
        println!("No generations yet");
    }
    for entry in entries {
        println!(
            "{}  {:<10}  {}  {}",
            entry.created_at.format("%Y-%m-%d %H:%M"),
            entry.status,
            entry.job_id,
            entry.parameters.summary()
        );
    }
    Ok(())
}

enum Flow {
    Continue,
    Done,
    Failed(String),
}

async fn generate(
    controller: &Controller,
    args: &GenerateArgs,
    app: &mut AppState,
    event_rx: &mut UnboundedReceiver<AppEvent>,
) -> Result<()> {
    controller.load_current_mood().await;
    drain_events(app, event_rx);
    print_notices(app);

    let form = args.form(app.mood.as_ref());
    if !app.can_generate(form.use_current_mood) {
        return Err(error::ValidationError::NoCurrentMood.into());
    }
    println!("Mood: {}", form.mood_label(app.mood.as_ref()));

    let (command_tx, command_rx) = unbounded_channel();
    let handle = controller.spawn(command_rx);
    let result = follow_generation(form, args.download, &command_tx, app, event_rx).await;
    controller.shutdown();
    let _ = handle.await;
    result
}

async fn follow_generation(
    form: GenerationForm,
    download: bool,
    command_tx: &UnboundedSender<AppCommand>,
    app: &mut AppState,
    event_rx: &mut UnboundedReceiver<AppEvent>,
) -> Result<()> {
    command_tx.send(AppCommand::Submit(form))?;

    let mut interrupted = false;
    loop {
        let event = tokio::select! {
            event = event_rx.recv() => match event {
                Some(event) => event,
                None => return Err(anyhow!("controller stopped unexpectedly")),
            },
            _ = tokio::signal::ctrl_c() => {
                if interrupted {
                    return Ok(());
                }
                interrupted = true;
                command_tx.send(AppCommand::CancelActive)?;
                continue;
            }
        };

        let flow = match &event {
            AppEvent::SubmissionFailed(message) => Flow::Failed(message.clone()),
            AppEvent::JobFinished { job } => match job.status {
                JobStatus::Completed if download => {
                    command_tx.send(AppCommand::Download { job_id: job.job_id.clone() })?;
                    Flow::Continue
                }
                JobStatus::Completed => Flow::Done,
                _ => Flow::Failed(
                    job.error_message.clone().unwrap_or_else(|| "Generation failed".to_string()),
                ),
            },
            AppEvent::JobCancelled { .. } | AppEvent::ArtifactSaved(_) => Flow::Done,
            AppEvent::PollingStopped { message, .. } | AppEvent::DownloadFailed { message, .. } => {
                Flow::Failed(message.clone())
            }
            _ => Flow::Continue,
        };

        app.handle_event(event);
        print_notices(app);
        match flow {
            Flow::Continue => {}
            Flow::Done => return Ok(()),
            Flow::Failed(message) => return Err(anyhow!(message)),
        }
    }
}

fn drain_events(app: &mut AppState, event_rx: &mut UnboundedReceiver<AppEvent>) {
    while let Ok(event) = event_rx.try_recv() {
        app.handle_event(event);
    }
}

fn print_notices(app: &mut AppState) {
    for line in app.drain_notices() {
        println!("{line}");
    }
}

fn setup_tracing() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .try_init()
        .map_err(|err: Box<dyn std::error::Error + Send + Sync>| {
            anyhow!("failed to initialise tracing: {err}")
        })?;
    Ok(())
}
