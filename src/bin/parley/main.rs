use std::io::Write;
use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{Shell, generate};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use parley::api::{ApiChoice, HttpApi};
use parley::audio::capture::Microphone;
use parley::coach::{Coach, DEFAULT_SCENARIO};
use parley::config::Config;
use parley::error::ParleyError;
use parley::session::{Role, UiEvent};
use parley::settings::{InputMode, Settings, SettingsStore, SettingsUpdate};

type App = Coach<HttpApi, Microphone>;

#[derive(Parser)]
#[command(
    name = "parley",
    about = "Practice workplace conversations with a coach",
    long_about = "Parley is a terminal client for a conversation-coaching server. \
        It walks you through scripted scenarios stage by stage, lets you answer \
        by typing or by speaking into the microphone, and reports the coach's \
        feedback and final score."
)]
struct Cli {
    /// Path to config file
    ///
    /// Defaults to ~/.config/parley/config.yaml if not specified.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Coaching server base URL (overrides server.base_url)
    #[arg(long, global = true)]
    server: Option<String>,

    /// Enable verbose logging
    ///
    /// Sets the log level to debug for the parley crate, showing request
    /// URLs, stage transitions and audio buffer accounting.
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run an interactive coaching session
    ///
    /// Typed lines are sent as turns. Commands: /start [scenario],
    /// /record, /reset, /mode chat|voice, /quit. In voice mode an empty
    /// line records a spoken turn.
    Chat {
        /// Scenario to practice
        #[arg(long, default_value = DEFAULT_SCENARIO)]
        scenario: String,

        /// Model backend the server should use (gemini, openai)
        #[arg(long, default_value = "gemini")]
        api: ApiChoice,
    },

    /// Record once and print the transcript
    Voice {
        /// Seconds to record (defaults to the saved record duration)
        #[arg(long)]
        seconds: Option<u32>,
    },

    /// Show or change persisted settings
    ///
    /// Without flags, prints the current settings.
    Settings {
        /// Session timeout in seconds (0 restores the default)
        #[arg(long)]
        timeout: Option<u32>,

        /// Voice recording length in seconds (0 restores the default)
        #[arg(long)]
        record_seconds: Option<u32>,

        /// Read agent replies aloud
        #[arg(long)]
        tts: Option<Toggle>,

        /// Default input mode (chat, voice)
        #[arg(long)]
        mode: Option<InputMode>,
    },

    /// List available audio input devices
    Devices,

    /// Generate shell completions
    ///
    /// Prints a completion script for the given shell to stdout.
    Completions {
        /// Shell to generate completions for (bash, zsh, fish, elvish, powershell)
        shell: Shell,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Toggle {
    On,
    Off,
}

fn load_config(cli: &Cli) -> Result<Config, ParleyError> {
    let path = cli.config.clone().unwrap_or_else(Config::default_path);
    let mut config = Config::load(&path)?;
    if let Some(ref server) = cli.server {
        config.server.base_url.clone_from(server);
    }
    Ok(config)
}

fn build_app(cli: &Cli) -> Result<App, ParleyError> {
    let config = load_config(cli)?;
    let api = HttpApi::new(&config.server)?;
    let mic = Microphone::new(&config.audio);
    let store = SettingsStore::new(config.settings_path());
    tracing::debug!(
        "server {}, settings at {}",
        api.base_url(),
        store.path().display()
    );
    Ok(Coach::new(config, store, api, mic))
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("parley=debug,info")
    } else {
        EnvFilter::new("parley=info,warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli) {
        tracing::error!("{e}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), ParleyError> {
    match cli.command {
        Command::Devices => run_devices(),
        Command::Completions { shell } => {
            generate(shell, &mut Cli::command(), "parley", &mut std::io::stdout());
            Ok(())
        }
        Command::Settings {
            timeout,
            record_seconds,
            tts,
            mode,
        } => {
            let update = SettingsUpdate {
                timeout_seconds: timeout,
                record_seconds,
                tts_enabled: tts.map(|t| matches!(t, Toggle::On)),
                input_mode: mode,
            };
            run_settings(&cli, update)
        }
        Command::Chat {
            ref scenario,
            api,
        } => {
            let app = build_app(&cli)?;
            runtime()?.block_on(run_chat(app, scenario, api))
        }
        Command::Voice { seconds } => {
            let app = build_app(&cli)?;
            runtime()?.block_on(run_voice(app, seconds))
        }
    }
}

fn runtime() -> Result<tokio::runtime::Runtime, ParleyError> {
    Ok(tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?)
}

fn run_devices() -> Result<(), ParleyError> {
    let devices = parley::audio::capture::list_input_devices()?;
    let default_name = parley::audio::capture::default_input_device_name();

    if devices.is_empty() {
        println!("No audio input devices found.");
        return Ok(());
    }

    for (i, name) in devices.iter().enumerate() {
        let marker = if default_name.as_deref() == Some(name.as_str()) {
            " (default)"
        } else {
            ""
        };
        println!("  {}: {name}{marker}", i + 1);
    }
    Ok(())
}

fn run_settings(cli: &Cli, update: SettingsUpdate) -> Result<(), ParleyError> {
    let mut app = build_app(cli)?;
    if !update.is_empty() {
        app.update_settings(update)?;
        println!("Settings saved.");
    }
    print_settings(app.settings());
    Ok(())
}

fn print_settings(settings: &Settings) {
    println!("timeout:        {}s", settings.timeout_seconds);
    println!("record seconds: {}s", settings.record_seconds());
    println!(
        "tts:            {}",
        if settings.tts_enabled { "on" } else { "off" }
    );
    println!("input mode:     {}", settings.input_mode.label());
}

async fn run_voice(mut app: App, seconds: Option<u32>) -> Result<(), ParleyError> {
    app.seed_record_default().await;
    let secs = seconds.unwrap_or_else(|| app.record_seconds());

    eprintln!("Recording {secs} seconds...");
    match app.transcribe_capture(secs).await? {
        Some(transcript) if !transcript.is_empty() => println!("{transcript}"),
        _ => eprintln!("No speech detected."),
    }
    Ok(())
}

async fn run_chat(mut app: App, scenario: &str, api: ApiChoice) -> Result<(), ParleyError> {
    app.seed_record_default().await;
    render(&app.reset());
    render(&[UiEvent::Mode(app.settings().input_mode)]);
    println!("Type /start to begin, /quit to leave.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        prompt_marker(&app)?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();

        let events = match line.split_once(' ').unwrap_or((line, "")) {
            ("/quit" | "/exit", _) => break,
            ("/start", rest) => {
                let scenario = if rest.trim().is_empty() {
                    scenario
                } else {
                    rest.trim()
                };
                app.start(scenario, api).await
            }
            ("/record", _) => app.record().await,
            ("/reset", _) => app.reset(),
            ("/mode", rest) => match rest.parse::<InputMode>().and_then(|m| app.set_mode(m)) {
                Ok(events) => events,
                Err(e) => vec![UiEvent::Notice(e.to_string())],
            },
            ("", _) if app.settings().input_mode == InputMode::Voice => app.record().await,
            ("", _) => Vec::new(),
            (cmd, _) if cmd.starts_with('/') => {
                vec![UiEvent::Notice(format!("unknown command: {cmd}"))]
            }
            _ if !app.session().can_send() => {
                vec![UiEvent::Notice("No active session. Type /start first.".to_string())]
            }
            _ => app.send(line).await,
        };
        render(&events);
    }

    Ok(())
}

fn prompt_marker(app: &App) -> Result<(), ParleyError> {
    let marker = match app.settings().input_mode {
        InputMode::Chat => "> ",
        InputMode::Voice => "(enter to speak) > ",
    };
    print!("{marker}");
    std::io::stdout().flush()?;
    Ok(())
}

fn render(events: &[UiEvent]) {
    for event in events {
        match event {
            UiEvent::Bubble { role, text } => {
                let who = match role {
                    Role::User => "you",
                    Role::Agent => "sarah",
                    Role::Coach => "coach",
                };
                println!("[{}] {who:>5} | {text}", chrono::Local::now().format("%H:%M:%S"));
            }
            // The terminal has no voice; surface it in the debug log only.
            UiEvent::Speak(text) => tracing::debug!("speak: {text}"),
            UiEvent::Status(status) => println!("   status | {status}"),
            UiEvent::Stage(stage) => println!(
                "    stage | {}/{} {}",
                stage.index, stage.total, stage.title
            ),
            UiEvent::Score(score) => println!("    score | {score}"),
            UiEvent::ScoreNote(note) | UiEvent::Notice(note) => println!("          | {note}"),
            UiEvent::InputEnabled(false) => {
                println!("          | Input closed. /reset or /start to go again.");
            }
            UiEvent::InputEnabled(true) => {}
            UiEvent::ClearTranscript => println!("{}", "-".repeat(60)),
            UiEvent::Mode(mode) => println!("     mode | {}", mode.label()),
        }
    }
}
