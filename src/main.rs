//! Application entry point: Global Foreman.
//!
//! # Startup sequence
//!
//! 1. Parse the command line.
//! 2. Initialise logging.
//! 3. Load [`AppConfig`] (defaults on first run).
//! 4. Open the credential vault; a `--api-key` / `GEMINI_API_KEY` value is
//!    used for this process only.
//! 5. Run the subcommand, or the interactive session when none is given.
//!    The interactive session probes for the Whisper model and the
//!    synthesizer command and runs without them when absent.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};

use global_foreman::{
    app::{render_state, TerminalApp},
    config::{AppConfig, AppPaths, CredentialVault, FileCredentialStore},
    environment::{BrowserEnvironment, RedirectAffordance, MANUAL_INSTRUCTIONS},
    llm::{CompletionClient, GeminiClient, GenerationMode},
    pipeline::{new_shared_state, PipelineOrchestrator, RequestState},
    speech::{
        CommandSynthesizer, SpeechInput, SpeechOutput, SpeechRecognizer, SpeechSynthesizer,
        VoiceSettings, WhisperRecognizer,
    },
};

// ---------------------------------------------------------------------------
// Command line
// ---------------------------------------------------------------------------

#[derive(Debug, Parser)]
#[command(
    name = "global-foreman",
    version,
    about = "Korean site-order safety translator and dream interpreter"
)]
struct Cli {
    /// Alternative settings.toml.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// API key for this run only; never written to disk.
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true, global = true)]
    api_key: Option<String>,

    /// Override the configured mode.
    #[arg(long, value_enum, global = true)]
    mode: Option<ModeArg>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModeArg {
    Safety,
    Dream,
}

impl From<ModeArg> for GenerationMode {
    fn from(arg: ModeArg) -> Self {
        match arg {
            ModeArg::Safety => GenerationMode::SafetyOrder,
            ModeArg::Dream => GenerationMode::DreamInterpretation,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Send one request and print the result.
    Ask {
        /// Korean text to translate or interpret.
        #[arg(required = true)]
        text: Vec<String>,
    },
    /// Manage the stored API key.
    Key {
        #[command(subcommand)]
        action: KeyAction,
    },
    /// Classify a user-agent string and print the redirect to offer.
    Probe {
        user_agent: String,
        #[arg(long, default_value = "https://global-foreman.example/")]
        url: String,
    },
    /// Write a settings.toml with default values if none exists.
    Init,
}

#[derive(Debug, Subcommand)]
enum KeyAction {
    Set { value: String },
    Clear,
    Show,
}

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let paths = AppPaths::new();
    let loaded = match cli.config.as_deref() {
        Some(path) => AppConfig::load_from(path),
        None => AppConfig::load(),
    };
    let mut config = loaded.unwrap_or_else(|e| {
        log::warn!("Failed to load config ({e}); using defaults");
        AppConfig::default()
    });
    if let Some(mode) = cli.mode {
        config.mode = mode.into();
    }

    let vault = CredentialVault::open(Box::new(FileCredentialStore::new(&paths.credential_file)));
    if let Some(key) = cli.api_key.as_deref() {
        if let Err(e) = vault.set_session_key(key) {
            log::warn!("ignoring --api-key: {e}");
        }
    }

    match cli.command {
        Some(Command::Key { action }) => manage_key(&vault, action),
        Some(Command::Probe { user_agent, url }) => {
            probe(&user_agent, &url);
            Ok(())
        }
        Some(Command::Init) => init_config(cli.config.as_deref(), &paths),
        Some(Command::Ask { text }) => {
            let rt = build_runtime()?;
            rt.block_on(ask(&config, vault, &text.join(" ")))
        }
        None => {
            let rt = build_runtime()?;
            let _guard = rt.enter();
            let orchestrator = interactive_orchestrator(&config, &paths, vault);
            rt.block_on(TerminalApp::new(orchestrator).run())
        }
    }
}

fn build_runtime() -> anyhow::Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .context("failed to create tokio runtime")
}

// ---------------------------------------------------------------------------
// Subcommands
// ---------------------------------------------------------------------------

fn manage_key(vault: &CredentialVault, action: KeyAction) -> anyhow::Result<()> {
    match action {
        KeyAction::Set { value } => {
            vault.replace(&value)?;
            println!("API 키가 저장되었습니다.");
        }
        KeyAction::Clear => {
            vault.invalidate()?;
            println!("API 키가 삭제되었습니다.");
        }
        KeyAction::Show => match vault.current() {
            Some(key) => println!("{}", key.masked()),
            None => println!("저장된 API 키가 없습니다."),
        },
    }
    Ok(())
}

fn probe(user_agent: &str, url: &str) {
    let env = BrowserEnvironment::from_user_agent(user_agent);
    println!("restricted in-app browser: {}", env.is_restricted_in_app_browser());
    println!("android: {}", env.is_android());
    println!("ios: {}", env.is_ios());
    match env.redirect_affordance(url) {
        RedirectAffordance::None => println!("redirect: none"),
        RedirectAffordance::OpenInChrome(intent) => println!("redirect: {intent}"),
        RedirectAffordance::ManualInstructions => println!("redirect:\n{MANUAL_INSTRUCTIONS}"),
    }
}

fn init_config(custom: Option<&Path>, paths: &AppPaths) -> anyhow::Result<()> {
    let path = custom.unwrap_or(paths.settings_file.as_path());
    if path.exists() {
        println!("{} already exists", path.display());
        return Ok(());
    }
    let defaults = AppConfig::default();
    let written = match custom {
        Some(path) => defaults.save_to(path),
        None => defaults.save(),
    };
    written.with_context(|| format!("failed to write {}", path.display()))?;
    println!("wrote {}", path.display());
    Ok(())
}

async fn ask(config: &AppConfig, vault: CredentialVault, text: &str) -> anyhow::Result<()> {
    let client: Arc<dyn CompletionClient> = Arc::new(GeminiClient::from_config(&config.api));
    let orchestrator = PipelineOrchestrator::new(new_shared_state(config.mode), client, vault);

    orchestrator.submit(text).await;
    let state = orchestrator.request_state();
    print!("{}", render_state(&state));

    if let RequestState::Failed(detail) = state {
        anyhow::bail!(detail.message);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Interactive session
// ---------------------------------------------------------------------------

fn interactive_orchestrator(
    config: &AppConfig,
    paths: &AppPaths,
    vault: CredentialVault,
) -> PipelineOrchestrator {
    let client: Arc<dyn CompletionClient> = Arc::new(GeminiClient::from_config(&config.api));

    let model_path = config.speech_input.model_path(paths);
    let recognizer: Option<Arc<dyn SpeechRecognizer>> =
        match WhisperRecognizer::load(&model_path, config.speech_input.clone()) {
            Ok(engine) => Some(Arc::new(engine)),
            Err(e) => {
                log::warn!("speech input disabled: {e}");
                None
            }
        };

    let synthesizer: Option<Arc<dyn SpeechSynthesizer>> = if config.speech_output.enabled {
        CommandSynthesizer::detect(&config.speech_output.command)
            .map(|s| Arc::new(s) as Arc<dyn SpeechSynthesizer>)
    } else {
        None
    };

    PipelineOrchestrator::new(new_shared_state(config.mode), client, vault)
        .with_speech_input(SpeechInput::new(recognizer, config.speech_input.locale.clone()))
        .with_speech_output(SpeechOutput::new(
            synthesizer,
            VoiceSettings::from(&config.speech_output),
        ))
}
