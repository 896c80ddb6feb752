mod client;
mod config;
mod conversation;
mod markdown;
mod tui;
mod ui;

use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Result, bail};
use clap::{CommandFactory, Parser};
use config::{ConfigFile, ResolvedConfig};
use conversation::TurnEvent;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    name = "askgpt",
    about = "Chat with an OpenAI-compatible model from the terminal",
    long_about = None,
)]
struct Args {
    /// Ask one question and print the reply (omit to enter interactive TUI mode)
    question: Option<String>,

    /// Profile to use from config file
    #[arg(short, long, env = "ASKGPT_PROFILE")]
    profile: Option<String>,

    /// Override endpoint URL
    #[arg(long, env = "ASKGPT_ENDPOINT")]
    endpoint: Option<String>,

    /// Override model name
    #[arg(short, long, env = "ASKGPT_MODEL")]
    model: Option<String>,

    /// Override API key (falls back to $API_KEY)
    #[arg(long, env = "ASKGPT_API_KEY")]
    api_key: Option<String>,

    /// Show timestamps on messages
    #[arg(long)]
    timestamps: bool,

    /// Write a default config file to ~/.config/askgpt/config.toml and exit
    #[arg(long)]
    init: bool,

    /// List available profiles and exit
    #[arg(long)]
    profiles: bool,

    /// Generate shell completions and print to stdout (bash, zsh, fish, elvish)
    #[arg(long, value_name = "SHELL")]
    completions: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing();

    // ── --init ────────────────────────────────────────────────────────────────
    if args.init {
        let path = ConfigFile::write_default_if_missing()?;
        println!("Config written to: {}", path.display());
        println!("Edit it, then run: askgpt");
        return Ok(());
    }

    // ── --completions ─────────────────────────────────────────────────────────
    if let Some(shell_name) = &args.completions {
        return generate_completions(shell_name);
    }

    let file = ConfigFile::load()?;

    // ── --profiles ────────────────────────────────────────────────────────────
    if args.profiles {
        print_profiles(&file);
        return Ok(());
    }

    let api_key = args
        .api_key
        .or_else(|| std::env::var("API_KEY").ok());
    let resolved = ResolvedConfig::resolve(
        &file,
        args.profile.as_deref(),
        args.endpoint.as_deref(),
        args.model.as_deref(),
        api_key.as_deref(),
    );

    if resolved.api_key.is_none() {
        println!("no api key");
        eprintln!("  Set API_KEY or ASKGPT_API_KEY, pass --api-key, or add api_key to");
        eprintln!("  profile '{}' in {}", resolved.profile_name, config::config_path().display());
        std::process::exit(1);
    }

    tracing::info!(
        profile = %resolved.profile_name,
        endpoint = %resolved.endpoint,
        model = %resolved.model,
        "configuration resolved"
    );

    // ── Single-shot mode (plain stdout, no TUI) ───────────────────────────────
    if let Some(question) = args.question {
        return run_single_shot(question, resolved, args.timestamps).await;
    }

    // ── Interactive TUI mode ──────────────────────────────────────────────────
    tui::run(resolved, args.timestamps).await
}

// ── Logging ───────────────────────────────────────────────────────────────────

fn init_tracing() {
    let env_filter = EnvFilter::try_from_env("ASKGPT_LOG")
        .unwrap_or_else(|_| EnvFilter::new("info"));

    match open_log_file() {
        Some((path, file)) => {
            tracing_subscriber::registry()
                .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
                .with(env_filter)
                .init();
            tracing::info!(path = %path.display(), "logging initialized");
        }
        // No log file: stay silent rather than write over the TUI
        None => tracing_subscriber::registry().with(env_filter).init(),
    }
}

fn open_log_file() -> Option<(PathBuf, std::fs::File)> {
    let dir = config::state_dir();
    std::fs::create_dir_all(&dir).ok()?;
    let path = dir.join("askgpt.log");
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .ok()?;
    Some((path, file))
}

// ── Single-shot mode ──────────────────────────────────────────────────────────

async fn run_single_shot(question: String, resolved: ResolvedConfig, timestamps: bool) -> Result<()> {
    if question.trim().is_empty() {
        bail!("question is empty");
    }

    let client = client::Client::from_resolved(&resolved)?;
    let (conversation, actor) = conversation::spawn(client, resolved.system_prompt.clone());

    let mut stdout = std::io::stdout();
    print!("{}", ui::question_block(&question, timestamps));
    stdout.flush()?;

    let mut turn = conversation.ask(question)?;
    let mut interrupted = false;
    let outcome = loop {
        let ev = tokio::select! {
            ev = turn.next() => ev,
            _ = tokio::signal::ctrl_c(), if !interrupted => {
                interrupted = true;
                turn.cancel();
                continue;
            }
        };
        match ev {
            Some(TurnEvent::Chunk(text)) => {
                print!("{text}");
                stdout.flush()?;
            }
            Some(TurnEvent::Finished { input_tokens, output_tokens }) => {
                print!("{}", ui::REPLY_END);
                tracing::info!(input_tokens, output_tokens, "single-shot reply finished");
                break Ok(());
            }
            Some(TurnEvent::Failed(e)) => {
                println!();
                break Err(anyhow::anyhow!(e));
            }
            Some(TurnEvent::Cancelled) => {
                print!("{}", ui::CANCELLED_BLOCK);
                break Ok(());
            }
            None => break Err(anyhow::anyhow!("conversation ended unexpectedly")),
        }
    };
    stdout.flush()?;

    drop(conversation);
    let _ = actor.await;
    outcome
}

// ── Profiles listing ──────────────────────────────────────────────────────────

fn print_profiles(file: &ConfigFile) {
    if file.profiles.is_empty() {
        println!("No profiles configured. Run `askgpt --init` to write a starter config.");
        return;
    }
    let mut entries: Vec<(&String, &config::Profile)> = file.profiles.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));
    println!();
    println!("  Profiles");
    for (name, p) in entries {
        let marker = if *name == file.default_profile { " ←" } else { "" };
        let key = if p.api_key.is_some() { "set" } else { "from environment" };
        println!("  {name}{marker}");
        println!("    endpoint  {}", p.endpoint);
        println!("    model     {}", p.model);
        println!("    api key   {key}");
        println!();
    }
}

// ── Shell completions ─────────────────────────────────────────────────────────

fn generate_completions(shell_name: &str) -> Result<()> {
    use clap_complete::{Shell, generate};

    let shell: Shell = match shell_name.to_lowercase().as_str() {
        "bash"    => Shell::Bash,
        "zsh"     => Shell::Zsh,
        "fish"    => Shell::Fish,
        "elvish"  => Shell::Elvish,
        _ => {
            eprintln!("Unknown shell: {shell_name}");
            eprintln!("Supported: bash, zsh, fish, elvish");
            std::process::exit(1);
        }
    };

    let mut cmd = Args::command();
    generate(shell, &mut cmd, "askgpt", &mut std::io::stdout());
    Ok(())
}
