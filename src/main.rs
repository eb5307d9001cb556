use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use ole_bot::application::errors::{BotError, ConfigError};
use ole_bot::application::messaging::EventDispatcher;
use ole_bot::application::services::{ChatService, MessageService};
use ole_bot::domain::entities::Command;
use ole_bot::domain::ratelimit::RateLimiter;
use ole_bot::domain::resolver::CommandResolver;
use ole_bot::infrastructure::adapters::{ConsoleAdapter, TelegramAdapter};
use ole_bot::infrastructure::config::Config;
use ole_bot::infrastructure::llm::{LLMError, OpenAiProvider, LLM};

#[derive(Parser)]
#[command(name = "ole-bot")]
#[command(about = "Telegram front end for a language model", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Bot token (overrides config and environment)
    #[arg(short, long)]
    token: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the bot
    Run {
        /// Read messages from stdin even when a token is configured
        #[arg(long)]
        console: bool,

        /// Username of the console sender
        #[arg(long, default_value = "console")]
        user: String,
    },
    /// Show version
    Version,
    /// Generate default config
    InitConfig,
    /// Show how a command token would be resolved
    Resolve {
        /// Command token without the prefix
        token: String,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run { console, user } => run_bot(&cli.config, cli.token, console, user),
        Commands::Version => {
            println!("ole-bot v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Commands::InitConfig => init_config(),
        Commands::Resolve { token } => resolve(&token),
    };

    if let Err(e) = result {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

fn run_bot(config_path: &Path, token_override: Option<String>, console: bool, user: String) -> Result<(), BotError> {
    let mut config = Config::load_layered(config_path)?;
    if token_override.is_some() {
        config.telegram.token = token_override;
    }

    tracing::info!("Starting ole-bot: {}", config.bot.name);

    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| BotError::Internal(format!("Failed to start runtime: {}", e)))?;

    let result = runtime.block_on(async move {
        let shutdown = CancellationToken::new();
        tokio::spawn(cancel_on_signal(shutdown.clone()));

        let dispatcher = Arc::new(build_dispatcher(&config, shutdown.clone())?);

        let result = match config.telegram.token.as_deref() {
            Some(token) if !console => {
                let bot = TelegramAdapter::new(
                    token,
                    &config.bot.prefix,
                    Duration::from_secs(config.telegram.poll_timeout_seconds),
                )?
                .with_debug(config.telegram.debug);

                if let Err(e) = bot.register_commands(&dispatcher.resolver().commands()).await {
                    tracing::warn!("Failed to register bot commands: {}", e);
                }
                MessageService::new(bot, dispatcher.clone()).run(shutdown).await
            }
            _ => {
                if !console {
                    tracing::warn!("No Telegram token configured, reading messages from stdin");
                }
                let bot = ConsoleAdapter::new(&config.bot.prefix, user);
                MessageService::new(bot, dispatcher.clone()).run(shutdown).await
            }
        };

        if let Some(chat) = dispatcher.chat() {
            let stats = chat.limiter().stats();
            tracing::info!(
                admitted = stats.admitted,
                denied_per_user = stats.denied_per_user,
                denied_global = stats.denied_global,
                tracked_users = stats.tracked_users,
                "Admission totals"
            );
        }
        result
    });

    // A pending stdin read would otherwise hold the runtime open
    runtime.shutdown_timeout(Duration::from_secs(1));
    result
}

fn build_dispatcher(config: &Config, shutdown: CancellationToken) -> Result<EventDispatcher, BotError> {
    let mut dispatcher = EventDispatcher::new(Command::builtin())?
        .with_about(config.bot.about.clone())
        .with_timeout(config.dispatch.timeout())
        .with_shutdown(shutdown);

    match OpenAiProvider::new(&config.llm) {
        Ok(provider) => {
            tracing::info!("Using {} ({}) for /{}", provider.name(), config.llm.model, Command::GPT_MESSAGE);
            let chat = ChatService::new(Arc::new(provider), RateLimiter::new(config.rate_limit.opts()))
                .with_system_prompt(config.llm.system_prompt.clone());
            dispatcher = dispatcher.with_chat(chat);
        }
        Err(LLMError::MissingApiKey) => {
            tracing::warn!("OPENAI_API_KEY is not set, /{} is disabled", Command::GPT_MESSAGE);
        }
        Err(e) => return Err(ConfigError::InvalidValue(e.to_string()).into()),
    }

    Ok(dispatcher)
}

/// Cancel `shutdown` on SIGINT or SIGTERM
async fn cancel_on_signal(shutdown: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = terminate.recv() => {}
                }
            }
            Err(e) => {
                tracing::warn!("Failed to install SIGTERM handler: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    tracing::info!("Shutdown requested");
    shutdown.cancel();
}

fn init_config() -> Result<(), BotError> {
    let yaml = Config::default().to_yaml()?;
    println!("{}", yaml);
    println!("\nSave this to config.yaml and adjust as needed.");
    Ok(())
}

fn resolve(token: &str) -> Result<(), BotError> {
    let resolution = CommandResolver::builtin()?.resolve(token);

    match resolution.command() {
        Some(command) => println!("exact: {}", command.slash()),
        None if resolution.is_empty() => println!("no match"),
        None => {
            for command in &resolution.candidates {
                println!("candidate: {}", command.slash());
            }
        }
    }
    Ok(())
}
