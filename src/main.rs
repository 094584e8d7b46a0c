#![allow(clippy::uninlined_format_args)]

use anyhow::Result;
use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use selfheal::commands;
use selfheal::commands::cache::CacheCommands;
use selfheal::commands::step::StepCommands;
use selfheal::commands::utils::GlobalOptions;
use selfheal::errors::SelfhealError;
use selfheal::types::ActionType;
use selfheal::webdriver::BrowserType;

const EXIT_SUCCESS: i32 = 0;

#[derive(Parser)]
#[command(name = "selfheal")]
#[command(about = "Self-healing element resolution for recorded browser playbooks", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (default: ~/.selfheal/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Browser to drive (chrome or firefox)
    #[arg(short, long, global = true)]
    browser: Option<BrowserType>,

    /// Run the browser headless (true/false)
    #[arg(long, global = true)]
    headless: Option<bool>,

    /// WebDriver endpoint, e.g. http://localhost:9515
    #[arg(long, global = true)]
    webdriver_url: Option<String>,

    /// Set viewport size (WIDTHxHEIGHT, e.g., 1920x1080)
    #[arg(long, global = true)]
    viewport: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate ranked selectors for a captured element snapshot (offline)
    Generate {
        /// ElementSnapshot JSON file
        snapshot: PathBuf,
    },

    /// Inspect stored steps
    #[command(subcommand)]
    Step(StepCommands),

    /// Record the element at a viewport point as a step
    Capture {
        /// URL to open
        url: String,

        #[arg(long)]
        x: f64,

        #[arg(long)]
        y: f64,

        /// Action the recorded step performs
        #[arg(long, value_enum, default_value = "click")]
        action: ActionType,

        /// Write the step JSON here as well
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Resolve a stored step against a live page
    Resolve {
        /// URL to open
        url: String,

        /// Step, step array, or playbook JSON file
        step: PathBuf,

        /// Step id when the file holds several steps (default: the first)
        #[arg(long)]
        id: Option<String>,

        /// Override the step's action
        #[arg(long, value_enum)]
        action: Option<ActionType>,

        /// Perform the action after resolving
        #[arg(long)]
        perform: bool,
    },

    /// Run a playbook
    Run {
        /// Playbook JSON file
        playbook: PathBuf,

        /// Save healed selector rankings back into the playbook file
        #[arg(long)]
        write_back: bool,

        /// Start URL, overriding the playbook's own
        #[arg(long)]
        url: Option<String>,
    },

    /// Inspect or invalidate the site cache
    #[command(subcommand)]
    Cache(CacheCommands),

    /// Show the healing history stored in a playbook
    History {
        /// Playbook JSON file
        playbook: PathBuf,

        /// Only this step
        #[arg(long)]
        step: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    match run().await {
        Ok(()) => std::process::exit(EXIT_SUCCESS),
        Err(err) => {
            let selfheal_err: SelfhealError = err.into();

            // JSON on stdout for programmatic consumption
            let error_json = json!({
                "error": true,
                "kind": selfheal_err.kind(),
                "message": selfheal_err.to_string(),
                "exit_code": selfheal_err.exit_code()
            });
            println!(
                "{}",
                serde_json::to_string(&error_json).unwrap_or_else(|_| "{}".to_string())
            );

            eprintln!("Error: {}", selfheal_err);
            std::process::exit(selfheal_err.exit_code());
        }
    }
}

async fn run() -> Result<()> {
    // Logs go to stderr so stdout stays valid JSON
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "selfheal=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .init();

    let cli = Cli::parse();
    let options = GlobalOptions {
        config: cli.config,
        browser: cli.browser,
        headless: cli.headless,
        webdriver_url: cli.webdriver_url,
        viewport: cli.viewport,
    };

    match cli.command {
        Commands::Generate { snapshot } => commands::generate::handle_generate(snapshot).await?,

        Commands::Step(command) => commands::step::handle_step_command(command).await?,

        Commands::Capture {
            url,
            x,
            y,
            action,
            output,
        } => {
            let config = options.load_config()?;
            commands::capture::handle_capture(url, x, y, action, output, &config).await?
        }

        Commands::Resolve {
            url,
            step,
            id,
            action,
            perform,
        } => {
            let config = options.load_config()?;
            commands::resolve::handle_resolve(url, step, id, action, perform, &config).await?
        }

        Commands::Run {
            playbook,
            write_back,
            url,
        } => {
            let config = options.load_config()?;
            commands::run::handle_run(playbook, write_back, url, &config).await?
        }

        Commands::Cache(command) => {
            let config = options.load_config()?;
            commands::cache::handle_cache_command(command, &config).await?
        }

        Commands::History { playbook, step } => {
            commands::history::handle_history(playbook, step).await?
        }
    }

    Ok(())
}
