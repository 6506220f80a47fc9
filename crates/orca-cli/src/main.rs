//! orca: interactive agent with tools and research delegation
//!
//! Usage:
//!   orca                  - Start the interactive REPL
//!   orca -e "<prompt>"    - Run one prompt and exit
//!   orca -f prompt.txt    - Run a prompt read from a file and exit
//!   orca --help           - Show help

mod cli;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use orca_core::agents::{delegation_tools, AgentFactory};
use orca_core::{Agent, AnthropicClient, Config, ToolRegistry};
use tracing_subscriber::EnvFilter;

/// Run mode
#[derive(Debug, PartialEq)]
enum RunMode {
    Repl,
    Execute(String),
    File(PathBuf),
    Help,
    Version,
}

/// Parsed command line
#[derive(Debug, PartialEq)]
struct Args {
    mode: RunMode,
    no_tools: bool,
    max_rounds: Option<usize>,
    model: Option<String>,
    verbose: bool,
}

fn parse_args(args: impl IntoIterator<Item = String>) -> anyhow::Result<Args> {
    let mut parsed = Args {
        mode: RunMode::Repl,
        no_tools: false,
        max_rounds: None,
        model: None,
        verbose: false,
    };
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--execute" | "-e" => {
                let prompt = args.next().context("--execute needs a prompt")?;
                parsed.mode = RunMode::Execute(prompt);
            }
            "--file" | "-f" => {
                let path = args.next().context("--file needs a path")?;
                parsed.mode = RunMode::File(PathBuf::from(path));
            }
            "--max-rounds" => {
                let value = args.next().context("--max-rounds needs a number")?;
                let rounds = value
                    .parse()
                    .with_context(|| format!("invalid --max-rounds value: {}", value))?;
                parsed.max_rounds = Some(rounds);
            }
            "--model" => parsed.model = Some(args.next().context("--model needs a model id")?),
            "--no-tools" => parsed.no_tools = true,
            "--verbose" | "-v" => parsed.verbose = true,
            "--help" | "-h" => return Ok(Args { mode: RunMode::Help, ..parsed }),
            "--version" | "-V" => return Ok(Args { mode: RunMode::Version, ..parsed }),
            other => bail!("unknown argument: {} (see --help)", other),
        }
    }

    Ok(parsed)
}

fn print_help() {
    println!("orca - conversational agent with tools and research delegation");
    println!();
    println!("Usage:");
    println!("  orca                      Start the interactive REPL");
    println!("  orca -e, --execute <text> Run one prompt and exit");
    println!("  orca -f, --file <path>    Run the prompt in a file and exit");
    println!();
    println!("Options:");
    println!("  --model <id>              Override the model");
    println!("  --max-rounds <n>          Limit tool rounds per request");
    println!("  --no-tools                Run without any tools");
    println!("  -v, --verbose             Debug logging");
    println!("  -h, --help                Show this help message");
    println!("  -V, --version             Show version");
    println!();
    println!("Environment Variables:");
    println!("  ANTHROPIC_API_KEY         API key (or LLM_API_KEY)");
    println!("  LLM_MODEL                 Model name (default: {})", orca_core::config::DEFAULT_MODEL);
    println!("  LLM_BASE_URL              Custom API endpoint");
    println!("  ORCA_MAX_ROUNDS           Tool round budget");
    println!("  ORCA_CONTEXT_WINDOW       Context window in tokens");
    println!("  ORCA_ENABLE_CACHING       Prompt caching hints (true/false)");
    println!("  ORCA_PARALLEL_TOOLS       Run tool batches concurrently (true/false)");
    println!("  EXA_API_KEY               Exa key for web_search (DuckDuckGo otherwise)");
    println!();
    println!("Settings are also read from ./{} when present.", orca_core::config::CONFIG_FILE);
}

fn init_tracing(mode: &RunMode, verbose: bool) -> anyhow::Result<()> {
    // keep log lines from interleaving with the REPL prompt
    let level = match (verbose, mode) {
        (true, _) => "debug",
        (false, RunMode::Repl) => "warn",
        (false, _) => "info",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.parse()?))
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

/// Build the interactive agent from configuration
fn build_agent(config: &Config, no_tools: bool) -> anyhow::Result<Agent> {
    let client = Arc::new(AnthropicClient::new(&config.llm).context("Failed to create model client")?);
    let factory = AgentFactory::from_config(client, config);

    let tools = if no_tools {
        ToolRegistry::new()
    } else {
        let base = orca_tools::default_tools()?;
        let delegation = delegation_tools(&factory, &base);
        base.extended(delegation)?
    };
    tracing::info!(tools = ?tools.tool_names(), "Registered tools");

    Ok(factory
        .builder(&config.agent.name)
        .system_prompt(&config.agent.system_prompt)
        .tools(tools)
        .max_rounds(config.agent.max_rounds)
        .build())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = parse_args(std::env::args().skip(1))?;

    match args.mode {
        RunMode::Help => {
            print_help();
            return Ok(());
        }
        RunMode::Version => {
            println!("orca {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        _ => {}
    }

    init_tracing(&args.mode, args.verbose)?;
    dotenvy::dotenv().ok();

    let mut config = Config::load().context("Config error")?;
    if let Some(model) = args.model {
        config.model.model = model;
    }
    if args.max_rounds.is_some() {
        config.agent.max_rounds = args.max_rounds;
    }
    config.validate().context("Config error")?;

    tracing::info!(model = %config.model.model, "Starting orca");

    let mut agent = build_agent(&config, args.no_tools)?;
    agent.calibrate().await;

    match args.mode {
        RunMode::Execute(prompt) => cli::run_once(&mut agent, &prompt).await,
        RunMode::File(path) => {
            let prompt = tokio::fs::read_to_string(&path)
                .await
                .with_context(|| format!("Failed to read prompt file: {}", path.display()))?;
            cli::run_once(&mut agent, &prompt).await
        }
        _ => cli::run_repl(agent, config).await,
    }
}
