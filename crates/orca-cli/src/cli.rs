//! Interactive REPL and one-shot execution
//!
//! Presentation only: every command goes through the [`Agent`] interface.

use std::borrow::Cow;
use std::path::PathBuf;

use nu_ansi_term::{Color, Style};
use orca_core::agents::StopReason;
use orca_core::{Agent, AgentResponse, Config, Role};
use reedline::{
    ColumnarMenu, Completer, DefaultHinter, EditCommand, Emacs, KeyCode, KeyModifiers, Keybindings,
    MenuBuilder, Prompt, PromptEditMode, PromptHistorySearch, Reedline, ReedlineEvent, ReedlineMenu,
    Signal, Span, Suggestion,
};

/// Commands shown in completion and help
const COMMANDS: &[(&str, &str)] = &[
    ("/help", "Show this help"),
    ("/tools", "List available tools"),
    ("/clear", "Clear the conversation"),
    ("/history", "Show the conversation"),
    ("/system", "Show or set the system prompt"),
    ("/model", "Show or set the model"),
    ("/metrics", "Show tool execution metrics"),
    ("/config", "Show the active configuration"),
    ("/save", "Save the conversation to a JSON file"),
    ("/load", "Load a conversation from a JSON file"),
    ("/export", "Export the conversation as Markdown"),
    ("/summarize", "Summarize the conversation"),
    ("/retry", "Re-run the last request"),
    ("/exit", "Quit"),
];

/// A parsed slash command
#[derive(Debug, PartialEq)]
enum Command {
    Help,
    Tools,
    Clear,
    History,
    System(Option<String>),
    Model(Option<String>),
    Metrics,
    Config,
    Save(PathBuf),
    Load(PathBuf),
    Export(PathBuf),
    Summarize,
    Retry,
    Exit,
    Usage(&'static str),
    Unknown(String),
}

/// Parse a line starting with `/`; other input is a prompt
fn parse_command(line: &str) -> Option<Command> {
    if !line.starts_with('/') {
        return None;
    }

    let (name, rest) = match line.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, rest.trim()),
        None => (line, ""),
    };
    let argument = (!rest.is_empty()).then(|| rest.to_string());
    let path = |usage: &'static str, make: fn(PathBuf) -> Command| match &argument {
        Some(path) => make(PathBuf::from(path)),
        None => Command::Usage(usage),
    };

    Some(match name.to_lowercase().as_str() {
        "/help" | "/?" => Command::Help,
        "/tools" => Command::Tools,
        "/clear" => Command::Clear,
        "/history" => Command::History,
        "/system" => Command::System(argument.clone()),
        "/model" => Command::Model(argument.clone()),
        "/metrics" => Command::Metrics,
        "/config" => Command::Config,
        "/save" => path("/save <path>", Command::Save),
        "/load" => path("/load <path>", Command::Load),
        "/export" => path("/export <path>", Command::Export),
        "/summarize" => Command::Summarize,
        "/retry" => Command::Retry,
        "/exit" | "/quit" | "/q" => Command::Exit,
        other => Command::Unknown(other.to_string()),
    })
}

/// Command completer for reedline
#[derive(Clone, Default)]
struct CommandCompleter;

impl Completer for CommandCompleter {
    fn complete(&mut self, line: &str, pos: usize) -> Vec<Suggestion> {
        if !line.starts_with('/') || line.contains(' ') {
            return Vec::new();
        }

        COMMANDS
            .iter()
            .filter(|(command, _)| command.starts_with(line))
            .map(|(command, description)| Suggestion {
                value: command.to_string(),
                description: Some(description.to_string()),
                extra: None,
                span: Span::new(0, pos),
                append_whitespace: true,
                style: None,
                ..Default::default()
            })
            .collect()
    }
}

/// Prompt showing the agent name
struct AgentPrompt {
    label: String,
}

impl Prompt for AgentPrompt {
    fn render_prompt_left(&self) -> Cow<'_, str> {
        Cow::Owned(Color::Cyan.bold().paint(&self.label).to_string())
    }

    fn render_prompt_right(&self) -> Cow<'_, str> {
        Cow::Borrowed("")
    }

    fn render_prompt_indicator(&self, _prompt_mode: PromptEditMode) -> Cow<'_, str> {
        Cow::Borrowed("")
    }

    fn render_prompt_multiline_indicator(&self) -> Cow<'_, str> {
        Cow::Borrowed("... ")
    }

    fn render_prompt_history_search_indicator(&self, _history_search: PromptHistorySearch) -> Cow<'_, str> {
        Cow::Borrowed("(search) ")
    }
}

fn keybindings() -> Keybindings {
    let mut keybindings = reedline::default_emacs_keybindings();
    keybindings.add_binding(
        KeyModifiers::NONE,
        KeyCode::Tab,
        ReedlineEvent::UntilFound(vec![
            ReedlineEvent::Menu("command_menu".to_string()),
            ReedlineEvent::MenuNext,
        ]),
    );
    keybindings.add_binding(
        KeyModifiers::NONE,
        KeyCode::Char('/'),
        ReedlineEvent::Multiple(vec![
            ReedlineEvent::Edit(vec![EditCommand::InsertChar('/')]),
            ReedlineEvent::Menu("command_menu".to_string()),
        ]),
    );
    keybindings
}

fn line_editor() -> Reedline {
    let menu = ColumnarMenu::default()
        .with_name("command_menu")
        .with_columns(1)
        .with_column_width(Some(40))
        .with_only_buffer_difference(false);

    Reedline::create()
        .with_completer(Box::new(CommandCompleter))
        .with_menu(ReedlineMenu::EngineCompleter(Box::new(menu)))
        .with_hinter(Box::new(DefaultHinter::default().with_style(Style::new().dimmed())))
        .with_edit_mode(Box::new(Emacs::new(keybindings())))
}

/// Run one prompt, print the answer and return
pub async fn run_once(agent: &mut Agent, prompt: &str) -> anyhow::Result<()> {
    let prompt = prompt.trim();
    if prompt.is_empty() {
        anyhow::bail!("prompt is empty");
    }

    let response = agent.run(prompt).await?;
    println!("{}", response.text());
    if response.stop_reason == StopReason::MaxRounds {
        eprintln!("(stopped after reaching the round limit)");
    }
    Ok(())
}

/// Interactive loop
pub async fn run_repl(mut agent: Agent, config: Config) -> anyhow::Result<()> {
    let mut editor = line_editor();
    let prompt = AgentPrompt {
        label: format!("{}> ", agent.name()),
    };

    print_welcome(&agent);

    loop {
        let line = match editor.read_line(&prompt) {
            Ok(Signal::Success(line)) => line,
            Ok(Signal::CtrlC) => continue,
            Ok(Signal::CtrlD) => break,
            Err(e) => {
                eprintln!("{}", Color::Red.paint(format!("Input error: {}", e)));
                break;
            }
        };

        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        match parse_command(input) {
            Some(Command::Exit) => break,
            Some(command) => handle_command(&mut agent, &config, command).await,
            None => match agent.run(input).await {
                Ok(response) => print_response(&agent, &response),
                Err(e) => eprintln!("\n{}\n", Color::Red.paint(format!("Error: {}", e))),
            },
        }
    }

    println!("\nGoodbye!\n");
    Ok(())
}

async fn handle_command(agent: &mut Agent, config: &Config, command: Command) {
    match command {
        Command::Help => print_help(),
        Command::Tools => {
            println!();
            if agent.tools().is_empty() {
                println!("No tools available.");
            }
            for tool in agent.tools().iter() {
                println!("  {} - {}", Color::Green.paint(tool.name()), first_line(tool.description()));
            }
            println!();
        }
        Command::Clear => {
            agent.clear();
            success("Conversation cleared.");
        }
        Command::History => print_history(agent),
        Command::System(None) => println!("\n{}\n", agent.system_prompt()),
        Command::System(Some(prompt)) => {
            agent.set_system_prompt(prompt);
            success("System prompt updated.");
        }
        Command::Model(None) => println!("\n{}\n", agent.model_config().model),
        Command::Model(Some(model)) => {
            success(&format!("Model set to {}.", model));
            agent.set_model(model);
        }
        Command::Metrics => {
            if agent.tool_metrics().is_empty() {
                println!("\nNo tools have been called yet.\n");
            } else {
                println!("\n{}\n", agent.tool_metrics().report());
            }
        }
        Command::Config => print_config(agent, config),
        Command::Save(path) => report(agent.save(&path).await, &format!("Saved to {}", path.display())),
        Command::Load(path) => report(agent.load(&path).await, &format!("Loaded {}", path.display())),
        Command::Export(path) => {
            report(agent.export_markdown(&path).await, &format!("Exported to {}", path.display()))
        }
        Command::Summarize => match agent.summarize().await {
            Ok(summary) => println!("\n{}\n", summary),
            Err(e) => failure(&e.to_string()),
        },
        Command::Retry => match agent.retry_last().await {
            Ok(Some(response)) => print_response(agent, &response),
            Ok(None) => println!("\nNothing to retry.\n"),
            Err(e) => failure(&e.to_string()),
        },
        Command::Usage(usage) => println!("\nUsage: {}\n", usage),
        Command::Unknown(name) => failure(&format!("Unknown command: {}. Type /help for the list.", name)),
        Command::Exit => {}
    }
}

fn report(result: orca_core::Result<()>, message: &str) {
    match result {
        Ok(()) => success(message),
        Err(e) => failure(&e.to_string()),
    }
}

fn success(message: &str) {
    println!("\n{}\n", Color::Green.paint(message));
}

fn failure(message: &str) {
    eprintln!("\n{}\n", Color::Red.paint(message));
}

fn print_response(agent: &Agent, response: &AgentResponse) {
    println!("\n{}\n", response.text());

    let stats = agent.history();
    let footer = format!(
        "[{} round(s), {} in / {} out tokens, context {}/{}]",
        response.rounds,
        response.usage.total_input(),
        response.usage.output_tokens,
        stats.total_tokens(),
        stats.context_window_tokens()
    );
    println!("{}\n", Style::new().dimmed().paint(footer));
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or_default()
}

/// Char-safe preview on one line
fn preview(text: &str, max: usize) -> String {
    let flat = text.replace('\n', " ");
    if flat.chars().count() <= max {
        return flat;
    }
    let cut: String = flat.chars().take(max).collect();
    format!("{}...", cut)
}

fn print_history(agent: &Agent) {
    let messages = agent.history().messages();
    println!();
    println!("Conversation ({} turns, {} tokens):", messages.len(), agent.history().total_tokens());
    println!("{}", "─".repeat(50));

    for (i, message) in messages.iter().enumerate() {
        let role = match message.role {
            Role::User => Color::Cyan.paint("user"),
            Role::Assistant => Color::Purple.paint("assistant"),
        };
        let calls = message.tool_calls().len();
        let results = message.tool_result_ids().len();
        let mut line = preview(&message.text_content(), 100);
        if calls > 0 {
            line.push_str(&format!(" [{} tool call(s)]", calls));
        }
        if results > 0 {
            line.push_str(&format!(" [{} tool result(s)]", results));
        }
        println!("{}. {}: {}", i + 1, role, line.trim());
    }

    println!("{}", "─".repeat(50));
    println!();
}

fn print_config(agent: &Agent, config: &Config) {
    let model = agent.model_config();
    println!();
    println!("model:               {}", model.model);
    println!("max_tokens:          {}", model.max_tokens);
    println!("temperature:         {}", model.temperature);
    println!("context window:      {}", model.context_window_tokens);
    println!(
        "max rounds:          {}",
        agent.max_rounds().map_or("unlimited".to_string(), |n| n.to_string())
    );
    println!("caching:             {}", agent.history().caching_enabled());
    println!("parallel tools:      {}", config.agent.parallel_tools);
    println!("parallel agents:     {}", config.delegation.max_parallel_agents);
    println!("sub-agent rounds:    {}", config.delegation.subagent_max_rounds);
    println!("lead rounds:         {}", config.delegation.lead_max_rounds);
    println!(
        "base url:            {}",
        config.llm.base_url.as_deref().unwrap_or("(default)")
    );
    println!("tools:               {}", agent.tools().len());
    println!();
}

fn print_welcome(agent: &Agent) {
    println!();
    println!("{}", Color::Cyan.bold().paint(format!("{} - interactive mode", agent.name())));
    println!("Model: {}   Tools: {}", agent.model_config().model, agent.tools().len());
    println!("Type a message and press Enter. /help lists commands, Ctrl+D exits.");
    println!();
}

fn print_help() {
    println!();
    println!("Commands:");
    for (command, description) in COMMANDS {
        println!("  {:<12} {}", command, description);
    }
    println!();
}
