use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use colored::Colorize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use quill_core::{ChatEvent, Conversation, Message, ToolInvoker};
use quill_llm::{ModelProvider, OpenAiProvider};
use quill_loop::{run_exchange, ExchangeConfig};
use quill_mcp::{ServersConfig, ToolSession};

const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a helpful assistant. Use the available tools when they help answer the question.";

#[derive(Parser)]
#[command(name = "quill")]
#[command(about = "Terminal chat client with streaming answers and live tool calls")]
#[command(version)]
struct Cli {
    /// Tool server configuration file
    #[arg(long, default_value = "servers_config.json")]
    config: String,

    /// System prompt file; a built-in prompt is used if the file is absent
    #[arg(long, default_value = "system_prompt.txt")]
    system_prompt: String,

    /// Model name, overriding the provider default
    #[arg(long)]
    model: Option<String>,

    /// Endpoint base URL, overriding the provider default
    #[arg(long)]
    base_url: Option<String>,

    /// Maximum completion rounds per user turn
    #[arg(long, default_value = "25")]
    max_rounds: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let api_key = std::env::var("DASHSCOPE_API_KEY")
        .or_else(|_| std::env::var("QUILL_API_KEY"))
        .map_err(|_| anyhow::anyhow!("set DASHSCOPE_API_KEY or QUILL_API_KEY"))?;

    let mut provider = OpenAiProvider::new(api_key);
    if let Some(base_url) = &cli.base_url {
        provider = provider.with_base_url(base_url);
    }
    if let Some(model) = &cli.model {
        provider = provider.with_model(model);
    }
    let provider: Arc<dyn ModelProvider> = Arc::new(provider);

    let servers = if Path::new(&cli.config).exists() {
        ServersConfig::load(&cli.config)?
    } else {
        eprintln!(
            "{}",
            format!("No tool config at {}, starting without tools", cli.config).dimmed()
        );
        ServersConfig::default()
    };

    let session = ToolSession::connect(&servers).await?;
    let invoker: Arc<dyn ToolInvoker> = session.router();

    let system_prompt = std::fs::read_to_string(&cli.system_prompt)
        .unwrap_or_else(|_| DEFAULT_SYSTEM_PROMPT.to_string());
    let mut conversation = Conversation::with_system_prompt(system_prompt.trim());

    println!("{}", "🪶 quill".cyan().bold());
    println!(
        "{}",
        format!(
            "{} tool(s) from {} server(s)",
            invoker.list_tools().len(),
            session.backend_count()
        )
        .dimmed()
    );
    println!("{}", "Type 'quit' to leave".dimmed());
    println!();

    let config = ExchangeConfig {
        max_rounds: cli.max_rounds,
    };

    loop {
        print!("{} ", "You:".cyan().bold());
        io::stdout().flush()?;

        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            break;
        }
        let input = input.trim();

        if input.eq_ignore_ascii_case("quit") || input.eq_ignore_ascii_case("exit") {
            break;
        }
        if input.is_empty() {
            continue;
        }

        conversation.add_message(Message::user(input));

        let cancel = CancellationToken::new();
        let interrupt = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    cancel.cancel();
                }
            })
        };

        let (tx, rx) = mpsc::channel(64);
        let renderer = tokio::spawn(render_events(rx));

        let result = run_exchange(
            &mut conversation,
            tx,
            Arc::clone(&provider),
            Arc::clone(&invoker),
            cancel,
            &config,
        )
        .await;

        interrupt.abort();
        let _ = renderer.await;

        if let Err(e) = result {
            println!("{}", format!("❌ {}", e).red());
        }
        println!();
    }

    println!("{}", "👋 Goodbye!".cyan());
    session.shutdown().await;
    Ok(())
}

/// What the terminal is currently showing, so mode switches get a banner.
#[derive(PartialEq)]
enum Section {
    None,
    Reasoning,
    Answer,
}

async fn render_events(mut rx: mpsc::Receiver<ChatEvent>) {
    let mut section = Section::None;

    while let Some(event) = rx.recv().await {
        match event {
            ChatEvent::ReasoningDelta { content } => {
                if section != Section::Reasoning {
                    println!("{}", "💭 Reasoning".dimmed());
                    section = Section::Reasoning;
                }
                print!("{}", content.dimmed());
                let _ = io::stdout().flush();
            }
            ChatEvent::AnswerDelta { content } => {
                if section != Section::Answer {
                    if section == Section::Reasoning {
                        println!();
                    }
                    println!("{}", "Assistant:".green().bold());
                    section = Section::Answer;
                }
                print!("{}", content);
                let _ = io::stdout().flush();
            }
            ChatEvent::ToolCallRequested {
                tool_name,
                arguments,
                ..
            } => {
                println!();
                println!("{}", format!("🔧 {}", tool_name).yellow());
                println!("{}", format!("   args: {}", arguments).dimmed());
                section = Section::None;
            }
            ChatEvent::ToolCallResult {
                tool_name, result, ..
            } => {
                if result.is_error {
                    println!("{}", format!("❌ {}: {}", tool_name, result.text).red());
                } else {
                    println!("{}", format!("✅ {}: {}", tool_name, result.text).green());
                }
            }
            ChatEvent::RoundComplete { round, tool_calls } => {
                println!(
                    "{}",
                    format!("↩ round {} done ({} tool call(s))", round, tool_calls).dimmed()
                );
                section = Section::None;
            }
            ChatEvent::Complete => {
                println!();
            }
            ChatEvent::Error { message } => {
                println!();
                println!("{}", format!("❌ {}", message).red());
            }
        }
    }
}
