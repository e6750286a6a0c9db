use std::io::Write as _;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;

use palaver::core::chat_stream::HttpModelClient;
use palaver::core::config::Config;
use palaver::core::engine::{compose_user_parts, ChatEngine, EngineSettings};
use palaver::core::message::Transcript;
use palaver::core::session::Session;
use palaver::error::ValidationError;
use palaver::tools::Toolbox;
use palaver::ui::render::RenderSink;

#[derive(Parser)]
#[command(name = "palaver")]
#[command(about = "A streaming chat client with built-in search and calculation tools")]
#[command(long_about = "Palaver connects to a streaming chat API and lets the model call a small \
set of tools (web search, webpage reading, equation evaluation) while it answers.\n\n\
Environment Variables:\n\
  PALAVER_API_KEY   API key (used when the config file has none)\n\n\
Commands:\n\
  /attach <path>    Stage a file for the next message\n\
  /drop <n>         Unstage attachment number n\n\
  /quit             Exit\n\
  Ctrl+C            Cancel the in-flight response")]
struct Args {
    #[arg(short, long, help = "Model to use, overriding the config file")]
    model: Option<String>,

    #[arg(long, help = "API base URL, overriding the config file")]
    base_url: Option<String>,
}

/// Streams the growing response to stdout, printing only what the previous
/// frame did not already show.
#[derive(Default)]
struct StdoutSink {
    printed: String,
}

impl RenderSink for StdoutSink {
    fn render(&mut self, markdown: &str, in_progress: bool) {
        if let Some(suffix) = markdown.strip_prefix(self.printed.as_str()) {
            print!("{suffix}");
        } else {
            // Tool summaries trim trailing whitespace, breaking the prefix
            // property; reprint from a fresh line.
            print!("\n{markdown}");
        }
        let _ = std::io::stdout().flush();
        self.printed = markdown.to_string();

        if !in_progress {
            println!();
            self.printed.clear();
        }
    }
}

/// Drop expired notices and show the prompt. Errors were already printed to
/// stderr when posted; the board only tracks what is still within its TTL.
fn show_prompt(session: &mut Session) -> std::io::Result<()> {
    session.notices.sweep(std::time::Instant::now());
    print!("> ");
    std::io::stdout().flush()
}

fn guess_mime_type(path: &std::path::Path) -> String {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "mp4" => "video/mp4",
        "pdf" => "application/pdf",
        "json" => "application/json",
        "html" => "text/html",
        "md" => "text/markdown",
        _ => "text/plain",
    }
    .to_string()
}

fn handle_attach(session: &mut Session, path_arg: &str) {
    let path = std::path::Path::new(path_arg);
    let data = match std::fs::read(path) {
        Ok(data) => data,
        Err(e) => {
            eprintln!("Could not read {}: {}", path.display(), e);
            return;
        }
    };

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(path_arg)
        .to_string();
    let mime_type = guess_mime_type(path);

    match session.attachments.add(file_name.clone(), mime_type, data) {
        Ok(()) => println!(
            "Attached {} ({} staged)",
            file_name,
            session.attachments.len()
        ),
        Err(e) => {
            session.notify_error(e.to_string());
            eprintln!("{e}");
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let mut config = Config::load()?;
    if let Some(model) = args.model {
        config.model = model;
    }
    if let Some(base_url) = args.base_url {
        config.base_url = base_url;
    }

    let Some(api_key) = config.resolve_api_key() else {
        eprintln!(
            "Error: no API key configured\n\n\
             Set one in {} or export it:\n\
             export PALAVER_API_KEY=\"your-api-key-here\"",
            Config::get_config_path().display()
        );
        std::process::exit(1);
    };

    info!(model = %config.model, base_url = %config.base_url, "starting session");

    let http = reqwest::Client::new();
    let client = HttpModelClient::new(http.clone(), config.base_url.clone(), api_key);
    let toolbox = Toolbox::new(http, config.toolbox_config());
    let engine = ChatEngine::new(client, toolbox, EngineSettings::from_config(&config));

    let mut session = Session::new(config.max_attachments);
    let mut transcript = Transcript::new();
    let mut sink = StdoutSink::default();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    show_prompt(&mut session)?;

    while let Some(line) = lines.next_line().await? {
        let input = line.trim();

        if input == "/quit" {
            break;
        }
        if let Some(path_arg) = input.strip_prefix("/attach ") {
            handle_attach(&mut session, path_arg.trim());
            show_prompt(&mut session)?;
            continue;
        }
        if let Some(index_arg) = input.strip_prefix("/drop ") {
            match index_arg.trim().parse::<usize>() {
                Ok(n) if n >= 1 && session.attachments.remove(n - 1).is_some() => {
                    println!("Dropped attachment {n}");
                }
                _ => eprintln!("No attachment number {index_arg}"),
            }
            show_prompt(&mut session)?;
            continue;
        }

        let attachment_parts = session.attachments.drain_parts();
        let parts = match compose_user_parts(input, attachment_parts) {
            Ok(parts) => parts,
            Err(ValidationError::EmptyMessage) => {
                show_prompt(&mut session)?;
                continue;
            }
            Err(e) => {
                session.notify_error(e.to_string());
                eprintln!("{e}");
                show_prompt(&mut session)?;
                continue;
            }
        };

        let cancel = session.reset_cancel();
        let send = engine.send_turn(&cancel, &mut transcript, parts, &mut sink);
        tokio::pin!(send);

        let outcome = loop {
            tokio::select! {
                result = &mut send => break result,
                _ = tokio::signal::ctrl_c() => {
                    cancel.cancel();
                }
            }
        };

        match outcome {
            Ok(Some(_)) => {}
            Ok(None) => println!("(cancelled)"),
            Err(e) => {
                session.notify_error(e.to_string());
                eprintln!("{e}");
            }
        }

        show_prompt(&mut session)?;
    }

    Ok(())
}
