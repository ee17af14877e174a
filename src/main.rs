use clap::Parser;
use report_chat::console::Transcript;
use report_chat::{ChatConfig, ChatSession, SendOutcome};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser)]
#[command(name = "report-chat")]
#[command(about = "Chat with the report assistant from a terminal", long_about = None)]
#[command(version)]
struct Args {
    /// Chat endpoint that answers with a `data:` event stream
    #[arg(long, env = "REPORT_CHAT_ENDPOINT")]
    endpoint: String,

    /// Context prompt sent with every request
    #[arg(long, env = "REPORT_CHAT_INITIAL_PROMPT")]
    initial_prompt: Option<String>,

    /// Fail a response after this many seconds without data
    #[arg(long, env = "REPORT_CHAT_READ_TIMEOUT_SECS")]
    read_timeout_secs: Option<u64>,

    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    setup_logging(args.verbose);

    let mut config = ChatConfig::new(args.endpoint);
    if let Some(prompt) = args.initial_prompt {
        config = config.with_initial_prompt(prompt);
    }
    if let Some(secs) = args.read_timeout_secs {
        config = config.with_read_timeout(Duration::from_secs(secs));
    }

    let session = Arc::new(ChatSession::new(config));
    let printer = tokio::spawn(print_transcript(Arc::clone(&session)));

    println!("Type a message and press Enter. Ctrl-C stops a reply; /clear resets; Ctrl-C when idle quits.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => break,
        };
        let Some(line) = line else { break };

        match line.trim() {
            "" => continue,
            "/clear" => {
                session.clear_messages();
                println!("(cleared)");
                continue;
            }
            _ => {}
        }

        let send = session.send_message(line);
        tokio::pin!(send);
        let outcome = loop {
            tokio::select! {
                outcome = &mut send => break outcome,
                _ = tokio::signal::ctrl_c() => session.stop_streaming(),
            }
        };
        if outcome == SendOutcome::Rejected {
            println!("(still answering the previous message)");
        }
    }

    session.stop_streaming();
    printer.abort();
    Ok(())
}

async fn print_transcript(session: Arc<ChatSession>) {
    let mut updates = session.subscribe();
    let mut transcript = Transcript::new();
    loop {
        let text = transcript.update(&updates.borrow_and_update());
        if !text.is_empty() {
            print!("{}", text);
            let _ = std::io::stdout().flush();
        }
        if updates.changed().await.is_err() {
            break;
        }
    }
}

fn setup_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "warn" };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
