use std::io::Write;
use std::sync::Arc;

use charla::{ChatSession, Command, Role, SessionUpdate, Settings, SettingsError};
use charla_storage::{FileStore, InputHistory, Recall};
use charla_transport::TransportError;
use snafu::{ResultExt, Snafu};
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Debug, Snafu)]
enum CliError {
    #[snafu(display("failed to load settings: {source}"))]
    LoadSettings { source: SettingsError },
    #[snafu(display("failed to set up transport on `{stage}`: {source}"))]
    Transport {
        stage: &'static str,
        source: TransportError,
    },
    #[snafu(display("failed to read terminal input: {source}"))]
    ReadInput { source: std::io::Error },
}

/// Terminal entry point.
///
/// 1. Settings from `settings.toml` plus `CHARLA_` variables
/// 2. REST client, and the SSE client when a stream URL is configured
/// 3. File-backed input history
/// 4. One line per message; `/up`, `/down`, `/health`, `/quit` are commands
#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    if let Err(error) = run().await {
        tracing::error!(error = %error, "charla stopped");
        eprintln!("error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    let settings = Settings::load().context(LoadSettingsSnafu)?;

    let transport = settings.build_transport().context(TransportSnafu {
        stage: "build-transport",
    })?;

    let store = FileStore::new(settings.history_root());
    tracing::info!(root = ?store.root(), "using input history store");
    let history = InputHistory::load(Arc::new(store));

    let mut session = ChatSession::new(transport, history);
    session.initialize();
    for message in session.messages() {
        println!("{}", message.content);
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context(ReadInputSnafu)? {
        match Command::parse(&line) {
            Command::Quit => break,
            Command::RecallPrevious => match session.recall_previous() {
                Some(entry) => println!("> {entry}"),
                None => println!("(history is empty)"),
            },
            Command::RecallNext => match session.recall_next() {
                Some(Recall::Entry(entry)) => println!("> {entry}"),
                Some(Recall::Empty) => println!(">"),
                None => println!("(not navigating history)"),
            },
            Command::Health => match session.transport().health().await {
                Ok(report) => {
                    let version = report.version.as_deref().unwrap_or("unknown");
                    println!("backend {} (version {version})", report.status);
                    for name in report.down_components() {
                        println!("  {name} is not up");
                    }
                }
                Err(error) => println!("health check failed: {error}"),
            },
            Command::Send(text) => {
                if session.submit(&text).is_some() {
                    drive_exchange(&mut session).await;
                }
            }
        }
    }

    session.close();
    Ok(())
}

async fn drive_exchange(session: &mut ChatSession) {
    let mut printed = 0;
    let mut stdout = std::io::stdout();

    while let Some(update) = session.next_update().await {
        match update {
            SessionUpdate::StreamOpened => printed = 0,
            SessionUpdate::DraftUpdated { content } => {
                if let Some(fresh) = content.get(printed..) {
                    print!("{fresh}");
                    let _ = stdout.flush();
                }
                printed = content.len();
            }
            SessionUpdate::FallbackEngaged { reason } => {
                if printed > 0 {
                    println!();
                }
                printed = 0;
                eprintln!("(stream interrupted: {reason}; retrying without streaming)");
            }
            SessionUpdate::MessageAppended(id) => {
                if printed > 0 {
                    println!();
                }
                let Some(message) = session.messages().iter().find(|message| message.id == id)
                else {
                    break;
                };
                match message.role {
                    Role::System => eprintln!("{}", message.content),
                    // Streamed text is already on screen.
                    _ if printed > 0 => {}
                    _ => println!("{}", message.content),
                }
                break;
            }
        }
    }
}
