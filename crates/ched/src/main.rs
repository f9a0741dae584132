//! A terminal front end for the course assistant.

#[macro_use]
extern crate tracing;

use std::env;
use std::io::Write as _;
use std::mem;
use std::path::PathBuf;
use std::time::Duration;

use ched::commands::{self, Command, HELP};
use ched::core::{
    Message, MessageStatus, Notice, SessionController, SessionSnapshot,
    ViewState,
};
use ched::http::HttpBackendConfigBuilder;
use ched_model::Role;
use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use tokio::io::{self, AsyncBufReadExt};
use tokio::select;
use tokio::sync::mpsc;
use tokio::time::sleep;

enum SessionEvent {
    Idle,
    Notice(Notice),
    Streaming(String),
}

const BAR_CHAR: &str = "▎";

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let Ok(api_key) = env::var("CHED_API_KEY") else {
        eprintln!("CHED_API_KEY environment variable is not set");
        return;
    };
    let mut config = HttpBackendConfigBuilder::with_api_key(api_key);
    if let Ok(base_url) = env::var("CHED_BASE_URL") {
        config = config.with_base_url(base_url);
    }
    if let Ok(user_id) = env::var("CHED_USER_ID") {
        config = config.with_user_id(user_id);
    }
    let config = config.build();
    debug!("using {config:?}");

    let (event_tx, event_rx) = mpsc::unbounded_channel();

    let session = ched::connect(config)
        .on_idle({
            let event_tx = event_tx.clone();
            move || {
                event_tx.send(SessionEvent::Idle).ok();
            }
        })
        .on_notice({
            let event_tx = event_tx.clone();
            move |notice| {
                event_tx.send(SessionEvent::Notice(notice)).ok();
            }
        })
        .on_transcript({
            let event_tx = event_tx.clone();
            move |messages| {
                let Some(tail) = messages.last() else {
                    return;
                };
                if tail.role == Role::Assistant
                    && tail.status == MessageStatus::Pending
                {
                    let preview =
                        tail.text.lines().last().unwrap_or_default();
                    event_tx
                        .send(SessionEvent::Streaming(preview.to_owned()))
                        .ok();
                }
            }
        })
        .build();

    let mut console = Console {
        session,
        event_rx,
        progress_style: ProgressStyle::with_template("{spinner} {wide_msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
        attachments: vec![],
    };

    let Some(snapshot) = console.wait_until_idle("Connecting...").await
    else {
        return;
    };
    println!("Type /help to see the commands.");
    print_transcript(&snapshot);

    loop {
        let Ok(snapshot) = console.session.snapshot().await else {
            break;
        };
        print!("{}", prompt(&snapshot));
        std::io::stdout().flush().ok();

        let Some(line) = read_line().await else {
            break;
        };
        let cmd = match commands::parse(&line) {
            Ok(Some(cmd)) => cmd,
            Ok(None) => continue,
            Err(err) => {
                println!("{}", err.bright_red());
                continue;
            }
        };
        if !console.run(cmd).await {
            break;
        }
    }
    console.session.close();
}

struct Console {
    session: SessionController,
    event_rx: mpsc::UnboundedReceiver<SessionEvent>,
    progress_style: ProgressStyle,
    attachments: Vec<PathBuf>,
}

impl Console {
    /// Runs a command, returns `false` once the program should exit.
    async fn run(&mut self, cmd: Command) -> bool {
        self.drain_events();

        let snapshot = match cmd {
            Command::Threads | Command::Back => {
                self.session.back();
                let Some(snapshot) = self.wait_until_idle("Loading...").await
                else {
                    return false;
                };
                print_threads(&snapshot);
                return true;
            }
            Command::Open(thread_id) => {
                self.session.select_thread(thread_id);
                self.wait_until_idle("Loading...").await
            }
            Command::New => {
                let thread_id = self.session.create_thread();
                println!("Started a new chat ({thread_id}).");
                return true;
            }
            Command::Delete(thread_id) => {
                let confirmation = self.session.delete_thread(thread_id);
                print!(
                    "Delete {} and all of its messages? [y/N]: ",
                    confirmation.thread_id().bright_white().bold()
                );
                std::io::stdout().flush().ok();

                let Some(line) = read_line().await else {
                    return false;
                };
                if !line.trim().eq_ignore_ascii_case("y") {
                    confirmation.cancel();
                    return true;
                }
                confirmation.confirm();
                self.wait_until_idle("Deleting...").await
            }
            Command::Attach(path) => {
                if ched::core::is_supported(&path) {
                    println!("Attached {}.", path.display());
                } else {
                    println!(
                        "{}",
                        "Only pdf, ppt and pptx files can be sent."
                            .bright_yellow()
                    );
                }
                self.attachments.push(path);
                return true;
            }
            Command::Detach => {
                self.attachments.clear();
                return true;
            }
            Command::Retry => {
                self.session.retry();
                let snapshot = self.wait_until_idle("Thinking...").await;
                if let Some(snapshot) = &snapshot {
                    print_answer(snapshot);
                }
                return snapshot.is_some();
            }
            Command::Help => {
                println!("{HELP}");
                return true;
            }
            Command::Quit => return false,
            Command::Send(text) => {
                let files = mem::take(&mut self.attachments);
                self.session.send_message(text, files);
                let snapshot = self.wait_until_idle("Thinking...").await;
                if let Some(snapshot) = &snapshot {
                    print_answer(snapshot);
                }
                return snapshot.is_some();
            }
        };

        let Some(snapshot) = snapshot else {
            return false;
        };
        print_transcript(&snapshot);
        true
    }

    /// Shows a spinner until nothing is in flight anymore, printing the
    /// notices that come in meanwhile.
    async fn wait_until_idle(
        &mut self,
        what: &str,
    ) -> Option<SessionSnapshot> {
        let mut progress_bar: Option<ProgressBar> = None;

        loop {
            // Create a new progress bar if it has been finished.
            progress_bar
                .get_or_insert_with(|| {
                    let progress_bar = ProgressBar::new_spinner();
                    progress_bar.set_style(self.progress_style.clone());
                    progress_bar.set_message(what.to_owned());
                    progress_bar
                })
                .inc(1);

            let sleep = sleep(Duration::from_millis(100));
            let event = select! {
                event = self.event_rx.recv() => event?,
                _ = sleep => {
                    let snapshot = self.session.snapshot().await.ok()?;
                    if snapshot.busy {
                        continue;
                    }
                    SessionEvent::Idle
                }
            };

            match event {
                SessionEvent::Streaming(preview) => {
                    if let Some(progress_bar) = &progress_bar {
                        progress_bar.set_message(preview);
                    }
                }
                SessionEvent::Notice(notice) => {
                    // Finish the progress bar before printing anything else.
                    if let Some(progress_bar) = progress_bar.take() {
                        progress_bar.finish_and_clear();
                    }
                    print_notice(&notice);
                }
                SessionEvent::Idle => {
                    if let Some(progress_bar) = progress_bar.take() {
                        progress_bar.finish_and_clear();
                    }
                    return self.session.snapshot().await.ok();
                }
            }
        }
    }

    /// Prints the notices left over from the previous command.
    fn drain_events(&mut self) {
        while let Ok(event) = self.event_rx.try_recv() {
            if let SessionEvent::Notice(notice) = event {
                print_notice(&notice);
            }
        }
    }
}

fn prompt(snapshot: &SessionSnapshot) -> String {
    let label = match &snapshot.view {
        ViewState::ThreadList => "threads",
        ViewState::Conversation { thread_id, .. } => snapshot
            .threads
            .iter()
            .find(|t| t.id == *thread_id)
            .map(|t| t.label.as_str())
            .unwrap_or(thread_id.as_str()),
    };
    format!("[{label}] > ")
}

fn print_threads(snapshot: &SessionSnapshot) {
    for thread in &snapshot.threads {
        let when = thread
            .last_message_time
            .map(|t| t.format(" · %Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();
        println!(
            "{} {} ({} messages{when})",
            thread.label.bright_white().bold(),
            thread.id.dimmed(),
            thread.message_count,
        );
    }
}

fn print_transcript(snapshot: &SessionSnapshot) {
    for message in &snapshot.transcript {
        print_message(message);
    }
}

fn print_answer(snapshot: &SessionSnapshot) {
    if let Some(tail) = snapshot
        .transcript
        .last()
        .filter(|m| m.role == Role::Assistant)
    {
        print_message(tail);
    }
}

fn print_message(message: &Message) {
    let failed = if message.status == MessageStatus::Failed {
        " (failed, /retry to send again)".bright_red().to_string()
    } else {
        String::new()
    };
    match message.role {
        Role::User => {
            println!("{}🧑 {}{failed}", BAR_CHAR.bright_green(), message.text)
        }
        Role::Assistant => println!(
            "{}🤖 {}{failed}",
            BAR_CHAR.bright_cyan(),
            message.text.bright_white()
        ),
    }
}

fn print_notice(notice: &Notice) {
    println!("{}⚠️  {}", BAR_CHAR.bright_yellow(), notice);
}

async fn read_line() -> Option<String> {
    let mut stdin = io::BufReader::new(io::stdin());
    let mut line = String::new();

    match stdin.read_line(&mut line).await {
        Ok(count) => {
            if count == 0 {
                return None;
            }
            Some(line)
        }
        Err(err) => {
            error!("error reading input: {}", err);
            None
        }
    }
}
