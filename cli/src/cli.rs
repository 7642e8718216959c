use crate::render;
use chrono::Utc;
use clap::{Args, Parser, Subcommand, ValueEnum};
use dialoguer::{Input, Password};
use libhmv::auth::SessionProvider;
use libhmv::config::{ConfigStore, Credentials, FileConfigStore};
use libhmv::download::{download_machine, Downloaded};
use libhmv::flag::{submit_flag, FlagVerdict};
use libhmv::machine::{list_machines, Level, MachineListing, MachineQuery};
use libhmv::markup::HmvMarkup;
use libhmv::session::{FileSessionStore, SessionStore};
use libhmv::transport::HttpConnector;
use libhmv::writeup::{search, CacheState, CsvWriteupStore, WriteupCache, WriteupRecord};
use libhmv::{Endpoints, HmvError, Notifier, Result, StatePaths, Update};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;

const EPILOG: &str = "\
Examples:
  hmv config
  hmv search
  hmv search -p 2
  hmv search -l windows
  hmv search -n todd
  hmv search -t sudo -f easy
  hmv writeup todd
  hmv download todd
  hmv flag -i 'HMV{...}' --vm todd

Note: -n, -l and -t cannot be combined with -p.";

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "HackMyVM command line client",
    long_about = "Browse HackMyVM machines, read community writeups, download machine \
    archives and submit flags from the terminal.",
    after_help = EPILOG
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Store your HackMyVM username and password.
    Config,
    /// List machines from the machine index.
    Search(SearchArgs),
    /// Show community writeups for a machine.
    Writeup { machine_name: String },
    /// Download a machine archive into the current directory.
    Download { machine_name: String },
    /// Submit a flag for a machine.
    Flag {
        #[arg(short = 'i', long, help = "The flag to submit.")]
        input: String,
        #[arg(long, help = "Name of the machine the flag belongs to.")]
        vm: String,
    },
}

#[derive(Args, Debug)]
pub struct SearchArgs {
    #[arg(short, long, value_enum, help = "Server side category.")]
    level: Option<LevelChoice>,
    #[arg(short, long, value_enum, help = "Technique tag.")]
    tag: Option<TagChoice>,
    #[arg(short, long, help = "Part of the machine name.")]
    name: Option<String>,
    #[arg(
        short,
        long,
        value_enum,
        help = "Keep only machines of this difficulty."
    )]
    filter_level: Option<FilterChoice>,
    #[arg(short, long, default_value_t = 1)]
    page: u32,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum LevelChoice {
    Easy,
    Medium,
    Hard,
    Windows,
    Linux,
    Size,
    Hacked,
    All,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum TagChoice {
    Bruteforce,
    Suid,
    Wordpress,
    Cron,
    Smb,
    Docker,
    Sudo,
    Web,
    Fileupload,
    Pathhijacking,
    Stego,
    Binary,
    Capabilities,
    Cve,
    Commandinjection,
    Portknocking,
    Ssti,
    Libraryhijack,
    Sqli,
    Lfi,
    Rce,
    Logpoisoning,
    Nfs,
    Xxe,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum FilterChoice {
    Easy,
    Medium,
    Hard,
}

impl From<FilterChoice> for Level {
    fn from(choice: FilterChoice) -> Self {
        match choice {
            FilterChoice::Easy => Level::Easy,
            FilterChoice::Medium => Level::Medium,
            FilterChoice::Hard => Level::Hard,
        }
    }
}

/// The value exactly as typed on the command line, which is also what the
/// site expects in its query string.
fn choice_name(choice: impl ValueEnum) -> Option<String> {
    choice
        .to_possible_value()
        .map(|value| value.get_name().to_string())
}

impl SearchArgs {
    fn query(&self) -> MachineQuery {
        MachineQuery {
            level: self.level.and_then(choice_name),
            search: self.name.clone(),
            tag: self.tag.and_then(choice_name),
            filter_level: self.filter_level.map(Level::from),
            page: self.page,
        }
    }
}

/// What a successful command has to show once all progress output is done.
#[derive(Debug)]
pub enum Report {
    Configured {
        session_cleared: bool,
    },
    Machines {
        listing: MachineListing,
        query: MachineQuery,
    },
    Writeups {
        machine_name: String,
        matches: Vec<WriteupRecord>,
        state: CacheState,
    },
    Downloaded(Downloaded),
    Flag(FlagVerdict),
}

/// Runs one command, printing progress as it arrives, and returns the process
/// exit status.
pub async fn execute(command: Command, paths: StatePaths) -> u8 {
    let config_command = matches!(command, Command::Config);
    let (tx, rx) = unbounded_channel::<Update>();
    let printer = tokio::spawn(print_updates(rx));

    let outcome = run(command, &paths, Notifier::new(tx)).await;
    if let Err(e) = printer.await {
        tracing::error!("Update printer stopped early\nError : {}", e);
    }

    match outcome {
        Ok(report) => {
            render::report(&report);
            EXIT_SUCCESS
        }
        Err(e) => {
            tracing::error!("Command failed\nError : {}", e);
            render::failure(&e);
            exit_status(&e, config_command)
        }
    }
}

/// Storing credentials is all `config` does, so any failure there counts as
/// fatal. Elsewhere only configuration, authentication and validation errors do.
fn exit_status(e: &HmvError, config_command: bool) -> u8 {
    if e.is_fatal() || config_command {
        EXIT_FAILURE
    } else {
        EXIT_SUCCESS
    }
}

async fn print_updates(mut rx: UnboundedReceiver<Update>) {
    while let Some(update) = rx.recv().await {
        match update {
            Update::MessageUpdate(msg) => render::message(msg.kind, &msg.content),
            Update::ProgressUpdate(progress) => render::download_progress(
                &progress.resource_name,
                progress.bytes_written,
                progress.file_size,
            ),
        }
    }
}

async fn run(command: Command, paths: &StatePaths, notifier: Notifier) -> Result<Report> {
    let config = FileConfigStore::new(&paths.config);
    let sessions = FileSessionStore::new(&paths.session);
    let endpoints = Endpoints::from_env()?;
    let connector = HttpConnector::new(&endpoints);
    match command {
        Command::Config => {
            let (username, password) = prompt_credentials()?;
            configure(&config, &sessions, &username, &password, &notifier)
        }
        Command::Search(args) => {
            let provider = SessionProvider::new(&endpoints, &connector, &config, &sessions, notifier);
            let query = args.query();
            let listing = list_machines(&provider, &HmvMarkup, &query).await?;
            Ok(Report::Machines { listing, query })
        }
        Command::Writeup { machine_name } => {
            let provider = SessionProvider::new(&endpoints, &connector, &config, &sessions, notifier);
            let store = CsvWriteupStore::new(&paths.writeups);
            let cache = WriteupCache::new(&store, &HmvMarkup);
            let loaded = cache.load(&provider, Utc::now()).await?;
            let matches = search(&loaded.records, &machine_name)
                .into_iter()
                .cloned()
                .collect();
            Ok(Report::Writeups {
                machine_name,
                matches,
                state: loaded.state,
            })
        }
        Command::Download { machine_name } => {
            let dest_dir = std::env::current_dir().map_err(|e| HmvError::FileOperationError {
                file_name: ".".into(),
                message: e.to_string(),
            })?;
            let downloaded =
                download_machine(&connector, &endpoints, &machine_name, &dest_dir, &notifier)
                    .await?;
            Ok(Report::Downloaded(downloaded))
        }
        Command::Flag { input, vm } => {
            let provider = SessionProvider::new(&endpoints, &connector, &config, &sessions, notifier);
            let verdict = submit_flag(&provider, &input, &vm).await?;
            Ok(Report::Flag(verdict))
        }
    }
}

fn prompt_credentials() -> Result<(String, String)> {
    let username: String = Input::new()
        .with_prompt("HackMyVM username")
        .allow_empty(true)
        .interact_text()
        .map_err(|e| HmvError::InputError(e.to_string()))?;
    let password = Password::new()
        .with_prompt("HackMyVM password")
        .allow_empty_password(true)
        .interact()
        .map_err(|e| HmvError::InputError(e.to_string()))?;
    Ok((username, password))
}

/// Saves the entered credentials, then drops any saved session so the next
/// command logs in with them.
fn configure(
    config: &dyn ConfigStore,
    sessions: &dyn SessionStore,
    username: &str,
    password: &str,
    notifier: &Notifier,
) -> Result<Report> {
    let credentials = Credentials::new(username, password)?;
    config.save(&credentials)?;
    notifier.success("Configuration saved.");

    let session_cleared = match sessions.clear() {
        Ok(cleared) => cleared,
        Err(e) => {
            tracing::error!("Error removing saved session\nError : {}", e);
            notifier.warning(format!("Could not remove the previous session: {e}"));
            false
        }
    };
    Ok(Report::Configured { session_cleared })
}
