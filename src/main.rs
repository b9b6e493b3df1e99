mod commands;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use std::env;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use ticketdesk::app::App;
use ticketdesk::config::AppConfig;
use ticketdesk::db::Database;
use ticketdesk::kv::KeyValueStore;
use ticketdesk::ui::{Confirm, Level};

const DIR_NAME: &str = ".ticketdesk";

#[derive(Parser)]
#[command(name = "ticketdesk")]
#[command(about = "A local-first support ticket tracker")]
#[command(version)]
struct Cli {
    /// Data directory (defaults to the nearest .ticketdesk upwards)
    #[arg(long, global = true, env = "TICKETDESK_DIR")]
    dir: Option<PathBuf>,

    /// Session timeout in minutes
    #[arg(long, global = true, env = "TICKETDESK_SESSION_TIMEOUT")]
    session_timeout: Option<i64>,

    /// Byte quota for the store
    #[arg(long, global = true, env = "TICKETDESK_QUOTA_BYTES")]
    quota_bytes: Option<usize>,

    /// Log output format
    #[arg(long, global = true, env = "TICKETDESK_LOG_FORMAT", value_enum, default_value = "text")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize ticketdesk in the current directory
    Init,

    /// Log in (the session is remembered for later commands)
    Login {
        /// Account email
        email: String,
        /// Password
        #[arg(short, long, env = "TICKETDESK_PASSWORD", hide_env_values = true)]
        password: Option<String>,
        /// Demo login without password
        #[arg(long)]
        quick: bool,
        /// Do not keep the session after this command
        #[arg(long)]
        no_remember: bool,
    },

    /// Log out and forget the remembered session
    Logout,

    /// Show the logged-in user
    Whoami,

    /// Create a new ticket
    Create {
        /// Customer name
        customer: String,
        /// Problem description
        #[arg(short, long)]
        description: String,
        #[arg(long)]
        company: Option<String>,
        #[arg(long)]
        phone: Option<String>,
        /// Customer email
        #[arg(short, long)]
        email: Option<String>,
        #[arg(short, long)]
        assignee: Option<String>,
        #[arg(short, long)]
        group: Option<String>,
        #[arg(short, long)]
        category: Option<String>,
        /// Priority (Low, Normal, High, Critical)
        #[arg(short, long)]
        priority: Option<String>,
    },

    /// List tickets
    List {
        /// Filter by status
        #[arg(short, long)]
        status: Option<String>,
        /// Filter by priority
        #[arg(short, long)]
        priority: Option<String>,
        /// Filter by assignee
        #[arg(short, long)]
        assignee: Option<String>,
        /// Search customer, company and description
        #[arg(short = 'q', long)]
        search: Option<String>,
    },

    /// Show ticket details
    Show {
        /// Ticket ID
        id: i64,
    },

    /// Change the status of a ticket
    Status {
        /// Ticket ID
        id: i64,
        /// New status (Open, In Progress, Resolved, Closed)
        status: String,
    },

    /// Assign a ticket (empty name to unassign)
    Assign {
        /// Ticket ID
        id: i64,
        /// Assignee name
        assignee: String,
    },

    /// Add a comment to a ticket
    Comment {
        /// Ticket ID
        id: i64,
        /// Comment text
        text: String,
    },

    /// Delete a ticket
    Delete {
        /// Ticket ID
        id: i64,
        /// Skip confirmation
        #[arg(short, long)]
        force: bool,
    },

    /// Ticket totals per status
    Stats,

    /// User management
    User {
        #[command(subcommand)]
        action: UserCommands,
    },

    /// Export all data as JSON (passwords redacted)
    Export {
        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Import tickets and settings from an export
    Import {
        /// Input file
        input: PathBuf,
    },

    /// Storage usage
    Info,

    /// Remove all tickets, users and settings
    Clear {
        /// Skip confirmation
        #[arg(short, long)]
        force: bool,
    },

    /// Show or switch the current tab
    Tab {
        /// dashboard, tickets, create or admin
        tab: Option<String>,
    },

    /// Show or switch the theme
    Theme {
        /// light or dark
        theme: Option<String>,
    },

    /// Run a health check
    Health {
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Interactive session with timers and notifications
    Shell,
}

#[derive(Subcommand)]
pub enum UserCommands {
    /// List all users
    List,
    /// Create a user
    Create {
        name: String,
        email: String,
        #[arg(short, long)]
        password: String,
        /// admin, user or guest
        #[arg(short, long, default_value = "user")]
        role: String,
    },
    /// Delete a user
    Delete {
        email: String,
        /// Skip confirmation
        #[arg(short, long)]
        force: bool,
    },
}

/// Yes/no answers read from stdin.
pub struct StdinPrompt;

impl Confirm for StdinPrompt {
    fn confirm(&mut self, message: &str) -> bool {
        print!("{} [y/N] ", message);
        if io::stdout().flush().is_err() {
            return false;
        }
        let mut input = String::new();
        match io::stdin().lock().read_line(&mut input) {
            Ok(_) => input.trim().eq_ignore_ascii_case("y"),
            Err(_) => false,
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn find_ticketdesk_dir(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(dir) = explicit {
        if dir.is_dir() {
            return Ok(dir.to_path_buf());
        }
        bail!("Data directory {} does not exist. Run 'ticketdesk init' first.", dir.display());
    }

    let mut current = env::current_dir()?;
    loop {
        let candidate = current.join(DIR_NAME);
        if candidate.exists() && candidate.is_dir() {
            return Ok(candidate);
        }

        if !current.pop() {
            bail!("Not a ticketdesk directory (or any parent). Run 'ticketdesk init' first.");
        }
    }
}

fn build_config(cli: &Cli) -> Result<AppConfig> {
    let mut config = AppConfig::default();
    if let Some(minutes) = cli.session_timeout {
        config.session.timeout_minutes = minutes;
    }
    config.validate()?;
    Ok(config)
}

fn open_store(dir: &Path, quota: Option<usize>) -> Result<Database> {
    let path = dir.join(commands::init::STORE_FILE);
    let db = Database::open(&path).context("Failed to open store")?;
    Ok(db.with_quota(quota))
}

/// Start the app and pick up a remembered session.
fn open_app(cli: &Cli, now: DateTime<Utc>) -> Result<App<Database>> {
    let dir = find_ticketdesk_dir(cli.dir.as_deref())?;
    let store = open_store(&dir, cli.quota_bytes)?;
    let mut app = App::start(store, build_config(cli)?, now)?;

    let (auth, mut ctx) = app.parts(now);
    auth.check_remember_token(&mut ctx);
    Ok(app)
}

/// One-shot commands only surface warnings; results and errors are printed
/// by the command itself.
fn flush_notices<S: KeyValueStore>(app: &mut App<S>) {
    for notice in app.ui_mut().notifications.take_pending() {
        if notice.level == Level::Warning {
            eprintln!("Warning: {}", notice.message);
        }
    }
}

pub fn dispatch<S: KeyValueStore>(
    app: &mut App<S>,
    command: Commands,
    prompt: &mut dyn Confirm,
    now: DateTime<Utc>,
) -> Result<()> {
    match command {
        Commands::Init | Commands::Shell => bail!("Command not available here"),

        Commands::Login {
            email,
            password,
            quick,
            no_remember,
        } => {
            if quick {
                commands::session::quick_login(app, &email, !no_remember, now)
            } else {
                let Some(password) = password else {
                    bail!("A password is required (use --password or TICKETDESK_PASSWORD)");
                };
                commands::session::login(app, &email, &password, !no_remember, now)
            }
        }

        Commands::Logout => commands::session::logout(app, now),

        Commands::Whoami => commands::session::whoami(app),

        Commands::Create {
            customer,
            description,
            company,
            phone,
            email,
            assignee,
            group,
            category,
            priority,
        } => {
            let new = ticketdesk::tickets::NewTicket {
                customer_name: customer,
                company: company.unwrap_or_default(),
                phone: phone.unwrap_or_default(),
                customer_email: email.unwrap_or_default(),
                assignee: assignee.unwrap_or_default(),
                group: group.unwrap_or_default(),
                category: category.unwrap_or_default(),
                priority,
                description,
            };
            commands::create::run(app, new, now)
        }

        Commands::List {
            status,
            priority,
            assignee,
            search,
        } => {
            let filter = ticketdesk::tickets::TicketFilter {
                status,
                priority,
                assignee,
                search,
            };
            commands::list::run(app, &filter)
        }

        Commands::Show { id } => commands::show::run(app, id),

        Commands::Status { id, status } => commands::status::set(app, id, &status, now),

        Commands::Assign { id, assignee } => commands::status::assign(app, id, &assignee, now),

        Commands::Comment { id, text } => commands::comment::run(app, id, &text, now),

        Commands::Delete { id, force } => commands::delete::run(app, id, force, prompt, now),

        Commands::Stats => commands::stats::run(app),

        Commands::User { action } => match action {
            UserCommands::List => commands::user::list(app),
            UserCommands::Create {
                name,
                email,
                password,
                role,
            } => commands::user::create(app, &name, &email, &password, &role, now),
            UserCommands::Delete { email, force } => {
                commands::user::delete(app, &email, force, prompt, now)
            }
        },

        Commands::Export { output } => commands::export::run(app, output.as_deref(), now),

        Commands::Import { input } => commands::import::run(app, &input, now),

        Commands::Info => commands::info::run(app),

        Commands::Clear { force } => commands::clear::run(app, force, prompt, now),

        Commands::Tab { tab } => commands::view::tab(app, tab.as_deref()),

        Commands::Theme { theme } => commands::view::theme(app, theme.as_deref()),

        Commands::Health { json } => commands::health::run(app, json, now),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    match cli.command {
        Commands::Init => {
            let cwd = env::current_dir()?;
            let dir = cli.dir.clone().unwrap_or_else(|| cwd.join(DIR_NAME));
            commands::init::run(&dir, build_config(&cli)?, Utc::now())
        }

        Commands::Shell => {
            let mut app = open_app(&cli, Utc::now())?;
            commands::shell::run(&mut app)
        }

        _ => {
            let now = Utc::now();
            let mut app = open_app(&cli, now)?;
            let result = dispatch(&mut app, cli.command, &mut StdinPrompt, now);
            flush_notices(&mut app);
            result
        }
    }
}
