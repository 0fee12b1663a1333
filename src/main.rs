//! # Chryonsus CLI (`chry`)
//!
//! ## Usage
//!
//! ```bash
//! chry --config ./config/chry.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `chry init` | Create the SQLite database and run schema migrations |
//! | `chry project add <name> <url>` | Register a project and print its id |
//! | `chry sync <project>` | Summarize and store the project's newest commits |
//! | `chry ask <project> "<question>"` | Answer a question about the codebase |
//! | `chry serve` | Start the HTTP server |
//!
//! Logs go to stderr and honour `RUST_LOG` (default `info`); command output
//! goes to stdout.

use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use chryonsus::config;
use chryonsus::migrate;
use chryonsus::models::Project;
use chryonsus::server;
use chryonsus::services::Services;
use chryonsus::store::sqlite::SqliteStore;
use chryonsus::{ask_question, db, sync_commits};

/// Chryonsus — commit summaries and codebase Q&A for GitHub projects.
#[derive(Parser)]
#[command(name = "chry", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/chry.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Manage projects.
    Project {
        #[command(subcommand)]
        action: ProjectAction,
    },

    /// Fetch the newest commits of a project, summarize and store them.
    Sync {
        /// Project id.
        project: String,
    },

    /// Ask a question about a project's codebase.
    Ask {
        /// Project id.
        project: String,

        /// The question.
        question: String,

        /// Also print the files used as context.
        #[arg(long)]
        sources: bool,
    },

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

#[derive(Subcommand)]
enum ProjectAction {
    /// Register a project.
    Add {
        /// Display name.
        name: String,

        /// GitHub repository URL, e.g. `https://github.com/owner/repo`.
        github_url: String,

        /// Per-project GitHub token overriding `[github].token_env`.
        #[arg(long)]
        token: Option<String>,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Project { action } => match action {
            ProjectAction::Add {
                name,
                github_url,
                token,
            } => {
                let store = SqliteStore::new(db::connect(&cfg).await?);
                let project = Project {
                    id: Uuid::new_v4().to_string(),
                    name,
                    github_url: Some(github_url),
                    github_token: token,
                };
                store.insert_project(&project).await?;
                println!("{}", project.id);
            }
        },
        Commands::Sync { project } => {
            let services = Services::from_config(&cfg).await?;
            let inserted = sync_commits(&services, &project).await?;
            if inserted.is_empty() {
                println!("No new commits.");
            }
            for commit in &inserted {
                let short = commit.commit_hash.get(..7).unwrap_or(&commit.commit_hash);
                println!("{}  {}  {}", short, commit.commit_date, first_line(&commit.summary));
            }
            println!("Inserted {} commit(s).", inserted.len());
        }
        Commands::Ask {
            project,
            question,
            sources,
        } => {
            let services = Services::from_config(&cfg).await?;
            let resp = ask_question(&services, &question, &project).await?;

            if sources {
                for file in &resp.file_references {
                    match file.similarity {
                        Some(sim) => eprintln!("  {:.3}  {}", sim, file.file_name),
                        None => eprintln!("  -      {}", file.file_name),
                    }
                }
            }

            let mut answer = resp.answer;
            let mut stdout = std::io::stdout();
            while let Some(chunk) = answer.recv().await {
                write!(stdout, "{}", chunk?)?;
                stdout.flush()?;
            }
            writeln!(stdout)?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or("")
}
