mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use judge_common::config::Config;
use judge_common::problems::ProblemStore;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "judge-cli")]
#[command(about = "Judge CLI - Inspect problems, submit code and read results", long_about = None)]
struct Cli {
    /// Redis URL (defaults to $REDIS_URL)
    #[arg(long, global = true)]
    redis_url: Option<String>,

    /// Problem directory (defaults to $PROBLEMS_DIR)
    #[arg(long, global = true)]
    problems_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List every problem
    Problems,

    /// Show a problem as solvers see it
    Show {
        /// Problem id
        id: String,
    },

    /// Check every problem file for errors
    Validate,

    /// Queue a submission
    Submit {
        /// Problem id
        #[arg(short, long)]
        problem: String,

        /// Source file to submit
        #[arg(short, long)]
        file: PathBuf,

        /// Judge against private tests too
        #[arg(long, default_value = "false")]
        all: bool,

        /// Poll until the result is DONE
        #[arg(short, long, default_value = "false")]
        wait: bool,

        /// Give up waiting after this many seconds
        #[arg(long, default_value = "60")]
        timeout: u64,
    },

    /// Show the result of a submission
    Result {
        /// Submission id
        id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut config = Config::from_env();
    if let Some(url) = cli.redis_url {
        config.redis_url = url;
    }
    if let Some(dir) = cli.problems_dir {
        config.problems_dir = dir;
    }
    let problems = ProblemStore::new(&config.problems_dir);

    match cli.command {
        Commands::Problems => {
            commands::list_problems(&problems)?;
        }
        Commands::Show { id } => {
            commands::show_problem(&problems, &id)?;
        }
        Commands::Validate => {
            commands::validate_problems(&problems)?;
        }
        Commands::Submit {
            problem,
            file,
            all,
            wait,
            timeout,
        } => {
            let store = commands::connect(&config.redis_url).await?;
            commands::submit(
                &store,
                &problems,
                &problem,
                &file,
                all,
                wait.then(|| std::time::Duration::from_secs(timeout)),
            )
            .await?;
        }
        Commands::Result { id } => {
            let store = commands::connect(&config.redis_url).await?;
            commands::show_result(&store, &id).await?;
        }
    }

    Ok(())
}
