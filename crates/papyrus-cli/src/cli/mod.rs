//! CLI entry and dispatch.

use anyhow::{Context, Result};
use clap::Parser;
use clap::builder::PossibleValuesParser;
use papyrus_core::{config, logging};
use papyrus_types::QuerySettings;

mod commands;

#[derive(Parser)]
#[command(name = "papyrus")]
#[command(version)]
#[command(about = "Ask questions about your document collection")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Ask a question and stream the answer
    Ask {
        /// The question to ask
        #[arg(value_name = "QUERY")]
        query: String,

        /// Number of chunks to retrieve (1-20)
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..=20))]
        top_k: Option<u32>,

        /// Keyword search weight (0.0-1.0); semantic weight is 1 - this
        #[arg(long, value_parser = parse_weight)]
        bm25_weight: Option<f64>,

        /// Prompt template
        #[arg(
            long,
            value_parser = PossibleValuesParser::new(QuerySettings::PROMPT_TEMPLATES.iter().copied())
        )]
        template: Option<String>,

        /// Print the final answer as HTML instead of streaming text
        #[arg(long)]
        html: bool,
    },

    /// Manage query history
    History {
        #[command(subcommand)]
        command: HistoryCommands,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(clap::Subcommand)]
enum HistoryCommands {
    /// Lists past queries grouped by day
    List {
        /// Only entries whose query or answer contains TERM
        #[arg(long, value_name = "TERM")]
        search: Option<String>,
    },
    /// Shows one entry with its settings and full answer
    Show {
        #[arg(value_name = "ID")]
        id: i64,
    },
    /// Toggles the favorite flag of an entry
    Favorite {
        #[arg(value_name = "ID")]
        id: i64,
    },
    /// Deletes an entry
    Delete {
        #[arg(value_name = "ID")]
        id: i64,
    },
    /// Deletes all history
    Clear,
}

#[derive(clap::Subcommand)]
enum ConfigCommands {
    /// Show the path to the config file
    Path,
    /// Initialize a default config file (if not present)
    Init,
}

fn parse_weight(raw: &str) -> Result<f64, String> {
    let value: f64 = raw
        .parse()
        .map_err(|e| format!("`{raw}` is not a number: {e}"))?;
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(format!("{value} is not in 0.0..=1.0"))
    }
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::Config { command } = &cli.command {
        return match command {
            ConfigCommands::Path => commands::config::path(),
            ConfigCommands::Init => commands::config::init(),
        };
    }

    let config = config::Config::load().context("load config")?;
    let _log_guard = logging::init(&config.log_level).context("init logging")?;

    // one tokio runtime for everything
    let rt = tokio::runtime::Runtime::new().context("create tokio runtime")?;
    rt.block_on(async move { dispatch(cli, &config).await })
}

async fn dispatch(cli: Cli, config: &config::Config) -> Result<()> {
    match cli.command {
        Commands::Ask {
            query,
            top_k,
            bm25_weight,
            template,
            html,
        } => {
            commands::ask::run(
                commands::ask::AskOptions {
                    query,
                    top_k,
                    bm25_weight,
                    template,
                    html,
                },
                config,
            )
            .await
        }
        Commands::History { command } => match command {
            HistoryCommands::List { search } => commands::history::list(search.as_deref()),
            HistoryCommands::Show { id } => commands::history::show(id),
            HistoryCommands::Favorite { id } => commands::history::favorite(id),
            HistoryCommands::Delete { id } => commands::history::delete(id),
            HistoryCommands::Clear => commands::history::clear(),
        },
        Commands::Config { .. } => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_weight_bounds() {
        assert_eq!(parse_weight("0.25"), Ok(0.25));
        assert!(parse_weight("1.5").is_err());
        assert!(parse_weight("abc").is_err());
    }
}
