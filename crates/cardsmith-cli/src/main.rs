use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod logging;

#[derive(Parser)]
#[command(name = "cardsmith")]
#[command(about = "Cardsmith CLI - turn study text into cards", long_about = None)]
struct Cli {
    /// Use this directory for config and saved sessions instead of the platform defaults
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Keep sessions in memory only
    #[arg(long, global = true)]
    ephemeral: bool,

    /// Debug logging for the engine (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate cards from a text file or inline text
    Generate(commands::generate::GenerateArgs),
    /// Show which text would be sent to the generation service
    Resolve(commands::resolve::SourceArgs),
    /// Manage saved sessions
    Sessions {
        #[command(subcommand)]
        action: SessionsAction,
    },
    /// Show the configuration in effect
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum SessionsAction {
    /// List saved sessions, most recent first
    List,
    /// Print one session as JSON
    Show { id: String },
    /// Make a session active
    Restore { id: String },
    /// Delete a session
    Delete { id: String },
    /// Delete every saved session
    Clear {
        /// Required: confirms the deletion
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the config file location
    Path,
    /// Print the effective configuration as TOML
    Show,
    /// Write the default configuration if no config file exists
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let options = commands::bootstrap::BootstrapOptions {
        data_dir: cli.data_dir,
        ephemeral: cli.ephemeral,
    };

    match cli.command {
        Commands::Generate(args) => commands::generate::run(&options, args).await?,
        Commands::Resolve(args) => commands::resolve::run(&options, &args)?,
        Commands::Sessions { action } => match action {
            SessionsAction::List => commands::sessions::list(&options).await?,
            SessionsAction::Show { id } => commands::sessions::show(&options, &id).await?,
            SessionsAction::Restore { id } => commands::sessions::restore(&options, &id).await?,
            SessionsAction::Delete { id } => commands::sessions::delete(&options, &id).await?,
            SessionsAction::Clear { yes } => commands::sessions::clear(&options, yes).await?,
        },
        Commands::Config { action } => match action {
            ConfigAction::Path => commands::config::path(&options)?,
            ConfigAction::Show => commands::config::show(&options)?,
            ConfigAction::Init => commands::config::init(&options)?,
        },
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_generate_with_highlights() {
        let cli = Cli::try_parse_from([
            "cardsmith",
            "--ephemeral",
            "generate",
            "A then B",
            "--highlight",
            "0:A",
            "-n",
            "5",
        ])
        .unwrap();

        assert!(cli.ephemeral);
        match cli.command {
            Commands::Generate(args) => {
                assert_eq!(args.source.highlights, vec!["0:A".to_string()]);
                assert_eq!(args.max_cards, Some(5));
            }
            _ => panic!("expected generate"),
        }
    }
}
