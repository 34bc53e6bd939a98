pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use planwise_core::config::{ConfigOverrides, LoadOptions};

#[derive(Debug, Parser)]
#[command(
    name = "planwise",
    about = "Planwise operator CLI",
    long_about = "Inspect configuration, manage the subscriber database, train the plan classifier, and request plan recommendations.",
    after_help = "Examples:\n  planwise seed\n  planwise recommend sub-001 --count 3\n  planwise train\n  planwise models list"
)]
pub struct Cli {
    #[command(flatten)]
    global: GlobalArgs,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Args)]
struct GlobalArgs {
    #[arg(long, global = true, value_name = "PATH", help = "Read configuration from this TOML file")]
    config: Option<PathBuf>,
    #[arg(long, global = true, value_name = "URL", help = "Override the database URL")]
    database_url: Option<String>,
}

impl GlobalArgs {
    fn load_options(&self) -> LoadOptions {
        LoadOptions {
            config_path: self.config.clone(),
            require_file: self.config.is_some(),
            overrides: ConfigOverrides {
                database_url: self.database_url.clone(),
                ..ConfigOverrides::default()
            },
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Inspect effective configuration values with source attribution")]
    Config,
    #[command(about = "Validate config, database connectivity, and the model artifact store")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the deterministic demo plan catalog, subscribers, and usage history")]
    Seed {
        #[arg(long, help = "Random seed for generated subscribers and usage")]
        seed: Option<u64>,
        #[arg(long, help = "Number of demo subscribers to generate")]
        subscribers: Option<usize>,
    },
    #[command(about = "Recommend plans for a subscriber")]
    Recommend {
        subscriber_id: String,
        #[arg(long, help = "Number of plans to return")]
        count: Option<usize>,
    },
    #[command(about = "Train a new plan classifier version and activate it")]
    Train,
    #[command(subcommand, about = "Inspect or switch stored model versions")]
    Models(ModelsCommand),
}

#[derive(Debug, Subcommand)]
enum ModelsCommand {
    #[command(about = "List stored model versions and the active one")]
    List,
    #[command(about = "Activate a previously stored model version")]
    Activate { version: String },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let options = cli.global.load_options();

    let result = match cli.command {
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run(&options) }
        }
        Command::Doctor { json } => {
            let (output, passed) = commands::doctor::run(&options, json);
            commands::CommandResult { exit_code: if passed { 0 } else { 1 }, output }
        }
        Command::Migrate => commands::migrate::run(&options),
        Command::Seed { seed, subscribers } => commands::seed::run(&options, seed, subscribers),
        Command::Recommend { subscriber_id, count } => {
            commands::recommend::run(&options, &subscriber_id, count)
        }
        Command::Train => commands::train::run(&options),
        Command::Models(ModelsCommand::List) => commands::models::list(&options),
        Command::Models(ModelsCommand::Activate { version }) => {
            commands::models::activate(&options, &version)
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::{Cli, Command, ModelsCommand};

    #[test]
    fn global_flags_build_load_options() {
        let cli = Cli::parse_from([
            "planwise",
            "recommend",
            "sub-001",
            "--count",
            "3",
            "--database-url",
            "sqlite::memory:",
        ]);

        let options = cli.global.load_options();
        assert_eq!(options.overrides.database_url.as_deref(), Some("sqlite::memory:"));
        assert!(!options.require_file);
        assert!(matches!(
            cli.command,
            Command::Recommend { ref subscriber_id, count: Some(3) } if subscriber_id == "sub-001"
        ));
    }

    #[test]
    fn models_activate_takes_a_version() {
        let cli = Cli::parse_from(["planwise", "models", "activate", "v20260101T000000Z"]);
        assert!(matches!(
            cli.command,
            Command::Models(ModelsCommand::Activate { ref version }) if version == "v20260101T000000Z"
        ));
    }
}
