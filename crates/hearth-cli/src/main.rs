use clap::Parser;
use owo_colors::{OwoColorize, Style};

use hearth_core::db;
use hearth_core::error::{AccessError, CoreError};
use hearth_core::events::EventBus;
use hearth_core::repository::SqliteRepository;

mod cli;
mod commands;
mod config;
mod views;

#[tokio::main]
async fn main() {
    let config = config::Config::new().unwrap_or_default();

    let db_pool = match db::establish_connection(&config.database_path).await {
        Ok(pool) => pool,
        Err(e) => {
            eprintln!("{} {}", "Error:".red().bold(), e);
            std::process::exit(1);
        }
    };

    // The CLI has no dispatcher wired; domain events are dropped.
    let repository = SqliteRepository::new(
        db_pool,
        config.generation.to_core(),
        EventBus::disconnected(),
    );

    let cli = cli::Cli::parse();

    let result = match cli.command {
        cli::Commands::Sweep(command) => commands::sweep::run_sweep(&repository, command).await,
        cli::Commands::Preview(command) => {
            commands::series::preview_command(&repository, command).await
        }
        cli::Commands::Skip(command) => commands::series::skip_command(&repository, command).await,
        cli::Commands::Unskip(command) => {
            commands::series::unskip_command(&repository, command).await
        }
        cli::Commands::Pause(command) => {
            commands::series::pause_command(&repository, command).await
        }
        cli::Commands::Resume(command) => {
            commands::series::resume_command(&repository, command).await
        }
        cli::Commands::Series(command) => {
            commands::series::series_command(&repository, command, &config).await
        }
    };

    if let Err(e) = result {
        handle_error(e);
        std::process::exit(1);
    }
}

fn handle_error(err: anyhow::Error) {
    let error_style = Style::new().red().bold();

    if let Some(core_error) = err.downcast_ref::<CoreError>() {
        match core_error {
            CoreError::NotFound(s) => {
                eprintln!("{} {}", "Error:".style(error_style), s);
            }
            CoreError::InvalidInput(s) => {
                eprintln!("{} Invalid input: {}", "Error:".style(error_style), s);
            }
            CoreError::InvalidRule(s) => {
                eprintln!(
                    "{} Invalid recurrence rule: {}",
                    "Error:".style(error_style),
                    s.yellow()
                );
            }
            CoreError::OwnerRoleImmutable => {
                eprintln!(
                    "{} The OWNER role cannot be edited, deleted, or reassigned.",
                    "Error:".style(error_style)
                );
            }
            CoreError::RoleInUse(s) => {
                eprintln!("{} {}", "Error:".style(error_style), s);
            }
            CoreError::DuplicateRoleName(name) => {
                eprintln!(
                    "{} A role named '{}' already exists in this scope.",
                    "Error:".style(error_style),
                    name.yellow()
                );
            }
            CoreError::Access(access) => match access {
                AccessError::Forbidden { required, role } => {
                    eprintln!(
                        "{} Permission '{}' is required; the '{}' role does not grant it.",
                        "Error:".style(error_style),
                        required.yellow(),
                        role.yellow()
                    );
                }
                other => eprintln!("{} {}", "Error:".style(error_style), other),
            },
            _ => eprintln!("{} {}", "Error:".style(error_style), err),
        }
    } else {
        eprintln!("{} {}", "Error:".style(error_style), err);
    }
}
