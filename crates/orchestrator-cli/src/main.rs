use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::info;

use orchestrator_core::{Config, Result};

/// Security checks for CLI operations.
mod security {
    use std::path::PathBuf;

    /// Refuse to run as root.
    pub fn check_not_root() -> std::result::Result<(), String> {
        #[cfg(unix)]
        {
            let uid = unsafe { libc::getuid() };
            if uid == 0 {
                return Err(
                    "refusing to run as root; run the orchestrator CLI as a non-privileged user"
                        .to_string(),
                );
            }
        }
        Ok(())
    }

    /// Warn (or refuse) if the config file is readable/writable by others.
    pub fn check_config_permissions(path: &PathBuf) -> std::result::Result<(), String> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;

            let metadata =
                std::fs::metadata(path).map_err(|e| format!("cannot read config file: {}", e))?;
            let mode = metadata.permissions().mode();

            if mode & 0o002 != 0 {
                return Err(format!(
                    "config file {} is world-writable; run: chmod 600 {}",
                    path.display(),
                    path.display()
                ));
            }
            if mode & 0o004 != 0 {
                eprintln!(
                    "warning: config file {} is world-readable; consider: chmod 600 {}",
                    path.display(),
                    path.display()
                );
            }
        }
        Ok(())
    }
}

#[derive(Parser)]
#[command(name = "orchestrator")]
#[command(about = "Job Orchestrator and Capacity Manager control CLI")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long, global = true, help = "Configuration file path")]
    config: Option<PathBuf>,

    #[arg(short, long, global = true, help = "Set log level")]
    log_level: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the Job Orchestrator HTTP API server
    Serve {
        #[arg(short = 'H', long, help = "Bind address")]
        host: Option<String>,

        #[arg(short = 'P', long, help = "Port number")]
        port: Option<u16>,

        #[arg(long, help = "Skip automatic database migration on startup")]
        skip_migrate: bool,
    },

    /// Database operations
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },

    /// Print the resolved configuration
    Config,
}

#[derive(Subcommand, Debug)]
pub enum DbCommands {
    /// Run pending migrations
    Migrate,

    /// Drop every table/type and re-run migrations from scratch
    Reset {
        #[arg(long, help = "Skip the confirmation prompt")]
        force: bool,
    },

    /// Print applied-migration and row counts
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Err(e) = security::check_not_root() {
        eprintln!("{}", e);
        std::process::exit(1);
    }

    let log_level = cli.log_level.as_deref().unwrap_or("info");
    tracing_subscriber::fmt().with_env_filter(log_level).init();

    let config = if let Some(ref config_path) = cli.config {
        if let Err(e) = security::check_config_permissions(config_path) {
            eprintln!("{}", e);
            std::process::exit(1);
        }
        Config::load(config_path.to_str().unwrap())?
    } else {
        Config::from_env()?
    };

    match cli.command {
        Commands::Serve { host, port, skip_migrate } => {
            let mut config = config;
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }

            if !skip_migrate {
                info!("running database migrations");
                let pool = orchestrator_core::create_pool(&config.database).await?;
                orchestrator_core::Migrator::new(pool).migrate().await?;
            }

            orchestrator_api::run(config).await?;
        }

        Commands::Db { command } => {
            let pool = orchestrator_core::create_pool(&config.database).await?;
            let migrator = orchestrator_core::Migrator::new(pool);

            match command {
                DbCommands::Migrate => {
                    println!("running database migrations...");
                    migrator.migrate().await?;
                    println!("migrations completed");
                }
                DbCommands::Reset { force } => {
                    if !force {
                        print!("this deletes ALL data — type 'yes' to confirm: ");
                        use std::io::Write;
                        std::io::stdout().flush().ok();

                        let mut input = String::new();
                        std::io::stdin().read_line(&mut input).ok();
                        if input.trim() != "yes" {
                            println!("aborted");
                            return Ok(());
                        }
                    }
                    migrator.reset().await?;
                    println!("database reset complete");
                }
                DbCommands::Status => {
                    let status = migrator.status().await?;
                    println!("applied migrations: {}", status.applied_migrations);
                    println!("jobs:                {}", status.job_count);
                    println!("assignments:         {}", status.assignment_count);
                    println!("results:             {}", status.result_count);
                }
            }
        }

        Commands::Config => {
            println!("{}", toml::to_string_pretty(&config).unwrap_or_default());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serve_parses_with_no_flags() {
        let cli = Cli::parse_from(["orchestrator", "serve"]);
        assert!(matches!(
            cli.command,
            Commands::Serve { skip_migrate: false, .. }
        ));
    }

    #[test]
    fn db_migrate_parses() {
        let cli = Cli::parse_from(["orchestrator", "db", "migrate"]);
        assert!(matches!(
            cli.command,
            Commands::Db { command: DbCommands::Migrate }
        ));
    }
}
