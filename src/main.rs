use std::process::ExitCode;

use clap::Parser;
use laravel_backup_lib::butler::Butler;
use laravel_backup_lib::cli::Cli;
use laravel_backup_lib::config::ConfigurationError;

fn main() -> ExitCode {
    // settings may live in .env next to the cron job
    let dotenv = dotenvy::dotenv();
    let cli = Cli::parse();

    // init logger
    cli.logger().try_init().expect("env_logger should not fail");

    match dotenv {
        Ok(path) => log::debug!("Read settings from {}", path.display()),
        Err(e) if e.not_found() => log::debug!("No .env file found, using environment only"),
        Err(e) => {
            log::error!("{}", ConfigurationError::EnvFile(e));
            return ExitCode::FAILURE;
        }
    }

    let config = match cli.run_config() {
        Ok(config) => config,
        Err(e) => {
            log::error!("{e}");
            return ExitCode::FAILURE;
        }
    };
    log::info!(
        "Project root: {}, project depth: {}",
        config.root.display(),
        config.depth
    );

    let butler = Butler::new(config)
        .with_mysqldump(cli.mysqldump())
        .with_artisan(cli.artisan());

    match butler.run() {
        Ok(summary) => {
            log::info!("Execution finished at {}", summary.finished_at);
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}
