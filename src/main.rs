use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use crossterm::style::Stylize;
use log::{error, LevelFilter};

use remotex::cli::common::App;
use remotex::cli::{Cli, Commands};
use remotex::config::Config;
use remotex::exit_codes::ExitCode;
use remotex::pool::ConnectionPool;
use remotex::ssh::SshConnector;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // init logger
    let level = if cli.debug {
        LevelFilter::Debug
    } else if cli.verbose {
        LevelFilter::Info
    } else {
        LevelFilter::from_str(&cli.log_level).unwrap_or(LevelFilter::Warn)
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();

    let config_path = cli.config_path();
    let config = match Config::load(&config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load config: {:#}", e);
            exit_with(ExitCode::ConfigInvalid, &format!("{:#}", e));
        }
    };

    let connector = Arc::new(SshConnector::new());
    let pool = Arc::new(ConnectionPool::with_max_age(
        connector.clone(),
        Duration::from_secs(config.defaults.pool_max_age),
    ));
    let mut app = App::new(config, config_path, cli.verbose, connector, Arc::clone(&pool));

    let outcome = match cli.command {
        Commands::List => {
            remotex::cli::common::list_servers(&app.config);
            Ok(ExitCode::Success)
        }
        Commands::Server(action) => action.execute(&mut app).await,
        Commands::Exec(cmd) => cmd.execute(&app).await,
        Commands::ExecAll(cmd) => cmd.execute(&app).await,
        Commands::ExecMulti(cmd) => cmd.execute(&app).await,
        Commands::ExecGroup(cmd) => cmd.execute(&app).await,
        Commands::ExecTag(cmd) => cmd.execute(&app).await,
        Commands::Group(action) => action.execute(&mut app),
        Commands::Tag(action) => action.execute(&mut app),
        Commands::Alias(action) => action.execute(&mut app),
        Commands::CmdAlias(action) => action.execute(&mut app),
        Commands::Config(action) => action.execute(&mut app),
        Commands::History(action) => action.execute(&app),
        Commands::Audit(action) => action.execute(&app),
        Commands::PoolStats(cmd) => cmd.execute(&app).await,
        Commands::Quick(cmd) => cmd.execute(&app).await,
    };

    pool.close_all().await;

    match outcome {
        Ok(code) => std::process::exit(code.code()),
        Err(e) => {
            let message = format!("{:#}", e);
            exit_with(ExitCode::classify(&message), &message);
        }
    }
}

fn exit_with(code: ExitCode, message: &str) -> ! {
    eprintln!("{} {}", "❌".red(), message);
    let help = code.help();
    eprintln!("   {}", help.title.bold());
    for suggestion in help.suggestions {
        eprintln!("   • {}", suggestion);
    }
    std::process::exit(code.code());
}
