mod cli;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use status_monitor::{
    Config, HistoryStore, LibsqlHistoryStore, MemoryHistoryStore, Monitor, ServiceStatus, Status,
};
use tracing::{info, warn};

use crate::cli::{CheckArgs, Cli, Commands, RunArgs};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    logger::init_with_verbosity(logger::Verbosity::from_occurrences(cli.verbose));

    let config = Config::from_config(cli.config.as_ref()).context("failed to load config")?;

    match cli.command.unwrap_or(Commands::Run(RunArgs::default())) {
        Commands::Run(args) => run(config, args).await,
        Commands::Check(args) => check(config, args).await,
        Commands::Config => {
            println!("{config}");
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn open_history(config: &Config, args: &RunArgs) -> Option<Arc<dyn HistoryStore>> {
    if args.no_storage || !config.storage.enabled {
        info!("Check history kept in memory only");
        return Some(Arc::new(MemoryHistoryStore::default()));
    }

    let data_dir = args.data_dir.as_ref().unwrap_or(&config.storage.data_dir);
    match LibsqlHistoryStore::open(data_dir).await {
        Ok(store) => Some(Arc::new(store)),
        Err(e) => {
            warn!(
                error = %e,
                path = %data_dir.display(),
                "Failed to open history store, running without persistence"
            );
            None
        }
    }
}

async fn run(config: Config, args: RunArgs) -> Result<ExitCode> {
    let services = config.services()?;
    if services.is_empty() {
        warn!("No services configured");
    }

    let history = open_history(&config, &args).await;
    let monitor = Monitor::new(services, history).await?;
    let mut updates = monitor.subscribe().await;
    monitor.start();

    let mut overall = monitor.get_overall_status().await;
    info!(status = %overall, "Overall status");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                break;
            }
            update = updates.receiver.recv() => {
                let Some(status) = update else { break };
                info!(
                    service = %status.name,
                    status = %status.status,
                    response_time_ms = status.response_time_ms,
                    uptime = format_args!("{:.1}", status.uptime),
                    "Status update"
                );

                let current = monitor.get_overall_status().await;
                if current != overall {
                    info!(from = %overall, to = %current, "Overall status changed");
                    overall = current;
                }
            }
        }
    }

    monitor.unsubscribe(updates.id).await;
    monitor.shutdown().await;
    Ok(ExitCode::SUCCESS)
}

async fn check(config: Config, args: CheckArgs) -> Result<ExitCode> {
    let monitor = Monitor::new(config.services()?, None).await?;

    let statuses = match &args.service {
        Some(name) => match monitor.check_now(name).await {
            Some(status) => vec![(*status).clone()],
            None => bail!("unknown service: {name}"),
        },
        None => monitor.check_all().await,
    };

    print_table(&statuses);
    if args.service.is_none() {
        println!("\noverall: {}", status_monitor::aggregate(statuses.iter().map(|s| s.status)));
    }

    if statuses.iter().any(|status| status.status == Status::Down) {
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

fn print_table(statuses: &[ServiceStatus]) {
    let width = statuses.iter().map(|status| status.name.len()).max().unwrap_or(0).max(7);
    println!("{:<width$}  {:<11}  {:>8}  {:>5}  MESSAGE", "SERVICE", "STATUS", "TIME", "CODE");
    for status in statuses {
        println!(
            "{:<width$}  {:<11}  {:>6}ms  {:>5}  {}",
            status.name,
            status.status.as_str(),
            status.response_time_ms,
            status.status_code,
            status.error_message
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    use tokio::net::TcpListener;

    fn load_config(dir: &Path, body: &str) -> Config {
        let path = dir.join("config.toml");
        std::fs::write(&path, body).unwrap();
        Config::from_config(Some(&path)).unwrap()
    }

    #[tokio::test]
    async fn test_check_exit_code_follows_down_services() {
        let dir = tempfile::tempdir().unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let open = listener.local_addr().unwrap();
        let closed = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap()
        };

        let config = load_config(
            dir.path(),
            &format!(
                r#"
                [[services]]
                name = "open"
                type = "tcp"
                host = "{}"
                port = {}
                timeout = 1

                [[services]]
                name = "closed"
                type = "tcp"
                host = "{}"
                port = {}
                timeout = 1
                "#,
                open.ip(),
                open.port(),
                closed.ip(),
                closed.port()
            ),
        );

        let only_open = CheckArgs { service: Some("open".to_string()) };
        assert_eq!(check(config.clone(), only_open).await.unwrap(), ExitCode::SUCCESS);

        let all = CheckArgs { service: None };
        assert_eq!(check(config.clone(), all).await.unwrap(), ExitCode::FAILURE);

        let missing = CheckArgs { service: Some("missing".to_string()) };
        assert!(check(config, missing).await.is_err());
    }

    #[tokio::test]
    async fn test_history_store_selection() {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().join("data");
        let config = load_config(
            dir.path(),
            &format!("[storage]\ndata_dir = \"{}\"\n", data_dir.display()),
        );

        let in_memory = RunArgs { no_storage: true, data_dir: None };
        assert!(open_history(&config, &in_memory).await.is_some());
        assert!(!data_dir.exists());

        let override_dir = dir.path().join("override");
        let on_disk = RunArgs { no_storage: false, data_dir: Some(override_dir.clone()) };
        assert!(open_history(&config, &on_disk).await.is_some());
        assert!(override_dir.join("status.db").exists());
        assert!(!data_dir.exists());
    }
}
