use std::process::ExitCode;
use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use triomail::config::ServerConfig;
use triomail::dns::Resolver;
use triomail::server::{self, ServerContext};
use triomail::smtp::DeliveryPipeline;
use triomail::storage::MailStore;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let (domain, max_connections) = match parse_args(&args) {
        Some(parsed) => parsed,
        None => {
            eprintln!("Usage: triomail <domain> <max-connections>");
            return ExitCode::FAILURE;
        }
    };

    let config = Arc::new(ServerConfig::new(domain, max_connections));
    info!(
        domain = %config.domain,
        max_connections = config.max_connections,
        storage = %config.storage_root.display(),
        "mail server starting"
    );

    let store = Arc::new(MailStore::new(config.storage_root.clone()));
    let delivery = DeliveryPipeline::new(config.clone(), store.clone(), Resolver::from_system());
    let ctx = Arc::new(ServerContext {
        config,
        store,
        delivery,
    });

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("failed to start runtime: {err}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(server::run(ctx)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("server failed: {err}");
            ExitCode::FAILURE
        }
    }
}

fn parse_args(args: &[String]) -> Option<(String, usize)> {
    if args.len() != 2 {
        return None;
    }
    let domain = args[0].clone();
    if domain.is_empty() {
        return None;
    }
    let max_connections: usize = args[1].parse().ok().filter(|&n| n > 0)?;
    Some((domain, max_connections))
}
