use std::env;
use std::process::ExitCode;
use std::sync::Arc;

use iso_gateway::csv::{read_requests, write_responses};
use iso_gateway::{Gateway, GatewayConfig};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("warn".parse().unwrap()))
        .with_writer(std::io::stderr)
        .init();

    let mut args = env::args().skip(1);
    let path = args
        .next()
        .expect("usage: iso-gateway <requests.csv> [config.toml]");

    if !path.ends_with(".csv") {
        warn!(path, "input file seems to not be a csv file");
    }

    let config = match args.next() {
        Some(config_path) => match GatewayConfig::load(&config_path) {
            Ok(config) => config,
            Err(e) => {
                error!(path = config_path, error = %e, "failed to load configuration");
                return ExitCode::FAILURE;
            }
        },
        None => GatewayConfig::default(),
    };

    // owned path: the row iterator moves into the reader task
    let requests = match read_requests(path.clone()) {
        Ok(requests) => requests,
        Err(e) => {
            error!(path, error = %e, "failed to open requests");
            return ExitCode::FAILURE;
        }
    };

    let gateway = match Gateway::connect(config).await {
        Ok(gateway) => Arc::new(gateway),
        Err(e) => {
            error!(error = %e, "failed to start gateway");
            return ExitCode::FAILURE;
        }
    };

    let (request_sender, request_receiver) = tokio::sync::mpsc::channel(16);

    tokio::spawn(async move {
        for result in requests {
            match result {
                Ok(request) => {
                    if request_sender.send(request).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!("{e}");
                }
            }
        }
    });

    let responses = gateway.run(ReceiverStream::new(request_receiver)).await;
    gateway.shutdown().await;

    if let Err(e) = write_responses(&responses) {
        error!(error = %e, "failed to write responses");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
