use super::{load_config, runtime, EXIT_SUCCESS};
use lacuna_core::{install_signal_handler, Daemon};
use lacuna_runtime::DockerCliSource;
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub fn run(config_path: Option<&Path>, docker: &str) -> Result<u8, String> {
    let config = load_config(config_path)?;
    let daemon = Daemon::new(config).map_err(|e| e.to_string())?;
    let source = DockerCliSource::new(daemon.decoder()).with_binary(docker);

    let token = CancellationToken::new();
    install_signal_handler(token.clone()).map_err(|e| e.to_string())?;

    let rt = runtime()?;
    rt.block_on(async {
        if !source.available().await {
            return Err(format!("'{docker}' is not available on PATH"));
        }
        let summary = daemon
            .run(&source, token)
            .await
            .map_err(|e| e.to_string())?;
        info!(
            events = summary.events,
            succeeded = summary.succeeded,
            failed = summary.failed,
            "lacuna daemon stopped"
        );
        Ok::<u8, String>(EXIT_SUCCESS)
    })
}
