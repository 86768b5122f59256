use super::{json_pretty, load_config, runtime, EXIT_FAILURE, EXIT_SUCCESS};
use lacuna_core::Daemon;
use lacuna_runtime::ReplaySource;
use std::path::Path;
use tokio_util::sync::CancellationToken;

pub fn run(
    config_path: Option<&Path>,
    file: &Path,
    dry_run: bool,
    json: bool,
) -> Result<u8, String> {
    let mut config = load_config(config_path)?;
    if dry_run {
        "memory".clone_into(&mut config.pubsub.provider);
    }
    let daemon = Daemon::new(config).map_err(|e| e.to_string())?;
    let source = ReplaySource::new(file, daemon.decoder());

    let summary = runtime()?
        .block_on(daemon.run(&source, CancellationToken::new()))
        .map_err(|e| e.to_string())?;

    if json {
        println!("{}", json_pretty(&summary)?);
    } else {
        println!(
            "replayed {} event(s): {} subscription action(s) succeeded, {} failed",
            summary.events, summary.succeeded, summary.failed
        );
    }

    if summary.failed > 0 || summary.lost > 0 {
        Ok(EXIT_FAILURE)
    } else {
        Ok(EXIT_SUCCESS)
    }
}
