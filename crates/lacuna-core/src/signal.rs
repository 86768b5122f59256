use crate::CoreError;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio_util::sync::CancellationToken;

static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);

/// Cancel `token` on the first Ctrl-C or SIGTERM; exit on the second.
///
/// Can be installed once per process.
pub fn install_signal_handler(token: CancellationToken) -> Result<(), CoreError> {
    ctrlc::set_handler(move || {
        if SHUTDOWN_REQUESTED.swap(true, Ordering::SeqCst) {
            std::process::exit(1);
        }
        eprintln!("\nshutdown requested, draining in-flight subscription calls...");
        token.cancel();
    })
    .map_err(|e| CoreError::Signal(e.to_string()))
}
