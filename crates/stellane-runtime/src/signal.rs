//! OS signal handling: `SIGINT`/`SIGTERM` request a graceful stop; `SIGPIPE`
//! is drained and ignored so a client disconnecting mid-write doesn't take
//! down a worker thread.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use signal_hook::consts::{SIGINT, SIGPIPE, SIGTERM};
use signal_hook::iterator::Signals;

/// Spawns a background thread that watches for termination signals and
/// flips `shutdown` once one arrives. Returns immediately; the watcher
/// thread runs for the life of the process (there is no handle to join,
/// matching `Signals`' own blocking-iterator shape).
pub fn watch_for_shutdown(shutdown: Arc<AtomicBool>) {
    let mut signals = match Signals::new([SIGINT, SIGTERM, SIGPIPE]) {
        Ok(signals) => signals,
        Err(error) => {
            tracing::warn!(%error, "failed to install signal handlers");
            return;
        }
    };

    std::thread::Builder::new()
        .name("stellane-signal-watcher".into())
        .spawn(move || {
            for signal in signals.forever() {
                match signal {
                    SIGINT | SIGTERM => {
                        tracing::info!(signal, "received shutdown signal");
                        shutdown.store(true, Ordering::Release);
                        break;
                    }
                    SIGPIPE => {
                        tracing::trace!("ignoring SIGPIPE");
                    }
                    other => {
                        tracing::debug!(signal = other, "unhandled signal");
                    }
                }
            }
        })
        .expect("failed to spawn signal watcher thread");
}
