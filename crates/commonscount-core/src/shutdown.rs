//! Graceful shutdown support via atomic flag
//!
//! The harvester only looks at the flag between work items, so an interrupt
//! never cuts a row write or checkpoint update short.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};

/// Exit code after a second interrupt
pub const FORCED_EXIT_CODE: i32 = 130;

/// Global shutdown flag, set by the SIGTERM/SIGINT handler
pub fn shutdown_flag() -> &'static AtomicBool {
    static FLAG: AtomicBool = AtomicBool::new(false);
    &FLAG
}

/// Check if shutdown was requested
pub fn is_shutdown_requested() -> bool {
    shutdown_flag().load(Ordering::Relaxed)
}

/// Request shutdown (for signal handlers)
pub fn request_shutdown() {
    shutdown_flag().store(true, Ordering::Relaxed);
}

/// Clear the flag (tests and multi-run drivers)
pub fn reset_shutdown() {
    shutdown_flag().store(false, Ordering::Relaxed);
}

/// Install SIGINT/SIGTERM handlers.
///
/// First signal sets the shutdown flag; a second one exits immediately
/// with [`FORCED_EXIT_CODE`].
pub fn install_signal_handlers() -> io::Result<()> {
    for signal in [signal_hook::consts::SIGTERM, signal_hook::consts::SIGINT] {
        // SAFETY: AtomicBool::swap and process::exit are async-signal-safe
        unsafe {
            signal_hook::low_level::register(signal, || {
                if shutdown_flag().swap(true, Ordering::Relaxed) {
                    std::process::exit(FORCED_EXIT_CODE);
                }
            })?;
        }
    }
    Ok(())
}
