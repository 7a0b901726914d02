use crate::error::{IsoExtractError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Ctrl+C clears a shared `running` flag that the extractor checks before each
/// file, so the current file finishes and the image is still unmounted.
/// A second Ctrl+C exits at once.
pub struct GracefulShutdown {
    running: Arc<AtomicBool>,
}

impl GracefulShutdown {
    pub fn new() -> Result<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let handler_flag = running.clone();

        ctrlc::set_handler(move || {
            // swap returns the previous value: true on the first interrupt only
            if handler_flag.swap(false, Ordering::SeqCst) {
                eprintln!("\n🛑 Stopping after the current file and unmounting... (press Ctrl+C again to force exit)");
            } else {
                eprintln!("\n💀 Force stopping, the image may still be mounted");
                std::process::exit(130);
            }
        })
        .map_err(|e| IsoExtractError::Config {
            message: format!("Failed to set signal handler: {}", e),
        })?;

        Ok(Self { running })
    }

    /// No handler is registered, since ctrlc allows only one per process.
    pub fn new_for_test() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn running_flag(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    pub fn check_shutdown(&self) -> Result<()> {
        if !self.is_running() {
            return Err(IsoExtractError::Cancelled);
        }
        Ok(())
    }

    pub fn request_shutdown(&self) {
        self.running.store(false, Ordering::SeqCst);
    }
}
