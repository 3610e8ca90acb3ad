//! Signal handling for the daemon: SIGTERM/SIGINT shut down, SIGHUP reloads the
//! config, SIGUSR1 activates the growth check and SIGUSR2 deactivates it.
//!
//! Handlers only flip atomic flags through `signal-hook`; the main loop polls
//! them once per iteration.

#![allow(missing_docs)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use signal_hook::consts::{SIGINT, SIGTERM};

/// Pending activate/deactivate request taken from the signal flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleRequest {
    Activate,
    Deactivate,
}

/// Signal flags shared between the OS handlers and the main loop.
#[derive(Clone)]
pub struct SignalHandler {
    shutdown_flag: Arc<AtomicBool>,
    reload_flag: Arc<AtomicBool>,
    activate_flag: Arc<AtomicBool>,
    deactivate_flag: Arc<AtomicBool>,
}

impl SignalHandler {
    /// Create a handler and register the OS hooks. Registration failures are
    /// reported on stderr and otherwise ignored.
    pub fn new() -> Self {
        let handler = Self::unregistered();
        handler.register_signals();
        handler
    }

    /// Handler with no OS hooks; flags change only through the `request_*` methods.
    pub fn unregistered() -> Self {
        Self {
            shutdown_flag: Arc::new(AtomicBool::new(false)),
            reload_flag: Arc::new(AtomicBool::new(false)),
            activate_flag: Arc::new(AtomicBool::new(false)),
            deactivate_flag: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn should_shutdown(&self) -> bool {
        self.shutdown_flag.load(Ordering::Relaxed)
    }

    /// Check and clear a pending reload.
    pub fn should_reload(&self) -> bool {
        self.reload_flag.swap(false, Ordering::Relaxed)
    }

    /// Check and clear pending toggle requests. Deactivation wins when both arrived.
    pub fn take_toggle(&self) -> Option<ToggleRequest> {
        let activate = self.activate_flag.swap(false, Ordering::Relaxed);
        let deactivate = self.deactivate_flag.swap(false, Ordering::Relaxed);
        if deactivate {
            Some(ToggleRequest::Deactivate)
        } else if activate {
            Some(ToggleRequest::Activate)
        } else {
            None
        }
    }

    pub fn request_shutdown(&self) {
        self.shutdown_flag.store(true, Ordering::Relaxed);
    }

    pub fn request_reload(&self) {
        self.reload_flag.store(true, Ordering::Relaxed);
    }

    pub fn request_activate(&self) {
        self.activate_flag.store(true, Ordering::Relaxed);
    }

    pub fn request_deactivate(&self) {
        self.deactivate_flag.store(true, Ordering::Relaxed);
    }

    fn register_signals(&self) {
        if let Err(e) = signal_hook::flag::register(SIGTERM, Arc::clone(&self.shutdown_flag)) {
            eprintln!("[QGM-SIGNAL] failed to register SIGTERM: {e}");
        }
        if let Err(e) = signal_hook::flag::register(SIGINT, Arc::clone(&self.shutdown_flag)) {
            eprintln!("[QGM-SIGNAL] failed to register SIGINT: {e}");
        }

        #[cfg(unix)]
        {
            use signal_hook::consts::{SIGHUP, SIGUSR1, SIGUSR2};
            let hooks = [
                (SIGHUP, "SIGHUP", &self.reload_flag),
                (SIGUSR1, "SIGUSR1", &self.activate_flag),
                (SIGUSR2, "SIGUSR2", &self.deactivate_flag),
            ];
            for (signal, name, flag) in hooks {
                if let Err(e) = signal_hook::flag::register(signal, Arc::clone(flag)) {
                    eprintln!("[QGM-SIGNAL] failed to register {name}: {e}");
                }
            }
        }
    }
}

impl Default for SignalHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::{SignalHandler, ToggleRequest};

    #[test]
    fn reload_flag_clears_after_read() {
        let handler = SignalHandler::unregistered();
        assert!(!handler.should_reload());
        handler.request_reload();
        assert!(handler.should_reload());
        assert!(!handler.should_reload());
    }

    #[test]
    fn shutdown_flag_is_sticky() {
        let handler = SignalHandler::unregistered();
        handler.request_shutdown();
        assert!(handler.should_shutdown());
        assert!(handler.should_shutdown());
    }

    #[test]
    fn toggle_requests_are_consumed() {
        let handler = SignalHandler::unregistered();
        assert_eq!(handler.take_toggle(), None);
        handler.request_activate();
        assert_eq!(handler.take_toggle(), Some(ToggleRequest::Activate));
        assert_eq!(handler.take_toggle(), None);
    }

    #[test]
    fn deactivate_wins_over_activate() {
        let handler = SignalHandler::unregistered();
        handler.request_activate();
        handler.request_deactivate();
        assert_eq!(handler.take_toggle(), Some(ToggleRequest::Deactivate));
        assert_eq!(handler.take_toggle(), None);
    }

    #[test]
    fn clones_share_flags() {
        let handler = SignalHandler::unregistered();
        let clone = handler.clone();
        clone.request_shutdown();
        assert!(handler.should_shutdown());
    }
}
