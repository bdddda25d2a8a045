//! PTY Signal Handling
//!
//! Signal delivery to the console process. Graceful termination is
//! `SIGTERM`, a grace period, then `SIGKILL`.

use crate::error::{Error, Result};

/// Signal types that can be sent to the console
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// Interrupt signal (Ctrl+C)
    Interrupt,
    /// Termination signal (graceful shutdown)
    Terminate,
    /// Kill signal (forceful termination)
    Kill,
}

/// Send a signal to a process by PID
pub fn send_signal(pid: u32, signal: Signal) -> Result<()> {
    #[cfg(unix)]
    {
        use nix::sys::signal::{kill, Signal as NixSignal};
        use nix::unistd::Pid;

        let nix_signal = match signal {
            Signal::Interrupt => NixSignal::SIGINT,
            Signal::Terminate => NixSignal::SIGTERM,
            Signal::Kill => NixSignal::SIGKILL,
        };

        kill(Pid::from_raw(pid as i32), nix_signal).map_err(|e| Error::SignalSendFailed {
            signal: format!("{:?}", signal),
            reason: e.to_string(),
        })
    }

    #[cfg(not(unix))]
    {
        let _ = pid;
        Err(Error::SignalSendFailed {
            signal: format!("{:?}", signal),
            reason: format!("signals are not supported on {}", std::env::consts::OS),
        })
    }
}

/// Check if a process still exists
pub fn is_process_running(pid: u32) -> bool {
    #[cfg(unix)]
    {
        use nix::sys::signal::kill;
        use nix::unistd::Pid;

        // Signal 0 only checks for existence
        kill(Pid::from_raw(pid as i32), None).is_ok()
    }

    #[cfg(not(unix))]
    {
        let _ = pid;
        false
    }
}
