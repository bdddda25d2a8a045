//! Pseudoterminal (PTY) Management
//!
//! Console process handling: spawning the console in a PTY, bridging its
//! blocking I/O, signal delivery and the supervisor that owns the process.

pub mod process;
pub mod signals;
pub mod streams;
pub mod supervisor;
pub mod transport;

// Re-exports for convenience
pub use process::{get_effective_environment, spawn_console, SpawnedConsole};
pub use signals::{is_process_running, send_signal, Signal};
pub use streams::{PtyStreams, StreamStats};
pub use supervisor::ProcessSupervisor;
pub use transport::{ConsoleLauncher, ConsoleTransport, PtyConsole, PtyLauncher};
