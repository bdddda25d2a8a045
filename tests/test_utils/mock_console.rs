//! Scripted console for driving the core without a real process
//!
//! Every launched console plays its banner, then answers each written line
//! with the steps the responder returns for it. Steps run on a tokio task
//! so `Sleep` works with paused time.

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use consolepilot::error::{Error, Result};
use consolepilot::pty::{ConsoleLauncher, ConsoleTransport};

pub const PROMPT: &str = "msf6 > ";
/// Quit command the supervisor sends on shutdown
pub const QUIT: &str = "exit -y";

/// One scripted action of the fake console
#[derive(Debug, Clone)]
pub enum Step {
    /// Write text to the console's output
    Emit(String),
    Sleep(Duration),
    /// The process dies
    Exit,
}

pub fn emit(text: impl Into<String>) -> Step {
    Step::Emit(text.into())
}

/// Output lines followed by the prompt
pub fn reply(text: &str) -> Vec<Step> {
    let mut body = String::new();
    for line in text.lines() {
        body.push_str(line);
        body.push_str("\r\n");
    }
    vec![emit(body), emit(PROMPT)]
}

/// Answer for a command line; the second argument is the 1-based launch number
pub type Responder = Arc<dyn Fn(&str, usize) -> Vec<Step> + Send + Sync>;

type OutputSlot = Arc<Mutex<Option<UnboundedSender<Vec<u8>>>>>;

pub struct MockLauncher {
    responder: Responder,
    banner: Vec<Step>,
    echo: bool,
    launches: AtomicUsize,
    written: Arc<Mutex<Vec<String>>>,
    live: Arc<Mutex<Vec<(OutputSlot, Arc<AtomicBool>)>>>,
}

impl MockLauncher {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&str, usize) -> Vec<Step> + Send + Sync + 'static,
    {
        Self {
            responder: Arc::new(responder),
            banner: vec![emit("       =[ metasploit v6.3.4-dev ]\r\n\r\n"), emit(PROMPT)],
            echo: false,
            launches: AtomicUsize::new(0),
            written: Arc::new(Mutex::new(Vec::new())),
            live: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_banner(mut self, banner: Vec<Step>) -> Self {
        self.banner = banner;
        self
    }

    /// Echo every written line back like a terminal would
    pub fn with_echo(mut self) -> Self {
        self.echo = true;
        self
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    /// Every command line written, across all launched consoles
    pub fn written(&self) -> Vec<String> {
        self.written.lock().unwrap().clone()
    }

    /// Kill the most recently launched console
    pub fn kill_current(&self) {
        if let Some((slot, alive)) = self.live.lock().unwrap().last() {
            alive.store(false, Ordering::SeqCst);
            slot.lock().unwrap().take();
        }
    }
}

#[async_trait]
impl ConsoleLauncher for MockLauncher {
    async fn launch(&self) -> Result<Box<dyn ConsoleTransport>> {
        let generation = self.launches.fetch_add(1, Ordering::SeqCst) + 1;
        let (tx, rx) = unbounded_channel();
        let slot: OutputSlot = Arc::new(Mutex::new(Some(tx)));
        let alive = Arc::new(AtomicBool::new(true));
        self.live
            .lock()
            .unwrap()
            .push((Arc::clone(&slot), Arc::clone(&alive)));

        play(self.banner.clone(), Arc::clone(&slot), Arc::clone(&alive));

        Ok(Box::new(MockConsole {
            generation,
            responder: Arc::clone(&self.responder),
            echo: self.echo,
            written: Arc::clone(&self.written),
            slot,
            alive,
            rx,
        }))
    }
}

fn play(steps: Vec<Step>, slot: OutputSlot, alive: Arc<AtomicBool>) {
    tokio::spawn(async move {
        for step in steps {
            match step {
                Step::Emit(text) => {
                    if let Some(tx) = slot.lock().unwrap().as_ref() {
                        let _ = tx.send(text.into_bytes());
                    }
                }
                Step::Sleep(duration) => tokio::time::sleep(duration).await,
                Step::Exit => {
                    alive.store(false, Ordering::SeqCst);
                    slot.lock().unwrap().take();
                    return;
                }
            }
        }
    });
}

pub struct MockConsole {
    generation: usize,
    responder: Responder,
    echo: bool,
    written: Arc<Mutex<Vec<String>>>,
    slot: OutputSlot,
    alive: Arc<AtomicBool>,
    rx: UnboundedReceiver<Vec<u8>>,
}

#[async_trait]
impl ConsoleTransport for MockConsole {
    fn pid(&self) -> Option<u32> {
        Some(40_000 + self.generation as u32)
    }

    fn is_alive(&mut self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    async fn write(&mut self, data: &[u8]) -> Result<()> {
        if !self.is_alive() {
            return Err(Error::PtyInputSendFailed {
                reason: "console exited".to_string(),
            });
        }

        let text = String::from_utf8_lossy(data).to_string();
        for line in text.lines() {
            let line = line.trim_end_matches('\r').to_string();
            self.written.lock().unwrap().push(line.clone());

            let mut steps = Vec::new();
            if self.echo {
                steps.push(emit(format!("{}\r\n", line)));
            }
            if line == QUIT {
                steps.push(Step::Exit);
            } else {
                steps.extend((self.responder)(&line, self.generation));
            }
            play(steps, Arc::clone(&self.slot), Arc::clone(&self.alive));
        }
        Ok(())
    }

    async fn read(&mut self) -> Option<Vec<u8>> {
        self.rx.recv().await
    }

    fn try_read(&mut self) -> Option<Vec<u8>> {
        self.rx.try_recv().ok()
    }

    async fn terminate(&mut self, _grace: Duration) -> Result<()> {
        self.alive.store(false, Ordering::SeqCst);
        self.slot.lock().unwrap().take();
        Ok(())
    }
}
