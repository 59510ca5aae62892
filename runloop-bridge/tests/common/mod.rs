//! Shared harness: a simulated native loop, a dispatch thread and a bridge
//! with its own coordination state and performer registry.

#![allow(dead_code)]

use std::io;
use std::sync::Arc;
use std::sync::mpsc;
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use runloop_bridge::sim::{SimDispatcher, SimNativeLoop};
use runloop_bridge::{BridgeConfig, ContextId, CoordinationState, InvocationBridge, PerformerRegistry};

pub const CONTEXT: ContextId = ContextId::new(1);

pub struct Harness {
    pub native: Arc<SimNativeLoop>,
    pub dispatcher: Arc<SimDispatcher>,
    pub coordination: Arc<CoordinationState>,
    pub registry: Arc<PerformerRegistry>,
    pub bridge: InvocationBridge,
}

impl Harness {
    pub fn new(name: &str) -> Self {
        Self::with_config(name, BridgeConfig::default())
    }

    pub fn with_config(name: &str, config: BridgeConfig) -> Self {
        let native = Arc::new(SimNativeLoop::new());
        let dispatcher = SimDispatcher::start(name).unwrap();
        let coordination = Arc::new(CoordinationState::new());
        let registry = Arc::new(PerformerRegistry::new(config));
        let bridge = InvocationBridge::new(native.clone(), dispatcher.clone())
            .with_coordination(Arc::clone(&coordination))
            .with_registry(Arc::clone(&registry));
        Self { native, dispatcher, coordination, registry, bridge }
    }

    pub fn dispatch_thread(&self) -> ThreadId {
        self.dispatcher.thread_id().unwrap()
    }

    /// Park the dispatch thread on a posted envelope until the returned
    /// sender fires or is dropped.
    pub fn block_dispatch(&self) -> mpsc::Sender<()> {
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let (started_tx, started_rx) = mpsc::channel::<()>();
        self.bridge
            .invoke_later(
                move || {
                    started_tx.send(())?;
                    let _ = release_rx.recv();
                    Ok(())
                },
                Some(CONTEXT),
            )
            .unwrap();
        started_rx.recv().unwrap();
        release_tx
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.dispatcher.shutdown();
    }
}

pub fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        thread::sleep(Duration::from_millis(2));
    }
}

/// In-memory sink for `tracing` output at `WARN` and above.
///
/// The subscriber is installed per thread with
/// [`tracing::subscriber::with_default`], so only events emitted on the
/// thread running the closure are captured.
#[derive(Clone, Default)]
pub struct LogCapture {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl LogCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` with a subscriber writing into this capture.
    pub fn capture<R>(&self, f: impl FnOnce() -> R) -> R {
        let writer = self.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .without_time()
            .with_max_level(tracing::Level::WARN)
            .finish();
        tracing::subscriber::with_default(subscriber, f)
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.buffer.lock()).into_owned()
    }

    pub fn warn_lines(&self) -> Vec<String> {
        self.contents()
            .lines()
            .filter(|line| line.contains("WARN"))
            .map(str::to_string)
            .collect()
    }
}

impl io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
