//! Outbound message queue, stdout writer and the diagnostics rate limiter.

use std::collections::HashMap;
use std::io::Write;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use scry_core::AbsPath;
use scry_sync::ThreadedQueue;
use serde_json::Value;

use crate::codec;

enum OutMessage {
    Payload(String),
    Shutdown,
}

/// Serializes every outbound message through one writer thread, so replies
/// from the main loop and notifications from worker callbacks never
/// interleave mid-frame.
pub struct StdoutWriter {
    queue: Arc<ThreadedQueue<OutMessage>>,
}

impl StdoutWriter {
    pub fn spawn() -> (StdoutWriter, JoinHandle<()>) {
        let queue = Arc::new(ThreadedQueue::new());
        let consumer = Arc::clone(&queue);
        let handle = std::thread::Builder::new()
            .name("scry-stdout".to_string())
            .spawn(move || {
                let stdout = std::io::stdout();
                let mut writer = std::io::BufWriter::new(stdout.lock());
                loop {
                    match consumer.dequeue() {
                        OutMessage::Payload(body) => {
                            if codec::write_message(&mut writer, &body).is_err() {
                                break;
                            }
                        }
                        OutMessage::Shutdown => {
                            let _ = writer.flush();
                            break;
                        }
                    }
                }
            })
            .expect("failed to spawn stdout writer");
        (StdoutWriter { queue }, handle)
    }

    pub fn send(&self, message: &Value) {
        self.queue
            .enqueue(OutMessage::Payload(message.to_string()), false);
    }

    /// `window/showMessage`: surfaced in the editor UI.
    pub fn show_message(&self, kind: MessageKind, message: &str) {
        self.send(&crate::rpc::notification(
            "window/showMessage",
            serde_json::json!({ "type": kind as u8, "message": message }),
        ));
    }

    /// `window/logMessage`: lands in the editor's output channel.
    pub fn log_message(&self, kind: MessageKind, message: &str) {
        self.send(&crate::rpc::notification(
            "window/logMessage",
            serde_json::json!({ "type": kind as u8, "message": message }),
        ));
    }

    pub fn shutdown(&self) {
        self.queue.enqueue(OutMessage::Shutdown, false);
    }
}

/// LSP `MessageType` values.
#[derive(Debug, Clone, Copy)]
#[repr(u8)]
pub enum MessageKind {
    Error = 1,
    Warning = 2,
    Info = 3,
    Log = 4,
}

/// Per-path rate limit on `textDocument/publishDiagnostics`.
///
/// An empty diagnostics set always passes: clearing previously-reported
/// diagnostics must never be throttled.
pub struct DiagnosticsRateLimiter {
    frequency_ms: std::sync::atomic::AtomicU64,
    last_publish: Mutex<HashMap<AbsPath, Instant>>,
}

impl DiagnosticsRateLimiter {
    pub fn new(frequency_ms: u64) -> DiagnosticsRateLimiter {
        DiagnosticsRateLimiter {
            frequency_ms: std::sync::atomic::AtomicU64::new(frequency_ms),
            last_publish: Mutex::new(HashMap::new()),
        }
    }

    /// Applies a configuration reload.
    pub fn set_frequency_ms(&self, frequency_ms: u64) {
        self.frequency_ms
            .store(frequency_ms, std::sync::atomic::Ordering::SeqCst);
    }

    /// Whether a publish for `path` may go out now. A permitted publish
    /// stamps the path.
    pub fn should_publish(&self, path: &AbsPath, is_empty: bool) -> bool {
        let frequency = Duration::from_millis(
            self.frequency_ms.load(std::sync::atomic::Ordering::SeqCst),
        );
        let mut last_publish = self.last_publish.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        if is_empty || frequency.is_zero() {
            last_publish.insert(path.clone(), now);
            return true;
        }
        match last_publish.get(path) {
            Some(&last) if now.duration_since(last) < frequency => false,
            _ => {
                last_publish.insert(path.clone(), now);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_frequency_never_throttles() {
        let limiter = DiagnosticsRateLimiter::new(0);
        let path = AbsPath::new("/a.cc");
        assert!(limiter.should_publish(&path, false));
        assert!(limiter.should_publish(&path, false));
    }

    #[test]
    fn rapid_publishes_are_throttled() {
        let limiter = DiagnosticsRateLimiter::new(10_000);
        let path = AbsPath::new("/a.cc");
        assert!(limiter.should_publish(&path, false));
        assert!(!limiter.should_publish(&path, false));
    }

    #[test]
    fn empty_diagnostics_bypass_the_limit() {
        let limiter = DiagnosticsRateLimiter::new(10_000);
        let path = AbsPath::new("/a.cc");
        assert!(limiter.should_publish(&path, false));
        assert!(limiter.should_publish(&path, true));
    }

    #[test]
    fn paths_are_limited_independently() {
        let limiter = DiagnosticsRateLimiter::new(10_000);
        assert!(limiter.should_publish(&AbsPath::new("/a.cc"), false));
        assert!(limiter.should_publish(&AbsPath::new("/b.cc"), false));
    }
}
