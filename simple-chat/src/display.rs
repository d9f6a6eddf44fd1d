//! Output sinks the chat core writes user-visible text to.

use std::{
    io::{self, Write},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use tracing::debug;

/// Single-method capability the client and server use to show text.
pub trait ChatDisplay: Send + Sync {
    fn display(&self, message: &str);
}

/// Writes each message as a line on stdout, optionally prefixed.
#[derive(Debug, Clone, Default)]
pub struct StdoutDisplay {
    prefix: &'static str,
}

impl StdoutDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prefix(prefix: &'static str) -> Self {
        Self { prefix }
    }
}

impl ChatDisplay for StdoutDisplay {
    fn display(&self, message: &str) {
        let mut stdout = io::stdout().lock();
        let written = writeln!(stdout, "{}{}", self.prefix, message).and_then(|_| stdout.flush());
        if let Err(error) = written {
            debug!(?error, "failed to write to stdout");
        }
    }
}

/// Keeps every displayed message in memory.
///
/// Handy when embedding the chat core somewhere without a terminal, and in tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryDisplay {
    lines: Arc<Mutex<Vec<String>>>,
}

impl MemoryDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything displayed so far.
    pub fn lines(&self) -> Vec<String> {
        self.buffer().clone()
    }

    pub fn contains(&self, message: &str) -> bool {
        self.lines().iter().any(|line| line == message)
    }

    pub fn count(&self, message: &str) -> usize {
        self.lines().iter().filter(|line| *line == message).count()
    }

    pub fn clear(&self) {
        self.buffer().clear();
    }

    fn buffer(&self) -> MutexGuard<'_, Vec<String>> {
        self.lines.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ChatDisplay for MemoryDisplay {
    fn display(&self, message: &str) {
        self.buffer().push(message.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_display_records_in_order() {
        let display = MemoryDisplay::new();
        display.display("first");
        display.display("second");
        display.display("first");

        assert_eq!(display.lines(), vec!["first", "second", "first"]);
        assert_eq!(display.count("first"), 2);
        assert!(display.contains("second"));

        display.clear();
        assert!(display.lines().is_empty());
    }

    #[test]
    fn clones_share_the_same_buffer() {
        let display = MemoryDisplay::new();
        let shared: Arc<dyn ChatDisplay> = Arc::new(display.clone());
        shared.display("via trait object");

        assert!(display.contains("via trait object"));
    }
}
