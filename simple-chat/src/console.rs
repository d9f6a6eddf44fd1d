use std::{
    io::{self, BufRead},
    thread,
};

use tokio::sync::mpsc;
use tracing::debug;

/// Lines typed at a console, as produced by [`spawn_console_reader`].
pub type ConsoleInput = mpsc::Receiver<io::Result<String>>;

const INPUT_BUFFER: usize = 16;

/// Reads lines from `reader` on a dedicated thread.
///
/// tokio's own stdin handle cannot cancel a pending read, which would keep the
/// runtime from shutting down until the user hits enter. A plain thread does
/// not hold the process open once `main` returns.
pub fn spawn_console_reader<R>(reader: R) -> io::Result<ConsoleInput>
where
    R: BufRead + Send + 'static,
{
    let (tx, rx) = mpsc::channel(INPUT_BUFFER);
    thread::Builder::new()
        .name("console-input".to_string())
        .spawn(move || {
            for line in reader.lines() {
                let failed = line.is_err();
                if tx.blocking_send(line).is_err() || failed {
                    break;
                }
            }
            debug!("console input finished");
        })?;
    Ok(rx)
}

/// Reads operator or user input from the process's stdin.
pub fn stdin_lines() -> io::Result<ConsoleInput> {
    spawn_console_reader(io::BufReader::new(io::stdin()))
}
