use std::io::{self, Write};

/// Destination for rendered lines.
pub trait Output: Send + Sync + 'static {
    /// Write `line` plus a newline as one unit; concurrent callers never split a line.
    fn write_line(&self, worker: usize, line: &str) -> io::Result<()>;
}

/// Process standard output. The stdout lock is held for the whole line.
#[derive(Debug, Default, Clone, Copy)]
pub struct Stdout;

impl Output for Stdout {
    fn write_line(&self, _worker: usize, line: &str) -> io::Result<()> {
        let mut out = io::stdout().lock();
        out.write_all(line.as_bytes())?;
        out.write_all(b"\n")?;
        out.flush()
    }
}
