use std::collections::VecDeque;
use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use tracing_subscriber::fmt::writer::MakeWriter;

/// Tees formatted log lines to stdout and, optionally, a file.
#[derive(Clone)]
pub(crate) struct LogWriter {
    file: Option<Arc<Mutex<File>>>,
}

impl LogWriter {
    pub(crate) fn new(path: Option<PathBuf>) -> io::Result<Self> {
        let file = match path {
            Some(path) => Some(Arc::new(Mutex::new(File::create(path)?))),
            None => None,
        };
        Ok(Self { file })
    }
}

pub(crate) struct LogWriterGuard {
    file: Option<Arc<Mutex<File>>>,
}

impl<'a> MakeWriter<'a> for LogWriter {
    type Writer = LogWriterGuard;

    fn make_writer(&'a self) -> Self::Writer {
        LogWriterGuard {
            file: self.file.clone(),
        }
    }
}

impl Write for LogWriterGuard {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::stdout().write_all(buf)?;
        if let Some(file) = &self.file {
            file.lock()
                .unwrap_or_else(PoisonError::into_inner)
                .write_all(buf)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stdout().flush()?;
        if let Some(file) = &self.file {
            file.lock().unwrap_or_else(PoisonError::into_inner).flush()?;
        }
        Ok(())
    }
}

/// Keeps the opening steps of a run plus a ring buffer of the most recent ones,
/// so a failure can be reported with its lead-up without logging every step.
pub(crate) struct EventLog {
    first: Vec<String>,
    first_limit: usize,
    tail: VecDeque<String>,
    tail_limit: usize,
    recorded: u64,
}

impl EventLog {
    pub(crate) fn new(first_limit: usize, tail_limit: usize) -> Self {
        Self {
            first: Vec::with_capacity(first_limit),
            first_limit,
            tail: VecDeque::with_capacity(tail_limit),
            tail_limit,
            recorded: 0,
        }
    }

    pub(crate) fn record(&mut self, event: String) {
        self.recorded += 1;
        if self.first.len() < self.first_limit {
            self.first.push(event);
            return;
        }
        if self.tail_limit == 0 {
            return;
        }
        if self.tail.len() == self.tail_limit {
            self.tail.pop_front();
        }
        self.tail.push_back(event);
    }

    pub(crate) fn recorded(&self) -> u64 {
        self.recorded
    }

    pub(crate) fn dump_failure(&self, reason: &str) {
        tracing::error!("failure: {reason}");
        tracing::error!("first {} steps:", self.first.len());
        for event in &self.first {
            tracing::error!("  {event}");
        }
        let skipped = self.recorded - (self.first.len() + self.tail.len()) as u64;
        if skipped > 0 {
            tracing::error!("  ... {skipped} steps omitted ...");
        }
        tracing::error!("last {} steps:", self.tail.len());
        for event in &self.tail {
            tracing::error!("  {event}");
        }
    }
}
