//! `tracing` output routed to the browser console.

use std::io;
use tracing::{Level, Metadata};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::MakeWriter;

/// Buffers one formatted event and hands it to the console when dropped.
pub struct ConsoleWriter {
    level: Level,
    buffer: Vec<u8>,
}

impl io::Write for ConsoleWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for ConsoleWriter {
    fn drop(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        let line = String::from_utf8_lossy(&self.buffer).trim_end().to_owned();
        match self.level {
            Level::ERROR => gloo_console::error!(line),
            Level::WARN => gloo_console::warn!(line),
            Level::DEBUG | Level::TRACE => gloo_console::debug!(line),
            Level::INFO => gloo_console::log!(line),
        }
    }
}

pub struct ConsoleMakeWriter;

impl<'a> MakeWriter<'a> for ConsoleMakeWriter {
    type Writer = ConsoleWriter;

    fn make_writer(&'a self) -> Self::Writer {
        ConsoleWriter {
            level: Level::INFO,
            buffer: Vec::new(),
        }
    }

    fn make_writer_for(&'a self, meta: &Metadata<'_>) -> Self::Writer {
        ConsoleWriter {
            level: *meta.level(),
            buffer: Vec::new(),
        }
    }
}

pub fn init() {
    let _ = tracing_subscriber::fmt()
        .with_writer(ConsoleMakeWriter)
        .with_ansi(false)
        .without_time()
        .with_env_filter(EnvFilter::new("info"))
        .try_init();
}
