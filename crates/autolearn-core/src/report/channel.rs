//! Live output channels.
//!
//! A channel receives one serialized message per reported event and must have
//! fully handed it to the reader before `push` returns.

use std::io::{self, Write};
use std::sync::{Arc, Mutex, PoisonError};

pub trait LiveChannel: Send {
    /// Write one message and force it out to the reader.
    fn push(&mut self, message: &str) -> io::Result<()>;
}

/// Newline-delimited channel over any writer, flushed after every message.
pub struct WriterChannel<W> {
    writer: W,
}

impl<W: Write + Send> WriterChannel<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }
}

impl WriterChannel<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send> LiveChannel for WriterChannel<W> {
    fn push(&mut self, message: &str) -> io::Result<()> {
        self.writer.write_all(message.as_bytes())?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()
    }
}

/// Collects messages in memory. Clones share the same message list.
#[derive(Clone, Default)]
pub struct MemoryChannel {
    messages: Arc<Mutex<Vec<String>>>,
}

impl MemoryChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl LiveChannel for MemoryChannel {
    fn push(&mut self, message: &str) -> io::Result<()> {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message.to_string());
        Ok(())
    }
}
