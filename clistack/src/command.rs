//! Command values submitted to a [`Cli`](crate::cli::Cli).
//!
//! A command is immutable text tagged with a process-wide sequence id. The
//! id only correlates log lines; ordering is enforced by the queue layer.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_SEQUENCE_ID: AtomicU64 = AtomicU64::new(1);

fn next_sequence_id() -> u64 {
    NEXT_SEQUENCE_ID.fetch_add(1, Ordering::Relaxed)
}

/// Shared state of read and write commands.
#[derive(Debug, Clone, PartialEq, Eq)]
struct CommandData {
    text: String,
    sequence_id: u64,
    skip_cache: bool,
}

impl CommandData {
    fn new(text: String, skip_cache: bool) -> Self {
        Self {
            text,
            sequence_id: next_sequence_id(),
            skip_cache,
        }
    }
}

/// A command whose output is expected back; eligible for caching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadCommand(CommandData);

/// A command that only expects its echo back; never cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteCommand(CommandData);

impl ReadCommand {
    /// Create a cacheable read command.
    pub fn create(text: impl Into<String>) -> Self {
        Self(CommandData::new(text.into(), false))
    }

    /// Create a read command that bypasses the read cache.
    pub fn create_skip_cache(text: impl Into<String>) -> Self {
        Self(CommandData::new(text.into(), true))
    }

    /// The literal command text.
    pub fn raw(&self) -> &str {
        &self.0.text
    }

    pub fn sequence_id(&self) -> u64 {
        self.0.sequence_id
    }

    pub fn skip_cache(&self) -> bool {
        self.0.skip_cache
    }

    /// Whether the text spans more than one line.
    pub fn is_multiline(&self) -> bool {
        self.0.text.contains('\n')
    }
}

impl WriteCommand {
    /// Create a write command.
    pub fn create(text: impl Into<String>) -> Self {
        Self(CommandData::new(text.into(), true))
    }

    /// The literal command text.
    pub fn raw(&self) -> &str {
        &self.0.text
    }

    pub fn sequence_id(&self) -> u64 {
        self.0.sequence_id
    }

    /// Always true: writes are never cached.
    pub fn skip_cache(&self) -> bool {
        true
    }
}

impl fmt::Display for ReadCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.text)
    }
}

impl fmt::Display for WriteCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.text)
    }
}

/// Either kind of command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Read(ReadCommand),
    Write(WriteCommand),
}

impl Command {
    /// The literal command text.
    pub fn raw(&self) -> &str {
        match self {
            Command::Read(cmd) => cmd.raw(),
            Command::Write(cmd) => cmd.raw(),
        }
    }

    pub fn sequence_id(&self) -> u64 {
        match self {
            Command::Read(cmd) => cmd.sequence_id(),
            Command::Write(cmd) => cmd.sequence_id(),
        }
    }

    /// Split a multi-line read into one write per line plus a final read.
    ///
    /// Every segment but the last keeps its trailing `\n`, so concatenating
    /// the texts of the result reproduces the input exactly. The final read
    /// inherits the original `skip_cache` flag. Single-line commands are
    /// returned unchanged (same sequence id).
    pub fn split_multiline(cmd: &ReadCommand) -> Vec<Command> {
        if !cmd.is_multiline() {
            return vec![Command::Read(cmd.clone())];
        }

        let text = cmd.raw();
        let mut commands = Vec::new();
        let mut rest = text;
        while let Some(pos) = rest.find('\n') {
            let (line, tail) = rest.split_at(pos + 1);
            commands.push(Command::Write(WriteCommand::create(line)));
            rest = tail;
        }

        let last = if cmd.skip_cache() {
            ReadCommand::create_skip_cache(rest)
        } else {
            ReadCommand::create(rest)
        };
        commands.push(Command::Read(last));
        commands
    }
}

impl From<ReadCommand> for Command {
    fn from(cmd: ReadCommand) -> Self {
        Command::Read(cmd)
    }
}

impl From<WriteCommand> for Command {
    fn from(cmd: WriteCommand) -> Self {
        Command::Write(cmd)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.raw())
    }
}
