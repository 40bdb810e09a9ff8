//! ui::prompts
//!
//! Operator prompts.
//!
//! # Design
//!
//! The pipeline asks the operator for input at most twice (export index and
//! image index). Both reads go through the [`Prompter`] trait so tests can
//! script the answers. End of input is reported as [`PromptError::Cancelled`]
//! rather than an empty answer, otherwise a retry loop reading from a closed
//! stdin would never terminate. An interrupt while a prompt is pending is
//! reported as [`PromptError::Interrupted`].

use std::collections::VecDeque;
use std::io::{self, BufRead, Write};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use colored::Colorize;
use thiserror::Error;

/// How often a pending prompt checks for an interrupt.
const INTERRUPT_POLL: Duration = Duration::from_millis(100);

/// Errors from prompts.
#[derive(Debug, Error)]
pub enum PromptError {
    #[error("prompt cancelled: no more input")]
    Cancelled,

    #[error("interrupted while waiting for input")]
    Interrupted,

    #[error("IO error: {0}")]
    IoError(String),
}

/// Source of operator answers.
pub trait Prompter {
    /// Show `message` and return one line of input, trimmed.
    fn input(&mut self, message: &str) -> Result<String, PromptError>;
}

type Line = io::Result<Option<String>>;

/// Reads answers from the controlling terminal's stdin.
///
/// Lines are read on a background thread so a pending prompt can notice an
/// interrupt. The blocking read itself cannot be cancelled; the thread is
/// left behind when the prompt gives up.
pub struct TerminalPrompter {
    source: Option<Box<dyn BufRead + Send>>,
    lines: Option<Receiver<Line>>,
    interrupted: Box<dyn Fn() -> bool>,
}

impl Default for TerminalPrompter {
    fn default() -> Self {
        Self::new()
    }
}

impl TerminalPrompter {
    /// A prompter that is never interrupted.
    pub fn new() -> Self {
        Self::interruptible(|| false)
    }

    /// A prompter that gives up with [`PromptError::Interrupted`] once
    /// `interrupted` returns true.
    pub fn interruptible(interrupted: impl Fn() -> bool + 'static) -> Self {
        Self::from_reader(io::BufReader::new(io::stdin()), interrupted)
    }

    /// Read answers from `reader` instead of stdin.
    pub fn from_reader(
        reader: impl BufRead + Send + 'static,
        interrupted: impl Fn() -> bool + 'static,
    ) -> Self {
        Self {
            source: Some(Box::new(reader)),
            lines: None,
            interrupted: Box::new(interrupted),
        }
    }

    fn receiver(&mut self) -> &Receiver<Line> {
        let source = &mut self.source;
        self.lines.get_or_insert_with(|| {
            let (tx, rx) = mpsc::channel();
            if let Some(mut reader) = source.take() {
                thread::spawn(move || loop {
                    let mut line = String::new();
                    let next = match reader.read_line(&mut line) {
                        Ok(0) => Ok(None),
                        Ok(_) => Ok(Some(line)),
                        Err(e) => Err(e),
                    };
                    let done = !matches!(next, Ok(Some(_)));
                    if tx.send(next).is_err() || done {
                        break;
                    }
                });
            }
            rx
        })
    }
}

impl Prompter for TerminalPrompter {
    fn input(&mut self, message: &str) -> Result<String, PromptError> {
        if (self.interrupted)() {
            return Err(PromptError::Interrupted);
        }
        let mut stdout = io::stdout();
        write!(stdout, "{} {} ", "?".cyan().bold(), message)
            .and_then(|_| stdout.flush())
            .map_err(|e| PromptError::IoError(e.to_string()))?;

        loop {
            let next = self.receiver().recv_timeout(INTERRUPT_POLL);
            match next {
                Ok(Ok(Some(line))) => return Ok(line.trim().to_string()),
                Ok(Ok(None)) | Err(RecvTimeoutError::Disconnected) => {
                    return Err(PromptError::Cancelled)
                }
                Ok(Err(e)) => return Err(PromptError::IoError(e.to_string())),
                Err(RecvTimeoutError::Timeout) => {
                    if (self.interrupted)() {
                        println!();
                        return Err(PromptError::Interrupted);
                    }
                }
            }
        }
    }
}

/// Replays a fixed list of answers. Used by tests and non-interactive runs.
#[derive(Debug, Default)]
pub struct ScriptedPrompter {
    answers: VecDeque<String>,
    asked: Vec<String>,
}

impl ScriptedPrompter {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answers: answers.into_iter().map(Into::into).collect(),
            asked: Vec::new(),
        }
    }

    /// Messages shown so far, in order.
    pub fn asked(&self) -> &[String] {
        &self.asked
    }

    /// Answers not yet consumed.
    pub fn remaining(&self) -> usize {
        self.answers.len()
    }
}

impl Prompter for ScriptedPrompter {
    fn input(&mut self, message: &str) -> Result<String, PromptError> {
        self.asked.push(message.to_string());
        self.answers
            .pop_front()
            .map(|a| a.trim().to_string())
            .ok_or(PromptError::Cancelled)
    }
}
