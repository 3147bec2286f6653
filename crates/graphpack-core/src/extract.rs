// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Streaming extraction of balanced `{...}` objects from line-oriented text.
//!
//! Input lines are flattened into one character stream with their terminators
//! removed. Text between objects is skipped, so records need no separator.
//!
//! # Scan modes
//!
//! [`ScanMode::BraceCount`] counts every `{` and `}`, including ones that sit
//! inside JSON string values. A string such as `"a}b"` therefore closes the
//! object early and the run fails at decode time. Input produced by trusted
//! exporters never contains braces in strings, and this is the default.
//!
//! [`ScanMode::QuoteAware`] tracks string literals (with backslash escapes) and
//! only counts structural braces.

use std::io::{self, BufRead, Lines};

use thiserror::Error;

/// Errors produced while carving objects out of the input stream.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// The stream ended while an object was still open.
    #[error(
        "malformed block text: input ended inside block {block} at depth {depth} after {chars} characters"
    )]
    MalformedBlockText {
        /// Zero-based ordinal of the unterminated block.
        block: u64,
        /// Nesting depth still open at end of input.
        depth: usize,
        /// Characters accumulated for the unterminated block.
        chars: usize,
    },

    /// Reading the underlying source failed.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// How braces inside JSON string literals are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanMode {
    /// Count every brace character.
    #[default]
    BraceCount,
    /// Ignore braces that appear inside `"..."` literals.
    QuoteAware,
}

/// Pulls one balanced object at a time from a buffered reader.
pub struct BlockExtractor<R> {
    lines: Lines<R>,
    line: String,
    /// Byte offset of the next char in `line`.
    pos: usize,
    mode: ScanMode,
    blocks: u64,
}

impl<R: BufRead> BlockExtractor<R> {
    /// Wraps `reader` using [`ScanMode::BraceCount`].
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line: String::new(),
            pos: 0,
            mode: ScanMode::default(),
            blocks: 0,
        }
    }

    /// Selects the scan mode.
    pub fn with_mode(mut self, mode: ScanMode) -> Self {
        self.mode = mode;
        self
    }

    /// Number of blocks returned so far.
    pub fn blocks_read(&self) -> u64 {
        self.blocks
    }

    /// Returns the next object text, or `None` once no `{` remains.
    pub fn next_block(&mut self) -> Result<Option<String>, ExtractError> {
        loop {
            match self.next_char()? {
                None => return Ok(None),
                Some('{') => break,
                Some(_) => {}
            }
        }

        let mut text = String::from('{');
        let mut chars = 1usize;
        let mut depth = 1usize;
        let mut in_string = false;
        let mut escaped = false;

        while depth > 0 {
            let Some(c) = self.next_char()? else {
                return Err(ExtractError::MalformedBlockText {
                    block: self.blocks,
                    depth,
                    chars,
                });
            };
            text.push(c);
            chars += 1;

            if self.mode == ScanMode::QuoteAware {
                if in_string {
                    if escaped {
                        escaped = false;
                    } else if c == '\\' {
                        escaped = true;
                    } else if c == '"' {
                        in_string = false;
                    }
                    continue;
                }
                if c == '"' {
                    in_string = true;
                    continue;
                }
            }

            match c {
                '{' => depth += 1,
                '}' => depth -= 1,
                _ => {}
            }
        }

        self.blocks += 1;
        Ok(Some(text))
    }

    fn next_char(&mut self) -> io::Result<Option<char>> {
        loop {
            let next = self.line.get(self.pos..).and_then(|rest| rest.chars().next());
            if let Some(c) = next {
                self.pos += c.len_utf8();
                return Ok(Some(c));
            }
            match self.lines.next() {
                Some(line) => {
                    self.line = line?;
                    self.pos = 0;
                }
                None => return Ok(None),
            }
        }
    }
}

impl<R: BufRead> Iterator for BlockExtractor<R> {
    type Item = Result<String, ExtractError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_block().transpose()
    }
}
