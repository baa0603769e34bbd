//! Matrix input for the peripheral application.
//!
//! There is no scanning hardware on a host build, so key transitions come from
//! a line-oriented text stream (normally stdin):
//!
//! ```text
//! down 3          # key 3 pressed
//! up 3            # key 3 released
//! bitmap 0501     # snapshot: bytes 0x05, 0x01 (keys 0, 2 and 8 held)
//! ```
//!
//! Blank lines and text after `#` are ignored. Indices are checked against
//! the configured key count before anything is posted.
//!
//! # Testability
//!
//! Commands are delivered through the [`MatrixSink`] trait, so tests can
//! record them without running a controller.

use async_trait::async_trait;
use splitkb_core::protocol::{RawBitmapEvent, RawKeyEvent, MAX_BITMAP_BYTES};
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, warn};

use crate::application::peripheral_controller::PeripheralHandle;

/// One parsed input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatrixCommand {
    Key(RawKeyEvent),
    Bitmap(RawBitmapEvent),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MatrixParseError {
    #[error("unknown command {0:?}")]
    UnknownCommand(String),

    #[error("{0} needs an argument")]
    MissingArgument(&'static str),

    #[error("unexpected trailing input {0:?}")]
    TrailingInput(String),

    #[error("key index {0:?} is not a number")]
    BadIndex(String),

    #[error("key index {index} outside matrix of {keys} keys")]
    IndexOutOfRange { index: usize, keys: usize },

    #[error("bitmap {0:?} is not an even-length hex string")]
    BadHex(String),

    #[error("bitmap of {len} bytes exceeds {} bytes", MAX_BITMAP_BYTES)]
    BitmapTooLong { len: usize },
}

/// Receiver of parsed matrix commands.
#[async_trait]
pub trait MatrixSink: Send + Sync {
    /// Returns `false` if the command was dropped.
    async fn deliver(&self, command: MatrixCommand) -> bool;
}

#[async_trait]
impl MatrixSink for PeripheralHandle {
    async fn deliver(&self, command: MatrixCommand) -> bool {
        match command {
            MatrixCommand::Key(event) => self.post_key(event).await,
            MatrixCommand::Bitmap(event) => self.post_bitmap(event).await,
        }
    }
}

/// Parses one input line.
///
/// Returns `Ok(None)` for blank and comment-only lines.
pub fn parse_command(line: &str, keys: usize) -> Result<Option<MatrixCommand>, MatrixParseError> {
    let line = line.split('#').next().unwrap_or_default();
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };

    let command = match verb {
        "down" | "up" => {
            let arg = words.next().ok_or(MatrixParseError::MissingArgument("key event"))?;
            let index = parse_index(arg, keys)?;
            let event = if verb == "down" {
                RawKeyEvent::press(index)
            } else {
                RawKeyEvent::release(index)
            };
            MatrixCommand::Key(event)
        }
        "bitmap" => {
            let arg = words.next().ok_or(MatrixParseError::MissingArgument("bitmap"))?;
            MatrixCommand::Bitmap(parse_bitmap(arg, keys)?)
        }
        other => return Err(MatrixParseError::UnknownCommand(other.to_string())),
    };

    if let Some(extra) = words.next() {
        return Err(MatrixParseError::TrailingInput(extra.to_string()));
    }
    Ok(Some(command))
}

fn parse_index(arg: &str, keys: usize) -> Result<u8, MatrixParseError> {
    let index: usize = arg
        .parse()
        .map_err(|_| MatrixParseError::BadIndex(arg.to_string()))?;
    if index >= keys {
        return Err(MatrixParseError::IndexOutOfRange { index, keys });
    }
    u8::try_from(index).map_err(|_| MatrixParseError::IndexOutOfRange { index, keys })
}

fn parse_bitmap(arg: &str, keys: usize) -> Result<RawBitmapEvent, MatrixParseError> {
    if arg.len() % 2 != 0 || !arg.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(MatrixParseError::BadHex(arg.to_string()));
    }
    let len = arg.len() / 2;
    if len > MAX_BITMAP_BYTES {
        return Err(MatrixParseError::BitmapTooLong { len });
    }
    let bytes: Vec<u8> = (0..len)
        .map(|i| u8::from_str_radix(&arg[2 * i..2 * i + 2], 16))
        .collect::<Result<_, _>>()
        .map_err(|_| MatrixParseError::BadHex(arg.to_string()))?;

    let bitmap = RawBitmapEvent::from_bytes(&bytes).ok_or(MatrixParseError::BitmapTooLong { len })?;
    if let Some(index) = (keys..bitmap.size() * 8).find(|&i| bitmap.is_pressed(i)) {
        return Err(MatrixParseError::IndexOutOfRange { index, keys });
    }
    Ok(bitmap)
}

/// Reads commands from `reader` until end of input, delivering each to `sink`.
///
/// Malformed lines are logged and skipped. Returns the number of commands
/// delivered.
pub async fn run_line_source<R, S>(reader: R, sink: &S, keys: usize) -> std::io::Result<usize>
where
    R: AsyncBufRead + Unpin,
    S: MatrixSink + ?Sized,
{
    let mut lines = reader.lines();
    let mut delivered = 0;
    while let Some(line) = lines.next_line().await? {
        match parse_command(&line, keys) {
            Ok(Some(command)) => {
                debug!(?command, "matrix command");
                if sink.deliver(command).await {
                    delivered += 1;
                }
            }
            Ok(None) => {}
            Err(e) => warn!(line = %line.trim(), "ignoring matrix input: {e}"),
        }
    }
    Ok(delivered)
}

/// Spawns a task feeding stdin into the controller.
pub fn spawn_stdin_source(handle: PeripheralHandle, keys: usize) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let stdin = tokio::io::BufReader::new(tokio::io::stdin());
        match run_line_source(stdin, &handle, keys).await {
            Ok(count) => debug!(count, "matrix input closed"),
            Err(e) => warn!("matrix input failed: {e}"),
        }
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
