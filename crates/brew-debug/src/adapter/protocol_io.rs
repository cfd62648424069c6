//! DAP protocol framing IO.
//! - read_message: parse Content-Length payload
//! - write_message/write_value: emit payload
//! - write_protocol_log: optional transcript logging

use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufWriter, Write};
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tracing::warn;

const CONTENT_LENGTH: &str = "Content-Length";

/// Writer shared by the dispatch loop and the event pump.
pub(super) type SharedWriter = Arc<Mutex<Box<dyn Write + Send>>>;

/// Transcript file shared by every writer of a session.
pub(super) type ProtocolLog = Arc<Mutex<BufWriter<File>>>;

pub(super) fn read_message<R: BufRead>(reader: &mut R) -> io::Result<Option<String>> {
    let mut content_length = None;
    let mut line = String::new();

    loop {
        line.clear();
        let bytes = reader.read_line(&mut line)?;
        if bytes == 0 {
            return Ok(None);
        }
        let trimmed = line.trim_end_matches(['\r', '\n']);
        if trimmed.is_empty() {
            break;
        }
        if let Some((name, value)) = trimmed.split_once(':') {
            if name.trim().eq_ignore_ascii_case(CONTENT_LENGTH) {
                if let Ok(length) = value.trim().parse::<usize>() {
                    content_length = Some(length);
                }
            }
        }
    }

    let length = content_length.ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidData, "missing Content-Length header")
    })?;

    let mut buffer = vec![0u8; length];
    reader.read_exact(&mut buffer)?;
    let payload = String::from_utf8(buffer)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "invalid utf-8 payload"))?;
    Ok(Some(payload))
}

pub(super) fn write_message<W: Write + ?Sized>(writer: &mut W, payload: &str) -> io::Result<()> {
    let length = payload.len();
    write!(writer, "Content-Length: {length}\r\n\r\n")?;
    writer.write_all(payload.as_bytes())?;
    writer.flush()
}

pub(super) fn write_message_locked(writer: &SharedWriter, payload: &str) -> io::Result<()> {
    let mut writer = writer
        .lock()
        .map_err(|_| io::Error::other("dap writer lock poisoned"))?;
    write_message(&mut **writer, payload)
}

/// Serialize, log and write one outbound message.
pub(super) fn write_value(
    writer: &SharedWriter,
    logger: Option<&ProtocolLog>,
    message: &Value,
) -> io::Result<()> {
    let serialized = serde_json::to_string(message)
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
    if let Some(logger) = logger {
        let _ = write_protocol_log(logger, "->", &serialized);
    }
    write_message_locked(writer, &serialized)
}

pub(super) fn open_protocol_log(path: &str) -> Option<ProtocolLog> {
    match OpenOptions::new().create(true).append(true).open(path) {
        Ok(file) => Some(Arc::new(Mutex::new(BufWriter::new(file)))),
        Err(err) => {
            warn!(path, %err, "cannot open DAP transcript");
            None
        }
    }
}

pub(super) fn write_protocol_log(
    logger: &ProtocolLog,
    direction: &str,
    payload: &str,
) -> io::Result<()> {
    let mut logger = logger
        .lock()
        .map_err(|_| io::Error::other("dap log lock poisoned"))?;
    writeln!(logger, "{direction} {payload}")?;
    logger.flush()
}
