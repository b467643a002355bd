//! Wire framing for engine events
//!
//! Each [`StreamEvent`] is written as its JSON form, either one object per
//! line or wrapped in a server-sent-events `data:` frame.

use std::io::Write;

use clap::ValueEnum;
use serde::Serialize;
use switchboard_core::StreamEvent;

/// How events are framed on stdout
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum WireFormat {
    /// One JSON object per line
    #[default]
    Ndjson,
    /// `data: {...}` frames separated by a blank line
    Sse,
}

/// Frame one event
pub fn frame(event: &StreamEvent, format: WireFormat) -> serde_json::Result<String> {
    let json = serde_json::to_string(event)?;
    Ok(match format {
        WireFormat::Ndjson => format!("{json}\n"),
        WireFormat::Sse => format!("data: {json}\n\n"),
    })
}

/// Write one event and flush so consumers see it immediately
pub fn write_event<W: Write>(
    out: &mut W,
    event: &StreamEvent,
    format: WireFormat,
) -> anyhow::Result<()> {
    out.write_all(frame(event, format)?.as_bytes())?;
    out.flush()?;
    Ok(())
}

/// Pretty-print any serializable report
pub fn write_json<W: Write, T: Serialize + ?Sized>(out: &mut W, value: &T) -> anyhow::Result<()> {
    serde_json::to_writer_pretty(&mut *out, value)?;
    writeln!(out)?;
    Ok(())
}
