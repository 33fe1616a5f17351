use std::io;

use tokio_util::{bytes::BytesMut, codec::Decoder};

/// One dispatched server-sent event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseFrame {
    pub event: Option<String>,
    pub data: String,
}

/// Line-oriented `text/event-stream` decoder. Comments and keep-alives are
/// dropped; `id` and `retry` fields are ignored.
#[derive(Debug, Default)]
pub struct SseCodec {
    pending: SseFrame,
    has_data: bool,
}

impl SseCodec {
    pub fn new() -> Self {
        Self::default()
    }

    fn take_frame(&mut self) -> Option<SseFrame> {
        let had_data = std::mem::take(&mut self.has_data);
        let frame = std::mem::take(&mut self.pending);
        had_data.then_some(frame)
    }

    fn apply_line(&mut self, line: &str) {
        if line.starts_with(':') {
            return;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => self.pending.event = Some(value.to_string()),
            "data" => {
                if self.has_data {
                    self.pending.data.push('\n');
                }
                self.pending.data.push_str(value);
                self.has_data = true;
            }
            _ => {}
        }
    }
}

impl Decoder for SseCodec {
    type Item = SseFrame;
    type Error = io::Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<SseFrame>, io::Error> {
        while let Some(newline) = buf.iter().position(|b| *b == b'\n') {
            let raw = buf.split_to(newline + 1);
            let line = std::str::from_utf8(&raw)
                .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?
                .trim_end_matches(['\n', '\r']);

            if line.is_empty() {
                if let Some(frame) = self.take_frame() {
                    return Ok(Some(frame));
                }
                // A blank line with no data resets a dangling event name.
                self.pending = SseFrame::default();
                continue;
            }

            self.apply_line(line);
        }

        Ok(None)
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<SseFrame>, io::Error> {
        if let Some(frame) = self.decode(buf)? {
            return Ok(Some(frame));
        }
        // An unterminated trailing event is discarded.
        buf.clear();
        self.pending = SseFrame::default();
        self.has_data = false;
        Ok(None)
    }
}
