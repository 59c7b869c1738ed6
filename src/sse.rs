//! Text framing for the one-way push channel (`text/event-stream`).

/// Content type of the push channel.
pub const CONTENT_TYPE: &str = "text/event-stream";

/// Text of the keep-alive comment; carries no data and never reaches client state.
pub const HEARTBEAT_COMMENT: &str = "heartbeat";

/// The keep-alive comment as it appears on the wire.
#[cfg(test)]
pub const HEARTBEAT: &str = ":heartbeat\n\n";

/// Encode a payload as one data record.
///
/// Multi-line payloads become one `data:` line per line, which decoders
/// join back together with `\n`.
#[cfg(test)]
pub fn data_frame(payload: &str) -> String {
    let mut frame = String::with_capacity(payload.len() + 8);
    for line in payload.split('\n') {
        frame.push_str("data: ");
        frame.push_str(line);
        frame.push('\n');
    }
    frame.push('\n');
    frame
}

/// One decoded record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    Data(String),
    Comment(String),
}

/// Incremental decoder for the push channel.
///
/// Accepts either whole lines or raw body chunks that may split a line
/// (or a UTF-8 sequence) anywhere.
#[derive(Debug, Default)]
pub struct Decoder {
    data: Vec<String>,
    partial: Vec<u8>,
}

impl Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one body chunk. Returns every record it completes, in order.
    pub fn push_bytes(&mut self, chunk: &[u8]) -> Vec<Record> {
        self.partial.extend_from_slice(chunk);
        let mut records = Vec::new();
        while let Some(end) = self.partial.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.partial.drain(..=end).collect();
            let text = String::from_utf8_lossy(&line[..end]);
            if let Some(record) = self.push_line(&text) {
                records.push(record);
            }
        }
        records
    }

    /// Feed one line (without its terminator). Returns a record when one completes.
    pub fn push_line(&mut self, line: &str) -> Option<Record> {
        let line = line.strip_suffix('\r').unwrap_or(line);

        if line.is_empty() {
            if self.data.is_empty() {
                return None;
            }
            let data = self.data.join("\n");
            self.data.clear();
            return Some(Record::Data(data));
        }

        if let Some(comment) = line.strip_prefix(':') {
            return Some(Record::Comment(comment.to_string()));
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        // event, id and retry fields are not used by this protocol.
        if field == "data" {
            self.data.push(value.to_string());
        }
        None
    }
}
