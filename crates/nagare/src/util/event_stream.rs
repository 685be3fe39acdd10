/// One dispatched server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerEvent {
    /// Event type, `message` when the server did not name one.
    pub event: String,
    pub data: String,
    pub id: Option<String>,
}

/// Incremental `text/event-stream` decoder.
///
/// Chunks may split lines anywhere, including inside a UTF-8 sequence, so
/// bytes are buffered until a full line is available.
#[derive(Debug, Default)]
pub struct EventStreamParser {
    line: Vec<u8>,
    last_was_cr: bool,
    started: bool,

    event: Option<String>,
    data: String,
    has_data: bool,
    id: Option<String>,
}

impl EventStreamParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, chunk: &[u8]) -> Vec<ServerEvent> {
        let mut events = Vec::new();

        for &byte in chunk {
            match byte {
                b'\n' if self.last_was_cr => {
                    // second half of a CRLF, the line was already handled
                    self.last_was_cr = false;
                }
                b'\r' | b'\n' => {
                    self.last_was_cr = byte == b'\r';
                    let line = std::mem::take(&mut self.line);
                    if let Some(event) = self.process_line(&line) {
                        events.push(event);
                    }
                }
                _ => {
                    self.last_was_cr = false;
                    self.line.push(byte);
                }
            }
        }

        events
    }

    fn process_line(&mut self, line: &[u8]) -> Option<ServerEvent> {
        let mut line = String::from_utf8_lossy(line);
        if !self.started {
            self.started = true;
            if let Some(stripped) = line.strip_prefix('\u{feff}') {
                line = stripped.to_string().into();
            }
        }

        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (&*line, ""),
        };
        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => {
                if self.has_data {
                    self.data.push('\n');
                }
                self.data.push_str(value);
                self.has_data = true;
            }
            "id" if !value.contains('\0') => self.id = Some(value.to_string()),
            // reconnection is not ours to manage
            "retry" => {}
            _ => log::trace!("Ignoring unknown event stream field {field}"),
        }

        None
    }

    fn dispatch(&mut self) -> Option<ServerEvent> {
        let event = self.event.take();
        if !self.has_data {
            return None;
        }

        self.has_data = false;
        Some(ServerEvent {
            event: event
                .filter(|e| !e.is_empty())
                .unwrap_or_else(|| "message".to_string()),
            data: std::mem::take(&mut self.data),
            id: self.id.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_event() {
        let mut parser = EventStreamParser::new();
        let events = parser.feed(b"data: {\"segment_path\": \"seg_0.mp4\"}\n\n");
        assert_eq!(
            events,
            vec![ServerEvent {
                event: "message".to_string(),
                data: "{\"segment_path\": \"seg_0.mp4\"}".to_string(),
                id: None,
            }]
        );
    }

    #[test]
    fn test_split_chunks_and_crlf() {
        let mut parser = EventStreamParser::new();
        assert!(parser.feed(b"id: 7\r\nda").is_empty());
        assert!(parser.feed(b"ta: first\r").is_empty());
        assert!(parser.feed(b"\ndata: second\r\n").is_empty());

        let events = parser.feed(b"\r\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "first\nsecond");
        assert_eq!(events[0].id.as_deref(), Some("7"));
    }

    #[test]
    fn test_comments_and_named_events() {
        let mut parser = EventStreamParser::new();
        let events = parser.feed(b": keep-alive\n\nevent: ping\ndata\n\ndata:x\n\n");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event, "ping");
        assert_eq!(events[0].data, "");
        assert_eq!(events[1].event, "message");
        assert_eq!(events[1].data, "x");
    }

    #[test]
    fn test_blank_line_without_data_dispatches_nothing() {
        let mut parser = EventStreamParser::new();
        assert!(parser.feed(b"event: noop\n\n\n").is_empty());
        let events = parser.feed(b"data: after\n\n");
        assert_eq!(events[0].event, "message");
    }

    #[test]
    fn test_leading_bom_is_stripped() {
        let mut parser = EventStreamParser::new();
        let events = parser.feed("\u{feff}data: x\n\n".as_bytes());
        assert_eq!(events[0].data, "x");
    }
}
