//! Splits the byte stream of a connection into JSON messages.
//!
//! Messages carry no length prefix and no delimiter. A message ends at the first byte where
//! the number of `{` seen equals the number of `}` seen (and at least one `{` was seen).
//!
//! # Limitations
//! The scan counts literal brace bytes and knows nothing about JSON strings, so a string
//! value containing an unbalanced `{` or `}` throws the count off: the message is cut
//! early (and fails to decode) or never completes. This is part of the wire format shared
//! with existing clients and is kept as is.
use serde_json::Value;
use tracing::debug;

/// Accumulates bytes received on a connection and yields each complete message.
///
/// Feed it with [`push`](Framer::push) every time data is available, then drain the
/// complete messages with [`frames`](Framer::frames). Neither call blocks.
#[derive(Debug, Default)]
pub struct Framer {
    // bytes received that are not yet part of a yielded message
    buffer: Vec<u8>,
    // how much of `buffer` has been scanned already
    scanned: usize,
    open: usize,
    close: usize,
}

impl Framer {
    /// creates an empty `Framer`
    pub fn new() -> Self {
        Framer::default()
    }

    /// appends a chunk of bytes read from the connection
    pub fn push(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// returns the raw bytes of the next complete message, if one has arrived.
    ///
    /// Only bytes not scanned by a previous call are examined. Once a message is returned the
    /// buffer and both brace counters are reset, and scanning resumes with whatever followed
    /// the message in the same chunk.
    pub fn next_message(&mut self) -> Option<Vec<u8>> {
        while self.scanned < self.buffer.len() {
            match self.buffer[self.scanned] {
                b'{' => self.open += 1,
                b'}' => self.close += 1,
                _ => {}
            }
            self.scanned += 1;

            if self.open > 0 && self.open == self.close {
                let message: Vec<u8> = self.buffer.drain(..self.scanned).collect();
                self.scanned = 0;
                self.open = 0;
                self.close = 0;
                return Some(message);
            }
        }
        None
    }

    /// a lazy iterator over the decoded messages currently complete in the buffer
    pub fn frames(&mut self) -> Frames<'_> {
        Frames { framer: self }
    }

    /// number of buffered bytes that do not (yet) form a complete message
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// ends the stream. An incomplete trailing message is dropped without error, the number of
    /// bytes dropped is returned.
    pub fn finish(self) -> usize {
        let dropped = self.pending();
        if dropped > 0 {
            debug!(dropped, open = self.open, close = self.close, "discarding incomplete message");
        }
        dropped
    }
}

/// Iterator returned by [`Framer::frames`]. Each item is the JSON decoding of one message.
#[derive(Debug)]
pub struct Frames<'a> {
    framer: &'a mut Framer,
}

impl Iterator for Frames<'_> {
    type Item = serde_json::Result<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        self.framer
            .next_message()
            .map(|message| serde_json::from_slice(&message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const MESSAGE: &str = r#"{"type":"add","user":"u1","title":"t1","body":"b","color":"red"}"#;

    fn decoded(framer: &mut Framer) -> Vec<Value> {
        framer.frames().map(|frame| frame.unwrap()).collect()
    }

    #[test]
    fn single_chunk_yields_one_message() {
        let mut framer = Framer::new();
        framer.push(MESSAGE.as_bytes());

        let frames = decoded(&mut framer);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0]["type"], json!("add"));
        assert_eq!(framer.pending(), 0);
    }

    #[test]
    fn byte_by_byte_delivery_decodes_identically() {
        let mut whole = Framer::new();
        whole.push(MESSAGE.as_bytes());
        let expected = decoded(&mut whole);

        let mut framer = Framer::new();
        let mut frames = vec![];
        for byte in MESSAGE.as_bytes() {
            framer.push(std::slice::from_ref(byte));
            frames.extend(decoded(&mut framer));
        }
        assert_eq!(frames, expected);
    }

    #[test]
    fn nested_objects_end_at_the_outer_brace() {
        let mut framer = Framer::new();
        framer.push(br#"{"a":{"b":{}}"#);
        assert!(framer.next_message().is_none());
        framer.push(b"}");
        assert_eq!(decoded(&mut framer), vec![json!({"a": {"b": {}}})]);
    }

    #[test]
    fn back_to_back_messages_in_one_chunk_are_split() {
        let mut framer = Framer::new();
        framer.push(br#"{"type":"list","user":"u"}{"type":"read","#);
        assert_eq!(decoded(&mut framer), vec![json!({"type": "list", "user": "u"})]);

        framer.push(br#""user":"u","title":"t"}"#);
        assert_eq!(
            decoded(&mut framer),
            vec![json!({"type": "read", "user": "u", "title": "t"})]
        );
    }

    #[test]
    fn empty_object_is_a_message() {
        let mut framer = Framer::new();
        framer.push(b"{}");
        assert_eq!(decoded(&mut framer), vec![json!({})]);
    }

    #[test]
    fn incomplete_message_is_dropped_at_end_of_stream() {
        let mut framer = Framer::new();
        framer.push(br#"{"type":"list","#);
        assert_eq!(framer.frames().count(), 0);
        assert_eq!(framer.finish(), 15);
    }

    #[test]
    fn brace_inside_a_string_cuts_the_message_short() {
        let mut framer = Framer::new();
        framer.push(br#"{"body":"}"}"#);
        let frames: Vec<_> = framer.frames().collect();
        assert_eq!(frames.len(), 1);
        assert!(frames[0].is_err());
        assert_eq!(framer.pending(), 2);
    }
}
