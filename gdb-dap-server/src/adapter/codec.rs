//! Content-Length framing for DAP messages, as a tokio codec.

use std::io::BufRead;
use std::marker::PhantomData;

use serde::{Deserialize, Serialize};
use tokio_util::bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

/// Frames DAP messages: a `Content-Length` header block followed by a JSON
/// body. The decoder tolerates malformed packets by scanning forward to the
/// next well-formed header.
#[derive(Debug)]
pub struct DapCodec<T> {
    length: Option<usize>,
    header_received: bool,
    _message: PhantomData<T>,
}

impl<T> DapCodec<T> {
    pub fn new() -> Self {
        DapCodec {
            length: None,
            header_received: false,
            _message: PhantomData,
        }
    }
}

impl<T> Default for DapCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: for<'a> Deserialize<'a>> Decoder for DapCodec<T> {
    type Item = T;
    type Error = std::io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // We have not received the full header yet, so scan for more header entries.
        if !self.header_received {
            while let Some(line) = read_line(src) {
                let line = line.inspect_err(|_| {
                    // Remove the faulty line from the buffer before erroring.
                    let _ = src.split_to((&src[..]).skip_until(b'\n').unwrap_or(0));
                })?;

                if line.is_empty() {
                    let _ = src.split_to(line.len() + b"\r\n".len());
                    if self.length.is_some() {
                        // The header is done parsing. Content starts on the next line.
                        self.header_received = true;
                        break;
                    }
                    // A header end without a length. Keep flushing lines
                    // until a valid header shows up.
                } else if let Some(length) = get_content_len(&line) {
                    self.length = Some(length);
                    src.reserve(length + b"\r\n".len());
                    let _ = src.split_to(line.len() + b"\r\n".len());
                } else {
                    tracing::warn!("Unknown header payload: {line}");
                    let _ = src.split_to(line.len() + b"\r\n".len());
                }
            }
        }

        if self.header_received {
            let Some(length) = self.length else {
                return Ok(None);
            };

            if src.len() < length {
                // Not enough content yet. Wait for more bytes.
                return Ok(None);
            }

            self.header_received = false;
            self.length = None;

            return Ok(Some(serde_json::from_slice::<T>(&src.split_to(length))?));
        }

        Ok(None)
    }
}

impl<T: for<'a> Deserialize<'a>, M: Serialize> Encoder<&M> for DapCodec<T> {
    type Error = std::io::Error;

    fn encode(&mut self, message: &M, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let body = serde_json::to_vec(message)?;
        dst.reserve(body.len() + 32);
        dst.extend_from_slice(format!("Content-Length: {}\r\n\r\n", body.len()).as_bytes());
        dst.extend_from_slice(&body);
        Ok(())
    }
}

fn read_line(bytes: &mut BytesMut) -> Option<Result<String, std::io::Error>> {
    let mut buf = String::new();
    match (&bytes[..]).read_line(&mut buf) {
        Ok(0) => None,
        Ok(_n) => {
            if buf.ends_with('\n') {
                buf.pop();
                if buf.ends_with('\r') {
                    buf.pop();
                }
            } else {
                // EOF terminated lines do not count as complete yet.
                return None;
            }
            Some(Ok(buf))
        }
        Err(e) => Some(Err(e)),
    }
}

/// Parses the Content-Length header.
///
/// Discards excess characters at the start of the header to recover faster
/// from previous malformed packets.
pub(crate) fn get_content_len(header: &str) -> Option<usize> {
    let mut parts = header.trim_end().split_ascii_whitespace();

    let name = parts.next()?;

    if name.ends_with("Content-Length:") {
        parts.next()?.parse::<usize>().ok()
    } else {
        None
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::io::ErrorKind;

    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};
    use tokio_util::bytes::BytesMut;
    use tokio_util::codec::{Decoder, Encoder};

    use super::{get_content_len, DapCodec};

    fn frame(content: &Value) -> BytesMut {
        let payload = serde_json::to_string(content).unwrap();
        let mut buf = BytesMut::new();
        buf.extend_from_slice(format!("Content-Length: {}\r\n\r\n", payload.len()).as_bytes());
        buf.extend_from_slice(payload.as_bytes());
        buf
    }

    #[test]
    fn good_single_frame() {
        let mut codec = DapCodec::<Value>::new();
        let content = json!({"seq": 3, "type": "request", "command": "test"});
        let mut buf = frame(&content);

        assert_eq!(codec.decode(&mut buf).unwrap().unwrap(), content);
        assert_eq!(buf.len(), 0);
    }

    #[test]
    fn good_split_frame() {
        let mut codec = DapCodec::<Value>::new();
        let content = json!({"seq": 3, "type": "request", "command": "test"});
        let whole = frame(&content);
        let mut buf = BytesMut::from(&whole[..whole.len() / 2]);

        // The frame is not ready yet.
        assert_eq!(codec.decode(&mut buf).unwrap(), None);

        buf.extend_from_slice(&whole[whole.len() / 2..]);
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap(), content);
        assert_eq!(buf.len(), 0);
    }

    #[test]
    fn bad_frame_invalid_json() {
        let mut codec = DapCodec::<Value>::new();
        let mut buf = BytesMut::new();
        let payload = "{\"test:}";
        buf.extend_from_slice(format!("Content-Length: {}\r\n\r\n", payload.len()).as_bytes());
        buf.extend_from_slice(payload.as_bytes());

        let result = codec.decode(&mut buf);

        assert_eq!(result.unwrap_err().kind(), ErrorKind::UnexpectedEof);
        assert_eq!(buf.len(), 0);
    }

    #[test]
    fn recover_from_frame_without_length() {
        let mut codec = DapCodec::<Value>::new();
        let content = json!({"seq": 3, "type": "request", "command": "test"});
        let payload = serde_json::to_string(&content).unwrap();
        let mut buf = BytesMut::new();
        // A frame without a length header, followed by a good frame.
        buf.extend_from_slice("\r\n".as_bytes());
        buf.extend_from_slice(payload.as_bytes());
        buf.extend_from_slice(&frame(&content));

        assert_eq!(codec.decode(&mut buf).unwrap().unwrap(), content);
        assert_eq!(buf.len(), 0);

        assert_eq!(codec.decode(&mut buf).unwrap(), None);
    }

    #[test]
    fn encode_decode_round_trip() {
        let mut codec = DapCodec::<Value>::new();
        let content = json!({"seq": 8, "type": "event", "event": "stopped"});
        let mut buf = BytesMut::new();

        codec.encode(&content, &mut buf).unwrap();
        assert!(buf.starts_with(b"Content-Length: "));

        assert_eq!(codec.decode(&mut buf).unwrap().unwrap(), content);
        assert_eq!(buf.len(), 0);
    }

    #[test]
    fn parse_valid_length_header() {
        assert_eq!(234, get_content_len("Content-Length: 234\r\n").unwrap());
    }

    #[test]
    fn parse_length_header_with_prepended_garbage() {
        assert_eq!(234, get_content_len("asdasdContent-Length: 234\r\n").unwrap());
        assert!(get_content_len("asdasd Content-Length: 234\r\n").is_none());
    }

    #[test]
    fn parse_invalid_length_header() {
        assert!(get_content_len("Content: 234\r\n").is_none());
    }
}
