use tokio_util::bytes::BytesMut;
use tokio_util::codec::Decoder;

use crate::parse::MiParser;
use crate::record::MiRecord;

/// Frames the GDB output byte stream into lines and parses each into an
/// [`MiRecord`].
///
/// Lines are split on LF; a CR before the LF is tolerated. A partial
/// trailing segment stays buffered until the next chunk arrives. Blank
/// lines are skipped.
#[derive(Debug)]
pub struct MiDecoder {
    parser: MiParser,
}

impl MiDecoder {
    pub fn new(parser: MiParser) -> Self {
        MiDecoder { parser }
    }
}

impl Decoder for MiDecoder {
    type Item = MiRecord;
    type Error = std::io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let Some(newline) = src.iter().position(|&b| b == b'\n') else {
                return Ok(None);
            };
            let line = src.split_to(newline + 1);
            let line = match &line[..newline] {
                [rest @ .., b'\r'] => rest,
                whole => whole,
            };
            if line.is_empty() {
                continue;
            }
            return Ok(Some(self.parser.parse_line(line)));
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use tokio_util::bytes::BytesMut;
    use tokio_util::codec::Decoder;

    use super::*;
    use crate::record::{ResultClass, StreamKind};

    fn decoder() -> MiDecoder {
        MiDecoder::new(MiParser::new())
    }

    #[test]
    fn one_record_per_line() {
        let mut decoder = decoder();
        let mut buf = BytesMut::from(&b"12^done\n*running,thread-id=\"all\"\n"[..]);

        let MiRecord::Result(first) = decoder.decode(&mut buf).unwrap().unwrap() else {
            panic!("expected result record");
        };
        assert_eq!(first.token, Some(12));
        assert_eq!(first.class, ResultClass::Done);

        let MiRecord::Async(second) = decoder.decode(&mut buf).unwrap().unwrap() else {
            panic!("expected async record");
        };
        assert_eq!(second.class, "running");

        assert_eq!(decoder.decode(&mut buf).unwrap(), None);
    }

    #[test]
    fn partial_line_waits_for_more_input() {
        let mut decoder = decoder();
        let mut buf = BytesMut::from(&b"5^do"[..]);

        assert_eq!(decoder.decode(&mut buf).unwrap(), None);

        buf.extend_from_slice(b"ne\n");
        let MiRecord::Result(record) = decoder.decode(&mut buf).unwrap().unwrap() else {
            panic!("expected result record");
        };
        assert_eq!(record.token, Some(5));
    }

    #[test]
    fn crlf_line_endings() {
        let mut decoder = decoder();
        let mut buf = BytesMut::from(&b"~\"hi\\n\"\r\n(gdb) \r\n"[..]);

        let MiRecord::Stream(stream) = decoder.decode(&mut buf).unwrap().unwrap() else {
            panic!("expected stream record");
        };
        assert_eq!(stream.kind, StreamKind::Console);
        assert_eq!(stream.text, "hi\n");

        assert_eq!(decoder.decode(&mut buf).unwrap(), Some(MiRecord::Prompt));
    }

    #[test]
    fn blank_lines_are_skipped() {
        let mut decoder = decoder();
        let mut buf = BytesMut::from(&b"\n\r\n^done\n"[..]);

        let MiRecord::Result(record) = decoder.decode(&mut buf).unwrap().unwrap() else {
            panic!("expected result record");
        };
        assert_eq!(record.class, ResultClass::Done);
    }
}
