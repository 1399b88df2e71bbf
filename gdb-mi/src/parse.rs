use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::record::{
    AsyncKind, AsyncRecord, MiRecord, ResultClass, ResultRecord, StreamKind, StreamRecord,
};
use crate::value::{MiTuple, MiValue};

/// Parses one logical line of MI output into an [`MiRecord`].
///
/// The parser never fails: a line that does not match the grammar (a leaked
/// inferior write, a truncated C-string) is returned as console output so
/// the session can surface it instead of dropping it.
#[derive(Clone, Debug)]
pub struct MiParser {
    utf8: Arc<AtomicBool>,
}

impl Default for MiParser {
    fn default() -> Self {
        Self::new()
    }
}

impl MiParser {
    pub fn new() -> Self {
        MiParser {
            utf8: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Shared handle used to switch off UTF-8 decoding of C-strings after
    /// the backend has probed GDB's supported charsets.
    pub fn utf8_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.utf8)
    }

    pub fn parse_line(&self, line: &[u8]) -> MiRecord {
        let line = match line {
            [rest @ .., b'\r'] => rest,
            _ => line,
        };

        let mut cur = Cursor {
            buf: line,
            pos: 0,
            utf8: self.utf8.load(Ordering::Relaxed),
        };

        match cur.parse_record() {
            Ok(record) => record,
            Err(err) => {
                tracing::trace!("unparseable MI line ({err}): {}", lossy(line));
                MiRecord::console(lossy(line))
            }
        }
    }
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

#[derive(Debug, thiserror::Error)]
enum ParseError {
    #[error("unexpected end of line")]
    Eol,
    #[error("unterminated C-string")]
    UnterminatedString,
    #[error("unknown result class {0:?}")]
    UnknownResultClass(String),
    #[error("unknown record indicator {0:?}")]
    UnknownIndicator(char),
    #[error("expected {expected:?} at column {at}")]
    Expected { expected: char, at: usize },
}

struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
    utf8: bool,
}

impl<'a> Cursor<'a> {
    fn peek(&self) -> Option<u8> {
        self.buf.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        Some(b)
    }

    fn eat(&mut self, expected: u8) -> Result<(), ParseError> {
        if self.peek() == Some(expected) {
            self.pos += 1;
            Ok(())
        } else {
            Err(ParseError::Expected {
                expected: expected as char,
                at: self.pos,
            })
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.buf.len()
    }

    fn parse_record(&mut self) -> Result<MiRecord, ParseError> {
        let token = self.parse_token();

        let indicator = self.bump().ok_or(ParseError::Eol)?;
        match indicator {
            b'^' => {
                let class_text = self.parse_ident();
                let class = ResultClass::parse(&class_text)
                    .ok_or(ParseError::UnknownResultClass(class_text))?;
                let results = self.parse_results()?;
                Ok(MiRecord::Result(ResultRecord {
                    token,
                    class,
                    results,
                }))
            }
            b'*' | b'+' | b'=' => {
                let kind = match indicator {
                    b'*' => AsyncKind::Exec,
                    b'+' => AsyncKind::Status,
                    _ => AsyncKind::Notify,
                };
                let class = self.parse_ident();
                let results = self.parse_results()?;
                Ok(MiRecord::Async(AsyncRecord {
                    token,
                    kind,
                    class,
                    results,
                }))
            }
            b'~' | b'@' | b'&' => {
                let kind = match indicator {
                    b'~' => StreamKind::Console,
                    b'@' => StreamKind::Target,
                    _ => StreamKind::Log,
                };
                let text = self.parse_cstring()?;
                Ok(MiRecord::Stream(StreamRecord { kind, text }))
            }
            b'(' => {
                // The `(gdb)` prompt, possibly with trailing whitespace.
                if self.buf.starts_with(b"(gdb)") || self.buf[self.pos..].starts_with(b"gdb)") {
                    Ok(MiRecord::Prompt)
                } else {
                    Err(ParseError::UnknownIndicator('('))
                }
            }
            other => Err(ParseError::UnknownIndicator(other as char)),
        }
    }

    /// The optional leading command token: one or more ASCII digits.
    fn parse_token(&mut self) -> Option<u64> {
        let start = self.pos;
        while matches!(self.peek(), Some(b'0'..=b'9')) {
            self.pos += 1;
        }
        if self.pos == start {
            return None;
        }
        std::str::from_utf8(&self.buf[start..self.pos])
            .ok()
            .and_then(|s| s.parse().ok())
    }

    fn parse_ident(&mut self) -> String {
        let start = self.pos;
        while matches!(self.peek(), Some(b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' | b'_')) {
            self.pos += 1;
        }
        lossy(&self.buf[start..self.pos])
    }

    /// `(,result)*` to end of line.
    fn parse_results(&mut self) -> Result<MiTuple, ParseError> {
        let mut results = MiTuple::new();
        while !self.at_end() {
            self.eat(b',')?;
            let key = self.parse_ident();
            self.eat(b'=')?;
            let value = self.parse_value()?;
            results.push(key, value);
        }
        Ok(results)
    }

    fn parse_value(&mut self) -> Result<MiValue, ParseError> {
        match self.peek().ok_or(ParseError::Eol)? {
            b'"' => Ok(MiValue::Const(self.parse_cstring()?)),
            b'{' => self.parse_tuple(),
            b'[' => self.parse_list(),
            // Bare words are not in the documented grammar, but older GDBs
            // emit them in some result forms. Take everything up to the
            // next delimiter.
            _ => {
                let start = self.pos;
                while !matches!(self.peek(), None | Some(b',') | Some(b'}') | Some(b']')) {
                    self.pos += 1;
                }
                Ok(MiValue::Const(lossy(&self.buf[start..self.pos])))
            }
        }
    }

    fn parse_tuple(&mut self) -> Result<MiValue, ParseError> {
        self.eat(b'{')?;
        let mut tuple = MiTuple::new();
        if self.peek() == Some(b'}') {
            self.pos += 1;
            return Ok(MiValue::Tuple(tuple));
        }
        loop {
            // A member is either `key=value` or a bare value, which gets an
            // ordinal key.
            let checkpoint = self.pos;
            let key = self.parse_ident();
            if !key.is_empty() && self.peek() == Some(b'=') {
                self.pos += 1;
                let value = self.parse_value()?;
                tuple.push(key, value);
            } else {
                self.pos = checkpoint;
                let value = self.parse_value()?;
                tuple.push_bare(value);
            }
            match self.bump().ok_or(ParseError::Eol)? {
                b',' => continue,
                b'}' => break,
                _ => {
                    return Err(ParseError::Expected {
                        expected: '}',
                        at: self.pos - 1,
                    })
                }
            }
        }
        Ok(MiValue::Tuple(tuple))
    }

    fn parse_list(&mut self) -> Result<MiValue, ParseError> {
        self.eat(b'[')?;
        let mut list = Vec::new();
        if self.peek() == Some(b']') {
            self.pos += 1;
            return Ok(MiValue::List(list));
        }
        loop {
            // List members may be plain values or `key=value` results
            // (`body=[bkpt={…},bkpt={…}]`); the latter become single-entry
            // tuples so the key survives.
            let checkpoint = self.pos;
            let key = self.parse_ident();
            if !key.is_empty() && self.peek() == Some(b'=') {
                self.pos += 1;
                let value = self.parse_value()?;
                let mut entry = MiTuple::new();
                entry.push(key, value);
                list.push(MiValue::Tuple(entry));
            } else {
                self.pos = checkpoint;
                list.push(self.parse_value()?);
            }
            match self.bump().ok_or(ParseError::Eol)? {
                b',' => continue,
                b']' => break,
                _ => {
                    return Err(ParseError::Expected {
                        expected: ']',
                        at: self.pos - 1,
                    })
                }
            }
        }
        Ok(MiValue::List(list))
    }

    /// A double-quoted C-string. Escaped bytes are accumulated and decoded
    /// as UTF-8 unless decoding was disabled, in which case each byte maps
    /// onto the equivalent Latin-1 character.
    fn parse_cstring(&mut self) -> Result<String, ParseError> {
        self.eat(b'"')?;
        let mut bytes = Vec::new();
        loop {
            match self.bump().ok_or(ParseError::UnterminatedString)? {
                b'"' => break,
                b'\\' => match self.bump().ok_or(ParseError::UnterminatedString)? {
                    b'n' => bytes.push(b'\n'),
                    b't' => bytes.push(b'\t'),
                    // GDB emits \r\n pairs on some hosts; the \r is dropped
                    // so output is uniform across platforms.
                    b'r' => {}
                    b'\\' => bytes.push(b'\\'),
                    b'"' => bytes.push(b'"'),
                    d @ b'0'..=b'7' => {
                        let mut value = (d - b'0') as u32;
                        for _ in 0..2 {
                            match self.peek() {
                                Some(d @ b'0'..=b'7') => {
                                    value = value * 8 + (d - b'0') as u32;
                                    self.pos += 1;
                                }
                                _ => break,
                            }
                        }
                        bytes.push(value as u8);
                    }
                    other => bytes.push(other),
                },
                other => bytes.push(other),
            }
        }
        if self.utf8 {
            Ok(String::from_utf8_lossy(&bytes).into_owned())
        } else {
            Ok(bytes.iter().map(|&b| b as char).collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn parse(line: &str) -> MiRecord {
        MiParser::new().parse_line(line.as_bytes())
    }

    #[test]
    fn result_record_with_token() {
        let MiRecord::Result(record) = parse(r#"42^done,value="7""#) else {
            panic!("expected result record");
        };
        assert_eq!(record.token, Some(42));
        assert_eq!(record.class, ResultClass::Done);
        assert_eq!(record.results.string("value"), Some("7"));
    }

    #[test]
    fn result_record_without_results() {
        let MiRecord::Result(record) = parse("7^running") else {
            panic!("expected result record");
        };
        assert_eq!(record.token, Some(7));
        assert_eq!(record.class, ResultClass::Running);
        assert!(record.results.is_empty());
    }

    #[test]
    fn error_record_carries_message() {
        let MiRecord::Result(record) = parse(r#"9^error,msg="No symbol table is loaded.""#) else {
            panic!("expected result record");
        };
        assert_eq!(record.class, ResultClass::Error);
        assert_eq!(record.results.string("msg"), Some("No symbol table is loaded."));
    }

    #[test]
    fn stopped_record() {
        let MiRecord::Async(record) = parse(
            r#"*stopped,reason="breakpoint-hit",disp="keep",bkptno="1",thread-id="1",stopped-threads="all",frame={addr="0x0000555555555131",func="main",args=[],file="a.c",line="10"}"#,
        ) else {
            panic!("expected async record");
        };
        assert_eq!(record.kind, AsyncKind::Exec);
        assert_eq!(record.class, "stopped");
        assert_eq!(record.results.string("reason"), Some("breakpoint-hit"));
        let frame = record.results.tuple("frame").unwrap();
        assert_eq!(frame.string("func"), Some("main"));
        assert_eq!(frame.int("line"), Some(10));
        assert_eq!(frame.list("args"), Some(&[][..]));
    }

    #[test]
    fn notify_record() {
        let MiRecord::Async(record) =
            parse(r#"=thread-created,id="2",group-id="i1",name="worker""#)
        else {
            panic!("expected async record");
        };
        assert_eq!(record.kind, AsyncKind::Notify);
        assert_eq!(record.class, "thread-created");
        assert_eq!(record.results.int("id"), Some(2));
        assert_eq!(record.results.string("name"), Some("worker"));
    }

    #[test]
    fn breakpoint_table_list_with_keyed_members() {
        let MiRecord::Result(record) = parse(
            r#"4^done,BreakpointTable={nr_rows="2",body=[bkpt={number="1",line="10"},bkpt={number="2",line="20"}]}"#,
        ) else {
            panic!("expected result record");
        };
        let table = record.results.tuple("BreakpointTable").unwrap();
        let body = table.list("body").unwrap();
        assert_eq!(body.len(), 2);
        assert_eq!(body[0].get("bkpt").unwrap().get("number").unwrap().as_str(), Some("1"));
        assert_eq!(body[1].get("bkpt").unwrap().get("line").unwrap().as_str(), Some("20"));
    }

    #[test]
    fn bare_tuple_members_are_ordinal_indexed() {
        let MiRecord::Result(record) = parse(r#"^done,odd={"a","b",k="c"}"#) else {
            panic!("expected result record");
        };
        let odd = record.results.tuple("odd").unwrap();
        assert_eq!(odd.string("0"), Some("a"));
        assert_eq!(odd.string("1"), Some("b"));
        assert_eq!(odd.string("k"), Some("c"));
    }

    #[test]
    fn console_stream_unescapes() {
        let MiRecord::Stream(record) = parse(r#"~"line one\nline two\n""#) else {
            panic!("expected stream record");
        };
        assert_eq!(record.kind, StreamKind::Console);
        assert_eq!(record.text, "line one\nline two\n");
    }

    #[test]
    fn log_stream() {
        let MiRecord::Stream(record) = parse(r#"&"warning: something\n""#) else {
            panic!("expected stream record");
        };
        assert_eq!(record.kind, StreamKind::Log);
    }

    #[test]
    fn carriage_returns_inside_strings_are_dropped() {
        let MiRecord::Stream(record) = parse(r#"~"one\r\ntwo\r\n""#) else {
            panic!("expected stream record");
        };
        assert_eq!(record.text, "one\ntwo\n");
    }

    #[test]
    fn octal_escapes_decode_as_utf8_by_default() {
        // "é" encoded as the UTF-8 pair \303\251.
        let MiRecord::Stream(record) = parse(r#"~"caf\303\251""#) else {
            panic!("expected stream record");
        };
        assert_eq!(record.text, "café");
    }

    #[test]
    fn octal_escapes_decode_as_latin1_when_utf8_disabled() {
        let parser = MiParser::new();
        parser.utf8_flag().store(false, std::sync::atomic::Ordering::Relaxed);
        let MiRecord::Stream(record) = parser.parse_line(br#"~"caf\351""#) else {
            panic!("expected stream record");
        };
        assert_eq!(record.text, "café");
    }

    #[test]
    fn unknown_escape_keeps_the_escaped_character() {
        let MiRecord::Stream(record) = parse(r#"~"a\qb""#) else {
            panic!("expected stream record");
        };
        assert_eq!(record.text, "aqb");
    }

    #[test]
    fn prompt_line() {
        assert_eq!(parse("(gdb) "), MiRecord::Prompt);
        assert_eq!(parse("(gdb)"), MiRecord::Prompt);
    }

    #[test]
    fn leaked_inferior_output_becomes_console_output() {
        assert_eq!(
            parse("hello from the inferior"),
            MiRecord::console("hello from the inferior")
        );
    }

    #[test]
    fn unterminated_cstring_becomes_console_output() {
        assert_eq!(parse(r#"~"no closing quote"#), MiRecord::console(r#"~"no closing quote"#));
    }

    #[test]
    fn digits_followed_by_junk_become_console_output() {
        assert_eq!(parse("123abc"), MiRecord::console("123abc"));
    }

    #[test]
    fn trailing_carriage_return_is_tolerated() {
        let MiRecord::Result(record) = parse("^done\r") else {
            panic!("expected result record");
        };
        assert_eq!(record.class, ResultClass::Done);
    }

    // Randomized serialize/parse round trip over MI value trees.
    mod round_trip {
        use pretty_assertions::assert_eq;

        use super::super::*;

        fn arbitrary_string(rng: &mut fastrand::Rng) -> String {
            let len = rng.usize(0..12);
            (0..len)
                .map(|_| {
                    // Printable ASCII plus the characters that exercise the
                    // escaping rules.
                    match rng.u8(0..6) {
                        0 => '"',
                        1 => '\\',
                        2 => '\n',
                        3 => '\t',
                        _ => rng.char('a'..='z'),
                    }
                })
                .collect()
        }

        fn arbitrary_value(rng: &mut fastrand::Rng, depth: usize) -> MiValue {
            let choice = if depth >= 3 { 0 } else { rng.u8(0..4) };
            match choice {
                0 | 1 => MiValue::Const(arbitrary_string(rng)),
                2 => {
                    let mut tuple = MiTuple::new();
                    for i in 0..rng.usize(0..4) {
                        tuple.push(format!("k{i}"), arbitrary_value(rng, depth + 1));
                    }
                    MiValue::Tuple(tuple)
                }
                _ => MiValue::List(
                    (0..rng.usize(0..4))
                        .map(|_| arbitrary_value(rng, depth + 1))
                        .collect(),
                ),
            }
        }

        #[test]
        fn parse_inverts_serialization() {
            let mut rng = fastrand::Rng::with_seed(0x6d69_3270);
            for _ in 0..500 {
                let value = arbitrary_value(&mut rng, 0);
                let line = format!("^done,v={value}");
                let MiRecord::Result(record) = MiParser::new().parse_line(line.as_bytes()) else {
                    panic!("round trip failed to parse: {line}");
                };
                assert_eq!(record.results.get("v"), Some(&value), "line: {line}");
            }
        }
    }
}
