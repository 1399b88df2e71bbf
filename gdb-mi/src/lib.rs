//! Streaming parser for GDB's Machine Interface (MI2) output grammar.
//!
//! One logical line of GDB output becomes one [`MiRecord`]. The parser is
//! deliberately forgiving: output from the inferior can leak onto the MI
//! channel, so anything that does not parse as a record is surfaced as
//! console output rather than an error.

mod decode;
mod parse;
mod record;
mod value;

pub use decode::MiDecoder;
pub use parse::MiParser;
pub use record::{AsyncKind, AsyncRecord, MiRecord, ResultClass, ResultRecord, StreamKind, StreamRecord};
pub use value::{MiTuple, MiValue};
