use std::fmt;

use crate::value::MiTuple;

/// The class of a `^` result record.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ResultClass {
    Done,
    Running,
    Connected,
    Exit,
    Error,
}

impl ResultClass {
    pub fn parse(s: &str) -> Option<ResultClass> {
        Some(match s {
            "done" => ResultClass::Done,
            "running" => ResultClass::Running,
            "connected" => ResultClass::Connected,
            "exit" => ResultClass::Exit,
            "error" => ResultClass::Error,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ResultClass::Done => "done",
            ResultClass::Running => "running",
            ResultClass::Connected => "connected",
            ResultClass::Exit => "exit",
            ResultClass::Error => "error",
        }
    }
}

impl fmt::Display for ResultClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which flavour of out-of-band async record was received.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AsyncKind {
    /// `*`: progress of the inferior (`running`, `stopped`).
    Exec,
    /// `+`: status updates for long-running operations.
    Status,
    /// `=`: notifications (`thread-created`, `breakpoint-modified`, …).
    Notify,
}

/// Which stream a `~`/`@`/`&` record belongs to.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StreamKind {
    /// `~`: console output intended for the user.
    Console,
    /// `@`: output from the remote target.
    Target,
    /// `&`: GDB's own log, low priority.
    Log,
}

/// `token^class,results…`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResultRecord {
    pub token: Option<u64>,
    pub class: ResultClass,
    pub results: MiTuple,
}

/// `token*class,results…` / `+…` / `=…`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AsyncRecord {
    pub token: Option<u64>,
    pub kind: AsyncKind,
    /// The async class is open-ended (`stopped`, `thread-created`, …), so it
    /// stays a string.
    pub class: String,
    pub results: MiTuple,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamRecord {
    pub kind: StreamKind,
    pub text: String,
}

/// One logical line of MI output.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MiRecord {
    Result(ResultRecord),
    Async(AsyncRecord),
    Stream(StreamRecord),
    /// The `(gdb)` prompt; signals that GDB is ready for input.
    Prompt,
}

impl MiRecord {
    /// Wrap raw, unparseable text as console output. Inferior stdout can
    /// leak onto the MI channel, so this is a recovery path, not an error.
    pub fn console(text: impl Into<String>) -> MiRecord {
        MiRecord::Stream(StreamRecord {
            kind: StreamKind::Console,
            text: text.into(),
        })
    }
}
