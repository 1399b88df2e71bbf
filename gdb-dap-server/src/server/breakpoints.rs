//! The breakpoint reconciler: turns "the full desired set of breakpoints"
//! into the minimal sequence of MI deletes and inserts.
//!
//! GDB is the source of truth for existing breakpoints; every
//! reconciliation starts from a fresh `-break-list`. Matching is purely
//! structural (location, condition, mode) so an unchanged desired set
//! produces no MI traffic at all.

use std::sync::OnceLock;

use gdb_mi::{MiTuple, MiValue};
use regex::Regex;

use crate::adapter::dap_types::{
    DataBreakpoint, FunctionBreakpoint, InstructionBreakpoint, SourceBreakpoint,
};
use crate::gdb::Quoted;
use crate::DebuggerError;

/// One row of `-break-list` (top-level breakpoints only; multi-location
/// sub-rows like "1.2" are skipped).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MiBreakpoint {
    pub number: i64,
    /// The MI `type` column ("breakpoint", "hw breakpoint", watchpoint
    /// flavours).
    pub type_: String,
    pub disp: String,
    pub enabled: bool,
    pub addr: Option<String>,
    pub func: Option<String>,
    pub file: Option<String>,
    pub fullname: Option<String>,
    pub line: Option<i64>,
    pub original_location: Option<String>,
    pub condition: Option<String>,
    pub ignore: Option<i64>,
    /// Watchpoint expression.
    pub what: Option<String>,
}

impl MiBreakpoint {
    pub fn from_tuple(tuple: &MiTuple) -> Option<MiBreakpoint> {
        let number_text = tuple.string("number")?;
        // Sub-locations of a multi-location breakpoint carry "N.M" numbers.
        let number: i64 = number_text.parse().ok()?;
        Some(MiBreakpoint {
            number,
            type_: tuple.string("type").unwrap_or("breakpoint").to_string(),
            disp: tuple.string("disp").unwrap_or_default().to_string(),
            enabled: tuple.string("enabled") != Some("n"),
            addr: tuple.string("addr").map(str::to_string),
            func: tuple.string("func").map(str::to_string),
            file: tuple.string("file").map(str::to_string),
            fullname: tuple.string("fullname").map(str::to_string),
            line: tuple.int("line"),
            original_location: tuple.string("original-location").map(str::to_string),
            condition: tuple.string("cond").map(str::to_string),
            ignore: tuple.int("ignore"),
            what: tuple.string("what").map(str::to_string),
        })
    }

    pub fn is_hardware(&self) -> bool {
        self.type_.starts_with("hw")
    }

    pub fn is_watchpoint(&self) -> bool {
        self.type_.contains("watchpoint")
    }

    /// Extract `(file, line)` from the MI `original-location`, which is
    /// either `-source <file> -line <n>` or `<file>:<n>`.
    pub fn location_file_line(&self) -> Option<(String, i64)> {
        static SOURCE_FORM: OnceLock<Regex> = OnceLock::new();
        static COLON_FORM: OnceLock<Regex> = OnceLock::new();

        let location = self.original_location.as_deref()?;

        let source_form = SOURCE_FORM.get_or_init(|| {
            Regex::new(r"^-source (.*) -line (\d+)$").unwrap_or_else(|_| unreachable!())
        });
        if let Some(captures) = source_form.captures(location) {
            return Some((captures[1].to_string(), captures[2].parse().ok()?));
        }

        let colon_form = COLON_FORM
            .get_or_init(|| Regex::new(r"^(.*):(\d+)$").unwrap_or_else(|_| unreachable!()));
        let captures = colon_form.captures(location)?;
        Some((captures[1].to_string(), captures[2].parse().ok()?))
    }
}

/// Flatten a `-break-list` result into breakpoint rows.
pub fn parse_break_list(results: &MiTuple) -> Vec<MiBreakpoint> {
    let Some(table) = results.tuple("BreakpointTable") else {
        return Vec::new();
    };
    let Some(body) = table.list("body") else {
        return Vec::new();
    };
    body.iter()
        .filter_map(|entry| {
            // Entries arrive as `bkpt={…}`; tolerate a bare tuple as well.
            let tuple = entry.get("bkpt").and_then(MiValue::as_tuple).or_else(|| entry.as_tuple())?;
            MiBreakpoint::from_tuple(tuple)
        })
        .collect()
}

/// A DAP hit condition, mapped onto MI's ignore-count and temporary flags.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HitCondition {
    /// `"N"`: fire once, after N hits.
    Exact(u64),
    /// `"> N"`: fire on every hit past N.
    GreaterThan(u64),
}

impl HitCondition {
    /// The mapping is one-way: there is no way to read these back from an
    /// existing breakpoint unambiguously, which is why breakpoints with a
    /// hit condition are always reinserted.
    pub fn parse(text: &str) -> Result<HitCondition, DebuggerError> {
        let trimmed = text.trim();
        if let Some(rest) = trimmed.strip_prefix('>') {
            let count = rest.trim().parse().map_err(|_| bad_hit_condition(text))?;
            return Ok(HitCondition::GreaterThan(count));
        }
        let count: u64 = trimmed.parse().map_err(|_| bad_hit_condition(text))?;
        if count == 0 {
            return Err(bad_hit_condition(text));
        }
        Ok(HitCondition::Exact(count))
    }

    pub fn ignore_count(&self) -> u64 {
        match self {
            HitCondition::Exact(n) => n - 1,
            HitCondition::GreaterThan(n) => *n,
        }
    }

    pub fn temporary(&self) -> bool {
        matches!(self, HitCondition::Exact(_))
    }
}

fn bad_hit_condition(text: &str) -> DebuggerError {
    DebuggerError::UserMessage(format!(
        "Unsupported hit condition {text:?}. Use a number (\"5\") or \"> <number>\"."
    ))
}

/// File equality: case-insensitive for Windows-style paths (drive letter or
/// backslash separators), case-sensitive elsewhere. Separators are unified
/// before comparing.
pub fn file_matches(a: &str, b: &str) -> bool {
    fn windows_style(path: &str) -> bool {
        path.contains('\\')
            || path
                .as_bytes()
                .get(1)
                .is_some_and(|&c| c == b':' && path.as_bytes()[0].is_ascii_alphabetic())
    }

    let normalize = |path: &str| path.replace('\\', "/");
    let (a_norm, b_norm) = (normalize(a), normalize(b));
    if windows_style(a) || windows_style(b) {
        a_norm.eq_ignore_ascii_case(&b_norm)
    } else {
        a_norm == b_norm
    }
}

fn conditions_equal(a: Option<&str>, b: Option<&str>) -> bool {
    // An empty condition string means no condition.
    fn normalize(c: Option<&str>) -> Option<&str> {
        c.filter(|c| !c.trim().is_empty()).map(str::trim)
    }
    normalize(a) == normalize(b)
}

fn wants_hardware(mode: Option<&str>, default_hardware: bool) -> bool {
    match mode {
        Some("hardware") => true,
        Some("software") => false,
        _ => default_hardware,
    }
}

/// The reconciler's answer: desired entries paired with a surviving MI
/// breakpoint where one matched, plus the MI ids to delete.
#[derive(Debug)]
pub struct Reconciliation<'d, 'e, D> {
    pub resolved: Vec<(&'d D, Option<&'e MiBreakpoint>)>,
    pub deletes: Vec<i64>,
}

fn reconcile<'d, 'e, D>(
    desired: &'d [D],
    existing: &'e [MiBreakpoint],
    matches: impl Fn(&D, &MiBreakpoint) -> bool,
) -> Reconciliation<'d, 'e, D> {
    let mut claimed = vec![false; existing.len()];
    let resolved = desired
        .iter()
        .map(|want| {
            let found = existing
                .iter()
                .enumerate()
                .find(|(i, have)| !claimed[*i] && matches(want, have));
            match found {
                Some((i, have)) => {
                    claimed[i] = true;
                    (want, Some(have))
                }
                None => (want, None),
            }
        })
        .collect();
    let deletes = existing
        .iter()
        .zip(&claimed)
        .filter(|(_, claimed)| !**claimed)
        .map(|(bp, _)| bp.number)
        .collect();
    Reconciliation { resolved, deletes }
}

pub fn resolve_source_breakpoints<'d, 'e>(
    desired: &'d [SourceBreakpoint],
    existing: &'e [MiBreakpoint],
    file: &str,
    default_hardware: bool,
) -> Reconciliation<'d, 'e, SourceBreakpoint> {
    reconcile(desired, existing, |want, have| {
        // Hit counts map one-way onto ignore/temporary; always reinsert.
        if want.hit_condition.as_deref().is_some_and(|h| !h.is_empty()) {
            return false;
        }
        let Some((have_file, have_line)) = have.location_file_line() else {
            return false;
        };
        file_matches(&have_file, file)
            && have_line == want.line
            && conditions_equal(want.condition.as_deref(), have.condition.as_deref())
            && wants_hardware(want.mode.as_deref(), default_hardware) == have.is_hardware()
    })
}

pub fn resolve_function_breakpoints<'d, 'e>(
    desired: &'d [FunctionBreakpoint],
    existing: &'e [MiBreakpoint],
) -> Reconciliation<'d, 'e, FunctionBreakpoint> {
    reconcile(desired, existing, |want, have| {
        if want.hit_condition.as_deref().is_some_and(|h| !h.is_empty()) {
            return false;
        }
        have.original_location.as_deref() == Some(want.name.as_str())
            && conditions_equal(want.condition.as_deref(), have.condition.as_deref())
    })
}

/// Normalize an instruction reference plus byte offset to `0x…` lowercase.
pub fn normalize_address(reference: &str, offset: i64) -> Result<String, DebuggerError> {
    let trimmed = reference.trim();
    let base = if let Some(hex) = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        u64::from_str_radix(hex, 16)
    } else {
        trimmed.parse()
    }
    .map_err(|_| {
        DebuggerError::UserMessage(format!("Invalid instruction reference {reference:?}"))
    })?;
    let address = base.wrapping_add_signed(offset);
    Ok(format!("{address:#x}"))
}

pub fn resolve_instruction_breakpoints<'d, 'e>(
    desired: &'d [InstructionBreakpoint],
    existing: &'e [MiBreakpoint],
) -> Reconciliation<'d, 'e, InstructionBreakpoint> {
    reconcile(desired, existing, |want, have| {
        if want.hit_condition.as_deref().is_some_and(|h| !h.is_empty()) {
            return false;
        }
        let Ok(want_addr) = normalize_address(&want.instruction_reference, want.offset.unwrap_or(0))
        else {
            return false;
        };
        let have_addr = have
            .original_location
            .as_deref()
            .and_then(|l| l.strip_prefix('*'))
            .map(str::to_string)
            .or_else(|| have.addr.clone());
        have_addr.is_some_and(|addr| {
            normalize_address(&addr, 0).is_ok_and(|have_addr| have_addr == want_addr)
        }) && conditions_equal(want.condition.as_deref(), have.condition.as_deref())
    })
}

pub fn resolve_data_breakpoints<'d, 'e>(
    desired: &'d [DataBreakpoint],
    existing: &'e [MiBreakpoint],
) -> Reconciliation<'d, 'e, DataBreakpoint> {
    reconcile(desired, existing, |want, have| {
        if want.hit_condition.as_deref().is_some_and(|h| !h.is_empty()) {
            return false;
        }
        have.what.as_deref() == Some(want.data_id.as_str())
            && watch_type_for_access(want.access_type.as_deref()) == have.type_
            && conditions_equal(want.condition.as_deref(), have.condition.as_deref())
    })
}

fn watch_type_for_access(access_type: Option<&str>) -> &'static str {
    match access_type {
        Some("read") => "read watchpoint",
        Some("readWrite") => "acc watchpoint",
        _ => "hw watchpoint",
    }
}

/// Build the `-break-insert` command for one source breakpoint.
/// A malformed hit condition surfaces as an error; the caller reports it
/// and continues with the rest of the batch.
pub fn source_insert_command(
    file: &str,
    breakpoint: &SourceBreakpoint,
    default_hardware: bool,
) -> Result<String, DebuggerError> {
    let mut command = String::from("-break-insert");
    push_common_options(
        &mut command,
        breakpoint.condition.as_deref(),
        breakpoint.hit_condition.as_deref(),
        wants_hardware(breakpoint.mode.as_deref(), default_hardware),
    )?;
    command.push_str(&format!(
        " --source {} --line {}",
        Quoted::new(file),
        breakpoint.line
    ));
    Ok(command)
}

pub fn function_insert_command(breakpoint: &FunctionBreakpoint) -> Result<String, DebuggerError> {
    let mut command = String::from("-break-insert");
    push_common_options(
        &mut command,
        breakpoint.condition.as_deref(),
        breakpoint.hit_condition.as_deref(),
        false,
    )?;
    command.push(' ');
    command.push_str(&breakpoint.name);
    Ok(command)
}

pub fn instruction_insert_command(
    breakpoint: &InstructionBreakpoint,
) -> Result<String, DebuggerError> {
    let address = normalize_address(
        &breakpoint.instruction_reference,
        breakpoint.offset.unwrap_or(0),
    )?;
    let mut command = String::from("-break-insert");
    push_common_options(
        &mut command,
        breakpoint.condition.as_deref(),
        breakpoint.hit_condition.as_deref(),
        breakpoint.mode.as_deref() == Some("hardware"),
    )?;
    command.push_str(&format!(" *{address}"));
    Ok(command)
}

pub fn data_insert_command(breakpoint: &DataBreakpoint) -> Result<String, DebuggerError> {
    if let Some(hit) = breakpoint.hit_condition.as_deref().filter(|h| !h.is_empty()) {
        // -break-watch has no ignore-count option; reject rather than
        // silently install a watchpoint with different semantics.
        HitCondition::parse(hit)?;
    }
    let flag = match breakpoint.access_type.as_deref() {
        Some("read") => " -r",
        Some("readWrite") => " -a",
        _ => "",
    };
    Ok(format!("-break-watch{flag} {}", breakpoint.data_id))
}

fn push_common_options(
    command: &mut String,
    condition: Option<&str>,
    hit_condition: Option<&str>,
    hardware: bool,
) -> Result<(), DebuggerError> {
    if let Some(hit) = hit_condition.filter(|h| !h.is_empty()) {
        let hit = HitCondition::parse(hit)?;
        if hit.temporary() {
            command.push_str(" -t");
        }
        if hit.ignore_count() > 0 {
            command.push_str(&format!(" -i {}", hit.ignore_count()));
        }
    }
    if hardware {
        command.push_str(" -h");
    }
    if let Some(condition) = condition.filter(|c| !c.trim().is_empty()) {
        command.push_str(&format!(" -c {}", Quoted::always(condition.trim())));
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use gdb_mi::{MiParser, MiRecord, MiTuple, MiValue};
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    use super::*;

    fn breakpoint(line: i64) -> SourceBreakpoint {
        SourceBreakpoint {
            line,
            column: None,
            condition: None,
            hit_condition: None,
            log_message: None,
            mode: None,
        }
    }

    fn existing(number: i64, file: &str, line: i64) -> MiBreakpoint {
        MiBreakpoint {
            number,
            type_: "breakpoint".to_string(),
            enabled: true,
            original_location: Some(format!("-source {file} -line {line}")),
            ..Default::default()
        }
    }

    #[test]
    fn break_list_parsing() {
        let line = r#"4^done,BreakpointTable={nr_rows="2",nr_cols="6",body=[bkpt={number="1",type="breakpoint",disp="keep",enabled="y",addr="0x1149",func="main",file="a.c",fullname="/tmp/a.c",line="10",original-location="-source a.c -line 10"},bkpt={number="2",type="hw breakpoint",disp="keep",enabled="y",original-location="a.c:20",cond="x > 1"}]}"#;
        let MiRecord::Result(record) = MiParser::new().parse_line(line.as_bytes()) else {
            panic!("expected result record");
        };
        let breakpoints = parse_break_list(&record.results);
        assert_eq!(breakpoints.len(), 2);
        assert_eq!(breakpoints[0].number, 1);
        assert_eq!(
            breakpoints[0].location_file_line(),
            Some(("a.c".to_string(), 10))
        );
        assert!(!breakpoints[0].is_hardware());
        assert!(breakpoints[1].is_hardware());
        assert_eq!(
            breakpoints[1].location_file_line(),
            Some(("a.c".to_string(), 20))
        );
        assert_eq!(breakpoints[1].condition.as_deref(), Some("x > 1"));
    }

    #[test]
    fn sub_locations_are_skipped() {
        let mut tuple = MiTuple::new();
        tuple.push("number", MiValue::Const("1.2".to_string()));
        assert_eq!(MiBreakpoint::from_tuple(&tuple), None);
    }

    #[test]
    fn identical_desired_set_issues_no_changes() {
        let desired = vec![breakpoint(10), breakpoint(20)];
        let have = vec![existing(1, "a.c", 10), existing(2, "a.c", 20)];

        let outcome = resolve_source_breakpoints(&desired, &have, "a.c", false);

        assert!(outcome.deletes.is_empty());
        assert!(outcome.resolved.iter().all(|(_, m)| m.is_some()));
    }

    #[test]
    fn removed_breakpoint_is_deleted_and_survivors_are_not_reinserted() {
        // Three existing, two desired (reordered): the missing line is
        // deleted, the two survivors match.
        let desired = vec![breakpoint(30), breakpoint(10)];
        let have = vec![
            existing(1, "a.c", 10),
            existing(2, "a.c", 20),
            existing(3, "a.c", 30),
        ];

        let outcome = resolve_source_breakpoints(&desired, &have, "a.c", false);

        assert_eq!(outcome.deletes, vec![2]);
        assert_eq!(outcome.resolved[0].1.unwrap().number, 3);
        assert_eq!(outcome.resolved[1].1.unwrap().number, 1);
    }

    #[test]
    fn hit_conditions_never_match() {
        let mut with_hits = breakpoint(10);
        with_hits.hit_condition = Some("5".to_string());
        let have = vec![existing(1, "a.c", 10)];

        let desired = [with_hits];
        let outcome = resolve_source_breakpoints(&desired, &have, "a.c", false);

        assert_eq!(outcome.resolved[0].1, None);
        assert_eq!(outcome.deletes, vec![1]);
    }

    #[test]
    fn condition_changes_invalidate_the_match() {
        let mut conditional = breakpoint(10);
        conditional.condition = Some("x == 2".to_string());
        let have = vec![existing(1, "a.c", 10)];

        let desired = [conditional];
        let outcome = resolve_source_breakpoints(&desired, &have, "a.c", false);
        assert_eq!(outcome.resolved[0].1, None);

        // Empty string is the same as no condition.
        let mut empty_condition = breakpoint(10);
        empty_condition.condition = Some(String::new());
        let desired = [empty_condition];
        let outcome = resolve_source_breakpoints(&desired, &have, "a.c", false);
        assert!(outcome.resolved[0].1.is_some());
    }

    #[test]
    fn mode_mismatch_invalidates_the_match() {
        let have = vec![existing(1, "a.c", 10)];
        let desired = [breakpoint(10)];
        let outcome = resolve_source_breakpoints(&desired, &have, "a.c", true);
        assert_eq!(outcome.resolved[0].1, None);

        let mut software = breakpoint(10);
        software.mode = Some("software".to_string());
        let desired = [software];
        let outcome = resolve_source_breakpoints(&desired, &have, "a.c", true);
        assert!(outcome.resolved[0].1.is_some());
    }

    #[test_case("a.c", "a.c", true; "exact")]
    #[test_case("a.c", "A.C", false; "unix is case sensitive")]
    #[test_case(r"C:\src\a.c", "c:/SRC/A.C", true; "windows is not")]
    #[test_case("/tmp/a.c", "/tmp/b.c", false; "different files")]
    fn file_matching(a: &str, b: &str, expected: bool) {
        assert_eq!(file_matches(a, b), expected);
    }

    #[test_case("5", 4, true; "exact fires once after five hits")]
    #[test_case("1", 0, true; "one")]
    #[test_case("> 3", 3, false; "greater keeps firing")]
    #[test_case(">10", 10, false; "greater without space")]
    fn hit_condition_mapping(text: &str, ignore: u64, temporary: bool) {
        let hit = HitCondition::parse(text).unwrap();
        assert_eq!(hit.ignore_count(), ignore);
        assert_eq!(hit.temporary(), temporary);
    }

    #[test_case("abc")]
    #[test_case("0")]
    #[test_case("< 5")]
    #[test_case("> x")]
    fn malformed_hit_conditions_are_rejected(text: &str) {
        assert!(HitCondition::parse(text).is_err());
    }

    #[test]
    fn source_insert_command_encodes_the_options() {
        let mut bp = breakpoint(10);
        bp.condition = Some("x == 1".to_string());
        bp.hit_condition = Some("3".to_string());
        let command = source_insert_command("dir with space/a.c", &bp, true).unwrap();
        assert_eq!(
            command,
            "-break-insert -t -i 2 -h -c \"x == 1\" --source \"dir with space/a.c\" --line 10"
        );
    }

    #[test]
    fn instruction_addresses_normalize() {
        assert_eq!(normalize_address("0x1000", 0).unwrap(), "0x1000");
        assert_eq!(normalize_address("0X1000", 16).unwrap(), "0x1010");
        assert_eq!(normalize_address("4096", -1).unwrap(), "0xfff");
        assert!(normalize_address("wat", 0).is_err());
    }

    #[test]
    fn instruction_breakpoints_match_on_the_absolute_address() {
        let desired = vec![InstructionBreakpoint {
            instruction_reference: "0x1000".to_string(),
            offset: Some(16),
            condition: None,
            hit_condition: None,
            mode: None,
        }];
        let have = vec![MiBreakpoint {
            number: 7,
            type_: "breakpoint".to_string(),
            original_location: Some("*0x1010".to_string()),
            ..Default::default()
        }];

        let outcome = resolve_instruction_breakpoints(&desired, &have);
        assert_eq!(outcome.resolved[0].1.unwrap().number, 7);
        assert!(outcome.deletes.is_empty());
    }

    #[test]
    fn function_breakpoints_match_on_original_location() {
        let desired = vec![FunctionBreakpoint {
            name: "main".to_string(),
            condition: None,
            hit_condition: None,
        }];
        let have = vec![MiBreakpoint {
            number: 2,
            type_: "breakpoint".to_string(),
            original_location: Some("main".to_string()),
            ..Default::default()
        }];

        let outcome = resolve_function_breakpoints(&desired, &have);
        assert!(outcome.resolved[0].1.is_some());
    }

    #[test]
    fn data_breakpoints_match_on_expression_and_access() {
        let desired = vec![DataBreakpoint {
            data_id: "counter".to_string(),
            access_type: Some("read".to_string()),
            condition: None,
            hit_condition: None,
        }];
        let have = vec![MiBreakpoint {
            number: 5,
            type_: "read watchpoint".to_string(),
            what: Some("counter".to_string()),
            ..Default::default()
        }];

        let outcome = resolve_data_breakpoints(&desired, &have);
        assert!(outcome.resolved[0].1.is_some());

        assert_eq!(data_insert_command(&desired[0]).unwrap(), "-break-watch -r counter");
    }
}
