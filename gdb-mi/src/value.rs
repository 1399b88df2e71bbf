use std::fmt;

/// A value in an MI result: a C-string constant, a tuple of named results,
/// or a list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MiValue {
    Const(String),
    Tuple(MiTuple),
    List(Vec<MiValue>),
}

impl MiValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            MiValue::Const(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_tuple(&self) -> Option<&MiTuple> {
        match self {
            MiValue::Tuple(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[MiValue]> {
        match self {
            MiValue::List(l) => Some(l),
            _ => None,
        }
    }

    /// Look up `key` if this value is a tuple.
    pub fn get(&self, key: &str) -> Option<&MiValue> {
        self.as_tuple().and_then(|t| t.get(key))
    }
}

impl fmt::Display for MiValue {
    /// Renders the value back into MI syntax. Primarily used by tests, but
    /// also for logging unmatched records verbatim.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MiValue::Const(s) => write!(f, "\"{}\"", escape_cstring(s)),
            MiValue::Tuple(t) => {
                write!(f, "{{")?;
                for (i, (k, v)) in t.entries().iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{k}={v}")?;
                }
                write!(f, "}}")
            }
            MiValue::List(l) => {
                write!(f, "[")?;
                for (i, v) in l.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{v}")?;
                }
                write!(f, "]")
            }
        }
    }
}

/// An ordered collection of `key=value` results, as found in result records
/// and inside `{…}` tuples.
///
/// MI occasionally emits tuple members without a key (`{1,2}`); those are
/// indexed by their ordinal position rendered as a string ("0", "1", …).
/// Order is preserved because some consumers (register value lists, frame
/// lists) depend on it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MiTuple {
    entries: Vec<(String, MiValue)>,
}

impl MiTuple {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, key: impl Into<String>, value: MiValue) {
        self.entries.push((key.into(), value));
    }

    /// Append a keyless member, keyed by its ordinal position.
    pub fn push_bare(&mut self, value: MiValue) {
        let key = self.entries.len().to_string();
        self.entries.push((key, value));
    }

    pub fn get(&self, key: &str) -> Option<&MiValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Convenience accessor for a string-valued result.
    pub fn string(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(MiValue::as_str)
    }

    /// Convenience accessor for an integer-valued result.
    pub fn int(&self, key: &str) -> Option<i64> {
        self.string(key).and_then(|s| s.parse().ok())
    }

    pub fn list(&self, key: &str) -> Option<&[MiValue]> {
        self.get(key).and_then(MiValue::as_list)
    }

    pub fn tuple(&self, key: &str) -> Option<&MiTuple> {
        self.get(key).and_then(MiValue::as_tuple)
    }

    pub fn entries(&self) -> &[(String, MiValue)] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &MiValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl FromIterator<(String, MiValue)> for MiTuple {
    fn from_iter<T: IntoIterator<Item = (String, MiValue)>>(iter: T) -> Self {
        MiTuple {
            entries: iter.into_iter().collect(),
        }
    }
}

impl fmt::Display for MiTuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (k, v)) in self.entries.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{k}={v}")?;
        }
        Ok(())
    }
}

/// Escape a string into MI C-string form (the inverse of the parser's
/// unescaping, modulo `\r` which the parser drops).
pub(crate) fn escape_cstring(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn bare_tuple_members_get_ordinal_keys() {
        let mut t = MiTuple::new();
        t.push_bare(MiValue::Const("a".into()));
        t.push("name", MiValue::Const("b".into()));
        t.push_bare(MiValue::Const("c".into()));

        assert_eq!(t.string("0"), Some("a"));
        assert_eq!(t.string("name"), Some("b"));
        assert_eq!(t.string("2"), Some("c"));
    }

    #[test]
    fn display_round_trips_simple_values() {
        let v = MiValue::Tuple(MiTuple::from_iter([
            ("addr".to_string(), MiValue::Const("0x1000".into())),
            (
                "names".to_string(),
                MiValue::List(vec![
                    MiValue::Const("a\"b".into()),
                    MiValue::Const("c\\d".into()),
                ]),
            ),
        ]));
        assert_eq!(v.to_string(), r#"{addr="0x1000",names=["a\"b","c\\d"]}"#);
    }
}
