use std::fmt;

/// A string destined for an MI command line.
///
/// MI command construction never accepts raw strings: every user-supplied
/// path or filename goes through this type, which backslash-prefixes `\`
/// and `"` and wraps the result in double quotes when it contains a space
/// (or when the caller requires quoting).
#[derive(Clone, Debug)]
pub struct Quoted<'a> {
    raw: &'a str,
    always: bool,
}

impl<'a> Quoted<'a> {
    /// Quote only when the string contains a space.
    pub fn new(raw: &'a str) -> Self {
        Quoted { raw, always: false }
    }

    /// Always wrap in double quotes.
    pub fn always(raw: &'a str) -> Self {
        Quoted { raw, always: true }
    }
}

impl fmt::Display for Quoted<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let needs_quotes = self.always || self.raw.contains(' ');
        if needs_quotes {
            f.write_str("\"")?;
        }
        for c in self.raw.chars() {
            if c == '\\' || c == '"' {
                f.write_str("\\")?;
            }
            write!(f, "{c}")?;
        }
        if needs_quotes {
            f.write_str("\"")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    use super::Quoted;

    #[test_case("a.out", "a.out"; "plain")]
    #[test_case("my program", "\"my program\""; "space forces quotes")]
    #[test_case(r"C:\dir\a.out", r"C:\\dir\\a.out"; "backslashes escaped")]
    #[test_case(r#"odd"name"#, r#"odd\"name"#; "quotes escaped")]
    #[test_case(r"C:\dir with space\a.out", r#""C:\\dir with space\\a.out""#; "both")]
    fn escaping(input: &str, expected: &str) {
        assert_eq!(Quoted::new(input).to_string(), expected);
    }

    #[test]
    fn forced_quoting() {
        assert_eq!(Quoted::always("plain").to_string(), "\"plain\"");
    }
}
