//! Path matchers for `glob:` and `regex:` patterns
//!
//! Glob syntax is the usual platform one: `*` and `?` stay within a segment,
//! `**` crosses separators, `[...]` / `[!...]` never match `/`, `{a,b}`
//! groups may not nest and `\` escapes the next character. Patterns match
//! the whole string form of a path.

use regex::Regex;

use crate::error::{Error, Result};
use crate::path::S3Path;

const GLOB_SYNTAX: &str = "glob";
const REGEX_SYNTAX: &str = "regex";

/// Compiled path matcher
#[derive(Debug, Clone)]
pub struct PathMatcher {
    regex: Regex,
}

impl PathMatcher {
    /// Compile a matcher from `syntax:pattern`
    pub fn new(syntax_and_pattern: &str) -> Result<Self> {
        let (syntax, pattern) = syntax_and_pattern.split_once(':').ok_or_else(|| {
            Error::InvalidArgument(format!(
                "Matcher must have the form 'syntax:pattern': {syntax_and_pattern}"
            ))
        })?;

        let expr = if syntax.eq_ignore_ascii_case(GLOB_SYNTAX) {
            glob_to_regex(pattern)?
        } else if syntax.eq_ignore_ascii_case(REGEX_SYNTAX) {
            format!("^(?:{pattern})$")
        } else {
            return Err(Error::UnsupportedOperation(format!(
                "Syntax '{syntax}' not recognized"
            )));
        };

        let regex = Regex::new(&expr)
            .map_err(|e| Error::InvalidArgument(format!("Invalid pattern '{pattern}': {e}")))?;
        Ok(Self { regex })
    }

    /// Match against the path's string form
    pub fn matches(&self, path: &S3Path) -> bool {
        self.matches_str(&path.to_string())
    }

    pub fn matches_str(&self, path: &str) -> bool {
        self.regex.is_match(path)
    }
}

fn is_regex_meta(c: char) -> bool {
    ".^$+{}[]|()".contains(c)
}

fn is_glob_meta(c: char) -> bool {
    "\\*?[{".contains(c)
}

/// Translate a glob into an anchored regular expression
fn glob_to_regex(glob: &str) -> Result<String> {
    let chars: Vec<char> = glob.chars().collect();
    let mut regex = String::from("^");
    let mut in_group = false;
    let mut i = 0;

    let invalid = |msg: &str, at: usize| {
        Error::InvalidArgument(format!("{msg} at index {at} in glob '{glob}'"))
    };

    while i < chars.len() {
        let c = chars[i];
        i += 1;
        match c {
            '\\' => {
                let next = *chars.get(i).ok_or_else(|| invalid("No character to escape", i - 1))?;
                i += 1;
                if is_glob_meta(next) || is_regex_meta(next) {
                    regex.push('\\');
                }
                regex.push(next);
            }
            '/' => regex.push('/'),
            '[' => {
                regex.push_str("[[^/]&&[");
                if chars.get(i) == Some(&'^') {
                    regex.push_str("\\^");
                    i += 1;
                } else {
                    if chars.get(i) == Some(&'!') {
                        regex.push('^');
                        i += 1;
                    }
                    if chars.get(i) == Some(&'-') {
                        regex.push('-');
                        i += 1;
                    }
                }
                let mut has_range_start = false;
                let mut last = '\0';
                let mut closed = false;
                while let Some(&c) = chars.get(i) {
                    i += 1;
                    if c == ']' {
                        closed = true;
                        break;
                    }
                    if c == '/' {
                        return Err(invalid("Explicit 'name separator' in class", i - 1));
                    }
                    push_class_char(&mut regex, c);
                    if c != '-' {
                        has_range_start = true;
                        last = c;
                        continue;
                    }
                    if !has_range_start {
                        return Err(invalid("Invalid range", i - 1));
                    }
                    match chars.get(i) {
                        None => break,
                        Some(']') => {
                            i += 1;
                            closed = true;
                            break;
                        }
                        Some(&end) => {
                            i += 1;
                            if end < last {
                                return Err(invalid("Invalid range", i - 3));
                            }
                            push_class_char(&mut regex, end);
                            has_range_start = false;
                        }
                    }
                }
                if !closed {
                    return Err(invalid("Missing ']'", i.saturating_sub(1)));
                }
                regex.push_str("]]");
            }
            '{' => {
                if in_group {
                    return Err(invalid("Cannot nest groups", i - 1));
                }
                regex.push_str("(?:(?:");
                in_group = true;
            }
            '}' if in_group => {
                regex.push_str("))");
                in_group = false;
            }
            ',' if in_group => regex.push_str(")|(?:"),
            '*' => {
                if chars.get(i) == Some(&'*') {
                    regex.push_str(".*");
                    i += 1;
                } else {
                    regex.push_str("[^/]*");
                }
            }
            '?' => regex.push_str("[^/]"),
            c => {
                if is_regex_meta(c) {
                    regex.push('\\');
                }
                regex.push(c);
            }
        }
    }

    if in_group {
        return Err(invalid("Missing '}'", i.saturating_sub(1)));
    }

    regex.push('$');
    Ok(regex)
}

/// Class members that are set operators or escapes in the regex dialect
fn push_class_char(regex: &mut String, c: char) {
    if matches!(c, '\\' | '[' | '&' | '~') {
        regex.push('\\');
    }
    regex.push(c);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn glob(pattern: &str) -> PathMatcher {
        PathMatcher::new(&format!("glob:{pattern}")).unwrap()
    }

    #[test]
    fn test_star_dot_star() {
        let m = glob("*.*");
        for yes in ["a.txt", "archive.tar.gz", ".hidden", "x."] {
            assert!(m.matches_str(yes), "{yes} should match");
        }
        for no in ["README", "dir/a.txt", "/a.txt", ""] {
            assert!(!m.matches_str(no), "{no} should not match");
        }
    }

    #[test]
    fn test_double_star_crosses_separators() {
        let m = glob("/data/**.csv");
        assert!(m.matches_str("/data/a.csv"));
        assert!(m.matches_str("/data/2024/01/a.csv"));
        assert!(!m.matches_str("/other/a.csv"));

        let m = glob("**/*.java");
        assert!(m.matches_str("src/Main.java"));
        assert!(!m.matches_str("Main.java"));
    }

    #[test]
    fn test_question_mark_and_classes() {
        let m = glob("file?.[ch]");
        assert!(m.matches_str("file1.c"));
        assert!(m.matches_str("fileX.h"));
        assert!(!m.matches_str("file10.c"));
        assert!(!m.matches_str("file/.c"));

        let m = glob("[!a-c]*");
        assert!(m.matches_str("dog"));
        assert!(!m.matches_str("bat"));
        assert!(!m.matches_str("/x"));

        let m = glob("[a-]x");
        assert!(m.matches_str("-x"));
        assert!(m.matches_str("ax"));
    }

    #[test]
    fn test_groups() {
        let m = glob("*.{java,class}");
        assert!(m.matches_str("Foo.java"));
        assert!(m.matches_str("Foo.class"));
        assert!(!m.matches_str("Foo.jar"));
        assert!(PathMatcher::new("glob:{a,{b,c}}").is_err());
        assert!(PathMatcher::new("glob:{a,b").is_err());
    }

    #[test]
    fn test_escapes_and_literals() {
        let m = glob("a\\*b(1)+");
        assert!(m.matches_str("a*b(1)+"));
        assert!(!m.matches_str("axb(1)+"));
        assert!(PathMatcher::new("glob:abc\\").is_err());
        assert!(PathMatcher::new("glob:[abc").is_err());
    }

    #[test]
    fn test_regex_syntax() {
        let m = PathMatcher::new("regex:/logs/[0-9]{4}/.*\\.gz").unwrap();
        assert!(m.matches_str("/logs/2024/app.log.gz"));
        assert!(!m.matches_str("/logs/24/app.log.gz"));
        // whole-string match only
        assert!(!m.matches_str("x/logs/2024/app.log.gz"));
    }

    #[test]
    fn test_bad_syntax() {
        assert!(matches!(
            PathMatcher::new("*.txt").unwrap_err(),
            Error::InvalidArgument(_)
        ));
        assert!(matches!(
            PathMatcher::new("wildcard:*.txt").unwrap_err(),
            Error::UnsupportedOperation(_)
        ));
        assert!(matches!(
            PathMatcher::new("regex:(").unwrap_err(),
            Error::InvalidArgument(_)
        ));
    }
}
