//! Single-segment glob patterns.
//!
//! Supported syntax:
//! - `*` matches zero or more characters
//! - `?` matches exactly one character
//! - `[abc]`, `[a-z]` match one character from the set
//! - `[!abc]` or `[^abc]` match one character NOT in the set
//! - `\x` matches `x` literally
//! - `{a,b,c}` brace alternatives (expanded before compilation)

use crate::PatternError;

/// One compiled pattern element.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Literal(char),
    AnyChar,
    Star,
    Class { negated: bool, items: Vec<ClassItem> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ClassItem {
    Char(char),
    Range(char, char),
}

impl Token {
    fn matches_char(&self, c: char) -> bool {
        match self {
            Token::Literal(l) => *l == c,
            Token::AnyChar => true,
            Token::Star => false,
            Token::Class { negated, items } => {
                let hit = items.iter().any(|item| match *item {
                    ClassItem::Char(x) => x == c,
                    ClassItem::Range(lo, hi) => lo <= c && c <= hi,
                });
                hit != *negated
            }
        }
    }
}

/// A compiled glob for one path segment (no brace alternatives).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    tokens: Vec<Token>,
}

impl Segment {
    /// Compile a brace-free pattern.
    pub fn parse(pattern: &str) -> Result<Self, PatternError> {
        let chars: Vec<char> = pattern.chars().collect();
        let mut tokens = Vec::with_capacity(chars.len());
        let mut i = 0;

        while i < chars.len() {
            match chars[i] {
                '*' => {
                    // Runs of stars behave like one star
                    if tokens.last() != Some(&Token::Star) {
                        tokens.push(Token::Star);
                    }
                    i += 1;
                }
                '?' => {
                    tokens.push(Token::AnyChar);
                    i += 1;
                }
                '\\' if i + 1 < chars.len() => {
                    tokens.push(Token::Literal(chars[i + 1]));
                    i += 2;
                }
                '[' => {
                    let (token, consumed) = parse_class(pattern, &chars[i..])?;
                    tokens.push(token);
                    i += consumed;
                }
                c => {
                    tokens.push(Token::Literal(c));
                    i += 1;
                }
            }
        }

        Ok(Self { tokens })
    }

    /// True if the segment consists of literal characters only.
    pub fn is_literal(&self) -> bool {
        self.tokens.iter().all(|t| matches!(t, Token::Literal(_)))
    }

    /// Match the whole of `input` against this segment.
    ///
    /// Uses single-star backtracking: on a mismatch, the most recent `*`
    /// absorbs one more character and matching resumes after it. This runs in
    /// O(pattern × input) without recursion.
    pub fn matches(&self, input: &str) -> bool {
        let input: Vec<char> = input.chars().collect();
        let tokens = &self.tokens;

        let mut t = 0;
        let mut i = 0;
        let mut resume: Option<(usize, usize)> = None;

        while i < input.len() {
            if let Some(token) = tokens.get(t) {
                if *token == Token::Star {
                    resume = Some((t, i));
                    t += 1;
                    continue;
                }
                if token.matches_char(input[i]) {
                    t += 1;
                    i += 1;
                    continue;
                }
            }

            match resume {
                Some((star, absorbed)) => {
                    resume = Some((star, absorbed + 1));
                    t = star + 1;
                    i = absorbed + 1;
                }
                None => return false,
            }
        }

        tokens[t..].iter().all(|token| *token == Token::Star)
    }
}

/// Parse `[...]` starting at `chars[0] == '['`.
///
/// Returns the token and how many characters were consumed.
fn parse_class(pattern: &str, chars: &[char]) -> Result<(Token, usize), PatternError> {
    let mut idx = 1;
    let mut negated = false;

    if matches!(chars.get(idx), Some('!') | Some('^')) {
        negated = true;
        idx += 1;
    }

    let first = idx;
    let mut items = Vec::new();

    loop {
        let Some(&c) = chars.get(idx) else {
            return Err(PatternError::UnclosedClass(pattern.to_string()));
        };

        // `]` directly after the opening bracket is a literal member
        if c == ']' && idx > first {
            idx += 1;
            break;
        }

        if chars.get(idx + 1) == Some(&'-') && chars.get(idx + 2).is_some_and(|&e| e != ']') {
            let end = chars[idx + 2];
            if end < c {
                return Err(PatternError::InvalidRange {
                    pattern: pattern.to_string(),
                    start: c,
                    end,
                });
            }
            items.push(ClassItem::Range(c, end));
            idx += 3;
            continue;
        }

        items.push(ClassItem::Char(c));
        idx += 1;
    }

    Ok((Token::Class { negated, items }, idx))
}

/// Check if a string contains glob metacharacters (`*`, `?`, `[`, `{`).
pub fn contains_glob(s: &str) -> bool {
    s.contains(['*', '?', '[', '{'])
}

/// Match a single name against a pattern, expanding braces first.
///
/// Invalid patterns never match.
///
/// ```
/// use searchfs_glob::glob_match;
///
/// assert!(glob_match("*.vmt", "foo.vmt"));
/// assert!(glob_match("*.{vtf,vmt}", "foo.vtf"));
/// assert!(!glob_match("*.vmt", "foo.vtf"));
/// ```
pub fn glob_match(pattern: &str, input: &str) -> bool {
    expand_braces(pattern)
        .iter()
        .filter_map(|alt| Segment::parse(alt).ok())
        .any(|segment| segment.matches(input))
}

/// Expand brace expressions in a pattern.
///
/// `{a,b}` yields one pattern per alternative; nested and repeated groups
/// expand recursively. Unbalanced braces are kept literally.
///
/// ```
/// use searchfs_glob::expand_braces;
///
/// assert_eq!(expand_braces("x{a,b}y"), vec!["xay", "xby"]);
/// assert_eq!(expand_braces("plain"), vec!["plain"]);
/// ```
pub fn expand_braces(pattern: &str) -> Vec<String> {
    let chars: Vec<char> = pattern.chars().collect();

    let mut depth = 0usize;
    let mut open = None;
    let mut group = None;

    for (i, &c) in chars.iter().enumerate() {
        match c {
            '{' => {
                if depth == 0 {
                    open = Some(i);
                }
                depth += 1;
            }
            '}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    group = open.map(|start| (start, i));
                    break;
                }
            }
            _ => {}
        }
    }

    let Some((start, end)) = group else {
        return vec![pattern.to_string()];
    };

    let prefix: String = chars[..start].iter().collect();
    let suffix: String = chars[end + 1..].iter().collect();

    split_alternatives(&chars[start + 1..end])
        .into_iter()
        .flat_map(|alt| expand_braces(&format!("{prefix}{alt}{suffix}")))
        .collect()
}

/// Split brace content on top-level commas.
fn split_alternatives(content: &[char]) -> Vec<String> {
    let mut alternatives = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;

    for &c in content {
        match c {
            '{' => {
                depth += 1;
                current.push(c);
            }
            '}' => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            ',' if depth == 0 => alternatives.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    alternatives.push(current);

    alternatives
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("foo.vmt", "foo.vmt", true)]
    #[case("foo.vmt", "foo.vtf", false)]
    #[case("*", "", true)]
    #[case("*.vmt", "concrete01.vmt", true)]
    #[case("*.vmt", "concrete01.vmt.bak", false)]
    #[case("hud_*", "hud_main", true)]
    #[case("a*b*c", "aXXbYYc", true)]
    #[case("a*b*c", "aXXcYYb", false)]
    #[case("?", "x", true)]
    #[case("?", "", false)]
    #[case("??.txt", "ab.txt", true)]
    #[case("[abc]", "b", true)]
    #[case("[!abc]", "b", false)]
    #[case("[^abc]", "z", true)]
    #[case("[a-z]", "Q", false)]
    #[case("[]x]", "]", true)]
    #[case("[-x]", "-", true)]
    #[case("\\*", "*", true)]
    #[case("\\*", "a", false)]
    #[case("*.{vtf,vmt}", "x.vmt", true)]
    #[case("{,un}do", "do", true)]
    #[case("Foo", "foo", false)]
    fn test_glob_match(#[case] pattern: &str, #[case] input: &str, #[case] expected: bool) {
        assert_eq!(glob_match(pattern, input), expected, "{pattern} vs {input}");
    }

    #[test]
    fn test_unclosed_class_is_error() {
        assert_eq!(
            Segment::parse("file[0-9"),
            Err(PatternError::UnclosedClass("file[0-9".to_string()))
        );
        assert!(!glob_match("file[0-9", "file[0-9"));
    }

    #[test]
    fn test_reversed_range_is_error() {
        assert!(matches!(
            Segment::parse("[z-a]"),
            Err(PatternError::InvalidRange { start: 'z', end: 'a', .. })
        ));
    }

    #[test]
    fn test_expand_braces() {
        assert_eq!(expand_braces("{a,b}"), vec!["a", "b"]);
        assert_eq!(expand_braces("{a,{b,c}}"), vec!["a", "b", "c"]);
        assert_eq!(expand_braces("{a,b}{1,2}"), vec!["a1", "a2", "b1", "b2"]);
        assert_eq!(expand_braces("{open"), vec!["{open"]);
        assert_eq!(expand_braces("close}"), vec!["close}"]);
    }

    #[test]
    fn test_is_literal() {
        assert!(Segment::parse("materials").is_ok_and(|s| s.is_literal()));
        assert!(Segment::parse("mat*").is_ok_and(|s| !s.is_literal()));
    }

    #[test]
    fn test_adversarial_pattern_is_fast() {
        let pattern = format!("{}b", "*a".repeat(50));
        let input = "a".repeat(200);
        assert!(!glob_match(&pattern, &input));
    }

    #[test]
    fn test_contains_glob() {
        assert!(contains_glob("*.vmt"));
        assert!(contains_glob("{a,b}"));
        assert!(!contains_glob("materials/foo.vmt"));
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn literal_patterns_match_themselves(s in "[a-z0-9_.]{0,24}") {
                prop_assert!(glob_match(&s, &s));
            }

            #[test]
            fn star_matches_anything(s in "\\PC{0,32}") {
                prop_assert!(glob_match("*", &s));
            }

            #[test]
            fn prefix_star_matches_suffix(prefix in "[a-z]{0,8}", rest in "[a-z]{0,8}") {
                let pattern = format!("{prefix}*");
                let input = format!("{prefix}{rest}");
                prop_assert!(glob_match(&pattern, &input));
            }
        }
    }
}
