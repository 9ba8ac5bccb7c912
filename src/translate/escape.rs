//! Escape processing and variable interpolation for quoted literals.

use super::fragment::paren;
use super::lexer::Sigil;

/// How backslashes and `$` are treated inside a literal body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Double-quoted string: escapes are decoded.
    Text,
    /// Regex pattern: escapes pass through to the regex engine.
    Pattern,
    /// Replacement part of `s///`: decoded, `$N` kept as a group reference.
    Replacement,
}

/// A variable embedded in a literal, e.g. `$name`, `${name}`, `@list`,
/// `$a[0]` or `$h{key}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Embedded {
    pub sigil: Sigil,
    pub name: String,
    pub subscript: Option<Subscript>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscript {
    pub hash: bool,
    pub key: Key,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Key {
    Literal(String),
    Var(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Piece {
    /// Decoded literal text.
    Text(String),
    /// A Java expression; `is_string` when it already has type `String`.
    Expr { text: String, is_string: bool },
}

/// Split a literal body into text and interpolated expressions. `resolve`
/// turns an embedded variable into a Java expression, or `None` to keep the
/// source text literally.
pub fn interpolate<F>(raw: &str, mode: Mode, mut resolve: F) -> Vec<Piece>
where
    F: FnMut(&Embedded) -> Option<(String, bool)>,
{
    let mut pieces = Vec::new();
    let mut text = String::new();
    let chars: Vec<char> = raw.chars().collect();
    let mut i = 0;

    while let Some(&c) = chars.get(i) {
        match c {
            '\\' => {
                let next = chars.get(i + 1).copied();
                i += 2;
                match (mode, next) {
                    (_, None) => {
                        text.push('\\');
                        i -= 1;
                    }
                    (Mode::Pattern, Some(n)) if n == '/' => text.push('/'),
                    (Mode::Pattern, Some(n)) => {
                        text.push('\\');
                        text.push(n);
                    }
                    (Mode::Replacement, Some(n @ ('$' | '\\'))) => {
                        text.push('\\');
                        text.push(n);
                    }
                    (_, Some(n)) => {
                        let (decoded, used) = decode_escape(n, chars.get(i..).unwrap_or_default());
                        text.push_str(&decoded);
                        i += used;
                    }
                }
            }
            '$' | '@' => {
                if mode == Mode::Replacement && c == '$' && chars.get(i + 1).is_some_and(char::is_ascii_digit) {
                    text.push('$');
                    i += 1;
                    continue;
                }
                match scan_embedded(&chars, i, mode) {
                    Some((embedded, end)) => match resolve(&embedded) {
                        Some((expr, is_string)) => {
                            if !text.is_empty() {
                                pieces.push(Piece::Text(std::mem::take(&mut text)));
                            }
                            pieces.push(Piece::Expr { text: expr, is_string });
                            i = end;
                        }
                        None => {
                            text.extend(chars.get(i..end).unwrap_or_default());
                            i = end;
                        }
                    },
                    None => {
                        if mode == Mode::Replacement && c == '$' {
                            text.push('\\');
                        }
                        text.push(c);
                        i += 1;
                    }
                }
            }
            _ => {
                text.push(c);
                i += 1;
            }
        }
    }
    if !text.is_empty() {
        pieces.push(Piece::Text(text));
    }
    pieces
}

/// Decode one backslash escape. `rest` starts after the escaped char;
/// returns the text and how many extra chars were consumed.
fn decode_escape(c: char, rest: &[char]) -> (String, usize) {
    match c {
        'n' => ("\n".into(), 0),
        't' => ("\t".into(), 0),
        'r' => ("\r".into(), 0),
        '0' => ("\0".into(), 0),
        'a' => ("\u{7}".into(), 0),
        'e' => ("\u{1b}".into(), 0),
        'x' => {
            let (digits, used) = if rest.first() == Some(&'{') {
                let close = rest.iter().position(|&c| c == '}').unwrap_or(rest.len());
                let digits: String = rest.get(1..close).unwrap_or_default().iter().collect();
                (digits, (close + 1).min(rest.len()))
            } else {
                let digits: String = rest.iter().take(2).take_while(|c| c.is_ascii_hexdigit()).collect();
                let used = digits.chars().count();
                (digits, used)
            };
            let decoded = u32::from_str_radix(&digits, 16)
                .ok()
                .and_then(char::from_u32)
                .map(String::from)
                .unwrap_or_default();
            (decoded, used)
        }
        other => (other.to_string(), 0),
    }
}

fn is_name_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Recognise an embedded variable at `start` (which holds `$` or `@`).
fn scan_embedded(chars: &[char], start: usize, mode: Mode) -> Option<(Embedded, usize)> {
    let sigil = if chars.get(start) == Some(&'@') { Sigil::Array } else { Sigil::Scalar };
    let mut i = start + 1;
    let braced = chars.get(i) == Some(&'{');
    if braced {
        i += 1;
    }
    let name_start = i;
    match chars.get(i) {
        Some(&c) if is_name_start(c) => {}
        Some(c) if c.is_ascii_digit() && sigil == Sigil::Scalar => {
            while chars.get(i).is_some_and(char::is_ascii_digit) {
                i += 1;
            }
            let name: String = chars.get(name_start..i).unwrap_or_default().iter().collect();
            return Some((Embedded { sigil, name, subscript: None }, i));
        }
        _ => return None,
    }
    loop {
        while chars.get(i).is_some_and(|&c| is_name_char(c)) {
            i += 1;
        }
        if chars.get(i) == Some(&':') && chars.get(i + 1) == Some(&':') && chars.get(i + 2).is_some_and(|&c| is_name_start(c)) {
            i += 2;
        } else {
            break;
        }
    }
    let name: String = chars.get(name_start..i).unwrap_or_default().iter().collect();
    if braced {
        if chars.get(i) != Some(&'}') {
            return None;
        }
        i += 1;
    }

    let mut embedded = Embedded { sigil, name, subscript: None };
    if sigil == Sigil::Scalar && mode == Mode::Text && !braced {
        if let Some((subscript, end)) = scan_subscript(chars, i) {
            embedded.subscript = Some(subscript);
            i = end;
        }
    }
    Some((embedded, i))
}

/// `[digits]`, `[$var]`, `{word}` or `{$var}` directly after a name.
fn scan_subscript(chars: &[char], start: usize) -> Option<(Subscript, usize)> {
    let (hash, close) = match chars.get(start) {
        Some('[') => (false, ']'),
        Some('{') => (true, '}'),
        _ => return None,
    };
    let end = start + 1 + chars.get(start + 1..)?.iter().position(|&c| c == close)?;
    let inner: String = chars.get(start + 1..end)?.iter().collect();
    let key = if let Some(var) = inner.strip_prefix('$') {
        if var.is_empty() || !var.chars().all(is_name_char) {
            return None;
        }
        Key::Var(var.to_string())
    } else if hash && !inner.is_empty() && inner.chars().all(is_name_char) {
        Key::Literal(inner)
    } else if !hash && !inner.is_empty() && inner.chars().enumerate().all(|(i, c)| c.is_ascii_digit() || (i == 0 && c == '-')) {
        Key::Literal(inner)
    } else {
        return None;
    };
    Some((Subscript { hash, key }, end + 1))
}

/// Escape a decoded value for a Java string literal body.
pub fn escape_java(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            '\0' => out.push_str("\\0"),
            c if c.is_control() => out.push_str(&format!("\\u{:04x}", u32::from(c))),
            c => out.push(c),
        }
    }
    out
}

pub fn java_string(value: &str) -> String {
    format!("\"{}\"", escape_java(value))
}

/// Join pieces into one Java `String` expression using `+`.
pub fn join_pieces(pieces: &[Piece]) -> String {
    match pieces {
        [] => "\"\"".into(),
        [Piece::Text(t)] => java_string(t),
        [Piece::Expr { text, is_string: true }] => text.clone(),
        _ => {
            let mut parts: Vec<String> = pieces
                .iter()
                .map(|p| match p {
                    Piece::Text(t) => java_string(t),
                    Piece::Expr { text, .. } => paren(text),
                })
                .collect();
            if let Some(Piece::Expr { is_string: false, .. }) = pieces.first() {
                if !matches!(pieces.get(1), Some(Piece::Text(_))) {
                    parts.insert(0, "\"\"".into());
                }
            }
            parts.join(" + ")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolve(e: &Embedded) -> Option<(String, bool)> {
        match (e.sigil, e.name.as_str(), &e.subscript) {
            (Sigil::Scalar, "name", None) => Some(("name".into(), true)),
            (Sigil::Scalar, "n", None) => Some(("n".into(), false)),
            (Sigil::Scalar, "h", Some(s)) if s.hash => Some(("h.get(\"k\")".into(), true)),
            _ => None,
        }
    }

    #[test]
    fn plain_text_decodes_escapes() {
        let pieces = interpolate(r"a\tb\n", Mode::Text, resolve);
        assert_eq!(join_pieces(&pieces), r#""a\tb\n""#);
    }

    #[test]
    fn variables_are_spliced() {
        let pieces = interpolate("Hello $name!", Mode::Text, resolve);
        assert_eq!(join_pieces(&pieces), r#""Hello " + name + "!""#);
        let pieces = interpolate("$n", Mode::Text, resolve);
        assert_eq!(join_pieces(&pieces), r#""" + n"#);
        let pieces = interpolate("${name}", Mode::Text, resolve);
        assert_eq!(join_pieces(&pieces), "name");
    }

    #[test]
    fn escaped_sigils_stay_literal() {
        let pieces = interpolate(r"cost: \$5 \@home", Mode::Text, resolve);
        assert_eq!(join_pieces(&pieces), r#""cost: $5 @home""#);
    }

    #[test]
    fn unknown_variable_kept_as_text() {
        let pieces = interpolate("mail me@example.com", Mode::Text, resolve);
        assert_eq!(pieces, vec![Piece::Text("mail me@example.com".into())]);
    }

    #[test]
    fn hash_subscript_inside_string() {
        let pieces = interpolate("v=$h{k}", Mode::Text, resolve);
        assert_eq!(join_pieces(&pieces), r#""v=" + h.get("k")"#);
    }

    #[test]
    fn pattern_keeps_regex_escapes_and_anchors() {
        let pieces = interpolate(r"^\d+\/x$", Mode::Pattern, resolve);
        assert_eq!(join_pieces(&pieces), r#""^\\d+/x$""#);
    }

    #[test]
    fn replacement_keeps_group_references() {
        let pieces = interpolate(r"<$1>", Mode::Replacement, resolve);
        assert_eq!(join_pieces(&pieces), r#""<$1>""#);
    }

    #[test]
    fn numeric_expression_is_parenthesised() {
        let pieces = vec![Piece::Text("x=".into()), Piece::Expr { text: "a + b".into(), is_string: false }];
        assert_eq!(join_pieces(&pieces), r#""x=" + (a + b)"#);
    }
}
