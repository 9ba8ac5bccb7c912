use tracing::trace;

use super::error::Diagnostic;
use super::position::Position;
use super::types::TypeTag;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sigil {
    Scalar,
    Array,
    Hash,
}

impl Sigil {
    pub fn symbol(self) -> char {
        match self {
            Sigil::Scalar => '$',
            Sigil::Array => '@',
            Sigil::Hash => '%',
        }
    }
}

/// `=` and the compound assignment operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssignOp {
    Plain,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    And,
    Or,
    Concat,
    Repeat,
}

impl AssignOp {
    pub fn symbol(self) -> &'static str {
        match self {
            AssignOp::Plain => "=",
            AssignOp::Add => "+=",
            AssignOp::Sub => "-=",
            AssignOp::Mul => "*=",
            AssignOp::Div => "/=",
            AssignOp::Mod => "%=",
            AssignOp::Pow => "**=",
            AssignOp::BitAnd => "&=",
            AssignOp::BitOr => "|=",
            AssignOp::BitXor => "^=",
            AssignOp::Shl => "<<=",
            AssignOp::Shr => ">>=",
            AssignOp::And => "&&=",
            AssignOp::Or => "||=",
            AssignOp::Concat => ".=",
            AssignOp::Repeat => "x=",
        }
    }
}

/// One `<word>` group of a `#<...>` annotation comment.
#[derive(Debug, Clone, PartialEq)]
pub enum Label {
    Type(TypeTag),
    Size(u32),
    Declare { name: String, sigil: Sigil },
    Args,
    Returns,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Literals
    Int(i64),
    Float(f64),
    /// Single-quoted string, escapes already applied.
    Str(String),
    /// Double-quoted string, raw text awaiting interpolation.
    Interp(String),
    Command(String),
    Words(Vec<String>),
    Match { pattern: String, flags: String },
    Subst { pattern: String, replacement: String, flags: String },
    Translit { from: String, to: String, flags: String },
    Stdin,

    // Variables
    Var(Sigil, String),
    LastIndex(String),
    Capture(u32),
    /// A sigil applied to a block or scalar: `@{...}`, `$$r`.
    Deref(Sigil),
    Ident(String),

    // Keywords
    My,
    Our,
    Sub,
    If,
    Elsif,
    Else,
    Unless,
    While,
    Until,
    For,
    Do,
    Last,
    Next,
    Return,
    Package,
    Undef,

    // Word operators
    StrEq,
    StrNe,
    StrLt,
    StrLe,
    StrGt,
    StrGe,
    StrCmp,
    Repeat,
    LowAnd,
    LowOr,
    LowNot,
    LowXor,

    // Punctuation
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Semi,
    Comma,
    FatComma,  // =>
    Arrow,     // ->
    Question,
    Colon,
    Backslash,
    Range,     // ..

    // Operators
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Pow,       // **
    Dot,
    PlusPlus,
    MinusMinus,
    NumEq,
    NumNe,
    Lt,
    Le,
    Gt,
    Ge,
    Spaceship, // <=>
    Smart,     // ~~
    Bind,      // =~
    NotBind,   // !~
    BitAnd,
    BitOr,
    BitXor,
    BitNot,
    Shl,
    Shr,
    AndAnd,
    OrOr,
    Bang,
    Assign(AssignOp),

    // Annotations and passthrough
    Labels(Vec<Label>),
    JavaLine(String),
    JavaImport(String),
    Comment(String),

    Eof,
}

impl Token {
    /// Short kind name used in syntax diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Token::Int(_) | Token::Float(_) => "number",
            Token::Str(_) | Token::Interp(_) | Token::Command(_) | Token::Words(_) => "string",
            Token::Match { .. } | Token::Subst { .. } | Token::Translit { .. } => "regex",
            Token::Stdin => "input",
            Token::Var(..) | Token::LastIndex(_) | Token::Capture(_) | Token::Deref(_) => "variable",
            Token::Ident(_) => "identifier",
            Token::My
            | Token::Our
            | Token::Sub
            | Token::If
            | Token::Elsif
            | Token::Else
            | Token::Unless
            | Token::While
            | Token::Until
            | Token::For
            | Token::Do
            | Token::Last
            | Token::Next
            | Token::Return
            | Token::Package
            | Token::Undef => "keyword",
            Token::Labels(_) => "annotation",
            Token::JavaLine(_) | Token::JavaImport(_) => "passthrough",
            Token::Comment(_) => "comment",
            Token::Eof => "end of input",
            _ => "operator",
        }
    }

    /// Source-like rendering of the token's literal value.
    pub fn value(&self) -> String {
        match self {
            Token::Int(n) => n.to_string(),
            Token::Float(f) => f.to_string(),
            Token::Str(s) | Token::Interp(s) | Token::Command(s) | Token::Comment(s) => s.clone(),
            Token::Words(w) => w.join(" "),
            Token::Match { pattern, .. } => pattern.clone(),
            Token::Subst { pattern, replacement, .. } => format!("s/{pattern}/{replacement}/"),
            Token::Translit { from, to, .. } => format!("tr/{from}/{to}/"),
            Token::Var(sigil, name) => format!("{}{name}", sigil.symbol()),
            Token::LastIndex(name) => format!("$#{name}"),
            Token::Capture(n) => format!("${n}"),
            Token::Deref(sigil) => sigil.symbol().to_string(),
            Token::Ident(name) => name.clone(),
            Token::JavaLine(s) | Token::JavaImport(s) => s.clone(),
            Token::Assign(op) => op.symbol().into(),
            Token::Eof | Token::Labels(_) => String::new(),
            other => punct_text(other).into(),
        }
    }

    /// Whether a `/` after this token divides rather than opening a pattern.
    fn ends_term(&self) -> bool {
        matches!(
            self,
            Token::Int(_)
                | Token::Float(_)
                | Token::Str(_)
                | Token::Interp(_)
                | Token::Command(_)
                | Token::Words(_)
                | Token::Match { .. }
                | Token::Subst { .. }
                | Token::Translit { .. }
                | Token::Stdin
                | Token::Var(..)
                | Token::LastIndex(_)
                | Token::Capture(_)
                | Token::Undef
                | Token::RParen
                | Token::RBracket
                | Token::RBrace
                | Token::PlusPlus
                | Token::MinusMinus
        )
    }
}

fn punct_text(token: &Token) -> &'static str {
    match token {
        Token::My => "my",
        Token::Our => "our",
        Token::Sub => "sub",
        Token::If => "if",
        Token::Elsif => "elsif",
        Token::Else => "else",
        Token::Unless => "unless",
        Token::While => "while",
        Token::Until => "until",
        Token::For => "for",
        Token::Do => "do",
        Token::Last => "last",
        Token::Next => "next",
        Token::Return => "return",
        Token::Package => "package",
        Token::Undef => "undef",
        Token::StrEq => "eq",
        Token::StrNe => "ne",
        Token::StrLt => "lt",
        Token::StrLe => "le",
        Token::StrGt => "gt",
        Token::StrGe => "ge",
        Token::StrCmp => "cmp",
        Token::Repeat => "x",
        Token::LowAnd => "and",
        Token::LowOr => "or",
        Token::LowNot => "not",
        Token::LowXor => "xor",
        Token::LParen => "(",
        Token::RParen => ")",
        Token::LBracket => "[",
        Token::RBracket => "]",
        Token::LBrace => "{",
        Token::RBrace => "}",
        Token::Semi => ";",
        Token::Comma => ",",
        Token::FatComma => "=>",
        Token::Arrow => "->",
        Token::Question => "?",
        Token::Colon => ":",
        Token::Backslash => "\\",
        Token::Range => "..",
        Token::Plus => "+",
        Token::Minus => "-",
        Token::Star => "*",
        Token::Slash => "/",
        Token::Percent => "%",
        Token::Pow => "**",
        Token::Dot => ".",
        Token::PlusPlus => "++",
        Token::MinusMinus => "--",
        Token::NumEq => "==",
        Token::NumNe => "!=",
        Token::Lt => "<",
        Token::Le => "<=",
        Token::Gt => ">",
        Token::Ge => ">=",
        Token::Spaceship => "<=>",
        Token::Smart => "~~",
        Token::Bind => "=~",
        Token::NotBind => "!~",
        Token::BitAnd => "&",
        Token::BitOr => "|",
        Token::BitXor => "^",
        Token::BitNot => "~",
        Token::Shl => "<<",
        Token::Shr => ">>",
        Token::AndAnd => "&&",
        Token::OrOr => "||",
        Token::Bang => "!",
        _ => "",
    }
}

#[derive(Debug, Clone)]
pub struct SpannedToken {
    pub token: Token,
    pub pos: Position,
}

/// Tokens plus the lexical problems found along the way. Lexing never
/// aborts; a malformed literal is reported and scanning continues.
#[derive(Debug, Default)]
pub struct Lexed {
    pub tokens: Vec<SpannedToken>,
    pub errors: Vec<Diagnostic>,
}

pub fn lex(source: &str, trace_tokens: bool) -> Lexed {
    let mut lexer = Lexer::new(source, trace_tokens);
    lexer.tokenize();
    Lexed {
        tokens: lexer.tokens,
        errors: lexer.errors,
    }
}

struct Lexer<'a> {
    source: &'a str,
    bytes: &'a [u8],
    pos: usize,
    line: usize,
    trace: bool,
    /// One entry per open `{`: whether it opened a subscript or deref.
    braces: Vec<bool>,
    closed_subscript: bool,
    tokens: Vec<SpannedToken>,
    errors: Vec<Diagnostic>,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str, trace: bool) -> Self {
        Self {
            source,
            bytes: source.as_bytes(),
            pos: 0,
            line: 1,
            trace,
            braces: Vec::new(),
            closed_subscript: false,
            tokens: Vec::new(),
            errors: Vec::new(),
        }
    }

    fn tokenize(&mut self) {
        loop {
            self.skip_whitespace();
            if self.pos >= self.bytes.len() {
                break;
            }
            let start = self.pos;
            let line = self.line;
            let ch = self.bytes[self.pos];

            match ch {
                b'#' => self.lex_comment(start),
                b'=' if self.at_line_start() && self.peek_at(1).is_some_and(|c| c.is_ascii_alphabetic()) => {
                    self.skip_pod();
                }
                b'(' => self.single(Token::LParen, start),
                b')' => self.single(Token::RParen, start),
                b'[' => self.single(Token::LBracket, start),
                b']' => self.single(Token::RBracket, start),
                b'{' => {
                    let subscript = matches!(
                        self.last_significant(),
                        Some(Token::Var(..) | Token::Arrow | Token::RBracket | Token::Deref(_))
                    ) || (matches!(self.last_significant(), Some(Token::RBrace)) && self.closed_subscript);
                    self.braces.push(subscript);
                    self.single(Token::LBrace, start);
                }
                b'}' => {
                    self.closed_subscript = self.braces.pop().unwrap_or(false);
                    self.single(Token::RBrace, start);
                }
                b';' => self.single(Token::Semi, start),
                b',' => self.single(Token::Comma, start),
                b'?' => self.single(Token::Question, start),
                b':' => self.single(Token::Colon, start),
                b'\\' => self.single(Token::Backslash, start),
                b'$' => self.lex_scalar_sigil(start),
                b'@' => self.lex_array_sigil(start),
                b'%' if !self.prev_ends_term() && self.peek_at(1).is_some_and(|c| is_ident_start(c) || c == b'{' || c == b'$') => {
                    self.pos += 1;
                    self.lex_sigil_body(Sigil::Hash, start);
                }
                b'"' => {
                    self.pos += 1;
                    let body = self.read_until(b'"', start);
                    self.push(Token::Interp(body), start, line);
                }
                b'\'' => {
                    self.pos += 1;
                    let body = self.read_until(b'\'', start);
                    self.push(Token::Str(unescape_single(&body)), start, line);
                }
                b'`' => {
                    self.pos += 1;
                    let body = self.read_until(b'`', start);
                    self.push(Token::Command(body), start, line);
                }
                b'/' if !self.prev_ends_term() => {
                    self.pos += 1;
                    let pattern = self.read_until(b'/', start);
                    let flags = self.read_flags();
                    self.push(Token::Match { pattern, flags }, start, line);
                }
                b'<' if !self.prev_ends_term() && self.source[self.pos..].starts_with("<STDIN>") => {
                    self.pos += "<STDIN>".len();
                    self.push(Token::Stdin, start, line);
                }
                b'.' if !self.prev_ends_term() && self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) => {
                    self.lex_number(start);
                }
                b'0'..=b'9' => self.lex_number(start),
                b'a'..=b'z' | b'A'..=b'Z' | b'_' => self.lex_word(start),
                b'&' if !self.prev_ends_term() && self.peek_at(1).is_some_and(is_ident_start) => {
                    // `&name(...)` calls: the sigil carries no meaning here.
                    self.pos += 1;
                }
                _ => {
                    if let Some((token, len)) = self.operator() {
                        self.pos += len;
                        self.push(token, start, line);
                    } else {
                        let ch = self.source[self.pos..].chars().next().unwrap_or('?');
                        self.errors.push(Diagnostic::lexical(
                            format!("unexpected character '{ch}'"),
                            Position::new(line, start, start + ch.len_utf8()),
                        ));
                        self.pos += ch.len_utf8();
                    }
                }
            }
        }
        self.tokens.push(SpannedToken {
            token: Token::Eof,
            pos: Position::new(self.line, self.pos, self.pos),
        });
    }

    fn peek_at(&self, ahead: usize) -> Option<u8> {
        self.bytes.get(self.pos + ahead).copied()
    }

    fn push(&mut self, token: Token, start: usize, line: usize) {
        if self.trace {
            trace!(line, offset = start, ?token, "token");
        }
        self.tokens.push(SpannedToken {
            token,
            pos: Position::new(line, start, self.pos),
        });
    }

    fn single(&mut self, token: Token, start: usize) {
        self.pos += 1;
        let line = self.line;
        self.push(token, start, line);
    }

    fn last_significant(&self) -> Option<&Token> {
        self.tokens
            .iter()
            .rev()
            .map(|t| &t.token)
            .find(|t| !matches!(t, Token::Comment(_) | Token::Labels(_)))
    }

    fn prev_ends_term(&self) -> bool {
        match self.last_significant() {
            Some(Token::RBrace) => self.closed_subscript,
            Some(token) => token.ends_term(),
            None => false,
        }
    }

    /// True right after `;`, `{` or `}`, where a comment stands on its own.
    fn at_statement_boundary(&self) -> bool {
        match self.tokens.last().map(|t| &t.token) {
            None => true,
            Some(t) => matches!(
                t,
                Token::Semi
                    | Token::LBrace
                    | Token::RBrace
                    | Token::Comment(_)
                    | Token::Labels(_)
                    | Token::JavaLine(_)
                    | Token::JavaImport(_)
            ),
        }
    }

    fn at_line_start(&self) -> bool {
        self.pos == 0 || self.bytes.get(self.pos - 1) == Some(&b'\n')
    }

    fn skip_whitespace(&mut self) {
        while let Some(&c) = self.bytes.get(self.pos) {
            match c {
                b'\n' => {
                    self.line += 1;
                    self.pos += 1;
                }
                b' ' | b'\t' | b'\r' => self.pos += 1,
                _ => break,
            }
        }
        if self.at_line_start()
            && (self.source[self.pos..].starts_with("__END__") || self.source[self.pos..].starts_with("__DATA__"))
        {
            self.pos = self.bytes.len();
        }
    }

    fn skip_pod(&mut self) {
        while self.pos < self.bytes.len() {
            let line_end = self.source[self.pos..].find('\n').map_or(self.bytes.len(), |i| self.pos + i);
            let is_cut = self.source[self.pos..line_end].starts_with("=cut");
            self.pos = line_end;
            if self.pos < self.bytes.len() {
                self.pos += 1;
                self.line += 1;
            }
            if is_cut {
                break;
            }
        }
    }

    fn lex_comment(&mut self, start: usize) {
        let line = self.line;
        let end = self.source[self.pos..].find('\n').map_or(self.bytes.len(), |i| self.pos + i);
        let text = self.source[self.pos + 1..end].trim_end_matches('\r');
        let boundary = self.at_statement_boundary();
        self.pos = end;

        if let Some(rest) = text.strip_prefix("<java>") {
            self.push(Token::JavaLine(rest.trim().to_string()), start, line);
        } else if let Some(rest) = text.strip_prefix("<import>") {
            self.push(Token::JavaImport(rest.trim().to_string()), start, line);
        } else if text.starts_with('<') {
            match parse_labels(text) {
                Ok(labels) => self.push(Token::Labels(labels), start, line),
                Err(word) => self.errors.push(Diagnostic::lexical(
                    format!("unknown annotation word '{word}'"),
                    Position::new(line, start, end),
                )),
            }
        } else if boundary {
            self.push(Token::Comment(text.trim().to_string()), start, line);
        }
    }

    /// Read a delimited body, honouring backslash escapes and bracket
    /// nesting. The opening delimiter has already been consumed.
    fn read_until(&mut self, open: u8, start: usize) -> String {
        let close = closing_delimiter(open);
        let body_start = self.pos;
        let mut depth = 0usize;
        while let Some(&c) = self.bytes.get(self.pos) {
            if c == b'\\' {
                self.pos += 2;
                continue;
            }
            if c == b'\n' {
                self.line += 1;
            }
            if c == close && depth == 0 {
                let body = self.source[body_start..self.pos].to_string();
                self.pos += 1;
                return body;
            }
            if open != close {
                if c == open {
                    depth += 1;
                } else if c == close {
                    depth -= 1;
                }
            }
            self.pos += 1;
        }
        self.pos = self.pos.min(self.bytes.len());
        self.errors.push(Diagnostic::lexical(
            format!("unterminated literal, expected '{}'", close as char),
            Position::new(self.line, start, self.pos),
        ));
        self.source[body_start..self.pos].to_string()
    }

    fn read_flags(&mut self) -> String {
        let start = self.pos;
        while self.peek_at(0).is_some_and(|c| c.is_ascii_alphabetic()) {
            self.pos += 1;
        }
        self.source[start..self.pos].to_string()
    }

    /// Read the second part of `s///` or `tr///`. Bracketed forms allow
    /// whitespace between the parts: `s{a} {b}`.
    fn read_second_part(&mut self, open: u8, start: usize) -> String {
        if closing_delimiter(open) == open {
            return self.read_until(open, start);
        }
        self.skip_whitespace();
        match self.peek_at(0) {
            Some(next) if !next.is_ascii_alphanumeric() => {
                self.pos += 1;
                self.read_until(next, start)
            }
            _ => {
                self.errors.push(Diagnostic::lexical(
                    "missing replacement part",
                    Position::new(self.line, start, self.pos),
                ));
                String::new()
            }
        }
    }

    fn read_ident(&mut self) -> String {
        let start = self.pos;
        loop {
            while self.peek_at(0).is_some_and(is_ident_char) {
                self.pos += 1;
            }
            if self.peek_at(0) == Some(b':') && self.peek_at(1) == Some(b':') && self.peek_at(2).is_some_and(is_ident_start) {
                self.pos += 2;
            } else {
                break;
            }
        }
        self.source[start..self.pos].to_string()
    }

    fn lex_scalar_sigil(&mut self, start: usize) {
        let line = self.line;
        self.pos += 1;
        match self.peek_at(0) {
            Some(b'#') if self.peek_at(1).is_some_and(is_ident_start) => {
                self.pos += 1;
                let name = self.read_ident();
                self.push(Token::LastIndex(name), start, line);
            }
            Some(c) if c.is_ascii_digit() => {
                let digits_start = self.pos;
                while self.peek_at(0).is_some_and(|c| c.is_ascii_digit()) {
                    self.pos += 1;
                }
                let n = self.source[digits_start..self.pos].parse().unwrap_or(0);
                self.push(Token::Capture(n), start, line);
            }
            _ => self.lex_sigil_body(Sigil::Scalar, start),
        }
    }

    fn lex_array_sigil(&mut self, start: usize) {
        self.pos += 1;
        self.lex_sigil_body(Sigil::Array, start);
    }

    /// The part after a sigil: a name, or a dereference of a block/scalar.
    fn lex_sigil_body(&mut self, sigil: Sigil, start: usize) {
        let line = self.line;
        match self.peek_at(0) {
            Some(b'{' | b'$') => self.push(Token::Deref(sigil), start, line),
            Some(c) if is_ident_start(c) => {
                let name = self.read_ident();
                self.push(Token::Var(sigil, name), start, line);
            }
            Some(b':') if self.peek_at(1) == Some(b':') => {
                self.pos += 2;
                let name = self.read_ident();
                self.push(Token::Var(sigil, format!("main::{name}")), start, line);
            }
            _ => self.errors.push(Diagnostic::lexical(
                format!("'{}' is not followed by a name", sigil.symbol()),
                Position::new(line, start, self.pos),
            )),
        }
    }

    fn lex_number(&mut self, start: usize) {
        let line = self.line;
        if self.peek_at(0) == Some(b'0') && matches!(self.peek_at(1), Some(b'x' | b'X')) {
            self.pos += 2;
            let digits_start = self.pos;
            while self.peek_at(0).is_some_and(|c| c.is_ascii_hexdigit() || c == b'_') {
                self.pos += 1;
            }
            let digits = self.source[digits_start..self.pos].replace('_', "");
            match i64::from_str_radix(&digits, 16) {
                Ok(n) => self.push(Token::Int(n), start, line),
                Err(_) => self.errors.push(Diagnostic::lexical(
                    "invalid hexadecimal literal",
                    Position::new(line, start, self.pos),
                )),
            }
            return;
        }

        let mut is_float = false;
        while self.peek_at(0).is_some_and(|c| c.is_ascii_digit() || c == b'_') {
            self.pos += 1;
        }
        if self.peek_at(0) == Some(b'.') && self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) {
            is_float = true;
            self.pos += 1;
            while self.peek_at(0).is_some_and(|c| c.is_ascii_digit() || c == b'_') {
                self.pos += 1;
            }
        }
        if matches!(self.peek_at(0), Some(b'e' | b'E')) {
            let sign = usize::from(matches!(self.peek_at(1), Some(b'+' | b'-')));
            if self.peek_at(1 + sign).is_some_and(|c| c.is_ascii_digit()) {
                is_float = true;
                self.pos += 1 + sign;
                while self.peek_at(0).is_some_and(|c| c.is_ascii_digit()) {
                    self.pos += 1;
                }
            }
        }

        let text = self.source[start..self.pos].replace('_', "");
        let token = if is_float {
            text.parse().map(Token::Float).ok()
        } else {
            text.parse::<i64>()
                .map(Token::Int)
                .or_else(|_| text.parse().map(Token::Float))
                .ok()
        };
        match token {
            Some(token) => self.push(token, start, line),
            None => self.errors.push(Diagnostic::lexical(
                format!("invalid number '{text}'"),
                Position::new(line, start, self.pos),
            )),
        }
    }

    fn lex_word(&mut self, start: usize) {
        let line = self.line;
        let after_term = self.prev_ends_term();
        let word = self.read_ident();

        if after_term && word.starts_with('x') && word[1..].bytes().all(|c| c.is_ascii_digit()) {
            // `$s x 3`, `$s x3`, `$s x= 2`
            self.pos = start + 1;
            if self.peek_at(0) == Some(b'=') && !matches!(self.peek_at(1), Some(b'=' | b'>')) {
                self.pos += 1;
                self.push(Token::Assign(AssignOp::Repeat), start, line);
            } else {
                self.push(Token::Repeat, start, line);
            }
            return;
        }

        if let Some(quoted) = self.lex_quote_like(&word, start) {
            self.push(quoted, start, line);
            return;
        }

        let token = match word.as_str() {
            "my" => Token::My,
            "our" | "local" => Token::Our,
            "sub" => Token::Sub,
            "if" => Token::If,
            "elsif" => Token::Elsif,
            "else" => Token::Else,
            "unless" => Token::Unless,
            "while" => Token::While,
            "until" => Token::Until,
            "for" | "foreach" => Token::For,
            "do" => Token::Do,
            "last" => Token::Last,
            "next" => Token::Next,
            "return" => Token::Return,
            "package" => Token::Package,
            "undef" => Token::Undef,
            "eq" => Token::StrEq,
            "ne" => Token::StrNe,
            "lt" => Token::StrLt,
            "le" => Token::StrLe,
            "gt" => Token::StrGt,
            "ge" => Token::StrGe,
            "cmp" => Token::StrCmp,
            "and" => Token::LowAnd,
            "or" => Token::LowOr,
            "not" => Token::LowNot,
            "xor" => Token::LowXor,
            _ => Token::Ident(word),
        };
        self.push(token, start, line);
    }

    /// `q`, `qq`, `qw`, `qx`, `m`, `s`, `tr` and `y` followed directly by a
    /// delimiter. Anything else (`s => 1`, `y,`) stays an identifier.
    fn lex_quote_like(&mut self, word: &str, start: usize) -> Option<Token> {
        if !matches!(word, "q" | "qq" | "qw" | "qx" | "m" | "s" | "tr" | "y") {
            return None;
        }
        let open = self.peek_at(0)?;
        let is_delimiter = matches!(
            open,
            b'/' | b'{' | b'(' | b'[' | b'<' | b'|' | b'!' | b'#' | b'~' | b'^' | b'%' | b'@' | b'"' | b'\''
        );
        if !is_delimiter {
            return None;
        }
        self.pos += 1;
        let token = match word {
            "q" => Token::Str(unescape_single(&self.read_until(open, start))),
            "qq" => Token::Interp(self.read_until(open, start)),
            "qx" => Token::Command(self.read_until(open, start)),
            "qw" => Token::Words(
                self.read_until(open, start)
                    .split_whitespace()
                    .map(str::to_string)
                    .collect(),
            ),
            "m" => {
                let pattern = self.read_until(open, start);
                Token::Match { pattern, flags: self.read_flags() }
            }
            "s" => {
                let pattern = self.read_until(open, start);
                let replacement = self.read_second_part(open, start);
                Token::Subst { pattern, replacement, flags: self.read_flags() }
            }
            _ => {
                let from = self.read_until(open, start);
                let to = self.read_second_part(open, start);
                Token::Translit { from, to, flags: self.read_flags() }
            }
        };
        Some(token)
    }

    /// Longest-match operator at the current position with its byte length.
    fn operator(&self) -> Option<(Token, usize)> {
        const TABLE: &[(&str, Token)] = &[
            ("**=", Token::Assign(AssignOp::Pow)),
            ("<<=", Token::Assign(AssignOp::Shl)),
            (">>=", Token::Assign(AssignOp::Shr)),
            ("&&=", Token::Assign(AssignOp::And)),
            ("||=", Token::Assign(AssignOp::Or)),
            ("<=>", Token::Spaceship),
            ("...", Token::Range),
            ("+=", Token::Assign(AssignOp::Add)),
            ("-=", Token::Assign(AssignOp::Sub)),
            ("*=", Token::Assign(AssignOp::Mul)),
            ("/=", Token::Assign(AssignOp::Div)),
            ("%=", Token::Assign(AssignOp::Mod)),
            ("&=", Token::Assign(AssignOp::BitAnd)),
            ("|=", Token::Assign(AssignOp::BitOr)),
            ("^=", Token::Assign(AssignOp::BitXor)),
            (".=", Token::Assign(AssignOp::Concat)),
            ("**", Token::Pow),
            ("++", Token::PlusPlus),
            ("--", Token::MinusMinus),
            ("->", Token::Arrow),
            ("=>", Token::FatComma),
            ("==", Token::NumEq),
            ("!=", Token::NumNe),
            ("<=", Token::Le),
            (">=", Token::Ge),
            ("=~", Token::Bind),
            ("!~", Token::NotBind),
            ("~~", Token::Smart),
            ("<<", Token::Shl),
            (">>", Token::Shr),
            ("&&", Token::AndAnd),
            ("||", Token::OrOr),
            ("..", Token::Range),
            ("=", Token::Assign(AssignOp::Plain)),
            ("+", Token::Plus),
            ("-", Token::Minus),
            ("*", Token::Star),
            ("/", Token::Slash),
            ("%", Token::Percent),
            (".", Token::Dot),
            ("<", Token::Lt),
            (">", Token::Gt),
            ("&", Token::BitAnd),
            ("|", Token::BitOr),
            ("^", Token::BitXor),
            ("~", Token::BitNot),
            ("!", Token::Bang),
        ];
        let rest = &self.source[self.pos..];
        TABLE
            .iter()
            .find(|(text, _)| rest.starts_with(text))
            .map(|(text, token)| (token.clone(), text.len()))
    }
}

fn is_ident_start(c: u8) -> bool {
    c.is_ascii_alphabetic() || c == b'_'
}

fn is_ident_char(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'_'
}

fn closing_delimiter(open: u8) -> u8 {
    match open {
        b'(' => b')',
        b'[' => b']',
        b'{' => b'}',
        b'<' => b'>',
        other => other,
    }
}

/// Single-quoted strings only recognise `\\` and `\'`.
fn unescape_single(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(&next) = chars.peek() {
                if next == '\\' || next == '\'' {
                    out.push(next);
                    chars.next();
                    continue;
                }
            }
        }
        out.push(c);
    }
    out
}

/// Parse the `<word><word>...` groups of an annotation comment.
/// Returns the offending word on failure.
fn parse_labels(text: &str) -> Result<Vec<Label>, String> {
    let mut labels = Vec::new();
    let mut rest = text.trim();
    while let Some(after) = rest.strip_prefix('<') {
        let Some(close) = after.find('>') else {
            return Err(after.to_string());
        };
        let word = after[..close].trim();
        rest = after[close + 1..].trim_start();

        let label = if let Some(tag) = TypeTag::from_word(word) {
            Label::Type(tag)
        } else if let Ok(size) = word.parse() {
            Label::Size(size)
        } else if word.eq_ignore_ascii_case("args") {
            Label::Args
        } else if word.eq_ignore_ascii_case("returns") || word.eq_ignore_ascii_case("return") {
            Label::Returns
        } else {
            let mut chars = word.chars();
            let sigil = match chars.next() {
                Some('$') => Sigil::Scalar,
                Some('@') => Sigil::Array,
                Some('%') => Sigil::Hash,
                _ => return Err(word.to_string()),
            };
            let name = chars.as_str();
            if name.is_empty() || !name.bytes().all(|c| is_ident_char(c) || c == b':') {
                return Err(word.to_string());
            }
            Label::Declare {
                name: name.to_string(),
                sigil,
            }
        };
        labels.push(label);
    }
    if labels.is_empty() {
        return Err(rest.to_string());
    }
    Ok(labels)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn tokens(src: &str) -> Vec<Token> {
        let lexed = lex(src, false);
        assert!(lexed.errors.is_empty(), "unexpected errors: {:?}", lexed.errors);
        lexed.tokens.into_iter().map(|t| t.token).collect()
    }

    #[test]
    fn declaration_with_sigils() {
        assert_eq!(
            tokens("my $x = 3 + 4;"),
            vec![
                Token::My,
                Token::Var(Sigil::Scalar, "x".into()),
                Token::Assign(AssignOp::Plain),
                Token::Int(3),
                Token::Plus,
                Token::Int(4),
                Token::Semi,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn slash_after_term_divides() {
        let t = tokens("$a / $b / 2");
        assert_eq!(t[1], Token::Slash);
        assert_eq!(t[3], Token::Slash);
    }

    #[test]
    fn slash_after_operator_starts_pattern() {
        let t = tokens("split /,\\s*/, $line");
        assert_eq!(
            t[1],
            Token::Match {
                pattern: ",\\s*".into(),
                flags: String::new()
            }
        );
    }

    #[test]
    fn substitution_with_flags() {
        let t = tokens("$s =~ s/foo/bar/gi;");
        assert_eq!(t[1], Token::Bind);
        assert_eq!(
            t[2],
            Token::Subst {
                pattern: "foo".into(),
                replacement: "bar".into(),
                flags: "gi".into()
            }
        );
    }

    #[test]
    fn bracketed_substitution_and_translit() {
        let t = tokens("s{a}{b}; tr/a-z/A-Z/;");
        assert!(matches!(&t[0], Token::Subst { pattern, replacement, .. } if pattern == "a" && replacement == "b"));
        assert!(matches!(&t[2], Token::Translit { from, to, .. } if from == "a-z" && to == "A-Z"));
    }

    #[test]
    fn repeat_operator_only_after_term() {
        let t = tokens("$s x 3; x(1);");
        assert_eq!(t[1], Token::Repeat);
        assert_eq!(t[4], Token::Ident("x".into()));
        let t = tokens("$s x= 2;");
        assert_eq!(t[1], Token::Assign(AssignOp::Repeat));
    }

    #[test]
    fn percent_is_hash_sigil_or_modulo() {
        let t = tokens("%h = (); $a % 2;");
        assert_eq!(t[0], Token::Var(Sigil::Hash, "h".into()));
        assert_eq!(t[6], Token::Percent);
        // a hash at the start of a statement after a block
        let t = tokens("if ($x) { $y = 1; }\n%h = ();");
        assert!(t.contains(&Token::Var(Sigil::Hash, "h".into())));
        let t = tokens("$h{a} / 2");
        assert!(t.contains(&Token::Slash));
    }

    #[test]
    fn numbers() {
        assert_eq!(tokens("0x1F")[0], Token::Int(31));
        assert_eq!(tokens("1_000")[0], Token::Int(1000));
        assert_eq!(tokens("2.5e3")[0], Token::Float(2500.0));
        // `1..10` is a range, not a float
        assert_eq!(tokens("1..10"), vec![Token::Int(1), Token::Range, Token::Int(10), Token::Eof]);
    }

    #[test]
    fn strings() {
        assert_eq!(tokens(r"'it\'s'")[0], Token::Str("it's".into()));
        assert_eq!(tokens(r#""a $x\n""#)[0], Token::Interp(r"a $x\n".into()));
        assert_eq!(tokens("qw(a b c)")[0], Token::Words(vec!["a".into(), "b".into(), "c".into()]));
    }

    #[test]
    fn special_variables() {
        let t = tokens("$#a $1 @{$r} $$r $_");
        assert_eq!(t[0], Token::LastIndex("a".into()));
        assert_eq!(t[1], Token::Capture(1));
        assert_eq!(t[2], Token::Deref(Sigil::Array));
        assert_eq!(t[3], Token::LBrace);
        assert_eq!(t[6], Token::Deref(Sigil::Scalar));
        assert_eq!(t[8], Token::Var(Sigil::Scalar, "_".into()));
    }

    #[test]
    fn annotations_and_passthrough() {
        let t = tokens("#<array><10><int>\nmy @a;\n#<java> int z = 0;\n#<$a><$b><string>\n");
        assert_eq!(
            t[0],
            Token::Labels(vec![Label::Type(TypeTag::Array), Label::Size(10), Label::Type(TypeTag::Integer)])
        );
        assert_eq!(t[4], Token::JavaLine("int z = 0;".into()));
        assert!(matches!(&t[5], Token::Labels(l) if l.len() == 3));
    }

    #[test]
    fn comments_kept_only_at_statement_boundaries() {
        let t = tokens("# header\nmy $x = 1; # trailing\n$x = 2 # inside\n;");
        assert_eq!(t[0], Token::Comment("header".into()));
        assert!(t.contains(&Token::Comment("trailing".into())));
        assert!(!t.contains(&Token::Comment("inside".into())));
    }

    #[test]
    fn stdin_and_lines() {
        let lexed = lex("my $l = <STDIN>;\n$l = 1;", false);
        assert_eq!(lexed.tokens[3].token, Token::Stdin);
        assert_eq!(lexed.tokens[5].pos.line, 2);
    }

    #[test]
    fn pod_and_end_are_skipped() {
        let t = tokens("=head1 X\nstuff\n=cut\n1;\n__END__\nignored(");
        assert_eq!(t, vec![Token::Int(1), Token::Semi, Token::Eof]);
    }

    #[test]
    fn unterminated_string_is_reported() {
        let lexed = lex("my $s = \"abc", false);
        assert_eq!(lexed.errors.len(), 1);
        assert!(lexed.errors[0].message.contains("unterminated"));
    }
}
