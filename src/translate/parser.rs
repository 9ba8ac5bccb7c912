//! Operator-precedence parser that translates as it reduces.
//!
//! There is no syntax tree. Statements are parsed by recursive descent and
//! expressions by precedence climbing over the [`Grammar`] table; every
//! reduction hands its operands to the translation modules and gets Java
//! text back.

use std::collections::HashMap;
use std::mem::{discriminant, Discriminant};

use tracing::debug;

use crate::error::TranslateError;

use super::assemble::Package;
use super::blocks::{self, Arm, FunctionHeader, Modifier};
use super::builtins::{self, Builtin, Form};
use super::cast;
use super::collections;
use super::error::{Diagnostic, DiagnosticKind};
use super::escape::{self, Mode};
use super::fragment::{Access, AccessOp, Declare, Flags, Fragment, Place};
use super::lexer::{AssignOp, Sigil, SpannedToken, Token};
use super::ops::{self, BinOp, UnOp};
use super::position::Position;
use super::session::{Feature, FunctionState, Session, Signature};
use super::statements::{self, Source};
use super::symbols::java_base;
use super::types::{TypeSeq, TypeTag};

/// Precedence levels, loosest first.
pub mod level {
    pub const LOW_OR: u8 = 1;
    pub const LOW_AND: u8 = 2;
    pub const LOW_NOT: u8 = 3;
    pub const COMMA: u8 = 4;
    pub const ASSIGN: u8 = 5;
    pub const TERNARY: u8 = 6;
    pub const RANGE: u8 = 7;
    pub const OR: u8 = 8;
    pub const AND: u8 = 9;
    pub const BIT_OR: u8 = 10;
    pub const BIT_AND: u8 = 11;
    pub const EQUALITY: u8 = 12;
    pub const RELATIONAL: u8 = 13;
    /// Also the operand level of named unary operators.
    pub const SHIFT: u8 = 14;
    pub const ADDITIVE: u8 = 15;
    pub const MULTIPLICATIVE: u8 = 16;
    pub const BIND: u8 = 17;
    pub const UNARY: u8 = 18;
    pub const POW: u8 = 19;
    pub const INCDEC: u8 = 20;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Assoc {
    Left,
    Right,
    NonAssoc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfixOp {
    Bin(BinOp),
    Assign,
    Ternary,
    Range,
    Bind { negate: bool },
}

#[derive(Debug, Clone, Copy)]
pub struct Infix {
    pub level: u8,
    pub assoc: Assoc,
    pub op: InfixOp,
}

/// Infix operators keyed by token kind.
#[derive(Debug)]
pub struct Grammar {
    infix: HashMap<Discriminant<Token>, Infix>,
}

impl Grammar {
    pub fn new() -> Result<Self, TranslateError> {
        use Assoc::{Left, NonAssoc, Right};
        let b = InfixOp::Bin;
        let rows: Vec<(u8, Assoc, Vec<(Token, InfixOp)>)> = vec![
            (level::LOW_OR, Left, vec![(Token::LowOr, b(BinOp::LowOr)), (Token::LowXor, b(BinOp::LowXor))]),
            (level::LOW_AND, Left, vec![(Token::LowAnd, b(BinOp::LowAnd))]),
            (level::ASSIGN, Right, vec![(Token::Assign(AssignOp::Plain), InfixOp::Assign)]),
            (level::TERNARY, Right, vec![(Token::Question, InfixOp::Ternary)]),
            (level::RANGE, NonAssoc, vec![(Token::Range, InfixOp::Range)]),
            (level::OR, Left, vec![(Token::OrOr, b(BinOp::Or))]),
            (level::AND, Left, vec![(Token::AndAnd, b(BinOp::And))]),
            (level::BIT_OR, Left, vec![(Token::BitOr, b(BinOp::BitOr)), (Token::BitXor, b(BinOp::BitXor))]),
            (level::BIT_AND, Left, vec![(Token::BitAnd, b(BinOp::BitAnd))]),
            (
                level::EQUALITY,
                NonAssoc,
                vec![
                    (Token::NumEq, b(BinOp::NumEq)),
                    (Token::NumNe, b(BinOp::NumNe)),
                    (Token::Spaceship, b(BinOp::NumCmp)),
                    (Token::StrEq, b(BinOp::StrEq)),
                    (Token::StrNe, b(BinOp::StrNe)),
                    (Token::StrCmp, b(BinOp::StrCmp)),
                    (Token::Smart, b(BinOp::Smart)),
                ],
            ),
            (
                level::RELATIONAL,
                NonAssoc,
                vec![
                    (Token::Lt, b(BinOp::NumLt)),
                    (Token::Le, b(BinOp::NumLe)),
                    (Token::Gt, b(BinOp::NumGt)),
                    (Token::Ge, b(BinOp::NumGe)),
                    (Token::StrLt, b(BinOp::StrLt)),
                    (Token::StrLe, b(BinOp::StrLe)),
                    (Token::StrGt, b(BinOp::StrGt)),
                    (Token::StrGe, b(BinOp::StrGe)),
                ],
            ),
            (level::SHIFT, Left, vec![(Token::Shl, b(BinOp::Shl)), (Token::Shr, b(BinOp::Shr))]),
            (
                level::ADDITIVE,
                Left,
                vec![(Token::Plus, b(BinOp::Add)), (Token::Minus, b(BinOp::Sub)), (Token::Dot, b(BinOp::Concat))],
            ),
            (
                level::MULTIPLICATIVE,
                Left,
                vec![
                    (Token::Star, b(BinOp::Mul)),
                    (Token::Slash, b(BinOp::Div)),
                    (Token::Percent, b(BinOp::Mod)),
                    (Token::Repeat, b(BinOp::Repeat)),
                ],
            ),
            (
                level::BIND,
                Left,
                vec![
                    (Token::Bind, InfixOp::Bind { negate: false }),
                    (Token::NotBind, InfixOp::Bind { negate: true }),
                ],
            ),
            (level::POW, Right, vec![(Token::Pow, b(BinOp::Pow))]),
        ];

        let mut infix = HashMap::new();
        for (level, assoc, entries) in rows {
            for (token, op) in entries {
                if infix.insert(discriminant(&token), Infix { level, assoc, op }).is_some() {
                    return Err(TranslateError::Grammar(format!(
                        "operator {token:?} is listed twice"
                    )));
                }
            }
        }
        Ok(Self { infix })
    }

    pub fn infix(&self, token: &Token) -> Option<Infix> {
        self.infix.get(&discriminant(token)).copied()
    }
}

#[derive(Debug)]
enum ParseError {
    /// Already reported; the statement is abandoned.
    Syntax,
    Fatal(TranslateError),
}

impl From<TranslateError> for ParseError {
    fn from(e: TranslateError) -> Self {
        ParseError::Fatal(e)
    }
}

type PResult<T> = Result<T, ParseError>;

/// A partially reduced expression.
#[derive(Debug)]
enum Operand {
    Value(Fragment),
    /// A variable with subscripts, resolved once its use is known.
    Access(Access),
    /// A comma list; parentheses alone do not make one.
    List { items: Vec<Fragment>, pairs: bool, pos: Position },
}

/// Whether `token` can begin an operand.
fn starts_term(token: &Token) -> bool {
    matches!(
        token,
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
            | Token::Deref(_)
            | Token::Ident(_)
            | Token::My
            | Token::Our
            | Token::Undef
            | Token::LParen
            | Token::LBracket
            | Token::LBrace
            | Token::Backslash
            | Token::Minus
            | Token::Bang
            | Token::BitNot
            | Token::PlusPlus
            | Token::MinusMinus
            | Token::LowNot
    )
}

fn is_handle(name: &str) -> bool {
    matches!(name, "STDERR" | "STDOUT")
}

fn handle(name: &str, pos: Position) -> Fragment {
    let java = if name == "STDERR" { "System.err" } else { "System.out" };
    Fragment::scalar(java, TypeTag::Unresolved, pos).with_flags(Flags::FILEHANDLE)
}

/// `undef` and `()`.
fn empty(pos: Position) -> Fragment {
    Fragment::new("null", TypeSeq::scalar(TypeTag::Unresolved), pos).with_flags(Flags::EMPTY)
}

fn int_literal(n: i64, pos: Position) -> Fragment {
    if i32::try_from(n).is_ok() {
        Fragment::scalar(n.to_string(), TypeTag::Integer, pos)
    } else {
        Fragment::scalar(format!("{n}L"), TypeTag::Long, pos)
    }
}

fn float_literal(f: f64, pos: Position) -> Fragment {
    let mut text = f.to_string();
    if f.is_finite() && !text.contains(['.', 'e', 'E']) {
        text.push_str(".0");
    }
    Fragment::scalar(text, TypeTag::Double, pos)
}

fn malformed<T>(message: &str, pos: Position) -> PResult<T> {
    Err(ParseError::Fatal(TranslateError::MalformedPackage {
        message: message.to_string(),
        line: pos.line,
    }))
}

fn string_literal(value: &str, pos: Position) -> Fragment {
    Fragment::scalar(escape::java_string(value), TypeTag::String, pos)
}

pub struct Parser<'g> {
    grammar: &'g Grammar,
    tokens: Vec<SpannedToken>,
    pos: usize,
    s: Session,
    trace: bool,
    eof_reported: bool,
    /// Statements completed so far; `package` must come before any.
    completed: usize,
    /// Token index where the current statement or `for` step began.
    stmt_start: usize,
    in_step: bool,
    /// Token index of the first argument of `split`.
    pattern_at: Option<usize>,
    /// Whether the statement being parsed always returns. `None` for
    /// comments and definitions, which leave the previous answer standing.
    returns: Option<bool>,
    /// Whether the last block parsed ends in a statement that always returns.
    block_returns: bool,
}

impl<'g> Parser<'g> {
    pub fn new(grammar: &'g Grammar, tokens: Vec<SpannedToken>, session: Session, trace: bool) -> Self {
        Self {
            grammar,
            tokens,
            pos: 0,
            s: session,
            trace,
            eof_reported: false,
            completed: 0,
            stmt_start: 0,
            in_step: false,
            pattern_at: None,
            returns: None,
            block_returns: false,
        }
    }

    /// Translate the whole token stream. Syntax errors are recorded in the
    /// session and parsing resumes; only fatal errors abort.
    pub fn parse_program(mut self) -> Result<Session, TranslateError> {
        self.collect_signatures();
        self.s.symbols.declare_as(
            "@ARGV",
            "args",
            TypeSeq::from_tags(&[TypeTag::Array, TypeTag::String]),
            Position::default(),
        );
        match self.statements(true) {
            Ok(code) => {
                self.s.push_global(&code);
                Ok(self.s)
            }
            Err(ParseError::Fatal(e)) => Err(e),
            Err(ParseError::Syntax) => Ok(self.s),
        }
    }

    // ── Helpers ────────────────────────────────────────────────────

    fn peek(&self) -> &Token {
        self.peek_at(0)
    }

    fn peek_at(&self, n: usize) -> &Token {
        self.tokens.get(self.pos + n).map_or(&Token::Eof, |t| &t.token)
    }

    fn span(&self) -> Position {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map_or_else(Position::default, |t| t.pos)
    }

    fn advance(&mut self) -> SpannedToken {
        let tok = self.tokens.get(self.pos).cloned().unwrap_or(SpannedToken {
            token: Token::Eof,
            pos: self.span(),
        });
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn at(&self, token: &Token) -> bool {
        discriminant(self.peek()) == discriminant(token)
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.at(token) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &Token) -> PResult<Position> {
        if self.at(token) {
            Ok(self.advance().pos)
        } else {
            self.unexpected()
        }
    }

    fn report_eof(&mut self, pos: Position) {
        if !self.eof_reported {
            self.eof_reported = true;
            self.s.push_diagnostic(Diagnostic::syntax_eof(pos));
        }
    }

    /// Report the current token and abandon the statement.
    fn unexpected<T>(&mut self) -> PResult<T> {
        let pos = self.span();
        match self.peek() {
            Token::Eof => self.report_eof(pos),
            tok => {
                let d = Diagnostic::syntax_token(tok.kind_name(), &tok.value(), pos);
                self.s.push_diagnostic(d);
            }
        }
        Err(ParseError::Syntax)
    }

    /// Skip the rest of a broken statement: through the next `;` at brace
    /// depth zero, or through a block that closes back to depth zero. A `}`
    /// closing the enclosing block is left for the block.
    fn recover(&mut self, top_level: bool) {
        let mut depth = 0usize;
        loop {
            match self.peek() {
                Token::Eof => return,
                Token::Semi => {
                    self.advance();
                    if depth == 0 {
                        return;
                    }
                }
                Token::LBrace => {
                    depth += 1;
                    self.advance();
                }
                Token::RBrace => {
                    if depth == 0 {
                        if top_level {
                            self.advance();
                        }
                        return;
                    }
                    depth -= 1;
                    self.advance();
                    if depth == 0 {
                        return;
                    }
                }
                _ => {
                    self.advance();
                }
            }
        }
    }

    /// Index of the `}` matching the `{` at `open`.
    fn matching_brace(&self, open: usize) -> Option<usize> {
        let mut depth = 0usize;
        for (i, t) in self.tokens.iter().enumerate().skip(open) {
            match t.token {
                Token::LBrace => depth += 1,
                Token::RBrace => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        return Some(i);
                    }
                }
                Token::Eof => return None,
                _ => {}
            }
        }
        None
    }

    /// The value of an `++`/`--` is unused: the operand starting at `start`
    /// is the whole statement or `for` step.
    fn discarded(&self, start: usize) -> bool {
        if start != self.stmt_start {
            return false;
        }
        match self.peek() {
            Token::Semi
            | Token::RBrace
            | Token::Eof
            | Token::If
            | Token::Unless
            | Token::While
            | Token::Until
            | Token::For => true,
            Token::RParen | Token::Comma => self.in_step,
            _ => false,
        }
    }

    // ── Signatures ─────────────────────────────────────────────────

    /// Record every `sub` up front so calls may precede definitions.
    fn collect_signatures(&mut self) {
        let mut pending = None;
        for (i, t) in self.tokens.iter().enumerate() {
            match &t.token {
                Token::Labels(labels) => {
                    if let Some(sections) = statements::signature_sections(labels) {
                        pending = Some(sections);
                    }
                }
                Token::Comment(_) => {}
                Token::Sub => {
                    let (args, returns) = pending.take().unwrap_or((None, None));
                    let Some(Token::Ident(name)) = self.tokens.get(i + 1).map(|t| &t.token) else {
                        continue;
                    };
                    if self.s.signatures.contains_key(name) {
                        continue;
                    }
                    let signature = Signature {
                        name: name.clone(),
                        java: java_base(name),
                        variadic: args.is_none(),
                        args: args.unwrap_or_default(),
                        declared_returns: returns.is_some(),
                        returns: returns.unwrap_or_default(),
                        defined: false,
                        pos: t.pos,
                    };
                    self.s.signatures.insert(name.clone(), signature);
                }
                _ => pending = None,
            }
        }
    }

    // ── Statements ─────────────────────────────────────────────────

    /// Statements up to the end of input, or up to the `}` closing a block.
    fn statements(&mut self, top_level: bool) -> PResult<String> {
        let outer = self.returns.take();
        let mut returns = false;
        let mut code = String::new();
        loop {
            match self.peek() {
                Token::Eof => {
                    if !top_level {
                        let pos = self.span();
                        self.report_eof(pos);
                    }
                    break;
                }
                Token::RBrace if !top_level => break,
                _ => {}
            }
            let mark = self.s.mark();
            self.returns = Some(false);
            match self.statement() {
                Ok(text) => {
                    if let Some(r) = self.returns {
                        returns = r;
                    }
                    code.push_str(&text);
                }
                Err(ParseError::Syntax) => {
                    returns = false;
                    self.s.restore(mark);
                    self.s.labels = None;
                    self.in_step = false;
                    self.pattern_at = None;
                    self.recover(top_level);
                }
                Err(fatal) => return Err(fatal),
            }
        }
        self.returns = outer;
        self.block_returns = returns;
        Ok(code)
    }

    fn block(&mut self) -> PResult<String> {
        let open = self.expect(&Token::LBrace)?;
        let body = self.statements(false)?;
        self.eat(&Token::RBrace);
        if self.trace {
            debug!(line = open.line, lines = body.lines().count(), "block");
        }
        Ok(body)
    }

    fn scoped_block(&mut self) -> PResult<String> {
        self.s.symbols.open_scope(false);
        let body = self.block();
        self.s.symbols.close_scope();
        body
    }

    fn statement(&mut self) -> PResult<String> {
        let pos = self.span();
        let token = self.peek().clone();
        let code = match &token {
            Token::Semi => {
                self.advance();
                self.returns = None;
                return Ok(String::new());
            }
            Token::Comment(text) => {
                self.advance();
                self.returns = None;
                return Ok(format!("// {text}\n"));
            }
            Token::JavaLine(line) => {
                self.advance();
                let word = line.split_whitespace().next().unwrap_or_default();
                self.returns = Some(matches!(word.trim_end_matches(';'), "return" | "throw"));
                return Ok(format!("{line}\n"));
            }
            Token::JavaImport(import) => {
                self.advance();
                self.s.push_import(import.clone());
                self.returns = None;
                return Ok(String::new());
            }
            Token::Labels(labels) => {
                self.advance();
                self.returns = None;
                return Ok(statements::annotate(&mut self.s, labels, pos).unwrap_or_default());
            }
            Token::Ident(_) if matches!(self.peek_at(1), Token::Colon) => {
                // Loop label.
                self.advance();
                self.advance();
                return self.statement();
            }
            Token::Package => {
                self.returns = None;
                self.package()?
            }
            Token::Sub => {
                let code = self.sub_definition()?;
                self.returns = None;
                code
            }
            Token::If | Token::Unless => self.if_statement()?,
            Token::While | Token::Until => self.while_statement()?,
            Token::For => self.for_statement()?,
            Token::Do if matches!(self.peek_at(1), Token::LBrace) => self.do_statement()?,
            Token::LBrace => {
                let body = self.scoped_block()?;
                self.returns = Some(self.block_returns);
                blocks::bare_block(&body, self.block_returns, pos).text
            }
            _ => self.simple_statement()?,
        };
        self.completed += 1;
        self.s.labels = None;
        if self.trace {
            debug!(line = pos.line, token = token.kind_name(), "statement");
        }
        Ok(code)
    }

    fn package(&mut self) -> PResult<String> {
        let pos = self.advance().pos;
        if self.completed > 0 || self.s.package().is_some() {
            return malformed("package must be the first statement of the file", pos);
        }
        let Token::Ident(name) = self.peek().clone() else {
            return malformed("expected a package name", pos);
        };
        self.advance();
        if !self.eat(&Token::Semi) {
            return malformed("expected ';' after the package name", pos);
        }
        let mut parts: Vec<&str> = name.split("::").filter(|p| !p.is_empty()).collect();
        let Some(class_name) = parts.pop() else {
            return malformed("expected a package name", pos);
        };
        let java_package = if parts.is_empty() {
            None
        } else {
            Some(parts.iter().map(|p| p.to_lowercase()).collect::<Vec<_>>().join("."))
        };
        self.s.set_package(Package {
            java_package,
            class_name: class_name.to_string(),
        });
        Ok(String::new())
    }

    /// An expression statement, `last`/`next` or `return`, with an optional
    /// trailing modifier.
    fn simple_statement(&mut self) -> PResult<String> {
        if let Some(at) = self.modifier_for() {
            return self.foreach_modifier(at);
        }
        let frag = self.simple_fragment()?;
        let returns = frag.is(Flags::RETURN);
        let code = statements::create_statement(&mut self.s, frag);
        let kind = match self.peek() {
            Token::If => Modifier::If,
            Token::Unless => Modifier::Unless,
            Token::While => Modifier::While,
            Token::Until => Modifier::Until,
            _ => {
                self.terminator()?;
                self.returns = Some(returns);
                return Ok(code);
            }
        };
        let pos = self.advance().pos;
        let cond = self.expr(level::LOW_OR)?;
        let cond = self.value(cond);
        let code = blocks::modifier(&mut self.s, kind, &code, cond, pos).text;
        self.terminator()?;
        Ok(code)
    }

    fn simple_fragment(&mut self) -> PResult<Fragment> {
        self.stmt_start = self.pos;
        match self.peek() {
            Token::Last | Token::Next => {
                let last = matches!(self.peek(), Token::Last);
                let pos = self.advance().pos;
                if matches!(self.peek(), Token::Ident(_)) {
                    self.advance();
                }
                Ok(statements::loop_control(&mut self.s, last, pos))
            }
            Token::Return => {
                let pos = self.advance().pos;
                let values = if starts_term(self.peek()) {
                    let op = self.expr(level::COMMA)?;
                    self.items(op)
                } else {
                    Vec::new()
                };
                Ok(statements::return_stmt(&mut self.s, values, pos))
            }
            _ => {
                let op = self.expr(level::LOW_OR)?;
                Ok(self.value(op))
            }
        }
    }

    fn terminator(&mut self) -> PResult<()> {
        match self.peek() {
            Token::Semi => {
                self.advance();
                Ok(())
            }
            Token::RBrace | Token::Eof => Ok(()),
            _ => self.unexpected(),
        }
    }

    /// Index of a `for` modifier ending the statement that starts here.
    fn modifier_for(&self) -> Option<usize> {
        let mut depth = 0i32;
        for (i, t) in self.tokens.iter().enumerate().skip(self.pos) {
            match t.token {
                Token::LParen | Token::LBracket | Token::LBrace => depth += 1,
                Token::RParen | Token::RBracket => depth -= 1,
                Token::RBrace => {
                    if depth == 0 {
                        return None;
                    }
                    depth -= 1;
                }
                Token::Semi if depth == 0 => return None,
                Token::For if depth == 0 => return Some(i),
                Token::Eof => return None,
                _ => {}
            }
        }
        None
    }

    /// `STATEMENT for LIST;`: the list is parsed first so `$_` has its
    /// element type while the statement is translated.
    fn foreach_modifier(&mut self, at: usize) -> PResult<String> {
        let start = self.pos;
        let pos = self.tokens.get(at).map_or_else(|| self.span(), |t| t.pos);
        self.pos = at + 1;
        let list = self.expr(level::LOW_OR)?;
        let list = self.value(list);
        let end = self.pos;

        self.s.symbols.open_scope(false);
        let (list, elem) = blocks::iteration(&mut self.s, list);
        let declared = self.s.symbols.declare("$_", elem.clone(), false, false, pos);
        let var = self.s.symbols.get(declared.id).java.clone();

        self.pos = start;
        self.s.loop_depth += 1;
        let frag = self.simple_fragment();
        self.s.loop_depth -= 1;
        let frag = frag?;
        if !matches!(self.peek(), Token::For) {
            return self.unexpected();
        }
        let body = statements::create_statement(&mut self.s, frag);
        self.s.symbols.close_scope();
        self.pos = end;
        self.terminator()?;
        Ok(blocks::foreach(&var, &elem, &list, &body, pos).text)
    }

    /// `( EXPR )` of a conditional or loop, in loop-header mode. Returns the
    /// condition and the declarations hoisted out of it.
    fn condition(&mut self) -> PResult<(Fragment, Vec<String>)> {
        self.expect(&Token::LParen)?;
        self.s.toggle_loop_header();
        let parsed = self.expr(level::LOW_OR);
        self.s.toggle_loop_header();
        let cond = self.value(parsed?);
        self.expect(&Token::RParen)?;
        Ok((cond, self.s.take_hoisted()))
    }

    /// Comments between `}` and `elsif`/`else` are dropped.
    fn skip_to_else(&mut self) {
        let mut i = self.pos;
        while matches!(self.tokens.get(i).map(|t| &t.token), Some(Token::Comment(_))) {
            i += 1;
        }
        if matches!(self.tokens.get(i).map(|t| &t.token), Some(Token::Elsif | Token::Else)) {
            self.pos = i;
        }
    }

    fn if_statement(&mut self) -> PResult<String> {
        let first = self.advance();
        let pos = first.pos;
        let mut negate = matches!(first.token, Token::Unless);
        let mut hoisted = Vec::new();
        let mut arms = Vec::new();

        self.s.symbols.open_scope(false);
        loop {
            let (cond, mut lifted) = self.condition()?;
            hoisted.append(&mut lifted);
            let body = self.scoped_block()?;
            arms.push(Arm { cond: Some(cond), negate, body, returns: self.block_returns });
            negate = false;
            self.skip_to_else();
            match self.peek() {
                Token::Elsif => {
                    self.advance();
                }
                Token::Else => {
                    self.advance();
                    let body = self.scoped_block()?;
                    arms.push(Arm { cond: None, negate: false, body, returns: self.block_returns });
                    break;
                }
                _ => break,
            }
        }
        let frag = blocks::if_chain(&mut self.s, arms, pos);
        self.s.symbols.close_scope();
        let frag = blocks::wrap_hoisted(hoisted, frag);
        self.returns = Some(frag.is(Flags::RETURN));
        Ok(frag.text)
    }

    /// `while (<STDIN>)` reads into `$_`.
    fn topic_input(&mut self, cond: Fragment) -> Fragment {
        if !cond.is(Flags::INPUT) || cond.is(Flags::STATEMENT) {
            return cond;
        }
        let topic = statements::read_var(&mut self.s, Sigil::Scalar, "_", cond.pos);
        statements::assign(&mut self.s, topic, cond)
    }

    fn while_statement(&mut self) -> PResult<String> {
        let first = self.advance();
        let pos = first.pos;
        let until = matches!(first.token, Token::Until);

        self.s.symbols.open_scope(false);
        let (cond, hoisted) = if self.at(&Token::LParen) && matches!(self.peek_at(1), Token::RParen) {
            self.advance();
            self.advance();
            (None, Vec::new())
        } else {
            let (cond, hoisted) = self.condition()?;
            (Some(self.topic_input(cond)), hoisted)
        };
        self.s.loop_depth += 1;
        let body = self.scoped_block();
        self.s.loop_depth -= 1;
        let body = body?;
        let frag = blocks::while_loop(&mut self.s, cond, until, &body, pos);
        self.s.symbols.close_scope();
        Ok(blocks::wrap_hoisted(hoisted, frag).text)
    }

    fn do_statement(&mut self) -> PResult<String> {
        let pos = self.advance().pos;
        let is_loop = self
            .matching_brace(self.pos)
            .and_then(|close| self.tokens.get(close + 1))
            .is_some_and(|t| matches!(t.token, Token::While | Token::Until));

        if is_loop {
            self.s.loop_depth += 1;
        }
        let body = self.scoped_block();
        if is_loop {
            self.s.loop_depth -= 1;
        }
        let body = body?;
        if !is_loop {
            self.terminator()?;
            self.returns = Some(self.block_returns);
            return Ok(blocks::bare_block(&body, self.block_returns, pos).text);
        }

        let until = matches!(self.advance().token, Token::Until);
        self.s.toggle_loop_header();
        let parsed = self.expr(level::LOW_OR);
        self.s.toggle_loop_header();
        let cond = self.value(parsed?);
        let hoisted = self.s.take_hoisted();
        self.terminator()?;
        let frag = blocks::do_while(&mut self.s, &body, cond, until, pos);
        Ok(blocks::wrap_hoisted(hoisted, frag).text)
    }

    /// A `for (...;...;...)` header has a `;` directly inside its parentheses.
    fn is_c_style(&self) -> bool {
        let mut depth = 0usize;
        for t in self.tokens.iter().skip(self.pos) {
            match t.token {
                Token::LParen | Token::LBracket | Token::LBrace => depth += 1,
                Token::RParen | Token::RBracket | Token::RBrace => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        return false;
                    }
                }
                Token::Semi if depth == 1 => return true,
                Token::Eof => return false,
                _ => {}
            }
        }
        false
    }

    fn for_statement(&mut self) -> PResult<String> {
        let pos = self.advance().pos;
        match self.peek().clone() {
            Token::My | Token::Our => {
                self.advance();
                let Token::Var(Sigil::Scalar, name) = self.peek().clone() else {
                    return self.unexpected();
                };
                self.advance();
                self.foreach_statement(Some(&name), pos)
            }
            Token::Var(Sigil::Scalar, name) => {
                self.advance();
                self.foreach_statement(Some(&name), pos)
            }
            Token::LParen if self.is_c_style() => self.c_for(pos),
            _ => self.foreach_statement(None, pos),
        }
    }

    /// `foreach`: the loop variable is declared fresh in the loop's scope,
    /// after the list is read.
    fn foreach_statement(&mut self, name: Option<&str>, pos: Position) -> PResult<String> {
        self.s.symbols.open_scope(false);
        let open = self.expect(&Token::LParen)?;
        let list = if self.at(&Token::RParen) {
            empty(open)
        } else {
            let op = self.expr(level::LOW_OR)?;
            self.value(op)
        };
        self.expect(&Token::RParen)?;
        let (list, elem) = blocks::iteration(&mut self.s, list);
        let key = format!("${}", name.unwrap_or("_"));
        let declared = self.s.symbols.declare(&key, elem.clone(), false, false, pos);
        let var = self.s.symbols.get(declared.id).java.clone();

        self.s.loop_depth += 1;
        let body = self.scoped_block();
        self.s.loop_depth -= 1;
        let body = body?;
        self.s.symbols.close_scope();
        Ok(blocks::foreach(&var, &elem, &list, &body, pos).text)
    }

    /// One clause of a C-style `for` header, in loop-header mode.
    fn header_clause(&mut self, end: &Token) -> PResult<Vec<Fragment>> {
        let mut items = Vec::new();
        if self.at(end) {
            return Ok(items);
        }
        loop {
            self.stmt_start = self.pos;
            self.s.toggle_loop_header();
            let parsed = self.expr(level::ASSIGN);
            self.s.toggle_loop_header();
            let op = parsed?;
            items.push(self.value(op));
            if !self.eat(&Token::Comma) {
                return Ok(items);
            }
        }
    }

    fn c_for(&mut self, pos: Position) -> PResult<String> {
        self.s.symbols.open_scope(false);
        self.expect(&Token::LParen)?;
        let init = self.header_clause(&Token::Semi)?;
        self.expect(&Token::Semi)?;
        let cond = self.header_clause(&Token::Semi)?.pop();
        self.expect(&Token::Semi)?;
        self.in_step = true;
        let step = self.header_clause(&Token::RParen);
        self.in_step = false;
        let step = step?;
        self.expect(&Token::RParen)?;
        let hoisted = self.s.take_hoisted();

        self.s.loop_depth += 1;
        let body = self.scoped_block();
        self.s.loop_depth -= 1;
        let body = body?;
        let frag = blocks::for_loop(&mut self.s, init, hoisted, cond, step, &body, pos);
        self.s.symbols.close_scope();
        Ok(frag.text)
    }

    fn sub_definition(&mut self) -> PResult<String> {
        let pos = self.advance().pos;
        let Token::Ident(name) = self.peek().clone() else {
            return self.unexpected();
        };
        self.advance();
        if self.s.function.is_some() || self.s.symbols.depth() > 1 {
            self.s.report(
                DiagnosticKind::MisplacedStatement,
                format!("sub '{name}' must be defined at file level"),
                pos,
            );
        }
        let Some(signature) = self.s.signatures.get(&name).cloned() else {
            return self.unexpected();
        };
        if signature.defined {
            self.s.report(
                DiagnosticKind::Redeclaration,
                format!("sub '{name}' is already defined"),
                pos,
            );
        }
        self.s.labels = None;

        self.s.symbols.open_scope(true);
        let params: Vec<(String, TypeSeq)> = if signature.variadic {
            vec![(
                self.s.symbols.claim_name("params"),
                TypeSeq::from_tags(&[TypeTag::Array, TypeTag::Unresolved]),
            )]
        } else {
            signature
                .args
                .iter()
                .enumerate()
                .map(|(i, ty)| (self.s.symbols.claim_name(&format!("arg{i}")), ty.clone()))
                .collect()
        };
        let outer_loops = std::mem::take(&mut self.s.loop_depth);
        self.s.function = Some(FunctionState {
            name: name.clone(),
            params: params.clone(),
            next_shift: 0,
            returns: signature.returns.clone(),
            declared_returns: signature.declared_returns,
            variadic: signature.variadic,
        });
        let body = self.block();
        let body_returns = self.block_returns;
        self.s.loop_depth = outer_loops;
        let state = self.s.function.take();
        self.s.symbols.close_scope();
        let body = body?;

        let returns = state.map_or_else(|| signature.returns.clone(), |f| f.returns);
        let returns = match self.s.signatures.get_mut(&name) {
            Some(entry) => {
                entry.defined = true;
                entry.returns = returns;
                entry.return_type()
            }
            None => TypeSeq::void(),
        };
        let header = FunctionHeader {
            java: signature.java,
            params,
            variadic: signature.variadic,
            returns,
        };
        blocks::function(&mut self.s, &header, &body, body_returns);
        if self.trace {
            debug!(sub = %name, line = pos.line, "function");
        }
        Ok(String::new())
    }

    // ── Expressions ────────────────────────────────────────────────

    fn value(&mut self, op: Operand) -> Fragment {
        match op {
            Operand::Value(frag) => frag,
            Operand::Access(access) => collections::resolve(&mut self.s, access),
            Operand::List { items, pos, .. } if items.is_empty() => empty(pos),
            Operand::List { items, pos, .. }
                if items.iter().all(|i| matches!(i.place, Some(Place::Declared(_)))) =>
            {
                Fragment::new("", TypeSeq::void(), pos).with_elements(items)
            }
            Operand::List { items, pairs, pos } => collections::list_literal(&mut self.s, items, pairs, pos),
        }
    }

    /// A value feeding an operator. `my` declarations inside it are split
    /// off in front of the statement.
    fn operand(&mut self, op: Operand) -> Fragment {
        let frag = self.value(op);
        statements::as_operand(&mut self.s, frag)
    }

    /// The elements of a list, or the single value.
    fn items(&mut self, op: Operand) -> Vec<Fragment> {
        match op {
            Operand::List { items, .. } => items,
            other => vec![self.value(other)],
        }
    }

    /// Parse operators binding at least as tightly as `min`.
    fn expr(&mut self, min: u8) -> PResult<Operand> {
        let mut lhs = self.prefix()?;
        loop {
            if matches!(self.peek(), Token::Comma | Token::FatComma) {
                if min > level::COMMA {
                    break;
                }
                lhs = self.comma_list(lhs)?;
                continue;
            }
            let Some(infix) = self.grammar.infix(self.peek()) else {
                break;
            };
            if infix.level < min {
                break;
            }
            let token = self.advance();
            let next = match infix.assoc {
                Assoc::Right => infix.level,
                Assoc::Left | Assoc::NonAssoc => infix.level + 1,
            };
            lhs = self.reduce(lhs, infix, token, next)?;
            if infix.assoc == Assoc::NonAssoc
                && self.grammar.infix(self.peek()).is_some_and(|n| n.level == infix.level)
            {
                return self.unexpected();
            }
        }
        Ok(lhs)
    }

    fn comma_list(&mut self, first: Operand) -> PResult<Operand> {
        let pos = self.span();
        let mut pairs = false;
        let mut items = self.items(first);
        while matches!(self.peek(), Token::Comma | Token::FatComma) {
            pairs |= matches!(self.peek(), Token::FatComma);
            self.advance();
            if !starts_term(self.peek()) {
                break;
            }
            let item = self.expr(level::ASSIGN)?;
            let mut more = self.items(item);
            items.append(&mut more);
        }
        Ok(Operand::List { items, pairs, pos })
    }

    fn reduce(&mut self, lhs: Operand, infix: Infix, token: SpannedToken, next: u8) -> PResult<Operand> {
        match infix.op {
            InfixOp::Bin(op) => {
                let l = self.operand(lhs);
                let r = self.expr(next)?;
                let r = self.operand(r);
                Ok(Operand::Value(ops::binary(&mut self.s, op, l, r)))
            }
            InfixOp::Assign => {
                let Token::Assign(op) = token.token else {
                    return self.unexpected();
                };
                self.assignment(lhs, op, next, token.pos)
            }
            InfixOp::Ternary => {
                let c = self.operand(lhs);
                let a = self.expr(level::ASSIGN)?;
                let a = self.operand(a);
                self.expect(&Token::Colon)?;
                let b = self.expr(level::TERNARY)?;
                let b = self.operand(b);
                Ok(Operand::Value(ops::conditional(&mut self.s, c, a, b)))
            }
            InfixOp::Range => {
                let lo = self.operand(lhs);
                let hi = self.expr(next)?;
                let hi = self.operand(hi);
                Ok(Operand::Value(collections::range(&mut self.s, lo, hi, token.pos)))
            }
            InfixOp::Bind { negate } => self.bind(lhs, negate),
        }
    }

    fn assignment(&mut self, lhs: Operand, op: AssignOp, next: u8, pos: Position) -> PResult<Operand> {
        let rhs = self.expr(next)?;
        match lhs {
            Operand::List { items, pos: list_pos, .. } => {
                if op != AssignOp::Plain {
                    self.s.report(
                        DiagnosticKind::UnsupportedOperator,
                        format!("'{}' on a list", op.symbol()),
                        pos,
                    );
                }
                let source = match rhs {
                    Operand::List { items, .. } => Source::Items(items),
                    other => Source::Value(self.value(other)),
                };
                Ok(Operand::Value(statements::multi_assign(&mut self.s, items, source, list_pos)))
            }
            lhs => {
                let target = self.value(lhs);
                let value = self.operand(rhs);
                let frag = if op == AssignOp::Plain {
                    statements::assign(&mut self.s, target, value)
                } else {
                    ops::compound_assign(&mut self.s, target, op, value)
                };
                Ok(Operand::Value(frag))
            }
        }
    }

    /// `=~` and `!~`. Without a regex literal on the right the value is
    /// used as the pattern.
    fn bind(&mut self, lhs: Operand, negate: bool) -> PResult<Operand> {
        let subject = self.operand(lhs);
        let pos = self.span();
        let frag = match self.peek().clone() {
            Token::Match { pattern, flags } => {
                self.advance();
                let pattern = statements::interpolate(&mut self.s, &pattern, Mode::Pattern, pos);
                ops::regex_match(&mut self.s, subject, &pattern.text, &flags, pos, negate)
            }
            Token::Subst { pattern, replacement, flags } => {
                self.advance();
                if negate {
                    self.s.report(DiagnosticKind::UnsupportedOperator, "'!~' with a substitution", pos);
                }
                let pattern = statements::interpolate(&mut self.s, &pattern, Mode::Pattern, pos);
                let replacement = statements::interpolate(&mut self.s, &replacement, Mode::Replacement, pos);
                ops::regex_subst(&mut self.s, subject, &pattern.text, &replacement.text, &flags, pos)
            }
            Token::Translit { from, to, flags } => {
                self.advance();
                let (from, to) = (escape::java_string(&from), escape::java_string(&to));
                ops::regex_translit(&mut self.s, subject, &from, &to, &flags, pos)
            }
            _ => {
                let pattern = self.expr(level::UNARY)?;
                let pattern = self.value(pattern);
                let pattern = cast::to_string(&mut self.s, pattern);
                ops::regex_match(&mut self.s, subject, &pattern.text, "", pos, negate)
            }
        };
        Ok(Operand::Value(frag))
    }

    fn prefix(&mut self) -> PResult<Operand> {
        let pos = self.span();
        let unary = match self.peek() {
            Token::Bang => Some((UnOp::Not, level::POW)),
            Token::BitNot => Some((UnOp::BitNot, level::POW)),
            Token::Minus => Some((UnOp::Neg, level::POW)),
            Token::Plus => Some((UnOp::Plus, level::POW)),
            Token::LowNot => Some((UnOp::LowNot, level::LOW_NOT + 1)),
            _ => None,
        };
        if let Some((op, min)) = unary {
            self.advance();
            let x = self.expr(min)?;
            let x = self.operand(x);
            return Ok(Operand::Value(ops::unary(&mut self.s, op, x, pos)));
        }
        match self.peek() {
            Token::Backslash => {
                self.advance();
                let target = self.expr(level::POW)?;
                let target = self.value(target);
                Ok(Operand::Value(collections::reference(&mut self.s, target, pos)))
            }
            Token::PlusPlus | Token::MinusMinus => {
                let start = self.pos;
                let increment = matches!(self.peek(), Token::PlusPlus);
                self.advance();
                let target = self.expr(level::INCDEC)?;
                let target = self.value(target);
                let consumed = !self.discarded(start);
                Ok(Operand::Value(ops::incdec(&mut self.s, target, increment, true, consumed, pos)))
            }
            _ => self.postfix(),
        }
    }

    fn postfix(&mut self) -> PResult<Operand> {
        let start = self.pos;
        let mut op = self.primary()?;
        loop {
            match self.peek() {
                Token::LBracket if matches!(op, Operand::Access(_)) => op = self.subscript(op, false)?,
                Token::LBrace if matches!(&op, Operand::Access(a) if !a.ops.is_empty()) => {
                    op = self.subscript(op, true)?;
                }
                Token::Arrow => match self.peek_at(1) {
                    Token::LBracket => {
                        self.advance();
                        op = self.subscript(op, false)?;
                    }
                    Token::LBrace => {
                        self.advance();
                        op = self.subscript(op, true)?;
                    }
                    _ => {
                        self.advance();
                        return self.unexpected();
                    }
                },
                Token::PlusPlus | Token::MinusMinus => {
                    let increment = matches!(self.peek(), Token::PlusPlus);
                    let pos = self.advance().pos;
                    let target = self.value(op);
                    let consumed = !self.discarded(start);
                    op = Operand::Value(ops::incdec(&mut self.s, target, increment, false, consumed, pos));
                }
                _ => return Ok(op),
            }
        }
    }

    /// `[...]` or `{...}` applied to `op`.
    fn subscript(&mut self, op: Operand, hash: bool) -> PResult<Operand> {
        let access = match op {
            Operand::Access(access) => access,
            Operand::Value(frag) => Access::new(frag),
            Operand::List { .. } => return self.unexpected(),
        };
        let pos = self.advance().pos;
        let key = if hash {
            self.hash_key()?
        } else {
            let key = self.expr(level::LOW_OR)?;
            self.value(key)
        };
        self.expect(if hash { &Token::RBrace } else { &Token::RBracket })?;
        Ok(Operand::Access(access.push(AccessOp::Index { hash, key, pos })))
    }

    /// A hash key: a bareword is a string.
    fn hash_key(&mut self) -> PResult<Fragment> {
        let pos = self.span();
        match (self.peek().clone(), self.peek_at(1).clone(), self.peek_at(2).clone()) {
            (Token::Ident(word), Token::RBrace, _) => {
                self.advance();
                Ok(string_literal(&word, pos))
            }
            (Token::Minus, Token::Ident(word), Token::RBrace) => {
                self.advance();
                self.advance();
                Ok(string_literal(&format!("-{word}"), pos))
            }
            _ => {
                let key = self.expr(level::LOW_OR)?;
                Ok(self.value(key))
            }
        }
    }

    fn primary(&mut self) -> PResult<Operand> {
        let index = self.pos;
        let SpannedToken { token, pos } = self.advance();
        let frag = match token {
            Token::Int(n) => int_literal(n, pos),
            Token::Float(f) => float_literal(f, pos),
            Token::Str(text) => string_literal(&text, pos),
            Token::Interp(raw) => statements::interpolate(&mut self.s, &raw, Mode::Text, pos),
            Token::Command(raw) => {
                let command = statements::interpolate(&mut self.s, &raw, Mode::Text, pos);
                let text = format!("{}({})", self.s.runtime("command"), command.text);
                Fragment::scalar(text, TypeTag::String, pos).with_flags(Flags::EFFECT)
            }
            Token::Words(words) => {
                let items = words.iter().map(|w| string_literal(w, pos)).collect();
                collections::list_literal(&mut self.s, items, false, pos)
            }
            Token::Match { pattern, flags } => {
                let pattern = statements::interpolate(&mut self.s, &pattern, Mode::Pattern, pos);
                if self.pattern_at == Some(index) {
                    Fragment::scalar(pattern.text.clone(), TypeTag::String, pos)
                        .with_flags(Flags::PATTERN)
                        .with_alt(pattern.text)
                } else {
                    let topic = statements::read_var(&mut self.s, Sigil::Scalar, "_", pos);
                    ops::regex_match(&mut self.s, topic, &pattern.text, &flags, pos, false)
                }
            }
            Token::Subst { pattern, replacement, flags } => {
                let topic = statements::read_var(&mut self.s, Sigil::Scalar, "_", pos);
                let pattern = statements::interpolate(&mut self.s, &pattern, Mode::Pattern, pos);
                let replacement = statements::interpolate(&mut self.s, &replacement, Mode::Replacement, pos);
                ops::regex_subst(&mut self.s, topic, &pattern.text, &replacement.text, &flags, pos)
            }
            Token::Translit { from, to, flags } => {
                let topic = statements::read_var(&mut self.s, Sigil::Scalar, "_", pos);
                let (from, to) = (escape::java_string(&from), escape::java_string(&to));
                ops::regex_translit(&mut self.s, topic, &from, &to, &flags, pos)
            }
            Token::Stdin => {
                self.s.require(Feature::Input);
                let text = format!("{}(STDIN)", self.s.runtime("readLine"));
                Fragment::scalar(text, TypeTag::String, pos).with_flags(Flags::INPUT | Flags::EFFECT)
            }
            Token::Var(sigil, name) => return self.variable(sigil, &name, pos),
            Token::LastIndex(name) => {
                let array = statements::read_var(&mut self.s, Sigil::Array, &name, pos);
                collections::last_index(&mut self.s, array)
            }
            Token::Capture(n) => statements::capture_group(&mut self.s, n, pos),
            Token::Deref(sigil) => return self.deref(sigil, pos),
            Token::Ident(name) => return self.word(name, pos),
            Token::My => return self.declaration(false, pos),
            Token::Our => return self.declaration(true, pos),
            Token::Undef => {
                if !matches!(self.peek(), Token::Var(..) | Token::Deref(_)) {
                    return Ok(Operand::Value(empty(pos)));
                }
                let target = self.postfix()?;
                let target = self.value(target);
                statements::assign(&mut self.s, target, empty(pos))
            }
            Token::LParen => return self.parenthesized(pos),
            Token::LBracket => {
                let items = self.bracketed(&Token::RBracket)?;
                collections::array_ref_literal(&mut self.s, items, pos)
            }
            Token::LBrace => {
                let items = self.bracketed(&Token::RBrace)?;
                collections::hash_ref_literal(&mut self.s, items, pos)
            }
            Token::Eof => return self.unexpected(),
            _ => {
                self.pos = index;
                return self.unexpected();
            }
        };
        Ok(Operand::Value(frag))
    }

    /// `$x`, `@x`, `%x`; `$x[...]` and `$x{...}` index `@x` and `%x`.
    fn variable(&mut self, sigil: Sigil, name: &str, pos: Position) -> PResult<Operand> {
        let container = match (sigil, self.peek()) {
            (Sigil::Scalar, Token::LBracket) => Some(false),
            (Sigil::Scalar, Token::LBrace) => Some(true),
            _ => None,
        };
        match container {
            Some(hash) => {
                let sigil = if hash { Sigil::Hash } else { Sigil::Array };
                let base = statements::read_var(&mut self.s, sigil, name, pos);
                self.subscript(Operand::Value(base), hash)
            }
            None => Ok(Operand::Value(statements::read_var(&mut self.s, sigil, name, pos))),
        }
    }

    /// `@{EXPR}`, `%$r`, `$$r`. `$$r[0]` indexes the array `$r` refers to.
    fn deref(&mut self, sigil: Sigil, pos: Position) -> PResult<Operand> {
        let inner = match self.peek().clone() {
            Token::LBrace => {
                self.advance();
                let inner = self.expr(level::LOW_OR)?;
                let inner = self.value(inner);
                self.expect(&Token::RBrace)?;
                inner
            }
            Token::Var(Sigil::Scalar, name) => {
                let var_pos = self.advance().pos;
                statements::read_var(&mut self.s, Sigil::Scalar, &name, var_pos)
            }
            Token::Deref(Sigil::Scalar) => {
                let inner_pos = self.advance().pos;
                let inner = self.deref(Sigil::Scalar, inner_pos)?;
                self.value(inner)
            }
            _ => return self.unexpected(),
        };
        if sigil == Sigil::Scalar && matches!(self.peek(), Token::LBracket | Token::LBrace) {
            let hash = matches!(self.peek(), Token::LBrace);
            return self.subscript(Operand::Value(inner), hash);
        }
        Ok(Operand::Access(Access::new(inner).push(AccessOp::Deref { sigil, pos })))
    }

    fn declaration(&mut self, shared: bool, pos: Position) -> PResult<Operand> {
        match self.peek().clone() {
            Token::Var(sigil, name) => {
                let var_pos = self.advance().pos;
                let decl = Declare { name, sigil, pos: var_pos };
                Ok(Operand::Value(statements::declare(&mut self.s, &decl, shared)))
            }
            Token::LParen => {
                self.advance();
                let mut items = Vec::new();
                loop {
                    let Token::Var(sigil, name) = self.peek().clone() else {
                        return self.unexpected();
                    };
                    let var_pos = self.advance().pos;
                    let decl = Declare { name, sigil, pos: var_pos };
                    items.push(statements::declare(&mut self.s, &decl, shared));
                    if !self.eat(&Token::Comma) {
                        break;
                    }
                }
                self.expect(&Token::RParen)?;
                Ok(Operand::List { items, pairs: false, pos })
            }
            _ => self.unexpected(),
        }
    }

    /// `( ... )`. A single parenthesized target before `=` is still a list
    /// assignment.
    fn parenthesized(&mut self, pos: Position) -> PResult<Operand> {
        if self.eat(&Token::RParen) {
            return Ok(Operand::List { items: Vec::new(), pairs: false, pos });
        }
        let inner = self.expr(level::LOW_OR)?;
        self.expect(&Token::RParen)?;
        match inner {
            Operand::List { .. } => Ok(inner),
            single if matches!(self.peek(), Token::Assign(AssignOp::Plain)) => {
                let item = self.value(single);
                Ok(Operand::List { items: vec![item], pairs: false, pos })
            }
            single => Ok(single),
        }
    }

    /// Items up to `close`, which is consumed.
    fn bracketed(&mut self, close: &Token) -> PResult<Vec<Fragment>> {
        if self.eat(close) {
            return Ok(Vec::new());
        }
        let op = self.expr(level::LOW_OR)?;
        let items = self.items(op);
        self.expect(close)?;
        Ok(items)
    }

    /// A bareword: a hash key, a filehandle, a builtin or a sub call.
    fn word(&mut self, name: String, pos: Position) -> PResult<Operand> {
        if self.at(&Token::FatComma) {
            return Ok(Operand::Value(string_literal(&name, pos)));
        }
        if is_handle(&name) {
            return Ok(Operand::Value(handle(&name, pos)));
        }
        if name == "shift" {
            if self.at(&Token::LParen) && matches!(self.peek_at(1), Token::RParen) {
                self.advance();
                self.advance();
                return Ok(Operand::Value(statements::shift_arg(&mut self.s, pos)));
            }
            if !starts_term(self.peek()) && !self.at(&Token::LParen) {
                return Ok(Operand::Value(statements::shift_arg(&mut self.s, pos)));
            }
        }
        if let Some(builtin) = builtins::lookup_builtin(&name) {
            return self.builtin_call(builtin, pos);
        }
        if self.s.signatures.contains_key(&name) {
            let args = self.call_args(Form::List)?;
            let call = statements::call_user(&mut self.s, &name, args, pos)
                .unwrap_or_else(|| Fragment::scalar("null", TypeTag::Unresolved, pos));
            return Ok(Operand::Value(call));
        }
        if let Some((package, function)) = name
            .rsplit_once("::")
            .filter(|(package, _)| !package.is_empty() && self.at(&Token::LParen)) {
            // `A::B::f(...)` calls the static `f` of class `B`, defined elsewhere.
            let class = package.rsplit("::").next().unwrap_or(package);
            let args = self.call_args(Form::List)?;
            let texts: Vec<String> = args.into_iter().map(|a| a.text).collect();
            let text = format!("{class}.{}({})", java_base(function), texts.join(", "));
            return Ok(Operand::Value(
                Fragment::scalar(text, TypeTag::Unresolved, pos).with_flags(Flags::EFFECT),
            ));
        }
        if self.at(&Token::LParen) {
            self.s.report(
                DiagnosticKind::UndeclaredIdentifier,
                format!("'{name}' is not a known function"),
                pos,
            );
            let args = self.call_args(Form::List)?;
            let texts: Vec<String> = args.into_iter().map(|a| a.text).collect();
            let text = format!("{}({})", java_base(&name), texts.join(", "));
            return Ok(Operand::Value(
                Fragment::scalar(text, TypeTag::Unresolved, pos).with_flags(Flags::EFFECT),
            ));
        }
        self.s.report(DiagnosticKind::UndeclaredIdentifier, format!("bareword '{name}'"), pos);
        Ok(Operand::Value(string_literal(&name, pos)))
    }

    /// Arguments of a named operator, with or without parentheses.
    fn call_args(&mut self, form: Form) -> PResult<Vec<Fragment>> {
        if self.eat(&Token::LParen) {
            return self.bracketed(&Token::RParen);
        }
        if !starts_term(self.peek()) {
            return Ok(Vec::new());
        }
        match form {
            Form::Unary => {
                let op = self.expr(level::SHIFT)?;
                Ok(vec![self.value(op)])
            }
            Form::List => {
                let op = self.expr(level::COMMA)?;
                Ok(self.items(op))
            }
        }
    }

    /// `print STDERR LIST`: the handle is not followed by a comma.
    fn print_args(&mut self, form: Form) -> PResult<Vec<Fragment>> {
        let paren = self.at(&Token::LParen);
        let at = usize::from(paren);
        let named = match self.peek_at(at) {
            Token::Ident(name) if is_handle(name) => Some(name.clone()),
            _ => None,
        };
        let Some(name) = named.filter(|_| !matches!(self.peek_at(at + 1), Token::Comma | Token::FatComma)) else {
            return self.call_args(form);
        };
        if paren {
            self.advance();
        }
        let pos = self.advance().pos;
        let mut args = vec![handle(&name, pos)];
        if paren {
            args.append(&mut self.bracketed(&Token::RParen)?);
        } else if starts_term(self.peek()) {
            let op = self.expr(level::COMMA)?;
            args.append(&mut self.items(op));
        }
        Ok(args)
    }

    fn builtin_call(&mut self, builtin: &'static Builtin, pos: Position) -> PResult<Operand> {
        if builtin.name == "sort" {
            return self.sort_call(builtin, pos);
        }
        if builtin.name == "split" {
            self.pattern_at = Some(if self.at(&Token::LParen) { self.pos + 1 } else { self.pos });
        }
        let args = if matches!(builtin.name, "print" | "say" | "printf") {
            self.print_args(builtin.form)
        } else {
            self.call_args(builtin.form)
        };
        self.pattern_at = None;
        let args = args?;
        Ok(Operand::Value(builtins::call(&mut self.s, builtin, args, None, pos)))
    }

    /// `sort { ... } LIST`. The list is parsed first so `$a` and `$b` can
    /// take its element type; then the comparator block is translated.
    fn sort_call(&mut self, builtin: &'static Builtin, pos: Position) -> PResult<Operand> {
        let paren = self.eat(&Token::LParen);
        let block = if self.at(&Token::LBrace) {
            let open = self.pos;
            let Some(close) = self.matching_brace(open) else {
                return self.unexpected();
            };
            self.pos = close + 1;
            self.eat(&Token::Comma);
            Some(open)
        } else {
            None
        };
        let args = if paren {
            self.bracketed(&Token::RParen)?
        } else if starts_term(self.peek()) {
            let op = self.expr(level::COMMA)?;
            self.items(op)
        } else {
            Vec::new()
        };

        let comparator = match block {
            Some(open) => {
                let resume = self.pos;
                self.pos = open + 1;
                let elem = args.first().map_or_else(
                    || TypeSeq::scalar(TypeTag::Unresolved),
                    |list| {
                        let inner = list.ty.inner();
                        if inner.is_void() {
                            list.ty.clone()
                        } else {
                            inner
                        }
                    },
                );
                self.s.symbols.open_scope(false);
                let a = self.s.symbols.declare("$a", elem.clone(), false, false, pos);
                let b = self.s.symbols.declare("$b", elem, false, false, pos);
                let names = (self.s.symbols.get(a.id).java.clone(), self.s.symbols.get(b.id).java.clone());
                let parsed = self.expr(level::LOW_OR);
                self.s.symbols.close_scope();
                let cmp = self.value(parsed?);
                let cmp = cast::to_integer(&mut self.s, cmp);
                self.expect(&Token::RBrace)?;
                self.pos = resume;
                Some(format!("({}, {}) -> {}", names.0, names.1, cmp.text))
            }
            None => None,
        };
        Ok(Operand::Value(builtins::call(&mut self.s, builtin, args, comparator, pos)))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::translate::assemble::Translation;
    use crate::translate::lexer::lex;

    fn run(source: &str) -> Translation {
        let grammar = Grammar::new().unwrap();
        let lexed = lex(source, false);
        let parser = Parser::new(&grammar, lexed.tokens, Session::new(), false);
        parser.parse_program().unwrap().finish("Main")
    }

    fn kinds(t: &Translation) -> Vec<DiagnosticKind> {
        t.diagnostics.iter().map(|d| d.kind).collect()
    }

    #[test]
    fn grammar_table_has_no_duplicates() {
        let g = Grammar::new().unwrap();
        assert_eq!(g.infix(&Token::Star).map(|i| i.level), Some(level::MULTIPLICATIVE));
        assert!(g.infix(&Token::Assign(AssignOp::Add)).is_some());
        assert!(g.infix(&Token::Comma).is_none());
    }

    #[test]
    fn arithmetic_precedence() {
        let t = run("my $x = 3 + 4 * 2;");
        assert_eq!(t.global_code, "int x = 3 + (4 * 2);\n");
        assert!(t.diagnostics.is_empty());
    }

    #[test]
    fn parentheses_regroup() {
        let t = run("my $x = (3 + 4) * 2;");
        assert_eq!(t.global_code, "int x = (3 + 4) * 2;\n");
    }

    #[test]
    fn named_unary_binds_tighter_than_comparison() {
        let t = run("my $s = 'abc'; my $ok = length $s < 5;");
        assert!(t.global_code.contains("boolean ok = s.length() < 5;"));
    }

    #[test]
    fn long_literals_get_a_suffix() {
        let t = run("my $big = 5000000000;");
        assert_eq!(t.global_code, "long big = 5000000000L;\n");
    }

    #[test]
    fn if_elsif_else_chain() {
        let t = run("my $x = 1; my $y = 0;\nif ($x == 1) { $y = 2; } elsif ($x == 2) { $y = 3; } else { $y = 4; }");
        assert!(t.global_code.contains("if (x == 1) {\n    y = 2;\n} else if (x == 2) {\n    y = 3;\n} else {\n    y = 4;\n}\n"));
    }

    #[test]
    fn c_style_for_declares_in_header() {
        let t = run("my $sum = 0;\nfor (my $i = 0; $i < 10; $i++) { $sum += $i; }");
        assert!(t.global_code.contains("for (int i = 0; i < 10; i++) {\n    sum += i;\n}\n"));
    }

    #[test]
    fn foreach_over_a_list() {
        let t = run("my @a = (1, 2, 3);\nforeach my $n (@a) { print $n; }");
        assert!(t.global_code.contains("for (int n : a) {"));
    }

    #[test]
    fn statement_modifier_for_types_the_topic() {
        let t = run("my @a = (1, 2);\nprint $_ for @a;");
        assert!(t.global_code.contains("for (int it : a) {"));
    }

    #[test]
    fn while_reading_stdin_hoists_the_declaration() {
        let t = run("while (my $line = <STDIN>) { print $line; }");
        assert!(t.global_code.starts_with("{\n    String line;\n    while ((line = Pd.readLine(STDIN)) != null) {"));
        assert!(t.features.contains(&Feature::Input));
    }

    #[test]
    fn substitution_writes_back() {
        let t = run("my $s = 'foo';\n$s =~ s/foo/bar/;");
        assert!(t.global_code.contains("s = Regex.subst(s, \"foo\", \"bar\");"));
        assert!(t.features.contains(&Feature::Regex));
    }

    #[test]
    fn substitution_is_positioned_at_the_regex_literal() {
        let grammar = Grammar::new().unwrap();
        let lexed = lex("my $s = 'foo';\n$s =~ s/foo/bar/;", false);
        let at = lexed.tokens.iter().find(|t| matches!(t.token, Token::Subst { .. })).unwrap().pos;
        let mut parser = Parser::new(&grammar, lexed.tokens, Session::new(), false);
        parser.statement().unwrap();
        let op = parser.expr(level::LOW_OR).unwrap();
        let frag = parser.value(op);
        assert_eq!(frag.text, "s = Regex.subst(s, \"foo\", \"bar\")");
        assert_eq!((frag.pos.line, frag.pos.offset), (at.line, at.offset));
        assert_eq!(frag.pos.line, 2);
    }

    #[test]
    fn declaration_under_an_operator_is_split_off() {
        let t = run("my $v = shift or die \"usage\";\nprint $v;");
        assert!(
            t.global_code.starts_with("String v;\nif (!Pd.toBoolean((v = args[0]))) {\n    Pd.die(\"usage\");\n}\n"),
            "{}",
            t.global_code
        );
        assert!(t.global_code.contains("System.out.print(v);"));

        let t = run("my $x = 1;\nmy $y = $x > 0 and $x < 5;");
        assert!(t.global_code.contains("boolean y;\n"), "{}", t.global_code);
        assert!(t.global_code.contains("(y = x > 0) && (x < 5)"), "{}", t.global_code);
        assert!(!t.global_code.contains("boolean y ="));
    }

    #[test]
    fn plain_declarations_stay_inline() {
        let t = run("my $n = 2;\nmy $m = $n;");
        assert_eq!(t.global_code, "int n = 2;\nint m = n;\n");
    }

    #[test]
    fn partly_returning_if_gets_a_fallback_return() {
        let t = run("#<args><int><returns><int>\nsub f { my $n = shift; if ($n) { return 1; } else { $n = 2; } }");
        assert!(t.function_code.contains("    return 0;\n}\n"), "{}", t.function_code);

        let t = run("#<args><int><returns><int>\nsub f { my $n = shift; if ($n) { return 1; } else { return 2; } }");
        assert!(!t.function_code.contains("return 0;"), "{}", t.function_code);
    }

    #[test]
    fn loop_after_returning_if_gets_a_fallback_return() {
        let t = run(
            "#<args><int><returns><int>\nsub f { my $n = shift; if ($n > 5) { return 1; } else { $n = 3; } while ($n) { $n--; } }",
        );
        assert!(t.function_code.contains("    return 0;\n}\n"), "{}", t.function_code);
    }

    #[test]
    fn qualified_call_targets_the_package_class() {
        let t = run("my $r = Util::helper(1);");
        assert!(t.global_code.contains("Util.helper(1)"), "{}", t.global_code);
        assert!(!kinds(&t).contains(&DiagnosticKind::UndeclaredIdentifier));
        let t = run("my $r = Acme::Util::helper(1, 2);");
        assert!(t.global_code.contains("Util.helper(1, 2)"), "{}", t.global_code);
    }

    #[test]
    fn sort_with_comparator() {
        let t = run("my @a = (3, 1, 2);\nmy @b = sort { $a <=> $b } @a;");
        assert!(t.global_code.contains("(a_1, b_1) -> Integer.compare(a_1, b_1)"), "{}", t.global_code);
    }

    #[test]
    fn sub_with_annotation() {
        let t = run("#<args><int><int><returns><int>\nsub add { my ($x, $y) = @_; return $x + $y; }\nmy $r = add(1, 2);");
        assert!(t.function_code.starts_with("public static int add(int arg0, int arg1) {"));
        assert!(t.global_code.contains("int r = add(1, 2);"));
    }

    #[test]
    fn calls_may_precede_definitions() {
        let t = run("greet();\nsub greet { print \"hi\\n\"; }");
        assert!(t.global_code.contains("greet();"));
        assert!(!kinds(&t).contains(&DiagnosticKind::UndeclaredIdentifier));
    }

    #[test]
    fn package_names_the_class() {
        let t = run("package My::Tool;\nmy $x = 1;");
        assert_eq!(t.package.class_name, "Tool");
        assert_eq!(t.package.java_package.as_deref(), Some("my"));
    }

    #[test]
    fn late_package_is_fatal() {
        let grammar = Grammar::new().unwrap();
        let lexed = lex("my $x = 1;\npackage Foo;", false);
        let result = Parser::new(&grammar, lexed.tokens, Session::new(), false).parse_program();
        assert!(matches!(result, Err(TranslateError::MalformedPackage { line: 2, .. })));
    }

    #[test]
    fn recovery_keeps_following_statements() {
        let t = run("my $x = 1;\nmy $y = ;\nmy $z = 2;\n$x = $z;");
        assert_eq!(kinds(&t), vec![DiagnosticKind::SyntaxToken]);
        assert!(t.global_code.contains("int x = 1;"));
        assert!(t.global_code.contains("int z = 2;"));
        assert!(t.global_code.contains("x = z;"));
    }

    #[test]
    fn unclosed_block_reports_end_of_input_once() {
        let t = run("my $x = 1;\nif ($x) {\n$x = 2;\n$x = 3;");
        assert_eq!(kinds(&t), vec![DiagnosticKind::SyntaxEof]);
        assert!(t.global_code.contains("x = 3;"));
    }

    #[test]
    fn stray_brace_is_skipped() {
        let t = run("my $x = 1;\n}\n$x = 2;");
        assert_eq!(kinds(&t), vec![DiagnosticKind::SyntaxToken]);
        assert!(t.global_code.contains("x = 2;"));
    }

    #[test]
    fn chained_comparison_is_rejected() {
        let t = run("my $x = 1;\nmy $b = 1 < $x < 3;");
        assert_eq!(kinds(&t), vec![DiagnosticKind::SyntaxToken]);
    }

    #[test]
    fn last_outside_loop_is_reported() {
        let t = run("last;");
        assert_eq!(kinds(&t), vec![DiagnosticKind::MisplacedStatement]);
    }

    #[test]
    fn comments_pass_through() {
        let t = run("# setup\nmy $x = 1;");
        assert_eq!(t.global_code, "// setup\nint x = 1;\n");
    }
}
