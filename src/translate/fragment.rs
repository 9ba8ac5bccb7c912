//! The unit every semantic action produces: emitted Java text with its
//! static type, position and a few flags.

use std::ops::BitOr;

use super::lexer::Sigil;
use super::position::Position;
use super::symbols::SymbolId;
use super::types::{TypeSeq, TypeTag};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Flags(u16);

impl Flags {
    pub const NONE: Flags = Flags(0);
    /// `last`
    pub const LAST: Flags = Flags(1);
    /// `next`
    pub const NEXT: Flags = Flags(1 << 1);
    pub const RETURN: Flags = Flags(1 << 2);
    /// A bare variable reference.
    pub const VARIABLE: Flags = Flags(1 << 3);
    /// Usable as a Java expression statement (assignment, call, `++`).
    pub const STATEMENT: Flags = Flags(1 << 4);
    /// Evaluating the text has side effects.
    pub const EFFECT: Flags = Flags(1 << 5);
    /// The text is already one or more complete Java statements.
    pub const BLOCK: Flags = Flags(1 << 6);
    /// The positional argument list of the enclosing function.
    pub const ARGS: Flags = Flags(1 << 7);
    /// A list literal written with `=>`; `alt` holds the hash form.
    pub const PAIRS: Flags = Flags(1 << 8);
    /// A line read from input, `null` at end of input.
    pub const INPUT: Flags = Flags(1 << 9);
    /// A bare pattern literal; `alt` holds the quoted pattern.
    pub const PATTERN: Flags = Flags(1 << 10);
    /// The empty list `()`.
    pub const EMPTY: Flags = Flags(1 << 11);
    /// `STDOUT`/`STDERR` before a print list.
    pub const FILEHANDLE: Flags = Flags(1 << 12);
    /// `T x = v` declaring a local; `alt` holds the bare `x = v`.
    pub const DECLARATION: Flags = Flags(1 << 13);

    pub fn contains(self, other: Flags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn without(self, other: Flags) -> Flags {
        Flags(self.0 & !other.0)
    }

    /// The flags that survive composition into a larger expression.
    pub fn inherited(self) -> Flags {
        Flags(self.0 & Flags::EFFECT.0)
    }
}

impl BitOr for Flags {
    type Output = Flags;

    fn bitor(self, rhs: Flags) -> Flags {
        Flags(self.0 | rhs.0)
    }
}

/// Where a value can be written back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Place {
    /// A Java lvalue: a local, a field or an array element.
    Direct(String),
    /// An element reached through a setter: `h.put(k, v)`, `l.set(i, v)`.
    Element { container: String, key: String, dim: TypeTag },
    /// The target of a reference: `r.set(v)`.
    Deref(String),
    /// A declaration still waiting for its initializer.
    Declared(SymbolId),
}

impl Place {
    /// Java text storing `value`; `None` for a pending declaration.
    pub fn store(&self, value: &str) -> Option<String> {
        match self {
            Place::Direct(lvalue) => Some(format!("{lvalue} = {value}")),
            Place::Element { container, key, dim: TypeTag::Hash } => Some(format!("{container}.put({key}, {value})")),
            Place::Element { container, key, .. } => Some(format!("{container}.set({key}, {value})")),
            Place::Deref(target) => Some(format!("{target}.set({value})")),
            Place::Declared(_) => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Fragment {
    pub text: String,
    pub ty: TypeSeq,
    pub pos: Position,
    /// Alternate rendering, e.g. the array form of a list literal.
    pub alt: Option<String>,
    pub flags: Flags,
    /// Set when the fragment denotes a writable location.
    pub place: Option<Place>,
    /// Items of a collection literal, kept so the literal can be rebuilt
    /// for a declared element type.
    pub elements: Option<Vec<Fragment>>,
}

impl Fragment {
    pub fn new(text: impl Into<String>, ty: TypeSeq, pos: Position) -> Self {
        Self {
            text: text.into(),
            ty,
            pos,
            alt: None,
            flags: Flags::NONE,
            place: None,
            elements: None,
        }
    }

    pub fn scalar(text: impl Into<String>, tag: TypeTag, pos: Position) -> Self {
        Self::new(text, TypeSeq::scalar(tag), pos)
    }

    /// Complete statement text; carries no value.
    pub fn statement(text: impl Into<String>, pos: Position) -> Self {
        Self::new(text, TypeSeq::void(), pos).with_flags(Flags::BLOCK)
    }

    pub fn with_flags(mut self, flags: Flags) -> Self {
        self.flags = self.flags | flags;
        self
    }

    pub fn with_alt(mut self, alt: impl Into<String>) -> Self {
        self.alt = Some(alt.into());
        self
    }

    pub fn with_place(mut self, place: Place) -> Self {
        self.place = Some(place);
        self
    }

    pub fn with_elements(mut self, elements: Vec<Fragment>) -> Self {
        self.elements = Some(elements);
        self
    }

    pub fn is(&self, flag: Flags) -> bool {
        self.flags.contains(flag)
    }

    /// The text, parenthesised when it is not a single operand.
    pub fn operand(&self) -> String {
        paren(&self.text)
    }
}

/// One name introduced by a declaration list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declare {
    pub name: String,
    pub sigil: Sigil,
    pub pos: Position,
}

impl Declare {
    /// Scalars are value declarations; arrays and hashes are dimensions.
    pub fn is_value(&self) -> bool {
        self.sigil == Sigil::Scalar
    }
}

/// A variable with pending subscripts and dereferences, resolved once it is
/// known whether the access is read or written.
#[derive(Debug, Clone)]
pub struct Access {
    pub base: Fragment,
    pub ops: Vec<AccessOp>,
}

#[derive(Debug, Clone)]
pub enum AccessOp {
    Index { hash: bool, key: Fragment, pos: Position },
    Deref { sigil: Sigil, pos: Position },
}

impl Access {
    pub fn new(base: Fragment) -> Self {
        Self { base, ops: Vec::new() }
    }

    pub fn push(mut self, op: AccessOp) -> Self {
        self.ops.push(op);
        self
    }

    pub fn pos(&self) -> Position {
        self.ops.last().map_or(self.base.pos, |op| match op {
            AccessOp::Index { pos, .. } | AccessOp::Deref { pos, .. } => self.base.pos.merge(*pos),
        })
    }
}

pub fn paren(text: &str) -> String {
    if needs_parens(text) {
        format!("({text})")
    } else {
        text.to_string()
    }
}

/// True when `text` has an operator or space outside brackets and string
/// literals, so embedding it in a larger expression could regroup it.
pub fn needs_parens(text: &str) -> bool {
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in text.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' | '\'' => in_string = c == '"',
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth -= 1,
            '-' if i == 0 => {}
            ' ' | '+' | '-' | '*' | '/' | '%' | '<' | '>' | '=' | '!' | '&' | '|' | '^' | '?' | ':' | '~'
                if depth == 0 =>
            {
                return true;
            }
            _ => {}
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atomic_texts_stay_bare() {
        assert!(!needs_parens("x"));
        assert!(!needs_parens("a[i + 1]"));
        assert!(!needs_parens("h.get(\"a b\")"));
        assert!(!needs_parens("-1"));
        assert!(!needs_parens("Math.pow(a, b)"));
    }

    #[test]
    fn compound_texts_are_wrapped() {
        assert_eq!(paren("a + b"), "(a + b)");
        assert_eq!(paren("(int) x"), "((int) x)");
        assert_eq!(paren("!done"), "(!done)");
        assert_eq!(paren("new PerlList<>(1, 2)"), "(new PerlList<>(1, 2))");
    }

    #[test]
    fn places_store_through_setters() {
        let h = Place::Element { container: "h".into(), key: "\"k\"".into(), dim: TypeTag::Hash };
        assert_eq!(h.store("1").as_deref(), Some("h.put(\"k\", 1)"));
        let l = Place::Element { container: "l".into(), key: "0".into(), dim: TypeTag::List };
        assert_eq!(l.store("v").as_deref(), Some("l.set(0, v)"));
        assert_eq!(Place::Direct("a[0]".into()).store("2").as_deref(), Some("a[0] = 2"));
    }

    #[test]
    fn flags_compose() {
        let f = Flags::STATEMENT | Flags::EFFECT;
        assert!(f.contains(Flags::EFFECT));
        assert!(!f.without(Flags::EFFECT).contains(Flags::EFFECT));
        assert_eq!(f.inherited(), Flags::EFFECT);
    }
}
