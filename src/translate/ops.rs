//! Operator resolution: picks the Java form of each source operator from
//! the static types of its operands.
//!
//! Every resolver is a pure function of (operator, operand types); the same
//! pair always yields the same text shape and result type.

use super::cast::{self, unify};
use super::error::DiagnosticKind;
use super::fragment::{Flags, Fragment, Place};
use super::lexer::AssignOp;
use super::position::Position;
use super::session::{Feature, Session};
use super::types::{TypeSeq, TypeTag};

/// Operand types that `+`-class operators accept through a conversion
/// instead of a native operator.
pub const FALLBACK_BAND: &[TypeTag] = &[TypeTag::Boolean, TypeTag::String];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Concat,
    Repeat,
    NumEq,
    NumNe,
    NumLt,
    NumLe,
    NumGt,
    NumGe,
    NumCmp,
    StrEq,
    StrNe,
    StrLt,
    StrLe,
    StrGt,
    StrGe,
    StrCmp,
    Smart,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    And,
    Or,
    LowAnd,
    LowOr,
    LowXor,
}

impl BinOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Mod => "%",
            BinOp::Pow => "**",
            BinOp::Concat => ".",
            BinOp::Repeat => "x",
            BinOp::NumEq => "==",
            BinOp::NumNe => "!=",
            BinOp::NumLt => "<",
            BinOp::NumLe => "<=",
            BinOp::NumGt => ">",
            BinOp::NumGe => ">=",
            BinOp::NumCmp => "<=>",
            BinOp::StrEq => "eq",
            BinOp::StrNe => "ne",
            BinOp::StrLt => "lt",
            BinOp::StrLe => "le",
            BinOp::StrGt => "gt",
            BinOp::StrGe => "ge",
            BinOp::StrCmp => "cmp",
            BinOp::Smart => "~~",
            BinOp::BitAnd => "&",
            BinOp::BitOr => "|",
            BinOp::BitXor => "^",
            BinOp::Shl => "<<",
            BinOp::Shr => ">>",
            BinOp::And => "&&",
            BinOp::Or => "||",
            BinOp::LowAnd => "and",
            BinOp::LowOr => "or",
            BinOp::LowXor => "xor",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Neg,
    Plus,
    Not,
    LowNot,
    BitNot,
}

/// Resolve a binary operator.
pub fn binary(s: &mut Session, op: BinOp, l: Fragment, r: Fragment) -> Fragment {
    let pos = l.pos.merge(r.pos);
    match op {
        BinOp::Add | BinOp::Sub | BinOp::Mul => arithmetic(s, op.symbol(), l, r, FALLBACK_BAND, pos),
        BinOp::Div => divide(s, l, r, pos),
        BinOp::Mod => modulo(s, l, r, pos),
        BinOp::Pow => power(s, l, r, pos),
        BinOp::Concat => concat(s, l, r, pos),
        BinOp::Repeat => repeat(s, l, r, pos),
        BinOp::NumEq | BinOp::NumNe | BinOp::NumLt | BinOp::NumLe | BinOp::NumGt | BinOp::NumGe => {
            num_compare(s, op.symbol(), l, r, pos)
        }
        BinOp::NumCmp => num_sign(s, l, r, pos),
        BinOp::StrEq => str_compare(s, "==", l, r, pos),
        BinOp::StrNe => str_compare(s, "!=", l, r, pos),
        BinOp::StrLt => str_compare(s, "<", l, r, pos),
        BinOp::StrLe => str_compare(s, "<=", l, r, pos),
        BinOp::StrGt => str_compare(s, ">", l, r, pos),
        BinOp::StrGe => str_compare(s, ">=", l, r, pos),
        BinOp::StrCmp => str_sign(s, l, r, pos),
        BinOp::Smart => smart_match(s, l, r, pos),
        BinOp::BitAnd | BinOp::BitOr | BinOp::BitXor | BinOp::Shl | BinOp::Shr => bitwise(s, op.symbol(), l, r, pos),
        BinOp::And => logical(s, true, true, l, r, pos),
        BinOp::Or => logical(s, false, true, l, r, pos),
        BinOp::LowAnd => logical(s, true, false, l, r, pos),
        BinOp::LowOr => logical(s, false, false, l, r, pos),
        BinOp::LowXor => logical_xor(s, l, r, pos),
    }
}

fn joined_flags(l: &Fragment, r: &Fragment) -> Flags {
    l.flags.inherited() | r.flags.inherited()
}

fn result(text: String, tag: TypeTag, flags: Flags, pos: Position) -> Fragment {
    Fragment::scalar(text, tag, pos).with_flags(flags)
}

fn void_operand(s: &mut Session, symbol: &str, pos: Position) -> Fragment {
    s.report(
        DiagnosticKind::UnsupportedOperator,
        format!("operand of '{symbol}' has no value"),
        pos,
    );
    Fragment::scalar("0", TypeTag::Integer, pos)
}

/// Bring an operand to a numeric type. Tags in `band` convert silently;
/// other text-like operands are reported but still converted.
fn numeric(s: &mut Session, symbol: &str, f: Fragment, band: &[TypeTag]) -> Fragment {
    let Some(tag) = f.ty.head() else {
        return void_operand(s, symbol, f.pos);
    };
    if f.ty.is_numeric() {
        return f;
    }
    if matches!(tag, TypeTag::Boolean | TypeTag::String) && !band.contains(&tag) {
        s.report(
            DiagnosticKind::UnsupportedOperator,
            format!("'{symbol}' does not apply to {}", f.ty),
            f.pos,
        );
    }
    let target = match tag {
        TypeTag::Boolean => TypeTag::Integer,
        t if t.is_dimension() && t != TypeTag::Ref => TypeTag::Integer,
        _ => TypeTag::Double,
    };
    cast::cast(s, f, &TypeSeq::scalar(target))
}

fn promoted(l: &Fragment, r: &Fragment) -> TypeTag {
    match (l.ty.head(), r.ty.head()) {
        (Some(a), Some(b)) => a.promote(b).unwrap_or(TypeTag::Double),
        _ => TypeTag::Double,
    }
}

/// `+ - *`: native when both operands are numbers.
pub fn arithmetic(s: &mut Session, symbol: &str, l: Fragment, r: Fragment, band: &[TypeTag], pos: Position) -> Fragment {
    let flags = joined_flags(&l, &r);
    let l = numeric(s, symbol, l, band);
    let r = numeric(s, symbol, r, band);
    let tag = promoted(&l, &r);
    result(format!("{} {symbol} {}", l.operand(), r.operand()), tag, flags, pos)
}

/// `/` always divides as floating point.
pub fn divide(s: &mut Session, l: Fragment, r: Fragment, pos: Position) -> Fragment {
    let flags = joined_flags(&l, &r);
    let l = numeric(s, "/", l, FALLBACK_BAND);
    let r = numeric(s, "/", r, FALLBACK_BAND);
    let tag = promoted(&l, &r);
    let text = if tag.is_integral() {
        format!("{} / (double) {}", l.operand(), r.operand())
    } else {
        format!("{} / {}", l.operand(), r.operand())
    };
    let tag = if tag == TypeTag::Float { TypeTag::Float } else { TypeTag::Double };
    result(text, tag, flags, pos)
}

/// `%` works on integers and takes the sign of the right operand.
pub fn modulo(s: &mut Session, l: Fragment, r: Fragment, pos: Position) -> Fragment {
    let flags = joined_flags(&l, &r);
    let l = numeric(s, "%", l, FALLBACK_BAND);
    let r = numeric(s, "%", r, FALLBACK_BAND);
    let tag = if l.ty.is(TypeTag::Long) || r.ty.is(TypeTag::Long) {
        TypeTag::Long
    } else {
        TypeTag::Integer
    };
    let ty = TypeSeq::scalar(tag);
    let l = cast::cast(s, l, &ty);
    let r = cast::cast(s, r, &ty);
    result(format!("Math.floorMod({}, {})", l.text, r.text), tag, flags, pos)
}

/// `**` has no Java operator.
pub fn power(s: &mut Session, l: Fragment, r: Fragment, pos: Position) -> Fragment {
    let flags = joined_flags(&l, &r);
    let l = numeric(s, "**", l, FALLBACK_BAND);
    let r = numeric(s, "**", r, FALLBACK_BAND);
    result(format!("Math.pow({}, {})", l.text, r.text), TypeTag::Double, flags, pos)
}

/// `.` concatenation.
pub fn concat(s: &mut Session, l: Fragment, r: Fragment, pos: Position) -> Fragment {
    let flags = joined_flags(&l, &r);
    if l.ty.is_void() || r.ty.is_void() {
        return void_operand(s, ".", pos);
    }
    let l = if l.ty.is(TypeTag::String) || r.ty.is(TypeTag::String) {
        l
    } else {
        cast::to_string(s, l)
    };
    let r = if r.ty.is_scalar() { r } else { cast::to_string(s, r) };
    result(format!("{} + {}", l.operand(), r.operand()), TypeTag::String, flags, pos)
}

/// `x` string repetition.
pub fn repeat(s: &mut Session, l: Fragment, r: Fragment, pos: Position) -> Fragment {
    let flags = joined_flags(&l, &r);
    let l = cast::to_string(s, l);
    let r = cast::to_integer(s, r);
    result(format!("{}.repeat({})", l.operand(), r.text), TypeTag::String, flags, pos)
}

pub fn num_compare(s: &mut Session, symbol: &str, l: Fragment, r: Fragment, pos: Position) -> Fragment {
    let flags = joined_flags(&l, &r);
    let l = numeric(s, symbol, l, FALLBACK_BAND);
    let r = numeric(s, symbol, r, FALLBACK_BAND);
    result(format!("{} {symbol} {}", l.operand(), r.operand()), TypeTag::Boolean, flags, pos)
}

/// `<=>`: the sign of a numeric comparison.
pub fn num_sign(s: &mut Session, l: Fragment, r: Fragment, pos: Position) -> Fragment {
    let flags = joined_flags(&l, &r);
    let l = numeric(s, "<=>", l, FALLBACK_BAND);
    let r = numeric(s, "<=>", r, FALLBACK_BAND);
    let class = match promoted(&l, &r) {
        TypeTag::Integer => "Integer",
        TypeTag::Long => "Long",
        _ => "Double",
    };
    result(format!("{class}.compare({}, {})", l.text, r.text), TypeTag::Integer, flags, pos)
}

fn string_call(s: &mut Session, l: Fragment, r: Fragment) -> String {
    let l = cast::to_string(s, l);
    let r = cast::to_string(s, r);
    format!("{}({}, {})", s.runtime("cmp"), l.text, r.text)
}

/// `eq ne lt le gt ge`: the comparison call tested against zero.
pub fn str_compare(s: &mut Session, sign: &str, l: Fragment, r: Fragment, pos: Position) -> Fragment {
    let flags = joined_flags(&l, &r);
    let call = string_call(s, l, r);
    result(format!("{call} {sign} 0"), TypeTag::Boolean, flags, pos)
}

/// `cmp`: the raw comparison result.
pub fn str_sign(s: &mut Session, l: Fragment, r: Fragment, pos: Position) -> Fragment {
    let flags = joined_flags(&l, &r);
    let call = string_call(s, l, r);
    result(call, TypeTag::Integer, flags, pos)
}

pub fn smart_match(s: &mut Session, l: Fragment, r: Fragment, pos: Position) -> Fragment {
    let flags = joined_flags(&l, &r);
    let text = format!("{}({}, {})", s.runtime("smartMatch"), l.text, r.text);
    result(text, TypeTag::Boolean, flags, pos)
}

/// `& | ^ << >>` need integer operands.
pub fn bitwise(s: &mut Session, symbol: &str, l: Fragment, r: Fragment, pos: Position) -> Fragment {
    let flags = joined_flags(&l, &r);
    let l = numeric(s, symbol, l, &[TypeTag::Boolean]);
    let r = numeric(s, symbol, r, &[TypeTag::Boolean]);
    let tag = if l.ty.is(TypeTag::Long) || r.ty.is(TypeTag::Long) {
        TypeTag::Long
    } else {
        TypeTag::Integer
    };
    let ty = TypeSeq::scalar(tag);
    let l = cast::cast(s, l, &ty);
    let r = cast::cast(s, r, &ty);
    result(format!("{} {symbol} {}", l.operand(), r.operand()), tag, flags, pos)
}

/// Statement text for a fragment used as a statement.
pub fn as_statement(f: &Fragment) -> String {
    if f.is(Flags::BLOCK) {
        f.text.clone()
    } else {
        format!("{};\n", f.text)
    }
}

/// `&& || and or`. A right operand without a value (`open(...) or die`)
/// turns the expression into a guarded statement. The symbolic forms
/// (`strict`) keep the source semantics of returning an operand's value
/// when both sides share a non-boolean type: `$x || 5`.
pub fn logical(s: &mut Session, is_and: bool, strict: bool, l: Fragment, r: Fragment, pos: Position) -> Fragment {
    let flags = joined_flags(&l, &r);
    let symbol = if is_and { "&&" } else { "||" };

    if l.ty.is_void() {
        // Statements such as `print` succeed, so `or` skips the right side.
        let mut text = as_statement(&l);
        if is_and {
            text.push_str(&as_statement(&r));
        }
        return Fragment::statement(text, pos).with_flags(flags | Flags::EFFECT);
    }
    if r.ty.is_void() {
        let cond = cast::to_boolean(s, l);
        let test = if is_and { cond.operand() } else { format!("!{}", cond.operand()) };
        let body = super::blocks::indent(&as_statement(&r));
        let text = format!("if ({test}) {{\n{body}}}\n");
        return Fragment::statement(text, pos).with_flags(flags | Flags::EFFECT);
    }

    let keeps_value = strict
        && !l.ty.is(TypeTag::Boolean)
        && l.ty.is_scalar()
        && !l.is(Flags::EFFECT)
        && !unify(&l.ty, &r.ty).is(TypeTag::Unresolved);
    if keeps_value {
        let ty = unify(&l.ty, &r.ty);
        let value = l.clone();
        let test = cast::to_boolean(s, l);
        let value = cast::cast(s, value, &ty);
        let other = cast::cast(s, r, &ty);
        let text = if is_and {
            format!("{} ? {} : {}", test.operand(), other.operand(), value.operand())
        } else {
            format!("{} ? {} : {}", test.operand(), value.operand(), other.operand())
        };
        return Fragment::new(text, ty, pos).with_flags(flags);
    }

    let l = cast::to_boolean(s, l);
    let r = cast::to_boolean(s, r);
    result(format!("{} {symbol} {}", l.operand(), r.operand()), TypeTag::Boolean, flags, pos)
}

/// `xor` has no short-circuit Java form: compare the truth values.
pub fn logical_xor(s: &mut Session, l: Fragment, r: Fragment, pos: Position) -> Fragment {
    let flags = joined_flags(&l, &r);
    let l = cast::to_boolean(s, l);
    let r = cast::to_boolean(s, r);
    result(format!("{} != {}", l.operand(), r.operand()), TypeTag::Boolean, flags, pos)
}

pub fn unary(s: &mut Session, op: UnOp, x: Fragment, pos: Position) -> Fragment {
    let pos = pos.merge(x.pos);
    let flags = x.flags.inherited();
    match op {
        UnOp::Not | UnOp::LowNot => {
            let x = cast::to_boolean(s, x);
            result(format!("!{}", x.operand()), TypeTag::Boolean, flags, pos)
        }
        UnOp::Neg if x.ty.is(TypeTag::String) && x.text.starts_with('"') => {
            // `-foo` on a bareword string prefixes the dash.
            result(format!("\"-\" + {}", x.text), TypeTag::String, flags, pos)
        }
        UnOp::Neg => {
            let x = numeric(s, "-", x, FALLBACK_BAND);
            let tag = x.ty.head().unwrap_or(TypeTag::Double);
            result(format!("-{}", x.operand()), tag, flags, pos)
        }
        UnOp::Plus => x,
        UnOp::BitNot => {
            let x = numeric(s, "~", x, &[TypeTag::Boolean]);
            let tag = if x.ty.is(TypeTag::Long) { TypeTag::Long } else { TypeTag::Integer };
            let x = cast::cast(s, x, &TypeSeq::scalar(tag));
            result(format!("~{}", x.operand()), tag, flags, pos)
        }
    }
}

/// `c ? a : b` with both branches brought to a common type.
pub fn conditional(s: &mut Session, c: Fragment, a: Fragment, b: Fragment) -> Fragment {
    let pos = c.pos.merge(b.pos);
    let flags = c.flags.inherited() | joined_flags(&a, &b);
    let c = cast::to_boolean(s, c);
    if a.ty.is_void() || b.ty.is_void() {
        let then = super::blocks::indent(&as_statement(&a));
        let other = super::blocks::indent(&as_statement(&b));
        let text = format!("if ({}) {{\n{then}}} else {{\n{other}}}\n", c.text);
        return Fragment::statement(text, pos).with_flags(flags | Flags::EFFECT);
    }
    let ty = unify(&a.ty, &b.ty);
    let a = cast::cast(s, a, &ty);
    let b = cast::cast(s, b, &ty);
    Fragment::new(format!("{} ? {} : {}", c.operand(), a.operand(), b.operand()), ty, pos).with_flags(flags)
}

/// `=~ m//` and `!~ m//`. `pattern` is a Java string expression.
pub fn regex_match(s: &mut Session, subject: Fragment, pattern: &str, flags: &str, pos: Position, negate: bool) -> Fragment {
    s.require(Feature::Regex);
    let effect = subject.flags.inherited();
    let subject = cast::to_string(s, subject);
    let call = if flags.is_empty() {
        format!("Regex.match({}, {pattern})", subject.text)
    } else {
        format!("Regex.match({}, {pattern}, \"{flags}\")", subject.text)
    };
    let text = if negate { format!("!{call}") } else { call };
    result(text, TypeTag::Boolean, effect | Flags::EFFECT, pos)
}

fn modify_in_place(s: &mut Session, subject: Fragment, call: String, what: &str, pos: Position) -> Fragment {
    match subject.place.as_ref().and_then(|p| p.store(&call)) {
        Some(text) => result(text, TypeTag::String, Flags::STATEMENT | Flags::EFFECT, pos),
        None => {
            s.report(
                DiagnosticKind::UnsupportedOperator,
                format!("{what} needs a variable to modify, found {}", subject.text),
                pos,
            );
            result(call, TypeTag::String, Flags::EFFECT, pos)
        }
    }
}

/// `=~ s///`: substitute and store the result back into the subject.
/// With the `r` flag the new string is returned instead.
pub fn regex_subst(
    s: &mut Session,
    subject: Fragment,
    pattern: &str,
    replacement: &str,
    flags: &str,
    pos: Position,
) -> Fragment {
    s.require(Feature::Regex);
    let keep = flags.contains('r');
    let flags: String = flags.chars().filter(|&c| c != 'r').collect();
    let value = cast::to_string(s, subject.clone());
    let call = if flags.is_empty() {
        format!("Regex.subst({}, {pattern}, {replacement})", value.text)
    } else {
        format!("Regex.subst({}, {pattern}, {replacement}, \"{flags}\")", value.text)
    };
    if keep {
        return result(call, TypeTag::String, Flags::EFFECT, pos);
    }
    modify_in_place(s, subject, call, "substitution", pos)
}

/// `=~ tr///`.
pub fn regex_translit(s: &mut Session, subject: Fragment, from: &str, to: &str, flags: &str, pos: Position) -> Fragment {
    s.require(Feature::Regex);
    let value = cast::to_string(s, subject.clone());
    let call = if flags.is_empty() {
        format!("Regex.tr({}, {from}, {to})", value.text)
    } else {
        format!("Regex.tr({}, {from}, {to}, \"{flags}\")", value.text)
    };
    modify_in_place(s, subject, call, "transliteration", pos)
}

/// `++`/`--` in either position. `consumed` is false when the value is
/// discarded, in which case prefix and postfix emit the same form.
pub fn incdec(s: &mut Session, target: Fragment, increment: bool, prefix: bool, consumed: bool, pos: Position) -> Fragment {
    let pos = pos.merge(target.pos);
    let symbol = if increment { "++" } else { "--" };
    let flags = Flags::STATEMENT | Flags::EFFECT;
    let Some(place) = target.place.clone().filter(|p| !matches!(p, Place::Declared(_))) else {
        s.report(
            DiagnosticKind::UnsupportedOperator,
            format!("'{symbol}' needs a variable, found {}", target.text),
            pos,
        );
        return target;
    };

    if target.ty.is(TypeTag::String) && increment {
        let call = format!("{}({})", s.runtime("increment"), target.text);
        let text = place.store(&call).unwrap_or(call);
        return Fragment::new(text, target.ty.clone(), pos).with_flags(flags);
    }
    if !target.ty.is_numeric() {
        s.report(
            DiagnosticKind::UnsupportedOperator,
            format!("'{symbol}' does not apply to {}", target.ty),
            pos,
        );
        return target;
    }

    let text = match &place {
        Place::Direct(lvalue) if prefix && consumed => format!("{symbol}{lvalue}"),
        Place::Direct(lvalue) => format!("{lvalue}{symbol}"),
        _ => {
            let step = if increment { "+" } else { "-" };
            let updated = format!("{} {step} 1", target.operand());
            let store = place.store(&updated).unwrap_or(updated);
            // Setters return the previous value.
            if prefix && consumed {
                format!("{} {step} 1", super::fragment::paren(&store))
            } else {
                store
            }
        }
    };
    Fragment::new(text, target.ty.clone(), pos).with_flags(flags)
}

/// How a compound assignment resolves: the binary operator it wraps and
/// the target types for which Java's own compound operator is equivalent.
#[derive(Debug, Clone, Copy)]
pub struct CompoundSpec {
    pub assign: AssignOp,
    pub op: BinOp,
    pub native: &'static [TypeTag],
}

const NUMBERS: &[TypeTag] = &[TypeTag::Integer, TypeTag::Long, TypeTag::Float, TypeTag::Double];
const FLOATS: &[TypeTag] = &[TypeTag::Float, TypeTag::Double];
const INTEGERS: &[TypeTag] = &[TypeTag::Integer, TypeTag::Long];

pub const COMPOUND: &[CompoundSpec] = &[
    CompoundSpec { assign: AssignOp::Add, op: BinOp::Add, native: NUMBERS },
    CompoundSpec { assign: AssignOp::Sub, op: BinOp::Sub, native: NUMBERS },
    CompoundSpec { assign: AssignOp::Mul, op: BinOp::Mul, native: NUMBERS },
    CompoundSpec { assign: AssignOp::Div, op: BinOp::Div, native: FLOATS },
    CompoundSpec { assign: AssignOp::Mod, op: BinOp::Mod, native: &[] },
    CompoundSpec { assign: AssignOp::Pow, op: BinOp::Pow, native: &[] },
    CompoundSpec { assign: AssignOp::BitAnd, op: BinOp::BitAnd, native: INTEGERS },
    CompoundSpec { assign: AssignOp::BitOr, op: BinOp::BitOr, native: INTEGERS },
    CompoundSpec { assign: AssignOp::BitXor, op: BinOp::BitXor, native: INTEGERS },
    CompoundSpec { assign: AssignOp::Shl, op: BinOp::Shl, native: INTEGERS },
    CompoundSpec { assign: AssignOp::Shr, op: BinOp::Shr, native: INTEGERS },
    CompoundSpec { assign: AssignOp::And, op: BinOp::And, native: &[] },
    CompoundSpec { assign: AssignOp::Or, op: BinOp::Or, native: &[] },
    CompoundSpec { assign: AssignOp::Concat, op: BinOp::Concat, native: &[TypeTag::String] },
    CompoundSpec { assign: AssignOp::Repeat, op: BinOp::Repeat, native: &[] },
];

pub fn compound_spec(assign: AssignOp) -> Option<&'static CompoundSpec> {
    COMPOUND.iter().find(|c| c.assign == assign)
}

/// `x op= e`: resolve `x op e`, then store the result back into `x`.
pub fn compound_assign(s: &mut Session, target: Fragment, assign: AssignOp, rhs: Fragment) -> Fragment {
    let pos = target.pos.merge(rhs.pos);
    let Some(spec) = compound_spec(assign) else {
        return rhs;
    };
    let Some(place) = target.place.clone().filter(|p| !matches!(p, Place::Declared(_))) else {
        s.report(
            DiagnosticKind::UnsupportedOperator,
            format!("'{}' needs a variable, found {}", assign.symbol(), target.text),
            pos,
        );
        return rhs;
    };
    let flags = Flags::STATEMENT | Flags::EFFECT;
    let target_tag = target.ty.head().unwrap_or(TypeTag::Unresolved);
    if matches!(spec.op, BinOp::Concat | BinOp::Repeat) && target.ty.is_numeric() {
        s.report(
            DiagnosticKind::UnsupportedOperator,
            format!("'{}' on the {} variable {}", assign.symbol(), target.ty, target.text),
            pos,
        );
    }

    let rhs_fits = match spec.op {
        BinOp::Concat => rhs.ty.is_scalar(),
        BinOp::BitAnd | BinOp::BitOr | BinOp::BitXor | BinOp::Shl | BinOp::Shr => rhs.ty.is_integral(),
        _ => rhs.ty.is_numeric(),
    };
    if let Place::Direct(lvalue) = &place {
        if target.ty.is_scalar() && spec.native.contains(&target_tag) && rhs_fits {
            let text = format!("{lvalue} {} {}", java_compound(spec.op), rhs.text);
            return Fragment::new(text, target.ty.clone(), pos).with_flags(flags);
        }
    }

    let ty = target.ty.clone();
    let value = binary(s, spec.op, target, rhs);
    let value = cast::cast(s, value, &ty);
    let text = place.store(&value.text).unwrap_or(value.text);
    Fragment::new(text, ty, pos).with_flags(flags)
}

fn java_compound(op: BinOp) -> &'static str {
    match op {
        BinOp::Add | BinOp::Concat => "+=",
        BinOp::Sub => "-=",
        BinOp::Mul => "*=",
        BinOp::Div => "/=",
        BinOp::BitAnd => "&=",
        BinOp::BitOr => "|=",
        BinOp::BitXor => "^=",
        BinOp::Shl => "<<=",
        BinOp::Shr => ">>=",
        _ => "=",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lit(text: &str, tag: TypeTag) -> Fragment {
        Fragment::scalar(text, tag, Position::default())
    }

    fn var(name: &str, tag: TypeTag) -> Fragment {
        lit(name, tag).with_place(Place::Direct(name.into()))
    }

    #[test]
    fn integer_addition_is_native() {
        let mut s = Session::new();
        let f = binary(&mut s, BinOp::Add, lit("3", TypeTag::Integer), lit("4", TypeTag::Integer));
        assert_eq!(f.text, "3 + 4");
        assert_eq!(f.ty, TypeSeq::scalar(TypeTag::Integer));
    }

    #[test]
    fn string_operand_falls_back_to_double() {
        let mut s = Session::new();
        let f = binary(&mut s, BinOp::Add, lit("s", TypeTag::String), lit("1", TypeTag::Integer));
        assert_eq!(f.text, "Pd.toDouble(s) + 1");
        assert_eq!(f.ty, TypeSeq::scalar(TypeTag::Double));
        assert!(s.diagnostics().is_empty());
    }

    #[test]
    fn resolution_is_deterministic() {
        let ops = [BinOp::Add, BinOp::Div, BinOp::Mod, BinOp::Pow, BinOp::StrLt, BinOp::NumCmp, BinOp::BitOr, BinOp::LowXor];
        let tags = [TypeTag::Integer, TypeTag::Double, TypeTag::String, TypeTag::Boolean, TypeTag::Unresolved];
        for op in ops {
            for a in tags {
                for b in tags {
                    let mut s1 = Session::new();
                    let mut s2 = Session::new();
                    let f1 = binary(&mut s1, op, lit("a", a), lit("b", b));
                    let f2 = binary(&mut s2, op, lit("c", a), lit("d", b));
                    assert_eq!(f1.ty, f2.ty, "{op:?} {a:?} {b:?}");
                }
            }
        }
    }

    #[test]
    fn division_is_floating() {
        let mut s = Session::new();
        let f = binary(&mut s, BinOp::Div, lit("7", TypeTag::Integer), lit("2", TypeTag::Integer));
        assert_eq!(f.text, "7 / (double) 2");
        assert_eq!(f.ty, TypeSeq::scalar(TypeTag::Double));
    }

    #[test]
    fn modulo_and_power_are_calls() {
        let mut s = Session::new();
        let m = binary(&mut s, BinOp::Mod, lit("a", TypeTag::Integer), lit("3", TypeTag::Integer));
        assert_eq!(m.text, "Math.floorMod(a, 3)");
        let p = binary(&mut s, BinOp::Pow, lit("2", TypeTag::Integer), lit("10", TypeTag::Integer));
        assert_eq!(p.text, "Math.pow(2, 10)");
        assert_eq!(p.ty, TypeSeq::scalar(TypeTag::Double));
    }

    #[test]
    fn string_comparisons_test_sign() {
        let cases = [
            (BinOp::StrEq, "== 0"),
            (BinOp::StrNe, "!= 0"),
            (BinOp::StrLt, "< 0"),
            (BinOp::StrLe, "<= 0"),
            (BinOp::StrGt, "> 0"),
            (BinOp::StrGe, ">= 0"),
        ];
        for (op, sign) in cases {
            let mut s = Session::new();
            let f = binary(&mut s, op, lit("a", TypeTag::String), lit("b", TypeTag::String));
            assert_eq!(f.text, format!("Pd.cmp(a, b) {sign}"));
            assert_eq!(f.ty, TypeSeq::scalar(TypeTag::Boolean));
        }
        let mut s = Session::new();
        let f = binary(&mut s, BinOp::StrCmp, lit("a", TypeTag::String), lit("b", TypeTag::String));
        assert_eq!(f.text, "Pd.cmp(a, b)");
        assert_eq!(f.ty, TypeSeq::scalar(TypeTag::Integer));
    }

    #[test]
    fn spaceship_uses_compare() {
        let mut s = Session::new();
        let f = binary(&mut s, BinOp::NumCmp, lit("a", TypeTag::Integer), lit("b", TypeTag::Double));
        assert_eq!(f.text, "Double.compare(a, b)");
    }

    #[test]
    fn xor_compares_truth_values() {
        let mut s = Session::new();
        let f = binary(&mut s, BinOp::LowXor, lit("a", TypeTag::Boolean), lit("n", TypeTag::Integer));
        assert_eq!(f.text, "a != (n != 0)");
    }

    #[test]
    fn or_die_becomes_guard() {
        let mut s = Session::new();
        let die = Fragment::new("Pd.die(\"x\")", TypeSeq::void(), Position::default()).with_flags(Flags::STATEMENT);
        let f = binary(&mut s, BinOp::LowOr, lit("ok", TypeTag::Boolean), die);
        assert_eq!(f.text, "if (!ok) {\n    Pd.die(\"x\");\n}\n");
        assert!(f.is(Flags::BLOCK));
    }

    #[test]
    fn symbolic_or_keeps_value() {
        let mut s = Session::new();
        let f = binary(&mut s, BinOp::Or, lit("name", TypeTag::String), lit("\"anon\"", TypeTag::String));
        assert_eq!(f.text, "Pd.toBoolean(name) ? name : \"anon\"");
        assert_eq!(f.ty, TypeSeq::scalar(TypeTag::String));
    }

    #[test]
    fn bitwise_needs_integers() {
        let mut s = Session::new();
        let f = binary(&mut s, BinOp::BitAnd, lit("x", TypeTag::Double), lit("1", TypeTag::Integer));
        assert_eq!(f.text, "((int) x) & 1");
        let mut s = Session::new();
        binary(&mut s, BinOp::Shl, lit("s", TypeTag::String), lit("1", TypeTag::Integer));
        assert_eq!(s.diagnostics().len(), 1);
    }

    #[test]
    fn ternary_unifies_branches() {
        let mut s = Session::new();
        let f = conditional(&mut s, lit("c", TypeTag::Boolean), lit("1", TypeTag::Integer), lit("x", TypeTag::Double));
        assert_eq!(f.text, "c ? 1.0 : x");
        assert_eq!(f.ty, TypeSeq::scalar(TypeTag::Double));
    }

    #[test]
    fn increment_forms() {
        let mut s = Session::new();
        assert_eq!(incdec(&mut s, var("i", TypeTag::Integer), true, true, false, Position::default()).text, "i++");
        assert_eq!(incdec(&mut s, var("i", TypeTag::Integer), true, true, true, Position::default()).text, "++i");
        let elem = lit("h.get(\"k\")", TypeTag::Integer).with_place(Place::Element {
            container: "h".into(),
            key: "\"k\"".into(),
            dim: TypeTag::Hash,
        });
        assert_eq!(
            incdec(&mut s, elem, true, false, false, Position::default()).text,
            "h.put(\"k\", h.get(\"k\") + 1)"
        );
        let word = var("id", TypeTag::String);
        assert_eq!(incdec(&mut s, word, true, false, false, Position::default()).text, "id = Pd.increment(id)");
    }

    #[test]
    fn compound_assignment_native_and_expanded() {
        let mut s = Session::new();
        let f = compound_assign(&mut s, var("n", TypeTag::Integer), AssignOp::Add, lit("2", TypeTag::Integer));
        assert_eq!(f.text, "n += 2");
        let f = compound_assign(&mut s, var("n", TypeTag::Integer), AssignOp::Pow, lit("2", TypeTag::Integer));
        assert_eq!(f.text, "n = (int) Math.pow(n, 2)");
        let f = compound_assign(&mut s, var("t", TypeTag::String), AssignOp::Concat, lit("\"!\"", TypeTag::String));
        assert_eq!(f.text, "t += \"!\"");
        let f = compound_assign(&mut s, var("t", TypeTag::String), AssignOp::Repeat, lit("3", TypeTag::Integer));
        assert_eq!(f.text, "t = t.repeat(3)");
        let f = compound_assign(&mut s, var("d", TypeTag::Integer), AssignOp::Div, lit("2", TypeTag::Integer));
        assert_eq!(f.text, "d = (int) (d / (double) 2)");
    }

    #[test]
    fn string_compound_on_a_number_is_reported() {
        let mut s = Session::new();
        compound_assign(&mut s, var("x", TypeTag::Integer), AssignOp::Concat, lit("\"a\"", TypeTag::String));
        let kinds: Vec<DiagnosticKind> = s.diagnostics().iter().map(|d| d.kind).collect();
        assert_eq!(kinds, vec![DiagnosticKind::UnsupportedOperator]);

        let mut s = Session::new();
        compound_assign(&mut s, var("t", TypeTag::String), AssignOp::Concat, lit("1", TypeTag::Integer));
        assert!(s.diagnostics().is_empty());
    }

    #[test]
    fn substitution_stores_back() {
        let mut s = Session::new();
        let f = regex_subst(&mut s, var("s", TypeTag::String), "\"foo\"", "\"bar\"", "", Position::default());
        assert_eq!(f.text, "s = Regex.subst(s, \"foo\", \"bar\")");
        let f = regex_match(&mut s, var("s", TypeTag::String), "\"^a\"", "i", Position::default(), true);
        assert_eq!(f.text, "!Regex.match(s, \"^a\", \"i\")");
    }
}
