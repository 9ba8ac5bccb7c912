//! Coercion of a fragment to another static type.

use super::collections;
use super::error::DiagnosticKind;
use super::fragment::{Flags, Fragment};
use super::session::Session;
use super::types::{TypeSeq, TypeTag};

/// Convert `frag` to `target`, inserting the Java conversion the source
/// language performs implicitly. Impossible conversions are reported and
/// the fragment is passed through with the target type.
pub fn cast(s: &mut Session, frag: Fragment, target: &TypeSeq) -> Fragment {
    if target.is_void() || frag.ty.same_shape(target) {
        return retype(frag, target);
    }
    if frag.ty.is_void() {
        s.report(
            DiagnosticKind::UnsupportedOperator,
            format!("a statement has no value, expected {target}"),
            frag.pos,
        );
        let text = target.default_value();
        return Fragment::new(text, target.clone(), frag.pos);
    }
    s.require_type(target);
    match target.head() {
        Some(tag) if !tag.is_dimension() => to_scalar(s, frag, tag),
        _ => to_collection(s, frag, target),
    }
}

pub fn to_boolean(s: &mut Session, frag: Fragment) -> Fragment {
    cast(s, frag, &TypeSeq::scalar(TypeTag::Boolean))
}

pub fn to_string(s: &mut Session, frag: Fragment) -> Fragment {
    cast(s, frag, &TypeSeq::scalar(TypeTag::String))
}

pub fn to_integer(s: &mut Session, frag: Fragment) -> Fragment {
    cast(s, frag, &TypeSeq::scalar(TypeTag::Integer))
}

fn retype(mut frag: Fragment, target: &TypeSeq) -> Fragment {
    if !target.is_void() {
        frag.ty = target.clone();
    }
    frag
}

fn derived(frag: &Fragment, text: String, tag: TypeTag) -> Fragment {
    Fragment::scalar(text, tag, frag.pos).with_flags(frag.flags.inherited())
}

fn is_int_literal(text: &str) -> bool {
    let digits = text.strip_prefix('-').unwrap_or(text);
    !digits.is_empty() && digits.bytes().all(|c| c.is_ascii_digit())
}

fn to_scalar(s: &mut Session, frag: Fragment, to: TypeTag) -> Fragment {
    let Some(from) = frag.ty.head() else {
        return retype(frag, &TypeSeq::scalar(to));
    };
    let x = frag.operand();

    if to == TypeTag::Unresolved {
        return retype(frag, &TypeSeq::scalar(to));
    }
    if to == TypeTag::Boolean && frag.is(Flags::INPUT) {
        return derived(&frag, format!("{x} != null"), to);
    }

    if from.is_dimension() {
        if from == TypeTag::Ref {
            return match to {
                TypeTag::Boolean => derived(&frag, format!("{x} != null"), to),
                TypeTag::String => derived(&frag, format!("String.valueOf({})", frag.text), to),
                _ => {
                    s.report(
                        DiagnosticKind::DimensionMismatch,
                        format!("a reference cannot be used as {}", to.name()),
                        frag.pos,
                    );
                    retype(frag, &TypeSeq::scalar(to))
                }
            };
        }
        // Collections in scalar context yield their size.
        let size = collections::size_of(&frag);
        let size = derived(&frag, size, TypeTag::Integer);
        if to == TypeTag::Integer {
            return size;
        }
        return to_scalar(s, size, to);
    }

    let text = match (from, to) {
        (_, TypeTag::String) => format!("String.valueOf({})", frag.text),

        (TypeTag::Boolean, TypeTag::Integer) => format!("({x} ? 1 : 0)"),
        (TypeTag::Boolean, TypeTag::Long) => format!("({x} ? 1L : 0L)"),
        (TypeTag::Boolean, TypeTag::Float) => format!("({x} ? 1f : 0f)"),
        (TypeTag::Boolean, TypeTag::Double) => format!("({x} ? 1.0 : 0.0)"),

        (f, TypeTag::Boolean) if f.is_numeric() => format!("{x} != 0"),

        (TypeTag::Integer, TypeTag::Long) if is_int_literal(&frag.text) => format!("{}L", frag.text),
        (TypeTag::Integer, TypeTag::Float) if is_int_literal(&frag.text) => format!("{}f", frag.text),
        (TypeTag::Integer, TypeTag::Double) if is_int_literal(&frag.text) => format!("{}.0", frag.text),
        (f, TypeTag::Integer) if f.is_numeric() => format!("(int) {x}"),
        (f, TypeTag::Long) if f.is_numeric() => format!("(long) {x}"),
        (f, TypeTag::Float) if f.is_numeric() => format!("(float) {x}"),
        (f, TypeTag::Double) if f.is_numeric() => format!("(double) {x}"),

        // Strings and unresolved values go through the runtime parsers.
        (_, TypeTag::Integer) => format!("{}({})", s.runtime("toInt"), frag.text),
        (_, TypeTag::Long) => format!("{}({})", s.runtime("toLong"), frag.text),
        (_, TypeTag::Float) => format!("{}({})", s.runtime("toFloat"), frag.text),
        (_, TypeTag::Double) => format!("{}({})", s.runtime("toDouble"), frag.text),
        (_, TypeTag::Boolean) => format!("{}({})", s.runtime("toBoolean"), frag.text),
        (_, _) => frag.text.clone(),
    };
    derived(&frag, text, to)
}

fn to_collection(s: &mut Session, frag: Fragment, target: &TypeSeq) -> Fragment {
    let pos = frag.pos;
    let java = target.java();
    let from = frag.ty.head().unwrap_or(TypeTag::Unresolved);
    let to = target.head().unwrap_or(TypeTag::Unresolved);

    if frag.is(Flags::EMPTY) {
        return Fragment::new(target.default_value(), target.clone(), pos);
    }
    if let Some(elements) = &frag.elements {
        if let Some(rebuilt) = collections::rebuild_literal(s, &frag, elements.clone(), target) {
            return rebuilt;
        }
    }
    if from == TypeTag::Unresolved {
        return Fragment::new(format!("({java}) {}", frag.operand()), target.clone(), pos);
    }

    let text = match (from, to) {
        (f, TypeTag::List | TypeTag::Array) if !f.is_dimension() => {
            // A scalar in list context is a one-element list.
            return collections::rebuild_literal(s, &frag, vec![frag.clone()], target)
                .unwrap_or_else(|| retype(frag, target));
        }
        (TypeTag::List, TypeTag::Array) if frag.ty.inner().same_shape(&target.inner()) => {
            let elem = super::types::erase_generics(&target.inner().java_boxed());
            Some(format!("{}.toArray(new {elem}[0])", frag.operand()))
        }
        (TypeTag::Array, TypeTag::List) if frag.ty.inner().same_shape(&target.inner()) => {
            Some(format!("new PerlList<>({})", frag.text))
        }
        (TypeTag::List, TypeTag::Hash) => Some(format!("PerlMap.fromList({})", frag.text)),
        (TypeTag::Hash, TypeTag::List) => Some(format!("{}.toList()", frag.operand())),
        (f, t) if f == t && unresolved_inside(&frag.ty, target) => {
            Some(format!("({java}) (Object) {}", frag.operand()))
        }
        _ => None,
    };

    if let Some(text) = text {
        return Fragment::new(text, target.clone(), pos).with_flags(frag.flags.inherited());
    }
    s.report(
        DiagnosticKind::DimensionMismatch,
        format!("cannot use {} as {target}", frag.ty),
        pos,
    );
    retype(frag, target)
}

fn unresolved_inside(a: &TypeSeq, b: &TypeSeq) -> bool {
    a.types().iter().chain(b.types()).any(|t| t.tag == TypeTag::Unresolved)
}

/// Common type of two branches or list items: equal types stay, numbers
/// widen, anything else becomes unresolved.
pub fn unify(a: &TypeSeq, b: &TypeSeq) -> TypeSeq {
    if a.same_shape(b) {
        return a.clone();
    }
    if a.is_void() {
        return b.clone();
    }
    if b.is_void() {
        return a.clone();
    }
    match (a.head(), b.head()) {
        (Some(x), Some(y)) if a.is_scalar() && b.is_scalar() => match x.promote(y) {
            Some(wider) => TypeSeq::scalar(wider),
            None if x == TypeTag::String || y == TypeTag::String => TypeSeq::scalar(TypeTag::String),
            None => TypeSeq::scalar(TypeTag::Unresolved),
        },
        _ => TypeSeq::scalar(TypeTag::Unresolved),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translate::position::Position;

    fn frag(text: &str, tag: TypeTag) -> Fragment {
        Fragment::scalar(text, tag, Position::default())
    }

    fn cast_to(f: Fragment, tag: TypeTag) -> String {
        let mut s = Session::new();
        cast(&mut s, f, &TypeSeq::scalar(tag)).text
    }

    #[test]
    fn numeric_conversions() {
        assert_eq!(cast_to(frag("x", TypeTag::Double), TypeTag::Integer), "(int) x");
        assert_eq!(cast_to(frag("3", TypeTag::Integer), TypeTag::Double), "3.0");
        assert_eq!(cast_to(frag("a + b", TypeTag::Integer), TypeTag::Long), "(long) (a + b)");
        assert_eq!(cast_to(frag("n", TypeTag::Integer), TypeTag::Boolean), "n != 0");
        assert_eq!(cast_to(frag("ok", TypeTag::Boolean), TypeTag::Integer), "(ok ? 1 : 0)");
    }

    #[test]
    fn strings_use_runtime_parsers() {
        let mut s = Session::new();
        let out = cast(&mut s, frag("line", TypeTag::String), &TypeSeq::scalar(TypeTag::Integer));
        assert_eq!(out.text, "Pd.toInt(line)");
        assert_eq!(out.ty, TypeSeq::scalar(TypeTag::Integer));
        assert_eq!(cast_to(frag("n", TypeTag::Integer), TypeTag::String), "String.valueOf(n)");
        assert_eq!(cast_to(frag("o", TypeTag::Unresolved), TypeTag::Double), "Pd.toDouble(o)");
    }

    #[test]
    fn collections_in_scalar_context_give_size() {
        let l = Fragment::new("items", TypeSeq::from_tags(&[TypeTag::List, TypeTag::String]), Position::default());
        assert_eq!(cast_to(l, TypeTag::Integer), "items.size()");
        let a = Fragment::new("a", TypeSeq::from_tags(&[TypeTag::Array, TypeTag::Integer]), Position::default());
        assert_eq!(cast_to(a, TypeTag::Boolean), "a.length != 0");
        let h = Fragment::new("h", TypeSeq::from_tags(&[TypeTag::Hash, TypeTag::Integer]), Position::default());
        assert_eq!(cast_to(h, TypeTag::Long), "(long) h.size()");
    }

    #[test]
    fn input_lines_test_for_null() {
        let f = frag("line = Pd.readLine(STDIN)", TypeTag::String).with_flags(Flags::INPUT);
        assert_eq!(cast_to(f, TypeTag::Boolean), "(line = Pd.readLine(STDIN)) != null");
    }

    #[test]
    fn reference_to_number_is_reported() {
        let mut s = Session::new();
        let r = Fragment::new("r", TypeSeq::from_tags(&[TypeTag::Ref, TypeTag::Integer]), Position::default());
        cast(&mut s, r, &TypeSeq::scalar(TypeTag::Integer));
        assert_eq!(s.diagnostics().len(), 1);
        assert_eq!(s.diagnostics()[0].kind, DiagnosticKind::DimensionMismatch);
    }

    #[test]
    fn unify_widens_numbers() {
        let i = TypeSeq::scalar(TypeTag::Integer);
        let d = TypeSeq::scalar(TypeTag::Double);
        let st = TypeSeq::scalar(TypeTag::String);
        assert_eq!(unify(&i, &d), d);
        assert_eq!(unify(&i, &st), st);
        assert_eq!(unify(&TypeSeq::scalar(TypeTag::Boolean), &i), TypeSeq::scalar(TypeTag::Unresolved));
    }
}
