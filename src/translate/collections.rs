//! Collection literals, subscripts, dereferences and references.

use super::cast::{self, unify};
use super::error::DiagnosticKind;
use super::fragment::{Access, AccessOp, Flags, Fragment, Place};
use super::lexer::Sigil;
use super::position::Position;
use super::session::{Feature, Session};
use super::types::{erase_generics, TypeSeq, TypeTag};

/// Element count of a collection-typed fragment.
pub fn size_of(frag: &Fragment) -> String {
    match frag.ty.head() {
        Some(TypeTag::Array) => format!("{}.length", frag.operand()),
        _ => format!("{}.size()", frag.operand()),
    }
}

fn effects(items: &[Fragment]) -> Flags {
    items.iter().fold(Flags::NONE, |acc, f| acc | f.flags.inherited())
}

fn element_type(items: &[Fragment]) -> TypeSeq {
    let mut iter = items.iter();
    let Some(first) = iter.next() else {
        return TypeSeq::scalar(TypeTag::Unresolved);
    };
    iter.fold(first.ty.clone(), |acc, f| unify(&acc, &f.ty))
}

fn cast_all(s: &mut Session, items: Vec<Fragment>, ty: &TypeSeq) -> Vec<String> {
    items.into_iter().map(|f| cast::cast(s, f, ty).text).collect()
}

fn array_creation(elem: &TypeSeq, items: &[String]) -> String {
    format!("new {}[]{{{}}}", erase_generics(&elem.java_boxed()), items.join(", "))
}

/// Split `k1, v1, k2, v2` into string keys and values of `value_ty`.
fn pair_items(s: &mut Session, items: Vec<Fragment>, value_ty: &TypeSeq, pos: Position) -> Vec<String> {
    if items.len() % 2 != 0 {
        s.report(
            DiagnosticKind::MalformedDeclaration,
            "odd number of elements in hash initializer",
            pos,
        );
    }
    let mut out = Vec::with_capacity(items.len());
    let mut iter = items.into_iter();
    while let (Some(k), Some(v)) = (iter.next(), iter.next()) {
        out.push(cast::to_string(s, k).text);
        out.push(cast::cast(s, v, value_ty).text);
    }
    out
}

fn values_of_pairs(items: &[Fragment]) -> Vec<Fragment> {
    items.iter().skip(1).step_by(2).cloned().collect()
}

/// `(a, b, c)`: an ordered list whose `alt` is the array form. With `=>`
/// the literal is a hash and `alt` holds the list form instead.
pub fn list_literal(s: &mut Session, items: Vec<Fragment>, pairs: bool, pos: Position) -> Fragment {
    let flags = effects(&items);
    if pairs {
        s.require(Feature::Map);
        let value_ty = element_type(&values_of_pairs(&items));
        let list_ty = element_type(&items);
        let list_form = format!("new PerlList<>({})", cast_all(s, items.clone(), &list_ty).join(", "));
        let text = format!("PerlMap.of({})", pair_items(s, items.clone(), &value_ty, pos).join(", "));
        return Fragment::new(text, value_ty.wrap(TypeTag::Hash), pos)
            .with_alt(list_form)
            .with_flags(flags | Flags::PAIRS)
            .with_elements(items);
    }
    s.require(Feature::List);
    let elem = element_type(&items);
    let texts = cast_all(s, items.clone(), &elem);
    let text = format!("new PerlList<>({})", texts.join(", "));
    Fragment::new(text, elem.wrap(TypeTag::List), pos)
        .with_alt(array_creation(&elem, &texts))
        .with_flags(flags)
        .with_elements(items)
}

/// `[a, b]`: a reference to an array.
pub fn array_ref_literal(s: &mut Session, items: Vec<Fragment>, pos: Position) -> Fragment {
    s.require(Feature::Ref);
    s.require(Feature::Array);
    let flags = effects(&items);
    let elem = element_type(&items);
    let texts = cast_all(s, items.clone(), &elem);
    let text = format!("new Ref<>({})", array_creation(&elem, &texts));
    Fragment::new(text, elem.wrap(TypeTag::Array).wrap(TypeTag::Ref), pos)
        .with_flags(flags)
        .with_elements(items)
}

/// `{k => v}`: a reference to a hash.
pub fn hash_ref_literal(s: &mut Session, items: Vec<Fragment>, pos: Position) -> Fragment {
    s.require(Feature::Ref);
    s.require(Feature::Map);
    let flags = effects(&items);
    let value_ty = element_type(&values_of_pairs(&items));
    let pairs = pair_items(s, items.clone(), &value_ty, pos);
    let text = format!("new Ref<>(PerlMap.of({}))", pairs.join(", "));
    Fragment::new(text, value_ty.wrap(TypeTag::Hash).wrap(TypeTag::Ref), pos)
        .with_flags(flags | Flags::PAIRS)
        .with_elements(items)
}

/// `lo..hi`: an inclusive integer range.
pub fn range(s: &mut Session, lo: Fragment, hi: Fragment, pos: Position) -> Fragment {
    s.require(Feature::List);
    let flags = lo.flags.inherited() | hi.flags.inherited();
    let lo = cast::to_integer(s, lo).text;
    let hi = cast::to_integer(s, hi).text;
    let text = format!("{}({lo}, {hi})", s.runtime("range"));
    let alt = format!("{}({lo}, {hi})", s.runtime("rangeArray"));
    Fragment::new(text, TypeSeq::from_tags(&[TypeTag::List, TypeTag::Integer]), pos)
        .with_alt(alt)
        .with_flags(flags)
}

/// Rebuild a literal for a declared collection type, casting each item to
/// the declared element type. `None` when the literal cannot take that shape.
pub fn rebuild_literal(s: &mut Session, original: &Fragment, items: Vec<Fragment>, target: &TypeSeq) -> Option<Fragment> {
    let pos = original.pos;
    let inner = target.inner();
    let flags = effects(&items);
    let text = match target.head()? {
        TypeTag::List if original.ty.head() != Some(TypeTag::Ref) => {
            format!("new PerlList<>({})", cast_all(s, items, &inner).join(", "))
        }
        TypeTag::Array if original.ty.head() != Some(TypeTag::Ref) => {
            let texts = cast_all(s, items, &inner);
            array_creation(&inner, &texts)
        }
        TypeTag::Hash if original.ty.head() != Some(TypeTag::Ref) => {
            format!("PerlMap.of({})", pair_items(s, items, &inner, pos).join(", "))
        }
        TypeTag::Ref if original.ty.head() == Some(TypeTag::Ref) => {
            let literal = Fragment::new(original.text.clone(), original.ty.inner(), pos);
            let rebuilt = rebuild_literal(s, &literal, items, &inner)?;
            format!("new Ref<>({})", rebuilt.text)
        }
        _ => return None,
    };
    s.require_type(target);
    Some(Fragment::new(text, target.clone(), pos).with_flags(flags))
}

/// Resolve a variable with its pending subscripts. The result reads the
/// value; its `place` says how to write it back.
pub fn resolve(s: &mut Session, access: Access) -> Fragment {
    let Access { base, ops } = access;
    ops.into_iter().fold(base, |cur, op| match op {
        AccessOp::Index { hash, key, pos } => index(s, cur, hash, key, pos),
        AccessOp::Deref { sigil, pos } => deref(s, cur, sigil, pos),
    })
}

fn index(s: &mut Session, cur: Fragment, hash: bool, key: Fragment, pos: Position) -> Fragment {
    let pos = cur.pos.merge(pos);
    if cur.is(Flags::ARGS) && !hash {
        if let Some(param) = positional_param(s, &key) {
            return param.with_flags(Flags::VARIABLE);
        }
    }

    // `$r->[0]` and the implicit arrow between subscripts.
    let cur = if cur.ty.head() == Some(TypeTag::Ref) {
        deref_value(&cur)
    } else {
        cur
    };
    let flags = cur.flags.inherited() | key.flags.inherited();

    let container = match cur.ty.head() {
        Some(TypeTag::Hash) if hash => cur,
        Some(TypeTag::Array | TypeTag::List) if !hash => cur,
        Some(TypeTag::Unresolved) => {
            let ty = TypeSeq::from_tags(&[if hash { TypeTag::Hash } else { TypeTag::List }, TypeTag::Unresolved]);
            let text = format!("(({}) {})", ty.java(), cur.operand());
            Fragment::new(text, ty, cur.pos)
        }
        _ => {
            s.report(
                DiagnosticKind::DimensionMismatch,
                format!(
                    "{} of type {} cannot take a {} subscript",
                    cur.text,
                    cur.ty,
                    if hash { "hash" } else { "list" }
                ),
                pos,
            );
            let text = format!("{}.get({})", cur.operand(), key.text);
            return Fragment::scalar(text, TypeTag::Unresolved, pos).with_flags(flags);
        }
    };

    let c = container.operand();
    let ty = container.ty.inner();
    let ty = if ty.is_void() { TypeSeq::scalar(TypeTag::Unresolved) } else { ty };
    if hash {
        let k = cast::to_string(s, key).text;
        let place = Place::Element { container: c.clone(), key: k.clone(), dim: TypeTag::Hash };
        return Fragment::new(format!("{c}.get({k})"), ty, pos).with_place(place).with_flags(flags);
    }

    let k = cast::to_integer(s, key).text;
    let k = match k.strip_prefix('-') {
        Some(n) if n.bytes().all(|b| b.is_ascii_digit()) => format!("{} - {n}", size_of(&container)),
        _ => k,
    };
    if container.ty.head() == Some(TypeTag::Array) {
        let text = format!("{c}[{k}]");
        Fragment::new(text.clone(), ty, pos).with_place(Place::Direct(text)).with_flags(flags)
    } else {
        let place = Place::Element { container: c.clone(), key: k.clone(), dim: TypeTag::List };
        Fragment::new(format!("{c}.get({k})"), ty, pos).with_place(place).with_flags(flags)
    }
}

/// `$_[N]` inside a sub names the N-th declared parameter.
fn positional_param(s: &mut Session, key: &Fragment) -> Option<Fragment> {
    let n: usize = key.text.parse().ok()?;
    let function = s.function.as_ref().filter(|f| !f.variadic)?;
    match function.params.get(n) {
        Some((java, ty)) => Some(Fragment::new(java.clone(), ty.clone(), key.pos).with_place(Place::Direct(java.clone()))),
        None => {
            let message = format!("'{}' declares {} parameters, $_[{n}] is out of range", function.name, function.params.len());
            s.report(DiagnosticKind::ArgumentCount, message, key.pos);
            None
        }
    }
}

fn deref_value(cur: &Fragment) -> Fragment {
    let c = cur.operand();
    Fragment::new(format!("{c}.get()"), cur.ty.inner(), cur.pos)
        .with_place(Place::Deref(c))
        .with_flags(cur.flags.inherited())
}

/// `$$r`, `@$r`, `%{$r}`: the value a reference points to.
fn deref(s: &mut Session, cur: Fragment, sigil: Sigil, pos: Position) -> Fragment {
    let pos = cur.pos.merge(pos);
    match cur.ty.head() {
        Some(TypeTag::Ref) => {
            let inner = cur.ty.inner().head();
            let fits = match sigil {
                Sigil::Array => inner.is_some_and(TypeTag::is_sequence),
                Sigil::Hash => inner == Some(TypeTag::Hash),
                Sigil::Scalar => inner.is_some(),
            };
            if !fits {
                s.report(
                    DiagnosticKind::DimensionMismatch,
                    format!("'{}' dereference of {}", sigil.symbol(), cur.ty),
                    pos,
                );
            }
            let mut out = deref_value(&cur);
            out.pos = pos;
            out
        }
        Some(TypeTag::Unresolved) => {
            let ty = match sigil {
                Sigil::Array => TypeSeq::from_tags(&[TypeTag::List, TypeTag::Unresolved]),
                Sigil::Hash => TypeSeq::from_tags(&[TypeTag::Hash, TypeTag::Unresolved]),
                Sigil::Scalar => TypeSeq::scalar(TypeTag::Unresolved),
            };
            s.require(Feature::Ref);
            let text = format!("((Ref<{}>) {}).get()", ty.java_boxed(), cur.operand());
            Fragment::new(text, ty, pos)
        }
        _ => {
            s.report(
                DiagnosticKind::DimensionMismatch,
                format!("{} of type {} is not a reference", cur.text, cur.ty),
                pos,
            );
            cur
        }
    }
}

/// `\$x`, `\@a`, `\%h`: a reference to the value.
pub fn reference(s: &mut Session, target: Fragment, pos: Position) -> Fragment {
    s.require(Feature::Ref);
    let ty = if target.ty.is_void() {
        TypeSeq::scalar(TypeTag::Unresolved)
    } else {
        target.ty.clone()
    };
    Fragment::new(format!("new Ref<>({})", target.text), ty.wrap(TypeTag::Ref), pos.merge(target.pos))
        .with_flags(target.flags.inherited())
}

/// `$#a`: the last valid index.
pub fn last_index(s: &mut Session, array: Fragment) -> Fragment {
    match array.ty.head() {
        Some(tag) if tag.is_sequence() => {}
        _ => s.report(
            DiagnosticKind::DimensionMismatch,
            format!("$#{} needs an array, found {}", array.text, array.ty),
            array.pos,
        ),
    }
    Fragment::scalar(format!("{} - 1", size_of(&array)), TypeTag::Integer, array.pos)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lit(text: &str, tag: TypeTag) -> Fragment {
        Fragment::scalar(text, tag, Position::default())
    }

    fn var(name: &str, tags: &[TypeTag]) -> Fragment {
        Fragment::new(name, TypeSeq::from_tags(tags), Position::default()).with_place(Place::Direct(name.into()))
    }

    #[test]
    fn list_literal_has_list_and_array_forms() {
        let mut s = Session::new();
        let items = vec![lit("1", TypeTag::Integer), lit("2", TypeTag::Integer), lit("3", TypeTag::Integer)];
        let f = list_literal(&mut s, items, false, Position::default());
        assert_eq!(f.text, "new PerlList<>(1, 2, 3)");
        assert_eq!(f.alt.as_deref(), Some("new Integer[]{1, 2, 3}"));
        assert_eq!(f.ty, TypeSeq::from_tags(&[TypeTag::List, TypeTag::Integer]));
    }

    #[test]
    fn mixed_numbers_widen() {
        let mut s = Session::new();
        let items = vec![lit("1", TypeTag::Integer), lit("2.5", TypeTag::Double)];
        let f = list_literal(&mut s, items, false, Position::default());
        assert_eq!(f.text, "new PerlList<>(1.0, 2.5)");
    }

    #[test]
    fn pairs_make_a_hash() {
        let mut s = Session::new();
        let items = vec![lit("\"a\"", TypeTag::String), lit("1", TypeTag::Integer)];
        let f = list_literal(&mut s, items, true, Position::default());
        assert_eq!(f.text, "PerlMap.of(\"a\", 1)");
        assert_eq!(f.ty, TypeSeq::from_tags(&[TypeTag::Hash, TypeTag::Integer]));
        assert!(f.is(Flags::PAIRS));
    }

    #[test]
    fn rebuild_for_declared_element_type() {
        let mut s = Session::new();
        let items = vec![lit("1", TypeTag::Integer), lit("2", TypeTag::Integer)];
        let f = list_literal(&mut s, items, false, Position::default());
        let target = TypeSeq::from_tags(&[TypeTag::Array, TypeTag::Double]);
        let out = cast::cast(&mut s, f, &target);
        assert_eq!(out.text, "new Double[]{1.0, 2.0}");
    }

    #[test]
    fn hash_subscript_reads_and_writes() {
        let mut s = Session::new();
        let h = var("h", &[TypeTag::Hash, TypeTag::Integer]);
        let access = Access::new(h).push(AccessOp::Index {
            hash: true,
            key: lit("\"k\"", TypeTag::String),
            pos: Position::default(),
        });
        let f = resolve(&mut s, access);
        assert_eq!(f.text, "h.get(\"k\")");
        assert_eq!(f.ty, TypeSeq::scalar(TypeTag::Integer));
        assert_eq!(f.place.and_then(|p| p.store("2")).as_deref(), Some("h.put(\"k\", 2)"));
    }

    #[test]
    fn nested_access_through_reference() {
        let mut s = Session::new();
        let r = var("r", &[TypeTag::Ref, TypeTag::Array, TypeTag::Hash, TypeTag::String]);
        let access = Access::new(r)
            .push(AccessOp::Index { hash: false, key: lit("0", TypeTag::Integer), pos: Position::default() })
            .push(AccessOp::Index { hash: true, key: lit("\"name\"", TypeTag::String), pos: Position::default() });
        let f = resolve(&mut s, access);
        assert_eq!(f.text, "r.get()[0].get(\"name\")");
        assert!(s.diagnostics().is_empty());
    }

    #[test]
    fn negative_index_counts_from_end() {
        let mut s = Session::new();
        let l = var("l", &[TypeTag::List, TypeTag::Integer]);
        let access = Access::new(l).push(AccessOp::Index { hash: false, key: lit("-1", TypeTag::Integer), pos: Position::default() });
        assert_eq!(resolve(&mut s, access).text, "l.get(l.size() - 1)");
    }

    #[test]
    fn mismatched_subscript_is_reported_at_access() {
        let mut s = Session::new();
        let a = var("a", &[TypeTag::Array, TypeTag::Integer]);
        let at = Position::new(3, 40, 45);
        let access = Access::new(a).push(AccessOp::Index { hash: true, key: lit("\"x\"", TypeTag::String), pos: at });
        resolve(&mut s, access);
        assert_eq!(s.diagnostics().len(), 1);
        assert_eq!(s.diagnostics()[0].kind, DiagnosticKind::DimensionMismatch);
        assert_eq!(s.diagnostics()[0].pos.end, 45);
    }

    #[test]
    fn range_is_integer_list() {
        let mut s = Session::new();
        let f = range(&mut s, lit("1", TypeTag::Integer), lit("n", TypeTag::Integer), Position::default());
        assert_eq!(f.text, "Pd.range(1, n)");
        assert_eq!(f.ty.java(), "PerlList<Integer>");
    }
}
