//! Variables, declarations, assignment and the simple statements.

use super::cast;
use super::collections;
use super::error::DiagnosticKind;
use super::escape::{self, Embedded, Key, Mode};
use super::fragment::{needs_parens, Access, AccessOp, Declare, Flags, Fragment, Place};
use super::lexer::{Label, Sigil};
use super::position::Position;
use super::session::{Feature, Session};
use super::symbols::SymbolId;
use super::types::{Type, TypeSeq, TypeTag};

/// Split annotation words into type sequences; each sequence ends at its
/// first scalar tag.
pub fn label_types(labels: &[Label]) -> Vec<TypeSeq> {
    let mut out = Vec::new();
    let mut current: Vec<Type> = Vec::new();
    for label in labels {
        match label {
            Label::Type(tag) => {
                current.push(Type::new(*tag));
                if !tag.is_dimension() {
                    out.push(TypeSeq::from_types(std::mem::take(&mut current)));
                }
            }
            Label::Size(n) => {
                if let Some(last) = current.last_mut() {
                    last.size = Some(*n);
                }
            }
            _ => {}
        }
    }
    if !current.is_empty() {
        // A collection without an element type holds strings.
        current.push(Type::new(TypeTag::String));
        out.push(TypeSeq::from_types(current));
    }
    out
}

/// Split a `#<args>...<returns>...` annotation into its two type lists.
/// `None` when the annotation has neither section.
pub fn signature_sections(labels: &[Label]) -> Option<(Option<Vec<TypeSeq>>, Option<Vec<TypeSeq>>)> {
    if !labels.iter().any(|l| matches!(l, Label::Args | Label::Returns)) {
        return None;
    }
    let mut args: Option<Vec<Label>> = None;
    let mut returns: Option<Vec<Label>> = None;
    let mut in_args = true;
    for label in labels {
        match label {
            Label::Args => {
                in_args = true;
                args.get_or_insert_with(Vec::new);
            }
            Label::Returns => {
                in_args = false;
                returns.get_or_insert_with(Vec::new);
            }
            other => {
                let section = if in_args { &mut args } else { &mut returns };
                section.get_or_insert_with(Vec::new).push(other.clone());
            }
        }
    }
    Some((args.map(|a| label_types(&a)), returns.map(|r| label_types(&r))))
}

/// Handle one `#<...>` annotation. Returns code when the annotation is a
/// declaration in its own right (`#<$a><$b><int>`).
pub fn annotate(s: &mut Session, labels: &[Label], pos: Position) -> Option<String> {
    if let Some((args, returns)) = signature_sections(labels) {
        let pending = s.labels.get_or_insert_with(Default::default);
        if args.is_some() {
            pending.args = args;
        }
        if returns.is_some() {
            pending.returns = returns;
        }
        return None;
    }

    let declares: Vec<Declare> = labels
        .iter()
        .filter_map(|l| match l {
            Label::Declare { name, sigil } => Some(Declare { name: name.clone(), sigil: *sigil, pos }),
            _ => None,
        })
        .collect();
    let ty = label_types(labels).into_iter().next();
    match ty {
        Some(ty) if !declares.is_empty() => Some(advanced_declare(s, &declares, &ty)),
        ty => {
            let pending = s.labels.get_or_insert_with(Default::default);
            if ty.is_some() {
                pending.ty = ty;
            }
            pending.declares.extend(declares);
            None
        }
    }
}

fn advanced_declare(s: &mut Session, declares: &[Declare], ty: &TypeSeq) -> String {
    let mut code = String::new();
    for decl in declares {
        let key = format!("{}{}", decl.sigil.symbol(), decl.name);
        let ty = adapt(ty.clone(), decl);
        let declared = s.symbols.declare(&key, ty.clone(), false, false, decl.pos);
        if declared.redeclared {
            s.report(
                DiagnosticKind::Redeclaration,
                format!("'{key}' is already declared in this scope"),
                decl.pos,
            );
        }
        s.require_type(&ty);
        let java = &s.symbols.get(declared.id).java;
        code.push_str(&format!("{} {java} = {};\n", ty.java(), ty.default_value()));
    }
    code
}

/// A scalar annotation on an array or hash names its element type.
fn adapt(ty: TypeSeq, decl: &Declare) -> TypeSeq {
    if decl.is_value() || !ty.is_scalar() {
        return ty;
    }
    match decl.sigil {
        Sigil::Array => ty.wrap(TypeTag::List),
        Sigil::Hash => ty.wrap(TypeTag::Hash),
        _ => ty,
    }
}

fn fallback(sigil: Option<char>) -> TypeSeq {
    match sigil {
        Some('@') => TypeSeq::from_tags(&[TypeTag::List, TypeTag::String]),
        Some('%') => TypeSeq::from_tags(&[TypeTag::Hash, TypeTag::String]),
        _ => TypeSeq::scalar(TypeTag::String),
    }
}

/// `my $x` / `our @a`: a pending declaration. Its type comes from a
/// preceding annotation, or from the initializer once it is seen.
pub fn declare(s: &mut Session, decl: &Declare, shared: bool) -> Fragment {
    let key = format!("{}{}", decl.sigil.symbol(), decl.name);
    let labeled = s.labels.as_ref().and_then(|l| l.ty.clone());
    let ty = labeled.map_or_else(TypeSeq::void, |ty| adapt(ty, decl));
    let declared = s.symbols.declare(&key, ty.clone(), shared, true, decl.pos);
    if declared.redeclared {
        s.report(
            DiagnosticKind::Redeclaration,
            format!("'{key}' is already declared in this scope"),
            decl.pos,
        );
    }
    let java = s.symbols.get(declared.id).java.clone();
    Fragment::new(java, ty, decl.pos)
        .with_place(Place::Declared(declared.id))
        .with_flags(Flags::VARIABLE)
}

/// Fix the type of a pending declaration and make it visible.
fn settle(s: &mut Session, id: SymbolId, init: Option<&Fragment>) -> TypeSeq {
    let symbol = s.symbols.get(id);
    let (key, current, pos) = (symbol.key.clone(), symbol.ty.clone(), symbol.pos);
    let ty = if current.is_void() { infer(s, &key, init, pos) } else { current };
    s.symbols.resolve(id, ty.clone());
    s.require_type(&ty);
    ty
}

fn infer(s: &mut Session, key: &str, init: Option<&Fragment>, pos: Position) -> TypeSeq {
    let sigil = key.chars().next();
    let Some(value) = init.filter(|f| !f.ty.is_void() && !f.is(Flags::EMPTY)) else {
        s.report(
            DiagnosticKind::MissingType,
            format!("no type for '{key}'; annotate it with #<type>"),
            pos,
        );
        return fallback(sigil);
    };
    let ty = &value.ty;
    match (sigil, ty.head()) {
        (Some('@'), Some(TypeTag::List | TypeTag::Array)) => ty.clone(),
        (Some('@'), Some(TypeTag::Hash)) => cast::unify(&ty.inner(), &TypeSeq::scalar(TypeTag::String)).wrap(TypeTag::List),
        (Some('@'), _) if ty.is_scalar() => ty.wrap(TypeTag::List),
        (Some('@'), _) => TypeSeq::from_tags(&[TypeTag::List, TypeTag::Unresolved]),
        (Some('%'), Some(TypeTag::Hash)) => ty.clone(),
        (Some('%'), Some(TypeTag::List | TypeTag::Array)) => ty.inner().wrap(TypeTag::Hash),
        (Some('%'), _) => {
            s.report(
                DiagnosticKind::DimensionMismatch,
                format!("'{key}' needs key/value pairs, found {ty}"),
                pos,
            );
            fallback(sigil)
        }
        // A collection in scalar context is its size.
        (_, Some(TypeTag::List | TypeTag::Array | TypeTag::Hash)) => TypeSeq::scalar(TypeTag::Integer),
        _ => ty.clone(),
    }
}

/// Bring a value to `ty`; the empty list and `undef` become the default.
pub fn convert(s: &mut Session, value: Fragment, ty: &TypeSeq) -> Fragment {
    if value.is(Flags::EMPTY) {
        s.require_type(ty);
        return Fragment::new(ty.default_value(), ty.clone(), value.pos);
    }
    cast::cast(s, value, ty)
}

fn emit_field(s: &mut Session, id: SymbolId) {
    let symbol = s.symbols.get(id);
    if symbol.hoisted {
        return;
    }
    let field = format!("static {} {} = {};\n", symbol.ty.java(), symbol.java, symbol.ty.default_value());
    s.push_field(&field);
    s.symbols.mark_hoisted(id);
}

fn assign_declared(s: &mut Session, id: SymbolId, value: Fragment, pos: Position) -> Fragment {
    let ty = settle(s, id, Some(&value));
    let input = value.is(Flags::INPUT);
    let value = convert(s, value, &ty);
    let symbol = s.symbols.get(id);
    let java = symbol.java.clone();
    let shared = symbol.shared;

    let text = if shared {
        emit_field(s, id);
        format!("{java} = {}", value.text)
    } else if s.in_loop_header() {
        s.hoist(format!("{} {java};\n", ty.java()));
        s.symbols.mark_hoisted(id);
        format!("{java} = {}", value.text)
    } else {
        let out = Fragment::new(format!("{} {java} = {}", ty.java(), value.text), ty, pos)
            .with_alt(format!("{java} = {}", value.text))
            .with_place(Place::Direct(java))
            .with_flags(Flags::STATEMENT | Flags::EFFECT | Flags::DECLARATION);
        return if input { out.with_flags(Flags::INPUT) } else { out };
    };
    let out = Fragment::new(text, ty, pos)
        .with_place(Place::Direct(java))
        .with_flags(Flags::STATEMENT | Flags::EFFECT);
    if input {
        out.with_flags(Flags::INPUT)
    } else {
        out
    }
}

/// A declaring assignment used inside a larger expression: the declaration
/// moves in front of the statement and the assignment stays in place.
pub fn as_operand(s: &mut Session, frag: Fragment) -> Fragment {
    if !frag.is(Flags::DECLARATION) {
        return frag;
    }
    let (Some(alt), Some(Place::Direct(java))) = (frag.alt.clone(), frag.place.clone()) else {
        return frag;
    };
    s.hoist(format!("{} {java};\n", frag.ty.java()));
    Fragment {
        text: format!("({alt})"),
        alt: None,
        flags: frag.flags.without(Flags::DECLARATION),
        ..frag
    }
}

/// `target = value`.
pub fn assign(s: &mut Session, target: Fragment, value: Fragment) -> Fragment {
    let pos = target.pos.merge(value.pos);
    match target.place.clone() {
        Some(Place::Declared(id)) => assign_declared(s, id, value, pos),
        Some(place) => {
            let ty = target.ty.clone();
            let input = value.is(Flags::INPUT);
            let value = convert(s, value, &ty);
            let text = place.store(&value.text).unwrap_or(value.text);
            let out = Fragment::new(text, ty, pos)
                .with_place(place)
                .with_flags(Flags::STATEMENT | Flags::EFFECT);
            if input {
                out.with_flags(Flags::INPUT)
            } else {
                out
            }
        }
        None => {
            s.report(
                DiagnosticKind::UnsupportedOperator,
                format!("cannot assign to {}", target.text),
                pos,
            );
            value
        }
    }
}

/// Right-hand side of a list assignment.
#[derive(Debug)]
pub enum Source {
    /// `(x, y, ...)`
    Items(Vec<Fragment>),
    /// A single expression, spread over the targets when it is a collection.
    Value(Fragment),
}

enum Spread {
    Items(Vec<Fragment>),
    Collection(Fragment),
}

/// Whether `text` uses the Java identifier `name`.
fn mentions(text: &str, name: &str) -> bool {
    let is_ident = |c: char| c.is_alphanumeric() || c == '_';
    text.match_indices(name).any(|(i, _)| {
        let before = text.get(..i).and_then(|t| t.chars().next_back());
        let after = text.get(i + name.len()..).and_then(|t| t.chars().next());
        !before.is_some_and(is_ident) && !after.is_some_and(is_ident)
    })
}

fn is_collection_target(s: &Session, target: &Fragment) -> bool {
    match &target.place {
        Some(Place::Declared(id)) => !s.symbols.get(*id).key.starts_with('$'),
        _ => matches!(target.ty.head(), Some(TypeTag::List | TypeTag::Array | TypeTag::Hash)),
    }
}

/// `(a, b, ...) = source`: assign positionally. An array or hash target
/// takes every remaining value.
pub fn multi_assign(s: &mut Session, targets: Vec<Fragment>, source: Source, pos: Position) -> Fragment {
    let mut code = String::new();
    let spread = match source {
        Source::Items(items) => {
            let clash = targets.len() > 1
                && targets.iter().any(|t| {
                    !matches!(t.place, Some(Place::Declared(_))) && items.iter().any(|i| mentions(&i.text, &t.text))
                });
            if clash {
                let temps = items
                    .into_iter()
                    .map(|item| {
                        let name = s.temp();
                        let ty = if item.ty.is_void() { TypeSeq::scalar(TypeTag::Unresolved) } else { item.ty.clone() };
                        code.push_str(&format!("{} {name} = {};\n", ty.java(), item.text));
                        Fragment::new(name, ty, item.pos)
                    })
                    .collect();
                Spread::Items(temps)
            } else {
                Spread::Items(items)
            }
        }
        Source::Value(value) if value.is(Flags::ARGS) => match params_of(s) {
            Some(params) => Spread::Items(params),
            None => Spread::Collection(value),
        },
        Source::Value(value) if value.ty.is_scalar() || value.is(Flags::EMPTY) => Spread::Items(vec![value]),
        Source::Value(value) => {
            let value = if value.ty.is(TypeTag::Hash) {
                let ty = cast::unify(&value.ty.inner(), &TypeSeq::scalar(TypeTag::String)).wrap(TypeTag::List);
                cast::cast(s, value, &ty)
            } else {
                value
            };
            let name = s.temp();
            code.push_str(&format!("{} {name} = {};\n", value.ty.java(), value.text));
            Spread::Collection(Fragment::new(name, value.ty, value.pos))
        }
    };

    for (i, target) in targets.into_iter().enumerate() {
        let slurps = is_collection_target(s, &target);
        let value = if slurps { rest_from(s, &spread, i, pos) } else { item_at(s, &spread, i, pos) };
        let assigned = assign(s, target, value);
        code.push_str(&statement_text(s, assigned));
        if slurps {
            break;
        }
    }
    Fragment::statement(code, pos).with_flags(Flags::EFFECT)
}

fn empty(pos: Position) -> Fragment {
    Fragment::scalar("null", TypeTag::Unresolved, pos).with_flags(Flags::EMPTY)
}

fn item_at(s: &mut Session, spread: &Spread, i: usize, pos: Position) -> Fragment {
    match spread {
        Spread::Items(items) => items.get(i).cloned().unwrap_or_else(|| empty(pos)),
        Spread::Collection(c) => {
            let key = Fragment::scalar(i.to_string(), TypeTag::Integer, pos);
            collections::resolve(s, Access::new(c.clone()).push(AccessOp::Index { hash: false, key, pos }))
        }
    }
}

fn rest_from(s: &mut Session, spread: &Spread, i: usize, pos: Position) -> Fragment {
    match spread {
        Spread::Items(items) => match items.get(i..) {
            Some(rest) if !rest.is_empty() => collections::list_literal(s, rest.to_vec(), false, pos),
            _ => empty(pos),
        },
        Spread::Collection(c) => {
            s.require(Feature::List);
            let text = format!("{}({}, {i})", s.runtime("sliceFrom"), c.text);
            Fragment::new(text, c.ty.inner().wrap(TypeTag::List), pos)
        }
    }
}

/// The typed parameters of the current sub, when it declares them.
fn params_of(s: &Session) -> Option<Vec<Fragment>> {
    let function = s.function.as_ref().filter(|f| !f.variadic)?;
    Some(
        function
            .params
            .iter()
            .map(|(java, ty)| {
                Fragment::new(java.clone(), ty.clone(), Position::default()).with_place(Place::Direct(java.clone()))
            })
            .collect(),
    )
}

/// Read a variable. `$_` and package-qualified names that were never
/// declared become static fields.
pub fn read_var(s: &mut Session, sigil: Sigil, name: &str, pos: Position) -> Fragment {
    if sigil == Sigil::Array && name == "_" {
        return args_list(s, pos);
    }
    let key = format!("{}{name}", sigil.symbol());
    let id = match s.symbols.lookup(&key) {
        Some(found) => {
            if found.captured {
                s.report(
                    DiagnosticKind::CapturedLexical,
                    format!("'{key}' is a file-scope 'my' variable; declare it with 'our' to use it in a sub"),
                    pos,
                );
            }
            found.id
        }
        None if name == "_" || name.contains("::") => implicit_global(s, &key, pos),
        None => {
            s.report(DiagnosticKind::UndeclaredIdentifier, format!("'{key}' is not declared"), pos);
            return Fragment::scalar(name, TypeTag::Unresolved, pos)
                .with_place(Place::Direct(name.to_string()))
                .with_flags(Flags::VARIABLE);
        }
    };
    let symbol = s.symbols.get(id);
    let (java, ty) = (symbol.java.clone(), symbol.ty.clone());
    s.require_type(&ty);
    Fragment::new(java.clone(), ty, pos)
        .with_place(Place::Direct(java))
        .with_flags(Flags::VARIABLE)
}

fn implicit_global(s: &mut Session, key: &str, pos: Position) -> SymbolId {
    let ty = fallback(key.chars().next());
    let declared = s.symbols.declare(key, ty, true, false, pos);
    emit_field(s, declared.id);
    declared.id
}

/// `@_`: the argument list of the current sub.
pub fn args_list(s: &mut Session, pos: Position) -> Fragment {
    let ty = TypeSeq::from_tags(&[TypeTag::Array, TypeTag::Unresolved]);
    let Some(function) = s.function.as_ref() else {
        s.report(DiagnosticKind::MisplacedStatement, "'@_' used outside a sub", pos);
        return Fragment::new("args", TypeSeq::from_tags(&[TypeTag::Array, TypeTag::String]), pos);
    };
    let text = if function.variadic {
        function.params.first().map_or_else(|| "params".to_string(), |(java, _)| java.clone())
    } else {
        let names: Vec<&str> = function.params.iter().map(|(java, _)| java.as_str()).collect();
        format!("new Object[]{{{}}}", names.join(", "))
    };
    Fragment::new(text, ty, pos).with_flags(Flags::ARGS | Flags::VARIABLE)
}

/// `shift @ARGV`: the next command-line argument.
pub fn next_argv(s: &mut Session, pos: Position) -> Fragment {
    let i = s.argv_shift;
    s.argv_shift += 1;
    let text = format!("args[{i}]");
    Fragment::scalar(text.clone(), TypeTag::String, pos).with_place(Place::Direct(text))
}

/// A bare `shift`: the next parameter inside a sub, the next command-line
/// argument at file scope.
pub fn shift_arg(s: &mut Session, pos: Position) -> Fragment {
    let Some(function) = s.function.as_mut() else {
        return next_argv(s, pos);
    };
    let i = function.next_shift;
    function.next_shift += 1;
    if function.variadic {
        let name = function.params.first().map_or("params", |(java, _)| java.as_str());
        let text = format!("{name}[{i}]");
        return Fragment::scalar(text.clone(), TypeTag::Unresolved, pos).with_place(Place::Direct(text));
    }
    match function.params.get(i) {
        Some((java, ty)) => Fragment::new(java.clone(), ty.clone(), pos)
            .with_place(Place::Direct(java.clone()))
            .with_flags(Flags::VARIABLE),
        None => {
            let message = format!("'{}' declares {} parameters, shift #{} has none", function.name, function.params.len(), i + 1);
            s.report(DiagnosticKind::ArgumentCount, message, pos);
            empty(pos)
        }
    }
}

/// `$1`..`$9`: a group of the last successful match.
pub fn capture_group(s: &mut Session, n: u32, pos: Position) -> Fragment {
    s.require(Feature::Regex);
    Fragment::scalar(format!("Regex.group({n})"), TypeTag::String, pos)
}

/// `return`, cast to the declared return types. Without an annotation the
/// first `return` fixes them.
pub fn return_stmt(s: &mut Session, values: Vec<Fragment>, pos: Position) -> Fragment {
    let Some(function) = s.function.as_mut() else {
        s.report(DiagnosticKind::MisplacedStatement, "'return' outside a sub", pos);
        return Fragment::statement("return;\n", pos).with_flags(Flags::RETURN);
    };
    if !function.declared_returns && function.returns.is_empty() {
        function.returns = values
            .iter()
            .map(|v| {
                if v.is(Flags::EMPTY) || v.ty.is_void() {
                    TypeSeq::scalar(TypeTag::Unresolved)
                } else {
                    v.ty.clone()
                }
            })
            .collect();
    }
    let expected = function.returns.clone();
    let name = function.name.clone();

    let text = match (values.len(), expected.as_slice()) {
        (0, []) => "return;".to_string(),
        (0, [one]) => format!("return {};", one.default_value()),
        (0, _) => "return null;".to_string(),
        (_, []) => {
            s.report(
                DiagnosticKind::ArgumentCount,
                format!("'{name}' is declared without a return value"),
                pos,
            );
            "return;".to_string()
        }
        (1, [one]) => {
            let value = values.into_iter().next().map(|v| convert(s, v, one));
            format!("return {};", value.map_or_else(|| "null".to_string(), |v| v.text))
        }
        (_, [one]) => {
            let list = collections::list_literal(s, values, false, pos);
            format!("return {};", convert(s, list, one).text)
        }
        (n, many) => {
            if n != many.len() {
                s.report(
                    DiagnosticKind::ArgumentCount,
                    format!("'{name}' returns {} values, found {n}", many.len()),
                    pos,
                );
            }
            let items: Vec<String> = values
                .into_iter()
                .enumerate()
                .map(|(i, v)| match many.get(i) {
                    Some(ty) => convert(s, v, ty).text,
                    None => v.text,
                })
                .collect();
            format!("return new Object[]{{{}}};", items.join(", "))
        }
    };
    Fragment::statement(format!("{text}\n"), pos).with_flags(Flags::RETURN)
}

/// `last` and `next`.
pub fn loop_control(s: &mut Session, last: bool, pos: Position) -> Fragment {
    let (word, java, flag) = if last {
        ("last", "break;\n", Flags::LAST)
    } else {
        ("next", "continue;\n", Flags::NEXT)
    };
    if s.loop_depth == 0 {
        s.report(DiagnosticKind::MisplacedStatement, format!("'{word}' outside a loop"), pos);
    }
    Fragment::statement(java, pos).with_flags(flag)
}

/// Call a sub defined in the source. `None` when no such sub exists.
pub fn call_user(s: &mut Session, name: &str, args: Vec<Fragment>, pos: Position) -> Option<Fragment> {
    let sig = s.signatures.get(name)?.clone();
    let texts: Vec<String> = if sig.variadic {
        args.into_iter().map(|a| a.text).collect()
    } else {
        if args.len() != sig.args.len() {
            s.report(
                DiagnosticKind::ArgumentCount,
                format!("'{name}' takes {} arguments, found {}", sig.args.len(), args.len()),
                pos,
            );
        }
        args.into_iter()
            .enumerate()
            .map(|(i, a)| match sig.args.get(i) {
                Some(ty) => convert(s, a, ty).text,
                None => a.text,
            })
            .collect()
    };
    let ty = if sig.declared_returns || sig.defined {
        sig.return_type()
    } else {
        TypeSeq::scalar(TypeTag::Unresolved)
    };
    s.require_type(&ty);
    let text = format!("{}({})", sig.java, texts.join(", "));
    Some(Fragment::new(text, ty, pos).with_flags(Flags::STATEMENT | Flags::EFFECT))
}

/// A declaration left without an initializer: `my $x;`.
fn bare_declaration(s: &mut Session, id: SymbolId) -> String {
    let ty = settle(s, id, None);
    let symbol = s.symbols.get(id);
    if symbol.shared {
        emit_field(s, id);
        return String::new();
    }
    if symbol.hoisted {
        return String::new();
    }
    format!("{} {} = {};\n", ty.java(), symbol.java, ty.default_value())
}

/// Whether `text` is a Java method invocation or instance creation.
fn is_call(text: &str) -> bool {
    text.ends_with(')') && !text.starts_with('(') && !text.starts_with('!') && !needs_parens(text)
}

fn statement_text(s: &mut Session, frag: Fragment) -> String {
    if frag.is(Flags::BLOCK) {
        return frag.text;
    }
    if let Some(Place::Declared(id)) = frag.place {
        return bare_declaration(s, id);
    }
    if let Some(items) = frag.elements.as_ref().filter(|_| frag.place.is_none()) {
        let ids: Vec<SymbolId> = items
            .iter()
            .filter_map(|i| match i.place {
                Some(Place::Declared(id)) => Some(id),
                _ => None,
            })
            .collect();
        if !ids.is_empty() && ids.len() == items.len() {
            return ids.into_iter().map(|id| bare_declaration(s, id)).collect();
        }
    }
    if frag.is(Flags::STATEMENT) || is_call(&frag.text) {
        return format!("{};\n", frag.text);
    }
    if frag.is(Flags::EFFECT) {
        return format!("{}({});\n", s.runtime("eval"), frag.text);
    }
    String::new()
}

/// Turn a fragment into statement text, preceded by any declarations
/// hoisted out of it. Values without effects are dropped.
pub fn create_statement(s: &mut Session, frag: Fragment) -> String {
    let body = statement_text(s, frag);
    let mut code: String = s.take_hoisted().concat();
    code.push_str(&body);
    code
}

/// A double-quoted literal, pattern or replacement with its variables
/// interpolated.
pub fn interpolate(s: &mut Session, raw: &str, mode: Mode, pos: Position) -> Fragment {
    let pieces = escape::interpolate(raw, mode, |e| embedded(s, e, pos));
    Fragment::scalar(escape::join_pieces(&pieces), TypeTag::String, pos)
}

fn embedded(s: &mut Session, e: &Embedded, pos: Position) -> Option<(String, bool)> {
    if e.subscript.is_none() && !e.name.is_empty() && e.name.bytes().all(|b| b.is_ascii_digit()) {
        let n = e.name.parse().ok()?;
        return Some((capture_group(s, n, pos).text, true));
    }
    let value = match &e.subscript {
        Some(sub) => {
            let sigil = if sub.hash { Sigil::Hash } else { Sigil::Array };
            let base = read_var(s, sigil, &e.name, pos);
            let key = match &sub.key {
                Key::Literal(k) if sub.hash => Fragment::scalar(escape::java_string(k), TypeTag::String, pos),
                Key::Literal(k) => Fragment::scalar(k.clone(), TypeTag::Integer, pos),
                Key::Var(v) => read_var(s, Sigil::Scalar, v, pos),
            };
            collections::resolve(s, Access::new(base).push(AccessOp::Index { hash: sub.hash, key, pos }))
        }
        None => read_var(s, e.sigil, &e.name, pos),
    };
    if value.ty.is_scalar() {
        let is_string = value.ty.is(TypeTag::String);
        return Some((value.text, is_string));
    }
    let text = format!("{}(\" \", {})", s.runtime("join"), value.text);
    Some((text, true))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::translate::session::FunctionState;

    fn decl(name: &str, sigil: Sigil) -> Declare {
        Declare { name: name.into(), sigil, pos: Position::default() }
    }

    fn int(text: &str) -> Fragment {
        Fragment::scalar(text, TypeTag::Integer, Position::default())
    }

    #[test]
    fn declaration_infers_from_initializer() {
        let mut s = Session::new();
        let target = declare(&mut s, &decl("x", Sigil::Scalar), false);
        let out = assign(&mut s, target, int("3 + 4"));
        assert_eq!(out.text, "int x = 3 + 4");
        assert_eq!(create_statement(&mut s, out), "int x = 3 + 4;\n");
        assert!(s.diagnostics().is_empty());
    }

    #[test]
    fn annotation_types_the_declaration() {
        let mut s = Session::new();
        annotate(&mut s, &[Label::Type(TypeTag::Double)], Position::default());
        let target = declare(&mut s, &decl("x", Sigil::Scalar), false);
        assert_eq!(assign(&mut s, target, int("1")).text, "double x = 1.0");
    }

    #[test]
    fn missing_type_falls_back_by_sigil() {
        let mut s = Session::new();
        let target = declare(&mut s, &decl("a", Sigil::Array), false);
        assert_eq!(create_statement(&mut s, target), "PerlList<String> a = new PerlList<>();\n");
        assert_eq!(s.diagnostics()[0].kind, DiagnosticKind::MissingType);
    }

    #[test]
    fn loop_header_hoists_declarations() {
        let mut s = Session::new();
        s.toggle_loop_header();
        let target = declare(&mut s, &decl("line", Sigil::Scalar), false);
        let input = Fragment::scalar("Pd.readLine(STDIN)", TypeTag::String, Position::default()).with_flags(Flags::INPUT);
        let out = assign(&mut s, target, input);
        assert_eq!(out.text, "line = Pd.readLine(STDIN)");
        assert!(out.is(Flags::INPUT));
        assert_eq!(s.take_hoisted(), vec!["String line;\n".to_string()]);
    }

    #[test]
    fn undeclared_read_is_reported() {
        let mut s = Session::new();
        let f = read_var(&mut s, Sigil::Scalar, "nope", Position::new(3, 10, 15));
        assert_eq!(f.ty, TypeSeq::scalar(TypeTag::Unresolved));
        assert_eq!(s.diagnostics()[0].kind, DiagnosticKind::UndeclaredIdentifier);
        assert_eq!(s.diagnostics()[0].pos.line, 3);
    }

    #[test]
    fn default_variable_becomes_a_field() {
        let mut s = Session::new();
        let f = read_var(&mut s, Sigil::Scalar, "_", Position::default());
        assert_eq!(f.text, "it");
        let t = s.finish("Main");
        assert_eq!(t.fields, "static String it = null;\n");
    }

    #[test]
    fn swap_goes_through_temporaries() {
        let mut s = Session::new();
        for name in ["a", "b"] {
            let target = declare(&mut s, &decl(name, Sigil::Scalar), false);
            assign(&mut s, target, int("0"));
        }
        let a = read_var(&mut s, Sigil::Scalar, "a", Position::default());
        let b = read_var(&mut s, Sigil::Scalar, "b", Position::default());
        let out = multi_assign(&mut s, vec![a.clone(), b.clone()], Source::Items(vec![b, a]), Position::default());
        assert_eq!(out.text, "int _t = b;\nint _t_1 = a;\na = _t;\nb = _t_1;\n");
    }

    #[test]
    fn list_value_is_spread_over_declarations() {
        let mut s = Session::new();
        let parts = Fragment::new(
            "Pd.split(\",\", line)",
            TypeSeq::from_tags(&[TypeTag::List, TypeTag::String]),
            Position::default(),
        );
        let targets = vec![
            declare(&mut s, &decl("first", Sigil::Scalar), false),
            declare(&mut s, &decl("rest", Sigil::Array), false),
        ];
        let out = multi_assign(&mut s, targets, Source::Value(parts), Position::default());
        assert_eq!(
            out.text,
            "PerlList<String> _t = Pd.split(\",\", line);\nString first = _t.get(0);\nPerlList<String> rest = Pd.sliceFrom(_t, 1);\n"
        );
    }

    #[test]
    fn advanced_declaration_declares_each_name() {
        let mut s = Session::new();
        let labels = [
            Label::Declare { name: "a".into(), sigil: Sigil::Scalar },
            Label::Declare { name: "b".into(), sigil: Sigil::Scalar },
            Label::Type(TypeTag::Integer),
        ];
        assert_eq!(annotate(&mut s, &labels, Position::default()).unwrap(), "int a = 0;\nint b = 0;\n");
        assert!(s.symbols.lookup("$b").is_some());
    }

    #[test]
    fn label_types_split_at_scalars() {
        let labels = [
            Label::Type(TypeTag::Array),
            Label::Size(10),
            Label::Type(TypeTag::Integer),
            Label::Type(TypeTag::String),
        ];
        let types = label_types(&labels);
        assert_eq!(types.len(), 2);
        assert_eq!(types[0].head_size(), Some(10));
        assert_eq!(types[1], TypeSeq::scalar(TypeTag::String));
    }

    #[test]
    fn first_return_fixes_the_type() {
        let mut s = Session::new();
        s.function = Some(FunctionState {
            name: "f".into(),
            params: vec![],
            next_shift: 0,
            returns: vec![],
            declared_returns: false,
            variadic: false,
        });
        let out = return_stmt(&mut s, vec![int("1")], Position::default());
        assert_eq!(out.text, "return 1;\n");
        let out = return_stmt(&mut s, vec![Fragment::scalar("x", TypeTag::Double, Position::default())], Position::default());
        assert_eq!(out.text, "return (int) x;\n");
    }

    #[test]
    fn loop_control_outside_loop_is_reported() {
        let mut s = Session::new();
        assert_eq!(loop_control(&mut s, true, Position::default()).text, "break;\n");
        assert_eq!(s.diagnostics()[0].kind, DiagnosticKind::MisplacedStatement);
    }

    #[test]
    fn interpolation_reads_variables() {
        let mut s = Session::new();
        let target = declare(&mut s, &decl("name", Sigil::Scalar), false);
        assign(&mut s, target, Fragment::scalar("\"x\"", TypeTag::String, Position::default()));
        let f = interpolate(&mut s, "Hello, $name!", Mode::Text, Position::default());
        assert_eq!(f.text, "\"Hello, \" + name + \"!\"");
    }

    #[test]
    fn pure_expressions_are_dropped() {
        let mut s = Session::new();
        assert_eq!(create_statement(&mut s, int("1")), "");
        let call = Fragment::scalar("Pd.now()", TypeTag::Integer, Position::default());
        assert_eq!(create_statement(&mut s, call), "Pd.now();\n");
    }

    #[test]
    fn mentions_respects_word_boundaries() {
        assert!(mentions("a + b", "a"));
        assert!(!mentions("ab + c", "a"));
        assert!(!mentions("x_a", "a"));
    }
}
