//! Predefined functions: one table entry per function names its parameter
//! kinds, how it parses without parentheses and how its call is built.

use super::cast;
use super::collections;
use super::error::DiagnosticKind;
use super::fragment::{Flags, Fragment, Place};
use super::lexer::Sigil;
use super::position::Position;
use super::session::{Feature, Session};
use super::statements;
use super::types::{TypeSeq, TypeTag};

/// How a call without parentheses takes its arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Form {
    /// `length $x < 5` is `length($x) < 5`: one operand, tighter than comparison.
    Unary,
    /// `print $a, $b` takes the rest of the comma list.
    List,
}

/// What an argument is converted to before the call is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Param {
    Text,
    Int,
    Num,
    Any,
    /// An ordered list or array.
    Array,
    Hash,
    /// Something that can be written back: a variable or an element.
    Place,
    /// Any number of further arguments, taken as they are.
    Rest,
}

/// Arguments of one call, already converted.
#[derive(Debug)]
pub struct Call {
    pub args: Vec<Fragment>,
    /// `STDERR`/`STDOUT` before a print list.
    pub handle: Option<Fragment>,
    /// Java lambda text for `sort { ... }`.
    pub comparator: Option<String>,
    pub pos: Position,
}

impl Call {
    fn arg(&self, i: usize) -> Fragment {
        self.args
            .get(i)
            .cloned()
            .unwrap_or_else(|| Fragment::scalar("null", TypeTag::Unresolved, self.pos))
    }
}

#[derive(Debug)]
pub struct Builtin {
    pub name: &'static str,
    pub form: Form,
    pub params: &'static [Param],
    /// Trailing parameters that may be left out.
    pub optional: usize,
    /// Without arguments the call works on `$_`.
    pub topic: bool,
    build: fn(&mut Session, Call) -> Fragment,
}

pub static BUILTINS: &[Builtin] = &[
    // Output and control
    Builtin { name: "print", form: Form::List, params: &[Param::Rest], optional: 1, topic: true, build: print },
    Builtin { name: "say", form: Form::List, params: &[Param::Rest], optional: 1, topic: true, build: say },
    Builtin { name: "printf", form: Form::List, params: &[Param::Text, Param::Rest], optional: 1, topic: false, build: printf },
    Builtin { name: "die", form: Form::List, params: &[Param::Rest], optional: 1, topic: false, build: die },
    Builtin { name: "exit", form: Form::Unary, params: &[Param::Int], optional: 1, topic: false, build: exit },
    // Scalars
    Builtin { name: "length", form: Form::Unary, params: &[Param::Text], optional: 0, topic: true, build: length },
    Builtin { name: "scalar", form: Form::Unary, params: &[Param::Any], optional: 0, topic: false, build: scalar },
    Builtin { name: "defined", form: Form::Unary, params: &[Param::Any], optional: 0, topic: true, build: defined },
    Builtin { name: "uc", form: Form::Unary, params: &[Param::Text], optional: 0, topic: true, build: uc },
    Builtin { name: "lc", form: Form::Unary, params: &[Param::Text], optional: 0, topic: true, build: lc },
    Builtin { name: "ucfirst", form: Form::Unary, params: &[Param::Text], optional: 0, topic: true, build: ucfirst },
    Builtin { name: "lcfirst", form: Form::Unary, params: &[Param::Text], optional: 0, topic: true, build: lcfirst },
    Builtin { name: "abs", form: Form::Unary, params: &[Param::Any], optional: 0, topic: true, build: abs },
    Builtin { name: "int", form: Form::Unary, params: &[Param::Any], optional: 0, topic: true, build: int },
    Builtin { name: "sqrt", form: Form::Unary, params: &[Param::Num], optional: 0, topic: true, build: sqrt },
    Builtin { name: "chomp", form: Form::Unary, params: &[Param::Place], optional: 0, topic: true, build: chomp },
    Builtin { name: "substr", form: Form::List, params: &[Param::Text, Param::Int, Param::Int], optional: 1, topic: false, build: substr },
    Builtin { name: "index", form: Form::List, params: &[Param::Text, Param::Text, Param::Int], optional: 1, topic: false, build: index },
    Builtin { name: "sprintf", form: Form::List, params: &[Param::Text, Param::Rest], optional: 1, topic: false, build: sprintf },
    Builtin { name: "join", form: Form::List, params: &[Param::Text, Param::Rest], optional: 0, topic: false, build: join },
    Builtin { name: "split", form: Form::List, params: &[Param::Any, Param::Text, Param::Int], optional: 2, topic: false, build: split },
    // Collections
    Builtin { name: "push", form: Form::List, params: &[Param::Array, Param::Rest], optional: 0, topic: false, build: push },
    Builtin { name: "unshift", form: Form::List, params: &[Param::Array, Param::Rest], optional: 0, topic: false, build: unshift },
    Builtin { name: "pop", form: Form::Unary, params: &[Param::Array], optional: 0, topic: false, build: pop },
    Builtin { name: "shift", form: Form::Unary, params: &[Param::Array], optional: 0, topic: false, build: shift },
    Builtin { name: "keys", form: Form::Unary, params: &[Param::Hash], optional: 0, topic: false, build: keys },
    Builtin { name: "values", form: Form::Unary, params: &[Param::Hash], optional: 0, topic: false, build: values },
    Builtin { name: "exists", form: Form::Unary, params: &[Param::Place], optional: 0, topic: false, build: exists },
    Builtin { name: "delete", form: Form::Unary, params: &[Param::Place], optional: 0, topic: false, build: delete },
    Builtin { name: "reverse", form: Form::List, params: &[Param::Rest], optional: 0, topic: false, build: reverse },
    Builtin { name: "sort", form: Form::List, params: &[Param::Rest], optional: 0, topic: false, build: sort },
];

pub fn lookup_builtin(name: &str) -> Option<&'static Builtin> {
    BUILTINS.iter().find(|b| b.name == name)
}

/// Convert the arguments per the entry's parameter kinds and build the call.
pub fn call(s: &mut Session, builtin: &Builtin, mut args: Vec<Fragment>, comparator: Option<String>, pos: Position) -> Fragment {
    let handle = match args.first() {
        Some(first) if first.is(Flags::FILEHANDLE) => Some(args.remove(0)),
        _ => None,
    };
    if args.is_empty() && builtin.topic {
        args.push(statements::read_var(s, Sigil::Scalar, "_", pos));
    }

    let rest = builtin.params.last() == Some(&Param::Rest);
    let required = builtin.params.len().saturating_sub(builtin.optional);
    if args.len() < required || (!rest && args.len() > builtin.params.len()) {
        s.report(
            DiagnosticKind::ArgumentCount,
            format!("'{}' takes {} arguments, found {}", builtin.name, builtin.params.len(), args.len()),
            pos,
        );
    }

    let args = args
        .into_iter()
        .enumerate()
        .map(|(i, arg)| {
            let kind = builtin.params.get(i).copied().unwrap_or(Param::Rest);
            convert(s, builtin.name, kind, arg)
        })
        .collect();
    (builtin.build)(s, Call { args, handle, comparator, pos })
}

fn convert(s: &mut Session, name: &str, kind: Param, arg: Fragment) -> Fragment {
    match kind {
        Param::Text => cast::to_string(s, arg),
        Param::Int => cast::to_integer(s, arg),
        Param::Num => cast::cast(s, arg, &TypeSeq::scalar(TypeTag::Double)),
        Param::Any | Param::Rest => arg,
        Param::Array => match arg.ty.head() {
            Some(TypeTag::List | TypeTag::Array) => arg,
            Some(TypeTag::Unresolved) => cast::cast(s, arg, &TypeSeq::from_tags(&[TypeTag::List, TypeTag::Unresolved])),
            _ => {
                s.report(
                    DiagnosticKind::DimensionMismatch,
                    format!("'{name}' needs an array, found {}", arg.ty),
                    arg.pos,
                );
                arg
            }
        },
        Param::Hash => match arg.ty.head() {
            Some(TypeTag::Hash) => arg,
            Some(TypeTag::Unresolved) => cast::cast(s, arg, &TypeSeq::from_tags(&[TypeTag::Hash, TypeTag::Unresolved])),
            _ => {
                s.report(
                    DiagnosticKind::DimensionMismatch,
                    format!("'{name}' needs a hash, found {}", arg.ty),
                    arg.pos,
                );
                arg
            }
        },
        Param::Place => {
            if !matches!(arg.place, Some(ref p) if !matches!(p, Place::Declared(_))) {
                s.report(
                    DiagnosticKind::UnsupportedOperator,
                    format!("'{name}' needs a variable or element, found {}", arg.text),
                    arg.pos,
                );
            }
            arg
        }
    }
}

fn value(text: String, tag: TypeTag, pos: Position) -> Fragment {
    Fragment::scalar(text, tag, pos)
}

fn effect(text: String, ty: TypeSeq, pos: Position) -> Fragment {
    Fragment::new(text, ty, pos).with_flags(Flags::STATEMENT | Flags::EFFECT)
}

/// The arguments as one collection: a lone list argument as it is,
/// anything else gathered into a list literal.
fn list_of(s: &mut Session, items: Vec<Fragment>, pos: Position) -> Fragment {
    if let [one] = items.as_slice() {
        match one.ty.head() {
            Some(TypeTag::List | TypeTag::Array) => return one.clone(),
            Some(TypeTag::Hash) => {
                let ty = cast::unify(&one.ty.inner(), &TypeSeq::scalar(TypeTag::String)).wrap(TypeTag::List);
                return cast::cast(s, one.clone(), &ty);
            }
            _ => {}
        }
    }
    collections::list_literal(s, items, false, pos)
}

/// Print arguments as one string expression.
fn concatenation(s: &mut Session, items: Vec<Fragment>) -> String {
    let single = items.len() == 1;
    let mut parts = Vec::with_capacity(items.len());
    for (i, item) in items.into_iter().enumerate() {
        let item = if item.ty.head().is_some_and(TypeTag::is_dimension) && !item.ty.is(TypeTag::Ref) {
            let text = format!("{}(\"\", {})", s.runtime("join"), item.text);
            Fragment::scalar(text, TypeTag::String, item.pos)
        } else if item.ty.is(TypeTag::Boolean) {
            // true prints as 1, false as the empty string.
            let text = format!("{}({})", s.runtime("toStr"), item.text);
            Fragment::scalar(text, TypeTag::String, item.pos)
        } else if i == 0 && !single && !item.ty.is(TypeTag::String) {
            cast::to_string(s, item)
        } else {
            item
        };
        parts.push(if single { item.text } else { item.operand() });
    }
    parts.join(" + ")
}

fn stream(call: &Call) -> String {
    call.handle.as_ref().map_or_else(|| "System.out".to_string(), |h| h.text.clone())
}

fn print(s: &mut Session, call: Call) -> Fragment {
    let stream = stream(&call);
    let text = concatenation(s, call.args);
    effect(format!("{stream}.print({text})"), TypeSeq::void(), call.pos)
}

fn say(s: &mut Session, call: Call) -> Fragment {
    let stream = stream(&call);
    let text = concatenation(s, call.args);
    effect(format!("{stream}.println({text})"), TypeSeq::void(), call.pos)
}

fn printf(_s: &mut Session, call: Call) -> Fragment {
    let stream = stream(&call);
    let args: Vec<String> = call.args.iter().map(|a| a.text.clone()).collect();
    effect(format!("{stream}.printf({})", args.join(", ")), TypeSeq::void(), call.pos)
}

fn die(s: &mut Session, call: Call) -> Fragment {
    let message = if call.args.is_empty() {
        "\"Died\"".to_string()
    } else {
        concatenation(s, call.args)
    };
    effect(format!("{}({message})", s.runtime("die")), TypeSeq::void(), call.pos)
}

fn exit(_s: &mut Session, call: Call) -> Fragment {
    let code = call.args.first().map_or_else(|| "0".to_string(), |c| c.text.clone());
    effect(format!("System.exit({code})"), TypeSeq::void(), call.pos)
}

fn length(_s: &mut Session, call: Call) -> Fragment {
    value(format!("{}.length()", call.arg(0).operand()), TypeTag::Integer, call.pos)
}

fn scalar(_s: &mut Session, call: Call) -> Fragment {
    let arg = call.arg(0);
    match arg.ty.head() {
        Some(TypeTag::List | TypeTag::Array | TypeTag::Hash) => value(collections::size_of(&arg), TypeTag::Integer, call.pos),
        _ => arg,
    }
}

fn defined(_s: &mut Session, call: Call) -> Fragment {
    let arg = call.arg(0);
    let primitive = arg.ty.is_scalar() && !matches!(arg.ty.head(), Some(TypeTag::String | TypeTag::Unresolved));
    let text = if primitive { "true".to_string() } else { format!("{} != null", arg.operand()) };
    value(text, TypeTag::Boolean, call.pos)
}

fn uc(_s: &mut Session, call: Call) -> Fragment {
    value(format!("{}.toUpperCase()", call.arg(0).operand()), TypeTag::String, call.pos)
}

fn lc(_s: &mut Session, call: Call) -> Fragment {
    value(format!("{}.toLowerCase()", call.arg(0).operand()), TypeTag::String, call.pos)
}

fn ucfirst(s: &mut Session, call: Call) -> Fragment {
    value(format!("{}({})", s.runtime("ucfirst"), call.arg(0).text), TypeTag::String, call.pos)
}

fn lcfirst(s: &mut Session, call: Call) -> Fragment {
    value(format!("{}({})", s.runtime("lcfirst"), call.arg(0).text), TypeTag::String, call.pos)
}

fn abs(s: &mut Session, call: Call) -> Fragment {
    let arg = call.arg(0);
    let arg = if arg.ty.is_numeric() { arg } else { cast::cast(s, arg, &TypeSeq::scalar(TypeTag::Double)) };
    Fragment::new(format!("Math.abs({})", arg.text), arg.ty, call.pos)
}

fn int(s: &mut Session, call: Call) -> Fragment {
    let arg = call.arg(0);
    let mut out = if arg.ty.is(TypeTag::Long) { arg } else { cast::to_integer(s, arg) };
    out.pos = call.pos;
    out
}

fn sqrt(_s: &mut Session, call: Call) -> Fragment {
    value(format!("Math.sqrt({})", call.arg(0).text), TypeTag::Double, call.pos)
}

/// `chomp $x` stores the trimmed value back. `chomp(my $x = <STDIN>)`
/// runs the assignment first.
fn chomp(s: &mut Session, call: Call) -> Fragment {
    let arg = call.arg(0);
    let Some(place) = arg.place.clone() else {
        return value(format!("{}({})", s.runtime("chomp"), arg.text), TypeTag::String, call.pos);
    };
    let current = match &place {
        Place::Direct(lvalue) => lvalue.clone(),
        _ => arg.text.clone(),
    };
    if arg.is(Flags::STATEMENT) {
        s.hoist(format!("{};\n", arg.text));
    }
    let trimmed = format!("{}({current})", s.runtime("chomp"));
    let text = place.store(&trimmed).unwrap_or(trimmed);
    effect(text, TypeSeq::scalar(TypeTag::String), call.pos)
}

fn substr(s: &mut Session, call: Call) -> Fragment {
    let args: Vec<String> = call.args.iter().map(|a| a.text.clone()).collect();
    value(format!("{}({})", s.runtime("substr"), args.join(", ")), TypeTag::String, call.pos)
}

fn index(_s: &mut Session, call: Call) -> Fragment {
    let rest: Vec<String> = call.args.iter().skip(1).map(|a| a.text.clone()).collect();
    value(format!("{}.indexOf({})", call.arg(0).operand(), rest.join(", ")), TypeTag::Integer, call.pos)
}

fn sprintf(_s: &mut Session, call: Call) -> Fragment {
    let args: Vec<String> = call.args.iter().map(|a| a.text.clone()).collect();
    value(format!("String.format({})", args.join(", ")), TypeTag::String, call.pos)
}

fn join(s: &mut Session, call: Call) -> Fragment {
    let sep = call.arg(0);
    let list = list_of(s, call.args.into_iter().skip(1).collect(), call.pos);
    value(format!("{}({}, {})", s.runtime("join"), sep.text, list.text), TypeTag::String, call.pos)
}

fn split(s: &mut Session, mut call: Call) -> Fragment {
    if call.args.len() < 2 {
        let topic = statements::read_var(s, Sigil::Scalar, "_", call.pos);
        call.args.push(topic);
    }
    let pattern = call.arg(0);
    let pattern = if pattern.is(Flags::PATTERN) {
        pattern.alt.clone().unwrap_or(pattern.text)
    } else {
        cast::to_string(s, pattern).text
    };
    let mut args = vec![pattern];
    args.extend(call.args.iter().skip(1).map(|a| a.text.clone()));
    s.require(Feature::List);
    let text = format!("{}({})", s.runtime("split"), args.join(", "));
    Fragment::new(text, TypeSeq::from_tags(&[TypeTag::List, TypeTag::String]), call.pos)
}

fn growable(s: &mut Session, name: &str, target: &Fragment) {
    if target.ty.is(TypeTag::Array) {
        s.report(
            DiagnosticKind::DimensionMismatch,
            format!("'{name}' cannot grow the fixed-size array {}", target.text),
            target.pos,
        );
    }
}

fn push(s: &mut Session, call: Call) -> Fragment {
    let target = call.arg(0);
    growable(s, "push", &target);
    let elem = target.ty.inner();
    let items: Vec<Fragment> = call.args.into_iter().skip(1).collect();
    let text = match items.as_slice() {
        [one] if one.ty.is_scalar() => {
            let item = cast::cast(s, one.clone(), &elem);
            format!("{}.add({})", target.operand(), item.text)
        }
        _ => {
            let list = list_of(s, items, call.pos);
            let list = cast::cast(s, list, &elem.wrap(TypeTag::List));
            format!("{}({}, {})", s.runtime("push"), target.text, list.text)
        }
    };
    effect(text, TypeSeq::void(), call.pos)
}

fn unshift(s: &mut Session, call: Call) -> Fragment {
    let target = call.arg(0);
    growable(s, "unshift", &target);
    let elem = target.ty.inner();
    let list = list_of(s, call.args.into_iter().skip(1).collect(), call.pos);
    let list = cast::cast(s, list, &elem.wrap(TypeTag::List));
    effect(format!("{}({}, {})", s.runtime("unshift"), target.text, list.text), TypeSeq::void(), call.pos)
}

fn removal(s: &mut Session, helper: &str, call: &Call) -> Fragment {
    let target = call.arg(0);
    growable(s, helper, &target);
    let ty = target.ty.inner();
    let ty = if ty.is_void() { TypeSeq::scalar(TypeTag::Unresolved) } else { ty };
    effect(format!("{}({})", s.runtime(helper), target.text), ty, call.pos)
}

fn pop(s: &mut Session, call: Call) -> Fragment {
    removal(s, "pop", &call)
}

fn shift(s: &mut Session, call: Call) -> Fragment {
    let target = call.arg(0);
    if target.text == "args" && target.ty.is(TypeTag::Array) {
        return statements::next_argv(s, call.pos);
    }
    removal(s, "shift", &call)
}

fn keys(s: &mut Session, call: Call) -> Fragment {
    s.require(Feature::List);
    let text = format!("{}.keys()", call.arg(0).operand());
    Fragment::new(text, TypeSeq::from_tags(&[TypeTag::List, TypeTag::String]), call.pos)
}

fn values(s: &mut Session, call: Call) -> Fragment {
    s.require(Feature::List);
    let hash = call.arg(0);
    let text = format!("{}.values()", hash.operand());
    Fragment::new(text, hash.ty.inner().wrap(TypeTag::List), call.pos)
}

fn exists(_s: &mut Session, call: Call) -> Fragment {
    let arg = call.arg(0);
    let text = match &arg.place {
        Some(Place::Element { container, key, dim: TypeTag::Hash }) => format!("{container}.containsKey({key})"),
        Some(Place::Element { container, key, .. }) => format!("{key} < {container}.size()"),
        _ => format!("{} != null", arg.operand()),
    };
    value(text, TypeTag::Boolean, call.pos)
}

fn delete(s: &mut Session, call: Call) -> Fragment {
    let arg = call.arg(0);
    match &arg.place {
        Some(Place::Element { container, key, dim: TypeTag::Hash }) => {
            effect(format!("{container}.remove({key})"), arg.ty.clone(), call.pos)
        }
        _ => {
            s.report(
                DiagnosticKind::UnsupportedOperator,
                format!("'delete' needs a hash element, found {}", arg.text),
                call.pos,
            );
            arg
        }
    }
}

fn reverse(s: &mut Session, call: Call) -> Fragment {
    if let [one] = call.args.as_slice() {
        if one.ty.is(TypeTag::String) && one.ty.is_scalar() {
            let text = format!("new StringBuilder({}).reverse().toString()", one.text);
            return value(text, TypeTag::String, call.pos);
        }
    }
    let list = list_of(s, call.args, call.pos);
    let ty = list.ty.clone();
    Fragment::new(format!("{}({})", s.runtime("reverse"), list.text), ty, call.pos)
}

fn sort(s: &mut Session, call: Call) -> Fragment {
    let list = list_of(s, call.args, call.pos);
    let list = if list.ty.is(TypeTag::Array) {
        let ty = list.ty.inner().wrap(TypeTag::List);
        cast::cast(s, list, &ty)
    } else {
        list
    };
    let ty = list.ty.clone();
    let text = match call.comparator {
        Some(cmp) => format!("{}({}, {cmp})", s.runtime("sort"), list.text),
        None => format!("{}({})", s.runtime("sort"), list.text),
    };
    Fragment::new(text, ty, call.pos)
}
