//! Conditionals, loops, statement modifiers and sub definitions.
//!
//! Bodies arrive as complete, unindented statement text; every construct
//! indents its own bodies one level.

use super::cast;
use super::fragment::{Flags, Fragment};
use super::ops::{self, UnOp};
use super::position::Position;
use super::session::Session;
use super::types::{TypeSeq, TypeTag};

pub const INDENT: &str = "    ";

/// Indent every non-empty line of `code` by one level.
pub fn indent(code: &str) -> String {
    let mut out = String::with_capacity(code.len() + code.len() / 4);
    for line in code.lines() {
        if !line.is_empty() {
            out.push_str(INDENT);
            out.push_str(line);
        }
        out.push('\n');
    }
    out
}

fn condition(s: &mut Session, cond: Fragment, negate: bool) -> String {
    let cond = if negate {
        ops::unary(s, UnOp::Not, cond, Position::default())
    } else {
        cast::to_boolean(s, cond)
    };
    cond.text
}

/// One arm of an `if` chain; the trailing `else` has no condition.
#[derive(Debug)]
pub struct Arm {
    pub cond: Option<Fragment>,
    pub negate: bool,
    pub body: String,
    /// Every path through `body` ends in a `return`.
    pub returns: bool,
}

/// `if`/`unless` with its `elsif` and `else` arms, in source order. The
/// chain returns when it has an `else` and every arm returns.
pub fn if_chain(s: &mut Session, arms: Vec<Arm>, pos: Position) -> Fragment {
    let returns = arms.iter().any(|a| a.cond.is_none()) && arms.iter().all(|a| a.returns);
    let mut text = String::new();
    for (i, arm) in arms.into_iter().enumerate() {
        let body = indent(&arm.body);
        match arm.cond {
            Some(cond) => {
                let cond = condition(s, cond, arm.negate);
                if i == 0 {
                    text.push_str(&format!("if ({cond}) {{\n{body}}}"));
                } else {
                    text.push_str(&format!(" else if ({cond}) {{\n{body}}}"));
                }
            }
            None => text.push_str(&format!(" else {{\n{body}}}")),
        }
    }
    text.push('\n');
    let frag = Fragment::statement(text, pos);
    if returns {
        frag.with_flags(Flags::RETURN)
    } else {
        frag
    }
}

/// `while`/`until` with the condition checked first.
pub fn while_loop(s: &mut Session, cond: Option<Fragment>, until: bool, body: &str, pos: Position) -> Fragment {
    let cond = match cond {
        Some(cond) => condition(s, cond, until),
        None => (!until).to_string(),
    };
    Fragment::statement(format!("while ({cond}) {{\n{}}}\n", indent(body)), pos)
}

/// `do { ... } while/until (...)`: the body runs before the first check.
pub fn do_while(s: &mut Session, body: &str, cond: Fragment, until: bool, pos: Position) -> Fragment {
    let cond = condition(s, cond, until);
    Fragment::statement(format!("do {{\n{}}} while ({cond});\n", indent(body)), pos)
}

/// Split `T name;` into its type and name.
fn split_declaration(line: &str) -> Option<(&str, &str)> {
    let line = line.trim().strip_suffix(';')?;
    let (ty, name) = line.rsplit_once(' ')?;
    Some((ty, name))
}

/// C-style `for`. `hoisted` holds the declarations made in the header; a
/// single declaration initialized by the only init clause moves into the
/// header itself.
pub fn for_loop(
    s: &mut Session,
    init: Vec<Fragment>,
    mut hoisted: Vec<String>,
    cond: Option<Fragment>,
    step: Vec<Fragment>,
    body: &str,
    pos: Position,
) -> Fragment {
    let mut init_text: Vec<String> = init.into_iter().map(|f| f.text).collect();
    if let ([line], [first]) = (hoisted.as_slice(), init_text.as_mut_slice()) {
        if let Some((ty, name)) = split_declaration(line) {
            if first.starts_with(&format!("{name} = ")) {
                *first = format!("{ty} {first}");
                hoisted.clear();
            }
        }
    }
    let cond = cond.map(|c| condition(s, c, false)).unwrap_or_default();
    let step: Vec<String> = step.into_iter().map(|f| f.text).collect();
    let text = format!(
        "for ({}; {cond}; {}) {{\n{}}}\n",
        init_text.join(", "),
        step.join(", "),
        indent(body)
    );
    wrap_hoisted(hoisted, Fragment::statement(text, pos))
}

/// The collection a `foreach` walks and the type of its elements.
pub fn iteration(s: &mut Session, list: Fragment) -> (Fragment, TypeSeq) {
    let list = match list.ty.head() {
        Some(TypeTag::List | TypeTag::Array) => list,
        Some(TypeTag::Hash) => {
            let ty = cast::unify(&list.ty.inner(), &TypeSeq::scalar(TypeTag::String)).wrap(TypeTag::List);
            cast::cast(s, list, &ty)
        }
        Some(TypeTag::Unresolved) | Some(TypeTag::Ref) | None => {
            cast::cast(s, list, &TypeSeq::from_tags(&[TypeTag::List, TypeTag::Unresolved]))
        }
        Some(_) => {
            let ty = list.ty.wrap(TypeTag::List);
            cast::cast(s, list, &ty)
        }
    };
    let elem = list.ty.inner();
    (list, elem)
}

/// `foreach` over a prepared collection with a loop variable `var`.
pub fn foreach(var: &str, elem: &TypeSeq, list: &Fragment, body: &str, pos: Position) -> Fragment {
    let text = format!("for ({} {var} : {}) {{\n{}}}\n", elem.java(), list.text, indent(body));
    Fragment::statement(text, pos)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modifier {
    If,
    Unless,
    While,
    Until,
}

/// `STATEMENT if COND;` and friends. `for` is handled as a `foreach`.
pub fn modifier(s: &mut Session, kind: Modifier, statement: &str, cond: Fragment, pos: Position) -> Fragment {
    match kind {
        Modifier::If | Modifier::Unless => {
            let cond = condition(s, cond, kind == Modifier::Unless);
            Fragment::statement(format!("if ({cond}) {{\n{}}}\n", indent(statement)), pos)
        }
        Modifier::While | Modifier::Until => while_loop(s, Some(cond), kind == Modifier::Until, statement, pos),
    }
}

pub fn bare_block(body: &str, returns: bool, pos: Position) -> Fragment {
    let frag = Fragment::statement(format!("{{\n{}}}\n", indent(body)), pos);
    if returns {
        frag.with_flags(Flags::RETURN)
    } else {
        frag
    }
}

/// Put declarations hoisted out of a header in front of the construct,
/// inside a block so they share its lifetime.
pub fn wrap_hoisted(hoisted: Vec<String>, frag: Fragment) -> Fragment {
    if hoisted.is_empty() {
        return frag;
    }
    let mut inner = hoisted.concat();
    inner.push_str(&frag.text);
    Fragment::statement(format!("{{\n{}}}\n", indent(&inner)), frag.pos).with_flags(frag.flags)
}

/// The typed header of a sub definition.
#[derive(Debug, Clone)]
pub struct FunctionHeader {
    pub java: String,
    pub params: Vec<(String, TypeSeq)>,
    pub variadic: bool,
    pub returns: TypeSeq,
}


/// Emit a sub into the function buffer.
/// `returns` tells whether the last statement of `body` always returns; if
/// not, a typed function gets a default `return` at the end.
pub fn function(s: &mut Session, header: &FunctionHeader, body: &str, returns: bool) {
    let params: Vec<String> = if header.variadic {
        header.params.iter().map(|(name, _)| format!("Object... {name}")).collect()
    } else {
        header.params.iter().map(|(name, ty)| format!("{} {name}", ty.java())).collect()
    };
    let mut body = body.to_string();
    if !header.returns.is_void() && !returns {
        body.push_str(&format!("return {};\n", header.returns.default_value()));
    }
    s.require_type(&header.returns);
    let text = format!(
        "public static {} {}({}) {{\n{}}}\n\n",
        header.returns.java(),
        header.java,
        params.join(", "),
        indent(&body)
    );
    s.push_function(&text);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cond(text: &str) -> Fragment {
        Fragment::scalar(text, TypeTag::Boolean, Position::default())
    }

    #[test]
    fn indent_skips_blank_lines() {
        assert_eq!(indent("a;\n\nb;\n"), "    a;\n\n    b;\n");
    }

    #[test]
    fn if_chain_keeps_source_order() {
        let mut s = Session::new();
        let arms = vec![
            Arm { cond: Some(cond("x == 1")), negate: false, body: "y = 2;\n".into(), returns: false },
            Arm { cond: Some(cond("x == 2")), negate: false, body: "y = 3;\n".into(), returns: false },
            Arm { cond: None, negate: false, body: "y = 4;\n".into(), returns: false },
        ];
        let f = if_chain(&mut s, arms, Position::default());
        assert_eq!(
            f.text,
            "if (x == 1) {\n    y = 2;\n} else if (x == 2) {\n    y = 3;\n} else {\n    y = 4;\n}\n"
        );
        assert!(f.is(Flags::BLOCK));
    }

    #[test]
    fn unless_negates() {
        let mut s = Session::new();
        let arms = vec![Arm { cond: Some(cond("done")), negate: true, body: "go();\n".into(), returns: true }];
        assert_eq!(if_chain(&mut s, arms, Position::default()).text, "if (!done) {\n    go();\n}\n");
    }

    #[test]
    fn until_loop_negates_condition() {
        let mut s = Session::new();
        let f = while_loop(&mut s, Some(cond("a < b")), true, "a++;\n", Position::default());
        assert_eq!(f.text, "while (!(a < b)) {\n    a++;\n}\n");
    }

    #[test]
    fn for_init_declaration_moves_into_header() {
        let mut s = Session::new();
        let init = vec![Fragment::scalar("i = 0", TypeTag::Integer, Position::default())];
        let step = vec![Fragment::scalar("i++", TypeTag::Integer, Position::default())];
        let f = for_loop(
            &mut s,
            init,
            vec!["int i;\n".into()],
            Some(cond("i < 10")),
            step,
            "f(i);\n",
            Position::default(),
        );
        assert_eq!(f.text, "for (int i = 0; i < 10; i++) {\n    f(i);\n}\n");
    }

    #[test]
    fn hoisted_condition_declarations_are_scoped() {
        let mut s = Session::new();
        let c = Fragment::scalar("line = Pd.readLine(STDIN)", TypeTag::String, Position::default())
            .with_flags(Flags::INPUT);
        let f = while_loop(&mut s, Some(c), false, "n++;\n", Position::default());
        let f = wrap_hoisted(vec!["String line;\n".into()], f);
        assert_eq!(
            f.text,
            "{\n    String line;\n    while ((line = Pd.readLine(STDIN)) != null) {\n        n++;\n    }\n}\n"
        );
    }

    #[test]
    fn foreach_uses_element_type() {
        let mut s = Session::new();
        let list = Fragment::new("items", TypeSeq::from_tags(&[TypeTag::List, TypeTag::Integer]), Position::default());
        let (list, elem) = iteration(&mut s, list);
        let f = foreach("x", &elem, &list, "total += x;\n", Position::default());
        assert_eq!(f.text, "for (int x : items) {\n    total += x;\n}\n");
    }

    #[test]
    fn functions_get_a_fallback_return() {
        let mut s = Session::new();
        let header = FunctionHeader {
            java: "count".into(),
            params: vec![("arg0".into(), TypeSeq::scalar(TypeTag::String))],
            variadic: false,
            returns: TypeSeq::scalar(TypeTag::Integer),
        };
        function(&mut s, &header, "Pd.print(arg0);\n", false);
        let t = s.finish("Main");
        assert_eq!(
            t.function_code,
            "public static int count(String arg0) {\n    Pd.print(arg0);\n    return 0;\n}\n\n"
        );
    }

    #[test]
    fn returning_bodies_are_left_alone() {
        let mut s = Session::new();
        let header = FunctionHeader {
            java: "one".into(),
            params: Vec::new(),
            variadic: false,
            returns: TypeSeq::scalar(TypeTag::Integer),
        };
        function(&mut s, &header, "return 1;\n", true);
        let t = s.finish("Main");
        assert_eq!(t.function_code, "public static int one() {\n    return 1;\n}\n\n");
    }

    #[test]
    fn if_chain_returns_only_with_else_and_every_arm_returning() {
        let mut s = Session::new();
        let arm = |c: Option<&str>, returns| Arm {
            cond: c.map(cond),
            negate: false,
            body: if returns { "return 1;\n".into() } else { "n = 2;\n".into() },
            returns,
        };
        let both = if_chain(&mut s, vec![arm(Some("a"), true), arm(None, true)], Position::default());
        assert!(both.is(Flags::RETURN));
        let else_falls = if_chain(&mut s, vec![arm(Some("a"), true), arm(None, false)], Position::default());
        assert!(!else_falls.is(Flags::RETURN));
        let no_else = if_chain(&mut s, vec![arm(Some("a"), true), arm(Some("b"), true)], Position::default());
        assert!(!no_else.is(Flags::RETURN));
    }
}
