//! Lexical scopes and variable bindings.
//!
//! Source variables live in three namespaces (`$x`, `@x`, `%x`), so bindings
//! are keyed by sigil plus name. Every binding also gets a Java name that is
//! unique among the names live at its declaration, since Java rejects local
//! shadowing and reserved words.

use std::collections::HashMap;

use super::position::Position;
use super::types::TypeSeq;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SymbolId(usize);

#[derive(Debug, Clone)]
pub struct Symbol {
    /// Sigil and name, e.g. `@items`.
    pub key: String,
    pub java: String,
    pub ty: TypeSeq,
    pub scope: usize,
    /// `our` variables: one static field shared by every scope.
    pub shared: bool,
    /// Declared but its initializer has not been seen yet.
    pub pending: bool,
    /// Declared inside a condition; its Java declaration precedes the statement.
    pub hoisted: bool,
    pub pos: Position,
}

#[derive(Debug)]
struct Scope {
    id: usize,
    function: bool,
    bindings: Vec<(String, SymbolId)>,
    names: Vec<String>,
}

/// Result of resolving a use of a variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lookup {
    pub id: SymbolId,
    /// The binding is a file-scope lexical seen from inside a function.
    pub captured: bool,
}

/// Result of a declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Declared {
    pub id: SymbolId,
    /// The same key was already declared in this scope.
    pub redeclared: bool,
    /// A shared variable seen for the first time; it needs a field.
    pub new_field: bool,
}

#[derive(Debug)]
pub struct SymbolTable {
    symbols: Vec<Symbol>,
    scopes: Vec<Scope>,
    next_scope: usize,
    live: HashMap<String, usize>,
    fields: HashMap<String, SymbolId>,
}

const JAVA_RESERVED: &[&str] = &[
    "abstract", "assert", "boolean", "break", "byte", "case", "catch", "char", "class", "const", "continue",
    "default", "do", "double", "else", "enum", "extends", "false", "final", "finally", "float", "for", "goto",
    "if", "implements", "import", "instanceof", "int", "interface", "long", "native", "new", "null", "package",
    "private", "protected", "public", "return", "short", "static", "strictfp", "super", "switch",
    "synchronized", "this", "throw", "throws", "transient", "true", "try", "var", "void", "volatile", "while",
    "args", "Pd", "Regex", "Ref", "PerlMap", "PerlList", "STDIN",
];

/// Java identifier for a source name.
pub fn java_base(name: &str) -> String {
    let name = name.rsplit("::").next().unwrap_or(name);
    let base = if name == "_" { "it".to_string() } else { name.to_string() };
    if JAVA_RESERVED.contains(&base.as_str()) {
        format!("{base}_")
    } else {
        base
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolTable {
    pub fn new() -> Self {
        Self {
            symbols: Vec::new(),
            scopes: vec![Scope {
                id: 0,
                function: false,
                bindings: Vec::new(),
                names: Vec::new(),
            }],
            next_scope: 1,
            live: HashMap::new(),
            fields: HashMap::new(),
        }
    }

    /// Enter a block. `function` marks the body of a sub, which cannot see
    /// the file-scope lexicals of `main`.
    pub fn open_scope(&mut self, function: bool) -> usize {
        let id = self.next_scope;
        self.next_scope += 1;
        self.scopes.push(Scope {
            id,
            function,
            bindings: Vec::new(),
            names: Vec::new(),
        });
        id
    }

    /// Leave the innermost block, discarding its bindings. The file scope
    /// is never closed.
    pub fn close_scope(&mut self) {
        if self.scopes.len() <= 1 {
            return;
        }
        if let Some(scope) = self.scopes.pop() {
            for name in scope.names {
                if let Some(count) = self.live.get_mut(&name) {
                    *count -= 1;
                    if *count == 0 {
                        self.live.remove(&name);
                    }
                }
            }
        }
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    /// Close scopes until `depth` remain.
    pub fn truncate(&mut self, depth: usize) {
        while self.scopes.len() > depth.max(1) {
            self.close_scope();
        }
    }

    pub fn current_scope(&self) -> usize {
        self.scopes.last().map_or(0, |s| s.id)
    }

    pub fn in_function(&self) -> bool {
        self.scopes.iter().any(|s| s.function)
    }

    /// Reserve a Java name derived from `base` in the innermost scope.
    pub fn claim_name(&mut self, base: &str) -> String {
        let mut candidate = base.to_string();
        let mut n = 1;
        while self.live.contains_key(&candidate) {
            candidate = format!("{base}_{n}");
            n += 1;
        }
        *self.live.entry(candidate.clone()).or_insert(0) += 1;
        if let Some(scope) = self.scopes.last_mut() {
            scope.names.push(candidate.clone());
        }
        candidate
    }

    pub fn declare(&mut self, key: &str, ty: TypeSeq, shared: bool, pending: bool, pos: Position) -> Declared {
        let scope = self.current_scope();
        let redeclared = self
            .scopes
            .last()
            .is_some_and(|s| s.bindings.iter().any(|(k, _)| k == key));

        if shared {
            if let Some(&id) = self.fields.get(key) {
                self.bind(key, id);
                return Declared { id, redeclared: false, new_field: false };
            }
        }

        let java = if shared {
            // Fields outlive every scope: hold the name forever.
            let base = java_base(key.get(1..).unwrap_or(key));
            let mut candidate = base.clone();
            let mut n = 1;
            while self.live.contains_key(&candidate) {
                candidate = format!("{base}_{n}");
                n += 1;
            }
            self.live.insert(candidate.clone(), 1);
            candidate
        } else {
            self.claim_name(&java_base(key.get(1..).unwrap_or(key)))
        };

        let id = SymbolId(self.symbols.len());
        self.symbols.push(Symbol {
            key: key.to_string(),
            java,
            ty,
            scope,
            shared,
            pending,
            hoisted: false,
            pos,
        });
        self.bind(key, id);
        if shared {
            self.fields.insert(key.to_string(), id);
        }
        Declared { id, redeclared, new_field: shared }
    }

    /// Bind `key` to a Java name that already exists in the output, such as
    /// the `args` parameter of `main` for `@ARGV`.
    pub fn declare_as(&mut self, key: &str, java: &str, ty: TypeSeq, pos: Position) -> SymbolId {
        let id = SymbolId(self.symbols.len());
        self.symbols.push(Symbol {
            key: key.to_string(),
            java: java.to_string(),
            ty,
            scope: self.current_scope(),
            shared: false,
            pending: false,
            hoisted: true,
            pos,
        });
        *self.live.entry(java.to_string()).or_insert(0) += 1;
        self.bind(key, id);
        id
    }

    fn bind(&mut self, key: &str, id: SymbolId) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.bindings.push((key.to_string(), id));
        }
    }

    /// Resolve `key` from the innermost scope outwards. Pending declarations
    /// are skipped: `my $x = $x` reads the outer `$x`.
    pub fn lookup(&self, key: &str) -> Option<Lookup> {
        let mut crossed_function = false;
        for scope in self.scopes.iter().rev() {
            let found = scope
                .bindings
                .iter()
                .rev()
                .filter(|(k, _)| k == key)
                .map(|&(_, id)| id)
                .find(|id| !self.symbols[id.0].pending);
            if let Some(id) = found {
                let captured = crossed_function && !self.symbols[id.0].shared;
                return Some(Lookup { id, captured });
            }
            if scope.function {
                crossed_function = true;
            }
        }
        None
    }

    pub fn get(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id.0]
    }

    /// Fix the type of a declaration and make it visible to lookups.
    pub fn resolve(&mut self, id: SymbolId, ty: TypeSeq) {
        let symbol = &mut self.symbols[id.0];
        symbol.ty = ty;
        symbol.pending = false;
    }

    pub fn mark_hoisted(&mut self, id: SymbolId) {
        self.symbols[id.0].hoisted = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translate::types::TypeTag;

    fn int() -> TypeSeq {
        TypeSeq::scalar(TypeTag::Integer)
    }

    #[test]
    fn lookup_walks_outwards_and_scope_close_hides() {
        let mut t = SymbolTable::new();
        t.declare("$x", int(), false, false, Position::default());
        t.open_scope(false);
        let inner = t.declare("$y", int(), false, false, Position::default());
        assert!(t.lookup("$x").is_some());
        assert_eq!(t.lookup("$y").map(|l| l.id), Some(inner.id));
        t.close_scope();
        assert!(t.lookup("$y").is_none());
    }

    #[test]
    fn shadowing_gets_a_fresh_java_name() {
        let mut t = SymbolTable::new();
        let outer = t.declare("$x", int(), false, false, Position::default());
        t.open_scope(false);
        let inner = t.declare("$x", int(), false, false, Position::default());
        assert_eq!(t.get(outer.id).java, "x");
        assert_eq!(t.get(inner.id).java, "x_1");
        t.close_scope();
        assert_eq!(t.lookup("$x").map(|l| l.id), Some(outer.id));
    }

    #[test]
    fn names_are_reused_after_scope_closes() {
        let mut t = SymbolTable::new();
        t.open_scope(false);
        let a = t.declare("$i", int(), false, false, Position::default());
        t.close_scope();
        t.open_scope(false);
        let b = t.declare("$i", int(), false, false, Position::default());
        assert_eq!(t.get(a.id).java, "i");
        assert_eq!(t.get(b.id).java, "i");
    }

    #[test]
    fn sigils_are_separate_namespaces() {
        let mut t = SymbolTable::new();
        let s = t.declare("$x", int(), false, false, Position::default());
        let a = t.declare("@x", int(), false, false, Position::default());
        assert_ne!(s.id, a.id);
        assert_ne!(t.get(s.id).java, t.get(a.id).java);
    }

    #[test]
    fn pending_declaration_is_invisible() {
        let mut t = SymbolTable::new();
        let outer = t.declare("$x", int(), false, false, Position::default());
        t.open_scope(false);
        let inner = t.declare("$x", TypeSeq::void(), false, true, Position::default());
        assert_eq!(t.lookup("$x").map(|l| l.id), Some(outer.id));
        t.resolve(inner.id, int());
        assert_eq!(t.lookup("$x").map(|l| l.id), Some(inner.id));
    }

    #[test]
    fn file_lexicals_are_captured_inside_functions() {
        let mut t = SymbolTable::new();
        t.declare("$count", int(), false, false, Position::default());
        t.declare("$total", int(), true, false, Position::default());
        t.open_scope(true);
        assert!(t.lookup("$count").is_some_and(|l| l.captured));
        assert!(t.lookup("$total").is_some_and(|l| !l.captured));
    }

    #[test]
    fn shared_declarations_reuse_one_field() {
        let mut t = SymbolTable::new();
        t.open_scope(true);
        let first = t.declare("$n", int(), true, false, Position::default());
        t.close_scope();
        t.open_scope(true);
        let second = t.declare("$n", int(), true, false, Position::default());
        assert!(first.new_field);
        assert!(!second.new_field);
        assert_eq!(first.id, second.id);
    }

    #[test]
    fn reserved_words_are_renamed() {
        let mut t = SymbolTable::new();
        let d = t.declare("$class", int(), false, false, Position::default());
        let u = t.declare("$_", int(), false, false, Position::default());
        assert_eq!(t.get(d.id).java, "class_");
        assert_eq!(t.get(u.id).java, "it");
    }
}
