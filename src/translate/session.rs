//! All mutable state of one translation run: scopes, signatures, feature
//! flags, diagnostics and the code buffers the parser appends to.

use indexmap::{IndexMap, IndexSet};
use serde::Serialize;
use tracing::trace;

use super::assemble::{Package, Translation};
use super::error::{Diagnostic, DiagnosticKind};
use super::fragment::Declare;
use super::position::Position;
use super::symbols::SymbolTable;
use super::types::{TypeSeq, TypeTag};

/// Support the generated class needs; each one gates an import.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Feature {
    Map,
    List,
    Array,
    Ref,
    Regex,
    Input,
    Runtime,
}

/// Write-only while parsing; read once by `Session::finish`.
#[derive(Debug, Default)]
pub struct FeatureSet(IndexSet<Feature>);

impl FeatureSet {
    pub fn require(&mut self, feature: Feature) {
        if self.0.insert(feature) {
            trace!(?feature, "feature required");
        }
    }

    fn into_sorted(self) -> Vec<Feature> {
        let mut features: Vec<Feature> = self.0.into_iter().collect();
        features.sort();
        features
    }
}

/// Declared shape of a sub: `#<args>...<returns>...` before `sub name`.
#[derive(Debug, Clone)]
pub struct Signature {
    pub name: String,
    pub java: String,
    pub args: Vec<TypeSeq>,
    pub returns: Vec<TypeSeq>,
    /// False when no `returns` annotation was given; the first `return`
    /// statement then decides the type.
    pub declared_returns: bool,
    /// No `args` annotation: the sub takes `Object...`.
    pub variadic: bool,
    /// The body has been translated, so inferred returns are final.
    pub defined: bool,
    pub pos: Position,
}

impl Signature {
    /// Java return type: one value as is, several as `Object[]`.
    pub fn return_type(&self) -> TypeSeq {
        match self.returns.as_slice() {
            [] => TypeSeq::void(),
            [one] => one.clone(),
            _ => TypeSeq::from_tags(&[TypeTag::Array, TypeTag::Unresolved]),
        }
    }
}

/// The sub whose body is being translated.
#[derive(Debug, Clone)]
pub struct FunctionState {
    pub name: String,
    pub params: Vec<(String, TypeSeq)>,
    /// Index of the next parameter handed out by a bare `shift`.
    pub next_shift: usize,
    pub returns: Vec<TypeSeq>,
    pub declared_returns: bool,
    pub variadic: bool,
}

/// Annotations waiting for the statement they precede.
#[derive(Debug, Clone, Default)]
pub struct PendingLabels {
    pub ty: Option<TypeSeq>,
    pub declares: Vec<Declare>,
    pub args: Option<Vec<TypeSeq>>,
    pub returns: Option<Vec<TypeSeq>>,
}

#[derive(Debug, Default)]
pub struct Session {
    pub symbols: SymbolTable,
    pub signatures: IndexMap<String, Signature>,
    pub function: Option<FunctionState>,
    pub labels: Option<PendingLabels>,
    pub loop_depth: usize,
    /// Elements of `@ARGV` already taken by a top-level `shift`.
    pub argv_shift: usize,
    features: FeatureSet,
    diagnostics: Vec<Diagnostic>,
    global_code: String,
    function_code: String,
    fields: String,
    imports: Vec<String>,
    package: Option<Package>,
    loop_header: bool,
    hoisted: Vec<String>,
}

/// Snapshot used to rebalance state after a statement fails to parse.
#[derive(Debug, Clone, Copy)]
pub struct Mark {
    depth: usize,
    loop_header: bool,
    loop_depth: usize,
    in_function: bool,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn require(&mut self, feature: Feature) {
        self.features.require(feature);
    }

    /// Require the collection support used anywhere in `ty`.
    pub fn require_type(&mut self, ty: &TypeSeq) {
        for t in ty.types() {
            match t.tag {
                TypeTag::Array => self.require(Feature::Array),
                TypeTag::Hash => self.require(Feature::Map),
                TypeTag::List => self.require(Feature::List),
                TypeTag::Ref => self.require(Feature::Ref),
                _ => {}
            }
        }
    }

    /// Qualified name of a runtime helper, e.g. `Pd.toInt`.
    pub fn runtime(&mut self, helper: &str) -> String {
        self.require(Feature::Runtime);
        format!("Pd.{helper}")
    }

    pub fn report(&mut self, kind: DiagnosticKind, message: impl Into<String>, pos: Position) {
        self.diagnostics.push(Diagnostic::new(kind, message, pos));
    }

    pub fn push_diagnostic(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Flip loop-header mode, returning the new state.
    pub fn toggle_loop_header(&mut self) -> bool {
        self.loop_header = !self.loop_header;
        self.loop_header
    }

    pub fn in_loop_header(&self) -> bool {
        self.loop_header
    }

    /// Queue a declaration that must precede the current statement.
    pub fn hoist(&mut self, declaration: String) {
        self.hoisted.push(declaration);
    }

    pub fn take_hoisted(&mut self) -> Vec<String> {
        std::mem::take(&mut self.hoisted)
    }

    pub fn push_global(&mut self, code: &str) {
        self.global_code.push_str(code);
    }

    pub fn push_function(&mut self, code: &str) {
        self.function_code.push_str(code);
    }

    pub fn push_field(&mut self, code: &str) {
        self.fields.push_str(code);
    }

    pub fn push_import(&mut self, import: String) {
        if !self.imports.contains(&import) {
            self.imports.push(import);
        }
    }

    pub fn package(&self) -> Option<&Package> {
        self.package.as_ref()
    }

    pub fn set_package(&mut self, package: Package) {
        self.package = Some(package);
    }

    /// A Java name for a compiler temporary.
    pub fn temp(&mut self) -> String {
        self.symbols.claim_name("_t")
    }

    pub fn mark(&self) -> Mark {
        Mark {
            depth: self.symbols.depth(),
            loop_header: self.loop_header,
            loop_depth: self.loop_depth,
            in_function: self.function.is_some(),
        }
    }

    pub fn restore(&mut self, mark: Mark) {
        self.symbols.truncate(mark.depth);
        self.loop_header = mark.loop_header;
        self.loop_depth = mark.loop_depth;
        if !mark.in_function {
            self.function = None;
        }
        self.hoisted.clear();
    }

    /// Hand the accumulated buffers and flags to assembly.
    pub fn finish(mut self, default_class: &str) -> Translation {
        self.diagnostics.sort_by_key(|d| (d.pos.line, d.pos.offset));
        let package = self.package.unwrap_or_else(|| Package {
            java_package: None,
            class_name: default_class.to_string(),
        });
        Translation {
            package,
            imports: self.imports,
            fields: self.fields,
            function_code: self.function_code,
            global_code: self.global_code,
            features: self.features.into_sorted(),
            diagnostics: self.diagnostics,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn features_are_monotonic_and_sorted() {
        let mut s = Session::new();
        s.require(Feature::Regex);
        s.require(Feature::List);
        s.require(Feature::Regex);
        s.require_type(&TypeSeq::from_tags(&[TypeTag::Ref, TypeTag::Hash, TypeTag::Integer]));
        let t = s.finish("Main");
        assert_eq!(t.features, vec![Feature::Map, Feature::List, Feature::Ref, Feature::Regex]);
    }

    #[test]
    fn loop_header_toggles() {
        let mut s = Session::new();
        assert!(s.toggle_loop_header());
        assert!(s.in_loop_header());
        assert!(!s.toggle_loop_header());
    }

    #[test]
    fn restore_rebalances_scopes() {
        let mut s = Session::new();
        let mark = s.mark();
        s.symbols.open_scope(false);
        s.symbols.open_scope(false);
        s.toggle_loop_header();
        s.restore(mark);
        assert_eq!(s.symbols.depth(), 1);
        assert!(!s.in_loop_header());
    }

    #[test]
    fn multiple_returns_become_object_array() {
        let sig = Signature {
            name: "f".into(),
            java: "f".into(),
            args: vec![],
            returns: vec![TypeSeq::scalar(TypeTag::Integer), TypeSeq::scalar(TypeTag::String)],
            declared_returns: true,
            variadic: false,
            defined: true,
            pos: Position::default(),
        };
        assert_eq!(sig.return_type().java(), "Object[]");
    }
}
