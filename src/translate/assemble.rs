//! Output assembly: turns the buffers of a finished session into one Java
//! compilation unit.

use serde::Serialize;

use super::blocks::{indent, INDENT};
use super::error::Diagnostic;
use super::session::Feature;
use crate::options::Options;

/// Where the generated class lives. Set by a `package A::B;` statement,
/// otherwise the configured class name in the default package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Package {
    pub java_package: Option<String>,
    pub class_name: String,
}

/// Everything a run produced, before it is laid out as Java.
#[derive(Debug, Clone, Serialize)]
pub struct Translation {
    pub package: Package,
    /// `#<import>` passthrough lines, in source order.
    pub imports: Vec<String>,
    pub fields: String,
    pub function_code: String,
    pub global_code: String,
    pub features: Vec<Feature>,
    pub diagnostics: Vec<Diagnostic>,
}

const STDIN_FIELD: &str = "static BufferedReader STDIN = new BufferedReader(new InputStreamReader(System.in));\n";

fn feature_import(feature: Feature, runtime: &str) -> String {
    match feature {
        Feature::Map => format!("import {runtime}.PerlMap;"),
        Feature::List => format!("import {runtime}.PerlList;"),
        Feature::Ref => format!("import {runtime}.Ref;"),
        Feature::Regex => format!("import {runtime}.Regex;"),
        Feature::Runtime => format!("import {runtime}.Pd;"),
        Feature::Array => "import java.util.Arrays;".to_string(),
        Feature::Input => "import java.io.*;".to_string(),
    }
}

/// `java.util.Date`, `import java.util.Date` and `import java.util.Date;`
/// all name the same import.
fn passthrough_import(text: &str) -> Option<String> {
    let text = text.trim();
    let text = text.strip_prefix("import ").unwrap_or(text).trim();
    let text = text.strip_suffix(';').unwrap_or(text).trim();
    if text.is_empty() {
        None
    } else {
        Some(format!("import {text};"))
    }
}

/// Rewrite leading indentation from the internal four spaces per level to
/// `width` spaces per level.
fn reindent(code: &str, width: usize) -> String {
    if width == INDENT.len() {
        return code.to_string();
    }
    let mut out = String::with_capacity(code.len());
    for line in code.lines() {
        let body = line.trim_start_matches(' ');
        let spaces = line.len() - body.len();
        let levels = spaces / INDENT.len();
        let rest = spaces % INDENT.len();
        out.push_str(&" ".repeat(levels * width + rest));
        out.push_str(body);
        out.push('\n');
    }
    out
}

pub fn assemble(t: &Translation, options: &Options) -> String {
    let mut out = String::new();

    if options.emit_package {
        if let Some(package) = &t.package.java_package {
            out.push_str(&format!("package {package};\n\n"));
        }
    }

    let mut imports: Vec<String> = t
        .features
        .iter()
        .map(|&f| feature_import(f, &options.runtime_package))
        .collect();
    for import in t.imports.iter().filter_map(|i| passthrough_import(i)) {
        if !imports.contains(&import) {
            imports.push(import);
        }
    }
    if !imports.is_empty() {
        out.push_str(&imports.join("\n"));
        out.push_str("\n\n");
    }

    let mut body = String::new();
    if t.features.contains(&Feature::Input) {
        body.push_str(STDIN_FIELD);
    }
    body.push_str(&t.fields);
    if !body.is_empty() {
        body.push('\n');
    }
    body.push_str(&t.function_code);
    body.push_str(&format!("public static void main(String[] args) {{\n{}}}\n", indent(&t.global_code)));

    out.push_str(&format!("public class {} {{\n", t.package.class_name));
    out.push_str(&indent(&body));
    out.push_str("}\n");

    reindent(&out, options.indent)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn translation(features: Vec<Feature>) -> Translation {
        Translation {
            package: Package { java_package: None, class_name: "Main".into() },
            imports: Vec::new(),
            fields: String::new(),
            function_code: String::new(),
            global_code: "int x = 1;\n".into(),
            features,
            diagnostics: Vec::new(),
        }
    }

    #[test]
    fn minimal_program_has_only_main() {
        let java = assemble(&translation(Vec::new()), &Options::default());
        assert_eq!(
            java,
            "public class Main {\n    public static void main(String[] args) {\n        int x = 1;\n    }\n}\n"
        );
    }

    #[test]
    fn features_gate_imports() {
        let java = assemble(&translation(vec![Feature::Map, Feature::Runtime]), &Options::default());
        assert!(java.starts_with("import sigil.runtime.PerlMap;\nimport sigil.runtime.Pd;\n\n"));
        assert!(!java.contains("PerlList"));
    }

    #[test]
    fn runtime_package_is_configurable() {
        let options = Options { runtime_package: "org.acme.rt".into(), ..Options::default() };
        let java = assemble(&translation(vec![Feature::Regex]), &options);
        assert!(java.starts_with("import org.acme.rt.Regex;\n"));
    }

    #[test]
    fn input_adds_reader_field() {
        let java = assemble(&translation(vec![Feature::Input]), &Options::default());
        assert!(java.contains("import java.io.*;"));
        assert!(java.contains(&format!("    {STDIN_FIELD}")));
    }

    #[test]
    fn package_line_respects_option() {
        let mut t = translation(Vec::new());
        t.package = Package { java_package: Some("my".into()), class_name: "Tool".into() };
        let java = assemble(&t, &Options::default());
        assert!(java.starts_with("package my;\n\npublic class Tool {\n"));
        let options = Options { emit_package: false, ..Options::default() };
        assert!(assemble(&t, &options).starts_with("public class Tool {\n"));
    }

    #[test]
    fn passthrough_imports_are_normalized_and_deduplicated() {
        let mut t = translation(Vec::new());
        t.imports = vec!["java.util.Date".into(), "import java.util.Date;".into(), " ".into()];
        let java = assemble(&t, &Options::default());
        assert_eq!(java.matches("import java.util.Date;").count(), 1);
    }

    #[test]
    fn fields_and_functions_precede_main() {
        let mut t = translation(Vec::new());
        t.fields = "static int total = 0;\n".into();
        t.function_code = "public static void f() {\n}\n\n".into();
        let java = assemble(&t, &Options::default());
        let field = java.find("static int total").unwrap();
        let function = java.find("public static void f()").unwrap();
        let main = java.find("public static void main").unwrap();
        assert!(field < function && function < main);
    }

    #[test]
    fn indent_width_is_applied() {
        let options = Options { indent: 2, ..Options::default() };
        let java = assemble(&translation(Vec::new()), &options);
        assert!(java.contains("\n  public static void main(String[] args) {\n    int x = 1;\n  }\n"));
    }
}
