use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::TranslateError;

/// Settings for one translation run. Every field has a default, so a config
/// file only needs the keys it changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Class name used when the source has no `package` statement.
    pub class_name: String,
    /// Java package holding `Pd`, `Regex`, `Ref`, `PerlMap` and `PerlList`.
    pub runtime_package: String,
    /// Write the `package` line derived from a `package A::B;` statement.
    pub emit_package: bool,
    /// Log every token at `trace` level.
    pub lexer_debug: bool,
    /// Log every reduced statement at `debug` level.
    pub parser_debug: bool,
    /// Spaces per nesting level in the output.
    pub indent: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            class_name: "Main".to_string(),
            runtime_package: "sigil.runtime".to_string(),
            emit_package: true,
            lexer_debug: false,
            parser_debug: false,
            indent: 4,
        }
    }
}

impl Options {
    /// Read options from a JSON file.
    pub fn load(path: &Path) -> Result<Self, TranslateError> {
        let data = std::fs::read_to_string(path)?;
        Self::from_json(&data)
    }

    pub fn from_json(data: &str) -> Result<Self, TranslateError> {
        let options: Options = serde_json::from_str(data)?;
        options.validate()?;
        Ok(options)
    }

    fn validate(&self) -> Result<(), TranslateError> {
        if !is_java_identifier(&self.class_name) {
            return Err(TranslateError::Options(format!(
                "class_name {:?} is not a Java identifier",
                self.class_name
            )));
        }
        if self.runtime_package.split('.').any(|part| !is_java_identifier(part)) {
            return Err(TranslateError::Options(format!(
                "runtime_package {:?} is not a Java package name",
                self.runtime_package
            )));
        }
        if self.indent == 0 {
            return Err(TranslateError::Options("indent must be at least 1".to_string()));
        }
        Ok(())
    }
}

pub fn is_java_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_' || c == '$')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}
