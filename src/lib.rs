pub mod error;
pub mod options;
pub mod translate;

pub use error::TranslateError;
pub use options::Options;
pub use translate::{translate_source, translate_to_java, Output};
