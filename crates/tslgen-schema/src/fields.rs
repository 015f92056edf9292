//! Field names of the data-file vocabulary the editor tooling relies on.

pub const EXTENSION_NAME: &str = "extension_name";
pub const PRIMITIVE_NAME: &str = "primitive_name";
pub const FUNCTOR_NAME: &str = "functor_name";
pub const DEFINITIONS: &str = "definitions";
pub const TARGET_EXTENSION: &str = "target_extension";
pub const CTYPE: &str = "ctype";
pub const LSCPU_FLAGS: &str = "lscpu_flags";
pub const IMPLEMENTATION: &str = "implementation";
