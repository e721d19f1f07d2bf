pub mod result_compiler;
pub mod summary;
