pub mod catalog;
pub mod check;
pub mod serve;

pub use catalog::{OpenApiCommand, SchemaCommand, TypesCommand};
pub use check::CheckCommand;
pub use serve::ServeCommand;
