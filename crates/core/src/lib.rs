pub mod analysis;
pub mod config;
pub mod error;
pub mod index;
pub mod logging;
pub mod parser;
pub mod resolver;
pub mod rewrite;
pub mod runtime;
pub mod scaffold;
pub mod scanner;

pub use error::{CoreError, Result};
pub use runtime::Workspace;
