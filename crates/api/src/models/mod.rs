pub mod entity;
pub mod location;
pub mod object;
pub mod related;
pub mod rewrite;

pub use entity::*;
pub use location::*;
pub use object::*;
pub use related::*;
pub use rewrite::*;
