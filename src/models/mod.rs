pub mod artifact;
pub mod catalog;
pub mod request;
pub mod task;

pub use artifact::*;
pub use catalog::*;
pub use request::*;
pub use task::*;
