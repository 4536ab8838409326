pub mod driver;
pub mod protocol;
pub mod render;

pub use driver::{Control, Shell};
pub use protocol::Command;
