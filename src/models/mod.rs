pub mod server;
pub mod subscription;

pub use server::*;
pub use subscription::*;
