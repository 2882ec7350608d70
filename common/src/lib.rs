mod connect_four;
pub mod messages;

pub use connect_four::*;
