pub mod author;
pub mod paper;
pub mod user;

pub use author::*;
pub use paper::*;
pub use user::*;
