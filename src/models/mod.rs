pub mod enums;
mod lab;
mod notification;
mod patient;
mod workflow;

pub use lab::*;
pub use notification::*;
pub use patient::*;
pub use workflow::*;
