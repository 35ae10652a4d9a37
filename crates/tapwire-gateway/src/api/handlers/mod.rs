//! Control surface handlers.

pub mod control;
pub mod logs;
pub mod system;
