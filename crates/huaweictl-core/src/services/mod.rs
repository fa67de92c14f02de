//! Cloud service implementations

pub mod bss;
pub mod dcs;
pub mod live;
