//! CLI command implementations

pub mod completions;
pub mod equip;
pub mod init;
pub mod qc;
pub mod step;
pub mod track;
pub mod unit;
pub mod user;
