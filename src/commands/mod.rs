pub mod classify;
pub mod process;
pub mod status;
