//! Core papyrus library (answer streaming, rendering, history, config).

pub mod ask;
pub mod config;
pub mod history;
pub mod logging;
pub mod render;
pub mod stream;
