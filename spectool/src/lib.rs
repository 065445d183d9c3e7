// src/lib.rs
pub mod cli;
pub mod commands;
pub mod logging;
pub mod matrix_file;
