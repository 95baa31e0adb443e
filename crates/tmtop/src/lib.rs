#![deny(rust_2018_idioms)]

pub mod config;
pub mod display;
pub mod monitoring;
pub mod refresh;
