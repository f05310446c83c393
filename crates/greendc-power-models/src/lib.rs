#![doc = include_str!("../readme.md")]

pub mod cpu;
pub mod cpu_models;
pub mod host;
