// tests/support/mod.rs

#![allow(dead_code)]

pub mod mock;
pub mod server;
