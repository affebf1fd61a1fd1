#![doc = include_str!("../README.md")]

mod common;
pub mod plan;
pub mod scan;

pub use common::*;
