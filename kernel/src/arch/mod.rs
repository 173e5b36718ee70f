//! Architecture glue. The core targets x86_64 only (`Cargo.toml`'s
//! workspace dependencies note why); this module just re-exports it at a
//! stable path so the rest of the crate writes `crate::arch::foo` instead
//! of `crate::arch::x86_64::foo` everywhere.

pub mod x86_64;
pub use x86_64::*;
