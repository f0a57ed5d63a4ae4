#![doc = include_str!("../README.md")]

pub mod allocator;
mod codec;
pub mod coordination;
pub mod dispenser;
mod error;
mod mutex;
mod range;

pub use crate::allocator::*;
pub use crate::codec::*;
pub use crate::coordination::*;
pub use crate::dispenser::*;
pub use crate::error::*;
pub use crate::range::*;
