//! ModRM byte calculator and the small toolchain wrappers used to build and
//! inspect freestanding i386 blobs.

pub mod modrm;
pub mod tools;


pub use modrm::{combine, split, Field, ModRm, OutOfRange};
pub use tools::{ToolError, Toolchain};
