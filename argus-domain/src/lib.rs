pub mod cell;
pub mod concrete;
pub mod config;
pub mod domain;
pub mod env;
pub mod error;
pub mod eval;
pub mod intrinsics;
pub mod mem;

pub use cell::{AddrSet, CellValue};
pub use concrete::TaintedConst;
pub use config::{Content, Region, TaintSpec};
pub use domain::{Domain, Machine};
pub use env::{Dimension, Env};
pub use error::Error;
pub use intrinsics::{to_hex, Pad};
