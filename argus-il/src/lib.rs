pub mod expr;

pub use expr::{BinOp, BinRel, BoolExpr, Expr, Lval, UnOp};
