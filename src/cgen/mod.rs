//! C source emission
//!
//! Data flows one way through this module: the method analyzer walks a
//! statement chain once to assign labels, line-table entries and trap
//! regions, then drives the value/statement translators to produce the body;
//! the class emitter aggregates per-method output into the class-level
//! tables. Nothing here mutates the IR.

pub mod class;
pub mod expr;
pub mod mangle;
pub mod method;
pub mod stmt;
pub mod value;

pub use class::{emit_class, EmittedClass};
pub use expr::CExpr;
pub use method::{MethodInfo, StmtInfo};
