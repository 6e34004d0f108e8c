//! Input IR consumed by the generator
//!
//! The frontend (bytecode parser/verifier, external to this crate) produces a
//! typed statement chain per method with explicit branch and trap edges, plus
//! optional analysis tags on value nodes. Every node category is a closed sum
//! type so the translators can match exhaustively: adding a kind breaks every
//! `match`, which is the intended safety property.

pub mod class;
pub mod stmt;
pub mod ty;
pub mod value;

pub use class::{ClassDescriptor, FieldDescriptor, MethodDescriptor, MethodFlags, Program};
pub use stmt::{Body, IdentitySource, Stmt, StmtId, StmtNode, Target, Trap};
pub use ty::{ClassRef, JType};
pub use value::{BinOp, Constant, FieldRef, InvokeExpr, InvokeKind, MethodRef, Tags, UnOp, Value};
