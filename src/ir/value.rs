//! IR value expressions
//!
//! One variant per value kind; the Value Translator matches exhaustively, so
//! an unhandled kind is a compile error here rather than a silent fallthrough
//! at emission time.

use super::ty::{method_descriptor, ClassRef, JType};

/// Constant value node
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Str(String),
    /// Class-token constant (`Foo.class`)
    Class(ClassRef),
    Null,
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Neg,
    ArrayLength,
}

/// Binary operators. `Cmp`/`Cmpl`/`Cmpg` are the three-way comparisons
/// (lcmp, fcmpl/fcmpg, dcmpl/dcmpg); the `l`/`g` suffix picks the NaN result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    Ushr,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Cmp,
    Cmpl,
    Cmpg,
}

/// Reference to a field by declaring class, name and type
#[derive(Debug, Clone, PartialEq)]
pub struct FieldRef {
    pub class: ClassRef,
    pub name: String,
    pub ty: JType,
}

/// Reference to a method by declaring class, name and signature
#[derive(Debug, Clone, PartialEq)]
pub struct MethodRef {
    pub class: ClassRef,
    pub name: String,
    pub params: Vec<JType>,
    pub ret: JType,
}

impl MethodRef {
    pub fn descriptor(&self) -> String {
        method_descriptor(&self.params, &self.ret)
    }
}

/// Invocation kinds; each lowers to a distinct call-site shape
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvokeKind {
    Static,
    /// Nonvirtual dispatch (constructors, super calls, devirtualized sites)
    Special,
    Virtual,
    Interface,
}

/// An invocation, used both as a value and as a statement
#[derive(Debug, Clone, PartialEq)]
pub struct InvokeExpr {
    pub kind: InvokeKind,
    pub target: MethodRef,
    pub receiver: Option<Box<Value>>,
    pub args: Vec<Value>,
    /// For `Special` calls only: whether the receiver must be null-checked
    pub needs_null_check: bool,
}

/// Analysis tags attached to a value node by upstream passes. All default to
/// "no information"; the translators consult them to elide checks or redirect
/// allocations, never to change meaning.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Tags {
    /// Null check statically proven unnecessary
    pub no_null_check: bool,
    /// Array bounds proven in range
    pub no_bounds_check: bool,
    /// Reference cast statically proven safe
    pub cast_safe: bool,
    /// Allocation proven non-escaping; result lives in method-local storage
    pub stack_alloc: bool,
    /// Fixed element count for a stack-allocated array
    pub fixed_len: Option<u32>,
}

impl Tags {
    pub fn none() -> Self {
        Self::default()
    }
}

/// A typed IR value expression
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Const(Constant),
    Local { index: u16, ty: JType },
    Param { index: u16, ty: JType },
    This(ClassRef),
    CaughtException(ClassRef),
    StaticField(FieldRef),
    InstanceField {
        base: Box<Value>,
        field: FieldRef,
        tags: Tags,
    },
    ArrayElem {
        base: Box<Value>,
        index: Box<Value>,
        elem: JType,
        tags: Tags,
    },
    Unary {
        op: UnOp,
        operand: Box<Value>,
        ty: JType,
    },
    Binary {
        op: BinOp,
        lhs: Box<Value>,
        rhs: Box<Value>,
        ty: JType,
    },
    Cast {
        to: JType,
        value: Box<Value>,
        tags: Tags,
    },
    InstanceOf {
        value: Box<Value>,
        class: ClassRef,
    },
    New {
        class: ClassRef,
        tags: Tags,
    },
    NewArray {
        elem: JType,
        len: Box<Value>,
        tags: Tags,
    },
    NewMultiArray {
        ty: JType,
        dims: Vec<Value>,
    },
    Invoke(InvokeExpr),
}

impl Value {
    /// Static type of this value
    pub fn ty(&self) -> JType {
        match self {
            Value::Const(c) => match c {
                Constant::Int(_) => JType::Int,
                Constant::Long(_) => JType::Long,
                Constant::Float(_) => JType::Float,
                Constant::Double(_) => JType::Double,
                Constant::Str(_) => JType::Ref(ClassRef::new("java.lang.String")),
                Constant::Class(_) => JType::Ref(ClassRef::new("java.lang.Class")),
                Constant::Null => JType::object(),
            },
            Value::Local { ty, .. } | Value::Param { ty, .. } => ty.clone(),
            Value::This(c) | Value::CaughtException(c) => JType::Ref(c.clone()),
            Value::StaticField(f) => f.ty.clone(),
            Value::InstanceField { field, .. } => field.ty.clone(),
            Value::ArrayElem { elem, .. } => elem.clone(),
            Value::Unary { ty, .. } | Value::Binary { ty, .. } => ty.clone(),
            Value::Cast { to, .. } => to.clone(),
            Value::InstanceOf { .. } => JType::Boolean,
            Value::New { class, .. } => JType::Ref(class.clone()),
            Value::NewArray { elem, .. } => JType::Array(Box::new(elem.clone())),
            Value::NewMultiArray { ty, .. } => ty.clone(),
            Value::Invoke(inv) => inv.target.ret.clone(),
        }
    }

    /// Is this a null literal?
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Const(Constant::Null))
    }

    /// Pre-order walk over this value and its operands. Both the stack-
    /// allocation site collector and the translator visit sites in this
    /// order, which is what keeps their aggregate numbering in sync.
    pub fn walk<F: FnMut(&Value)>(&self, f: &mut F) {
        f(self);
        match self {
            Value::InstanceField { base, .. } => base.walk(f),
            Value::ArrayElem { base, index, .. } => {
                base.walk(f);
                index.walk(f);
            }
            Value::Unary { operand, .. } => operand.walk(f),
            Value::Binary { lhs, rhs, .. } => {
                lhs.walk(f);
                rhs.walk(f);
            }
            Value::Cast { value, .. } => value.walk(f),
            Value::InstanceOf { value, .. } => value.walk(f),
            Value::NewArray { len, .. } => len.walk(f),
            Value::NewMultiArray { dims, .. } => {
                for d in dims {
                    d.walk(f);
                }
            }
            Value::Invoke(inv) => {
                if let Some(r) = &inv.receiver {
                    r.walk(f);
                }
                for a in &inv.args {
                    a.walk(f);
                }
            }
            Value::Const(_)
            | Value::Local { .. }
            | Value::Param { .. }
            | Value::This(_)
            | Value::CaughtException(_)
            | Value::StaticField(_)
            | Value::New { .. } => {}
        }
    }

    /// Collect every class referenced by this value into `out`
    pub fn collect_classes(&self, out: &mut std::collections::BTreeSet<ClassRef>) {
        self.walk(&mut |v| match v {
            Value::Const(Constant::Class(c)) => {
                out.insert(c.clone());
            }
            Value::This(c) | Value::CaughtException(c) => {
                out.insert(c.clone());
            }
            Value::StaticField(f) | Value::InstanceField { field: f, .. } => {
                out.insert(f.class.clone());
                collect_type(&f.ty, out);
            }
            Value::Cast { to, .. } => collect_type(to, out),
            Value::InstanceOf { class, .. } => {
                out.insert(class.clone());
            }
            Value::New { class, .. } => {
                out.insert(class.clone());
            }
            Value::NewArray { elem, .. } => collect_type(elem, out),
            Value::NewMultiArray { ty, .. } => collect_type(ty, out),
            Value::Invoke(inv) => {
                out.insert(inv.target.class.clone());
                for p in &inv.target.params {
                    collect_type(p, out);
                }
                collect_type(&inv.target.ret, out);
            }
            _ => {}
        });
    }
}

/// Add the class underlying `ty` (if any) to `out`
pub fn collect_type(ty: &JType, out: &mut std::collections::BTreeSet<ClassRef>) {
    match ty {
        JType::Ref(c) => {
            out.insert(c.clone());
        }
        JType::Array(e) => collect_type(e, out),
        _ => {}
    }
}
