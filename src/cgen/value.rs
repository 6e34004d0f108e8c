//! Value translation: one IR value node to one C expression
//!
//! Dispatch is an exhaustive match over the value kind; every kind has
//! exactly one translation. Check elision is tag-driven only: the translator
//! never decides on its own that a check is unnecessary.

use std::cell::Cell;

use super::expr::CExpr;
use super::mangle;
use crate::error::{Error, Result};
use crate::ir::{
    BinOp, Constant, InvokeExpr, InvokeKind, JType, Program, UnOp, Value,
};
use crate::runtime::{self, abi};

/// Translates value nodes for one method body. `sa_next` numbers the
/// stack-allocation sites in translation order; the method analyzer collects
/// the sites in the same order when it declares the prologue aggregates.
pub struct ValueGen<'a> {
    pub program: &'a Program,
    sa_next: Cell<usize>,
}

impl<'a> ValueGen<'a> {
    pub fn new(program: &'a Program) -> Self {
        Self {
            program,
            sa_next: Cell::new(0),
        }
    }

    fn next_stack_slot(&self) -> usize {
        let n = self.sa_next.get();
        self.sa_next.set(n + 1);
        n
    }

    pub fn translate(&self, value: &Value) -> Result<CExpr> {
        match value {
            Value::Const(c) => Ok(self.constant(c)),
            Value::Local { index, .. } => Ok(CExpr::atom(format!("l{index}"))),
            Value::Param { index, .. } => Ok(CExpr::atom(format!("a{index}"))),
            Value::This(_) => Ok(CExpr::atom("a0")),
            Value::CaughtException(_) => Ok(CExpr::atom("tf.exc")),
            Value::StaticField(f) => Ok(CExpr::atom(format!(
                "{}.{}",
                mangle::statics_struct(&f.class),
                f.name
            ))),
            Value::InstanceField { base, field, tags } => {
                let base = self.translate(base)?;
                if tags.no_null_check {
                    let cast = CExpr::cast(
                        format!("struct {} *", mangle::instance_struct(&field.class)),
                        base,
                    );
                    Ok(CExpr::arrow(cast, mangle::field_member(&field.name)))
                } else {
                    let decl = self.program.class_or_err(field.class.name())?;
                    let idx = decl.instance_field_index(&field.name).ok_or_else(|| {
                        Error::unknown_field(field.class.name(), field.name.clone())
                    })?;
                    let call = CExpr::call(
                        abi::FIELD,
                        vec![
                            CExpr::atom("env"),
                            base,
                            CExpr::atom(mangle::class_desc_ref(&field.class)),
                            CExpr::int(idx as i64),
                        ],
                    );
                    Ok(CExpr::deref(CExpr::cast(
                        format!("{} *", field.ty.c_name()),
                        call,
                    )))
                }
            }
            Value::ArrayElem {
                base,
                index,
                elem,
                tags,
            } => {
                let b = self.translate(base)?;
                let i = self.translate(index)?;
                if tags.no_bounds_check && tags.no_null_check {
                    let cast = CExpr::cast(format!("struct {} *", elem.array_struct()), b);
                    Ok(CExpr::index(CExpr::arrow(cast, "e"), i))
                } else {
                    let call = CExpr::call(
                        abi::ELEM,
                        vec![
                            CExpr::atom("env"),
                            b,
                            i,
                            CExpr::int(elem.log2_size() as i64),
                        ],
                    );
                    Ok(CExpr::deref(CExpr::cast(
                        format!("{} *", elem.c_name()),
                        call,
                    )))
                }
            }
            Value::Unary { op, operand, ty } => self.unary(*op, operand, ty),
            Value::Binary { op, lhs, rhs, ty } => self.binary(*op, lhs, rhs, ty),
            Value::Cast { to, value, tags } => self.cast(to, value, tags.cast_safe),
            Value::InstanceOf { value, class } => {
                let v = self.translate(value)?;
                if self.program.has_no_subtypes(class) {
                    // Exact class: a pointer comparison suffices
                    let non_null = CExpr::bin("!=", v.clone(), CExpr::atom("0"));
                    let same = CExpr::bin(
                        "==",
                        CExpr::arrow(v, "cls"),
                        CExpr::atom(mangle::class_desc_ref(class)),
                    );
                    Ok(CExpr::bin("&&", non_null, same))
                } else {
                    Ok(CExpr::call(
                        abi::INSTANCEOF,
                        vec![
                            CExpr::atom("env"),
                            v,
                            CExpr::atom(mangle::class_desc_ref(class)),
                        ],
                    ))
                }
            }
            Value::New { class, tags } => {
                if tags.stack_alloc {
                    let slot = self.next_stack_slot();
                    Ok(CExpr::call(
                        abi::LOCAL_NEW,
                        vec![
                            CExpr::atom("env"),
                            CExpr::cast("jref", CExpr::atom(format!("&sa{slot}"))),
                            CExpr::atom(mangle::class_desc_ref(class)),
                        ],
                    ))
                } else {
                    Ok(CExpr::call(
                        abi::NEW,
                        vec![
                            CExpr::atom("env"),
                            CExpr::atom(mangle::class_desc_ref(class)),
                        ],
                    ))
                }
            }
            Value::NewArray { elem, len, tags } => {
                let n = self.translate(len)?;
                if tags.stack_alloc {
                    let slot = self.next_stack_slot();
                    return Ok(CExpr::call(
                        abi::LOCAL_ARRAY,
                        vec![
                            CExpr::atom("env"),
                            CExpr::cast("jref", CExpr::atom(format!("&sa{slot}"))),
                            self.elem_token(elem),
                            n,
                        ],
                    ));
                }
                match elem.elem_kind() {
                    Some(kind) => Ok(CExpr::call(
                        abi::NEW_ARRAY,
                        vec![CExpr::atom("env"), CExpr::atom(kind), n],
                    )),
                    None => match elem {
                        JType::Ref(c) => Ok(CExpr::call(
                            abi::NEW_REF_ARRAY,
                            vec![
                                CExpr::atom("env"),
                                CExpr::atom(mangle::class_desc_ref(c)),
                                n,
                            ],
                        )),
                        // element is itself an array: allocate by descriptor
                        _ => Ok(CExpr::call(
                            abi::NEW_MULTI_ARRAY,
                            vec![
                                CExpr::atom("env"),
                                CExpr::atom(format!(
                                    "\"[{}\"",
                                    elem.descriptor()
                                )),
                                CExpr::int(1),
                                n,
                            ],
                        )),
                    },
                }
            }
            Value::NewMultiArray { ty, dims } => {
                let mut args = vec![
                    CExpr::atom("env"),
                    CExpr::atom(format!("\"{}\"", ty.descriptor())),
                    CExpr::int(dims.len() as i64),
                ];
                for d in dims {
                    args.push(self.translate(d)?);
                }
                Ok(CExpr::call(abi::NEW_MULTI_ARRAY, args))
            }
            Value::Invoke(inv) => self.translate_invoke(inv),
        }
    }

    fn elem_token(&self, elem: &JType) -> CExpr {
        match elem.elem_kind() {
            Some(kind) => CExpr::atom(kind),
            None => CExpr::atom("RT_T_REF"),
        }
    }

    fn constant(&self, c: &Constant) -> CExpr {
        match c {
            Constant::Int(v) => {
                // i32::MIN has no negative C literal; build it arithmetically
                if *v == i32::MIN {
                    CExpr::atom("(-2147483647 - 1)")
                } else {
                    CExpr::atom(v.to_string())
                }
            }
            Constant::Long(v) => {
                if *v == i64::MIN {
                    CExpr::atom("(-9223372036854775807LL - 1LL)")
                } else {
                    CExpr::atom(format!("{v}LL"))
                }
            }
            Constant::Float(v) => {
                let bits = v.to_bits();
                if bits == 0 {
                    CExpr::atom("0.0F")
                } else {
                    // Bit-exact IEEE-754 reconstruction; a decimal literal
                    // does not survive every compiler's rounding
                    CExpr::call(abi::FLOAT_BITS, vec![CExpr::atom(format!("0x{bits:08x}U"))])
                }
            }
            Constant::Double(v) => {
                let bits = v.to_bits();
                if bits == 0 {
                    CExpr::atom("0.0")
                } else {
                    CExpr::call(
                        abi::DOUBLE_BITS,
                        vec![CExpr::atom(format!("0x{bits:016x}ULL"))],
                    )
                }
            }
            Constant::Str(s) => CExpr::call(
                abi::STRING,
                vec![CExpr::atom("env"), CExpr::atom(c_string_literal(s))],
            ),
            Constant::Class(c) => CExpr::call(
                abi::CLASS_OBJ,
                vec![CExpr::atom("env"), CExpr::atom(mangle::class_desc_ref(c))],
            ),
            Constant::Null => CExpr::atom("0"),
        }
    }

    fn unary(&self, op: UnOp, operand: &Value, _ty: &JType) -> Result<CExpr> {
        let v = self.translate(operand)?;
        match op {
            UnOp::Neg => Ok(CExpr::unary("-", v)),
            UnOp::ArrayLength => Ok(CExpr::call(abi::LENGTH, vec![CExpr::atom("env"), v])),
        }
    }

    fn binary(&self, op: BinOp, lhs: &Value, rhs: &Value, ty: &JType) -> Result<CExpr> {
        let operand_ty = lhs.ty();
        let l = self.translate(lhs)?;
        let r = self.translate(rhs)?;
        let wide = operand_ty.is_wide();
        match op {
            BinOp::Add => Ok(CExpr::bin("+", l, r)),
            BinOp::Sub => Ok(CExpr::bin("-", l, r)),
            BinOp::Mul => Ok(CExpr::bin("*", l, r)),
            BinOp::Div => match ty {
                JType::Float | JType::Double => Ok(CExpr::bin("/", l, r)),
                // Integer division traps on zero and wraps on MIN / -1;
                // the helper supplies Java's exact behavior
                JType::Long => Ok(CExpr::call(abi::LDIV, vec![CExpr::atom("env"), l, r])),
                _ => Ok(CExpr::call(abi::IDIV, vec![CExpr::atom("env"), l, r])),
            },
            BinOp::Rem => match ty {
                JType::Float => Ok(CExpr::call(abi::FREM, vec![l, r])),
                JType::Double => Ok(CExpr::call(abi::DREM, vec![l, r])),
                JType::Long => Ok(CExpr::call(abi::LREM, vec![CExpr::atom("env"), l, r])),
                _ => Ok(CExpr::call(abi::IREM, vec![CExpr::atom("env"), l, r])),
            },
            BinOp::And => Ok(CExpr::bin("&", l, r)),
            BinOp::Or => Ok(CExpr::bin("|", l, r)),
            BinOp::Xor => Ok(CExpr::bin("^", l, r)),
            BinOp::Shl => Ok(CExpr::bin("<<", l, self.shift_mask(r, wide))),
            BinOp::Shr => Ok(CExpr::bin(">>", l, self.shift_mask(r, wide))),
            BinOp::Ushr => {
                // Logical shift via the unsigned counterpart type
                let (uty, sty) = if wide {
                    ("julong", "jlong")
                } else {
                    ("juint", "jint")
                };
                let shifted = CExpr::bin(">>", CExpr::cast(uty, l), self.shift_mask(r, wide));
                Ok(CExpr::cast(sty, shifted))
            }
            BinOp::Eq => Ok(CExpr::bin("==", l, r)),
            BinOp::Ne => Ok(CExpr::bin("!=", l, r)),
            BinOp::Lt => Ok(CExpr::bin("<", l, r)),
            BinOp::Le => Ok(CExpr::bin("<=", l, r)),
            BinOp::Gt => Ok(CExpr::bin(">", l, r)),
            BinOp::Ge => Ok(CExpr::bin(">=", l, r)),
            BinOp::Cmp => Ok(CExpr::call(abi::LCMP, vec![l, r])),
            BinOp::Cmpl => {
                let f = if operand_ty == JType::Double {
                    abi::DCMPL
                } else {
                    abi::FCMPL
                };
                Ok(CExpr::call(f, vec![l, r]))
            }
            BinOp::Cmpg => {
                let f = if operand_ty == JType::Double {
                    abi::DCMPG
                } else {
                    abi::FCMPG
                };
                Ok(CExpr::call(f, vec![l, r]))
            }
        }
    }

    fn shift_mask(&self, amount: CExpr, wide: bool) -> CExpr {
        let mask = if wide { 63 } else { 31 };
        CExpr::bin("&", amount, CExpr::int(mask))
    }

    fn cast(&self, to: &JType, value: &Value, proven_safe: bool) -> Result<CExpr> {
        let from = value.ty();
        let v = self.translate(value)?;
        if proven_safe {
            return Ok(v);
        }
        match to {
            JType::Ref(class) => {
                if self.program.has_no_subtypes(class) {
                    Ok(CExpr::call(
                        abi::CAST_EXACT,
                        vec![
                            CExpr::atom("env"),
                            v,
                            CExpr::atom(mangle::class_desc_ref(class)),
                        ],
                    ))
                } else {
                    Ok(CExpr::call(
                        abi::CAST,
                        vec![
                            CExpr::atom("env"),
                            v,
                            CExpr::atom(mangle::class_desc_ref(class)),
                        ],
                    ))
                }
            }
            JType::Array(_) => {
                // Array covariance needs the full subtype search, keyed by
                // descriptor since array classes have no emitted descriptor
                Ok(CExpr::call(
                    abi::CAST_ARRAY,
                    vec![
                        CExpr::atom("env"),
                        v,
                        CExpr::atom(format!("\"{}\"", to.descriptor())),
                    ],
                ))
            }
            _ => {
                // float/double -> integral must truncate exactly as Java does
                let helper = match (&from, to) {
                    (JType::Float, JType::Int) => Some(abi::F2I),
                    (JType::Float, JType::Long) => Some(abi::F2L),
                    (JType::Double, JType::Int) => Some(abi::D2I),
                    (JType::Double, JType::Long) => Some(abi::D2L),
                    (JType::Float, t) if t.is_integral() => Some(abi::F2I),
                    (JType::Double, t) if t.is_integral() => Some(abi::D2I),
                    _ => None,
                };
                match helper {
                    Some(f) if matches!(to, JType::Int | JType::Long) => {
                        Ok(CExpr::call(f, vec![v]))
                    }
                    Some(f) => {
                        // narrow further through int semantics (f2b etc.)
                        Ok(CExpr::cast(to.c_name(), CExpr::call(f, vec![v])))
                    }
                    None => Ok(CExpr::cast(to.c_name(), v)),
                }
            }
        }
    }

    pub fn translate_invoke(&self, inv: &InvokeExpr) -> Result<CExpr> {
        let mut args = vec![CExpr::atom("env")];
        match inv.kind {
            InvokeKind::Static => {
                for a in &inv.args {
                    args.push(self.translate(a)?);
                }
                Ok(CExpr::call(mangle::method_fn_of_ref(&inv.target), args))
            }
            InvokeKind::Special => {
                let recv = self.receiver(inv)?;
                let recv = if inv.needs_null_check {
                    CExpr::call(abi::CHECK_NULL, vec![CExpr::atom("env"), recv])
                } else {
                    recv
                };
                args.push(recv);
                for a in &inv.args {
                    args.push(self.translate(a)?);
                }
                Ok(CExpr::call(mangle::method_fn_of_ref(&inv.target), args))
            }
            InvokeKind::Virtual => {
                let recv = self.receiver(inv)?;
                // The receiver is named twice (dispatch and argument); the
                // input contract keeps receivers simple, so this is safe.
                self.require_simple(inv.receiver.as_deref())?;
                let cls = CExpr::cast(
                    format!("struct {} *", mangle::class_struct(&inv.target.class)),
                    CExpr::arrow(recv.clone(), "cls"),
                );
                let slot = CExpr::dot(
                    CExpr::arrow(cls, "vt"),
                    mangle::vtable_member(&inv.target.name, &inv.target.descriptor()),
                );
                args.push(recv);
                for a in &inv.args {
                    args.push(self.translate(a)?);
                }
                Ok(CExpr::call_expr(slot, args))
            }
            InvokeKind::Interface => {
                let recv = self.receiver(inv)?;
                self.require_simple(inv.receiver.as_deref())?;
                let hash = runtime::method_sig_hash(&inv.target.name, &inv.target.descriptor());
                let lookup = CExpr::call(
                    abi::ILOOKUP,
                    vec![
                        CExpr::atom("env"),
                        recv.clone(),
                        CExpr::atom(format!("0x{hash:08x}U")),
                    ],
                );
                let fnptr = CExpr::cast(
                    mangle::fn_ptr_type(&inv.target.ret, true, &inv.target.params),
                    lookup,
                );
                args.push(recv);
                for a in &inv.args {
                    args.push(self.translate(a)?);
                }
                Ok(CExpr::call_expr(fnptr, args))
            }
        }
    }

    fn receiver(&self, inv: &InvokeExpr) -> Result<CExpr> {
        match &inv.receiver {
            Some(r) => self.translate(r),
            None => Err(Error::internal(format!(
                "instance invocation of {}.{} has no receiver",
                inv.target.class, inv.target.name
            ))),
        }
    }

    /// Dynamically dispatched receivers are evaluated more than once in the
    /// emitted expression, so they must be side-effect free.
    fn require_simple(&self, receiver: Option<&Value>) -> Result<()> {
        match receiver {
            Some(
                Value::Local { .. }
                | Value::Param { .. }
                | Value::This(_)
                | Value::CaughtException(_)
                | Value::Const(_),
            ) => Ok(()),
            Some(other) => Err(Error::internal(format!(
                "dispatch receiver is not a simple value: {other:?}"
            ))),
            None => Ok(()),
        }
    }
}

/// Escape a Rust string into a C string literal (UTF-8 bytes, octal escapes)
pub fn c_string_literal(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for b in s.bytes() {
        match b {
            b'"' => out.push_str("\\\""),
            b'\\' => out.push_str("\\\\"),
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            b'\t' => out.push_str("\\t"),
            0x20..=0x7e => out.push(b as char),
            other => out.push_str(&format!("\\{:03o}", other)),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{ClassRef, FieldRef, Tags};

    fn vg(program: &Program) -> ValueGen<'_> {
        ValueGen::new(program)
    }

    #[test]
    fn float_constants_reconstruct_bits() {
        let p = Program::new();
        let g = vg(&p);
        let one = g.translate(&Value::Const(Constant::Float(1.0))).unwrap();
        assert_eq!(one.render(), "jfloat_bits(0x3f800000U)");
        let nz = g.translate(&Value::Const(Constant::Double(-0.0))).unwrap();
        assert_eq!(nz.render(), "jdouble_bits(0x8000000000000000ULL)");
        let zero = g.translate(&Value::Const(Constant::Float(0.0))).unwrap();
        assert_eq!(zero.render(), "0.0F");
    }

    #[test]
    fn int_min_has_no_bare_literal() {
        let p = Program::new();
        let g = vg(&p);
        let v = g.translate(&Value::Const(Constant::Int(i32::MIN))).unwrap();
        assert_eq!(v.render(), "(-2147483647 - 1)");
    }

    #[test]
    fn tagged_field_access_is_direct() {
        let p = Program::new();
        let g = vg(&p);
        let v = Value::InstanceField {
            base: Box::new(Value::Local {
                index: 1,
                ty: JType::Ref(ClassRef::new("Point")),
            }),
            field: FieldRef {
                class: ClassRef::new("Point"),
                name: "x".to_string(),
                ty: JType::Int,
            },
            tags: Tags {
                no_null_check: true,
                ..Tags::none()
            },
        };
        assert_eq!(g.translate(&v).unwrap().render(), "((struct in_Point *)l1)->f_x");
    }

    #[test]
    fn ushr_masks_and_goes_unsigned() {
        let p = Program::new();
        let g = vg(&p);
        let v = Value::Binary {
            op: BinOp::Ushr,
            lhs: Box::new(Value::Local {
                index: 0,
                ty: JType::Int,
            }),
            rhs: Box::new(Value::Const(Constant::Int(3))),
            ty: JType::Int,
        };
        assert_eq!(g.translate(&v).unwrap().render(), "(jint)((juint)l0 >> (3 & 31))");
    }
}
