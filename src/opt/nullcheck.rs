//! Null-check canonicalization
//!
//! The frontend expands implicit null checks into a four-statement idiom:
//! branch past a fresh NullPointerException construction and throw. This pass
//! folds the idiom back into a single `NullCheck` statement so the emitter
//! produces one runtime call instead of an allocation path per check. The
//! branch statement itself is rewritten in place, so edges into it stay
//! valid; only the three interior statements leave the order.
//!
//! A second sweep marks straight-line repeats of a check on the same local
//! or parameter as redundant; those lower to nothing.

use crate::ir::{BinOp, InvokeKind, Stmt, Value};

const NPE: &str = "java.lang.NullPointerException";

/// Canonicalize and de-duplicate null checks. Returns the rewrite count.
pub fn canonicalize(body: &mut crate::ir::Body) -> usize {
    let mut rewrites = fold_idioms(body);
    rewrites += mark_redundant(body);
    rewrites
}

fn fold_idioms(body: &mut crate::ir::Body) -> usize {
    let mut rewrites = 0;
    loop {
        let targets = body.branch_target_set();
        let order = body.order().to_vec();
        let mut folded = false;
        for i in 0..order.len() {
            if i + 4 >= order.len() {
                break;
            }
            let checked = match match_idiom(body, &order[i..i + 5]) {
                Some(v) => v,
                None => continue,
            };
            // Branches into the interior would be left dangling
            if order[i + 1..i + 4].iter().any(|id| targets.contains(id)) {
                continue;
            }
            body.node_mut(order[i]).stmt = Stmt::NullCheck {
                value: checked,
                redundant: false,
            };
            body.remove_range(i + 1, 3);
            rewrites += 1;
            folded = true;
            break;
        }
        if !folded {
            return rewrites;
        }
    }
}

/// Match the five-statement window against the expansion:
/// `if (v != null) goto L; e = new NPE; e.<init>(); throw e; L: ...`
/// Returns the checked value on a match.
fn match_idiom(body: &crate::ir::Body, window: &[crate::ir::StmtId]) -> Option<Value> {
    let (checked, target) = match body.stmt(window[0]) {
        Stmt::If { cond, target } => match cond {
            Value::Binary {
                op: BinOp::Ne,
                lhs,
                rhs,
                ..
            } if rhs.is_null() => ((**lhs).clone(), *target),
            _ => return None,
        },
        _ => return None,
    };
    if target.0 != window[4] {
        return None;
    }
    let exc = match body.stmt(window[1]) {
        Stmt::Assign {
            target: t @ Value::Local { .. },
            value: Value::New { class, .. },
        } if class.name() == NPE => t.clone(),
        _ => return None,
    };
    match body.stmt(window[2]) {
        Stmt::Invoke(inv)
            if inv.kind == InvokeKind::Special
                && inv.target.name == "<init>"
                && inv.target.class.name() == NPE
                && inv.receiver.as_deref() == Some(&exc) => {}
        _ => return None,
    }
    match body.stmt(window[3]) {
        Stmt::Throw(v) if *v == exc => {}
        _ => return None,
    }
    Some(checked)
}

/// Within a straight-line run, a second check of the same unmodified local
/// or parameter proves nothing; flag it so the emitter drops it. Only those
/// two shapes are tracked: a field or element load can change under an
/// interleaved call, so its checks always stand.
fn mark_redundant(body: &mut crate::ir::Body) -> usize {
    let targets = body.branch_target_set();
    let order = body.order().to_vec();
    let mut seen: Vec<Value> = Vec::new();
    let mut rewrites = 0;
    for id in order {
        if targets.contains(&id) {
            seen.clear();
        }
        match body.stmt(id).clone() {
            Stmt::NullCheck {
                value,
                redundant: false,
            } => {
                if seen.contains(&value) {
                    body.node_mut(id).stmt = Stmt::NullCheck {
                        value,
                        redundant: true,
                    };
                    rewrites += 1;
                } else if matches!(value, Value::Local { .. } | Value::Param { .. }) {
                    seen.push(value);
                }
            }
            // Reassignment invalidates any check on the old value
            Stmt::Assign { target, .. } => seen.retain(|v| *v != target),
            Stmt::Identity { .. } => seen.clear(),
            _ => {}
        }
    }
    rewrites
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{
        Body, ClassRef, Constant, FieldRef, InvokeExpr, JType, MethodRef, Stmt, Tags, Target,
    };

    fn local(index: u16) -> Value {
        Value::Local {
            index,
            ty: JType::object(),
        }
    }

    fn npe_idiom_body() -> Body {
        let mut body = Body::new(vec![JType::object(), JType::object()]);
        let cond = Value::Binary {
            op: BinOp::Ne,
            lhs: Box::new(local(0)),
            rhs: Box::new(Value::Const(Constant::Null)),
            ty: JType::Boolean,
        };
        let cont = body.alloc(Stmt::Return(None), None);
        body.push(
            Stmt::If {
                cond,
                target: Target(cont),
            },
            Some(7),
        );
        body.push(
            Stmt::Assign {
                target: local(1),
                value: Value::New {
                    class: ClassRef::new(NPE),
                    tags: Tags::none(),
                },
            },
            Some(7),
        );
        body.push(
            Stmt::Invoke(InvokeExpr {
                kind: InvokeKind::Special,
                target: MethodRef {
                    class: ClassRef::new(NPE),
                    name: "<init>".to_string(),
                    params: vec![],
                    ret: JType::Void,
                },
                receiver: Some(Box::new(local(1))),
                args: vec![],
                needs_null_check: false,
            }),
            Some(7),
        );
        body.push(Stmt::Throw(local(1)), Some(7));
        body.insert_at(4, &[cont]);
        body
    }

    #[test]
    fn idiom_folds_to_a_single_check() {
        let mut body = npe_idiom_body();
        assert_eq!(canonicalize(&mut body), 1);
        assert_eq!(body.len(), 2);
        match body.stmt(body.order()[0]) {
            Stmt::NullCheck { value, redundant } => {
                assert_eq!(*value, local(0));
                assert!(!redundant);
            }
            other => panic!("expected a null check, got {other:?}"),
        }
        // The branch's source line survives the rewrite
        assert_eq!(body.node(body.order()[0]).line, Some(7));
    }

    #[test]
    fn canonicalization_is_idempotent() {
        let mut body = npe_idiom_body();
        assert_eq!(canonicalize(&mut body), 1);
        assert_eq!(canonicalize(&mut body), 0);
    }

    #[test]
    fn repeated_checks_become_redundant() {
        let mut body = Body::new(vec![JType::object()]);
        body.push(
            Stmt::NullCheck {
                value: local(0),
                redundant: false,
            },
            None,
        );
        body.push(
            Stmt::NullCheck {
                value: local(0),
                redundant: false,
            },
            None,
        );
        body.push(Stmt::Return(None), None);
        assert_eq!(canonicalize(&mut body), 1);
        match body.stmt(body.order()[1]) {
            Stmt::NullCheck { redundant, .. } => assert!(redundant),
            other => panic!("expected a null check, got {other:?}"),
        }
    }

    #[test]
    fn field_checks_stand_across_calls() {
        // A call between the two checks can null the field out
        let field = Value::InstanceField {
            base: Box::new(local(0)),
            field: FieldRef {
                class: ClassRef::new("Box"),
                name: "item".to_string(),
                ty: JType::object(),
            },
            tags: Tags::none(),
        };
        let mut body = Body::new(vec![JType::object()]);
        body.push(
            Stmt::NullCheck {
                value: field.clone(),
                redundant: false,
            },
            None,
        );
        body.push(
            Stmt::Invoke(InvokeExpr {
                kind: InvokeKind::Static,
                target: MethodRef {
                    class: ClassRef::new("Lib"),
                    name: "poke".to_string(),
                    params: vec![],
                    ret: JType::Void,
                },
                receiver: None,
                args: vec![],
                needs_null_check: false,
            }),
            None,
        );
        body.push(
            Stmt::NullCheck {
                value: field,
                redundant: false,
            },
            None,
        );
        body.push(Stmt::Return(None), None);

        assert_eq!(canonicalize(&mut body), 0);
        for &id in body.order() {
            if let Stmt::NullCheck { redundant, .. } = body.stmt(id) {
                assert!(!redundant);
            }
        }
    }
}
