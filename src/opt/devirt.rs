//! Devirtualization
//!
//! Two ways a dynamically dispatched call site can be proven monomorphic:
//! the receiver's exact class is known from a dominating allocation in the
//! same straight-line run, or the resolved target cannot be overridden (final
//! method, final class, or a well-known-final library class). Proven sites
//! become `Special` calls; the exact-type path also drops the receiver null
//! check, since a fresh allocation is never null.

use std::collections::HashMap;

use crate::ir::{ClassRef, InvokeExpr, InvokeKind, JType, Program, Stmt, Value};

/// Rewrite provable virtual and interface call sites in place. Returns the
/// rewrite count.
pub fn devirtualize(body: &mut crate::ir::Body, program: &Program) -> usize {
    let targets = body.branch_target_set();
    let order = body.order().to_vec();
    // Exact receiver classes, local index -> class, valid within one run
    let mut exact: HashMap<u16, ClassRef> = HashMap::new();
    let mut rewrites = 0;

    for id in order {
        if targets.contains(&id) {
            exact.clear();
        }
        match &mut body.node_mut(id).stmt {
            Stmt::Invoke(inv) => {
                if try_devirt(inv, &exact, program) {
                    rewrites += 1;
                }
            }
            Stmt::Assign { target, value } => {
                if let Value::Invoke(inv) = value {
                    if try_devirt(inv, &exact, program) {
                        rewrites += 1;
                    }
                }
                match (&target, &value) {
                    (Value::Local { index, .. }, Value::New { class, .. }) => {
                        exact.insert(*index, class.clone());
                    }
                    (Value::Local { index, .. }, _) => {
                        exact.remove(index);
                    }
                    _ => {}
                }
            }
            Stmt::Identity { local, .. } => {
                let local = *local;
                exact.remove(&local);
            }
            _ => {}
        }
    }
    rewrites
}

fn try_devirt(inv: &mut InvokeExpr, exact: &HashMap<u16, ClassRef>, program: &Program) -> bool {
    if inv.kind != InvokeKind::Virtual && inv.kind != InvokeKind::Interface {
        return false;
    }
    let receiver = match &inv.receiver {
        Some(r) => r.as_ref(),
        None => return false,
    };

    // Exact type from a dominating allocation
    if let Value::Local { index, .. } = receiver {
        if let Some(class) = exact.get(index) {
            if let Ok((decl, _)) = program.resolve_virtual(
                class,
                &inv.target.name,
                &inv.target.params,
                &inv.target.ret,
            ) {
                inv.kind = InvokeKind::Special;
                inv.target.class = decl.name.clone();
                inv.needs_null_check = false;
                return true;
            }
        }
    }

    // Finality: the static receiver type admits no overriding subtype
    if inv.kind == InvokeKind::Virtual {
        if let JType::Ref(static_class) = receiver.ty() {
            if let Ok((decl, m)) = program.resolve_virtual(
                &static_class,
                &inv.target.name,
                &inv.target.params,
                &inv.target.ret,
            ) {
                if m.flags.is_final || program.has_no_subtypes(&static_class) {
                    inv.kind = InvokeKind::Special;
                    inv.target.class = decl.name.clone();
                    inv.needs_null_check = true;
                    return true;
                }
            }
        }
    }
    false
}
