//! Statement translation: one IR statement to zero or more emitted lines
//!
//! Label placement, safepoints at backward trap targets and region updates
//! are the method emitter's business; this module renders the statement
//! proper, including backward-branch safepoints and switch lowering.

use super::mangle;
use super::method::MethodCtx;
use super::value::ValueGen;
use crate::error::Result;
use crate::ir::{IdentitySource, Stmt, StmtId, Target};
use crate::runtime::abi;

/// Emit one statement into `out`. Values are translated left to right, in
/// the same order `Stmt::for_each_value` visits them.
pub fn emit_stmt(ctx: &MethodCtx<'_>, vg: &ValueGen<'_>, id: StmtId, out: &mut String) -> Result<()> {
    match ctx.body.stmt(id) {
        Stmt::Assign { target, value } => {
            let lhs = vg.translate(target)?;
            let rhs = vg.translate(value)?;
            out.push_str(&format!("    {} = {};\n", lhs.render(), rhs.render()));
        }
        Stmt::Identity { local, source, .. } => {
            let rhs = match source {
                IdentitySource::This => "a0".to_string(),
                IdentitySource::Param(k) => format!("a{k}"),
                IdentitySource::CaughtException => "tf.exc".to_string(),
            };
            out.push_str(&format!("    l{local} = {rhs};\n"));
        }
        Stmt::Invoke(inv) => {
            let call = vg.translate_invoke(inv)?;
            out.push_str(&format!("    {};\n", call.render()));
        }
        Stmt::MonitorEnter(v) => {
            let obj = vg.translate(v)?;
            out.push_str(&format!("    {}(env, {});\n", abi::MONITOR_ENTER, obj.render()));
        }
        Stmt::MonitorExit(v) => {
            let obj = vg.translate(v)?;
            out.push_str(&format!("    {}(env, {});\n", abi::MONITOR_EXIT, obj.render()));
        }
        Stmt::If { cond, target } => {
            let c = vg.translate(cond)?;
            let label = ctx.label_name(target.0)?;
            if is_backward(ctx, id, *target)? {
                // Back-edge: keep tight loops interruptible
                out.push_str(&format!(
                    "    if ({}) {{ {}(env); goto {}; }}\n",
                    c.render(),
                    abi::POLL,
                    label
                ));
            } else {
                out.push_str(&format!("    if ({}) goto {};\n", c.render(), label));
            }
        }
        Stmt::Goto(target) => {
            let label = ctx.label_name(target.0)?;
            if is_backward(ctx, id, *target)? {
                out.push_str(&format!("    {}(env);\n", abi::POLL));
            }
            out.push_str(&format!("    goto {label};\n"));
        }
        Stmt::TableSwitch {
            key,
            low,
            targets,
            default,
        } => {
            let cases: Vec<(i32, Target)> = targets
                .iter()
                .enumerate()
                .map(|(i, t)| (low + i as i32, *t))
                .collect();
            emit_switch(ctx, vg, key, &cases, *default, out)?;
        }
        Stmt::LookupSwitch { key, cases, default } => {
            emit_switch(ctx, vg, key, cases, *default, out)?;
        }
        Stmt::Return(value) => {
            if ctx.has_traps {
                out.push_str(&format!("    {}(env, &tf);\n", abi::TRAP_LEAVE));
            }
            match value {
                Some(v) => {
                    let e = vg.translate(v)?;
                    out.push_str(&format!("    return {};\n", e.render()));
                }
                None => out.push_str("    return;\n"),
            }
        }
        Stmt::Throw(v) => {
            let e = vg.translate(v)?;
            if ctx.has_traps {
                out.push_str(&format!("    {}(env, &tf);\n", abi::TRAP_LEAVE));
            }
            out.push_str(&format!("    {}(env, {});\n", abi::THROW, e.render()));
        }
        Stmt::Nop => out.push_str("    ;\n"),
        Stmt::NullCheck { value, redundant } => {
            if !redundant {
                let v = vg.translate(value)?;
                out.push_str(&format!("    {}(env, {});\n", abi::CHECK_NULL, v.render()));
            }
        }
        Stmt::ActiveUse(class) => {
            out.push_str(&format!(
                "    {}(env, {});\n",
                abi::ACTIVE_USE,
                mangle::class_desc_ref(class)
            ));
        }
    }
    Ok(())
}

fn is_backward(ctx: &MethodCtx<'_>, from: StmtId, to: Target) -> Result<bool> {
    Ok(ctx.info.position(to.0)? <= ctx.info.position(from)?)
}

/// Lower a switch: sorted cases, default-equal cases dropped, adjacent
/// consecutive values with a shared target merged into one case range,
/// default clause last.
fn emit_switch(
    ctx: &MethodCtx<'_>,
    vg: &ValueGen<'_>,
    key: &crate::ir::Value,
    cases: &[(i32, Target)],
    default: Target,
    out: &mut String,
) -> Result<()> {
    let k = vg.translate(key)?;
    let default_label = ctx.label_name(default.0)?;

    let mut sorted: Vec<(i32, StmtId)> = cases
        .iter()
        .filter(|(_, t)| t.0 != default.0)
        .map(|(v, t)| (*v, t.0))
        .collect();
    sorted.sort_by_key(|(v, _)| *v);

    out.push_str(&format!("    switch ({}) {{\n", k.render()));
    let mut i = 0;
    while i < sorted.len() {
        let (lo, target) = sorted[i];
        let mut hi = lo;
        let mut j = i + 1;
        while j < sorted.len() {
            let (v, t) = sorted[j];
            if t == target && v == hi + 1 {
                hi = v;
                j += 1;
            } else {
                break;
            }
        }
        let label = ctx.label_name(target)?;
        if hi > lo {
            out.push_str(&format!("    case {lo} ... {hi}: goto {label};\n"));
        } else {
            out.push_str(&format!("    case {lo}: goto {label};\n"));
        }
        i = j;
    }
    out.push_str(&format!("    default: goto {default_label};\n"));
    out.push_str("    }\n");
    Ok(())
}
