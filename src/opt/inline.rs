//! Bounded inlining of directly dispatched calls
//!
//! Only `Static` and `Special` sites are candidates; dynamic dispatch must be
//! devirtualized first. Each round inlines the smallest eligible callee, so
//! small accessors win the budget before large bodies consume it. Growth is
//! bounded two ways: an absolute cap on the caller's statement count, and a
//! ratio cap measured against the caller's pre-optimization size (so a second
//! optimizer run cannot compound the budget). Rejected sites stay rejected
//! within a run, which guarantees termination.
//!
//! Splicing works on the statement arena: callee statements are cloned into
//! the caller's arena with locals renumbered past the caller's, parameter and
//! receiver binds turned into assignments from the call site's operands, and
//! returns turned into assignments to the call site's destination plus a jump
//! to the continuation. A statement-position call of a value-returning callee
//! gets a scratch local as its destination, so side effects in the returned
//! expression survive. The call-site node is rewritten in place (to an
//! `ActiveUse` for static calls, preserving class initialization, otherwise
//! to a no-op), so branches onto the call site keep working.

use std::collections::{HashMap, HashSet};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::ir::{
    Body, IdentitySource, InvokeExpr, InvokeKind, JType, MethodRef, Program, Stmt, StmtId, Target,
    Trap, Value,
};

/// Inline eligible call sites of `body` until a fixed point. Returns the
/// number of sites inlined.
pub fn inline_calls(
    caller: &MethodRef,
    body: &mut Body,
    program: &Program,
    config: &Config,
) -> Result<usize> {
    let mut rejected: HashSet<StmtId> = HashSet::new();
    let mut total = 0;
    loop {
        let site = match pick_site(caller, body, program, &rejected)? {
            Some(s) => s,
            None => return Ok(total),
        };
        // Caps are checked against the exact spliced size, not the callee's
        if body.len() + site.spliced_len > config.inline_abs_cap {
            rejected.insert(site.id);
            continue;
        }
        let above_floors = body.len() >= config.inline_caller_floor
            && site.callee_len >= config.inline_callee_floor;
        if above_floors
            && (body.len() + site.spliced_len) as f32
                > config.inline_ratio_cap * body.original_len as f32
        {
            rejected.insert(site.id);
            continue;
        }
        splice(body, &site)?;
        total += 1;
    }
}

struct Site {
    id: StmtId,
    pos: usize,
    invoke: InvokeExpr,
    /// Destination of the call's result, for value-position calls
    dest: Option<Value>,
    callee_class: crate::ir::ClassRef,
    callee_body: Body,
    callee_len: usize,
    /// Statements `splice` will add: the callee's, plus one assignment per
    /// value return when the result has a home, plus the receiver check
    spliced_len: usize,
}

impl Site {
    /// Whether the callee's returned value needs a home: either the call's
    /// destination, or a scratch local for a statement-position call of a
    /// value-returning callee (the return expression can carry calls of
    /// its own)
    fn wants_result(&self) -> bool {
        self.dest.is_some() || self.invoke.target.ret != JType::Void
    }
}

/// Find the eligible site with the smallest callee, if any.
fn pick_site(
    caller: &MethodRef,
    body: &Body,
    program: &Program,
    rejected: &HashSet<StmtId>,
) -> Result<Option<Site>> {
    let mut best: Option<Site> = None;
    for (pos, &id) in body.order().iter().enumerate() {
        if rejected.contains(&id) {
            continue;
        }
        // A return target must exist past the call site
        if pos + 1 >= body.len() {
            continue;
        }
        let (invoke, dest) = match body.stmt(id) {
            Stmt::Invoke(inv) => (inv, None),
            Stmt::Assign {
                target,
                value: Value::Invoke(inv),
            } => (inv, Some(target.clone())),
            _ => continue,
        };
        if invoke.kind != InvokeKind::Static && invoke.kind != InvokeKind::Special {
            continue;
        }
        if invoke.receiver.as_deref().is_some_and(Value::is_null) {
            continue;
        }
        let (decl, callee) = match program.resolve_direct(
            &invoke.target.class,
            &invoke.target.name,
            &invoke.target.params,
            &invoke.target.ret,
        ) {
            Ok(found) => found,
            // Unresolvable targets (library code) are simply not inlined
            Err(_) => continue,
        };
        if !callee.is_concrete() || callee.flags.is_synchronized {
            continue;
        }
        if decl.name == caller.class
            && callee.name == caller.name
            && callee.params == caller.params
            && callee.ret == caller.ret
        {
            continue;
        }
        let callee_body = match &callee.body {
            Some(b) => b,
            None => continue,
        };
        let callee_len = callee_body.len();
        if best.as_ref().map_or(true, |b| callee_len < b.callee_len) {
            let mut site = Site {
                id,
                pos,
                invoke: invoke.clone(),
                dest,
                callee_class: decl.name.clone(),
                callee_body: callee_body.clone(),
                callee_len,
                spliced_len: callee_len,
            };
            if site.wants_result() {
                site.spliced_len += site
                    .callee_body
                    .order()
                    .iter()
                    .filter(|&&rid| matches!(site.callee_body.stmt(rid), Stmt::Return(Some(_))))
                    .count();
            }
            if site.invoke.kind == InvokeKind::Special
                && site.invoke.needs_null_check
                && site.invoke.receiver.is_some()
            {
                site.spliced_len += 1;
            }
            best = Some(site);
        }
    }
    Ok(best)
}

/// Substitution applied to every callee value: locals shift past the
/// caller's, parameter and receiver references become the call's operands.
struct Subst<'a> {
    local_base: u16,
    args: &'a [Value],
    receiver: Option<&'a Value>,
}

fn subst_value(v: &mut Value, s: &Subst<'_>) {
    match v {
        Value::Local { index, .. } => *index += s.local_base,
        Value::Param { index, .. } => {
            let index = *index as usize;
            if let Some(arg) = s.args.get(index) {
                *v = arg.clone();
            }
        }
        Value::This(_) => {
            if let Some(r) = s.receiver {
                *v = r.clone();
            }
        }
        Value::InstanceField { base, .. } => subst_value(base, s),
        Value::ArrayElem { base, index, .. } => {
            subst_value(base, s);
            subst_value(index, s);
        }
        Value::Unary { operand, .. } => subst_value(operand, s),
        Value::Binary { lhs, rhs, .. } => {
            subst_value(lhs, s);
            subst_value(rhs, s);
        }
        Value::Cast { value, .. } => subst_value(value, s),
        Value::InstanceOf { value, .. } => subst_value(value, s),
        Value::NewArray { len, .. } => subst_value(len, s),
        Value::NewMultiArray { dims, .. } => {
            for d in dims {
                subst_value(d, s);
            }
        }
        Value::Invoke(inv) => subst_invoke(inv, s),
        Value::Const(_)
        | Value::CaughtException(_)
        | Value::StaticField(_)
        | Value::New { .. } => {}
    }
}

fn subst_invoke(inv: &mut InvokeExpr, s: &Subst<'_>) {
    if let Some(r) = &mut inv.receiver {
        subst_value(r, s);
    }
    for a in &mut inv.args {
        subst_value(a, s);
    }
}

fn subst_stmt(stmt: &mut Stmt, s: &Subst<'_>) {
    match stmt {
        Stmt::Assign { target, value } => {
            subst_value(target, s);
            subst_value(value, s);
        }
        Stmt::Identity { local, .. } => *local += s.local_base,
        Stmt::Invoke(inv) => subst_invoke(inv, s),
        Stmt::MonitorEnter(v)
        | Stmt::MonitorExit(v)
        | Stmt::Throw(v)
        | Stmt::NullCheck { value: v, .. } => subst_value(v, s),
        Stmt::If { cond, .. } => subst_value(cond, s),
        Stmt::TableSwitch { key, .. } | Stmt::LookupSwitch { key, .. } => subst_value(key, s),
        Stmt::Return(Some(v)) => subst_value(v, s),
        Stmt::Return(None) | Stmt::Goto(_) | Stmt::Nop | Stmt::ActiveUse(_) => {}
    }
}

fn remap_targets(stmt: &mut Stmt, map: &HashMap<StmtId, StmtId>) -> Result<()> {
    let remap = |t: &mut Target| -> Result<()> {
        t.0 = *map
            .get(&t.0)
            .ok_or_else(|| Error::internal("inlined branch target outside the callee"))?;
        Ok(())
    };
    match stmt {
        Stmt::If { target, .. } => remap(target)?,
        Stmt::Goto(t) => remap(t)?,
        Stmt::TableSwitch {
            targets, default, ..
        } => {
            for t in targets {
                remap(t)?;
            }
            remap(default)?;
        }
        Stmt::LookupSwitch { cases, default, .. } => {
            for (_, t) in cases {
                remap(t)?;
            }
            remap(default)?;
        }
        _ => {}
    }
    Ok(())
}

fn splice(body: &mut Body, site: &Site) -> Result<()> {
    let cont = body.order()[site.pos + 1];
    let site_line = body.node(site.id).line;
    let local_base = body.locals.len() as u16;
    for ty in &site.callee_body.locals {
        body.add_local(ty.clone());
    }
    let result_dest = match &site.dest {
        Some(d) => Some(d.clone()),
        None if site.wants_result() => {
            let scratch = body.add_local(site.invoke.target.ret.clone());
            Some(Value::Local {
                index: scratch,
                ty: site.invoke.target.ret.clone(),
            })
        }
        None => None,
    };
    let subst = Subst {
        local_base,
        args: &site.invoke.args,
        receiver: site.invoke.receiver.as_deref(),
    };

    // Pass 1: allocate caller arena slots so branch targets can be remapped
    // before any statement is written
    let callee_order = site.callee_body.order().to_vec();
    let mut id_map: HashMap<StmtId, StmtId> = HashMap::new();
    let mut new_ids: Vec<StmtId> = Vec::new();
    if site.invoke.kind == InvokeKind::Special && site.invoke.needs_null_check {
        if let Some(recv) = site.invoke.receiver.as_deref() {
            let check = body.alloc(
                Stmt::NullCheck {
                    value: recv.clone(),
                    redundant: false,
                },
                site_line,
            );
            new_ids.push(check);
        }
    }
    let first_stmt_idx = new_ids.len();
    for &callee_id in &callee_order {
        let extra = matches!(site.callee_body.stmt(callee_id), Stmt::Return(Some(_)))
            && result_dest.is_some();
        let first = body.alloc(Stmt::Nop, site.callee_body.node(callee_id).line);
        id_map.insert(callee_id, first);
        new_ids.push(first);
        if extra {
            let second = body.alloc(Stmt::Nop, site.callee_body.node(callee_id).line);
            new_ids.push(second);
        }
    }

    // Pass 2: rewrite and place each statement
    let mut out_idx = first_stmt_idx;
    for &callee_id in &callee_order {
        let mut st = site.callee_body.stmt(callee_id).clone();
        subst_stmt(&mut st, &subst);
        remap_targets(&mut st, &id_map)?;
        match st {
            Stmt::Identity { local, ty, source } => {
                let converted = match source {
                    IdentitySource::Param(k) => {
                        let arg = site.invoke.args.get(k as usize).ok_or_else(|| {
                            Error::internal("inlined callee binds a missing argument")
                        })?;
                        Stmt::Assign {
                            target: Value::Local { index: local, ty },
                            value: arg.clone(),
                        }
                    }
                    IdentitySource::This => {
                        let recv = site.invoke.receiver.as_deref().ok_or_else(|| {
                            Error::internal("inlined callee binds a missing receiver")
                        })?;
                        Stmt::Assign {
                            target: Value::Local { index: local, ty },
                            value: recv.clone(),
                        }
                    }
                    IdentitySource::CaughtException => Stmt::Identity { local, ty, source },
                };
                body.node_mut(new_ids[out_idx]).stmt = converted;
                out_idx += 1;
            }
            Stmt::Return(value) => {
                if let (Some(v), Some(dest)) = (value, &result_dest) {
                    body.node_mut(new_ids[out_idx]).stmt = Stmt::Assign {
                        target: dest.clone(),
                        value: v,
                    };
                    out_idx += 1;
                }
                body.node_mut(new_ids[out_idx]).stmt = Stmt::Goto(Target(cont));
                out_idx += 1;
            }
            other => {
                body.node_mut(new_ids[out_idx]).stmt = other;
                out_idx += 1;
            }
        }
    }

    // The first inlined statement inherits the call site's line
    if let Some(&first) = new_ids.first() {
        body.node_mut(first).line = site_line;
    }

    // Inner handlers take precedence over the caller's
    for (i, trap) in site.callee_body.traps.iter().enumerate() {
        let remap = |id: StmtId| -> Result<StmtId> {
            id_map
                .get(&id)
                .copied()
                .ok_or_else(|| Error::internal("inlined trap edge outside the callee"))
        };
        body.traps.insert(
            i,
            Trap {
                begin: remap(trap.begin)?,
                end: remap(trap.end)?,
                handler: remap(trap.handler)?,
                catch_type: trap.catch_type.clone(),
            },
        );
    }

    // Neutralize the call site in place so branches onto it stay valid
    body.node_mut(site.id).stmt = if site.invoke.kind == InvokeKind::Static {
        Stmt::ActiveUse(site.callee_class.clone())
    } else {
        Stmt::Nop
    };
    body.insert_at(site.pos + 1, &new_ids);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{
        ClassDescriptor, ClassRef, Constant, JType, MethodDescriptor, MethodFlags,
    };

    fn static_flags() -> MethodFlags {
        MethodFlags {
            is_static: true,
            ..MethodFlags::default()
        }
    }

    /// `static int twice(int x) { return x + x; }`
    fn twice_body() -> Body {
        let mut b = Body::new(vec![JType::Int]);
        b.push(
            Stmt::Identity {
                local: 0,
                ty: JType::Int,
                source: IdentitySource::Param(0),
            },
            Some(2),
        );
        b.push(
            Stmt::Return(Some(Value::Binary {
                op: crate::ir::BinOp::Add,
                lhs: Box::new(Value::Local {
                    index: 0,
                    ty: JType::Int,
                }),
                rhs: Box::new(Value::Local {
                    index: 0,
                    ty: JType::Int,
                }),
                ty: JType::Int,
            })),
            Some(2),
        );
        b
    }

    fn call_twice(dest_local: u16) -> Stmt {
        Stmt::Assign {
            target: Value::Local {
                index: dest_local,
                ty: JType::Int,
            },
            value: Value::Invoke(InvokeExpr {
                kind: InvokeKind::Static,
                target: MethodRef {
                    class: ClassRef::new("Math2"),
                    name: "twice".to_string(),
                    params: vec![JType::Int],
                    ret: JType::Int,
                },
                receiver: None,
                args: vec![Value::Const(Constant::Int(21))],
                needs_null_check: false,
            }),
        }
    }

    fn program_with_twice() -> Program {
        let mut p = Program::new();
        p.add_class(ClassDescriptor::new("java.lang.Object"));
        let mut math2 = ClassDescriptor::new("Math2");
        let mut twice = MethodDescriptor::new("twice", vec![JType::Int], JType::Int);
        twice.flags = static_flags();
        twice.body = Some(twice_body());
        math2.static_methods.push(twice);
        p.add_class(math2);
        p
    }

    fn caller_ref() -> MethodRef {
        MethodRef {
            class: ClassRef::new("Main"),
            name: "run".to_string(),
            params: vec![],
            ret: JType::Void,
        }
    }

    fn caller_body() -> Body {
        let mut b = Body::new(vec![JType::Int]);
        b.push(call_twice(0), Some(10));
        b.push(Stmt::Return(None), Some(11));
        b
    }

    #[test]
    fn static_call_inlines_with_active_use() {
        let p = program_with_twice();
        let mut body = caller_body();
        let n = inline_calls(&caller_ref(), &mut body, &p, &Config::default()).unwrap();
        assert_eq!(n, 1);

        let stmts: Vec<_> = body
            .order()
            .iter()
            .map(|&id| body.stmt(id).clone())
            .collect();
        // Call site became the class-init anchor; the bind, the result
        // assignment and the continuation jump follow
        assert!(matches!(&stmts[0], Stmt::ActiveUse(c) if c.name() == "Math2"));
        assert!(matches!(&stmts[1], Stmt::Assign { .. }));
        assert!(matches!(&stmts[2], Stmt::Assign { .. }));
        assert!(matches!(&stmts[3], Stmt::Goto(_)));
        assert!(matches!(&stmts[4], Stmt::Return(None)));
        // Callee locals were renumbered past the caller's
        match &stmts[1] {
            Stmt::Assign {
                target: Value::Local { index, .. },
                ..
            } => assert_eq!(*index, 1),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn statement_position_call_keeps_return_side_effects() {
        // `static int g() { return Lib.f(); }` inlined at the bare site
        // `g();` — the nested call must not vanish with the dropped result
        let mut p = Program::new();
        p.add_class(ClassDescriptor::new("java.lang.Object"));
        let mut glue = ClassDescriptor::new("Glue");
        let mut g = MethodDescriptor::new("g", vec![], JType::Int);
        g.flags = static_flags();
        let mut gb = Body::new(vec![]);
        gb.push(
            Stmt::Return(Some(Value::Invoke(InvokeExpr {
                kind: InvokeKind::Static,
                target: MethodRef {
                    class: ClassRef::new("Lib"),
                    name: "f".to_string(),
                    params: vec![],
                    ret: JType::Int,
                },
                receiver: None,
                args: vec![],
                needs_null_check: false,
            }))),
            Some(2),
        );
        g.body = Some(gb);
        glue.static_methods.push(g);
        p.add_class(glue);

        let mut body = Body::new(vec![]);
        body.push(
            Stmt::Invoke(InvokeExpr {
                kind: InvokeKind::Static,
                target: MethodRef {
                    class: ClassRef::new("Glue"),
                    name: "g".to_string(),
                    params: vec![],
                    ret: JType::Int,
                },
                receiver: None,
                args: vec![],
                needs_null_check: false,
            }),
            Some(10),
        );
        body.push(Stmt::Return(None), Some(11));
        body.freeze_original_len();

        assert_eq!(
            inline_calls(&caller_ref(), &mut body, &p, &Config::default()).unwrap(),
            1
        );
        let mut nested = 0;
        for &id in body.order() {
            if let Stmt::Assign {
                target: Value::Local { .. },
                value: Value::Invoke(inv),
            } = body.stmt(id)
            {
                assert_eq!(inv.target.class.name(), "Lib");
                nested += 1;
            }
        }
        assert_eq!(nested, 1);
    }

    #[test]
    fn absolute_cap_counts_the_spliced_size() {
        let p = program_with_twice();
        let mut body = caller_body();
        body.freeze_original_len();
        // The callee is 2 statements but splices as 3 (bind, result
        // assignment, continuation jump), so a cap of 4 must reject
        let config = Config::default().with_inline_caps(4, 2.0, 16, 8);
        assert_eq!(
            inline_calls(&caller_ref(), &mut body, &p, &config).unwrap(),
            0
        );
        assert_eq!(body.len(), 2);
    }

    #[test]
    fn second_run_reaches_the_same_fixed_point() {
        let p = program_with_twice();
        let mut body = caller_body();
        body.freeze_original_len();
        assert_eq!(
            inline_calls(&caller_ref(), &mut body, &p, &Config::default()).unwrap(),
            1
        );
        let len = body.len();
        assert_eq!(
            inline_calls(&caller_ref(), &mut body, &p, &Config::default()).unwrap(),
            0
        );
        assert_eq!(body.len(), len);
    }

    #[test]
    fn absolute_cap_rejects_growth() {
        let p = program_with_twice();
        let mut body = caller_body();
        body.freeze_original_len();
        let config = Config::default().with_inline_caps(2, 2.0, 16, 8);
        assert_eq!(
            inline_calls(&caller_ref(), &mut body, &p, &config).unwrap(),
            0
        );
        assert_eq!(body.len(), 2);
    }

    #[test]
    fn recursive_calls_are_not_inlined() {
        let mut p = Program::new();
        p.add_class(ClassDescriptor::new("java.lang.Object"));
        let mut main = ClassDescriptor::new("Main");
        let mut run = MethodDescriptor::new("run", vec![], JType::Void);
        run.flags = static_flags();
        let mut rb = Body::new(vec![]);
        rb.push(
            Stmt::Invoke(InvokeExpr {
                kind: InvokeKind::Static,
                target: MethodRef {
                    class: ClassRef::new("Main"),
                    name: "run".to_string(),
                    params: vec![],
                    ret: JType::Void,
                },
                receiver: None,
                args: vec![],
                needs_null_check: false,
            }),
            None,
        );
        rb.push(Stmt::Return(None), None);
        run.body = Some(rb.clone());
        main.static_methods.push(run);
        p.add_class(main);

        let mut body = rb;
        body.freeze_original_len();
        let caller = MethodRef {
            class: ClassRef::new("Main"),
            name: "run".to_string(),
            params: vec![],
            ret: JType::Void,
        };
        assert_eq!(
            inline_calls(&caller, &mut body, &p, &Config::default()).unwrap(),
            0
        );
    }
}
