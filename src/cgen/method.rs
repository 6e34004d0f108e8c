//! Per-method analysis and body emission
//!
//! `analyze` makes exactly one linear forward pass over the statement chain
//! and assigns every piece of derived per-statement state: branch-target
//! flags, label indices, line-table indices, trap regions, region-update
//! flags and backward-trap-target flags. The result is consumed while the
//! body is emitted and discarded afterwards.

use std::collections::{HashMap, HashSet};

use super::mangle;
use super::stmt as stmtgen;
use super::value::ValueGen;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::ir::{
    Body, ClassRef, JType, MethodDescriptor, Program, Stmt, StmtId, Value,
};
use crate::runtime::abi;

/// Derived per-statement record; computed once, never persisted
#[derive(Debug, Clone, Default)]
pub struct StmtInfo {
    pub is_target: bool,
    pub label: Option<u32>,
    pub line_index: Option<u32>,
    pub region: u32,
    pub needs_region_update: bool,
    pub backward_trap_target: bool,
}

/// Region span of one trap: the regions during which it is active
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrapSpan {
    pub first_region: u32,
    pub last_region: u32,
}

/// A stack-allocation site, in translation order
#[derive(Debug, Clone, PartialEq)]
pub enum StackSite {
    Object(ClassRef),
    Array { elem: JType, len: u32 },
}

/// Everything `analyze` derives for one method
#[derive(Debug, Clone)]
pub struct MethodInfo {
    infos: Vec<StmtInfo>,
    pos: Vec<Option<usize>>,
    pub label_count: u32,
    pub lines: Vec<u32>,
    pub region_count: u32,
    pub trap_spans: Vec<TrapSpan>,
    pub stack_sites: Vec<StackSite>,
}

impl MethodInfo {
    pub fn info(&self, id: StmtId) -> &StmtInfo {
        &self.infos[id.0 as usize]
    }

    /// Order position of a placed statement
    pub fn position(&self, id: StmtId) -> Result<usize> {
        self.pos[id.0 as usize]
            .ok_or_else(|| Error::internal(format!("statement {id:?} is not in the chain")))
    }

    /// Label index of a branch target
    pub fn label_of(&self, id: StmtId) -> Result<u32> {
        self.info(id)
            .label
            .ok_or_else(|| Error::internal(format!("branch target {id:?} has no label")))
    }
}

/// Single forward pass over the chain; see module docs.
pub fn analyze(body: &Body, method_name: &str) -> Result<MethodInfo> {
    let mut infos = vec![StmtInfo::default(); body.arena_len()];
    let mut pos = vec![None; body.arena_len()];
    for (i, &id) in body.order().iter().enumerate() {
        pos[id.0 as usize] = Some(i);
    }

    // Trap handlers must be placed and are always branch targets
    for trap in &body.traps {
        if pos[trap.handler.0 as usize].is_none() {
            return Err(Error::UnreachableHandler {
                method: method_name.to_string(),
            });
        }
        infos[trap.handler.0 as usize].is_target = true;
    }
    for &id in body.order() {
        for t in body.stmt(id).targets() {
            infos[t.0 as usize].is_target = true;
        }
        validate_switch(body.stmt(id))?;
    }

    // Regions: increment when a trap begin/end boundary is crossed
    let mut boundaries: HashMap<StmtId, ()> = HashMap::new();
    for trap in &body.traps {
        boundaries.insert(trap.begin, ());
        boundaries.insert(trap.end, ());
    }
    let mut region: u32 = 0;
    let mut trap_spans = vec![
        TrapSpan {
            first_region: 0,
            last_region: 0
        };
        body.traps.len()
    ];
    let mut prev_region: u32 = 0;
    for (i, &id) in body.order().iter().enumerate() {
        if i > 0 && boundaries.contains_key(&id) {
            region += 1;
        }
        for (t, trap) in body.traps.iter().enumerate() {
            if trap.begin == id {
                trap_spans[t].first_region = region;
            }
            if trap.end == id {
                trap_spans[t].last_region = prev_region;
            }
        }
        infos[id.0 as usize].region = region;
        prev_region = region;
    }
    // A trap extending to the end of the chain keeps its last region open
    for (t, trap) in body.traps.iter().enumerate() {
        if pos[trap.end.0 as usize].is_none() {
            return Err(Error::internal(format!(
                "trap {t} end marker is not in the chain of {method_name}"
            )));
        }
        if trap_spans[t].last_region < trap_spans[t].first_region {
            trap_spans[t].last_region = trap_spans[t].first_region;
        }
    }

    // Region updates: reachable by branch or fallthrough from another region
    let order = body.order();
    for (i, &id) in order.iter().enumerate() {
        let my_region = infos[id.0 as usize].region;
        if i + 1 < order.len() {
            let next = order[i + 1];
            let next_region = infos[next.0 as usize].region;
            if body.stmt(id).falls_through() && next_region != my_region {
                infos[next.0 as usize].needs_region_update = true;
            }
        }
        for t in body.stmt(id).targets() {
            if infos[t.0 as usize].region != my_region {
                infos[t.0 as usize].needs_region_update = true;
            }
        }
    }
    // Handlers are entered from the trap dispatcher at region 0
    for trap in &body.traps {
        if infos[trap.handler.0 as usize].region != 0 {
            infos[trap.handler.0 as usize].needs_region_update = true;
        }
    }

    // Backward trap targets need a cooperative safepoint before their label
    let handlers: HashSet<StmtId> = body.traps.iter().map(|t| t.handler).collect();
    for (i, &id) in order.iter().enumerate() {
        for t in body.stmt(id).targets() {
            if handlers.contains(&t) {
                if let Some(tp) = pos[t.0 as usize] {
                    if tp < i {
                        infos[t.0 as usize].backward_trap_target = true;
                    }
                }
            }
        }
    }

    // Labels in chain order, branch targets only
    let mut label_count = 0u32;
    for &id in order {
        if infos[id.0 as usize].is_target {
            infos[id.0 as usize].label = Some(label_count);
            label_count += 1;
        }
    }

    // Line table: entry only when the line differs from the last one seen
    let mut lines = Vec::new();
    let mut last_line: Option<u32> = None;
    for &id in order {
        if let Some(line) = body.node(id).line {
            if last_line != Some(line) {
                infos[id.0 as usize].line_index = Some(lines.len() as u32);
                lines.push(line);
                last_line = Some(line);
            }
        }
    }

    // Stack-allocation sites, in the same order the translator numbers them
    let mut stack_sites = Vec::new();
    let mut site_err = None;
    for &id in order {
        body.stmt(id).for_each_value(&mut |v| match v {
            Value::New { class, tags } if tags.stack_alloc => {
                stack_sites.push(StackSite::Object(class.clone()));
            }
            Value::NewArray { elem, tags, .. } if tags.stack_alloc => match tags.fixed_len {
                Some(len) => stack_sites.push(StackSite::Array {
                    elem: elem.clone(),
                    len,
                }),
                None => {
                    site_err = Some(Error::internal(
                        "stack-allocated array without a fixed length tag",
                    ))
                }
            },
            _ => {}
        });
    }
    if let Some(e) = site_err {
        return Err(e);
    }

    Ok(MethodInfo {
        infos,
        pos,
        label_count,
        lines,
        region_count: region + 1,
        trap_spans,
        stack_sites,
    })
}

fn validate_switch(stmt: &Stmt) -> Result<()> {
    if let Stmt::LookupSwitch { cases, .. } = stmt {
        let mut seen = HashSet::new();
        for (v, _) in cases {
            if !seen.insert(*v) {
                return Err(Error::DuplicateCase { value: *v });
            }
        }
    }
    Ok(())
}

/// Shared context for the statement and value translators: the owning
/// method's analysis results, passed explicitly everywhere.
pub struct MethodCtx<'a> {
    pub program: &'a Program,
    pub class: &'a ClassRef,
    pub method: &'a MethodDescriptor,
    pub body: &'a Body,
    pub info: &'a MethodInfo,
    pub config: &'a Config,
    pub has_traps: bool,
}

impl<'a> MethodCtx<'a> {
    pub fn label_name(&self, id: StmtId) -> Result<String> {
        Ok(format!("L{}", self.info.label_of(id)?))
    }
}

/// Emit the complete C function for one concrete method, returning the
/// body text together with the analysis results (the class emitter writes
/// the derived table sizes into the method's metadata record).
pub fn emit_method(
    program: &Program,
    class: &ClassRef,
    method: &MethodDescriptor,
    config: &Config,
) -> Result<(String, MethodInfo)> {
    let body = method
        .body
        .as_ref()
        .ok_or_else(|| Error::internal(format!("emitting bodyless method {}", method.name)))?;
    let info = analyze(body, &method.name)?;
    let ctx = MethodCtx {
        program,
        class,
        method,
        body,
        info: &info,
        config,
        has_traps: !body.traps.is_empty(),
    };
    let vg = ValueGen::new(program);

    let mut out = String::new();
    out.push_str(&signature(class, method));
    out.push_str("\n{\n");

    // Locals
    for (i, ty) in body.locals.iter().enumerate() {
        out.push_str(&format!("    {} l{};\n", ty.c_name(), i));
    }
    // Stack-allocation aggregates, sized from the concrete layout
    for (i, site) in info.stack_sites.iter().enumerate() {
        match site {
            StackSite::Object(c) => {
                out.push_str(&format!("    struct {} sa{};\n", mangle::instance_struct(c), i));
            }
            StackSite::Array { elem, len } => {
                out.push_str(&format!(
                    "    struct {{ struct rt_array hdr; {} e[{}]; }} sa{};\n",
                    elem.c_name(),
                    len,
                    i
                ));
            }
        }
    }
    if ctx.has_traps {
        out.push_str("    struct rt_trapframe tf;\n");
    }
    if !body.locals.is_empty() || !info.stack_sites.is_empty() || ctx.has_traps {
        out.push('\n');
    }

    // Trap dispatch: the runtime re-enters here with a 1-based handler index
    if ctx.has_traps {
        out.push_str(&format!(
            "    switch ({}(env, &tf, {}, {})) {{\n",
            abi::TRAP_ENTER,
            mangle::trap_table(class, method),
            body.traps.len()
        ));
        for (t, trap) in body.traps.iter().enumerate() {
            out.push_str(&format!(
                "    case {}: goto {};\n",
                t + 1,
                ctx.label_name(trap.handler)?
            ));
        }
        out.push_str("    }\n");
    }

    for &id in body.order() {
        let si = ctx.info.info(id);
        if si.backward_trap_target {
            out.push_str(&format!("    {}(env);\n", abi::POLL));
        }
        if let Some(label) = si.label {
            out.push_str(&format!("L{label}:;\n"));
        }
        if ctx.has_traps && si.needs_region_update {
            out.push_str(&format!("    tf.region = {};\n", si.region));
        }
        if config.line_comments {
            if let Some(li) = si.line_index {
                out.push_str(&format!("    /* line {} */\n", info.lines[li as usize]));
            }
        }
        stmtgen::emit_stmt(&ctx, &vg, id, &mut out)?;
    }

    out.push_str("}\n");
    Ok((out, info))
}

/// C signature of an emitted method
pub fn signature(class: &ClassRef, method: &MethodDescriptor) -> String {
    let mut s = format!(
        "{} {}(JEnv *env",
        method.ret.c_name(),
        mangle::method_fn_of(class, method)
    );
    let mut next = 0u16;
    if !method.flags.is_static {
        s.push_str(", jref a0");
        next = 1;
    }
    for p in &method.params {
        s.push_str(&format!(", {} a{}", p.c_name(), next));
        next += 1;
    }
    s.push(')');
    s
}

/// Per-method line-number table, if any lines were recorded
pub fn emit_line_table(class: &ClassRef, method: &MethodDescriptor, info: &MethodInfo) -> String {
    if info.lines.is_empty() {
        return String::new();
    }
    let mut out = format!(
        "static const struct rt_line {}[] = {{\n",
        mangle::line_table(class, method)
    );
    for (i, line) in info.lines.iter().enumerate() {
        out.push_str(&format!("    {{ {i}, {line} }},\n"));
    }
    out.push_str("};\n");
    out
}

/// Per-method trap table: first/last active region, catch class, handler index
pub fn emit_trap_table(
    class: &ClassRef,
    method: &MethodDescriptor,
    body: &Body,
    info: &MethodInfo,
) -> String {
    if body.traps.is_empty() {
        return String::new();
    }
    let mut out = format!(
        "static const struct rt_trap {}[] = {{\n",
        mangle::trap_table(class, method)
    );
    for (t, trap) in body.traps.iter().enumerate() {
        let span = info.trap_spans[t];
        let catch = match &trap.catch_type {
            Some(c) => mangle::class_desc_ref(c),
            None => "0".to_string(),
        };
        out.push_str(&format!(
            "    {{ {}, {}, {}, {} }},\n",
            span.first_region,
            span.last_region,
            catch,
            t + 1
        ));
    }
    out.push_str("};\n");
    out
}
