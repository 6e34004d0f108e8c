//! IR statements and the per-method statement chain
//!
//! The chain is an arena of statement nodes plus an execution-order vector.
//! `StmtId` handles never move or get reused, so branch targets and trap
//! edges stay valid across optimizer splices; removing a statement only
//! removes it from the order.

use super::ty::{ClassRef, JType};
use super::value::{collect_type, InvokeExpr, Value};

/// Stable handle to a statement node within one method body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StmtId(pub u32);

/// A branch edge to a statement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Target(pub StmtId);

/// Source of an identity bind at method entry or handler entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentitySource {
    This,
    Param(u16),
    CaughtException,
}

/// A single IR statement
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Assign {
        target: Value,
        value: Value,
    },
    Identity {
        local: u16,
        ty: JType,
        source: IdentitySource,
    },
    Invoke(InvokeExpr),
    MonitorEnter(Value),
    MonitorExit(Value),
    If {
        cond: Value,
        target: Target,
    },
    Goto(Target),
    TableSwitch {
        key: Value,
        low: i32,
        targets: Vec<Target>,
        default: Target,
    },
    LookupSwitch {
        key: Value,
        cases: Vec<(i32, Target)>,
        default: Target,
    },
    Return(Option<Value>),
    Throw(Value),
    Nop,
    /// Pseudo-statement inserted by null-check canonicalization, or present
    /// in the input already. Lowers to nothing when `redundant`.
    NullCheck {
        value: Value,
        redundant: bool,
    },
    /// Pseudo-statement forcing class initialization at this point
    ActiveUse(ClassRef),
}

impl Stmt {
    /// Branch targets of this statement (empty for fallthrough-only kinds)
    pub fn targets(&self) -> Vec<StmtId> {
        match self {
            Stmt::If { target, .. } => vec![target.0],
            Stmt::Goto(t) => vec![t.0],
            Stmt::TableSwitch {
                targets, default, ..
            } => {
                let mut v: Vec<StmtId> = targets.iter().map(|t| t.0).collect();
                v.push(default.0);
                v
            }
            Stmt::LookupSwitch { cases, default, .. } => {
                let mut v: Vec<StmtId> = cases.iter().map(|(_, t)| t.0).collect();
                v.push(default.0);
                v
            }
            _ => Vec::new(),
        }
    }

    /// Does control ever continue to the next statement in chain order?
    pub fn falls_through(&self) -> bool {
        !matches!(
            self,
            Stmt::Goto(_)
                | Stmt::TableSwitch { .. }
                | Stmt::LookupSwitch { .. }
                | Stmt::Return(_)
                | Stmt::Throw(_)
        )
    }

    /// Visit the values of this statement, left to right. Translation and
    /// analysis both rely on this order being stable.
    pub fn for_each_value<F: FnMut(&Value)>(&self, f: &mut F) {
        match self {
            Stmt::Assign { target, value } => {
                target.walk(f);
                value.walk(f);
            }
            Stmt::Invoke(inv) => {
                if let Some(r) = &inv.receiver {
                    r.walk(f);
                }
                for a in &inv.args {
                    a.walk(f);
                }
            }
            Stmt::MonitorEnter(v)
            | Stmt::MonitorExit(v)
            | Stmt::Throw(v)
            | Stmt::NullCheck { value: v, .. } => v.walk(f),
            Stmt::If { cond, .. } => cond.walk(f),
            Stmt::TableSwitch { key, .. } | Stmt::LookupSwitch { key, .. } => key.walk(f),
            Stmt::Return(Some(v)) => v.walk(f),
            Stmt::Identity { .. }
            | Stmt::Goto(_)
            | Stmt::Return(None)
            | Stmt::Nop
            | Stmt::ActiveUse(_) => {}
        }
    }
}

/// A statement node: the statement plus its optional source line
#[derive(Debug, Clone, PartialEq)]
pub struct StmtNode {
    pub stmt: Stmt,
    pub line: Option<u32>,
}

/// An exception-handler registration. `end` is exclusive; the handler must
/// also be a branch target (enforced by the method analyzer).
#[derive(Debug, Clone, PartialEq)]
pub struct Trap {
    pub begin: StmtId,
    pub end: StmtId,
    pub handler: StmtId,
    /// None is a catch-all
    pub catch_type: Option<ClassRef>,
}

/// One method's statement chain, locals and traps
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Body {
    nodes: Vec<StmtNode>,
    order: Vec<StmtId>,
    pub traps: Vec<Trap>,
    /// Types of the method's locals, indexed by local number
    pub locals: Vec<JType>,
    /// Statement count before any optimization; the inliner's growth-ratio
    /// cap is measured against this so re-runs reach the same fixed point
    pub original_len: usize,
    /// Set once synchronized-method lowering has run
    pub sync_lowered: bool,
}

impl Body {
    pub fn new(locals: Vec<JType>) -> Self {
        Self {
            locals,
            ..Self::default()
        }
    }

    /// Allocate a node in the arena without placing it in the order
    pub fn alloc(&mut self, stmt: Stmt, line: Option<u32>) -> StmtId {
        let id = StmtId(self.nodes.len() as u32);
        self.nodes.push(StmtNode { stmt, line });
        id
    }

    /// Allocate a node and append it to the execution order
    pub fn push(&mut self, stmt: Stmt, line: Option<u32>) -> StmtId {
        let id = self.alloc(stmt, line);
        self.order.push(id);
        id
    }

    pub fn node(&self, id: StmtId) -> &StmtNode {
        &self.nodes[id.0 as usize]
    }

    pub fn node_mut(&mut self, id: StmtId) -> &mut StmtNode {
        &mut self.nodes[id.0 as usize]
    }

    pub fn stmt(&self, id: StmtId) -> &Stmt {
        &self.node(id).stmt
    }

    /// Execution order of the chain
    pub fn order(&self) -> &[StmtId] {
        &self.order
    }

    /// Number of arena slots ever allocated (placed or not)
    pub fn arena_len(&self) -> usize {
        self.nodes.len()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Position of `id` in the order, if it is placed
    pub fn position(&self, id: StmtId) -> Option<usize> {
        self.order.iter().position(|&s| s == id)
    }

    /// Remove a range of statements from the order (arena slots stay)
    pub fn remove_range(&mut self, start: usize, len: usize) {
        self.order.drain(start..start + len);
    }

    /// Insert already-allocated statements into the order at `pos`
    pub fn insert_at(&mut self, pos: usize, ids: &[StmtId]) {
        self.order.splice(pos..pos, ids.iter().copied());
    }

    /// Append a new local of the given type, returning its index
    pub fn add_local(&mut self, ty: JType) -> u16 {
        let idx = self.locals.len() as u16;
        self.locals.push(ty);
        idx
    }

    /// Record the pre-optimization statement count, once
    pub fn freeze_original_len(&mut self) {
        if self.original_len == 0 {
            self.original_len = self.order.len();
        }
    }

    /// Every statement that is the target of a branch or a trap handler
    pub fn branch_target_set(&self) -> std::collections::HashSet<StmtId> {
        let mut set = std::collections::HashSet::new();
        for &id in &self.order {
            for t in self.stmt(id).targets() {
                set.insert(t);
            }
        }
        for trap in &self.traps {
            set.insert(trap.handler);
        }
        set
    }

    /// Collect every class referenced by statements, locals and traps
    pub fn collect_classes(&self, out: &mut std::collections::BTreeSet<ClassRef>) {
        for ty in &self.locals {
            collect_type(ty, out);
        }
        for trap in &self.traps {
            if let Some(c) = &trap.catch_type {
                out.insert(c.clone());
            }
        }
        for &id in &self.order {
            let node = self.node(id);
            match &node.stmt {
                Stmt::Assign { target, value } => {
                    target.collect_classes(out);
                    value.collect_classes(out);
                }
                Stmt::Invoke(inv) => {
                    out.insert(inv.target.class.clone());
                    for p in &inv.target.params {
                        collect_type(p, out);
                    }
                    collect_type(&inv.target.ret, out);
                    if let Some(r) = &inv.receiver {
                        r.collect_classes(out);
                    }
                    for a in &inv.args {
                        a.collect_classes(out);
                    }
                }
                Stmt::MonitorEnter(v)
                | Stmt::MonitorExit(v)
                | Stmt::Throw(v)
                | Stmt::NullCheck { value: v, .. }
                | Stmt::Return(Some(v)) => v.collect_classes(out),
                Stmt::If { cond, .. } => cond.collect_classes(out),
                Stmt::TableSwitch { key, .. } | Stmt::LookupSwitch { key, .. } => {
                    key.collect_classes(out)
                }
                Stmt::Identity { ty, .. } => collect_type(ty, out),
                Stmt::ActiveUse(c) => {
                    out.insert(c.clone());
                }
                Stmt::Goto(_) | Stmt::Return(None) | Stmt::Nop => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::value::Constant;

    #[test]
    fn arena_ids_survive_order_edits() {
        let mut body = Body::new(vec![]);
        let a = body.push(Stmt::Nop, None);
        let b = body.push(Stmt::Nop, None);
        let c = body.push(Stmt::Return(None), None);
        body.remove_range(1, 1);
        assert_eq!(body.order(), &[a, c]);
        // b's node is still addressable even though it left the order
        assert_eq!(body.stmt(b), &Stmt::Nop);
    }

    #[test]
    fn branch_target_set_includes_trap_handlers() {
        let mut body = Body::new(vec![]);
        let first = body.push(Stmt::Nop, None);
        let handler = body.push(
            Stmt::Throw(Value::Const(Constant::Null)),
            None,
        );
        let end = body.push(Stmt::Return(None), None);
        body.traps.push(Trap {
            begin: first,
            end,
            handler,
            catch_type: None,
        });
        let targets = body.branch_target_set();
        assert!(targets.contains(&handler));
        assert!(!targets.contains(&first));
    }
}
