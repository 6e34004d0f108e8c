//! Target C expression builder
//!
//! Pure tree construction over a small set of operator kinds; rendering
//! inserts the minimum parentheses under a fixed precedence partial order.
//! Mixed bitwise operators are always parenthesized against each other:
//! C's bitwise/logical precedence is a perennial source of bugs and the
//! emitted source must be unambiguous to a human reader as well.

use std::fmt;

/// Precedence levels, tightest-binding first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Prec {
    Atom,
    Postfix,
    Unary,
    Mul,
    Add,
    Shift,
    Rel,
    BitAnd,
    BitXor,
    BitOr,
    LogAnd,
    LogOr,
    Ternary,
}

/// Precedence of a binary operator token
fn binop_prec(op: &str) -> Prec {
    match op {
        "*" | "/" | "%" => Prec::Mul,
        "+" | "-" => Prec::Add,
        "<<" | ">>" => Prec::Shift,
        "<" | "<=" | ">" | ">=" | "==" | "!=" => Prec::Rel,
        "&" => Prec::BitAnd,
        "^" => Prec::BitXor,
        "|" => Prec::BitOr,
        "&&" => Prec::LogAnd,
        "||" => Prec::LogOr,
        _ => unreachable!("not a binary operator: {op}"),
    }
}

fn is_bitwise(op: &str) -> bool {
    matches!(op, "&" | "^" | "|" | "<<" | ">>")
}

/// A target-language expression tree
#[derive(Debug, Clone, PartialEq)]
pub enum CExpr {
    Atom(String),
    Unary {
        op: &'static str,
        operand: Box<CExpr>,
    },
    Binary {
        op: &'static str,
        lhs: Box<CExpr>,
        rhs: Box<CExpr>,
    },
    Ternary {
        cond: Box<CExpr>,
        then: Box<CExpr>,
        other: Box<CExpr>,
    },
    Cast {
        ty: String,
        operand: Box<CExpr>,
    },
    Index {
        base: Box<CExpr>,
        index: Box<CExpr>,
    },
    Arrow {
        base: Box<CExpr>,
        field: String,
    },
    Dot {
        base: Box<CExpr>,
        field: String,
    },
    Call {
        func: Box<CExpr>,
        args: Vec<CExpr>,
    },
}

impl CExpr {
    pub fn atom(s: impl Into<String>) -> Self {
        CExpr::Atom(s.into())
    }

    pub fn int(v: i64) -> Self {
        CExpr::Atom(v.to_string())
    }

    pub fn unary(op: &'static str, operand: CExpr) -> Self {
        CExpr::Unary {
            op,
            operand: Box::new(operand),
        }
    }

    pub fn bin(op: &'static str, lhs: CExpr, rhs: CExpr) -> Self {
        debug_assert!(binop_prec(op) <= Prec::LogOr);
        CExpr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    pub fn ternary(cond: CExpr, then: CExpr, other: CExpr) -> Self {
        CExpr::Ternary {
            cond: Box::new(cond),
            then: Box::new(then),
            other: Box::new(other),
        }
    }

    pub fn cast(ty: impl Into<String>, operand: CExpr) -> Self {
        CExpr::Cast {
            ty: ty.into(),
            operand: Box::new(operand),
        }
    }

    pub fn index(base: CExpr, index: CExpr) -> Self {
        CExpr::Index {
            base: Box::new(base),
            index: Box::new(index),
        }
    }

    pub fn arrow(base: CExpr, field: impl Into<String>) -> Self {
        CExpr::Arrow {
            base: Box::new(base),
            field: field.into(),
        }
    }

    pub fn dot(base: CExpr, field: impl Into<String>) -> Self {
        CExpr::Dot {
            base: Box::new(base),
            field: field.into(),
        }
    }

    pub fn call(func: impl Into<String>, args: Vec<CExpr>) -> Self {
        CExpr::Call {
            func: Box::new(CExpr::Atom(func.into())),
            args,
        }
    }

    pub fn call_expr(func: CExpr, args: Vec<CExpr>) -> Self {
        CExpr::Call {
            func: Box::new(func),
            args,
        }
    }

    /// Dereference: `*expr`
    pub fn deref(operand: CExpr) -> Self {
        CExpr::unary("*", operand)
    }

    /// Address-of: `&expr`
    pub fn addr(operand: CExpr) -> Self {
        CExpr::unary("&", operand)
    }

    fn prec(&self) -> Prec {
        match self {
            CExpr::Atom(_) => Prec::Atom,
            CExpr::Index { .. } | CExpr::Arrow { .. } | CExpr::Dot { .. } | CExpr::Call { .. } => {
                Prec::Postfix
            }
            CExpr::Unary { .. } | CExpr::Cast { .. } => Prec::Unary,
            CExpr::Binary { op, .. } => binop_prec(op),
            CExpr::Ternary { .. } => Prec::Ternary,
        }
    }

    /// Binary operator token, when this node is a binary expression
    fn binary_op(&self) -> Option<&'static str> {
        match self {
            CExpr::Binary { op, .. } => Some(op),
            _ => None,
        }
    }

    fn write(&self, out: &mut String, parent: Prec, parent_op: Option<&str>, right_side: bool) {
        let mut parens = self.prec() > parent
            || (self.prec() == parent && right_side && parent != Prec::Atom);
        // Mixed bitwise operators are parenthesized regardless of precedence
        if let (Some(op), Some(pop)) = (self.binary_op(), parent_op) {
            if is_bitwise(op) && is_bitwise(pop) && op != pop {
                parens = true;
            }
        }
        if parens {
            out.push('(');
        }
        match self {
            CExpr::Atom(s) => out.push_str(s),
            CExpr::Unary { op, operand } => {
                out.push_str(op);
                let mut rendered = String::new();
                operand.write(&mut rendered, Prec::Unary, None, false);
                // `--x` and `&&x` would lex as different tokens
                if rendered.starts_with(op.chars().next().unwrap_or(' ')) {
                    out.push('(');
                    out.push_str(&rendered);
                    out.push(')');
                } else {
                    out.push_str(&rendered);
                }
            }
            CExpr::Binary { op, lhs, rhs } => {
                let prec = binop_prec(op);
                lhs.write(out, prec, Some(op), false);
                out.push(' ');
                out.push_str(op);
                out.push(' ');
                rhs.write(out, prec, Some(op), true);
            }
            CExpr::Ternary { cond, then, other } => {
                cond.write(out, Prec::LogOr, None, false);
                out.push_str(" ? ");
                then.write(out, Prec::Ternary, None, false);
                out.push_str(" : ");
                other.write(out, Prec::Ternary, None, true);
            }
            CExpr::Cast { ty, operand } => {
                out.push('(');
                out.push_str(ty);
                out.push(')');
                operand.write(out, Prec::Unary, None, false);
            }
            CExpr::Index { base, index } => {
                base.write(out, Prec::Postfix, None, false);
                out.push('[');
                index.write(out, Prec::Ternary, None, false);
                out.push(']');
            }
            CExpr::Arrow { base, field } => {
                base.write(out, Prec::Postfix, None, false);
                out.push_str("->");
                out.push_str(field);
            }
            CExpr::Dot { base, field } => {
                base.write(out, Prec::Postfix, None, false);
                out.push('.');
                out.push_str(field);
            }
            CExpr::Call { func, args } => {
                func.write(out, Prec::Postfix, None, false);
                out.push('(');
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    a.write(out, Prec::Ternary, None, false);
                }
                out.push(')');
            }
        }
        if parens {
            out.push(')');
        }
    }

    /// Render to C source with minimum parentheses
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.write(&mut out, Prec::Ternary, None, false);
        out
    }
}

impl fmt::Display for CExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn a(s: &str) -> CExpr {
        CExpr::atom(s)
    }

    #[test]
    fn no_redundant_parens_under_precedence() {
        let e = CExpr::bin("+", CExpr::bin("*", a("a"), a("b")), a("c"));
        assert_eq!(e.render(), "a * b + c");
    }

    #[test]
    fn parens_when_looser_child_under_tighter_parent() {
        let e = CExpr::bin("*", CExpr::bin("+", a("a"), a("b")), a("c"));
        assert_eq!(e.render(), "(a + b) * c");
    }

    #[test]
    fn right_operand_of_equal_precedence_is_parenthesized() {
        let e = CExpr::bin("-", a("a"), CExpr::bin("-", a("b"), a("c")));
        assert_eq!(e.render(), "a - (b - c)");
    }

    #[test]
    fn mixed_bitwise_always_parenthesized() {
        let e = CExpr::bin("|", CExpr::bin("&", a("a"), a("b")), a("c"));
        assert_eq!(e.render(), "(a & b) | c");
        let e = CExpr::bin("&", a("a"), CExpr::bin("^", a("b"), a("c")));
        assert_eq!(e.render(), "a & (b ^ c)");
    }

    #[test]
    fn same_bitwise_left_chain_is_flat() {
        let e = CExpr::bin("&", CExpr::bin("&", a("a"), a("b")), a("c"));
        assert_eq!(e.render(), "a & b & c");
    }

    #[test]
    fn postfix_and_unary_compose() {
        let e = CExpr::arrow(CExpr::cast("struct in_Foo *", a("r1")), "f_x");
        assert_eq!(e.render(), "((struct in_Foo *)r1)->f_x");
        let e = CExpr::deref(CExpr::cast("jint *", CExpr::call("rt_field", vec![a("env")])));
        assert_eq!(e.render(), "*(jint *)rt_field(env)");
    }

    #[test]
    fn ternary_and_call_arguments_need_no_parens() {
        let e = CExpr::call(
            "f",
            vec![CExpr::ternary(a("c"), a("x"), a("y")), CExpr::bin("+", a("a"), a("b"))],
        );
        assert_eq!(e.render(), "f(c ? x : y, a + b)");
    }

    #[test]
    fn doubled_unary_does_not_glue_into_one_token() {
        let e = CExpr::unary("-", CExpr::unary("-", a("x")));
        assert_eq!(e.render(), "-(-x)");
        let e = CExpr::unary("-", a("-2147483647"));
        assert_eq!(e.render(), "-(-2147483647)");
    }

    #[test]
    fn unary_binds_tighter_than_binary() {
        let e = CExpr::bin("+", CExpr::unary("-", a("a")), a("b"));
        assert_eq!(e.render(), "-a + b");
        let e = CExpr::unary("-", CExpr::bin("+", a("a"), a("b")));
        assert_eq!(e.render(), "-(a + b)");
    }
}
