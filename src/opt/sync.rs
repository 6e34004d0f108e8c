//! Synchronized-method lowering
//!
//! A synchronized method becomes an ordinary method whose body acquires the
//! monitor after the identity binds, releases it before every return, and
//! carries a catch-all trap that releases the monitor and rethrows. Instance
//! methods lock the receiver; static methods lock the class token.

use crate::ir::{
    Body, ClassRef, Constant, IdentitySource, JType, MethodFlags, Stmt, Trap, Value,
};

/// Lower a synchronized method body in place. Returns the number of rewrites
/// (0 or 1); a body already lowered, or not synchronized, is left alone.
pub fn lower_synchronized(body: &mut Body, class: &ClassRef, flags: MethodFlags) -> usize {
    if !flags.is_synchronized || body.sync_lowered || body.is_empty() {
        return 0;
    }

    let lock = if flags.is_static {
        Value::Const(Constant::Class(class.clone()))
    } else {
        Value::This(class.clone())
    };

    // Monitor acquisition goes after the leading identity binds
    let enter_pos = body
        .order()
        .iter()
        .position(|&id| !matches!(body.stmt(id), Stmt::Identity { .. }))
        .unwrap_or(body.len());
    let enter = body.alloc(Stmt::MonitorEnter(lock.clone()), None);
    body.insert_at(enter_pos, &[enter]);
    // The protected region starts at the first original statement; the
    // releases inserted below stay outside it, so a throwing release
    // cannot re-enter the handler
    let begin = body.order().get(enter_pos + 1).copied();

    // Release before every return
    let returns: Vec<_> = body
        .order()
        .iter()
        .copied()
        .filter(|&id| matches!(body.stmt(id), Stmt::Return(_)))
        .collect();
    for ret in returns {
        let pos = match body.position(ret) {
            Some(p) => p,
            None => continue,
        };
        let exit = body.alloc(Stmt::MonitorExit(lock.clone()), body.node(ret).line);
        body.insert_at(pos, &[exit]);
    }

    // Catch-all handler: bind, release, rethrow
    let throwable = JType::Ref(ClassRef::new("java.lang.Throwable"));
    let exc = body.add_local(throwable.clone());
    let handler = body.push(
        Stmt::Identity {
            local: exc,
            ty: throwable.clone(),
            source: IdentitySource::CaughtException,
        },
        None,
    );
    body.push(Stmt::MonitorExit(lock), None);
    body.push(
        Stmt::Throw(Value::Local {
            index: exc,
            ty: throwable,
        }),
        None,
    );

    if let Some(begin) = begin {
        body.traps.push(Trap {
            begin,
            end: handler,
            handler,
            catch_type: None,
        });
    }
    body.sync_lowered = true;
    1
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sync_flags() -> MethodFlags {
        MethodFlags {
            is_synchronized: true,
            ..MethodFlags::default()
        }
    }

    fn void_return_body() -> Body {
        let mut body = Body::new(vec![JType::Ref(ClassRef::new("Counter"))]);
        body.push(
            Stmt::Identity {
                local: 0,
                ty: JType::Ref(ClassRef::new("Counter")),
                source: IdentitySource::This,
            },
            Some(3),
        );
        body.push(Stmt::Return(None), Some(4));
        body
    }

    #[test]
    fn lowering_brackets_the_body() {
        let mut body = void_return_body();
        let n = lower_synchronized(&mut body, &ClassRef::new("Counter"), sync_flags());
        assert_eq!(n, 1);

        let kinds: Vec<_> = body
            .order()
            .iter()
            .map(|&id| body.stmt(id).clone())
            .collect();
        // identity, enter, exit, return, then the three handler statements
        assert!(matches!(kinds[0], Stmt::Identity { .. }));
        assert!(matches!(kinds[1], Stmt::MonitorEnter(_)));
        assert!(matches!(kinds[2], Stmt::MonitorExit(_)));
        assert!(matches!(kinds[3], Stmt::Return(None)));
        assert!(matches!(kinds[4], Stmt::Identity { .. }));
        assert!(matches!(kinds[5], Stmt::MonitorExit(_)));
        assert!(matches!(kinds[6], Stmt::Throw(_)));
        assert_eq!(body.traps.len(), 1);
        assert!(body.traps[0].catch_type.is_none());
    }

    #[test]
    fn lowering_runs_once() {
        let mut body = void_return_body();
        assert_eq!(
            lower_synchronized(&mut body, &ClassRef::new("Counter"), sync_flags()),
            1
        );
        let len = body.len();
        assert_eq!(
            lower_synchronized(&mut body, &ClassRef::new("Counter"), sync_flags()),
            0
        );
        assert_eq!(body.len(), len);
    }

    #[test]
    fn inserted_release_stays_outside_the_trap() {
        // The body opens with a return, so the release lands first
        let mut body = Body::new(vec![]);
        body.push(Stmt::Return(None), None);
        let flags = MethodFlags {
            is_static: true,
            ..sync_flags()
        };
        lower_synchronized(&mut body, &ClassRef::new("Counter"), flags);

        let begin = body.traps[0].begin;
        assert!(matches!(body.stmt(begin), Stmt::Return(None)));
        let exit_pos = body
            .order()
            .iter()
            .position(|&id| matches!(body.stmt(id), Stmt::MonitorExit(_)))
            .unwrap();
        assert!(exit_pos < body.position(begin).unwrap());
    }

    #[test]
    fn static_methods_lock_the_class_token() {
        let mut body = Body::new(vec![]);
        body.push(Stmt::Return(None), None);
        let flags = MethodFlags {
            is_static: true,
            ..sync_flags()
        };
        lower_synchronized(&mut body, &ClassRef::new("Counter"), flags);
        let enter = body
            .order()
            .iter()
            .find_map(|&id| match body.stmt(id) {
                Stmt::MonitorEnter(v) => Some(v.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(enter, Value::Const(Constant::Class(ClassRef::new("Counter"))));
    }
}
