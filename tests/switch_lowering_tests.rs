mod common;

use common::{core_program, main_class};
use jatoc::ir::{Body, Constant, JType, Stmt, Target, Value};
use jatoc::{Config, Error};

fn config() -> Config {
    Config::default().without_optimizer()
}

fn key() -> Value {
    Value::Local {
        index: 0,
        ty: JType::Int,
    }
}

fn ret(b: &mut Body, v: i32) -> jatoc::ir::StmtId {
    b.alloc(Stmt::Return(Some(Value::Const(Constant::Int(v)))), None)
}

#[test]
fn consecutive_table_cases_merge_into_ranges() {
    let mut b = Body::new(vec![JType::Int]);
    let a = ret(&mut b, 1);
    let c = ret(&mut b, 2);
    let d = ret(&mut b, 0);
    let sw = b.alloc(
        Stmt::TableSwitch {
            key: key(),
            low: 1,
            targets: vec![Target(a), Target(a), Target(a), Target(c)],
            default: Target(d),
        },
        None,
    );
    b.insert_at(0, &[sw, a, c, d]);

    let mut p = core_program();
    p.add_class(main_class("pick", vec![JType::Int], JType::Int, b));
    let unit = jatoc::generate(&p, "Main", &config()).unwrap();

    assert!(unit.body.contains("case 1 ... 3: goto L0;"));
    assert!(unit.body.contains("case 4: goto L1;"));
    assert!(unit.body.contains("default: goto L2;"));
}

#[test]
fn default_equal_cases_are_dropped() {
    let mut b = Body::new(vec![JType::Int]);
    let a = ret(&mut b, 1);
    let d = ret(&mut b, 0);
    let sw = b.alloc(
        Stmt::LookupSwitch {
            key: key(),
            cases: vec![(9, Target(a)), (5, Target(d)), (1, Target(a))],
            default: Target(d),
        },
        None,
    );
    b.insert_at(0, &[sw, a, d]);

    let mut p = core_program();
    p.add_class(main_class("pick", vec![JType::Int], JType::Int, b));
    let unit = jatoc::generate(&p, "Main", &config()).unwrap();

    // Cases are sorted, and the one equal to the default disappears
    assert!(unit.body.contains("case 1: goto L0;"));
    assert!(unit.body.contains("case 9: goto L0;"));
    assert!(!unit.body.contains("case 5"));
    let one = unit.body.find("case 1:").unwrap();
    let nine = unit.body.find("case 9:").unwrap();
    assert!(one < nine);
}

#[test]
fn duplicate_lookup_values_are_fatal() {
    let mut b = Body::new(vec![JType::Int]);
    let a = ret(&mut b, 1);
    let c = ret(&mut b, 2);
    let d = ret(&mut b, 0);
    let sw = b.alloc(
        Stmt::LookupSwitch {
            key: key(),
            cases: vec![(7, Target(a)), (7, Target(c))],
            default: Target(d),
        },
        None,
    );
    b.insert_at(0, &[sw, a, c, d]);

    let mut p = core_program();
    p.add_class(main_class("pick", vec![JType::Int], JType::Int, b));
    match jatoc::generate(&p, "Main", &config()) {
        Err(Error::DuplicateCase { value }) => assert_eq!(value, 7),
        other => panic!("expected a duplicate-case error, got {other:?}"),
    }
}
