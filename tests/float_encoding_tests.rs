mod common;

use common::{core_program, main_class};
use jatoc::ir::{Body, Constant, JType, Stmt, Value};
use jatoc::Config;

fn config() -> Config {
    Config::default().without_optimizer()
}

fn emit_return(constant: Constant, ret: JType) -> String {
    let mut b = Body::new(vec![]);
    b.push(Stmt::Return(Some(Value::Const(constant))), Some(1));
    let mut p = core_program();
    p.add_class(main_class("k", vec![], ret, b));
    jatoc::generate(&p, "Main", &config()).unwrap().body
}

#[test]
fn float_constants_are_bit_exact() {
    let body = emit_return(Constant::Float(1.5), JType::Float);
    assert!(body.contains("return jfloat_bits(0x3fc00000U);"));
}

#[test]
fn negative_zero_keeps_its_sign_bit() {
    let body = emit_return(Constant::Double(-0.0), JType::Double);
    assert!(body.contains("return jdouble_bits(0x8000000000000000ULL);"));
    // Positive zero needs no reconstruction
    let body = emit_return(Constant::Double(0.0), JType::Double);
    assert!(body.contains("return 0.0;"));
}

#[test]
fn nan_payloads_survive() {
    let quiet = f32::from_bits(0x7fc00001);
    let body = emit_return(Constant::Float(quiet), JType::Float);
    assert!(body.contains("return jfloat_bits(0x7fc00001U);"));
}

#[test]
fn extreme_integer_literals_avoid_overflow() {
    let body = emit_return(Constant::Int(i32::MIN), JType::Int);
    assert!(body.contains("return (-2147483647 - 1);"));
    let body = emit_return(Constant::Long(i64::MIN), JType::Long);
    assert!(body.contains("return (-9223372036854775807LL - 1LL);"));
}
