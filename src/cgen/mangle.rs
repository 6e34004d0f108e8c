//! C identifier mangling
//!
//! Every emitted name is derived deterministically from the class/member it
//! stands for. Method identifiers carry an 8-hex-digit descriptor hash so
//! overloads never collide and a slot keeps its name across the hierarchy.

use crate::ir::{ClassRef, JType, MethodDescriptor, MethodRef};
use crate::runtime;

/// Flatten a dotted class name into a C identifier: `java.lang.Object`
/// becomes `java_lang_Object`. `$` (nested classes) also maps to `_`.
pub fn class_ident(class: &ClassRef) -> String {
    class
        .name()
        .chars()
        .map(|c| if c == '.' || c == '$' || c == '/' { '_' } else { c })
        .collect()
}

/// Instance struct: `in_<class>`
pub fn instance_struct(class: &ClassRef) -> String {
    format!("in_{}", class_ident(class))
}

/// Class-descriptor struct: `cl_<class>` (rt_class header + vtable)
pub fn class_struct(class: &ClassRef) -> String {
    format!("cl_{}", class_ident(class))
}

/// Vtable struct: `vt_<class>`
pub fn vtable_struct(class: &ClassRef) -> String {
    format!("vt_{}", class_ident(class))
}

/// Class-descriptor object: `cd_<class>`
pub fn class_desc(class: &ClassRef) -> String {
    format!("cd_{}", class_ident(class))
}

/// `&cd_<class>.c` — the `struct rt_class *` handed to runtime calls
pub fn class_desc_ref(class: &ClassRef) -> String {
    format!("&cd_{}.c", class_ident(class))
}

/// Statics struct and object: `st_<class>`
pub fn statics_struct(class: &ClassRef) -> String {
    format!("st_{}", class_ident(class))
}

/// Instance field member: `f_<name>`
pub fn field_member(name: &str) -> String {
    format!("f_{}", sanitize(name))
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// Constructor and class-initializer names carry angle brackets in the IR;
/// flatten them for C.
fn method_base_name(name: &str) -> String {
    match name {
        "<init>" => "init".to_string(),
        "<clinit>" => "clinit".to_string(),
        other => sanitize(other),
    }
}

fn sig_suffix(descriptor: &str) -> String {
    format!("{:08x}", runtime::fnv1a(descriptor.as_bytes()))
}

/// Emitted function name for a method: `m_<class>_<name>_<sighash>`
pub fn method_fn(class: &ClassRef, name: &str, descriptor: &str) -> String {
    format!(
        "m_{}_{}_{}",
        class_ident(class),
        method_base_name(name),
        sig_suffix(descriptor)
    )
}

pub fn method_fn_of(class: &ClassRef, m: &MethodDescriptor) -> String {
    method_fn(class, &m.name, &m.descriptor())
}

pub fn method_fn_of_ref(r: &MethodRef) -> String {
    method_fn(&r.class, &r.name, &r.descriptor())
}

/// Vtable member for a slot: `m_<name>_<sighash>`. The suffix makes the
/// member independent of which class introduced the slot, so overriding
/// classes emit the same member name.
pub fn vtable_member(name: &str, descriptor: &str) -> String {
    format!("m_{}_{}", method_base_name(name), sig_suffix(descriptor))
}

/// Per-method auxiliary table names
pub fn line_table(class: &ClassRef, m: &MethodDescriptor) -> String {
    format!("ln_{}_{}_{}", class_ident(class), method_base_name(&m.name), sig_suffix(&m.descriptor()))
}

pub fn trap_table(class: &ClassRef, m: &MethodDescriptor) -> String {
    format!("tr_{}_{}_{}", class_ident(class), method_base_name(&m.name), sig_suffix(&m.descriptor()))
}

/// C function-pointer type for a method slot, e.g.
/// `jint (*)(JEnv *, jref, jint)`
pub fn fn_ptr_type(ret: &JType, receiver: bool, params: &[JType]) -> String {
    let mut s = format!("{} (*)(JEnv *", ret.c_name());
    if receiver {
        s.push_str(", jref");
    }
    for p in params {
        s.push_str(", ");
        s.push_str(p.c_name());
    }
    s.push(')');
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn class_names_flatten() {
        assert_eq!(class_ident(&ClassRef::new("java.lang.Object")), "java_lang_Object");
        assert_eq!(class_ident(&ClassRef::new("a.B$C")), "a_B_C");
    }

    #[test]
    fn overloads_get_distinct_function_names() {
        let c = ClassRef::new("Foo");
        let a = method_fn(&c, "run", "()V");
        let b = method_fn(&c, "run", "(I)V");
        assert_ne!(a, b);
        assert!(a.starts_with("m_Foo_run_"));
    }

    #[test]
    fn constructors_flatten_angle_brackets() {
        let c = ClassRef::new("Foo");
        assert!(method_fn(&c, "<init>", "()V").starts_with("m_Foo_init_"));
    }

    #[test]
    fn vtable_member_is_class_independent() {
        assert_eq!(vtable_member("hashCode", "()I"), {
            let again = vtable_member("hashCode", "()I");
            again
        });
    }
}
