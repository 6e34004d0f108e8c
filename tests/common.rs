// Common test utilities: minimal IR programs shaped like frontend output

use jatoc::ir::{
    Body, ClassDescriptor, ClassRef, JType, MethodDescriptor, MethodFlags, Program,
};

/// Core library classes every test program needs: Object (native hashCode),
/// Throwable and NullPointerException with native constructors.
pub fn core_program() -> Program {
    let mut p = Program::new();

    let mut object = ClassDescriptor::new("java.lang.Object");
    let mut hash_code = MethodDescriptor::new("hashCode", vec![], JType::Int);
    hash_code.flags = native();
    object.virtual_methods.push(hash_code);
    let mut obj_init = MethodDescriptor::new("<init>", vec![], JType::Void);
    obj_init.flags = native();
    object.constructors.push(obj_init);
    p.add_class(object);

    let mut throwable = ClassDescriptor::new("java.lang.Throwable");
    let mut init = MethodDescriptor::new("<init>", vec![], JType::Void);
    init.flags = native();
    throwable.constructors.push(init);
    p.add_class(throwable);

    let mut npe = ClassDescriptor::new("java.lang.NullPointerException");
    npe.superclass = Some(ClassRef::new("java.lang.Throwable"));
    let mut init = MethodDescriptor::new("<init>", vec![], JType::Void);
    init.flags = native();
    npe.constructors.push(init);
    p.add_class(npe);

    p
}

pub fn native() -> MethodFlags {
    MethodFlags {
        is_native: true,
        ..MethodFlags::default()
    }
}

pub fn static_flags() -> MethodFlags {
    MethodFlags {
        is_static: true,
        ..MethodFlags::default()
    }
}

/// A class named `Main` holding the given concrete static method
pub fn main_class(method_name: &str, params: Vec<JType>, ret: JType, body: Body) -> ClassDescriptor {
    let mut main = ClassDescriptor::new("Main");
    main.source_file = Some("Main.java".to_string());
    let mut m = MethodDescriptor::new(method_name, params, ret);
    m.flags = static_flags();
    m.body = Some(body);
    main.static_methods.push(m);
    main
}
