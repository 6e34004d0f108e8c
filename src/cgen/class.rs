//! Class-level emission: header and body units plus the dispatch tables
//!
//! The class emitter owns all incrementally built tables (vtable layout,
//! interface-method hash buckets, instanceof slots) through a `ClassTables`
//! builder that lives for exactly one class's generation. Both emitted units
//! begin with machine-parseable `@dep_class` / `@dep_header` tags; the
//! incremental-build driver compares the class-shape hashes in those tags to
//! decide what is stale.

use std::collections::BTreeSet;

use log::debug;

use super::mangle;
use super::method::{self, MethodInfo};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::ir::{ClassDescriptor, ClassRef, JType, Program};
use crate::runtime;

/// The two emitted units for one class
#[derive(Debug, Clone)]
pub struct EmittedClass {
    /// Flat C identifier of the class; the driver names files after it
    pub ident: String,
    pub header: String,
    pub body: String,
}

impl EmittedClass {
    pub fn header_file(&self) -> String {
        format!("{}.h", self.ident)
    }

    pub fn body_file(&self) -> String {
        format!("{}.c", self.ident)
    }
}

/// One virtual-table slot
#[derive(Debug, Clone)]
struct VtSlot {
    member: String,
    name: String,
    params: Vec<JType>,
    ret: JType,
}

/// One interface-method table entry: signature hash and implementing function
#[derive(Debug, Clone)]
struct IfaceEntry {
    hash: u32,
    func: String,
}

/// Tables built incrementally while one class is emitted; owned by the
/// emitter, never shared across classes or threads.
struct ClassTables {
    vtable: Vec<VtSlot>,
    buckets: Vec<Vec<IfaceEntry>>,
    instanceof: Vec<Option<ClassRef>>,
}

impl ClassTables {
    fn build(program: &Program, class: &ClassDescriptor, config: &Config) -> Result<Self> {
        let vtable = if class.is_interface {
            Vec::new()
        } else {
            vtable_layout(program, class)?
        };
        let buckets = iface_buckets(program, class, config)?;
        let instanceof = instanceof_slots(program, class, config)?;
        Ok(Self {
            vtable,
            buckets,
            instanceof,
        })
    }

    fn has_iface_entries(&self) -> bool {
        self.buckets.iter().any(|b| !b.is_empty())
    }
}

/// Vtable slots in superclass-chain order; an override replaces the slot
/// introduced by the ancestor, so the member name and index never change.
fn vtable_layout(program: &Program, class: &ClassDescriptor) -> Result<Vec<VtSlot>> {
    let chain = program.linearized_chain(class)?;
    let mut slots: Vec<VtSlot> = Vec::new();
    for cd in chain {
        for m in &cd.virtual_methods {
            if m.flags.is_private {
                continue;
            }
            let exists = slots
                .iter()
                .any(|s| s.name == m.name && s.params == m.params && s.ret == m.ret);
            if !exists {
                slots.push(VtSlot {
                    member: mangle::vtable_member(&m.name, &m.descriptor()),
                    name: m.name.clone(),
                    params: m.params.clone(),
                    ret: m.ret.clone(),
                });
            }
        }
    }
    Ok(slots)
}

/// Most-derived declaration of a virtual signature; `None` when the most
/// derived declaration is abstract (the slot stays null in the vtable).
fn resolve_slot_impl(
    program: &Program,
    class: &ClassDescriptor,
    name: &str,
    params: &[JType],
    ret: &JType,
) -> Result<Option<String>> {
    let chain = program.linearized_chain(class)?;
    for cd in chain.iter().rev() {
        if let Some(m) = cd.find_virtual(name, params, ret) {
            if m.flags.is_abstract {
                return Ok(None);
            }
            return Ok(Some(mangle::method_fn_of(&cd.name, m)));
        }
    }
    Err(Error::UnknownMethod {
        class: class.name.name().to_string(),
        name: name.to_string(),
        descriptor: crate::ir::ty::method_descriptor(params, ret),
    })
}

/// Interface-method hash buckets: every method of every transitively
/// implemented interface, hashed by signature, resolved on this class.
fn iface_buckets(
    program: &Program,
    class: &ClassDescriptor,
    config: &Config,
) -> Result<Vec<Vec<IfaceEntry>>> {
    let mut buckets = vec![Vec::new(); config.iface_hash_size];
    if class.is_interface {
        return Ok(buckets);
    }
    for sup in program.all_supertypes(class)? {
        let cd = program.class_or_err(sup.name())?;
        if !cd.is_interface {
            continue;
        }
        for m in &cd.virtual_methods {
            let hash = runtime::method_sig_hash(&m.name, &m.descriptor());
            let func = match resolve_slot_impl(program, class, &m.name, &m.params, &m.ret)? {
                Some(f) => f,
                // An abstract class may leave interface methods unimplemented
                None => continue,
            };
            let bucket = &mut buckets[(hash as usize) % config.iface_hash_size];
            if !bucket.iter().any(|e| e.hash == hash) {
                bucket.push(IfaceEntry { hash, func });
            }
        }
    }
    Ok(buckets)
}

/// Instanceof slots: all supertypes placed by class hash with linear
/// probing. Overflowing the fixed-size table is fatal; the runtime probes
/// with the same hash and the same wrap-around.
fn instanceof_slots(
    program: &Program,
    class: &ClassDescriptor,
    config: &Config,
) -> Result<Vec<Option<ClassRef>>> {
    let size = config.instanceof_hash_size;
    let mut slots: Vec<Option<ClassRef>> = vec![None; size];
    let supers = program.all_supertypes(class)?;
    if supers.len() > size {
        return Err(Error::TableOverflow {
            class: class.name.name().to_string(),
            entries: supers.len(),
            capacity: size,
        });
    }
    for sup in supers {
        let mut idx = (runtime::class_hash(sup.name()) as usize) % size;
        while slots[idx].is_some() {
            idx = (idx + 1) % size;
        }
        slots[idx] = Some(sup);
    }
    Ok(slots)
}

/// Instance fields of the whole superclass chain, root-first, so the struct
/// layout of a subclass starts with its superclass's layout.
fn chain_fields<'a>(
    program: &'a Program,
    class: &'a ClassDescriptor,
) -> Result<Vec<(&'a str, &'a JType)>> {
    let mut out = Vec::new();
    for cd in program.linearized_chain(class)? {
        for f in &cd.instance_fields {
            out.push((f.name.as_str(), &f.ty));
        }
    }
    Ok(out)
}

/// Emit the header and body units for one class. The class descriptor may be
/// an optimized clone; every other class is resolved through `program`.
pub fn emit_class(
    program: &Program,
    class: &ClassDescriptor,
    config: &Config,
) -> Result<EmittedClass> {
    runtime::check_table_sizes(config)?;
    debug!("emitting class {}", class.name);

    let tables = ClassTables::build(program, class, config)?;
    let deps = class.dependencies();
    let mut dep_tags = String::new();
    for dep in &deps {
        let cd = program.class_or_err(dep.name())?;
        dep_tags.push_str(&format!(
            "/* @dep_class {:08x} {} */\n",
            cd.shape_hash(),
            dep.name()
        ));
    }

    let header = emit_header(program, class, &tables, &deps, &dep_tags)?;
    let body = emit_body(program, class, config, &tables, &dep_tags)?;
    Ok(EmittedClass {
        ident: mangle::class_ident(&class.name),
        header,
        body,
    })
}

fn emit_header(
    program: &Program,
    class: &ClassDescriptor,
    tables: &ClassTables,
    deps: &BTreeSet<ClassRef>,
    dep_tags: &str,
) -> Result<String> {
    let ident = mangle::class_ident(&class.name);
    let mut out = String::new();
    out.push_str(dep_tags);
    for dep in deps {
        out.push_str(&format!("/* @dep_header {} */\n", mangle::class_ident(dep)));
    }
    out.push_str(&format!("#ifndef H_{ident}\n#define H_{ident}\n\n"));
    out.push_str(&format!("#include \"{}\"\n", runtime::RUNTIME_HEADER));
    for dep in deps {
        out.push_str(&format!("#include \"{}.h\"\n", mangle::class_ident(dep)));
    }
    out.push('\n');

    // Instance layout: class pointer, then the chain's fields root-first
    if !class.is_interface {
        out.push_str(&format!(
            "struct {} {{\n    struct rt_class *cls;\n",
            mangle::instance_struct(&class.name)
        ));
        for (name, ty) in chain_fields(program, class)? {
            out.push_str(&format!(
                "    {} {};\n",
                ty.c_name(),
                mangle::field_member(name)
            ));
        }
        out.push_str("};\n\n");
    }

    if !class.static_fields.is_empty() {
        out.push_str(&format!(
            "struct {} {{\n",
            mangle::statics_struct(&class.name)
        ));
        for f in &class.static_fields {
            out.push_str(&format!("    {} {};\n", f.ty.c_name(), f.name));
        }
        out.push_str("};\n");
        out.push_str(&format!(
            "extern struct {0} {0};\n\n",
            mangle::statics_struct(&class.name)
        ));
    }

    if !tables.vtable.is_empty() {
        out.push_str(&format!(
            "struct {} {{\n",
            mangle::vtable_struct(&class.name)
        ));
        for slot in &tables.vtable {
            out.push_str(&format!(
                "    {} (*{})(JEnv *, jref",
                slot.ret.c_name(),
                slot.member
            ));
            for p in &slot.params {
                out.push_str(&format!(", {}", p.c_name()));
            }
            out.push_str(");\n");
        }
        out.push_str("};\n\n");
    }

    out.push_str(&format!(
        "struct {} {{\n    struct rt_class c;\n",
        mangle::class_struct(&class.name)
    ));
    if !tables.vtable.is_empty() {
        out.push_str(&format!(
            "    struct {} vt;\n",
            mangle::vtable_struct(&class.name)
        ));
    }
    out.push_str("};\n");
    out.push_str(&format!(
        "extern struct {} {};\n\n",
        mangle::class_struct(&class.name),
        mangle::class_desc(&class.name)
    ));

    // Prototypes; native methods get one too and link against hand-written
    // definitions in the runtime library
    for m in class.all_methods() {
        if m.flags.is_abstract {
            continue;
        }
        out.push_str(&format!("{};\n", method::signature(&class.name, m)));
    }

    out.push_str(&format!("\n#endif /* H_{ident} */\n"));
    Ok(out)
}

fn emit_body(
    program: &Program,
    class: &ClassDescriptor,
    config: &Config,
    tables: &ClassTables,
    dep_tags: &str,
) -> Result<String> {
    let ident = mangle::class_ident(&class.name);
    let mut out = String::new();
    out.push_str(dep_tags);
    out.push_str(&format!("/* @dep_header {ident} */\n"));
    out.push_str(&format!("#include \"{ident}.h\"\n\n"));

    if !class.static_fields.is_empty() {
        out.push_str(&format!(
            "struct {0} {0};\n\n",
            mangle::statics_struct(&class.name)
        ));
    }

    // Method bodies with their line and trap tables; the analysis results
    // feed the metadata records below
    let mut infos: Vec<Option<MethodInfo>> = Vec::new();
    for m in class.all_methods() {
        if !m.is_concrete() {
            infos.push(None);
            continue;
        }
        let body = m
            .body
            .as_ref()
            .ok_or_else(|| Error::internal(format!("concrete method {} has no body", m.name)))?;
        let (text, info) = method::emit_method(program, &class.name, m, config)?;
        out.push_str(&method::emit_line_table(&class.name, m, &info));
        out.push_str(&method::emit_trap_table(&class.name, m, body, &info));
        out.push_str(&text);
        out.push('\n');
        infos.push(Some(info));
    }

    emit_field_tables(class, &mut out);
    emit_method_records(class, &infos, &mut out);
    emit_iface_tables(class, tables, config, &mut out);
    emit_instanceof_table(class, tables, config, &mut out);
    emit_class_record(program, class, tables, &mut out)?;
    Ok(out)
}

fn emit_field_tables(class: &ClassDescriptor, out: &mut String) {
    if !class.instance_fields.is_empty() {
        out.push_str(&format!(
            "static const struct rt_field fds_{}[] = {{\n",
            mangle::class_ident(&class.name)
        ));
        for f in &class.instance_fields {
            out.push_str(&format!(
                "    {{ \"{}\", \"{}\", offsetof(struct {}, {}) }},\n",
                f.name,
                f.ty.descriptor(),
                mangle::instance_struct(&class.name),
                mangle::field_member(&f.name)
            ));
        }
        out.push_str("};\n");
    }
    if !class.static_fields.is_empty() {
        out.push_str(&format!(
            "static const struct rt_field sfs_{}[] = {{\n",
            mangle::class_ident(&class.name)
        ));
        for f in &class.static_fields {
            out.push_str(&format!(
                "    {{ \"{}\", \"{}\", (size_t)&{}.{} }},\n",
                f.name,
                f.ty.descriptor(),
                mangle::statics_struct(&class.name),
                f.name
            ));
        }
        out.push_str("};\n");
    }
}

fn emit_method_records(class: &ClassDescriptor, infos: &[Option<MethodInfo>], out: &mut String) {
    out.push_str(&format!(
        "static const struct rt_method mds_{}[] = {{\n",
        mangle::class_ident(&class.name)
    ));
    for (m, info) in class.all_methods().zip(infos.iter()) {
        let fnptr = if m.flags.is_abstract {
            "0".to_string()
        } else {
            format!("(void (*)(void)){}", mangle::method_fn_of(&class.name, m))
        };
        let (lines_ptr, n_lines, traps_ptr, n_traps, n_labels, n_regions) = match info {
            Some(i) => (
                if i.lines.is_empty() {
                    "0".to_string()
                } else {
                    mangle::line_table(&class.name, m)
                },
                i.lines.len(),
                if i.trap_spans.is_empty() {
                    "0".to_string()
                } else {
                    mangle::trap_table(&class.name, m)
                },
                i.trap_spans.len(),
                i.label_count as usize,
                i.region_count as usize,
            ),
            None => ("0".to_string(), 0, "0".to_string(), 0, 0, 0),
        };
        out.push_str(&format!(
            "    {{ \"{}\", \"{}\", 0x{:04x}, {}, {}, {}, {}, {}, {}, {} }},\n",
            m.name,
            m.descriptor(),
            m.flags.access_word(),
            fnptr,
            lines_ptr,
            n_lines,
            traps_ptr,
            n_traps,
            n_labels,
            n_regions
        ));
    }
    out.push_str("};\n");
}

fn emit_iface_tables(
    class: &ClassDescriptor,
    tables: &ClassTables,
    config: &Config,
    out: &mut String,
) {
    if !tables.has_iface_entries() {
        return;
    }
    let ident = mangle::class_ident(&class.name);
    for (i, bucket) in tables.buckets.iter().enumerate() {
        if bucket.is_empty() {
            continue;
        }
        out.push_str(&format!(
            "static const struct rt_imethod im_{ident}_{i}[] = {{\n"
        ));
        for e in bucket {
            out.push_str(&format!(
                "    {{ 0x{:08x}U, (void (*)(void)){} }},\n",
                e.hash, e.func
            ));
        }
        out.push_str("};\n");
    }
    out.push_str(&format!(
        "static const struct rt_ibucket it_{ident}[{}] = {{\n",
        config.iface_hash_size
    ));
    for (i, bucket) in tables.buckets.iter().enumerate() {
        if bucket.is_empty() {
            out.push_str("    { 0, 0 },\n");
        } else {
            out.push_str(&format!("    {{ {}, im_{ident}_{i} }},\n", bucket.len()));
        }
    }
    out.push_str("};\n");
    // Quick table: single-entry buckets resolve without walking the bucket
    out.push_str(&format!(
        "static void (*const iq_{ident}[{}])(void) = {{\n",
        config.iface_hash_size
    ));
    for bucket in &tables.buckets {
        if bucket.len() == 1 {
            out.push_str(&format!("    (void (*)(void)){},\n", bucket[0].func));
        } else {
            out.push_str("    0,\n");
        }
    }
    out.push_str("};\n");
}

fn emit_instanceof_table(
    class: &ClassDescriptor,
    tables: &ClassTables,
    config: &Config,
    out: &mut String,
) {
    let ident = mangle::class_ident(&class.name);
    out.push_str(&format!(
        "static const struct rt_class *const iof_{ident}[{}] = {{\n",
        config.instanceof_hash_size
    ));
    for slot in &tables.instanceof {
        match slot {
            Some(c) => out.push_str(&format!("    {},\n", mangle::class_desc_ref(c))),
            None => out.push_str("    0,\n"),
        }
    }
    out.push_str("};\n");
}

fn emit_class_record(
    program: &Program,
    class: &ClassDescriptor,
    tables: &ClassTables,
    out: &mut String,
) -> Result<()> {
    let ident = mangle::class_ident(&class.name);
    let superp = match &class.superclass {
        Some(s) => mangle::class_desc_ref(s),
        None => "0".to_string(),
    };
    let size = if class.is_interface {
        "0".to_string()
    } else {
        format!("sizeof(struct {})", mangle::instance_struct(&class.name))
    };
    let (fds, n_fds) = if class.instance_fields.is_empty() {
        ("0".to_string(), 0)
    } else {
        (format!("fds_{ident}"), class.instance_fields.len())
    };
    let (sfs, n_sfs) = if class.static_fields.is_empty() {
        ("0".to_string(), 0)
    } else {
        (format!("sfs_{ident}"), class.static_fields.len())
    };
    let n_methods = class.all_methods().count();
    let (it, iq) = if tables.has_iface_entries() {
        (format!("it_{ident}"), format!("iq_{ident}"))
    } else {
        ("0".to_string(), "0".to_string())
    };

    out.push_str(&format!(
        "\nstruct {} {} = {{\n",
        mangle::class_struct(&class.name),
        mangle::class_desc(&class.name)
    ));
    out.push_str(&format!(
        "    {{ \"{}\", 0x{:08x}U, {}, {}, {}, {}, {}, {}, {}, mds_{}, {}, {}, iof_{} }},\n",
        class.name.internal_name(),
        class.shape_hash(),
        superp,
        size,
        n_fds,
        fds,
        n_sfs,
        sfs,
        n_methods,
        ident,
        it,
        iq,
        ident
    ));
    if !tables.vtable.is_empty() {
        out.push_str("    {\n");
        for slot in &tables.vtable {
            match resolve_slot_impl(program, class, &slot.name, &slot.params, &slot.ret)? {
                Some(f) => out.push_str(&format!("        {f},\n")),
                None => out.push_str("        0,\n"),
            }
        }
        out.push_str("    },\n");
    }
    out.push_str("};\n");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{FieldDescriptor, MethodDescriptor, MethodFlags};

    fn base_program() -> Program {
        let mut p = Program::new();
        let mut object = ClassDescriptor::new("java.lang.Object");
        object
            .virtual_methods
            .push(MethodDescriptor::new("hashCode", vec![], JType::Int));
        p.add_class(object);
        p
    }

    #[test]
    fn vtable_override_keeps_slot() {
        let mut p = base_program();
        let mut point = ClassDescriptor::new("Point");
        point
            .virtual_methods
            .push(MethodDescriptor::new("hashCode", vec![], JType::Int));
        point
            .virtual_methods
            .push(MethodDescriptor::new("norm", vec![], JType::Int));
        p.add_class(point);
        let slots = vtable_layout(&p, p.class("Point").unwrap()).unwrap();
        // hashCode's slot comes from Object; norm follows it
        assert_eq!(slots.len(), 2);
        assert!(slots[0].member.starts_with("m_hashCode_"));
        assert!(slots[1].member.starts_with("m_norm_"));
    }

    #[test]
    fn instanceof_table_holds_all_supertypes() {
        let mut p = base_program();
        let mut iface = ClassDescriptor::new("java.lang.Runnable");
        iface.is_interface = true;
        iface
            .virtual_methods
            .push(MethodDescriptor::new("run", vec![], JType::Void));
        p.add_class(iface);
        let mut task = ClassDescriptor::new("Task");
        task.interfaces.push(ClassRef::new("java.lang.Runnable"));
        let mut run = MethodDescriptor::new("run", vec![], JType::Void);
        run.flags = MethodFlags {
            is_abstract: true,
            ..MethodFlags::default()
        };
        task.virtual_methods.push(run);
        p.add_class(task);

        let slots = instanceof_slots(&p, p.class("Task").unwrap(), &Config::default()).unwrap();
        let placed: Vec<&str> = slots.iter().flatten().map(|c| c.name()).collect();
        assert_eq!(placed.len(), 3);
        assert!(placed.contains(&"Task"));
        assert!(placed.contains(&"java.lang.Object"));
        assert!(placed.contains(&"java.lang.Runnable"));
    }

    #[test]
    fn instance_struct_flattens_superclass_fields() {
        let mut p = base_program();
        let mut a = ClassDescriptor::new("A");
        a.instance_fields.push(FieldDescriptor::new("x", JType::Int));
        p.add_class(a);
        let mut b = ClassDescriptor::new("B");
        b.superclass = Some(ClassRef::new("A"));
        b.instance_fields.push(FieldDescriptor::new("y", JType::Long));
        p.add_class(b);

        let emitted = emit_class(&p, p.class("B").unwrap(), &Config::default()).unwrap();
        let struct_pos = emitted.header.find("struct in_B {").unwrap();
        let x = emitted.header[struct_pos..].find("jint f_x;").unwrap();
        let y = emitted.header[struct_pos..].find("jlong f_y;").unwrap();
        assert!(x < y);
    }

    #[test]
    fn dep_tags_carry_shape_hashes() {
        let mut p = base_program();
        let mut point = ClassDescriptor::new("Point");
        point
            .instance_fields
            .push(FieldDescriptor::new("x", JType::Int));
        p.add_class(point);
        let emitted = emit_class(&p, p.class("Point").unwrap(), &Config::default()).unwrap();
        let object_hash = p.class("java.lang.Object").unwrap().shape_hash();
        let tag = format!("/* @dep_class {object_hash:08x} java.lang.Object */");
        assert!(emitted.header.starts_with(&tag));
        assert!(emitted.body.contains("#include \"Point.h\""));
        assert!(emitted.body.contains("struct cl_Point cd_Point = {"));
    }
}
