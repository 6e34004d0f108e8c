//! Class, method and field descriptors plus the program-wide class table
//!
//! A `ClassDescriptor` is built once when a class's generation begins and is
//! read-only thereafter; the optimizer works on a clone taken out of the
//! `Program` so no shared mutable state crosses method boundaries.

use std::collections::{BTreeSet, HashMap};

use super::stmt::Body;
use super::ty::{method_descriptor, ClassRef, JType};
use crate::error::{Error, Result};
use crate::runtime;

/// Field descriptor
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    pub name: String,
    pub ty: JType,
    pub is_final: bool,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, ty: JType) -> Self {
        Self {
            name: name.into(),
            ty,
            is_final: false,
        }
    }
}

/// Method access and dispatch flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MethodFlags {
    pub is_static: bool,
    pub is_final: bool,
    pub is_synchronized: bool,
    pub is_abstract: bool,
    pub is_native: bool,
    pub is_private: bool,
}

impl MethodFlags {
    /// JVM access-flag word for the method metadata record
    pub fn access_word(&self) -> u16 {
        let mut w = 0u16;
        if self.is_static {
            w |= 0x0008;
        }
        if self.is_final {
            w |= 0x0010;
        }
        if self.is_synchronized {
            w |= 0x0020;
        }
        if self.is_native {
            w |= 0x0100;
        }
        if self.is_abstract {
            w |= 0x0400;
        }
        if self.is_private {
            w |= 0x0002;
        }
        w
    }
}

/// Method descriptor: signature, flags, and (when concrete) the body
#[derive(Debug, Clone, PartialEq)]
pub struct MethodDescriptor {
    pub name: String,
    pub params: Vec<JType>,
    pub ret: JType,
    pub flags: MethodFlags,
    pub body: Option<Body>,
}

impl MethodDescriptor {
    pub fn new(name: impl Into<String>, params: Vec<JType>, ret: JType) -> Self {
        Self {
            name: name.into(),
            params,
            ret,
            flags: MethodFlags::default(),
            body: None,
        }
    }

    pub fn descriptor(&self) -> String {
        method_descriptor(&self.params, &self.ret)
    }

    /// Same name and signature?
    pub fn matches(&self, name: &str, params: &[JType], ret: &JType) -> bool {
        self.name == name && self.params == params && &self.ret == ret
    }

    pub fn is_concrete(&self) -> bool {
        !self.flags.is_abstract && !self.flags.is_native && self.body.is_some()
    }
}

/// One class as consumed from the frontend: ordered member lists plus
/// hierarchy links. Virtual methods are the dynamically dispatched ones;
/// constructors and static methods dispatch directly.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassDescriptor {
    pub name: ClassRef,
    pub superclass: Option<ClassRef>,
    pub interfaces: Vec<ClassRef>,
    pub is_final: bool,
    pub is_interface: bool,
    pub source_file: Option<String>,
    pub static_fields: Vec<FieldDescriptor>,
    pub instance_fields: Vec<FieldDescriptor>,
    pub static_methods: Vec<MethodDescriptor>,
    pub constructors: Vec<MethodDescriptor>,
    pub virtual_methods: Vec<MethodDescriptor>,
}

impl ClassDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        let name = ClassRef::new(name);
        let superclass = if name.name() == "java.lang.Object" {
            None
        } else {
            Some(ClassRef::new("java.lang.Object"))
        };
        Self {
            name,
            superclass,
            interfaces: Vec::new(),
            is_final: false,
            is_interface: false,
            source_file: None,
            static_fields: Vec::new(),
            instance_fields: Vec::new(),
            static_methods: Vec::new(),
            constructors: Vec::new(),
            virtual_methods: Vec::new(),
        }
    }

    /// All methods in declaration order: statics, constructors, virtuals
    pub fn all_methods(&self) -> impl Iterator<Item = &MethodDescriptor> {
        self.static_methods
            .iter()
            .chain(self.constructors.iter())
            .chain(self.virtual_methods.iter())
    }

    pub fn all_methods_mut(&mut self) -> impl Iterator<Item = &mut MethodDescriptor> {
        self.static_methods
            .iter_mut()
            .chain(self.constructors.iter_mut())
            .chain(self.virtual_methods.iter_mut())
    }

    /// Find a virtual method declared directly on this class
    pub fn find_virtual(&self, name: &str, params: &[JType], ret: &JType) -> Option<&MethodDescriptor> {
        self.virtual_methods.iter().find(|m| m.matches(name, params, ret))
    }

    /// Position of an instance field declared directly on this class
    pub fn instance_field_index(&self, name: &str) -> Option<usize> {
        self.instance_fields.iter().position(|f| f.name == name)
    }

    /// Hash of the externally visible shape of this class: name, hierarchy
    /// links, and member signatures. The incremental-build driver compares
    /// these hashes to detect staleness by content rather than timestamp.
    pub fn shape_hash(&self) -> u32 {
        let mut key = String::new();
        key.push_str(self.name.name());
        key.push(';');
        if let Some(s) = &self.superclass {
            key.push_str(s.name());
        }
        key.push(';');
        for i in &self.interfaces {
            key.push_str(i.name());
            key.push(',');
        }
        for f in self.static_fields.iter().chain(self.instance_fields.iter()) {
            key.push_str(&f.name);
            key.push_str(&f.ty.descriptor());
            key.push(';');
        }
        for m in self.all_methods() {
            key.push_str(&m.name);
            key.push_str(&m.descriptor());
            key.push(';');
        }
        runtime::fnv1a(key.as_bytes())
    }

    /// The full dependency set: every class referenced by a field type,
    /// method signature, thrown/caught type, local type, or accessed member
    pub fn dependencies(&self) -> BTreeSet<ClassRef> {
        let mut out = BTreeSet::new();
        if let Some(s) = &self.superclass {
            out.insert(s.clone());
        }
        for i in &self.interfaces {
            out.insert(i.clone());
        }
        for f in self.static_fields.iter().chain(self.instance_fields.iter()) {
            super::value::collect_type(&f.ty, &mut out);
        }
        for m in self.all_methods() {
            for p in &m.params {
                super::value::collect_type(p, &mut out);
            }
            super::value::collect_type(&m.ret, &mut out);
            if let Some(body) = &m.body {
                body.collect_classes(&mut out);
            }
        }
        out.remove(&self.name);
        out
    }
}

/// All classes known to one generation run
#[derive(Debug, Clone, Default)]
pub struct Program {
    classes: HashMap<String, ClassDescriptor>,
}

impl Program {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_class(&mut self, class: ClassDescriptor) {
        self.classes.insert(class.name.name().to_string(), class);
    }

    pub fn class(&self, name: &str) -> Option<&ClassDescriptor> {
        self.classes.get(name)
    }

    pub fn class_or_err(&self, name: &str) -> Result<&ClassDescriptor> {
        self.class(name).ok_or_else(|| Error::unknown_class(name))
    }

    /// Class names in deterministic order
    pub fn class_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.classes.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Superclass chain from the root (java.lang.Object) down to `class`
    /// itself, both inclusive. Vtable slots are laid out in this order.
    pub fn linearized_chain<'a>(
        &'a self,
        class: &'a ClassDescriptor,
    ) -> Result<Vec<&'a ClassDescriptor>> {
        let mut chain = vec![class];
        let mut cur = class;
        while let Some(sup) = &cur.superclass {
            let sc = self.class_or_err(sup.name())?;
            chain.push(sc);
            // A cycle here is a frontend bug; the chain cannot be longer
            // than the number of classes known.
            if chain.len() > self.classes.len() + 1 {
                return Err(Error::internal(format!(
                    "superclass cycle through {}",
                    class.name
                )));
            }
            cur = sc;
        }
        chain.reverse();
        Ok(chain)
    }

    /// Resolve a virtual method by signature starting at `class`, walking up
    /// the superclass chain. Fails if no class along the chain declares it.
    pub fn resolve_virtual(
        &self,
        class: &ClassRef,
        name: &str,
        params: &[JType],
        ret: &JType,
    ) -> Result<(&ClassDescriptor, &MethodDescriptor)> {
        let mut cur = self.class_or_err(class.name())?;
        loop {
            if let Some(m) = cur.find_virtual(name, params, ret) {
                return Ok((cur, m));
            }
            match &cur.superclass {
                Some(sup) => cur = self.class_or_err(sup.name())?,
                None => {
                    return Err(Error::UnknownMethod {
                        class: class.name().to_string(),
                        name: name.to_string(),
                        descriptor: method_descriptor(params, ret),
                    })
                }
            }
        }
    }

    /// Resolve any directly-dispatched method (static, constructor, private
    /// or devirtualized) by signature, walking up the chain for inherited
    /// statics.
    pub fn resolve_direct(
        &self,
        class: &ClassRef,
        name: &str,
        params: &[JType],
        ret: &JType,
    ) -> Result<(&ClassDescriptor, &MethodDescriptor)> {
        let mut cur = self.class_or_err(class.name())?;
        loop {
            if let Some(m) = cur.all_methods().find(|m| m.matches(name, params, ret)) {
                return Ok((cur, m));
            }
            match &cur.superclass {
                Some(sup) => cur = self.class_or_err(sup.name())?,
                None => {
                    return Err(Error::UnknownMethod {
                        class: class.name().to_string(),
                        name: name.to_string(),
                        descriptor: method_descriptor(params, ret),
                    })
                }
            }
        }
    }

    /// Can `class` have no subtypes? True for final classes (declared or
    /// well-known). Used to degrade casts and instanceof to identity checks.
    pub fn has_no_subtypes(&self, class: &ClassRef) -> bool {
        if runtime::is_well_known_final(class.name()) {
            return true;
        }
        self.class(class.name()).map(|c| c.is_final).unwrap_or(false)
    }

    /// All supertypes of `class` (superclass chain plus all transitively
    /// implemented interfaces), including `class` itself. Feeds the
    /// instanceof hash table.
    pub fn all_supertypes(&self, class: &ClassDescriptor) -> Result<Vec<ClassRef>> {
        let mut seen = BTreeSet::new();
        let mut stack = vec![class.name.clone()];
        while let Some(name) = stack.pop() {
            if !seen.insert(name.clone()) {
                continue;
            }
            let cd = self.class_or_err(name.name())?;
            if let Some(s) = &cd.superclass {
                stack.push(s.clone());
            }
            for i in &cd.interfaces {
                stack.push(i.clone());
            }
        }
        Ok(seen.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_program() -> Program {
        let mut p = Program::new();
        let mut object = ClassDescriptor::new("java.lang.Object");
        object
            .virtual_methods
            .push(MethodDescriptor::new("hashCode", vec![], JType::Int));
        p.add_class(object);
        let mut point = ClassDescriptor::new("Point");
        point
            .virtual_methods
            .push(MethodDescriptor::new("norm", vec![], JType::Int));
        p.add_class(point);
        p
    }

    #[test]
    fn chain_is_root_first() {
        let p = sample_program();
        let point = p.class("Point").unwrap();
        let chain = p.linearized_chain(point).unwrap();
        let names: Vec<&str> = chain.iter().map(|c| c.name.name()).collect();
        assert_eq!(names, ["java.lang.Object", "Point"]);
    }

    #[test]
    fn virtual_resolution_walks_up() {
        let p = sample_program();
        let (decl, m) = p
            .resolve_virtual(&ClassRef::new("Point"), "hashCode", &[], &JType::Int)
            .unwrap();
        assert_eq!(decl.name.name(), "java.lang.Object");
        assert_eq!(m.name, "hashCode");
    }

    #[test]
    fn unknown_method_is_fatal() {
        let p = sample_program();
        assert!(p
            .resolve_virtual(&ClassRef::new("Point"), "nope", &[], &JType::Void)
            .is_err());
    }
}
