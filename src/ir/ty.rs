//! Static types of IR values

use std::fmt;

/// Reference to a class by its dotted binary name, e.g. `java.lang.Object`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassRef {
    name: String,
}

impl ClassRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Slash-separated form used in descriptors and emitted metadata strings
    pub fn internal_name(&self) -> String {
        self.name.replace('.', "/")
    }
}

impl fmt::Display for ClassRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Static type of an IR value
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum JType {
    Boolean,
    Byte,
    Char,
    Short,
    Int,
    Long,
    Float,
    Double,
    Void,
    Ref(ClassRef),
    Array(Box<JType>),
}

impl JType {
    pub fn object() -> Self {
        JType::Ref(ClassRef::new("java.lang.Object"))
    }

    pub fn is_reference(&self) -> bool {
        matches!(self, JType::Ref(_) | JType::Array(_))
    }

    pub fn is_wide(&self) -> bool {
        matches!(self, JType::Long | JType::Double)
    }

    pub fn is_float_kind(&self) -> bool {
        matches!(self, JType::Float | JType::Double)
    }

    pub fn is_integral(&self) -> bool {
        matches!(
            self,
            JType::Boolean | JType::Byte | JType::Char | JType::Short | JType::Int | JType::Long
        )
    }

    /// JVM descriptor string, e.g. `I`, `Ljava/lang/Object;`, `[[D`
    pub fn descriptor(&self) -> String {
        match self {
            JType::Boolean => "Z".to_string(),
            JType::Byte => "B".to_string(),
            JType::Char => "C".to_string(),
            JType::Short => "S".to_string(),
            JType::Int => "I".to_string(),
            JType::Long => "J".to_string(),
            JType::Float => "F".to_string(),
            JType::Double => "D".to_string(),
            JType::Void => "V".to_string(),
            JType::Ref(c) => format!("L{};", c.internal_name()),
            JType::Array(e) => format!("[{}", e.descriptor()),
        }
    }

    /// C type name used for locals, parameters and return values.
    /// All references are carried as the uniform `jref` object pointer.
    pub fn c_name(&self) -> &'static str {
        match self {
            JType::Boolean => "jboolean",
            JType::Byte => "jbyte",
            JType::Char => "jchar",
            JType::Short => "jshort",
            JType::Int => "jint",
            JType::Long => "jlong",
            JType::Float => "jfloat",
            JType::Double => "jdouble",
            JType::Void => "void",
            JType::Ref(_) | JType::Array(_) => "jref",
        }
    }

    /// Array-struct name for unchecked element access, e.g. `ar_jint`
    pub fn array_struct(&self) -> &'static str {
        match self {
            JType::Boolean => "ar_jboolean",
            JType::Byte => "ar_jbyte",
            JType::Char => "ar_jchar",
            JType::Short => "ar_jshort",
            JType::Int => "ar_jint",
            JType::Long => "ar_jlong",
            JType::Float => "ar_jfloat",
            JType::Double => "ar_jdouble",
            JType::Ref(_) | JType::Array(_) => "ar_jref",
            JType::Void => "ar_jref", // unreachable for well-formed IR
        }
    }

    /// log2 of the element size in bytes, as passed to the checked element
    /// accessor. References are 8 bytes on every supported target.
    pub fn log2_size(&self) -> u32 {
        match self {
            JType::Boolean | JType::Byte => 0,
            JType::Char | JType::Short => 1,
            JType::Int | JType::Float => 2,
            JType::Long | JType::Double | JType::Ref(_) | JType::Array(_) => 3,
            JType::Void => 0, // unreachable for well-formed IR
        }
    }

    /// Element kind constant for primitive array allocation
    pub fn elem_kind(&self) -> Option<&'static str> {
        match self {
            JType::Boolean => Some("RT_T_BOOLEAN"),
            JType::Byte => Some("RT_T_BYTE"),
            JType::Char => Some("RT_T_CHAR"),
            JType::Short => Some("RT_T_SHORT"),
            JType::Int => Some("RT_T_INT"),
            JType::Long => Some("RT_T_LONG"),
            JType::Float => Some("RT_T_FLOAT"),
            JType::Double => Some("RT_T_DOUBLE"),
            _ => None,
        }
    }
}

/// Method descriptor string from parameter and return types, e.g. `(IJ)V`
pub fn method_descriptor(params: &[JType], ret: &JType) -> String {
    let mut d = String::from("(");
    for p in params {
        d.push_str(&p.descriptor());
    }
    d.push(')');
    d.push_str(&ret.descriptor());
    d
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptors_round_expected_forms() {
        assert_eq!(JType::Int.descriptor(), "I");
        assert_eq!(JType::object().descriptor(), "Ljava/lang/Object;");
        assert_eq!(
            JType::Array(Box::new(JType::Array(Box::new(JType::Double)))).descriptor(),
            "[[D"
        );
        assert_eq!(
            method_descriptor(&[JType::Int, JType::Long], &JType::Void),
            "(IJ)V"
        );
    }
}
