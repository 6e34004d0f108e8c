//! Runtime support ABI surface
//!
//! Emitted code calls into a companion runtime library through a fixed set of
//! entry points; this module is the single place where their names, the shared
//! hash functions, and the fixed table-size constants live. The table sizes
//! are compile-time constants shared with the runtime: generation fails fast
//! if a `Config` disagrees with them (see [`check_table_sizes`]).

use once_cell::sync::Lazy;
use std::collections::HashSet;

use crate::config::Config;
use crate::error::{Error, Result};

/// Interface-method hash table size, shared with the runtime library
pub const IFACE_HASH_SIZE: usize = 32;

/// Instanceof hash table size, shared with the runtime library
pub const INSTANCEOF_HASH_SIZE: usize = 16;

/// Header included by every emitted unit
pub const RUNTIME_HEADER: &str = "jatoc_rt.h";

/// Entry points of the runtime support ABI, as called by emitted code.
/// The environment handle is the first argument to every call.
pub mod abi {
    pub const NEW: &str = "rt_new";
    pub const NEW_ARRAY: &str = "rt_newarray";
    pub const NEW_REF_ARRAY: &str = "rt_anewarray";
    pub const NEW_MULTI_ARRAY: &str = "rt_multiarray";
    pub const LOCAL_NEW: &str = "rt_localnew";
    pub const LOCAL_ARRAY: &str = "rt_localarray";
    pub const FIELD: &str = "rt_field";
    pub const ELEM: &str = "rt_elem";
    pub const LENGTH: &str = "rt_length";
    pub const CHECK_NULL: &str = "rt_check_null";
    pub const CAST: &str = "rt_cast";
    pub const CAST_EXACT: &str = "rt_cast_exact";
    pub const CAST_ARRAY: &str = "rt_cast_array";
    pub const INSTANCEOF: &str = "rt_instanceof";
    pub const ILOOKUP: &str = "rt_ilookup";
    pub const MONITOR_ENTER: &str = "rt_monitor_enter";
    pub const MONITOR_EXIT: &str = "rt_monitor_exit";
    pub const THROW: &str = "rt_throw";
    pub const TRAP_ENTER: &str = "rt_trap_enter";
    pub const TRAP_LEAVE: &str = "rt_trap_leave";
    pub const POLL: &str = "rt_poll";
    pub const ACTIVE_USE: &str = "rt_active_use";
    pub const STRING: &str = "rt_string";
    pub const CLASS_OBJ: &str = "rt_class_obj";
    pub const FLOAT_BITS: &str = "jfloat_bits";
    pub const DOUBLE_BITS: &str = "jdouble_bits";
    pub const F2I: &str = "rt_f2i";
    pub const F2L: &str = "rt_f2l";
    pub const D2I: &str = "rt_d2i";
    pub const D2L: &str = "rt_d2l";
    pub const IDIV: &str = "rt_idiv";
    pub const IREM: &str = "rt_irem";
    pub const LDIV: &str = "rt_ldiv";
    pub const LREM: &str = "rt_lrem";
    pub const FREM: &str = "rt_frem";
    pub const DREM: &str = "rt_drem";
    pub const LCMP: &str = "rt_lcmp";
    pub const FCMPL: &str = "rt_fcmpl";
    pub const FCMPG: &str = "rt_fcmpg";
    pub const DCMPL: &str = "rt_dcmpl";
    pub const DCMPG: &str = "rt_dcmpg";
}

/// Verify the configured table sizes against the runtime's constants
pub fn check_table_sizes(config: &Config) -> Result<()> {
    if config.iface_hash_size != IFACE_HASH_SIZE {
        return Err(Error::TableSize {
            table: "interface-method hash",
            configured: config.iface_hash_size,
            expected: IFACE_HASH_SIZE,
        });
    }
    if config.instanceof_hash_size != INSTANCEOF_HASH_SIZE {
        return Err(Error::TableSize {
            table: "instanceof hash",
            configured: config.instanceof_hash_size,
            expected: INSTANCEOF_HASH_SIZE,
        });
    }
    Ok(())
}

/// FNV-1a over a byte string, 32-bit. Shared with the runtime library, which
/// uses the same function to probe the emitted tables.
pub fn fnv1a(bytes: &[u8]) -> u32 {
    let mut h: u32 = 0x811c_9dc5;
    for &b in bytes {
        h ^= b as u32;
        h = h.wrapping_mul(0x0100_0193);
    }
    h
}

/// Signature hash for interface-method dispatch: hash of `name(descriptor)`.
/// The concrete implementing class is unknown at emission time, so interface
/// call sites carry this hash instead of a fixed descriptor.
pub fn method_sig_hash(name: &str, descriptor: &str) -> u32 {
    let mut key = String::with_capacity(name.len() + descriptor.len());
    key.push_str(name);
    key.push_str(descriptor);
    fnv1a(key.as_bytes())
}

/// Hash used to place a class into instanceof tables
pub fn class_hash(name: &str) -> u32 {
    fnv1a(name.as_bytes())
}

/// java.lang classes that are final in every conforming library. Devirtualizer
/// and cast lowering may treat these as subtype-free even when the program
/// under compilation carries no descriptor for them.
static WELL_KNOWN_FINAL: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "java.lang.String",
        "java.lang.Integer",
        "java.lang.Long",
        "java.lang.Float",
        "java.lang.Double",
        "java.lang.Boolean",
        "java.lang.Character",
        "java.lang.Short",
        "java.lang.Byte",
        "java.lang.Void",
        "java.lang.Math",
        "java.lang.StackTraceElement",
    ]
    .into_iter()
    .collect()
});

/// Is `name` a class known to be final regardless of loaded descriptors?
pub fn is_well_known_final(name: &str) -> bool {
    WELL_KNOWN_FINAL.contains(name)
}
