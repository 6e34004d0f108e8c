//! Java-to-C ahead-of-time code generator (jatoc)
//!
//! Turns parsed Java method IR into compilable C translation units with full
//! JVM semantics: dynamic dispatch, monitors, checked casts, exception traps
//! and bit-exact float encoding.
//!
//! ## Architecture
//!
//! - **ir**: Typed statement/value IR as produced by the frontend
//! - **opt**: Bounded local optimizer (sync lowering, null-check
//!   canonicalization, devirtualization, inlining)
//! - **cgen**: C emission (value/statement translators, method analyzer,
//!   class emitter with dispatch tables)
//! - **runtime**: Runtime-library ABI surface and shared hash functions
//! - **bin**: Command-line interface
//!
//! ## Generation Flow
//!
//! ```text
//! IR Program → clone class → optimizer pipeline → method analysis →
//!     C emission → header unit + body unit
//! ```

pub mod cgen;
pub mod config;
pub mod error;
pub mod ir;
pub mod opt;
pub mod runtime;

pub use cgen::EmittedClass;
pub use config::Config;
pub use error::{Error, Result};
pub use ir::{ClassDescriptor, Program};

use log::info;

/// Generate the C units for one class.
///
/// The class is cloned out of the program before the optimizer touches it,
/// so `program` stays valid as the resolution context for every other class
/// generated from it.
pub fn generate(program: &Program, class_name: &str, config: &Config) -> Result<EmittedClass> {
    let mut class = program.class_or_err(class_name)?.clone();
    if config.optimize {
        let rewrites = opt::optimize_class(&mut class, program, config)?;
        if rewrites > 0 {
            info!("{class_name}: {rewrites} optimizer rewrites");
        }
    }
    cgen::emit_class(program, &class, config)
}

/// Generate C units for every class in the program, in name order
pub fn generate_all(program: &Program, config: &Config) -> Result<Vec<EmittedClass>> {
    let names: Vec<String> = program
        .class_names()
        .into_iter()
        .map(|s| s.to_string())
        .collect();
    info!("generating {} classes", names.len());
    names
        .iter()
        .map(|name| generate(program, name, config))
        .collect()
}
