//! Bounded local optimizer
//!
//! Four passes over each method body, in a fixed order: synchronized-method
//! lowering first (later passes must see the monitor statements), then
//! null-check canonicalization, devirtualization, and inlining. Every pass
//! works on a class descriptor cloned out of the `Program`, so the shared
//! program stays immutable while a class is optimized. All passes are
//! idempotent; running the pipeline twice reaches the same fixed point.

pub mod devirt;
pub mod inline;
pub mod nullcheck;
pub mod sync;

use log::debug;

use crate::config::Config;
use crate::error::Result;
use crate::ir::{ClassDescriptor, MethodRef, Program};

/// Run the optimizer pipeline over every concrete method of `class`,
/// returning the total number of rewritten sites.
pub fn optimize_class(
    class: &mut ClassDescriptor,
    program: &Program,
    config: &Config,
) -> Result<usize> {
    let class_name = class.name.clone();
    let mut total = 0;
    for m in class.all_methods_mut() {
        let flags = m.flags;
        let caller = MethodRef {
            class: class_name.clone(),
            name: m.name.clone(),
            params: m.params.clone(),
            ret: m.ret.clone(),
        };
        let body = match m.body.as_mut() {
            Some(b) => b,
            None => continue,
        };
        body.freeze_original_len();

        let synced = sync::lower_synchronized(body, &class_name, flags);
        let checks = nullcheck::canonicalize(body);
        let devirted = devirt::devirtualize(body, program);
        let inlined = inline::inline_calls(&caller, body, program, config)?;
        if synced + checks + devirted + inlined > 0 {
            debug!(
                "{}.{}: sync {}, nullcheck {}, devirt {}, inline {}",
                class_name, caller.name, synced, checks, devirted, inlined
            );
        }
        total += synced + checks + devirted + inlined;
    }
    Ok(total)
}
