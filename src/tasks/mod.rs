//! `taskq` 바이너리가 등록하는 내장 callable

pub mod builtin;

use crate::registry::Registry;

pub fn builtin_registry() -> Registry {
    let mut registry = Registry::new();
    registry
        .register("builtin.echo", builtin::echo)
        .register("builtin.sleep", builtin::sleep)
        .register_sequence("builtin.count", builtin::count)
        .register("builtin.fail", builtin::fail)
        .register("builtin.exit", builtin::exit)
        .register("builtin.log", builtin::log);
    registry
}
