//! The terminal uncached write protocol.
//!
//! Dispatches on the receiver category and produces exactly the outcomes
//! the cached fast paths produce; a site that has collapsed to a single
//! generic node is slower but observationally identical.

use crate::strategy::SiteOptions;
use quill_core::{JsError, JsResult};
use quill_runtime::bridge::foreign_write;
use quill_runtime::object::ordinary_set;
use quill_runtime::{ShapeRegistry, Value};

/// Perform one uncached property write.
pub fn write(
    opts: &SiteOptions,
    receiver: &Value,
    value: &Value,
    registry: &ShapeRegistry,
) -> JsResult<()> {
    match receiver {
        Value::Object(obj) => ordinary_set(obj, &opts.key, value, opts.write_mode(), registry),
        Value::Host(host) => {
            host.write(&opts.key, value)?;
            Ok(())
        }
        Value::Foreign(foreign) => {
            foreign_write(foreign, &opts.key, value, opts.permissive, opts.strict)
        }
        Value::Undefined | Value::Null => Err(JsError::type_error(format!(
            "Cannot set property '{}' of {}",
            opts.key,
            receiver.type_name()
        ))),
        // Primitive receivers: the write never sticks
        Value::Bool(_) | Value::Int(_) | Value::Number(_) | Value::Str(_) => {
            if opts.strict {
                Err(JsError::type_error(format!(
                    "Cannot create property '{}' on {}",
                    opts.key,
                    receiver.type_name()
                )))
            } else {
                Ok(())
            }
        }
    }
}
