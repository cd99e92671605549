//! Bridges to user code and external object systems.
//!
//! Callables, property proxies, foreign objects (interop boundary), and
//! host-provided map-like objects all plug in through the traits here.
//! None of these are ever invoked while a cache or object lock is held.

use crate::object::ObjectRef;
use crate::value::Value;
use parking_lot::RwLock;
use quill_core::{ForeignError, HostError, JsError, JsResult, PropertyKey};
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::Arc;

/// Something invocable from the runtime: setters, getters, methods.
pub trait Callable: Send + Sync {
    /// Invoke with a receiver and arguments.
    fn call(&self, this: &Value, args: &[Value]) -> JsResult<Value>;

    /// Diagnostic name.
    fn name(&self) -> &str {
        "anonymous"
    }
}

/// A callable backed by a native Rust closure.
pub struct NativeFunction {
    name: String,
    func: Box<dyn Fn(&Value, &[Value]) -> JsResult<Value> + Send + Sync>,
}

impl NativeFunction {
    /// Wrap a closure as a callable.
    pub fn new(
        name: impl Into<String>,
        func: impl Fn(&Value, &[Value]) -> JsResult<Value> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            func: Box::new(func),
        }
    }
}

impl Callable for NativeFunction {
    fn call(&self, this: &Value, args: &[Value]) -> JsResult<Value> {
        (self.func)(this, args)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NativeFunction({})", self.name)
    }
}

/// Custom set handler for a single property.
pub trait PropertyProxy: Send + Sync {
    /// Handle a write. Returning `Ok(false)` refuses the write, which is a
    /// silent no-op in sloppy mode and a TypeError in strict mode.
    fn set(&self, receiver: &ObjectRef, key: &PropertyKey, value: &Value) -> JsResult<bool>;
}

/// An object behind the interop boundary.
pub trait ForeignObject: Send + Sync {
    /// Whether the foreign value represents null.
    fn is_null(&self) -> bool {
        false
    }

    /// Whether a member with the given name exists and is invocable.
    fn has_member(&self, name: &str) -> bool;

    /// Write a member.
    fn write_member(&self, name: &str, value: &Value) -> Result<(), ForeignError>;

    /// Invoke a member.
    fn invoke_member(&self, name: &str, args: &[Value]) -> Result<Value, ForeignError>;
}

/// A host-provided map-like object.
pub trait HostObject: Send + Sync {
    /// Write an entry.
    fn write(&self, key: &PropertyKey, value: &Value) -> Result<(), HostError>;

    /// Read an entry.
    fn read(&self, key: &PropertyKey) -> Option<Value>;
}

/// Reference host object backed by a hash map.
pub struct MapHost {
    entries: RwLock<FxHashMap<PropertyKey, Value>>,
    read_only: bool,
}

impl MapHost {
    /// Create a writable map host.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(FxHashMap::default()),
            read_only: false,
        }
    }

    /// Create a map host that rejects all writes.
    #[must_use]
    pub fn read_only() -> Self {
        Self {
            entries: RwLock::new(FxHashMap::default()),
            read_only: true,
        }
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the map is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl Default for MapHost {
    fn default() -> Self {
        Self::new()
    }
}

impl HostObject for MapHost {
    fn write(&self, key: &PropertyKey, value: &Value) -> Result<(), HostError> {
        if self.read_only {
            return Err(HostError::rejected("map is read-only"));
        }
        self.entries.write().insert(key.clone(), value.clone());
        Ok(())
    }

    fn read(&self, key: &PropertyKey) -> Option<Value> {
        self.entries.read().get(key).cloned()
    }
}

/// Name of the conventional setter method for a member, `set` followed by
/// the capitalized member name.
#[must_use]
pub fn foreign_setter_name(member: &str) -> String {
    let mut out = String::with_capacity(member.len() + 3);
    out.push_str("set");
    let mut chars = member.chars();
    if let Some(first) = chars.next() {
        out.extend(first.to_uppercase());
        out.push_str(chars.as_str());
    }
    out
}

/// The full foreign write protocol.
///
/// Permissive mode tolerates missing members by falling back to a
/// conventional setter method and swallows bridge errors, matching lenient
/// interop semantics. Non-permissive mode surfaces every bridge error.
pub fn foreign_write(
    foreign: &Arc<dyn ForeignObject>,
    key: &PropertyKey,
    value: &Value,
    permissive: bool,
    strict: bool,
) -> JsResult<()> {
    if foreign.is_null() {
        return Err(JsError::type_error(format!(
            "Cannot set property '{key}' of null"
        )));
    }
    let Some(name) = key.as_str() else {
        // Symbol keys do not cross the interop boundary
        return if strict {
            Err(JsError::type_error(format!(
                "Cannot set {key} on a foreign object"
            )))
        } else {
            Ok(())
        };
    };
    match foreign.write_member(name, value) {
        Ok(()) => Ok(()),
        Err(ForeignError::UnknownIdentifier { .. }) if permissive => {
            let setter = foreign_setter_name(name);
            if foreign.has_member(&setter) {
                // Fallback errors are deliberately dropped in permissive mode
                let _ = foreign.invoke_member(&setter, std::slice::from_ref(value));
            }
            Ok(())
        }
        Err(_) if permissive => Ok(()),
        Err(err) => Err(err.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn key(name: &str) -> PropertyKey {
        PropertyKey::string(name)
    }

    /// Foreign stub with a fixed member set and an invocation log.
    struct StubForeign {
        members: Vec<&'static str>,
        null: bool,
        writes: Mutex<Vec<(String, Value)>>,
        invokes: Mutex<Vec<String>>,
    }

    impl StubForeign {
        fn new(members: &[&'static str]) -> Arc<Self> {
            Arc::new(Self {
                members: members.to_vec(),
                null: false,
                writes: Mutex::new(Vec::new()),
                invokes: Mutex::new(Vec::new()),
            })
        }

        fn null() -> Arc<Self> {
            Arc::new(Self {
                members: Vec::new(),
                null: true,
                writes: Mutex::new(Vec::new()),
                invokes: Mutex::new(Vec::new()),
            })
        }
    }

    impl ForeignObject for StubForeign {
        fn is_null(&self) -> bool {
            self.null
        }

        fn has_member(&self, name: &str) -> bool {
            self.members.contains(&name)
        }

        fn write_member(&self, name: &str, value: &Value) -> Result<(), ForeignError> {
            if !self.has_member(name) {
                return Err(ForeignError::unknown_identifier(name));
            }
            self.writes.lock().push((name.to_string(), value.clone()));
            Ok(())
        }

        fn invoke_member(&self, name: &str, _args: &[Value]) -> Result<Value, ForeignError> {
            if !self.has_member(name) {
                return Err(ForeignError::unknown_identifier(name));
            }
            self.invokes.lock().push(name.to_string());
            Ok(Value::Undefined)
        }
    }

    #[test]
    fn test_native_function_invocation() {
        let double = NativeFunction::new("double", |_, args| {
            Ok(Value::Int(args[0].as_int().unwrap_or(0) * 2))
        });
        assert_eq!(double.name(), "double");
        assert_eq!(
            double.call(&Value::Undefined, &[Value::Int(21)]).unwrap(),
            Value::Int(42)
        );
    }

    #[test]
    fn test_map_host_round_trip() {
        let host = MapHost::new();
        assert!(host.is_empty());

        host.write(&key("a"), &Value::Int(1)).unwrap();
        assert_eq!(host.read(&key("a")), Some(Value::Int(1)));
        assert_eq!(host.read(&key("b")), None);
        assert_eq!(host.len(), 1);
    }

    #[test]
    fn test_read_only_map_host_rejects() {
        let host = MapHost::read_only();
        let err = host.write(&key("a"), &Value::Int(1)).unwrap_err();
        assert!(matches!(err, HostError::Rejected { .. }));
    }

    #[test]
    fn test_foreign_setter_name() {
        assert_eq!(foreign_setter_name("width"), "setWidth");
        assert_eq!(foreign_setter_name("x"), "setX");
        assert_eq!(foreign_setter_name(""), "set");
    }

    #[test]
    fn test_foreign_write_direct_member() {
        let stub = StubForeign::new(&["width"]);
        let foreign: Arc<dyn ForeignObject> = stub.clone();

        foreign_write(&foreign, &key("width"), &Value::Int(3), false, true).unwrap();
        assert_eq!(stub.writes.lock().len(), 1);
    }

    #[test]
    fn test_foreign_write_unknown_member_errors() {
        let stub = StubForeign::new(&[]);
        let foreign: Arc<dyn ForeignObject> = stub;

        let err = foreign_write(&foreign, &key("width"), &Value::Int(3), false, true).unwrap_err();
        assert_eq!(err.exception_kind(), "ForeignError");
    }

    #[test]
    fn test_foreign_write_permissive_setter_fallback() {
        let stub = StubForeign::new(&["setWidth"]);
        let foreign: Arc<dyn ForeignObject> = stub.clone();

        foreign_write(&foreign, &key("width"), &Value::Int(3), true, true).unwrap();
        assert_eq!(stub.invokes.lock().as_slice(), ["setWidth"]);
    }

    #[test]
    fn test_foreign_write_permissive_swallows_missing() {
        let stub = StubForeign::new(&[]);
        let foreign: Arc<dyn ForeignObject> = stub.clone();

        foreign_write(&foreign, &key("width"), &Value::Int(3), true, true).unwrap();
        assert!(stub.invokes.lock().is_empty());
        assert!(stub.writes.lock().is_empty());
    }

    #[test]
    fn test_foreign_write_null_receiver() {
        let foreign: Arc<dyn ForeignObject> = StubForeign::null();
        let err = foreign_write(&foreign, &key("x"), &Value::Int(1), true, false).unwrap_err();
        assert_eq!(err.exception_kind(), "TypeError");
    }

    #[test]
    fn test_foreign_write_symbol_key() {
        use quill_core::JsSymbol;

        let foreign: Arc<dyn ForeignObject> = StubForeign::new(&["x"]);
        let sym = PropertyKey::from(JsSymbol::new(Some("tag")));

        foreign_write(&foreign, &sym, &Value::Int(1), false, false).unwrap();
        let err = foreign_write(&foreign, &sym, &Value::Int(1), false, true).unwrap_err();
        assert_eq!(err.exception_kind(), "TypeError");
    }
}
