//! End-to-end tests exercising whole cache sites against the runtime.

use crate::guard::Guard;
use crate::site::{CacheSite, SiteState, MEGAMORPHIC_THRESHOLD};
use crate::strategy::SiteOptions;
use quill_core::PropertyKey;
use quill_runtime::object::{ordinary_set, WriteMode};
use quill_runtime::{
    AccessorPair, HostObject, JsObject, MapHost, NativeFunction, ObjectRef, PropertyFlags,
    ShapeRegistry, Value,
};
use std::sync::Arc;

fn key(name: &str) -> PropertyKey {
    PropertyKey::string(name)
}

fn assignment_site(registry: &Arc<ShapeRegistry>, name: &str) -> CacheSite {
    CacheSite::new(SiteOptions::assignment(key(name)), Arc::clone(registry))
}

/// Fresh object whose shape differs from every other call with a distinct
/// tag.
fn tagged_object(registry: &Arc<ShapeRegistry>, tag: &str) -> ObjectRef {
    let obj = JsObject::new(registry.root());
    ordinary_set(
        &obj,
        &key(tag),
        &Value::Int(0),
        WriteMode::assignment(),
        registry,
    )
    .unwrap();
    obj
}

// ============================================================================
// Fast/slow equivalence
// ============================================================================

#[test]
fn test_cached_and_uncached_writes_agree() {
    let registry = Arc::new(ShapeRegistry::new());
    let site_x = assignment_site(&registry, "x");
    let site_y = assignment_site(&registry, "y");

    let cached = JsObject::new(registry.root());
    let uncached = JsObject::new(registry.root());

    let script: &[(&CacheSite, Value)] = &[
        (&site_x, Value::Int(1)),
        (&site_y, Value::Bool(true)),
        (&site_x, Value::Int(2)),
        (&site_x, Value::string("wide")),
        (&site_y, Value::Bool(false)),
    ];
    for (site, value) in script {
        site.write(&Value::Object(cached.clone()), value).unwrap();
        ordinary_set(
            &uncached,
            &site.options().key,
            value,
            WriteMode::assignment(),
            &registry,
        )
        .unwrap();
    }

    assert_eq!(cached.shape_id(), uncached.shape_id());
    assert_eq!(cached.get(&key("x")), Some(Value::string("wide")));
    assert_eq!(cached.get(&key("x")), uncached.get(&key("x")));
    assert_eq!(cached.get(&key("y")), uncached.get(&key("y")));
}

#[test]
fn test_error_outcomes_agree_with_generic_path() {
    let registry = Arc::new(ShapeRegistry::new());
    let strict =
        CacheSite::new(SiteOptions::strict_assignment(key("x")), Arc::clone(&registry));

    // Cached rejection (second write hits the cached node)
    for _ in 0..2 {
        let err = strict
            .write(&Value::Undefined, &Value::Int(1))
            .unwrap_err();
        assert_eq!(err.exception_kind(), "TypeError");
    }

    let generic = crate::generic::write(
        strict.options(),
        &Value::Undefined,
        &Value::Int(1),
        &registry,
    )
    .unwrap_err();
    assert_eq!(generic.exception_kind(), "TypeError");
}

// ============================================================================
// The worked example: int write, widening write, convergence
// ============================================================================

#[test]
fn test_slot_generalization_preserves_shape_identity() {
    let registry = Arc::new(ShapeRegistry::new());
    let site = assignment_site(&registry, "x");

    let o1 = JsObject::new(registry.root());
    site.write(&Value::Object(o1.clone()), &Value::Int(5)).unwrap();
    let narrow_shape = o1.shape_id();

    site.write(&Value::Object(o1.clone()), &Value::string("s"))
        .unwrap();
    assert_eq!(o1.shape_id(), narrow_shape);
    assert_eq!(o1.get(&key("x")), Some(Value::string("s")));

    // A second object through the same site converges to the same shape
    let o2 = JsObject::new(registry.root());
    site.write(&Value::Object(o2.clone()), &Value::Int(7)).unwrap();
    assert_eq!(o2.shape_id(), narrow_shape);
    assert_eq!(o2.get(&key("x")), Some(Value::Int(7)));

    site.write(&Value::Object(o2.clone()), &Value::string("t"))
        .unwrap();
    assert_eq!(o2.shape_id(), o1.shape_id());
    assert_eq!(o2.get(&key("x")), Some(Value::string("t")));
}

#[test]
fn test_identically_built_objects_share_shapes_through_sites() {
    let registry = Arc::new(ShapeRegistry::new());
    let site_a = assignment_site(&registry, "a");
    let site_b = assignment_site(&registry, "b");

    let objects: Vec<_> = (0..4).map(|_| JsObject::new(registry.root())).collect();
    for obj in &objects {
        site_a.write(&Value::Object(obj.clone()), &Value::Int(1)).unwrap();
        site_b
            .write(&Value::Object(obj.clone()), &Value::Bool(true))
            .unwrap();
    }

    for obj in &objects[1..] {
        assert_eq!(objects[0].shape_id(), obj.shape_id());
    }
}

// ============================================================================
// Megamorphic collapse
// ============================================================================

#[test]
fn test_collapse_to_single_generic_node() {
    let registry = Arc::new(ShapeRegistry::new());
    let site = assignment_site(&registry, "p");

    let over = MEGAMORPHIC_THRESHOLD + 2;
    let objects: Vec<_> = (0..over)
        .map(|i| tagged_object(&registry, &format!("tag{i}")))
        .collect();
    for (i, obj) in objects.iter().enumerate() {
        site.write(&Value::Object(obj.clone()), &Value::Int(i as i32))
            .unwrap();
    }

    assert_eq!(site.state(), SiteState::Megamorphic);
    assert_eq!(site.chain_length(), 1);
    assert!(matches!(site.chain_guards().as_slice(), [Guard::Always]));
    assert_eq!(site.stats().collapses, 1);

    // Every write still landed
    for (i, obj) in objects.iter().enumerate() {
        assert_eq!(obj.get(&key("p")), Some(Value::Int(i as i32)));
    }

    // The collapsed site keeps servicing new layouts without regrowing
    let late = tagged_object(&registry, "late");
    site.write(&Value::Object(late.clone()), &Value::Int(99))
        .unwrap();
    assert_eq!(late.get(&key("p")), Some(Value::Int(99)));
    assert_eq!(site.chain_length(), 1);
}

#[test]
fn test_collapse_survives_racing_slow_paths() {
    use std::thread;

    let registry = Arc::new(ShapeRegistry::new());
    let site = Arc::new(assignment_site(&registry, "p"));
    for i in 0..MEGAMORPHIC_THRESHOLD {
        let obj = tagged_object(&registry, &format!("warm{i}"));
        site.write(&Value::Object(obj), &Value::Int(1)).unwrap();
    }
    assert_eq!(site.chain_length(), MEGAMORPHIC_THRESHOLD);

    // Hold the slow path open so the loser blocks on the site lock while
    // the winner collapses the chain.
    site.set_specialize_delay(200);
    let barrier = Arc::new(std::sync::Barrier::new(2));
    let mut handles = Vec::new();
    for tag in ["race_a", "race_b"] {
        let site = Arc::clone(&site);
        let registry = Arc::clone(&registry);
        let barrier = Arc::clone(&barrier);
        handles.push(thread::spawn(move || {
            let obj = tagged_object(&registry, tag);
            barrier.wait();
            site.write(&Value::Object(obj.clone()), &Value::Int(2))
                .unwrap();
            obj
        }));
    }
    let objects: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    // The terminal is final: the loser must not republish past it
    assert_eq!(site.state(), SiteState::Megamorphic);
    assert_eq!(site.chain_length(), 1);
    assert!(matches!(site.chain_guards().as_slice(), [Guard::Always]));
    assert_eq!(site.stats().collapses, 1);
    for obj in &objects {
        assert_eq!(obj.get(&key("p")), Some(Value::Int(2)));
    }
}

#[test]
fn test_collapsed_site_still_enforces_strict_errors() {
    let registry = Arc::new(ShapeRegistry::new());
    let site =
        CacheSite::new(SiteOptions::strict_assignment(key("p")), Arc::clone(&registry));

    for i in 0..=MEGAMORPHIC_THRESHOLD {
        let obj = tagged_object(&registry, &format!("m{i}"));
        site.write(&Value::Object(obj), &Value::Int(1)).unwrap();
    }
    assert_eq!(site.state(), SiteState::Megamorphic);

    let frozen = JsObject::new(registry.root());
    frozen.prevent_extensions(&registry);
    let err = site
        .write(&Value::Object(frozen), &Value::Int(1))
        .unwrap_err();
    assert_eq!(err.exception_kind(), "TypeError");
}

// ============================================================================
// Strict-mode contracts
// ============================================================================

#[test]
fn test_read_only_write_contract_through_site() {
    let registry = Arc::new(ShapeRegistry::new());

    let build = || {
        let obj = JsObject::new(registry.root());
        obj.define_data(&registry, &key("ro"), PropertyFlags::ENUMERABLE, &Value::Int(1));
        obj
    };

    let sloppy = assignment_site(&registry, "ro");
    let obj = build();
    for _ in 0..2 {
        sloppy.write(&Value::Object(obj.clone()), &Value::Int(9)).unwrap();
    }
    assert_eq!(obj.get(&key("ro")), Some(Value::Int(1)));

    let strict = CacheSite::new(SiteOptions::strict_assignment(key("ro")), Arc::clone(&registry));
    let obj = build();
    for _ in 0..2 {
        let err = strict
            .write(&Value::Object(obj.clone()), &Value::Int(9))
            .unwrap_err();
        assert!(err.to_string().contains("read only"));
    }
}

#[test]
fn test_strict_global_write_contract_through_site() {
    let registry = Arc::new(ShapeRegistry::new());
    let global = JsObject::new(registry.root());

    let strict = CacheSite::new(
        SiteOptions::global_assignment(key("undeclared"), true),
        Arc::clone(&registry),
    );
    for _ in 0..2 {
        let err = strict
            .write(&Value::Object(global.clone()), &Value::Int(1))
            .unwrap_err();
        assert_eq!(err.exception_kind(), "ReferenceError");
    }

    let sloppy = CacheSite::new(
        SiteOptions::global_assignment(key("implied"), false),
        Arc::clone(&registry),
    );
    sloppy
        .write(&Value::Object(global.clone()), &Value::Int(1))
        .unwrap();
    assert_eq!(global.get(&key("implied")), Some(Value::Int(1)));
}

#[test]
fn test_declaration_site_updates_read_only_property() {
    let registry = Arc::new(ShapeRegistry::new());
    let site = CacheSite::new(SiteOptions::declaration(key("ro")), Arc::clone(&registry));
    let obj = JsObject::new(registry.root());
    obj.define_data(&registry, &key("ro"), PropertyFlags::ENUMERABLE, &Value::Int(1));

    for i in 0..3 {
        site.write(&Value::Object(obj.clone()), &Value::Int(i)).unwrap();
    }
    assert_eq!(obj.get(&key("ro")), Some(Value::Int(2)));
    // The declaration write specialized to a plain slot node
    assert_eq!(site.stats().specializations, 1);
    assert_eq!(site.stats().hits, 2);
}

#[test]
fn test_declaration_over_accessor_throws_and_stays_uncached() {
    let registry = Arc::new(ShapeRegistry::new());
    let site = CacheSite::new(SiteOptions::declaration(key("x")), Arc::clone(&registry));
    let obj = JsObject::new(registry.root());
    obj.define_accessor(
        &registry,
        &key("x"),
        AccessorPair {
            getter: None,
            setter: Some(Arc::new(NativeFunction::new("set_x", |_, _| {
                Ok(Value::Undefined)
            }))),
        },
    );

    for _ in 0..2 {
        let err = site
            .write(&Value::Object(obj.clone()), &Value::Int(1))
            .unwrap_err();
        assert!(err.to_string().contains("Cannot redefine"));
    }
    assert_eq!(site.chain_length(), 0);
}

#[test]
fn test_primitive_receiver_contract_through_site() {
    let registry = Arc::new(ShapeRegistry::new());

    let sloppy = assignment_site(&registry, "x");
    sloppy.write(&Value::Int(1), &Value::Int(2)).unwrap();
    sloppy.write(&Value::string("s"), &Value::Int(2)).unwrap();

    let strict = CacheSite::new(SiteOptions::strict_assignment(key("x")), Arc::clone(&registry));
    let err = strict.write(&Value::Int(1), &Value::Int(2)).unwrap_err();
    assert_eq!(err.exception_kind(), "TypeError");
}

// ============================================================================
// Accessors, proxies, arrays, bridges
// ============================================================================

#[test]
fn test_accessor_invocation_through_site() {
    let registry = Arc::new(ShapeRegistry::new());
    let site = assignment_site(&registry, "x");

    let log = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let sink = Arc::clone(&log);
    let obj = JsObject::new(registry.root());
    obj.define_accessor(
        &registry,
        &key("x"),
        AccessorPair {
            getter: None,
            setter: Some(Arc::new(NativeFunction::new("set_x", move |_, args| {
                sink.lock().push(args[0].clone());
                Ok(Value::Undefined)
            }))),
        },
    );

    for i in 0..3 {
        site.write(&Value::Object(obj.clone()), &Value::Int(i)).unwrap();
    }
    assert_eq!(
        log.lock().as_slice(),
        [Value::Int(0), Value::Int(1), Value::Int(2)]
    );
    // The setter was cached after the first miss
    assert_eq!(site.stats().specializations, 1);
    assert_eq!(site.stats().hits, 2);
}

#[test]
fn test_array_length_through_site() {
    let registry = Arc::new(ShapeRegistry::new());
    let site = assignment_site(&registry, "length");
    let arr = JsObject::new_array(&registry, 8);

    site.write(&Value::Object(arr.clone()), &Value::Int(3)).unwrap();
    assert_eq!(arr.array_length(), Some(3));

    site.write(&Value::Object(arr.clone()), &Value::Int(10)).unwrap();
    assert_eq!(arr.array_length(), Some(10));
    assert_eq!(arr.get_element(9), Some(Value::Undefined));

    let err = site
        .write(&Value::Object(arr.clone()), &Value::Int(-1))
        .unwrap_err();
    assert_eq!(err.exception_kind(), "RangeError");
    assert_eq!(arr.array_length(), Some(10));
}

#[test]
fn test_host_bridge_through_site() {
    let registry = Arc::new(ShapeRegistry::new());
    let site = assignment_site(&registry, "entry");
    let host = Arc::new(MapHost::new());
    let receiver = Value::Host(host.clone());

    for i in 0..3 {
        site.write(&receiver, &Value::Int(i)).unwrap();
    }
    assert_eq!(host.read(&key("entry")), Some(Value::Int(2)));
    assert_eq!(site.state(), SiteState::Monomorphic);

    let rejecting = Value::Host(Arc::new(MapHost::read_only()));
    let err = site.write(&rejecting, &Value::Int(1)).unwrap_err();
    assert_eq!(err.exception_kind(), "HostError");
}

// ============================================================================
// Sweeping
// ============================================================================

#[test]
fn test_sweep_drops_only_dead_entries_in_order() {
    let registry = Arc::new(ShapeRegistry::new());
    let site = assignment_site(&registry, "v");

    // Two receiver layouts, each costing a transition node and then a
    // slot node: four entries, safely below the collapse threshold.
    let o1 = tagged_object(&registry, "s1");
    let o2 = tagged_object(&registry, "s2");
    let o1_tagged = o1.shape();
    let o2_tagged = o2.shape();
    for obj in [&o1, &o2] {
        site.write(&Value::Object(obj.clone()), &Value::Int(1)).unwrap();
        site.write(&Value::Object(obj.clone()), &Value::Int(2)).unwrap();
    }
    assert_eq!(site.chain_length(), 4);

    // Kill both of o2's entries: its slot node tracks the post-write
    // shape, its transition node tracks the tagged shape.
    o2.shape().validity_cell().revoke();
    o2_tagged.validity_cell().revoke();
    let specializations_before = site.stats().specializations;

    // Any write now observes the dead token and sweeps under the lock
    site.write(&Value::Object(o1.clone()), &Value::Int(3)).unwrap();

    // Both of o2's entries went; o1's survive in their original order.
    assert_eq!(
        site.chain_guards(),
        vec![Guard::ShapeIs(o1.shape()), Guard::ShapeIs(o1_tagged)]
    );
    // Surviving entries kept working without re-specializing
    site.write(&Value::Object(o1.clone()), &Value::Int(4)).unwrap();
    assert_eq!(site.stats().specializations, specializations_before);
    assert_eq!(o1.get(&key("v")), Some(Value::Int(4)));
}

// ============================================================================
// Concurrency
// ============================================================================

#[test]
fn test_racing_threads_install_one_transition() {
    use std::thread;

    let registry = Arc::new(ShapeRegistry::new());
    let site = Arc::new(assignment_site(&registry, "x"));
    site.set_specialize_delay(20);

    let threads = 8;
    let barrier = Arc::new(std::sync::Barrier::new(threads));
    let mut handles = Vec::new();
    for i in 0..threads {
        let site = Arc::clone(&site);
        let registry = Arc::clone(&registry);
        let barrier = Arc::clone(&barrier);
        handles.push(thread::spawn(move || {
            let obj = JsObject::new(registry.root());
            barrier.wait();
            site.write(&Value::Object(obj.clone()), &Value::Int(i as i32))
                .unwrap();
            obj
        }));
    }
    let objects: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    // Exactly one node with exactly one transition record
    assert_eq!(site.chain_length(), 1);
    assert_eq!(site.transition_record_count(), 1);
    assert_eq!(site.stats().specializations, 1);
    for obj in &objects[1..] {
        assert_eq!(objects[0].shape_id(), obj.shape_id());
    }
}

#[test]
fn test_concurrent_hot_writes_converge() {
    use std::thread;

    let registry = Arc::new(ShapeRegistry::new());
    let site = Arc::new(assignment_site(&registry, "n"));

    let obj = JsObject::new(registry.root());
    site.write(&Value::Object(obj.clone()), &Value::Int(0)).unwrap();

    let mut handles = Vec::new();
    for t in 0..4 {
        let site = Arc::clone(&site);
        let obj = obj.clone();
        handles.push(thread::spawn(move || {
            for i in 0..200 {
                site.write(&Value::Object(obj.clone()), &Value::Int(t * 1000 + i))
                    .unwrap();
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    // Some racing thread's value won; the slot holds an integer
    assert!(matches!(obj.get(&key("n")), Some(Value::Int(_))));
    assert!(site.state() >= SiteState::Monomorphic);
    assert!(site.chain_length() <= MEGAMORPHIC_THRESHOLD);
}
