use scriptbridge::{
    BridgeError, ClassBuilder, HostConfig, HostError, MemorySource, NativeValue, Registry, ScriptHost, ScriptValue,
    SystemAllocator, ValueType,
};
use std::cell::Cell;
use std::rc::Rc;

#[derive(Debug, Default)]
struct Sprite {
    x: i32,
    y: i32,
}

thread_local! {
    static TRACKED_DROPS: Cell<usize> = const { Cell::new(0) };
    static PAIR_CALLS: Cell<usize> = const { Cell::new(0) };
}

#[derive(Default)]
struct Tracked;

impl Drop for Tracked {
    fn drop(&mut self) {
        TRACKED_DROPS.with(|d| d.set(d.get() + 1));
    }
}

fn registry() -> Rc<Registry> {
    let mut registry = Registry::new();
    registry
        .function("Add", |a: i16, b: i16| a.wrapping_add(b))
        .unwrap()
        .function("Mul", |a: i16, b: i16| a.wrapping_mul(b))
        .unwrap()
        .function("Pair", |a: i32, b: i32| {
            PAIR_CALLS.with(|c| c.set(c.get() + 1));
            a + b
        })
        .unwrap()
        .function("Flag", |_on: bool| 1i32)
        .unwrap()
        .function("Explode", || -> i32 { panic!("kaboom") })
        .unwrap();

    registry
        .class(
            ClassBuilder::<Sprite>::new("Sprite")
                .property("x", |s| s.x, |s, v| s.x = v)
                .property("y", |s| s.y, |s, v| s.y = v)
                .method("Move", |s: &mut Sprite, dx: i32, dy: i32| {
                    s.x += dx;
                    s.y += dy;
                    s.x + s.y
                }),
        )
        .unwrap()
        .class(ClassBuilder::<Tracked>::new("Tracked"))
        .unwrap();

    Rc::new(registry)
}

fn host() -> ScriptHost<SystemAllocator> {
    ScriptHost::create(SystemAllocator::new(), registry()).unwrap()
}

fn runtime_message(result: Result<Vec<ScriptValue>, HostError>) -> String {
    match result {
        Err(HostError::Runtime(message)) => message,
        other => panic!("expected a runtime error, got {:?}", other),
    }
}

// ===== End-to-end Scenarios =====

#[test]
fn test_global_functions_compose() {
    let mut host = host();
    let values = host.run("local c = Add(42, 43); local d = Mul(c, 2); return d").unwrap();
    assert_eq!(values, vec![ScriptValue::Integer(170)]);
}

#[test]
fn test_method_mutates_instance() {
    let mut host = host();
    let values = host
        .run("s = Sprite.new(); local r = s:Move(1, 2); return r, s.x, s.y")
        .unwrap();
    assert_eq!(
        values,
        vec![ScriptValue::Integer(3), ScriptValue::Integer(1), ScriptValue::Integer(2)]
    );
}

#[test]
fn test_side_table_extends_instance() {
    let mut host = host();
    let values = host
        .run("s = Sprite.new(); s.customField = 42; return s.customField, s.x, s.y, s.missing")
        .unwrap();
    assert_eq!(
        values,
        vec![
            ScriptValue::Integer(42),
            ScriptValue::Integer(0),
            ScriptValue::Integer(0),
            ScriptValue::Nil
        ]
    );
}

#[test]
fn test_side_tables_are_per_instance() {
    let mut host = host();
    let values = host
        .run("local a, b = Sprite.new(), Sprite.new(); a.tag = 1; a[7] = 'seven'; return b.tag, a[7]")
        .unwrap();
    assert_eq!(values, vec![ScriptValue::Nil, ScriptValue::Str("seven".into())]);
}

// ===== Arity and Types =====

#[test]
fn test_arity_mismatch_skips_native_call() {
    let mut host = host();
    PAIR_CALLS.with(|c| c.set(0));

    let values = host
        .run(
            "local ok1, e1 = pcall(Pair, 1)
             local ok2, e2 = pcall(Pair, 1, 2, 3)
             return ok1, e1, ok2, e2",
        )
        .unwrap();

    assert_eq!(values[0], ScriptValue::Bool(false));
    assert_eq!(values[2], ScriptValue::Bool(false));
    for message in [&values[1], &values[3]] {
        match message {
            ScriptValue::Str(text) => assert!(text.contains("arity mismatch"), "{}", text),
            other => panic!("expected message, got {:?}", other),
        }
    }
    assert_eq!(PAIR_CALLS.with(Cell::get), 0);

    host.run("Pair(1, 2)").unwrap();
    assert_eq!(PAIR_CALLS.with(Cell::get), 1);
}

#[test]
fn test_uncaught_bridge_error_reaches_host() {
    let mut host = host();
    let message = runtime_message(host.run("return Add(1)"));
    assert!(message.contains("arity mismatch"));

    let message = runtime_message(host.run("return Add('a', 2)"));
    assert!(message.contains("bad argument 1"));
}

#[test]
fn test_unrecognized_parameter_type() {
    let mut host = host();
    let message = runtime_message(host.run("return Flag(true)"));
    assert!(message.contains("unrecognized parameter type"));
}

#[test]
fn test_method_without_receiver() {
    let mut host = host();
    let message = runtime_message(host.run("local s = Sprite.new(); local m = s.Move; return m(5, 1, 2)"));
    assert!(message.contains("expected an object reference"));
}

#[test]
fn test_property_type_mismatch() {
    let mut host = host();
    let message = runtime_message(host.run("s = Sprite.new(); s.x = 'left'"));
    assert!(message.contains("unrecognized type for this property"));
    assert_eq!(host.run("return s.x").unwrap(), vec![ScriptValue::Integer(0)]);
}

#[test]
fn test_native_panic_becomes_script_error() {
    let mut host = host();
    let values = host.run("local ok, err = pcall(Explode); return ok, err").unwrap();
    assert_eq!(values[0], ScriptValue::Bool(false));
    match &values[1] {
        ScriptValue::Str(text) => assert!(text.contains("kaboom")),
        other => panic!("expected message, got {:?}", other),
    }
}

// ===== Member Shadowing =====

#[test]
fn test_native_members_shadow_side_table() {
    let mut host = host();
    let values = host
        .run(
            "s = Sprite.new()
             s.x = 9
             s.Move = 5
             return s.x, type(s.Move), s:Move(1, 1)",
        )
        .unwrap();
    assert_eq!(
        values,
        vec![
            ScriptValue::Integer(9),
            ScriptValue::Str("function".into()),
            ScriptValue::Integer(11)
        ]
    );
}

#[test]
fn test_instance_tostring() {
    let mut host = host();
    match host.run("return tostring(Sprite.new())").unwrap().as_slice() {
        [ScriptValue::Str(text)] => assert!(text.starts_with("Sprite(0x"), "{}", text),
        other => panic!("unexpected {:?}", other),
    }
}

// ===== Instance Lifecycle =====

#[test]
fn test_finalizers_balance_instances() {
    let mut host = host();
    TRACKED_DROPS.with(|d| d.set(0));
    let before = host.bridge_stats().live_instances;

    host.run("keep = {} for i = 1, 50 do keep[i] = Tracked.new() end").unwrap();
    assert_eq!(host.bridge_stats().live_instances, before + 50);

    host.run("keep = nil; collectgarbage(); collectgarbage()").unwrap();
    assert_eq!(host.bridge_stats().live_instances, before);
    assert_eq!(TRACKED_DROPS.with(Cell::get), 50);

    host.close();
    assert_eq!(TRACKED_DROPS.with(Cell::get), 50);
}

#[test]
fn test_close_finalizes_remaining_instances() {
    let mut host = host();
    TRACKED_DROPS.with(|d| d.set(0));

    host.run("a, b, c = Tracked.new(), Tracked.new(), Tracked.new()").unwrap();
    assert_eq!(host.bridge_stats().instances_created, 3);

    drop(host);
    assert_eq!(TRACKED_DROPS.with(Cell::get), 3);
}

// ===== Host Lifecycle =====

#[test]
fn test_compile_error() {
    let mut host = host();
    match host.load("local = 1") {
        Err(HostError::Compile(message)) => assert!(message.contains("script:1:"), "{}", message),
        other => panic!("expected compile error, got {:?}", other),
    }
}

#[test]
fn test_execute_without_chunk() {
    let mut host = host();
    assert!(matches!(host.execute(), Err(HostError::NoChunk)));
}

#[test]
fn test_runtime_error_keeps_assignments() {
    let mut host = host();
    let message = runtime_message(host.run("x = 1; error('boom'); x = 2"));
    assert!(message.contains("boom"));
    assert_eq!(host.global("x").unwrap(), ScriptValue::Integer(1));
}

#[test]
fn test_loaded_chunk_can_rerun() {
    let mut host = host();
    host.load("counter = (counter or 0) + 1; return counter").unwrap();
    assert_eq!(host.execute().unwrap(), vec![ScriptValue::Integer(1)]);
    assert_eq!(host.execute().unwrap(), vec![ScriptValue::Integer(2)]);
}

#[test]
fn test_read_global() {
    let mut host = host();
    host.run("x = 47").unwrap();
    assert_eq!(host.global("x").unwrap(), ScriptValue::Integer(47));
    assert_eq!(host.global("nothing").unwrap(), ScriptValue::Nil);
}

#[test]
fn test_call_script_function() {
    let mut host = host();
    host.run("function Pythagoras(a, b) return (a * a) + (b * b), a, b end").unwrap();

    let values = host
        .call_function("Pythagoras", &[NativeValue::F64(3.0), NativeValue::I32(4)])
        .unwrap();
    assert_eq!(
        values,
        vec![ScriptValue::Number(25.0), ScriptValue::Number(3.0), ScriptValue::Integer(4)]
    );
}

#[test]
fn test_call_native_function_by_name() {
    let mut host = host();
    let values = host.call_function("Add", &[NativeValue::I16(2), NativeValue::I16(3)]).unwrap();
    assert_eq!(values, vec![ScriptValue::Integer(5)]);
    assert_eq!(host.bridge_stats().calls_made, 1);
}

#[test]
fn test_call_unknown_function() {
    let mut host = host();
    host.run("x = 47").unwrap();
    assert!(matches!(host.call_function("missing", &[]), Err(HostError::UnknownFunction(name)) if name == "missing"));
    assert!(matches!(host.call_function("x", &[]), Err(HostError::UnknownFunction(_))));
}

#[test]
fn test_call_with_unmarshallable_argument() {
    let mut host = host();
    host.run("function f(v) return v end").unwrap();
    let err = host
        .call_function("f", &[NativeValue::I32(1), NativeValue::Bool(true)])
        .unwrap_err();
    assert!(matches!(
        err,
        HostError::Bridge(BridgeError::UnrecognizedParameterType { index: 2, ty: ValueType::Bool })
    ));
    assert_eq!(host.call_function("f", &[NativeValue::I32(7)]).unwrap(), vec![ScriptValue::Integer(7)]);
}

#[test]
fn test_call_with_many_arguments() {
    let mut host = host();
    host.run("function count(...) return select('#', ...) end").unwrap();

    let args: Vec<_> = (0..64).map(NativeValue::I32).collect();
    assert_eq!(host.call_function("count", &args).unwrap(), vec![ScriptValue::Integer(64)]);

    let args: Vec<_> = (0..5000).map(NativeValue::I32).collect();
    assert_eq!(host.call_function("count", &args).unwrap(), vec![ScriptValue::Integer(5000)]);
}

#[test]
fn test_call_reports_script_error() {
    let mut host = host();
    host.run("function fail() error('nope') end").unwrap();
    let message = runtime_message(host.call_function("fail", &[]));
    assert!(message.contains("nope"));
}

// ===== Arena-backed Hosts =====

#[test]
fn test_arena_host_reset_between_runs() {
    let config = HostConfig::from_toml_str("[arena]\nsize_bytes = 262144\nfallback = true\n").unwrap();
    let mut buffer = config.allocate_buffer().unwrap();
    let mut memory = config.build_memory(&mut buffer);

    for _ in 0..3 {
        let mut host = ScriptHost::create_with_config(memory, registry(), &config).unwrap();
        let values = host.run("local c = Add(42, 43); return Mul(c, 2)").unwrap();
        assert_eq!(values, vec![ScriptValue::Integer(170)]);

        memory = host.close();
        assert!(memory.stats().used > 0);
        assert_eq!(memory.stats().heap_blocks, 0);
        memory.reset();
        assert_eq!(memory.stats().used, 0);
    }
}

#[test]
fn test_arena_without_fallback() {
    let config = HostConfig::from_toml_str("[arena]\nsize_bytes = 1048576\nfallback = false\n").unwrap();
    let mut buffer = config.allocate_buffer().unwrap();
    let memory = config.build_memory(&mut buffer);
    assert!(!memory.has_fallback());

    let mut host = ScriptHost::create_with_config(memory, registry(), &config).unwrap();
    let values = host.run("s = Sprite.new(); return s:Move(1, 2)").unwrap();
    assert_eq!(values, vec![ScriptValue::Integer(3)]);

    let capacity = host.memory().stats().capacity;
    assert_eq!(capacity, 1048576);
    assert!(host.memory().stats().live_blocks > 0);
}

#[test]
fn test_small_arena_spills_to_heap() {
    let config = HostConfig::from_toml_str("[arena]\nsize_bytes = 4096\n").unwrap();
    let mut buffer = config.allocate_buffer().unwrap();
    let memory = config.build_memory(&mut buffer);

    let mut host = ScriptHost::create_with_config(memory, registry(), &config).unwrap();
    host.run("t = {} for i = 1, 100 do t[i] = i end").unwrap();
    assert!(host.memory().stats().heap_blocks > 0);

    let memory = host.close();
    assert_eq!(memory.stats().heap_blocks, 0);
}

#[test]
fn test_without_standard_libraries() {
    let config = HostConfig::from_toml_str("[runtime]\nopen_libs = false\nchunk_name = '=bare'\n").unwrap();
    let mut host = ScriptHost::create_with_config(SystemAllocator::new(), registry(), &config).unwrap();

    assert_eq!(host.run("return Add(1, 2)").unwrap(), vec![ScriptValue::Integer(3)]);
    let message = runtime_message(host.run("print('hi')"));
    assert!(message.starts_with("bare:1:"), "{}", message);
}
