//! Lazy global proxies: reads, writes, calls and identity.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use moon_rt::{ffi, ErrorKind, State, Value};
use pretty_assertions::assert_eq;

fn state_with_d() -> State {
    let state = State::new().unwrap();
    state.do_string("d = { 'foo', 'bar' }").unwrap();
    state
}

#[test]
fn reads_nested_values() {
    let state = state_with_d();
    assert_eq!(state.global("d").index(1).value().unwrap(), Value::from("foo"));
    assert_eq!(state.global("d").index(2).value().unwrap(), Value::from("bar"));
    assert_eq!(
        state.global("d").value().unwrap(),
        Value::table([(1, "foo"), (2, "bar")])
    );
}

#[test]
fn missing_key_reads_as_nil() {
    let state = state_with_d();
    assert_eq!(state.global("d").index("missing").value().unwrap(), Value::Nil);
    assert_eq!(state.global("never_set").value().unwrap(), Value::Nil);
}

#[test]
fn indexing_a_non_table_is_a_mismatch() {
    let state = state_with_d();
    let error = state.global("missing").index("x").value().unwrap_err();
    assert_eq!(
        error.kind,
        ErrorKind::TypeMismatch {
            expected: "table".to_string(),
            found: "nil".to_string(),
        }
    );

    let error = state.global("d").index(1).index(1).value().unwrap_err();
    assert_eq!(
        error.kind,
        ErrorKind::TypeMismatch {
            expected: "table".to_string(),
            found: "string".to_string(),
        }
    );
}

#[test]
fn assignment_is_visible_to_scripts() {
    let state = state_with_d();
    state.global("d").index(3).assign(12.34).unwrap();
    assert_eq!(state.global("d").index(3).value().unwrap(), Value::from(12.34));
    assert_eq!(state.do_string("return d[3]").unwrap(), Value::from(12.34));
    assert_eq!(state.do_string("return #d").unwrap(), Value::from(3));
}

#[test]
fn assigning_tables_creates_engine_tables() {
    let state = State::new().unwrap();
    state
        .global("config")
        .assign(Value::table([("name", Value::from("moon")), ("level", Value::from(3))]))
        .unwrap();
    assert_eq!(
        state.do_string("return config.name .. config.level").unwrap(),
        Value::from("moon3")
    );
}

#[test]
fn assignment_through_a_non_table_fails() {
    let state = state_with_d();
    let error = state.global("nothing").index("x").assign(1).unwrap_err();
    assert!(matches!(error.kind, ErrorKind::TypeMismatch { .. }));
}

#[test]
fn nil_key_assignment_is_rejected() {
    let state = state_with_d();
    let error = state.global("d").index(Value::Nil).assign(1).unwrap_err();
    assert_eq!(error.kind, ErrorKind::Type);
    let error = state.global("d").index(f64::NAN).assign(1).unwrap_err();
    assert_eq!(error.kind, ErrorKind::Type);
}

#[test]
fn chained_assignment_fills_independent_slots() {
    let state = State::new().unwrap();
    let a = state.global("a");
    let b = state.global("b");
    let c = state.global("c");
    a.assign(b.assign(c.assign(5).unwrap()).unwrap()).unwrap();
    for name in ["a", "b", "c"] {
        assert_eq!(state.global(name).value().unwrap(), Value::from(5));
    }
    state.do_string("b = 6").unwrap();
    assert_eq!(a.value().unwrap(), Value::from(5));
}

#[test]
fn assign_from_copies_instead_of_aliasing() {
    let state = State::new().unwrap();
    state.do_string("src = { n = 1 }").unwrap();
    let dst = state.global("dst");
    dst.assign_from(&state.global("src")).unwrap();
    state.do_string("src.n = 2").unwrap();
    assert_eq!(dst.index("n").value().unwrap(), Value::from(1));
    assert_eq!(state.global("src").index("n").value().unwrap(), Value::from(2));
}

#[test]
fn proxies_are_lazy() {
    let state = State::new().unwrap();
    let slot = state.global("late").index("field");
    state.do_string("late = { field = 'now' }").unwrap();
    assert_eq!(slot.value().unwrap(), Value::from("now"));
    state.do_string("late.field = 'later'").unwrap();
    assert_eq!(slot.value().unwrap(), Value::from("later"));
}

#[test]
fn call_returns_every_result() {
    let state = State::new().unwrap();
    state
        .do_string("function swap(a, b) return b, a end")
        .unwrap();
    let results = state
        .global("swap")
        .call(&[Value::from(1), Value::from("two")])
        .unwrap();
    assert_eq!(results, vec![Value::from("two"), Value::from(1)]);
}

#[test]
fn call_reaches_nested_functions_and_callable_tables() {
    let state = State::new().unwrap();
    assert_eq!(
        state
            .global("string")
            .index("upper")
            .call(&[Value::from("abc")])
            .unwrap(),
        vec![Value::from("ABC")]
    );
    state
        .do_string("callable = setmetatable({}, { __call = function(_, x) return x * 2 end })")
        .unwrap();
    assert_eq!(
        state.global("callable").call(&[Value::from(21)]).unwrap(),
        vec![Value::from(42)]
    );
}

#[test]
fn calling_a_non_function_is_a_mismatch() {
    let state = state_with_d();
    let error = state.global("d").call(&[]).unwrap_err();
    assert_eq!(
        error.kind,
        ErrorKind::TypeMismatch {
            expected: "function".to_string(),
            found: "table".to_string(),
        }
    );
}

#[test]
fn callee_errors_keep_their_message() {
    let state = State::new().unwrap();
    state
        .do_string("function fail(msg) error(msg, 0) end")
        .unwrap();
    let error = state.global("fail").call(&[Value::from("nope")]).unwrap_err();
    assert_eq!(error.kind, ErrorKind::RunTime);
    assert_eq!(error.message, "nope");
}

#[test]
fn equality_is_same_engine_and_same_path() {
    let one = State::new().unwrap();
    let two = State::new().unwrap();
    assert_eq!(one.global("x").index(1), one.global("x").index(1));
    assert_ne!(one.global("x").index(1), one.global("x").index(2));
    assert_ne!(one.global("x"), two.global("x"));

    // equal values at different paths are still different proxies
    one.do_string("p = 1 q = 1").unwrap();
    assert_ne!(one.global("p"), one.global("q"));
}

#[test]
fn clone_copies_only_the_path() {
    let state = State::new().unwrap();
    let original = state.global("t");
    let copy = original.clone();
    assert_eq!(original, copy);
    state.do_string("t = 'set later'").unwrap();
    assert_eq!(copy.value().unwrap(), Value::from("set later"));
    assert_eq!(copy.keys(), &[Value::from("t")]);
}

#[test]
fn display_shows_the_path() {
    let state = State::new().unwrap();
    let slot = state.global("config").index("servers").index(1);
    assert_eq!(slot.to_string(), "config[\"servers\"][1]");
}

// ── Metamethods on walked tables ──

fn state_with_strict_globals() -> State {
    let state = State::new().unwrap();
    state
        .do_string(
            "setmetatable(_G, { \
                __index = function(_, k) error('undefined global ' .. k, 0) end, \
                __newindex = function(_, k) error('read-only global ' .. k, 0) end, \
             })",
        )
        .unwrap();
    state
}

#[test]
fn erroring_index_metamethod_is_a_runtime_error() {
    let state = state_with_strict_globals();
    let error = state.global("undefined").value().unwrap_err();
    assert_eq!(error.kind, ErrorKind::RunTime);
    assert_eq!(error.message, "undefined global undefined");

    let error = state.global("undefined").call(&[]).unwrap_err();
    assert_eq!(error.message, "undefined global undefined");

    // the engine stays usable and the stack balanced
    assert_eq!(state.do_string("return 1 + 1").unwrap(), Value::from(2));
    assert_eq!(unsafe { ffi::lua_gettop(state.as_ptr()) }, 0);
}

#[test]
fn erroring_newindex_metamethod_is_a_runtime_error() {
    let state = state_with_strict_globals();
    let error = state.global("fresh").assign(1).unwrap_err();
    assert_eq!(error.kind, ErrorKind::RunTime);
    assert_eq!(error.message, "read-only global fresh");
    assert_eq!(unsafe { ffi::lua_gettop(state.as_ptr()) }, 0);

    // existing keys bypass __newindex
    state.do_string("rawset(_G, 'existing', 0)").unwrap();
    state.global("existing").assign(5).unwrap();
    assert_eq!(state.global("existing").value().unwrap(), Value::from(5));
}

#[test]
fn metamethods_on_intermediate_tables_are_protected() {
    let state = State::new().unwrap();
    state
        .do_string("t = setmetatable({}, { __index = function(_, k) error(k, 0) end })")
        .unwrap();
    let error = state.global("t").index("boom").index(1).value().unwrap_err();
    assert_eq!(error.kind, ErrorKind::RunTime);
    assert_eq!(error.message, "boom");
}

#[test]
fn index_metamethods_still_apply() {
    let state = State::new().unwrap();
    state
        .do_string("t = setmetatable({}, { __index = function(_, k) return k .. '!' end })")
        .unwrap();
    assert_eq!(state.global("t").index("hi").value().unwrap(), Value::from("hi!"));
}

// ── Numbers and byte strings ──

#[test]
fn integral_numbers_arrive_as_integers() {
    let state = State::new().unwrap();
    state.global("n").assign(3).unwrap();
    assert_eq!(state.do_string("return tostring(n)").unwrap(), Value::from("3"));
    assert_eq!(state.do_string("return math.type(n)").unwrap(), Value::from("integer"));

    state.global("x").assign(2.5).unwrap();
    assert_eq!(state.do_string("return math.type(x)").unwrap(), Value::from("float"));
}

#[test]
fn byte_strings_survive_a_round_trip() {
    let state = State::new().unwrap();
    state.do_string("s = 'a\\xff'").unwrap();
    let value = state.global("s").value().unwrap();
    state.global("back").assign(value).unwrap();
    assert_eq!(state.do_string("return back == s").unwrap(), Value::from(true));
}

#[test]
fn byte_string_keys_are_not_merged() {
    let state = State::new().unwrap();
    state.do_string("t = { ['a\\xff'] = 1, ['a\\xfe'] = 2 }").unwrap();
    let table = state.global("t").value().unwrap();
    assert_eq!(table.as_table().unwrap().len(), 2);

    state.global("copy").assign(table).unwrap();
    assert_eq!(
        state.do_string("return copy['a\\xff'] + copy['a\\xfe']").unwrap(),
        Value::from(3)
    );
}
