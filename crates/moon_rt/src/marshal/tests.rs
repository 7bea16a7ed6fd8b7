#![allow(clippy::unwrap_used, clippy::expect_used, reason = "tests")]

use super::*;
use crate::State;
use moon_value::ErrorKind;
use pretty_assertions::assert_eq;
use proptest::prelude::*;

unsafe extern "C-unwind" fn noop(_: *mut ffi::lua_State) -> c_int {
    0
}

fn round_trip(state: &State, value: &Value) -> Value {
    let raw = state.as_ptr();
    unsafe {
        let top = ffi::lua_gettop(raw);
        push_value(raw, value).unwrap();
        assert_eq!(ffi::lua_gettop(raw), top + 1);
        let back = to_value(raw, -1).unwrap();
        ffi::lua_settop(raw, top);
        back
    }
}

/// Run `code` and convert its single result in place.
fn eval_raw(state: &State, code: &str) -> Result<Value> {
    let raw = state.as_ptr();
    unsafe {
        let top = ffi::lua_gettop(raw);
        let status = ffi::luaL_loadbuffer(raw, code.as_ptr().cast(), code.len(), c"test".as_ptr());
        assert_eq!(status, ffi::LUA_OK);
        assert_eq!(ffi::lua_pcall(raw, 0, 1, 0), ffi::LUA_OK);
        let value = to_value(raw, -1);
        assert_eq!(ffi::lua_gettop(raw), top + 1);
        ffi::lua_settop(raw, top);
        value
    }
}

#[test]
fn primitives_round_trip() {
    let state = State::new().unwrap();
    for value in [
        Value::Nil,
        Value::from(true),
        Value::from(false),
        Value::from(0),
        Value::from(-17.25),
        Value::from(f64::INFINITY),
        Value::from(""),
        Value::from("héllo wörld"),
        Value::function(noop),
    ] {
        assert_eq!(round_trip(&state, &value), value);
    }
}

#[test]
fn nan_round_trips_as_nan() {
    let state = State::new().unwrap();
    let back = round_trip(&state, &Value::from(f64::NAN));
    assert!(back.as_number().unwrap().is_nan());
}

#[test]
fn mixed_key_table_round_trips() {
    let state = State::new().unwrap();
    let mut table = Table::new();
    table.insert(1, "eins");
    table.insert(true, false);
    let value = Value::Table(table);
    assert_eq!(round_trip(&state, &value), value);
}

#[test]
fn nested_tables_round_trip() {
    let state = State::new().unwrap();
    let value = Value::table([
        (Value::from("inner"), Value::table([(1, "a"), (2, "b")])),
        (Value::table([("as", "key")]), Value::from(3)),
    ]);
    assert_eq!(round_trip(&state, &value), value);
}

#[test]
fn nil_and_nan_keys_are_dropped_on_push() {
    let state = State::new().unwrap();
    let mut table = Table::new();
    table.insert(Value::Nil, "dropped");
    table.insert(f64::NAN, "dropped too");
    table.insert("kept", 1);
    let back = round_trip(&state, &Value::Table(table));
    assert_eq!(back, Value::table([("kept", 1)]));
}

#[test]
fn user_data_is_copied_into_a_fresh_block() {
    let state = State::new().unwrap();
    let value = Value::user_data(vec![1u8, 2, 3, 4]);
    assert_eq!(round_trip(&state, &value), value);
    assert_eq!(round_trip(&state, &Value::user_data(Vec::new())), Value::user_data(Vec::new()));
}

#[test]
fn relative_index_reads_the_right_table() {
    let state = State::new().unwrap();
    let raw = state.as_ptr();
    unsafe {
        push_value(raw, &Value::table([(1, "x"), (2, "y")])).unwrap();
        push_value(raw, &Value::from("above")).unwrap();
        push_value(raw, &Value::from("above again")).unwrap();
        let table = to_value(raw, -3).unwrap();
        assert_eq!(table, Value::table([(1, "x"), (2, "y")]));
        assert_eq!(ffi::lua_gettop(raw), 3);
        ffi::lua_settop(raw, 0);
    }
}

#[test]
fn engine_integers_become_numbers() {
    let state = State::new().unwrap();
    assert_eq!(eval_raw(&state, "return 7 // 2").unwrap(), Value::from(3));
    assert_eq!(eval_raw(&state, "return math.maxinteger").unwrap(), Value::from(i64::MAX));
}

#[test]
fn table_with_shared_subtable_is_deep_copied() {
    let state = State::new().unwrap();
    let value = eval_raw(&state, "local s = {1} return {a = s, b = s}").unwrap();
    assert_eq!(value.get(&Value::from("a")).unwrap(), &Value::table([(1, 1)]));
    assert_eq!(value.get(&Value::from("b")).unwrap(), &Value::table([(1, 1)]));
}

#[test]
fn self_referencing_table_is_rejected() {
    let state = State::new().unwrap();
    let err = eval_raw(&state, "local t = {} t.me = t return t").unwrap_err();
    assert_eq!(err.kind, ErrorKind::Type);
}

#[test]
fn unsupported_kinds_are_type_errors() {
    let state = State::new().unwrap();
    for code in [
        "return function() end",
        "return coroutine.create(function() end)",
        "return {f = function() end}",
        "return string.gmatch('a', 'a')",
    ] {
        let err = eval_raw(&state, code).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Type, "{code}");
    }
}

#[test]
fn bare_c_functions_are_accepted() {
    let state = State::new().unwrap();
    let value = eval_raw(&state, "return print").unwrap();
    assert_eq!(value.type_name(), "function");
}

#[test]
fn strings_keep_bytes_that_are_not_utf8() {
    let state = State::new().unwrap();
    let value = eval_raw(&state, "return 'a\\xffb'").unwrap();
    assert_eq!(value.as_bytes().unwrap(), b"a\xffb");
    assert_eq!(round_trip(&state, &value), value);
}

#[test]
fn byte_string_keys_stay_distinct() {
    let state = State::new().unwrap();
    let value = eval_raw(&state, "return {['a\\xff'] = 1, ['a\\xfe'] = 2}").unwrap();
    assert_eq!(value.as_table().unwrap().len(), 2);
    assert_eq!(value.get(&Value::from(&b"a\xff"[..])).unwrap(), &Value::from(1));
    assert_eq!(value.get(&Value::from(&b"a\xfe"[..])).unwrap(), &Value::from(2));
}

/// Push `value`; `Some(true)` for the integer subtype, `Some(false)` for a float.
fn pushed_number_subtype(state: &State, value: f64) -> Option<bool> {
    let raw = state.as_ptr();
    unsafe {
        push_value(raw, &Value::from(value)).unwrap();
        let subtype = (ffi::lua_type(raw, -1) == ffi::LUA_TNUMBER)
            .then(|| ffi::lua_isinteger(raw, -1) != 0);
        ffi::lua_pop(raw, 1);
        subtype
    }
}

#[test]
fn integral_numbers_are_pushed_as_integers() {
    let state = State::new().unwrap();
    assert_eq!(pushed_number_subtype(&state, 3.0), Some(true));
    assert_eq!(pushed_number_subtype(&state, -42.0), Some(true));
    assert_eq!(pushed_number_subtype(&state, 0.0), Some(true));
    assert_eq!(pushed_number_subtype(&state, -9_223_372_036_854_775_808.0), Some(true));
}

#[test]
fn other_numbers_are_pushed_as_floats() {
    let state = State::new().unwrap();
    assert_eq!(pushed_number_subtype(&state, 2.5), Some(false));
    assert_eq!(pushed_number_subtype(&state, -0.0), Some(false));
    assert_eq!(pushed_number_subtype(&state, 9_223_372_036_854_775_808.0), Some(false));
    assert_eq!(pushed_number_subtype(&state, f64::INFINITY), Some(false));
    assert_eq!(pushed_number_subtype(&state, f64::NAN), Some(false));
}

#[test]
fn negative_zero_keeps_its_sign() {
    let state = State::new().unwrap();
    let back = round_trip(&state, &Value::from(-0.0));
    assert!(back.as_number().unwrap().is_sign_negative());
}

#[test]
fn type_codes_match_engine() {
    let state = State::new().unwrap();
    let raw = state.as_ptr();
    for value in [
        Value::Nil,
        Value::from(true),
        Value::from(1),
        Value::from("s"),
        Value::table([(1, 1)]),
        Value::function(noop),
        Value::user_data(vec![0u8]),
    ] {
        unsafe {
            push_value(raw, &value).unwrap();
            assert_eq!(ffi::lua_type(raw, -1), type_code(value.kind()));
            ffi::lua_pop(raw, 1);
        }
    }
}

#[test]
fn push_all_and_read_results() {
    let state = State::new().unwrap();
    let raw = state.as_ptr();
    let values = vec![Value::from(1), Value::Nil, Value::from("three")];
    unsafe {
        let base = ffi::lua_gettop(raw);
        assert_eq!(push_all(raw, &values).unwrap(), 3);
        assert_eq!(read_results(raw, base).unwrap(), values);
        ffi::lua_settop(raw, base);
    }
}

#[test]
fn deeply_nested_table_converts() {
    let state = State::new().unwrap();
    let value = eval_raw(
        &state,
        "local t = {} local cur = t for i = 1, 150 do cur.next = {} cur = cur.next end return t",
    )
    .unwrap();
    let mut depth = 0;
    let mut cur = &value;
    while let Ok(next) = cur.lookup(&Value::from("next")) {
        depth += 1;
        cur = next;
    }
    assert_eq!(depth, 150);
}

fn arb_key() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<bool>().prop_map(Value::from),
        (-1000i32..1000).prop_map(Value::from),
        "[a-z]{1,6}".prop_map(Value::from),
    ]
}

fn arb_value() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Nil),
        any::<bool>().prop_map(Value::from),
        any::<f64>()
            .prop_filter("nan", |n| !n.is_nan())
            .prop_map(Value::from),
        ".{0,8}".prop_map(Value::from),
        prop::collection::vec(any::<u8>(), 0..8).prop_map(|bytes| Value::from(&bytes[..])),
        prop::collection::vec(any::<u8>(), 0..8).prop_map(Value::user_data),
    ];
    leaf.prop_recursive(3, 24, 4, |inner| {
        prop::collection::vec((arb_key(), inner.prop_filter("nil value", |v| !v.is_nil())), 0..4)
            .prop_map(Value::table)
    })
}

proptest! {
    #[test]
    fn pushed_values_read_back_equal(value in arb_value()) {
        let state = State::new().unwrap();
        prop_assert_eq!(round_trip(&state, &value), value);
    }
}
