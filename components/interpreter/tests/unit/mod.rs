//! Language-semantics tests driven through the embedding facade.

use core_types::{MudError, Value};
use interpreter::Interpreter;

fn eval(source: &str) -> Value {
    let mut interp = Interpreter::new(false, false);
    interp.initialize_stdlib();
    interp
        .evaluate(source)
        .unwrap_or_else(|e| panic!("evaluation failed for {:?}: {}", source, e))
}

fn eval_err(source: &str) -> MudError {
    let mut interp = Interpreter::new(false, false);
    interp.initialize_stdlib();
    match interp.evaluate(source) {
        Ok(v) => panic!("expected {:?} to fail, got {:?}", source, v),
        Err(e) => e,
    }
}

fn runtime_message(err: MudError) -> String {
    match err {
        MudError::Runtime(e) => e.message,
        other => panic!("expected runtime error, got {}", other),
    }
}

fn array_values(value: Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items.borrow().clone(),
        other => panic!("expected array, got {:?}", other),
    }
}

// ---- numbers and operators ----

#[test]
fn integer_arithmetic_stays_integer() {
    assert_eq!(eval("1 + 2;"), Value::Integer(3));
    assert_eq!(eval("6 / 3;"), Value::Integer(2));
    assert_eq!(eval("2 ** 10;"), Value::Integer(1024));
    assert_eq!(eval("7 % 4;"), Value::Integer(3));
}

#[test]
fn inexact_division_promotes() {
    assert_eq!(eval("7 / 2;"), Value::Double(3.5));
    assert_eq!(eval("1 / 0;"), Value::Double(f64::INFINITY));
    assert!(matches!(eval("0 / 0;"), Value::Double(d) if d.is_nan()));
}

#[test]
fn mixed_arithmetic_promotes() {
    assert_eq!(eval("1 + 0.5;"), Value::Double(1.5));
    assert_eq!(eval("2 * 2.5;"), Value::Double(5.0));
}

#[test]
fn integer_overflow_wraps() {
    assert_eq!(
        eval("9223372036854775807 + 1;"),
        Value::Integer(i64::MIN)
    );
}

#[test]
fn string_plus_concatenates() {
    assert_eq!(eval("\"n=\" + 3;"), Value::string("n=3"));
    assert_eq!(eval("1 + \"2\";"), Value::string("12"));
}

#[test]
fn bitwise_uses_32_bit_semantics() {
    assert_eq!(eval("1 << 33;"), Value::Integer(2));
    assert_eq!(eval("-1 >>> 0;"), Value::Integer(4294967295));
    assert_eq!(eval("-8 >> 1;"), Value::Integer(-4));
    assert_eq!(eval("~0;"), Value::Integer(-1));
    assert_eq!(eval("6 & 3;"), Value::Integer(2));
    assert_eq!(eval("6 | 1;"), Value::Integer(7));
    assert_eq!(eval("6 ^ 3;"), Value::Integer(5));
}

#[test]
fn comparison_rules() {
    assert_eq!(eval("1 < 2;"), Value::Boolean(true));
    assert_eq!(eval("\"b\" > \"a\";"), Value::Boolean(true));
    assert_eq!(eval("\"10\" > 9;"), Value::Boolean(true));
    assert_eq!(eval("undefined < 1;"), Value::Boolean(false));
    assert_eq!(eval("undefined >= 1;"), Value::Boolean(false));
}

#[test]
fn loose_and_strict_equality() {
    assert_eq!(eval("1 == \"1\";"), Value::Boolean(true));
    assert_eq!(eval("1 === \"1\";"), Value::Boolean(false));
    assert_eq!(eval("null == undefined;"), Value::Boolean(true));
    assert_eq!(eval("null === undefined;"), Value::Boolean(false));
    assert_eq!(eval("1 == 1.0;"), Value::Boolean(true));
    assert_eq!(eval("1 === 1.0;"), Value::Boolean(false));
    assert_eq!(eval("true == 1;"), Value::Boolean(true));
    assert_eq!(eval("NaN == NaN;"), Value::Boolean(false));
    assert_eq!(eval("1 != 2;"), Value::Boolean(true));
    assert_eq!(eval("1 !== 1.0;"), Value::Boolean(true));
}

#[test]
fn typeof_yields_the_nine_strings() {
    assert_eq!(eval("typeof undefined;"), Value::string("undefined"));
    assert_eq!(eval("typeof null;"), Value::string("null"));
    assert_eq!(eval("typeof true;"), Value::string("boolean"));
    assert_eq!(eval("typeof 1;"), Value::string("integer"));
    assert_eq!(eval("typeof 1.5;"), Value::string("double"));
    assert_eq!(eval("typeof \"s\";"), Value::string("string"));
    assert_eq!(eval("typeof [];"), Value::string("array"));
    assert_eq!(eval("typeof function() {};"), Value::string("function"));
    assert_eq!(eval("typeof {};"), Value::string("object"));
}

#[test]
fn typeof_undeclared_identifier_raises() {
    let message = runtime_message(eval_err("typeof nope;"));
    assert!(message.contains("not declared"), "got: {}", message);
}

#[test]
fn ternary_and_logical_short_circuit() {
    assert_eq!(eval("1 ? \"a\" : \"b\";"), Value::string("a"));
    assert_eq!(eval("0 ? \"a\" : \"b\";"), Value::string("b"));
    assert_eq!(eval("false && nope();"), Value::Boolean(false));
    assert_eq!(eval("true || nope();"), Value::Boolean(true));
    assert_eq!(eval("0 || \"fallback\";"), Value::string("fallback"));
    assert_eq!(eval("1 && 2;"), Value::Integer(2));
}

#[test]
fn nullish_only_replaces_undefined_and_null() {
    assert_eq!(eval("undefined ?? 5;"), Value::Integer(5));
    assert_eq!(eval("null ?? 5;"), Value::Integer(5));
    assert_eq!(eval("0 ?? 5;"), Value::Integer(0));
    assert_eq!(eval("false ?? 5;"), Value::Boolean(false));
    assert_eq!(eval("\"\" ?? 5;"), Value::string(""));
}

// ---- variables and scope ----

#[test]
fn declarations_and_shadowing() {
    assert_eq!(eval("let x = 1; { let x = 2; } x;"), Value::Integer(1));
    assert_eq!(eval("let x = 1; { x = 2; } x;"), Value::Integer(2));
}

#[test]
fn redeclaration_in_same_scope_raises() {
    let message = runtime_message(eval_err("let x = 1; let x = 2;"));
    assert!(message.contains("already declared"), "got: {}", message);
}

#[test]
fn const_assignment_raises() {
    let message = runtime_message(eval_err("const k = 1; k = 2;"));
    assert!(message.contains("const"), "got: {}", message);
}

#[test]
fn var_targets_the_global_environment() {
    assert_eq!(
        eval("function set() { var g = 41; } set(); g + 1;"),
        Value::Integer(42)
    );
}

#[test]
fn assigning_undefined_unbinds() {
    let message = runtime_message(eval_err("var x = 1; x = undefined; x;"));
    assert!(message.contains("not declared"), "got: {}", message);
}

#[test]
fn assignment_is_an_expression() {
    assert_eq!(eval("var x; var y = (x = 7); y;"), Value::Integer(7));
}

#[test]
fn compound_assignment_operators() {
    assert_eq!(eval("var x = 8; x += 2; x -= 1; x *= 3; x;"), Value::Integer(27));
    assert_eq!(eval("var b = 6; b &= 3; b;"), Value::Integer(2));
    assert_eq!(eval("var s = \"a\"; s += \"b\"; s;"), Value::string("ab"));
}

#[test]
fn logical_assignment_operators() {
    assert_eq!(eval("var a = 0; a ||= 5; a;"), Value::Integer(5));
    assert_eq!(eval("var b = 1; b &&= 5; b;"), Value::Integer(5));
    assert_eq!(eval("var c = null; c ??= 5; c;"), Value::Integer(5));
    assert_eq!(eval("var d = 0; d ??= 5; d;"), Value::Integer(0));
}

#[test]
fn increment_and_decrement() {
    assert_eq!(eval("var i = 1; ++i;"), Value::Integer(2));
    assert_eq!(eval("var i = 1; i++;"), Value::Integer(1));
    assert_eq!(eval("var i = 1; i++; i;"), Value::Integer(2));
    assert_eq!(eval("var i = 1; --i; i;"), Value::Integer(0));
    assert_eq!(
        eval("var o = {n: 5}; o.n++; o.n;"),
        Value::Integer(6)
    );
    assert_eq!(
        eval("var a = [5]; --a[0]; a[0];"),
        Value::Integer(4)
    );
}

// ---- strings ----

#[test]
fn string_length_is_byte_length() {
    assert_eq!(eval("\"abc\".length;"), Value::Integer(3));
    // é is two bytes in UTF-8
    assert_eq!(eval("\"é\".length;"), Value::Integer(2));
}

#[test]
fn string_indexing_is_by_code_point() {
    assert_eq!(eval("\"héllo\"[1];"), Value::string("é"));
    assert_eq!(eval("\"abc\"[-1];"), Value::string("c"));
}

#[test]
fn string_index_out_of_range_raises() {
    let message = runtime_message(eval_err("\"abc\"[3];"));
    assert!(message.contains("out of range"), "got: {}", message);
}

#[test]
fn string_methods() {
    assert_eq!(eval("\"a,b,c\".split(\",\").length;"), Value::Integer(3));
    assert_eq!(eval("\"hello\".toUpperCase();"), Value::string("HELLO"));
    assert_eq!(eval("\"  x \".trim();"), Value::string("x"));
    assert_eq!(eval("\"abcdef\".slice(1, 3);"), Value::string("bc"));
    assert_eq!(eval("\"ab\".repeat(3);"), Value::string("ababab"));
    assert_eq!(eval("\"7\".padStart(3, \"0\");"), Value::string("007"));
    assert_eq!(eval("\"abc\".indexOf(\"b\");"), Value::Integer(1));
    assert_eq!(eval("\"abc\".includes(\"z\");"), Value::Boolean(false));
}

// ---- arrays ----

#[test]
fn array_indexing_and_negatives() {
    assert_eq!(eval("[1, 2, 3][0];"), Value::Integer(1));
    assert_eq!(eval("[1, 2, 3][-1];"), Value::Integer(3));
    assert_eq!(eval("[1, 2, 3][-3];"), Value::Integer(1));
    assert_eq!(
        eval("var a = [1, 2, 3]; a[-1] = 9; a[2];"),
        Value::Integer(9)
    );
}

#[test]
fn array_out_of_range_raises() {
    assert!(runtime_message(eval_err("[1, 2, 3][3];")).contains("out of range"));
    assert!(runtime_message(eval_err("[1, 2, 3][-4];")).contains("out of range"));
}

#[test]
fn arrays_share_by_reference() {
    assert_eq!(
        eval("var a = [1]; var b = a; b.push(2); a.length;"),
        Value::Integer(2)
    );
}

#[test]
fn array_methods() {
    assert_eq!(eval("[1, 2, 3].join(\"-\");"), Value::string("1-2-3"));
    assert_eq!(
        eval("[1, 2, 3].map(function(x) { return x * 2; })[2];"),
        Value::Integer(6)
    );
    assert_eq!(
        eval("[1, 2, 3, 4].filter(function(x) { return x % 2 == 0; }).length;"),
        Value::Integer(2)
    );
    assert_eq!(
        eval("[1, 2, 3].reduce(function(a, b) { return a + b; }, 10);"),
        Value::Integer(16)
    );
    assert_eq!(eval("[3, 1, 2].sort()[0];"), Value::Integer(1));
    assert_eq!(
        eval("[1, 2, 3].indexOf(2);"),
        Value::Integer(1)
    );
    assert_eq!(
        eval("[1, 2].concat([3], 4).length;"),
        Value::Integer(4)
    );
}

// ---- objects and prototypes ----

#[test]
fn object_literal_and_member_access() {
    assert_eq!(eval("var o = {a: 1, b: 2}; o.a + o[\"b\"];"), Value::Integer(3));
    assert_eq!(eval("var o = {}; o.x = 5; o.x;"), Value::Integer(5));
    assert_eq!(eval("({a: 1}).missing;"), Value::Undefined);
}

#[test]
fn object_field_order_is_insertion_order() {
    let keys = array_values(eval("Object.keys({z: 1, a: 2, m: 3});"));
    assert_eq!(
        keys,
        vec![Value::string("z"), Value::string("a"), Value::string("m")]
    );
}

#[test]
fn prototype_reads_walk_the_chain_writes_do_not() {
    assert_eq!(
        eval("var p = {shared: 7}; var o = Object.create(p); o.shared;"),
        Value::Integer(7)
    );
    assert_eq!(
        eval(
            "var p = {shared: 7}; var o = Object.create(p); o.shared = 9; \
             [o.shared, p.shared][1];"
        ),
        Value::Integer(7)
    );
}

#[test]
fn object_literal_accessors() {
    assert_eq!(
        eval(
            "var o = {_x: 1, get x() { return this._x; }, set x(v) { this._x = v * 2; }}; \
             o.x = 5; o.x;"
        ),
        Value::Integer(10)
    );
}

#[test]
fn has_own_property_and_delete() {
    assert_eq!(eval("({a: 1}).hasOwnProperty(\"a\");"), Value::Boolean(true));
    assert_eq!(
        eval("var o = {a: 1}; delete o.a; o.hasOwnProperty(\"a\");"),
        Value::Boolean(false)
    );
    assert_eq!(eval("var o = {a: 1}; delete o.b;"), Value::Boolean(false));
}

#[test]
fn member_access_on_non_object_raises() {
    assert!(runtime_message(eval_err("null.x;")).contains("null"));
    assert!(runtime_message(eval_err("undefined.x;")).contains("undefined"));
    assert!(runtime_message(eval_err("(5).x;")).contains("integer"));
}

// ---- functions and closures ----

#[test]
fn closures_capture_their_environment() {
    assert_eq!(
        eval(
            "function counter() { let n = 0; return function() { n += 1; return n; }; } \
             var c = counter(); c(); c();"
        ),
        Value::Integer(2)
    );
}

#[test]
fn two_closures_do_not_share_locals() {
    assert_eq!(
        eval(
            "function counter() { let n = 0; return function() { n += 1; return n; }; } \
             var a = counter(); var b = counter(); a(); a(); b();"
        ),
        Value::Integer(1)
    );
}

#[test]
fn call_apply_bind() {
    assert_eq!(
        eval("function me() { return this; } me.call(7);"),
        Value::Integer(7)
    );
    assert_eq!(
        eval("function add(a, b) { return a + b; } add.apply(undefined, [2, 3]);"),
        Value::Integer(5)
    );
    assert_eq!(
        eval("function me() { return this; } var bound = me.bind(\"t\"); bound();"),
        Value::string("t")
    );
}

#[test]
fn missing_arguments_are_undefined() {
    assert_eq!(
        eval("function f(a, b) { return typeof b; } f(1);"),
        Value::string("undefined")
    );
}

#[test]
fn calling_a_non_function_raises() {
    assert!(runtime_message(eval_err("var x = 5; x();")).contains("cannot call"));
}

// ---- control flow ----

#[test]
fn loops() {
    assert_eq!(
        eval("var s = 0; var i = 0; while (i < 5) { s += i; i += 1; } s;"),
        Value::Integer(10)
    );
    assert_eq!(
        eval("var n = 0; do { n += 1; } while (n < 3); n;"),
        Value::Integer(3)
    );
    assert_eq!(
        eval("var s = 0; for (var i = 0; i < 4; ++i) { s += i; } s;"),
        Value::Integer(6)
    );
}

#[test]
fn break_and_continue() {
    assert_eq!(
        eval("var s = 0; for (var i = 0; i < 10; ++i) { if (i == 3) break; s += i; } s;"),
        Value::Integer(3)
    );
    assert_eq!(
        eval("var s = 0; for (var i = 0; i < 5; ++i) { if (i % 2 == 0) continue; s += i; } s;"),
        Value::Integer(4)
    );
    assert_eq!(
        eval("var n = 0; while (true) { n += 1; if (n > 2) { break; } } n;"),
        Value::Integer(3)
    );
}

#[test]
fn for_of_and_for_in() {
    assert_eq!(
        eval("var s = 0; for (let v of [1, 2, 3]) { s += v; } s;"),
        Value::Integer(6)
    );
    assert_eq!(
        eval("var out = \"\"; for (let c of \"abc\") { out += c; } out;"),
        Value::string("abc")
    );
    assert_eq!(
        eval("var out = \"\"; for (let k in {x: 1, y: 2}) { out += k; } out;"),
        Value::string("xy")
    );
}

#[test]
fn break_out_of_for_of_is_scope_balanced() {
    assert_eq!(
        eval(
            "var seen = 0; for (let v of [1, 2, 3, 4]) { seen += 1; if (v == 2) break; } seen;"
        ),
        Value::Integer(2)
    );
}

#[test]
fn switch_dispatch_and_fallthrough() {
    assert_eq!(
        eval(
            "function pick(x) { switch (x) { case 1: return \"one\"; case 2: return \"two\"; \
             default: return \"many\"; } } pick(2);"
        ),
        Value::string("two")
    );
    assert_eq!(
        eval(
            "function pick(x) { switch (x) { case 1: return \"one\"; default: return \"many\"; } } \
             pick(9);"
        ),
        Value::string("many")
    );
    // Fallthrough without break
    assert_eq!(
        eval(
            "var log = \"\"; switch (1) { case 1: log += \"a\"; case 2: log += \"b\"; break; \
             case 3: log += \"c\"; } log;"
        ),
        Value::string("ab")
    );
    // Strict matching: 1.0 does not hit case 1
    assert_eq!(
        eval("var hit = \"none\"; switch (1.0) { case 1: hit = \"int\"; break; } hit;"),
        Value::string("none")
    );
}

// ---- exceptions ----

#[test]
fn try_catch_receives_the_thrown_value() {
    assert_eq!(
        eval("var got; try { throw 42; } catch (e) { got = e; } got;"),
        Value::Integer(42)
    );
}

#[test]
fn finally_runs_on_both_paths() {
    assert_eq!(
        eval(
            "var log = \"\"; try { log += \"t\"; } catch (e) { log += \"c\"; } \
             finally { log += \"f\"; } log;"
        ),
        Value::string("tf")
    );
    assert_eq!(
        eval(
            "var log = \"\"; try { throw \"x\"; } catch (e) { log += \"c\"; } \
             finally { log += \"f\"; } log;"
        ),
        Value::string("cf")
    );
}

#[test]
fn pure_finally_rethrows_in_flight_exception() {
    assert_eq!(
        eval(
            "var log = \"\"; try { try { throw \"boom\"; } finally { log += \"f\"; } } \
             catch (e) { log += e; } log;"
        ),
        Value::string("fboom")
    );
}

#[test]
fn exceptions_unwind_across_frames() {
    assert_eq!(
        eval(
            "function inner() { throw \"deep\"; } function outer() { inner(); } \
             var got; try { outer(); } catch (e) { got = e; } got;"
        ),
        Value::string("deep")
    );
}

#[test]
fn operand_stack_restored_by_unwinder() {
    // The raise happens mid-expression; the catch block must still see a
    // consistent stack
    assert_eq!(
        eval("var r; try { r = 1 + nope(); } catch (e) { r = 9; } r;"),
        Value::Integer(9)
    );
}

#[test]
fn uncaught_exception_carries_a_traceback() {
    let err = eval_err("function f() {\n  throw \"bad\";\n}\nf();");
    let MudError::Runtime(e) = err else {
        panic!("expected runtime error");
    };
    assert_eq!(e.thrown, Value::string("bad"));
    assert!(e.traceback.len() >= 2);
    assert_eq!(e.traceback[0].line, 2);
    assert!(e.traceback[0].source.contains("throw"));
}

#[test]
fn thrown_error_objects() {
    assert_eq!(
        eval(
            "var got; try { throw new TypeError(\"bad\"); } catch (e) { got = e.message; } got;"
        ),
        Value::string("bad")
    );
    assert_eq!(
        eval(
            "var ok; try { throw new TypeError(\"x\"); } catch (e) { ok = e instanceof Error; } ok;"
        ),
        Value::Boolean(true)
    );
}

// ---- classes ----

#[test]
fn class_methods_and_this() {
    assert_eq!(
        eval(
            "class Point { constructor(x, y) { this.x = x; this.y = y; } \
             sum() { return this.x + this.y; } } new Point(3, 4).sum();"
        ),
        Value::Integer(7)
    );
}

#[test]
fn class_getters_and_setters() {
    assert_eq!(
        eval(
            "class Box { constructor() { this._v = 0; } get value() { return this._v; } \
             set value(v) { this._v = v + 1; } } \
             var b = new Box(); b.value = 5; b.value;"
        ),
        Value::Integer(6)
    );
}

#[test]
fn class_statics_live_on_the_constructor() {
    assert_eq!(
        eval("class Util { static twice(n) { return n * 2; } } Util.twice(21);"),
        Value::Integer(42)
    );
}

#[test]
fn super_method_calls() {
    assert_eq!(
        eval(
            "class A { greet() { return \"A\"; } } \
             class B extends A { greet() { return super.greet() + \"B\"; } } \
             new B().greet();"
        ),
        Value::string("AB")
    );
}

#[test]
fn default_constructor_of_derived_class_calls_super() {
    assert_eq!(
        eval(
            "class A { constructor() { this.x = 1; } } class B extends A {} new B().x;"
        ),
        Value::Integer(1)
    );
}

#[test]
fn instanceof_walks_the_chain() {
    assert_eq!(
        eval("class A {} class B extends A {} var b = new B(); b instanceof A;"),
        Value::Boolean(true)
    );
    assert_eq!(
        eval("class A {} class C {} var a = new A(); a instanceof C;"),
        Value::Boolean(false)
    );
}

// ---- templates, destructuring, regex ----

#[test]
fn template_literals_interpolate() {
    assert_eq!(eval("let n = 3; `n=${n + 1}!`;"), Value::string("n=4!"));
    assert_eq!(eval("`${1}${2}`;"), Value::string("12"));
}

#[test]
fn destructuring_assignment() {
    assert_eq!(
        eval("var a; var b; [a, b] = [1, 2]; a + b;"),
        Value::Integer(3)
    );
    assert_eq!(
        eval("var a; var b; [a, b = 9] = [1, undefined]; b;"),
        Value::Integer(9)
    );
    assert_eq!(
        eval("var x; var y; ({a: x, b: y} = {a: 1, b: 2}); x + y;"),
        Value::Integer(3)
    );
}

#[test]
fn regex_literals_instantiate_regexp() {
    assert_eq!(eval("/\\d+/.test(\"abc123\");"), Value::Boolean(true));
    assert_eq!(eval("/z/.test(\"abc\");"), Value::Boolean(false));
    assert_eq!(eval("/ABC/i.test(\"xabcy\");"), Value::Boolean(true));
    assert_eq!(eval("/(\\w+)-(\\d+)/.exec(\"it-5\")[2];"), Value::string("5"));
}

// ---- stdlib ----

#[test]
fn math_object() {
    assert_eq!(eval("Math.abs(-4);"), Value::Integer(4));
    assert_eq!(eval("Math.floor(2.9);"), Value::Double(2.0));
    assert_eq!(eval("Math.max(1, 7, 3);"), Value::Double(7.0));
}

#[test]
fn json_round_trip() {
    assert_eq!(
        eval("JSON.parse(JSON.stringify({a: [1, 2, 3], b: \"x\"})).a[2];"),
        Value::Integer(3)
    );
    assert_eq!(
        eval("JSON.stringify([1, \"two\", null, true]);"),
        Value::string("[1,\"two\",null,true]")
    );
}

#[test]
fn map_class() {
    assert_eq!(
        eval(
            "var m = new Map(); m.set(\"a\", 1).set(\"b\", 2); m.get(\"b\") + m.size;"
        ),
        Value::Integer(4)
    );
    assert_eq!(
        eval("var m = new Map(); m.set(1, \"x\"); m.has(1.0);"),
        Value::Boolean(false)
    );
}

#[test]
fn parse_functions() {
    assert_eq!(eval("parseInt(\"42px\");"), Value::Integer(42));
    assert_eq!(eval("parseInt(\"ff\", 16);"), Value::Integer(255));
    assert_eq!(eval("parseFloat(\"2.5rem\");"), Value::Double(2.5));
    assert_eq!(eval("isNaN(\"zap\");"), Value::Boolean(true));
    assert_eq!(eval("isFinite(1);"), Value::Boolean(true));
}

#[test]
fn isdefined_checks_bindings() {
    assert_eq!(eval("var present = 1; isdefined(\"present\");"), Value::Boolean(true));
    assert_eq!(eval("isdefined(\"absent\");"), Value::Boolean(false));
}

#[test]
fn date_decomposition() {
    assert_eq!(
        eval("new Date(1614834367000).getFullYear();"),
        Value::Integer(2021)
    );
}

// ---- generators and fibers ----

#[test]
fn generators_yield_and_resume() {
    assert_eq!(
        eval("function* g() { yield 1; yield 2; } var it = g(); it.next(); it.next().value;"),
        Value::Integer(2)
    );
    assert_eq!(
        eval("function* g() { yield 1; } var it = g(); it.next(); it.next().done;"),
        Value::Boolean(true)
    );
}

#[test]
fn generator_receives_sent_values() {
    assert_eq!(
        eval(
            "function* g() { let a = yield 1; yield a + 1; } \
             var it = g(); it.next(); it.next(10).value;"
        ),
        Value::Integer(11)
    );
}

#[test]
fn generator_return_finishes() {
    assert_eq!(
        eval(
            "function* g() { yield 1; yield 2; } var it = g(); it.next(); \
             it.return(9); it.done;"
        ),
        Value::Boolean(true)
    );
}

#[test]
fn generator_loop_collects_values() {
    assert_eq!(
        eval(
            "function* seq(n) { for (var i = 0; i < n; ++i) { yield i; } } \
             var it = seq(4); var s = 0; var r = it.next(); \
             while (!r.done) { s += r.value; r = it.next(); } s;"
        ),
        Value::Integer(6)
    );
}

#[test]
fn timers_run_in_deadline_order() {
    let mut interp = Interpreter::new(false, false);
    interp.initialize_stdlib();
    interp
        .evaluate(
            "var log = []; \
             setTimeout(function() { log.push(2); }, 25); \
             setTimeout(function() { log.push(1); }, 0);",
        )
        .unwrap();
    interp.run_fibers();
    let log = array_values(interp.evaluate("log;").unwrap());
    assert_eq!(log, vec![Value::Integer(1), Value::Integer(2)]);
}

#[test]
fn clear_timeout_cancels_pending_timers() {
    let mut interp = Interpreter::new(false, false);
    interp.initialize_stdlib();
    interp
        .evaluate(
            "var log = []; var h = setTimeout(function() { log.push(\"x\"); }, 5); \
             var cancelled = clearTimeout(h);",
        )
        .unwrap();
    interp.run_fibers();
    assert_eq!(
        interp.evaluate("cancelled;").unwrap(),
        Value::Boolean(true)
    );
    assert!(array_values(interp.evaluate("log;").unwrap()).is_empty());
}

#[test]
fn fibers_spawned_during_drain_also_run() {
    let mut interp = Interpreter::new(false, false);
    interp.initialize_stdlib();
    interp
        .evaluate(
            "var log = []; \
             setTimeout(function() { log.push(\"outer\"); \
                 setTimeout(function() { log.push(\"inner\"); }, 0); }, 0);",
        )
        .unwrap();
    interp.run_fibers();
    let log = array_values(interp.evaluate("log;").unwrap());
    assert_eq!(log, vec![Value::string("outer"), Value::string("inner")]);
}

// ---- host facade ----

#[test]
fn globals_persist_across_evaluations() {
    let mut interp = Interpreter::new(false, false);
    interp.initialize_stdlib();
    interp.evaluate("function triple(n) { return n * 3; }").unwrap();
    assert_eq!(interp.evaluate("triple(7);").unwrap(), Value::Integer(21));
}

#[test]
fn force_set_global_bypasses_declaration_rules() {
    let mut interp = Interpreter::new(false, false);
    interp.initialize_stdlib();
    interp.force_set_global("answer", Value::Integer(42), true);
    assert_eq!(interp.evaluate("answer;").unwrap(), Value::Integer(42));
    // const flag enforced on script assignment
    assert!(interp.evaluate("answer = 1;").is_err());
}

#[test]
fn host_can_call_script_functions() {
    let mut interp = Interpreter::new(false, false);
    interp.initialize_stdlib();
    interp.evaluate("function add(a, b) { return a + b; }").unwrap();
    let f = interp.globals().lookup("add").expect("add bound");
    let result = interp
        .call_function(&f, &Value::Undefined, &[Value::Integer(2), Value::Integer(5)])
        .unwrap();
    assert_eq!(result, Value::Integer(7));
}
