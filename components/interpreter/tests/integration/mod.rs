//! End-to-end scenarios: compile, execute, and cross-component
//! properties (bytecode round-trips, invariant checks).

use bytecode_system::Program;
use core_types::Value;
use interpreter::Interpreter;

fn eval(source: &str) -> Value {
    let mut interp = Interpreter::new(false, false);
    interp.initialize_stdlib();
    interp
        .evaluate(source)
        .unwrap_or_else(|e| panic!("evaluation failed for {:?}: {}", source, e))
}

fn array_values(value: Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items.borrow().clone(),
        other => panic!("expected array, got {:?}", other),
    }
}

// The six canonical scenarios.

#[test]
fn scenario_1_compound_assignment() {
    assert_eq!(eval("var x = 1; x += 2; x;"), Value::Integer(3));
}

#[test]
fn scenario_2_recursive_factorial() {
    assert_eq!(
        eval("function f(n) { if (n <= 1) return 1; return n * f(n - 1); } f(5);"),
        Value::Integer(120)
    );
}

#[test]
fn scenario_3_class_inheritance() {
    let result = eval(
        "class A { constructor() { this.x = 1; } } \
         class B extends A { constructor() { super(); this.y = 2; } } \
         var b = new B(); [b.x, b.y, b instanceof A, b instanceof B];",
    );
    assert_eq!(
        array_values(result),
        vec![
            Value::Integer(1),
            Value::Integer(2),
            Value::Boolean(true),
            Value::Boolean(true),
        ]
    );
}

#[test]
fn scenario_4_try_catch_finally() {
    let result = eval(
        "var a = []; try { throw \"oops\"; } catch (e) { a.push(e); } \
         finally { a.push(\"fin\"); } a;",
    );
    assert_eq!(
        array_values(result),
        vec![Value::string("oops"), Value::string("fin")]
    );
}

#[test]
fn scenario_5_loop_sum() {
    assert_eq!(
        eval("var sum = 0; for (var i = 0; i < 10; ++i) sum += i; sum;"),
        Value::Integer(45)
    );
}

#[test]
fn scenario_6_json_parse() {
    assert_eq!(
        eval("JSON.parse('{\"a\":[1,2,3],\"b\":\"x\"}').a[2];"),
        Value::Integer(3)
    );
}

// Cross-component properties.

#[test]
fn serialized_program_executes_identically() {
    let source = "function f(n) { if (n <= 1) return 1; return n * f(n - 1); } f(6);";
    let program = parser::compile(source).unwrap();

    let mut direct = Interpreter::new(false, false);
    direct.initialize_stdlib();
    let expected = direct.run_program(&program).unwrap();

    let bytes = program.to_bytes().unwrap();
    let restored = Program::from_bytes(&bytes).unwrap();
    let mut via_bytes = Interpreter::new(false, false);
    via_bytes.initialize_stdlib();
    let actual = via_bytes.run_program(&restored).unwrap();

    assert_eq!(expected, Value::Integer(720));
    assert_eq!(actual, expected);
}

#[test]
fn bytecode_files_round_trip_through_disk() {
    let source = "var total = 0; for (var i = 1; i <= 4; ++i) { total *= 10; total += i; } total;";
    let program = parser::compile(source).unwrap();
    let bytes = program.to_bytes().unwrap();

    let dir = std::env::temp_dir();
    let path = dir.join(format!("mudscript-it-{}.mdc", std::process::id()));
    std::fs::write(&path, &bytes).unwrap();

    let mut interp = Interpreter::new(false, false);
    interp.initialize_stdlib();
    let result = interp.evaluate_file(&path);
    std::fs::remove_file(&path).ok();
    assert_eq!(result.unwrap(), Value::Integer(1234));
}

#[test]
fn scope_depth_balances_on_all_exit_paths() {
    // Loops that exit via break, continue and exception must leave the
    // environment balanced; observable as outer bindings still working
    let result = eval(
        "var log = []; \
         for (var i = 0; i < 3; ++i) { let inner = i; if (i == 1) continue; log.push(inner); } \
         while (true) { let z = 9; log.push(z); break; } \
         try { for (var j = 0; j < 3; ++j) { let k = j; if (j == 1) throw \"stop\"; } } \
         catch (e) { log.push(e); } \
         log;",
    );
    assert_eq!(
        array_values(result),
        vec![
            Value::Integer(0),
            Value::Integer(2),
            Value::Integer(9),
            Value::string("stop"),
        ]
    );
}

#[test]
fn finally_runs_when_break_exits_its_try() {
    let result = eval(
        "var log = []; \
         while (true) { try { log.push(\"t\"); break; } finally { log.push(\"fin\"); } } \
         log;",
    );
    assert_eq!(
        array_values(result),
        vec![Value::string("t"), Value::string("fin")]
    );
}

#[test]
fn finally_runs_when_continue_exits_its_try() {
    let result = eval(
        "var log = []; \
         for (var i = 0; i < 3; ++i) { \
             try { if (i == 1) continue; log.push(i); } \
             finally { log.push(\"f\" + i); } \
         } \
         log;",
    );
    assert_eq!(
        array_values(result),
        vec![
            Value::Integer(0),
            Value::string("f0"),
            Value::string("f1"),
            Value::Integer(2),
            Value::string("f2"),
        ]
    );
}

#[test]
fn break_out_of_nested_tries_runs_each_finally_innermost_first() {
    let result = eval(
        "var log = []; \
         while (true) { \
             try { try { break; } finally { log.push(\"inner\"); } } \
             finally { log.push(\"outer\"); } \
         } \
         log;",
    );
    assert_eq!(
        array_values(result),
        vec![Value::string("inner"), Value::string("outer")]
    );
}

#[test]
fn try_data_balances_when_break_exits_a_try() {
    // The loop's try must not linger on the try-data stack: a later
    // unrelated throw dispatches to its own handler with a clean stack
    let result = eval(
        "var log = []; \
         while (true) { try { break; } finally { log.push(\"fin\"); } } \
         try { throw \"x\"; } catch (e) { log.push(e); } \
         log;",
    );
    assert_eq!(
        array_values(result),
        vec![Value::string("fin"), Value::string("x")]
    );

    // And with no handler at all, the throw escapes to the host
    let mut interp = Interpreter::new(false, false);
    interp.initialize_stdlib();
    let err = interp
        .evaluate("while (true) { try { break; } finally { } } throw \"escapes\";")
        .unwrap_err();
    let core_types::MudError::Runtime(e) = err else {
        panic!("expected a runtime error to escape");
    };
    assert_eq!(e.thrown, Value::string("escapes"));
}

#[test]
fn try_data_balances_across_nested_tries() {
    let result = eval(
        "var log = []; \
         try { \
             try { throw \"inner\"; } catch (e) { log.push(e); } \
             log.push(\"after\"); \
             throw \"outer\"; \
         } catch (e) { log.push(e); } \
         log;",
    );
    assert_eq!(
        array_values(result),
        vec![
            Value::string("inner"),
            Value::string("after"),
            Value::string("outer"),
        ]
    );
}

#[test]
fn call_stack_effects_balance() {
    // Deep call chains returning through both CALL and NEW leave exactly
    // one result on the operand stack
    assert_eq!(
        eval(
            "function wrap(v) { return {v: v}; } \
             class Holder { constructor(v) { this.v = v; } } \
             wrap(new Holder(wrap(new Holder(5)).v.v).v).v;"
        ),
        Value::Integer(5)
    );
}

#[test]
fn mixed_program_with_many_features() {
    let result = eval(
        "class Shape { constructor(name) { this.name = name; } \
             describe() { return this.name + \":\" + this.area(); } } \
         class Rect extends Shape { \
             constructor(w, h) { super(\"rect\"); this.w = w; this.h = h; } \
             area() { return this.w * this.h; } } \
         class Circle extends Shape { \
             constructor(r) { super(\"circle\"); this.r = r; } \
             area() { return Math.floor(Math.PI * this.r * this.r); } } \
         var shapes = [new Rect(2, 3), new Circle(1)]; \
         shapes.map(function(s) { return s.describe(); }).join(\",\");",
    );
    assert_eq!(result, Value::string("rect:6,circle:3"));
}

#[test]
fn generators_interleave_with_main_flow() {
    let result = eval(
        "function* fib() { let a = 0; let b = 1; \
             while (true) { yield a; let t = a + b; a = b; b = t; } } \
         var it = fib(); var out = []; \
         for (var i = 0; i < 7; ++i) { out.push(it.next().value); } \
         out.join(\",\");",
    );
    assert_eq!(result, Value::string("0,1,1,2,3,5,8"));
}
