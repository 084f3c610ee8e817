//! Whole-pipeline tests: source through lexer, parser, bytecode
//! generator and virtual machine, including the serialization path and
//! the CLI runtime.

use core_types::Value;
use integration_tests::{array_values, eval, eval_ok};

#[test]
fn canonical_scenarios() {
    assert_eq!(eval_ok("var x = 1; x += 2; x;"), Value::Integer(3));
    assert_eq!(
        eval_ok("function f(n) { if (n <= 1) return 1; return n * f(n - 1); } f(5);"),
        Value::Integer(120)
    );
    assert_eq!(
        array_values(eval_ok(
            "class A { constructor() { this.x = 1; } } \
             class B extends A { constructor() { super(); this.y = 2; } } \
             var b = new B(); [b.x, b.y, b instanceof A, b instanceof B];"
        )),
        vec![
            Value::Integer(1),
            Value::Integer(2),
            Value::Boolean(true),
            Value::Boolean(true)
        ]
    );
    assert_eq!(
        array_values(eval_ok(
            "var a = []; try { throw \"oops\"; } catch (e) { a.push(e); } \
             finally { a.push(\"fin\"); } a;"
        )),
        vec![Value::string("oops"), Value::string("fin")]
    );
    assert_eq!(
        eval_ok("var sum = 0; for (var i = 0; i < 10; ++i) sum += i; sum;"),
        Value::Integer(45)
    );
    assert_eq!(
        eval_ok("JSON.parse('{\"a\":[1,2,3],\"b\":\"x\"}').a[2];"),
        Value::Integer(3)
    );
}

#[test]
fn larger_program_exercises_the_whole_language() {
    let source = r#"
        class Queue {
            constructor() { this.items = []; }
            enqueue(v) { this.items.push(v); return this; }
            dequeue() { return this.items.shift(); }
            get size() { return this.items.length; }
        }

        function* labels(prefix) {
            var n = 0;
            while (true) {
                n += 1;
                yield `${prefix}-${n}`;
            }
        }

        var q = new Queue();
        var gen = labels("job");
        for (var i = 0; i < 3; ++i) {
            q.enqueue(gen.next().value);
        }

        var seen = [];
        while (q.size > 0) {
            seen.push(q.dequeue());
        }
        seen.join(",");
    "#;
    assert_eq!(eval_ok(source), Value::string("job-1,job-2,job-3"));
}

#[test]
fn compile_then_load_bytecode_file_and_run() {
    let source = "var acc = \"\"; for (let c of \"dcba\") { acc = c + acc; } acc;";
    let program = parser::compile(source).unwrap();
    let bytes = program.to_bytes().unwrap();

    let file = tempfile::NamedTempFile::new().unwrap();
    std::fs::write(file.path(), &bytes).unwrap();

    let mut runtime = mud_cli::Runtime::new(false, false);
    assert_eq!(
        runtime.execute_file(file.path()).unwrap(),
        Value::string("abcd")
    );
}

#[test]
fn corrupted_bytecode_is_rejected() {
    let program = parser::compile("1;").unwrap();
    let mut bytes = program.to_bytes().unwrap();
    bytes[1] ^= 0xFF; // clobber the magic

    let file = tempfile::NamedTempFile::new().unwrap();
    std::fs::write(file.path(), &bytes).unwrap();

    let mut runtime = mud_cli::Runtime::new(false, false);
    let err = runtime.execute_file(file.path()).unwrap_err();
    assert_eq!(err.exit_code(), mud_cli::EXIT_NO_INPUT);
}

#[test]
fn uncaught_exceptions_escape_with_value_and_traceback() {
    let err = eval("function boom() {\n  throw {code: 7};\n}\nboom();").unwrap_err();
    let core_types::MudError::Runtime(e) = err else {
        panic!("expected runtime error");
    };
    let Value::Object(thrown) = &e.thrown else {
        panic!("expected thrown object, got {:?}", e.thrown);
    };
    assert_eq!(thrown.borrow().get_own("code"), Some(Value::Integer(7)));
    assert!(e.traceback.iter().any(|entry| entry.line == 2));
}

#[test]
fn compile_errors_report_position() {
    let err = eval("let = 5;").unwrap_err();
    let core_types::MudError::Compile(e) = err else {
        panic!("expected compile error");
    };
    assert_eq!(e.line, 1);
    assert!(e.column > 1);
}
