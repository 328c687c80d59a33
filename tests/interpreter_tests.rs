//! Language and builtin behavior of the sandboxed interpreter

mod common;
use common::{d, run_js, run_js_string};
use kata::runtime::Runtime;
use kata::Datum;
use pretty_assertions::assert_eq;
use serde_json::json;

fn value(code: &str) -> Datum {
    run_js(code).unwrap_or_else(|e| panic!("{} failed: {}", code, e))
}

mod language {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_arithmetic_and_coercion() {
        assert_eq!(value("return 1 + 2 * 3"), d(json!(7)));
        assert_eq!(value("return '3' + 4"), d(json!("34")));
        assert_eq!(value("return '3' * '4'"), d(json!(12)));
        assert_eq!(value("return 2 ** 10"), d(json!(1024)));
        assert_eq!(value("return 7 % 3"), d(json!(1)));
        assert_eq!(value("return 0.1 + 0.2 === 0.3"), d(json!(false)));
        assert_eq!(value("return null == undefined"), d(json!(true)));
        assert_eq!(value("return null === undefined"), d(json!(false)));
    }

    #[test]
    fn test_async_words_as_identifiers() {
        assert_eq!(
            value("const async = 5; const await = 1; return async + await"),
            d(json!(6))
        );
        assert!(run_js_string("async function f() {}").starts_with("Error: 'async' is not supported"));
    }

    #[test]
    fn test_completion_value_without_return() {
        assert_eq!(value("let x = 20; x + 22"), d(json!(42)));
    }

    #[test]
    fn test_let_const_and_blocks() {
        assert_eq!(
            value("let a = 1; { let a = 2; } return a"),
            d(json!(1))
        );
        assert_eq!(
            run_js_string("const c = 1; c = 2;"),
            "Error: Assignment to constant variable."
        );
    }

    #[test]
    fn test_functions_and_closures() {
        let code = r#"
            function counter() {
                let count = 0;
                return () => ++count;
            }
            const next = counter();
            next(); next();
            return next();
        "#;
        assert_eq!(value(code), d(json!(3)));
    }

    #[test]
    fn test_default_and_rest_parameters() {
        let code = r#"
            function greet(name = 'world', ...rest) { return `hello ${name} ${rest.length}`; }
            return [greet(), greet('kata', 1, 2)];
        "#;
        assert_eq!(value(code), d(json!(["hello world 0", "hello kata 2"])));
    }

    #[test]
    fn test_destructuring_and_spread() {
        let code = r#"
            const { a, b: { c = 5 } = {}, ...others } = { a: 1, b: {}, x: 2, y: 3 };
            const [first, , third = 'none', ...tail] = [10, 20];
            const merged = { ...others, a, c, first, third, tail };
            return merged;
        "#;
        assert_eq!(
            value(code),
            d(json!({"x": 2, "y": 3, "a": 1, "c": 5, "first": 10, "third": "none", "tail": []}))
        );
    }

    #[test]
    fn test_loops() {
        let code = r#"
            let total = 0;
            for (let i = 0; i < 5; i++) { if (i === 3) continue; total += i; }
            for (const x of [10, 20]) total += x;
            for (const key in { p: 1, q: 2 }) total += key.length;
            let n = 0;
            while (true) { if (++n > 3) break; }
            do { n--; } while (n > 0);
            return [total, n];
        "#;
        assert_eq!(value(code), d(json!([39, 0])));
    }

    #[test]
    fn test_switch_and_labels() {
        let code = r#"
            const out = [];
            outer: for (let i = 0; i < 3; i++) {
                for (let j = 0; j < 3; j++) {
                    if (j === 1) continue outer;
                    if (i === 2) break outer;
                    out.push(`${i}${j}`);
                }
            }
            switch (out.length) {
                case 1: out.push('one');
                case 2: out.push('two'); break;
                default: out.push('many');
            }
            return out;
        "#;
        assert_eq!(value(code), d(json!(["00", "10", "two"])));
    }

    #[test]
    fn test_try_catch_finally() {
        let code = r#"
            const log = [];
            try {
                null.x;
            } catch (e) {
                log.push(e instanceof TypeError, e.name);
            } finally {
                log.push('done');
            }
            try { throw { code: 7 }; } catch ({ code }) { log.push(code); }
            return log;
        "#;
        assert_eq!(value(code), d(json!([true, "TypeError", "done", 7])));
    }

    #[test]
    fn test_this_and_constructor_functions() {
        let code = r#"
            function Point(x, y) { this.x = x; this.y = y; }
            Point.prototype.norm = function () { return Math.sqrt(this.x * this.x + this.y * this.y); };
            const p = new Point(3, 4);
            const obj = { base: 10, add(n) { return this.base + n; } };
            return [p.norm(), p instanceof Point, obj.add(5)];
        "#;
        assert_eq!(value(code), d(json!([5, true, 15])));
    }

    #[test]
    fn test_optional_chaining_and_nullish() {
        let code = r#"
            const user = { profile: null, settings: { theme: '' } };
            return [user.profile?.name ?? 'anon', user.settings.theme || 'light', user.settings.theme ?? 'light'];
        "#;
        assert_eq!(value(code), d(json!(["anon", "light", ""])));
    }

    #[test]
    fn test_typeof_and_undeclared() {
        assert_eq!(
            value("return [typeof missing, typeof 1, typeof 'a', typeof null, typeof (() => 1), typeof {}]"),
            d(json!(["undefined", "number", "string", "object", "function", "object"]))
        );
        assert_eq!(run_js_string("return missing + 1"), "Error: missing is not defined");
    }

    #[test]
    fn test_classes_are_rejected() {
        let err = run_js("class A {}").unwrap_err();
        assert!(err.is_syntax_error());
    }
}

mod builtins {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_array_methods() {
        let code = r#"
            const xs = [5, 1, 4, 2, 3];
            return {
                sorted: [...xs].sort((a, b) => a - b),
                doubled: xs.map(x => x * 2),
                evens: xs.filter(x => x % 2 === 0),
                sum: xs.reduce((acc, x) => acc + x, 0),
                found: xs.find(x => x > 3),
                index: xs.findIndex(x => x === 4),
                flat: [[1, [2]], [3]].flat(),
                joined: xs.slice(1, 3).join('-'),
                has: xs.includes(2),
                last: xs.at(-1),
            };
        "#;
        assert_eq!(
            value(code),
            d(json!({
                "sorted": [1, 2, 3, 4, 5],
                "doubled": [10, 2, 8, 4, 6],
                "evens": [4, 2],
                "sum": 15,
                "found": 5,
                "index": 2,
                "flat": [1, [2], 3],
                "joined": "1-4",
                "has": true,
                "last": 3
            }))
        );
    }

    #[test]
    fn test_default_sort_is_lexicographic() {
        assert_eq!(value("return [10, 9, 1].sort()"), d(json!([1, 10, 9])));
    }

    #[test]
    fn test_string_methods() {
        let code = r#"
            const s = '  Hello, World  ';
            return [
                s.trim().toUpperCase(),
                s.trim().split(', '),
                'abc'.padStart(5, '*'),
                'a-b-c'.replaceAll('-', '+'),
                'banana'.indexOf('n'),
                'kata'.repeat(2),
                'Hello'.startsWith('He'),
            ];
        "#;
        assert_eq!(
            value(code),
            d(json!(["HELLO, WORLD", ["Hello", "World"], "**abc", "a+b+c", 2, "katakata", true]))
        );
    }

    #[test]
    fn test_string_indices_count_utf16_units() {
        let code = r#"
            const s = 'a😀b';
            return [
                s.length,
                s.indexOf('b'),
                s.slice(1, 3),
                s.charCodeAt(1),
                s.codePointAt(1),
                s[3],
                [...s].length,
                'héllo'.length,
            ];
        "#;
        assert_eq!(
            value(code),
            d(json!([4, 3, "😀", 55357, 128512, "b", 3, 5]))
        );
    }

    #[test]
    fn test_large_integers_print_like_javascript() {
        assert_eq!(
            value("return String(123456789012345680000) + ' ' + String(1e21)"),
            d(json!("123456789012345680000 1e+21"))
        );
        assert_eq!(value("return `${2 ** 53}`"), d(json!("9007199254740992")));
    }

    #[test]
    fn test_regular_expressions() {
        let code = r#"
            const email = /^[^@\s]+@[^@\s]+\.[a-z]+$/i;
            const date = /(\d{4})-(\d{2})-(\d{2})/.exec('on 2024-03-15');
            return [
                email.test('Ana@Example.COM'),
                email.test('nope'),
                date[1], date.index,
                'a1b2'.replace(/\d/g, d => `<${d}>`),
                'x, y ,z'.split(/\s*,\s*/),
            ];
        "#;
        assert_eq!(
            value(code),
            d(json!([true, false, "2024", 3, "a<1>b<2>", ["x", "y", "z"]]))
        );
    }

    #[test]
    fn test_object_statics() {
        let code = r#"
            const o = { b: 2, a: 1 };
            return [
                Object.keys(o),
                Object.values(o),
                Object.entries(o),
                Object.assign({}, o, { c: 3 }),
                Object.fromEntries([['k', 'v']]),
            ];
        "#;
        assert_eq!(
            value(code),
            d(json!([["b", "a"], [2, 1], [["b", 2], ["a", 1]], {"b": 2, "a": 1, "c": 3}, {"k": "v"}]))
        );
    }

    #[test]
    fn test_frozen_objects_ignore_writes() {
        assert_eq!(
            value("const o = Object.freeze({ a: 1 }); o.a = 2; o.b = 3; return [o.a, o.b === undefined, Object.isFrozen(o)]"),
            d(json!([1, true, true]))
        );
    }

    #[test]
    fn test_number_and_math() {
        let code = r#"
            return [
                (3.14159).toFixed(2),
                Number('42'),
                Number.isInteger(4.5),
                parseInt('08px'),
                parseFloat('3.5e2'),
                Math.max(1, 9, 3),
                Math.round(2.5),
                Math.round(-2.5),
                Math.abs(-7),
                (255).toString(16),
            ];
        "#;
        assert_eq!(
            value(code),
            d(json!(["3.14", 42, false, 8, 350, 9, 3, -2, 7, "ff"]))
        );
    }

    #[test]
    fn test_math_random_range() {
        assert_eq!(
            value("for (let i = 0; i < 100; i++) { const r = Math.random(); if (r < 0 || r >= 1) return false; } return true"),
            d(json!(true))
        );
    }

    #[test]
    fn test_json_round_trip() {
        let code = r#"
            const text = JSON.stringify({ name: 'kata', tags: ['a', 'b'], nested: { ok: true }, skip: undefined });
            const back = JSON.parse(text);
            return [text, back.tags.length, JSON.stringify([1, 2], null, 2)];
        "#;
        assert_eq!(
            value(code),
            d(json!([
                r#"{"name":"kata","tags":["a","b"],"nested":{"ok":true}}"#,
                2,
                "[\n  1,\n  2\n]"
            ]))
        );
    }

    #[test]
    fn test_json_errors() {
        assert_eq!(
            run_js_string("const a = {}; a.a = a; JSON.stringify(a)"),
            "Error: Converting circular structure to JSON"
        );
        assert!(run_js_string("JSON.parse('{bad')").starts_with("Error: Unexpected token in JSON"));
    }

    #[test]
    fn test_map_and_set() {
        let code = r#"
            const m = new Map([['a', 1]]);
            m.set('b', 2).set('a', 3);
            const s = new Set([1, 2, 2, 3]);
            s.delete(1);
            return [m.get('a'), m.size, [...m.keys()], s.size, [...s], s.has(2)];
        "#;
        assert_eq!(value(code), d(json!([3, 2, ["a", "b"], 2, [2, 3], true])));
    }

    #[test]
    fn test_error_constructors() {
        let code = r#"
            const e = new RangeError('bad range');
            return [e.name, e.message, e instanceof Error, e.toString(), Error('plain').message];
        "#;
        assert_eq!(
            value(code),
            d(json!(["RangeError", "bad range", true, "RangeError: bad range", "plain"]))
        );
    }
}

mod console {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_console_is_captured() {
        let output = std::thread::Builder::new()
            .stack_size(64 * 1024 * 1024)
            .spawn(|| {
                let mut runtime = Runtime::new();
                runtime
                    .eval("console.log('count:', 2, [1, 'x'], { a: null }); console.error('oops')")
                    .unwrap();
                runtime.console_output().to_vec()
            })
            .unwrap()
            .join()
            .unwrap();
        assert_eq!(output, vec!["count: 2 [ 1, 'x' ] { a: null }", "oops"]);
    }
}
