//! Rendering values back into S-expression text.

use crate::context::Ctx;
use crate::core;
use crate::value::Value;

/// Print out a value as source-shaped text.
pub fn pr_str(ctx: &Ctx, value: Value) -> String {
    match value {
        Value::Nil => String::from("()"),
        Value::Number(n) => n.to_string(),
        Value::Atom(name) => ctx.sym_name(name).to_string(),
        Value::Str(r) => {
            let text = ctx.arena(r.space()).str_payload(r);
            format!("\"{}\"", escape(text))
        }
        Value::Primitive(index) => format!("<primitive:{}>", core::entry(index).name),
        Value::Pair(_) => pr_list(ctx, value),
        Value::Closure(_) => String::from("<closure>"),
        Value::Macro(_) => String::from("<macro>"),
        Value::Undefined => String::from("<undefined>"),
    }
}

/// Proper lists print as `(a b c)`, improper tails as `(a b . c)`.
fn pr_list(ctx: &Ctx, list: Value) -> String {
    let mut out = String::from("(");
    let mut cur = list;
    loop {
        let (car, cdr) = ctx.pair(cur).expect("pr_list walks pairs");
        out.push_str(&pr_str(ctx, car));
        match cdr {
            Value::Nil => break,
            Value::Pair(_) => {
                out.push(' ');
                cur = cdr;
            }
            other => {
                out.push_str(" . ");
                out.push_str(&pr_str(ctx, other));
                break;
            }
        }
    }
    out.push(')');
    out
}

fn escape(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '"' => "\\\"".to_string(),
            '\n' => "\\n".to_string(),
            '\\' => "\\\\".to_string(),
            _ => c.to_string(),
        })
        .collect::<Vec<String>>()
        .join("")
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;
    use crate::arena::Space;

    #[test]
    fn numbers_print_in_shortest_form() {
        let ctx = Ctx::new();
        assert_eq!(pr_str(&ctx, Value::Number(5.0)), "5");
        assert_eq!(pr_str(&ctx, Value::Number(1.5)), "1.5");
        assert_eq!(pr_str(&ctx, Value::Number(-0.25)), "-0.25");
    }

    #[test_case("plain", "\"plain\"" ; "plain text")]
    #[test_case("a\nb", "\"a\\nb\"" ; "newline")]
    #[test_case("say \"hi\"", "\"say \\\"hi\\\"\"" ; "inner quotes")]
    #[test_case("back\\slash", "\"back\\\\slash\"" ; "backslash")]
    fn strings_print_readably(text: &str, expected: &str) {
        let mut ctx = Ctx::new();
        let s = ctx.string_in(Space::Scratch, text);
        assert_eq!(pr_str(&ctx, s), expected);
    }

    #[test]
    fn primitives_print_their_table_name() {
        let mut ctx = Ctx::new();
        let plus = ctx.intern("+");
        let value = crate::env::lookup(&ctx, plus, ctx.global_env).unwrap();
        assert_eq!(pr_str(&ctx, value), "<primitive:+>");
    }

    #[test]
    fn nested_and_improper_lists() {
        let mut ctx = Ctx::new();
        let inner = ctx.list_from_slice(Space::Scratch, &[Value::Number(2.0)]);
        let dotted = ctx.cons(Value::Number(3.0), Value::Number(4.0));
        let list = ctx.list_from_slice(Space::Scratch, &[Value::Number(1.0), inner, dotted]);
        assert_eq!(pr_str(&ctx, list), "(1 (2) (3 . 4))");
    }
}
