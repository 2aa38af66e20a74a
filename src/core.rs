//! The primitives table and the strict built-in functions.
//!
//! Every entry maps a name to either a strict primitive (the evaluator
//! reduces the arguments first) or a special form (the evaluator hands the
//! arguments over unevaluated and controls its own evaluation order; see
//! `eval.rs`). A declared arity of `None` means variadic.

use crate::context::Ctx;
use crate::error::{eval_error, new_eval_error, LispError, LispResult};
use crate::eval;
use crate::printer::pr_str;
use crate::value::Value;

/// All strict primitives share this signature: the already-evaluated
/// argument list, the caller's environment, and the context.
pub type PrimitiveFn = fn(&mut Ctx, Value, Value) -> LispResult;

/// The forms the evaluator must intercept before argument evaluation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SpecialForm {
    Quote,
    Backquote,
    If,
    Cond,
    And,
    Or,
    Lambda,
    Macro,
    Define,
    Set,
    Undefine,
    LetStar,
}

#[derive(Clone, Copy)]
pub enum PrimitiveKind {
    Strict(PrimitiveFn),
    Special(SpecialForm),
}

pub struct PrimitiveEntry {
    pub name: &'static str,
    pub kind: PrimitiveKind,
    /// Expected argument count; `None` is variadic. Checked by the
    /// evaluator for strict primitives only — special forms police their
    /// own argument lists.
    pub arity: Option<usize>,
}

use PrimitiveKind::{Special, Strict};

pub static PRIMITIVES: &[PrimitiveEntry] = &[
    // Special forms
    PrimitiveEntry { name: "quote", kind: Special(SpecialForm::Quote), arity: Some(1) },
    PrimitiveEntry { name: "backquote", kind: Special(SpecialForm::Backquote), arity: Some(1) },
    PrimitiveEntry { name: "if", kind: Special(SpecialForm::If), arity: Some(3) },
    PrimitiveEntry { name: "cond", kind: Special(SpecialForm::Cond), arity: None },
    PrimitiveEntry { name: "and", kind: Special(SpecialForm::And), arity: None },
    PrimitiveEntry { name: "or", kind: Special(SpecialForm::Or), arity: None },
    PrimitiveEntry { name: "lambda", kind: Special(SpecialForm::Lambda), arity: Some(2) },
    PrimitiveEntry { name: "macro", kind: Special(SpecialForm::Macro), arity: Some(2) },
    PrimitiveEntry { name: "define", kind: Special(SpecialForm::Define), arity: Some(2) },
    PrimitiveEntry { name: "set!", kind: Special(SpecialForm::Set), arity: Some(2) },
    PrimitiveEntry { name: "undefine!", kind: Special(SpecialForm::Undefine), arity: Some(1) },
    PrimitiveEntry { name: "let*", kind: Special(SpecialForm::LetStar), arity: None },
    // Lists
    PrimitiveEntry { name: "cons", kind: Strict(prim_cons), arity: Some(2) },
    PrimitiveEntry { name: "car", kind: Strict(prim_car), arity: Some(1) },
    PrimitiveEntry { name: "cdr", kind: Strict(prim_cdr), arity: Some(1) },
    PrimitiveEntry { name: "list", kind: Strict(prim_list), arity: None },
    PrimitiveEntry { name: "reverse", kind: Strict(prim_reverse), arity: Some(1) },
    PrimitiveEntry { name: "len", kind: Strict(prim_len), arity: Some(1) },
    // Arithmetic
    PrimitiveEntry { name: "+", kind: Strict(prim_add), arity: None },
    PrimitiveEntry { name: "-", kind: Strict(prim_sub), arity: None },
    PrimitiveEntry { name: "*", kind: Strict(prim_mul), arity: None },
    PrimitiveEntry { name: "/", kind: Strict(prim_div), arity: None },
    PrimitiveEntry { name: "%", kind: Strict(prim_mod), arity: Some(2) },
    PrimitiveEntry { name: "int", kind: Strict(prim_int), arity: Some(1) },
    // Comparison
    PrimitiveEntry { name: "<", kind: Strict(prim_lt), arity: Some(2) },
    PrimitiveEntry { name: ">", kind: Strict(prim_gt), arity: Some(2) },
    PrimitiveEntry { name: "<=", kind: Strict(prim_le), arity: Some(2) },
    PrimitiveEntry { name: ">=", kind: Strict(prim_ge), arity: Some(2) },
    PrimitiveEntry { name: "=", kind: Strict(prim_num_eq), arity: Some(2) },
    // Predicates
    PrimitiveEntry { name: "eq?", kind: Strict(prim_eq), arity: Some(2) },
    PrimitiveEntry { name: "not", kind: Strict(prim_not), arity: Some(1) },
    PrimitiveEntry { name: "pair?", kind: Strict(prim_is_pair), arity: Some(1) },
    PrimitiveEntry { name: "list?", kind: Strict(prim_is_list), arity: Some(1) },
    PrimitiveEntry { name: "number?", kind: Strict(prim_is_num), arity: None },
    // Higher-order
    PrimitiveEntry { name: "mapcar", kind: Strict(prim_mapcar), arity: Some(2) },
    PrimitiveEntry { name: "filter", kind: Strict(prim_filter), arity: Some(2) },
    PrimitiveEntry { name: "reduce", kind: Strict(prim_reduce), arity: None },
    // Meta
    PrimitiveEntry { name: "apply", kind: Strict(prim_apply), arity: Some(2) },
    PrimitiveEntry { name: "eval", kind: Strict(prim_eval), arity: Some(1) },
    // I/O and debugging
    PrimitiveEntry { name: "display", kind: Strict(prim_display), arity: Some(1) },
    PrimitiveEntry { name: "tap", kind: Strict(prim_tap), arity: None },
];

pub fn entry(index: u32) -> &'static PrimitiveEntry {
    &PRIMITIVES[index as usize]
}

/// Whether `name` is one of the forms the evaluator must not pre-evaluate
/// arguments for.
pub fn is_special_form(name: &str) -> bool {
    PRIMITIVES
        .iter()
        .any(|e| e.name == name && matches!(e.kind, Special(_)))
}

pub(crate) fn check_primitive_arity(
    entry: &PrimitiveEntry,
    actual: usize,
) -> Result<(), LispError> {
    match entry.arity {
        Some(expected) if expected != actual => new_eval_error(format!(
            "Arity error for '{}': expects {} arguments, but got {}",
            entry.name, expected, actual
        )),
        _ => Ok(()),
    }
}

pub(crate) fn check_closure_arity(
    ctx: &Ctx,
    params: Value,
    args: Value,
) -> Result<(), LispError> {
    // A bare atom takes the whole argument list.
    if matches!(params, Value::Atom(_)) {
        return Ok(());
    }
    let mut fixed = 0;
    let mut tail = params;
    while let Some((_, rest)) = ctx.pair(tail) {
        fixed += 1;
        tail = rest;
    }
    let actual = ctx.list_length(args);
    match tail {
        // A dotted rest atom takes whatever is left beyond the fixed
        // prefix, so the prefix is a minimum rather than an exact count.
        Value::Atom(_) => {
            if actual < fixed {
                return new_eval_error(format!(
                    "Arity error: function expects at least {fixed} arguments, but got {actual}"
                ));
            }
            Ok(())
        }
        _ => {
            if fixed != actual {
                return new_eval_error(format!(
                    "Arity error: function expects {fixed} arguments, but got {actual}"
                ));
            }
            Ok(())
        }
    }
}

/// The one application path shared by `apply`, `mapcar`, `filter` and
/// `reduce`. Mirrors what the evaluator does for a call in head position,
/// minus the tail-call loop.
pub(crate) fn apply_function(ctx: &mut Ctx, func: Value, args: Value, env: Value) -> LispResult {
    match func {
        Value::Primitive(index) => {
            let entry = entry(index);
            match entry.kind {
                Special(_) => {
                    new_eval_error(format!("apply: '{}' is a special form", entry.name))
                }
                Strict(f) => {
                    check_primitive_arity(entry, ctx.list_length(args))?;
                    f(ctx, args, env)
                }
            }
        }
        Value::Closure(r) => {
            let lambda = ctx.lambda(r);
            check_closure_arity(ctx, lambda.params, args)?;
            let call_env = crate::env::bind(ctx, lambda.params, args, lambda.env)?;
            eval::eval(ctx, lambda.body, call_env)
        }
        Value::Macro(_) => eval_error("apply: cannot apply a macro"),
        _ => eval_error("Type error: cannot apply a non-function value."),
    }
}

// Numeric comparisons all share one skeleton.
macro_rules! numeric_cmp {
    ($func:ident, $op:tt, $label:expr) => {
        fn $func(ctx: &mut Ctx, args: Value, _env: Value) -> LispResult {
            match ctx.list_items(args).as_slice() {
                [Value::Number(a), Value::Number(b)] => Ok(if a $op b {
                    ctx.true_value()
                } else {
                    Value::Nil
                }),
                [Value::Number(_), other] | [other, _] => new_eval_error(format!(
                    "{}: expected number, got {}",
                    $label,
                    other.type_name()
                )),
                _ => new_eval_error(format!("{}: expected 2 arguments", $label)),
            }
        }
    };
}

numeric_cmp!(prim_lt, <, "<");
numeric_cmp!(prim_gt, >, ">");
numeric_cmp!(prim_le, <=, "<=");
numeric_cmp!(prim_ge, >=, ">=");
numeric_cmp!(prim_num_eq, ==, "=");

fn prim_add(ctx: &mut Ctx, args: Value, _env: Value) -> LispResult {
    let mut total = 0.0;
    for arg in ctx.list_items(args) {
        match arg {
            Value::Number(n) => total += n,
            other => {
                return new_eval_error(format!("+: expected number, got {}", other.type_name()))
            }
        }
    }
    Ok(Value::Number(total))
}

fn prim_sub(ctx: &mut Ctx, args: Value, _env: Value) -> LispResult {
    match ctx.list_items(args).as_slice() {
        [] => eval_error("-: requires at least one argument"),
        [Value::Number(n)] => Ok(Value::Number(-n)),
        [Value::Number(first), rest @ ..] => {
            let mut total = *first;
            for arg in rest {
                match arg {
                    Value::Number(n) => total -= n,
                    other => {
                        return new_eval_error(format!(
                            "-: expected number, got {}",
                            other.type_name()
                        ))
                    }
                }
            }
            Ok(Value::Number(total))
        }
        [other, ..] => new_eval_error(format!("-: expected number, got {}", other.type_name())),
    }
}

fn prim_mul(ctx: &mut Ctx, args: Value, _env: Value) -> LispResult {
    let mut total = 1.0;
    for arg in ctx.list_items(args) {
        match arg {
            Value::Number(n) => total *= n,
            other => {
                return new_eval_error(format!("*: expected number, got {}", other.type_name()))
            }
        }
    }
    Ok(Value::Number(total))
}

fn prim_div(ctx: &mut Ctx, args: Value, _env: Value) -> LispResult {
    match ctx.list_items(args).as_slice() {
        [] => eval_error("/: requires at least one argument"),
        [Value::Number(n)] => {
            if *n == 0.0 {
                return eval_error("/: division by zero (inverse of 0)");
            }
            Ok(Value::Number(1.0 / n))
        }
        [Value::Number(first), rest @ ..] => {
            let mut total = *first;
            for arg in rest {
                match arg {
                    Value::Number(n) if *n == 0.0 => return eval_error("/: division by zero"),
                    Value::Number(n) => total /= n,
                    other => {
                        return new_eval_error(format!(
                            "/: expected number, got {}",
                            other.type_name()
                        ))
                    }
                }
            }
            Ok(Value::Number(total))
        }
        [other, ..] => new_eval_error(format!("/: expected number, got {}", other.type_name())),
    }
}

fn prim_mod(ctx: &mut Ctx, args: Value, _env: Value) -> LispResult {
    match ctx.list_items(args).as_slice() {
        [Value::Number(_), Value::Number(d)] if *d == 0.0 => eval_error("%: division by zero"),
        [Value::Number(a), Value::Number(d)] => Ok(Value::Number(a % d)),
        [Value::Number(_), other] | [other, _] => {
            new_eval_error(format!("%: expected number, got {}", other.type_name()))
        }
        _ => eval_error("%: expected 2 arguments"),
    }
}

/// Truncate toward zero, the language's only number-to-integer coercion.
fn prim_int(ctx: &mut Ctx, args: Value, _env: Value) -> LispResult {
    match ctx.list_items(args).as_slice() {
        [Value::Number(n)] => Ok(Value::Number((*n as i64) as f64)),
        [other] => new_eval_error(format!("int: expected number, got {}", other.type_name())),
        _ => eval_error("int: expected 1 argument"),
    }
}

fn prim_eq(ctx: &mut Ctx, args: Value, _env: Value) -> LispResult {
    match ctx.list_items(args).as_slice() {
        [a, b] => Ok(if ctx.are_equal(*a, *b) {
            ctx.true_value()
        } else {
            Value::Nil
        }),
        _ => eval_error("eq?: expected 2 arguments"),
    }
}

fn prim_not(ctx: &mut Ctx, args: Value, _env: Value) -> LispResult {
    let value = ctx.car(args)?;
    Ok(if value.is_truthy() {
        Value::Nil
    } else {
        ctx.true_value()
    })
}

fn prim_is_pair(ctx: &mut Ctx, args: Value, _env: Value) -> LispResult {
    let value = ctx.car(args)?;
    Ok(if value.is_pair() {
        ctx.true_value()
    } else {
        Value::Nil
    })
}

fn prim_is_list(ctx: &mut Ctx, args: Value, _env: Value) -> LispResult {
    let value = ctx.car(args)?;
    Ok(if ctx.is_proper_list(value) {
        ctx.true_value()
    } else {
        Value::Nil
    })
}

/// True when every argument is a number (vacuously true of none).
fn prim_is_num(ctx: &mut Ctx, args: Value, _env: Value) -> LispResult {
    for arg in ctx.list_items(args) {
        if !matches!(arg, Value::Number(_)) {
            return Ok(Value::Nil);
        }
    }
    Ok(ctx.true_value())
}

fn prim_cons(ctx: &mut Ctx, args: Value, _env: Value) -> LispResult {
    match ctx.list_items(args).as_slice() {
        [car, cdr] => Ok(ctx.cons(*car, *cdr)),
        _ => eval_error("cons: expected 2 arguments"),
    }
}

fn prim_car(ctx: &mut Ctx, args: Value, _env: Value) -> LispResult {
    let value = ctx.car(args)?;
    ctx.car(value)
}

fn prim_cdr(ctx: &mut Ctx, args: Value, _env: Value) -> LispResult {
    let value = ctx.car(args)?;
    ctx.cdr(value)
}

/// The arguments were already evaluated into a fresh list; return it.
fn prim_list(_ctx: &mut Ctx, args: Value, _env: Value) -> LispResult {
    Ok(args)
}

fn prim_reverse(ctx: &mut Ctx, args: Value, _env: Value) -> LispResult {
    let list = ctx.car(args)?;
    if !ctx.is_proper_list(list) {
        return new_eval_error(format!("reverse: expected list, got {}", list.type_name()));
    }
    let mut items = ctx.list_items(list);
    items.reverse();
    Ok(ctx.list_from_slice(crate::arena::Space::Scratch, &items))
}

fn prim_len(ctx: &mut Ctx, args: Value, _env: Value) -> LispResult {
    let list = ctx.car(args)?;
    Ok(Value::Number(ctx.list_length(list) as f64))
}

fn prim_mapcar(ctx: &mut Ctx, args: Value, env: Value) -> LispResult {
    match ctx.list_items(args).as_slice() {
        [func, list] => {
            let (func, items) = (*func, ctx.list_items(*list));
            let mut results = Vec::with_capacity(items.len());
            for item in items {
                let call_args = ctx.list_from_slice(crate::arena::Space::Scratch, &[item]);
                results.push(apply_function(ctx, func, call_args, env)?);
            }
            Ok(ctx.list_from_slice(crate::arena::Space::Scratch, &results))
        }
        _ => eval_error("mapcar: expected a function and a list"),
    }
}

fn prim_filter(ctx: &mut Ctx, args: Value, env: Value) -> LispResult {
    match ctx.list_items(args).as_slice() {
        [func, list] => {
            let (func, items) = (*func, ctx.list_items(*list));
            let mut kept = Vec::new();
            for item in items {
                let call_args = ctx.list_from_slice(crate::arena::Space::Scratch, &[item]);
                if apply_function(ctx, func, call_args, env)?.is_truthy() {
                    kept.push(item);
                }
            }
            Ok(ctx.list_from_slice(crate::arena::Space::Scratch, &kept))
        }
        _ => eval_error("filter: expected a function and a list"),
    }
}

/// `(reduce f list)` seeds from the list head; `(reduce f seed list)`
/// folds from the explicit seed.
fn prim_reduce(ctx: &mut Ctx, args: Value, env: Value) -> LispResult {
    let (func, seed, items) = match ctx.list_items(args).as_slice() {
        [func, list] => {
            let items = ctx.list_items(*list);
            match items.split_first() {
                None => return Ok(Value::Nil),
                Some((head, tail)) => (*func, *head, tail.to_vec()),
            }
        }
        [func, seed, list] => (*func, *seed, ctx.list_items(*list)),
        other => {
            return new_eval_error(format!(
                "Arity error for 'reduce': expects 2 or 3 arguments, but got {}",
                other.len()
            ))
        }
    };
    let mut acc = seed;
    for item in items {
        let call_args = ctx.list_from_slice(crate::arena::Space::Scratch, &[acc, item]);
        acc = apply_function(ctx, func, call_args, env)?;
    }
    Ok(acc)
}

fn prim_apply(ctx: &mut Ctx, args: Value, env: Value) -> LispResult {
    match ctx.list_items(args).as_slice() {
        [func, call_args] => apply_function(ctx, *func, *call_args, env),
        _ => eval_error("apply: expected a function and an argument list"),
    }
}

/// Evaluate the (already reduced) argument once more, in the caller's
/// environment.
fn prim_eval(ctx: &mut Ctx, args: Value, env: Value) -> LispResult {
    let expr = ctx.car(args)?;
    eval::eval(ctx, expr, env)
}

fn prim_display(ctx: &mut Ctx, args: Value, _env: Value) -> LispResult {
    let value = ctx.car(args)?;
    print!("{} ", pr_str(ctx, value));
    Ok(Value::Nil)
}

/// Print an optional label and the value, then hand the value back — an
/// identity function for peeking into the middle of an expression.
fn prim_tap(ctx: &mut Ctx, args: Value, _env: Value) -> LispResult {
    match ctx.list_items(args).as_slice() {
        [] => eval_error("tap: requires at least 1 argument."),
        [value] => {
            println!("{}", pr_str(ctx, *value));
            Ok(*value)
        }
        [value, label, ..] => {
            match label {
                Value::Str(_) | Value::Atom(_) => {
                    println!("{} {}", pr_str(ctx, *label), pr_str(ctx, *value))
                }
                _ => println!("{}", pr_str(ctx, *value)),
            }
            Ok(*value)
        }
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test_case("quote", true ; "quote")]
    #[test_case("backquote", true ; "backquote")]
    #[test_case("if", true ; "if form")]
    #[test_case("cond", true ; "cond")]
    #[test_case("and", true ; "and form")]
    #[test_case("or", true ; "or form")]
    #[test_case("lambda", true ; "lambda")]
    #[test_case("macro", true ; "macro form")]
    #[test_case("define", true ; "define")]
    #[test_case("set!", true ; "set bang")]
    #[test_case("undefine!", true ; "undefine bang")]
    #[test_case("let*", true ; "let star")]
    #[test_case("car", false ; "car is strict")]
    #[test_case("+", false ; "plus is strict")]
    #[test_case("eval", false ; "eval is strict")]
    #[test_case("no-such-name", false ; "unknown name")]
    fn special_form_predicate(name: &str, expected: bool) {
        assert_eq!(is_special_form(name), expected);
    }

    #[test]
    fn table_names_are_unique() {
        for (i, a) in PRIMITIVES.iter().enumerate() {
            for b in &PRIMITIVES[i + 1..] {
                assert_ne!(a.name, b.name);
            }
        }
    }

    #[test]
    fn primitive_arity_check_message() {
        let car = PRIMITIVES.iter().find(|e| e.name == "car").unwrap();
        let err = check_primitive_arity(car, 2).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Arity error for 'car': expects 1 arguments, but got 2"
        );
        assert!(check_primitive_arity(car, 1).is_ok());
    }

    #[test]
    fn variadic_primitives_skip_the_arity_check() {
        let plus = PRIMITIVES.iter().find(|e| e.name == "+").unwrap();
        assert!(check_primitive_arity(plus, 0).is_ok());
        assert!(check_primitive_arity(plus, 17).is_ok());
    }

    #[test]
    fn dotted_params_set_a_minimum_arity() {
        let mut ctx = Ctx::new();
        let a = Value::Atom(ctx.intern("a"));
        let rest = Value::Atom(ctx.intern("rest"));
        // (a . rest)
        let params = ctx.cons(a, rest);
        let one = ctx.list_from_slice(crate::arena::Space::Scratch, &[Value::Number(1.0)]);
        let two = ctx.list_from_slice(
            crate::arena::Space::Scratch,
            &[Value::Number(1.0), Value::Number(2.0)],
        );
        let err = check_closure_arity(&ctx, params, Value::Nil).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Arity error: function expects at least 1 arguments, but got 0"
        );
        assert!(check_closure_arity(&ctx, params, one).is_ok());
        assert!(check_closure_arity(&ctx, params, two).is_ok());
    }
}
