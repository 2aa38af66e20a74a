//! The evaluator.
//!
//! `eval` is iterative: the `'tco` loop swaps `(expr, env)` instead of
//! recursing wherever the next expression is in tail position — a closure
//! body, an `if` branch, a `cond` clause body, the final form of `and`/
//! `or`, the last body expression of `let*`, or a macro expansion. All
//! other descents (the call head, argument lists, binding expressions)
//! use ordinary recursion.
//!
//! Dispatch order for a call form: evaluate the head; a macro gets the raw
//! argument forms and its expansion replaces the whole call; a special
//! form gets the raw argument forms and controls its own evaluation; only
//! then are arguments reduced left to right (the first error
//! short-circuits) and the result applied.

use std::collections::HashSet;

use crate::arena::{Ref, Space};
use crate::context::Ctx;
use crate::core::{self, PrimitiveKind, SpecialForm};
use crate::env;
use crate::error::{eval_error, new_eval_error, LispError, LispResult};
use crate::value::Value;

pub fn eval(ctx: &mut Ctx, expr: Value, env: Value) -> LispResult {
    let mut expr = expr;
    let mut env = env;
    'tco: loop {
        match expr {
            Value::Nil | Value::Number(_) | Value::Str(_) => return Ok(expr),
            Value::Atom(name) => return env::lookup(ctx, name, env),
            Value::Pair(r) => {
                let (head, args) = ctx.arena(r.space()).cons_cell(r);
                let func = eval(ctx, head, env)?;

                if let Value::Macro(mr) = func {
                    let lambda = ctx.lambda(mr);
                    let expand_env = env::bind(ctx, lambda.params, args, lambda.env)?;
                    expr = eval(ctx, lambda.body, expand_env)?;
                    env = expand_env;
                    continue 'tco;
                }

                if let Value::Primitive(index) = func {
                    if let PrimitiveKind::Special(form) = core::entry(index).kind {
                        let items = ctx.list_items(args);
                        match form {
                            SpecialForm::Quote => {
                                return match items.as_slice() {
                                    [quoted, ..] => Ok(*quoted),
                                    [] => eval_error("quote: expected an argument"),
                                }
                            }
                            SpecialForm::Backquote => {
                                return match items.as_slice() {
                                    [template, ..] => {
                                        expand_template(ctx, *template, env).map(|(v, _)| v)
                                    }
                                    [] => eval_error("backquote: expected a template"),
                                }
                            }
                            SpecialForm::If => match items.as_slice() {
                                [test, branches @ ..] => {
                                    let condition = eval(ctx, *test, env)?;
                                    expr = if condition.is_truthy() {
                                        branches.first().copied().unwrap_or(Value::Nil)
                                    } else {
                                        branches.get(1).copied().unwrap_or(Value::Nil)
                                    };
                                    continue 'tco;
                                }
                                [] => return eval_error("if: missing condition"),
                            },
                            SpecialForm::Cond => {
                                for clause in items {
                                    let test = ctx.car(clause)?;
                                    let body = ctx.car(ctx.cdr(clause)?)?;
                                    if eval(ctx, test, env)?.is_truthy() {
                                        expr = body;
                                        continue 'tco;
                                    }
                                }
                                return Ok(Value::Nil);
                            }
                            SpecialForm::And => match items.as_slice() {
                                [] => return Ok(ctx.true_value()),
                                [init @ .., last] => {
                                    for e in init {
                                        let value = eval(ctx, *e, env)?;
                                        if !value.is_truthy() {
                                            return Ok(value);
                                        }
                                    }
                                    expr = *last;
                                    continue 'tco;
                                }
                            },
                            SpecialForm::Or => match items.as_slice() {
                                [] => return Ok(Value::Nil),
                                [init @ .., last] => {
                                    for e in init {
                                        let value = eval(ctx, *e, env)?;
                                        if value.is_truthy() {
                                            return Ok(value);
                                        }
                                    }
                                    expr = *last;
                                    continue 'tco;
                                }
                            },
                            SpecialForm::Lambda => {
                                return special_lambda(ctx, &items, env, false)
                            }
                            SpecialForm::Macro => return special_lambda(ctx, &items, env, true),
                            SpecialForm::Define => return special_define(ctx, &items, env),
                            SpecialForm::Set => return special_set(ctx, &items, env),
                            SpecialForm::Undefine => return special_undefine(ctx, &items),
                            SpecialForm::LetStar => match items.as_slice() {
                                [] => return eval_error("let*: missing bindings"),
                                [bindings, body @ ..] => {
                                    let local = eval_let_bindings(ctx, *bindings, env)?;
                                    match body {
                                        [] => return Ok(Value::Nil),
                                        [init @ .., last] => {
                                            for e in init {
                                                eval(ctx, *e, local)?;
                                            }
                                            expr = *last;
                                            env = local;
                                            continue 'tco;
                                        }
                                    }
                                }
                            },
                        }
                    }
                }

                let evaluated = eval_args(ctx, args, env)?;
                match func {
                    Value::Closure(cr) => {
                        let lambda = ctx.lambda(cr);
                        core::check_closure_arity(ctx, lambda.params, evaluated)?;
                        env = env::bind(ctx, lambda.params, evaluated, lambda.env)?;
                        expr = lambda.body;
                        continue 'tco;
                    }
                    Value::Primitive(index) => {
                        let entry = core::entry(index);
                        core::check_primitive_arity(entry, ctx.list_length(evaluated))?;
                        match entry.kind {
                            PrimitiveKind::Strict(f) => return f(ctx, evaluated, env),
                            PrimitiveKind::Special(_) => {
                                unreachable!("special form fell through to the strict path")
                            }
                        }
                    }
                    _ => return eval_error("Type error: cannot apply a non-function value."),
                }
            }
            _ => return eval_error("Evaluation error: unknown value type."),
        }
    }
}

/// Reduce an argument list left to right into a fresh scratch list.
fn eval_args(ctx: &mut Ctx, mut args: Value, env: Value) -> LispResult {
    let mut items = Vec::new();
    while let Some((car, cdr)) = ctx.pair(args) {
        items.push(eval(ctx, car, env)?);
        args = cdr;
    }
    Ok(ctx.list_from_slice(Space::Scratch, &items))
}

fn special_lambda(ctx: &mut Ctx, items: &[Value], env: Value, is_macro: bool) -> LispResult {
    match items {
        [params, body, ..] => Ok(if is_macro {
            ctx.macro_value(*params, *body, env)
        } else {
            ctx.closure(*params, *body, env)
        }),
        _ => eval_error(if is_macro {
            "macro: expected a parameter list and a body"
        } else {
            "lambda: expected a parameter list and a body"
        }),
    }
}

fn special_define(ctx: &mut Ctx, items: &[Value], env: Value) -> LispResult {
    let [var, val_expr, ..] = items else {
        return eval_error("define: expected a name and a value");
    };
    let Value::Atom(name) = *var else {
        return new_eval_error(format!("define: expected an atom, got {}", var.type_name()));
    };
    match env::find_frame(ctx, name, ctx.global_env) {
        Some(frame) => {
            if !matches!(ctx.frame_value(frame), Value::Undefined) {
                return new_eval_error(format!(
                    "define: '{}' is already defined",
                    ctx.sym_name(name)
                ));
            }
            // Revive the tombstoned binding in place.
            let value = eval(ctx, *val_expr, env)?;
            let promoted = ctx.copy_to_perm(value);
            ctx.set_frame_value(frame, promoted);
            rewire_global_lambdas(ctx);
            Ok(*var)
        }
        None => {
            let value = eval(ctx, *val_expr, env)?;
            let promoted = ctx.copy_to_perm(value);
            let genv = ctx.global_env;
            ctx.global_env = env::extend(ctx, Space::Permanent, *var, promoted, genv);
            rewire_global_lambdas(ctx);
            Ok(*var)
        }
    }
}

/// Point every closure and macro bound directly in the global environment
/// at the environment's current head. This is what makes a top-level
/// function see itself and every global defined after it. Only lambdas
/// whose captured environment is a node of the global chain itself are
/// repointed; one that carries promoted local frames (say, out of a
/// `let*`) keeps them.
fn rewire_global_lambdas(ctx: &mut Ctx) {
    let genv = ctx.global_env;
    let mut spine: HashSet<Ref> = HashSet::new();
    let mut cur = genv;
    while let Value::Pair(r) = cur {
        spine.insert(r);
        cur = ctx.arena(r.space()).cons_cell(r).1;
    }
    let mut cur = genv;
    while let Some((frame, rest)) = ctx.pair(cur) {
        if let Some((_, value)) = ctx.pair(frame) {
            if let Value::Closure(lr) | Value::Macro(lr) = value {
                let rewirable = match ctx.lambda(lr).env {
                    Value::Nil => true,
                    Value::Pair(er) => spine.contains(&er),
                    _ => false,
                };
                if rewirable {
                    ctx.set_lambda_env(lr, genv);
                }
            }
        }
        cur = rest;
    }
}

fn special_set(ctx: &mut Ctx, items: &[Value], env: Value) -> LispResult {
    let [var, val_expr, ..] = items else {
        return eval_error("set!: expected a name and a value");
    };
    let Value::Atom(name) = *var else {
        return new_eval_error(format!("set!: expected an atom, got {}", var.type_name()));
    };
    let frame = match env::find_frame(ctx, name, ctx.global_env) {
        Some(frame) if !matches!(ctx.frame_value(frame), Value::Undefined) => frame,
        _ => return new_eval_error(format!("undefined variable: {}", ctx.sym_name(name))),
    };
    let value = eval(ctx, *val_expr, env)?;
    let promoted = ctx.copy_to_perm(value);
    ctx.set_frame_value(frame, promoted);
    Ok(promoted)
}

fn special_undefine(ctx: &mut Ctx, items: &[Value]) -> LispResult {
    let [var, ..] = items else {
        return eval_error("undefine!: expected a name");
    };
    let Value::Atom(name) = *var else {
        return new_eval_error(format!(
            "undefine!: expected an atom, got {}",
            var.type_name()
        ));
    };
    match env::find_frame(ctx, name, ctx.global_env) {
        Some(frame) => {
            ctx.set_frame_value(frame, Value::Undefined);
            Ok(*var)
        }
        None => new_eval_error(format!("undefined variable: {}", ctx.sym_name(name))),
    }
}

/// Sequentially extend `env` with each `(name expr)` binding, every
/// binding visible to the ones after it. A binding whose expression is a
/// literal `(lambda ...)` form gets an environment containing its own
/// frame, so recursive local definitions work.
fn eval_let_bindings(ctx: &mut Ctx, bindings: Value, env: Value) -> LispResult {
    let mut local = env;
    let mut rest = bindings;
    while let Some((binding, next)) = ctx.pair(rest) {
        let var = ctx.car(binding)?;
        let val_expr = ctx.car(ctx.cdr(binding)?)?;
        if is_lambda_literal(ctx, var, val_expr) {
            let params = ctx.car(ctx.cdr(val_expr)?)?;
            let body = ctx.car(ctx.cdr(ctx.cdr(val_expr)?)?)?;
            let closure = ctx.closure(params, body, local);
            let extended = env::extend(ctx, Space::Scratch, var, closure, local);
            let Value::Closure(cr) = closure else {
                unreachable!()
            };
            ctx.set_lambda_env(cr, extended);
            local = extended;
        } else {
            let value = eval(ctx, val_expr, local)?;
            local = env::extend(ctx, Space::Scratch, var, value, local);
        }
        rest = next;
    }
    Ok(local)
}

fn is_lambda_literal(ctx: &Ctx, var: Value, val_expr: Value) -> bool {
    matches!(var, Value::Atom(_))
        && matches!(
            ctx.pair(val_expr),
            Some((Value::Atom(head), _)) if head == ctx.syms.lambda
        )
}

/// Walk a backquote template. `(comma e)` evaluates `e` and splices the
/// result in; untouched subtrees are shared with the template, so a
/// comma-free template comes back at the same address.
fn expand_template(
    ctx: &mut Ctx,
    template: Value,
    env: Value,
) -> Result<(Value, bool), LispError> {
    let Some((head, tail)) = ctx.pair(template) else {
        return Ok((template, false));
    };
    if let Value::Atom(name) = head {
        if name == ctx.syms.comma {
            let payload = ctx.car(tail)?;
            return Ok((eval(ctx, payload, env)?, true));
        }
    }
    let (new_head, head_changed) = expand_template(ctx, head, env)?;
    let (new_tail, tail_changed) = expand_template(ctx, tail, env)?;
    if head_changed || tail_changed {
        Ok((ctx.cons(new_head, new_tail), true))
    } else {
        Ok((template, false))
    }
}
