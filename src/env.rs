//! Environments.
//!
//! An environment is ordinary list structure: a chain of frames, each frame
//! a cons of `(variable-atom . bound-value)`, ending in nil. Shadowing is a
//! prepended frame, never a mutated one; the global environment is the
//! shared tail of every extension made during evaluation.

use crate::arena::{Ref, Space};
use crate::context::Ctx;
use crate::error::{new_eval_error, LispResult};
use crate::value::{Sym, Value};

/// Value of the first frame binding `var`, or an `undefined variable`
/// error. A frame holding the [`Value::Undefined`] tombstone counts as
/// unbound.
pub fn lookup(ctx: &Ctx, var: Sym, env: Value) -> LispResult {
    let mut cur = env;
    while let Some((frame, rest)) = ctx.pair(cur) {
        if let Some((Value::Atom(name), value)) = ctx.pair(frame) {
            if name == var {
                return match value {
                    Value::Undefined => {
                        new_eval_error(format!("undefined variable: {}", ctx.sym_name(var)))
                    }
                    value => Ok(value),
                };
            }
        }
        cur = rest;
    }
    new_eval_error(format!("undefined variable: {}", ctx.sym_name(var)))
}

/// The frame cons itself, for in-place mutation by `set!`/`undefine!`.
pub fn find_frame(ctx: &Ctx, var: Sym, env: Value) -> Option<Ref> {
    let mut cur = env;
    while let Some((frame, rest)) = ctx.pair(cur) {
        if let Value::Pair(frame_ref) = frame {
            if let Some((Value::Atom(name), _)) = ctx.pair(frame) {
                if name == var {
                    return Some(frame_ref);
                }
            }
        }
        cur = rest;
    }
    None
}

/// Prepend one frame. The tail is never touched.
pub fn extend(ctx: &mut Ctx, space: Space, var: Value, val: Value, env: Value) -> Value {
    let frame = ctx.cons_in(space, var, val);
    ctx.cons_in(space, frame, env)
}

/// Bind formal parameters to arguments by parallel descent, prepending one
/// frame per parameter. A parameter list ending in a bare atom binds that
/// atom to the remaining argument tail (dotted rest convention); a bare
/// atom as the whole parameter list takes every argument as one list.
pub fn bind(ctx: &mut Ctx, params: Value, args: Value, env: Value) -> LispResult {
    match params {
        Value::Nil => Ok(env),
        Value::Pair(r) => {
            let (param, rest_params) = ctx.arena(r.space()).cons_cell(r);
            let (arg, rest_args) = match ctx.pair(args) {
                Some(cell) => cell,
                None => return new_eval_error("bind: not enough arguments".to_string()),
            };
            let extended = extend(ctx, Space::Scratch, param, arg, env);
            bind(ctx, rest_params, rest_args, extended)
        }
        rest @ Value::Atom(_) => Ok(extend(ctx, Space::Scratch, rest, args, env)),
        other => new_eval_error(format!(
            "bind: bad parameter list, got {}",
            other.type_name()
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn atom(ctx: &mut Ctx, name: &str) -> Value {
        Value::Atom(ctx.intern(name))
    }

    #[test]
    fn lookup_finds_the_nearest_frame() {
        let mut ctx = Ctx::new();
        let x = atom(&mut ctx, "x");
        let outer = extend(&mut ctx, Space::Scratch, x, Value::Number(1.0), Value::Nil);
        let inner = extend(&mut ctx, Space::Scratch, x, Value::Number(2.0), outer);

        let sym = ctx.intern("x");
        let found = lookup(&ctx, sym, inner).unwrap();
        assert!(matches!(found, Value::Number(n) if n == 2.0));
        // The shadowed frame is still intact underneath.
        let found = lookup(&ctx, sym, outer).unwrap();
        assert!(matches!(found, Value::Number(n) if n == 1.0));
    }

    #[test]
    fn lookup_of_missing_name_errors() {
        let mut ctx = Ctx::new();
        let sym = ctx.intern("nowhere");
        let err = lookup(&ctx, sym, ctx.global_env).unwrap_err();
        assert_eq!(err.to_string(), "undefined variable: nowhere");
    }

    #[test]
    fn undefined_tombstone_reads_as_unbound() {
        let mut ctx = Ctx::new();
        let x = atom(&mut ctx, "x");
        let env = extend(&mut ctx, Space::Scratch, x, Value::Undefined, Value::Nil);
        let sym = ctx.intern("x");
        let err = lookup(&ctx, sym, env).unwrap_err();
        assert_eq!(err.to_string(), "undefined variable: x");
        // find_frame still reaches the tombstone frame so it can be revived.
        assert!(find_frame(&ctx, sym, env).is_some());
    }

    #[test]
    fn bind_walks_params_and_args_in_parallel() {
        let mut ctx = Ctx::new();
        let a = atom(&mut ctx, "a");
        let b = atom(&mut ctx, "b");
        let params = ctx.list_from_slice(Space::Scratch, &[a, b]);
        let args =
            ctx.list_from_slice(Space::Scratch, &[Value::Number(1.0), Value::Number(2.0)]);
        let env = bind(&mut ctx, params, args, Value::Nil).unwrap();

        let sym_a = ctx.intern("a");
        let sym_b = ctx.intern("b");
        assert!(matches!(lookup(&ctx, sym_a, env).unwrap(), Value::Number(n) if n == 1.0));
        assert!(matches!(lookup(&ctx, sym_b, env).unwrap(), Value::Number(n) if n == 2.0));
    }

    #[test]
    fn dotted_rest_captures_the_tail() {
        let mut ctx = Ctx::new();
        let a = atom(&mut ctx, "a");
        let rest = atom(&mut ctx, "rest");
        // (a . rest)
        let params = ctx.cons(a, rest);
        let args = ctx.list_from_slice(
            Space::Scratch,
            &[Value::Number(1.0), Value::Number(2.0), Value::Number(3.0)],
        );
        let env = bind(&mut ctx, params, args, Value::Nil).unwrap();

        let sym_rest = ctx.intern("rest");
        let tail = lookup(&ctx, sym_rest, env).unwrap();
        assert_eq!(ctx.list_length(tail), 2);
    }

    #[test]
    fn bare_atom_params_take_everything() {
        let mut ctx = Ctx::new();
        let all = atom(&mut ctx, "all");
        let args =
            ctx.list_from_slice(Space::Scratch, &[Value::Number(1.0), Value::Number(2.0)]);
        let env = bind(&mut ctx, all, args, Value::Nil).unwrap();
        let sym = ctx.intern("all");
        let bound = lookup(&ctx, sym, env).unwrap();
        assert_eq!(ctx.list_length(bound), 2);
    }
}
