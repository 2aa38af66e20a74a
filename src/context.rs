//! The interpreter context: both arenas, the symbol interner, the global
//! environment, and the handful of pre-interned names the evaluator and
//! reader need to recognize.
//!
//! Everything that allocates goes through here, so every allocation site
//! names the arena it targets. Evaluation scratch goes to
//! [`Space::Scratch`]; only `define`/`set!` (via [`Ctx::copy_to_perm`]) and
//! bootstrap write into [`Space::Permanent`].

use std::collections::HashMap;

use string_interner::backend::StringBackend;
use string_interner::StringInterner;

use crate::arena::{Arena, Ref, Space};
use crate::core;
use crate::env;
use crate::error::{new_eval_error, LispResult};
use crate::value::{Lambda, Obj, Sym, Value};

pub type Interner = StringInterner<StringBackend<Sym>>;

/// Symbols the interpreter itself must recognize, interned once at startup.
pub struct WellKnown {
    pub t: Sym,
    pub quote: Sym,
    pub backquote: Sym,
    pub comma: Sym,
    pub lambda: Sym,
}

pub struct Ctx {
    pub perm: Arena,
    pub scratch: Arena,
    pub symbols: Interner,
    pub global_env: Value,
    pub syms: WellKnown,
}

impl Ctx {
    /// Create both arenas, intern the well-known names, seed the global
    /// environment with `#t` and one frame per primitives-table entry.
    pub fn new() -> Self {
        let mut symbols = Interner::new();
        let syms = WellKnown {
            t: symbols.get_or_intern("#t"),
            quote: symbols.get_or_intern("quote"),
            backquote: symbols.get_or_intern("backquote"),
            comma: symbols.get_or_intern("comma"),
            lambda: symbols.get_or_intern("lambda"),
        };
        let mut ctx = Ctx {
            perm: Arena::new(Space::Permanent),
            scratch: Arena::new(Space::Scratch),
            symbols,
            global_env: Value::Nil,
            syms,
        };

        let truth = ctx.true_value();
        ctx.global_env = env::extend(&mut ctx, Space::Permanent, truth, truth, Value::Nil);
        for (index, entry) in core::PRIMITIVES.iter().enumerate() {
            let name = Value::Atom(ctx.symbols.get_or_intern(entry.name));
            let prim = Value::Primitive(index as u32);
            let tail = ctx.global_env;
            ctx.global_env = env::extend(&mut ctx, Space::Permanent, name, prim, tail);
        }
        ctx
    }

    pub fn intern(&mut self, name: &str) -> Sym {
        self.symbols.get_or_intern(name)
    }

    pub fn sym_name(&self, sym: Sym) -> &str {
        self.symbols.resolve(sym).expect("atom symbol was interned")
    }

    /// The canonical truthy value, the atom `#t`.
    pub fn true_value(&self) -> Value {
        Value::Atom(self.syms.t)
    }

    pub fn arena(&self, space: Space) -> &Arena {
        match space {
            Space::Permanent => &self.perm,
            Space::Scratch => &self.scratch,
        }
    }

    pub fn arena_mut(&mut self, space: Space) -> &mut Arena {
        match space {
            Space::Permanent => &mut self.perm,
            Space::Scratch => &mut self.scratch,
        }
    }

    /// Cons into the scratch arena, the default during evaluation.
    pub fn cons(&mut self, car: Value, cdr: Value) -> Value {
        self.cons_in(Space::Scratch, car, cdr)
    }

    pub fn cons_in(&mut self, space: Space, car: Value, cdr: Value) -> Value {
        Value::Pair(self.arena_mut(space).alloc(Obj::Cons(car, cdr)))
    }

    pub fn string_in(&mut self, space: Space, text: impl Into<String>) -> Value {
        Value::Str(self.arena_mut(space).alloc(Obj::Str(text.into())))
    }

    pub fn closure(&mut self, params: Value, body: Value, env: Value) -> Value {
        Value::Closure(self.scratch.alloc(Obj::Lambda(Lambda { params, body, env })))
    }

    pub fn macro_value(&mut self, params: Value, body: Value, env: Value) -> Value {
        Value::Macro(self.scratch.alloc(Obj::Lambda(Lambda { params, body, env })))
    }

    pub fn lambda(&self, r: Ref) -> Lambda {
        *self.arena(r.space()).lambda(r)
    }

    pub fn set_lambda_env(&mut self, r: Ref, env: Value) {
        self.arena_mut(r.space()).set_lambda_env(r, env);
    }

    /// Overwrite the bound value of an environment frame in place.
    pub fn set_frame_value(&mut self, frame: Ref, value: Value) {
        self.arena_mut(frame.space()).set_cdr(frame, value);
    }

    pub fn frame_value(&self, frame: Ref) -> Value {
        self.arena(frame.space()).cons_cell(frame).1
    }

    pub fn car(&self, v: Value) -> LispResult {
        match v {
            Value::Pair(r) => Ok(self.arena(r.space()).cons_cell(r).0),
            other => new_eval_error(format!("car: expected pair, got {}", other.type_name())),
        }
    }

    pub fn cdr(&self, v: Value) -> LispResult {
        match v {
            Value::Pair(r) => Ok(self.arena(r.space()).cons_cell(r).1),
            other => new_eval_error(format!("cdr: expected pair, got {}", other.type_name())),
        }
    }

    /// Car and cdr of a pair, or `None` for anything else.
    pub fn pair(&self, v: Value) -> Option<(Value, Value)> {
        match v {
            Value::Pair(r) => Some(self.arena(r.space()).cons_cell(r)),
            _ => None,
        }
    }

    /// Number of cons cells before the first non-pair tail.
    pub fn list_length(&self, mut list: Value) -> usize {
        let mut count = 0;
        while let Some((_, cdr)) = self.pair(list) {
            count += 1;
            list = cdr;
        }
        count
    }

    /// The elements of a list, stopping at the first non-pair tail.
    pub fn list_items(&self, mut list: Value) -> Vec<Value> {
        let mut items = Vec::new();
        while let Some((car, cdr)) = self.pair(list) {
            items.push(car);
            list = cdr;
        }
        items
    }

    /// Build a proper list in the given arena from a slice of values.
    pub fn list_from_slice(&mut self, space: Space, values: &[Value]) -> Value {
        let mut list = Value::Nil;
        for &v in values.iter().rev() {
            list = self.cons_in(space, v, list);
        }
        list
    }

    /// True for a chain of cons cells ending in nil. Tortoise-and-hare:
    /// a cycle counts as improper rather than hanging the caller.
    pub fn is_proper_list(&self, list: Value) -> bool {
        let mut slow = list;
        let mut fast = list;
        loop {
            for _ in 0..2 {
                match fast {
                    Value::Nil => return true,
                    Value::Pair(r) => fast = self.arena(r.space()).cons_cell(r).1,
                    _ => return false,
                }
            }
            if let Value::Pair(r) = slow {
                slow = self.arena(r.space()).cons_cell(r).1;
            }
            if let (Value::Pair(a), Value::Pair(b)) = (fast, slow) {
                if a == b {
                    return false;
                }
            }
        }
    }

    /// Structural equality: numbers by value, atoms by name (one interned
    /// symbol per name), strings by content, compound values by address,
    /// primitives by table index.
    pub fn are_equal(&self, a: Value, b: Value) -> bool {
        match (a, b) {
            (Value::Nil, Value::Nil) | (Value::Undefined, Value::Undefined) => true,
            (Value::Number(x), Value::Number(y)) => x == y,
            (Value::Atom(x), Value::Atom(y)) => x == y,
            (Value::Str(x), Value::Str(y)) => {
                self.arena(x.space()).str_payload(x) == self.arena(y.space()).str_payload(y)
            }
            (Value::Primitive(x), Value::Primitive(y)) => x == y,
            (Value::Pair(x), Value::Pair(y)) => x == y,
            (Value::Closure(x), Value::Closure(y)) => x == y,
            (Value::Macro(x), Value::Macro(y)) => x == y,
            _ => false,
        }
    }

    /// Promote a value out of the scratch arena so it survives the
    /// end-of-cycle reset. Immediate values and anything already permanent
    /// come back unchanged; cons cells, strings, and lambda payloads are
    /// rebuilt in the permanent arena. A closure's captured environment is
    /// promoted with it, frame by frame, until the chain reaches permanent
    /// space; the permanent tail (usually the global environment) is
    /// shared by reference. The forwarding map keeps shared cells shared,
    /// so a self-referential binding ends up pointing at the promoted
    /// copy instead of sending the copy into a loop.
    pub fn copy_to_perm(&mut self, v: Value) -> Value {
        let mut forwarded = HashMap::new();
        self.promote(v, &mut forwarded)
    }

    fn promote(&mut self, v: Value, forwarded: &mut HashMap<Ref, Ref>) -> Value {
        match v {
            Value::Pair(r) if r.space() == Space::Scratch => {
                if let Some(&dest) = forwarded.get(&r) {
                    return Value::Pair(dest);
                }
                // Reserve the destination slot first so a cycle through
                // this cell resolves to it.
                let dest = self.perm.alloc(Obj::Cons(Value::Nil, Value::Nil));
                forwarded.insert(r, dest);
                let (car, cdr) = self.scratch.cons_cell(r);
                let car = self.promote(car, forwarded);
                let cdr = self.promote(cdr, forwarded);
                *self.perm.get_mut(dest) = Obj::Cons(car, cdr);
                Value::Pair(dest)
            }
            Value::Str(r) if r.space() == Space::Scratch => {
                let text = self.scratch.str_payload(r).to_owned();
                self.string_in(Space::Permanent, text)
            }
            Value::Closure(r) if r.space() == Space::Scratch => {
                Value::Closure(self.promote_lambda(r, forwarded))
            }
            Value::Macro(r) if r.space() == Space::Scratch => {
                Value::Macro(self.promote_lambda(r, forwarded))
            }
            _ => v,
        }
    }

    fn promote_lambda(&mut self, r: Ref, forwarded: &mut HashMap<Ref, Ref>) -> Ref {
        if let Some(&dest) = forwarded.get(&r) {
            return dest;
        }
        let dest = self.perm.alloc(Obj::Lambda(Lambda {
            params: Value::Nil,
            body: Value::Nil,
            env: Value::Nil,
        }));
        forwarded.insert(r, dest);
        let lambda = self.lambda(r);
        let params = self.promote(lambda.params, forwarded);
        let body = self.promote(lambda.body, forwarded);
        let env = self.promote(lambda.env, forwarded);
        *self.perm.get_mut(dest) = Obj::Lambda(Lambda { params, body, env });
        dest
    }

    /// End-of-cycle reset. Every scratch `Ref` is invalid afterwards; the
    /// deep copy performed by `define`/`set!` is what keeps the global
    /// environment out of harm's way.
    pub fn reset_scratch(&mut self) {
        self.scratch.reset();
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::env::lookup;
    use crate::printer::pr_str;

    #[test]
    fn bootstrap_binds_truth_and_primitives() {
        let mut ctx = Ctx::new();
        let t = ctx.syms.t;
        let truth = lookup(&ctx, t, ctx.global_env).unwrap();
        assert!(ctx.are_equal(truth, ctx.true_value()));
        let plus = ctx.intern("+");
        assert!(matches!(
            lookup(&ctx, plus, ctx.global_env).unwrap(),
            Value::Primitive(_)
        ));
    }

    #[test]
    fn equality_follows_the_value_kind() {
        let mut ctx = Ctx::new();
        assert!(ctx.are_equal(Value::Number(2.0), Value::Number(2.0)));
        assert!(!ctx.are_equal(Value::Number(2.0), Value::Nil));

        let a1 = Value::Atom(ctx.intern("a"));
        let a2 = Value::Atom(ctx.intern("a"));
        let b = Value::Atom(ctx.intern("b"));
        assert!(ctx.are_equal(a1, a2));
        assert!(!ctx.are_equal(a1, b));

        let s1 = ctx.string_in(Space::Scratch, "hi");
        let s2 = ctx.string_in(Space::Scratch, "hi");
        assert!(ctx.are_equal(s1, s2));

        // Pairs compare by address, not structure.
        let p1 = ctx.cons(Value::Number(1.0), Value::Nil);
        let p2 = ctx.cons(Value::Number(1.0), Value::Nil);
        assert!(!ctx.are_equal(p1, p2));
        assert!(ctx.are_equal(p1, p1));
    }

    #[test]
    fn proper_list_detection() {
        let mut ctx = Ctx::new();
        let proper = ctx.list_from_slice(Space::Scratch, &[Value::Number(1.0), Value::Number(2.0)]);
        assert!(ctx.is_proper_list(proper));
        assert!(ctx.is_proper_list(Value::Nil));

        let dotted = ctx.cons(Value::Number(1.0), Value::Number(2.0));
        assert!(!ctx.is_proper_list(dotted));
    }

    #[test]
    fn cyclic_list_is_not_proper() {
        let mut ctx = Ctx::new();
        let cell = ctx.cons(Value::Number(1.0), Value::Nil);
        let Value::Pair(r) = cell else { unreachable!() };
        ctx.arena_mut(Space::Scratch).set_cdr(r, cell);
        assert!(!ctx.is_proper_list(cell));
    }

    #[test]
    fn copy_to_perm_rebuilds_structure() {
        let mut ctx = Ctx::new();
        let s = ctx.string_in(Space::Scratch, "text");
        let inner = ctx.list_from_slice(Space::Scratch, &[Value::Number(2.0), s]);
        let list = ctx.list_from_slice(Space::Scratch, &[Value::Number(1.0), inner]);
        let promoted = ctx.copy_to_perm(list);
        ctx.reset_scratch();
        assert_eq!(pr_str(&ctx, promoted), "(1 (2 \"text\"))");
        assert_no_scratch_refs(&ctx, promoted);
    }

    #[test]
    fn promoted_closure_keeps_captured_frames() {
        let mut ctx = Ctx::new();
        let n = Value::Atom(ctx.intern("n"));
        let genv = ctx.global_env;
        let local = env::extend(&mut ctx, Space::Scratch, n, Value::Number(10.0), genv);
        let clo = ctx.closure(Value::Nil, Value::Number(1.0), local);
        let promoted = ctx.copy_to_perm(clo);
        ctx.reset_scratch();
        let Value::Closure(r) = promoted else { unreachable!() };
        // The captured frame was rebuilt in the permanent arena and the
        // chain still bottoms out in the shared global environment.
        let captured = ctx.lambda(r).env;
        let sym = ctx.intern("n");
        let found = lookup(&ctx, sym, captured).unwrap();
        assert!(matches!(found, Value::Number(x) if x == 10.0));
        let plus = ctx.intern("+");
        assert!(lookup(&ctx, plus, captured).is_ok());
        assert_no_scratch_refs(&ctx, promoted);
    }

    #[test]
    fn promotion_preserves_self_reference() {
        let mut ctx = Ctx::new();
        let g = Value::Atom(ctx.intern("g"));
        let clo = ctx.closure(Value::Nil, Value::Number(1.0), Value::Nil);
        let genv = ctx.global_env;
        let local = env::extend(&mut ctx, Space::Scratch, g, clo, genv);
        let Value::Closure(cr) = clo else { unreachable!() };
        ctx.set_lambda_env(cr, local);
        let promoted = ctx.copy_to_perm(clo);
        ctx.reset_scratch();
        let Value::Closure(pr) = promoted else { unreachable!() };
        let sym = ctx.intern("g");
        let bound = lookup(&ctx, sym, ctx.lambda(pr).env).unwrap();
        assert!(
            ctx.are_equal(bound, promoted),
            "self frame points at the copy"
        );
        assert_no_scratch_refs(&ctx, promoted);
    }

    fn assert_no_scratch_refs(ctx: &Ctx, root: Value) {
        let mut seen = HashSet::new();
        walk(ctx, root, &mut seen);
    }

    fn walk(ctx: &Ctx, v: Value, seen: &mut HashSet<crate::arena::Ref>) {
        match v {
            Value::Pair(r) => {
                assert_eq!(r.space(), Space::Permanent, "pair left in scratch");
                if seen.insert(r) {
                    let (car, cdr) = ctx.perm.cons_cell(r);
                    walk(ctx, car, seen);
                    walk(ctx, cdr, seen);
                }
            }
            Value::Str(r) => assert_eq!(r.space(), Space::Permanent, "string left in scratch"),
            Value::Closure(r) | Value::Macro(r) => {
                assert_eq!(r.space(), Space::Permanent, "lambda left in scratch");
                if seen.insert(r) {
                    let lambda = ctx.lambda(r);
                    walk(ctx, lambda.params, seen);
                    walk(ctx, lambda.body, seen);
                    walk(ctx, lambda.env, seen);
                }
            }
            _ => {}
        }
    }
}
