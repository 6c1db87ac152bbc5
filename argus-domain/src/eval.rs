use argus_il::{BinOp, BoolExpr, Expr, Lval};
use argus_types::{Register, Word};

use crate::cell::CellValue;
use crate::config::{Content, Region};
use crate::domain::Machine;
use crate::env::Env;
use crate::error::Error;
use crate::mem;

fn same_register(a: &Expr, b: &Expr) -> Option<Register> {
    match (a, b) {
        (Expr::Lval(Lval::Var(r1)), Expr::Lval(Lval::Var(r2))) if r1 == r2 => Some(*r1),
        _ => None,
    }
}

/// Evaluate an expression to a cell value and a taint-propagation bit.
pub fn eval_expr<V: CellValue>(
    machine: &Machine,
    env: &Env<V>,
    e: &Expr,
) -> Result<(V, bool), Error> {
    match e {
        Expr::Val(w) => Ok((V::of_word(*w), false)),

        Expr::Lval(lv) => eval_lval(machine, env, lv),

        Expr::BinOp(BinOp::XOR, e1, e2) if same_register(e1, e2).is_some() => {
            // xor-self zeroing idiom; the stack pointer keeps its region
            let r = same_register(e1, e2).unwrap();
            if r == *machine.stack_pointer() {
                Ok((
                    V::of_config(Region::Stack, &Content::Concrete(0), r.bits())?,
                    false,
                ))
            } else {
                Ok((V::of_word(Word::zero(r.bits())).untaint(), false))
            }
        }

        Expr::BinOp(op, e1, e2) => {
            let (v1, b1) = eval_expr(machine, env, e1)?;
            let (v2, b2) = eval_expr(machine, env, e2)?;
            let v = V::binary(*op, &v1, &v2);
            let tainted = b1 || b2 || v.is_tainted();
            Ok((v, tainted))
        }

        Expr::UnOp(op, e1) => {
            let (v1, b1) = eval_expr(machine, env, e1)?;
            let v = V::unary(*op, &v1);
            let tainted = b1 || v.is_tainted();
            Ok((v, tainted))
        }

        Expr::IfElse(c, e_then, e_else) => {
            let (feasible_t, taint_t) = eval_bexpr(machine, env, c, true)?;
            let (feasible_f, taint_f) = eval_bexpr(machine, env, c, false)?;
            let (v, b) = match (feasible_t, feasible_f) {
                (true, true) => {
                    let (vt, bt) = eval_expr(machine, env, e_then)?;
                    let (vf, bf) = eval_expr(machine, env, e_else)?;
                    (vt.join(&vf), bt || bf)
                }
                (true, false) => eval_expr(machine, env, e_then)?,
                (false, true) => eval_expr(machine, env, e_else)?,
                (false, false) => (V::bot(), false),
            };
            let tainted = b || taint_t || taint_f;
            Ok((if tainted { v.taint() } else { v }, tainted))
        }
    }
}

fn eval_lval<V: CellValue>(
    machine: &Machine,
    env: &Env<V>,
    lv: &Lval,
) -> Result<(V, bool), Error> {
    match lv {
        Lval::Var(r) => Ok(match env.find_reg(r) {
            Some(v) => (v.clone(), v.is_tainted()),
            None => (V::bot(), false),
        }),

        Lval::Slice(r, lo, hi) => Ok(match env.find_reg(r) {
            Some(v) => {
                let tainted = v.is_tainted();
                (v.extract(*lo, *hi), tainted)
            }
            None => (V::bot(), false),
        }),

        Lval::Mem(e, bits) => {
            let (va, b) = eval_expr(machine, env, e)?;
            let addrs = match va.to_addresses() {
                Ok(addrs) => addrs,
                // too wide to enumerate: any value, assumed influenced
                Err(Error::EnumFailure) => return Ok((V::top(), true)),
                Err(err) => return Err(err),
            };
            if addrs.is_empty() {
                return Err(Error::BotDeref);
            }
            let mut tainted = b;
            let mut value: Option<V> = None;
            for a in addrs {
                let v = mem::read(env, machine.sections(), a, *bits, machine.endian());
                tainted = tainted || v.is_tainted();
                value = Some(match value {
                    Some(prev) => prev.join(&v),
                    None => v,
                });
            }
            let value = value.unwrap();
            if value.is_bot() {
                return Err(Error::BotDeref);
            }
            Ok((value, tainted))
        }
    }
}

/// Evaluate a boolean expression under the truth setting `branch`,
/// returning feasibility and a taint bit. Negation flips the setting;
/// conjunction and disjunction dualise with it.
pub fn eval_bexpr<V: CellValue>(
    machine: &Machine,
    env: &Env<V>,
    c: &BoolExpr,
    branch: bool,
) -> Result<(bool, bool), Error> {
    match c {
        BoolExpr::Val(x) => Ok((*x == branch, false)),

        BoolExpr::Not(e) => eval_bexpr(machine, env, e, !branch),

        BoolExpr::And(e1, e2) => {
            let (f1, t1) = eval_bexpr(machine, env, e1, branch)?;
            let (f2, t2) = eval_bexpr(machine, env, e2, branch)?;
            let feasible = if branch { f1 && f2 } else { f1 || f2 };
            Ok((feasible, t1 || t2))
        }

        BoolExpr::Or(e1, e2) => {
            let (f1, t1) = eval_bexpr(machine, env, e1, branch)?;
            let (f2, t2) = eval_bexpr(machine, env, e2, branch)?;
            let feasible = if branch { f1 || f2 } else { f1 && f2 };
            Ok((feasible, t1 || t2))
        }

        BoolExpr::Cmp(rel, e1, e2) => {
            let (v1, t1) = eval_expr(machine, env, e1)?;
            let (v2, t2) = eval_expr(machine, env, e2)?;
            if v1.is_bot() || v2.is_bot() {
                return Ok((false, t1 || t2));
            }
            let rel = if branch { *rel } else { rel.invert() };
            Ok((V::compare(&v1, rel, &v2)?, t1 || t2))
        }
    }
}
