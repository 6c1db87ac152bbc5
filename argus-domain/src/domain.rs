use std::fmt;
use std::sync::Arc;

use argus_il::{BinRel, Expr, Lval};
use argus_loader::SectionTable;
use argus_types::{Endian, Register};

use crate::cell::CellValue;
use crate::env::{Dimension, Env};
use crate::error::Error;
use crate::eval;
use crate::mem;

/// Analysis-wide context: the section backing of the loaded binary and
/// the target conventions the domain needs. Shared across forked states;
/// the backing is read-only.
pub struct Machine {
    sections: Arc<SectionTable>,
    stack_pointer: Register,
    operand_size: usize,
    endian: Endian,
}

impl Machine {
    pub fn new(
        sections: Arc<SectionTable>,
        stack_pointer: Register,
        operand_size: usize,
        endian: Endian,
    ) -> Self {
        log::debug!(
            "machine: {} sections, sp {}, operand size {}",
            sections.sections().len(),
            stack_pointer,
            operand_size
        );
        Self {
            sections,
            stack_pointer,
            operand_size,
            endian,
        }
    }

    pub fn sections(&self) -> &SectionTable {
        &self.sections
    }

    pub fn stack_pointer(&self) -> &Register {
        &self.stack_pointer
    }

    pub fn operand_size(&self) -> usize {
        self.operand_size
    }

    pub fn endian(&self) -> Endian {
        self.endian
    }
}

#[derive(Clone)]
enum Store<V> {
    Bottom,
    Env(Env<V>),
}

/// The two-point lifted domain state: either the empty concretization or
/// an environment of cells. All updates are functional; lattice results
/// never alias their inputs.
#[derive(Clone)]
pub struct Domain<V: CellValue> {
    machine: Arc<Machine>,
    store: Store<V>,
}

impl<V: CellValue> Domain<V> {
    /// A fresh, unconstrained state over a loaded binary.
    pub fn init(machine: Arc<Machine>) -> Self {
        Self {
            machine,
            store: Store::Env(Env::new()),
        }
    }

    pub fn bottom(machine: Arc<Machine>) -> Self {
        Self {
            machine,
            store: Store::Bottom,
        }
    }

    pub(crate) fn to_bottom(&self) -> Self {
        Self::bottom(self.machine.clone())
    }

    pub(crate) fn with_env(&self, env: Env<V>) -> Self {
        Self {
            machine: self.machine.clone(),
            store: Store::Env(env),
        }
    }

    pub fn machine(&self) -> &Arc<Machine> {
        &self.machine
    }

    pub fn env(&self) -> Option<&Env<V>> {
        match &self.store {
            Store::Bottom => None,
            Store::Env(env) => Some(env),
        }
    }

    pub fn is_bot(&self) -> bool {
        matches!(self.store, Store::Bottom)
    }

    pub fn is_subset(&self, other: &Self) -> bool {
        match (&self.store, &other.store) {
            (Store::Bottom, _) => true,
            (_, Store::Bottom) => false,
            (Store::Env(a), Store::Env(b)) => a.for_all2(b, |_, x, y| match (x, y) {
                (Some(x), Some(y)) => x.is_subset(y),
                // one-sided keys are preserved by join, not compared
                _ => true,
            }),
        }
    }

    pub fn join(&self, other: &Self) -> Self {
        match (&self.store, &other.store) {
            (Store::Bottom, _) => other.clone(),
            (_, Store::Bottom) => self.clone(),
            (Store::Env(a), Store::Env(b)) => {
                let env = a.map2(b, |_, x, y| match (x, y) {
                    (Some(x), Some(y)) => Some(x.join(y)),
                    (Some(x), None) => Some(x.clone()),
                    (None, Some(y)) => Some(y.clone()),
                    (None, None) => None,
                });
                self.with_env(env)
            }
        }
    }

    pub fn meet(&self, other: &Self) -> Self {
        match (&self.store, &other.store) {
            (Store::Bottom, _) | (_, Store::Bottom) => self.to_bottom(),
            (Store::Env(a), Store::Env(b)) => {
                if a.is_empty() {
                    return other.clone();
                }
                if b.is_empty() {
                    return self.clone();
                }
                let mut infeasible = false;
                let env = a.map2(b, |_, x, y| match (x, y) {
                    (Some(x), Some(y)) => {
                        let met = x.meet(y);
                        if met.is_bot() {
                            infeasible = true;
                        }
                        Some(met)
                    }
                    // keys on one side only are unconstrained on the other
                    _ => None,
                });
                if infeasible {
                    self.to_bottom()
                } else {
                    self.with_env(env)
                }
            }
        }
    }

    pub fn widen(&self, other: &Self) -> Self {
        match (&self.store, &other.store) {
            (Store::Bottom, _) => other.clone(),
            (_, Store::Bottom) => self.clone(),
            (Store::Env(a), Store::Env(b)) => {
                let env = a.map2(b, |_, x, y| match (x, y) {
                    (Some(x), Some(y)) => Some(x.widen(y)),
                    _ => Some(V::top()),
                });
                self.with_env(env)
            }
        }
    }

    /// Drop every value in the state.
    pub fn forget(&self) -> Self {
        match &self.store {
            Store::Bottom => self.to_bottom(),
            Store::Env(env) => self.with_env(env.map(|_, _| V::top())),
        }
    }

    /// Drop the value of one register, keeping its taint.
    pub fn forget_register(&self, r: &Register) -> Self {
        match &self.store {
            Store::Bottom => self.to_bottom(),
            Store::Env(env) => {
                let mut env = env.clone();
                let forgotten = match env.find_reg(r) {
                    Some(v) => v.forget(),
                    None => V::top(),
                };
                env.add(Dimension::Reg(*r), forgotten);
                self.with_env(env)
            }
        }
    }

    /// When the rvalue flows through a memory read or an operator, its
    /// own minimal taint is spread over the whole assigned cell so that
    /// per-bit taint is not lost on the way to the destination.
    fn span_rvalue_taint(src: &Expr, value: V) -> V {
        match src {
            Expr::Lval(Lval::Mem(_, _)) | Expr::UnOp(_, _) | Expr::BinOp(_, _, _) => {
                let t = value.minimal_taint();
                if t.is_tainted() {
                    value.span_taint(t)
                } else {
                    value
                }
            }
            _ => value,
        }
    }

    /// Assign `src` to `dst`, returning the updated state and whether
    /// the assignment propagated taint.
    pub fn set(&self, dst: &Lval, src: &Expr) -> Result<(Self, bool), Error> {
        let Store::Env(env) = &self.store else {
            return Ok((self.to_bottom(), false));
        };

        let (value, tainted) = match eval::eval_expr(&self.machine, env, src) {
            Ok(r) => r,
            Err(Error::BotDeref) => return Ok((self.to_bottom(), false)),
            Err(err) => return Err(err),
        };
        let value = Self::span_rvalue_taint(src, value);
        if value.is_bot() {
            return Ok((self.to_bottom(), tainted));
        }

        let mut env = env.clone();
        match dst {
            Lval::Var(r) => {
                env.add(Dimension::Reg(*r), value);
            }
            Lval::Slice(r, lo, hi) => {
                let Some(prev) = env.find_reg(r) else {
                    return Ok((self.to_bottom(), tainted));
                };
                let combined = prev.combine(&value, *lo, *hi);
                if combined.is_bot() {
                    return Ok((self.to_bottom(), tainted));
                }
                env.add(Dimension::Reg(*r), combined);
            }
            Lval::Mem(e, bits) => {
                let (va, _) = match eval::eval_expr(&self.machine, &env, e) {
                    Ok(r) => r,
                    Err(Error::BotDeref) => return Ok((self.to_bottom(), false)),
                    Err(err) => return Err(err),
                };
                let addrs = va.to_addresses()?;
                if addrs.is_empty() {
                    return Ok((self.to_bottom(), false));
                }
                let strong = addrs.len() == 1;
                for a in addrs {
                    match mem::write(&mut env, a, &value, *bits, strong, self.machine.endian()) {
                        Ok(()) => {}
                        Err(Error::Empty) => return Ok((self.to_bottom(), false)),
                        Err(err) => return Err(err),
                    }
                }
            }
        }
        Ok((self.with_env(env), tainted))
    }

    /// Keep the state only where `e1 rel e2` may hold, refining an
    /// equality on a whole register by meeting it with the right side.
    pub fn compare(&self, e1: &Expr, rel: BinRel, e2: &Expr) -> Result<(Self, bool), Error> {
        let Store::Env(env) = &self.store else {
            return Ok((self.to_bottom(), false));
        };

        let evaluated = (|| -> Result<_, Error> {
            let (v1, t1) = eval::eval_expr(&self.machine, env, e1)?;
            let (v2, t2) = eval::eval_expr(&self.machine, env, e2)?;
            Ok((v1, v2, t1 || t2))
        })();
        let (v1, v2, tainted) = match evaluated {
            Ok(r) => r,
            Err(Error::BotDeref) => return Ok((self.to_bottom(), false)),
            Err(err) => return Err(err),
        };

        if v1.is_bot() || v2.is_bot() {
            return Ok((self.to_bottom(), false));
        }
        if !V::compare(&v1, rel, &v2)? {
            return Ok((self.to_bottom(), false));
        }

        if let (Expr::Lval(Lval::Var(r)), BinRel::EQ) = (e1, rel) {
            if let Some(prev) = env.find_reg(r) {
                let met = prev.meet(&v2);
                if met.is_bot() {
                    return Ok((self.to_bottom(), false));
                }
                let mut env = env.clone();
                env.replace(Dimension::Reg(*r), met);
                return Ok((self.with_env(env), tainted));
            }
        }
        Ok((self.clone(), tainted))
    }
}

impl<V: CellValue> fmt::Display for Domain<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.store {
            Store::Bottom => writeln!(f, "bot"),
            Store::Env(env) => write!(f, "{}", env),
        }
    }
}
