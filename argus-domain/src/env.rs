use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use argus_types::{Address, Register};
use itertools::{merge_join_by, EitherOrBoth};

/// A key of the environment: a register, a single memory byte, or a
/// compressed run of equal-valued bytes `[lo..=hi]`.
///
/// All register keys precede all memory keys; memory keys order by start
/// address. An environment never holds two overlapping memory keys, so
/// the order is total over every reachable key set.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[derive(serde::Deserialize, serde::Serialize)]
pub enum Dimension {
    Reg(Register),
    Mem(Address),
    MemItv(Address, Address),
}

impl Dimension {
    fn start(&self) -> Address {
        match self {
            Self::Reg(_) => unreachable!("register dimensions have no address"),
            Self::Mem(a) => *a,
            Self::MemItv(lo, _) => *lo,
        }
    }

    fn end(&self) -> Address {
        match self {
            Self::Reg(_) => unreachable!("register dimensions have no address"),
            Self::Mem(a) => *a,
            Self::MemItv(_, hi) => *hi,
        }
    }

    pub fn is_mem(&self) -> bool {
        !matches!(self, Self::Reg(_))
    }

    fn tag(&self) -> u8 {
        match self {
            Self::Reg(_) => 0,
            Self::Mem(_) => 1,
            Self::MemItv(_, _) => 2,
        }
    }

    /// Whether this key covers the byte at `addr`.
    pub fn covers(&self, addr: Address) -> bool {
        match self {
            Self::Reg(_) => false,
            Self::Mem(a) => *a == addr,
            Self::MemItv(lo, hi) => *lo <= addr && addr <= *hi,
        }
    }
}

impl PartialOrd for Dimension {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Dimension {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Reg(a), Self::Reg(b)) => a.cmp(b),
            (Self::Reg(_), _) => Ordering::Less,
            (_, Self::Reg(_)) => Ordering::Greater,
            _ => self
                .start()
                .cmp(&other.start())
                .then(self.end().cmp(&other.end()))
                .then_with(|| self.tag().cmp(&other.tag())),
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reg(r) => write!(f, "{}", r),
            Self::Mem(a) => write!(f, "mem[{}]", a),
            Self::MemItv(lo, hi) => write!(f, "mem[{}..={}]", lo, hi),
        }
    }
}

/// The unrelational environment: an ordered map from dimensions to cell
/// values. Point and range memory keys share the tree; the enclosing-run
/// lookup is a single `O(log n)` range probe.
#[derive(Debug, Clone, PartialEq)]
pub struct Env<V> {
    cells: BTreeMap<Dimension, V>,
}

impl<V> Default for Env<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> Env<V> {
    pub fn new() -> Self {
        Self {
            cells: BTreeMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Install a binding, new or replacing.
    pub fn add(&mut self, key: Dimension, value: V) {
        self.cells.insert(key, value);
    }

    /// Replace an existing binding.
    pub fn replace(&mut self, key: Dimension, value: V) {
        debug_assert!(self.cells.contains_key(&key));
        self.cells.insert(key, value);
    }

    pub fn remove(&mut self, key: &Dimension) -> Option<V> {
        self.cells.remove(key)
    }

    pub fn find(&self, key: &Dimension) -> Option<&V> {
        self.cells.get(key)
    }

    pub fn find_reg(&self, r: &Register) -> Option<&V> {
        self.cells.get(&Dimension::Reg(*r))
    }

    /// The key covering the byte at `addr`: either `Mem(addr)` itself or
    /// an enclosing `MemItv`.
    pub fn find_mem(&self, addr: Address) -> Option<(&Dimension, &V)> {
        let probe = Dimension::MemItv(addr, Address::from(u64::MAX));
        let (key, value) = self.cells.range(..=probe).next_back()?;
        key.covers(addr).then_some((key, value))
    }

    /// Remove and return the binding covering `addr`.
    pub fn take_mem(&mut self, addr: Address) -> Option<(Dimension, V)> {
        let key = self.find_mem(addr)?.0.clone();
        let value = self.cells.remove(&key)?;
        Some((key, value))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Dimension, &V)> {
        self.cells.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &Dimension> {
        self.cells.keys()
    }

    /// Pointwise map over every cell.
    pub fn map<F: FnMut(&Dimension, &V) -> V>(&self, mut f: F) -> Self {
        Self {
            cells: self
                .cells
                .iter()
                .map(|(k, v)| (k.clone(), f(k, v)))
                .collect(),
        }
    }

    pub fn fold<A, F: FnMut(A, &Dimension, &V) -> A>(&self, init: A, mut f: F) -> A {
        self.cells
            .iter()
            .fold(init, |acc, (k, v)| f(acc, k, v))
    }

    /// Pointwise predicate over the keyset union; one-sided keys see
    /// `None` for the missing side.
    pub fn for_all2<F>(&self, other: &Self, mut f: F) -> bool
    where
        F: FnMut(&Dimension, Option<&V>, Option<&V>) -> bool,
    {
        merge_join_by(self.cells.iter(), other.cells.iter(), |(ka, _), (kb, _)| {
            ka.cmp(kb)
        })
        .all(|pair| match pair {
            EitherOrBoth::Both((k, a), (_, b)) => f(k, Some(a), Some(b)),
            EitherOrBoth::Left((k, a)) => f(k, Some(a), None),
            EitherOrBoth::Right((k, b)) => f(k, None, Some(b)),
        })
    }

    /// Pointwise merge over the keyset union; returning `None` drops the
    /// key from the result.
    pub fn map2<F>(&self, other: &Self, mut f: F) -> Self
    where
        V: Clone,
        F: FnMut(&Dimension, Option<&V>, Option<&V>) -> Option<V>,
    {
        let cells = merge_join_by(self.cells.iter(), other.cells.iter(), |(ka, _), (kb, _)| {
            ka.cmp(kb)
        })
        .filter_map(|pair| match pair {
            EitherOrBoth::Both((k, a), (_, b)) => f(k, Some(a), Some(b)).map(|v| (k.clone(), v)),
            EitherOrBoth::Left((k, a)) => f(k, Some(a), None).map(|v| (k.clone(), v)),
            EitherOrBoth::Right((k, b)) => f(k, None, Some(b)).map(|v| (k.clone(), v)),
        })
        .collect();
        Self { cells }
    }
}

impl<V: fmt::Display> fmt::Display for Env<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (k, v) in self.cells.iter() {
            writeln!(f, "{} = {}", k, v)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn addr(a: u64) -> Address {
        Address::from(a)
    }

    #[test]
    fn test_registers_precede_memory() {
        let r = Dimension::Reg(Register::new("zz", 32));
        let m = Dimension::Mem(addr(0));
        assert!(r < m);
    }

    #[test]
    fn test_memory_orders_by_start() {
        let a = Dimension::Mem(addr(0x10));
        let b = Dimension::MemItv(addr(0x11), addr(0x20));
        let c = Dimension::Mem(addr(0x21));
        assert!(a < b && b < c);
    }

    #[test]
    fn test_find_mem_point() {
        let mut env = Env::new();
        env.add(Dimension::Mem(addr(0x10)), 1u32);
        assert_eq!(env.find_mem(addr(0x10)), Some((&Dimension::Mem(addr(0x10)), &1)));
        assert_eq!(env.find_mem(addr(0x11)), None);
    }

    #[test]
    fn test_find_mem_enclosing_interval() {
        let mut env = Env::new();
        env.add(Dimension::Reg(Register::new("eax", 32)), 0u32);
        env.add(Dimension::MemItv(addr(0x100), addr(0x1ff)), 7u32);
        env.add(Dimension::Mem(addr(0x200)), 9u32);

        let (k, v) = env.find_mem(addr(0x180)).unwrap();
        assert_eq!(k, &Dimension::MemItv(addr(0x100), addr(0x1ff)));
        assert_eq!(*v, 7);

        // boundaries are inclusive
        assert!(env.find_mem(addr(0x100)).is_some());
        assert!(env.find_mem(addr(0x1ff)).is_some());
        assert!(env.find_mem(addr(0xff)).is_none());
        assert_eq!(env.find_mem(addr(0x200)).unwrap().1, &9);
    }

    #[test]
    fn test_fold() {
        let mut env = Env::new();
        env.add(Dimension::Mem(addr(1)), 1u32);
        env.add(Dimension::Mem(addr(2)), 2u32);
        let sum = env.fold(0u32, |acc, _, v| acc + v);
        assert_eq!(sum, 3);
    }

    #[test]
    fn test_map2_union() {
        let mut a = Env::new();
        let mut b = Env::new();
        a.add(Dimension::Mem(addr(1)), 1u32);
        a.add(Dimension::Mem(addr(2)), 2u32);
        b.add(Dimension::Mem(addr(2)), 20u32);
        b.add(Dimension::Mem(addr(3)), 30u32);

        let joined = a.map2(&b, |_, x, y| {
            Some(x.copied().unwrap_or(0) + y.copied().unwrap_or(0))
        });
        assert_eq!(joined.find(&Dimension::Mem(addr(1))), Some(&1));
        assert_eq!(joined.find(&Dimension::Mem(addr(2))), Some(&22));
        assert_eq!(joined.find(&Dimension::Mem(addr(3))), Some(&30));
    }
}
