use std::fmt;

use argus_il::{BinOp, BinRel, UnOp};
use argus_types::{Address, Taint, Word};
use smallvec::SmallVec;

use crate::config::{Content, Region, TaintSpec};
use crate::error::Error;

/// A small set of concrete addresses, the concretization of an abstract
/// pointer. Address sets are almost always tiny.
pub type AddrSet = SmallVec<[Address; 4]>;

/// The cell-value contract: a lattice element describing the possible
/// contents of a bit-string cell together with its taint.
///
/// The domain is a functor over this trait; implementations are plugged
/// in at build time and the access loops monomorphise over them.
pub trait CellValue: Clone + fmt::Debug + fmt::Display + PartialEq {
    fn bot() -> Self;
    fn top() -> Self;
    fn is_bot(&self) -> bool;
    fn is_subset(&self, other: &Self) -> bool;

    fn join(&self, other: &Self) -> Self;
    fn meet(&self, other: &Self) -> Self;
    /// Must satisfy the standard stabilization property: iterated
    /// widening of any ascending chain reaches a fixpoint.
    fn widen(&self, other: &Self) -> Self;

    /// Lift a concrete word of known width.
    fn of_word(w: Word) -> Self;
    /// Lift an externally-configured content of `bits` bits.
    fn of_config(region: Region, content: &Content, bits: usize) -> Result<Self, Error>;
    /// Attach a configured taint pattern over a cell of `bits` bits.
    fn taint_of_config(&self, taint: &TaintSpec, bits: usize) -> Result<Self, Error>;

    /// Materialise the value; fails with `Concretization` when it is not
    /// a singleton.
    fn to_word(&self) -> Result<Word, Error>;
    /// Materialise as a single byte.
    fn to_char(&self) -> Result<u8, Error>;
    /// Materialise as a prefixed hexadecimal literal (`0x…`).
    fn to_literal(&self) -> Result<String, Error>;
    /// Materialise value and taint as prefixed hexadecimal literals.
    fn to_strings(&self) -> Result<(String, String), Error>;
    /// The finite set of concrete addresses in the concretization, or
    /// `EnumFailure` when it cannot be enumerated. Bottom enumerates to
    /// the empty set.
    fn to_addresses(&self) -> Result<AddrSet, Error>;

    fn binary(op: BinOp, a: &Self, b: &Self) -> Self;
    fn unary(op: UnOp, a: &Self) -> Self;
    /// Whether `a rel b` may hold for some concretization.
    fn compare(a: &Self, rel: BinRel, b: &Self) -> Result<bool, Error>;

    /// Bits `lo..=hi`, reindexed from zero.
    fn extract(&self, lo: usize, hi: usize) -> Self;
    /// `len` bits starting at bit position `pos`.
    fn from_position(&self, pos: usize, len: usize) -> Self;
    /// Concatenation, most significant part first.
    fn concat(parts: &[Self]) -> Self;
    /// Splice `other` into bits `lo..=hi` of `self`.
    fn combine(&self, other: &Self, lo: usize, hi: usize) -> Self;
    /// `pattern` of `pattern_bits` bits repeated `n` times.
    fn of_repeat(pattern: &Self, pattern_bits: usize, n: usize) -> Self;

    /// Drop the value, keep the taint.
    fn forget(&self) -> Self;
    fn untaint(&self) -> Self;
    fn taint(&self) -> Self;
    /// Spread `t` across every bit of the cell.
    fn span_taint(&self, t: Taint) -> Self;
    fn is_tainted(&self) -> bool;
    /// The weakest taint consistent with the cell.
    fn minimal_taint(&self) -> Taint;
}
