use std::fmt;

use argus_il::{BinOp, BinRel, UnOp};
use argus_types::{Address, Taint, Word};
use smallvec::smallvec;

use crate::cell::{AddrSet, CellValue};
use crate::config::{Content, Region, TaintSpec};
use crate::error::Error;

/// Concrete-plus-taint cell value: either a single known bit-string or an
/// unknown one, carrying a taint pattern and a region tag.
///
/// A width of zero marks a cell of unknown extent (the unconstrained top).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaintedConst {
    Bot,
    Cell {
        bits: usize,
        region: Region,
        value: Option<u128>,
        taint: Taint,
    },
}

fn full_mask(bits: usize) -> u128 {
    if bits >= 128 {
        u128::MAX
    } else {
        (1u128 << bits) - 1
    }
}

impl TaintedConst {
    fn cell(bits: usize, region: Region, value: Option<u128>, taint: Taint) -> Self {
        Self::Cell {
            bits,
            region,
            value: value.map(|v| v & full_mask(bits)),
            taint,
        }
    }

    pub fn value(&self) -> Option<u128> {
        match self {
            Self::Cell { value, .. } => *value,
            Self::Bot => None,
        }
    }

    pub fn region(&self) -> Option<Region> {
        match self {
            Self::Cell { region, .. } => Some(*region),
            Self::Bot => None,
        }
    }

    pub fn bits(&self) -> usize {
        match self {
            Self::Cell { bits, .. } => *bits,
            Self::Bot => 0,
        }
    }

    fn taint_part(&self) -> Taint {
        match self {
            Self::Cell { taint, .. } => *taint,
            Self::Bot => Taint::Untainted,
        }
    }

    fn spread(bits: usize) -> Taint {
        if bits > 0 {
            Taint::Tainted(full_mask(bits))
        } else {
            Taint::Top
        }
    }

    fn parse_nibbles(s: &str) -> Result<u128, Error> {
        if s.is_empty() || s.len() > 32 {
            return Err(Error::Concretization);
        }
        u128::from_str_radix(s, 16).map_err(|_| Error::Concretization)
    }
}

impl CellValue for TaintedConst {
    fn bot() -> Self {
        Self::Bot
    }

    fn top() -> Self {
        Self::Cell {
            bits: 0,
            region: Region::Global,
            value: None,
            taint: Taint::Top,
        }
    }

    fn is_bot(&self) -> bool {
        matches!(self, Self::Bot)
    }

    fn is_subset(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Bot, _) => true,
            (_, Self::Bot) => false,
            (
                Self::Cell {
                    region: ra,
                    value: va,
                    taint: ta,
                    ..
                },
                Self::Cell {
                    region: rb,
                    value: vb,
                    taint: tb,
                    ..
                },
            ) => {
                let values = match (va, vb) {
                    (_, None) => true,
                    (Some(x), Some(y)) => x == y && ra == rb,
                    (None, Some(_)) => false,
                };
                values && ta.is_subset(tb)
            }
        }
    }

    fn join(&self, other: &Self) -> Self {
        match (self, other) {
            (Self::Bot, v) | (v, Self::Bot) => v.clone(),
            (
                Self::Cell {
                    bits: ba,
                    region: ra,
                    value: va,
                    taint: ta,
                },
                Self::Cell {
                    bits: bb,
                    region: rb,
                    value: vb,
                    taint: tb,
                },
            ) => {
                let bits = if ba == bb { *ba } else { 0 };
                let (region, value) = if ra == rb {
                    (*ra, if va == vb { *va } else { None })
                } else {
                    (Region::Global, None)
                };
                Self::Cell {
                    bits,
                    region,
                    value,
                    taint: ta.join(tb),
                }
            }
        }
    }

    fn meet(&self, other: &Self) -> Self {
        match (self, other) {
            (Self::Bot, _) | (_, Self::Bot) => Self::Bot,
            (
                Self::Cell {
                    bits: ba,
                    region: ra,
                    value: va,
                    taint: ta,
                },
                Self::Cell {
                    bits: bb,
                    region: rb,
                    value: vb,
                    taint: tb,
                },
            ) => {
                let (region, value) = match (va, vb) {
                    (Some(x), Some(y)) => {
                        if x == y && ra == rb {
                            (*ra, Some(*x))
                        } else {
                            return Self::Bot;
                        }
                    }
                    (Some(x), None) => (*ra, Some(*x)),
                    (None, Some(y)) => (*rb, Some(*y)),
                    (None, None) => (if ra == rb { *ra } else { Region::Global }, None),
                };
                Self::Cell {
                    bits: if *ba > 0 { *ba } else { *bb },
                    region,
                    value,
                    taint: ta.meet(tb),
                }
            }
        }
    }

    fn widen(&self, other: &Self) -> Self {
        // flat value lattice; join already stabilises
        self.join(other)
    }

    fn of_word(w: Word) -> Self {
        Self::cell(w.bits(), Region::Global, Some(w.value()), Taint::Untainted)
    }

    fn of_config(region: Region, content: &Content, bits: usize) -> Result<Self, Error> {
        let value = match content {
            Content::Concrete(z) => Some(*z),
            Content::ConcreteMask(z, m) => {
                if *m == 0 {
                    Some(*z)
                } else {
                    None
                }
            }
            Content::Bytes(s) => Some(Self::parse_nibbles(s)?),
            Content::BytesMask(s, m) => {
                if *m == 0 {
                    Some(Self::parse_nibbles(s)?)
                } else {
                    None
                }
            }
        };
        Ok(Self::cell(bits, region, value, Taint::Untainted))
    }

    fn taint_of_config(&self, taint: &TaintSpec, bits: usize) -> Result<Self, Error> {
        let Self::Cell { bits: b, region, value, .. } = self else {
            return Ok(Self::Bot);
        };
        let taint = match taint {
            TaintSpec::None => Taint::Untainted,
            TaintSpec::All => Self::spread(bits),
            TaintSpec::Mask(m) => Taint::tainted(m & full_mask(bits)),
        };
        Ok(Self::Cell {
            bits: *b,
            region: *region,
            value: *value,
            taint,
        })
    }

    fn to_word(&self) -> Result<Word, Error> {
        match self {
            Self::Cell {
                bits,
                value: Some(v),
                ..
            } => Ok(Word::new(*v, *bits)),
            _ => Err(Error::Concretization),
        }
    }

    fn to_char(&self) -> Result<u8, Error> {
        let w = self.to_word()?;
        if w.value() > 0xff {
            return Err(Error::Concretization);
        }
        Ok(w.value() as u8)
    }

    fn to_literal(&self) -> Result<String, Error> {
        Ok(format!("{:#x}", self.to_word()?.value()))
    }

    fn to_strings(&self) -> Result<(String, String), Error> {
        let value = self.to_literal()?;
        let taint = format!("{:#x}", self.taint_part().mask(self.bits()));
        Ok((value, taint))
    }

    fn to_addresses(&self) -> Result<AddrSet, Error> {
        match self {
            Self::Bot => Ok(AddrSet::new()),
            Self::Cell { value: Some(v), .. } => {
                if *v > u64::MAX as u128 {
                    Err(Error::EnumFailure)
                } else {
                    Ok(smallvec![Address::from(*v as u64)])
                }
            }
            Self::Cell { value: None, .. } => Err(Error::EnumFailure),
        }
    }

    fn binary(op: BinOp, a: &Self, b: &Self) -> Self {
        let (Self::Cell { bits: ba, region: ra, value: va, taint: ta },
             Self::Cell { bits: bb, region: rb, value: vb, taint: tb }) = (a, b)
        else {
            return Self::Bot;
        };
        let bits = if *ba > 0 { *ba } else { *bb };
        let taint = ta.join(tb);
        // pointer arithmetic keeps the provenance of the pointer side
        let region = match op {
            BinOp::ADD | BinOp::SUB => match (ra, rb) {
                (r, Region::Global) => *r,
                (Region::Global, r) => *r,
                _ => Region::Global,
            },
            _ => Region::Global,
        };
        let value = match (va, vb) {
            (Some(x), Some(y)) => {
                let sx = Word::new(*x, bits).signed();
                let sy = Word::new(*y, bits).signed();
                match op {
                    BinOp::AND => Some(x & y),
                    BinOp::OR => Some(x | y),
                    BinOp::XOR => Some(x ^ y),
                    BinOp::ADD => Some(x.wrapping_add(*y)),
                    BinOp::SUB => Some(x.wrapping_sub(*y)),
                    BinOp::MUL => Some(x.wrapping_mul(*y)),
                    BinOp::DIV => {
                        if *y == 0 {
                            return Self::Bot;
                        }
                        Some(x / y)
                    }
                    BinOp::SDIV => {
                        if sy == 0 {
                            return Self::Bot;
                        }
                        Some(sx.wrapping_div(sy) as u128)
                    }
                    BinOp::REM => {
                        if *y == 0 {
                            return Self::Bot;
                        }
                        Some(x % y)
                    }
                    BinOp::SREM => {
                        if sy == 0 {
                            return Self::Bot;
                        }
                        Some(sx.wrapping_rem(sy) as u128)
                    }
                    BinOp::SHL => {
                        if *y >= bits as u128 {
                            Some(0)
                        } else {
                            Some(x << y)
                        }
                    }
                    BinOp::SHR => {
                        if *y >= bits as u128 {
                            Some(0)
                        } else {
                            Some(x >> y)
                        }
                    }
                    BinOp::SAR => {
                        let shift = (*y).min(127) as u32;
                        Some((sx >> shift) as u128)
                    }
                }
            }
            _ => None,
        };
        Self::cell(bits, region, value, taint)
    }

    fn unary(op: UnOp, a: &Self) -> Self {
        let Self::Cell { bits, region, value, taint } = a else {
            return Self::Bot;
        };
        match op {
            UnOp::NOT => Self::cell(*bits, *region, value.map(|v| !v), *taint),
            UnOp::NEG => Self::cell(*bits, *region, value.map(|v| v.wrapping_neg()), *taint),
            UnOp::ZEXT(n) => Self::cell(n, *region, *value, *taint),
            UnOp::SEXT(n) => {
                let value = value.map(|v| Word::new(v, *bits).signed() as u128);
                Self::cell(n, *region, value, *taint)
            }
        }
    }

    fn compare(a: &Self, rel: BinRel, b: &Self) -> Result<bool, Error> {
        let (Self::Cell { bits: ba, value: va, .. }, Self::Cell { bits: bb, value: vb, .. }) =
            (a, b)
        else {
            return Ok(false);
        };
        let (Some(x), Some(y)) = (va, vb) else {
            // an unknown side never rules the comparison out
            return Ok(true);
        };
        let sx = Word::new(*x, if *ba > 0 { *ba } else { *bb }).signed();
        let sy = Word::new(*y, if *bb > 0 { *bb } else { *ba }).signed();
        Ok(match rel {
            BinRel::EQ => x == y,
            BinRel::NEQ => x != y,
            BinRel::LT => x < y,
            BinRel::LE => x <= y,
            BinRel::GT => x > y,
            BinRel::GE => x >= y,
            BinRel::SLT => sx < sy,
            BinRel::SLE => sx <= sy,
            BinRel::SGT => sx > sy,
            BinRel::SGE => sx >= sy,
        })
    }

    fn extract(&self, lo: usize, hi: usize) -> Self {
        let Self::Cell { region, value, taint, .. } = self else {
            return Self::Bot;
        };
        Self::cell(
            hi - lo + 1,
            *region,
            value.map(|v| v >> lo),
            taint.extract(lo, hi),
        )
    }

    fn from_position(&self, pos: usize, len: usize) -> Self {
        self.extract(pos, pos + len - 1)
    }

    fn concat(parts: &[Self]) -> Self {
        if parts.is_empty() {
            return Self::top();
        }
        let mut bits = 0usize;
        let mut region: Option<Region> = None;
        let mut value: Option<u128> = Some(0);
        let mut taint_mask: Option<u128> = Some(0);
        for part in parts {
            let Self::Cell { bits: pb, region: pr, value: pv, taint: pt } = part else {
                return Self::Bot;
            };
            if *pb == 0 || bits + pb > 128 {
                // width-unknown parts and oversized results are unrepresentable
                return Self::top();
            }
            bits += pb;
            region = match region {
                None => Some(*pr),
                Some(r) if r == *pr => Some(r),
                Some(_) => Some(Region::Global),
            };
            value = match (value, pv) {
                (Some(acc), Some(v)) => Some((acc << pb) | (v & full_mask(*pb))),
                _ => None,
            };
            taint_mask = match (taint_mask, pt) {
                (Some(acc), Taint::Untainted) => Some(acc << pb),
                (Some(acc), Taint::Tainted(m)) => Some((acc << pb) | (m & full_mask(*pb))),
                _ => None,
            };
        }
        let taint = match taint_mask {
            Some(m) => Taint::tainted(m),
            None => Taint::Top,
        };
        Self::cell(bits, region.unwrap_or_default(), value, taint)
    }

    fn combine(&self, other: &Self, lo: usize, hi: usize) -> Self {
        let (Self::Cell { bits, region, value: va, taint: ta },
             Self::Cell { value: vb, taint: tb, .. }) = (self, other)
        else {
            return Self::Bot;
        };
        let width = hi - lo + 1;
        let hole = full_mask(width) << lo;
        let value = match (va, vb) {
            (Some(x), Some(y)) => Some((x & !hole) | ((y & full_mask(width)) << lo)),
            _ => None,
        };
        let taint = match (ta, tb) {
            (Taint::Top, _) | (_, Taint::Top) => Taint::Top,
            _ => Taint::tainted(
                (ta.mask(*bits) & !hole) | (tb.mask(width) << lo),
            ),
        };
        Self::cell(*bits, *region, value, taint)
    }

    fn of_repeat(pattern: &Self, pattern_bits: usize, n: usize) -> Self {
        let Self::Cell { region, value, taint, .. } = pattern else {
            return Self::Bot;
        };
        if pattern_bits * n > 128 {
            return Self::top();
        }
        let bits = pattern_bits * n;
        let value = value.map(|v| {
            let mut acc = 0u128;
            for _ in 0..n {
                acc = (acc << pattern_bits) | (v & full_mask(pattern_bits));
            }
            acc
        });
        let taint = match taint {
            Taint::Untainted => Taint::Untainted,
            Taint::Top => Taint::Top,
            Taint::Tainted(m) => {
                let mut acc = 0u128;
                for _ in 0..n {
                    acc = (acc << pattern_bits) | (m & full_mask(pattern_bits));
                }
                Taint::tainted(acc)
            }
        };
        Self::cell(bits, *region, value, taint)
    }

    fn forget(&self) -> Self {
        match self {
            Self::Bot => Self::Bot,
            Self::Cell { bits, region, taint, .. } => Self::Cell {
                bits: *bits,
                region: *region,
                value: None,
                taint: *taint,
            },
        }
    }

    fn untaint(&self) -> Self {
        match self {
            Self::Bot => Self::Bot,
            Self::Cell { bits, region, value, .. } => Self::Cell {
                bits: *bits,
                region: *region,
                value: *value,
                taint: Taint::Untainted,
            },
        }
    }

    fn taint(&self) -> Self {
        match self {
            Self::Bot => Self::Bot,
            Self::Cell { bits, region, value, .. } => Self::Cell {
                bits: *bits,
                region: *region,
                value: *value,
                taint: Self::spread(*bits),
            },
        }
    }

    fn span_taint(&self, t: Taint) -> Self {
        match (self, t) {
            (_, Taint::Untainted) | (Self::Bot, _) => self.clone(),
            (Self::Cell { bits, region, value, taint }, Taint::Top) => Self::Cell {
                bits: *bits,
                region: *region,
                value: *value,
                taint: taint.join(&Taint::Top),
            },
            (Self::Cell { bits, region, value, taint }, Taint::Tainted(_)) => Self::Cell {
                bits: *bits,
                region: *region,
                value: *value,
                taint: taint.join(&Self::spread(*bits)),
            },
        }
    }

    fn is_tainted(&self) -> bool {
        self.taint_part().is_tainted()
    }

    fn minimal_taint(&self) -> Taint {
        self.taint_part()
    }
}

impl fmt::Display for TaintedConst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bot => write!(f, "bot"),
            Self::Cell { bits, region, value, taint } => {
                match value {
                    Some(v) => write!(f, "{:#x}:{}", v, bits)?,
                    None => write!(f, "top:{}", bits)?,
                }
                if *region != Region::Global {
                    write!(f, "@{:?}", region)?;
                }
                if taint.is_tainted() {
                    write!(f, "!{:#x}", taint.mask(*bits))?;
                }
                Ok(())
            }
        }
    }
}
