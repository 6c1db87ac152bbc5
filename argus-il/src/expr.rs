use std::fmt;

use argus_types::{Register, Word};

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[derive(serde::Deserialize, serde::Serialize)]
pub enum BinOp {
    AND,
    OR,
    XOR,
    ADD,
    SUB,
    MUL,
    DIV,
    SDIV,
    REM,
    SREM,
    SHL,
    SHR,
    SAR,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[derive(serde::Deserialize, serde::Serialize)]
pub enum UnOp {
    NOT,
    NEG,
    SEXT(usize),
    ZEXT(usize),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[derive(serde::Deserialize, serde::Serialize)]
pub enum BinRel {
    EQ,
    NEQ,
    LT,
    LE,
    GT,
    GE,
    SLT,
    SLE,
    SGT,
    SGE,
}

impl BinRel {
    /// The relation holding exactly when `self` does not.
    pub fn invert(&self) -> Self {
        match self {
            Self::EQ => Self::NEQ,
            Self::NEQ => Self::EQ,
            Self::LT => Self::GE,
            Self::LE => Self::GT,
            Self::GT => Self::LE,
            Self::GE => Self::LT,
            Self::SLT => Self::SGE,
            Self::SLE => Self::SGT,
            Self::SGT => Self::SLE,
            Self::SGE => Self::SLT,
        }
    }
}

/// An assignable location: a whole register, a register bit slice, or a
/// memory dereference of a given bit width.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[derive(serde::Deserialize, serde::Serialize)]
pub enum Lval {
    Var(Register),
    Slice(Register, usize, usize),
    Mem(Box<Expr>, usize),
}

impl Lval {
    pub fn bits(&self) -> usize {
        match self {
            Self::Var(r) => r.bits(),
            Self::Slice(_, lo, hi) => hi - lo + 1,
            Self::Mem(_, bits) => *bits,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[derive(serde::Deserialize, serde::Serialize)]
pub enum Expr {
    Val(Word),
    Lval(Lval),
    UnOp(UnOp, Box<Expr>),
    BinOp(BinOp, Box<Expr>, Box<Expr>),
    IfElse(Box<BoolExpr>, Box<Expr>, Box<Expr>),
}

impl Expr {
    pub fn reg(r: Register) -> Self {
        Self::Lval(Lval::Var(r))
    }

    pub fn word<W: Into<Word>>(w: W) -> Self {
        Self::Val(w.into())
    }

    pub fn load(addr: Expr, bits: usize) -> Self {
        Self::Lval(Lval::Mem(Box::new(addr), bits))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[derive(serde::Deserialize, serde::Serialize)]
pub enum BoolExpr {
    Val(bool),
    Not(Box<BoolExpr>),
    And(Box<BoolExpr>, Box<BoolExpr>),
    Or(Box<BoolExpr>, Box<BoolExpr>),
    Cmp(BinRel, Box<Expr>, Box<Expr>),
}

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::AND => "&",
            Self::OR => "|",
            Self::XOR => "^",
            Self::ADD => "+",
            Self::SUB => "-",
            Self::MUL => "*",
            Self::DIV => "/",
            Self::SDIV => "s/",
            Self::REM => "%",
            Self::SREM => "s%",
            Self::SHL => "<<",
            Self::SHR => ">>",
            Self::SAR => "s>>",
        };
        write!(f, "{}", s)
    }
}

impl fmt::Display for BinRel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::EQ => "==",
            Self::NEQ => "!=",
            Self::LT => "<",
            Self::LE => "<=",
            Self::GT => ">",
            Self::GE => ">=",
            Self::SLT => "s<",
            Self::SLE => "s<=",
            Self::SGT => "s>",
            Self::SGE => "s>=",
        };
        write!(f, "{}", s)
    }
}

impl fmt::Display for Lval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Var(r) => write!(f, "{}", r),
            Self::Slice(r, lo, hi) => write!(f, "{}[{}..{}]", r, lo, hi),
            Self::Mem(e, bits) => write!(f, "mem[{}]:{}", e, bits),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Val(w) => write!(f, "{:#x}", w.value()),
            Self::Lval(lv) => write!(f, "{}", lv),
            Self::UnOp(UnOp::NOT, e) => write!(f, "!({})", e),
            Self::UnOp(UnOp::NEG, e) => write!(f, "-({})", e),
            Self::UnOp(UnOp::SEXT(bits), e) => write!(f, "sext({}, {})", e, bits),
            Self::UnOp(UnOp::ZEXT(bits), e) => write!(f, "zext({}, {})", e, bits),
            Self::BinOp(op, e1, e2) => write!(f, "({} {} {})", e1, op, e2),
            Self::IfElse(c, et, ef) => write!(f, "if {} then {} else {}", c, et, ef),
        }
    }
}

impl fmt::Display for BoolExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Val(b) => write!(f, "{}", b),
            Self::Not(e) => write!(f, "!({})", e),
            Self::And(e1, e2) => write!(f, "({} && {})", e1, e2),
            Self::Or(e1, e2) => write!(f, "({} || {})", e1, e2),
            Self::Cmp(rel, e1, e2) => write!(f, "({} {} {})", e1, rel, e2),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_invert_involution() {
        for rel in [
            BinRel::EQ,
            BinRel::NEQ,
            BinRel::LT,
            BinRel::LE,
            BinRel::GT,
            BinRel::GE,
            BinRel::SLT,
            BinRel::SLE,
            BinRel::SGT,
            BinRel::SGE,
        ] {
            assert_eq!(rel.invert().invert(), rel);
        }
    }

    #[test]
    fn test_display() {
        let eax = Register::new("eax", 32);
        let e = Expr::BinOp(
            BinOp::ADD,
            Box::new(Expr::reg(eax)),
            Box::new(Expr::word(4u32)),
        );
        assert_eq!(format!("{}", e), "(eax:32 + 0x4)");
    }
}
