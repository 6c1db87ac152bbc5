use std::cmp::Ordering;
use std::fmt;

use ustr::Ustr;

/// A named register of known bit width.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[derive(serde::Deserialize, serde::Serialize)]
pub struct Register {
    name: Ustr,
    bits: usize,
}

impl Register {
    pub fn new<N: AsRef<str>>(name: N, bits: usize) -> Self {
        Self {
            name: Ustr::from(name.as_ref()),
            bits,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bits(&self) -> usize {
        self.bits
    }

    pub fn bytes(&self) -> usize {
        self.bits / 8
    }
}

impl PartialOrd for Register {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Register {
    fn cmp(&self, other: &Self) -> Ordering {
        self.name
            .as_str()
            .cmp(other.name.as_str())
            .then(self.bits.cmp(&other.bits))
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.bits)
    }
}
