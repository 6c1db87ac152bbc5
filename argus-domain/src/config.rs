use argus_types::{Address, Endian, Register, Word};

use crate::cell::CellValue;
use crate::domain::Domain;
use crate::env::Dimension;
use crate::error::Error;
use crate::mem;

/// Memory region an initial value belongs to. The tag survives value
/// arithmetic so that, e.g., stack-pointer derived addresses keep their
/// stack provenance.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[derive(serde::Deserialize, serde::Serialize)]
pub enum Region {
    Global,
    Stack,
    Heap,
}

impl Default for Region {
    fn default() -> Self {
        Self::Global
    }
}

/// An initial cell content supplied by the analysis configuration.
///
/// `Bytes` carries hexadecimal nibbles (two characters per byte), so a
/// string of length `n` describes a value of `4 * n` bits.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[derive(serde::Deserialize, serde::Serialize)]
pub enum Content {
    Concrete(u128),
    ConcreteMask(u128, u128),
    Bytes(String),
    BytesMask(String, u128),
}

impl Content {
    /// Bit width of the content rounded to the operand size.
    pub fn size(&self, operand_bits: usize) -> usize {
        match self {
            Self::Concrete(z) | Self::ConcreteMask(z, _) => {
                let n = Word::min_bits(*z);
                operand_bits.max(round_up(n, operand_bits))
            }
            Self::Bytes(b) | Self::BytesMask(b, _) => 4 * b.len(),
        }
    }

    pub fn is_bytes(&self) -> bool {
        matches!(self, Self::Bytes(_) | Self::BytesMask(_, _))
    }
}

fn round_up(n: usize, m: usize) -> usize {
    ((n + m - 1) / m) * m
}

/// Taint pattern attached to a configured value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[derive(serde::Deserialize, serde::Serialize)]
pub enum TaintSpec {
    None,
    All,
    Mask(u128),
}

impl<V: CellValue> Domain<V> {
    /// Install a configured initial value into a register.
    pub fn set_register_from_config(
        &self,
        r: &Register,
        region: Region,
        content: &Content,
        taint: &TaintSpec,
    ) -> Result<Self, Error> {
        let Some(env) = self.env() else {
            return Ok(self.to_bottom());
        };
        let value = V::of_config(region, content, r.bits())?.taint_of_config(taint, r.bits())?;
        log::debug!("config: {} <- {}", r, value);
        let mut env = env.clone();
        env.add(Dimension::Reg(*r), value);
        Ok(self.with_env(env))
    }

    /// Install a configured initial value at `addr`, repeated `nb`
    /// times. Repetition requires byte-sized content and compresses the
    /// fill into a single run; multi-byte contents install once, in big
    /// byte order when the content is a byte string.
    pub fn set_memory_from_config(
        &self,
        addr: Address,
        region: Region,
        content: &Content,
        taint: &TaintSpec,
        nb: u64,
    ) -> Result<Self, Error> {
        let Some(env) = self.env() else {
            return Ok(self.to_bottom());
        };
        // memory cells are byte-granular, so contents round to bytes
        let bits = content.size(8);
        let value = V::of_config(region, content, bits)?.taint_of_config(taint, bits)?;
        let mut env = env.clone();
        if nb > 1 {
            if bits != 8 {
                panic!("repeated memory initialization only works with byte values");
            }
            mem::write_repeat(&mut env, addr, value, nb);
        } else {
            let endian = if content.is_bytes() {
                Endian::Big
            } else {
                Endian::Little
            };
            mem::write(&mut env, addr, &value, bits, true, endian)?;
        }
        Ok(self.with_env(env))
    }

    /// Re-taint an already-installed register cell.
    pub fn taint_register_mask(&self, r: &Register, taint: &TaintSpec) -> Result<Self, Error> {
        let Some(env) = self.env() else {
            return Ok(self.to_bottom());
        };
        let Some(prev) = env.find_reg(r) else {
            return Err(Error::NotFound);
        };
        let value = prev.taint_of_config(taint, r.bits())?;
        let mut env = env.clone();
        env.add(Dimension::Reg(*r), value);
        Ok(self.with_env(env))
    }

    /// Re-taint the byte cell at `addr`, splitting an enclosing run.
    pub fn taint_address_mask(&self, addr: Address, taint: &TaintSpec) -> Result<Self, Error> {
        let Some(env) = self.env() else {
            return Ok(self.to_bottom());
        };
        let Some((key, prev)) = env.find_mem(addr) else {
            return Err(Error::NotFound);
        };
        let key = key.clone();
        let prev = prev.clone();
        let value = prev.taint_of_config(taint, 8)?;
        let mut env = env.clone();
        env.remove(&key);
        if let Dimension::MemItv(lo, hi) = key {
            if lo < addr {
                env.add(Dimension::MemItv(lo, addr - 1u64), prev.clone());
            }
            if addr < hi {
                env.add(Dimension::MemItv(addr + 1u64, hi), prev);
            }
        }
        env.add(Dimension::Mem(addr), value);
        Ok(self.with_env(env))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_concrete_size_rounds_to_operand() {
        assert_eq!(Content::Concrete(0).size(32), 32);
        assert_eq!(Content::Concrete(0xff).size(32), 32);
        assert_eq!(Content::Concrete(u64::MAX as u128).size(32), 64);
    }

    #[test]
    fn test_bytes_size_is_four_bits_per_nibble() {
        assert_eq!(Content::Bytes("deadbeef".into()).size(32), 32);
        assert_eq!(Content::Bytes("00".into()).size(32), 8);
    }

    use std::sync::Arc;

    use argus_il::{Expr, Lval};
    use argus_loader::{Image, SectionTable};
    use argus_types::Taint;

    use crate::concrete::TaintedConst;
    use crate::domain::Machine;

    fn machine() -> Arc<Machine> {
        let sections = SectionTable::new(Arc::new(Image::from_bytes(Vec::new())), Vec::new());
        Arc::new(Machine::new(
            Arc::new(sections),
            Register::new("esp", 32),
            32,
            Endian::Little,
        ))
    }

    fn addr(a: u64) -> Address {
        Address::from(a)
    }

    #[test]
    fn test_zero_fill_compresses_to_one_run() {
        let d = Domain::<TaintedConst>::init(machine());
        let d = d
            .set_memory_from_config(
                addr(0x1000),
                Region::Global,
                &Content::Concrete(0),
                &TaintSpec::None,
                16,
            )
            .unwrap();

        let env = d.env().unwrap();
        assert_eq!(env.len(), 1);
        assert_eq!(
            env.find(&Dimension::MemItv(addr(0x1000), addr(0x1010)))
                .and_then(|v| v.value()),
            Some(0)
        );

        let v = mem::read(env, d.machine().sections(), addr(0x1005), 8, Endian::Little);
        assert_eq!(v.value(), Some(0));
    }

    #[test]
    fn test_zero_fill_then_point_write_splits() {
        let d = Domain::<TaintedConst>::init(machine());
        let d = d
            .set_memory_from_config(
                addr(0x1000),
                Region::Global,
                &Content::Concrete(0),
                &TaintSpec::None,
                16,
            )
            .unwrap();
        let dst = Lval::Mem(Box::new(Expr::word(0x1008u32)), 8);
        let (d, _) = d.set(&dst, &Expr::word(0xabu8)).unwrap();

        let env = d.env().unwrap();
        assert_eq!(env.len(), 3);
        assert_eq!(
            env.find(&Dimension::MemItv(addr(0x1000), addr(0x1007)))
                .and_then(|v| v.value()),
            Some(0)
        );
        assert_eq!(
            env.find(&Dimension::Mem(addr(0x1008))).and_then(|v| v.value()),
            Some(0xab)
        );
        assert_eq!(
            env.find(&Dimension::MemItv(addr(0x1009), addr(0x1010)))
                .and_then(|v| v.value()),
            Some(0)
        );
    }

    #[test]
    #[should_panic(expected = "byte values")]
    fn test_repeated_fill_requires_bytes() {
        let d = Domain::<TaintedConst>::init(machine());
        let _ = d.set_memory_from_config(
            addr(0x1000),
            Region::Global,
            &Content::Concrete(0x12345678),
            &TaintSpec::None,
            4,
        );
    }

    #[test]
    fn test_bytes_content_installs_big_endian() {
        let d = Domain::<TaintedConst>::init(machine());
        let d = d
            .set_memory_from_config(
                addr(0x2000),
                Region::Global,
                &Content::Bytes("1234".into()),
                &TaintSpec::None,
                1,
            )
            .unwrap();

        let env = d.env().unwrap();
        let b0 = mem::read(env, d.machine().sections(), addr(0x2000), 8, Endian::Little);
        let b1 = mem::read(env, d.machine().sections(), addr(0x2001), 8, Endian::Little);
        assert_eq!(b0.value(), Some(0x12));
        assert_eq!(b1.value(), Some(0x34));
    }

    #[test]
    fn test_register_from_config_with_taint() {
        let eax = Register::new("eax", 32);
        let d = Domain::<TaintedConst>::init(machine());
        let d = d
            .set_register_from_config(
                &eax,
                Region::Global,
                &Content::Concrete(0x42),
                &TaintSpec::Mask(0xff),
            )
            .unwrap();

        let v = d.env().unwrap().find_reg(&eax).unwrap();
        assert_eq!(v.value(), Some(0x42));
        assert_eq!(v.minimal_taint(), Taint::Tainted(0xff));
    }

    #[test]
    fn test_taint_register_mask_missing_is_not_found() {
        let eax = Register::new("eax", 32);
        let d = Domain::<TaintedConst>::init(machine());
        assert!(matches!(
            d.taint_register_mask(&eax, &TaintSpec::All),
            Err(Error::NotFound)
        ));
    }

    #[test]
    fn test_taint_address_mask_splits_runs() {
        let d = Domain::<TaintedConst>::init(machine());
        let d = d
            .set_memory_from_config(
                addr(0x1000),
                Region::Global,
                &Content::Concrete(0),
                &TaintSpec::None,
                8,
            )
            .unwrap();
        let d = d.taint_address_mask(addr(0x1004), &TaintSpec::All).unwrap();

        let env = d.env().unwrap();
        let tainted = env.find(&Dimension::Mem(addr(0x1004))).unwrap();
        assert!(tainted.is_tainted());
        assert_eq!(tainted.value(), Some(0));

        // neighbours keep the untainted fill
        let left = env.find_mem(addr(0x1003)).unwrap().1;
        let right = env.find_mem(addr(0x1005)).unwrap().1;
        assert!(!left.is_tainted() && !right.is_tainted());
    }
}
