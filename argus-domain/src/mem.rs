use argus_loader::SectionTable;
use argus_types::{Address, Endian, Word};
use smallvec::SmallVec;

use crate::cell::CellValue;
use crate::env::{Dimension, Env};
use crate::error::Error;

fn byte_addrs(addr: Address, bits: usize) -> SmallVec<[Address; 8]> {
    (0..bits / 8).map(|i| addr + i).collect()
}

/// Read `bits` bits starting at `addr`.
///
/// All byte cells must resolve in the environment; otherwise the whole
/// read is retried against the section backing, lifting statically-known
/// bytes and leaving the uninitialized tail unconstrained. A read that
/// resolves nowhere is the empty concretization.
pub fn read<V: CellValue>(
    env: &Env<V>,
    sections: &SectionTable,
    addr: Address,
    bits: usize,
    endian: Endian,
) -> V {
    let addrs = byte_addrs(addr, bits);
    let mut bytes: SmallVec<[V; 8]> = SmallVec::with_capacity(addrs.len());

    for a in addrs.iter() {
        match env.find_mem(*a) {
            Some((_, v)) => bytes.push(v.clone()),
            None => {
                bytes.clear();
                break;
            }
        }
    }

    if bytes.is_empty() && bits > 0 {
        for a in addrs.iter() {
            match sections.read_byte(*a) {
                Ok(Some(b)) => bytes.push(V::of_word(Word::new(b as u128, 8))),
                Ok(None) => bytes.push(V::top()),
                Err(_) => return V::bot(),
            }
        }
    }

    if endian.is_little() {
        bytes.reverse();
    }
    V::concat(&bytes)
}

/// Write `bits` bits of `value` starting at `addr`, strongly or weakly.
///
/// A weak write to an address with no binding fails with `Empty`; the
/// caller decides whether that bottoms the state.
pub fn write<V: CellValue>(
    env: &mut Env<V>,
    addr: Address,
    value: &V,
    bits: usize,
    strong: bool,
    endian: Endian,
) -> Result<(), Error> {
    let mut addrs = byte_addrs(addr, bits);
    if endian.is_big() {
        addrs.reverse();
    }
    for (i, a) in addrs.iter().enumerate() {
        let byte = value.extract(i * 8, i * 8 + 7);
        write_byte(env, *a, byte, strong)?;
    }
    Ok(())
}

fn write_byte<V: CellValue>(
    env: &mut Env<V>,
    addr: Address,
    byte: V,
    strong: bool,
) -> Result<(), Error> {
    match env.take_mem(addr) {
        None => {
            if strong {
                env.add(Dimension::Mem(addr), byte);
                Ok(())
            } else {
                Err(Error::Empty)
            }
        }
        Some((Dimension::Reg(_), _)) => {
            panic!("register dimension found for memory byte {}", addr)
        }
        Some((Dimension::Mem(_), prev)) => {
            let value = if strong { byte } else { byte.join(&prev) };
            env.add(Dimension::Mem(addr), value);
            Ok(())
        }
        Some((Dimension::MemItv(lo, hi), prev)) => {
            if lo < addr {
                env.add(Dimension::MemItv(lo, addr - 1u64), prev.clone());
            }
            if addr < hi {
                env.add(Dimension::MemItv(addr + 1u64, hi), prev.clone());
            }
            let value = if strong { byte } else { byte.join(&prev) };
            env.add(Dimension::Mem(addr), value);
            Ok(())
        }
    }
}

/// Fill `[addr, addr + n]` with a single byte cell, compressed into one
/// run. Strong update semantics; any per-byte binding in the range is
/// discarded and every straddling run is trimmed back to its remainder.
pub fn write_repeat<V: CellValue>(env: &mut Env<V>, addr: Address, byte: V, n: u64) {
    for i in 0..=n {
        let a = addr + i;
        if let Some((key, prev)) = env.take_mem(a) {
            match key {
                Dimension::Reg(_) => {
                    panic!("register dimension found for memory byte {}", a)
                }
                Dimension::Mem(_) => {}
                Dimension::MemItv(lo, hi) => {
                    if lo < a {
                        env.add(Dimension::MemItv(lo, a - 1u64), prev.clone());
                    }
                    if a < hi {
                        env.add(Dimension::MemItv(a + 1u64, hi), prev);
                    }
                }
            }
        }
    }
    env.add(Dimension::MemItv(addr, addr + n), byte);
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use argus_loader::{Image, Section};

    use super::*;
    use crate::concrete::TaintedConst;

    fn sections() -> SectionTable {
        SectionTable::new(Arc::new(Image::from_bytes(Vec::new())), Vec::new())
    }

    fn word(v: u128, bits: usize) -> TaintedConst {
        TaintedConst::of_word(Word::new(v, bits))
    }

    fn addr(a: u64) -> Address {
        Address::from(a)
    }

    #[test]
    fn test_read_after_write() {
        let mut env = Env::new();
        let s = sections();
        write(&mut env, addr(0x2000), &word(0x12345678, 32), 32, true, Endian::Little).unwrap();

        let v = read(&env, &s, addr(0x2000), 32, Endian::Little);
        assert_eq!(v.value(), Some(0x12345678));

        let v = read(&env, &s, addr(0x2001), 16, Endian::Little);
        assert_eq!(v.value(), Some(0x3456));
    }

    #[test]
    fn test_big_endian_roundtrip() {
        let mut env = Env::new();
        let s = sections();
        write(&mut env, addr(0x2000), &word(0x1234, 16), 16, true, Endian::Big).unwrap();

        assert_eq!(read(&env, &s, addr(0x2000), 16, Endian::Big).value(), Some(0x1234));
        // the most significant byte sits at the lowest address
        assert_eq!(read(&env, &s, addr(0x2000), 8, Endian::Little).value(), Some(0x12));
    }

    #[test]
    fn test_read_unmapped_is_bot() {
        let env: Env<TaintedConst> = Env::new();
        let s = sections();
        assert!(read(&env, &s, addr(0x5000), 8, Endian::Little).is_bot());
    }

    #[test]
    fn test_read_from_backing() {
        let image = Arc::new(Image::from_bytes(vec![0xaa, 0xbb]));
        let s = SectionTable::new(
            image,
            vec![Section::new(addr(0x1000), 4, 0, 2, ".data")],
        );
        let env: Env<TaintedConst> = Env::new();

        assert_eq!(read(&env, &s, addr(0x1000), 8, Endian::Little).value(), Some(0xaa));
        assert_eq!(read(&env, &s, addr(0x1000), 16, Endian::Little).value(), Some(0xbbaa));
        // uninitialized tail of the section is unconstrained, not absent
        let v = read(&env, &s, addr(0x1002), 8, Endian::Little);
        assert!(!v.is_bot());
        assert_eq!(v.value(), None);
    }

    #[test]
    fn test_weak_write_joins() {
        let mut env = Env::new();
        let s = sections();
        write(&mut env, addr(0x100), &word(1, 8), 8, true, Endian::Little).unwrap();
        write(&mut env, addr(0x100), &word(2, 8), 8, false, Endian::Little).unwrap();

        let v = read(&env, &s, addr(0x100), 8, Endian::Little);
        assert_eq!(v.value(), None);
        assert!(!v.is_bot());
    }

    #[test]
    fn test_weak_write_to_absent_is_empty() {
        let mut env: Env<TaintedConst> = Env::new();
        assert!(matches!(
            write(&mut env, addr(0x100), &word(1, 8), 8, false, Endian::Little),
            Err(Error::Empty)
        ));
    }

    #[test]
    fn test_interval_compression_faithful() {
        let mut env = Env::new();
        let s = sections();
        write_repeat(&mut env, addr(0x1000), word(0x00, 8), 16);
        assert_eq!(env.len(), 1);

        for a in 0x1000u64..=0x1010 {
            let v = read(&env, &s, addr(a), 8, Endian::Little);
            assert_eq!(v.value(), Some(0));
        }
    }

    #[test]
    fn test_interval_split() {
        let mut env = Env::new();
        let s = sections();
        write_repeat(&mut env, addr(0x1000), word(0x00, 8), 16);
        write(&mut env, addr(0x1008), &word(0xab, 8), 8, true, Endian::Little).unwrap();

        assert_eq!(env.len(), 3);
        assert_eq!(
            env.find(&Dimension::MemItv(addr(0x1000), addr(0x1007))).and_then(|v| v.value()),
            Some(0)
        );
        assert_eq!(
            env.find(&Dimension::Mem(addr(0x1008))).and_then(|v| v.value()),
            Some(0xab)
        );
        assert_eq!(
            env.find(&Dimension::MemItv(addr(0x1009), addr(0x1010))).and_then(|v| v.value()),
            Some(0)
        );

        // every other byte still reads the fill value
        for a in (0x1000u64..=0x1010).filter(|a| *a != 0x1008) {
            assert_eq!(read(&env, &s, addr(a), 8, Endian::Little).value(), Some(0));
        }
        assert_eq!(read(&env, &s, addr(0x1008), 8, Endian::Little).value(), Some(0xab));
    }

    #[test]
    fn test_repeat_overwrites_straddling_runs() {
        let mut env = Env::new();
        let s = sections();
        write_repeat(&mut env, addr(0x100), word(0x11, 8), 8);
        write_repeat(&mut env, addr(0x104), word(0x22, 8), 8);

        assert_eq!(read(&env, &s, addr(0x100), 8, Endian::Little).value(), Some(0x11));
        assert_eq!(read(&env, &s, addr(0x104), 8, Endian::Little).value(), Some(0x22));
        assert_eq!(read(&env, &s, addr(0x10c), 8, Endian::Little).value(), Some(0x22));
    }
}
