use std::io::Write;

use argus_il::{BinRel, Expr};
use argus_types::{Address, Word};

use crate::cell::CellValue;
use crate::domain::{Domain, Machine};
use crate::env::Env;
use crate::error::Error;
use crate::eval;
use crate::mem;

/// Padding directive for bounded scans and hex serialization.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Pad {
    pub ch: u8,
    pub left: bool,
}

/// Format an abstract value as a bare hexadecimal string of at most
/// `word_bits / 4` digits. With `full_print`, a non-zero taint mask is
/// appended as `value!taint`.
pub fn to_hex<V: CellValue>(
    v: &V,
    word_bits: usize,
    capitalise: bool,
    full_print: bool,
) -> Result<String, Error> {
    let (value, taint) = v.to_strings()?;
    // concretised forms carry a two-character `0x` prefix
    let mut s = value[2..].to_string();
    if s.len() > word_bits / 4 {
        return Err(Error::Concretization);
    }
    if capitalise {
        s.make_ascii_uppercase();
    }
    if full_print {
        let mask = &taint[2..];
        if mask.bytes().any(|b| b != b'0') {
            s = format!("{}!{}", s, mask);
        }
    }
    Ok(s)
}

fn fit(hex: String, nb: usize, pad: Option<Pad>) -> Result<String, Error> {
    if hex.len() > nb {
        return Err(Error::Concretization);
    }
    if hex.len() == nb {
        return Ok(hex);
    }
    let fill = pad.unwrap_or(Pad { ch: b'0', left: true });
    let padding: String = std::iter::repeat(fill.ch as char)
        .take(nb - hex.len())
        .collect();
    Ok(if fill.left {
        padding + &hex
    } else {
        hex + &padding
    })
}

fn scan_one<V: CellValue>(
    env: &Env<V>,
    machine: &Machine,
    start: Address,
    rel: BinRel,
    term: &V,
    upper_bound: usize,
    cell_bits: usize,
    with_exception: bool,
    pad: Option<Pad>,
) -> Result<(usize, Vec<V>), Error> {
    let step = (cell_bits / 8).max(1);
    let mut cells = Vec::new();
    let mut offset = 0usize;
    while offset < upper_bound {
        let v = mem::read(env, machine.sections(), start + offset, cell_bits, machine.endian());
        if V::compare(&v, rel, term)? {
            if let Some(pad) = pad {
                if pad.left {
                    panic!("left padding in bounded scans is not supported");
                }
                let pad_cell = V::of_word(Word::new(pad.ch as u128, 8));
                for _ in 0..upper_bound - offset {
                    cells.push(pad_cell.clone());
                }
                return Ok((upper_bound, cells));
            }
            return Ok((offset, cells));
        }
        cells.push(v);
        offset += step;
    }
    if with_exception {
        Err(Error::NotFound)
    } else {
        Ok((upper_bound, Vec::new()))
    }
}

impl<V: CellValue> Domain<V> {
    /// Bounded scan from `src` until a cell compares `rel` against the
    /// terminator; returns the byte length before the match and the
    /// scanned cells. Multiple start addresses keep the longest run.
    fn scan_cells(
        &self,
        src: &Expr,
        rel: BinRel,
        terminator: &Expr,
        upper_bound: usize,
        cell_bits: usize,
        with_exception: bool,
        pad: Option<Pad>,
    ) -> Result<(usize, Vec<V>), Error> {
        let env = self.env().ok_or(Error::Empty)?;
        let machine = self.machine();
        let (term, _) = eval::eval_expr(machine, env, terminator)?;
        let (va, _) = eval::eval_expr(machine, env, src)?;
        let addrs = va.to_addresses()?;
        if addrs.is_empty() {
            return Err(Error::NotFound);
        }
        let mut best: Option<(usize, Vec<V>)> = None;
        for a in addrs {
            let scanned = scan_one(
                env,
                machine,
                a,
                rel,
                &term,
                upper_bound,
                cell_bits,
                with_exception,
                pad,
            )?;
            best = Some(match best {
                Some(prev) if prev.0 >= scanned.0 => prev,
                _ => scanned,
            });
        }
        Ok(best.unwrap())
    }

    /// Materialised bounded scan; every underlying failure surfaces as
    /// `Concretization`.
    pub fn get_bytes(
        &self,
        src: &Expr,
        rel: BinRel,
        terminator: &Expr,
        upper_bound: usize,
        cell_bits: usize,
        pad: Option<Pad>,
    ) -> Result<(usize, Vec<u8>), Error> {
        let (len, cells) = self
            .scan_cells(src, rel, terminator, upper_bound, cell_bits, true, pad)
            .map_err(|_| Error::Concretization)?;
        let mut bytes = Vec::with_capacity(cells.len());
        for cell in cells.iter() {
            bytes.push(cell.to_char().map_err(|_| Error::Concretization)?);
        }
        Ok((len, bytes))
    }

    /// Copy cells from `src` to `dst` until the terminator matches,
    /// bounded by `upper_bound` bytes. Writes are strong for a single
    /// destination and weak otherwise.
    pub fn copy_until(
        &self,
        dst: &Expr,
        src: &Expr,
        terminator: &Expr,
        term_bits: usize,
        upper_bound: usize,
        with_exception: bool,
        pad: Option<Pad>,
    ) -> Result<(usize, Self), Error> {
        let Some(env) = self.env() else {
            return Ok((0, self.to_bottom()));
        };
        let (len, cells) = self.scan_cells(
            src,
            BinRel::EQ,
            terminator,
            upper_bound,
            term_bits,
            with_exception,
            pad,
        )?;
        let (vd, _) = eval::eval_expr(self.machine(), env, dst)?;
        let addrs = vd.to_addresses()?;
        if addrs.is_empty() {
            return Ok((len, self.to_bottom()));
        }
        let strong = addrs.len() == 1;
        let mut env = env.clone();
        for a in addrs {
            for (i, cell) in cells.iter().enumerate() {
                match mem::write(&mut env, a + i, cell, 8, strong, self.machine().endian()) {
                    Ok(()) => {}
                    Err(Error::Empty) => return Ok((len, self.to_bottom())),
                    Err(err) => return Err(err),
                }
            }
        }
        Ok((len, self.with_env(env)))
    }

    /// `copy_until` with a zero byte terminator.
    pub fn copy_chars(
        &self,
        dst: &Expr,
        src: &Expr,
        nb: usize,
        pad: Option<Pad>,
    ) -> Result<(usize, Self), Error> {
        self.copy_until(dst, src, &Expr::Val(Word::zero(8)), 8, nb, false, pad)
    }

    /// Serialise `src` as hexadecimal characters at `dst`, padded to
    /// exactly `nb` characters. A tainted source taints every written
    /// cell. More than one destination drops the whole environment.
    pub fn copy_hex(
        &self,
        dst: &Expr,
        src: &Expr,
        nb: usize,
        capitalise: bool,
        pad: Option<Pad>,
        word_bits: usize,
    ) -> Result<(usize, Self), Error> {
        let Some(env) = self.env() else {
            return Ok((0, self.to_bottom()));
        };
        let (v, src_tainted) = eval::eval_expr(self.machine(), env, src)?;
        let hex = fit(to_hex(&v, word_bits, capitalise, false)?, nb, pad)?;

        let (vd, _) = eval::eval_expr(self.machine(), env, dst)?;
        let addrs = vd.to_addresses()?;
        if addrs.is_empty() {
            return Ok((0, self.to_bottom()));
        }
        if addrs.len() > 1 {
            log::warn!(
                "hex copy to {} destinations: dropping every cell value",
                addrs.len()
            );
            return Ok((hex.len(), self.forget()));
        }

        let a = addrs[0];
        let tainted = src_tainted || v.is_tainted();
        let mut env = env.clone();
        for (i, ch) in hex.bytes().enumerate() {
            let mut cell = V::of_word(Word::new(ch as u128, 8));
            if tainted {
                cell = cell.taint();
            }
            mem::write(&mut env, a + i, &cell, 8, true, self.machine().endian())?;
        }
        Ok((hex.len(), self.with_env(env)))
    }

    /// Scan and dump materialised bytes to `sink` (the process standard
    /// output in the analyzer; tests pass a buffer).
    pub fn print_until<W: Write>(
        &self,
        sink: &mut W,
        src: &Expr,
        terminator: &Expr,
        term_bits: usize,
        upper_bound: usize,
        with_exception: bool,
        pad: Option<Pad>,
    ) -> Result<usize, Error> {
        let (len, cells) = self.scan_cells(
            src,
            BinRel::EQ,
            terminator,
            upper_bound,
            term_bits,
            with_exception,
            pad,
        )?;
        let mut bytes = Vec::with_capacity(cells.len());
        for cell in cells.iter() {
            bytes.push(cell.to_char().map_err(|_| Error::Concretization)?);
        }
        sink.write_all(&bytes)?;
        Ok(len)
    }

    /// `print_until` with a zero byte terminator.
    pub fn print_chars<W: Write>(
        &self,
        sink: &mut W,
        src: &Expr,
        nb: usize,
        pad: Option<Pad>,
    ) -> Result<usize, Error> {
        self.print_until(sink, src, &Expr::Val(Word::zero(8)), 8, nb, false, pad)
    }

    /// Dump exactly `nb` materialised bytes from `src`.
    pub fn print_bytes<W: Write>(
        &self,
        sink: &mut W,
        src: &Expr,
        nb: usize,
    ) -> Result<usize, Error> {
        let env = self.env().ok_or(Error::Empty)?;
        let (va, _) = eval::eval_expr(self.machine(), env, src)?;
        let addrs = va.to_addresses()?;
        if addrs.is_empty() {
            return Err(Error::BotDeref);
        }
        let mut bytes = Vec::with_capacity(nb);
        for i in 0..nb {
            let mut joined: Option<V> = None;
            for a in addrs.iter() {
                let v = mem::read(
                    env,
                    self.machine().sections(),
                    *a + i,
                    8,
                    self.machine().endian(),
                );
                joined = Some(match joined {
                    Some(prev) => prev.join(&v),
                    None => v,
                });
            }
            bytes.push(
                joined
                    .unwrap()
                    .to_char()
                    .map_err(|_| Error::Concretization)?,
            );
        }
        sink.write_all(&bytes)?;
        Ok(nb)
    }

    /// Dump the hexadecimal form of `src`, fitted to `nb` characters;
    /// with `full_print` a non-zero taint mask follows as `!taint`.
    pub fn print_hex<W: Write>(
        &self,
        sink: &mut W,
        src: &Expr,
        nb: usize,
        capitalise: bool,
        full_print: bool,
        pad: Option<Pad>,
        word_bits: usize,
    ) -> Result<usize, Error> {
        let env = self.env().ok_or(Error::Empty)?;
        let (v, _) = eval::eval_expr(self.machine(), env, src)?;
        let formatted = to_hex(&v, word_bits, capitalise, full_print)?;
        let (value, taint) = match formatted.split_once('!') {
            Some((value, taint)) => (value.to_string(), Some(taint.to_string())),
            None => (formatted, None),
        };
        let value = fit(value, nb, pad)?;
        let out = match taint {
            Some(taint) => format!("{}!{}", value, taint),
            None => value,
        };
        sink.write_all(out.as_bytes())?;
        Ok(out.len())
    }
}
