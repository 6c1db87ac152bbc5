use std::sync::Arc;

use argus_types::Address;
use thiserror::Error as ThisError;
use ustr::Ustr;

use crate::image::Image;

#[derive(Debug, ThisError)]
pub enum Error {
    #[error("no section maps address {0}")]
    UnmappedAddress(Address),
}

/// One loaded section: a virtual range and the raw image range that backs
/// its initialized prefix.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[derive(serde::Deserialize, serde::Serialize)]
pub struct Section {
    pub virt_addr: Address,
    pub virt_size: u64,
    pub raw_addr: u64,
    pub raw_size: u64,
    pub name: Ustr,
}

impl Section {
    pub fn new<N: AsRef<str>>(
        virt_addr: Address,
        virt_size: u64,
        raw_addr: u64,
        raw_size: u64,
        name: N,
    ) -> Self {
        Self {
            virt_addr,
            virt_size,
            raw_addr,
            raw_size,
            name: Ustr::from(name.as_ref()),
        }
    }

    pub fn contains(&self, addr: Address) -> bool {
        addr >= self.virt_addr && addr.offset() - self.virt_addr.offset() < self.virt_size
    }
}

/// The section list of a loaded binary together with its raw image,
/// consumed once at analysis start and used as a read-through backing
/// store for otherwise-unset memory addresses.
pub struct SectionTable {
    sections: Vec<Section>,
    image: Arc<Image>,
}

impl SectionTable {
    pub fn new(image: Arc<Image>, mut sections: Vec<Section>) -> Self {
        sections.sort_by_key(|s| s.virt_addr);
        for s in sections.iter() {
            log::debug!(
                "section `{}`: virt {}+{:#x}, raw {:#x}+{:#x}",
                s.name,
                s.virt_addr,
                s.virt_size,
                s.raw_addr,
                s.raw_size
            );
        }
        Self { sections, image }
    }

    pub fn image(&self) -> &Arc<Image> {
        &self.image
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn find(&self, addr: Address) -> Option<&Section> {
        let i = self
            .sections
            .partition_point(|s| s.virt_addr <= addr)
            .checked_sub(1)?;
        let s = &self.sections[i];
        s.contains(addr).then_some(s)
    }

    /// The statically-known byte at `addr`, or `None` when the address
    /// falls in the uninitialized tail of its section.
    pub fn read_byte(&self, addr: Address) -> Result<Option<u8>, Error> {
        let section = self.find(addr).ok_or(Error::UnmappedAddress(addr))?;
        let offset = addr.offset() - section.virt_addr.offset();
        if offset >= section.raw_size {
            return Ok(None);
        }
        let raw = (section.raw_addr + offset) as usize;
        let Some(byte) = self.image.as_ref().get(raw) else {
            panic!("image does not back raw offset {:#x}", raw);
        };
        Ok(Some(*byte))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn table() -> SectionTable {
        let image = Arc::new(Image::from_bytes(vec![
            0xde, 0xad, 0xbe, 0xef, 0x10, 0x20, 0x30, 0x40,
        ]));
        SectionTable::new(
            image,
            vec![
                Section::new(Address::from(0x1000u64), 0x10, 0, 4, ".text"),
                Section::new(Address::from(0x2000u64), 4, 4, 4, ".data"),
            ],
        )
    }

    #[test]
    fn test_read_mapped() {
        let t = table();
        assert_eq!(t.read_byte(Address::from(0x1000u64)).unwrap(), Some(0xde));
        assert_eq!(t.read_byte(Address::from(0x1003u64)).unwrap(), Some(0xef));
        assert_eq!(t.read_byte(Address::from(0x2001u64)).unwrap(), Some(0x20));
    }

    #[test]
    fn test_read_uninitialized_tail() {
        let t = table();
        // inside virt range, past the raw prefix
        assert_eq!(t.read_byte(Address::from(0x1008u64)).unwrap(), None);
    }

    #[test]
    fn test_read_unmapped() {
        let t = table();
        assert!(t.read_byte(Address::from(0x3000u64)).is_err());
        assert!(t.read_byte(Address::from(0xfffu64)).is_err());
    }

    #[test]
    fn test_find_is_half_open() {
        let t = table();
        assert!(t.find(Address::from(0x100fu64)).is_some());
        assert!(t.find(Address::from(0x1010u64)).is_none());
    }

    #[test]
    fn test_from_file() {
        use std::io::Write;

        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"\x01\x02\x03\x04").unwrap();
        f.flush().unwrap();

        let image = Image::from_file(f.path()).unwrap();
        assert_eq!(&image[..], b"\x01\x02\x03\x04");
    }
}
