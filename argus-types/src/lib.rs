pub mod address;
pub mod endian;
pub mod register;
pub mod taint;
pub mod word;

pub use address::Address;
pub use endian::Endian;
pub use register::Register;
pub use taint::Taint;
pub use word::Word;
