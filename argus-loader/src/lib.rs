pub mod image;
pub mod section;

pub use image::Image;
pub use section::{Error, Section, SectionTable};
