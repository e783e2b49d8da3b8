pub mod enums;
pub mod metadata;
pub mod parameter;
pub mod report;
pub mod sample;
pub mod sample_type;

pub use metadata::*;
pub use parameter::*;
pub use report::*;
pub use sample::*;
pub use sample_type::*;
