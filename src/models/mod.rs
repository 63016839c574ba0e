pub mod enums;
pub mod preprocess;
pub mod requirements;
pub mod artifacts;

pub use enums::*;
pub use preprocess::*;
pub use requirements::*;
pub use artifacts::*;
