pub mod errors;
pub mod money;
pub mod shutdown;
pub mod utills;

pub use errors::*;
pub use money::*;
pub use shutdown::*;
pub use utills::*;
