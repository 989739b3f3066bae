pub mod flowintel;
pub mod rtir;

pub use flowintel::FlowintelModule;
pub use rtir::RtirModule;
