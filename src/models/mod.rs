mod count_entry;
mod window;

pub use count_entry::*;
pub use window::*;
