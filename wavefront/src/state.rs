mod aos_layout;
mod layout;
mod pool;
mod soa_layout;

pub use self::aos_layout::*;
pub use self::layout::*;
pub use self::pool::*;
pub use self::soa_layout::*;
