mod device_vector;

pub use self::device_vector::*;
