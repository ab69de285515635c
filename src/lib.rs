pub mod messaging;
pub mod consensus;
pub mod test_util;
