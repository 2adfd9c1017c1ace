mod constants;
mod fake;
mod objs;

pub use constants::*;
pub use fake::*;
pub use objs::*;
pub use rstest::fixture;
pub use rstest_log::rstest;
