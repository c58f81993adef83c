pub mod json;
pub mod test_utils;
