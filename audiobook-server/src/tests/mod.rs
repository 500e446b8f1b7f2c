mod books_tests;
mod config_tests;
mod metadata_tests;
mod operations_tests;
mod test_utils;
