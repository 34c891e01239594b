mod common;
mod redis_tests;
