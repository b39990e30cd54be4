pub mod apps;
#[cfg(test)]
pub mod fake;
pub mod locator;
pub mod parse;
pub mod paths;
pub mod runner;
