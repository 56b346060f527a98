pub mod health;
pub mod print;

pub use health::health_check;
pub use print::{print_document, print_multiple, print_urls};
