pub mod scanner;

pub use scanner::ScannerPage;
