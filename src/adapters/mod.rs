pub mod pulldown;

pub use pulldown::PulldownBlockParser;
