pub mod format;
pub mod panels;
