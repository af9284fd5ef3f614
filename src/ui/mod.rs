pub mod console;
pub mod overlay;
