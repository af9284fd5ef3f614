pub mod chat_reader;
pub mod correlation;
pub mod filter;
