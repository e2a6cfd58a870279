pub mod error;
pub mod llm;
pub mod storage;
pub mod utils;
