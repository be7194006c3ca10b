/// Fine-tuning dataset assembly
///
/// This module handles:
/// - The conversation record written per image (example.rs)
/// - Turning an image path into a URL or inline data URI (reference.rs)
/// - Walking categories, capping, and writing JSONL (assemble.rs)

pub mod assemble;
pub mod example;
pub mod reference;
