/// Pixel format normalization
///
/// This module handles:
/// - Reading each image's declared pixel encoding (encoding.rs)
/// - Rewriting one image into a canonical encoding (convert.rs)
/// - Mirroring a whole category tree with tallies (batch.rs)

pub mod batch;
pub mod convert;
pub mod encoding;
