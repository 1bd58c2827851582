//! Serving gzip-compressed static content.
//!
//! A [`CompressedResource`] keeps an asset in its stored gzip form and its
//! decompressed form, and answers each request with whichever one the
//! client's `Accept-Encoding` allows. [`decompress_tree`] turns a tree of
//! `.gz` files into a read-only [`VirtualFs`] of their decompressed contents.

pub mod build;
pub mod compression;
pub mod decoder;
pub mod error;
pub mod file_serving;
pub mod http;
pub mod logging;
pub mod vfs;

pub use build::{decompress_tree, resources_from_tree, DirTree, SourceTree};
pub use decoder::decompress;
pub use error::{Error, Result};
pub use file_serving::{CompressedResource, Site};
pub use vfs::{FileHandle, Metadata, VirtualFs};
