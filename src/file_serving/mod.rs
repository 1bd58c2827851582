pub mod handlers;
pub mod path_utils;
pub mod resource;

pub use handlers::{handle_file_request, Site};
pub use resource::CompressedResource;
