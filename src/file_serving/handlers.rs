use std::collections::HashMap;
use std::io::{self, Write};
use std::path::Path;
use std::time::Instant;

use super::path_utils::{join_index, sanitize_path};
use super::resource::CompressedResource;
use crate::build::{decompress_tree, resources_from_tree, DirTree};
use crate::error::Result;
use crate::http::content::serve_content;
use crate::http::{Request, Response};
use crate::vfs::VirtualFs;
use crate::{log_error, log_response};

/// Everything a server answers from, loaded once at startup.
#[derive(Debug, Clone)]
pub enum Site {
    /// Each file keeps both forms and is negotiated per request.
    Negotiated(HashMap<String, CompressedResource>),
    /// Files were decompressed up front and are always sent as identity.
    Decompressed(VirtualFs),
}

impl Site {
    /// Walks `dir` and loads every `.gz` file below it.
    pub fn load(dir: &Path, decompress: bool) -> Result<Self> {
        let tree = DirTree::new(dir);
        if decompress {
            decompress_tree(&tree).map(Site::Decompressed)
        } else {
            resources_from_tree(&tree).map(Site::Negotiated)
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Site::Negotiated(resources) => resources.len(),
            Site::Decompressed(fs) => fs.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Site::Negotiated(resources) => resources.is_empty(),
            Site::Decompressed(fs) => fs.is_empty(),
        }
    }

    fn contains(&self, key: &str) -> bool {
        match self {
            Site::Negotiated(resources) => resources.contains_key(key),
            Site::Decompressed(fs) => fs.contains(key),
        }
    }

    fn is_dir(&self, key: &str) -> bool {
        match self {
            Site::Negotiated(resources) => {
                let prefix = format!("{}/", key);
                resources.keys().any(|k| k.starts_with(&prefix))
            }
            Site::Decompressed(fs) => fs.is_dir(key),
        }
    }

    /// Resolves the request path, falling back to `index` inside directories.
    fn resolve(&self, request_path: &str, index: &str) -> io::Result<Option<String>> {
        let key = sanitize_path(request_path, index)?;
        if self.contains(&key) {
            return Ok(Some(key));
        }
        if self.is_dir(&key) {
            let index_key = join_index(&key, index);
            if self.contains(&index_key) {
                return Ok(Some(index_key));
            }
        }
        Ok(None)
    }

    /// Builds the full response for `request`.
    pub fn respond(&self, request: &Request, index: &str) -> Response {
        if !request.is_get_or_head() {
            let mut response = Response::empty(405);
            response.set_header("Allow", "GET, HEAD");
            return response;
        }

        let key = match self.resolve(request.path(), index) {
            Ok(Some(key)) => key,
            Ok(None) => {
                log::debug!("File not found: {}", request.path());
                return Response::text(404, "Not Found");
            }
            Err(e) => {
                log::warn!("Rejecting path {}: {}", request.path(), e);
                return Response::text(400, "Bad Request");
            }
        };
        log::debug!("Resolved {} to {}", request.path(), key);

        match self {
            Site::Negotiated(resources) => resources[&key].serve(request),
            Site::Decompressed(fs) => serve_decompressed(fs, &key, request),
        }
    }
}

fn serve_decompressed(fs: &VirtualFs, key: &str, request: &Request) -> Response {
    let served = fs.open(key).map_err(io::Error::from).and_then(|file| {
        let metadata = file.metadata().clone();
        let mut response = Response::new(200);
        serve_content(request, &mut response, metadata.name(), metadata.modified(), file)?;
        Ok(response)
    });

    match served {
        Ok(response) => response,
        Err(e) => {
            log_error!(e, format!("Failed to serve {}", key));
            Response::empty(500)
        }
    }
}

/// Answers one request on `client` and reports how it went.
pub fn handle_file_request<W: Write>(
    client: &mut W,
    site: &Site,
    request: &Request,
    index: &str,
) -> io::Result<()> {
    let start_time = Instant::now();

    let mut response = site.respond(request, index);
    response.set_header("Connection", "close");
    response.write_to(client)?;

    log_response!(response.status(), start_time.elapsed(), response.body().len());
    Ok(())
}
