use percent_encoding::percent_decode_str;
use std::io;

/// Turns a request path into a lookup key: percent-decoded, query stripped,
/// and reduced to its normal components joined by `/`. Paths naming a
/// directory (trailing slash or the root) get `index` appended.
pub fn sanitize_path(request_path: &str, index: &str) -> io::Result<String> {
    let path_without_query = request_path.split('?').next().unwrap_or(request_path);

    let decoded_path = percent_decode_str(path_without_query)
        .decode_utf8()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

    let components: Vec<&str> = decoded_path
        .split('/')
        .filter(|c| !c.is_empty() && *c != "." && *c != "..")
        .collect();
    log::trace!("Cleaned path components: {:?}", components);

    let mut key = components.join("/");
    if key.is_empty() || decoded_path.ends_with('/') {
        key = join_index(&key, index);
    }
    Ok(key)
}

pub fn join_index(dir: &str, index: &str) -> String {
    if dir.is_empty() {
        index.to_string()
    } else {
        format!("{}/{}", dir, index)
    }
}
