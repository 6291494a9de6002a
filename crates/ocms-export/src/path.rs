//! Conversion between absolute and relative URIs.
//!
//! Both directions are pure string algorithms over `/`-separated paths; no filesystem or VFS
//! state is consulted.

/// Resolve `uri` against `base`, the absolute URI of the document that contains the link.
///
/// Absolute input (starting with `/`) is returned unchanged. Relative input is resolved
/// against the directory of `base`: `.` segments are dropped and each `..` removes one
/// segment. `..` above the root stays at the root. A query or fragment is carried over as-is.
pub fn to_absolute(uri: &str, base: &str) -> String {
    if uri.starts_with('/') {
        return uri.to_string();
    }

    let split = uri.find(['?', '#']).unwrap_or(uri.len());
    let (path, suffix) = uri.split_at(split);
    if path.is_empty() {
        return format!("{base}{suffix}");
    }

    let directory = match base.rfind('/') {
        Some(idx) => &base[..=idx],
        None => "/",
    };
    let mut segments: Vec<&str> = directory
        .split('/')
        .filter(|segment| !segment.is_empty())
        .collect();

    let mut trailing_slash = false;
    for segment in path.split('/') {
        trailing_slash = false;
        match segment {
            "" => trailing_slash = true,
            "." => trailing_slash = true,
            ".." => {
                segments.pop();
                trailing_slash = true;
            }
            name => segments.push(name),
        }
    }

    let mut absolute = String::with_capacity(uri.len() + directory.len());
    for segment in &segments {
        absolute.push('/');
        absolute.push_str(segment);
    }
    if segments.is_empty() || trailing_slash {
        absolute.push('/');
    }
    absolute.push_str(suffix);
    absolute
}

/// Shortest relative link from the document at `from` to the absolute URI `to`.
///
/// The common directory prefix is skipped, one `../` is emitted per remaining directory of
/// `from`, then the rest of `to` follows. A link to the document's own directory is `./`,
/// never the empty string.
pub fn to_relative(from: &str, to: &str) -> String {
    let from_bytes = from.as_bytes();
    let to_bytes = to.as_bytes();

    let mut pos = 0;
    loop {
        let (Some(i), Some(j)) = (find_slash(from_bytes, pos), find_slash(to_bytes, pos)) else {
            break;
        };
        if i != j || from_bytes[pos..i] != to_bytes[pos..j] {
            break;
        }
        pos = i + 1;
    }

    let mut relative = String::new();
    let mut next = find_slash(from_bytes, pos);
    while let Some(idx) = next {
        relative.push_str("../");
        next = find_slash(from_bytes, idx + 1);
    }
    relative.push_str(&to[pos.min(to.len())..]);

    if relative.is_empty() {
        relative.push_str("./");
    }
    relative
}

fn find_slash(bytes: &[u8], from: usize) -> Option<usize> {
    bytes
        .get(from..)?
        .iter()
        .position(|byte| *byte == b'/')
        .map(|offset| from + offset)
}

/// Parent folder of `root_path` (with trailing `/`), or `None` for the root itself.
pub fn parent_folder(root_path: &str) -> Option<&str> {
    let trimmed = root_path.strip_suffix('/').unwrap_or(root_path);
    let idx = trimmed.rfind('/')?;
    Some(&root_path[..=idx])
}

/// Extension of the last path segment including the dot (`".html"`), if any.
pub fn extension(path: &str) -> Option<&str> {
    let name = &path[path.rfind('/').map_or(0, |idx| idx + 1)..];
    let dot = name.rfind('.')?;
    if dot == 0 {
        return None;
    }
    Some(&name[dot..])
}

/// Join two path fragments with exactly one `/` between them.
pub fn join(prefix: &str, rest: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    if rest.starts_with('/') {
        format!("{prefix}{rest}")
    } else {
        format!("{prefix}/{rest}")
    }
}
