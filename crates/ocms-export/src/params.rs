use crate::path::extension;
use dashmap::DashMap;
use regex::Regex;
use std::sync::OnceLock;

/// Stable numeric fingerprint of a parameter string.
///
/// The 31-multiplier hash over UTF-16 code units, made non-negative, so a given parameter
/// string maps to the same file name across restarts.
pub fn parameter_hash(parameters: &str) -> u32 {
    parameters
        .encode_utf16()
        .fold(0i32, |hash, unit| {
            hash.wrapping_mul(31).wrapping_add(i32::from(unit))
        })
        .unsigned_abs()
}

/// Insert `_<hash>` before the extension of `rfs_name` (`/a/page.html` → `/a/page_42.html`).
pub fn with_parameter_suffix(rfs_name: &str, parameters: &str) -> String {
    let hash = parameter_hash(parameters);
    match extension(rfs_name) {
        Some(ext) => {
            let stem = &rfs_name[..rfs_name.len() - ext.len()];
            format!("{stem}_{hash}{ext}")
        }
        None => format!("{rfs_name}_{hash}"),
    }
}

/// Remove a `_<digits>` suffix added by [`with_parameter_suffix`], if present.
pub fn strip_parameter_suffix(rfs_name: &str) -> Option<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"_\d+(\.[^./]*)?$").expect("valid regex"));
    let found = re.find(rfs_name)?;
    let ext = extension(rfs_name)
        .filter(|ext| found.as_str().ends_with(ext))
        .unwrap_or("");
    Some(format!("{}{}", &rfs_name[..found.start()], ext))
}

/// Normalize a query string: no leading `?`, and `None` when empty.
pub fn normalize_parameters(parameters: Option<&str>) -> Option<&str> {
    parameters
        .map(|params| params.strip_prefix('?').unwrap_or(params))
        .filter(|params| !params.is_empty())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterLink {
    pub vfs_path: String,
    pub parameters: String,
}

/// Remembers which VFS path and parameters produced each parameterized RFS name.
#[derive(Debug, Default)]
pub struct ParameterLinkStore {
    links: DashMap<String, ParameterLink>,
}

impl ParameterLinkStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, rfs_name: impl Into<String>, link: ParameterLink) {
        self.links.insert(rfs_name.into(), link);
    }

    pub fn get(&self, rfs_name: &str) -> Option<ParameterLink> {
        self.links.get(rfs_name).map(|link| link.value().clone())
    }

    pub fn remove(&self, rfs_name: &str) -> Option<ParameterLink> {
        self.links.remove(rfs_name).map(|(_, link)| link)
    }

    pub fn clear(&self) {
        self.links.clear();
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}
