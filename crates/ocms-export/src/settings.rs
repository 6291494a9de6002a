use crate::error::ExportError;
use crate::path::extension;
use regex::Regex;

pub const DEFAULT_SUFFIXES: [&str; 9] = [
    ".html", ".htm", ".pdf", ".jpg", ".png", ".gif", ".css", ".js", ".txt",
];

/// Static export configuration of one site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteExport {
    /// VFS folder the site is mounted on, e.g. `/sites/default`.
    pub site_root: String,
    /// Overrides [`ExportSettings::rfs_prefix`] for this site.
    pub rfs_prefix: Option<String>,
    /// Locale used for locale prefixing when a resource has no `locale` property.
    pub default_locale: Option<String>,
}

impl SiteExport {
    pub fn new(site_root: impl Into<String>) -> Self {
        let site_root = site_root.into();
        Self {
            site_root: site_root.trim_end_matches('/').to_string(),
            rfs_prefix: None,
            default_locale: None,
        }
    }

    #[must_use]
    pub fn with_rfs_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.rfs_prefix = Some(prefix.into());
        self
    }

    #[must_use]
    pub fn with_default_locale(mut self, locale: impl Into<String>) -> Self {
        self.default_locale = Some(locale.into());
        self
    }

    /// Whether `root_path` lies in this site.
    pub fn contains(&self, root_path: &str) -> bool {
        let root = self.site_root.trim_end_matches('/');
        match root_path.strip_prefix(root) {
            Some(rest) => rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
    }
}

/// Routes VFS paths matching `source` to a dedicated RFS prefix.
#[derive(Debug, Clone)]
pub struct RfsRule {
    pub name: String,
    pub source: Regex,
    pub rfs_prefix: String,
}

impl RfsRule {
    pub fn new(
        name: impl Into<String>,
        source: &str,
        rfs_prefix: impl Into<String>,
    ) -> Result<Self, ExportError> {
        let regex = Regex::new(source).map_err(|source_err| ExportError::InvalidPattern {
            pattern: source.to_string(),
            source: source_err,
        })?;
        Ok(Self {
            name: name.into(),
            source: regex,
            rfs_prefix: rfs_prefix.into(),
        })
    }

    pub fn matches(&self, vfs_root_path: &str) -> bool {
        self.source.is_match(vfs_root_path)
    }
}

impl PartialEq for RfsRule {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.source.as_str() == other.source.as_str()
            && self.rfs_prefix == other.rfs_prefix
    }
}

impl Eq for RfsRule {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSettings {
    /// When off, every link is dynamic.
    pub enabled: bool,
    /// Export decision for resources without an `export` property.
    pub export_default: bool,
    /// Extensions (with leading dot) exported by default.
    pub default_suffixes: Vec<String>,
    /// Appended to exported JSP names unless an `exportsuffix` property says otherwise.
    pub jsp_suffix: String,
    /// File written for exported folders.
    pub default_file: String,
    /// Prefix of dynamic links.
    pub vfs_prefix: String,
    /// Prefix of exported links when no rule or site overrides it.
    pub rfs_prefix: String,
    pub locale_prefixing: bool,
    pub locales: Vec<String>,
    pub sites: Vec<SiteExport>,
    pub rules: Vec<RfsRule>,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            export_default: true,
            default_suffixes: DEFAULT_SUFFIXES.iter().map(|s| s.to_string()).collect(),
            jsp_suffix: ".html".to_string(),
            default_file: "index_export.html".to_string(),
            vfs_prefix: "/opencms".to_string(),
            rfs_prefix: "/export".to_string(),
            locale_prefixing: false,
            locales: Vec::new(),
            sites: Vec::new(),
            rules: Vec::new(),
        }
    }
}

impl ExportSettings {
    /// The site with the longest root containing `root_path`.
    pub fn site_for(&self, root_path: &str) -> Option<&SiteExport> {
        self.sites
            .iter()
            .filter(|site| site.contains(root_path))
            .max_by_key(|site| site.site_root.len())
    }

    /// Whether the extension of `name` is on the export allow-list (case-insensitive).
    pub fn is_suffix_exportable(&self, name: &str) -> bool {
        let Some(ext) = extension(name) else {
            return false;
        };
        self.default_suffixes
            .iter()
            .any(|suffix| suffix.eq_ignore_ascii_case(ext))
    }

    /// RFS prefix for `vfs_root_path`: first matching rule, then the site, then the default.
    pub fn rfs_prefix_for(&self, vfs_root_path: &str) -> &str {
        if let Some(rule) = self.rules.iter().find(|rule| rule.matches(vfs_root_path)) {
            return &rule.rfs_prefix;
        }
        self.site_for(vfs_root_path)
            .and_then(|site| site.rfs_prefix.as_deref())
            .unwrap_or(&self.rfs_prefix)
    }

    /// Every distinct RFS prefix a link can carry, longest first.
    pub fn all_rfs_prefixes(&self) -> Vec<&str> {
        let mut prefixes: Vec<&str> = self
            .rules
            .iter()
            .map(|rule| rule.rfs_prefix.as_str())
            .chain(self.sites.iter().filter_map(|site| site.rfs_prefix.as_deref()))
            .chain(std::iter::once(self.rfs_prefix.as_str()))
            .collect();
        prefixes.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        prefixes.dedup();
        prefixes
    }

    /// Locales that may appear as a path segment after locale prefixing.
    pub fn known_locales(&self) -> Vec<&str> {
        let mut locales: Vec<&str> = self
            .locales
            .iter()
            .map(String::as_str)
            .chain(self.sites.iter().filter_map(|site| site.default_locale.as_deref()))
            .collect();
        locales.sort_unstable();
        locales.dedup();
        locales
    }
}
