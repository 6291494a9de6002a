use crate::error::ExportError;
use crate::params::{
    normalize_parameters, strip_parameter_suffix, with_parameter_suffix, ParameterLink,
    ParameterLinkStore,
};
use crate::path::{extension, join, parent_folder};
use crate::resources::{
    ExportResource, ExportResources, PROPERTY_EXPORT, PROPERTY_EXPORT_NAME,
    PROPERTY_EXPORT_SUFFIX, PROPERTY_LOCALE,
};
use crate::settings::ExportSettings;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A statically exported resource and the on-disk name it is written to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportRewriteResult {
    /// RFS name including the export prefix, e.g. `/export/news/index.html`.
    pub rfs_path: String,
    /// VFS root path of the resource.
    pub vfs_path: String,
    pub used_parameters: Option<String>,
    /// Suffix appended to the VFS name (JSP or `exportsuffix`), if any.
    pub exported_suffix: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportLink {
    Exported(ExportRewriteResult),
    /// Served by the CMS on every request.
    Dynamic { link: String },
}

impl ExportLink {
    /// The externally visible link.
    pub fn link(&self) -> &str {
        match self {
            ExportLink::Exported(result) => &result.rfs_path,
            ExportLink::Dynamic { link } => link,
        }
    }

    pub fn is_exported(&self) -> bool {
        matches!(self, ExportLink::Exported(_))
    }
}

/// Maps VFS root paths to exported RFS names and back.
///
/// Forward resolution applies, in order: the nearest `exportname` folder property (or the
/// site-relative path), the locale segment, the export suffix, the parameter hash, and finally
/// the RFS prefix. Reverse resolution enumerates the VFS paths that could have produced a name
/// and accepts the first one whose forward resolution reproduces it exactly.
pub struct ExportRewriteResolver {
    settings: ExportSettings,
    resources: Arc<dyn ExportResources>,
    parameter_links: ParameterLinkStore,
}

impl ExportRewriteResolver {
    pub fn new(settings: ExportSettings, resources: Arc<dyn ExportResources>) -> Self {
        Self {
            settings,
            resources,
            parameter_links: ParameterLinkStore::new(),
        }
    }

    pub fn settings(&self) -> &ExportSettings {
        &self.settings
    }

    pub fn parameter_links(&self) -> &ParameterLinkStore {
        &self.parameter_links
    }

    /// Resolve the link for `vfs_root_path` requested with the query string `parameters`.
    pub fn rfs_name(
        &self,
        vfs_root_path: &str,
        parameters: Option<&str>,
    ) -> Result<ExportLink, ExportError> {
        let resource = self.resource(vfs_root_path)?;
        let parameters = normalize_parameters(parameters);

        if !self.is_exported(&resource) {
            return Ok(ExportLink::Dynamic {
                link: self.dynamic_link(vfs_root_path, parameters),
            });
        }

        let result = self.build(&resource, parameters);
        if let Some(parameters) = parameters {
            self.parameter_links.record(
                result.rfs_path.clone(),
                ParameterLink {
                    vfs_path: resource.root_path.clone(),
                    parameters: parameters.to_string(),
                },
            );
        }
        Ok(ExportLink::Exported(result))
    }

    /// Like [`ExportRewriteResolver::rfs_name`], but a dynamic resource is an error.
    pub fn exported_rfs_name(
        &self,
        vfs_root_path: &str,
        parameters: Option<&str>,
    ) -> Result<ExportRewriteResult, ExportError> {
        match self.rfs_name(vfs_root_path, parameters)? {
            ExportLink::Exported(result) => Ok(result),
            ExportLink::Dynamic { .. } => Err(ExportError::NotExported {
                vfs_path: vfs_root_path.to_string(),
            }),
        }
    }

    /// The externally visible link for `vfs_root_path`, exported or dynamic.
    pub fn link_for(
        &self,
        vfs_root_path: &str,
        parameters: Option<&str>,
    ) -> Result<String, ExportError> {
        Ok(match self.rfs_name(vfs_root_path, parameters)? {
            ExportLink::Exported(result) => result.rfs_path,
            ExportLink::Dynamic { link } => link,
        })
    }

    pub fn is_export_link(&self, vfs_root_path: &str) -> bool {
        self.resources
            .resource(vfs_root_path)
            .is_some_and(|resource| self.is_exported(&resource))
    }

    /// File the export of `rfs_name` is written to: folders get the default file appended.
    pub fn export_file_path(&self, rfs_name: &str) -> String {
        if rfs_name.ends_with('/') {
            format!("{rfs_name}{}", self.settings.default_file)
        } else {
            rfs_name.to_string()
        }
    }

    /// Recover the VFS resource (and parameters, when known) behind an exported RFS name.
    pub fn vfs_name(&self, rfs_name: &str) -> Result<ExportRewriteResult, ExportError> {
        if let Some(link) = self.parameter_links.get(rfs_name) {
            if let Some(result) = self.accept(&link.vfs_path, Some(&link.parameters), rfs_name) {
                return Ok(result);
            }
            // Stale entry, e.g. the resource was moved since the link was produced.
            self.parameter_links.remove(rfs_name);
        }

        for target in self.targets(rfs_name) {
            if let Some(result) = self.resolve_canonical(&target) {
                return Ok(result);
            }
        }

        if let Some(canonical) = strip_parameter_suffix(rfs_name) {
            for target in self.targets(&canonical) {
                if let Some(mut result) = self.resolve_canonical(&target) {
                    result.rfs_path = rfs_name.to_string();
                    return Ok(result);
                }
            }
        }

        tracing::debug!(target: "ocms.export", rfs_name, "no vfs resource for rfs name");
        Err(ExportError::NotFound {
            rfs_name: rfs_name.to_string(),
        })
    }

    fn resource(&self, vfs_root_path: &str) -> Result<ExportResource, ExportError> {
        self.resources
            .resource(vfs_root_path)
            .ok_or_else(|| ExportError::UnknownResource {
                vfs_path: vfs_root_path.to_string(),
            })
    }

    fn is_exported(&self, resource: &ExportResource) -> bool {
        if !self.settings.enabled {
            return false;
        }
        let forced = self
            .resources
            .property(&resource.root_path, PROPERTY_EXPORT, true);
        match forced.as_deref().map(str::trim) {
            Some(value) if value.eq_ignore_ascii_case("true") => true,
            Some(value) if value.eq_ignore_ascii_case("false") => false,
            _ => {
                if !self.settings.export_default {
                    return false;
                }
                if resource.is_folder {
                    return true;
                }
                let mut effective = resource.root_path.clone();
                if let Some(suffix) = self.export_suffix(resource) {
                    effective.push_str(&suffix);
                }
                self.settings.is_suffix_exportable(&effective)
            }
        }
    }

    /// Suffix appended to the exported name, unless the name already carries it.
    fn export_suffix(&self, resource: &ExportResource) -> Option<String> {
        if resource.is_folder {
            return None;
        }
        let suffix = self
            .resources
            .property(&resource.root_path, PROPERTY_EXPORT_SUFFIX, false)
            .filter(|suffix| !suffix.trim().is_empty())
            .or_else(|| resource.is_jsp.then(|| self.settings.jsp_suffix.clone()))?;
        let suffix = suffix.trim();
        let already = extension(&resource.root_path)
            .is_some_and(|ext| ext.eq_ignore_ascii_case(suffix));
        (!already).then(|| suffix.to_string())
    }

    /// Path of `root_path` below its site root, always starting with `/`.
    fn site_relative<'a>(&self, root_path: &'a str) -> &'a str {
        let relative = match self.settings.site_for(root_path) {
            Some(site) => &root_path[site.site_root.len()..],
            None => root_path,
        };
        if relative.is_empty() {
            "/"
        } else {
            relative
        }
    }

    fn dynamic_link(&self, vfs_root_path: &str, parameters: Option<&str>) -> String {
        let mut link = join(&self.settings.vfs_prefix, self.site_relative(vfs_root_path));
        if let Some(parameters) = parameters {
            link.push('?');
            link.push_str(parameters);
        }
        link
    }

    /// Nearest `exportname` at or above the resource: `(normalized name, path below folder)`.
    fn export_name_for(&self, resource: &ExportResource) -> Option<(String, String)> {
        let root = resource.root_path.as_str();
        let mut folder = if resource.is_folder {
            Some(root)
        } else {
            parent_folder(root)
        };
        while let Some(current) = folder {
            let name = self
                .resources
                .property(current, PROPERTY_EXPORT_NAME, false)
                .filter(|name| !name.trim().is_empty());
            if let Some(name) = name {
                return Some((normalize_export_name(&name), root[current.len()..].to_string()));
            }
            folder = parent_folder(current);
        }
        None
    }

    fn locale_for(&self, resource: &ExportResource) -> Option<String> {
        if !self.settings.locale_prefixing {
            return None;
        }
        self.resources
            .property(&resource.root_path, PROPERTY_LOCALE, true)
            .filter(|locale| !locale.trim().is_empty())
            .or_else(|| {
                self.settings
                    .site_for(&resource.root_path)
                    .and_then(|site| site.default_locale.clone())
            })
            .or_else(|| self.settings.locales.first().cloned())
    }

    fn build(&self, resource: &ExportResource, parameters: Option<&str>) -> ExportRewriteResult {
        let root = resource.root_path.as_str();
        let (mut rfs, tail) = match self.export_name_for(resource) {
            Some((name, tail)) => (name, tail),
            None => (
                "/".to_string(),
                self.site_relative(root)
                    .trim_start_matches('/')
                    .to_string(),
            ),
        };
        if let Some(locale) = self.locale_for(resource) {
            rfs.push_str(locale.trim_matches('/'));
            rfs.push('/');
        }
        rfs.push_str(&tail);

        let exported_suffix = self.export_suffix(resource);
        if let Some(suffix) = &exported_suffix {
            rfs.push_str(suffix);
        }
        if let Some(parameters) = parameters {
            if rfs.ends_with('/') {
                rfs.push_str(&self.settings.default_file);
            }
            rfs = with_parameter_suffix(&rfs, parameters);
        }

        ExportRewriteResult {
            rfs_path: join(self.settings.rfs_prefix_for(root), &rfs),
            vfs_path: root.to_string(),
            used_parameters: parameters.map(str::to_string),
            exported_suffix,
        }
    }

    /// Forward-resolve `vfs_root_path` and keep the result only if it reproduces `rfs_name`.
    fn accept(
        &self,
        vfs_root_path: &str,
        parameters: Option<&str>,
        rfs_name: &str,
    ) -> Option<ExportRewriteResult> {
        let resource = self.resources.resource(vfs_root_path)?;
        if !self.is_exported(&resource) {
            return None;
        }
        let result = self.build(&resource, parameters);
        (result.rfs_path == rfs_name).then_some(result)
    }

    fn resolve_canonical(&self, rfs_name: &str) -> Option<ExportRewriteResult> {
        self.candidates(rfs_name).into_iter().find_map(|candidate| {
            tracing::trace!(target: "ocms.export", rfs_name, candidate = %candidate, "trying vfs candidate");
            self.accept(&candidate, None, rfs_name)
        })
    }

    /// `rfs_name` itself and, for a folder's default file, the folder name.
    fn targets(&self, rfs_name: &str) -> Vec<String> {
        let mut targets = vec![rfs_name.to_string()];
        if let Some(folder) = rfs_name.strip_suffix(self.settings.default_file.as_str()) {
            if folder.ends_with('/') {
                targets.push(folder.to_string());
            }
        }
        targets
    }

    /// VFS paths whose forward resolution might yield `rfs_name`.
    fn candidates(&self, rfs_name: &str) -> Vec<String> {
        let mut site_roots: Vec<&str> = self
            .settings
            .sites
            .iter()
            .map(|site| site.site_root.as_str())
            .collect();
        site_roots.push("");
        let export_names: Vec<(String, String)> = self
            .resources
            .export_names()
            .into_iter()
            .map(|(name, folder)| {
                let folder = if folder.ends_with('/') {
                    folder
                } else {
                    format!("{folder}/")
                };
                (normalize_export_name(&name), folder)
            })
            .collect();

        let mut candidates = Vec::new();
        for prefix in self.settings.all_rfs_prefixes() {
            let Some(rest) = rfs_name.strip_prefix(prefix.trim_end_matches('/')) else {
                continue;
            };
            if !rest.starts_with('/') {
                continue;
            }

            for (name, folder) in &export_names {
                if let Some(below) = rest.strip_prefix(name.as_str()) {
                    for path in self.expand(below) {
                        candidates.push(format!("{folder}{path}"));
                    }
                }
            }
            for path in self.expand(&rest[1..]) {
                for site_root in &site_roots {
                    candidates.push(format!("{site_root}/{path}"));
                }
            }
        }

        let mut seen = std::collections::HashSet::new();
        candidates.retain(|candidate| seen.insert(candidate.clone()));
        candidates
    }

    /// Variants of a relative RFS path with the locale segment and export suffix undone.
    ///
    /// A `locale` property may name any locale, so every leading segment is a locale
    /// candidate; [`Self::accept`] discards the ones forward resolution does not reproduce.
    fn expand(&self, relative: &str) -> Vec<String> {
        let mut paths = Vec::new();
        if self.settings.locale_prefixing {
            for locale in self.settings.known_locales() {
                if let Some(rest) = relative
                    .strip_prefix(locale)
                    .and_then(|rest| rest.strip_prefix('/'))
                {
                    paths.push(rest.to_string());
                }
            }
            if let Some((_, rest)) = relative.split_once('/') {
                paths.push(rest.to_string());
            }
        }
        paths.push(relative.to_string());

        let mut expanded = Vec::with_capacity(paths.len() * 2);
        for path in paths {
            expanded.push(path.clone());
            if let Some(ext) = extension(&path) {
                expanded.push(path[..path.len() - ext.len()].to_string());
            }
        }
        expanded
    }
}

impl std::fmt::Debug for ExportRewriteResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExportRewriteResolver")
            .field("settings", &self.settings)
            .field("parameter_links", &self.parameter_links.len())
            .finish_non_exhaustive()
    }
}

/// `name` as an absolute folder path: leading and trailing `/`.
fn normalize_export_name(name: &str) -> String {
    let trimmed = name.trim().trim_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        format!("/{trimmed}/")
    }
}
