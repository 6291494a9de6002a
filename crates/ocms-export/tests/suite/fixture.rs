use ocms_export::path::parent_folder;
use ocms_export::{
    ExportResource, ExportResources, ExportRewriteResolver, ExportSettings, SiteExport,
    PROPERTY_EXPORT_NAME,
};
use std::collections::BTreeMap;
use std::sync::Arc;

/// In-memory VFS: resources plus per-path properties.
#[derive(Debug, Default, Clone)]
pub struct MemoryVfs {
    resources: BTreeMap<String, ExportResource>,
    properties: BTreeMap<(String, String), String>,
}

impl MemoryVfs {
    pub fn new() -> Self {
        Self::default().folder("/")
    }

    /// Adds `root_path`; names ending in `/` are folders, `.jsp` files are JSPs.
    pub fn file(mut self, root_path: &str) -> Self {
        let is_folder = root_path.ends_with('/');
        let mut parent = parent_folder(root_path);
        while let Some(folder) = parent {
            self.resources
                .entry(folder.to_string())
                .or_insert_with(|| ExportResource {
                    root_path: folder.to_string(),
                    is_folder: true,
                    is_jsp: false,
                });
            parent = parent_folder(folder);
        }
        self.resources.insert(
            root_path.to_string(),
            ExportResource {
                root_path: root_path.to_string(),
                is_folder,
                is_jsp: !is_folder && root_path.ends_with(".jsp"),
            },
        );
        self
    }

    pub fn folder(self, root_path: &str) -> Self {
        self.file(root_path)
    }

    pub fn property(mut self, root_path: &str, name: &str, value: &str) -> Self {
        self.properties
            .insert((root_path.to_string(), name.to_string()), value.to_string());
        self
    }
}

impl ExportResources for MemoryVfs {
    fn resource(&self, root_path: &str) -> Option<ExportResource> {
        self.resources.get(root_path).cloned()
    }

    fn property(&self, root_path: &str, name: &str, search: bool) -> Option<String> {
        let mut current = Some(root_path);
        while let Some(path) = current {
            if let Some(value) = self.properties.get(&(path.to_string(), name.to_string())) {
                return Some(value.clone());
            }
            if !search {
                return None;
            }
            current = parent_folder(path);
        }
        None
    }

    fn export_names(&self) -> Vec<(String, String)> {
        self.properties
            .iter()
            .filter(|((_, name), _)| name == PROPERTY_EXPORT_NAME)
            .map(|((path, _), value)| (value.clone(), path.clone()))
            .collect()
    }
}

/// One site at `/sites/default` exporting to `/export`.
pub fn default_settings() -> ExportSettings {
    ExportSettings {
        sites: vec![SiteExport::new("/sites/default")],
        ..ExportSettings::default()
    }
}

pub fn resolver(settings: ExportSettings, vfs: MemoryVfs) -> ExportRewriteResolver {
    ExportRewriteResolver::new(settings, Arc::new(vfs))
}
