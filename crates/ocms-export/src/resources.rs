/// Folder property that replaces the site-relative path of everything below the folder.
pub const PROPERTY_EXPORT_NAME: &str = "exportname";
/// `true` forces export, `false` forbids it.
pub const PROPERTY_EXPORT: &str = "export";
/// Suffix appended to the exported name instead of the default.
pub const PROPERTY_EXPORT_SUFFIX: &str = "exportsuffix";
pub const PROPERTY_LOCALE: &str = "locale";

/// What the resolver needs to know about a VFS resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportResource {
    pub root_path: String,
    pub is_folder: bool,
    /// JSP resources are exported with a synthetic suffix.
    pub is_jsp: bool,
}

/// Read access to the VFS for export resolution.
pub trait ExportResources: Send + Sync {
    fn resource(&self, root_path: &str) -> Option<ExportResource>;

    /// Value of property `name` on `root_path`; with `search`, parent folders are consulted
    /// when the resource itself does not define it.
    fn property(&self, root_path: &str, name: &str, search: bool) -> Option<String>;

    /// Every `(export name, folder root path)` pair defined in the VFS.
    fn export_names(&self) -> Vec<(String, String)>;
}
