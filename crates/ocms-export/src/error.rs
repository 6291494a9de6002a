use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExportError {
    /// No exported resource maps to this RFS name.
    #[error("no exported resource matches `{rfs_name}`")]
    NotFound { rfs_name: String },
    /// The resource exists but is served dynamically.
    #[error("`{vfs_path}` is not statically exported")]
    NotExported { vfs_path: String },
    #[error("unknown resource `{vfs_path}`")]
    UnknownResource { vfs_path: String },
    #[error("invalid rfs rule pattern `{pattern}`")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}
