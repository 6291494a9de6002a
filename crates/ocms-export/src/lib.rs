//! Link rewriting for the static export.
//!
//! [`ExportRewriteResolver`] turns VFS root paths into the RFS names under which exported
//! resources are written (or into dynamic links when a resource is not exported), and maps RFS
//! names back to the VFS. The [`path`] helpers convert between absolute and relative URIs for
//! links inside exported documents.

mod error;
mod params;
pub mod path;
mod resolver;
mod resources;
mod settings;

pub use error::ExportError;
pub use params::{
    normalize_parameters, parameter_hash, strip_parameter_suffix, with_parameter_suffix,
    ParameterLink, ParameterLinkStore,
};
pub use path::{to_absolute, to_relative};
pub use resolver::{ExportLink, ExportRewriteResolver, ExportRewriteResult};
pub use resources::{
    ExportResource, ExportResources, PROPERTY_EXPORT, PROPERTY_EXPORT_NAME,
    PROPERTY_EXPORT_SUFFIX, PROPERTY_LOCALE,
};
pub use settings::{ExportSettings, RfsRule, SiteExport, DEFAULT_SUFFIXES};
