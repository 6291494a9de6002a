use schemars::schema::RootSchema;
use schemars::schema_for;

use crate::OcmsConfig;

/// JSON schema of the TOML config, for editor integration and CI checks.
#[must_use]
pub fn json_schema() -> RootSchema {
    schema_for!(OcmsConfig)
}
