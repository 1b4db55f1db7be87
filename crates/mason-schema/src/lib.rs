//! Metadata model, template rendering and per-user configuration for mason.
//!
//! This crate defines the schema layer: the `metadata.json` document checked into
//! a package repository (`BuildMetadata`), the self-referential template renderer
//! used for extra artifacts and publish destinations (`render_template`), and the
//! INI-formatted per-user override file (`UserConfig`).

pub mod metadata;
pub mod template;
pub mod user;

pub use metadata::{
    parse_metadata_str, parse_skip_list, read_metadata, resolve_language, BuildInfo,
    BuildMetadata, BuildTarget, ExtraArtifact, MetadataError, PublishInfo, PublishTarget,
    SignInfo, DEFAULT_LANGUAGE, DEFAULT_SIGNING_PROGRAM, METADATA_FILENAME, OPTION_KEYRING,
    OPTION_TRUSTDB,
};
pub use template::{render_template, TemplateError};
pub use user::{UserConfig, UserConfigError, UserInfo, UserSignInfo, USER_CONFIG_FILENAME};
