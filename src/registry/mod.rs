//! Registry Helpers
//!
//! Core image tag and digest extraction, manifest URL allow-listing and
//! docker pull-secret merging.

pub mod image;
pub mod pull_secret;

pub use image::{core_image_hash, core_image_hash_for_label};
pub use pull_secret::{
    convert_dockercfg, is_external_manifest_url_allowed, merge_docker_config_json,
    merge_docker_secrets,
};
