//! Pull Secret Merging
//!
//! Combines docker registry credentials from a user supplied secret into
//! the operator's `.dockerconfigjson` pull secret.

use crate::error::{Error, Result};
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::ByteString;
use serde_json::{Map, Value};

pub const SECRET_TYPE_DOCKER_CONFIG_JSON: &str = "kubernetes.io/dockerconfigjson";
pub const SECRET_TYPE_DOCKERCFG: &str = "kubernetes.io/dockercfg";

/// Data key of a dockerconfigjson secret
pub const DOCKER_CONFIG_JSON_KEY: &str = ".dockerconfigjson";

const AUTHS: &str = "auths";

/// Prefix every externally fetched manifest must start with
pub const ALLOWED_MANIFEST_URL_PREFIX: &str =
    "https://raw.githubusercontent.com/openshift-storage-scale";

/// Whether a manifest URL may be fetched
pub fn is_external_manifest_url_allowed(url: &str) -> bool {
    url.trim()
        .to_lowercase()
        .starts_with(ALLOWED_MANIFEST_URL_PREFIX)
}

fn parse_object(raw: &[u8], what: &str) -> Result<Map<String, Value>> {
    if raw.is_empty() {
        return Ok(Map::new());
    }
    serde_json::from_slice(raw)
        .map_err(|e| Error::PullSecret(format!("invalid {}: {}", what, e)))
}

/// Normalize a legacy `.dockercfg` document into the `.dockerconfigjson`
/// layout. Documents that already have `auths` pass through unchanged.
pub fn convert_dockercfg(raw: &[u8]) -> Result<Vec<u8>> {
    let cfg: Map<String, Value> = serde_json::from_slice(raw)
        .map_err(|e| Error::PullSecret(format!("invalid dockercfg: {}", e)))?;
    if cfg.contains_key(AUTHS) {
        return Ok(raw.to_vec());
    }

    let mut converted = Map::new();
    converted.insert(AUTHS.to_string(), Value::Object(cfg));
    Ok(serde_json::to_vec(&converted)?)
}

/// Merge two `.dockerconfigjson` documents. Registries under `auths` are
/// merged with `src` winning; any other top-level key is replaced.
pub fn merge_docker_config_json(dest: &[u8], src: &[u8]) -> Result<Vec<u8>> {
    let mut dest_cfg = parse_object(dest, "dest .dockerconfigjson")?;
    let src_cfg = parse_object(src, "src .dockerconfigjson")?;

    for (key, value) in src_cfg {
        if key != AUTHS {
            dest_cfg.insert(key, value);
            continue;
        }

        let mut auths = match dest_cfg.remove(AUTHS) {
            Some(Value::Object(existing)) => existing,
            _ => Map::new(),
        };
        if let Value::Object(src_auths) = value {
            auths.extend(src_auths);
        }
        dest_cfg.insert(AUTHS.to_string(), Value::Object(auths));
    }

    Ok(serde_json::to_vec(&dest_cfg)?)
}

/// Merge the registry credentials of `src` into `dest`.
///
/// `src` must be a docker config secret. Every data entry of `src` is
/// normalized and merged into the `.dockerconfigjson` entry of `dest`,
/// whose type defaults to dockerconfigjson when unset.
pub fn merge_docker_secrets(mut dest: Secret, src: &Secret) -> Result<Secret> {
    match src.type_.as_deref() {
        Some(SECRET_TYPE_DOCKER_CONFIG_JSON) | Some(SECRET_TYPE_DOCKERCFG) => {}
        _ => {
            return Err(Error::PullSecret(
                "source secret is not of Docker config type".into(),
            ))
        }
    }

    if dest.type_.as_deref().unwrap_or("").is_empty() {
        dest.type_ = Some(SECRET_TYPE_DOCKER_CONFIG_JSON.to_string());
    }

    let data = dest.data.get_or_insert_with(Default::default);
    for value in src.data.iter().flat_map(|d| d.values()) {
        let normalized = convert_dockercfg(&value.0)?;
        let current = data
            .get(DOCKER_CONFIG_JSON_KEY)
            .map(|b| b.0.as_slice())
            .unwrap_or_default();
        let merged = merge_docker_config_json(current, &normalized)?;
        data.insert(DOCKER_CONFIG_JSON_KEY.to_string(), ByteString(merged));
    }

    Ok(dest)
}
