//! Image reference helpers for the Storage Scale core image.

/// Longest value accepted in a label
pub const MAX_LABEL_VALUE_LENGTH: usize = 63;

const DIGEST_MARKER: &str = "@sha256:";

/// Digest or tag identifying a core image.
///
/// `repo@sha256:<digest>` yields the digest and `repo:<tag>` the tag. A
/// registry port such as `host:5000/repo` is not mistaken for a tag.
/// Images with neither yield an empty string.
pub fn core_image_hash(image: &str) -> String {
    if let Some((_, digest)) = image.split_once(DIGEST_MARKER) {
        return digest.to_string();
    }

    let last_segment = image.rsplit('/').next().unwrap_or(image);
    match last_segment.rsplit_once(':') {
        Some((_, tag)) => tag.to_string(),
        None => String::new(),
    }
}

/// [`core_image_hash`] cut to fit a label value
pub fn core_image_hash_for_label(image: &str) -> String {
    core_image_hash(image)
        .chars()
        .take(MAX_LABEL_VALUE_LENGTH)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const DIGEST: &str = "8bd2d8d1663d5a709327561d92e962ed1e6fb4925df9925701a637cadc22be2b";

    #[test]
    fn test_core_image_hash() {
        let cases = [
            (
                format!("cp.icr.io/cp/gpfs/ibm-spectrum-scale-core-init@sha256:{}", DIGEST),
                DIGEST.to_string(),
            ),
            (
                "quay.io/openshift-storage-scale/ibm-spectrum-scale-core-init:5.2.3.1.dev3".into(),
                "5.2.3.1.dev3".into(),
            ),
            ("docker.io/library/ubuntu".into(), String::new()),
            ("myregistry:5000/myrepo/myimage:1.0.0".into(), "1.0.0".into()),
            ("myregistry:5000/myrepo/myimage".into(), String::new()),
            (String::new(), String::new()),
        ];

        for (image, expected) in cases {
            assert_eq!(core_image_hash(&image), expected, "{}", image);
        }
    }

    #[test]
    fn test_core_image_hash_for_label() {
        let image = format!("cp.icr.io/cp/gpfs/ibm-spectrum-scale-core-init@sha256:{}", DIGEST);
        assert_eq!(core_image_hash_for_label(&image), &DIGEST[..63]);

        assert_eq!(
            core_image_hash_for_label("registry.local:5000/image/name:custom-tag"),
            "custom-tag"
        );
        assert_eq!(core_image_hash_for_label(""), "");

        let long = format!("example.com/repo/image@sha256:{}", "a".repeat(100));
        assert_eq!(core_image_hash_for_label(&long).len(), 63);
    }
}
