//! Request and response bodies of the git data API.

use serde::{Deserialize, Serialize};

use manifest_publisher_core::domain::{ObjectSha, TreeEntry};

#[derive(Debug, Serialize)]
pub struct BlobRequest<'a> {
    pub content: &'a str,
    pub encoding: &'static str,
}

impl<'a> BlobRequest<'a> {
    pub fn base64(content: &'a str) -> Self {
        Self {
            content,
            encoding: "base64",
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TreeRequest<'a> {
    pub base_tree: &'a ObjectSha,
    pub tree: &'a [TreeEntry],
}

#[derive(Debug, Serialize)]
pub struct CommitRequest<'a> {
    pub message: &'a str,
    pub tree: &'a ObjectSha,
    pub parents: &'a [ObjectSha],
}

#[derive(Debug, Serialize)]
pub struct RefUpdateRequest<'a> {
    pub sha: &'a ObjectSha,
    pub force: bool,
}

/// Any response that only carries the created object's sha.
#[derive(Debug, Deserialize)]
pub struct ShaResponse {
    pub sha: ObjectSha,
}

#[derive(Debug, Deserialize)]
pub struct RefResponse {
    #[serde(rename = "ref")]
    pub reference: String,
    pub object: ShaResponse,
}

#[derive(Debug, Deserialize)]
pub struct CommitResponse {
    pub sha: ObjectSha,
    pub tree: ShaResponse,
}

#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHA: &str = "aa218f56b14c9653891f9e74264a383fa43fefbd";

    fn sha() -> ObjectSha {
        ObjectSha::parse(SHA).unwrap()
    }

    #[test]
    fn test_ref_update_never_forces() {
        let sha = sha();
        let body = serde_json::to_value(RefUpdateRequest {
            sha: &sha,
            force: false,
        })
        .unwrap();
        assert_eq!(body, serde_json::json!({ "sha": SHA, "force": false }));
    }

    #[test]
    fn test_tree_request_shape() {
        let sha = sha();
        let entries = vec![TreeEntry::blob("svc/deploy-stg.yaml", sha.clone())];
        let body = serde_json::to_value(TreeRequest {
            base_tree: &sha,
            tree: &entries,
        })
        .unwrap();
        assert_eq!(body["base_tree"], SHA);
        assert_eq!(body["tree"][0]["path"], "svc/deploy-stg.yaml");
        assert_eq!(body["tree"][0]["mode"], "100644");
        assert_eq!(body["tree"][0]["type"], "blob");
    }

    #[test]
    fn test_commit_request_shape() {
        let sha = sha();
        let parents = vec![sha.clone()];
        let body = serde_json::to_value(CommitRequest {
            message: "v1.2.3",
            tree: &sha,
            parents: &parents,
        })
        .unwrap();
        assert_eq!(
            body,
            serde_json::json!({ "message": "v1.2.3", "tree": SHA, "parents": [SHA] })
        );
    }

    #[test]
    fn test_decode_ref_and_commit() {
        let r: RefResponse = serde_json::from_str(&format!(
            r#"{{"ref":"refs/heads/main","node_id":"x","object":{{"type":"commit","sha":"{SHA}"}}}}"#
        ))
        .unwrap();
        assert_eq!(r.reference, "refs/heads/main");
        assert_eq!(r.object.sha, sha());

        let c: CommitResponse = serde_json::from_str(&format!(
            r#"{{"sha":"{SHA}","message":"m","tree":{{"sha":"{SHA}","url":"u"}},"parents":[]}}"#
        ))
        .unwrap();
        assert_eq!(c.tree.sha, sha());
    }

    #[test]
    fn test_decode_rejects_malformed_sha() {
        let err = serde_json::from_str::<ShaResponse>(r#"{"sha":"nope"}"#);
        assert!(err.is_err());
    }
}
