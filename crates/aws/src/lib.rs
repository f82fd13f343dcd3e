use serde::{Serialize, Deserialize};
use serde_json::{json, Value as Json};

use multistack_core::{BucketDeclaration, Declaration, RemovalPolicy, Stack};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AwsProvider { pub region: String }

impl AwsProvider {
    pub fn to_tf_json(&self) -> Json {
        json!({ "provider": { "aws": { "region": self.region } } })
    }
}

/// Terraform resource name for a bucket declaration. Terraform identifiers
/// are lowercase with underscores; logical ids come in CamelCase.
fn tf_name(decl: &BucketDeclaration) -> String {
    let mut out = String::new();
    for (i, c) in decl.logical_id.as_str().chars().enumerate() {
        if c.is_ascii_uppercase() {
            if i > 0 { out.push('_'); }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// Renders one bucket declaration as an `aws_s3_bucket` resource fragment.
///
/// An unencrypted declaration emits no encryption block at all; the platform
/// default applies. A kms-managed one asks for aws:kms with no key id, which
/// Terraform resolves to the provider-managed key.
pub fn bucket_to_tf_json(decl: &BucketDeclaration) -> Json {
    let name = tf_name(decl);
    let force_destroy = matches!(decl.removal_policy, RemovalPolicy::Destroy);
    let mut body = json!({
        "bucket": decl.logical_id.as_str().to_ascii_lowercase(),
        "force_destroy": force_destroy,
    });
    if decl.encryption.is_encrypted() {
        body["server_side_encryption_configuration"] = json!({
            "rule": { "apply_server_side_encryption_by_default": {
                "sse_algorithm": "aws:kms"
            }}
        });
    }
    json!({ "resource": { "aws_s3_bucket": { name: body } } })
}

/// Deep-merges `b` into `a`; objects merge key-by-key, anything else is
/// replaced by `b`.
pub fn merge(mut a: Json, b: Json) -> Json {
    match (a.as_object_mut(), b) {
        (Some(ma), Json::Object(mb)) => {
            for (k, v) in mb.into_iter() {
                let existing = ma.remove(&k).unwrap_or(Json::Null);
                ma.insert(k, merge(existing, v));
            }
            Json::Object(ma.clone())
        }
        (_, v) => v
    }
}

/// Renders a synthesized stack as a complete `main.tf.json` document.
pub fn stack_to_tf_json(stack: &Stack, provider: &AwsProvider) -> Json {
    let mut tf = json!({ "terraform": { "required_providers": {
        "aws": { "source": "hashicorp/aws", "version": "~> 5.0" }
    }}});
    tf = merge(tf, provider.to_tf_json());
    for decl in stack.declarations() {
        match decl {
            Declaration::Bucket(b) => { tf = merge(tf, bucket_to_tf_json(b)); }
        }
    }
    tf
}
