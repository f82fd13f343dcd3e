use anyhow::Result;
use serde_json::Value as Json;

use multistack_core::Stack;

/// Plan-time checks against the synthesized stack and its rendered output.
pub struct Policy { pub allow_unencrypted: bool }

impl Policy {
    pub fn new(allow_unencrypted: bool) -> Self { Self { allow_unencrypted } }

    /// Rejects unencrypted bucket declarations unless the override is set.
    pub fn check_stack(&self, stack: &Stack) -> Result<()> {
        if self.allow_unencrypted { return Ok(()); }
        for bucket in stack.buckets() {
            if !bucket.encryption.is_encrypted() {
                anyhow::bail!(
                    "Policy: bucket '{}' requires server-side encryption (pass --allow-unencrypted to override)",
                    bucket.logical_id.as_str()
                );
            }
        }
        Ok(())
    }

    /// Same check on an already-rendered Terraform document, so templates
    /// produced outside `synth` are held to the same rule.
    pub fn check_tf_json(&self, tf: &Json) -> Result<()> {
        if self.allow_unencrypted { return Ok(()); }
        if let Some(res) = tf.get("resource").and_then(|r| r.get("aws_s3_bucket")) {
            let buckets = res.as_object().into_iter().flatten();
            for (name, bucket) in buckets {
                if bucket.get("server_side_encryption_configuration").is_none() {
                    anyhow::bail!("Policy: S3 bucket '{}' requires server-side encryption", name);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use multistack_core::{synth, MultiStackProps, StackProps};
    use serde_json::json;

    fn stack(encrypt_bucket: Option<bool>) -> Stack {
        synth(&MultiStackProps {
            props: StackProps { name: "dev".into(), region: None, description: None },
            encrypt_bucket,
        }).unwrap()
    }

    #[test]
    fn unencrypted_bucket_is_rejected_by_default() {
        assert!(Policy::new(false).check_stack(&stack(None)).is_err());
        assert!(Policy::new(false).check_stack(&stack(Some(false))).is_err());
    }

    #[test]
    fn encrypted_bucket_passes() {
        assert!(Policy::new(false).check_stack(&stack(Some(true))).is_ok());
    }

    #[test]
    fn override_admits_unencrypted() {
        assert!(Policy::new(true).check_stack(&stack(None)).is_ok());
    }

    #[test]
    fn tf_json_check_matches_stack_check() {
        let bare = json!({ "resource": { "aws_s3_bucket": { "b": { "bucket": "b" } } } });
        assert!(Policy::new(false).check_tf_json(&bare).is_err());
        assert!(Policy::new(true).check_tf_json(&bare).is_ok());

        let enc = json!({ "resource": { "aws_s3_bucket": { "b": {
            "bucket": "b",
            "server_side_encryption_configuration": {}
        }}}});
        assert!(Policy::new(false).check_tf_json(&enc).is_ok());
    }
}
