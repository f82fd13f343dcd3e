use serde::{Serialize, Deserialize};
use std::collections::BTreeSet;
use thiserror::Error;

/// Logical name of a resource inside its stack. Must be unique per stack.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LogicalId(pub String);

impl LogicalId {
    pub fn as_str(&self) -> &str { &self.0 }
}

/// The bucket declared by a `MultiStack` always carries this id.
pub const BUCKET_LOGICAL_ID: &str = "MyGroovyBucket";

/// Base properties shared by every stack.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackProps {
    pub name: String,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Configuration for the bucket stack: the base props plus one optional flag.
/// An absent flag means an unencrypted bucket.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiStackProps {
    #[serde(flatten)]
    pub props: StackProps,
    #[serde(default)]
    pub encrypt_bucket: Option<bool>,
}

/// Server-side encryption mode of a declared bucket.
///
/// `KmsManaged` delegates key generation and rotation entirely to the
/// platform's managed-key service; no key id is modeled here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BucketEncryption {
    Unencrypted,
    KmsManaged,
}

impl BucketEncryption {
    /// Pure mapping from the config flag: true and only true opts in.
    pub fn from_flag(encrypt_bucket: Option<bool>) -> Self {
        match encrypt_bucket {
            Some(true) => BucketEncryption::KmsManaged,
            Some(false) | None => BucketEncryption::Unencrypted,
        }
    }

    pub fn is_encrypted(&self) -> bool {
        matches!(self, BucketEncryption::KmsManaged)
    }
}

/// What happens to the cloud resource when its stack is torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemovalPolicy {
    Destroy,
    Retain,
}

/// A declared storage bucket, before any provider-specific rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketDeclaration {
    pub logical_id: LogicalId,
    pub encryption: BucketEncryption,
    pub removal_policy: RemovalPolicy,
}

/// Declarations a stack can hold. Only buckets today; the enum keeps the
/// renderers' match sites honest when more resource kinds arrive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Declaration {
    Bucket(BucketDeclaration),
}

impl Declaration {
    pub fn logical_id(&self) -> &LogicalId {
        match self {
            Declaration::Bucket(b) => &b.logical_id,
        }
    }
}

#[derive(Error, Debug)]
pub enum StackError {
    #[error("duplicate logical id '{0}' in stack")]
    DuplicateLogicalId(String),
}

/// A named, deployable collection of declared resources. Synthesis builds it
/// once; everything downstream (rendering, policy, deployment) only reads it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stack {
    pub name: String,
    pub region: Option<String>,
    pub description: Option<String>,
    declarations: Vec<Declaration>,
}

impl Stack {
    pub fn new(props: &StackProps) -> Self {
        Stack {
            name: props.name.clone(),
            region: props.region.clone(),
            description: props.description.clone(),
            declarations: Vec::new(),
        }
    }

    /// Registers a declaration, rejecting logical-id collisions.
    pub fn declare(&mut self, decl: Declaration) -> Result<(), StackError> {
        let ids: BTreeSet<&str> =
            self.declarations.iter().map(|d| d.logical_id().as_str()).collect();
        if ids.contains(decl.logical_id().as_str()) {
            return Err(StackError::DuplicateLogicalId(decl.logical_id().0.clone()));
        }
        self.declarations.push(decl);
        Ok(())
    }

    pub fn declarations(&self) -> &[Declaration] {
        &self.declarations
    }

    pub fn buckets(&self) -> impl Iterator<Item = &BucketDeclaration> {
        self.declarations.iter().map(|d| match d {
            Declaration::Bucket(b) => b,
        })
    }
}

/// Synthesizes the bucket stack: exactly one bucket, encryption driven by
/// `encrypt_bucket`, always destroyed on teardown. No I/O, no side effects.
pub fn synth(props: &MultiStackProps) -> Result<Stack, StackError> {
    let mut stack = Stack::new(&props.props);
    stack.declare(Declaration::Bucket(BucketDeclaration {
        logical_id: LogicalId(BUCKET_LOGICAL_ID.to_string()),
        encryption: BucketEncryption::from_flag(props.encrypt_bucket),
        removal_policy: RemovalPolicy::Destroy,
    }))?;
    Ok(stack)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(encrypt_bucket: Option<bool>) -> MultiStackProps {
        MultiStackProps {
            props: StackProps { name: "dev".into(), region: None, description: None },
            encrypt_bucket,
        }
    }

    #[test]
    fn flag_true_means_kms_managed() {
        assert_eq!(BucketEncryption::from_flag(Some(true)), BucketEncryption::KmsManaged);
    }

    #[test]
    fn flag_false_or_absent_means_unencrypted() {
        assert_eq!(BucketEncryption::from_flag(Some(false)), BucketEncryption::Unencrypted);
        assert_eq!(BucketEncryption::from_flag(None), BucketEncryption::Unencrypted);
    }

    #[test]
    fn synth_declares_exactly_one_bucket_with_destroy_policy() {
        for flag in [Some(true), Some(false), None] {
            let stack = synth(&props(flag)).unwrap();
            assert_eq!(stack.declarations().len(), 1);
            let bucket = stack.buckets().next().unwrap();
            assert_eq!(bucket.logical_id.as_str(), BUCKET_LOGICAL_ID);
            assert_eq!(bucket.removal_policy, RemovalPolicy::Destroy);
        }
    }

    #[test]
    fn synth_is_idempotent() {
        let p = props(Some(true));
        assert_eq!(synth(&p).unwrap(), synth(&p).unwrap());
    }

    #[test]
    fn duplicate_logical_id_is_rejected() {
        let mut stack = synth(&props(None)).unwrap();
        let dup = Declaration::Bucket(BucketDeclaration {
            logical_id: LogicalId(BUCKET_LOGICAL_ID.to_string()),
            encryption: BucketEncryption::KmsManaged,
            removal_policy: RemovalPolicy::Destroy,
        });
        assert!(matches!(stack.declare(dup), Err(StackError::DuplicateLogicalId(_))));
    }

    #[test]
    fn props_deserialize_from_yaml_style_json() {
        let p: MultiStackProps =
            serde_json::from_str(r#"{"name":"dev","encrypt_bucket":true}"#).unwrap();
        assert_eq!(p.encrypt_bucket, Some(true));
        assert_eq!(p.props.name, "dev");

        let p: MultiStackProps = serde_json::from_str(r#"{"name":"dev"}"#).unwrap();
        assert_eq!(p.encrypt_bucket, None);
    }
}
