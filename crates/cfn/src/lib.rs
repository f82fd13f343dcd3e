use anyhow::{Context, Result};
use serde::{Serialize, Deserialize};
use serde_json::{json, Value as Json};
use std::collections::BTreeMap;
use std::process::Command;

use multistack_core::{BucketDeclaration, Declaration, RemovalPolicy, Stack};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CfnResource {
    #[serde(rename="Type")]
    pub type_name: String,
    #[serde(rename="DeletionPolicy")]
    pub deletion_policy: String,
    #[serde(rename="UpdateReplacePolicy")]
    pub update_replace_policy: String,
    #[serde(rename="Properties", skip_serializing_if="Json::is_null", default)]
    pub properties: Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CfnTemplate {
    #[serde(rename="AWSTemplateFormatVersion")] pub version: Option<String>,
    #[serde(rename="Description")] pub description: Option<String>,
    #[serde(rename="Resources")] pub resources: BTreeMap<String, CfnResource>,
}

fn deletion_policy(p: RemovalPolicy) -> &'static str {
    match p { RemovalPolicy::Destroy => "Delete", RemovalPolicy::Retain => "Retain" }
}

fn bucket_resource(decl: &BucketDeclaration) -> CfnResource {
    let properties = if decl.encryption.is_encrypted() {
        json!({ "BucketEncryption": {
            "ServerSideEncryptionConfiguration": [
                { "ServerSideEncryptionByDefault": { "SSEAlgorithm": "aws:kms" } }
            ]
        }})
    } else {
        Json::Null
    };
    CfnResource {
        type_name: "AWS::S3::Bucket".to_string(),
        deletion_policy: deletion_policy(decl.removal_policy).to_string(),
        update_replace_policy: deletion_policy(decl.removal_policy).to_string(),
        properties,
    }
}

/// Renders a synthesized stack as a CloudFormation template.
pub fn template_for_stack(stack: &Stack) -> CfnTemplate {
    let mut resources = BTreeMap::new();
    for decl in stack.declarations() {
        match decl {
            Declaration::Bucket(b) => {
                resources.insert(b.logical_id.0.clone(), bucket_resource(b));
            }
        }
    }
    CfnTemplate {
        version: Some("2010-09-09".to_string()),
        description: stack.description.clone(),
        resources,
    }
}

fn aws() -> Result<String> {
    let p = which::which("aws").context("aws cli not found in PATH")?;
    Ok(p.to_string_lossy().into_owned())
}

pub fn deploy_stack(stack_name: &str, template_body: &Json, region: Option<&str>) -> Result<()> {
    let aws = aws()?;
    let mut cmd = Command::new(aws);
    cmd.arg("cloudformation").arg("deploy")
        .arg("--stack-name").arg(stack_name)
        .arg("--template-file").arg("-");
    if let Some(r) = region { cmd.arg("--region").arg(r); }
    let mut child = cmd.stdin(std::process::Stdio::piped())
        .stdout(std::process::Stdio::inherit())
        .stderr(std::process::Stdio::inherit())
        .spawn().context("spawn aws cloudformation deploy")?;
    {
        use std::io::Write;
        let stdin = child.stdin.as_mut().context("template stdin closed")?;
        let s = serde_json::to_string_pretty(template_body)?;
        stdin.write_all(s.as_bytes())?;
    }
    let st = child.wait()?;
    if !st.success() { anyhow::bail!("cloudformation deploy failed") }
    Ok(())
}

pub fn delete_stack(stack_name: &str, region: Option<&str>) -> Result<()> {
    let aws = aws()?;
    let mut cmd = Command::new(aws);
    cmd.arg("cloudformation").arg("delete-stack")
        .arg("--stack-name").arg(stack_name);
    if let Some(r) = region { cmd.arg("--region").arg(r); }
    let st = cmd.status().context("aws cloudformation delete-stack")?;
    if !st.success() { anyhow::bail!("cloudformation delete-stack failed") }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use multistack_core::{synth, MultiStackProps, StackProps};

    fn template(encrypt_bucket: Option<bool>) -> Json {
        let stack = synth(&MultiStackProps {
            props: StackProps { name: "dev".into(), region: None, description: None },
            encrypt_bucket,
        }).unwrap();
        serde_json::to_value(template_for_stack(&stack)).unwrap()
    }

    #[test]
    fn bucket_deletes_on_teardown() {
        let tpl = template(None);
        let bucket = &tpl["Resources"]["MyGroovyBucket"];
        assert_eq!(bucket["Type"], "AWS::S3::Bucket");
        assert_eq!(bucket["DeletionPolicy"], "Delete");
        assert_eq!(bucket["UpdateReplacePolicy"], "Delete");
    }

    #[test]
    fn encrypted_bucket_gets_kms_sse_property() {
        let tpl = template(Some(true));
        let sse = &tpl["Resources"]["MyGroovyBucket"]["Properties"]["BucketEncryption"]
            ["ServerSideEncryptionConfiguration"][0]["ServerSideEncryptionByDefault"];
        assert_eq!(sse["SSEAlgorithm"], "aws:kms");
    }

    #[test]
    fn plain_bucket_has_no_properties() {
        let tpl = template(Some(false));
        assert!(tpl["Resources"]["MyGroovyBucket"].get("Properties").is_none());
        assert_eq!(tpl["Resources"].as_object().unwrap().len(), 1);
    }
}
