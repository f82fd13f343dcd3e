use anyhow::{Context, Result};
use serde_json::Value as Json;
use std::path::Path;
use std::process::Command;

#[derive(Debug, Clone, Copy)]
pub enum Runner { Terraform, Tofu }

pub fn pick_runner(prefer: Option<Runner>) -> Result<Runner> {
    if let Some(p) = prefer { return Ok(p); }
    if which::which("tofu").is_ok() { Ok(Runner::Tofu) }
    else if which::which("terraform").is_ok() { Ok(Runner::Terraform) }
    else { anyhow::bail!("Neither 'tofu' nor 'terraform' found in PATH") }
}

pub fn write_tf_json(tf: &Json, out: &Path) -> Result<()> {
    std::fs::create_dir_all(out)
        .with_context(|| format!("create output dir {}", out.display()))?;
    std::fs::write(out.join("main.tf.json"), serde_json::to_string_pretty(tf)?)?;
    Ok(())
}

fn bin(r: Runner) -> &'static str {
    match r { Runner::Terraform => "terraform", Runner::Tofu => "tofu" }
}

/// Terraform and OpenTofu only accept `-chdir=DIR` as a single argv token;
/// a split `-chdir DIR` is rejected as too many arguments.
fn runner_args(out: &Path, args: &[&str]) -> Result<Vec<String>> {
    let dir = out.to_str().context("output dir is not valid UTF-8")?;
    let mut argv = vec![format!("-chdir={dir}")];
    argv.extend(args.iter().map(|a| a.to_string()));
    Ok(argv)
}

fn run(r: Runner, out: &Path, args: &[&str]) -> Result<()> {
    let st = Command::new(bin(r))
        .args(runner_args(out, args)?)
        .status()
        .with_context(|| format!("spawn {} {}", bin(r), args.join(" ")))?;
    if !st.success() { anyhow::bail!("{} {} failed", bin(r), args.join(" ")) }
    Ok(())
}

pub fn run_init(r: Runner, out: &Path) -> Result<()> { run(r, out, &["init"]) }
pub fn run_plan(r: Runner, out: &Path) -> Result<()> { run(r, out, &["plan"]) }
pub fn run_apply(r: Runner, out: &Path) -> Result<()> {
    run(r, out, &["apply", "-auto-approve"])
}
pub fn run_destroy(r: Runner, out: &Path) -> Result<()> {
    run(r, out, &["destroy", "-auto-approve"])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn chdir_flag_is_a_single_token() {
        let argv = runner_args(&PathBuf::from("out"), &["init"]).unwrap();
        assert_eq!(argv, vec!["-chdir=out".to_string(), "init".to_string()]);
    }

    #[test]
    fn subcommand_flags_follow_the_chdir_token() {
        let argv = runner_args(&PathBuf::from("work/env"), &["apply", "-auto-approve"]).unwrap();
        assert_eq!(argv[0], "-chdir=work/env");
        assert_eq!(&argv[1..], ["apply", "-auto-approve"]);
    }
}
