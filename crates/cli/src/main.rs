use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Deserialize;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::fmt::format::FmtSpan;

use multistack_aws::AwsProvider;
use multistack_cfn as cfn;
use multistack_core::MultiStackProps;
use multistack_policy::Policy;
use multistack_tfcompat as tfc;

#[derive(Parser, Debug)]
#[command(author, version, about="multistack — bucket stack CLI (Terraform/OpenTofu/CloudFormation)")]
struct Cli {
    /// Stack config file (YAML)
    #[arg(short, long, global = true, default_value="stack.yml")]
    file: PathBuf,

    /// Output directory
    #[arg(short, long, default_value="out", global = true)]
    out: PathBuf,

    /// Runner
    #[arg(long, value_enum, default_value_t=Runner::Auto, global = true)]
    runner: Runner,

    /// Allow unencrypted buckets
    #[arg(long, default_value_t=false, global = true)]
    allow_unencrypted: bool,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, ValueEnum)]
enum Runner { Auto, Terraform, Tofu }

#[derive(Subcommand, Debug)] enum Cmd {
    /// Write main.tf.json without running anything
    Synth,
    Init,
    Plan,
    Apply,
    Destroy,
    CfnDeploy {
        #[arg(long)] stack: Option<String>,
        #[arg(short='f', long="file")] file: Option<PathBuf>,
    },
    CfnDelete {
        #[arg(long)] stack: Option<String>,
        #[arg(short='f', long="file")] file: Option<PathBuf>,
    }
}

#[derive(Deserialize)]
struct StackFile {
    #[serde(flatten)]
    stack: MultiStackProps,
    #[serde(default)]
    provider: Providers,
}

#[derive(Deserialize, Default)]
struct Providers {
    #[serde(default)]
    aws: Option<AwsProvider>,
}

impl Cmd {
    /// Teardown paths create nothing, so the encryption policy has no
    /// resource to protect there.
    fn provisions(&self) -> bool {
        !matches!(self, Cmd::Destroy | Cmd::CfnDelete { .. })
    }
}

impl StackFile {
    /// The provider block wins; a bare `region` under the stack props is the
    /// shorthand form.
    fn aws_provider(&self) -> Result<AwsProvider> {
        if let Some(p) = &self.provider.aws { return Ok(p.clone()); }
        let region = self.stack.props.region.clone()
            .context("no provider.aws block and no region in stack config")?;
        Ok(AwsProvider { region })
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt().json().with_span_events(FmtSpan::CLOSE).init();
    let cli = Cli::parse();
    let policy = Policy::new(cli.allow_unencrypted);

    let effective_file: PathBuf = match &cli.cmd {
        Cmd::CfnDeploy { file: Some(f), .. } => f.clone(),
        Cmd::CfnDelete { file: Some(f), .. } => f.clone(),
        _ => cli.file.clone(),
    };

    let raw = std::fs::read(&effective_file)
        .with_context(|| format!("read stack config {}", effective_file.display()))?;
    let cfg: StackFile = serde_yaml::from_slice(&raw)?;

    let stack = multistack_core::synth(&cfg.stack)?;
    info!(stack = %stack.name, resources = stack.declarations().len(), "synthesized stack");
    if cli.cmd.provisions() {
        policy.check_stack(&stack)?;
    }

    let r = match cli.runner {
        Runner::Terraform => Some(tfc::Runner::Terraform),
        Runner::Tofu      => Some(tfc::Runner::Tofu),
        Runner::Auto      => None
    };

    match cli.cmd {
      Cmd::Synth => {
          let tf = multistack_aws::stack_to_tf_json(&stack, &cfg.aws_provider()?);
          policy.check_tf_json(&tf)?;
          tfc::write_tf_json(&tf, &cli.out)?;
      },
      Cmd::Init => {
          let tf = multistack_aws::stack_to_tf_json(&stack, &cfg.aws_provider()?);
          policy.check_tf_json(&tf)?;
          tfc::write_tf_json(&tf, &cli.out)?;
          let runner = tfc::pick_runner(r)?;
          tfc::run_init(runner, &cli.out)?;
      },
      Cmd::Plan => {
          let tf = multistack_aws::stack_to_tf_json(&stack, &cfg.aws_provider()?);
          policy.check_tf_json(&tf)?;
          tfc::write_tf_json(&tf, &cli.out)?;
          let runner = tfc::pick_runner(r)?;
          tfc::run_init(runner, &cli.out)?;
          tfc::run_plan(runner, &cli.out)?;
      },
      Cmd::Apply => {
          let tf = multistack_aws::stack_to_tf_json(&stack, &cfg.aws_provider()?);
          policy.check_tf_json(&tf)?;
          tfc::write_tf_json(&tf, &cli.out)?;
          let runner = tfc::pick_runner(r)?;
          tfc::run_init(runner, &cli.out)?;
          tfc::run_apply(runner, &cli.out)?;
      },
      Cmd::Destroy => {
          let tf = multistack_aws::stack_to_tf_json(&stack, &cfg.aws_provider()?);
          tfc::write_tf_json(&tf, &cli.out)?;
          let runner = tfc::pick_runner(r)?;
          tfc::run_init(runner, &cli.out)?;
          tfc::run_destroy(runner, &cli.out)?;
      },
      Cmd::CfnDeploy { stack: stack_opt, .. } => {
          let stack_name = stack_opt.unwrap_or_else(|| stack.name.clone());
          let tpl = cfn::template_for_stack(&stack);
          let tpl_json = serde_json::to_value(tpl)?;
          let region = cfg.aws_provider().ok().map(|p| p.region);
          cfn::deploy_stack(&stack_name, &tpl_json, region.as_deref())?
      },
      Cmd::CfnDelete { stack: stack_opt, .. } => {
          let stack_name = stack_opt.unwrap_or_else(|| stack.name.clone());
          let region = cfg.aws_provider().ok().map(|p| p.region);
          cfn::delete_stack(&stack_name, region.as_deref())?
      },
    }
    Ok(())
}
