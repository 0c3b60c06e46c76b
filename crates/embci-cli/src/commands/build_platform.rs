//! `buildPlatform`: run one build task outside the gate.

use std::path::PathBuf;

use anyhow::Result;
use async_trait::async_trait;
use clap::{ArgAction, ArgMatches, Args};
use embci_core::capability::{self, BuildParameter};
use embci_core::config::{GateConfig, GATE_CONF};
use embci_core::{AppContext, CiCommand};
use embci_gate::registry::{build_task_path, RUN_SYMBOL};
use tracing::info;

use super::{decode_base64, load_or_default, parse_args, split_list};

#[derive(Debug, Clone, Args)]
pub struct BuildPlatformArgs {
    /// Source tree to build
    #[arg(short = 'c', long = "build_code")]
    pub build_code: PathBuf,

    /// Build task: openeuler_image, openeuler_doc or oebuild_wheel
    #[arg(long = "target")]
    pub target: String,

    #[arg(short = 'a', long = "arch", default_value = "arch")]
    pub arch: String,

    #[arg(short = 't', long = "toolchain")]
    pub toolchain: Option<String>,

    #[arg(short = 'p', long = "platform")]
    pub platform: Option<String>,

    /// `;`-separated images
    #[arg(short = 'i', long = "images")]
    pub images: Option<String>,

    /// Base64-encoded image command; repeatable, wins over `--images`
    #[arg(long = "img_cmds", action = ArgAction::Append)]
    pub img_cmds: Vec<String>,

    /// `;`-separated features
    #[arg(short = 'f', long = "features")]
    pub features: Option<String>,

    #[arg(long = "datetime")]
    pub datetime: Option<String>,

    #[arg(short = 'd', long = "directory", default_value = "build")]
    pub directory: String,

    #[arg(long = "sstate_cache_in")]
    pub sstate_cache_in: Option<PathBuf>,

    #[arg(long = "sstate_cache_out")]
    pub sstate_cache_out: Option<PathBuf>,

    /// Parent of `oebuild_workspace`
    #[arg(short = 'w', long = "workspace", env = "HOME")]
    pub workspace: PathBuf,
}

impl BuildPlatformArgs {
    pub fn parameter(&self, ctx: &AppContext) -> Result<BuildParameter> {
        let images = if !self.img_cmds.is_empty() {
            self.img_cmds
                .iter()
                .map(|c| decode_base64(c))
                .collect::<Result<Vec<_>>>()?
        } else {
            self.images.as_deref().map(split_list).unwrap_or_default()
        };
        let gate: GateConfig = load_or_default(ctx, GATE_CONF)?;
        Ok(BuildParameter {
            workspace: self.workspace.clone(),
            build_code: self.build_code.clone(),
            conf_dir: ctx.paths.conf_dir.clone(),
            arch: self.arch.clone(),
            toolchain: self.toolchain.clone(),
            platform: self.platform.clone(),
            images,
            features: self.features.as_deref().map(split_list).unwrap_or_default(),
            directory: self.directory.clone(),
            datetime: self.datetime.clone(),
            sstate_cache_in: self.sstate_cache_in.clone(),
            sstate_cache_out: self.sstate_cache_out.clone(),
            docs_prefix: gate.docs_prefix,
            ..Default::default()
        })
    }
}

pub struct BuildPlatform;

#[async_trait]
impl CiCommand for BuildPlatform {
    fn name(&self) -> &'static str {
        "buildPlatform"
    }

    fn help(&self) -> &'static str {
        "Build Platform"
    }

    fn description(&self) -> &'static str {
        "Build Platform is used to build images, docs, sdks and hosttools"
    }

    fn declare_flags(&self, parser: clap::Command) -> clap::Command {
        BuildPlatformArgs::augment_args(parser)
    }

    async fn execute(&self, ctx: &AppContext, matches: &ArgMatches) -> Result<()> {
        let args: BuildPlatformArgs = parse_args(matches)?;
        anyhow::ensure!(
            args.build_code.is_dir(),
            "Code for build does not exist in {}",
            args.build_code.display()
        );
        let param = args.parameter(ctx)?;
        let task = ctx
            .extensions
            .load_build(&build_task_path(&args.target), RUN_SYMBOL)?;

        let res = capability::build(task.as_ref(), &param).await?;
        for (arch, board) in res.leaves() {
            info!(arch, board = %board.name, result = %board.result, "build result");
        }
        anyhow::ensure!(res.outcome().is_success(), "build {} failed", args.target);
        Ok(())
    }
}
