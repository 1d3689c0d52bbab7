use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "ccmd")]
#[command(about = "Render and check custom-command templates")]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub(crate) command: Mode,
}

#[derive(Debug, Subcommand)]
pub(crate) enum Mode {
    Render(RenderArgs),
    Check(CheckArgs),
}

#[derive(Debug, Args)]
pub(crate) struct RenderArgs {
    #[arg(long = "world")]
    pub(crate) world: String,
    #[arg(long = "template")]
    pub(crate) template: String,
    #[arg(long = "seed")]
    pub(crate) seed: Option<u32>,
    #[arg(long = "repeat", default_value_t = 1)]
    pub(crate) repeat: usize,
}

#[derive(Debug, Args)]
pub(crate) struct CheckArgs {
    #[arg(long = "templates-dir")]
    pub(crate) templates_dir: String,
}
