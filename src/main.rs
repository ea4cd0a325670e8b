use anyhow::Result;
use clap::Parser;

use visearch::cli::SubCommandExtend;
use visearch::config::{Opts, SubCommand};

fn main() -> Result<()> {
    env_logger::init();

    let opts = Opts::parse();
    match &opts.subcmd {
        SubCommand::ComputeDescriptors(cmd) => cmd.run(),
        SubCommand::ComputeVocabulary(cmd) => cmd.run(),
        SubCommand::ComputeHistvw(cmd) => cmd.run(),
        SubCommand::ComputeIndex(cmd) => cmd.run(),
        SubCommand::ImageSearch(cmd) => cmd.run(),
        SubCommand::ListGenerators(cmd) => cmd.run(),
    }
}
