pub mod app;
pub mod cli;
pub mod commands;
pub mod config;
pub mod datastore;
pub mod filter;
pub mod kv;
pub mod render;
pub mod store;
pub mod summary;
pub mod task;
pub mod view;

use std::ffi::OsString;
use std::io;

use anyhow::Context;
use clap::Parser;
use tracing::{
  debug,
  info
};

#[tracing::instrument(skip_all)]
pub fn run(
  raw_args: Vec<OsString>
) -> anyhow::Result<()> {
  let pre =
    cli::preprocess_args(&raw_args)?;
  let cli = cli::GlobalCli::parse_from(
    pre.cleaned_args
  );

  cli::init_tracing(
    cli.verbose,
    cli.quiet
  )?;

  info!(
    verbose = cli.verbose,
    quiet = cli.quiet,
    "starting focusflow CLI"
  );
  debug!(?pre.rc_overrides, "preprocessed rc overrides");

  let mut cfg = config::Config::load(
    cli.focusflowrc.as_deref()
  )?;
  cfg.apply_overrides(
    pre.rc_overrides.into_iter().chain(
      cli
        .rc_overrides
        .into_iter()
        .map(|kv| (kv.key, kv.value))
    )
  );

  let data_dir =
    config::resolve_data_dir(
      &cfg,
      cli.data.as_deref()
    )
    .context(
      "failed to resolve data \
       directory"
    )?;

  let inv = cli::Invocation::parse(
    &cfg, cli.rest
  )?;

  let stdin = io::stdin().lock();
  let mut stdout = io::stdout().lock();
  commands::dispatch(
    &cfg,
    &data_dir,
    inv,
    stdin,
    &mut stdout
  )?;

  info!("done");
  Ok(())
}
