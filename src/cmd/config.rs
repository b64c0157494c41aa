//! Prints the configuration after defaults, file and environment are merged.

use crate::{Result, config::Config};

pub fn execute(cfg: &Config) -> Result<()> {
   print!("{}", render(cfg)?);
   Ok(())
}

fn render(cfg: &Config) -> Result<String> {
   Ok(toml::to_string_pretty(cfg)?)
}
