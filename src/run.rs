use anyhow::{Result, bail};
use log::{debug, info};

use telemetry_link::Link;

use crate::cli::RunOpts;

pub fn run(opts: RunOpts) -> Result<()> {
    let config = opts.to_config();
    debug!("run: {:?}", config);

    let mut link = Link::new(config);
    if !link.start() {
        bail!("producer link never came up ({})", link.status());
    }
    info!("producer link ended ({})", link.status());
    Ok(())
}
