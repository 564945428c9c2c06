use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};

use subnet_proxy::{
    Args, Config, RuntimeConfig, SubnetProxy, bind_listener, init_logging, load_and_log_config,
    shutdown_signal,
};

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.log_file.as_deref())?;

    let (config, _source) = load_and_log_config(&args)?;

    let rt = RuntimeConfig::from_threads(config.proxy.threads).build_runtime()?;
    rt.block_on(run_proxy(config))
}

async fn run_proxy(config: Config) -> Result<()> {
    let proxy = match SubnetProxy::new(&config) {
        Ok(proxy) => Arc::new(proxy),
        Err(e) => {
            error!("Failed to initialize egress pool: {:#}", e);
            return Err(e);
        }
    };

    let listener = bind_listener(&config.proxy).await?;

    proxy.serve(listener, shutdown_signal()).await?;
    info!("Shutdown complete");
    Ok(())
}
