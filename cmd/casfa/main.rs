mod cli;
mod initializers;

use casfa_rpc::{ApiContext, start_api};
use clap::Parser;
use tracing::info;

use crate::cli::CLI;
use crate::initializers::{
    init_store, init_tracing, parse_socket_addr, read_or_create_jwt_secret,
};

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let CLI { opts } = CLI::parse();
    init_tracing(&opts);

    let config = opts.core_config();
    let store = init_store(&opts)?;
    let jwt_secret = read_or_create_jwt_secret(&opts)?;
    let addr = parse_socket_addr(&opts.http_addr, &opts.http_port)?;

    info!(
        "casfa v{} starting (node limit {} bytes)",
        env!("CARGO_PKG_VERSION"),
        config.node_limit
    );
    let context = ApiContext::new(store, config, &jwt_secret);
    start_api(addr, context).await?;
    Ok(())
}
