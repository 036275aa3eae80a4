use std::fs;
use std::io::IsTerminal;
use std::net::SocketAddr;
use std::path::Path;

use casfa_storage::{EngineType, Store};
use eyre::WrapErr;
use rand::RngCore;
use tracing::info;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::{EnvFilter, fmt};

use crate::cli::{LogColor, Options};

pub fn init_tracing(opts: &Options) {
    let log_filter = EnvFilter::builder()
        .with_default_directive(Directive::from(opts.log_level))
        .from_env_lossy();

    let use_color = match opts.log_color {
        LogColor::Always => true,
        LogColor::Never => false,
        LogColor::Auto => std::io::stdout().is_terminal(),
    };

    fmt()
        .with_env_filter(log_filter)
        .with_ansi(use_color)
        .init();
}

pub fn init_store(opts: &Options) -> eyre::Result<Store> {
    let engine = if opts.is_memory_datadir() {
        EngineType::InMemory
    } else {
        fs::create_dir_all(&opts.datadir)
            .wrap_err("failed to create the data directory")?;
        EngineType::LocalFs
    };
    Store::new(&opts.datadir, engine).wrap_err("failed to open storage")
}

/// Reads the HS256 secret, creating one on first start.
pub fn read_or_create_jwt_secret(opts: &Options) -> eyre::Result<Vec<u8>> {
    let path = match &opts.jwt_secret_file {
        Some(path) => path.clone(),
        None if opts.is_memory_datadir() => {
            // Nothing durable to anchor the secret to; mint an ephemeral one.
            let mut secret = vec![0u8; 32];
            rand::thread_rng().fill_bytes(&mut secret);
            return Ok(secret);
        }
        None => opts.datadir.join("jwt.hex"),
    };
    read_or_create_secret_file(&path)
}

fn read_or_create_secret_file(path: &Path) -> eyre::Result<Vec<u8>> {
    match fs::read_to_string(path) {
        Ok(text) => hex::decode(text.trim())
            .wrap_err_with(|| format!("{} does not hold a hex secret", path.display())),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            let mut secret = vec![0u8; 32];
            rand::thread_rng().fill_bytes(&mut secret);
            if let Some(dir) = path.parent() {
                fs::create_dir_all(dir)?;
            }
            fs::write(path, hex::encode(&secret))?;
            info!("Generated JWT secret at {}", path.display());
            Ok(secret)
        }
        Err(err) => Err(err.into()),
    }
}

pub fn parse_socket_addr(addr: &str, port: &str) -> eyre::Result<SocketAddr> {
    format!("{addr}:{port}")
        .parse::<SocketAddr>()
        .wrap_err("bad listen address")
}
