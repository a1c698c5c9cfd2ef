//! Reads one value from a slave behind an RS-485/Ethernet bridge.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Args as ClapArgs, Parser, Subcommand};
use rs485eth_modbus::config::{ConnectionConfig, LoggingConfig, RetrySettings};
use rs485eth_modbus::transport::DEFAULT_BUFFER_SIZE;
use rs485eth_modbus::{ByteOrder, Instrument, InstrumentError, NumericValue, Rs485EthConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "rs485eth-read")]
#[command(about = "Read input registers through an RS-485 to Ethernet bridge")]
#[command(version)]
struct Args {
    /// Path to configuration file (JSON5 format)
    #[arg(short, long, conflicts_with = "host")]
    config: Option<PathBuf>,

    #[command(flatten)]
    conn: ConnectionArgs,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long)]
    log_level: Option<String>,

    /// Attempts before giving up (overrides the config file)
    #[arg(long)]
    retries: Option<u32>,

    #[command(subcommand)]
    command: Command,
}

#[derive(ClapArgs, Debug)]
struct ConnectionArgs {
    #[arg(long)]
    host: Option<String>,
    #[arg(long, default_value_t = 502)]
    port: u16,
    #[arg(long, default_value_t = 1)]
    slave: u8,
    #[arg(long, default_value_t = 1000)]
    timeout_ms: u64,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Read one 16-bit register
    Register {
        address: u16,
        #[arg(long, default_value_t = 0)]
        decimals: u8,
        #[arg(long)]
        signed: bool,
    },
    /// Read a 32-bit value spanning two registers
    Long {
        address: u16,
        #[arg(long)]
        signed: bool,
        /// big, little, big-swap or little-swap
        #[arg(long, default_value = "big")]
        byte_order: ByteOrder,
        #[arg(long, default_value_t = 0)]
        decimals: u8,
    },
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .try_init();
}

fn load(args: &Args) -> Result<Rs485EthConfig> {
    let mut config = match &args.config {
        Some(path) => Rs485EthConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config from {:?}", path))?,
        None => {
            let Some(host) = &args.conn.host else {
                bail!("either --config or --host is required");
            };
            Rs485EthConfig {
                connection: ConnectionConfig {
                    host: host.clone(),
                    port: args.conn.port,
                },
                slave_address: args.conn.slave,
                timeout_ms: args.conn.timeout_ms,
                buffer_size: DEFAULT_BUFFER_SIZE,
                retry: RetrySettings::default(),
                logging: LoggingConfig::default(),
            }
        }
    };

    if let Some(attempts) = args.retries {
        config.retry.attempts = attempts;
    }
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn read(instrument: &Instrument, command: &Command) -> Result<NumericValue, InstrumentError> {
    match *command {
        Command::Register {
            address,
            decimals,
            signed,
        } => instrument.read_register(address, decimals, signed),
        Command::Long {
            address,
            signed,
            byte_order,
            decimals,
        } => instrument.read_long(address, signed, byte_order, decimals),
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = load(&args)?;

    init_tracing(args.log_level.as_deref().unwrap_or(&config.logging.level));

    let policy = config.retry.policy();

    let instrument = config.instrument();
    info!(
        endpoint = %instrument.transport().endpoint(),
        slave = instrument.slave_address(),
        "reading"
    );

    let value = policy
        .run(|_| read(&instrument, &args.command))
        .context("Read failed")?;
    println!("{}", value);

    instrument.shutdown();
    Ok(())
}
