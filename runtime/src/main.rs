//! pnprobe - PROFINET discovery and connection probe
//!
//! Lists adapters, finds devices with DCP identify, assigns names and
//! addresses, and runs a simulated connection against one device.

use std::net::Ipv4Addr;
use std::sync::mpsc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use profinet_probe::ethernet::PacketSocketBackend;
use profinet_probe::{
    list_adapters, AdapterChannel, Config, ConnectionSession, DiscoveredDevice, DiscoveryEngine,
    ResolverChain, SessionEvent, SessionState,
};
use profinet_probe_lib::{format_mac, ETHERTYPE_PROFINET};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "pnprobe")]
#[command(version)]
#[command(about = "Discover and probe PROFINET devices")]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Verbose logging (debug level)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Do not put the adapter in promiscuous mode
    #[arg(long, global = true)]
    no_promiscuous: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List network adapters
    Adapters,
    /// Find devices with a DCP identify request
    Identify {
        /// Adapter id or description
        adapter: String,

        /// Only ask the station with this name
        #[arg(long)]
        name: Option<String>,

        /// Discovery window in milliseconds
        #[arg(short, long, default_value = "3000")]
        window: u64,
    },
    /// Assign IP address, subnet mask and gateway
    SetIp {
        adapter: String,
        target_mac: String,
        ip: Ipv4Addr,
        #[arg(default_value = "255.255.255.0")]
        subnet_mask: Ipv4Addr,
        #[arg(default_value = "0.0.0.0")]
        gateway: Ipv4Addr,

        /// Keep the setting only until the device power cycles
        #[arg(long)]
        temporary: bool,
    },
    /// Assign the name of station
    SetName {
        adapter: String,
        target_mac: String,
        name: String,

        /// Keep the setting only until the device power cycles
        #[arg(long)]
        temporary: bool,
    },
    /// Flash the indicator of a device
    Flash { adapter: String, target_mac: String },
    /// Run a simulated connection against one device
    Connect {
        adapter: String,

        /// Target MAC address, found by name with --station when omitted
        #[arg(long)]
        target_mac: Option<String>,

        /// Target IP address, taken from discovery when omitted
        #[arg(long)]
        target_ip: Option<Ipv4Addr>,

        /// Name of station of the target
        #[arg(long)]
        station: Option<String>,

        /// Source IP address of the connect request
        #[arg(long, default_value = "0.0.0.0")]
        source_ip: Ipv4Addr,

        /// Cyclic data interval in milliseconds
        #[arg(long, default_value = "10")]
        cycle: u64,

        /// How long to run, in seconds
        #[arg(short, long, default_value = "10")]
        duration: u64,
    },
}

fn main() {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Err(e) = run(args) {
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}

fn open(adapter: &str, config: &Config) -> Result<AdapterChannel> {
    let mut channel = AdapterChannel::open(
        adapter,
        &PacketSocketBackend,
        &ResolverChain::system(),
        &config.link,
    )?;

    if channel.is_degraded() {
        warn!(adapter, "no hardware address, devices may not answer");
    }
    channel.install_receive_filter(ETHERTYPE_PROFINET)?;

    Ok(channel)
}

fn print_devices(devices: &[DiscoveredDevice]) {
    if devices.is_empty() {
        println!("no devices found");
        return;
    }

    for device in devices {
        println!("{}", device);
    }
}

fn run(args: Args) -> Result<()> {
    let mut config = Config::default();
    config.link.promiscuous = !args.no_promiscuous;

    match args.command {
        Command::Adapters => {
            for adapter in list_adapters(&PacketSocketBackend)? {
                println!("{:<16} {}", adapter.id, adapter.description);
            }
        }
        Command::Identify {
            adapter,
            name,
            window,
        } => {
            config.discovery.window = Duration::from_millis(window);
            config.validate()?;

            let mut channel = open(&adapter, &config)?;
            let engine = DiscoveryEngine::new(config.discovery.clone());
            let window = config.discovery.window;

            let devices = match name {
                Some(name) => engine.identify_by_name(&mut channel, window, &name)?,
                None => engine.identify(&mut channel, window)?,
            };
            print_devices(&devices);
        }
        Command::SetIp {
            adapter,
            target_mac,
            ip,
            subnet_mask,
            gateway,
            temporary,
        } => {
            config.discovery.permanent = !temporary;
            let mut channel = open(&adapter, &config)?;
            let engine = DiscoveryEngine::new(config.discovery.clone());

            let pending = engine.set_ip(&mut channel, &target_mac, ip, subnet_mask, gateway)?;
            println!("set ip request sent (xid {:#010x}), not confirmed", pending.xid);
        }
        Command::SetName {
            adapter,
            target_mac,
            name,
            temporary,
        } => {
            config.discovery.permanent = !temporary;
            let mut channel = open(&adapter, &config)?;
            let engine = DiscoveryEngine::new(config.discovery.clone());

            let pending = engine.set_name(&mut channel, &target_mac, &name)?;
            println!("set name request sent (xid {:#010x}), not confirmed", pending.xid);
        }
        Command::Flash {
            adapter,
            target_mac,
        } => {
            let mut channel = open(&adapter, &config)?;
            let engine = DiscoveryEngine::new(config.discovery.clone());

            let pending = engine.flash_indicator(&mut channel, &target_mac)?;
            println!("flash request sent (xid {:#010x})", pending.xid);
        }
        Command::Connect {
            adapter,
            target_mac,
            target_ip,
            station,
            source_ip,
            cycle,
            duration,
        } => {
            config.session.source_ip = source_ip;
            config.session.cycle_interval = Duration::from_millis(cycle);
            config.validate()?;

            let (target_mac, target_ip, station) =
                resolve_target(&adapter, &config, target_mac, target_ip, station)?;

            let channel = open(&adapter, &config)?;
            let (tx, rx) = mpsc::channel();

            let mut session = ConnectionSession::new(config.session.clone());
            session.subscribe(tx);
            session.start(channel, &target_mac, target_ip, &station)?;

            let state = session.run_until(Instant::now() + Duration::from_secs(duration));

            for event in rx.try_iter() {
                if let SessionEvent::Log(message) = event {
                    println!("{}", message);
                }
            }

            let error = session.last_error().map(str::to_owned);
            let cycles = session.cycles_sent();
            session.stop();

            if state == SessionState::Error {
                bail!(error.unwrap_or_else(|| "session failed".to_owned()));
            }
            info!(cycles, "connection probe finished");
        }
    }

    Ok(())
}

/// Fills in whatever the command line left out with an identify-by-name pass.
fn resolve_target(
    adapter: &str,
    config: &Config,
    target_mac: Option<String>,
    target_ip: Option<Ipv4Addr>,
    station: Option<String>,
) -> Result<(String, Ipv4Addr, String)> {
    if let (Some(mac), Some(ip)) = (&target_mac, target_ip) {
        return Ok((mac.clone(), ip, station.unwrap_or_default()));
    }

    let Some(station) = station else {
        bail!("either --target-mac and --target-ip or --station is required");
    };

    let mut channel = open(adapter, config)?;
    let engine = DiscoveryEngine::new(config.discovery.clone());
    let devices = engine
        .identify_by_name(&mut channel, config.discovery.window, &station)
        .context("identify by name failed")?;
    channel.close();

    let Some(device) = devices.into_iter().next() else {
        bail!("station {} did not answer", station);
    };
    info!(station = %station, mac = %format_mac(&device.mac_address), ip = %device.ip_address, "station found");

    let mac = target_mac.unwrap_or_else(|| format_mac(&device.mac_address));
    let ip = target_ip.unwrap_or(device.ip_address);
    Ok((mac, ip, station))
}
