#![doc = include_str!("../README.md")]

/*
 * RTK-RELAY: GNSS base to rover correction relay over packet radio.
 * Authors: Carrasco, Hess et al.
 * This program is shipped under Mozilla Public V2 license.
 */

mod audit;
mod base;
mod cli;
mod clock;
mod device;
mod error;
mod fix;
mod link;
mod nmea;
mod publish;
mod rover;
mod rtcm;
mod rtk;
mod runtime;
mod settings;
mod utils;

use std::path::Path;

use env_logger::{Builder, Target};
use hifitime::prelude::Duration;
use log::{error, info};
use tokio::{signal, sync::watch};

use crate::{
    audit::AuditLog,
    base::Base,
    cli::{Cli, Receiver, Role},
    clock::{Clock, SystemClock},
    device::Device,
    error::{Error, Result},
    link::{depacketizer::Depacketizer, packetizer::Packetizer, udp::UdpTransport},
    publish::HttpSink,
    rover::Rover,
    rtk::{Worker, engine::RtkLib},
    settings::{LogKind, Sink, create_log},
};

/// Link receive timeout, bounds the rover loop latency
const LINK_TIMEOUT: std::time::Duration = std::time::Duration::from_millis(5);

/// Rover status report period (s)
const STATUS_PERIOD_S: f64 = 30.0;

fn open_device(receiver: &Receiver) -> Result<Device> {
    match receiver {
        Receiver::Port(port, baud) => Device::open_serial_port(port, *baud),
        Receiver::Files(files) => {
            let paths = files.iter().map(|p| p.as_path()).collect::<Vec<&Path>>();
            Device::open_files(&paths)
        },
    }
}

fn open_link(cli: &Cli) -> Result<UdpTransport> {
    Ok(UdpTransport::open(cli.bind(), cli.peer(), LINK_TIMEOUT)?)
}

async fn deploy_base(cli: &Cli, shutdown: watch::Receiver<bool>) -> Result<()> {
    let t0 = SystemClock.now();
    let logs = cli.log_settings();

    let device = open_device(&cli.receiver())?;
    let transport = open_link(cli)?;

    let audit_path = logs.filename(LogKind::BaseAudit, t0);
    let raw_path = logs.filename(LogKind::BaseRaw, t0);

    let raw_log = create_log(&raw_path)?;
    let audit = AuditLog::create(&audit_path, false)?;

    info!("{} - raw log: {}", t0, raw_path.display());
    info!("{} - link journal: {}", t0, audit_path.display());

    let packetizer = Packetizer::new(transport, audit, &cli.link_settings());
    let base = Base::new(packetizer, raw_log);

    tokio::task::spawn_blocking(move || base::run(device, base, SystemClock, shutdown))
        .await
        .unwrap_or_else(|e| error!("base loop: {}", e));

    Ok(())
}

async fn deploy_rover(cli: &Cli, shutdown: watch::Receiver<bool>) -> Result<()> {
    let t0 = SystemClock.now();
    let logs = cli.log_settings();

    let device = open_device(&cli.receiver())?;
    let receiver = device.writer()?;
    let transport = open_link(cli)?;

    let raw_path = logs.filename(LogKind::RoverRaw, t0);
    let corr_path = logs.filename(LogKind::RoverCorrections, t0);
    let audit_path = logs.filename(LogKind::RoverAudit, t0);

    let raw_log = create_log(&raw_path)?;
    let corr_log = create_log(&corr_path)?;
    let audit = AuditLog::create(&audit_path, true)?;

    info!("{} - raw log: {}", t0, raw_path.display());
    info!("{} - correction log: {}", t0, corr_path.display());
    info!("{} - link journal: {}", t0, audit_path.display());

    let worker = match cli.rtk_settings() {
        Some(settings) => {
            let settings = settings.resolve();
            let (host, port) = cli.publish_endpoint();
            let sink = HttpSink::new(&host, port)?;

            info!("{} - publishing to {}", t0, sink.url());

            let worker = Worker::new(
                RtkLib::new(&settings),
                sink,
                SystemClock,
                settings,
                &raw_path,
                &corr_path,
            );

            Some(tokio::spawn(worker.run(shutdown.clone())))
        },
        None => {
            info!("{} - rtk disabled", t0);
            None
        },
    };

    let depacketizer = Depacketizer::new(Box::new(receiver) as Sink, corr_log, audit);

    let rover = Rover::new(
        transport,
        depacketizer,
        raw_log,
        t0,
        Duration::from_seconds(STATUS_PERIOD_S),
    );

    tokio::task::spawn_blocking(move || rover::run(device, rover, SystemClock, shutdown))
        .await
        .unwrap_or_else(|e| error!("rover loop: {}", e));

    if let Some(worker) = worker {
        worker
            .await
            .unwrap_or_else(|e| error!("rtk worker: {}", e));
    }

    Ok(())
}

#[tokio::main]
pub async fn main() {
    let mut builder = Builder::from_default_env();

    builder
        .target(Target::Stdout)
        .format_timestamp_secs()
        .format_module_path(false)
        .init();

    // cli
    let cli = Cli::new();

    // shutdown channel
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                info!("shutting down..");
                let _ = shutdown_tx.send(true);
            },
            Err(e) => {
                // no graceful shutdown, keep running
                error!("signal handling error: {}", e);
                std::future::pending::<()>().await;
            },
        }
    });

    let deployed = match cli.role() {
        Role::Base => deploy_base(&cli, shutdown_rx).await,
        Role::Rover => deploy_rover(&cli, shutdown_rx).await,
    };

    if let Err(e) = deployed {
        error!("{}", e);

        if matches!(e, Error::ReceiverOpen { .. }) {
            error!("check the receiver connection (port, baud rate) and permissions");
        }

        std::process::exit(1);
    }
}
