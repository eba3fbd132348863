//! # Groundhub
//!
//! Ground-control hub daemon. Connects to the vehicle over MAVLink, to the interop judging
//! server over HTTP, and serves observers over WebSocket and UDP.
//!
//! ```shell
//! groundhub --mavlink tcp:127.0.0.1:5760 --router udp:0.0.0.0:14551 \
//!     --interop-url http://10.10.130.2:8000 --mission-id 1 --debug
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio_util::sync::CancellationToken;

use groundhub::bus::Hub;
use groundhub::conf::HubConf;
use groundhub::consts::{
    DEFAULT_DECODE_ERROR_THRESHOLD, DEFAULT_OBSTACLE_POLL_RATE, DEFAULT_RECONNECT_INTERVAL,
    DEFAULT_REPORT_PERIOD,
};
use groundhub::interop::{InteropClient, InteropConf, InteropPoller};
use groundhub::mavlink::{ConnectionManager, ManagerConf, PipelineConf, TransportDescriptor};
use groundhub::mission::MissionReporter;
use groundhub::status::{StatusBroadcaster, TcpSitlProbe};
use groundhub::transport::UdpListener;

/// Ground-control hub for an unmanned aircraft.
#[derive(Debug, Parser)]
#[command(name = "groundhub", version)]
#[command(about = "Ground-control hub bridging MAVLink, the interop server and observers")]
struct Args {
    /// WebSocket listen address
    #[arg(long, default_value = "0.0.0.0:8001")]
    hub_addr: SocketAddr,

    /// UDP envelope listen address
    #[arg(long)]
    udp_addr: Option<SocketAddr>,

    /// Interop server base URL
    #[arg(long, default_value = "http://127.0.0.1:8000")]
    interop_url: String,

    /// Interop server login
    #[arg(long, default_value = "testuser")]
    interop_username: String,

    /// Interop server password
    #[arg(long, default_value = "testpass")]
    interop_password: String,

    /// Mission tracked by the distance reporter
    #[arg(long, default_value_t = 1)]
    mission_id: i64,

    /// Vehicle link: serial:<path>[:<baud>], udp:<host>:<port> or tcp:<host>:<port>
    #[arg(long, default_value = "tcp:127.0.0.1:5760")]
    mavlink: TransportDescriptor,

    /// Router target receiving every vehicle frame (repeatable)
    #[arg(long = "router")]
    routers: Vec<TransportDescriptor>,

    /// Antenna tracker address
    #[arg(long)]
    tracker: Option<SocketAddr>,

    /// Simulator TCP address probed for the hub status
    #[arg(long)]
    sitl: Option<SocketAddr>,

    /// Seconds between MAVLink reconnection attempts
    #[arg(long, value_parser = parse_secs, default_value_t = DEFAULT_RECONNECT_INTERVAL.as_secs_f64())]
    reconnect_interval: f64,

    /// Consecutive invalid frames tolerated before links are rebuilt
    #[arg(long, default_value_t = DEFAULT_DECODE_ERROR_THRESHOLD)]
    decode_error_threshold: usize,

    /// Obstacle polling rate, requests per second
    #[arg(long, default_value_t = DEFAULT_OBSTACLE_POLL_RATE)]
    poll_rate: f64,

    /// Seconds between mission status snapshots
    #[arg(long, value_parser = parse_secs, default_value_t = DEFAULT_REPORT_PERIOD.as_secs_f64())]
    report_period: f64,

    /// Verbose logging
    #[arg(long)]
    debug: bool,
}

fn parse_secs(value: &str) -> Result<f64, String> {
    let secs: f64 = value.parse().map_err(|err| format!("{err}"))?;
    if secs.is_finite() && secs > 0.0 {
        Ok(secs)
    } else {
        Err(format!("`{value}` is not a positive number of seconds"))
    }
}

fn init_logger(debug: bool) {
    let level = if debug {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    env_logger::builder()
        // Suppress everything below `warn` for third-party modules
        .filter_level(log::LevelFilter::Warn)
        // Allow everything above `level` from current package
        .filter_module(env!("CARGO_PKG_NAME"), level)
        .parse_default_env()
        .init();
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logger(args.debug);

    if let Err(err) = run(args).await {
        log::error!("[groundhub] {err}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> groundhub::errors::Result<()> {
    let conf = HubConf::default()
        .reconnect_interval(Duration::from_secs_f64(args.reconnect_interval))
        .decode_error_threshold(args.decode_error_threshold)
        .report_period(Duration::from_secs_f64(args.report_period))
        .poll_rate(args.poll_rate);
    log::debug!("[groundhub] {conf:?}");

    let hub = Hub::builder().conf(conf.topic).default_topics().build()?;
    let cancel = CancellationToken::new();

    // Fatal bind errors first, before anything starts talking to the outside world.
    #[cfg(feature = "websocket")]
    let ws_listener = tokio::net::TcpListener::bind(args.hub_addr).await?;
    #[cfg(not(feature = "websocket"))]
    log::warn!(
        "[groundhub] built without WebSocket support, {} is not served",
        args.hub_addr
    );
    let udp = match args.udp_addr {
        Some(addr) => Some(UdpListener::bind(addr, hub.clone()).await?),
        None => None,
    };

    let interop = Arc::new(InteropClient::new(InteropConf::new(
        args.interop_url,
        args.interop_username,
        args.interop_password,
    )));
    let poller = InteropPoller::new(interop.clone(), hub.clone()).with_rate(conf.poll_rate);
    hub.register_endpoint(poller.endpoint());
    let forwarder = poller.forwarder();
    let poller_task = poller.spawn(cancel.clone());

    let reporter = Arc::new(
        MissionReporter::new(interop, hub.clone(), args.mission_id)
            .with_period(conf.report_period)
            .with_forwarder(forwarder),
    );
    let reporter_task = tokio::spawn(reporter.clone().run(cancel.clone()));
    tokio::spawn(start_reporter(
        reporter,
        conf.reconnect_interval,
        cancel.clone(),
    ));

    let (manager, manager_handle) = ConnectionManager::new(
        ManagerConf::new(args.mavlink)
            .routers(args.routers)
            .reconnect_interval(conf.reconnect_interval)
            .decode_error_threshold(conf.decode_error_threshold),
        hub.clone(),
    );
    let manager_task = manager
        .with_default_pipeline(PipelineConf {
            tracker: args.tracker,
            writer: None,
            mission_protocol: Some((conf.mission_timeout, conf.mission_retries)),
        })
        .spawn();

    let mut status = StatusBroadcaster::new(hub.clone())
        .period(conf.status_period)
        .vehicle(manager_handle.clone());
    if let Some(addr) = args.sitl {
        status = status.sitl(Arc::new(TcpSitlProbe::new(addr)));
    }
    let status_task = status.spawn(cancel.clone());

    let udp_task = udp.map(|udp| udp.spawn(cancel.clone()));

    #[cfg(feature = "websocket")]
    let ws_task = {
        let adapter = groundhub::transport::WebSocketAdapter::new(hub.clone(), cancel.clone());
        tokio::spawn(adapter.serve(ws_listener))
    };

    tokio::signal::ctrl_c().await?;
    log::info!("[groundhub] shutting down");

    cancel.cancel();
    manager_handle.shutdown();

    let _ = manager_task.await;
    let _ = poller_task.await;
    let _ = status_task.await;
    if let Some(task) = udp_task {
        let _ = task.await;
    }
    match reporter_task.await {
        Ok(Err(err)) => log::warn!("[groundhub] reporter failed: {err}"),
        Ok(Ok(())) | Err(_) => {}
    }
    #[cfg(feature = "websocket")]
    match ws_task.await {
        Ok(Err(err)) => log::warn!("[groundhub] WebSocket server failed: {err}"),
        Ok(Ok(())) | Err(_) => {}
    }

    hub.close_endpoints();
    Ok(())
}

/// Retries fetching the mission until it succeeds or the hub stops.
async fn start_reporter(
    reporter: Arc<MissionReporter>,
    interval: Duration,
    cancel: CancellationToken,
) {
    loop {
        match reporter.start().await {
            Ok(_) => return,
            Err(err) => log::warn!("[reporter] can't start: {err}"),
        }

        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(interval) => {}
        }
    }
}
