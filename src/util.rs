use std::net::{IpAddr, UdpSocket};

use tracing::level_filters::LevelFilter;
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the stderr log subscriber for a binary.
///
/// `binary` is the binary's own target (e.g. `tally_agent`); library and
/// binary events are shown at `level`, everything else is silenced.
pub fn init_tracing(binary: &str, level: LevelFilter) {
    let filter = filter::Targets::new()
        .with_target("tally", level)
        .with_target(binary.to_string(), level);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

/// Address of the interface used to reach `target` (`host:port`).
///
/// Connecting a UDP socket sends nothing; it only asks the OS for a route.
pub fn local_ip_towards(target: &str) -> Option<IpAddr> {
    let target = target
        .trim_start_matches("http://")
        .trim_start_matches("https://")
        .trim_end_matches('/');

    let socket = UdpSocket::bind(("0.0.0.0", 0)).ok()?;
    socket.connect(target).ok()?;
    socket.local_addr().ok().map(|addr| addr.ip())
}

/// Resolves on Ctrl-C, or SIGTERM on unix.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl-C"),
        _ = terminate => tracing::info!("received SIGTERM"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loopback_route() {
        let ip = local_ip_towards("127.0.0.1:8080").unwrap();
        assert!(ip.is_loopback());

        let ip = local_ip_towards("http://127.0.0.1:8080/").unwrap();
        assert!(ip.is_loopback());
    }

    #[test]
    fn test_unresolvable_target() {
        assert_eq!(local_ip_towards("no-port"), None);
    }
}
