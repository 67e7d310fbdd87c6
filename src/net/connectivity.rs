//! Link-layer bring-up.
//!
//! # Responsibilities
//! - Join a WiFi network or open an access point before serving
//! - Bound both operations by the configured timeout
//!
//! # Design Decisions
//! - The radio is an external collaborator behind `Connectivity`
//! - A timeout is a hard failure; the caller decides to retry or halt

use std::future::Future;
use std::net::{IpAddr, Ipv4Addr, UdpSocket};
use std::time::Duration;

use thiserror::Error;

use crate::config::{NetworkConfig, NetworkMode};

/// Errors from the connectivity provider.
#[derive(Debug, Error)]
pub enum ConnectivityError {
    #[error("network '{ssid}' not reachable within {timeout:?}")]
    Timeout { ssid: String, timeout: Duration },

    #[error("network '{0}' not found")]
    SsidNotFound(String),

    #[error("connectivity failure: {0}")]
    Link(String),
}

/// A provider able to attach the device to a network.
pub trait Connectivity {
    /// Join an existing network, returning the address obtained.
    fn connect(
        &self,
        ssid: &str,
        password: &str,
    ) -> impl Future<Output = Result<IpAddr, ConnectivityError>> + Send;

    /// Open a hotspot, returning the device address on it.
    fn start_access_point(
        &self,
        ssid: &str,
        password: &str,
    ) -> impl Future<Output = Result<IpAddr, ConnectivityError>> + Send;
}

/// Bring the network up as configured.
///
/// Returns `None` when bring-up is disabled.
pub async fn bring_up<C>(provider: &C, config: &NetworkConfig) -> Result<Option<IpAddr>, ConnectivityError>
where
    C: Connectivity,
{
    let timeout = config.timeout();
    let attempt = match config.mode {
        NetworkMode::Disabled => {
            tracing::debug!("Network bring-up disabled");
            return Ok(None);
        }
        NetworkMode::Station => {
            tracing::info!(ssid = %config.ssid, "Connecting to WiFi");
            tokio::time::timeout(timeout, provider.connect(&config.ssid, &config.password)).await
        }
        NetworkMode::AccessPoint => {
            tracing::info!(ssid = %config.ssid, "Starting access point");
            tokio::time::timeout(timeout, provider.start_access_point(&config.ssid, &config.password))
                .await
        }
    };

    match attempt {
        Ok(Ok(address)) => {
            tracing::info!(address = %address, "Network up");
            Ok(Some(address))
        }
        Ok(Err(e)) => {
            tracing::error!(error = %e, "Network bring-up failed");
            Err(e)
        }
        Err(_) => {
            tracing::error!(ssid = %config.ssid, timeout = ?timeout, "Network bring-up timed out");
            Err(ConnectivityError::Timeout {
                ssid: config.ssid.clone(),
                timeout,
            })
        }
    }
}

/// Connectivity for a host that is already online.
///
/// Reports the address of the outbound interface, or loopback when offline.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostConnectivity;

impl HostConnectivity {
    fn local_address() -> IpAddr {
        UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))
            .and_then(|socket| {
                socket.connect((Ipv4Addr::new(192, 0, 2, 1), 9))?;
                socket.local_addr()
            })
            .map(|addr| addr.ip())
            .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
    }
}

impl Connectivity for HostConnectivity {
    async fn connect(&self, ssid: &str, _password: &str) -> Result<IpAddr, ConnectivityError> {
        tracing::info!(ssid = %ssid, "Host already connected, WiFi association skipped");
        Ok(Self::local_address())
    }

    async fn start_access_point(&self, ssid: &str, _password: &str) -> Result<IpAddr, ConnectivityError> {
        tracing::info!(ssid = %ssid, "Hotspot is only available on the device, using host address");
        Ok(Self::local_address())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NeverAssociates;

    impl Connectivity for NeverAssociates {
        async fn connect(&self, _ssid: &str, _password: &str) -> Result<IpAddr, ConnectivityError> {
            std::future::pending().await
        }

        async fn start_access_point(&self, ssid: &str, _password: &str) -> Result<IpAddr, ConnectivityError> {
            Err(ConnectivityError::SsidNotFound(ssid.to_string()))
        }
    }

    fn network(mode: NetworkMode) -> NetworkConfig {
        NetworkConfig {
            mode,
            ssid: "alvik".into(),
            password: "12345678".into(),
            timeout_secs: 1,
        }
    }

    #[tokio::test]
    async fn disabled_mode_does_nothing() {
        let result = bring_up(&NeverAssociates, &network(NetworkMode::Disabled)).await;
        assert!(matches!(result, Ok(None)));
    }

    #[tokio::test]
    async fn station_times_out() {
        let result = bring_up(&NeverAssociates, &network(NetworkMode::Station)).await;
        assert!(matches!(result, Err(ConnectivityError::Timeout { .. })));
    }

    #[tokio::test]
    async fn provider_errors_propagate() {
        let result = bring_up(&NeverAssociates, &network(NetworkMode::AccessPoint)).await;
        assert!(matches!(result, Err(ConnectivityError::SsidNotFound(s)) if s == "alvik"));
    }

    #[tokio::test]
    async fn host_reports_an_address() {
        let result = bring_up(&HostConnectivity, &network(NetworkMode::Station)).await;
        assert!(matches!(result, Ok(Some(_))));
    }
}
