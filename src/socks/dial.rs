//! SOCKS client leg of the relay
//!
//! Opens the outbound connection as a SOCKS CONNECT through the configured
//! proxy. Destinations are resolved by the relay first for SOCKS4 and
//! SOCKS5, and handed to the proxy as host names for SOCKS4a and SOCKS5h.

use super::descriptor::ProxyDescriptor;
use crate::transport::{connect_tcp, dns, Destination, Dialer, SocketOpts, StreamDyn};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::borrow::Cow;
use std::net::SocketAddr;
use std::time::Duration;
use tokio_socks::tcp::{Socks4Stream, Socks5Stream};
use tokio_socks::TargetAddr;
use tracing::debug;

/// Dialer chaining every connection through a SOCKS proxy
#[derive(Debug, Clone)]
pub struct SocksDialer {
    descriptor: ProxyDescriptor,
    /// Socket options for the connection to the proxy
    socket_opts: SocketOpts,
    /// Timeout for reaching the proxy itself
    connect_timeout: Duration,
}

impl SocksDialer {
    /// Create a dialer for `descriptor`
    pub fn new(descriptor: ProxyDescriptor) -> Self {
        SocksDialer {
            descriptor,
            socket_opts: SocketOpts::for_destination(),
            connect_timeout: Duration::from_secs(crate::helper::DEFAULT_CONNECT_TIMEOUT_SECS),
        }
    }

    /// Set the timeout for reaching the proxy
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// The proxy this dialer goes through
    pub fn descriptor(&self) -> &ProxyDescriptor {
        &self.descriptor
    }

    /// Destination as handed to the proxy
    async fn target<'a>(&self, dest: &'a Destination) -> Result<TargetAddr<'a>> {
        if self.descriptor.version().is_v4() && self.descriptor.resolve_locally() {
            let ip = dns::lookup_v4(&dest.host).await?;
            Ok(TargetAddr::Ip(SocketAddr::new(ip.into(), dest.port)))
        } else if self.descriptor.resolve_locally() {
            let ip = dns::lookup(&dest.host).await?;
            Ok(TargetAddr::Ip(SocketAddr::new(ip, dest.port)))
        } else {
            Ok(TargetAddr::Domain(Cow::Borrowed(dest.host.as_str()), dest.port))
        }
    }
}

#[async_trait]
impl Dialer for SocksDialer {
    async fn dial(&self, dest: &Destination) -> Result<Box<dyn StreamDyn>> {
        let target = self
            .target(dest)
            .await
            .with_context(|| format!("Failed to resolve destination {}", dest))?;

        let proxy = connect_tcp(
            self.descriptor.host(),
            self.descriptor.port(),
            self.connect_timeout,
            &self.socket_opts,
        )
        .await
        .with_context(|| format!("Failed to reach SOCKS proxy {}", self.descriptor))?;

        let credentials = self.descriptor.credentials();

        let stream: Box<dyn StreamDyn> = if self.descriptor.version().is_v4() {
            let stream = match credentials {
                Some(c) => Socks4Stream::connect_with_userid_and_socket(proxy, target, c.user_id()).await,
                None => Socks4Stream::connect_with_socket(proxy, target).await,
            }
            .with_context(|| format!("SOCKS4 CONNECT to {} via {} failed", dest, self.descriptor))?;
            Box::new(stream)
        } else {
            let stream = match credentials.filter(|c| !c.password().is_empty()) {
                Some(c) => {
                    Socks5Stream::connect_with_password_and_socket(proxy, target, c.user_id(), c.password())
                        .await
                }
                None => Socks5Stream::connect_with_socket(proxy, target).await,
            }
            .with_context(|| format!("SOCKS5 CONNECT to {} via {} failed", dest, self.descriptor))?;
            Box::new(stream)
        };

        debug!("SOCKS tunnel established to {} via {}", dest, self.descriptor);

        Ok(stream)
    }
}
