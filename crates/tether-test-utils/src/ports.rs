//! Address and polling helpers.

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::time::Instant;

/// Poll interval used by [`wait_until`].
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// A loopback address with nothing listening on it.
///
/// Binds an ephemeral port and releases it straight away, so connecting to the
/// returned address is refused.
pub fn refused_addr() -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
    listener.local_addr().expect("local addr")
}

/// Poll `condition` until it holds or `timeout` passes. Returns the last result.
pub async fn wait_until<F, Fut>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = Instant::now() + timeout;
    loop {
        if condition().await {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}
