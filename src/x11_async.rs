//! X11 readiness notifier
//!
//! A blocking mio poll on the connection's socket, run on tokio's blocking
//! pool, wakes the dispatcher whenever the server has sent something.

use std::os::unix::io::AsRawFd;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::{oneshot, Notify};
use x11rb::rust_connection::RustConnection;

const X11_TOKEN: mio::Token = mio::Token(0);

/// Readiness of the X11 socket
///
/// The polling task stops once this is dropped.
pub struct X11Readiness {
    notify: Arc<Notify>,
    _task_guard: oneshot::Receiver<()>,
}

impl X11Readiness {
    pub fn new(conn: Arc<RustConnection>) -> Result<Self> {
        let fd = conn.stream().as_raw_fd();
        let notify = Arc::new(Notify::new());
        let task_notify = notify.clone();

        let (guard, task_guard) = oneshot::channel::<()>();
        let mut poll = mio::Poll::new().context("Failed to create mio Poll")?;
        let mut events = mio::Events::with_capacity(1);

        poll.registry()
            .register(&mut mio::unix::SourceFd(&fd), X11_TOKEN, mio::Interest::READABLE)
            .context("Failed to register X11 socket with mio")?;

        // Wake up now and then to notice the guard closing
        let timeout = Duration::from_millis(100);
        tokio::task::spawn_blocking(move || {
            // Keeps the socket open for as long as it is polled
            let _conn = conn;
            loop {
                if guard.is_closed() {
                    tracing::debug!("X11 socket polling thread shutting down");
                    return;
                }

                if let Err(err) = poll.poll(&mut events, Some(timeout)) {
                    tracing::warn!("X11 socket poll failed: {:?}", err);
                    continue;
                }

                if events.iter().any(|event| event.token() == X11_TOKEN) {
                    task_notify.notify_one();
                }
            }
        });

        Ok(Self {
            notify,
            _task_guard: task_guard,
        })
    }

    /// Wait until the socket becomes readable
    pub async fn readable(&self) {
        self.notify.notified().await;
    }
}
