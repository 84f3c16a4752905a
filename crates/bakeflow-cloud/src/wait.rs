//! Readiness pollers
//!
//! Every asynchronous boundary in a build is gated by one of these waits:
//! image availability, Windows password generation, and remote-login
//! reachability. Instance existence and running-state waits delegate to the
//! provider's own primitives. All waits share a fixed 15-second cadence and
//! show a background spinner that is purely cosmetic.

use crate::error::{CloudError, Result};
use crate::provider::ComputeProvider;
use async_trait::async_trait;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};

pub const POLL_INTERVAL: Duration = Duration::from_secs(15);
const CONNECT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(1);

/// Background progress ticker shown while the caller blocks on a wait.
///
/// The tick runs on indicatif's own thread; dropping the guard stops it on
/// any exit path, and `finish` prints the completion acknowledgment.
pub struct Spinner {
    bar: ProgressBar,
    message: String,
}

impl Spinner {
    pub fn start(waitable: &str, state: &str) -> Self {
        let message = format!("Waiting for {waitable} {state} ...");
        let bar = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{msg} {spinner}") {
            bar.set_style(style);
        }
        bar.set_message(message.clone());
        bar.enable_steady_tick(Duration::from_millis(500));
        Self { bar, message }
    }

    pub fn finish(self) {
        self.bar.finish_with_message(format!("{} ok", self.message));
    }

    /// Stop the ticker on a failed wait, leaving a terminal message
    pub fn abandon(self) {
        self.bar.abandon_with_message(format!("{} failed", self.message));
    }
}

/// Block until the image state is `available`; intentionally unbounded,
/// image bakes can take a long time
pub async fn wait_for_image(provider: &dyn ComputeProvider, image_id: &str) -> Result<()> {
    let spinner = Spinner::start("image", "to be available");
    while !provider.image_available(image_id).await? {
        sleep(POLL_INTERVAL).await;
    }
    spinner.finish();
    Ok(())
}

/// Block until the provider has generated the instance password
pub async fn wait_for_password(provider: &dyn ComputeProvider, id: &str) -> Result<String> {
    let spinner = Spinner::start("password", "to be available");
    let password = loop {
        if let Some(data) = provider.password_data(id).await? {
            break data;
        }
        sleep(POLL_INTERVAL).await;
    };
    spinner.finish();
    Ok(password)
}

/// The "can we actually log in" probe, supplied by the caller; typically an
/// external no-op remote command
#[async_trait]
pub trait LoginCheck: Send + Sync {
    async fn attempt(&self) -> bool;
}

/// Two-phase remote-login readiness wait.
///
/// Each iteration first checks the absolute deadline, then opens a raw TCP
/// connection with a short per-attempt timeout, then runs the login probe.
/// A failure at either phase sleeps and retries from the TCP check.
pub async fn wait_for_connection(
    addr: &str,
    port: u16,
    deadline: Instant,
    login: &dyn LoginCheck,
) -> Result<()> {
    let spinner = Spinner::start(&format!("connection to {addr}:{port}"), "to be ready");
    loop {
        if Instant::now() > deadline {
            spinner.abandon();
            return Err(CloudError::ConnectionTimeout {
                addr: addr.to_string(),
                port,
            });
        }

        let port_open = matches!(
            timeout(CONNECT_ATTEMPT_TIMEOUT, TcpStream::connect((addr, port))).await,
            Ok(Ok(_))
        );
        if port_open && login.attempt().await {
            break;
        }

        sleep(POLL_INTERVAL).await;
    }
    spinner.finish();
    Ok(())
}
