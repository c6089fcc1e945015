//! Command-session loop: poll the host link for move requests and execute
//! them, acquiring voice descriptors from the peripheral when asked.

use std::io::{Read, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crossbeam_channel as xch;
use eyre::Result;
use gantry_core::error::{AbortReason, MotionError};
use gantry_core::orchestrator::Gantry;
use gantry_core::session::{HostSession, SessionRequest, VoiceLink};
use gantry_traits::{ByteLink, Indicator, SessionPhase};

/// Host link over the process's stdio: a pump thread feeds stdin bytes into
/// a channel so reads can honor a timeout; writes go straight to stdout.
pub struct StdioLink {
    incoming: xch::Receiver<u8>,
}

impl StdioLink {
    pub fn spawn() -> Self {
        let (tx, rx) = xch::unbounded();
        std::thread::spawn(move || {
            let mut stdin = std::io::stdin().lock();
            let mut buf = [0u8; 1];
            loop {
                match stdin.read(&mut buf) {
                    Ok(0) | Err(_) => break,
                    Ok(_) => {
                        // Line-based input: newlines are not protocol bytes.
                        if buf[0] == b'\n' || buf[0] == b'\r' {
                            continue;
                        }
                        if tx.send(buf[0]).is_err() {
                            break;
                        }
                    }
                }
            }
        });
        Self { incoming: rx }
    }
}

type BoxError = Box<dyn std::error::Error + Send + Sync>;

impl ByteLink for StdioLink {
    fn read_byte(&mut self, timeout: Duration) -> Result<u8, BoxError> {
        self.incoming.recv_timeout(timeout).map_err(|_| {
            Box::new(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "no host input",
            )) as BoxError
        })
    }

    fn write_byte(&mut self, byte: u8) -> Result<(), BoxError> {
        let mut out = std::io::stdout().lock();
        out.write_all(&[byte])?;
        out.flush()?;
        Ok(())
    }
}

/// Serve until the halt flag is raised: voice requests acquire a descriptor
/// and hand it back to the host; direct requests receive four raw characters
/// and execute the transfer.
pub fn run<H, V, I>(
    gantry: &mut Gantry,
    mut host: HostSession<H>,
    mut voice: Option<VoiceLink<V>>,
    indicator: &mut I,
    halt: &Arc<AtomicBool>,
    poll_ms: u64,
) -> Result<()>
where
    H: ByteLink,
    V: ByteLink,
    I: Indicator,
{
    let poll = Duration::from_millis(poll_ms);
    tracing::info!("command session ready");
    while !halt.load(Ordering::Relaxed) {
        indicator.show(SessionPhase::Idle);
        let request = match host.poll_request(poll) {
            Ok(Some(r)) => r,
            Ok(None) => continue,
            Err(e) => {
                tracing::warn!(error = %e, "host poll failed");
                continue;
            }
        };

        let outcome = match request {
            SessionRequest::Voice => handle_voice(&mut host, voice.as_mut(), indicator),
            SessionRequest::Direct => handle_direct(gantry, &mut host, indicator),
        };
        if let Err(e) = outcome {
            if matches!(
                e.downcast_ref::<MotionError>(),
                Some(MotionError::Abort(AbortReason::Halt))
            ) {
                tracing::info!("halt requested; leaving command session");
                return Err(e);
            }
            // Protocol desync or a failed move ends the request, not the
            // session; the host can retry.
            tracing::error!(error = %e, "request failed");
        }
    }
    tracing::info!("command session stopped");
    Ok(())
}

fn handle_voice<H, V, I>(
    host: &mut HostSession<H>,
    voice: Option<&mut VoiceLink<V>>,
    indicator: &mut I,
) -> Result<()>
where
    H: ByteLink,
    V: ByteLink,
    I: Indicator,
{
    let Some(voice) = voice else {
        eyre::bail!("voice peripheral not available on this rig; use direct mode");
    };
    voice.wake()?;
    let descriptor = voice.acquire_descriptor(indicator)?;
    indicator.show(SessionPhase::AwaitingHost);
    tracing::info!(descriptor = %descriptor.iter().collect::<String>(), "descriptor acquired");
    host.send_descriptor(&descriptor)
}

fn handle_direct<H, I>(gantry: &mut Gantry, host: &mut HostSession<H>, indicator: &mut I) -> Result<()>
where
    H: ByteLink,
    I: Indicator,
{
    let mv = host.receive_move()?;
    indicator.show(SessionPhase::Moving);
    gantry.transfer(&mv)
}
