//! Command session: voice-module and host serial protocols.
//!
//! Two byte links feed the gantry. The recognizer link runs a prompt/ack
//! protocol per spoken token; the host link carries four-character move
//! descriptors in both directions with a space-acknowledged handshake. Every
//! read here is bounded; a peer that stops answering surfaces as a protocol
//! error instead of hanging the session.

use std::sync::Arc;
use std::time::Duration;

use gantry_traits::clock::Clock;
use gantry_traits::{ByteLink, Indicator, SessionPhase};

use crate::config::SessionCfg;
use crate::error::{MotionError, Result};
use crate::grid::MoveCommand;

/// Wake byte sent to the recognizer until it acknowledges.
pub const WAKE: u8 = b'b';
/// Recognizer's awake acknowledgment.
pub const AWAKE_ACK: u8 = b'o';
/// Prompt for a trained-vocabulary recognition (column letters).
pub const RECOGNIZE_TRAINED: u8 = b'd';
/// Prompt for a built-in-vocabulary recognition (row numbers).
pub const RECOGNIZE_BUILTIN: u8 = b'i';
/// Reply prefix: a trained word was recognized.
pub const REPLY_WORD: u8 = b'r';
/// Reply prefix: a built-in word was recognized.
pub const REPLY_NUMBER: u8 = b's';
/// Reply prefix: recognition failed.
pub const REPLY_ERROR: u8 = b'e';
/// Handshake acknowledgment in both protocols.
pub const ACK: u8 = b' ';
/// Host request for a voice-sourced descriptor (also our ready reply).
pub const VOICE_REQUEST: u8 = b'n';
/// Host request to execute a move it supplies (also our ready reply).
pub const DIRECT_REQUEST: u8 = b'm';
/// Descriptor-transfer terminator sent to the host.
pub const DESCRIPTOR_END: u8 = b's';

/// Inter-byte pacing on the recognizer link.
const PROMPT_GAP: Duration = Duration::from_millis(1);

/// What the host asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionRequest {
    /// Acquire a descriptor from the recognizer and report it back.
    Voice,
    /// Receive a move descriptor and execute it.
    Direct,
}

fn protocol(msg: impl Into<String>) -> eyre::Report {
    eyre::Report::new(MotionError::Protocol(msg.into()))
}

/// True when a link error is a read timeout rather than a hard fault.
fn is_timeout(err: &(dyn std::error::Error + 'static)) -> bool {
    #[cfg(feature = "hardware-errors")]
    if let Some(hw) = err.downcast_ref::<gantry_hardware::HwError>() {
        return matches!(hw, gantry_hardware::HwError::Timeout);
    }
    if let Some(io) = err.downcast_ref::<std::io::Error>() {
        return matches!(
            io.kind(),
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
        );
    }
    false
}

/// Session driver for the speech recognizer link.
pub struct VoiceLink<L: ByteLink> {
    link: L,
    cfg: SessionCfg,
    clock: Arc<dyn Clock + Send + Sync>,
}

impl<L: ByteLink> VoiceLink<L> {
    pub fn new(link: L, cfg: SessionCfg, clock: Arc<dyn Clock + Send + Sync>) -> Self {
        Self { link, cfg, clock }
    }

    fn read(&mut self, timeout: Duration) -> Result<u8> {
        self.link.read_byte(timeout).map_err(|e| {
            if is_timeout(&*e) {
                protocol("recognizer stopped responding")
            } else {
                eyre::Report::new(MotionError::Hardware(e.to_string()))
            }
        })
    }

    fn write(&mut self, byte: u8) -> Result<()> {
        self.link
            .write_byte(byte)
            .map_err(|e| eyre::Report::new(MotionError::Hardware(e.to_string())))
    }

    /// Wake the recognizer: keep sending the wake byte until it acknowledges.
    /// Bounded by the token timeout so a dead module fails the session
    /// instead of spinning forever.
    pub fn wake(&mut self) -> Result<()> {
        let epoch = self.clock.now();
        let retry = Duration::from_millis(self.cfg.wake_retry_ms);
        loop {
            self.write(WAKE)?;
            match self.link.read_byte(retry) {
                Ok(AWAKE_ACK) => {
                    tracing::info!("recognizer awake");
                    return Ok(());
                }
                Ok(other) => {
                    tracing::trace!(byte = other, "unexpected wake reply");
                }
                Err(e) if is_timeout(&*e) => {}
                Err(e) => {
                    return Err(eyre::Report::new(MotionError::Hardware(e.to_string())));
                }
            }
            if self.clock.ms_since(epoch) >= self.cfg.token_timeout_ms {
                return Err(protocol("recognizer never acknowledged wake"));
            }
            self.clock.sleep(retry);
        }
    }

    /// Read a recognition index byte. The recognizer reports indices as
    /// uppercase letters; anything else means the link is desynced, so it
    /// surfaces as a protocol error rather than a garbage token.
    fn index_byte(&mut self, timeout: Duration) -> Result<u8> {
        let index = self.read(timeout)?;
        if !index.is_ascii_uppercase() {
            return Err(protocol(format!(
                "recognizer sent index byte {index:#04x} outside A-Z"
            )));
        }
        Ok(index)
    }

    /// Recognize one token. Even slots prompt the trained column vocabulary,
    /// odd slots the built-in number vocabulary; the reply prefix selects the
    /// decode offset. Failed recognitions are drained and retried.
    pub fn acquire_token(&mut self, slot: usize) -> Result<char> {
        let token_timeout = Duration::from_millis(self.cfg.token_timeout_ms);
        let (prompt, vocabulary) = if slot.is_multiple_of(2) {
            (RECOGNIZE_TRAINED, self.cfg.word_set)
        } else {
            (RECOGNIZE_BUILTIN, self.cfg.number_set)
        };

        for attempt in 0..=self.cfg.max_token_retries {
            self.write(prompt)?;
            self.clock.sleep(PROMPT_GAP);
            self.write(vocabulary)?;
            self.clock.sleep(PROMPT_GAP);

            match self.read(token_timeout)? {
                REPLY_WORD => {
                    self.clock.sleep(PROMPT_GAP);
                    self.write(ACK)?;
                    let index = self.index_byte(token_timeout)?;
                    return Ok((index - b'A' + b'a') as char);
                }
                REPLY_NUMBER => {
                    self.clock.sleep(PROMPT_GAP);
                    self.write(ACK)?;
                    let index = self.index_byte(token_timeout)?;
                    return Ok((index - b'A' + b'0') as char);
                }
                REPLY_ERROR => {
                    // Drain the two-byte error detail, then reprompt.
                    self.clock.sleep(PROMPT_GAP);
                    self.write(ACK)?;
                    let code = self.read(token_timeout)?;
                    self.write(ACK)?;
                    let _ = self.read(token_timeout)?;
                    tracing::debug!(slot, attempt, code, "recognition failed, retrying");
                }
                other => {
                    tracing::debug!(slot, attempt, byte = other, "unexpected reply, retrying");
                }
            }
        }
        Err(protocol(format!(
            "no recognition for slot {slot} after {} attempts",
            self.cfg.max_token_retries + 1
        )))
    }

    /// Acquire a full four-token descriptor, lighting the indicator per
    /// confirmed token.
    pub fn acquire_descriptor<I: Indicator>(&mut self, indicator: &mut I) -> Result<[char; 4]> {
        let mut tokens = ['\0'; 4];
        for (slot, out) in tokens.iter_mut().enumerate() {
            indicator.show(SessionPhase::Listening {
                tokens: slot as u8,
            });
            *out = self.acquire_token(slot)?;
            tracing::debug!(slot, token = %out, "token confirmed");
        }
        indicator.show(SessionPhase::Listening { tokens: 4 });
        Ok(tokens)
    }
}

/// Session driver for the host serial link.
pub struct HostSession<H: ByteLink> {
    link: H,
    cfg: SessionCfg,
    clock: Arc<dyn Clock + Send + Sync>,
}

impl<H: ByteLink> HostSession<H> {
    pub fn new(link: H, cfg: SessionCfg, clock: Arc<dyn Clock + Send + Sync>) -> Self {
        Self { link, cfg, clock }
    }

    fn write(&mut self, byte: u8) -> Result<()> {
        self.link
            .write_byte(byte)
            .map_err(|e| eyre::Report::new(MotionError::Hardware(e.to_string())))
    }

    /// Wait up to `timeout` for the next host request. `None` means the host
    /// stayed quiet; unknown request bytes are ignored.
    pub fn poll_request(&mut self, timeout: Duration) -> Result<Option<SessionRequest>> {
        match self.link.read_byte(timeout) {
            Ok(VOICE_REQUEST) => Ok(Some(SessionRequest::Voice)),
            Ok(DIRECT_REQUEST) => Ok(Some(SessionRequest::Direct)),
            Ok(other) => {
                tracing::trace!(byte = other, "ignoring unknown host request");
                Ok(None)
            }
            Err(e) if is_timeout(&*e) => Ok(None),
            Err(e) => Err(eyre::Report::new(MotionError::Hardware(e.to_string()))),
        }
    }

    /// Block until the host sends an acknowledgment byte, discarding noise.
    fn await_ack(&mut self) -> Result<()> {
        let epoch = self.clock.now();
        let step = Duration::from_millis(self.cfg.wake_retry_ms);
        loop {
            match self.link.read_byte(step) {
                Ok(ACK) => return Ok(()),
                Ok(other) => {
                    tracing::trace!(byte = other, "discarding pre-ack byte");
                }
                Err(e) if is_timeout(&*e) => {}
                Err(e) => {
                    return Err(eyre::Report::new(MotionError::Hardware(e.to_string())));
                }
            }
            if self.clock.ms_since(epoch) >= self.cfg.token_timeout_ms {
                return Err(protocol("host stopped acknowledging"));
            }
        }
    }

    fn read_bounded(&mut self) -> Result<u8> {
        self.link
            .read_byte(Duration::from_millis(self.cfg.token_timeout_ms))
            .map_err(|e| {
                if is_timeout(&*e) {
                    protocol("host stopped responding")
                } else {
                    eyre::Report::new(MotionError::Hardware(e.to_string()))
                }
            })
    }

    /// Report a recognized descriptor to the host. Each byte waits for a
    /// host acknowledgment; the transfer ends with the terminator byte.
    pub fn send_descriptor(&mut self, tokens: &[char; 4]) -> Result<()> {
        self.write(VOICE_REQUEST)?;
        self.await_ack()?;
        for &t in tokens {
            self.await_ack()?;
            self.write(t as u8)?;
        }
        self.await_ack()?;
        self.write(DESCRIPTOR_END)?;
        tracing::info!(descriptor = %tokens.iter().collect::<String>(), "descriptor sent to host");
        Ok(())
    }

    /// Receive a move descriptor from the host: confirm the request, then
    /// pull four characters, acknowledging each after the first.
    pub fn receive_move(&mut self) -> Result<MoveCommand> {
        self.write(DIRECT_REQUEST)?;
        let mut buf = ['\0'; 4];
        buf[0] = self.read_bounded()? as char;
        for slot in buf.iter_mut().skip(1) {
            self.write(ACK)?;
            *slot = self.read_bounded()? as char;
        }
        let mv = MoveCommand::from_chars(buf[0], buf[1], buf[2], buf[3])
            .map_err(|e| protocol(e.to_string()))?;
        tracing::info!(%mv, "move received from host");
        Ok(mv)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::ScriptedLink;
    use gantry_traits::clock::SimClock;

    fn cfg() -> SessionCfg {
        SessionCfg {
            wake_retry_ms: 1,
            token_timeout_ms: 50,
            max_token_retries: 2,
            ..SessionCfg::default()
        }
    }

    struct PhaseLog(Vec<SessionPhase>);

    impl Indicator for PhaseLog {
        fn show(&mut self, phase: SessionPhase) {
            self.0.push(phase);
        }
    }

    #[cfg(feature = "hardware-errors")]
    #[test]
    fn uart_timeout_counts_as_quiet_link() {
        let err: Box<dyn std::error::Error + Send + Sync> =
            Box::new(gantry_hardware::HwError::Timeout);
        assert!(is_timeout(&*err));
        let err: Box<dyn std::error::Error + Send + Sync> =
            Box::new(gantry_hardware::HwError::Bus("nack".into()));
        assert!(!is_timeout(&*err));
    }

    #[test]
    fn wake_retries_until_acknowledged() {
        let link = ScriptedLink::with_incoming(&[b'x', AWAKE_ACK]);
        let mut voice = VoiceLink::new(link, cfg(), Arc::new(SimClock::new()));
        voice.wake().unwrap();
        assert!(voice.link.written.iter().all(|&b| b == WAKE));
        assert!(voice.link.written.len() >= 2);
    }

    #[test]
    fn wake_times_out_as_protocol_error() {
        let link = ScriptedLink::default();
        let mut voice = VoiceLink::new(link, cfg(), Arc::new(SimClock::new()));
        let err = voice.wake().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<MotionError>(),
            Some(MotionError::Protocol(_))
        ));
    }

    #[test]
    fn word_reply_decodes_as_column_letter() {
        // 'r' then index 'B' -> 'b'
        let link = ScriptedLink::with_incoming(&[REPLY_WORD, b'B']);
        let mut voice = VoiceLink::new(link, cfg(), Arc::new(SimClock::new()));
        assert_eq!(voice.acquire_token(0).unwrap(), 'b');
        assert_eq!(
            voice.link.written,
            vec![RECOGNIZE_TRAINED, b'C', ACK]
        );
    }

    #[test]
    fn number_reply_decodes_as_row_digit() {
        // 's' then index 'D' -> '3'
        let link = ScriptedLink::with_incoming(&[REPLY_NUMBER, b'D']);
        let mut voice = VoiceLink::new(link, cfg(), Arc::new(SimClock::new()));
        assert_eq!(voice.acquire_token(1).unwrap(), '3');
        assert_eq!(
            voice.link.written,
            vec![RECOGNIZE_BUILTIN, b'D', ACK]
        );
    }

    #[test]
    fn corrupt_index_byte_is_protocol_error() {
        // A desynced recognizer can reply with a byte below 'A'; that must
        // surface as an error, not wrap around into a bogus token.
        let link = ScriptedLink::with_incoming(&[REPLY_WORD, b'0']);
        let mut voice = VoiceLink::new(link, cfg(), Arc::new(SimClock::new()));
        let err = voice.acquire_token(0).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<MotionError>(),
            Some(MotionError::Protocol(_))
        ));
    }

    #[test]
    fn error_reply_drains_detail_and_retries() {
        let link = ScriptedLink::with_incoming(&[
            REPLY_ERROR,
            b'0',
            b'0',
            REPLY_WORD,
            b'A',
        ]);
        let mut voice = VoiceLink::new(link, cfg(), Arc::new(SimClock::new()));
        assert_eq!(voice.acquire_token(0).unwrap(), 'a');
    }

    #[test]
    fn token_retries_exhaust_to_protocol_error() {
        let mut script = Vec::new();
        for _ in 0..3 {
            script.extend_from_slice(&[REPLY_ERROR, b'0', b'0']);
        }
        let link = ScriptedLink::with_incoming(&script);
        let mut voice = VoiceLink::new(link, cfg(), Arc::new(SimClock::new()));
        let err = voice.acquire_token(0).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<MotionError>(),
            Some(MotionError::Protocol(_))
        ));
    }

    #[test]
    fn descriptor_acquisition_lights_per_token() {
        let link = ScriptedLink::with_incoming(&[
            REPLY_WORD, b'E', // 'e'
            REPLY_NUMBER, b'C', // '2'
            REPLY_WORD, b'E', // 'e'
            REPLY_NUMBER, b'E', // '4'
        ]);
        let mut voice = VoiceLink::new(link, cfg(), Arc::new(SimClock::new()));
        let mut lamps = PhaseLog(Vec::new());
        let tokens = voice.acquire_descriptor(&mut lamps).unwrap();
        assert_eq!(tokens, ['e', '2', 'e', '4']);
        assert_eq!(
            lamps.0,
            vec![
                SessionPhase::Listening { tokens: 0 },
                SessionPhase::Listening { tokens: 1 },
                SessionPhase::Listening { tokens: 2 },
                SessionPhase::Listening { tokens: 3 },
                SessionPhase::Listening { tokens: 4 },
            ]
        );
    }

    #[test]
    fn poll_request_maps_bytes() {
        let link = ScriptedLink::with_incoming(&[VOICE_REQUEST]);
        let mut host = HostSession::new(link, cfg(), Arc::new(SimClock::new()));
        assert_eq!(
            host.poll_request(Duration::from_millis(5)).unwrap(),
            Some(SessionRequest::Voice)
        );
        // Script exhausted: quiet host is not an error.
        assert_eq!(host.poll_request(Duration::from_millis(5)).unwrap(), None);
    }

    #[test]
    fn descriptor_handshake_interleaves_acks() {
        // One ack to open, one per token, one final before the terminator.
        let link = ScriptedLink::with_incoming(&[ACK; 6]);
        let mut host = HostSession::new(link, cfg(), Arc::new(SimClock::new()));
        host.send_descriptor(&['e', '2', 'e', '4']).unwrap();
        assert_eq!(
            host.link.written,
            vec![VOICE_REQUEST, b'e', b'2', b'e', b'4', DESCRIPTOR_END]
        );
    }

    #[test]
    fn receive_move_parses_and_acks() {
        let link = ScriptedLink::with_incoming(b"e2e4");
        let mut host = HostSession::new(link, cfg(), Arc::new(SimClock::new()));
        let mv = host.receive_move().unwrap();
        assert_eq!(mv.to_string(), "e2e4");
        assert_eq!(host.link.written, vec![DIRECT_REQUEST, ACK, ACK, ACK]);
    }

    #[test]
    fn malformed_move_is_protocol_error() {
        let link = ScriptedLink::with_incoming(b"z9z9");
        let mut host = HostSession::new(link, cfg(), Arc::new(SimClock::new()));
        let err = host.receive_move().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<MotionError>(),
            Some(MotionError::Protocol(_))
        ));
    }
}
