//! The session engine: an incremental frame reader plus the hold-timer and
//! keepalive state machine that runs on top of it.
//!
//! Neither collaborator below owns an event loop. [`Clock`] and [`Transport`]
//! are traits so the engine can be driven by whatever reactor the embedder
//! already has; this crate supplies none.

use std::io::Cursor;
use std::net::Ipv4Addr;

use crate::error::Error;
use crate::{Capabilities, Header, Message, Notification, Open, Result};
use crate::{HEADER_LENGTH, MARKER, MAX_MESSAGE_LENGTH};

/// Accumulates inbound bytes and yields complete messages, performing the
/// header-level framing checks (marker, length bounds) before handing a
/// frame to the message codec. Unknown message types surface as
/// [`Error::BadMsg`] from the codec layer, one level down.
#[derive(Debug, Default)]
pub struct FrameReader {
    buffer: Vec<u8>,
}

impl FrameReader {
    /// Builds an empty reader.
    pub fn new() -> FrameReader {
        FrameReader { buffer: Vec::new() }
    }

    /// Appends freshly-read transport bytes to the accumulator.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Drains as many complete messages as are currently buffered. A
    /// partial frame at the tail is left in the accumulator for the next
    /// call. The first framing or decode error encountered is returned
    /// immediately; the caller should treat the session as terminal at
    /// that point, since the accumulator may now be positioned mid-frame.
    pub fn poll(&mut self) -> Result<Vec<Message>> {
        let mut messages = Vec::new();
        loop {
            if self.buffer.len() < HEADER_LENGTH as usize {
                return Ok(messages);
            }
            if self.buffer[0..16] != MARKER[..] {
                return Err(Error::NotSync);
            }
            let length = u16::from_be_bytes([self.buffer[16], self.buffer[17]]);
            if length < HEADER_LENGTH || length > MAX_MESSAGE_LENGTH {
                return Err(Error::BadLen(length));
            }
            if self.buffer.len() < length as usize {
                return Ok(messages);
            }

            let frame: Vec<u8> = self.buffer.drain(..length as usize).collect();
            let mut cursor = Cursor::new(&frame[..]);
            let header = Header::parse(&mut cursor)?;
            let message = Message::parse(&header, &mut cursor)?;
            messages.push(message);
        }
    }
}

/// The hold-timer/keepalive state machine, per message RFC4271 §4.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// No OPEN has been sent or received yet.
    Idle,
    /// A local OPEN was sent; awaiting the peer's OPEN.
    OpenSent,
    /// Both OPENs exchanged; timers running (unless holdtime is 0).
    Established,
    /// The transport has been closed, by either side or by timer expiry.
    Closed,
}

/// A one-shot, re-armable expiry timer plus a periodic keepalive ticker.
/// A `holdtime` of 0 disables both per RFC4271; the engine never calls
/// either method in that case.
pub trait Clock {
    /// Arms (or re-arms) the expiry timer to fire `seconds` from now.
    fn arm_expiry(&mut self, seconds: u16);
    /// Cancels the expiry timer without firing it.
    fn cancel_expiry(&mut self);
    /// Starts (or restarts) a periodic ticker firing every `seconds`.
    fn start_keepalive(&mut self, seconds: u16);
    /// Stops the keepalive ticker.
    fn stop_keepalive(&mut self);
}

/// An ordered, reliable byte-stream collaborator with a close operation. No
/// flow-control contract is assumed beyond "writes complete in order".
pub trait Transport {
    /// Writes `bytes` to the peer.
    fn write(&mut self, bytes: &[u8]) -> Result<()>;
    /// Requests the underlying connection be torn down.
    fn close(&mut self);
}

/// Why a session transitioned to `Closed`, passed to the `closed` callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClosedReason {
    /// A framing or decode error triggered a NOTIFICATION and close.
    ProtocolError,
    /// The expiry timer fired; no NOTIFICATION is sent for this case.
    ExpiryTimeout,
    /// The transport collaborator reported the connection is gone.
    TransportLost,
}

/// Runs one BGP session: frame reading, the hold-timer state machine, and
/// NOTIFICATION emission on framing or decode errors.
pub struct Session<C: Clock, T: Transport> {
    state: State,
    local_holdtime: u16,
    holdtime: u16,
    reader: FrameReader,
    clock: C,
    transport: T,
    on_closed: Option<Box<dyn FnMut(ClosedReason)>>,
}

impl<C: Clock, T: Transport> Session<C, T> {
    /// Builds a session that will propose `local_holdtime` seconds in its
    /// own OPEN and negotiate down to whatever the peer proposes.
    pub fn new(local_holdtime: u16, clock: C, transport: T) -> Session<C, T> {
        Session {
            state: State::Idle,
            local_holdtime,
            holdtime: local_holdtime,
            reader: FrameReader::new(),
            clock,
            transport,
            on_closed: None,
        }
    }

    /// Registers the callback fired exactly once, after all timers have been
    /// cancelled, whenever the session reaches `Closed`.
    pub fn on_closed(&mut self, callback: impl FnMut(ClosedReason) + 'static) {
        self.on_closed = Some(Box::new(callback));
    }

    /// Called by the transport collaborator when the connection is gone
    /// without a protocol-level cause (e.g. a TCP reset).
    pub fn transport_lost(&mut self) {
        self.clock.cancel_expiry();
        self.clock.stop_keepalive();
        self.state = State::Closed;
        if let Some(callback) = self.on_closed.as_mut() {
            callback(ClosedReason::TransportLost);
        }
    }

    /// The session's current state.
    pub fn state(&self) -> State {
        self.state
    }

    /// Builds and sends an OPEN carrying `capabilities`, then moves to
    /// `OpenSent`.
    pub fn open(
        &mut self,
        peer_asn: u16,
        identifier: Ipv4Addr,
        capabilities: Capabilities,
    ) -> Result<()> {
        let open = Open {
            version: 4,
            peer_asn,
            hold_timer: self.local_holdtime,
            identifier,
            capabilities,
            other_parameters: Vec::new(),
        };
        self.send(&Message::Open(open))?;
        self.state = State::OpenSent;
        Ok(())
    }

    /// Encodes and writes one message.
    pub fn send(&mut self, message: &Message) -> Result<()> {
        let mut bytes = Vec::with_capacity(32);
        message.encode(&mut bytes)?;
        self.transport.write(&bytes)
    }

    /// Feeds freshly-read transport bytes through the frame reader and
    /// drives the state machine for every complete message found, calling
    /// `handle` once per non-KEEPALIVE message in wire order. On a framing
    /// or decode error, emits NOTIFICATION (unless the error is of the
    /// silent-close family), closes the transport, and returns the error.
    pub fn receive(&mut self, bytes: &[u8], mut handle: impl FnMut(&Message)) -> Result<()> {
        self.reader.feed(bytes);
        match self.reader.poll() {
            Ok(messages) => {
                for message in &messages {
                    self.on_message(message, &mut handle);
                }
                Ok(())
            }
            Err(err) => {
                self.fail(&err);
                Err(err)
            }
        }
    }

    fn on_message(&mut self, message: &Message, handle: &mut impl FnMut(&Message)) {
        match message {
            Message::Open(open) => {
                if self.state == State::Idle || self.state == State::OpenSent {
                    self.holdtime = self.local_holdtime.min(open.hold_timer);
                    self.arm_timers();
                    self.state = State::Established;
                }
            }
            Message::KeepAlive => {
                self.reset_expiry();
            }
            Message::Update(_) | Message::Notification(_) => {
                self.reset_expiry();
                handle(message);
            }
        }
    }

    fn arm_timers(&mut self) {
        if self.holdtime > 0 {
            self.clock.start_keepalive(self.holdtime / 2);
            self.clock.arm_expiry(self.holdtime);
        }
    }

    fn reset_expiry(&mut self) {
        if self.holdtime > 0 {
            self.clock.arm_expiry(self.holdtime);
        }
    }

    /// Called by the clock collaborator when the expiry timer fires: stops
    /// the keepalive ticker and closes the transport without a NOTIFICATION.
    pub fn expire(&mut self) {
        self.clock.stop_keepalive();
        self.transport.close();
        self.state = State::Closed;
        if let Some(callback) = self.on_closed.as_mut() {
            callback(ClosedReason::ExpiryTimeout);
        }
    }

    /// Called by the clock collaborator when the keepalive ticker fires.
    pub fn send_keepalive(&mut self) -> Result<()> {
        self.send(&Message::KeepAlive)
    }

    fn fail(&mut self, error: &Error) {
        if let Some(notification) = Notification::from_error(error) {
            let mut bytes = Vec::with_capacity(21);
            if Message::Notification(notification).encode(&mut bytes).is_ok() {
                let _ = self.transport.write(&bytes);
            }
        }
        self.clock.cancel_expiry();
        self.clock.stop_keepalive();
        self.transport.close();
        self.state = State::Closed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Notification as Notif;

    fn header_bytes(marker: [u8; 16], length: u16, record_type: u8) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(19);
        bytes.extend_from_slice(&marker);
        bytes.extend_from_slice(&length.to_be_bytes());
        bytes.push(record_type);
        bytes
    }

    #[test]
    fn framing_not_sync() {
        let mut marker = MARKER;
        marker[0] = 0x00;
        let bytes = header_bytes(marker, 19, 4);
        let mut reader = FrameReader::new();
        reader.feed(&bytes);
        let err = reader.poll().unwrap_err();
        assert!(matches!(err, Error::NotSync));

        let notification = Notif::from_error(&err).unwrap();
        let mut encoded = Vec::new();
        Message::Notification(notification).encode(&mut encoded).unwrap();
        assert_eq!(
            encoded,
            vec![
                0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
                0xff, 0xff, 0xff, 0x00, 0x15, 0x03, 0x01, 0x01,
            ]
        );
    }

    #[test]
    fn framing_bad_len_too_short() {
        let bytes = header_bytes(MARKER, 0x0012, 4);
        let mut reader = FrameReader::new();
        reader.feed(&bytes);
        let err = reader.poll().unwrap_err();
        assert!(matches!(err, Error::BadLen(0x0012)));

        let notification = Notif::from_error(&err).unwrap();
        let mut encoded = Vec::new();
        Message::Notification(notification).encode(&mut encoded).unwrap();
        assert_eq!(
            &encoded[16..],
            &[0x00, 0x17, 0x03, 0x01, 0x02, 0x00, 0x12][..]
        );
    }

    #[test]
    fn framing_bad_len_too_long() {
        let bytes = header_bytes(MARKER, 0xBBFF, 4);
        let mut reader = FrameReader::new();
        reader.feed(&bytes);
        let err = reader.poll().unwrap_err();
        assert!(matches!(err, Error::BadLen(0xBBFF)));

        let notification = Notif::from_error(&err).unwrap();
        let mut encoded = Vec::new();
        Message::Notification(notification).encode(&mut encoded).unwrap();
        assert_eq!(
            &encoded[16..],
            &[0x00, 0x17, 0x03, 0x01, 0x02, 0xBB, 0xFF][..]
        );
    }

    #[test]
    fn framing_bad_msg() {
        let bytes = header_bytes(MARKER, 19, 0xFF);
        let mut reader = FrameReader::new();
        reader.feed(&bytes);
        let err = reader.poll().unwrap_err();
        assert!(matches!(err, Error::BadMsg(0xFF)));

        let notification = Notif::from_error(&err).unwrap();
        let mut encoded = Vec::new();
        Message::Notification(notification).encode(&mut encoded).unwrap();
        assert_eq!(&encoded[16..], &[0x00, 0x16, 0x03, 0x01, 0x03, 0xFF][..]);
    }

    #[test]
    fn waits_for_more_bytes_on_partial_frame() {
        let bytes = header_bytes(MARKER, 19, 4);
        let mut reader = FrameReader::new();
        reader.feed(&bytes[..10]);
        assert!(reader.poll().unwrap().is_empty());
        reader.feed(&bytes[10..]);
        let messages = reader.poll().unwrap();
        assert_eq!(messages.len(), 1);
        assert!(matches!(messages[0], Message::KeepAlive));
    }

    #[derive(Default)]
    struct MockClock {
        expiry_seconds: Option<u16>,
        keepalive_seconds: Option<u16>,
        expiry_cancelled: bool,
        keepalive_stopped: bool,
    }

    impl Clock for MockClock {
        fn arm_expiry(&mut self, seconds: u16) {
            self.expiry_seconds = Some(seconds);
        }
        fn cancel_expiry(&mut self) {
            self.expiry_cancelled = true;
        }
        fn start_keepalive(&mut self, seconds: u16) {
            self.keepalive_seconds = Some(seconds);
        }
        fn stop_keepalive(&mut self) {
            self.keepalive_stopped = true;
        }
    }

    #[derive(Default)]
    struct MockTransport {
        written: Vec<u8>,
        closed: bool,
    }

    impl Transport for MockTransport {
        fn write(&mut self, bytes: &[u8]) -> Result<()> {
            self.written.extend_from_slice(bytes);
            Ok(())
        }
        fn close(&mut self) {
            self.closed = true;
        }
    }

    #[test]
    fn open_then_peer_open_establishes_and_negotiates_holdtime() {
        let mut session = Session::new(90, MockClock::default(), MockTransport::default());
        session
            .open(65001, Ipv4Addr::new(10, 0, 0, 1), Capabilities::default())
            .unwrap();
        assert_eq!(session.state(), State::OpenSent);

        let peer_open = Open {
            version: 4,
            peer_asn: 65002,
            hold_timer: 30,
            identifier: Ipv4Addr::new(10, 0, 0, 2),
            capabilities: Capabilities::default(),
            other_parameters: Vec::new(),
        };
        let mut bytes = Vec::new();
        Message::Open(peer_open).encode(&mut bytes).unwrap();

        session.receive(&bytes, |_| {}).unwrap();
        assert_eq!(session.state(), State::Established);
        assert_eq!(session.holdtime, 30);
        assert_eq!(session.clock.keepalive_seconds, Some(15));
        assert_eq!(session.clock.expiry_seconds, Some(30));
    }

    #[test]
    fn keepalive_resets_expiry() {
        let mut session = Session::new(30, MockClock::default(), MockTransport::default());
        session.holdtime = 30;
        session.state = State::Established;

        let mut bytes = Vec::new();
        Message::KeepAlive.encode(&mut bytes).unwrap();
        session.receive(&bytes, |_| {}).unwrap();
        assert_eq!(session.clock.expiry_seconds, Some(30));
    }

    #[test]
    fn framing_error_emits_notification_and_closes() {
        let mut session = Session::new(30, MockClock::default(), MockTransport::default());
        let mut marker = MARKER;
        marker[0] = 0x00;
        let bytes = header_bytes(marker, 19, 4);
        let err = session.receive(&bytes, |_| {}).unwrap_err();
        assert!(matches!(err, Error::NotSync));
        assert_eq!(session.state(), State::Closed);
        assert!(session.transport.closed);
        assert!(!session.transport.written.is_empty());
    }

    #[test]
    fn expiry_closes_without_notification() {
        let mut session = Session::new(30, MockClock::default(), MockTransport::default());
        session.expire();
        assert_eq!(session.state(), State::Closed);
        assert!(session.clock.keepalive_stopped);
        assert!(session.transport.closed);
        assert!(session.transport.written.is_empty());
    }

    #[test]
    fn zero_holdtime_disables_timers() {
        let mut session = Session::new(0, MockClock::default(), MockTransport::default());
        session
            .open(65001, Ipv4Addr::new(10, 0, 0, 1), Capabilities::default())
            .unwrap();
        let peer_open = Open {
            version: 4,
            peer_asn: 65002,
            hold_timer: 0,
            identifier: Ipv4Addr::new(10, 0, 0, 2),
            capabilities: Capabilities::default(),
            other_parameters: Vec::new(),
        };
        let mut bytes = Vec::new();
        Message::Open(peer_open).encode(&mut bytes).unwrap();
        session.receive(&bytes, |_| {}).unwrap();

        assert_eq!(session.state(), State::Established);
        assert_eq!(session.clock.keepalive_seconds, None);
        assert_eq!(session.clock.expiry_seconds, None);
    }
}
