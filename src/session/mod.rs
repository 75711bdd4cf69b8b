use std::net::Ipv4Addr;
use std::thread;
use std::time::{Duration, Instant};

use profinet_probe_lib::{
    format_mac, parse_mac, Block, BlockQualifier, ConnectDatagram, ControlBlock, CyclicFrame,
    DataStatus, Dcp, EthernetAddress, Ipv4Address, IOPS_GOOD, SIGNAL_FLASH_ONCE,
};
use tracing::{debug, error, info, trace};

use crate::config::SessionConfig;
use crate::error::{Error, Result};
use crate::ethernet::AdapterChannel;
use crate::scheduler::Scheduler;

mod observer;

pub use observer::*;

const PHASE_TIMER: &str = "phase";
const CYCLE_TIMER: &str = "cycle";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Timer {
    Phase,
    Cycle,
}

#[derive(Debug, Clone)]
struct Target {
    mac: EthernetAddress,
    ip: Ipv4Addr,
    station_name: String,
}

/// Simulated connection to one device.
///
/// The session is driven from the caller's thread: [`poll`](Self::poll) runs
/// whatever timer is due and [`next_deadline`](Self::next_deadline) tells when
/// to call it again. Every phase sends exactly one frame; a failed send moves
/// the session to [`SessionState::Error`] and stops its timers. There is no
/// retry, a new attempt starts again from [`SessionState::Offline`].
pub struct ConnectionSession {
    config: SessionConfig,
    state: SessionState,
    channel: Option<AdapterChannel>,
    target: Option<Target>,
    scheduler: Scheduler<Timer>,
    payload_byte: u8,
    cycle_counter: u16,
    cycles_sent: u64,
    last_error: Option<String>,
    observers: Vec<Box<dyn SessionObserver>>,
}

impl ConnectionSession {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            state: SessionState::Offline,
            channel: None,
            target: None,
            scheduler: Scheduler::new(),
            payload_byte: 0,
            cycle_counter: 0,
            cycles_sent: 0,
            last_error: None,
            observers: Vec::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn payload_byte(&self) -> u8 {
        self.payload_byte
    }

    pub fn cycle_counter(&self) -> u16 {
        self.cycle_counter
    }

    /// Cyclic frames sent since the session started.
    pub fn cycles_sent(&self) -> u64 {
        self.cycles_sent
    }

    pub fn target_mac(&self) -> Option<EthernetAddress> {
        self.target.as_ref().map(|target| target.mac)
    }

    pub fn station_name(&self) -> Option<&str> {
        self.target.as_ref().map(|target| target.station_name.as_str())
    }

    pub fn subscribe(&mut self, observer: impl SessionObserver + 'static) {
        self.observers.push(Box::new(observer));
    }

    pub fn start(
        &mut self,
        channel: AdapterChannel,
        target_mac: &str,
        target_ip: Ipv4Addr,
        station_name: &str,
    ) -> Result<()> {
        self.start_at(channel, target_mac, target_ip, station_name, Instant::now())
    }

    /// Takes ownership of `channel` and arms the phase timer relative to
    /// `now`. Only allowed from [`SessionState::Offline`].
    pub fn start_at(
        &mut self,
        channel: AdapterChannel,
        target_mac: &str,
        target_ip: Ipv4Addr,
        station_name: &str,
        now: Instant,
    ) -> Result<()> {
        if self.state != SessionState::Offline {
            return Err(Error::invalid_state(format!(
                "session can only start when offline, it is {}",
                self.state
            )));
        }

        self.config.validate()?;

        let mac = parse_mac(target_mac)?;
        if !mac.is_unicast() {
            return Err(Error::invalid_target(format!(
                "{} is not a unicast address",
                target_mac
            )));
        }
        if !channel.is_open() {
            return Err(Error::NotConnected);
        }

        self.payload_byte = 0;
        self.cycle_counter = 0;
        self.cycles_sent = 0;
        self.last_error = None;
        self.scheduler.clear();
        self.target = Some(Target {
            mac,
            ip: target_ip,
            station_name: station_name.to_owned(),
        });
        self.channel = Some(channel);

        self.scheduler
            .add_periodic(PHASE_TIMER, self.config.phase_interval, Timer::Phase, now);
        self.transition(SessionState::Connecting);
        self.log(format!(
            "connecting to {} ({}, {})",
            station_name,
            format_mac(&mac),
            target_ip
        ));

        Ok(())
    }

    /// Runs all timers due at `now`.
    pub fn poll(&mut self, now: Instant) {
        while let Some((_, timer)) = self.scheduler.pop_due(now) {
            match (timer, self.state) {
                (Timer::Phase, SessionState::Connecting) => self.send_connect(),
                (Timer::Phase, SessionState::Parameterizing) => self.send_parameters(now),
                (Timer::Cycle, SessionState::Running) => self.send_cycle(),
                (timer, state) => debug!(?timer, %state, "stale timer ignored"),
            }
        }
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.scheduler.next_deadline()
    }

    /// Drives the session on the calling thread until `deadline` passes or
    /// the session stops running.
    pub fn run_until(&mut self, deadline: Instant) -> SessionState {
        loop {
            let now = Instant::now();
            if now >= deadline {
                break;
            }

            self.poll(now);

            let wake = match self.next_deadline() {
                Some(next) => next.min(deadline),
                None => break,
            };
            let now = Instant::now();
            if wake > now {
                thread::sleep(wake - now);
            }
        }

        self.state
    }

    /// Cancels the timers, closes the channel and goes offline. Does nothing
    /// when already offline.
    pub fn stop(&mut self) {
        self.scheduler.clear();

        if let Some(mut channel) = self.channel.take() {
            channel.close();
        }

        if self.state != SessionState::Offline {
            self.transition(SessionState::Offline);
            self.log(format!("stopped after {} cycles", self.cycles_sent));
        }
    }

    fn send_to_target<F>(&mut self, build: F) -> Result<()>
    where
        F: FnOnce(&SessionConfig, &Target, EthernetAddress) -> Result<Vec<u8>>,
    {
        let channel = self.channel.as_mut().ok_or(Error::NotConnected)?;
        let target = self.target.as_ref().ok_or(Error::NotConnected)?;

        let frame = build(&self.config, target, channel.mac_address())?;
        channel.send(&frame)
    }

    fn send_connect(&mut self) {
        let sent = self.send_to_target(|config, target, source| {
            let mut datagram = ConnectDatagram::new(
                target.mac,
                source,
                Ipv4Address(config.source_ip.octets()),
                Ipv4Address(target.ip.octets()),
            );
            datagram.destination_port = config.connect_port;
            Ok(datagram.to_bytes())
        });

        match sent {
            Ok(()) => {
                self.transition(SessionState::Parameterizing);
                self.log("connect request sent".to_owned());
            }
            Err(e) => self.fail(e),
        }
    }

    /// Stands in for the parameter download with a single signal request.
    fn send_parameters(&mut self, now: Instant) {
        let sent = self.send_to_target(|_, target, source| {
            let block = Block::Control(ControlBlock::Signal(SIGNAL_FLASH_ONCE))
                .to_set_block(BlockQualifier::Temporary)?;
            Ok(Dcp::set_request(target.mac, source, rand::random(), block)?.to_bytes())
        });

        match sent {
            Ok(()) => {
                self.scheduler.cancel(PHASE_TIMER);
                self.scheduler
                    .add_periodic(CYCLE_TIMER, self.config.cycle_interval, Timer::Cycle, now);
                self.transition(SessionState::Running);
                self.log(format!(
                    "parameters sent, cyclic data every {:?}",
                    self.config.cycle_interval
                ));
            }
            Err(e) => self.fail(e),
        }
    }

    /// Counters only advance once the frame is out.
    fn send_cycle(&mut self) {
        let payload_byte = self.payload_byte.wrapping_add(1);
        let cycle_counter = self
            .cycle_counter
            .wrapping_add(self.config.cycle_counter_step);

        let sent = self.send_to_target(|config, target, source| {
            let mut data = vec![0; config.cyclic_data_len];
            data[0] = payload_byte;
            data[1] = IOPS_GOOD;

            let frame = CyclicFrame {
                destination: target.mac,
                source,
                frame_id: config.frame_id,
                data,
                cycle_counter,
                data_status: DataStatus::GOOD,
                transfer_status: 0,
            };
            Ok(frame.to_bytes())
        });

        match sent {
            Ok(()) => {
                self.payload_byte = payload_byte;
                self.cycle_counter = cycle_counter;
                self.cycles_sent += 1;
                trace!(payload_byte, cycle_counter, "cyclic frame sent");
            }
            Err(e) => self.fail(e),
        }
    }

    fn fail(&mut self, err: Error) {
        self.scheduler.clear();
        error!(state = %self.state, error = %err, "session failed");

        let message = format!("{} failed: {}", self.state, err);
        self.last_error = Some(message.clone());
        self.transition(SessionState::Error);
        self.log(message);
    }

    fn transition(&mut self, to: SessionState) {
        let from = self.state;
        self.state = to;

        info!(%from, %to, "session state changed");
        for observer in self.observers.iter_mut() {
            observer.state_changed(from, to);
        }
    }

    fn log(&mut self, message: String) {
        debug!(station = ?self.station_name(), "{}", message);
        for observer in self.observers.iter_mut() {
            observer.log_event(&message);
        }
    }
}

impl Drop for ConnectionSession {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;

    use profinet_probe_lib::{CyclicFrameView, FrameId, ServiceId, PNIO_CM_PORT, RT_CLASS_1_FRAME_ID};
    use smoltcp::wire::{EthernetFrame, EthernetProtocol};

    use super::*;
    use crate::ethernet::tests::{memory_channel, LOCAL_MAC};
    use crate::ethernet::MemoryLinkHandle;

    const TARGET: &str = "aa:bb:cc:dd:ee:ff";
    const TARGET_MAC: EthernetAddress = EthernetAddress([0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff]);
    const TARGET_IP: Ipv4Addr = Ipv4Addr::new(192, 168, 0, 20);
    const PHASE: Duration = Duration::from_millis(500);
    const CYCLE: Duration = Duration::from_millis(10);

    fn started(now: Instant) -> (ConnectionSession, MemoryLinkHandle, mpsc::Receiver<SessionEvent>) {
        let (channel, handle) = memory_channel();
        let (tx, rx) = mpsc::channel();

        let mut session = ConnectionSession::new(SessionConfig::default());
        session.subscribe(tx);
        session
            .start_at(channel, TARGET, TARGET_IP, "plc-1", now)
            .unwrap();

        (session, handle, rx)
    }

    /// Polls through both phases, leaving the session running at the
    /// returned instant.
    fn run_to_running(session: &mut ConnectionSession, start: Instant) -> Instant {
        session.poll(start + PHASE);
        session.poll(start + PHASE * 2);
        start + PHASE * 2
    }

    fn state_changes(rx: &mpsc::Receiver<SessionEvent>) -> Vec<(SessionState, SessionState)> {
        rx.try_iter()
            .filter_map(|event| match event {
                SessionEvent::StateChanged { from, to } => Some((from, to)),
                SessionEvent::Log(_) => None,
            })
            .collect()
    }

    #[test]
    fn test_phase_progression() {
        let start = Instant::now();
        let (mut session, handle, rx) = started(start);
        assert_eq!(session.state(), SessionState::Connecting);

        session.poll(start + PHASE - Duration::from_millis(1));
        assert_eq!(session.state(), SessionState::Connecting);
        assert_eq!(handle.sent_count(), 0);

        session.poll(start + PHASE);
        assert_eq!(session.state(), SessionState::Parameterizing);

        session.poll(start + PHASE * 2);
        assert_eq!(session.state(), SessionState::Running);

        assert_eq!(
            state_changes(&rx),
            vec![
                (SessionState::Offline, SessionState::Connecting),
                (SessionState::Connecting, SessionState::Parameterizing),
                (SessionState::Parameterizing, SessionState::Running),
            ]
        );

        let sent = handle.sent();
        assert_eq!(sent.len(), 2);

        let connect = EthernetFrame::new_checked(&sent[0][..]).unwrap();
        assert_eq!(connect.dst_addr(), TARGET_MAC);
        assert_eq!(connect.src_addr(), LOCAL_MAC);
        assert_eq!(connect.ethertype(), EthernetProtocol::Ipv4);
        // UDP destination port behind the 14 byte Ethernet and 20 byte IPv4 headers.
        assert_eq!(sent[0][36..38], PNIO_CM_PORT.to_be_bytes());

        let parameters = Dcp::decode(&sent[1]).unwrap();
        assert_eq!(parameters.destination, TARGET_MAC);
        assert_eq!(parameters.header.frame_id(), Some(FrameId::GetSet));
        assert_eq!(parameters.header.service_id(), Some(ServiceId::Set));
        assert!(parameters.find_block(0x05, 0x03).is_some());
    }

    #[test]
    fn test_cyclic_frames() {
        let start = Instant::now();
        let (mut session, handle, _rx) = started(start);
        let running = run_to_running(&mut session, start);
        handle.take_sent();

        for i in 1..=3 {
            session.poll(running + CYCLE * i);
        }

        let sent = handle.sent();
        assert_eq!(sent.len(), 3);
        for (i, bytes) in sent.iter().enumerate() {
            let n = i as u16 + 1;
            let view = CyclicFrameView::new_checked(bytes, 40).unwrap();
            assert_eq!(view.frame_id(), RT_CLASS_1_FRAME_ID);
            assert_eq!(view.data()[0], n as u8);
            assert_eq!(view.cycle_counter(), n * 32);
            assert_eq!(view.data_status(), DataStatus::GOOD);
        }

        assert_eq!(session.payload_byte(), 3);
        assert_eq!(session.cycle_counter(), 96);
    }

    #[test]
    fn test_counters_wrap() {
        let start = Instant::now();
        let (mut session, _handle, _rx) = started(start);
        let running = run_to_running(&mut session, start);

        let ticks: u32 = 2100;
        for i in 1..=ticks {
            session.poll(running + CYCLE * i);
        }

        assert_eq!(session.cycles_sent(), ticks as u64);
        assert_eq!(session.payload_byte(), (ticks % 256) as u8);
        assert_eq!(session.cycle_counter(), ((ticks * 32) % 65536) as u16);
    }

    #[test]
    fn test_missed_cycles_are_skipped() {
        let start = Instant::now();
        let (mut session, handle, _rx) = started(start);
        let running = run_to_running(&mut session, start);
        handle.take_sent();

        session.poll(running + Duration::from_millis(55));
        assert_eq!(handle.sent_count(), 1);
        assert_eq!(session.next_deadline(), Some(running + CYCLE * 6));
    }

    #[test]
    fn test_send_failure_in_each_phase() {
        for allowed in 0..3 {
            let start = Instant::now();
            let (mut session, handle, rx) = started(start);
            handle.fail_after(allowed);

            let mut now = start;
            for _ in 0..3 {
                now += PHASE;
                session.poll(now);
            }
            session.poll(now + CYCLE);

            assert_eq!(session.state(), SessionState::Error, "allowed {}", allowed);
            assert!(session.last_error().is_some());
            assert_eq!(session.next_deadline(), None);
            assert_eq!(handle.sent_count(), allowed);

            let changes = state_changes(&rx);
            assert_eq!(changes.last().map(|change| change.1), Some(SessionState::Error));
            assert!(!changes.iter().any(|change| change.1 == SessionState::AppReady));
        }
    }

    #[test]
    fn test_stop_is_idempotent() {
        let start = Instant::now();
        let (mut session, handle, rx) = started(start);
        let running = run_to_running(&mut session, start);
        session.poll(running + CYCLE);
        let sent = handle.sent_count();

        session.stop();
        assert_eq!(session.state(), SessionState::Offline);
        session.poll(running + CYCLE * 10);
        assert_eq!(handle.sent_count(), sent);

        session.stop();
        let changes = state_changes(&rx);
        assert_eq!(changes.last(), Some(&(SessionState::Running, SessionState::Offline)));
        assert_eq!(
            changes
                .iter()
                .filter(|change| change.1 == SessionState::Offline)
                .count(),
            1
        );
    }

    #[test]
    fn test_stop_from_error_goes_offline() {
        let start = Instant::now();
        let (mut session, handle, _rx) = started(start);
        handle.fail_sends(true);
        session.poll(start + PHASE);
        assert_eq!(session.state(), SessionState::Error);

        session.stop();
        assert_eq!(session.state(), SessionState::Offline);
    }

    #[test]
    fn test_invalid_start() {
        let start = Instant::now();
        let (mut session, _handle, _rx) = started(start);
        let (channel, _) = memory_channel();
        assert!(matches!(
            session.start_at(channel, TARGET, TARGET_IP, "plc-1", start),
            Err(Error::InvalidState(_))
        ));

        let mut session = ConnectionSession::new(SessionConfig::default());
        let (channel, _) = memory_channel();
        assert!(matches!(
            session.start_at(channel, "not-a-mac", TARGET_IP, "plc-1", start),
            Err(Error::InvalidTarget(_))
        ));
        assert_eq!(session.state(), SessionState::Offline);

        let (mut channel, _) = memory_channel();
        channel.close();
        assert!(matches!(
            session.start_at(channel, TARGET, TARGET_IP, "plc-1", start),
            Err(Error::NotConnected)
        ));
        assert_eq!(session.state(), SessionState::Offline);
    }

    #[test]
    fn test_restart_resets_counters() {
        let start = Instant::now();
        let (mut session, _handle, _rx) = started(start);
        let running = run_to_running(&mut session, start);
        session.poll(running + CYCLE);
        assert_eq!(session.payload_byte(), 1);
        session.stop();

        let (channel, _) = memory_channel();
        session
            .start_at(channel, TARGET, TARGET_IP, "plc-2", running)
            .unwrap();
        assert_eq!(session.payload_byte(), 0);
        assert_eq!(session.cycle_counter(), 0);
        assert_eq!(session.station_name(), Some("plc-2"));
    }
}
