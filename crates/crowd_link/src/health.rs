use crate::{
    config::Connection,
    error::ProbeError,
    transport::{Connector, State, Transport, CONNECT_TIMEOUT},
    util::{elapsed_between, Instant},
    Executor,
};
use std::sync::Arc;

/// Every `every` ticks, reconnect and accrue reputation.
#[derive(Debug, Clone)]
pub struct HealthCheck {
    every: u64,
    last: Option<u64>,
}

impl Default for HealthCheck {
    fn default() -> Self {
        Self::new(Self::EVERY)
    }
}

impl HealthCheck {
    pub const EVERY: u64 = 51;

    pub fn new(every: u64) -> Self {
        Self {
            every: every.max(1),
            last: None,
        }
    }

    /// Whether the check runs on `tick`. Asking twice for the same tick says no.
    pub fn due(&mut self, tick: u64) -> bool {
        if tick % self.every != 0 || self.last == Some(tick) {
            return false;
        }
        self.last.replace(tick);
        true
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeStatus {
    /// Connected and posted the test message.
    Sent,
    Failed(String),
    TimedOut,
    /// A required field was blank.
    Misconfigured,
}

/// A throwaway connection that checks whether the settings work.
pub struct ConfigProbe {
    transport: Transport,
    message: String,
    started: Instant,
}

impl ConfigProbe {
    pub fn start_at(
        connection: &Connection,
        connector: Arc<dyn Connector>,
        executor: Executor,
        message: impl Into<String>,
        now: Instant,
    ) -> Self {
        let mut transport = Transport::open(connection, connector, executor);
        transport.reconnect_if_needed();
        Self {
            transport,
            message: message.into(),
            started: now,
        }
    }

    /// `None` while still waiting for the connection.
    pub fn poll_at(&mut self, now: Instant) -> Option<ProbeStatus> {
        if !self.transport.is_configured() {
            return Some(ProbeStatus::Misconfigured);
        }

        for event in self.transport.poll_events() {
            if let crate::Event::Error(err) = event {
                return Some(ProbeStatus::Failed(err));
            }
        }

        match self.transport.state() {
            State::Open => {
                let message = std::mem::take(&mut self.message);
                if self.transport.send_channel_text_at(&message, now) {
                    self.transport.close();
                    return Some(ProbeStatus::Sent);
                }
                return Some(ProbeStatus::Failed("cannot send the test message".into()));
            }
            State::Closed => return Some(ProbeStatus::Failed("connection closed".into())),
            _ => {}
        }

        if elapsed_between(self.started, now) >= CONNECT_TIMEOUT {
            return Some(ProbeStatus::TimedOut);
        }
        None
    }
}

/// Holds at most one running [`ConfigProbe`].
#[derive(Default)]
pub struct ProbeSlot {
    probe: Option<ConfigProbe>,
}

impl ProbeSlot {
    pub fn is_running(&self) -> bool {
        self.probe.is_some()
    }

    pub fn start_at(
        &mut self,
        connection: &Connection,
        connector: Arc<dyn Connector>,
        executor: Executor,
        message: impl Into<String>,
        now: Instant,
    ) -> Result<(), ProbeError> {
        if self.is_running() {
            return Err(ProbeError::AlreadyRunning);
        }

        log::info!("testing the connection settings");
        let probe = ConfigProbe::start_at(connection, connector, executor, message, now);
        self.probe.replace(probe);
        Ok(())
    }

    /// Polls the running probe. It's removed once it reports a status.
    pub fn poll_at(&mut self, now: Instant) -> Option<ProbeStatus> {
        let status = self.probe.as_mut()?.poll_at(now)?;
        match &status {
            ProbeStatus::Sent => log::info!("the connection settings work"),
            status => log::error!("the connection test failed: {:?}", status),
        }
        self.probe.take();
        Some(status)
    }

    pub fn cancel(&mut self) {
        if self.probe.take().is_some() {
            log::info!("cancelled the connection test");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TcpConnector;
    use futures_lite::{io::BufReader, AsyncBufReadExt as _, StreamExt as _};
    use std::{net::TcpListener, time::Duration};

    fn connection(address: &str) -> (Connection, Arc<dyn Connector>) {
        let connection = Connection {
            active: true,
            channel: "museun".into(),
            bot_name: "shaken_bot".into(),
            oauth: "oauth:abcdef".into(),
        };
        (connection, Arc::new(TcpConnector::new(address)))
    }

    fn wait(slot: &mut ProbeSlot, now: Instant) -> ProbeStatus {
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while std::time::Instant::now() < deadline {
            if let Some(status) = slot.poll_at(now) {
                return status;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        panic!("the probe never finished")
    }

    #[test]
    fn health_check_cadence() {
        let mut check = HealthCheck::default();
        let due = (0..=102).filter(|&tick| check.due(tick)).collect::<Vec<_>>();
        assert_eq!(due, vec![0, 51, 102]);

        let mut check = HealthCheck::default();
        assert!(check.due(51));
        assert!(!check.due(51));
        assert!(!check.due(52));
    }

    #[test]
    fn only_one_probe() {
        let (conn, connector) = connection("127.0.0.1:1");
        let mut slot = ProbeSlot::default();
        let now = Instant::now();

        slot.start_at(&conn, Arc::clone(&connector), Executor::shared(), "hi", now)
            .unwrap();
        assert_eq!(
            slot.start_at(&conn, connector, Executor::shared(), "hi", now),
            Err(ProbeError::AlreadyRunning)
        );

        slot.cancel();
        assert!(!slot.is_running());
    }

    #[test]
    fn blank_settings_are_reported() {
        let (mut conn, connector) = connection("127.0.0.1:1");
        conn.bot_name.clear();

        let mut slot = ProbeSlot::default();
        let now = Instant::now();
        slot.start_at(&conn, connector, Executor::shared(), "hi", now)
            .unwrap();
        assert_eq!(slot.poll_at(now), Some(ProbeStatus::Misconfigured));
        assert!(!slot.is_running());
    }

    #[test]
    fn refused_connection_fails() {
        let addr = TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap();
        let (conn, connector) = connection(&addr.to_string());

        let mut slot = ProbeSlot::default();
        let now = Instant::now();
        slot.start_at(&conn, connector, Executor::shared(), "hi", now)
            .unwrap();
        assert!(matches!(wait(&mut slot, now), ProbeStatus::Failed(..)));
    }

    #[test]
    fn times_out() {
        // nothing can be open yet when the deadline has already passed
        let (conn, connector) = connection("127.0.0.1:1");
        let mut probe = ConfigProbe::start_at(
            &conn,
            connector,
            Executor::shared(),
            "hi",
            Instant::now(),
        );
        let later = Instant::now() + CONNECT_TIMEOUT;
        let status = probe.poll_at(later);
        assert!(matches!(
            status,
            Some(ProbeStatus::TimedOut) | Some(ProbeStatus::Failed(..))
        ));
    }

    #[test]
    fn sends_the_test_message() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let server = std::thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            futures_lite::future::block_on(async move {
                let stream = async_io::Async::new(stream).unwrap();
                let mut lines = BufReader::new(&stream).lines();
                let mut seen = vec![];
                while let Some(Ok(line)) = lines.next().await {
                    seen.push(line);
                }
                seen
            })
        });

        let (conn, connector) = connection(&addr.to_string());
        let mut slot = ProbeSlot::default();
        let now = Instant::now();
        slot.start_at(&conn, connector, Executor::shared(), "crowd_link is connected", now)
            .unwrap();
        assert_eq!(wait(&mut slot, now), ProbeStatus::Sent);

        let seen = server.join().unwrap();
        assert_eq!(seen.len(), 5);
        assert_eq!(seen[1], "PASS oauth:abcdef");
        assert_eq!(seen[4], "PRIVMSG #museun :crowd_link is connected");
    }
}
