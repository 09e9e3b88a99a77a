use crate::{
    config::Connection,
    util::{elapsed_between, Instant},
    Executor,
};
use crowd_message::{encode, Message};

use async_channel::{Receiver, Sender};
use async_executor::Task;
use std::{sync::Arc, time::Duration};

mod connector;
pub use connector::{BoxedReader, BoxedWriter, ConnectFut, Connector, Stream, TcpConnector};

mod session;
use session::Session;

/// Sends closer together than this are dropped.
pub const MIN_SEND_INTERVAL: Duration = Duration::from_secs(1);

/// How long a connection attempt may take.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

const OUTBOUND_CAPACITY: usize = 32;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum State {
    /// A required field was blank. Permanent for this transport.
    Unconfigured,
    Disconnected,
    Connecting,
    Open,
    Closed,
    Error,
}

/// Something that happened on the connection, delivered on the simulation thread.
#[derive(Clone, Debug)]
pub enum Event {
    Opened,
    Closed(String),
    Error(String),
    /// A new connection attempt was started.
    Reconnect,
    Join(String),
    Part(String),
    Message(Message),
    Command(Message),
    /// Raised by the integration, never by the network: the number of
    /// playing viewers or the set of known viewers changed.
    PlayersChanged(usize),
}

/// The chat connection, as seen from the simulation thread.
///
/// Network work happens on the executor; everything it produces is queued
/// until [`Transport::poll_events`] drains it.
pub struct Transport {
    connection: Connection,
    state: State,
    connector: Arc<dyn Connector>,
    executor: Executor,

    events_tx: Sender<(u64, Event)>,
    events_rx: Receiver<(u64, Event)>,
    outbound: Option<Sender<String>>,
    session: Option<Task<()>>,
    generation: u64,

    last_send: Option<Instant>,
}

impl Transport {
    /// Never fails: blank fields leave the transport `Unconfigured`.
    pub fn open(connection: &Connection, connector: Arc<dyn Connector>, executor: Executor) -> Self {
        let missing = connection.missing_fields();
        for field in &missing {
            log::error!("the connection is missing '{}'", field);
        }

        let state = if missing.is_empty() {
            State::Disconnected
        } else {
            State::Unconfigured
        };

        let (events_tx, events_rx) = async_channel::unbounded();
        Self {
            connection: connection.clone(),
            state,
            connector,
            executor,
            events_tx,
            events_rx,
            outbound: None,
            session: None,
            generation: 0,
            last_send: None,
        }
    }

    pub const fn state(&self) -> State {
        self.state
    }

    pub fn is_configured(&self) -> bool {
        self.state != State::Unconfigured
    }

    pub fn is_connected(&self) -> bool {
        self.state == State::Open
    }

    pub fn channel(&self) -> &str {
        &self.connection.channel
    }

    pub fn bot_name(&self) -> &str {
        &self.connection.bot_name
    }

    /// Starts a new session unless unconfigured, connecting or open.
    /// Returns whether an attempt was started.
    pub fn reconnect_if_needed(&mut self) -> bool {
        match self.state {
            State::Unconfigured | State::Connecting | State::Open => return false,
            State::Closed | State::Error => self.state = State::Disconnected,
            State::Disconnected => {}
        }

        self.teardown();
        self.generation += 1;
        self.state = State::Connecting;
        log::info!(
            "connecting to #{} as {} (session {})",
            encode::bare_channel(&self.connection.channel),
            self.connection.bot_name,
            self.generation
        );

        let (tx, rx) = async_channel::bounded(OUTBOUND_CAPACITY);
        let session = Session {
            connector: Arc::clone(&self.connector),
            handshake: encode::handshake(
                &self.connection.oauth,
                &self.connection.bot_name,
                &self.connection.channel,
            ),
            outbound: (tx.clone(), rx),
            events: self.events_tx.clone(),
            generation: self.generation,
        };

        let _ = self.events_tx.try_send((self.generation, Event::Reconnect));
        self.outbound.replace(tx);
        self.session.replace(self.executor.spawn(session.run()));
        true
    }

    /// Everything the network produced since the last call, oldest first.
    /// Events from superseded sessions are dropped.
    pub fn poll_events(&mut self) -> Vec<Event> {
        std::iter::from_fn(|| self.poll_event()).collect()
    }

    fn poll_event(&mut self) -> Option<Event> {
        loop {
            let (generation, event) = self.events_rx.try_recv().ok()?;
            if generation != self.generation {
                log::trace!("dropping event from stale session {}", generation);
                continue;
            }

            match &event {
                Event::Opened => self.state = State::Open,
                Event::Closed(reason) => {
                    log::info!("connection closed: {}", reason);
                    self.state = State::Closed;
                    self.teardown();
                }
                Event::Error(err) => {
                    log::error!("connection error: {}", err);
                    self.state = State::Error;
                    self.teardown();
                }
                _ => {}
            }
            return Some(event);
        }
    }

    /// Queues a raw line. Dropped unless the connection is open.
    pub fn send(&mut self, line: String) -> bool {
        if self.state != State::Open {
            log::debug!("not connected, dropping: {}", line);
            return false;
        }

        let outbound = match &self.outbound {
            Some(outbound) => outbound,
            None => return false,
        };

        log::debug!("sending: {}", line);
        match outbound.try_send(line) {
            Ok(()) => true,
            Err(err) => {
                log::warn!("cannot queue outbound line: {}", err);
                false
            }
        }
    }

    pub fn send_channel_text(&mut self, text: &str) -> bool {
        self.send_channel_text_at(text, Instant::now())
    }

    pub fn send_channel_text_at(&mut self, text: &str, now: Instant) -> bool {
        let line = encode::privmsg(&self.connection.channel, text);
        self.send_limited(line, now)
    }

    pub fn send_direct_text(&mut self, user: &str, text: &str) -> bool {
        self.send_direct_text_at(user, text, Instant::now())
    }

    pub fn send_direct_text_at(&mut self, user: &str, text: &str, now: Instant) -> bool {
        let line = encode::whisper(&self.connection.channel, user, text);
        self.send_limited(line, now)
    }

    /// Answers in the channel for public messages and by whisper for direct ones.
    pub fn reply_to(&mut self, msg: &Message, text: &str) -> bool {
        self.reply_to_at(msg, text, Instant::now())
    }

    pub fn reply_to_at(&mut self, msg: &Message, text: &str, now: Instant) -> bool {
        if msg.is_public() {
            return self.send_channel_text_at(text, now);
        }

        match msg.sender().or_else(|| msg.login()) {
            Some(user) => self.send_direct_text_at(user, text, now),
            None => false,
        }
    }

    /// Hangs up once the lines already queued are written. The transport can
    /// be reconnected afterwards.
    pub fn close(&mut self) {
        if let Some(outbound) = self.outbound.take() {
            outbound.close();
        }
        if let Some(session) = self.session.take() {
            log::info!("closing the connection");
            session.detach();
        }

        // whatever the old session still reports is stale now
        self.generation += 1;
        if self.is_configured() {
            self.state = State::Disconnected;
        }
    }

    fn send_limited(&mut self, line: String, now: Instant) -> bool {
        if let Some(last) = self.last_send {
            if elapsed_between(last, now) < MIN_SEND_INTERVAL {
                log::warn!("sending too fast, dropping: {}", line);
                return false;
            }
        }

        if !self.send(line) {
            return false;
        }
        self.last_send.replace(now);
        true
    }

    fn teardown(&mut self) {
        if let Some(outbound) = self.outbound.take() {
            outbound.close();
        }
        drop(self.session.take());
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.close()
    }
}

#[cfg(test)]
impl Transport {
    /// Waits for the next event from the current session.
    pub(crate) fn next_event(&mut self, timeout: Duration) -> Option<Event> {
        let deadline = std::time::Instant::now() + timeout;
        loop {
            if let Some(event) = self.poll_event() {
                return Some(event);
            }
            if std::time::Instant::now() > deadline {
                return None;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    /// Queues an event as if the current session produced it.
    pub(crate) fn inject(&self, event: Event) {
        let _ = self.events_tx.try_send((self.generation, event));
    }

    /// An open transport whose outbound lines end up in the returned receiver.
    pub(crate) fn open_for_test(connection: &Connection) -> (Self, Receiver<String>) {
        struct Never;
        impl Connector for Never {
            fn connect(&self) -> ConnectFut {
                Box::pin(futures_lite::future::pending::<std::io::Result<Stream>>())
            }
        }

        let executor = Executor::shared();
        let mut this = Self::open(connection, Arc::new(Never), executor);
        let (tx, rx) = async_channel::unbounded();
        this.outbound.replace(tx);
        this.state = State::Open;
        (this, rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestMessage;
    use futures_lite::{io::BufReader, AsyncBufReadExt as _, AsyncWriteExt as _, StreamExt as _};
    use std::net::TcpListener;

    fn connection() -> Connection {
        Connection {
            active: true,
            channel: "#Museun".into(),
            bot_name: "Shaken_Bot".into(),
            oauth: "abcdef".into(),
        }
    }

    #[test]
    fn blank_fields_are_unconfigured() {
        let mut conn = connection();
        conn.oauth = "  ".into();

        let executor = Executor::shared();
        let mut transport =
            Transport::open(&conn, Arc::new(TcpConnector::new("localhost:0")), executor);
        assert_eq!(transport.state(), State::Unconfigured);
        assert!(!transport.reconnect_if_needed());
        assert!(!transport.send("PING".into()));
        assert!(!transport.send_channel_text("hello"));
        transport.close();
        assert_eq!(transport.state(), State::Unconfigured);
        assert!(transport.poll_events().is_empty());
    }

    #[test]
    fn outbound_rate_limit() {
        let (mut transport, rx) = Transport::open_for_test(&connection());
        let now = Instant::now();

        assert!(transport.send_channel_text_at("one", now));
        assert!(!transport.send_channel_text_at("two", now + Duration::from_millis(999)));
        assert!(transport.send_direct_text_at("alice", "three", now + Duration::from_secs(1)));
        assert!(!transport.send_direct_text_at("alice", "four", now + Duration::from_secs(1)));

        assert_eq!(rx.try_recv().unwrap(), "PRIVMSG #museun :one");
        assert_eq!(rx.try_recv().unwrap(), "PRIVMSG #museun :/w alice three");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn raw_sends_are_not_limited() {
        let (mut transport, rx) = Transport::open_for_test(&connection());
        assert!(transport.send("PING :a".into()));
        assert!(transport.send("PING :b".into()));
        assert_eq!(rx.len(), 2);
    }

    #[test]
    fn replies_follow_scope() {
        let (mut transport, rx) = Transport::open_for_test(&connection());
        let now = Instant::now();

        let msg = TestMessage::new("!rep").user("Alice").build();
        assert!(transport.reply_to_at(&msg, "you have 3 rep", now));

        let msg = TestMessage::new("!rep").user("Alice").whisper().build();
        assert!(transport.reply_to_at(&msg, "you have 3 rep", now + Duration::from_secs(2)));

        assert_eq!(rx.try_recv().unwrap(), "PRIVMSG #museun :you have 3 rep");
        assert_eq!(
            rx.try_recv().unwrap(),
            "PRIVMSG #museun :/w Alice you have 3 rep"
        );
    }

    #[test]
    fn refused_connection_is_an_error() {
        // bind then drop to get a port nothing listens on
        let addr = TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap();

        let executor = Executor::shared();
        let mut transport = Transport::open(
            &connection(),
            Arc::new(TcpConnector::new(addr.to_string())),
            executor,
        );

        assert!(transport.reconnect_if_needed());
        assert_eq!(transport.state(), State::Connecting);
        assert!(!transport.reconnect_if_needed());

        assert!(matches!(
            transport.next_event(Duration::from_secs(1)),
            Some(Event::Reconnect)
        ));
        assert!(matches!(
            transport.next_event(Duration::from_secs(5)),
            Some(Event::Error(..))
        ));
        assert_eq!(transport.state(), State::Error);
        assert!(!transport.send("PING".into()));
    }

    #[test]
    fn full_session() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let server = std::thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            futures_lite::future::block_on(async move {
                let stream = async_io::Async::new(stream).unwrap();
                let mut lines = BufReader::new(&stream).lines();

                let mut handshake = vec![];
                for _ in 0..4 {
                    handshake.push(lines.next().await.unwrap().unwrap());
                }

                let mut writer = &stream;
                writer
                    .write_all(
                        b"PING :tmi.twitch.tv\r\n\
                          :alice!alice@alice.tmi.twitch.tv JOIN #museun\r\n\
                          @badges=moderator/1;display-name=Alice :alice!alice@alice.tmi.twitch.tv PRIVMSG #museun :!join\r\n\
                          @badges=;display-name=Alice :alice!alice@alice.tmi.twitch.tv PRIVMSG #museun :hello\r\n",
                    )
                    .await
                    .unwrap();

                let pong = lines.next().await.unwrap().unwrap();
                let said = lines.next().await.unwrap().unwrap();
                (handshake, pong, said)
            })
        });

        let executor = Executor::shared();
        let mut transport = Transport::open(
            &connection(),
            Arc::new(TcpConnector::new(addr.to_string())),
            executor,
        );
        assert!(transport.reconnect_if_needed());

        let mut events = vec![];
        while events.len() < 5 {
            match transport.next_event(Duration::from_secs(5)) {
                Some(event) => events.push(event),
                None => panic!("timed out, got: {:?}", events),
            }
        }

        assert!(matches!(events[0], Event::Reconnect));
        assert!(matches!(events[1], Event::Opened));
        assert!(matches!(&events[2], Event::Join(name) if name == "alice"));
        assert!(matches!(&events[3], Event::Command(msg) if msg.command() == Some("!join")));
        assert!(matches!(&events[4], Event::Message(msg) if msg.body() == "hello"));
        assert!(transport.is_connected());

        assert!(transport.send_channel_text("welcome alice"));

        let (handshake, pong, said) = server.join().unwrap();
        assert_eq!(
            handshake,
            vec![
                "CAP REQ :twitch.tv/tags twitch.tv/commands twitch.tv/membership",
                "PASS oauth:abcdef",
                "NICK shaken_bot",
                "JOIN #museun",
            ]
        );
        assert_eq!(pong, "PONG :tmi.twitch.tv");
        assert_eq!(said, "PRIVMSG #museun :welcome alice");

        // the server hung up
        assert!(matches!(
            transport.next_event(Duration::from_secs(5)),
            Some(Event::Closed(..))
        ));
        assert_eq!(transport.state(), State::Closed);
        assert!(transport.reconnect_if_needed());
        transport.close();
    }

    #[test]
    fn stale_events_are_dropped() {
        let (mut transport, _rx) = Transport::open_for_test(&connection());
        transport.inject(Event::Join("alice".into()));
        transport.inject(Event::Error("from the old session".into()));

        transport.close();
        assert_eq!(transport.state(), State::Disconnected);
        assert!(transport.reconnect_if_needed());

        let events = transport.poll_events();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], Event::Reconnect));
        assert_eq!(transport.state(), State::Connecting);
    }

    #[test]
    fn invalid_utf8_lines_are_skipped() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let server = std::thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            futures_lite::future::block_on(async move {
                let stream = async_io::Async::new(stream).unwrap();
                let mut lines = BufReader::new(&stream).lines();
                for _ in 0..4 {
                    lines.next().await.unwrap().unwrap();
                }

                let mut writer = &stream;
                writer
                    .write_all(
                        b"@badges=;display-name=Alice :alice!alice@alice.tmi.twitch.tv PRIVMSG #museun :bad \xff\xfe byte\r\n\
                          @badges=;display-name=Alice :alice!alice@alice.tmi.twitch.tv PRIVMSG #museun :!join\r\n",
                    )
                    .await
                    .unwrap();

                // hold the connection open until the client is done
                let _ = lines.next().await;
            })
        });

        let mut transport = Transport::open(
            &connection(),
            Arc::new(TcpConnector::new(addr.to_string())),
            Executor::shared(),
        );
        assert!(transport.reconnect_if_needed());

        let mut events = vec![];
        while events.len() < 3 {
            match transport.next_event(Duration::from_secs(5)) {
                Some(event) => events.push(event),
                None => panic!("timed out, got: {:?}", events),
            }
        }

        assert!(matches!(events[0], Event::Reconnect));
        assert!(matches!(events[1], Event::Opened));
        assert!(matches!(&events[2], Event::Command(msg) if msg.command() == Some("!join")));
        assert_eq!(transport.state(), State::Open);

        transport.close();
        server.join().unwrap();
    }
}
