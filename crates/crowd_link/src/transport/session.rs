use super::{
    connector::{BoxedReader, BoxedWriter, Connector},
    Event, CONNECT_TIMEOUT,
};
use crate::util::{FutExt as _, Left, Right};
use crowd_message::{encode, Line, MembershipKind};

use async_channel::{Receiver, Sender};
use futures_lite::{io::BufReader, AsyncBufReadExt as _, AsyncWriteExt as _};
use std::{io, sync::Arc};

/// What a single inbound line asks of the session.
#[derive(Debug)]
pub(super) enum Inbound {
    Reply(String),
    Events(Vec<Event>),
    Reconnect,
    Ignore,
}

pub(super) fn inbound(raw: &str) -> Inbound {
    match Line::classify(raw) {
        Line::Ping(token) => Inbound::Reply(encode::pong(&token)),
        Line::Membership(members) => Inbound::Events(
            members
                .into_iter()
                .map(|member| match member.kind {
                    MembershipKind::Join => Event::Join(member.name.into()),
                    MembershipKind::Part => Event::Part(member.name.into()),
                })
                .collect(),
        ),
        Line::Reconnect => Inbound::Reconnect,
        Line::Message(msg) if msg.is_command() => Inbound::Events(vec![Event::Command(msg)]),
        Line::Message(msg) => Inbound::Events(vec![Event::Message(msg)]),
        Line::Control => Inbound::Ignore,
    }
}

/// One connection attempt and everything read and written over it.
pub(super) struct Session {
    pub connector: Arc<dyn Connector>,
    pub handshake: [String; 4],
    pub outbound: (Sender<String>, Receiver<String>),
    pub events: Sender<(u64, Event)>,
    pub generation: u64,
}

impl Session {
    pub async fn run(self) {
        let Self {
            connector,
            handshake,
            outbound: (replies, outbound),
            events,
            generation,
        } = self;

        let emit = |event| {
            let _ = events.try_send((generation, event));
        };

        let stream = match connector.connect().timeout(CONNECT_TIMEOUT).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(err)) => {
                log::error!("cannot connect: {}", err);
                return emit(Event::Error(err.to_string()));
            }
            Err(err) => {
                log::error!("cannot connect: {}", err);
                return emit(Event::Error(err.to_string()));
            }
        };

        log::info!("connected (session {})", generation);
        emit(Event::Opened);

        let read = read_loop(stream.reader, &replies, &events, generation);
        let write = write_loop(stream.writer, handshake, outbound);

        let res = match read.first(write).await {
            Left(res) | Right(res) => res,
        };

        match res {
            Ok(reason) => emit(Event::Closed(reason)),
            Err(err) => {
                log::error!("connection failed: {}", err);
                emit(Event::Error(err.to_string()))
            }
        }
    }
}

async fn read_loop(
    reader: BoxedReader,
    replies: &Sender<String>,
    events: &Sender<(u64, Event)>,
    generation: u64,
) -> io::Result<String> {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            break;
        }

        let line = match std::str::from_utf8(&buf) {
            Ok(line) => line,
            Err(err) => {
                log::debug!("dropping a line that isn't utf-8: {}", err);
                continue;
            }
        };
        log::trace!("< {}", line.trim_end());

        match inbound(line) {
            Inbound::Reply(reply) => {
                if replies.send(reply).await.is_err() {
                    break;
                }
            }
            Inbound::Events(list) => {
                for event in list {
                    let _ = events.try_send((generation, event));
                }
            }
            Inbound::Reconnect => {
                log::info!("server asked us to reconnect");
                return Ok("server requested a reconnect".into());
            }
            Inbound::Ignore => {}
        }
    }
    Ok("connection closed".into())
}

async fn write_loop(
    mut writer: BoxedWriter,
    handshake: [String; 4],
    outbound: Receiver<String>,
) -> io::Result<String> {
    for line in handshake.iter() {
        write_line(&mut writer, line).await?;
    }

    while let Ok(line) = outbound.recv().await {
        write_line(&mut writer, &line).await?;
    }
    Ok("outbound channel closed".into())
}

async fn write_line(writer: &mut BoxedWriter, line: &str) -> io::Result<()> {
    if line.starts_with("PASS ") {
        log::trace!("> PASS ***");
    } else {
        log::trace!("> {}", line);
    }

    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\r\n").await?;
    writer.flush().await
}
