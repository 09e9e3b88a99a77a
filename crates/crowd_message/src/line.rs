use crate::{Message, Tags};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum MembershipKind {
    Join,
    Part,
}

/// Someone entering or leaving the channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Membership {
    pub kind: MembershipKind,
    pub name: Box<str>,
    pub channel: Box<str>,
}

impl Membership {
    /// Parses a single `:nick!nick@host JOIN #channel` line.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim_end_matches(|c| c == '\r' || c == '\n');
        let rest = line.strip_prefix(':')?;

        let mut parts = rest.split(' ').filter(|s| !s.is_empty());
        let prefix = parts.next()?;
        let kind = match parts.next()? {
            "JOIN" => MembershipKind::Join,
            "PART" => MembershipKind::Part,
            _ => return None,
        };

        let name = match prefix.find('!') {
            Some(pos) => &prefix[..pos],
            None => prefix,
        };
        if name.is_empty() {
            return None;
        }

        Some(Self {
            kind,
            name: name.into(),
            channel: parts.next().unwrap_or_default().into(),
        })
    }

    /// Parses every membership line packed into a single delivery.
    pub fn parse_many(data: &str) -> Vec<Self> {
        data.split('\n').filter_map(Self::parse).collect()
    }
}

/// What a raw line turned out to be, decided before any message parsing.
#[derive(Clone, Debug)]
pub enum Line {
    /// A keepalive probe; the payload must be echoed back in a `PONG`.
    Ping(Box<str>),
    /// One or more joins/parts.
    Membership(Vec<Membership>),
    /// The server asked us to reconnect.
    Reconnect,
    /// A public or direct chat message.
    Message(Message),
    /// Everything else (numerics, capability acks, notices, ...).
    Control,
}

impl Line {
    pub fn classify(raw: &str) -> Self {
        let raw = raw.trim_end_matches(|c| c == '\r' || c == '\n');

        if let Some(rest) = raw.strip_prefix("PING") {
            return Self::Ping(rest.trim().into());
        }

        if raw.starts_with(':') {
            let members = Membership::parse_many(raw);
            if !members.is_empty() {
                return Self::Membership(members);
            }
        }

        if Self::verb(raw) == Some("RECONNECT") {
            return Self::Reconnect;
        }

        match Message::parse(raw) {
            Some(msg) => Self::Message(msg),
            None => Self::Control,
        }
    }

    fn verb(raw: &str) -> Option<&str> {
        let (_, rest) = Tags::split(raw);
        let mut parts = rest.split(' ').filter(|s| !s.is_empty());
        let first = parts.next()?;
        if first.starts_with(':') {
            parts.next()
        } else {
            Some(first)
        }
    }
}
