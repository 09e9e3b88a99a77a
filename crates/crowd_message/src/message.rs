use crate::{Privileges, Tags, LEADER};

use std::{ops::Range, sync::OnceLock};

/// Where a message was sent.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Scope {
    /// A `PRIVMSG` to the joined channel.
    Public,
    /// A `WHISPER` sent directly to the bot.
    Direct,
}

impl Scope {
    fn from_verb(verb: &str) -> Option<Self> {
        match verb {
            "PRIVMSG" => Some(Self::Public),
            "WHISPER" => Some(Self::Direct),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Default)]
struct Split {
    command: Range<usize>,
    args: Option<Range<usize>>,
}

/// A chat message decoded from a single raw line.
///
/// The sender and the command split are computed on first use and then cached
/// for the lifetime of the message.
#[derive(Clone, Debug)]
pub struct Message {
    raw: Box<str>,
    scope: Scope,
    prefix: Range<usize>,
    target: Range<usize>,
    body: Range<usize>,
    sender: OnceLock<Option<Box<str>>>,
    split: OnceLock<Option<Split>>,
}

impl Message {
    /// Parses a raw line. Anything that isn't a `PRIVMSG` or a `WHISPER`
    /// (numerics, notices, membership, ...) yields `None`.
    pub fn parse(raw: impl Into<Box<str>>) -> Option<Self> {
        let raw = raw.into();
        let (_, rest) = Tags::split(&raw);

        let (prefix, rest) = match rest.strip_prefix(':') {
            Some(rest) => match rest.find(' ') {
                Some(pos) => (&rest[..pos], rest[pos + 1..].trim_start()),
                None => return None,
            },
            None => ("", rest),
        };

        let (verb, rest) = match rest.find(' ') {
            Some(pos) => (&rest[..pos], rest[pos + 1..].trim_start()),
            None => (rest, ""),
        };
        let scope = Scope::from_verb(verb)?;

        let (target, body) = match rest.find(':') {
            Some(pos) => (rest[..pos].trim(), rest[pos + 1..].trim()),
            None => (rest.trim(), ""),
        };

        let (prefix, target, body) = (
            range_of(&raw, prefix),
            range_of(&raw, target),
            range_of(&raw, body),
        );

        Some(Self {
            raw,
            scope,
            prefix,
            target,
            body,
            sender: OnceLock::new(),
            split: OnceLock::new(),
        })
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub const fn scope(&self) -> Scope {
        self.scope
    }

    pub fn is_public(&self) -> bool {
        self.scope == Scope::Public
    }

    pub fn is_direct(&self) -> bool {
        self.scope == Scope::Direct
    }

    pub fn tags(&self) -> Tags<'_> {
        Tags::split(&self.raw).0
    }

    /// The message body, trimmed.
    pub fn body(&self) -> &str {
        &self.raw[self.body.clone()]
    }

    /// The channel (`#name`) for public messages, the bot's name for whispers.
    pub fn target(&self) -> &str {
        &self.raw[self.target.clone()]
    }

    /// The `display-name` tag. Empty or missing tags yield `None`.
    pub fn sender(&self) -> Option<&str> {
        self.sender
            .get_or_init(|| {
                self.tags()
                    .get_unescaped("display-name")
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .map(Into::into)
            })
            .as_deref()
    }

    /// The nick out of the `:nick!user@host` prefix.
    pub fn login(&self) -> Option<&str> {
        let prefix = &self.raw[self.prefix.clone()];
        let nick = match prefix.find('!') {
            Some(pos) => &prefix[..pos],
            None => prefix,
        };
        Some(nick).filter(|s| !s.is_empty())
    }

    pub fn is_command(&self) -> bool {
        self.body().starts_with(LEADER)
    }

    /// The first word of the body (including the leader) when this is a command.
    pub fn command(&self) -> Option<&str> {
        self.split()
            .map(|split| &self.body()[split.command.clone()])
    }

    /// Everything after the command token. `None` if the token was the whole body.
    pub fn args(&self) -> Option<&str> {
        self.split()
            .and_then(|split| split.args.clone())
            .map(|args| &self.body()[args])
    }

    /// Privileges from the `badges` tag.
    ///
    /// Whispers carry no usable badges, so they always yield `None`. A public
    /// message without the tag yields the default (no privileges).
    pub fn privileges(&self) -> Option<Privileges> {
        if self.is_direct() {
            return None;
        }

        let privileges = self
            .tags()
            .get("badges")
            .map(Privileges::from_badges)
            .unwrap_or_default();
        Some(privileges)
    }

    fn split(&self) -> Option<&Split> {
        self.split
            .get_or_init(|| {
                if !self.is_command() {
                    return None;
                }

                let body = self.body();
                let split = match body.find(' ') {
                    Some(pos) => {
                        let rest = &body[pos + 1..];
                        let args = rest.trim();
                        let start = pos + 1 + (rest.len() - rest.trim_start().len());
                        Split {
                            command: 0..pos,
                            args: Some(start..start + args.len()).filter(|r| !r.is_empty()),
                        }
                    }
                    None => Split {
                        command: 0..body.len(),
                        args: None,
                    },
                };
                Some(split)
            })
            .as_ref()
    }
}

fn range_of(haystack: &str, needle: &str) -> Range<usize> {
    if needle.is_empty() {
        return 0..0;
    }
    let start = needle.as_ptr() as usize - haystack.as_ptr() as usize;
    start..start + needle.len()
}
