use crowd_message::Message;
use std::collections::BTreeMap;

/// Builds parsed chat lines for tests.
#[derive(Debug, Clone)]
pub struct TestMessage {
    tags: Option<BTreeMap<String, String>>,
    user: String,
    channel: String,
    data: String,
    whisper: bool,
}

impl TestMessage {
    pub fn new(data: impl Into<String>) -> Self {
        Self {
            tags: Some(BTreeMap::new()),
            user: "test_user".into(),
            channel: "#test_channel".into(),
            data: data.into(),
            whisper: false,
        }
    }

    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }

    pub fn channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = channel.into();
        self
    }

    pub fn whisper(mut self) -> Self {
        self.whisper = true;
        self
    }

    pub fn badge(self, badge: &str) -> Self {
        self.tag("badges", format!("{}/1", badge))
    }

    pub fn moderator(self) -> Self {
        self.badge("moderator")
    }

    pub fn broadcaster(self) -> Self {
        self.badge("broadcaster")
    }

    pub fn vip(self) -> Self {
        self.badge("vip")
    }

    pub fn tag(mut self, key: &str, value: impl Into<String>) -> Self {
        self.tags
            .get_or_insert_with(BTreeMap::new)
            .insert(key.to_string(), value.into());
        self
    }

    /// No tag block, so no `display-name` either.
    pub fn without_tags(mut self) -> Self {
        self.tags.take();
        self
    }

    pub fn raw(&self) -> String {
        let login = self.user.to_lowercase();
        let (verb, target) = if self.whisper {
            ("WHISPER", "shaken_bot")
        } else {
            ("PRIVMSG", &*self.channel)
        };

        let line = format!(
            ":{login}!{login}@{login}.tmi.twitch.tv {verb} {target} :{data}",
            login = login,
            verb = verb,
            target = target,
            data = self.data
        );

        let mut tags = match &self.tags {
            Some(tags) => tags.clone(),
            None => return line,
        };
        tags.entry("display-name".into())
            .or_insert_with(|| self.user.clone());

        let tags = tags.iter().fold(String::new(), |mut a, (k, v)| {
            a.push(if a.is_empty() { '@' } else { ';' });
            a.push_str(k);
            a.push('=');
            a.push_str(v);
            a
        });
        format!("{} {}", tags, line)
    }

    pub fn build(&self) -> Message {
        let raw = self.raw();
        match Message::parse(raw.clone()) {
            Some(msg) => msg,
            None => panic!("not a message: {}", raw),
        }
    }
}
