//! Builders for outbound lines. None of these append the `\r\n` terminator.

/// The capabilities requested right after connecting.
pub const CAPABILITIES: &str = "CAP REQ :twitch.tv/tags twitch.tv/commands twitch.tv/membership";

/// The registration sequence, in the order it has to be sent.
pub fn handshake(oauth: &str, nick: &str, channel: &str) -> [String; 4] {
    let oauth = oauth.trim();
    let pass = if oauth.starts_with("oauth:") {
        format!("PASS {}", oauth)
    } else {
        format!("PASS oauth:{}", oauth)
    };

    [
        CAPABILITIES.to_string(),
        pass,
        format!("NICK {}", nick.trim().to_lowercase()),
        join(channel),
    ]
}

pub fn join(channel: &str) -> String {
    format!("JOIN #{}", bare_channel(channel))
}

pub fn pong(token: &str) -> String {
    if token.is_empty() {
        "PONG".to_string()
    } else {
        format!("PONG {}", token)
    }
}

pub fn privmsg(channel: &str, text: &str) -> String {
    format!("PRIVMSG #{} :{}", bare_channel(channel), text)
}

pub fn whisper(channel: &str, user: &str, text: &str) -> String {
    format!("PRIVMSG #{} :/w {} {}", bare_channel(channel), user, text)
}

/// Channel names are lowercase and without the leading `#`.
pub fn bare_channel(channel: &str) -> String {
    channel.trim().trim_start_matches('#').to_lowercase()
}
