/// The `@key=value;key=value` block that prefixes a tagged line.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Tags<'a> {
    raw: &'a str,
}

impl<'a> Tags<'a> {
    /// Splits the tag block off of `line`, returning it and the remainder.
    pub fn split(line: &'a str) -> (Self, &'a str) {
        if !line.starts_with('@') {
            return (Self::default(), line);
        }

        match line.find(' ') {
            Some(pos) => (Self { raw: &line[1..pos] }, line[pos + 1..].trim_start()),
            None => (Self { raw: &line[1..] }, ""),
        }
    }

    pub const fn raw(&self) -> &'a str {
        self.raw
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    /// Looks up the raw (still escaped) value for `key`.
    pub fn get(&self, key: &str) -> Option<&'a str> {
        self.iter().find(|&(k, _)| k == key).map(|(_, v)| v)
    }

    /// Looks up the value for `key` with IRCv3 escapes decoded.
    pub fn get_unescaped(&self, key: &str) -> Option<String> {
        self.get(key).map(unescape)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'a str, &'a str)> + 'a {
        self.raw
            .split_terminator(';')
            .filter(|s| !s.is_empty())
            .map(|pair| {
                let mut iter = pair.splitn(2, '=');
                let key = iter.next().unwrap_or_default();
                (key, iter.next().unwrap_or_default())
            })
    }
}

pub(crate) fn unescape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut iter = input.chars();
    while let Some(ch) = iter.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match iter.next() {
            Some('s') => out.push(' '),
            Some(':') => out.push(';'),
            Some('\\') => out.push('\\'),
            Some('r') => out.push('\r'),
            Some('n') => out.push('\n'),
            Some(other) => out.push(other),
            // a trailing backslash is dropped
            None => {}
        }
    }
    out
}
