/// Marks a command outcome nobody needs to hear about.
#[derive(Debug)]
pub struct Ignored;

impl std::fmt::Display for Ignored {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ignored")
    }
}

impl std::error::Error for Ignored {}

pub trait Ignore<T> {
    fn or_ignore(self) -> anyhow::Result<T>;
}

impl<T> Ignore<T> for Option<T> {
    fn or_ignore(self) -> anyhow::Result<T> {
        self.ok_or_else(|| Ignored.into())
    }
}

pub fn ignored<T>() -> anyhow::Result<T> {
    Err(Ignored.into())
}

pub fn is_real_error<T>(res: anyhow::Result<T>) -> Option<anyhow::Error> {
    match res {
        Ok(..) => None,
        Err(err) if err.is::<Ignored>() => None,
        Err(err) => Some(err),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeError {
    AlreadyRunning,
}

impl std::fmt::Display for ProbeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AlreadyRunning => f.write_str("a configuration test is already running"),
        }
    }
}

impl std::error::Error for ProbeError {}
