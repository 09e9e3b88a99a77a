use crate::{roles::RoleBook, ViewerRegistry, Viewer};
use crowd_message::{Message, LEADER};

use std::collections::{BTreeMap, HashMap, VecDeque};

/// Builds a command value for a message from a viewer.
pub type Factory<C> = Box<dyn Fn(&Message, &Viewer) -> C + Send>;

/// Builds a command value for a viewer without a message (parts, rejoins).
pub type ViewerHook<C> = Box<dyn Fn(&Viewer) -> C + Send>;

/// A command accepted for execution on the simulation thread.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandEnvelope<C> {
    pub tick: u64,
    pub viewer: String,
    pub command: C,
}

/// The simulation's own execution queue. The dispatcher only ever pushes onto it.
pub trait WorkQueue<C> {
    fn enqueue(&mut self, envelope: CommandEnvelope<C>);
}

impl<C> WorkQueue<C> for VecDeque<CommandEnvelope<C>> {
    fn enqueue(&mut self, envelope: CommandEnvelope<C>) {
        self.push_back(envelope)
    }
}

impl<C> WorkQueue<C> for Vec<CommandEnvelope<C>> {
    fn enqueue(&mut self, envelope: CommandEnvelope<C>) {
        self.push(envelope)
    }
}

/// At most `cap` commands per viewer within a sliding window of `window` ticks.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Throttle {
    pub window: u64,
    pub cap: usize,
}

impl Default for Throttle {
    fn default() -> Self {
        Self {
            window: 100,
            cap: 10,
        }
    }
}

impl Throttle {
    /// Prunes expired ticks from `history` and records `tick` if there's room.
    pub fn admit(&self, history: &mut VecDeque<u64>, tick: u64) -> bool {
        while let Some(&oldest) = history.front() {
            if oldest.saturating_add(self.window) > tick {
                break;
            }
            history.pop_front();
        }

        if history.len() >= self.cap {
            return false;
        }
        history.push_back(tick);
        true
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Dispatched {
    Enqueued,
    Throttled,
    Unknown,
    NotCommand,
    NoSender,
}

/// Maps command tokens to factories and feeds accepted commands to the queue.
pub struct Dispatcher<C> {
    commands: HashMap<String, Factory<C>>,
    help: BTreeMap<String, String>,
    throttle: Throttle,
    on_part: Option<ViewerHook<C>>,
    on_rejoin: Option<ViewerHook<C>>,
}

impl<C> Default for Dispatcher<C> {
    fn default() -> Self {
        Self {
            commands: HashMap::new(),
            help: BTreeMap::new(),
            throttle: Throttle::default(),
            on_part: None,
            on_rejoin: None,
        }
    }
}

impl<C> Dispatcher<C> {
    pub fn with_throttle(mut self, throttle: Throttle) -> Self {
        self.throttle = throttle;
        self
    }

    pub const fn throttle(&self) -> Throttle {
        self.throttle
    }

    /// Registers `token` (e.g. `!join`). Registering it again replaces it.
    pub fn register<F>(&mut self, token: &str, factory: F, help: Option<&str>)
    where
        F: Fn(&Message, &Viewer) -> C + Send + 'static,
    {
        log::debug!("adding command: {}", token);
        self.commands.insert(token.to_string(), Box::new(factory));
        match help.map(str::trim).filter(|s| !s.is_empty()) {
            Some(help) => self.help.insert(token.to_string(), help.to_string()),
            None => self.help.remove(token),
        };
    }

    /// The command to enqueue when an active viewer leaves the channel.
    pub fn on_part<F>(&mut self, hook: F)
    where
        F: Fn(&Viewer) -> C + Send + 'static,
    {
        self.on_part.replace(Box::new(hook));
    }

    /// The command to enqueue for a restored viewer that was playing.
    pub fn on_rejoin<F>(&mut self, hook: F)
    where
        F: Fn(&Viewer) -> C + Send + 'static,
    {
        self.on_rejoin.replace(Box::new(hook));
    }

    pub fn contains(&self, token: &str) -> bool {
        self.commands.contains_key(token)
    }

    /// Every registered token, sorted.
    pub fn tokens(&self) -> Vec<&str> {
        let mut tokens = self.commands.keys().map(|s| &**s).collect::<Vec<_>>();
        tokens.sort_unstable();
        tokens
    }

    /// Resolves the sender and, for a known token, throttles and enqueues the command.
    pub fn dispatch<Q>(
        &self,
        msg: &Message,
        registry: &mut ViewerRegistry,
        roles: &RoleBook,
        tick: u64,
        queue: &mut Q,
    ) -> Dispatched
    where
        Q: WorkQueue<C>,
    {
        let token = match msg.command() {
            Some(token) => token,
            None => return Dispatched::NotCommand,
        };

        let name = match msg.sender().or_else(|| msg.login()) {
            Some(name) => name,
            None => {
                log::debug!("dropping command without a sender: {}", msg.raw());
                return Dispatched::NoSender;
            }
        };

        let privileges = msg.privileges().unwrap_or_default();
        let (viewer, _) = registry.find_or_create(name, privileges, roles);

        let factory = match self.commands.get(token) {
            Some(factory) => factory,
            None => return Dispatched::Unknown,
        };

        let command = factory(msg, viewer);
        self.enqueue(viewer, tick, command, queue)
    }

    /// Builds the part command for `viewer`, if one is registered.
    pub fn part<Q>(&self, viewer: &mut Viewer, tick: u64, queue: &mut Q) -> Option<Dispatched>
    where
        Q: WorkQueue<C>,
    {
        let command = (self.on_part.as_ref()?)(viewer);
        Some(self.enqueue(viewer, tick, command, queue))
    }

    /// Builds the rejoin command for `viewer`, if one is registered.
    pub fn rejoin<Q>(&self, viewer: &mut Viewer, tick: u64, queue: &mut Q) -> Option<Dispatched>
    where
        Q: WorkQueue<C>,
    {
        let command = (self.on_rejoin.as_ref()?)(viewer);
        Some(self.enqueue(viewer, tick, command, queue))
    }

    fn enqueue<Q>(&self, viewer: &mut Viewer, tick: u64, command: C, queue: &mut Q) -> Dispatched
    where
        Q: WorkQueue<C>,
    {
        if !self.throttle.admit(viewer.history_mut(), tick) {
            log::warn!(
                "command throttled for {}: more than {} commands in the last {} ticks",
                viewer.name(),
                self.throttle.cap,
                self.throttle.window
            );
            return Dispatched::Throttled;
        }

        queue.enqueue(CommandEnvelope {
            tick,
            viewer: viewer.name().to_string(),
            command,
        });
        Dispatched::Enqueued
    }

    /// Without an argument, a line listing every token. With one, the help for
    /// that token (with or without the leader).
    pub fn help(&self, args: Option<&str>) -> String {
        let search = match args.map(str::trim).filter(|s| !s.is_empty()) {
            Some(search) => search,
            None => return format!("commands: {}", self.tokens().join(" • ")),
        };

        self.help
            .get(search)
            .or_else(|| self.help.get(&format!("{}{}", LEADER, search)))
            .cloned()
            .unwrap_or_else(|| format!("I don't know what '{}' is", search))
    }
}
