use crate::{
    announce::AnnounceThrottle,
    config::{Config, Messages},
    dispatch::{Dispatcher, WorkQueue},
    error::ProbeError,
    health::{HealthCheck, ProbeSlot, ProbeStatus},
    roles::{RoleBook, Transition},
    transport::{Connector, Event, Transport},
    util::Instant,
    viewer::{ActorId, PLAY_ROLE},
    Executor, Viewer, ViewerRegistry,
};
use crowd_message::Message;

use std::sync::Arc;

/// Ties the connection, the viewers and the command queue together.
///
/// Lives on the simulation thread and is driven by [`Integration::tick`].
pub struct Integration<C> {
    config: Config,
    transport: Transport,
    registry: ViewerRegistry,
    roles: RoleBook,
    dispatcher: Dispatcher<C>,
    announce: AnnounceThrottle,
    health: HealthCheck,
    probe: ProbeSlot,
    probe_status: Option<ProbeStatus>,
    connector: Arc<dyn Connector>,
    executor: Executor,
    pending_welcome: bool,
    players_changed: bool,
}

impl<C> Integration<C> {
    /// `None` if the integration is switched off.
    pub fn new(
        config: Config,
        connector: Arc<dyn Connector>,
        executor: Executor,
        dispatcher: Dispatcher<C>,
    ) -> Option<Self> {
        if !config.connection.active {
            log::info!("chat integration is inactive");
            return None;
        }

        let transport = Transport::open(
            &config.connection,
            Arc::clone(&connector),
            executor.clone(),
        );
        Some(Self::with_transport(
            config, transport, connector, executor, dispatcher,
        ))
    }

    fn with_transport(
        config: Config,
        transport: Transport,
        connector: Arc<dyn Connector>,
        executor: Executor,
        dispatcher: Dispatcher<C>,
    ) -> Self {
        Self {
            config,
            transport,
            registry: ViewerRegistry::default(),
            roles: RoleBook::default(),
            dispatcher,
            announce: AnnounceThrottle::new(),
            health: HealthCheck::default(),
            probe: ProbeSlot::default(),
            probe_status: None,
            connector,
            executor,
            pending_welcome: false,
            players_changed: false,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.transport.is_configured()
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    pub const fn config(&self) -> &Config {
        &self.config
    }

    pub const fn transport(&self) -> &Transport {
        &self.transport
    }

    pub const fn registry(&self) -> &ViewerRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut ViewerRegistry {
        &mut self.registry
    }

    pub const fn roles(&self) -> &RoleBook {
        &self.roles
    }

    pub const fn dispatcher(&self) -> &Dispatcher<C> {
        &self.dispatcher
    }

    pub fn dispatcher_mut(&mut self) -> &mut Dispatcher<C> {
        &mut self.dispatcher
    }

    pub fn player_count(&self) -> usize {
        self.registry.player_count()
    }

    pub fn start<Q>(&mut self, tick: u64, queue: &mut Q)
    where
        Q: WorkQueue<C>,
    {
        self.start_at(tick, Instant::now(), queue)
    }

    /// Loads viewers and roles, connects, and asks the simulation to bring
    /// back everybody who was playing.
    pub fn start_at<Q>(&mut self, tick: u64, now: Instant, queue: &mut Q)
    where
        Q: WorkQueue<C>,
    {
        if !self.is_configured() {
            log::warn!("chat integration is not configured");
            return;
        }

        self.roles = RoleBook::load(&self.config.files.roles);
        self.registry = ViewerRegistry::load(&self.config.files.viewers);
        self.announce = AnnounceThrottle::new_at(now);

        self.transport.reconnect_if_needed();
        self.pending_welcome = true;

        let Self {
            registry,
            dispatcher,
            players_changed,
            ..
        } = self;

        for viewer in registry.iter_mut().filter(|v| v.has_role(PLAY_ROLE)) {
            log::debug!("rejoining viewer: {}", viewer.name());
            viewer.remove_role(PLAY_ROLE);
            viewer.unbind();
            dispatcher.rejoin(viewer, tick, queue);
            *players_changed = true;
        }
    }

    pub fn tick<Q>(&mut self, tick: u64, queue: &mut Q) -> Vec<Event>
    where
        Q: WorkQueue<C>,
    {
        self.tick_at(tick, Instant::now(), queue)
    }

    /// Handles everything the connection produced since the last tick, then
    /// runs the periodic health check. The events are returned for the host,
    /// followed by [`Event::PlayersChanged`] when viewers were added or bound
    /// or unbound since the last tick.
    pub fn tick_at<Q>(&mut self, tick: u64, now: Instant, queue: &mut Q) -> Vec<Event>
    where
        Q: WorkQueue<C>,
    {
        let known = self.registry.len();
        let mut events = self.transport.poll_events();
        for event in &events {
            match event {
                Event::Opened if self.pending_welcome => {
                    self.pending_welcome = false;
                    self.announce_at(now);
                }
                Event::Join(name) => self.on_join_at(name, now),
                Event::Part(name) => self.on_part_at(name, tick, now, queue),
                Event::Message(msg) if msg.is_public() => {
                    if self.announce.on_public_message_at(now) {
                        self.send_banner_at(now);
                    }
                }
                Event::Command(msg) => {
                    let res = self.dispatcher.dispatch(
                        msg,
                        &mut self.registry,
                        &self.roles,
                        tick,
                        queue,
                    );
                    log::trace!("{:?}: {}", res, msg.body());
                }
                _ => {}
            }
        }

        if self.health.due(tick) {
            self.check_health_at(now);
        }

        if let Some(status) = self.poll_test_at(now) {
            self.probe_status.replace(status);
        }

        if self.registry.len() != known {
            self.players_changed = true;
        }
        if std::mem::take(&mut self.players_changed) {
            events.push(Event::PlayersChanged(self.player_count()));
        }
        events
    }

    fn check_health_at(&mut self, now: Instant) {
        self.transport.reconnect_if_needed();
        for (name, role, transition) in self.registry.accrue_active_at(now, &self.roles) {
            match transition {
                Transition::Granted => log::info!("{} is now '{}'", name, role),
                Transition::Revoked => log::info!("{} is no longer '{}'", name, role),
            }
        }
    }

    fn on_join_at(&mut self, name: &str, now: Instant) {
        if name.eq_ignore_ascii_case(self.transport.bot_name()) {
            return;
        }

        if let Some(viewer) = self.registry.find(name) {
            let text = Messages::render(&self.config.messages.returned, viewer.name());
            self.transport.send_channel_text_at(&text, now);
            return;
        }

        if self.announce.join_due_at(now) {
            self.announce_at(now);
        }
    }

    fn on_part_at<Q>(&mut self, name: &str, tick: u64, now: Instant, queue: &mut Q)
    where
        Q: WorkQueue<C>,
    {
        let viewer = match self.registry.find_mut(name) {
            Some(viewer) if viewer.is_active() => viewer,
            _ => return,
        };

        let text = Messages::render(&self.config.messages.left, viewer.name());
        self.dispatcher.part(viewer, tick, queue);
        self.transport.send_channel_text_at(&text, now);
    }

    fn announce_at(&mut self, now: Instant) {
        self.announce.fire_at(now);
        self.send_banner_at(now);
    }

    fn send_banner_at(&mut self, now: Instant) {
        let text = format!("/me {}", self.config.messages.welcome);
        self.transport.send_channel_text_at(&text, now);
    }

    /// Answers `msg` where it was sent.
    pub fn reply(&mut self, msg: &Message, text: &str) -> bool {
        self.transport.reply_to(msg, text)
    }

    pub fn reply_at(&mut self, msg: &Message, text: &str, now: Instant) -> bool {
        self.transport.reply_to_at(msg, text, now)
    }

    pub fn say(&mut self, text: &str) -> bool {
        self.transport.send_channel_text(text)
    }

    pub fn help(&mut self, msg: &Message) -> bool {
        self.help_at(msg, Instant::now())
    }

    /// Replies with the command list (or one command's help).
    pub fn help_at(&mut self, msg: &Message, now: Instant) -> bool {
        self.announce.reset_messages();
        let text = self.dispatcher.help(msg.args());
        self.transport.reply_to_at(msg, &text, now)
    }

    pub fn reputation_line(&self, name: &str) -> Option<String> {
        let viewer = self.registry.find(name)?;
        let line = match viewer.privilege_label() {
            Some(label) => format!(
                "{} ({}) has {:.1} reputation",
                viewer.name(),
                label,
                viewer.reputation()
            ),
            None => format!("{} has {:.1} reputation", viewer.name(), viewer.reputation()),
        };
        Some(line)
    }

    /// Replies with the reputation of the viewer named in the arguments, or of the sender.
    pub fn post_reputation_at(&mut self, msg: &Message, now: Instant) -> bool {
        let name = match msg.args().or_else(|| msg.sender()).or_else(|| msg.login()) {
            Some(name) => name,
            None => return false,
        };

        match self.reputation_line(name) {
            Some(line) => self.transport.reply_to_at(msg, &line, now),
            None => false,
        }
    }

    pub fn viewer(&self, name: &str) -> Option<&Viewer> {
        self.registry.find(name)
    }

    pub fn viewer_mut(&mut self, name: &str) -> Option<&mut Viewer> {
        self.registry.find_mut(name)
    }

    /// Marks a viewer as playing through `actor`.
    pub fn bind(&mut self, name: &str, actor: ActorId) -> bool {
        match self.registry.find_mut(name) {
            Some(viewer) => {
                viewer.bind(actor);
                viewer.add_role(PLAY_ROLE);
                self.players_changed = true;
                true
            }
            None => false,
        }
    }

    pub fn unbind(&mut self, name: &str) -> Option<ActorId> {
        let viewer = self.registry.find_mut(name)?;
        viewer.remove_role(PLAY_ROLE);
        self.players_changed = true;
        viewer.unbind()
    }

    pub fn test_configuration(&mut self) -> Result<(), ProbeError> {
        self.test_configuration_at(Instant::now())
    }

    /// Starts a throwaway connection that posts the configured test message.
    /// Only one can run at a time.
    pub fn test_configuration_at(&mut self, now: Instant) -> Result<(), ProbeError> {
        self.probe_status.take();
        self.probe.start_at(
            &self.config.connection,
            Arc::clone(&self.connector),
            self.executor.clone(),
            self.config.messages.test.clone(),
            now,
        )
    }

    pub fn poll_test(&mut self) -> Option<ProbeStatus> {
        self.poll_test_at(Instant::now())
    }

    /// Checks on a running configuration test without touching the main connection.
    pub fn poll_test_at(&mut self, now: Instant) -> Option<ProbeStatus> {
        self.probe.poll_at(now)
    }

    /// The outcome of the last configuration test that finished during a tick, once.
    pub fn take_probe_status(&mut self) -> Option<ProbeStatus> {
        self.probe_status.take()
    }

    /// Saves the viewers and hangs up.
    pub fn shutdown(&mut self) {
        self.probe.cancel();
        if !self.registry.is_empty() {
            let path = &self.config.files.viewers;
            match self.registry.save(path) {
                Ok(()) => log::info!(
                    "saved {} viewer(s) to '{}'",
                    self.registry.len(),
                    path.display()
                ),
                Err(err) => log::error!("cannot save '{}': {:#}", path.display(), err),
            }
        }
        self.transport.close();
    }
}

#[cfg(test)]
impl<C> Integration<C> {
    fn for_test(config: Config, dispatcher: Dispatcher<C>) -> (Self, async_channel::Receiver<String>) {
        let (transport, rx) = Transport::open_for_test(&config.connection);
        let connector = Arc::new(crate::transport::TcpConnector::new("127.0.0.1:1"));
        let this = Self::with_transport(config, transport, connector, Executor::shared(), dispatcher);
        (this, rx)
    }
}
