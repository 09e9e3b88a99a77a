use crowd_link::{
    error::{ignored, Ignore as _},
    ActorId, CommandEnvelope, Dispatcher, Integration, Message, Viewer,
};
use std::collections::BTreeMap;

/// What a chat command asks the world to do.
#[derive(Debug, Clone)]
pub enum Action {
    Help(Message),
    Rep(Message),
    Join,
    Rejoin,
    Leave,
    Say(Option<String>),
    Me(Message),
}

pub fn dispatcher() -> Dispatcher<Action> {
    let mut dispatcher = Dispatcher::default();
    dispatcher.register(
        "!help",
        |msg, _| Action::Help(msg.clone()),
        Some("!help <command?> lists the commands, or explains one"),
    );
    dispatcher.register(
        "!rep",
        |msg, _| Action::Rep(msg.clone()),
        Some("!rep <name?> shows how much reputation someone has"),
    );
    dispatcher.register(
        "!join",
        |_, _| Action::Join,
        Some("!join sends a drone into the colony for you"),
    );
    dispatcher.register(
        "!leave",
        |_, _| Action::Leave,
        Some("!leave takes your drone out of the colony"),
    );
    dispatcher.register(
        "!say",
        |msg, _| Action::Say(msg.args().map(ToString::to_string)),
        Some("!say <text> makes your drone say something"),
    );
    dispatcher.register(
        "!me",
        |msg, _| Action::Me(msg.clone()),
        Some("!me shows your standing and roles"),
    );

    dispatcher.on_part(|_| Action::Leave);
    dispatcher.on_rejoin(|_| Action::Rejoin);
    dispatcher
}

#[derive(Debug)]
struct Drone {
    owner: String,
    position: (i32, i32),
}

/// A toy colony of drones, one per playing viewer.
#[derive(Debug, Default)]
pub struct World {
    drones: BTreeMap<u64, Drone>,
    next_id: u64,
}

impl World {
    pub fn len(&self) -> usize {
        self.drones.len()
    }

    pub fn run(
        &mut self,
        integration: &mut Integration<Action>,
        CommandEnvelope { viewer, command, .. }: CommandEnvelope<Action>,
    ) -> anyhow::Result<()> {
        match command {
            Action::Help(msg) => {
                integration.help(&msg);
                Ok(())
            }

            Action::Rep(msg) => {
                let line = msg
                    .args()
                    .or_else(|| Some(&*viewer))
                    .and_then(|name| integration.reputation_line(name))
                    .or_ignore()?;
                integration.reply(&msg, &line);
                Ok(())
            }

            Action::Join => {
                let id = self.spawn(integration, &viewer)?;
                integration.say(&format!("{} joined as drone #{}", viewer, id.0));
                Ok(())
            }

            Action::Rejoin => self.spawn(integration, &viewer).map(drop),

            Action::Leave => {
                let id = integration.unbind(&viewer).or_ignore()?;
                self.drones.remove(&id.0);
                log::info!("{} left, removed drone #{}", viewer, id.0);
                Ok(())
            }

            Action::Say(text) => {
                let text = text.or_ignore()?;
                let id = integration
                    .viewer(&viewer)
                    .and_then(Viewer::binding)
                    .or_ignore()?;
                let drone = self.drones.get(&id.0).or_ignore()?;
                log::info!("drone #{} at {:?}: {}", id.0, drone.position, text);
                Ok(())
            }

            Action::Me(msg) => {
                let line = integration
                    .viewer(&viewer)
                    .map(describe)
                    .or_ignore()?;
                integration.reply(&msg, &line);
                Ok(())
            }
        }
    }

    fn spawn(&mut self, integration: &mut Integration<Action>, name: &str) -> anyhow::Result<ActorId> {
        if integration.viewer(name).map_or(false, Viewer::is_bound) {
            return ignored();
        }

        self.next_id += 1;
        let id = ActorId(self.next_id);
        if !integration.bind(name, id) {
            return ignored();
        }

        self.drones.insert(
            id.0,
            Drone {
                owner: name.to_string(),
                position: (0, 0),
            },
        );
        log::info!("spawned drone #{} for {}", id.0, name);
        Ok(id)
    }

    /// Every drone wanders one step.
    pub fn step(&mut self) {
        for drone in self.drones.values_mut() {
            let (x, y) = &mut drone.position;
            match fastrand::u8(0..4) {
                0 => *x += 1,
                1 => *x -= 1,
                2 => *y += 1,
                _ => *y -= 1,
            }
            log::trace!("{} is at {},{}", drone.owner, x, y);
        }
    }
}

fn describe(viewer: &Viewer) -> String {
    let roles = viewer.roles().iter().collect::<Vec<_>>();
    let roles = if roles.is_empty() {
        "no roles".to_string()
    } else {
        roles.join(", ")
    };

    match viewer.privilege_label() {
        Some(label) => format!("{} ({}): {}", viewer.name(), label, roles),
        None => format!("{}: {}", viewer.name(), roles),
    }
}
