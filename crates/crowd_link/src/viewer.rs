use crate::util::{elapsed_between, Instant};
use crowd_message::Privileges;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, VecDeque};

/// The role that marks a viewer as taking part in the simulation.
pub const PLAY_ROLE: &str = "play";

/// Reputation gained per second of wall-clock time while active.
pub const REPUTATION_PER_SECOND: f64 = 0.1;

/// A handle to an in-world actor owned by the simulation.
///
/// The integration never dereferences it; the actor may already be gone.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ActorId(pub u64);

/// A set of role names. Order carries no meaning.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Roles(BTreeSet<String>);

impl Roles {
    /// Returns whether the role was newly added.
    pub fn add(&mut self, role: &str) -> bool {
        self.0.insert(role.to_string())
    }

    /// Returns whether the role was present.
    pub fn remove(&mut self, role: &str) -> bool {
        self.0.remove(role)
    }

    pub fn contains(&self, role: &str) -> bool {
        self.0.contains(role)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> + '_ {
        self.0.iter().map(|s| &**s)
    }
}

/// A long-lived identity for a chat participant.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Viewer {
    name: String,
    reputation: f64,
    #[serde(default)]
    roles: Roles,
    #[serde(rename = "isBroadcaster", default)]
    is_broadcaster: bool,
    #[serde(rename = "isVIP", default)]
    is_vip: bool,
    #[serde(rename = "isMod", default)]
    is_mod: bool,

    #[serde(skip)]
    binding: Option<ActorId>,
    #[serde(skip)]
    last_accrual: Option<Instant>,
    #[serde(skip)]
    history: VecDeque<u64>,
}

impl PartialEq for Viewer {
    // runtime state doesn't take part
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.reputation == other.reputation
            && self.roles == other.roles
            && self.privileges() == other.privileges()
    }
}

impl Viewer {
    pub fn new(name: impl Into<String>, privileges: Privileges) -> Self {
        let mut this = Self {
            name: name.into(),
            reputation: 0.0,
            roles: Roles::default(),
            is_broadcaster: false,
            is_vip: false,
            is_mod: false,
            binding: None,
            last_accrual: None,
            history: VecDeque::new(),
        };
        this.set_privileges(privileges);
        this
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub const fn reputation(&self) -> f64 {
        self.reputation
    }

    pub const fn privileges(&self) -> Privileges {
        Privileges {
            is_broadcaster: self.is_broadcaster,
            is_vip: self.is_vip,
            is_moderator: self.is_mod,
        }
    }

    pub fn set_privileges(&mut self, privileges: Privileges) {
        self.is_broadcaster = privileges.is_broadcaster;
        self.is_vip = privileges.is_vip;
        self.is_mod = privileges.is_moderator;
    }

    /// The highest standing, for display.
    pub const fn privilege_label(&self) -> Option<&'static str> {
        if self.is_broadcaster {
            Some("broadcaster")
        } else if self.is_mod {
            Some("moderator")
        } else if self.is_vip {
            Some("vip")
        } else {
            None
        }
    }

    pub const fn roles(&self) -> &Roles {
        &self.roles
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }

    pub fn add_role(&mut self, role: &str) -> bool {
        self.roles.add(role)
    }

    pub fn remove_role(&mut self, role: &str) -> bool {
        self.roles.remove(role)
    }

    pub const fn binding(&self) -> Option<ActorId> {
        self.binding
    }

    pub const fn is_bound(&self) -> bool {
        self.binding.is_some()
    }

    /// Bound, or still flagged as playing while its actor is being (re)created.
    pub fn is_active(&self) -> bool {
        self.is_bound() || self.has_role(PLAY_ROLE)
    }

    pub fn bind(&mut self, actor: ActorId) {
        self.binding.replace(actor);
    }

    /// Clears the actor and the accrual cursor, so a later rejoin doesn't
    /// collect reputation for the time spent away.
    pub fn unbind(&mut self) -> Option<ActorId> {
        self.last_accrual.take();
        self.binding.take()
    }

    /// Adds `amount` and returns the reputation from before the change.
    pub fn add_reputation(&mut self, amount: f64) -> f64 {
        let before = self.reputation;
        self.reputation += amount;
        before
    }

    /// Accrues reputation for the time since the last call and returns the
    /// reputation from before the change. The first call only sets the cursor.
    pub fn accrue_at(&mut self, now: Instant) -> f64 {
        match self.last_accrual.replace(now) {
            Some(last) => {
                let elapsed = elapsed_between(last, now);
                self.add_reputation(elapsed.as_secs_f64() * REPUTATION_PER_SECOND)
            }
            None => self.reputation,
        }
    }

    pub(crate) fn history_mut(&mut self) -> &mut VecDeque<u64> {
        &mut self.history
    }

    /// A copy without any runtime-only state.
    pub fn detached(&self) -> Self {
        Self {
            binding: None,
            last_accrual: None,
            history: VecDeque::new(),
            ..self.clone()
        }
    }
}
