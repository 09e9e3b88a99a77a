use crate::{
    persist::{Json, Persist},
    roles::{RoleBook, Transition},
    util::Instant,
    viewer::PLAY_ROLE,
    Viewer,
};
use crowd_message::Privileges;

use std::{collections::HashMap, path::Path};

/// Every viewer seen so far, at most one per case-insensitive name.
#[derive(Debug, Default)]
pub struct ViewerRegistry {
    viewers: Vec<Viewer>,
    index: HashMap<String, usize>,
}

fn key(name: &str) -> String {
    name.trim().to_lowercase()
}

impl ViewerRegistry {
    pub fn find(&self, name: &str) -> Option<&Viewer> {
        self.index.get(&key(name)).map(|&i| &self.viewers[i])
    }

    pub fn find_mut(&mut self, name: &str) -> Option<&mut Viewer> {
        let index = *self.index.get(&key(name))?;
        self.viewers.get_mut(index)
    }

    /// Looks up `name`, creating it on a miss with `privileges` and the
    /// roles that come with them. The flag is `true` for a new viewer.
    pub fn find_or_create(
        &mut self,
        name: &str,
        privileges: Privileges,
        roles: &RoleBook,
    ) -> (&mut Viewer, bool) {
        let key = key(name);
        if let Some(&index) = self.index.get(&key) {
            return (&mut self.viewers[index], false);
        }

        let mut viewer = Viewer::new(name.trim(), privileges);
        roles.grant_initial(&mut viewer);
        log::info!("new viewer: {}", viewer.name());

        let index = self.viewers.len();
        self.viewers.push(viewer);
        self.index.insert(key, index);
        (&mut self.viewers[index], true)
    }

    pub fn len(&self) -> usize {
        self.viewers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.viewers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Viewer> {
        self.viewers.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Viewer> {
        self.viewers.iter_mut()
    }

    pub fn player_count(&self) -> usize {
        self.iter().filter(|v| v.has_role(PLAY_ROLE)).count()
    }

    /// Every viewer, in first-seen order, without bindings or throttle history.
    pub fn snapshot(&self) -> Vec<Viewer> {
        self.iter().map(Viewer::detached).collect()
    }

    /// Rebuilds a registry from a snapshot. Later duplicates of a name are dropped.
    pub fn restore(viewers: Vec<Viewer>) -> Self {
        let mut this = Self::default();
        for viewer in viewers {
            let key = key(viewer.name());
            if this.index.contains_key(&key) {
                log::warn!("dropping duplicate viewer: {}", viewer.name());
                continue;
            }
            this.index.insert(key, this.viewers.len());
            this.viewers.push(viewer.detached());
        }
        this
    }

    /// Loads a snapshot from `path`. A missing file is an empty registry, an
    /// unreadable one is logged and also yields an empty registry.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match Json::load(path) {
            Ok(Some(viewers)) => {
                let this = Self::restore(viewers);
                log::info!("loaded {} viewer(s) from '{}'", this.len(), path.display());
                this
            }
            Ok(None) => Self::default(),
            Err(err) => {
                log::error!("failed loading '{}': {:#}", path.display(), err);
                Self::default()
            }
        }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        Json::save(path, &self.snapshot())
    }

    /// Accrues reputation for every active viewer and applies role changes.
    pub fn accrue_active_at(
        &mut self,
        now: Instant,
        roles: &RoleBook,
    ) -> Vec<(String, String, Transition)> {
        let mut changes = vec![];
        for viewer in self.viewers.iter_mut().filter(|v| v.is_active()) {
            let before = viewer.accrue_at(now);
            for (role, transition) in roles.apply_all(viewer, before) {
                changes.push((viewer.name().to_string(), role, transition));
            }
        }
        changes
    }
}
