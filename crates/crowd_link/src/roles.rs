use crate::{
    persist::{Persist, Toml},
    Viewer,
};

use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, path::Path};

/// When a role is handed out or taken away.
///
/// A threshold of `0` means there is no automatic transition at that edge.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RoleRule {
    pub role: String,
    pub add_at: f64,
    pub remove_at: f64,
    pub vip_add_at: f64,
    pub vip_remove_at: f64,
    pub add_to_broadcaster: bool,
    pub add_to_mods: bool,
    pub add_to_vip: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Transition {
    Granted,
    Revoked,
}

impl RoleRule {
    /// Whether this rule hands the role out permanently to the viewer's standing.
    pub fn auto_grants(&self, viewer: &Viewer) -> bool {
        let p = viewer.privileges();
        (self.add_to_broadcaster && p.is_broadcaster)
            || (self.add_to_mods && p.is_moderator)
            || (self.add_to_vip && p.is_vip)
    }

    /// The (add, remove) thresholds that apply to `viewer`.
    pub fn thresholds(&self, viewer: &Viewer) -> (f64, f64) {
        let (mut add, mut remove) = (self.add_at, self.remove_at);
        if viewer.privileges().is_vip {
            if self.vip_add_at != 0.0 {
                add = self.vip_add_at;
            }
            if self.vip_remove_at != 0.0 {
                remove = self.vip_remove_at;
            }
        }
        (add, remove)
    }

    /// Applies hysteresis for a reputation change from `before` to the viewer's
    /// current reputation. The add edge is checked first; at most one
    /// transition happens per call.
    pub fn apply(&self, viewer: &mut Viewer, before: f64) -> Option<Transition> {
        if self.auto_grants(viewer) {
            return None;
        }

        let (add, remove) = self.thresholds(viewer);
        if add == 0.0 && remove == 0.0 {
            return None;
        }

        let after = viewer.reputation();
        if add != 0.0 && before < add && add <= after {
            return Some(Transition::Granted).filter(|_| viewer.add_role(&self.role));
        }

        if remove != 0.0 && before > remove && remove >= after {
            return Some(Transition::Revoked).filter(|_| viewer.remove_role(&self.role));
        }

        None
    }
}

#[derive(Default, Deserialize, Serialize)]
struct RoleFile {
    #[serde(default)]
    role: Vec<RoleRule>,
}

/// Every known rule, keyed by role name.
#[derive(Clone, Debug, Default)]
pub struct RoleBook {
    rules: BTreeMap<String, RoleRule>,
}

impl RoleBook {
    /// Loads `[[role]]` tables from `path`. A missing or broken file yields an empty book.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match Toml::load(path) {
            Ok(Some(RoleFile { role })) => {
                log::info!("loaded {} role(s) from '{}'", role.len(), path.display());
                role.into_iter().collect()
            }
            Ok(None) => {
                log::warn!("no role file at '{}'", path.display());
                Self::default()
            }
            Err(err) => {
                log::error!("cannot load roles from '{}': {:#}", path.display(), err);
                Self::default()
            }
        }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let file = RoleFile {
            role: self.rules.values().cloned().collect(),
        };
        Toml::save(path, &file)
    }

    /// Replaces any rule with the same role name.
    pub fn insert(&mut self, rule: RoleRule) {
        self.rules.insert(rule.role.clone(), rule);
    }

    pub fn get(&self, role: &str) -> Option<&RoleRule> {
        self.rules.get(role)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RoleRule> {
        self.rules.values()
    }

    /// Grants the roles that come with the viewer's standing.
    pub fn grant_initial(&self, viewer: &mut Viewer) {
        for rule in self.iter() {
            if rule.auto_grants(viewer) {
                viewer.add_role(&rule.role);
            }
        }
    }

    /// Runs every rule against a reputation change from `before`.
    pub fn apply_all(&self, viewer: &mut Viewer, before: f64) -> Vec<(String, Transition)> {
        self.iter()
            .filter_map(|rule| {
                rule.apply(viewer, before)
                    .map(|transition| (rule.role.clone(), transition))
            })
            .collect()
    }
}

impl std::iter::FromIterator<RoleRule> for RoleBook {
    fn from_iter<I: IntoIterator<Item = RoleRule>>(iter: I) -> Self {
        let mut this = Self::default();
        for rule in iter {
            this.insert(rule);
        }
        this
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crowd_message::Privileges;

    fn talk() -> RoleRule {
        RoleRule {
            role: "talk".into(),
            add_at: 500.0,
            remove_at: 200.0,
            ..RoleRule::default()
        }
    }

    fn set(viewer: &mut Viewer, rule: &RoleRule, to: f64) -> Option<Transition> {
        let before = viewer.add_reputation(to - viewer.reputation());
        rule.apply(viewer, before)
    }

    #[test]
    fn hysteresis() {
        let rule = talk();
        let mut viewer = Viewer::new("alice", Privileges::default());

        assert_eq!(set(&mut viewer, &rule, 490.0), None);
        assert_eq!(set(&mut viewer, &rule, 510.0), Some(Transition::Granted));
        assert!(viewer.has_role("talk"));
        assert_eq!(set(&mut viewer, &rule, 520.0), None);

        for _ in 0..3 {
            assert_eq!(set(&mut viewer, &rule, 600.0), None);
            assert_eq!(set(&mut viewer, &rule, 300.0), None);
            assert!(viewer.has_role("talk"));
        }

        assert_eq!(set(&mut viewer, &rule, 190.0), Some(Transition::Revoked));
        assert!(!viewer.has_role("talk"));
        assert_eq!(set(&mut viewer, &rule, 150.0), None);
    }

    #[test]
    fn landing_exactly_on_thresholds() {
        let rule = talk();
        let mut viewer = Viewer::new("alice", Privileges::default());
        assert_eq!(set(&mut viewer, &rule, 500.0), Some(Transition::Granted));
        assert_eq!(set(&mut viewer, &rule, 200.0), Some(Transition::Revoked));
    }

    #[test]
    fn zero_thresholds_never_fire() {
        let rule = RoleRule {
            role: "nothing".into(),
            ..RoleRule::default()
        };
        let mut viewer = Viewer::new("alice", Privileges::default());
        assert_eq!(set(&mut viewer, &rule, 1000.0), None);
        assert_eq!(set(&mut viewer, &rule, -1000.0), None);
        assert!(!viewer.has_role("nothing"));
    }

    #[test]
    fn add_only_rule_never_removes() {
        let rule = RoleRule {
            remove_at: 0.0,
            ..talk()
        };
        let mut viewer = Viewer::new("alice", Privileges::default());
        assert_eq!(set(&mut viewer, &rule, 600.0), Some(Transition::Granted));
        assert_eq!(set(&mut viewer, &rule, -600.0), None);
        assert!(viewer.has_role("talk"));
    }

    #[test]
    fn inconsistent_thresholds_add_first() {
        // add below remove, and a rise that crosses both
        let rule = RoleRule {
            role: "odd".into(),
            add_at: 100.0,
            remove_at: 200.0,
            ..RoleRule::default()
        };
        let mut viewer = Viewer::new("alice", Privileges::default());
        viewer.add_reputation(50.0);
        assert_eq!(set(&mut viewer, &rule, 300.0), Some(Transition::Granted));
        assert!(viewer.has_role("odd"));
    }

    #[test]
    fn vip_thresholds_override() {
        let rule = RoleRule {
            vip_add_at: 100.0,
            ..talk()
        };
        let vip = Privileges {
            is_vip: true,
            ..Privileges::default()
        };
        let mut viewer = Viewer::new("vip", vip);
        assert_eq!(rule.thresholds(&viewer), (100.0, 200.0));
        assert_eq!(set(&mut viewer, &rule, 150.0), Some(Transition::Granted));

        let regular = Viewer::new("regular", Privileges::default());
        assert_eq!(rule.thresholds(&regular), (500.0, 200.0));
    }

    // Only the add edge has a VIP override here, so the remove edge falls back
    // to the default threshold, which sits above the VIP add threshold. A VIP
    // granted at 150 sits below 200 already, so it can't be revoked until it
    // first climbs back above 200 and then drops. Kept literal on purpose.
    #[test]
    fn vip_partial_override_edge_case() {
        let rule = RoleRule {
            vip_add_at: 100.0,
            ..talk()
        };
        let vip = Privileges {
            is_vip: true,
            ..Privileges::default()
        };
        let mut viewer = Viewer::new("vip", vip);
        assert_eq!(set(&mut viewer, &rule, 150.0), Some(Transition::Granted));
        assert_eq!(set(&mut viewer, &rule, 120.0), None);
        assert!(viewer.has_role("talk"));
        assert_eq!(set(&mut viewer, &rule, 250.0), None);
        assert_eq!(set(&mut viewer, &rule, 180.0), Some(Transition::Revoked));
    }

    #[test]
    fn privileged_viewers_are_skipped() {
        let rule = RoleRule {
            add_to_mods: true,
            ..talk()
        };
        let moderator = Privileges {
            is_moderator: true,
            is_vip: true,
            ..Privileges::default()
        };
        let mut viewer = Viewer::new("mod", moderator);
        let book: RoleBook = vec![rule.clone()].into_iter().collect();
        book.grant_initial(&mut viewer);
        assert!(viewer.has_role("talk"));

        viewer.add_reputation(1000.0);
        assert_eq!(set(&mut viewer, &rule, 0.0), None);
        assert!(viewer.has_role("talk"));
    }

    #[test]
    fn grant_initial_by_standing() {
        let book: RoleBook = vec![
            RoleRule {
                role: "play".into(),
                add_to_broadcaster: true,
                ..RoleRule::default()
            },
            RoleRule {
                role: "cam".into(),
                add_to_vip: true,
                ..RoleRule::default()
            },
        ]
        .into_iter()
        .collect();

        let mut broadcaster = Viewer::new(
            "b",
            Privileges {
                is_broadcaster: true,
                ..Privileges::default()
            },
        );
        book.grant_initial(&mut broadcaster);
        assert!(broadcaster.has_role("play"));
        assert!(!broadcaster.has_role("cam"));

        let mut regular = Viewer::new("r", Privileges::default());
        book.grant_initial(&mut regular);
        assert!(regular.roles().is_empty());
    }

    #[test]
    fn role_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("roles.toml");
        std::fs::write(
            &path,
            r#"
            [[role]]
            role = "talk"
            add_at = 50
            remove_at = 10

            [[role]]
            role = "play"
            add_to_broadcaster = true
            add_to_mods = true
            "#,
        )
        .unwrap();

        let book = RoleBook::load(&path);
        assert_eq!(book.len(), 2);
        assert_eq!(book.get("talk").unwrap().add_at, 50.0);
        assert!(book.get("play").unwrap().add_to_mods);

        assert!(RoleBook::load(dir.path().join("missing.toml")).is_empty());
    }
}
