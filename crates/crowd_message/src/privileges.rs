/// Standing derived from the `badges` tag at first contact.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Privileges {
    pub is_broadcaster: bool,
    pub is_vip: bool,
    pub is_moderator: bool,
}

impl Privileges {
    /// Folds a comma-separated `badges` value (e.g. `moderator/1,subscriber/12`).
    ///
    /// A moderator is also VIP-tier, as are subscribers and founders.
    pub fn from_badges(badges: &str) -> Self {
        badges
            .split(',')
            .filter_map(|badge| badge.split('/').next())
            .fold(Self::default(), |mut this, family| {
                match family {
                    "broadcaster" => this.is_broadcaster = true,
                    "vip" | "subscriber" | "founder" => this.is_vip = true,
                    "moderator" => {
                        this.is_moderator = true;
                        this.is_vip = true;
                    }
                    _ => {}
                }
                this
            })
    }

    pub const fn is_elevated(&self) -> bool {
        self.is_broadcaster || self.is_moderator || self.is_vip
    }
}
