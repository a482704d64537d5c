use serde::{Deserialize, Serialize};
use std::fmt;

/// The three permission subjects of the POSIX model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Principal {
    Owner,
    Group,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
    Read,
    Write,
    Execute,
}

/// Read, write and execute flags of one principal at the time it was taken
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Triplet {
    pub read: bool,
    pub write: bool,
    pub execute: bool,
}

/// The 12 permission bits of a unix mode: `rwx` for owner, group and other
/// plus setuid, setgid and sticky.
///
/// Every flag is a view of one bit of [`mode`](ModeBits::mode). Setting a
/// flag flips exactly that bit.
///
/// ```
/// use sftp_fs::client::fs::{ModeBits, Permission, Principal};
///
/// let mut mode = ModeBits::new(0o644);
/// mode.set_permission(Principal::Owner, Permission::Execute, true);
/// mode.set_setuid(true);
///
/// assert_eq!(mode.mode(), 0o4744);
/// assert_eq!(mode.render(), "rwsr--r--");
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "u32", into = "u32")]
pub struct ModeBits(u32);

bitflags! {
    impl ModeBits: u32 {
        const SETUID = 0o4000;
        const SETGID = 0o2000;
        const STICKY = 0o1000;

        const OWNER_READ = 0o400;
        const OWNER_WRITE = 0o200;
        const OWNER_EXECUTE = 0o100;

        const GROUP_READ = 0o040;
        const GROUP_WRITE = 0o020;
        const GROUP_EXECUTE = 0o010;

        const OTHER_READ = 0o004;
        const OTHER_WRITE = 0o002;
        const OTHER_EXECUTE = 0o001;
    }
}

/// Indexed by `[principal][permission]`
const MASKS: [[ModeBits; 3]; 3] = [
    [
        ModeBits::OWNER_READ,
        ModeBits::OWNER_WRITE,
        ModeBits::OWNER_EXECUTE,
    ],
    [
        ModeBits::GROUP_READ,
        ModeBits::GROUP_WRITE,
        ModeBits::GROUP_EXECUTE,
    ],
    [
        ModeBits::OTHER_READ,
        ModeBits::OTHER_WRITE,
        ModeBits::OTHER_EXECUTE,
    ],
];

impl ModeBits {
    /// All 12 bits
    pub const MASK: u32 = 0o7777;

    /// Takes the permission part of `mode`; file type bits are dropped.
    #[must_use]
    pub fn new(mode: u32) -> Self {
        Self::from_bits_truncate(mode)
    }

    /// Returns the raw 12-bit value
    #[must_use]
    pub fn mode(&self) -> u32 {
        self.bits()
    }

    #[must_use]
    pub fn mask(principal: Principal, permission: Permission) -> Self {
        MASKS[principal as usize][permission as usize]
    }

    #[must_use]
    pub fn permission(&self, principal: Principal, permission: Permission) -> bool {
        self.contains(Self::mask(principal, permission))
    }

    pub fn set_permission(&mut self, principal: Principal, permission: Permission, value: bool) {
        self.set(Self::mask(principal, permission), value);
    }

    #[must_use]
    pub fn triplet(&self, principal: Principal) -> Triplet {
        Triplet {
            read: self.permission(principal, Permission::Read),
            write: self.permission(principal, Permission::Write),
            execute: self.permission(principal, Permission::Execute),
        }
    }

    #[must_use]
    pub fn owner(&self) -> Triplet {
        self.triplet(Principal::Owner)
    }

    #[must_use]
    pub fn group(&self) -> Triplet {
        self.triplet(Principal::Group)
    }

    #[must_use]
    pub fn other(&self) -> Triplet {
        self.triplet(Principal::Other)
    }

    #[must_use]
    pub fn setuid(&self) -> bool {
        self.contains(Self::SETUID)
    }

    pub fn set_setuid(&mut self, value: bool) {
        self.set(Self::SETUID, value);
    }

    #[must_use]
    pub fn setgid(&self) -> bool {
        self.contains(Self::SETGID)
    }

    pub fn set_setgid(&mut self, value: bool) {
        self.set(Self::SETGID, value);
    }

    #[must_use]
    pub fn sticky(&self) -> bool {
        self.contains(Self::STICKY)
    }

    pub fn set_sticky(&mut self, value: bool) {
        self.set(Self::STICKY, value);
    }

    /// Renders the nine `ls`-style permission characters, e.g. `rwxr-xr-x`.
    ///
    /// The execute slot shows `s`/`S` for setuid and setgid and `t`/`T` for
    /// sticky, lowercase when the execute bit underneath is set.
    #[must_use]
    pub fn render(&self) -> String {
        let specials = [
            (Principal::Owner, Self::SETUID, 's'),
            (Principal::Group, Self::SETGID, 's'),
            (Principal::Other, Self::STICKY, 't'),
        ];

        let mut out = String::with_capacity(9);
        for (principal, special, marker) in specials {
            let Triplet {
                read,
                write,
                execute,
            } = self.triplet(principal);

            out.push(if read { 'r' } else { '-' });
            out.push(if write { 'w' } else { '-' });
            out.push(match (self.contains(special), execute) {
                (true, true) => marker,
                (true, false) => marker.to_ascii_uppercase(),
                (false, true) => 'x',
                (false, false) => '-',
            });
        }

        out
    }
}

impl From<u32> for ModeBits {
    fn from(mode: u32) -> Self {
        Self::new(mode)
    }
}

impl From<ModeBits> for u32 {
    fn from(mode: ModeBits) -> Self {
        mode.mode()
    }
}

impl fmt::Display for ModeBits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

impl fmt::Debug for ModeBits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ModeBits({:#o}, {})", self.0, self.render())
    }
}

#[cfg(test)]
mod tests {
    use serde::{
        de::value::{Error as ValueError, U32Deserializer},
        Deserialize,
    };

    use super::{ModeBits, Permission, Principal, Triplet};

    const PRINCIPALS: [Principal; 3] = [Principal::Owner, Principal::Group, Principal::Other];
    const PERMISSIONS: [Permission; 3] = [Permission::Read, Permission::Write, Permission::Execute];

    #[test]
    fn every_12_bit_value_round_trips() {
        for mode in 0..=ModeBits::MASK {
            assert_eq!(ModeBits::new(mode).mode(), mode);
        }
    }

    #[test]
    fn deserializing_truncates_like_new() {
        let mode = ModeBits::deserialize(U32Deserializer::<ValueError>::new(0o17_777)).unwrap();
        assert_eq!(mode.mode(), 0o7777);

        let mode = ModeBits::deserialize(U32Deserializer::<ValueError>::new(0o100_755)).unwrap();
        assert_eq!(mode, ModeBits::new(0o755));
    }

    #[test]
    fn type_bits_are_dropped() {
        assert_eq!(ModeBits::new(0o100644).mode(), 0o644);
        assert_eq!(ModeBits::default().mode(), 0);
    }

    #[test]
    fn masks_follow_base_times_multiplier() {
        let multipliers = [64, 8, 1];
        let bases = [4, 2, 1];
        for (p, principal) in PRINCIPALS.into_iter().enumerate() {
            for (q, permission) in PERMISSIONS.into_iter().enumerate() {
                assert_eq!(
                    ModeBits::mask(principal, permission).bits(),
                    bases[q] * multipliers[p]
                );
            }
        }
        assert_eq!(ModeBits::SETUID.bits(), 2048);
        assert_eq!(ModeBits::SETGID.bits(), 1024);
        assert_eq!(ModeBits::STICKY.bits(), 512);
    }

    #[test]
    fn setting_a_flag_touches_only_its_bit() {
        for start in [0, 0o7777, 0o4751, 0o1026] {
            for principal in PRINCIPALS {
                for permission in PERMISSIONS {
                    for value in [true, false] {
                        let before = ModeBits::new(start);
                        let mut after = before;
                        after.set_permission(principal, permission, value);

                        assert_eq!(after.permission(principal, permission), value);
                        let mask = ModeBits::mask(principal, permission).bits();
                        assert_eq!(after.mode() & !mask, before.mode() & !mask);
                    }
                }
            }
        }
    }

    #[test]
    fn special_bits() {
        let mut mode = ModeBits::new(0o755);
        mode.set_setuid(true);
        mode.set_sticky(true);
        assert!(mode.setuid());
        assert!(!mode.setgid());
        assert!(mode.sticky());
        assert_eq!(mode.mode(), 0o5755);

        mode.set_setuid(false);
        assert_eq!(mode.mode(), 0o1755);
        assert!(mode.owner().execute);
    }

    #[test]
    fn render() {
        assert_eq!(ModeBits::new(0o755).render(), "rwxr-xr-x");
        assert_eq!(ModeBits::new(0o644).render(), "rw-r--r--");
        assert_eq!(ModeBits::new(0o4755).render(), "rwsr-xr-x");
        assert_eq!(ModeBits::new(0o4644).render(), "rwSr--r--");
        assert_eq!(ModeBits::new(0o2750).render(), "rwxr-s---");
        assert_eq!(ModeBits::new(0o2740).render(), "rwxr-S---");
        assert_eq!(ModeBits::new(0o1755).render(), "rwxr-xr-t");
        assert_eq!(ModeBits::new(0o1754).render(), "rwxr-xr-T");
        assert_eq!(ModeBits::new(0).render(), "---------");
        assert_eq!(ModeBits::new(0o7777).to_string(), "rwsrwsrwt");
    }

    #[test]
    fn triplets() {
        let mode = ModeBits::new(0o640);
        assert!(mode.owner().read && mode.owner().write && !mode.owner().execute);
        assert!(mode.group().read && !mode.group().write);
        assert_eq!(mode.other(), Triplet::default());
    }
}
