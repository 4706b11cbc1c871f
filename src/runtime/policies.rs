use crate::runtime::tree::{LinkedTree, NodeId};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

/// Release the engine reports for `CMAKE_VERSION` and compares policies against.
pub const ENGINE_VERSION: Version = Version::new(3, 28, 0);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl Version {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parses `major[.minor[.patch[.tweak]]]`, ignoring the tweak component.
    pub fn parse(text: &str) -> Option<Self> {
        let mut parts = text.split('.');
        let major = parts.next()?.parse().ok()?;
        let minor = match parts.next() {
            Some(part) => part.parse().ok()?,
            None => 0,
        };
        let patch = match parts.next() {
            Some(part) => part.parse().ok()?,
            None => 0,
        };
        if let Some(tweak) = parts.next() {
            tweak.parse::<u32>().ok()?;
        }
        if parts.next().is_some() {
            return None;
        }
        Some(Self::new(major, minor, patch))
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor, self.patch).cmp(&(other.major, other.minor, other.patch))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Compares dotted version strings component by component, treating missing
/// or non-numeric components as zero.
pub fn compare_versions(lhs: &str, rhs: &str) -> Ordering {
    let parse = |text: &str| -> Vec<u64> {
        text.split('.')
            .map(|part| {
                let digits: String = part.chars().take_while(|c| c.is_ascii_digit()).collect();
                digits.parse().unwrap_or(0)
            })
            .collect()
    };
    let left = parse(lhs);
    let right = parse(rhs);
    let len = left.len().max(right.len());
    for idx in 0..len {
        let a = left.get(idx).copied().unwrap_or(0);
        let b = right.get(idx).copied().unwrap_or(0);
        match a.cmp(&b) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PolicyId {
    Cmp0011,
    Cmp0036,
    Cmp0054,
    Cmp0055,
    Cmp0057,
    Cmp0124,
    Cmp0126,
    Cmp0140,
}

impl PolicyId {
    pub const ALL: [PolicyId; 8] = [
        PolicyId::Cmp0011,
        PolicyId::Cmp0036,
        PolicyId::Cmp0054,
        PolicyId::Cmp0055,
        PolicyId::Cmp0057,
        PolicyId::Cmp0124,
        PolicyId::Cmp0126,
        PolicyId::Cmp0140,
    ];

    pub fn name(self) -> &'static str {
        match self {
            PolicyId::Cmp0011 => "CMP0011",
            PolicyId::Cmp0036 => "CMP0036",
            PolicyId::Cmp0054 => "CMP0054",
            PolicyId::Cmp0055 => "CMP0055",
            PolicyId::Cmp0057 => "CMP0057",
            PolicyId::Cmp0124 => "CMP0124",
            PolicyId::Cmp0126 => "CMP0126",
            PolicyId::Cmp0140 => "CMP0140",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|id| id.name() == name)
    }

    /// Whether `name` has the shape of a policy id, known or not.
    pub fn is_policy_name(name: &str) -> bool {
        name.len() == 7
            && name.starts_with("CMP")
            && name[3..].chars().all(|c| c.is_ascii_digit())
    }

    pub fn introduced(self) -> Version {
        match self {
            PolicyId::Cmp0011 => Version::new(2, 6, 3),
            PolicyId::Cmp0036 => Version::new(3, 0, 0),
            PolicyId::Cmp0054 => Version::new(3, 1, 0),
            PolicyId::Cmp0055 => Version::new(3, 2, 0),
            PolicyId::Cmp0057 => Version::new(3, 3, 0),
            PolicyId::Cmp0124 => Version::new(3, 21, 0),
            PolicyId::Cmp0126 => Version::new(3, 21, 0),
            PolicyId::Cmp0140 => Version::new(3, 25, 0),
        }
    }

    pub fn summary(self) -> &'static str {
        match self {
            PolicyId::Cmp0011 => "Included scripts do automatic cmake_policy PUSH and POP.",
            PolicyId::Cmp0036 => "The build_name command should not be called.",
            PolicyId::Cmp0054 => {
                "Only interpret if() arguments as variables or keywords when unquoted."
            }
            PolicyId::Cmp0055 => "Strict checking for break() command.",
            PolicyId::Cmp0057 => "Support new if() IN_LIST operator.",
            PolicyId::Cmp0124 => {
                "foreach() loop variables are only available in the loop scope."
            }
            PolicyId::Cmp0126 => "set(CACHE) does not remove a normal variable of the same name.",
            PolicyId::Cmp0140 => "The return() command checks its parameters.",
        }
    }

    /// Author warning text for a policy left unset.
    pub fn warning(self) -> String {
        format!(
            "Policy {name} is not set: {summary}  Run \"cmake --help-policy {name}\" for policy details.  Use the cmake_policy command to set the policy and suppress this warning.",
            name = self.name(),
            summary = self.summary()
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PolicyStatus {
    Old,
    Warn,
    New,
}

impl PolicyStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PolicyStatus::Old => "OLD",
            PolicyStatus::Warn => "",
            PolicyStatus::New => "NEW",
        }
    }

    pub fn is_old_or_warn(self) -> bool {
        matches!(self, PolicyStatus::Old | PolicyStatus::Warn)
    }
}

/// Explicit OLD/NEW settings; absent entries fall through to outer frames.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PolicyMap {
    statuses: BTreeMap<PolicyId, PolicyStatus>,
}

impl PolicyMap {
    pub fn get(&self, id: PolicyId) -> Option<PolicyStatus> {
        self.statuses.get(&id).copied()
    }

    pub fn set(&mut self, id: PolicyId, status: PolicyStatus) {
        self.statuses.insert(id, status);
    }

    pub fn is_empty(&self) -> bool {
        self.statuses.is_empty()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PolicyEntry {
    pub map: PolicyMap,
    pub weak: bool,
}

pub type PolicyFrameId = NodeId<PolicyEntry>;

#[derive(Default)]
pub struct PolicyStack {
    frames: LinkedTree<PolicyEntry>,
}

impl PolicyStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, parent: PolicyFrameId, entry: PolicyEntry) -> PolicyFrameId {
        self.frames.push(parent, entry)
    }

    pub fn pop(&mut self, frame: PolicyFrameId) -> PolicyFrameId {
        self.frames.pop(frame)
    }

    pub fn entry(&self, frame: PolicyFrameId) -> Option<&PolicyEntry> {
        self.frames.get(frame)
    }

    /// Effective setting of `id` seen from `frame`.
    pub fn get(&self, frame: PolicyFrameId, id: PolicyId) -> Option<PolicyStatus> {
        self.frames
            .ancestors(frame)
            .find_map(|(_, entry)| entry.map.get(id))
    }

    /// Sets `id` in `frame` and every weak frame beneath it up to and
    /// including the first strong one.
    pub fn set(&mut self, frame: PolicyFrameId, id: PolicyId, status: PolicyStatus) {
        let mut current = frame;
        loop {
            let parent = self.frames.parent(current);
            let Some(entry) = self.frames.get_mut(current) else {
                break;
            };
            entry.map.set(id, status);
            if !entry.weak {
                break;
            }
            current = parent;
        }
    }

    /// Flattens the settings visible from `frame` so they can be restored
    /// around a later function call.
    pub fn record(&self, frame: PolicyFrameId) -> PolicyMap {
        let mut map = PolicyMap::default();
        for id in PolicyId::ALL {
            if let Some(status) = self.get(frame, id) {
                map.set(id, status);
            }
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn versions_parse_and_compare() {
        assert_eq!(Version::parse("3.10"), Some(Version::new(3, 10, 0)));
        assert_eq!(Version::parse("2.6.3.1"), Some(Version::new(2, 6, 3)));
        assert_eq!(Version::parse("abc"), None);
        assert!(Version::new(3, 21, 0) > Version::new(3, 3, 0));
        assert_eq!(compare_versions("1.2", "1.2.0"), Ordering::Equal);
        assert_eq!(compare_versions("1.10", "1.9"), Ordering::Greater);
    }

    #[test]
    fn weak_frames_forward_writes_to_strong_frame() {
        let mut stack = PolicyStack::new();
        let strong = stack.push(NodeId::ROOT, PolicyEntry::default());
        let weak = stack.push(
            strong,
            PolicyEntry {
                map: PolicyMap::default(),
                weak: true,
            },
        );
        stack.set(weak, PolicyId::Cmp0054, PolicyStatus::New);
        assert_eq!(
            stack.get(strong, PolicyId::Cmp0054),
            Some(PolicyStatus::New)
        );
    }

    #[test]
    fn strong_frames_stop_writes() {
        let mut stack = PolicyStack::new();
        let outer = stack.push(NodeId::ROOT, PolicyEntry::default());
        let inner = stack.push(outer, PolicyEntry::default());
        stack.set(inner, PolicyId::Cmp0140, PolicyStatus::Old);
        assert_eq!(stack.get(outer, PolicyId::Cmp0140), None);
        assert_eq!(
            stack.get(inner, PolicyId::Cmp0140),
            Some(PolicyStatus::Old)
        );
        let recorded = stack.record(inner);
        assert_eq!(recorded.get(PolicyId::Cmp0140), Some(PolicyStatus::Old));
    }

    #[test]
    fn policy_names_round_trip() {
        assert_eq!(PolicyId::parse("CMP0057"), Some(PolicyId::Cmp0057));
        assert!(PolicyId::is_policy_name("CMP9999"));
        assert!(!PolicyId::is_policy_name("CMPX"));
    }
}
