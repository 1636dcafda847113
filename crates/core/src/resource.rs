//! Resource amounts shared by capacity, requirements and usage.

use serde::{Deserialize, Serialize};

/// The kinds of resource the ledger tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResourceKind {
    /// CPU share (percentage points of the whole system)
    Cpu,
    /// Memory share (percentage points of the whole system)
    Memory,
    /// Developer headcount
    Developers,
    /// Build servers
    BuildServers,
    /// Test environments
    TestEnvironments,
}

impl ResourceKind {
    /// Every kind, in display order.
    pub const ALL: [ResourceKind; 5] = [
        ResourceKind::Cpu,
        ResourceKind::Memory,
        ResourceKind::Developers,
        ResourceKind::BuildServers,
        ResourceKind::TestEnvironments,
    ];

    /// Get string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Cpu => "cpu",
            ResourceKind::Memory => "memory",
            ResourceKind::Developers => "developers",
            ResourceKind::BuildServers => "buildServers",
            ResourceKind::TestEnvironments => "testEnvironments",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A bundle of resource amounts.
///
/// The same shape describes system capacity, a consumer's requirements and
/// aggregated usage; unused kinds are zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Resources {
    /// CPU share
    pub cpu: u32,
    /// Memory share
    pub memory: u32,
    /// Developer headcount
    pub developers: u32,
    /// Build servers
    pub build_servers: u32,
    /// Test environments
    pub test_environments: u32,
}

impl Resources {
    /// No resources at all.
    pub const fn none() -> Self {
        Self {
            cpu: 0,
            memory: 0,
            developers: 0,
            build_servers: 0,
            test_environments: 0,
        }
    }

    /// Requirements of a development task.
    pub const fn task(cpu: u32, memory: u32, developers: u32) -> Self {
        Self {
            cpu,
            memory,
            developers,
            build_servers: 0,
            test_environments: 0,
        }
    }

    /// Only a developer headcount.
    pub const fn developers(developers: u32) -> Self {
        Self {
            developers,
            ..Self::none()
        }
    }

    /// Amount for one kind.
    pub fn get(&self, kind: ResourceKind) -> u32 {
        match kind {
            ResourceKind::Cpu => self.cpu,
            ResourceKind::Memory => self.memory,
            ResourceKind::Developers => self.developers,
            ResourceKind::BuildServers => self.build_servers,
            ResourceKind::TestEnvironments => self.test_environments,
        }
    }

    /// Mutable amount for one kind.
    pub fn get_mut(&mut self, kind: ResourceKind) -> &mut u32 {
        match kind {
            ResourceKind::Cpu => &mut self.cpu,
            ResourceKind::Memory => &mut self.memory,
            ResourceKind::Developers => &mut self.developers,
            ResourceKind::BuildServers => &mut self.build_servers,
            ResourceKind::TestEnvironments => &mut self.test_environments,
        }
    }

    /// Iterate `(kind, amount)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (ResourceKind, u32)> + '_ {
        ResourceKind::ALL.into_iter().map(move |k| (k, self.get(k)))
    }

    /// Whether every amount is zero.
    pub fn is_empty(&self) -> bool {
        self.iter().all(|(_, v)| v == 0)
    }

    /// Component-wise sum, saturating at `u32::MAX`.
    pub fn saturating_add(&self, other: &Resources) -> Resources {
        let mut out = *self;
        for kind in ResourceKind::ALL {
            let slot = out.get_mut(kind);
            *slot = slot.saturating_add(other.get(kind));
        }
        out
    }

    /// Component-wise difference, floored at zero.
    pub fn saturating_sub(&self, other: &Resources) -> Resources {
        let mut out = *self;
        for kind in ResourceKind::ALL {
            let slot = out.get_mut(kind);
            *slot = slot.saturating_sub(other.get(kind));
        }
        out
    }

    /// Whether every amount in `self` fits within `available`.
    pub fn fits_within(&self, available: &Resources) -> bool {
        self.iter().all(|(kind, amount)| amount <= available.get(kind))
    }
}

impl std::iter::Sum for Resources {
    fn sum<I: Iterator<Item = Resources>>(iter: I) -> Self {
        iter.fold(Resources::none(), |acc, r| acc.saturating_add(&r))
    }
}

impl<'a> std::iter::Sum<&'a Resources> for Resources {
    fn sum<I: Iterator<Item = &'a Resources>>(iter: I) -> Self {
        iter.fold(Resources::none(), |acc, r| acc.saturating_add(r))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fits_within_checks_every_kind() {
        let available = Resources {
            cpu: 50,
            memory: 50,
            developers: 2,
            build_servers: 1,
            test_environments: 0,
        };
        assert!(Resources::task(50, 10, 2).fits_within(&available));
        assert!(!Resources::task(51, 10, 2).fits_within(&available));

        let needs_env = Resources {
            test_environments: 1,
            ..Resources::none()
        };
        assert!(!needs_env.fits_within(&available));
    }

    #[test]
    fn test_sum_and_saturating_sub() {
        let total: Resources = [Resources::task(10, 20, 1), Resources::task(5, 5, 2)]
            .iter()
            .sum();
        assert_eq!(total, Resources::task(15, 25, 3));

        let left = Resources::task(10, 10, 1).saturating_sub(&total);
        assert!(left.is_empty());
    }

    #[test]
    fn test_deserialize_partial_requirements() {
        let parsed: Resources = serde_json::from_str(r#"{"cpu": 30, "buildServers": 1}"#).unwrap();
        assert_eq!(parsed.cpu, 30);
        assert_eq!(parsed.build_servers, 1);
        assert_eq!(parsed.developers, 0);
    }
}
