use std::cmp::Ordering;

use crate::package::PackageId;
use crate::universe::Universe;

/// Policy for choosing between candidate packages.
///
/// When several packages satisfy a job or a requirement, the policy
/// decides which one the solver tries first.
#[derive(Debug, Clone, Default)]
pub struct Policy {
    /// Native architecture; when unset every arch ranks equally
    pub native_arch: Option<String>,
    /// Prefer the lowest version (downgrades)
    pub prefer_lowest: bool,
}

impl Policy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn native_arch(mut self, arch: Option<String>) -> Self {
        self.native_arch = arch;
        self
    }

    pub fn prefer_lowest(mut self, prefer: bool) -> Self {
        self.prefer_lowest = prefer;
        self
    }

    /// Candidates sorted by preference, best first.
    ///
    /// 1. Already installed
    /// 2. Repository priority (lower number wins)
    /// 3. Highest version, or lowest when `prefer_lowest`
    /// 4. Native arch, then noarch, then anything else
    /// 5. PackageId
    pub fn select_preferred(&self, universe: &Universe, candidates: &[PackageId]) -> Vec<PackageId> {
        let mut sorted = candidates.to_vec();
        sorted.sort_by(|&a, &b| self.compare(universe, a, b));
        sorted.dedup();
        sorted
    }

    /// Like [`select_preferred`](Self::select_preferred) but packages whose
    /// name is exactly `name` come before other providers.
    pub fn select_preferred_for(
        &self,
        universe: &Universe,
        name: &str,
        candidates: &[PackageId],
    ) -> Vec<PackageId> {
        let mut sorted = self.select_preferred(universe, candidates);
        sorted.sort_by_key(|&id| universe[id].name != name);
        sorted
    }

    pub fn compare(&self, universe: &Universe, a: PackageId, b: PackageId) -> Ordering {
        let pa = &universe[a];
        let pb = &universe[b];

        pb.installed
            .cmp(&pa.installed)
            .then_with(|| {
                universe
                    .repo_priority(&pa.repo)
                    .cmp(&universe.repo_priority(&pb.repo))
            })
            .then_with(|| {
                if self.prefer_lowest {
                    pa.evr.cmp(&pb.evr)
                } else {
                    pb.evr.cmp(&pa.evr)
                }
            })
            .then_with(|| self.arch_rank(&pa.arch).cmp(&self.arch_rank(&pb.arch)))
            .then_with(|| a.cmp(&b))
    }

    fn arch_rank(&self, arch: &str) -> u8 {
        match self.native_arch.as_deref() {
            Some(native) if native == arch => 0,
            Some(_) if arch == "noarch" => 1,
            Some(_) => 2,
            None => 0,
        }
    }
}
