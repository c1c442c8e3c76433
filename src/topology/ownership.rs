//! Domain-to-process ownership.
//!
//! [`DomainOwnership`] records which rank owns each domain for one exchange.
//! It is built once from the caller's `(domain, rank)` pairs and decides
//! whether a neighbor pair needs message passing or only a local copy.

use crate::mesh_error::HaloError;
use crate::topology::DomainId;
use std::collections::BTreeSet;

#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct DomainOwnership {
    owners: Vec<Option<usize>>,
}

impl DomainOwnership {
    /// Ownership map for `num_domains` domains, all unassigned.
    pub fn with_capacity(num_domains: usize) -> Self {
        Self {
            owners: vec![None; num_domains],
        }
    }

    /// Every domain owned by rank 0.
    pub fn single_process(num_domains: usize) -> Self {
        Self {
            owners: vec![Some(0); num_domains],
        }
    }

    /// Build from `(domain, rank)` pairs.
    ///
    /// Repeating a pair is harmless; assigning one domain to two ranks is an error.
    pub fn from_pairs<I>(num_domains: usize, pairs: I) -> Result<Self, HaloError>
    where
        I: IntoIterator<Item = (DomainId, usize)>,
    {
        let mut map = Self::with_capacity(num_domains);
        for (domain, rank) in pairs {
            map.set(domain, rank)?;
        }
        Ok(map)
    }

    /// Assign `domain` to `rank`.
    pub fn set(&mut self, domain: DomainId, rank: usize) -> Result<(), HaloError> {
        let count = self.owners.len();
        let slot = self
            .owners
            .get_mut(domain)
            .ok_or(HaloError::InvalidDomain { domain, count })?;
        match *slot {
            Some(first) if first != rank => Err(HaloError::ConflictingOwner {
                domain,
                first,
                second: rank,
            }),
            _ => {
                *slot = Some(rank);
                Ok(())
            }
        }
    }

    /// Number of tracked domain slots.
    pub fn len(&self) -> usize {
        self.owners.len()
    }

    /// Returns true if no domain has an owner.
    pub fn is_empty(&self) -> bool {
        self.owners.iter().all(|o| o.is_none())
    }

    /// Owning rank of `domain`, if any.
    #[inline]
    pub fn owner(&self, domain: DomainId) -> Option<usize> {
        self.owners.get(domain).copied().flatten()
    }

    #[inline]
    pub fn is_local(&self, domain: DomainId, rank: usize) -> bool {
        self.owner(domain) == Some(rank)
    }

    /// Domains owned by `rank`, ascending.
    pub fn local_domains(&self, rank: usize) -> Vec<DomainId> {
        (0..self.owners.len())
            .filter(|&d| self.owners[d] == Some(rank))
            .collect()
    }

    /// All ranks that own at least one domain.
    pub fn ranks(&self) -> BTreeSet<usize> {
        self.owners.iter().flatten().copied().collect()
    }
}
