//! Packet identifier allocation for exchanges that need an acknowledgment

/// Hands out packet identifiers in `1..=65535` and takes them back
///
/// Free identifiers are kept as a sorted list of disjoint inclusive intervals, so a
/// fully free pool is a single entry no matter how large it is. `allocate` always
/// returns the lowest free identifier.
#[derive(Debug)]
pub struct PacketIdAllocator {
    free: Vec<(u16, u16)>,
}

impl PacketIdAllocator {
    #[must_use]
    pub fn new() -> Self {
        Self {
            free: vec![(1, u16::MAX)],
        }
    }

    /// Takes the lowest free identifier, or returns 0 when every identifier is in use
    pub fn allocate(&mut self) -> u16 {
        let Some(first) = self.free.first_mut() else {
            return 0;
        };

        let id = first.0;
        if first.0 == first.1 {
            self.free.remove(0);
        } else {
            first.0 += 1;
        }
        id
    }

    /// Returns `id` to the pool
    ///
    /// Returns `false` without changing anything if `id` is 0 or already free.
    pub fn free(&mut self, id: u16) -> bool {
        if id == 0 {
            return false;
        }

        // index of the first interval starting after `id`
        let idx = self.free.partition_point(|&(lo, _)| lo <= id);
        if idx > 0 && self.free[idx - 1].1 >= id {
            tracing::warn!(packet_id = id, "Packet identifier freed twice");
            return false;
        }

        let joins_prev = idx > 0 && self.free[idx - 1].1 + 1 == id;
        let joins_next = idx < self.free.len() && id + 1 == self.free[idx].0;

        match (joins_prev, joins_next) {
            (true, true) => {
                self.free[idx - 1].1 = self.free[idx].1;
                self.free.remove(idx);
            }
            (true, false) => self.free[idx - 1].1 = id,
            (false, true) => self.free[idx].0 = id,
            (false, false) => self.free.insert(idx, (id, id)),
        }
        true
    }

    /// Whether `id` is currently handed out
    #[must_use]
    pub fn is_allocated(&self, id: u16) -> bool {
        id != 0 && !self.free.iter().any(|&(lo, hi)| lo <= id && id <= hi)
    }

    /// Number of identifiers currently handed out
    #[must_use]
    pub fn in_use(&self) -> usize {
        let free: usize = self
            .free
            .iter()
            .map(|&(lo, hi)| usize::from(hi - lo) + 1)
            .sum();
        usize::from(u16::MAX) - free
    }
}

impl Default for PacketIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}
