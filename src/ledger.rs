use std::collections::{
    BTreeMap,
    HashMap,
};

/// Last applied offset of every ingestion channel.
///
/// This is the in-memory cache of the ledger document stored in the
/// index. It is rebuilt from that document when the memory is opened and
/// replaced only after a batch carrying a newer ledger has committed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelLedger {
    positions: HashMap<u16, u64>,
}

impl ChannelLedger {
    pub fn new(positions: HashMap<u16, u64>) -> Self {
        Self { positions }
    }

    pub fn current_offsets(&self) -> &HashMap<u16, u64> {
        &self.positions
    }

    pub fn position(&self, channel: u16) -> Option<u64> {
        self.positions.get(&channel).copied()
    }

    /// Whether an item at `offset` on `channel` has not been applied yet.
    ///
    /// An unknown channel accepts every offset.
    pub fn propose_advance(&self, channel: u16, offset: u64) -> bool {
        self.position(channel).is_none_or(|current| offset > current)
    }

    /// The ledger after applying `incoming`: the element-wise maximum of
    /// both maps, so no channel ever moves backwards.
    pub fn merged_with<I>(&self, incoming: I) -> Self
    where
        I: IntoIterator<Item = (u16, u64)>,
    {
        let mut positions = self.positions.clone();
        for (channel, offset) in incoming {
            positions
                .entry(channel)
                .and_modify(|current| *current = (*current).max(offset))
                .or_insert(offset);
        }
        Self { positions }
    }

    /// Channel positions in channel order, for reporting.
    pub fn sorted(&self) -> BTreeMap<u16, u64> {
        self.positions.iter().map(|(&c, &p)| (c, p)).collect()
    }
}
