use std::ops::RangeInclusive;

/// A block number or a page number, depending on the source
pub type WorkUnit = u64;

/// Transactions produced by fetching a single work unit
pub type Batch = Vec<TransactionRecord>;

/// Direction in which a source walks its units
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

/// Closed range of work units, as resolved by a source at startup
///
/// `start` and `end` are both inclusive. A forward range walks `start..=end`, a backward one
/// walks `end..=start` in reverse. Empty ranges are represented explicitly so a source with
/// nothing to do (e.g. an indexer with no pages yet) doesn't need a sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkRange {
    pub start: WorkUnit,
    pub end: WorkUnit,
    empty: bool,
}

impl WorkRange {
    pub fn new(start: WorkUnit, end: WorkUnit) -> Self {
        Self {
            start,
            end,
            empty: false,
        }
    }

    pub fn empty() -> Self {
        Self {
            start: 0,
            end: 0,
            empty: true,
        }
    }

    pub fn direction(&self) -> Direction {
        if self.start <= self.end {
            Direction::Forward
        } else {
            Direction::Backward
        }
    }

    pub fn len(&self) -> usize {
        if self.empty {
            return 0;
        }

        (self.start.abs_diff(self.end) + 1) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every unit in the range, exactly once, in walk order
    pub fn units(&self) -> Box<dyn Iterator<Item = WorkUnit> + Send> {
        if self.empty {
            return Box::new(std::iter::empty());
        }

        match self.direction() {
            Direction::Forward => Box::new(self.start..=self.end),
            Direction::Backward => Box::new((self.end..=self.start).rev()),
        }
    }
}

impl From<RangeInclusive<WorkUnit>> for WorkRange {
    fn from(range: RangeInclusive<WorkUnit>) -> Self {
        if range.is_empty() {
            Self::empty()
        } else {
            Self::new(*range.start(), *range.end())
        }
    }
}

/// A normalized transaction, regardless of which source produced it
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionRecord {
    /// Sender address. Empty if it could not be recovered
    pub sender: String,

    /// Recipient address. Empty for contract creations
    pub recipient: String,

    /// Block timestamp, in milliseconds
    pub timestamp: u64,

    pub block_number: i64,

    /// `false` if sender recovery failed
    pub success: bool,
}

impl TransactionRecord {
    /// Addresses this record contributes to the wallet set
    pub fn addresses(&self) -> impl Iterator<Item = &str> {
        [self.sender.as_str(), self.recipient.as_str()]
            .into_iter()
            .filter(|a| !a.is_empty())
    }
}
