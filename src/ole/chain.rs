//! Sector chain resolution shared by the FAT and the MiniFAT.
//!
//! Both allocation tables are arrays of 32-bit "next" pointers forming singly
//! linked chains. [`ChainWalker`] walks one chain over any [`AllocationTable`]
//! and turns every way a chain can be broken (cycle, dangling index, marker
//! where a data sector was expected) into a format error instead of looping.

use super::consts::*;
use crate::common::{Error, Result};
use fixedbitset::FixedBitSet;
use std::ops::Deref;

/// Classified value of one allocation table entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectorEntry {
    /// Index of the next sector in the chain
    Next(u32),
    /// Last sector of the chain
    EndOfChain,
    /// Unallocated sector
    Free,
    /// Sector holding part of the FAT
    FatSector,
    /// Sector holding part of the DIFAT
    DifatSector,
    /// Any other reserved value above MAXREGSECT
    Reserved(u32),
}

impl SectorEntry {
    /// Classify a raw table value
    #[inline]
    pub fn classify(raw: u32) -> Self {
        match raw {
            ENDOFCHAIN => SectorEntry::EndOfChain,
            FREESECT => SectorEntry::Free,
            FATSECT => SectorEntry::FatSector,
            DIFSECT => SectorEntry::DifatSector,
            n if n <= MAXREGSECT => SectorEntry::Next(n),
            n => SectorEntry::Reserved(n),
        }
    }
}

/// A table of chain links addressed by sector (or short sector) index.
pub trait AllocationTable {
    /// Table name used in error messages
    const NAME: &'static str;

    /// Raw entry at `index`, if the table is that long
    fn entry(&self, index: u32) -> Option<u32>;

    /// Number of entries in the table
    fn len(&self) -> usize;

    /// Number of units that physically exist in the backing storage
    ///
    /// A table may describe more units than the file contains; links past
    /// this bound are treated as corruption.
    fn capacity(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Walk the chain that starts at `start`
    fn walk(&self, start: u32) -> ChainWalker<'_, Self>
    where
        Self: Sized,
    {
        ChainWalker::new(self, start)
    }
}

#[derive(Debug)]
enum WalkState {
    /// Next index to yield
    At(u32),
    /// The previous sector linked to a value that is not a data sector
    Broken { from: u32, entry: SectorEntry },
    /// Chain exhausted or failed
    Done,
}

/// Iterator over the sector indices of one chain.
///
/// Yields `Ok(index)` for every sector and ends after the sector linked to
/// END_OF_CHAIN. A corrupt chain yields exactly one `Err` and then ends.
#[derive(Debug)]
pub struct ChainWalker<'a, T: AllocationTable> {
    table: &'a T,
    state: WalkState,
    visited: FixedBitSet,
}

impl<'a, T: AllocationTable> ChainWalker<'a, T> {
    pub fn new(table: &'a T, start: u32) -> Self {
        let state = match SectorEntry::classify(start) {
            SectorEntry::EndOfChain => WalkState::Done,
            SectorEntry::Next(index) => WalkState::At(index),
            entry => WalkState::Broken {
                from: start,
                entry,
            },
        };
        ChainWalker {
            table,
            state,
            visited: FixedBitSet::with_capacity(table.len()),
        }
    }

    fn fail(&mut self, message: String) -> Option<Result<u32>> {
        self.state = WalkState::Done;
        Some(Err(Error::Format(message)))
    }
}

impl<T: AllocationTable> Iterator for ChainWalker<'_, T> {
    type Item = Result<u32>;

    fn next(&mut self) -> Option<Self::Item> {
        let index = match self.state {
            WalkState::Done => return None,
            WalkState::Broken { from, entry } => {
                return self.fail(format!(
                    "{} chain broken after sector {from}: found {entry:?}",
                    T::NAME
                ));
            },
            WalkState::At(index) => index,
        };

        let Some(raw) = self.table.entry(index) else {
            return self.fail(format!(
                "{} sector index {index} out of range ({} entries)",
                T::NAME,
                self.table.len()
            ));
        };
        if u64::from(index) >= self.table.capacity() {
            return self.fail(format!(
                "{} sector index {index} beyond end of data ({} sectors)",
                T::NAME,
                self.table.capacity()
            ));
        }
        if self.visited.put(index as usize) {
            return self.fail(format!(
                "{} chain contains a cycle at sector {index}",
                T::NAME
            ));
        }

        self.state = match SectorEntry::classify(raw) {
            SectorEntry::Next(next) => WalkState::At(next),
            SectorEntry::EndOfChain => WalkState::Done,
            entry => WalkState::Broken { from: index, entry },
        };
        Some(Ok(index))
    }
}

/// Ordered sector indices of one resolved chain
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SectorChain(Vec<u32>);

impl SectorChain {
    pub fn sectors(&self) -> &[u32] {
        &self.0
    }
}

impl Deref for SectorChain {
    type Target = [u32];

    fn deref(&self) -> &[u32] {
        &self.0
    }
}

impl From<Vec<u32>> for SectorChain {
    fn from(sectors: Vec<u32>) -> Self {
        SectorChain(sectors)
    }
}

/// Resolve a complete chain up to its END_OF_CHAIN marker
pub fn resolve_chain<T: AllocationTable>(table: &T, start: u32) -> Result<SectorChain> {
    let sectors = table.walk(start).collect::<Result<Vec<u32>>>()?;
    log::trace!("{} chain from {start}: {} sectors", T::NAME, sectors.len());
    Ok(SectorChain(sectors))
}

/// Resolve the first `needed` sectors of a chain
///
/// Chains longer than needed are accepted (only the prefix is walked);
/// chains that end early are corrupt because the declared size cannot be
/// backed by data.
pub fn resolve_chain_prefix<T: AllocationTable>(
    table: &T,
    start: u32,
    needed: usize,
) -> Result<SectorChain> {
    if needed == 0 {
        return Ok(SectorChain::default());
    }

    let mut sectors = Vec::with_capacity(needed.min(table.len()));
    for sector in table.walk(start).take(needed) {
        sectors.push(sector?);
    }
    if sectors.len() < needed {
        return Err(Error::Format(format!(
            "{} chain from {start} has {} sectors, {needed} required",
            T::NAME,
            sectors.len()
        )));
    }
    log::trace!("{} chain from {start}: {needed} sectors", T::NAME);
    Ok(SectorChain(sectors))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use proptest::prelude::*;

    /// In-memory table for exercising the walker directly
    pub(crate) struct VecTable(pub Vec<u32>);

    impl AllocationTable for VecTable {
        const NAME: &'static str = "test";

        fn entry(&self, index: u32) -> Option<u32> {
            self.0.get(index as usize).copied()
        }

        fn len(&self) -> usize {
            self.0.len()
        }

        fn capacity(&self) -> u64 {
            self.0.len() as u64
        }
    }

    #[test]
    fn test_classify_markers() {
        assert_eq!(SectorEntry::classify(0), SectorEntry::Next(0));
        assert_eq!(SectorEntry::classify(MAXREGSECT), SectorEntry::Next(MAXREGSECT));
        assert_eq!(SectorEntry::classify(0xFFFFFFFB), SectorEntry::Reserved(0xFFFFFFFB));
        assert_eq!(SectorEntry::classify(DIFSECT), SectorEntry::DifatSector);
        assert_eq!(SectorEntry::classify(FATSECT), SectorEntry::FatSector);
        assert_eq!(SectorEntry::classify(ENDOFCHAIN), SectorEntry::EndOfChain);
        assert_eq!(SectorEntry::classify(FREESECT), SectorEntry::Free);
    }

    #[test]
    fn test_resolve_simple_chain() {
        let table = VecTable(vec![2, ENDOFCHAIN, 4, FREESECT, 1]);
        let chain = resolve_chain(&table, 0).unwrap();
        assert_eq!(chain.sectors(), &[0, 2, 4, 1]);
    }

    #[test]
    fn test_end_of_chain_start_is_empty() {
        let table = VecTable(vec![ENDOFCHAIN]);
        assert!(resolve_chain(&table, ENDOFCHAIN).unwrap().is_empty());
    }

    #[test]
    fn test_cycle_is_format_error() {
        let table = VecTable(vec![1, 2, 0]);
        let err = resolve_chain(&table, 0).unwrap_err();
        assert!(err.is_format());
        assert!(err.to_string().contains("cycle"));

        let self_loop = VecTable(vec![0]);
        assert!(resolve_chain(&self_loop, 0).unwrap_err().is_format());
    }

    #[test]
    fn test_markers_inside_chain_are_format_errors() {
        for marker in [FREESECT, FATSECT, DIFSECT, 0xFFFFFFFB] {
            let table = VecTable(vec![1, marker]);
            let err = resolve_chain(&table, 0).unwrap_err();
            assert!(err.is_format(), "marker 0x{marker:08x}");
        }
    }

    #[test]
    fn test_marker_start_is_format_error() {
        let table = VecTable(vec![ENDOFCHAIN]);
        assert!(resolve_chain(&table, FREESECT).is_err());
        assert!(resolve_chain(&table, FATSECT).is_err());
    }

    #[test]
    fn test_out_of_range_index_is_format_error() {
        let table = VecTable(vec![7, ENDOFCHAIN]);
        assert!(resolve_chain(&table, 0).unwrap_err().is_format());
        assert!(resolve_chain(&table, 9).unwrap_err().is_format());
    }

    #[test]
    fn test_walker_yields_sectors_before_error() {
        let table = VecTable(vec![1, 0]);
        let items: Vec<_> = table.walk(0).collect();
        assert_eq!(items.len(), 3);
        assert_eq!(*items[0].as_ref().unwrap(), 0);
        assert_eq!(*items[1].as_ref().unwrap(), 1);
        assert!(items[2].is_err());
    }

    #[test]
    fn test_prefix_stops_before_corruption() {
        // Sector 2 loops back, but only two sectors are needed
        let table = VecTable(vec![1, 2, 0]);
        let chain = resolve_chain_prefix(&table, 0, 2).unwrap();
        assert_eq!(chain.sectors(), &[0, 1]);
    }

    #[test]
    fn test_prefix_too_short_is_format_error() {
        let table = VecTable(vec![1, ENDOFCHAIN]);
        let err = resolve_chain_prefix(&table, 0, 3).unwrap_err();
        assert!(err.is_format());
        assert!(resolve_chain_prefix(&table, 0, 0).unwrap().is_empty());
    }

    fn table_strategy() -> impl Strategy<Value = (Vec<u32>, u32)> {
        (1usize..64).prop_flat_map(|len| {
            let entry = prop_oneof![
                6 => 0..len as u32 + 2,
                1 => Just(ENDOFCHAIN),
                1 => Just(FREESECT),
                1 => Just(FATSECT),
            ];
            (prop::collection::vec(entry, len), 0..len as u32)
        })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(256))]

        #[test]
        fn prop_walk_never_repeats_and_terminates((entries, start) in table_strategy()) {
            let len = entries.len();
            let table = VecTable(entries);

            let mut seen = std::collections::HashSet::new();
            let mut steps = 0usize;
            let mut failed = false;
            for item in table.walk(start) {
                steps += 1;
                prop_assert!(steps <= len + 1, "walker did not terminate");
                match item {
                    Ok(sector) => prop_assert!(seen.insert(sector), "sector {} repeated", sector),
                    Err(err) => {
                        prop_assert!(err.is_format());
                        failed = true;
                    },
                }
            }

            // Chains that resolve without error end at END_OF_CHAIN
            if !failed {
                let chain = resolve_chain(&table, start).unwrap();
                let tail = *chain.last().unwrap();
                prop_assert_eq!(table.0[tail as usize], ENDOFCHAIN);
            } else {
                prop_assert!(resolve_chain(&table, start).is_err());
            }
        }
    }
}
