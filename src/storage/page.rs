//! # Heap Page Layout and Access
//!
//! A heap page is a fixed 16 KiB buffer: a 16-byte header, a line pointer
//! table growing downward, and a storage arena growing upward from the
//! page end. Tuples and redirect payloads share the arena.
//!
//! ## Page Header Layout (16 bytes)
//!
//! ```text
//! Offset  Size  Field        Description
//! ------  ----  -----------  ----------------------------------------
//! 0       1     page_type    Type of page (Heap)
//! 1       1     flags        Bit 0: page-full hint
//! 2       2     slot_count   Number of line pointers in the table
//! 4       2     free_start   Offset where free space begins
//! 6       2     free_end     Offset where free space ends
//! 8       8     prune_hint   Lowest soon-prunable transaction id (0 = none)
//! ```
//!
//! `prune_hint` is the page-wide hint that lets callers skip pages with
//! nothing to reclaim without walking any chains: it holds the lowest
//! transaction id that could make a tuple on this page dead once it falls
//! behind the visibility horizon.
//!
//! The header is read and written through `zerocopy`, by value, so page
//! buffers need no particular alignment.
//!
//! ## Read vs. Write Views
//!
//! [`HeapPage`] wraps a shared borrow and exposes only inspection.
//! [`HeapPageMut`] wraps an exclusive borrow and adds tuple placement,
//! slot updates, payload placement, and compaction. The two views mirror
//! the lock modes under which a caller may hold the buffer.

use eyre::{ensure, Result};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use super::slot::{RedirectHeader, Slot, SlotId};
use super::{PAGE_HEADER_SIZE, PAGE_SIZE, SLOT_SIZE};
use crate::config::MAX_SLOTS_PER_PAGE;
use crate::mvcc::{TupleHeader, TxId, INVALID_TX_ID, TUPLE_HEADER_SIZE};

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageType {
    Unknown = 0x00,
    Heap = 0x01,
}

impl PageType {
    pub fn from_byte(b: u8) -> Self {
        match b {
            0x01 => PageType::Heap,
            _ => PageType::Unknown,
        }
    }
}

const FLAG_PAGE_FULL: u8 = 0x01;

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct PageHeader {
    page_type: u8,
    flags: u8,
    slot_count: u16,
    free_start: u16,
    free_end: u16,
    prune_hint: u64,
}

impl PageHeader {
    pub fn new(page_type: PageType) -> Self {
        Self {
            page_type: page_type as u8,
            flags: 0,
            slot_count: 0,
            free_start: PAGE_HEADER_SIZE as u16,
            free_end: PAGE_SIZE as u16,
            prune_hint: INVALID_TX_ID,
        }
    }

    pub fn read_from(data: &[u8]) -> Result<Self> {
        ensure!(
            data.len() >= size_of::<Self>(),
            "buffer too small for PageHeader: {} < {}",
            data.len(),
            size_of::<Self>()
        );
        Self::read_from_bytes(&data[..size_of::<Self>()])
            .map_err(|e| eyre::eyre!("failed to read PageHeader: {:?}", e))
    }

    pub fn write_to(&self, data: &mut [u8]) -> Result<()> {
        ensure!(
            data.len() >= size_of::<Self>(),
            "buffer too small for PageHeader: {} < {}",
            data.len(),
            size_of::<Self>()
        );
        data[..size_of::<Self>()].copy_from_slice(self.as_bytes());
        Ok(())
    }

    pub fn page_type(&self) -> PageType {
        PageType::from_byte(self.page_type)
    }

    pub fn slot_count(&self) -> u16 {
        self.slot_count
    }

    pub fn set_slot_count(&mut self, count: u16) {
        self.slot_count = count;
    }

    pub fn free_start(&self) -> u16 {
        self.free_start
    }

    pub fn set_free_start(&mut self, offset: u16) {
        self.free_start = offset;
    }

    pub fn free_end(&self) -> u16 {
        self.free_end
    }

    pub fn set_free_end(&mut self, offset: u16) {
        self.free_end = offset;
    }

    pub fn free_space(&self) -> u16 {
        self.free_end.saturating_sub(self.free_start)
    }

    pub fn prune_hint(&self) -> TxId {
        self.prune_hint
    }

    pub fn set_prune_hint(&mut self, xid: TxId) {
        self.prune_hint = xid;
    }

    pub fn is_full(&self) -> bool {
        self.flags & FLAG_PAGE_FULL != 0
    }

    pub fn set_full(&mut self, full: bool) {
        if full {
            self.flags |= FLAG_PAGE_FULL;
        } else {
            self.flags &= !FLAG_PAGE_FULL;
        }
    }
}

/// Shared read view over a page buffer.
pub struct HeapPage<'a> {
    data: &'a [u8],
}

impl<'a> HeapPage<'a> {
    pub fn new(data: &'a [u8]) -> Result<Self> {
        ensure!(
            data.len() == PAGE_SIZE,
            "invalid page size: {} != {}",
            data.len(),
            PAGE_SIZE
        );
        Ok(Self { data })
    }

    pub fn header(&self) -> Result<PageHeader> {
        PageHeader::read_from(self.data)
    }

    pub fn slot_count(&self) -> Result<SlotId> {
        Ok(self.header()?.slot_count())
    }

    pub fn slot(&self, id: SlotId) -> Result<Slot> {
        let count = self.slot_count()?;
        ensure!(id < count, "slot {id} out of range (page has {count})");
        let at = PAGE_HEADER_SIZE + id as usize * SLOT_SIZE;
        let word = u32::from_le_bytes([
            self.data[at],
            self.data[at + 1],
            self.data[at + 2],
            self.data[at + 3],
        ]);
        Slot::decode(word)
    }

    /// Storage bytes of a Normal slot, tuple header included.
    pub fn item_bytes(&self, id: SlotId) -> Result<&'a [u8]> {
        match self.slot(id)? {
            Slot::Normal { offset, length } => {
                let start = offset as usize;
                let end = start + length as usize;
                ensure!(end <= PAGE_SIZE, "slot {id} storage extends past page end");
                Ok(&self.data[start..end])
            }
            other => eyre::bail!("slot {id} has no tuple storage: {other:?}"),
        }
    }

    pub fn tuple_header(&self, id: SlotId) -> Result<TupleHeader> {
        let bytes = self.item_bytes(id)?;
        ensure!(
            bytes.len() >= TUPLE_HEADER_SIZE,
            "slot {id} storage too small for a tuple header"
        );
        Ok(TupleHeader::from_bytes(bytes))
    }

    /// Row payload of a Normal slot, after the tuple header.
    pub fn record_bytes(&self, id: SlotId) -> Result<&'a [u8]> {
        let bytes = self.item_bytes(id)?;
        ensure!(
            bytes.len() >= TUPLE_HEADER_SIZE,
            "slot {id} storage too small for a tuple header"
        );
        Ok(&bytes[TUPLE_HEADER_SIZE..])
    }

    /// Redirect payload bytes at the given arena offset, header included.
    pub fn redirect_payload(&self, data_offset: u16) -> Result<&'a [u8]> {
        let start = data_offset as usize;
        ensure!(
            start + size_of::<u16>() <= PAGE_SIZE,
            "redirect payload offset {start} out of range"
        );
        let header = RedirectHeader::from_bytes(&self.data[start..])?;
        let end = start + header.len as usize;
        ensure!(end <= PAGE_SIZE, "redirect payload extends past page end");
        Ok(&self.data[start..end])
    }

    /// Cheap pre-lock test: could this page have something to reclaim
    /// once `horizon` is the oldest transaction that can see old rows?
    pub fn is_prunable(&self, horizon: TxId) -> Result<bool> {
        let hint = self.header()?.prune_hint();
        Ok(hint != INVALID_TX_ID && hint < horizon)
    }
}

/// Exclusive write view over a page buffer.
pub struct HeapPageMut<'a> {
    data: &'a mut [u8],
}

impl<'a> HeapPageMut<'a> {
    pub fn new(data: &'a mut [u8]) -> Result<Self> {
        ensure!(
            data.len() == PAGE_SIZE,
            "invalid page size: {} != {}",
            data.len(),
            PAGE_SIZE
        );
        Ok(Self { data })
    }

    /// Zeroes the buffer and writes an empty heap page header.
    pub fn init_empty(data: &'a mut [u8]) -> Result<Self> {
        ensure!(
            data.len() == PAGE_SIZE,
            "invalid page size: {} != {}",
            data.len(),
            PAGE_SIZE
        );
        data.fill(0);
        PageHeader::new(PageType::Heap).write_to(data)?;
        Ok(Self { data })
    }

    pub fn as_read(&self) -> HeapPage<'_> {
        HeapPage { data: &*self.data }
    }

    pub fn header(&self) -> Result<PageHeader> {
        PageHeader::read_from(self.data)
    }

    pub fn set_header(&mut self, header: &PageHeader) -> Result<()> {
        header.write_to(self.data)
    }

    pub fn set_slot(&mut self, id: SlotId, slot: Slot) -> Result<()> {
        let count = self.header()?.slot_count();
        ensure!(id < count, "slot {id} out of range (page has {count})");
        let at = PAGE_HEADER_SIZE + id as usize * SLOT_SIZE;
        self.data[at..at + SLOT_SIZE].copy_from_slice(&slot.encode().to_le_bytes());
        Ok(())
    }

    /// Places a tuple in the arena and points a line pointer at it.
    /// Unused line pointers are reused before the table is extended.
    pub fn insert_tuple(&mut self, tuple: &TupleHeader, record: &[u8]) -> Result<SlotId> {
        let total = TUPLE_HEADER_SIZE + record.len();
        let mut header = self.header()?;

        let mut reuse = None;
        for id in 0..header.slot_count() {
            if matches!(self.as_read().slot(id)?, Slot::Unused) {
                reuse = Some(id);
                break;
            }
        }

        let slot_overhead = if reuse.is_none() { SLOT_SIZE } else { 0 };
        ensure!(
            header.free_space() as usize >= total + slot_overhead,
            "page full: need {} bytes, have {}",
            total + slot_overhead,
            header.free_space()
        );

        let id = match reuse {
            Some(id) => id,
            None => {
                let id = header.slot_count();
                ensure!(
                    (id as usize) < MAX_SLOTS_PER_PAGE,
                    "page line pointer table is full"
                );
                header.set_slot_count(id + 1);
                header.set_free_start(header.free_start() + SLOT_SIZE as u16);
                id
            }
        };

        let offset = header.free_end() - total as u16;
        header.set_free_end(offset);

        let start = offset as usize;
        tuple.write_to(&mut self.data[start..start + TUPLE_HEADER_SIZE]);
        self.data[start + TUPLE_HEADER_SIZE..start + total].copy_from_slice(record);

        self.set_header(&header)?;
        self.set_slot(
            id,
            Slot::Normal {
                offset,
                length: total as u16,
            },
        )?;
        Ok(id)
    }

    /// Rewrites a tuple's header in place, leaving the row payload alone.
    /// This is how an update stamps xmax, the successor link, and the
    /// HOT/PHOT flags onto the superseded version.
    pub fn set_tuple_header(&mut self, id: SlotId, tuple: &TupleHeader) -> Result<()> {
        match self.as_read().slot(id)? {
            Slot::Normal { offset, length } => {
                ensure!(
                    length as usize >= TUPLE_HEADER_SIZE,
                    "slot {id} storage too small for a tuple header"
                );
                let start = offset as usize;
                tuple.write_to(&mut self.data[start..start + TUPLE_HEADER_SIZE]);
                Ok(())
            }
            other => eyre::bail!("slot {id} has no tuple storage: {other:?}"),
        }
    }

    /// Writes a redirect payload into the arena and returns its offset.
    ///
    /// Storage already owned by the slot is reused when the payload fits:
    /// the dead tuple's bytes for a Normal slot, the previous payload for
    /// a redirect that already carries one. Otherwise fresh arena space is
    /// carved from the free region.
    pub fn place_redirect_payload(&mut self, id: SlotId, payload: &[u8]) -> Result<u16> {
        let offset = match self.as_read().slot(id)? {
            Slot::Normal { offset, length } if payload.len() <= length as usize => offset,
            Slot::RedirectWithData { data_offset, .. } => {
                let existing = RedirectHeader::from_bytes(&self.data[data_offset as usize..])?;
                ensure!(
                    payload.len() <= existing.len as usize,
                    "redirect payload grew from {} to {} bytes",
                    existing.len,
                    payload.len()
                );
                data_offset
            }
            _ => {
                let mut header = self.header()?;
                ensure!(
                    header.free_space() as usize >= payload.len(),
                    "page full: no room for a {} byte redirect payload",
                    payload.len()
                );
                let offset = header.free_end() - payload.len() as u16;
                header.set_free_end(offset);
                self.set_header(&header)?;
                offset
            }
        };
        let start = offset as usize;
        self.data[start..start + payload.len()].copy_from_slice(payload);
        Ok(offset)
    }

    pub fn set_prune_hint(&mut self, xid: TxId) -> Result<()> {
        let mut header = self.header()?;
        header.set_prune_hint(xid);
        self.set_header(&header)
    }

    pub fn set_full(&mut self, full: bool) -> Result<()> {
        let mut header = self.header()?;
        header.set_full(full);
        self.set_header(&header)
    }

    /// Squeezes out holes left by reclaimed storage.
    ///
    /// Surviving extents (tuple storage of Normal slots and payloads of
    /// data-bearing redirects) are repacked against the page end and the
    /// owning line pointers are updated, so `free_space` reflects
    /// everything reclaimable again.
    pub fn compact(&mut self) -> Result<()> {
        let mut header = self.header()?;

        // (slot, start, len, is_payload)
        let mut extents: Vec<(SlotId, usize, usize, bool)> = Vec::new();
        for id in 0..header.slot_count() {
            match self.as_read().slot(id)? {
                Slot::Normal { offset, length } => {
                    extents.push((id, offset as usize, length as usize, false));
                }
                Slot::RedirectWithData { data_offset, .. } => {
                    let len = RedirectHeader::from_bytes(&self.data[data_offset as usize..])?.len;
                    extents.push((id, data_offset as usize, len as usize, true));
                }
                _ => {}
            }
        }
        extents.sort_by(|a, b| b.1.cmp(&a.1));

        let mut new_free_end = PAGE_SIZE;
        for (id, start, len, is_payload) in extents {
            ensure!(new_free_end >= len, "storage extents exceed the page size");
            new_free_end -= len;
            if new_free_end != start {
                self.data.copy_within(start..start + len, new_free_end);
            }
            let slot = self.as_read().slot(id)?;
            let moved = match slot {
                Slot::Normal { length, .. } if !is_payload => Slot::Normal {
                    offset: new_free_end as u16,
                    length,
                },
                Slot::RedirectWithData { target, .. } if is_payload => Slot::RedirectWithData {
                    target,
                    data_offset: new_free_end as u16,
                },
                other => eyre::bail!("slot {id} changed state during compaction: {other:?}"),
            };
            self.set_slot(id, moved)?;
        }

        ensure!(
            new_free_end >= header.free_start() as usize,
            "storage extents overlap the line pointer table"
        );
        header.set_free_end(new_free_end as u16);
        self.set_header(&header)
    }
}

/// Structural sanity checks for a page buffer. A zeroed buffer is valid
/// (it decodes as an uninitialized page with no slots).
pub fn validate_page(data: &[u8]) -> Result<()> {
    ensure!(
        data.len() == PAGE_SIZE,
        "invalid page size: {} != {}",
        data.len(),
        PAGE_SIZE
    );

    let header = PageHeader::read_from(data)?;
    let is_zeroed = header.page_type == 0
        && header.flags == 0
        && header.slot_count == 0
        && header.free_start == 0
        && header.free_end == 0;
    if is_zeroed {
        return Ok(());
    }

    ensure!(
        header.page_type() != PageType::Unknown,
        "invalid page type: {:02x}",
        header.page_type
    );
    ensure!(
        header.free_start() as usize >= PAGE_HEADER_SIZE,
        "free_start {} < PAGE_HEADER_SIZE {}",
        header.free_start(),
        PAGE_HEADER_SIZE
    );
    ensure!(
        header.free_end() as usize <= PAGE_SIZE,
        "free_end {} > PAGE_SIZE {}",
        header.free_end(),
        PAGE_SIZE
    );
    ensure!(
        header.free_start() <= header.free_end(),
        "free_start {} > free_end {}",
        header.free_start(),
        header.free_end()
    );
    ensure!(
        header.slot_count() as usize <= MAX_SLOTS_PER_PAGE,
        "slot count {} exceeds page capacity",
        header.slot_count()
    );
    ensure!(
        PAGE_HEADER_SIZE + header.slot_count() as usize * SLOT_SIZE
            <= header.free_start() as usize,
        "line pointer table extends into free space"
    );

    let page = HeapPage::new(data)?;
    for id in 0..header.slot_count() {
        let slot = page.slot(id)?;
        if let Slot::Normal { offset, length } = slot {
            ensure!(
                offset >= header.free_end() && offset as usize + length as usize <= PAGE_SIZE,
                "slot {id} storage [{offset}, +{length}) outside the arena"
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mvcc::TupleHeader;

    fn make_page() -> Vec<u8> {
        let mut data = vec![0u8; PAGE_SIZE];
        HeapPageMut::init_empty(&mut data).unwrap();
        data
    }

    #[test]
    fn page_header_is_16_bytes() {
        assert_eq!(size_of::<PageHeader>(), PAGE_HEADER_SIZE);
    }

    #[test]
    fn init_empty_defaults() {
        let data = make_page();
        let page = HeapPage::new(&data).unwrap();
        let header = page.header().unwrap();

        assert_eq!(header.page_type(), PageType::Heap);
        assert_eq!(header.slot_count(), 0);
        assert_eq!(header.free_start(), PAGE_HEADER_SIZE as u16);
        assert_eq!(header.free_end(), PAGE_SIZE as u16);
        assert_eq!(header.prune_hint(), INVALID_TX_ID);
        assert!(!header.is_full());
    }

    #[test]
    fn insert_and_read_tuple() {
        let mut data = make_page();
        let mut page = HeapPageMut::new(&mut data).unwrap();

        let tuple = TupleHeader::new(7);
        let id = page.insert_tuple(&tuple, b"row payload").unwrap();

        assert_eq!(id, 0);
        let read = page.as_read();
        assert_eq!(read.tuple_header(id).unwrap().xmin, 7);
        assert_eq!(read.record_bytes(id).unwrap(), b"row payload");
    }

    #[test]
    fn insert_reuses_unused_slots() {
        let mut data = make_page();
        let mut page = HeapPageMut::new(&mut data).unwrap();

        let a = page.insert_tuple(&TupleHeader::new(1), b"a").unwrap();
        let b = page.insert_tuple(&TupleHeader::new(2), b"b").unwrap();
        page.set_slot(a, Slot::Unused).unwrap();

        let c = page.insert_tuple(&TupleHeader::new(3), b"c").unwrap();
        assert_eq!(c, a);
        assert_ne!(c, b);
    }

    #[test]
    fn insert_fails_when_full() {
        let mut data = make_page();
        let mut page = HeapPageMut::new(&mut data).unwrap();

        let big = vec![0u8; 4000];
        while page.insert_tuple(&TupleHeader::new(1), &big).is_ok() {}
        let err = page.insert_tuple(&TupleHeader::new(1), &big).unwrap_err();
        assert!(err.to_string().contains("page full"));
    }

    #[test]
    fn tuple_header_rewrite_in_place() {
        let mut data = make_page();
        let mut page = HeapPageMut::new(&mut data).unwrap();

        let id = page.insert_tuple(&TupleHeader::new(5), b"v1").unwrap();
        let mut tuple = page.as_read().tuple_header(id).unwrap();
        tuple.xmax = 9;
        page.set_tuple_header(id, &tuple).unwrap();

        assert_eq!(page.as_read().tuple_header(id).unwrap().xmax, 9);
        assert_eq!(page.as_read().record_bytes(id).unwrap(), b"v1");
    }

    #[test]
    fn compact_reclaims_dead_storage() {
        let mut data = make_page();
        let mut page = HeapPageMut::new(&mut data).unwrap();

        let a = page.insert_tuple(&TupleHeader::new(1), &[1u8; 100]).unwrap();
        let b = page.insert_tuple(&TupleHeader::new(2), &[2u8; 100]).unwrap();
        let c = page.insert_tuple(&TupleHeader::new(3), &[3u8; 100]).unwrap();

        let before = page.header().unwrap().free_space();
        page.set_slot(b, Slot::Unused).unwrap();
        page.compact().unwrap();

        let after = page.header().unwrap().free_space();
        assert!(after > before);
        assert_eq!(page.as_read().record_bytes(a).unwrap(), &[1u8; 100]);
        assert_eq!(page.as_read().record_bytes(c).unwrap(), &[3u8; 100]);
        assert!(validate_page(&data).is_ok());
    }

    #[test]
    fn compact_moves_redirect_payloads() {
        let mut data = make_page();
        let mut page = HeapPageMut::new(&mut data).unwrap();

        let a = page.insert_tuple(&TupleHeader::new(1), &[9u8; 50]).unwrap();
        let victim = page.insert_tuple(&TupleHeader::new(2), &[8u8; 50]).unwrap();
        let tail = page.insert_tuple(&TupleHeader::new(3), &[7u8; 50]).unwrap();

        // victim dies and becomes a payload-bearing redirect to tail
        let mut payload = vec![0u8; 4];
        RedirectHeader::new(super::super::REDIRECT_TAG_COLUMNS, 4).write_to(&mut payload);
        payload[2] = 0xAB;
        payload[3] = 0xCD;
        let data_offset = page.place_redirect_payload(victim, &payload).unwrap();
        page.set_slot(
            victim,
            Slot::RedirectWithData {
                target: tail,
                data_offset,
            },
        )
        .unwrap();
        page.set_slot(a, Slot::Unused).unwrap();

        page.compact().unwrap();

        let read = page.as_read();
        let moved = match read.slot(victim).unwrap() {
            Slot::RedirectWithData { data_offset, .. } => data_offset,
            other => panic!("expected payload redirect, got {other:?}"),
        };
        assert_eq!(read.redirect_payload(moved).unwrap(), &payload[..]);
        assert_eq!(read.record_bytes(tail).unwrap(), &[7u8; 50]);
    }

    #[test]
    fn prune_hint_gates_pruning() {
        let mut data = make_page();
        let mut page = HeapPageMut::new(&mut data).unwrap();
        assert!(!page.as_read().is_prunable(100).unwrap());

        page.set_prune_hint(50).unwrap();
        assert!(page.as_read().is_prunable(100).unwrap());
        assert!(!page.as_read().is_prunable(50).unwrap());
    }

    #[test]
    fn validate_rejects_bad_free_pointers() {
        let mut data = make_page();
        let mut header = PageHeader::new(PageType::Heap);
        header.set_free_start(8);
        header.write_to(&mut data).unwrap();
        assert!(validate_page(&data).is_err());
    }

    #[test]
    fn validate_accepts_zeroed_page() {
        let data = vec![0u8; PAGE_SIZE];
        assert!(validate_page(&data).is_ok());
    }
}
