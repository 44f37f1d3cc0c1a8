use std::cell::RefCell;
use std::rc::Rc;

use crate::error::SimError;
use crate::simulate::frame_pool::FramePool;
use crate::simulate::{PhysicalAddress, VirtualAddress};

#[derive(Default, Clone, Copy)]
pub(crate) struct PageTableEntry {
    pub(crate) frame: u64,
    pub(crate) valid: bool,
    #[allow(dead_code)]
    pub(crate) dirty: bool,
    pub(crate) tick: u64,
}

#[derive(Default)]
pub struct VmStats {
    /// Translations resolved by a still-live page table entry.
    pub(crate) table_hits: u64,
    /// Mappings installed, whether from a free frame or by stealing one.
    pub(crate) pages_mapped: u64,
    /// Installs that stole a live frame from someone.
    pub(crate) page_faults: u64,
}

/// Per-process translator over the shared frame pool.
///
/// A page table entry is trusted only while the frame it names still claims
/// the same `(pid, vpn)`. Frames stolen by other processes are detected
/// here, on the next touch, instead of walking back-pointers at eviction.
pub struct VirtMem {
    pid: u16,
    page_bytes: u64,
    offset_bits: u32,
    vpn_bits: u32,
    table: Vec<PageTableEntry>,
    pool: Rc<RefCell<FramePool>>,
    pub(crate) stats: VmStats,
}

impl VirtMem {
    pub fn new(pid: u16, va_bits: u32, page_bytes: u64, pool: Rc<RefCell<FramePool>>) -> Self {
        debug_assert!(page_bytes.is_power_of_two());
        let offset_bits = page_bytes.trailing_zeros();
        let vpn_bits = va_bits - offset_bits;
        VirtMem {
            pid,
            page_bytes,
            offset_bits,
            vpn_bits,
            table: vec![PageTableEntry::default(); 1usize << vpn_bits],
            pool,
            stats: VmStats::default(),
        }
    }

    pub fn pid(&self) -> u16 {
        self.pid
    }

    pub fn vpn_bits(&self) -> u32 {
        self.vpn_bits
    }

    pub fn table_len(&self) -> u64 {
        self.table.len() as u64
    }

    /// Entries that have ever mapped a page. The valid flag is never cleared
    /// on steal, so this counts lifetime usage, not current residency.
    pub fn entries_used(&self) -> u64 {
        self.table.iter().filter(|e| e.valid).count() as u64
    }

    fn resident(&self, vpn: u64) -> bool {
        let pte = &self.table[vpn as usize];
        if !pte.valid {
            return false;
        }
        let pool = self.pool.borrow();
        if pte.frame >= pool.used() {
            return false;
        }
        let frame = pool.frame(pte.frame);
        frame.valid && frame.pid == self.pid && frame.vpn == vpn
    }

    /// Maps a virtual address to its physical address, faulting in the page
    /// if the entry is missing or stale.
    pub fn translate(
        &mut self,
        va: VirtualAddress,
        is_write: bool,
    ) -> Result<PhysicalAddress, SimError> {
        let tick = self.pool.borrow_mut().tick();
        let vpn = va.0 >> self.offset_bits;
        let offset = va.0 & ((1u64 << self.offset_bits) - 1);
        if vpn >= self.table.len() as u64 {
            return Err(SimError::OutOfRange {
                vpn,
                table_len: self.table.len() as u64,
            });
        }

        if self.resident(vpn) {
            self.stats.table_hits += 1;
        } else {
            let (index, evicted) = self.pool.borrow_mut().allocate_or_evict(self.pid, vpn);
            {
                let mut pool = self.pool.borrow_mut();
                let frame = pool.frame_mut(index);
                frame.pid = self.pid;
                frame.vpn = vpn;
                frame.valid = true;
                frame.dirty = false;
                frame.tick = tick;
            }
            let pte = &mut self.table[vpn as usize];
            pte.frame = index;
            pte.valid = true;
            pte.dirty = false;
            pte.tick = tick;
            self.stats.pages_mapped += 1;
            if evicted {
                self.stats.page_faults += 1;
            }
        }

        let pte = &mut self.table[vpn as usize];
        pte.tick = tick;
        if is_write {
            pte.dirty = true;
        }
        let frame_index = pte.frame;
        {
            let mut pool = self.pool.borrow_mut();
            let frame = pool.frame_mut(frame_index);
            frame.tick = tick;
            if is_write {
                frame.dirty = true;
            }
        }
        Ok(PhysicalAddress(frame_index * self.page_bytes + offset))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Small address space keeps the page tables tiny: 16 pages of 4 KiB.
    const VA_BITS: u32 = 16;
    const PAGE: u64 = 4096;

    fn pool(frames: u64) -> Rc<RefCell<FramePool>> {
        Rc::new(RefCell::new(FramePool::new(frames * PAGE, PAGE, 0.0).unwrap()))
    }

    #[test]
    fn translate_preserves_the_offset() {
        let p = pool(4);
        let mut vm = VirtMem::new(0, VA_BITS, PAGE, Rc::clone(&p));
        let pa = vm.translate(VirtualAddress(0x1234), false).unwrap();
        assert_eq!(pa.0 % PAGE, 0x234);
        assert_eq!(vm.stats.pages_mapped, 1);
        assert_eq!(p.borrow().stats.pages_from_free, 1);
    }

    #[test]
    fn second_touch_is_a_table_hit() {
        let p = pool(4);
        let mut vm = VirtMem::new(0, VA_BITS, PAGE, p);
        let first = vm.translate(VirtualAddress(0x1000), false).unwrap();
        let second = vm.translate(VirtualAddress(0x1004), false).unwrap();
        assert_eq!(second.0, first.0 + 4);
        assert_eq!(vm.stats.table_hits, 1);
        assert_eq!(vm.stats.pages_mapped, 1);
    }

    #[test]
    fn write_marks_frame_and_entry_dirty() {
        let p = pool(4);
        let mut vm = VirtMem::new(0, VA_BITS, PAGE, Rc::clone(&p));
        vm.translate(VirtualAddress(0), true).unwrap();
        assert!(p.borrow().frame(0).dirty);
        assert!(vm.table[0].dirty);
    }

    #[test]
    fn stale_entry_refaults_after_silent_steal() {
        let p = pool(1);
        let mut vm0 = VirtMem::new(0, VA_BITS, PAGE, Rc::clone(&p));
        let mut vm1 = VirtMem::new(1, VA_BITS, PAGE, Rc::clone(&p));

        vm0.translate(VirtualAddress(0), false).unwrap();
        assert_eq!(vm0.stats.page_faults, 0);

        // vm1 steals the only frame; vm0's entry still says valid.
        vm1.translate(VirtualAddress(0), false).unwrap();
        assert_eq!(vm1.stats.page_faults, 1);
        assert!(vm0.table[0].valid);

        // The identity check sees the steal and faults the page back in.
        vm0.translate(VirtualAddress(0), false).unwrap();
        assert_eq!(vm0.stats.page_faults, 1);
        assert_eq!(vm0.stats.table_hits, 0);
        let pool = p.borrow();
        assert_eq!(pool.frame(0).pid, 0);
        assert_eq!(pool.stats.evictions, 2);
    }

    #[test]
    fn physical_addresses_stay_inside_the_usable_region() {
        let p = pool(2);
        let mut vm = VirtMem::new(0, VA_BITS, PAGE, Rc::clone(&p));
        for page in 0..8u64 {
            let pa = vm.translate(VirtualAddress(page * PAGE + 7), false).unwrap();
            assert!(pa.0 < p.borrow().usable_frames() * PAGE);
            assert_eq!(pa.0 % PAGE, 7);
        }
    }

    #[test]
    fn vpn_past_the_table_is_rejected() {
        // A 16-bit space over 4 KiB pages has 16 virtual pages; force a
        // larger vpn through a wider address.
        let p = pool(2);
        let mut vm = VirtMem::new(0, VA_BITS, PAGE, p);
        let err = vm.translate(VirtualAddress(1 << 20), false).unwrap_err();
        assert!(matches!(err, SimError::OutOfRange { .. }));
    }

    #[test]
    fn fault_only_counted_on_eviction() {
        let p = pool(2);
        let mut vm = VirtMem::new(0, VA_BITS, PAGE, Rc::clone(&p));
        vm.translate(VirtualAddress(0), false).unwrap();
        vm.translate(VirtualAddress(PAGE), false).unwrap();
        assert_eq!(vm.stats.page_faults, 0);
        vm.translate(VirtualAddress(2 * PAGE), false).unwrap();
        assert_eq!(vm.stats.page_faults, 1);
        assert_eq!(p.borrow().stats.pages_from_free, 2);
        assert_eq!(vm.stats.pages_mapped, 3);
    }
}
