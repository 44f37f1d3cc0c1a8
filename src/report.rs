use crate::cli::SimConfig;
use crate::constants::{BYTES_IN_KBYTE, BYTES_IN_MBYTE, DOLLARS_PER_KBYTE};
use crate::simulate::Simulation;

/// Prints the four-section plain-text report: input echo, cache calculated
/// values, virtual memory results, cache results.
pub fn print_report(cfg: &SimConfig, sim: &Simulation) {
    let cache = sim.cache.borrow();
    let pool = sim.pool.borrow();
    let sched = &sim.scheduler;

    println!("Trace-Driven Memory Hierarchy Simulator\n");
    println!("Trace File(s):");
    for stream in &sched.streams {
        println!("        {}", stream.name);
    }
    for path in &sim.skipped {
        println!("     XX {:<24} [FILE NOT FOUND]", path);
    }

    println!("\n***** Cache Input Parameters *****\n");
    println!("{:<32}{} KB", "Cache Size:", cfg.cache_bytes / BYTES_IN_KBYTE);
    println!("{:<32}{} bytes", "Block Size:", cfg.block_bytes);
    println!("{:<32}{}", "Associativity:", cfg.associativity_arg);
    println!("{:<32}{}", "Replacement Policy:", cfg.policy_arg.long_name());
    println!(
        "{:<32}{} MB",
        "Physical Memory:",
        cfg.physical_bytes / BYTES_IN_MBYTE
    );
    println!(
        "{:<32}{:.1}%",
        "Percent Memory Used by System:", cfg.system_percent as f64
    );
    println!("{:<32}{}", "Instructions / Time Slice:", cfg.time_slice);

    println!("\n***** Cache Calculated Values *****\n");
    println!("{:<32}{}", "Total # Blocks:", cache.num_blocks());
    println!("{:<32}{} bits", "Tag Size:", cache.tag_bits());
    println!("{:<32}{} bits", "Index Size:", cache.index_bits());
    println!("{:<32}{} bits", "Offset Size:", cache.offset_bits());
    println!("{:<32}{}", "Total # Rows:", cache.num_sets());
    println!("{:<32}{} bytes", "Overhead Size:", cache.overhead_bytes());
    let impl_kib = cache.implementation_bytes() as f64 / BYTES_IN_KBYTE as f64;
    println!(
        "{:<32}{:.2} KB  ({} bytes)",
        "Implementation Memory Size:",
        impl_kib,
        cache.implementation_bytes()
    );
    println!(
        "{:<32}${:.2} @ ${:.2} per KB",
        "Cost:",
        impl_kib * DOLLARS_PER_KBYTE,
        DOLLARS_PER_KBYTE
    );

    println!("\n***** Physical Memory Calculated Values *****\n");
    println!("{:<32}{}", "Number of Physical Pages:", pool.total_frames());
    println!(
        "{:<32}{}",
        "Number of Pages for System:",
        pool.total_frames() - pool.usable_frames()
    );
    println!(
        "{:<32}{} bits",
        "Size of Page Table Entry:",
        pool.entry_bits()
    );
    let table_ram: u64 = sched
        .streams
        .iter()
        .map(|s| (s.vm.table_len() * pool.entry_bits() as u64).div_ceil(8))
        .sum();
    println!("{:<32}{} bytes", "Total RAM for Page Table(s):", table_ram);

    println!("\n***** Virtual Memory Simulation Results *****\n");
    let pages_mapped: u64 = sched.streams.iter().map(|s| s.vm.stats.pages_mapped).sum();
    let table_hits: u64 = sched.streams.iter().map(|s| s.vm.stats.table_hits).sum();
    let page_faults: u64 = sched.streams.iter().map(|s| s.vm.stats.page_faults).sum();
    debug_assert_eq!(page_faults, pool.stats.evictions);
    debug_assert_eq!(
        pool.stats.accesses,
        table_hits + pages_mapped,
        "every translation either hits the table or installs a mapping"
    );
    println!("{:<32}{}", "Virtual Addresses Translated:", pool.stats.accesses);
    println!("{:<32}{}", "Pages Mapped:", pages_mapped);
    println!("{:<32}{}", "Page Table Hits:", table_hits);
    println!("{:<32}{}", "Pages from Free:", pool.stats.pages_from_free);
    println!("{:<32}{}", "Total Page Faults:", page_faults);

    for stream in &sched.streams {
        let vm = &stream.vm;
        let used = vm.entries_used();
        let total = vm.table_len();
        let waste_bytes = ((total - used) * pool.entry_bits() as u64) as f64 / 8.0;
        println!("\nProcess {} ({}):", vm.pid(), stream.name);
        println!("{:<32}{}", "--- Pages Mapped:", vm.stats.pages_mapped);
        println!("{:<32}{}", "--- Page Faults:", vm.stats.page_faults);
        println!(
            "{:<32}{} / {} ({:.4}%)",
            "--- Page Table Entries Used:",
            used,
            total,
            100.0 * used as f64 / total as f64
        );
        println!(
            "{:<32}{:.2} KB",
            "--- Page Table Waste:",
            waste_bytes / BYTES_IN_KBYTE as f64
        );
    }

    println!("\n***** Cache Simulation Results *****\n");
    let stats = &cache.stats;
    debug_assert_eq!(stats.hits + stats.misses, stats.block_accesses);
    debug_assert_eq!(
        stats.compulsory_misses + stats.conflict_misses,
        stats.misses
    );
    println!(
        "{:<32}{} ({} addresses)",
        "Total Cache Accesses:", stats.block_accesses, stats.addresses
    );
    println!("{:<32}{}", "--- Instruction Bytes:", stats.instr_bytes);
    println!("{:<32}{}", "--- SrcDst Bytes:", stats.src_dst_bytes);
    println!("{:<32}{}", "Cache Hits:", stats.hits);
    println!("{:<32}{}", "Cache Misses:", stats.misses);
    println!("{:<32}{}", "--- Compulsory Misses:", stats.compulsory_misses);
    println!("{:<32}{}", "--- Conflict Misses:", stats.conflict_misses);

    println!("\n***** ***** Cache Hit & Miss Rate ***** *****\n");
    let hit_rate = if stats.block_accesses > 0 {
        100.0 * stats.hits as f64 / stats.block_accesses as f64
    } else {
        0.0
    };
    println!("{:<32}{:.4}%", "Hit Rate:", hit_rate);
    println!("{:<32}{:.4}%", "Miss Rate:", 100.0 - hit_rate);
    let cpi = if sched.stats.instructions > 0 {
        sched.stats.cycles as f64 / sched.stats.instructions as f64
    } else {
        0.0
    };
    println!(
        "{:<32}{:.2} Cycles/Instruction ({} instructions)",
        "CPI:", cpi, sched.stats.instructions
    );

    let unused_blocks = cache.num_blocks() - cache.used_blocks();
    let unused_kib =
        unused_blocks as f64 * (cache.block_bytes() as f64 + cache.meta_bytes_per_block())
            / BYTES_IN_KBYTE as f64;
    println!(
        "\n{:<32}{:.2} KB / {:.2} KB = {:.2}%   Waste: ${:.2}",
        "Unused Cache Space:",
        unused_kib,
        impl_kib,
        if impl_kib > 0.0 {
            100.0 * unused_kib / impl_kib
        } else {
            0.0
        },
        unused_kib * DOLLARS_PER_KBYTE
    );
    println!(
        "{:<32}{} / {}",
        "Unused Cache Blocks:",
        unused_blocks,
        cache.num_blocks()
    );
}
